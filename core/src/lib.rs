//! Monte Carlo localization toolbox for field robots
//!
//! This crate estimates a mobile robot's planar position on a bounded field by fusing noisy odometry
//! with independent sensor observations using a particle filter (Monte Carlo localization, MCL). It is
//! built for a real-time controller that runs the filter on a fixed cadence (on the order of 10 ms) and
//! needs a pose estimate with bounded, predictable cost per cycle.
//!
//! This crate is primarily built off of a small set of dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the 2D vector and rotation types.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides
//!   the seeded random number generation for resampling, reinjection and odometry noise.
//! - [`serde`](https://crates.io/crates/serde): Provides configuration (de)serialization to JSON, YAML and TOML.
//! - [`log`](https://crates.io/crates/log): Logging facade; the application chooses the logger.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [field]: The static field geometry (boundary walls, interior walls and painted lines) and the ray
//!   casting used to predict range measurements.
//! - [hardware]: The contracts the sensor models require from the hardware drivers.
//! - [measurements]: The [measurements::SensorModel] trait and the range, GPS and line-crossing models.
//! - [odometry]: Noise injection turning a measured drive displacement into per-particle samples.
//! - [particle]: The particle filter engine, systematic resampling and the published pose snapshot.
//! - [runner]: A fixed-cadence background loop that owns and drives a filter.
//! - [config]: Serializable configuration for the whole localization stack.
//! - [sim]: A deterministic simulation of a robot driving on the field with simulated hardware.
//!
//! ## Conventions
//!
//! All quantities are plain `f64` in base SI units: meters for lengths, radians for angles and seconds
//! for time. The field frame is a right handed frame with the origin at the field center; headings are
//! measured counter-clockwise from the +x axis. Hardware specific units (millimeters reported by a
//! range sensor, degrees reported by a GPS yaw) are converted at the sensor model boundary.
//!
//! Headings are not part of the particle state. The robot's heading is assumed to be known far more
//! accurately than its position (a gyro or the GPS yaw), so a single external heading source is shared
//! by the whole particle cloud.
//!
//! ## Filter cycle
//!
//! Each cycle the filter translates every particle by an independently drawn noisy displacement
//! (predict). Once the robot has travelled far enough *and* enough time has elapsed, the sensors refresh
//! their readings, out-of-field particles are reinjected, each particle is weighted by the product of
//! the sensor likelihoods and the cloud is resampled with low-variance systematic resampling (correct).
//! The mean of the resampled cloud is published as the pose estimate.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use loco::field::FieldGeometry;
//! use loco::particle::{FilterConfig, ParticleFilter};
//! use nalgebra::Vector2;
//!
//! let field = Arc::new(FieldGeometry::default());
//! let mut filter = ParticleFilter::new(FilterConfig::default(), field, || 0.0).unwrap();
//! filter.init_at(Vector2::new(0.5, -0.25));
//! filter.step(Duration::from_millis(10), || Vector2::new(0.01, 0.0));
//! let pose = filter.compute_prediction();
//! assert!((pose.x - 0.51).abs() < 1e-12);
//! ```
pub mod config;
pub mod field;
pub mod hardware;
pub mod measurements;
pub mod odometry;
pub mod particle;
pub mod runner;
pub mod sim;

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error;

/// One inch in meters. Field hardware is specified in inches, the filter works in meters.
pub const INCH: f64 = 0.0254;

/// Errors raised while building the localization stack.
///
/// Runtime anomalies (unavailable sensors, degenerate weights, corrupted headings, diverged particles)
/// are never errors; they degrade to keeping the last good state and are reported through the
/// returned outcome values and the log.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum LocalizationError {
    #[error("particle count must be between 1 and {max}, got {count}")]
    InvalidParticleCount { count: usize, max: usize },
    #[error("expected {expected} particles, got {actual}")]
    ParticleCountMismatch { expected: usize, actual: usize },
    #[error("invalid field geometry: {0}")]
    InvalidField(String),
    #[error("invalid value for `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// A planar pose in the field frame.
///
/// Also used to describe where a sensor is mounted relative to the robot's tracking center, in which
/// case `x`/`y` are in the robot frame and `heading` is the sensor bearing relative to the robot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position along the field x axis (m)
    pub x: f64,
    /// Position along the field y axis (m)
    pub y: f64,
    /// Heading counter-clockwise from +x (rad)
    pub heading: f64,
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose {{ x: {:.4} m, y: {:.4} m, heading: {:.2} deg }}",
            self.x,
            self.y,
            wrap_to_180(self.heading.to_degrees())
        )
    }
}
impl From<(Vector2<f64>, f64)> for Pose {
    fn from(value: (Vector2<f64>, f64)) -> Self {
        let (position, heading) = value;
        Pose::new(position.x, position.y, heading)
    }
}
impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Pose {
        Pose { x, y, heading }
    }
    /// Position component as a vector
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
    /// Map a point expressed in this pose's frame into the parent frame.
    pub fn transform_point(&self, point: &Vector2<f64>) -> Vector2<f64> {
        Rotation2::new(self.heading) * point + self.position()
    }
    /// Compose a mounting offset onto this pose, giving the mounted device's pose in the parent frame.
    pub fn compose(&self, offset: &Pose) -> Pose {
        let position = self.transform_point(&offset.position());
        Pose::new(position.x, position.y, self.heading + offset.heading)
    }
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.position() - other.position()).norm()
    }
}

/// Cheap approximation of the standard normal probability density.
///
/// Uses an inverse quartic rational polynomial, `a / (1 + e x^4)`, which has the right peak value at
/// zero and decays fast enough for likelihood weighting while costing only a few multiplications. It is
/// not a normalized density and must only be used for relative weighting.
///
/// # Arguments
/// * `x` - Number of standard deviations from the mean.
/// # Example
/// ```rust
/// use loco::cheap_norm_pdf;
/// assert!((cheap_norm_pdf(0.0) - 0.398_942_280_401_433_7).abs() < 1e-15);
/// assert!(cheap_norm_pdf(1.0) > cheap_norm_pdf(2.0));
/// ```
pub fn cheap_norm_pdf(x: f64) -> f64 {
    const PEAK: f64 = 0.398_942_280_401_433_7;
    const DECAY: f64 = 0.594_228_040_143_37;
    let x2 = x * x;
    PEAK / (1.0 + DECAY * x2 * x2)
}

/// Wrap an angle to the range -180 to 180 degrees
///
/// # Example
/// ```rust
/// use loco::wrap_to_180;
/// assert_eq!(wrap_to_180(190.0), -170.0);
/// ```
pub fn wrap_to_180<T>(angle: T) -> T
where
    T: PartialOrd + Copy + std::ops::SubAssign + std::ops::AddAssign + From<f64>,
{
    let mut wrapped: T = angle;
    while wrapped > T::from(180.0) {
        wrapped -= T::from(360.0);
    }
    while wrapped < T::from(-180.0) {
        wrapped += T::from(360.0);
    }
    wrapped
}
/// Wrap an angle to the range $\pm\pi$ radians
///
/// This function is generic and can be used with any type that implements the necessary traits.
/// Non-finite inputs are returned unchanged.
///
/// # Example
/// ```rust
/// use loco::wrap_to_pi;
/// use std::f64::consts::PI;
/// let wrapped_angle = wrap_to_pi(3.0 * PI / 2.0);
/// assert_eq!(wrapped_angle, -PI / 2.0);
/// ```
pub fn wrap_to_pi<T>(angle: T) -> T
where
    T: PartialOrd + Copy + std::ops::SubAssign + std::ops::AddAssign + From<f64>,
{
    let mut wrapped: T = angle;
    if !(wrapped <= T::from(f64::MAX) && wrapped >= T::from(f64::MIN)) {
        return wrapped;
    }
    while wrapped > T::from(std::f64::consts::PI) {
        wrapped -= T::from(2.0 * std::f64::consts::PI);
    }
    while wrapped < T::from(-std::f64::consts::PI) {
        wrapped += T::from(2.0 * std::f64::consts::PI);
    }
    wrapped
}
