//! Odometry noise injection.
//!
//! The drivetrain reports how far the robot's tracking center moved along its arc since the last cycle.
//! Each particle must be moved by an independently perturbed copy of that motion so the cloud keeps
//! enough spread to absorb wheel slip and heading error. [`OdometryNoise`] draws those copies: the
//! distance is scaled uniformly within ±`distance_fraction` of itself and the direction of travel is
//! jittered uniformly within ±`heading_jitter` of the current heading.

use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::LocalizationError;

/// Default relative spread applied to the travelled distance
pub const DEFAULT_DISTANCE_FRACTION: f64 = 0.35;
/// Default spread applied to the direction of travel (rad)
pub const DEFAULT_HEADING_JITTER: f64 = 8.0 * std::f64::consts::PI / 180.0;

fn default_distance_fraction() -> f64 {
    DEFAULT_DISTANCE_FRACTION
}
fn default_heading_jitter() -> f64 {
    DEFAULT_HEADING_JITTER
}
fn default_seed() -> u64 {
    7
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OdometryNoiseConfig {
    /// Relative spread of the travelled distance, e.g. 0.35 for ±35 %
    #[serde(default = "default_distance_fraction")]
    pub distance_fraction: f64,
    /// Spread of the direction of travel (rad)
    #[serde(default = "default_heading_jitter")]
    pub heading_jitter: f64,
    /// Seed of the noise generator, independent of the filter's own generator
    #[serde(default = "default_seed")]
    pub seed: u64,
}
impl Default for OdometryNoiseConfig {
    fn default() -> Self {
        OdometryNoiseConfig {
            distance_fraction: DEFAULT_DISTANCE_FRACTION,
            heading_jitter: DEFAULT_HEADING_JITTER,
            seed: default_seed(),
        }
    }
}

/// Draws noisy per-particle displacements from one odometry reading.
#[derive(Clone, Debug)]
pub struct OdometryNoise {
    distance_fraction: f64,
    heading_jitter: f64,
    rng: StdRng,
}
impl OdometryNoise {
    pub fn new(config: &OdometryNoiseConfig) -> Result<Self, LocalizationError> {
        if !(config.distance_fraction >= 0.0 && config.distance_fraction.is_finite()) {
            return Err(LocalizationError::InvalidParameter {
                name: "distance_fraction",
                value: config.distance_fraction,
            });
        }
        if !(config.heading_jitter >= 0.0 && config.heading_jitter.is_finite()) {
            return Err(LocalizationError::InvalidParameter {
                name: "heading_jitter",
                value: config.heading_jitter,
            });
        }
        Ok(OdometryNoise {
            distance_fraction: config.distance_fraction,
            heading_jitter: config.heading_jitter,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }
    /// Draw one perturbed displacement for a move of `arc_length` meters along `heading`.
    pub fn sample(&mut self, arc_length: f64, heading: f64) -> Vector2<f64> {
        let spread = (self.distance_fraction * arc_length).abs();
        let distance = if spread > 0.0 {
            arc_length + self.rng.random_range(-spread..=spread)
        } else {
            arc_length
        };
        let direction = if self.heading_jitter > 0.0 {
            heading + self.rng.random_range(-self.heading_jitter..=self.heading_jitter)
        } else {
            heading
        };
        let (s, c) = direction.sin_cos();
        Vector2::new(distance * c, distance * s)
    }
    /// A displacement closure for one filter predict step.
    pub fn sampler(&mut self, arc_length: f64, heading: f64) -> impl FnMut() -> Vector2<f64> + '_ {
        move || self.sample(arc_length, heading)
    }
}
