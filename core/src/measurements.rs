//! Sensor likelihood models for the particle filter.
//!
//! This module defines the [`SensorModel`] contract and the three concrete models used to correct the
//! filter: a time-of-flight range sensor ([`DistanceSensorModel`]), an absolute positioning sensor
//! ([`GpsSensorModel`]) and a downward facing reflectance sensor detecting painted lines
//! ([`LineSensorModel`]).
//!
//! Every model splits its work in two. [`SensorModel::update`] is called once per correction cycle and
//! performs all hardware reads, caching what it needs. [`SensorModel::predict_likelihood`] is then called
//! once per particle and must be a cheap, pure function of that cache and the hypothesized pose.
//!
//! A model that cannot say anything this cycle (not installed, failed read, out of range, low confidence)
//! returns `None` rather than a small likelihood. The filter treats `None` as the multiplicative identity
//! so an unavailable sensor never drags the whole cloud toward implausibility.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::field::FieldGeometry;
use crate::hardware::{GpsHardware, RangeHardware, ReflectanceHardware};
use crate::particle::HeadingSource;
use crate::{INCH, Pose, cheap_norm_pdf};

/// Range reading reported when no object is in view (mm)
pub const NO_OBJECT_MM: u32 = 9999;
/// Smallest object size accepted as a real return
pub const MIN_OBJECT_SIZE: u32 = 50;
/// Range standard deviation as a fraction of the measured distance at full confidence
pub const DISTANCE_STD_RATIO: f64 = 0.025;
/// Confidence value corresponding to a full-confidence reading
pub const CONFIDENCE_FULL_SCALE: f64 = 64.0;
/// Default maximum sensing range of the range sensor (m)
pub const DEFAULT_MAX_RANGE: f64 = 2.0;
/// GPS readings with a larger reported error are ignored (m)
pub const GPS_MAX_ERROR: f64 = 0.015;
/// GPS spread as a multiple of the reported error
pub const GPS_STD_SCALE: f64 = 8.0;
/// Raw reflectance above which the line sensor is considered over a line
pub const LINE_SENSOR_THRESHOLD: u32 = 2000;
/// Distance from a line under which a crossing is predicted (m)
pub const LINE_SENSOR_TOLERANCE: f64 = INCH;
/// Plausibility returned when a predicted crossing disagrees with the sensor
pub const LINE_MISMATCH_LIKELIHOOD: f64 = 0.1;
/// Floor on any modeled standard deviation (m)
const MIN_STD: f64 = 0.005;

/// Generic sensor model trait used by the particle filter.
pub trait SensorModel: Send {
    /// Short name used in log messages
    fn name(&self) -> &str;
    /// Refresh the cached reading. Called exactly once per correction, before any likelihood queries.
    fn update(&mut self);
    /// Unnormalized plausibility of the cached reading given a hypothesized robot pose, or `None`
    /// when the sensor has no information this cycle.
    fn predict_likelihood(&self, pose: &Pose) -> Option<f64>;
}

fn default_scale() -> f64 {
    1.0
}
fn default_max_range() -> f64 {
    DEFAULT_MAX_RANGE
}
fn default_max_error() -> f64 {
    GPS_MAX_ERROR
}
fn default_std_scale() -> f64 {
    GPS_STD_SCALE
}
fn default_threshold() -> u32 {
    LINE_SENSOR_THRESHOLD
}
fn default_tolerance() -> f64 {
    LINE_SENSOR_TOLERANCE
}
fn default_mismatch() -> f64 {
    LINE_MISMATCH_LIKELIHOOD
}

//================= Range sensor ===================================================================
/// Mounting and tuning of a range sensor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceSensorConfig {
    /// Sensor position and bearing relative to the robot's tracking center
    pub offset: Pose,
    /// Predictions are capped at this range (m)
    #[serde(default = "default_max_range")]
    pub max_range: f64,
    /// Multiplier applied to every likelihood this sensor returns
    #[serde(default = "default_scale")]
    pub likelihood_scale: f64,
}
impl Default for DistanceSensorConfig {
    fn default() -> Self {
        DistanceSensorConfig {
            offset: Pose::default(),
            max_range: DEFAULT_MAX_RANGE,
            likelihood_scale: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct RangeReading {
    measured: f64,
    std: f64,
}

/// Range sensor model predicting the distance to the nearest wall along the sensor's bearing.
///
/// The expected reading comes from [`FieldGeometry::raycast`]: the secant projection onto the four
/// boundary walls, the nearest interior wall, capped at the sensor's maximum range. The spread of the
/// likelihood grows with the measured distance and shrinks with the reported confidence.
pub struct DistanceSensorModel<H: RangeHardware> {
    hardware: H,
    field: Arc<FieldGeometry>,
    config: DistanceSensorConfig,
    reading: Option<RangeReading>,
}
impl<H: RangeHardware> Debug for DistanceSensorModel<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistanceSensorModel")
            .field("config", &self.config)
            .field("reading", &self.reading)
            .finish()
    }
}
impl<H: RangeHardware> DistanceSensorModel<H> {
    pub fn new(hardware: H, field: Arc<FieldGeometry>, config: DistanceSensorConfig) -> Self {
        DistanceSensorModel {
            hardware,
            field,
            config,
            reading: None,
        }
    }
    pub fn config(&self) -> &DistanceSensorConfig {
        &self.config
    }
    /// Cached measured distance (m), if the last update produced a valid reading
    pub fn measured(&self) -> Option<f64> {
        self.reading.map(|r| r.measured)
    }
    /// Distance the sensor should read if the robot were at `pose`
    pub fn expected_distance(&self, pose: &Pose) -> f64 {
        let sensor = pose.compose(&self.config.offset);
        self.field
            .raycast(&sensor.position(), sensor.heading, self.config.max_range)
    }
    fn read(&self) -> Option<RangeReading> {
        let distance = self.hardware.distance_mm().ok()?;
        let object_size = self.hardware.object_size().ok()?;
        let confidence = self.hardware.confidence().ok()?;
        if distance == NO_OBJECT_MM || object_size < MIN_OBJECT_SIZE || confidence == 0 {
            return None;
        }
        let measured = distance as f64 / 1000.0;
        if !(measured <= self.config.max_range) {
            return None;
        }
        let std = DISTANCE_STD_RATIO * measured / (confidence as f64 / CONFIDENCE_FULL_SCALE);
        Some(RangeReading {
            measured,
            std: std.max(MIN_STD),
        })
    }
}
impl<H: RangeHardware> SensorModel for DistanceSensorModel<H> {
    fn name(&self) -> &str {
        "distance"
    }
    fn update(&mut self) {
        self.reading = self.read();
        if self.reading.is_none() {
            log::trace!("distance sensor has no valid reading this cycle");
        }
    }
    fn predict_likelihood(&self, pose: &Pose) -> Option<f64> {
        let reading = self.reading?;
        let predicted = self.expected_distance(pose);
        let z = (reading.measured - predicted) / reading.std;
        Some(self.config.likelihood_scale * cheap_norm_pdf(z))
    }
}

//================= Absolute positioning ===========================================================
/// Mounting and tuning of an absolute positioning sensor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsSensorConfig {
    /// Mounting yaw of the sensor relative to the robot (rad)
    #[serde(default)]
    pub heading_offset: f64,
    /// Readings with a larger reported error are ignored (m)
    #[serde(default = "default_max_error")]
    pub max_error: f64,
    /// Spread of the likelihood as a multiple of the reported error
    #[serde(default = "default_std_scale")]
    pub std_scale: f64,
    #[serde(default = "default_scale")]
    pub likelihood_scale: f64,
}
impl Default for GpsSensorConfig {
    fn default() -> Self {
        GpsSensorConfig {
            heading_offset: 0.0,
            max_error: GPS_MAX_ERROR,
            std_scale: GPS_STD_SCALE,
            likelihood_scale: 1.0,
        }
    }
}

/// Convert a position reported in the GPS frame into the field frame.
///
/// The GPS frame is rotated a quarter turn clockwise from the field frame.
pub fn gps_to_field(x: f64, y: f64) -> Vector2<f64> {
    Vector2::new(-y, x)
}

/// Absolute heading derived from a GPS yaw reading (degrees, clockwise) and the mounting offset.
pub fn gps_heading(yaw_degrees: f64, heading_offset: f64) -> f64 {
    -yaw_degrees.to_radians() - heading_offset
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct GpsReading {
    position: Vector2<f64>,
    std: f64,
}

/// Absolute positioning model.
///
/// The likelihood uses the L1 distance between the particle and the reported point, scaled by the
/// reported error. It avoids a square root per particle and is close enough to the Euclidean residual
/// for weighting.
pub struct GpsSensorModel<H: GpsHardware> {
    hardware: H,
    config: GpsSensorConfig,
    reading: Option<GpsReading>,
}
impl<H: GpsHardware> Debug for GpsSensorModel<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpsSensorModel")
            .field("config", &self.config)
            .field("reading", &self.reading)
            .finish()
    }
}
impl<H: GpsHardware> GpsSensorModel<H> {
    pub fn new(hardware: H, config: GpsSensorConfig) -> Self {
        GpsSensorModel {
            hardware,
            config,
            reading: None,
        }
    }
    /// Cached reported position in the field frame
    pub fn reported_position(&self) -> Option<Vector2<f64>> {
        self.reading.map(|r| r.position)
    }
    /// Absolute robot heading from the sensor's yaw; NaN if the sensor cannot be read.
    pub fn heading(&self) -> f64 {
        if !self.hardware.is_installed() {
            return f64::NAN;
        }
        match self.hardware.yaw() {
            Ok(yaw) => gps_heading(yaw, self.config.heading_offset),
            Err(_) => f64::NAN,
        }
    }
    fn read(&self) -> Option<GpsReading> {
        if !self.hardware.is_installed() {
            return None;
        }
        let error = self.hardware.error().ok()?;
        if !(error <= self.config.max_error) {
            return None;
        }
        let (x, y) = self.hardware.position().ok()?;
        Some(GpsReading {
            position: gps_to_field(x, y),
            std: (error * self.config.std_scale).max(MIN_STD),
        })
    }
}
impl<H: GpsHardware> SensorModel for GpsSensorModel<H> {
    fn name(&self) -> &str {
        "gps"
    }
    fn update(&mut self) {
        self.reading = self.read();
        if self.reading.is_none() {
            log::trace!("gps sensor has no valid reading this cycle");
        }
    }
    fn predict_likelihood(&self, pose: &Pose) -> Option<f64> {
        let reading = self.reading?;
        let residual = (pose.x - reading.position.x).abs() + (pose.y - reading.position.y).abs();
        Some(self.config.likelihood_scale * cheap_norm_pdf(residual / reading.std))
    }
}

/// Heading source backed by a GPS yaw reading.
///
/// Shares the device with a [`GpsSensorModel`] through an `Arc` handle.
pub struct GpsHeading<H: GpsHardware> {
    hardware: H,
    heading_offset: f64,
}
impl<H: GpsHardware> GpsHeading<H> {
    pub fn new(hardware: H, heading_offset: f64) -> Self {
        GpsHeading {
            hardware,
            heading_offset,
        }
    }
}
impl<H: GpsHardware> HeadingSource for GpsHeading<H> {
    fn heading(&mut self) -> f64 {
        if !self.hardware.is_installed() {
            return f64::NAN;
        }
        self.hardware
            .yaw()
            .map(|yaw| gps_heading(yaw, self.heading_offset))
            .unwrap_or(f64::NAN)
    }
}

//================= Line sensor ====================================================================
/// Mounting and tuning of a line sensor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSensorConfig {
    /// Sensor position relative to the robot's tracking center (m)
    pub offset: [f64; 2],
    /// Raw reflectance above which the sensor reports a line
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Distance from a line under which a crossing is predicted (m)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Plausibility of a disagreeing prediction; kept above zero
    #[serde(default = "default_mismatch")]
    pub mismatch_likelihood: f64,
    #[serde(default = "default_scale")]
    pub likelihood_scale: f64,
}
impl Default for LineSensorConfig {
    fn default() -> Self {
        LineSensorConfig {
            offset: [0.0, 0.0],
            threshold: LINE_SENSOR_THRESHOLD,
            tolerance: LINE_SENSOR_TOLERANCE,
            mismatch_likelihood: LINE_MISMATCH_LIKELIHOOD,
            likelihood_scale: 1.0,
        }
    }
}

/// Binary line-crossing model.
///
/// A single binary sensor is noisy, so a disagreement between prediction and reading only scales the
/// weight down instead of zeroing it.
pub struct LineSensorModel<H: ReflectanceHardware> {
    hardware: H,
    field: Arc<FieldGeometry>,
    config: LineSensorConfig,
    over_line: Option<bool>,
}
impl<H: ReflectanceHardware> Debug for LineSensorModel<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineSensorModel")
            .field("config", &self.config)
            .field("over_line", &self.over_line)
            .finish()
    }
}
impl<H: ReflectanceHardware> LineSensorModel<H> {
    pub fn new(hardware: H, field: Arc<FieldGeometry>, config: LineSensorConfig) -> Self {
        LineSensorModel {
            hardware,
            field,
            config,
            over_line: None,
        }
    }
    /// Cached reading from the last update
    pub fn over_line(&self) -> Option<bool> {
        self.over_line
    }
    /// Whether the sensor should be over a line if the robot were at `pose`; `None` if the field has
    /// no lines.
    pub fn predicts_crossing(&self, pose: &Pose) -> Option<bool> {
        let offset = Vector2::new(self.config.offset[0], self.config.offset[1]);
        let sensor = pose.transform_point(&offset);
        self.field
            .nearest_line_distance(sensor.y)
            .map(|distance| distance < self.config.tolerance)
    }
}
impl<H: ReflectanceHardware> SensorModel for LineSensorModel<H> {
    fn name(&self) -> &str {
        "line"
    }
    fn update(&mut self) {
        self.over_line = self
            .hardware
            .reflectance()
            .ok()
            .map(|value| value > self.config.threshold);
    }
    fn predict_likelihood(&self, pose: &Pose) -> Option<f64> {
        let measured = self.over_line?;
        let predicted = self.predicts_crossing(pose)?;
        let plausibility = if predicted == measured {
            1.0
        } else {
            self.config.mismatch_likelihood
        };
        Some(self.config.likelihood_scale * plausibility)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldBounds;
    use crate::hardware::HardwareError;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::FRAC_PI_2;

    const EPS: f64 = 1e-9;

    struct FixedRange {
        distance: u32,
        size: u32,
        confidence: u32,
    }
    impl RangeHardware for FixedRange {
        fn distance_mm(&self) -> Result<u32, HardwareError> {
            Ok(self.distance)
        }
        fn object_size(&self) -> Result<u32, HardwareError> {
            Ok(self.size)
        }
        fn confidence(&self) -> Result<u32, HardwareError> {
            Ok(self.confidence)
        }
    }
    struct BrokenRange;
    impl RangeHardware for BrokenRange {
        fn distance_mm(&self) -> Result<u32, HardwareError> {
            Err(HardwareError::Timeout)
        }
        fn object_size(&self) -> Result<u32, HardwareError> {
            Ok(100)
        }
        fn confidence(&self) -> Result<u32, HardwareError> {
            Ok(63)
        }
    }
    struct FixedGps {
        installed: bool,
        position: (f64, f64),
        error: f64,
        yaw: f64,
    }
    impl GpsHardware for FixedGps {
        fn is_installed(&self) -> bool {
            self.installed
        }
        fn position(&self) -> Result<(f64, f64), HardwareError> {
            Ok(self.position)
        }
        fn error(&self) -> Result<f64, HardwareError> {
            Ok(self.error)
        }
        fn yaw(&self) -> Result<f64, HardwareError> {
            Ok(self.yaw)
        }
    }
    struct FixedReflectance(Result<u32, HardwareError>);
    impl ReflectanceHardware for FixedReflectance {
        fn reflectance(&self) -> Result<u32, HardwareError> {
            self.0.clone()
        }
    }

    fn unit_field() -> Arc<FieldGeometry> {
        Arc::new(FieldGeometry::new(FieldBounds::square(1.0), Vec::new(), vec![0.0]).unwrap())
    }
    fn range_model(distance: u32, size: u32, confidence: u32) -> DistanceSensorModel<FixedRange> {
        DistanceSensorModel::new(
            FixedRange {
                distance,
                size,
                confidence,
            },
            unit_field(),
            DistanceSensorConfig {
                max_range: 5.0,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_range_prediction_matches_secant() {
        let mut model = range_model(500, 100, 63);
        model.config.offset = Pose::new(0.1, 0.0, -FRAC_PI_2 + 20.0_f64.to_radians());
        let pose = Pose::new(0.2, -0.3, FRAC_PI_2);
        // sensor sits at (0.2, -0.2) looking 20 degrees left of +x, toward the east wall
        let expected = 0.8 / 20.0_f64.to_radians().cos();
        assert_approx_eq!(model.expected_distance(&pose), expected, EPS);
    }
    #[test]
    fn test_range_prediction_capped() {
        let mut model = range_model(500, 100, 63);
        model.config.max_range = 0.25;
        assert_approx_eq!(model.expected_distance(&Pose::new(0.0, 0.0, 0.0)), 0.25, EPS);
    }
    #[test]
    fn test_range_likelihood_peaks_at_expected() {
        let mut model = range_model(500, 100, 63);
        assert!(model.predict_likelihood(&Pose::default()).is_none());
        model.update();
        assert_approx_eq!(model.measured().unwrap(), 0.5, EPS);
        let at_truth = model.predict_likelihood(&Pose::new(0.5, 0.0, 0.0)).unwrap();
        assert_approx_eq!(at_truth, cheap_norm_pdf(0.0), EPS);
        let off = model.predict_likelihood(&Pose::new(0.4, 0.0, 0.0)).unwrap();
        assert!(off < at_truth);
        assert!(off > 0.0);
    }
    #[test]
    fn test_range_low_confidence_widens_tolerance() {
        let pose = Pose::new(0.4, 0.0, 0.0);
        let mut confident = range_model(500, 100, 63);
        let mut unsure = range_model(500, 100, 16);
        confident.update();
        unsure.update();
        assert!(unsure.predict_likelihood(&pose).unwrap() > confident.predict_likelihood(&pose).unwrap());
    }
    #[test]
    fn test_range_invalid_readings() {
        let pose = Pose::default();
        for (distance, size, confidence) in [(NO_OBJECT_MM, 100, 63), (500, 10, 63), (500, 100, 0)] {
            let mut model = range_model(distance, size, confidence);
            model.update();
            assert!(model.predict_likelihood(&pose).is_none());
        }
        let mut broken = DistanceSensorModel::new(BrokenRange, unit_field(), Default::default());
        broken.update();
        assert!(broken.predict_likelihood(&pose).is_none());
    }
    #[test]
    fn test_range_beyond_max_range_is_no_information() {
        let mut model = range_model(3000, 100, 63);
        model.config.max_range = 2.0;
        model.update();
        assert!(model.measured().is_none());
        assert!(model.predict_likelihood(&Pose::default()).is_none());
        // a reading exactly at the cap is still usable
        let mut at_cap = range_model(2000, 100, 63);
        at_cap.config.max_range = 2.0;
        at_cap.update();
        assert_approx_eq!(at_cap.measured().unwrap(), 2.0, EPS);
    }
    #[test]
    fn test_range_reading_recovers_after_invalid_cycle() {
        let mut model = range_model(NO_OBJECT_MM, 100, 63);
        model.update();
        assert!(model.measured().is_none());
        model.hardware.distance = 750;
        model.update();
        assert_approx_eq!(model.measured().unwrap(), 0.75, EPS);
    }

    fn gps(installed: bool, error: f64) -> GpsSensorModel<FixedGps> {
        GpsSensorModel::new(
            FixedGps {
                installed,
                position: (0.5, 0.25),
                error,
                yaw: 90.0,
            },
            GpsSensorConfig::default(),
        )
    }

    #[test]
    fn test_gps_frame_conversion() {
        let mut model = gps(true, 0.01);
        model.update();
        let point = model.reported_position().unwrap();
        assert_approx_eq!(point.x, -0.25, EPS);
        assert_approx_eq!(point.y, 0.5, EPS);
    }
    #[test]
    fn test_gps_likelihood_prefers_reported_point() {
        let mut model = gps(true, 0.01);
        model.update();
        let at = model.predict_likelihood(&Pose::new(-0.25, 0.5, 0.0)).unwrap();
        let near = model.predict_likelihood(&Pose::new(-0.2, 0.5, 0.0)).unwrap();
        let far = model.predict_likelihood(&Pose::new(0.5, -0.5, 0.0)).unwrap();
        assert_approx_eq!(at, cheap_norm_pdf(0.0), EPS);
        assert!(at > near && near > far);
        // the heading of the pose is irrelevant
        let turned = model.predict_likelihood(&Pose::new(-0.2, 0.5, 1.0)).unwrap();
        assert_approx_eq!(near, turned, EPS);
    }
    #[test]
    fn test_gps_invalid_when_not_installed_or_inaccurate() {
        let pose = Pose::default();
        let mut missing = gps(false, 0.01);
        missing.update();
        assert!(missing.predict_likelihood(&pose).is_none());
        assert!(missing.heading().is_nan());
        let mut noisy = gps(true, 0.02);
        noisy.update();
        assert!(noisy.predict_likelihood(&pose).is_none());
        let mut nan = gps(true, f64::NAN);
        nan.update();
        assert!(nan.predict_likelihood(&pose).is_none());
    }
    #[test]
    fn test_gps_heading_side_channel() {
        let model = gps(true, 0.01);
        assert_approx_eq!(model.heading(), -FRAC_PI_2, EPS);
        let mut source = GpsHeading::new(
            FixedGps {
                installed: true,
                position: (0.0, 0.0),
                error: 1.0,
                yaw: -45.0,
            },
            0.25,
        );
        assert_approx_eq!(source.heading(), 45.0_f64.to_radians() - 0.25, EPS);
    }

    fn line_model(reading: Result<u32, HardwareError>, offset: [f64; 2]) -> LineSensorModel<FixedReflectance> {
        LineSensorModel::new(
            FixedReflectance(reading),
            unit_field(),
            LineSensorConfig {
                offset,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_line_match_and_mismatch() {
        let mut model = line_model(Ok(3000), [0.0, 0.1]);
        model.update();
        assert_eq!(model.over_line(), Some(true));
        // sensor lands exactly on the line at y = 0
        let on_line = Pose::new(0.3, -0.1, 0.0);
        assert_eq!(model.predict_likelihood(&on_line), Some(1.0));
        // sensor lands well past the tolerance
        let off_line = Pose::new(0.3, -0.1 + 2.0 * LINE_SENSOR_TOLERANCE, 0.0);
        assert_eq!(model.predict_likelihood(&off_line), Some(LINE_MISMATCH_LIKELIHOOD));
    }
    #[test]
    fn test_line_offset_rotates_with_heading() {
        let mut model = line_model(Ok(3000), [0.1, 0.0]);
        model.update();
        // facing +y, the sensor 0.1 m ahead sits on the line
        let pose = Pose::new(0.0, -0.1, FRAC_PI_2);
        assert_eq!(model.predicts_crossing(&pose), Some(true));
        assert_eq!(model.predict_likelihood(&pose), Some(1.0));
        // facing +x it is 0.1 m from the line
        let pose = Pose::new(0.0, -0.1, 0.0);
        assert_eq!(model.predicts_crossing(&pose), Some(false));
    }
    #[test]
    fn test_line_off_reading_matches_off_prediction() {
        let mut model = line_model(Ok(1000), [0.0, 0.0]);
        model.update();
        assert_eq!(model.over_line(), Some(false));
        assert_eq!(model.predict_likelihood(&Pose::new(0.0, 0.5, 0.0)), Some(1.0));
        assert_eq!(
            model.predict_likelihood(&Pose::new(0.0, 0.0, 0.0)),
            Some(LINE_MISMATCH_LIKELIHOOD)
        );
    }
    #[test]
    fn test_line_failed_read_or_no_lines() {
        let mut model = line_model(Err(HardwareError::NotInstalled), [0.0, 0.0]);
        model.update();
        assert!(model.predict_likelihood(&Pose::default()).is_none());
        let field = Arc::new(FieldGeometry::new(FieldBounds::square(1.0), Vec::new(), Vec::new()).unwrap());
        let mut bare = LineSensorModel::new(FixedReflectance(Ok(3000)), field, Default::default());
        bare.update();
        assert!(bare.predict_likelihood(&Pose::default()).is_none());
    }
}
