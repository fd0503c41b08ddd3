//! Deterministic localization simulation.
//!
//! This module provides:
//! - Simulated hardware ([`SimRange`], [`SimGps`], [`SimReflectance`]) that reads a shared ground-truth
//!   pose and adds seeded noise
//! - A ground-truth robot ([`SimRobot`]) driving a closed loop of waypoints, and a drivetrain
//!   ([`SimDrivetrain`]) reporting its motion with wheel slip
//! - [`run_simulation`], which drives a fully configured filter against the simulated robot
//! - [`LocalizationRecord`] CSV import/export and a [`SimulationReport`] summary
//!
//! Every random draw comes from generators seeded from [`SimulationConfig::seed`] and the filter's own
//! seed, so a configuration always reproduces the same run.

use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{ConfigFile, LocalizationConfig, SensorConfig};
use crate::field::FieldGeometry;
use crate::hardware::{GpsHardware, HardwareError, RangeHardware, ReflectanceHardware};
use crate::measurements::{
    DistanceSensorConfig, DistanceSensorModel, GpsHeading, GpsSensorConfig, GpsSensorModel,
    LineSensorModel, NO_OBJECT_MM,
};
use crate::particle::{CorrectionOutcome, ParticleFilter, PoseHandle, StepOutcome};
use crate::runner::OdometrySource;
use crate::{LocalizationError, Pose};

/// Raw reflectance of a painted line
const LINE_REFLECTANCE: u32 = 3000;
/// Raw reflectance of bare field tiles
const TILE_REFLECTANCE: u32 = 400;
/// Distance under which a waypoint counts as reached (m)
const WAYPOINT_TOLERANCE: f64 = 1e-6;
/// Longest run, in filter cycles, a single simulation may record
pub const MAX_SIMULATION_CYCLES: u32 = 1_000_000;

fn default_duration() -> f64 {
    20.0
}
fn default_period() -> f64 {
    0.01
}
fn default_speed() -> f64 {
    0.5
}
fn default_waypoints() -> Vec<[f64; 2]> {
    vec![[-0.9, -0.9], [0.9, -0.9], [0.9, 0.9], [-0.9, 0.9]]
}
fn default_seed() -> u64 {
    1
}

/// How the particle cloud is seeded at the start of a run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initialization {
    /// Uniformly over the whole field (global localization)
    Uniform,
    /// Every particle at the robot's true start
    #[default]
    Known,
    /// Normally scattered around the robot's true start
    Normal { std: f64 },
}

/// Noise levels of the simulated hardware
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimNoiseConfig {
    /// Range noise as a fraction of the true distance
    pub range_std_ratio: f64,
    /// Confidence the simulated range sensor reports (0 to 63)
    pub range_confidence: u32,
    /// Error metric the simulated GPS reports (m)
    pub gps_error: f64,
    /// Actual position noise of the simulated GPS (m)
    pub gps_position_std: f64,
    /// Yaw noise of the simulated GPS (degrees)
    pub gps_yaw_std_deg: f64,
    /// Spread of raw reflectance readings around their nominal values
    pub reflectance_jitter: u32,
    /// Wheel slip as a fraction of the true arc length
    pub odometry_slip_std: f64,
}
impl Default for SimNoiseConfig {
    fn default() -> Self {
        SimNoiseConfig {
            range_std_ratio: 0.01,
            range_confidence: 63,
            gps_error: 0.005,
            gps_position_std: 0.005,
            gps_yaw_std_deg: 0.25,
            reflectance_jitter: 200,
            odometry_slip_std: 0.05,
        }
    }
}

/// Full description of a simulation run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub localization: LocalizationConfig,
    /// Length of the run (s)
    #[serde(default = "default_duration")]
    pub duration: f64,
    /// Filter cycle period (s)
    #[serde(default = "default_period")]
    pub period: f64,
    /// Ground-truth path, driven in a closed loop starting at the first waypoint (m)
    #[serde(default = "default_waypoints")]
    pub waypoints: Vec<[f64; 2]>,
    /// Ground-truth driving speed (m/s)
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub initialization: Initialization,
    #[serde(default)]
    pub noise: SimNoiseConfig,
    /// Seed of the simulated hardware and wheel slip
    #[serde(default = "default_seed")]
    pub seed: u64,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        let localization = LocalizationConfig {
            sensors: vec![
                SensorConfig::Gps(GpsSensorConfig::default()),
                SensorConfig::Distance(DistanceSensorConfig {
                    offset: Pose::new(0.1, 0.0, 0.0),
                    ..Default::default()
                }),
                SensorConfig::Distance(DistanceSensorConfig {
                    offset: Pose::new(0.0, 0.1, std::f64::consts::FRAC_PI_2),
                    ..Default::default()
                }),
                SensorConfig::Line(Default::default()),
            ],
            ..Default::default()
        };
        SimulationConfig {
            localization,
            duration: default_duration(),
            period: default_period(),
            waypoints: default_waypoints(),
            speed: default_speed(),
            initialization: Initialization::default(),
            noise: SimNoiseConfig::default(),
            seed: default_seed(),
        }
    }
}
impl ConfigFile for SimulationConfig {}

fn normal(name: &'static str, std: f64) -> Result<Normal<f64>, LocalizationError> {
    Normal::new(0.0, std).map_err(|_| LocalizationError::InvalidParameter { name, value: std })
}

fn lock_rng(rng: &Mutex<StdRng>) -> std::sync::MutexGuard<'_, StdRng> {
    match rng.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

//================= Simulated hardware =============================================================
/// Range sensor reading the true distance to the nearest wall
#[derive(Debug)]
pub struct SimRange {
    truth: PoseHandle,
    field: Arc<FieldGeometry>,
    mount: Pose,
    max_range: f64,
    std_ratio: f64,
    confidence: u32,
    rng: Mutex<StdRng>,
}
impl SimRange {
    pub fn new(
        truth: PoseHandle,
        field: Arc<FieldGeometry>,
        config: &DistanceSensorConfig,
        noise: &SimNoiseConfig,
        seed: u64,
    ) -> Self {
        SimRange {
            truth,
            field,
            mount: config.offset,
            max_range: config.max_range,
            std_ratio: noise.range_std_ratio,
            confidence: noise.range_confidence,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
    /// Noise-free distance from the current true pose (m)
    pub fn true_distance(&self) -> f64 {
        let sensor = self.truth.get().compose(&self.mount);
        self.field
            .raycast(&sensor.position(), sensor.heading, f64::INFINITY)
    }
}
impl RangeHardware for SimRange {
    fn distance_mm(&self) -> Result<u32, HardwareError> {
        let distance = self.true_distance();
        if !(distance < self.max_range) {
            return Ok(NO_OBJECT_MM);
        }
        let noise = normal("range_std_ratio", self.std_ratio * distance)
            .map_err(|e| HardwareError::ReadFailed(e.to_string()))?;
        let measured = distance + noise.sample(&mut *lock_rng(&self.rng));
        Ok((measured.max(0.0) * 1000.0).round() as u32)
    }
    fn object_size(&self) -> Result<u32, HardwareError> {
        Ok(400)
    }
    fn confidence(&self) -> Result<u32, HardwareError> {
        Ok(self.confidence)
    }
}

/// Absolute positioning sensor mounted at the tracking center
#[derive(Debug)]
pub struct SimGps {
    truth: PoseHandle,
    heading_offset: f64,
    error: f64,
    position_noise: Normal<f64>,
    yaw_noise: Normal<f64>,
    rng: Mutex<StdRng>,
}
impl SimGps {
    pub fn new(
        truth: PoseHandle,
        config: &GpsSensorConfig,
        noise: &SimNoiseConfig,
        seed: u64,
    ) -> Result<Self, LocalizationError> {
        Ok(SimGps {
            truth,
            heading_offset: config.heading_offset,
            error: noise.gps_error,
            position_noise: normal("gps_position_std", noise.gps_position_std)?,
            yaw_noise: normal("gps_yaw_std_deg", noise.gps_yaw_std_deg)?,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }
}
impl GpsHardware for SimGps {
    fn is_installed(&self) -> bool {
        true
    }
    fn position(&self) -> Result<(f64, f64), HardwareError> {
        let truth = self.truth.get();
        let mut rng = lock_rng(&self.rng);
        let x = truth.x + self.position_noise.sample(&mut *rng);
        let y = truth.y + self.position_noise.sample(&mut *rng);
        // inverse of the quarter turn applied by the sensor model
        Ok((y, -x))
    }
    fn error(&self) -> Result<f64, HardwareError> {
        Ok(self.error)
    }
    fn yaw(&self) -> Result<f64, HardwareError> {
        let truth = self.truth.get();
        let yaw = -(truth.heading + self.heading_offset).to_degrees();
        Ok(yaw + self.yaw_noise.sample(&mut *lock_rng(&self.rng)))
    }
}

/// Reflectance sensor reporting a bright value over painted lines
#[derive(Debug)]
pub struct SimReflectance {
    truth: PoseHandle,
    field: Arc<FieldGeometry>,
    offset: Vector2<f64>,
    tolerance: f64,
    jitter: u32,
    rng: Mutex<StdRng>,
}
impl SimReflectance {
    pub fn new(
        truth: PoseHandle,
        field: Arc<FieldGeometry>,
        offset: [f64; 2],
        tolerance: f64,
        noise: &SimNoiseConfig,
        seed: u64,
    ) -> Self {
        SimReflectance {
            truth,
            field,
            offset: Vector2::new(offset[0], offset[1]),
            tolerance,
            jitter: noise.reflectance_jitter,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}
impl ReflectanceHardware for SimReflectance {
    fn reflectance(&self) -> Result<u32, HardwareError> {
        let sensor = self.truth.get().transform_point(&self.offset);
        let on_line = self
            .field
            .nearest_line_distance(sensor.y)
            .is_some_and(|d| d < self.tolerance);
        let nominal = if on_line {
            LINE_REFLECTANCE
        } else {
            TILE_REFLECTANCE
        };
        let low = nominal.saturating_sub(self.jitter);
        let high = nominal.saturating_add(self.jitter);
        Ok(lock_rng(&self.rng).random_range(low..=high))
    }
}

//================= Ground truth ===================================================================
/// Ground-truth robot driving a closed waypoint loop at constant speed.
///
/// The robot turns in place toward the next waypoint, so its heading is always the direction of travel.
#[derive(Clone, Debug)]
pub struct SimRobot {
    waypoints: Vec<Vector2<f64>>,
    target: usize,
    speed: f64,
    pose: Pose,
}
impl SimRobot {
    pub fn new(waypoints: &[[f64; 2]], speed: f64) -> Result<Self, LocalizationError> {
        if !(speed >= 0.0 && speed.is_finite()) {
            return Err(LocalizationError::InvalidParameter {
                name: "speed",
                value: speed,
            });
        }
        let waypoints: Vec<Vector2<f64>> = waypoints
            .iter()
            .map(|[x, y]| Vector2::new(*x, *y))
            .collect();
        let Some(start) = waypoints.first().copied() else {
            return Err(LocalizationError::InvalidParameter {
                name: "waypoints",
                value: 0.0,
            });
        };
        let target = if waypoints.len() > 1 { 1 } else { 0 };
        let to_target = waypoints[target] - start;
        let heading = if to_target.norm() > WAYPOINT_TOLERANCE {
            to_target.y.atan2(to_target.x)
        } else {
            0.0
        };
        Ok(SimRobot {
            waypoints,
            target,
            speed,
            pose: Pose::new(start.x, start.y, heading),
        })
    }
    pub fn pose(&self) -> Pose {
        self.pose
    }
    /// Drive for `dt` seconds and return the distance actually travelled (m).
    pub fn advance(&mut self, dt: f64) -> f64 {
        let mut remaining = self.speed * dt;
        let mut travelled = 0.0;
        // bounded by the number of waypoints so a degenerate loop cannot spin forever
        for _ in 0..=self.waypoints.len() {
            if remaining <= 0.0 {
                break;
            }
            let to_target = self.waypoints[self.target] - self.pose.position();
            let gap = to_target.norm();
            if gap <= WAYPOINT_TOLERANCE {
                self.target = (self.target + 1) % self.waypoints.len();
                continue;
            }
            self.pose.heading = to_target.y.atan2(to_target.x);
            let step = remaining.min(gap);
            let position = self.pose.position() + to_target * (step / gap);
            self.pose.x = position.x;
            self.pose.y = position.y;
            remaining -= step;
            travelled += step;
        }
        travelled
    }
}

/// Simulated drivetrain.
///
/// Each call drives the ground-truth robot for one period, publishes the new true pose and reports the
/// travelled arc length corrupted by wheel slip.
#[derive(Debug)]
pub struct SimDrivetrain {
    robot: SimRobot,
    truth: PoseHandle,
    period: f64,
    slip: Normal<f64>,
    rng: StdRng,
}
impl SimDrivetrain {
    pub fn new(
        robot: SimRobot,
        truth: PoseHandle,
        period: f64,
        slip_std: f64,
        seed: u64,
    ) -> Result<Self, LocalizationError> {
        truth.set(robot.pose());
        Ok(SimDrivetrain {
            robot,
            truth,
            period,
            slip: normal("odometry_slip_std", slip_std)?,
            rng: StdRng::seed_from_u64(seed),
        })
    }
    pub fn robot(&self) -> &SimRobot {
        &self.robot
    }
    /// Drive one period and return the measured arc length (m).
    pub fn drive(&mut self) -> f64 {
        let arc_length = self.robot.advance(self.period);
        self.truth.set(self.robot.pose());
        arc_length * (1.0 + self.slip.sample(&mut self.rng))
    }
}
impl OdometrySource for SimDrivetrain {
    fn arc_length(&mut self) -> f64 {
        self.drive()
    }
}

//================= Records ========================================================================
/// One filter cycle of a simulation run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalizationRecord {
    /// Simulation time (s)
    pub time: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub true_heading: f64,
    pub estimate_x: f64,
    pub estimate_y: f64,
    pub estimate_heading: f64,
    /// Planar distance between the estimate and the truth (m)
    pub error: f64,
    /// Spread of the particle cloud: RMS distance of the particles from their mean (m)
    pub spread: f64,
    pub outcome: String,
}
impl LocalizationRecord {
    /// Read records from a CSV file.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, csv::Error> {
        let mut reader = csv::Reader::from_path(path)?;
        reader.deserialize().collect()
    }
    /// Write records to a CSV file with a header row.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Summary statistics of a simulation run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub cycles: usize,
    pub resampled: usize,
    pub degenerate: usize,
    pub no_information: usize,
    pub heading_rejected: usize,
    /// Root mean square position error over the run (m)
    pub rms_error: f64,
    pub max_error: f64,
    pub final_error: f64,
}
impl SimulationReport {
    pub fn from_records(records: &[LocalizationRecord]) -> Self {
        let mut report = SimulationReport {
            cycles: records.len(),
            ..Default::default()
        };
        let mut sum_squared = 0.0;
        for record in records {
            match record.outcome.as_str() {
                "resampled" => report.resampled += 1,
                "degenerate_weights" => report.degenerate += 1,
                "no_information" => report.no_information += 1,
                "heading_rejected" => report.heading_rejected += 1,
                _ => {}
            }
            sum_squared += record.error * record.error;
            report.max_error = report.max_error.max(record.error);
        }
        if !records.is_empty() {
            report.rms_error = (sum_squared / records.len() as f64).sqrt();
        }
        report.final_error = records.last().map_or(0.0, |r| r.error);
        report
    }
}
impl Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cycles:            {}", self.cycles)?;
        writeln!(f, "corrections:       {}", self.resampled)?;
        writeln!(f, "degenerate:        {}", self.degenerate)?;
        writeln!(f, "no information:    {}", self.no_information)?;
        writeln!(f, "heading rejected:  {}", self.heading_rejected)?;
        writeln!(f, "rms error:         {:.4} m", self.rms_error)?;
        writeln!(f, "max error:         {:.4} m", self.max_error)?;
        write!(f, "final error:       {:.4} m", self.final_error)
    }
}

/// Records and summary of a completed run
#[derive(Clone, Debug)]
pub struct SimulationResult {
    pub records: Vec<LocalizationRecord>,
    pub report: SimulationReport,
    /// Final particle positions
    pub particles: Vec<Vector2<f64>>,
}

//================= Driver =========================================================================
fn particle_spread(particles: &[Vector2<f64>], mean: &Vector2<f64>) -> f64 {
    let sum: f64 = particles.iter().map(|p| (p - mean).norm_squared()).sum();
    (sum / particles.len() as f64).sqrt()
}

/// Build the filter and its sensors against simulated hardware that follows `truth`.
pub fn build_simulated_filter(
    config: &SimulationConfig,
    truth: &PoseHandle,
) -> Result<ParticleFilter, LocalizationError> {
    let localization = &config.localization;
    let field = localization.shared_field()?;
    let noise = &config.noise;
    // every device gets its own stream derived from the run seed
    let device_seed = |index: usize| config.seed.wrapping_add(1 + index as u64);

    let mut gps_devices = Vec::new();
    for (index, sensor) in localization.sensors.iter().enumerate() {
        if let SensorConfig::Gps(gps) = sensor {
            gps_devices.push(Arc::new(SimGps::new(truth.clone(), gps, noise, device_seed(index))?));
        }
    }

    let mut filter = match (localization.gps(), gps_devices.first()) {
        (Some(gps), Some(device)) => {
            let heading = GpsHeading::new(device.clone(), gps.heading_offset);
            localization.build_filter(field.clone(), heading)?
        }
        _ => {
            let truth = truth.clone();
            localization.build_filter(field.clone(), move || truth.get().heading)?
        }
    };

    let mut gps_devices = gps_devices.into_iter();
    for (index, sensor) in localization.sensors.iter().enumerate() {
        match sensor {
            SensorConfig::Distance(distance) => {
                let hardware = SimRange::new(truth.clone(), field.clone(), distance, noise, device_seed(index));
                filter.add_sensor(DistanceSensorModel::new(hardware, field.clone(), distance.clone()));
            }
            SensorConfig::Gps(gps) => {
                if let Some(device) = gps_devices.next() {
                    filter.add_sensor(GpsSensorModel::new(device, gps.clone()));
                }
            }
            SensorConfig::Line(line) => {
                let hardware = SimReflectance::new(
                    truth.clone(),
                    field.clone(),
                    line.offset,
                    line.tolerance,
                    noise,
                    device_seed(index),
                );
                filter.add_sensor(LineSensorModel::new(hardware, field.clone(), line.clone()));
            }
        }
    }
    Ok(filter)
}

/// Run a complete simulation.
///
/// Each cycle the ground-truth robot drives for one period, the drivetrain reports the travelled arc
/// length with simulated wheel slip and the filter steps on it. One [`LocalizationRecord`] is produced
/// per cycle.
///
/// # Errors
/// Fails if any part of the configuration is invalid, or if the run would exceed
/// [`MAX_SIMULATION_CYCLES`].
pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationResult, LocalizationError> {
    let period = Duration::try_from_secs_f64(config.period)
        .ok()
        .filter(|p| !p.is_zero())
        .ok_or(LocalizationError::InvalidParameter {
            name: "period",
            value: config.period,
        })?;
    if !(config.duration >= 0.0 && config.duration.is_finite()) {
        return Err(LocalizationError::InvalidParameter {
            name: "duration",
            value: config.duration,
        });
    }
    let cycles = (config.duration / config.period).round();
    if cycles > MAX_SIMULATION_CYCLES as f64 {
        return Err(LocalizationError::InvalidParameter {
            name: "duration",
            value: config.duration,
        });
    }
    let cycles = cycles as u32;

    let robot = SimRobot::new(&config.waypoints, config.speed)?;
    let truth = PoseHandle::new(robot.pose());
    let mut filter = build_simulated_filter(config, &truth)?;
    let mut odometry = config.localization.build_odometry_noise()?;
    let mut drivetrain = SimDrivetrain::new(
        robot,
        truth,
        config.period,
        config.noise.odometry_slip_std,
        config.seed,
    )?;

    let start = drivetrain.robot().pose().position();
    match &config.initialization {
        Initialization::Uniform => filter.init_uniform(),
        Initialization::Known => filter.init_at(start),
        Initialization::Normal { std } => filter.init_normal(start, *std)?,
    }
    log::info!(
        "simulating {} cycles with {} particles and {} sensors",
        cycles,
        filter.num_particles(),
        filter.num_sensors()
    );

    let mut records = Vec::with_capacity(cycles as usize);
    for i in 1..=cycles {
        let now = period * i;
        let measured = drivetrain.drive();
        let outcome = filter.step_odometry(now, measured, &mut odometry);
        if let StepOutcome::Corrected(CorrectionOutcome::DegenerateWeights) = outcome {
            log::debug!("degenerate correction at {:?}", now);
        }

        let actual = drivetrain.robot().pose();
        let estimate = filter.compute_prediction();
        records.push(LocalizationRecord {
            time: now.as_secs_f64(),
            true_x: actual.x,
            true_y: actual.y,
            true_heading: actual.heading,
            estimate_x: estimate.x,
            estimate_y: estimate.y,
            estimate_heading: estimate.heading,
            error: estimate.distance_to(&actual),
            spread: particle_spread(filter.particles(), &estimate.position()),
            outcome: outcome.to_string(),
        });
    }

    let report = SimulationReport::from_records(&records);
    log::info!(
        "simulation finished: rms error {:.4} m, final error {:.4} m",
        report.rms_error,
        report.final_error
    );
    Ok(SimulationResult {
        records,
        report,
        particles: filter.particles().to_vec(),
    })
}
