//! Monte Carlo localization particle filter.
//!
//! The filter keeps a fixed number of planar position hypotheses (particles). Heading is not part of the
//! particle state; it is read once per cycle from a single [`HeadingSource`] shared by the whole cloud.
//!
//! # Cycle
//!
//! 1. **Predict**: every particle is moved by an independently drawn noisy displacement supplied by the
//!    caller. If the heading source reports a non-finite heading the whole step is skipped.
//! 2. **Trigger**: a correction runs only once the robot has travelled more than the distance threshold
//!    *and* more than the time threshold has elapsed since the last correction.
//! 3. **Correct**: each sensor refreshes its reading, out-of-field particles are reinjected uniformly,
//!    each particle's weight is the product of the sensors' likelihoods and the cloud is resampled with
//!    low-variance systematic resampling. The mean of the new cloud plus the current heading is
//!    published through a [`PoseHandle`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use loco::field::FieldGeometry;
//! use loco::particle::{FilterConfig, ParticleFilter, StepOutcome};
//! use nalgebra::Vector2;
//!
//! let field = Arc::new(FieldGeometry::default());
//! let config = FilterConfig {
//!     num_particles: 100,
//!     ..Default::default()
//! };
//! let mut pf = ParticleFilter::new(config, field, || 0.0).unwrap();
//! pf.init_uniform();
//!
//! let outcome = pf.step(Duration::from_millis(10), || Vector2::new(0.005, 0.0));
//! assert_eq!(outcome, StepOutcome::Predicted);
//! assert_eq!(pf.num_particles(), 100);
//! ```

use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::field::{FieldBounds, FieldGeometry};
use crate::measurements::SensorModel;
use crate::odometry::OdometryNoise;
use crate::{INCH, LocalizationError, Pose};

/// Hard upper bound on the particle count
pub const MAX_PARTICLES: usize = 10_000;
/// Above this particle count a 10 ms cycle is unlikely to be met on embedded hardware
pub const RECOMMENDED_MAX_PARTICLES: usize = 500;

fn default_num_particles() -> usize {
    100
}
fn default_distance_threshold() -> f64 {
    INCH
}
fn default_time_threshold() -> f64 {
    0.5
}
fn default_seed() -> u64 {
    42
}

/// Particle filter configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Number of particles, fixed for the life of the filter
    #[serde(default = "default_num_particles")]
    pub num_particles: usize,
    /// Distance the robot must travel before a correction (m)
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    /// Time that must elapse between corrections (s)
    #[serde(default = "default_time_threshold")]
    pub time_threshold: f64,
    /// Seed of the filter's random number generator
    #[serde(default = "default_seed")]
    pub seed: u64,
}
impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: default_num_particles(),
            distance_threshold: default_distance_threshold(),
            time_threshold: default_time_threshold(),
            seed: default_seed(),
        }
    }
}

/// Source of the robot's absolute heading (rad). A non-finite value means the heading is unusable.
pub trait HeadingSource: Send {
    fn heading(&mut self) -> f64;
}
impl<F: FnMut() -> f64 + Send> HeadingSource for F {
    fn heading(&mut self) -> f64 {
        self()
    }
}

/// Shared snapshot of a pose.
///
/// Writers replace the whole pose at once and readers copy it out, so a reader on another thread never
/// observes a half-written estimate.
#[derive(Clone, Debug, Default)]
pub struct PoseHandle {
    inner: Arc<RwLock<Pose>>,
}
impl PoseHandle {
    pub fn new(pose: Pose) -> Self {
        PoseHandle {
            inner: Arc::new(RwLock::new(pose)),
        }
    }
    pub fn get(&self) -> Pose {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
    pub fn set(&self, pose: Pose) {
        match self.inner.write() {
            Ok(mut guard) => *guard = pose,
            Err(poisoned) => *poisoned.into_inner() = pose,
        }
    }
}

/// Result of a correction attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// The cloud was reweighted and resampled, and a new estimate published
    Resampled,
    /// Every particle had zero weight; the cloud was left unchanged and the correction will be retried
    DegenerateWeights,
    /// No sensor had any information; the cloud was left unchanged and the correction will be retried
    NoInformation,
}

/// Result of one filter cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The heading source reported a non-finite heading; nothing was changed
    HeadingRejected,
    /// Particles were moved; the correction thresholds were not met
    Predicted,
    /// Particles were moved and a correction was attempted
    Corrected(CorrectionOutcome),
}

impl fmt::Display for CorrectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CorrectionOutcome::Resampled => "resampled",
            CorrectionOutcome::DegenerateWeights => "degenerate_weights",
            CorrectionOutcome::NoInformation => "no_information",
        };
        f.write_str(label)
    }
}
impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::HeadingRejected => f.write_str("heading_rejected"),
            StepOutcome::Predicted => f.write_str("predicted"),
            StepOutcome::Corrected(outcome) => fmt::Display::fmt(outcome, f),
        }
    }
}

/// Low-variance systematic resampling.
///
/// Selects `weights.len()` indices. Slot `i` targets the cumulative weight `i * step + offset`, where
/// `step` is the average weight and `offset` is drawn once from `[0, step)`. A single cursor walks
/// forward through the cumulative sum and never resets, so the whole pass is linear in the number of
/// particles. Particles with zero weight are never selected; the cursor stops at the last particle
/// with positive weight even when rounding pushes the final target past the cumulative total.
///
/// # Arguments
/// * `weights` - Unnormalized, non-negative weights
/// * `step` - Average weight, `sum(weights) / weights.len()`
/// * `offset` - Random offset in `[0, step)`
/// * `selected` - Output buffer, cleared and filled with the selected indices
pub fn systematic_resample(weights: &[f64], step: f64, offset: f64, selected: &mut Vec<usize>) {
    selected.clear();
    if weights.is_empty() {
        return;
    }
    let last = weights
        .iter()
        .rposition(|&w| w > 0.0)
        .unwrap_or(weights.len() - 1);
    let mut cursor = 0;
    let mut cumulative = weights[0];
    for i in 0..weights.len() {
        let target = i as f64 * step + offset;
        while cumulative <= target && cursor < last {
            cursor += 1;
            cumulative += weights[cursor];
        }
        selected.push(cursor);
    }
}

/// Monte Carlo localization filter over planar positions.
pub struct ParticleFilter {
    particles: Vec<Vector2<f64>>,
    weights: Vec<f64>,
    selected: Vec<usize>,
    candidates: Vec<Vector2<f64>>,
    sensors: Vec<Box<dyn SensorModel>>,
    heading_source: Box<dyn HeadingSource>,
    field: Arc<FieldGeometry>,
    config: FilterConfig,
    time_threshold: Duration,
    rng: StdRng,
    heading: f64,
    distance_since_update: f64,
    last_update: Duration,
    estimate: PoseHandle,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sensors: Vec<&str> = self.sensors.iter().map(|s| s.name()).collect();
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.particles.len())
            .field("sensors", &sensors)
            .field("heading", &self.heading)
            .field("distance_since_update", &self.distance_since_update)
            .field("last_update", &self.last_update)
            .field("estimate", &self.estimate.get())
            .finish()
    }
}
impl ParticleFilter {
    /// Create a filter with every particle at the origin.
    ///
    /// # Errors
    /// Fails if the particle count is zero or above [`MAX_PARTICLES`], if a threshold is negative or not
    /// finite, or if the field geometry is invalid.
    pub fn new<S: HeadingSource + 'static>(
        config: FilterConfig,
        field: Arc<FieldGeometry>,
        heading_source: S,
    ) -> Result<Self, LocalizationError> {
        let n = config.num_particles;
        if n == 0 || n > MAX_PARTICLES {
            return Err(LocalizationError::InvalidParticleCount {
                count: n,
                max: MAX_PARTICLES,
            });
        }
        if n > RECOMMENDED_MAX_PARTICLES {
            log::warn!(
                "{} particles exceeds the recommended maximum of {}; cycle time may overrun",
                n,
                RECOMMENDED_MAX_PARTICLES
            );
        }
        if !(config.distance_threshold >= 0.0 && config.distance_threshold.is_finite()) {
            return Err(LocalizationError::InvalidParameter {
                name: "distance_threshold",
                value: config.distance_threshold,
            });
        }
        let time_threshold = Duration::try_from_secs_f64(config.time_threshold).map_err(|_| {
            LocalizationError::InvalidParameter {
                name: "time_threshold",
                value: config.time_threshold,
            }
        })?;
        field.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(ParticleFilter {
            particles: vec![Vector2::zeros(); n],
            weights: vec![0.0; n],
            selected: Vec::with_capacity(n),
            candidates: Vec::with_capacity(n),
            sensors: Vec::new(),
            heading_source: Box::new(heading_source),
            field,
            config,
            time_threshold,
            rng,
            heading: 0.0,
            distance_since_update: 0.0,
            last_update: Duration::ZERO,
            estimate: PoseHandle::default(),
        })
    }
    /// Register a sensor model. Sensors are updated and queried in registration order.
    pub fn add_sensor<M: SensorModel + 'static>(&mut self, sensor: M) {
        log::debug!("registered {} sensor", sensor.name());
        self.sensors.push(Box::new(sensor));
    }
    pub fn add_boxed_sensor(&mut self, sensor: Box<dyn SensorModel>) {
        log::debug!("registered {} sensor", sensor.name());
        self.sensors.push(sensor);
    }
    /// Spread the particles uniformly over the whole field.
    pub fn init_uniform(&mut self) {
        let bounds = self.field.bounds;
        self.init_uniform_in(&bounds);
    }
    /// Spread the particles uniformly over `bounds`.
    pub fn init_uniform_in(&mut self, bounds: &FieldBounds) {
        for particle in self.particles.iter_mut() {
            *particle = bounds.sample_uniform(&mut self.rng);
        }
        self.publish();
    }
    /// Place every particle at a known position.
    pub fn init_at(&mut self, position: Vector2<f64>) {
        self.particles.fill(position);
        self.publish();
    }
    /// Scatter the particles normally around a position.
    pub fn init_normal(&mut self, position: Vector2<f64>, std: f64) -> Result<(), LocalizationError> {
        let normal = Normal::new(0.0, std)
            .map_err(|_| LocalizationError::InvalidParameter { name: "std", value: std })?;
        for particle in self.particles.iter_mut() {
            *particle = position + Vector2::new(normal.sample(&mut self.rng), normal.sample(&mut self.rng));
        }
        self.publish();
        Ok(())
    }
    /// Replace the particle set. The count must match the configured count.
    pub fn set_particles(&mut self, particles: Vec<Vector2<f64>>) -> Result<(), LocalizationError> {
        if particles.len() != self.particles.len() {
            return Err(LocalizationError::ParticleCountMismatch {
                expected: self.particles.len(),
                actual: particles.len(),
            });
        }
        self.particles = particles;
        self.publish();
        Ok(())
    }
    pub fn particles(&self) -> &[Vector2<f64>] {
        &self.particles
    }
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }
    pub fn num_sensors(&self) -> usize {
        self.sensors.len()
    }
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
    pub fn field(&self) -> &FieldGeometry {
        &self.field
    }
    /// Heading sampled at the last accepted predict step
    pub fn heading(&self) -> f64 {
        self.heading
    }
    /// Distance travelled since the last correction (m)
    pub fn distance_since_update(&self) -> f64 {
        self.distance_since_update
    }
    /// Timestamp of the last correction
    pub fn last_update(&self) -> Duration {
        self.last_update
    }
    /// The estimate published at the last correction (or initialization)
    pub fn estimate(&self) -> Pose {
        self.estimate.get()
    }
    /// A handle other threads can read the published estimate from
    pub fn pose_handle(&self) -> PoseHandle {
        self.estimate.clone()
    }
    /// Mean of the current particles and the current heading, computed now rather than published.
    pub fn compute_prediction(&self) -> Pose {
        (self.mean_position(), self.heading).into()
    }
    fn mean_position(&self) -> Vector2<f64> {
        let sum = self
            .particles
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + p);
        sum / self.particles.len() as f64
    }
    fn publish(&self) {
        self.estimate.set(self.compute_prediction());
    }
    /// Move every particle by its own draw from `displacement`.
    ///
    /// Returns `false` and leaves the filter untouched if the heading source reports a non-finite
    /// heading.
    pub fn predict<F: FnMut() -> Vector2<f64>>(&mut self, displacement: F) -> bool {
        if self.accept_heading().is_none() {
            return false;
        }
        self.translate(displacement);
        true
    }
    /// Move every particle by a noisy copy of an odometry arc length, along the heading sampled for this
    /// step.
    pub fn predict_odometry(&mut self, arc_length: f64, noise: &mut OdometryNoise) -> bool {
        let Some(heading) = self.accept_heading() else {
            return false;
        };
        self.translate(noise.sampler(arc_length, heading));
        true
    }
    fn accept_heading(&mut self) -> Option<f64> {
        let heading = self.heading_source.heading();
        if !heading.is_finite() {
            log::debug!("skipping predict: non-finite heading {}", heading);
            return None;
        }
        self.heading = heading;
        Some(heading)
    }
    fn translate<F: FnMut() -> Vector2<f64>>(&mut self, mut displacement: F) {
        let mut total = Vector2::zeros();
        for particle in self.particles.iter_mut() {
            let delta = displacement();
            *particle += delta;
            total += delta;
        }
        let travelled = (total / self.particles.len() as f64).norm();
        if travelled.is_finite() {
            self.distance_since_update += travelled;
        }
    }
    /// Whether both the distance and the time thresholds have been exceeded at `now`.
    pub fn should_correct(&self, now: Duration) -> bool {
        self.distance_since_update > self.config.distance_threshold
            && now.saturating_sub(self.last_update) > self.time_threshold
    }
    /// Run a full correction now, regardless of the thresholds.
    ///
    /// Weighting and resampling work on a staged copy of the cloud in which out-of-field particles are
    /// reinjected. The particle set only changes when the correction returns
    /// [`CorrectionOutcome::Resampled`].
    pub fn correct(&mut self, now: Duration) -> CorrectionOutcome {
        for sensor in self.sensors.iter_mut() {
            sensor.update();
        }
        let reinjected = self.stage_candidates();
        if reinjected > 0 {
            log::trace!("reinjected {} out-of-field particles", reinjected);
        }

        let heading = self.heading;
        let mut total = 0.0;
        let mut informed = false;
        for (particle, weight) in self.candidates.iter().zip(self.weights.iter_mut()) {
            let pose = Pose::new(particle.x, particle.y, heading);
            let mut w = 1.0;
            for sensor in self.sensors.iter() {
                let likelihood = sensor
                    .predict_likelihood(&pose)
                    .filter(|l| l.is_finite() && *l >= 0.0);
                if let Some(l) = likelihood {
                    w *= l;
                    informed = true;
                }
            }
            *weight = w;
            total += w;
        }

        if !informed {
            log::debug!("no sensor information this cycle; keeping particles");
            return CorrectionOutcome::NoInformation;
        }
        let step = total / self.particles.len() as f64;
        if !(step > 0.0 && step.is_finite()) {
            log::warn!(
                "degenerate particle weights (total {}); keeping particles and retrying next cycle",
                total
            );
            return CorrectionOutcome::DegenerateWeights;
        }
        let offset = self.rng.random_range(0.0..step);
        systematic_resample(&self.weights, step, offset, &mut self.selected);
        self.particles.clear();
        self.particles
            .extend(self.selected.iter().map(|&index| self.candidates[index]));

        self.publish();
        self.distance_since_update = 0.0;
        self.last_update = now;
        log::debug!("correction at {:?}: {}", now, self.estimate.get());
        CorrectionOutcome::Resampled
    }
    /// One filter cycle: predict, then correct if both thresholds are exceeded.
    pub fn step<F: FnMut() -> Vector2<f64>>(&mut self, now: Duration, displacement: F) -> StepOutcome {
        let predicted = self.predict(displacement);
        self.finish_step(now, predicted)
    }
    /// One filter cycle driven by an odometry arc length and its noise model.
    pub fn step_odometry(
        &mut self,
        now: Duration,
        arc_length: f64,
        noise: &mut OdometryNoise,
    ) -> StepOutcome {
        let predicted = self.predict_odometry(arc_length, noise);
        self.finish_step(now, predicted)
    }
    fn finish_step(&mut self, now: Duration, predicted: bool) -> StepOutcome {
        if !predicted {
            return StepOutcome::HeadingRejected;
        }
        if self.should_correct(now) {
            StepOutcome::Corrected(self.correct(now))
        } else {
            StepOutcome::Predicted
        }
    }
    /// Copy the cloud into the candidate buffer, drawing a fresh uniform position for every particle
    /// outside the field. Returns the number of reinjected particles.
    fn stage_candidates(&mut self) -> usize {
        let bounds = self.field.bounds;
        let mut count = 0;
        self.candidates.clear();
        for particle in self.particles.iter() {
            if bounds.contains(particle) {
                self.candidates.push(*particle);
            } else {
                self.candidates.push(bounds.sample_uniform(&mut self.rng));
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldBounds;
    use assert_approx_eq::assert_approx_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unit_field() -> Arc<FieldGeometry> {
        Arc::new(FieldGeometry::new(FieldBounds::square(1.0), Vec::new(), vec![0.0]).unwrap())
    }
    fn filter(n: usize) -> ParticleFilter {
        let config = FilterConfig {
            num_particles: n,
            ..Default::default()
        };
        ParticleFilter::new(config, unit_field(), || 0.0).unwrap()
    }

    /// Likelihood proportional to a Gaussian bump around a point
    struct Beacon {
        at: Vector2<f64>,
        updates: Arc<AtomicUsize>,
    }
    impl SensorModel for Beacon {
        fn name(&self) -> &str {
            "beacon"
        }
        fn update(&mut self) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
        fn predict_likelihood(&self, pose: &Pose) -> Option<f64> {
            let d = (pose.position() - self.at).norm();
            Some((-d * d / 0.02).exp())
        }
    }
    struct Silent;
    impl SensorModel for Silent {
        fn name(&self) -> &str {
            "silent"
        }
        fn update(&mut self) {}
        fn predict_likelihood(&self, _pose: &Pose) -> Option<f64> {
            None
        }
    }
    struct Constant(f64);
    impl SensorModel for Constant {
        fn name(&self) -> &str {
            "constant"
        }
        fn update(&mut self) {}
        fn predict_likelihood(&self, _pose: &Pose) -> Option<f64> {
            Some(self.0)
        }
    }

    #[test]
    fn test_construction_validates() {
        let field = unit_field();
        for n in [0, MAX_PARTICLES + 1] {
            let config = FilterConfig {
                num_particles: n,
                ..Default::default()
            };
            assert!(matches!(
                ParticleFilter::new(config, field.clone(), || 0.0),
                Err(LocalizationError::InvalidParticleCount { .. })
            ));
        }
        let config = FilterConfig {
            time_threshold: -1.0,
            ..Default::default()
        };
        assert!(ParticleFilter::new(config, field.clone(), || 0.0).is_err());
        let config = FilterConfig {
            distance_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(ParticleFilter::new(config, field, || 0.0).is_err());
    }
    #[test]
    fn test_particle_count_invariant() {
        for n in [1, 2, 17, 250] {
            let mut pf = filter(n);
            pf.add_sensor(Constant(0.5));
            pf.init_uniform();
            assert_eq!(pf.num_particles(), n);
            assert!(pf.predict(|| Vector2::new(0.01, 0.0)));
            assert_eq!(pf.num_particles(), n);
            assert_eq!(pf.correct(Duration::from_secs(1)), CorrectionOutcome::Resampled);
            assert_eq!(pf.num_particles(), n);
        }
    }
    #[test]
    fn test_translation_is_exact_without_noise() {
        let mut pf = filter(4);
        pf.init_at(Vector2::new(0.25, -0.5));
        let n = 12;
        for i in 0..n {
            let outcome = pf.step(Duration::from_millis(10 * i), || Vector2::new(0.0625, 0.03125));
            assert_eq!(outcome, StepOutcome::Predicted);
        }
        let pose = pf.compute_prediction();
        assert_eq!(pose.x, 0.25 + n as f64 * 0.0625);
        assert_eq!(pose.y, -0.5 + n as f64 * 0.03125);
        for p in pf.particles() {
            assert_eq!(p.x, 1.0);
            assert_eq!(p.y, -0.125);
        }
    }
    #[test]
    fn test_non_finite_heading_skips_predict() {
        let config = FilterConfig {
            num_particles: 8,
            ..Default::default()
        };
        let mut headings = vec![f64::NAN, f64::INFINITY, 0.5].into_iter();
        let mut pf = ParticleFilter::new(config, unit_field(), move || {
            headings.next().unwrap_or(0.5)
        })
        .unwrap();
        pf.init_at(Vector2::new(0.1, 0.1));
        assert_eq!(pf.step(Duration::ZERO, || Vector2::new(1.0, 1.0)), StepOutcome::HeadingRejected);
        assert_eq!(pf.step(Duration::ZERO, || Vector2::new(1.0, 1.0)), StepOutcome::HeadingRejected);
        assert!(pf.particles().iter().all(|p| *p == Vector2::new(0.1, 0.1)));
        assert_eq!(pf.distance_since_update(), 0.0);
        assert_eq!(pf.heading(), 0.0);
        assert!(pf.predict(|| Vector2::new(0.1, 0.0)));
        assert_eq!(pf.heading(), 0.5);
        assert_approx_eq!(pf.distance_since_update(), 0.1, 1e-12);
    }
    #[test]
    fn test_trigger_requires_distance_and_time() {
        let updates = Arc::new(AtomicUsize::new(0));
        let mut pf = filter(10);
        pf.add_sensor(Beacon {
            at: Vector2::zeros(),
            updates: updates.clone(),
        });
        pf.init_at(Vector2::zeros());
        // far enough but too soon
        let outcome = pf.step(Duration::from_millis(100), || Vector2::new(0.1, 0.0));
        assert_eq!(outcome, StepOutcome::Predicted);
        // late enough and far enough
        let outcome = pf.step(Duration::from_millis(600), || Vector2::new(0.0, 0.0));
        assert_eq!(outcome, StepOutcome::Corrected(CorrectionOutcome::Resampled));
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(pf.distance_since_update(), 0.0);
        assert_eq!(pf.last_update(), Duration::from_millis(600));
        // late enough but not far enough
        let outcome = pf.step(Duration::from_millis(2000), || Vector2::new(0.001, 0.0));
        assert_eq!(outcome, StepOutcome::Predicted);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }
    #[test]
    fn test_no_information_keeps_particles() {
        let mut pf = filter(50);
        pf.add_sensor(Silent);
        pf.add_sensor(Silent);
        pf.init_uniform();
        let before = pf.particles().to_vec();
        pf.predict(|| Vector2::new(0.1, 0.0));
        let moved = pf.particles().to_vec();
        assert_ne!(before, moved);
        assert_eq!(pf.correct(Duration::from_secs(1)), CorrectionOutcome::NoInformation);
        assert_eq!(pf.particles(), moved.as_slice());
        // counters are kept so the next cycle retries
        assert!(pf.distance_since_update() > 0.0);
    }
    #[test]
    fn test_zero_weights_keep_particles() {
        let mut pf = filter(50);
        pf.add_sensor(Constant(0.0));
        pf.add_sensor(Silent);
        pf.init_normal(Vector2::new(0.2, 0.2), 0.1).unwrap();
        let before = pf.particles().to_vec();
        let estimate = pf.estimate();
        pf.predict(|| Vector2::zeros());
        assert_eq!(pf.correct(Duration::from_secs(1)), CorrectionOutcome::DegenerateWeights);
        assert_eq!(pf.particles(), before.as_slice());
        assert_eq!(pf.estimate(), estimate);
    }
    #[test]
    fn test_aborted_correction_keeps_out_of_field_particles() {
        let cloud = vec![
            Vector2::new(5.0, 0.0),
            Vector2::new(0.1, 0.1),
            Vector2::new(0.2, 0.2),
        ];
        let mut silent = filter(3);
        silent.add_sensor(Silent);
        silent.set_particles(cloud.clone()).unwrap();
        assert_eq!(silent.correct(Duration::from_secs(1)), CorrectionOutcome::NoInformation);
        assert_eq!(silent.particles(), cloud.as_slice());

        let mut zero = filter(3);
        zero.add_sensor(Constant(0.0));
        zero.set_particles(cloud.clone()).unwrap();
        let estimate = zero.estimate();
        assert_eq!(zero.correct(Duration::from_secs(1)), CorrectionOutcome::DegenerateWeights);
        assert_eq!(zero.particles(), cloud.as_slice());
        assert_eq!(zero.estimate(), estimate);
        assert_eq!(zero.last_update(), Duration::ZERO);
    }
    #[test]
    fn test_no_sensors_is_no_information() {
        let mut pf = filter(5);
        pf.init_at(Vector2::new(0.3, 0.3));
        assert_eq!(pf.correct(Duration::from_secs(1)), CorrectionOutcome::NoInformation);
        assert!(pf.particles().iter().all(|p| *p == Vector2::new(0.3, 0.3)));
    }
    #[test]
    fn test_out_of_bounds_particles_reinjected() {
        let mut pf = filter(6);
        pf.add_sensor(Constant(1.0));
        let outside = vec![
            Vector2::new(5.0, 0.0),
            Vector2::new(0.0, -1.5),
            Vector2::new(0.5, 0.5),
            Vector2::new(-0.5, 0.5),
            Vector2::new(0.1, -0.2),
            Vector2::new(f64::NAN, 0.0),
        ];
        pf.set_particles(outside).unwrap();
        assert_eq!(pf.correct(Duration::from_secs(1)), CorrectionOutcome::Resampled);
        for p in pf.particles() {
            assert!(pf.field().contains(p), "{:?} left outside the field", p);
        }
    }
    #[test]
    fn test_correction_concentrates_on_likely_region() {
        let updates = Arc::new(AtomicUsize::new(0));
        let mut pf = filter(400);
        pf.add_sensor(Beacon {
            at: Vector2::new(0.5, -0.5),
            updates,
        });
        pf.add_sensor(Silent);
        pf.init_uniform();
        for i in 0..5 {
            pf.correct(Duration::from_secs(i));
        }
        let estimate = pf.estimate();
        assert!((estimate.x - 0.5).abs() < 0.15, "{}", estimate);
        assert!((estimate.y + 0.5).abs() < 0.15, "{}", estimate);
        assert_eq!(pf.pose_handle().get(), estimate);
    }
    #[test]
    fn test_same_seed_is_reproducible() {
        let run = || {
            let mut pf = filter(64);
            pf.add_sensor(Beacon {
                at: Vector2::new(-0.2, 0.4),
                updates: Arc::new(AtomicUsize::new(0)),
            });
            pf.init_uniform();
            pf.correct(Duration::from_secs(1));
            pf.particles().to_vec()
        };
        assert_eq!(run(), run());
    }
    #[test]
    fn test_set_particles_checks_length() {
        let mut pf = filter(3);
        assert_eq!(
            pf.set_particles(vec![Vector2::zeros(); 2]),
            Err(LocalizationError::ParticleCountMismatch {
                expected: 3,
                actual: 2
            })
        );
    }
    #[test]
    fn test_systematic_resample_uniform_weights_is_identity() {
        let weights = vec![0.25; 8];
        let mut selected = Vec::new();
        for offset in [0.0, 0.1, 0.2499] {
            systematic_resample(&weights, 0.25, offset, &mut selected);
            assert_eq!(selected, (0..8).collect::<Vec<_>>());
        }
    }
    #[test]
    fn test_systematic_resample_skips_zero_weights() {
        let weights = [0.0, 2.0, 0.0, 2.0];
        let mut selected = Vec::new();
        systematic_resample(&weights, 1.0, 0.0, &mut selected);
        assert_eq!(selected, vec![1, 1, 3, 3]);
        systematic_resample(&weights, 1.0, 0.999, &mut selected);
        assert_eq!(selected, vec![1, 1, 3, 3]);
    }
    #[test]
    fn test_systematic_resample_skips_trailing_zero_weight() {
        let weights = [1.0, 1.0, 0.0];
        let step = 2.0 / 3.0;
        let mut selected = Vec::new();
        // final target lands on the cumulative total
        systematic_resample(&weights, step, step, &mut selected);
        assert_eq!(selected, vec![0, 1, 1]);
        systematic_resample(&weights, step, step * (1.0 - 1e-12), &mut selected);
        assert!(!selected.contains(&2));
    }
    #[test]
    fn test_systematic_resample_is_monotone() {
        let weights = [0.1, 3.0, 0.5, 0.0, 1.2, 0.7, 2.5];
        let total: f64 = weights.iter().sum();
        let step = total / weights.len() as f64;
        let mut selected = Vec::new();
        systematic_resample(&weights, step, 0.3 * step, &mut selected);
        assert_eq!(selected.len(), weights.len());
        assert!(selected.windows(2).all(|w| w[0] <= w[1]));
        assert!(!selected.contains(&3));
    }
    #[test]
    fn test_systematic_resample_is_weight_proportional() {
        let weights = [1.0, 4.0, 0.5, 2.5, 2.0];
        let total: f64 = weights.iter().sum();
        let step = total / weights.len() as f64;
        let mut rng = StdRng::seed_from_u64(1234);
        let mut counts = [0usize; 5];
        let mut selected = Vec::new();
        let trials = 20_000;
        for _ in 0..trials {
            systematic_resample(&weights, step, rng.random_range(0.0..step), &mut selected);
            for &i in &selected {
                counts[i] += 1;
            }
        }
        let draws = (trials * weights.len()) as f64;
        for (count, weight) in counts.iter().zip(weights.iter()) {
            assert_approx_eq!(*count as f64 / draws, weight / total, 0.01);
        }
    }
    #[test]
    fn test_systematic_resample_deterministic_for_seed() {
        let weights = [0.3, 0.1, 0.9, 0.05, 0.6, 0.05];
        let step = weights.iter().sum::<f64>() / weights.len() as f64;
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut selected = Vec::new();
            let mut all = Vec::new();
            for _ in 0..50 {
                systematic_resample(&weights, step, rng.random_range(0.0..step), &mut selected);
                all.extend_from_slice(&selected);
            }
            all
        };
        assert_eq!(draw(9), draw(9));
    }
    #[test]
    fn test_odometry_step_follows_sampled_heading() {
        let config = FilterConfig {
            num_particles: 4,
            ..Default::default()
        };
        let mut pf = ParticleFilter::new(config, unit_field(), || std::f64::consts::FRAC_PI_2).unwrap();
        let mut noise = OdometryNoise::new(&crate::odometry::OdometryNoiseConfig {
            distance_fraction: 0.0,
            heading_jitter: 0.0,
            seed: 3,
        })
        .unwrap();
        pf.init_at(Vector2::zeros());
        assert_eq!(pf.step_odometry(Duration::ZERO, 0.25, &mut noise), StepOutcome::Predicted);
        let pose = pf.compute_prediction();
        assert_approx_eq!(pose.x, 0.0, 1e-12);
        assert_approx_eq!(pose.y, 0.25, 1e-12);
        assert_approx_eq!(pf.distance_since_update(), 0.25, 1e-12);
    }
    #[test]
    fn test_pose_handle_shared_across_threads() {
        let handle = PoseHandle::new(Pose::new(1.0, 2.0, 3.0));
        let reader = handle.clone();
        let joined = std::thread::spawn(move || reader.get()).join().unwrap();
        assert_eq!(joined, Pose::new(1.0, 2.0, 3.0));
        handle.set(Pose::new(4.0, 5.0, 6.0));
        assert_eq!(handle.get(), Pose::new(4.0, 5.0, 6.0));
    }
}
