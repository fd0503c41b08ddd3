//! Fixed-cadence localization loop.
//!
//! [`LocalizationRunner`] moves a [`ParticleFilter`] onto its own thread and steps it once per period.
//! Each cycle reads the drivetrain's arc length since the previous cycle, steps the filter with noisy
//! copies of it and then sleeps until the next deadline. Deadlines are spaced a fixed period apart from
//! the start, so a slow cycle shortens the following sleep instead of shifting every later cycle. Other
//! threads read the estimate through the filter's [`PoseHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::Pose;
use crate::odometry::OdometryNoise;
use crate::particle::{CorrectionOutcome, ParticleFilter, PoseHandle, StepOutcome};

/// Default cycle period
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(10);

/// Source of the drivetrain's travelled arc length since the previous call (m)
pub trait OdometrySource: Send {
    fn arc_length(&mut self) -> f64;
}
impl<F: FnMut() -> f64 + Send> OdometrySource for F {
    fn arc_length(&mut self) -> f64 {
        self()
    }
}

/// Counters shared between the loop and its owner
#[derive(Debug, Default)]
struct RunnerStats {
    cycles: AtomicU64,
    corrections: AtomicU64,
    overruns: AtomicU64,
}

/// Handle to a filter running on a background thread.
pub struct LocalizationRunner {
    handle: JoinHandle<ParticleFilter>,
    running: Arc<AtomicBool>,
    stats: Arc<RunnerStats>,
    pose: PoseHandle,
}
impl LocalizationRunner {
    /// Spawn the localization thread.
    ///
    /// # Errors
    /// Fails only if the operating system refuses to create the thread.
    pub fn spawn<O: OdometrySource + 'static>(
        mut filter: ParticleFilter,
        period: Duration,
        mut odometry: O,
        mut noise: OdometryNoise,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(RunnerStats::default());
        let pose = filter.pose_handle();
        let handle = {
            let running = running.clone();
            let stats = stats.clone();
            thread::Builder::new()
                .name("localization".into())
                .spawn(move || {
                    log::info!(
                        "localization loop started: {} particles, {:?} period",
                        filter.num_particles(),
                        period
                    );
                    let start = Instant::now();
                    let mut deadline = start;
                    while running.load(Ordering::Relaxed) {
                        let arc_length = odometry.arc_length();
                        let outcome = filter.step_odometry(start.elapsed(), arc_length, &mut noise);
                        stats.cycles.fetch_add(1, Ordering::Relaxed);
                        if outcome == StepOutcome::Corrected(CorrectionOutcome::Resampled) {
                            stats.corrections.fetch_add(1, Ordering::Relaxed);
                        }
                        deadline += period;
                        let now = Instant::now();
                        if deadline > now {
                            thread::sleep(deadline - now);
                        } else {
                            stats.overruns.fetch_add(1, Ordering::Relaxed);
                            log::trace!("localization cycle overran by {:?}", now - deadline);
                        }
                    }
                    log::info!(
                        "localization loop stopped after {} cycles",
                        stats.cycles.load(Ordering::Relaxed)
                    );
                    filter
                })?
        };
        Ok(LocalizationRunner {
            handle,
            running,
            stats,
            pose,
        })
    }
    /// Latest published estimate
    pub fn pose(&self) -> Pose {
        self.pose.get()
    }
    pub fn pose_handle(&self) -> PoseHandle {
        self.pose.clone()
    }
    pub fn cycles(&self) -> u64 {
        self.stats.cycles.load(Ordering::Relaxed)
    }
    /// Number of corrections that resampled the cloud
    pub fn corrections(&self) -> u64 {
        self.stats.corrections.load(Ordering::Relaxed)
    }
    /// Number of cycles that finished after their deadline
    pub fn overruns(&self) -> u64 {
        self.stats.overruns.load(Ordering::Relaxed)
    }
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
    /// Stop the loop after its current cycle and hand the filter back.
    pub fn stop(self) -> thread::Result<ParticleFilter> {
        self.running.store(false, Ordering::Relaxed);
        self.handle.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldBounds, FieldGeometry};
    use crate::odometry::OdometryNoiseConfig;
    use crate::particle::FilterConfig;
    use assert_approx_eq::assert_approx_eq;
    use nalgebra::Vector2;

    #[test]
    fn test_runner_steps_and_returns_filter() {
        let field = Arc::new(FieldGeometry::new(FieldBounds::square(1.0), Vec::new(), Vec::new()).unwrap());
        let config = FilterConfig {
            num_particles: 8,
            ..Default::default()
        };
        let mut filter = ParticleFilter::new(config, field, || 0.0).unwrap();
        filter.init_at(Vector2::new(-0.5, 0.0));
        let noise = OdometryNoise::new(&OdometryNoiseConfig {
            distance_fraction: 0.0,
            heading_jitter: 0.0,
            seed: 0,
        })
        .unwrap();
        let runner = LocalizationRunner::spawn(filter, Duration::from_millis(1), || 0.001, noise).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(runner.is_running());
        let cycles = runner.cycles();
        assert!(cycles > 0);
        let filter = runner.stop().unwrap();
        let pose = filter.compute_prediction();
        assert!(pose.x > -0.5);
        for p in filter.particles() {
            assert_approx_eq!(p.x, pose.x, 1e-9);
            assert_eq!(p.y, 0.0);
        }
    }
}
