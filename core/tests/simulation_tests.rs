//! End-to-end localization tests against the simulated robot
//!
//! These tests run the whole stack (simulated hardware, sensor models, odometry noise, filter) on the
//! default simulated field. The error bounds in the assertions are regression checks chosen well above
//! the errors observed for the default configuration, not design goals.
use loco::config::SensorConfig;
use loco::measurements::DistanceSensorConfig;
use loco::particle::MAX_PARTICLES;
use loco::sim::{Initialization, SimulationConfig, run_simulation};
use loco::{LocalizationError, Pose};

fn short_run(duration: f64) -> SimulationConfig {
    SimulationConfig {
        duration,
        ..Default::default()
    }
}

#[test]
fn known_start_tracks_truth() {
    let config = short_run(20.0);
    let result = run_simulation(&config).unwrap();
    assert_eq!(result.records.len(), 2000);
    assert_eq!(result.particles.len(), config.localization.filter.num_particles);
    assert!(result.report.resampled > 0);
    assert_eq!(result.report.heading_rejected, 0);
    assert!(
        result.report.final_error < 0.3,
        "final error {} m\n{}",
        result.report.final_error,
        result.report
    );
    assert!(result.report.rms_error < 0.3, "{}", result.report);
}

#[test]
fn scattered_start_tracks_truth() {
    let config = SimulationConfig {
        initialization: Initialization::Normal { std: 0.1 },
        ..short_run(10.0)
    };
    let result = run_simulation(&config).unwrap();
    assert_eq!(result.records.len(), 1000);
    assert!(result.report.final_error < 0.3, "{}", result.report);
}

#[test]
fn corrections_respect_time_threshold() {
    let config = short_run(5.0);
    let result = run_simulation(&config).unwrap();
    // at most one correction per half second of simulated time
    assert!(result.report.resampled <= 10, "{}", result.report);
    let times: Vec<f64> = result
        .records
        .iter()
        .filter(|r| r.outcome == "resampled")
        .map(|r| r.time)
        .collect();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] > 0.5 - 1e-9, "corrections at {:?}", pair);
    }
}

#[test]
fn same_config_same_run() {
    let config = short_run(3.0);
    let a = run_simulation(&config).unwrap();
    let b = run_simulation(&config).unwrap();
    assert_eq!(a.records, b.records);
    assert_eq!(a.particles, b.particles);
}

#[test]
fn without_sensors_filter_dead_reckons() {
    let mut config = short_run(3.0);
    config.localization.sensors.clear();
    let result = run_simulation(&config).unwrap();
    assert_eq!(result.report.resampled, 0);
    assert!(result.report.no_information > 0);
    assert_eq!(result.particles.len(), config.localization.filter.num_particles);
    assert!(result.records.iter().all(|r| r.outcome != "resampled"));
}

#[test]
fn range_only_configuration_runs() {
    let mut config = short_run(5.0);
    config.localization.sensors = vec![
        SensorConfig::Distance(DistanceSensorConfig {
            offset: Pose::new(0.1, 0.0, 0.0),
            ..Default::default()
        }),
        SensorConfig::Distance(DistanceSensorConfig {
            offset: Pose::new(-0.1, 0.0, std::f64::consts::PI),
            ..Default::default()
        }),
    ];
    let result = run_simulation(&config).unwrap();
    assert_eq!(result.records.len(), 500);
    assert_eq!(result.report.heading_rejected, 0);
    assert!(result.records.iter().all(|r| r.error.is_finite()));
}

#[test]
fn invalid_particle_count_rejected() {
    let mut config = short_run(1.0);
    config.localization.filter.num_particles = MAX_PARTICLES + 1;
    assert!(matches!(
        run_simulation(&config),
        Err(LocalizationError::InvalidParticleCount { .. })
    ));
}
