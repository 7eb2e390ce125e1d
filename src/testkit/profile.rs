//! Canonical test configurations and profiles.
//!
//! A small HTTP throughput run: 100 s total, 4 s sampling, one client core.
//! Tests tweak individual fields instead of building profiles by hand.

use crate::domain::kpi::{Kpi, KpiCombine};
use crate::domain::run::{
    DeviceSummary, Increments, PhaseDurations, RunProfile, TestRunConfig, Thresholds,
};
use crate::domain::test_type::{CapacityAdjust, LoadKey, LoadPlan, LoadType, SeekStrategy, TestType};

/// Phase durations shared by the canonical profiles.
#[must_use]
pub fn phases() -> PhaseDurations {
    PhaseDurations {
        duration: 100,
        startup: 10,
        rampup: 20,
        rampdown: 10,
        shutdown: 5,
    }
}

/// Configuration of a throughput test with simusers load.
#[must_use]
pub fn tput_config() -> TestRunConfig {
    TestRunConfig {
        name: "tput".into(),
        test_id: "t1".into(),
        test_type: "http_throughput".into(),
        load_type: "simusers".into(),
        suite: "nightly".into(),
        start_load: 10,
        increments: Increments {
            low: 10,
            med: 20,
            high: 40,
        },
        thresholds: Thresholds {
            low: 5.0,
            med: 2.0,
            high: 0.5,
        },
        phases: phases(),
        sustain_period: 0,
        goal_seek: false,
        capacity_adjust: CapacityAdjust::Fixed(1),
        variance_sample_size: 3,
        max_variance: 0.03,
        kpi_1: Kpi::Tps,
        kpi_2: Kpi::Cps,
        kpi_combine: KpiCombine::Or,
        ramp_seek: None,
        living_simusers_max: None,
        strategy: SeekStrategy::Threshold,
    }
}

/// Device with one client core and a 1000 Mbps client queue.
#[must_use]
pub fn device() -> DeviceSummary {
    DeviceSummary {
        ip: "10.0.0.5".into(),
        firmware: "20.1".into(),
        description: "9999".into(),
        profile: "Max".into(),
        model: "cf2000".into(),
        queue_speed: 1000,
        client_cores: 1,
        queue_capacity: 4,
    }
}

/// Resolved profile for [`tput_config`].
#[must_use]
pub fn tput_profile() -> RunProfile {
    let config = tput_config();
    RunProfile {
        test_type: TestType::Tput,
        plan: LoadPlan {
            key: LoadKey::Bandwidth,
            load_type: Some(LoadType::SimUsers),
            minimal_step: 1,
        },
        strategy: config.strategy,
        start_load: config.start_load,
        capacity_adjust: 1,
        phases: config.phases,
        goal_seek: config.goal_seek,
        interval: 4,
        device: device(),
        client_ports: vec!["dev/1".into()],
        server_ports: vec!["dev/2".into()],
        config,
    }
}

/// [`tput_profile`] with goal seek enabled and the given strategy.
#[must_use]
pub fn goal_seek_profile(strategy: SeekStrategy) -> RunProfile {
    let mut profile = tput_profile();
    profile.goal_seek = true;
    profile.config.goal_seek = true;
    profile.strategy = strategy;
    profile.config.strategy = strategy;
    profile
}
