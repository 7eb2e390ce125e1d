//! Run configuration setup.
//!
//! Reconciles a [`TestRunConfig`] with the stored test definition and the
//! device its client ports live on, pushes the resulting load specification
//! to the controller and returns the [`RunProfile`] the run is driven with.

use tracing::{debug, info};

use crate::domain::error::DomainError;
use crate::domain::increment::round_up_to_core;
use crate::domain::run::{DeviceSummary, PhaseDurations, RunProfile, TestRunConfig};
use crate::domain::test_type::{resolve_load_plan, SeekStrategy, TestType};
use crate::error::Result;
use crate::port::outbound::controller::{
    ControllerClient, DeviceInfo, LoadConstraints, LoadSpecification, TestConfig, TestUpdate,
};

/// Response length assumed when the test has no response body config.
const DEFAULT_RESPONSE_LENGTH: u64 = 987_654_321;
const PROFILE_PREFIXES: [&str; 3] = ["Functional-", "Performance-", "Maximum-"];
/// Smallest start load with the resource strategy.
const RESOURCE_MIN_START_LOAD: i64 = 16;

/// Prepares test definitions on the controller.
pub struct RunSetup<'a> {
    controller: &'a dyn ControllerClient,
}

impl<'a> RunSetup<'a> {
    pub fn new(controller: &'a dyn ControllerClient) -> Self {
        Self { controller }
    }

    /// Resolve the run profile for `config` and push its load specification.
    pub async fn prepare(&self, config: &TestRunConfig) -> Result<RunProfile> {
        let test = self
            .controller
            .test_config(&config.test_type, &config.test_id)
            .await?;
        let device_id = test
            .device_id()
            .ok_or_else(|| DomainError::NoDeviceForPorts {
                ports: test.client_ports.clone(),
            })?;
        let device_info = self.controller.device_info(device_id).await?;
        let device = summarize_device(&device_info, &test.client_ports)?;
        info!(
            device = %device.ip,
            queue_speed = device.queue_speed,
            client_cores = device.client_cores,
            queue_capacity = device.queue_capacity,
            "Client queue"
        );

        let profile = build_profile(config, &test, device)?;
        let update = TestUpdate {
            sampling_interval: profile.interval,
            load: load_specification(&profile),
        };
        debug!(update = ?update, "Updating test load specification");
        self.controller
            .update_test(&config.test_type, &config.test_id, &update)
            .await?;
        info!(
            test = %config.name,
            test_type = %profile.test_type,
            load_type = profile.load_type_label(),
            strategy = ?profile.strategy,
            start_load = profile.start_load,
            capacity_adjust = profile.capacity_adjust,
            interval = profile.interval,
            "Run configured"
        );
        Ok(profile)
    }
}

/// Sum the first slot's client ports and extract the report identity.
pub fn summarize_device(info: &DeviceInfo, client_ports: &[String]) -> Result<DeviceSummary> {
    let slot = info.slots.first();
    let ports: Vec<_> = slot
        .map(|slot| {
            slot.ports
                .iter()
                .filter(|port| client_ports.contains(&port.system_id))
                .collect()
        })
        .unwrap_or_default();
    if ports.is_empty() {
        return Err(DomainError::NoDeviceForPorts {
            ports: client_ports.to_vec(),
        }
        .into());
    }

    let description = info.description.get(4..).unwrap_or_default().to_string();
    let profile = slot.map_or("", |slot| slot.profile.as_str());
    let profile = PROFILE_PREFIXES
        .iter()
        .find_map(|prefix| profile.split_once(prefix).map(|(_, rest)| rest))
        .unwrap_or(profile)
        .trim_end_matches('\n');
    let model = slot.map_or("", |slot| slot.model.as_str());
    let model = if description == "CFV" {
        model.get(8..model.len().saturating_sub(5)).unwrap_or_default()
    } else {
        model
    };

    Ok(DeviceSummary {
        ip: info.ip.clone(),
        firmware: info.firmware.clone(),
        description,
        profile: profile.to_string(),
        model: model.to_string(),
        queue_speed: ports.iter().map(|port| port.speed).sum(),
        client_cores: ports.iter().map(|port| port.cores).sum(),
        queue_capacity: ports.iter().map(|port| port.capacity).sum(),
    })
}

fn build_profile(
    config: &TestRunConfig,
    test: &TestConfig,
    device: DeviceSummary,
) -> Result<RunProfile> {
    let test_type = TestType::from_controller(&config.test_type);
    let response_length = test.response_length.unwrap_or(DEFAULT_RESPONSE_LENGTH);
    let mut plan = resolve_load_plan(test_type, &config.load_type, response_length)?;
    let cores = device.client_cores;
    let mut capacity_adjust =
        config
            .capacity_adjust
            .resolve(plan.load_type, test.client_ports.len() as u64, cores);

    let mut start_load = if test_type == TestType::Ddos {
        device.queue_speed as i64 * 1000
    } else {
        config.start_load
    };
    let mut phases = config.phases;
    let mut goal_seek = config.goal_seek;

    match config.strategy {
        SeekStrategy::Resource if test_type.is_fixed_load() => {
            plan.load_type = None;
            goal_seek = false;
            phases = PhaseDurations {
                duration: 300,
                rampup: 120,
                rampdown: 0,
                shutdown: 32,
                ..phases
            };
        }
        SeekStrategy::Resource => {
            let base = match response_length {
                0..=4000 => 16,
                4001..=16000 => 8,
                16001..=32000 => 4,
                _ => 3,
            };
            capacity_adjust = round_up_to_core(base, cores) as u64;
            start_load *= cores as i64;
            if start_load <= RESOURCE_MIN_START_LOAD {
                start_load = round_up_to_core(RESOURCE_MIN_START_LOAD, cores);
            }
        }
        SeekStrategy::Threshold => {
            start_load *= capacity_adjust as i64;
        }
    }
    phases.validate()?;

    let interval = test
        .sampling_interval
        .filter(|interval| *interval > 0)
        .unwrap_or(if phases.duration <= 800 {
            4
        } else {
            phases.duration / 200
        });

    Ok(RunProfile {
        config: config.clone(),
        test_type,
        plan,
        strategy: config.strategy,
        start_load,
        capacity_adjust,
        phases,
        goal_seek,
        interval,
        device,
        client_ports: test.client_ports.clone(),
        server_ports: test.server_ports.clone(),
    })
}

/// Load specification for `profile`. DDoS and max tests take reduced field
/// sets.
pub fn load_specification(profile: &RunProfile) -> LoadSpecification {
    let phases = &profile.phases;
    let start_load = Some((profile.plan.key, profile.start_load));
    let mut spec = LoadSpecification {
        duration: phases.duration,
        startup: phases.startup,
        rampup: phases.rampup,
        rampdown: None,
        shutdown: phases.shutdown,
        start_load: None,
        load_type: None,
        constraints: None,
    };
    match profile.test_type {
        TestType::Ddos => spec.start_load = start_load,
        TestType::MaxCps | TestType::MaxTput => {}
        _ => {
            spec.rampdown = Some(phases.rampdown);
            spec.start_load = start_load;
            spec.load_type = profile.plan.load_type;
            spec.constraints = Some(match profile.strategy {
                SeekStrategy::Threshold => LoadConstraints {
                    living_max: profile.config.living_simusers_max,
                },
                SeekStrategy::Resource => LoadConstraints::default(),
            });
        }
    }
    spec
}
