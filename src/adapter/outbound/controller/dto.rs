//! Controller API wire types (`/api/v2`).
//!
//! Responses are deserialized leniently: counters may arrive as numbers or
//! numeric strings, and anything the run does not depend on is ignored.

use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};

use crate::domain::run::{RunStatus, RunStatusKind};
use crate::domain::stats::{RawRunStatistics, RawStatistic};
use crate::port::outbound::controller::{
    DeviceInfo, DevicePort, DeviceSlot, LoadConstraints, RunSummary, TestConfig, TestRun,
    TestUpdate,
};

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: Option<String>,
}

// ---------------------------------------------------------------------------
// Test definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TestDefinition {
    #[serde(default)]
    pub name: String,
    pub config: TestDefinitionConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinitionConfig {
    pub queue: Option<QueueRef>,
    #[serde(default)]
    pub interfaces: Interfaces,
    pub load_specification: Option<LoadSpecificationDto>,
    pub runtime_options: Option<RuntimeOptions>,
    pub protocol: Option<Protocol>,
}

#[derive(Debug, Deserialize)]
pub struct QueueRef {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Interfaces {
    #[serde(default)]
    pub client: Vec<InterfaceRef>,
    #[serde(default)]
    pub server: Vec<InterfaceRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceRef {
    pub port_system_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LoadSpecificationDto {
    #[serde(rename = "type")]
    pub load_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// Seconds, or `false`/absent when unset.
    #[serde(default)]
    pub statistics_sampling_interval: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub response_body_type: Option<ResponseBodyType>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseBodyType {
    pub config: Option<ResponseBodyConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseBodyConfig {
    #[serde(default, deserialize_with = "lenient_u64_opt")]
    pub length: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64_opt")]
    pub bytes: Option<u64>,
}

impl From<TestDefinition> for TestConfig {
    fn from(test: TestDefinition) -> Self {
        let config = test.config;
        let ports = |refs: Vec<InterfaceRef>| refs.into_iter().map(|r| r.port_system_id).collect();
        let response_length = config
            .protocol
            .and_then(|p| p.response_body_type)
            .and_then(|body| body.config)
            .and_then(|body| body.length.or(body.bytes));
        Self {
            name: test.name,
            queue_id: config.queue.and_then(|queue| queue.id),
            client_ports: ports(config.interfaces.client),
            server_ports: ports(config.interfaces.server),
            load_type: config.load_specification.and_then(|spec| spec.load_type),
            sampling_interval: config
                .runtime_options
                .and_then(|options| value_u64(&options.statistics_sampling_interval))
                .filter(|interval| *interval > 0),
            response_length,
        }
    }
}

/// Body of `PUT /tests/{type}/{id}` carrying runtime options and the load
/// specification.
#[must_use]
pub fn test_update_body(update: &TestUpdate) -> Value {
    let load = &update.load;
    let mut spec = Map::new();
    spec.insert("duration".into(), json!(load.duration));
    spec.insert("startup".into(), json!(load.startup));
    spec.insert("rampup".into(), json!(load.rampup));
    if let Some(rampdown) = load.rampdown {
        spec.insert("rampdown".into(), json!(rampdown));
    }
    spec.insert("shutdown".into(), json!(load.shutdown));
    if let Some((key, start_load)) = load.start_load {
        spec.insert(key.as_str().into(), json!(start_load));
    }
    if let Some(load_type) = load.load_type {
        spec.insert("type".into(), json!(load_type.as_str()));
    }
    if let Some(constraints) = load.constraints {
        spec.insert("constraints".into(), constraints_body(constraints));
    }

    json!({
        "config": {
            "runtimeOptions": {
                "statisticsSamplingInterval": update.sampling_interval,
            },
            "loadSpecification": spec,
        }
    })
}

fn constraints_body(constraints: LoadConstraints) -> Value {
    let Some(max) = constraints.living_max else {
        return json!({ "enabled": false });
    };
    json!({
        "enabled": true,
        "living": { "enabled": true, "max": max },
        "openConnections": { "enabled": false },
        "birthRate": { "enabled": false },
        "connectionsRate": { "enabled": false },
    })
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DeviceDto {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub description: String,
    pub firmware: Option<Firmware>,
    #[serde(default)]
    pub slots: Vec<SlotDto>,
}

#[derive(Debug, Deserialize)]
pub struct Firmware {
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDto {
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub compute_groups: Vec<ComputeGroupDto>,
}

#[derive(Debug, Deserialize)]
pub struct ComputeGroupDto {
    #[serde(default)]
    pub ports: Vec<PortDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDto {
    pub system_id: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub speed: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub cores: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub capacity: u64,
}

impl From<DeviceDto> for DeviceInfo {
    fn from(device: DeviceDto) -> Self {
        Self {
            ip: device.ip,
            description: device.description,
            firmware: device.firmware.map(|f| f.version).unwrap_or_default(),
            slots: device
                .slots
                .into_iter()
                .map(|slot| DeviceSlot {
                    profile: slot.profile,
                    model: slot.model,
                    ports: slot
                        .compute_groups
                        .into_iter()
                        .flat_map(|group| group.ports)
                        .map(|port| DevicePort {
                            system_id: port.system_id,
                            speed: port.speed,
                            cores: port.cores,
                            capacity: port.capacity,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Response of `PUT /tests/{id}/start` and `GET /test_runs/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunDto {
    pub id: String,
    pub run_id: Option<String>,
    #[serde(default)]
    pub status: String,
    pub sub_status: Option<String>,
    pub progress: Option<f64>,
    pub time_elapsed: Option<f64>,
    pub time_remaining: Option<f64>,
    pub test: Option<TestRef>,
}

#[derive(Debug, Deserialize)]
pub struct TestRef {
    #[serde(rename = "type")]
    pub test_type: Option<String>,
}

impl From<TestRunDto> for TestRun {
    fn from(run: TestRunDto) -> Self {
        Self {
            id: run.id,
            status: RunStatusKind::parse(&run.status),
            sub_status: run.sub_status,
            type_v1: run.test.and_then(|test| test.test_type).unwrap_or_default(),
        }
    }
}

impl From<TestRunDto> for RunStatus {
    fn from(run: TestRunDto) -> Self {
        Self {
            status: RunStatusKind::parse(&run.status),
            sub_status: run.sub_status,
            progress: run.progress,
            time_elapsed: run.time_elapsed,
            time_remaining: run.time_remaining,
            result_id: run.run_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunListEntry {
    pub id: String,
    #[serde(default)]
    pub test_id: String,
    #[serde(default)]
    pub status: String,
}

impl From<RunListEntry> for RunSummary {
    fn from(run: RunListEntry) -> Self {
        Self {
            id: run.id,
            test_id: run.test_id,
            status: RunStatusKind::parse(&run.status),
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsDto {
    #[serde(default)]
    pub client: Vec<StatisticDto>,
    #[serde(default)]
    pub server: Vec<StatisticDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticDto {
    #[serde(rename = "type")]
    pub kind: String,
    pub sub_type: Option<String>,
    #[serde(default)]
    pub value: Value,
}

impl From<StatisticsDto> for RawRunStatistics {
    fn from(stats: StatisticsDto) -> Self {
        let convert = |entries: Vec<StatisticDto>| -> Vec<RawStatistic> {
            entries
                .into_iter()
                .filter_map(|entry| {
                    let value = value_f64(&entry.value)?;
                    Some(RawStatistic {
                        kind: entry.kind,
                        sub_kind: entry.sub_type,
                        value,
                    })
                })
                .collect()
        };
        Self {
            client: convert(stats.client),
            server: convert(stats.server),
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient numbers
// ---------------------------------------------------------------------------

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn value_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().map(|v| v as u64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_u64(&value).unwrap_or_default())
}

fn lenient_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_u64(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_type::{LoadKey, LoadType};
    use crate::port::outbound::controller::LoadSpecification;

    #[test]
    fn test_definition_maps_ports_interval_and_response_length() {
        let body = r#"{
            "id": "t1",
            "name": "tput",
            "config": {
                "queue": {"id": "q-1"},
                "interfaces": {
                    "client": [{"portSystemId": "dev/1"}, {"portSystemId": "dev/3"}],
                    "server": [{"portSystemId": "dev/2"}]
                },
                "loadSpecification": {"type": "SimUsers", "duration": 600},
                "runtimeOptions": {"statisticsSamplingInterval": 8},
                "protocol": {"responseBodyType": {"config": {"bytes": "2048"}}}
            }
        }"#;
        let test: TestDefinition = serde_json::from_str(body).unwrap();
        let config = TestConfig::from(test);

        assert_eq!(config.queue_id.as_deref(), Some("q-1"));
        assert_eq!(config.client_ports, vec!["dev/1", "dev/3"]);
        assert_eq!(config.server_ports, vec!["dev/2"]);
        assert_eq!(config.load_type.as_deref(), Some("SimUsers"));
        assert_eq!(config.sampling_interval, Some(8));
        assert_eq!(config.response_length, Some(2048));
    }

    #[test]
    fn unset_sampling_interval_is_none() {
        let body = r#"{"config": {"runtimeOptions": {"statisticsSamplingInterval": false}}}"#;
        let config = TestConfig::from(serde_json::from_str::<TestDefinition>(body).unwrap());
        assert_eq!(config.sampling_interval, None);
        assert_eq!(config.response_length, None);
        assert!(config.client_ports.is_empty());
    }

    #[test]
    fn device_flattens_compute_groups() {
        let body = r#"{
            "ip": "10.0.0.5",
            "description": "CF  2000",
            "firmware": {"version": "20.1"},
            "slots": [{
                "profile": "Performance-Standard",
                "model": "cf2000",
                "computeGroups": [
                    {"ports": [{"systemId": "dev/1", "speed": 10000, "cores": "4", "capacity": 8}]},
                    {"ports": [{"systemId": "dev/2", "speed": 10000, "cores": 4, "capacity": 8}]}
                ]
            }]
        }"#;
        let device = DeviceInfo::from(serde_json::from_str::<DeviceDto>(body).unwrap());

        assert_eq!(device.firmware, "20.1");
        assert_eq!(device.slots[0].ports.len(), 2);
        assert_eq!(device.slots[0].ports[0].cores, 4);
        assert_eq!(device.slots[0].ports[1].system_id, "dev/2");
    }

    #[test]
    fn start_response_maps_run_handle() {
        let body = r#"{
            "id": "run-9",
            "runId": "result-3",
            "status": "waiting",
            "subStatus": "initializing",
            "test": {"name": "tput", "type": "http"}
        }"#;
        let dto: TestRunDto = serde_json::from_str(body).unwrap();
        let run = TestRun::from(dto);
        assert_eq!(run.id, "run-9");
        assert_eq!(run.status, RunStatusKind::Waiting);
        assert_eq!(run.sub_status.as_deref(), Some("initializing"));
        assert_eq!(run.type_v1, "http");
    }

    #[test]
    fn run_status_keeps_result_id_and_times() {
        let body = r#"{"id": "run-9", "runId": "result-3", "status": "running",
                       "subStatus": null, "timeElapsed": 42, "timeRemaining": 558}"#;
        let status = RunStatus::from(serde_json::from_str::<TestRunDto>(body).unwrap());
        assert_eq!(status.status, RunStatusKind::Running);
        assert_eq!(status.sub_status, None);
        assert_eq!(status.time_elapsed, Some(42.0));
        assert_eq!(status.result_id.as_deref(), Some("result-3"));
    }

    #[test]
    fn statistics_skip_non_numeric_values() {
        let body = r#"{
            "client": [
                {"type": "sum", "subType": "successfulTxnsPerSec", "value": 120.5},
                {"type": "timeElapsed", "value": "36"},
                {"type": "http", "subType": "label", "value": "n/a"}
            ],
            "server": [{"type": "memory", "subType": "cpuUtilized", "value": 12}]
        }"#;
        let raw = RawRunStatistics::from(serde_json::from_str::<StatisticsDto>(body).unwrap());

        assert_eq!(raw.client.len(), 2);
        assert_eq!(raw.client[0].sub_kind.as_deref(), Some("successfulTxnsPerSec"));
        assert_eq!(raw.client[1], RawStatistic::scalar("timeElapsed", 36.0));
        assert_eq!(raw.server[0].value, 12.0);
    }

    #[test]
    fn full_update_body_carries_key_type_and_constraints() {
        let update = TestUpdate {
            sampling_interval: 4,
            load: LoadSpecification {
                duration: 600,
                startup: 5,
                rampup: 30,
                rampdown: Some(30),
                shutdown: 10,
                start_load: Some((LoadKey::Bandwidth, 40)),
                load_type: Some(LoadType::SimUsers),
                constraints: Some(LoadConstraints {
                    living_max: Some(500),
                }),
            },
        };
        let body = test_update_body(&update);

        assert_eq!(body["config"]["runtimeOptions"]["statisticsSamplingInterval"], 4);
        let spec = &body["config"]["loadSpecification"];
        assert_eq!(spec["bandwidth"], 40);
        assert_eq!(spec["type"], "SimUsers");
        assert_eq!(spec["rampdown"], 30);
        assert_eq!(spec["constraints"]["enabled"], true);
        assert_eq!(spec["constraints"]["living"]["max"], 500);
        assert_eq!(spec["constraints"]["birthRate"]["enabled"], false);
    }

    #[test]
    fn reduced_update_body_omits_unset_fields() {
        let update = TestUpdate {
            sampling_interval: 4,
            load: LoadSpecification {
                duration: 300,
                startup: 5,
                rampup: 120,
                rampdown: None,
                shutdown: 32,
                start_load: None,
                load_type: None,
                constraints: None,
            },
        };
        let spec = test_update_body(&update)["config"]["loadSpecification"].clone();
        let keys: Vec<_> = spec.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 4);
        assert!(spec.get("rampdown").is_none());
        assert!(spec.get("type").is_none());
    }

    #[test]
    fn disabled_constraints_are_a_single_flag() {
        assert_eq!(
            constraints_body(LoadConstraints::default()),
            json!({ "enabled": false })
        );
    }
}
