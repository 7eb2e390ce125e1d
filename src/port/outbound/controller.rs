//! Traffic controller port.
//!
//! The controller owns test definitions, devices and runs. Every call is a
//! remote request that may fail; transient failures are retried by the
//! adapter, so an `Err` here means the request is given up on.

use async_trait::async_trait;

use crate::domain::run::{RunStatus, RunStatusKind};
use crate::domain::stats::RawRunStatistics;
use crate::domain::test_type::{LoadKey, LoadType};
use crate::error::Result;

/// The parts of a stored test definition the run depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestConfig {
    pub name: String,
    pub queue_id: Option<String>,
    /// Client port system ids, e.g. `device-1/3`.
    pub client_ports: Vec<String>,
    pub server_ports: Vec<String>,
    /// Load specification type as stored on the controller.
    pub load_type: Option<String>,
    /// `statisticsSamplingInterval` in seconds, when set.
    pub sampling_interval: Option<u64>,
    /// Configured HTTP response body size, when the protocol has one.
    pub response_length: Option<u64>,
}

impl TestConfig {
    /// Device id: the part of the first client port id before `/`.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        let port = self.client_ports.first()?;
        Some(port.split_once('/').map_or(port.as_str(), |(device, _)| device))
    }
}

/// One traffic port of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicePort {
    pub system_id: String,
    /// Line rate in Mbps.
    pub speed: u64,
    pub cores: u64,
    pub capacity: u64,
}

/// A device slot with its compute group ports flattened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSlot {
    pub profile: String,
    pub model: String,
    pub ports: Vec<DevicePort>,
}

/// Device details as reported by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub ip: String,
    pub description: String,
    pub firmware: String,
    pub slots: Vec<DeviceSlot>,
}

/// A started run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    /// Run handle used by every later call.
    pub id: String,
    pub status: RunStatusKind,
    pub sub_status: Option<String>,
    /// Controller test type label (v1), used in links.
    pub type_v1: String,
}

/// Entry of the run listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub id: String,
    pub test_id: String,
    pub status: RunStatusKind,
}

/// Optional limits applied on top of the load specification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadConstraints {
    /// Maximum number of living simulated users.
    pub living_max: Option<u64>,
}

impl LoadConstraints {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.living_max.is_some()
    }
}

/// Load specification pushed before a run.
///
/// `None` fields are left out of the request: fixed-load tests do not accept
/// a rampdown, a load type or constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpecification {
    pub duration: u64,
    pub startup: u64,
    pub rampup: u64,
    pub rampdown: Option<u64>,
    pub shutdown: u64,
    /// Start load under its load specification key.
    pub start_load: Option<(LoadKey, i64)>,
    pub load_type: Option<LoadType>,
    pub constraints: Option<LoadConstraints>,
}

/// Update sent to a test definition before it is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestUpdate {
    pub sampling_interval: u64,
    pub load: LoadSpecification,
}

/// Remote traffic controller.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Host (and optional port) of the controller, used in links.
    fn address(&self) -> &str;

    /// Authenticate; later calls carry the obtained token.
    async fn connect(&self) -> Result<()>;

    async fn test_config(&self, test_type: &str, test_id: &str) -> Result<TestConfig>;

    async fn update_test(&self, test_type: &str, test_id: &str, update: &TestUpdate)
        -> Result<()>;

    async fn device_info(&self, device_id: &str) -> Result<DeviceInfo>;

    async fn start_test(&self, test_id: &str) -> Result<TestRun>;

    async fn run_status(&self, run_id: &str) -> Result<RunStatus>;

    async fn run_statistics(&self, run_id: &str) -> Result<RawRunStatistics>;

    async fn change_load(&self, run_id: &str, load: i64) -> Result<()>;

    async fn stop_test(&self, run_id: &str) -> Result<()>;

    async fn list_runs(&self) -> Result<Vec<RunSummary>>;
}
