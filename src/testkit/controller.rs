//! Mock [`ControllerClient`] for run loop and setup tests.
//!
//! [`ScriptedController`] serves pre-loaded status polls and statistics
//! samples in order and records every mutating call. When a queue runs dry
//! the last statistics sample is repeated and status polls report `running`
//! (or `stopped` once `stop_test` was called), so long loops need only a
//! short script.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::run::{RunStatus, RunStatusKind};
use crate::domain::stats::{RawRunStatistics, RawStatistic};
use crate::error::Result;
use crate::port::outbound::controller::{
    ControllerClient, DeviceInfo, DevicePort, DeviceSlot, RunSummary, TestConfig, TestRun,
    TestUpdate,
};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Status poll with the given status and sub status.
pub fn status(kind: RunStatusKind, sub_status: Option<&str>) -> RunStatus {
    RunStatus {
        status: kind,
        sub_status: sub_status.map(str::to_string),
        progress: None,
        time_elapsed: None,
        time_remaining: None,
        result_id: Some("result-1".into()),
    }
}

/// A `running` poll with traffic flowing.
pub fn running() -> RunStatus {
    status(RunStatusKind::Running, None)
}

/// Statistics sample with transactions, load and the run clock set.
pub fn sample(tps: f64, load: f64, elapsed: f64, remaining: f64) -> RawRunStatistics {
    RawRunStatistics {
        client: vec![
            RawStatistic::nested("sum", "successfulTxnsPerSec", tps),
            RawStatistic::nested("sum", "successfulTxns", tps * elapsed),
            RawStatistic::nested("sum", "establishedConnRate", tps / 2.0),
            RawStatistic::nested("sum", "currentLoadSpecCount", load),
            RawStatistic::nested("sum", "desiredLoadSpecCount", load),
            RawStatistic::nested("driver", "rxBandwidth", tps * 8.0),
            RawStatistic::nested("driver", "txBandwidth", tps * 2.0),
            RawStatistic::nested("loadspec", "cpuUtilized", 20.0),
            RawStatistic::scalar("timeElapsed", elapsed),
            RawStatistic::scalar("timeRemaining", remaining),
        ],
        server: vec![RawStatistic::nested("memory", "cpuUtilized", 20.0)],
    }
}

/// Test definition with one client and one server port on device `dev`.
pub fn test_config() -> TestConfig {
    TestConfig {
        name: "tput".into(),
        queue_id: Some("queue-1".into()),
        client_ports: vec!["dev/1".into()],
        server_ports: vec!["dev/2".into()],
        load_type: Some("SimUsers".into()),
        sampling_interval: Some(4),
        response_length: Some(1024),
    }
}

/// Device whose client port has 1000 Mbps, 4 cores and capacity 8.
pub fn device_info() -> DeviceInfo {
    DeviceInfo {
        ip: "10.0.0.5".into(),
        description: "CF  9000".into(),
        firmware: "20.1".into(),
        slots: vec![DeviceSlot {
            profile: "Performance-Standard".into(),
            model: "cf-9000".into(),
            ports: vec![
                DevicePort {
                    system_id: "dev/1".into(),
                    speed: 1000,
                    cores: 4,
                    capacity: 8,
                },
                DevicePort {
                    system_id: "dev/2".into(),
                    speed: 1000,
                    cores: 4,
                    capacity: 8,
                },
            ],
        }],
    }
}

/// Started run handle `run-1`.
pub fn started_run() -> TestRun {
    TestRun {
        id: "run-1".into(),
        status: RunStatusKind::Waiting,
        sub_status: None,
        type_v1: "http".into(),
    }
}

// ---------------------------------------------------------------------------
// ScriptedController
// ---------------------------------------------------------------------------

/// Calls recorded by a [`ScriptedController`], shared with the test.
#[derive(Debug, Default)]
pub struct ControllerCalls {
    connects: AtomicU32,
    status_polls: AtomicU32,
    updates: Mutex<Vec<TestUpdate>>,
    load_changes: Mutex<Vec<(String, i64)>>,
    stops: Mutex<Vec<String>>,
}

impl ControllerCalls {
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> u32 {
        self.status_polls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<TestUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// `(run id, load)` of every load change, in order.
    pub fn load_changes(&self) -> Vec<(String, i64)> {
        self.load_changes.lock().unwrap().clone()
    }

    /// Loads of every load change, in order.
    pub fn loads(&self) -> Vec<i64> {
        self.load_changes().into_iter().map(|(_, load)| load).collect()
    }

    /// Run ids that were stopped, in order.
    pub fn stops(&self) -> Vec<String> {
        self.stops.lock().unwrap().clone()
    }
}

/// A mock controller with scripted responses.
pub struct ScriptedController {
    address: String,
    test_config: TestConfig,
    device: DeviceInfo,
    start_results: Mutex<VecDeque<Result<TestRun>>>,
    statuses: Mutex<VecDeque<Result<RunStatus>>>,
    statistics: Mutex<VecDeque<Result<RawRunStatistics>>>,
    last_statistics: Mutex<RawRunStatistics>,
    change_results: Mutex<VecDeque<Result<()>>>,
    runs: Vec<RunSummary>,
    stopped: AtomicBool,
    calls: Arc<ControllerCalls>,
}

impl ScriptedController {
    pub fn new() -> Self {
        Self {
            address: "ctl.test".into(),
            test_config: test_config(),
            device: device_info(),
            start_results: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            statistics: Mutex::new(VecDeque::new()),
            last_statistics: Mutex::new(RawRunStatistics::default()),
            change_results: Mutex::new(VecDeque::new()),
            runs: Vec::new(),
            stopped: AtomicBool::new(false),
            calls: Arc::new(ControllerCalls::default()),
        }
    }

    pub fn with_test_config(mut self, config: TestConfig) -> Self {
        self.test_config = config;
        self
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    pub fn with_start_results(self, results: Vec<Result<TestRun>>) -> Self {
        *self.start_results.lock().unwrap() = results.into();
        self
    }

    pub fn with_statuses(self, statuses: Vec<RunStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into_iter().map(Ok).collect();
        self
    }

    pub fn with_status_results(self, results: Vec<Result<RunStatus>>) -> Self {
        *self.statuses.lock().unwrap() = results.into();
        self
    }

    pub fn with_statistics(self, samples: Vec<RawRunStatistics>) -> Self {
        *self.statistics.lock().unwrap() = samples.into_iter().map(Ok).collect();
        self
    }

    pub fn with_statistics_results(self, results: Vec<Result<RawRunStatistics>>) -> Self {
        *self.statistics.lock().unwrap() = results.into();
        self
    }

    pub fn with_change_results(self, results: Vec<Result<()>>) -> Self {
        *self.change_results.lock().unwrap() = results.into();
        self
    }

    pub fn with_runs(mut self, runs: Vec<RunSummary>) -> Self {
        self.runs = runs;
        self
    }

    /// Shared record of the calls made so far.
    pub fn calls(&self) -> Arc<ControllerCalls> {
        self.calls.clone()
    }
}

impl Default for ScriptedController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControllerClient for ScriptedController {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<()> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn test_config(&self, _test_type: &str, _test_id: &str) -> Result<TestConfig> {
        Ok(self.test_config.clone())
    }

    async fn update_test(&self, _test_type: &str, _test_id: &str, update: &TestUpdate) -> Result<()> {
        self.calls.updates.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn device_info(&self, _device_id: &str) -> Result<DeviceInfo> {
        Ok(self.device.clone())
    }

    async fn start_test(&self, _test_id: &str) -> Result<TestRun> {
        self.start_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(started_run()))
    }

    async fn run_status(&self, _run_id: &str) -> Result<RunStatus> {
        self.calls.status_polls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.statuses.lock().unwrap().pop_front() {
            return next;
        }
        if self.stopped.load(Ordering::SeqCst) {
            Ok(status(RunStatusKind::Stopped, None))
        } else {
            Ok(running())
        }
    }

    async fn run_statistics(&self, _run_id: &str) -> Result<RawRunStatistics> {
        let next = self.statistics.lock().unwrap().pop_front();
        match next {
            Some(Ok(sample)) => {
                *self.last_statistics.lock().unwrap() = sample.clone();
                Ok(sample)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last_statistics.lock().unwrap().clone()),
        }
    }

    async fn change_load(&self, run_id: &str, load: i64) -> Result<()> {
        self.calls
            .load_changes
            .lock()
            .unwrap()
            .push((run_id.to_string(), load));
        self.change_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn stop_test(&self, run_id: &str) -> Result<()> {
        self.calls.stops.lock().unwrap().push(run_id.to_string());
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        Ok(self.runs.clone())
    }
}
