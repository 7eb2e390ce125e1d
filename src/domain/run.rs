//! Run configuration, the resolved run profile and the mutable run state.
//!
//! [`TestRunConfig`] is what the operator asked for. [`RunProfile`] is that
//! request after it was reconciled with the controller and device (load key,
//! capacity adjust, sampling interval). [`RunState`] is owned by the run loop
//! and threaded through every control step.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use super::error::DomainError;
use super::increment::LoadIncrementPolicy;
use super::kpi::{Kpi, KpiCombine};
use super::phase::{ControlMode, Phase, PhaseBoundaries, PhaseTracker};
use super::resource::{ResourceScope, ResourceSnapshot};
use super::rolling::{RollingSample, RollingStat, RollingStats, StatKind};
use super::stats::{RawRunStatistics, RunStatistics};
use super::test_type::{CapacityAdjust, LoadPlan, LoadType, SeekStrategy, TestType};

/// CPU utilisation (percent) above which the rolling windows shrink.
pub const CPU_SHRINK_THRESHOLD: f64 = 70.0;
/// Window size used once CPU is saturated.
pub const SHRUNK_SAMPLE_SIZE: usize = 3;

/// Load step sizes, in raw load units before the capacity adjust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increments {
    pub low: i64,
    pub med: i64,
    pub high: i64,
}

/// KPI or load thresholds selecting the low, med or high increment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub low: f64,
    pub med: f64,
    pub high: f64,
}

/// Phase durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDurations {
    pub duration: u64,
    pub startup: u64,
    pub rampup: u64,
    pub rampdown: u64,
    pub shutdown: u64,
}

impl PhaseDurations {
    /// Startup, rampup, rampdown and shutdown together must fit in the run.
    pub fn validate(&self) -> Result<(), DomainError> {
        let phases = self.startup + self.rampup + self.rampdown + self.shutdown;
        if phases > self.duration {
            return Err(DomainError::InvalidPhaseBoundaries {
                phases,
                duration: self.duration,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn steady(&self) -> u64 {
        self.duration
            .saturating_sub(self.startup + self.rampup + self.rampdown + self.shutdown)
    }

    #[must_use]
    pub fn boundaries(&self, interval: u64) -> PhaseBoundaries {
        PhaseBoundaries {
            duration: self.duration as f64,
            startup: self.startup as f64,
            rampup: self.rampup as f64,
            rampdown: self.rampdown as f64,
            shutdown: self.shutdown as f64,
            interval: interval as f64,
        }
    }
}

/// Ramp seek settings: drive `kpi` towards `target` in `steps` load changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampSeekSettings {
    pub kpi: Kpi,
    pub target: f64,
    pub steps: u32,
    /// Goal seek increments recomputed after each ramp step, as percent of
    /// the new load.
    pub low_pct: f64,
    pub med_pct: f64,
    pub high_pct: f64,
}

/// One configured test, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRunConfig {
    pub name: String,
    pub test_id: String,
    /// Controller test type string, e.g. `http_throughput`.
    pub test_type: String,
    pub load_type: String,
    pub suite: String,
    pub start_load: i64,
    pub increments: Increments,
    pub thresholds: Thresholds,
    pub phases: PhaseDurations,
    pub sustain_period: u64,
    pub goal_seek: bool,
    pub capacity_adjust: CapacityAdjust,
    pub variance_sample_size: usize,
    pub max_variance: f64,
    pub kpi_1: Kpi,
    pub kpi_2: Kpi,
    pub kpi_combine: KpiCombine,
    pub ramp_seek: Option<RampSeekSettings>,
    pub living_simusers_max: Option<u64>,
    pub strategy: SeekStrategy,
}

/// Device facts the run depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSummary {
    pub ip: String,
    pub firmware: String,
    /// Description without its 4-character prefix.
    pub description: String,
    /// Slot profile with any `Functional-`/`Performance-`/`Maximum-` prefix removed.
    pub profile: String,
    pub model: String,
    /// Summed speed of the client ports, in Mbps.
    pub queue_speed: u64,
    pub client_cores: u64,
    pub queue_capacity: u64,
}

impl DeviceSummary {
    /// Virtual appliances report `CFV` as their description.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.description == "CFV"
    }

    /// Directory the detailed report for this device goes to.
    #[must_use]
    pub fn report_dir(&self) -> String {
        if self.is_virtual() {
            format!("{}-{}", self.description, self.model)
        } else {
            format!("{}-{}", self.description, self.profile)
        }
    }

    /// File name prefix of the detailed report.
    #[must_use]
    pub fn report_prefix(&self) -> String {
        format!("{}_{}", self.ip, self.firmware)
    }
}

/// A test configuration reconciled with the controller and the device.
#[derive(Debug, Clone, PartialEq)]
pub struct RunProfile {
    pub config: TestRunConfig,
    pub test_type: TestType,
    pub plan: LoadPlan,
    pub strategy: SeekStrategy,
    pub start_load: i64,
    pub capacity_adjust: u64,
    /// Phase durations as pushed to the controller.
    pub phases: PhaseDurations,
    pub goal_seek: bool,
    /// Statistics sampling interval in seconds.
    pub interval: u64,
    pub device: DeviceSummary,
    pub client_ports: Vec<String>,
    pub server_ports: Vec<String>,
}

impl RunProfile {
    #[must_use]
    pub fn load_type(&self) -> Option<LoadType> {
        self.plan.load_type
    }

    #[must_use]
    pub fn core_count(&self) -> u64 {
        self.device.client_cores
    }

    #[must_use]
    pub fn queue_speed(&self) -> f64 {
        self.device.queue_speed as f64
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Settle time after a goal seek load change.
    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.interval * 4)
    }

    #[must_use]
    pub fn ramp_seek_enabled(&self) -> bool {
        self.config.ramp_seek.is_some()
    }

    /// Resource set considered when choosing the scarcest resource.
    #[must_use]
    pub fn resource_scope(&self, seek_count: u32) -> ResourceScope {
        if self.test_type == TestType::Conns
            && self.load_type() != Some(LoadType::SimUsersPerSecond)
        {
            ResourceScope::MemoryOnly
        } else {
            ResourceScope::Full {
                include_memory: seek_count >= 2,
            }
        }
    }

    /// Load type label recorded in result rows.
    #[must_use]
    pub fn load_type_label(&self) -> &str {
        match (self.load_type(), self.strategy) {
            (Some(load_type), _) => load_type.as_str(),
            (None, SeekStrategy::Resource) => "",
            (None, SeekStrategy::Threshold) => &self.config.load_type,
        }
    }
}

/// Controller-side lifecycle state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatusKind {
    Waiting,
    Running,
    Finished,
    Failed,
    Stopped,
    Other(String),
}

impl RunStatusKind {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "waiting" => Self::Waiting,
            "running" => Self::Running,
            "finished" => Self::Finished,
            "failed" => Self::Failed,
            "stopped" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Other(other) => other,
        }
    }

    /// The run ended on the controller without being stopped by us.
    #[must_use]
    pub fn has_ended(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for RunStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One run status poll.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatus {
    pub status: RunStatusKind,
    /// Transient sub status; `None` once traffic flows.
    pub sub_status: Option<String>,
    pub progress: Option<f64>,
    pub time_elapsed: Option<f64>,
    pub time_remaining: Option<f64>,
    /// Result id, known once the run is running.
    pub result_id: Option<String>,
}

/// Best stable KPI-1 value seen and what accompanied it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HighestPair {
    pub kpi_1: f64,
    pub kpi_2: f64,
    pub load: f64,
    pub desired_load: f64,
    pub bandwidth: f64,
    pub conns: f64,
}

/// Client and server figures captured on the first non-zero sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StartupBaselines {
    pub client_load: f64,
    pub client_memory_used: f64,
    pub server_memory_used: f64,
}

impl StartupBaselines {
    pub fn observe(&mut self, stats: &RunStatistics) {
        if self.client_load == 0.0 {
            self.client_load = stats.client.current_load;
        }
        if self.client_memory_used == 0.0 {
            self.client_memory_used = stats.client.memory_main_used;
        }
        if self.server_memory_used == 0.0 {
            self.server_memory_used = stats.server.memory_main_used;
        }
    }
}

/// Ramp seek progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampProgress {
    pub steps_left: u32,
    pub complete: bool,
}

/// Seconds spent in each lifecycle step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    pub to_run: u64,
    pub to_start: u64,
    pub to_activity: u64,
    pub stop_started: u64,
    pub to_stop: u64,
}

/// Why the control loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// Current load dropped to zero during a seek.
    ZeroLoad,
    /// Failed or aborted transactions observed while goal seeking.
    TransactionFailures { unsuccessful: f64, aborted: f64 },
    /// Max load persisted over two seek attempts.
    MaxLoadReached,
    /// Open connections are stable at max load.
    OpenConnectionsSaturated,
    /// Goal seek found no valid next load.
    NoNextLoad,
    /// The controller reports no remaining time.
    TimeExpired,
    /// Less than 30 s left while seeking.
    SeekWindowClosed,
    /// The time phase reached `finished`.
    Finished,
    /// Statistics needed to steer were absent.
    MissingStatistics(DomainError),
    /// A control step could not reach the controller.
    ControllerUnavailable(String),
}

impl StopReason {
    /// Whether the control loop ended without a controller or statistics
    /// failure. Only normal stops hold load for the sustain period.
    #[must_use]
    pub const fn is_normal(&self) -> bool {
        !matches!(self, Self::MissingStatistics(_) | Self::ControllerUnavailable(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroLoad => f.write_str("current load is zero"),
            Self::TransactionFailures {
                unsuccessful,
                aborted,
            } => write!(
                f,
                "failed transactions: {unsuccessful} unsuccessful, {aborted} aborted"
            ),
            Self::MaxLoadReached => f.write_str("max load reached"),
            Self::OpenConnectionsSaturated => f.write_str("open connections saturated"),
            Self::NoNextLoad => f.write_str("no valid next load"),
            Self::TimeExpired => f.write_str("no time remaining"),
            Self::SeekWindowClosed => f.write_str("less than 30s remaining while seeking"),
            Self::Finished => f.write_str("run finished"),
            Self::MissingStatistics(err) => write!(f, "{err}"),
            Self::ControllerUnavailable(err) => write!(f, "controller unavailable: {err}"),
        }
    }
}

/// A load change to issue and how long to wait before trusting samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadChangeRequest {
    pub target: i64,
    pub settle: Duration,
}

/// Why a run did not complete.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// Configuration could not be reconciled with the controller.
    Setup(String),
    /// The controller refused to start the test.
    StartFailed(String),
    /// The run never reached `running`.
    NeverRunning,
    /// The run kept a sub status for too long.
    NeverStarted,
    /// No successful transactions appeared.
    NoActivity,
    /// The controller reported the run as ended while waiting.
    RunEnded(RunStatusKind),
    /// The run did not reach a terminal status after stop.
    StopTimeout,
    /// A status or statistics request failed.
    Controller(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup(err) => write!(f, "setup failed: {err}"),
            Self::StartFailed(err) => write!(f, "test did not start: {err}"),
            Self::NeverRunning => f.write_str("run did not transition to running"),
            Self::NeverStarted => f.write_str("run did not transition to traffic state"),
            Self::NoActivity => f.write_str("run had no successful transactions"),
            Self::RunEnded(status) => write!(f, "run ended with status {status}"),
            Self::StopTimeout => f.write_str("run did not transition to a finished status"),
            Self::Controller(err) => write!(f, "controller request failed: {err}"),
        }
    }
}

/// Result of driving one test.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { stop: Option<StopReason> },
    Failed(FailureReason),
}

impl RunOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Mutable state of one run.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Run handle used for status, statistics and load changes.
    pub run_id: String,
    /// Controller test type label (v1), used in links.
    pub type_v1: String,
    pub status: Option<RunStatus>,
    pub phase: Option<Phase>,
    pub stats: RunStatistics,
    pub elapsed: f64,
    pub remaining: f64,
    pub rolling: RollingStats,
    pub policy: LoadIncrementPolicy,
    pub baselines: StartupBaselines,
    pub max_load_reached: bool,
    pub seek_count: u32,
    pub seeks_after_max: u32,
    pub first_goal_step: bool,
    pub highest: HighestPair,
    pub new_loads: Vec<i64>,
    pub increments: Increments,
    pub capacity_adjust: u64,
    pub ramp: Option<RampProgress>,
    pub tracker: PhaseTracker,
    pub stop: Option<StopReason>,
    pub timings: Timings,
    pub report_link: Option<String>,
}

impl RunState {
    #[must_use]
    pub fn new(profile: &RunProfile, run_id: impl Into<String>, type_v1: impl Into<String>) -> Self {
        let config = &profile.config;
        Self {
            run_id: run_id.into(),
            type_v1: type_v1.into(),
            status: None,
            phase: None,
            stats: RunStatistics::default(),
            elapsed: 0.0,
            remaining: 0.0,
            rolling: RollingStats::new(config.variance_sample_size),
            policy: LoadIncrementPolicy::new(),
            baselines: StartupBaselines::default(),
            max_load_reached: false,
            seek_count: 0,
            seeks_after_max: 0,
            first_goal_step: true,
            highest: HighestPair::default(),
            new_loads: Vec::new(),
            increments: config.increments,
            capacity_adjust: profile.capacity_adjust,
            ramp: config.ramp_seek.map(|ramp| RampProgress {
                steps_left: ramp.steps,
                complete: false,
            }),
            tracker: PhaseTracker::new(profile.phases.boundaries(profile.interval), !profile.goal_seek),
            stop: None,
            timings: Timings::default(),
            report_link: None,
        }
    }

    /// Whether ramp seek has nothing left to do (or was never enabled).
    #[must_use]
    pub fn ramp_complete(&self) -> bool {
        self.ramp.map_or(true, |ramp| ramp.complete)
    }

    pub fn complete_ramp(&mut self) {
        if let Some(ramp) = self.ramp.as_mut() {
            ramp.complete = true;
        }
        self.capacity_adjust = 1;
    }

    #[must_use]
    pub fn control_mode(&self, goal_seek: bool) -> ControlMode {
        if !self.ramp_complete() {
            ControlMode::RampSeek
        } else if goal_seek {
            ControlMode::GoalSeek
        } else {
            ControlMode::Time
        }
    }

    /// Record a status poll.
    pub fn record_status(&mut self, status: RunStatus) {
        self.status = Some(status);
    }

    #[must_use]
    pub fn sub_status_clear(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.sub_status.is_none())
    }

    /// Map a statistics sample and update the startup baselines.
    pub fn record_statistics(&mut self, raw: &RawRunStatistics, test_type: TestType) {
        let stats = RunStatistics::from_raw(raw, test_type, &self.stats);
        if !stats.missing.is_empty() {
            debug!(missing = ?stats.missing, "Statistics absent from sample");
        }
        self.baselines.observe(&stats);
        if let Some(elapsed) = stats.client.time_elapsed {
            self.elapsed = elapsed;
        }
        if let Some(remaining) = stats.client.time_remaining {
            self.remaining = remaining;
        }
        self.stats = stats;
    }

    /// Recompute the effective phase for `elapsed` seconds.
    pub fn update_phase(&mut self, elapsed: f64, goal_seek: bool) -> Option<Phase> {
        let mode = self.control_mode(goal_seek);
        self.phase = self.tracker.update(elapsed, mode);
        self.phase
    }

    /// Apply the time-based stop rules. Returns the reason when the loop
    /// must stop.
    pub fn check_stop_conditions(&mut self, remaining: f64, profile: &RunProfile) -> Option<StopReason> {
        let mut reason = None;
        if remaining == 0.0 {
            self.phase = Some(Phase::Timeout);
            reason = Some(StopReason::TimeExpired);
        }
        if remaining < 30.0 && (profile.goal_seek || profile.ramp_seek_enabled()) {
            self.phase = Some(Phase::Timeout);
            reason = Some(StopReason::SeekWindowClosed);
        }
        if self.phase == Some(Phase::Finished) {
            reason = Some(StopReason::Finished);
        }
        if let Some(reason) = &reason {
            self.stop = Some(reason.clone());
        }
        reason
    }

    /// Shrink every window once either side runs hot. Never grows back.
    pub fn shrink_windows_on_cpu(&mut self) {
        let hot = self.stats.client.cpu_utilized > CPU_SHRINK_THRESHOLD
            || self.stats.server.cpu_utilized > CPU_SHRINK_THRESHOLD;
        if hot && self.rolling.capacity() != SHRUNK_SAMPLE_SIZE {
            debug!(sample_size = SHRUNK_SAMPLE_SIZE, "CPU above threshold, shrinking windows");
            self.rolling.set_capacity(SHRUNK_SAMPLE_SIZE);
        }
    }

    /// Feed this tick's statistics into the rolling windows.
    pub fn update_rolling(&mut self, tolerance: f64) {
        let client = &self.stats.client;
        let sample = RollingSample {
            tps: client.successful_txns_per_sec,
            ttfb: client.avg_ttfb,
            load: client.current_load,
            cps: client.established_conn_rate,
            conns: client.established_conns,
            bw: self.stats.total_bandwidth,
        };
        self.rolling.update(&sample, tolerance);
    }

    #[must_use]
    pub fn kpi(&self, kpi: Kpi) -> &RollingStat {
        self.rolling.get(kpi.stat())
    }

    #[must_use]
    pub fn seek_ready(&self) -> bool {
        self.rolling.get(StatKind::SeekTicks).is_stable()
    }

    /// Restart the ticks-since-last-change counter.
    pub fn reset_seek_ticks(&mut self) {
        self.rolling.get_mut(StatKind::SeekTicks).reset();
    }

    /// Track the best observed KPI-1 value and re-arm seeking when it
    /// improves.
    pub fn update_highest_pair(&mut self, profile: &RunProfile) {
        let config = &profile.config;
        let kpi_1 = self.rolling.get(config.kpi_1.stat()).clone();
        let kpi_2_avg = self.rolling.get(config.kpi_2.stat()).average();
        let bw_avg = self.rolling.get(StatKind::Bw).average();
        let client = &self.stats.client;

        let candidate = HighestPair {
            kpi_1: kpi_1.average(),
            kpi_2: kpi_2_avg,
            load: client.current_load,
            desired_load: client.desired_load,
            bandwidth: bw_avg,
            conns: client.established_conns,
        };

        if profile.test_type == TestType::Conns {
            if client.established_conns > self.highest.conns {
                self.rearm();
                self.highest = candidate;
            }
            return;
        }

        if self.highest.kpi_1 != 0.0
            && 100.0 * (kpi_1.average() - self.highest.kpi_1) / self.highest.kpi_1 >= 0.03
        {
            self.rearm();
        }
        let improved = if profile.device.is_virtual() {
            kpi_1.average() >= self.highest.kpi_1
        } else {
            kpi_1.average() > self.highest.kpi_1
        };
        if improved && kpi_1.is_stable() {
            self.highest = candidate;
        }
    }

    fn rearm(&mut self) {
        self.max_load_reached = false;
        self.seeks_after_max = 0;
    }

    /// Headroom snapshot for this tick.
    #[must_use]
    pub fn resources(&self, profile: &RunProfile) -> ResourceSnapshot {
        ResourceSnapshot::from_stats(&self.stats, profile.queue_speed())
    }
}
