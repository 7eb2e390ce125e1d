//! Run loop: drives one started test from `waiting` to a terminal status.
//!
//! # Lifecycle
//!
//! ```text
//! start_test
//!     |
//!     +-- wait for running      (duplicate run check after 120s, 1800s max)
//!     +-- wait for sub status   (360s max)
//!     +-- wait for activity     (180s max)
//!     |
//!     +-- control loop          (one tick per sampling interval)
//!     |      stats -> phase -> stop conditions -> windows -> highest pair
//!     |            -> row -> ramp seek | goal seek
//!     |
//!     +-- sustain               (goal seek with a sustain period)
//!     +-- stop and wait         (1800s max)
//! ```
//!
//! Every wait polls once per sampling interval. Remote failures end the run
//! as a [`RunOutcome::Failed`]; they never escape as errors.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::seek::{GoalSeekController, RampSeekController, SeekAction};
use crate::domain::numeric::round_int;
use crate::domain::phase::Phase;
use crate::domain::report::ResultRow;
use crate::domain::rolling::StatKind;
use crate::domain::run::{
    FailureReason, LoadChangeRequest, RunOutcome, RunProfile, RunState, RunStatus, RunStatusKind,
    StopReason,
};
use crate::port::outbound::controller::ControllerClient;
use crate::port::outbound::sink::ResultSink;

/// Waiting time after which duplicate runs of the same test are looked for.
const DUPLICATE_CHECK_AFTER: Duration = Duration::from_secs(120);
const RUNNING_TIMEOUT: Duration = Duration::from_secs(1800);
const SUB_STATUS_TIMEOUT: Duration = Duration::from_secs(360);
const ACTIVITY_TIMEOUT: Duration = Duration::from_secs(180);
const STOP_TIMEOUT: Duration = Duration::from_secs(1800);
/// Remaining seconds below which a seeking sustain period ends.
const SUSTAIN_MIN_REMAINING: f64 = 30.0;

/// Version tag written into every report row.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

type WaitResult = Result<(), FailureReason>;

/// Drives one test run against the controller.
pub struct RunLoop<'a> {
    controller: &'a dyn ControllerClient,
    sink: &'a mut dyn ResultSink,
    profile: &'a RunProfile,
    started: Instant,
}

impl<'a> RunLoop<'a> {
    pub fn new(
        controller: &'a dyn ControllerClient,
        sink: &'a mut dyn ResultSink,
        profile: &'a RunProfile,
    ) -> Self {
        Self {
            controller,
            sink,
            profile,
            started: Instant::now(),
        }
    }

    /// Start the test and drive it to completion.
    pub async fn run(mut self) -> RunOutcome {
        let profile = self.profile;
        let config = &profile.config;
        self.started = Instant::now();
        let run = match self.controller.start_test(&config.test_id).await {
            Ok(run) => run,
            Err(err) => {
                error!(test = %config.name, error = %err, "Test did not start");
                return RunOutcome::Failed(FailureReason::StartFailed(err.to_string()));
            }
        };
        info!(
            test = %config.name,
            run_id = %run.id,
            status = %run.status,
            live_charts = %format!(
                "https://{}/#livecharts/{}/{}",
                self.controller.address(),
                run.type_v1,
                run.id
            ),
            "Test started"
        );

        let mut state = RunState::new(profile, run.id, run.type_v1);
        self.save_row(&state);

        if let Err(reason) = self.wait_until_active(&mut state).await {
            return self.abort(&mut state, reason).await;
        }

        state.reset_seek_ticks();
        self.control(&mut state).await;

        let stopped_normally = state.stop.as_ref().map_or(true, StopReason::is_normal);
        if profile.goal_seek && config.sustain_period > 0 {
            if stopped_normally {
                self.sustain(&mut state).await;
            } else {
                warn!(stop = ?state.stop.as_ref().map(ToString::to_string), "Skipping sustain period");
            }
        }

        if let Err(reason) = self.stop_and_wait(&mut state).await {
            self.save_row(&state);
            return RunOutcome::Failed(reason);
        }
        self.save_row(&state);
        info!(
            test = %config.name,
            stop = ?state.stop.as_ref().map(ToString::to_string),
            to_run = state.timings.to_run,
            to_start = state.timings.to_start,
            to_activity = state.timings.to_activity,
            to_stop = state.timings.to_stop,
            "Run complete"
        );
        RunOutcome::Completed { stop: state.stop }
    }

    async fn wait_until_active(&mut self, state: &mut RunState) -> WaitResult {
        self.wait_for_running(state).await?;
        self.wait_for_sub_status(state).await?;
        self.wait_for_activity(state).await
    }

    // -------------------------------------------------------------------------
    // Bounded waits
    // -------------------------------------------------------------------------

    async fn wait_for_running(&mut self, state: &mut RunState) -> WaitResult {
        let waiting = Instant::now();
        let result_id = loop {
            sleep(self.profile.interval()).await;
            let status = self.poll_status(state).await?;
            if status.status == RunStatusKind::Running {
                break status.result_id;
            }
            info!(
                elapsed = self.timer(),
                status = %status.status,
                sub_status = ?status.sub_status,
                "Waiting for run to start"
            );
            if status.status.has_ended() {
                error!(status = %status.status, "Run ended before running");
                return Err(FailureReason::RunEnded(status.status));
            }
            if waiting.elapsed() > DUPLICATE_CHECK_AFTER && status.status == RunStatusKind::Waiting {
                self.adopt_duplicate_run(state).await;
            }
            if waiting.elapsed() > RUNNING_TIMEOUT {
                error!(waited = RUNNING_TIMEOUT.as_secs(), "Run did not transition to running");
                return Err(FailureReason::NeverRunning);
            }
        };

        state.timings.to_run = self.timer();
        state.report_link = result_id.map(|id| {
            format!(
                "https://{}/#results/{}/{}",
                self.controller.address(),
                state.type_v1,
                id
            )
        });
        info!(elapsed = state.timings.to_run, report = ?state.report_link, "Run is running");
        Ok(())
    }

    /// A retried start request can leave a second run of the same test
    /// running while ours waits. Stop ours and follow the running one.
    async fn adopt_duplicate_run(&self, state: &mut RunState) {
        let runs = match self.controller.list_runs().await {
            Ok(runs) => runs,
            Err(err) => {
                warn!(error = %err, "Could not list runs");
                return;
            }
        };
        let test_id = &self.profile.config.test_id;
        let duplicate = runs.into_iter().find(|run| {
            run.status == RunStatusKind::Running && &run.test_id == test_id && run.id != state.run_id
        });
        let Some(duplicate) = duplicate else {
            debug!(test_id = %test_id, "No duplicate run found");
            return;
        };

        info!(waiting = %state.run_id, running = %duplicate.id, "Switching to duplicate run");
        if let Err(err) = self.controller.stop_test(&state.run_id).await {
            error!(run_id = %state.run_id, error = %err, "Failed to stop waiting run");
        }
        state.run_id = duplicate.id;
    }

    async fn wait_for_sub_status(&mut self, state: &mut RunState) -> WaitResult {
        let waiting = Instant::now();
        loop {
            sleep(self.profile.interval()).await;
            let status = self.poll_status(state).await?;
            info!(
                elapsed = self.timer(),
                status = %status.status,
                sub_status = ?status.sub_status,
                "Waiting for traffic"
            );
            if status.sub_status.is_none() {
                break;
            }
            if status.status.has_ended() {
                error!(status = %status.status, "Run ended before traffic started");
                return Err(FailureReason::RunEnded(status.status));
            }
            if waiting.elapsed() > SUB_STATUS_TIMEOUT {
                error!(waited = SUB_STATUS_TIMEOUT.as_secs(), "Run did not transition to traffic state");
                return Err(FailureReason::NeverStarted);
            }
        }
        state.timings.to_start = self.timer().saturating_sub(state.timings.to_run);
        Ok(())
    }

    async fn wait_for_activity(&mut self, state: &mut RunState) -> WaitResult {
        let waiting = Instant::now();
        loop {
            let status = self.poll_status(state).await?;
            let raw = self
                .controller
                .run_statistics(&state.run_id)
                .await
                .map_err(|err| {
                    error!(error = %err, "Failed to fetch run statistics");
                    FailureReason::Controller(err.to_string())
                })?;
            state.record_statistics(&raw, self.profile.test_type);
            if state.sub_status_clear() {
                self.log_tick(state);
                self.save_row(state);
            }

            if status.status.has_ended() {
                error!(status = %status.status, "Run ended before activity");
                return Err(FailureReason::RunEnded(status.status));
            }
            if state.stats.client.successful_txns_per_sec > 0.0 {
                break;
            }
            if waiting.elapsed() > ACTIVITY_TIMEOUT {
                error!(waited = ACTIVITY_TIMEOUT.as_secs(), "Run had no successful transactions");
                return Err(FailureReason::NoActivity);
            }
            sleep(self.profile.interval()).await;
        }
        let before = state.timings.to_start + state.timings.to_run;
        state.timings.to_activity = self.timer().saturating_sub(before);
        Ok(())
    }

    async fn poll_status(&self, state: &mut RunState) -> Result<RunStatus, FailureReason> {
        let status = self
            .controller
            .run_status(&state.run_id)
            .await
            .map_err(|err| {
                error!(run_id = %state.run_id, error = %err, "Failed to fetch run status");
                FailureReason::Controller(err.to_string())
            })?;
        state.record_status(status.clone());
        Ok(status)
    }

    // -------------------------------------------------------------------------
    // Control loop
    // -------------------------------------------------------------------------

    async fn control(&mut self, state: &mut RunState) {
        let profile = self.profile;
        let config = &profile.config;
        while state.stop.is_none() {
            let remaining = match self.sample(state).await {
                Ok(remaining) => remaining,
                Err(reason) => {
                    state.stop = Some(reason);
                    break;
                }
            };
            if let Some(reason) = state.check_stop_conditions(remaining, profile) {
                info!(reason = %reason, remaining = state.remaining, "Control loop ending");
            }
            state.shrink_windows_on_cpu();
            state.update_rolling(config.max_variance);
            state.update_highest_pair(profile);
            if state.sub_status_clear() {
                self.log_tick(state);
                self.save_row(state);
            }

            if profile.ramp_seek_enabled() && !state.ramp_complete() {
                let action = RampSeekController::new(profile).step(state);
                self.apply(state, action).await;
            }
            if profile.goal_seek && state.ramp_complete() {
                let action = GoalSeekController::new(profile).step(state);
                self.apply(state, action).await;
            }
            sleep(profile.interval()).await;
        }
    }

    /// Fetch and record one statistics sample, then recompute the phase.
    /// Returns the remaining run time.
    async fn sample(&mut self, state: &mut RunState) -> Result<f64, StopReason> {
        let raw = self
            .controller
            .run_statistics(&state.run_id)
            .await
            .map_err(|err| {
                error!(run_id = %state.run_id, error = %err, "Failed to fetch run statistics");
                StopReason::ControllerUnavailable(err.to_string())
            })?;
        state.record_statistics(&raw, self.profile.test_type);
        let (elapsed, remaining) = state.stats.times().map_err(|err| {
            error!(error = %err, "Cannot steer without run times");
            StopReason::MissingStatistics(err)
        })?;
        state.update_phase(elapsed, self.profile.goal_seek);
        Ok(remaining)
    }

    async fn apply(&mut self, state: &mut RunState, action: SeekAction) {
        match action {
            SeekAction::Hold => {}
            SeekAction::Change(request) => self.change_load(state, request).await,
            SeekAction::Stop(reason) => {
                info!(reason = %reason, "Seek stopped the run");
                state.stop = Some(reason);
            }
        }
    }

    /// Issue a load change and wait for it to settle. Windows are re-based
    /// only when the controller accepted the change.
    async fn change_load(&mut self, state: &mut RunState, request: LoadChangeRequest) {
        info!(
            from = state.stats.client.current_load,
            to = request.target,
            status = ?state.status.as_ref().map(|s| s.status.to_string()),
            "Changing load"
        );
        match self.controller.change_load(&state.run_id, request.target).await {
            Ok(()) => state.rolling.commit(),
            Err(err) => error!(target = request.target, error = %err, "Load change failed"),
        }
        debug!(settle = request.settle.as_secs(), "Waiting for load to settle");
        sleep(request.settle).await;
    }

    // -------------------------------------------------------------------------
    // Sustain and stop
    // -------------------------------------------------------------------------

    /// Hold the best observed load for the sustain period.
    async fn sustain(&mut self, state: &mut RunState) {
        let profile = self.profile;
        state.phase = Some(Phase::Steady);
        let desired = state.highest.desired_load;
        if desired != 0.0 {
            info!(load = desired, "Sustaining highest stable load");
            if let Err(err) = self.controller.change_load(&state.run_id, round_int(desired)).await {
                error!(error = %err, "Failed to set sustain load");
            }
            sleep(profile.settle()).await;
        }

        let mut left = Duration::from_secs(profile.config.sustain_period);
        while !left.is_zero() {
            let tick = Instant::now();
            let raw = match self.controller.run_statistics(&state.run_id).await {
                Ok(raw) => raw,
                Err(err) => {
                    error!(error = %err, "Failed to fetch run statistics during sustain");
                    break;
                }
            };
            state.record_statistics(&raw, profile.test_type);
            state.update_rolling(profile.config.max_variance);
            if state.remaining < SUSTAIN_MIN_REMAINING && profile.goal_seek {
                info!(remaining = state.remaining, "Sustain ended, run time nearly over");
                state.phase = Some(Phase::Timeout);
                left = Duration::ZERO;
            }
            debug!(left = left.as_secs(), "Sustain period");
            if state.sub_status_clear() {
                self.log_tick(state);
                self.save_row(state);
            }
            sleep(profile.interval()).await;
            left = left.saturating_sub(tick.elapsed());
        }
        state.phase = Some(Phase::Stopping);
    }

    async fn stop_and_wait(&mut self, state: &mut RunState) -> WaitResult {
        state.timings.stop_started = self.timer();
        let still_active = state
            .status
            .as_ref()
            .map_or(true, |status| !status.status.is_terminal());
        if still_active {
            if let Err(err) = self.controller.stop_test(&state.run_id).await {
                error!(run_id = %state.run_id, error = %err, "Failed to stop run");
            }
        }

        let waiting = Instant::now();
        loop {
            sleep(self.profile.interval()).await;
            let status = self.poll_status(state).await?;
            if status.status.is_terminal() {
                info!(elapsed = self.timer(), status = %status.status, "Run stopped");
                break;
            }
            info!(
                elapsed = self.timer(),
                status = %status.status,
                sub_status = ?status.sub_status,
                "Waiting for run to stop"
            );
            if waiting.elapsed() > STOP_TIMEOUT {
                error!(waited = STOP_TIMEOUT.as_secs(), "Run did not transition to a finished status");
                return Err(FailureReason::StopTimeout);
            }
        }
        state.timings.to_stop = self.timer().saturating_sub(state.timings.stop_started);
        Ok(())
    }

    /// Stop a run that failed before its control loop and record the last
    /// row.
    async fn abort(&mut self, state: &mut RunState, reason: FailureReason) -> RunOutcome {
        error!(test = %self.profile.config.name, reason = %reason, "Run failed");
        let ended = state
            .status
            .as_ref()
            .is_some_and(|status| status.status.is_terminal());
        if !ended {
            if let Err(stop_reason) = self.stop_and_wait(state).await {
                warn!(reason = %stop_reason, "Failed run did not stop cleanly");
            }
        }
        self.save_row(state);
        RunOutcome::Failed(reason)
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    fn timer(&self) -> u64 {
        self.started.elapsed().as_secs_f64().round() as u64
    }

    fn save_row(&mut self, state: &RunState) {
        let row = ResultRow::capture(self.profile, state, VERSION);
        if let Err(err) = self.sink.append(&row) {
            error!(error = %err, "Failed to write result row");
        }
    }

    fn log_tick(&self, state: &RunState) {
        let client = &state.stats.client;
        let rolling = &state.rolling;
        info!(
            elapsed = state.elapsed,
            remaining = state.remaining,
            phase = ?state.phase.map(Phase::as_str),
            current_load = client.current_load,
            desired_load = client.desired_load,
            seek_ready = state.seek_ready(),
            tps = client.successful_txns_per_sec,
            cps = client.established_conn_rate,
            open_conns = client.established_conns,
            bandwidth = state.stats.total_bandwidth,
            ttfb = client.avg_ttfb,
            client_cpu = client.cpu_utilized,
            server_cpu = state.stats.server.cpu_utilized,
            "Run statistics"
        );
        debug!(
            tps_avg = rolling.get(StatKind::Tps).average(),
            tps_stable = rolling.get(StatKind::Tps).is_stable(),
            tps_increase = rolling.get(StatKind::Tps).increase_pct(),
            cps_avg = rolling.get(StatKind::Cps).average(),
            cps_stable = rolling.get(StatKind::Cps).is_stable(),
            load_avg = rolling.get(StatKind::Load).average(),
            load_increase = rolling.get(StatKind::Load).increase_pct(),
            bw_avg = rolling.get(StatKind::Bw).average(),
            bw_stable = rolling.get(StatKind::Bw).is_stable(),
            highest_kpi = state.highest.kpi_1,
            highest_load = state.highest.load,
            max_load_reached = state.max_load_reached,
            "Rolling windows"
        );
    }
}
