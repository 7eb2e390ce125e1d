//! Goal seek: raise load step by step until the KPIs stop improving or a
//! resource runs out.

use tracing::{debug, info, warn};

use super::SeekAction;
use crate::domain::increment::{round_up_to_core, round_up_to_even, IncrementInput, MemoryFootprint};
use crate::domain::numeric::round_int;
use crate::domain::phase::Phase;
use crate::domain::rolling::StatKind;
use crate::domain::run::{LoadChangeRequest, RunProfile, RunState, StopReason};
use crate::domain::test_type::{LoadType, SeekStrategy, TestType};

/// Current/desired load ratio below which the appliance is lagging.
const LOAD_RATIO_FLOOR: f64 = 0.97;
/// KPI average/maximum ratio below which the KPI is past its peak.
const KPI_PEAK_RATIO: f64 = 0.97;
/// Seeks allowed while max load stays flagged.
const MAX_LOAD_SEEKS: u32 = 2;
/// Non-positive load or KPI changes in a row that flag max load.
const NO_PROGRESS_TICKS: u32 = 3;
/// Unstable KPI ticks that force one of the first seeks through.
const EARLY_UNSTABLE_TICKS: u32 = 5;
const EARLY_SEEKS: u32 = 2;
/// Unstable KPI ticks, after enough seeks, that trigger a back-off.
const BACKOFF_UNSTABLE_TICKS: u32 = 20;
const BACKOFF_MIN_SEEKS: u32 = 3;
/// Smallest first target with the resource strategy.
const RESOURCE_FIRST_LOAD: i64 = 32;

/// Goal seek step for one run profile.
pub struct GoalSeekController<'a> {
    profile: &'a RunProfile,
}

impl<'a> GoalSeekController<'a> {
    #[must_use]
    pub const fn new(profile: &'a RunProfile) -> Self {
        Self { profile }
    }

    /// Decide this tick's action. Only acts in the `goalseek` phase.
    pub fn step(&self, state: &mut RunState) -> SeekAction {
        if state.phase != Some(Phase::GoalSeek) {
            return SeekAction::Hold;
        }

        let config = &self.profile.config;
        let client = &state.stats.client;
        if client.unsuccessful_txns > 0.0 || client.aborted_txns > 0.0 {
            info!(
                unsuccessful = client.unsuccessful_txns,
                aborted = client.aborted_txns,
                "Failed transactions during goal seek"
            );
            return SeekAction::Stop(StopReason::TransactionFailures {
                unsuccessful: client.unsuccessful_txns,
                aborted: client.aborted_txns,
            });
        }

        let kpi_1 = state.kpi(config.kpi_1);
        let kpi_1_stable = kpi_1.is_stable();
        let kpi_1_unstable = kpi_1.unstable_count();
        let kpi_2_stable = state.kpi(config.kpi_2).is_stable();

        debug!(
            seek_ready = state.seek_ready(),
            kpi_1 = %config.kpi_1,
            kpi_1_stable,
            kpi_1_unstable,
            kpi_2 = %config.kpi_2,
            kpi_2_stable,
            max_load_reached = state.max_load_reached,
            seeks_after_max = state.seeks_after_max,
            "Goal seek check"
        );

        if self.profile.test_type == TestType::Conns {
            if self.profile.load_type() == Some(LoadType::SimUsersPerSecond) {
                if !kpi_1_stable {
                    return SeekAction::Hold;
                }
                if state.max_load_reached {
                    return SeekAction::Stop(StopReason::OpenConnectionsSaturated);
                }
            } else if client.successful_txns_per_sec != 0.0 || client.established_conn_rate != 0.0 {
                debug!(
                    tps = client.successful_txns_per_sec,
                    cps = client.established_conn_rate,
                    "Open connections still being established"
                );
                return SeekAction::Hold;
            }
        } else if !state.seek_ready() {
            return SeekAction::Hold;
        } else if let Some(action) = self.back_off(state, kpi_1_unstable) {
            return action;
        }

        if state.max_load_reached && state.seeks_after_max >= MAX_LOAD_SEEKS {
            info!(
                seeks_after_max = state.seeks_after_max,
                highest_load = state.highest.load,
                "Max load reached"
            );
            return SeekAction::Stop(StopReason::MaxLoadReached);
        }

        let should_seek = self.profile.test_type == TestType::Conns
            || (state.seek_count <= EARLY_SEEKS && kpi_1_unstable >= EARLY_UNSTABLE_TICKS)
            || config.kpi_combine.combine(kpi_1_stable, kpi_2_stable);
        if !should_seek {
            return SeekAction::Hold;
        }

        match self.seek(state) {
            Ok(request) => {
                state.reset_seek_ticks();
                state.rolling.get_mut(StatKind::Load).reset_counters();
                state.rolling.get_mut(config.kpi_1.stat()).reset_counters();
                state.rolling.get_mut(config.kpi_2.stat()).reset_counters();
                SeekAction::Change(request)
            }
            Err(reason) => {
                info!(reason = %reason, "Goal seek ended");
                SeekAction::Stop(reason)
            }
        }
    }

    /// After a few seeks, a KPI that stays unstable while the appliance lags
    /// behind the desired load pulls load back by half the last increment.
    /// Seek ticks are not reset, so back-off repeats every tick until the
    /// KPI settles or the appliance catches up.
    fn back_off(&self, state: &mut RunState, kpi_1_unstable: u32) -> Option<SeekAction> {
        if state.seek_count < BACKOFF_MIN_SEEKS
            || kpi_1_unstable < BACKOFF_UNSTABLE_TICKS
            || state.stats.load_ratio >= LOAD_RATIO_FLOOR
        {
            return None;
        }
        let last_load = *state.new_loads.last()?;
        let last_increase = *state.policy.history().last()?;
        let target = (last_load as f64 - last_increase.abs() as f64 / 2.0) as i64;

        state.new_loads.push(target);
        state.policy.record(target - last_load);
        info!(
            from = last_load,
            to = target,
            unstable_ticks = kpi_1_unstable,
            load_ratio = state.stats.load_ratio,
            "KPI unstable, backing off load"
        );
        Some(SeekAction::Change(LoadChangeRequest {
            target,
            settle: self.profile.settle(),
        }))
    }

    /// Pick the next load and account for the seek.
    fn seek(&self, state: &mut RunState) -> Result<LoadChangeRequest, StopReason> {
        let current = state.stats.client.current_load;
        if current == 0.0 {
            return Err(StopReason::ZeroLoad);
        }
        let current_load = round_int(current);

        let target = if state.first_goal_step {
            state.first_goal_step = false;
            let step = state.increments.low * state.capacity_adjust as i64;
            let mut target = current_load + step;
            let desired = state.stats.client.desired_load;
            if target as f64 <= desired {
                info!(target, desired_load = desired, "First step does not exceed desired load");
                state.max_load_reached = true;
                return Err(StopReason::MaxLoadReached);
            }
            if self.profile.strategy == SeekStrategy::Resource && target < RESOURCE_FIRST_LOAD {
                target = round_up_to_core(RESOURCE_FIRST_LOAD, self.profile.core_count());
            }
            state.policy.record(step);
            target
        } else {
            self.next_load(state, current_load).ok_or(StopReason::NoNextLoad)?
        };

        let target = match self.profile.strategy {
            SeekStrategy::Threshold => round_up_to_even(target as f64),
            SeekStrategy::Resource => target,
        };
        state.new_loads.push(target);
        if state.max_load_reached {
            state.seeks_after_max += 1;
        }
        state.seek_count += 1;
        info!(
            from = current_load,
            to = target,
            seek_count = state.seek_count,
            loads = ?state.new_loads,
            increments = ?state.policy.history(),
            "Goal seek load change"
        );
        Ok(LoadChangeRequest {
            target,
            settle: self.profile.settle(),
        })
    }

    fn next_load(&self, state: &mut RunState, current_load: i64) -> Option<i64> {
        let load_type = self.profile.load_type();
        match (self.profile.strategy, load_type) {
            (SeekStrategy::Resource, _) if self.profile.test_type == TestType::Conns => {
                Some(self.conns_by_resource(state, current_load))
            }
            (SeekStrategy::Resource, Some(load_type)) if load_type.is_simusers() => {
                Some(self.simusers_by_resource(state, current_load))
            }
            (SeekStrategy::Resource, Some(_)) => Some(self.load_by_resource(state, current_load)),
            (SeekStrategy::Threshold, Some(load_type)) if load_type.is_simusers() => {
                self.simusers_by_threshold(state, current_load)
            }
            (SeekStrategy::Threshold, Some(_)) => self.load_by_threshold(state, current_load),
            (_, None) => {
                warn!(load_type = %self.profile.config.load_type, "No load type to seek with");
                None
            }
        }
    }

    /// Threshold stepping on the KPI's recent increase.
    fn simusers_by_threshold(&self, state: &mut RunState, current_load: i64) -> Option<i64> {
        let kpi = state.kpi(self.profile.config.kpi_1);
        let (increase, peak_ratio) = (kpi.increase_pct(), kpi.avg_max_ratio());
        let thresholds = &self.profile.config.thresholds;
        let increments = &state.increments;

        let step = if increase >= thresholds.low {
            increments.low
        } else if increase >= thresholds.med {
            increments.med
        } else if increase >= thresholds.high {
            increments.high
        } else {
            info!(increase, threshold = thresholds.high, "KPI increase below high threshold");
            return None;
        };

        if peak_ratio < KPI_PEAK_RATIO {
            state.max_load_reached = true;
            return Some(current_load);
        }
        Some(current_load + step * state.capacity_adjust as i64)
    }

    /// Threshold stepping on the load level itself, capped at the high
    /// threshold.
    fn load_by_threshold(&self, state: &RunState, current_load: i64) -> Option<i64> {
        let ratio = state.stats.load_ratio;
        if ratio < LOAD_RATIO_FLOOR {
            return None;
        }
        let thresholds = &self.profile.config.thresholds;
        let increments = &state.increments;
        let level = current_load as f64;

        let step = if level <= thresholds.low {
            increments.low
        } else if level <= thresholds.med {
            increments.med
        } else if level <= thresholds.high {
            increments.high
        } else {
            return None;
        };

        let target = current_load + step * state.capacity_adjust as i64;
        if thresholds.high < target as f64 {
            if ratio > 0.99 {
                return None;
            }
            return Some(thresholds.high as i64);
        }
        Some(target)
    }

    fn load_by_resource(&self, state: &mut RunState, current_load: i64) -> i64 {
        let load = state.rolling.get(StatKind::Load);
        if load.increase_pct() < 0.0 && load.no_positive_increase_count() >= NO_PROGRESS_TICKS {
            state.max_load_reached = true;
        }
        self.counted_load(state, current_load)
    }

    fn conns_by_resource(&self, state: &mut RunState, current_load: i64) -> i64 {
        let stats = &state.stats;
        let fits = stats.load_ratio >= 1.0
            && stats.client_mem_pct_used < 100.0
            && stats.server_mem_pct_used < 100.0;
        debug!(
            load_ratio = stats.load_ratio,
            client_memory_used = stats.client_mem_pct_used,
            server_memory_used = stats.server_mem_pct_used,
            "Open connections headroom"
        );
        if !fits {
            state.max_load_reached = true;
        }
        self.counted_load(state, current_load)
    }

    fn simusers_by_resource(&self, state: &mut RunState, current_load: i64) -> i64 {
        let kpi = state.kpi(self.profile.config.kpi_1);
        let load_increase = state.rolling.get(StatKind::Load).increase_pct();
        let at_peak = kpi.avg_max_ratio() >= KPI_PEAK_RATIO;
        let flat = if at_peak {
            load_increase > 0.0 && kpi.increase_pct() <= 0.0
        } else {
            kpi.no_positive_increase_count() >= NO_PROGRESS_TICKS
        };
        if flat {
            state.max_load_reached = true;
        }
        self.counted_load(state, current_load)
    }

    /// Next load from the resource increment policy.
    fn counted_load(&self, state: &mut RunState, current_load: i64) -> i64 {
        if state.max_load_reached {
            info!(highest_load = state.highest.load, "Max load reached");
        }
        let scope = self.profile.resource_scope(state.seek_count);
        let (_, lowest_available) = state.resources(self.profile).lowest(scope);
        let rolling = &state.rolling;
        let client = &state.stats.client;
        let input = IncrementInput {
            test_type: self.profile.test_type,
            load_type: self.profile.load_type(),
            current_load,
            minimal_step: self.profile.plan.minimal_step,
            capacity_adjust: state.capacity_adjust,
            core_count: self.profile.core_count(),
            lowest_available,
            load_increase_pct: rolling.get(StatKind::Load).increase_pct(),
            tps_increase_pct: rolling.get(StatKind::Tps).increase_pct(),
            cps_increase_pct: rolling.get(StatKind::Cps).increase_pct(),
            bw_increase_pct: rolling.get(StatKind::Bw).increase_pct(),
            max_load_reached: state.max_load_reached,
            memory: MemoryFootprint {
                main_size: client.memory_main_size,
                main_used: client.memory_main_used,
                used_at_startup: state.baselines.client_memory_used,
                load_at_startup: state.baselines.client_load,
            },
        };
        state.policy.next_load(&input).new_load
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::run::{Increments, RunProfile};
    use crate::testkit::profile::goal_seek_profile;

    /// State with full, flat windows at `load` and the phase set to goal seek.
    fn ready_state(profile: &RunProfile, load: f64) -> RunState {
        let mut state = RunState::new(profile, "run", "http");
        for _ in 0..3 {
            feed(&mut state, 100.0, load);
        }
        state.phase = Some(Phase::GoalSeek);
        state
    }

    fn feed(state: &mut RunState, tps: f64, load: f64) {
        let client = &mut state.stats.client;
        client.successful_txns_per_sec = tps;
        client.established_conn_rate = 50.0;
        client.current_load = load;
        client.desired_load = load;
        state.update_rolling(0.03);
    }

    // ---------------------------------------------------------------------
    // Gating
    // ---------------------------------------------------------------------

    #[test]
    fn holds_outside_goalseek_phase() {
        let profile = goal_seek_profile(SeekStrategy::Threshold);
        let mut state = ready_state(&profile, 1000.0);
        state.phase = Some(Phase::Steady);
        assert_eq!(GoalSeekController::new(&profile).step(&mut state), SeekAction::Hold);
    }

    #[test]
    fn holds_until_enough_ticks_since_last_change() {
        let profile = goal_seek_profile(SeekStrategy::Threshold);
        let mut state = RunState::new(&profile, "run", "http");
        state.phase = Some(Phase::GoalSeek);
        state.stats.client.current_load = 1000.0;
        assert_eq!(GoalSeekController::new(&profile).step(&mut state), SeekAction::Hold);
    }

    #[test]
    fn failed_transactions_stop_the_run() {
        let profile = goal_seek_profile(SeekStrategy::Threshold);
        let mut state = ready_state(&profile, 1000.0);
        state.stats.client.aborted_txns = 2.0;
        assert_eq!(
            GoalSeekController::new(&profile).step(&mut state),
            SeekAction::Stop(StopReason::TransactionFailures {
                unsuccessful: 0.0,
                aborted: 2.0
            })
        );
    }

    #[test]
    fn zero_current_load_stops_the_run() {
        let profile = goal_seek_profile(SeekStrategy::Threshold);
        let mut state = ready_state(&profile, 1000.0);
        state.stats.client.current_load = 0.0;
        assert_eq!(
            GoalSeekController::new(&profile).step(&mut state),
            SeekAction::Stop(StopReason::ZeroLoad)
        );
    }

    #[test]
    fn persistent_max_load_stops_the_run() {
        let profile = goal_seek_profile(SeekStrategy::Threshold);
        let mut state = ready_state(&profile, 1000.0);
        state.max_load_reached = true;
        state.seeks_after_max = 2;
        assert_eq!(
            GoalSeekController::new(&profile).step(&mut state),
            SeekAction::Stop(StopReason::MaxLoadReached)
        );
    }

    // ---------------------------------------------------------------------
    // First step
    // ---------------------------------------------------------------------

    #[test]
    fn first_step_adds_the_low_increment() {
        let profile = goal_seek_profile(SeekStrategy::Threshold);
        let mut state = ready_state(&profile, 1000.0);
        state.increments = Increments {
            low: 50,
            med: 20,
            high: 10,
        };

        let action = GoalSeekController::new(&profile).step(&mut state);
        assert_eq!(
            action,
            SeekAction::Change(LoadChangeRequest {
                target: 1050,
                settle: Duration::from_secs(16),
            })
        );
        assert!(!state.first_goal_step);
        assert_eq!(state.seek_count, 1);
        assert_eq!(state.new_loads, vec![1050]);
        assert_eq!(state.policy.history(), &[50]);
    }

    #[test]
    fn first_step_below_desired_load_flags_max_load() {
        let profile = goal_seek_profile(SeekStrategy::Threshold);
        let mut state = ready_state(&profile, 1000.0);
        state.stats.client.desired_load = 1100.0;
        assert_eq!(
            GoalSeekController::new(&profile).step(&mut state),
            SeekAction::Stop(StopReason::MaxLoadReached)
        );
        assert!(state.max_load_reached);
        assert!(state.new_loads.is_empty());
    }

    #[test]
    fn resource_strategy_first_step_is_at_least_32() {
        let profile = goal_seek_profile(SeekStrategy::Resource);
        let mut state = ready_state(&profile, 10.0);
        match GoalSeekController::new(&profile).step(&mut state) {
            SeekAction::Change(request) => assert_eq!(request.target, 32),
            other => panic!("expected a load change, got {other:?}"),
        }
    }

    // ---------------------------------------------------------------------
    // Threshold stepping
    // ---------------------------------------------------------------------

    #[test]
    fn kpi_increase_above_low_threshold_takes_low_step() {
        let profile = goal_seek_profile(SeekStrategy::Threshold);
        let mut state = ready_state(&profile, 1000.0);
        state.first_goal_step = false;
        state.rolling.commit();
        for _ in 0..3 {
            feed(&mut state, 110.0, 1000.0);
        }

        match GoalSeekController::new(&profile).step(&mut state) {
            SeekAction::Change(request) => assert_eq!(request.target, 1010),
            other => panic!("expected a load change, got {other:?}"),
        }
    }

    #[test]
    fn flat_kpi_ends_threshold_seek() {
        let profile = goal_seek_profile(SeekStrategy::Threshold);
        let mut state = ready_state(&profile, 1000.0);
        state.first_goal_step = false;
        state.rolling.commit();
        for _ in 0..3 {
            feed(&mut state, 100.0, 1000.0);
        }
        assert_eq!(
            GoalSeekController::new(&profile).step(&mut state),
            SeekAction::Stop(StopReason::NoNextLoad)
        );
    }

    #[test]
    fn load_thresholds_cap_at_high_threshold() {
        let mut profile = goal_seek_profile(SeekStrategy::Threshold);
        profile.plan.load_type = Some(LoadType::Bandwidth);
        profile.config.thresholds.low = 500.0;
        profile.config.thresholds.med = 800.0;
        profile.config.thresholds.high = 1020.0;
        let mut state = ready_state(&profile, 1000.0);
        state.first_goal_step = false;
        state.stats.load_ratio = 0.98;

        match GoalSeekController::new(&profile).step(&mut state) {
            SeekAction::Change(request) => assert_eq!(request.target, 1020),
            other => panic!("expected a load change, got {other:?}"),
        }
    }

    // ---------------------------------------------------------------------
    // Recovery and open connections
    // ---------------------------------------------------------------------

    #[test]
    fn unstable_kpi_backs_load_off_by_half_the_last_increment() {
        let profile = goal_seek_profile(SeekStrategy::Resource);
        let mut state = RunState::new(&profile, "run", "http");
        for tick in 0..24 {
            let tps = if tick % 2 == 0 { 100.0 } else { 300.0 };
            feed(&mut state, tps, 1000.0);
        }
        state.phase = Some(Phase::GoalSeek);
        state.first_goal_step = false;
        state.seek_count = 3;
        state.stats.load_ratio = 0.9;
        state.new_loads = vec![1200];
        state.policy.record(200);

        match GoalSeekController::new(&profile).step(&mut state) {
            SeekAction::Change(request) => assert_eq!(request.target, 1100),
            other => panic!("expected a back-off, got {other:?}"),
        }
        assert_eq!(state.new_loads, vec![1200, 1100]);
        assert_eq!(state.policy.history().last(), Some(&-100));
        assert!(state.seek_ready());

        match GoalSeekController::new(&profile).step(&mut state) {
            SeekAction::Change(request) => assert_eq!(request.target, 1050),
            other => panic!("expected a second back-off, got {other:?}"),
        }
    }

    #[test]
    fn open_connections_wait_for_transactions_to_stop() {
        let mut profile = goal_seek_profile(SeekStrategy::Threshold);
        profile.test_type = TestType::Conns;
        profile.plan.load_type = Some(LoadType::Connections);
        let mut state = ready_state(&profile, 1000.0);
        state.stats.client.desired_load = 900.0;
        let controller = GoalSeekController::new(&profile);
        assert_eq!(controller.step(&mut state), SeekAction::Hold);

        state.stats.client.successful_txns_per_sec = 0.0;
        state.stats.client.established_conn_rate = 0.0;
        match controller.step(&mut state) {
            SeekAction::Change(request) => assert_eq!(request.target, 1010),
            other => panic!("expected a load change, got {other:?}"),
        }
    }

    #[test]
    fn open_connection_rate_stops_when_saturated() {
        let mut profile = goal_seek_profile(SeekStrategy::Resource);
        profile.test_type = TestType::Conns;
        profile.plan.load_type = Some(LoadType::SimUsersPerSecond);
        let mut state = ready_state(&profile, 1000.0);
        state.max_load_reached = true;
        assert_eq!(
            GoalSeekController::new(&profile).step(&mut state),
            SeekAction::Stop(StopReason::OpenConnectionsSaturated)
        );
    }
}
