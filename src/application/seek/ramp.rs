//! Ramp seek: move load toward a target KPI value in a fixed number of steps.

use std::time::Duration;

use tracing::{debug, info};

use super::SeekAction;
use crate::domain::increment::round_up_to_even;
use crate::domain::numeric::round_to;
use crate::domain::phase::Phase;
use crate::domain::run::{
    Increments, LoadChangeRequest, RampSeekSettings, RunProfile, RunState, StopReason,
};

/// Wait after each ramp load change.
pub const RAMP_SETTLE: Duration = Duration::from_secs(8);

/// KPI/target ratio above which the ramp is considered done.
const NEAR_TARGET_RATIO: f64 = 0.95;

/// Ramp seek step for one run profile.
pub struct RampSeekController<'a> {
    profile: &'a RunProfile,
}

impl<'a> RampSeekController<'a> {
    #[must_use]
    pub const fn new(profile: &'a RunProfile) -> Self {
        Self { profile }
    }

    /// Decide this tick's action. Only acts in the `rampseek` phase.
    pub fn step(&self, state: &mut RunState) -> SeekAction {
        let Some(settings) = self.profile.config.ramp_seek else {
            return SeekAction::Hold;
        };
        if state.phase != Some(Phase::RampSeek) || !state.seek_ready() {
            return SeekAction::Hold;
        }

        let kpi_value = state.kpi(settings.kpi).current();
        if state.max_load_reached {
            info!("Max load reached during ramp seek");
            state.complete_ramp();
            return SeekAction::Hold;
        }
        if settings.target < kpi_value {
            info!(kpi = %settings.kpi, value = kpi_value, target = settings.target, "Ramp target exceeded");
            state.complete_ramp();
            return SeekAction::Hold;
        }

        let action = self.seek(state, &settings, kpi_value);
        if let SeekAction::Change(_) = action {
            state.reset_seek_ticks();
            if kpi_value / settings.target > NEAR_TARGET_RATIO {
                info!(value = kpi_value, target = settings.target, "Ramp seek within reach of target");
                state.complete_ramp();
            }
        }
        action
    }

    fn seek(&self, state: &mut RunState, settings: &RampSeekSettings, kpi_value: f64) -> SeekAction {
        let current_load = state.stats.client.current_load;
        if current_load == 0.0 {
            return SeekAction::Stop(StopReason::ZeroLoad);
        }
        let steps_left = state.ramp.map_or(0, |ramp| ramp.steps_left);
        if steps_left < 1 {
            info!("Ramp seek steps exhausted");
            state.complete_ramp();
            return SeekAction::Hold;
        }

        if kpi_value >= settings.target {
            info!(value = kpi_value, target = settings.target, "Ramp target reached");
            state.complete_ramp();
            return SeekAction::Hold;
        }
        if kpi_value == 0.0 {
            debug!(kpi = %settings.kpi, "No KPI value to ramp from yet");
            return SeekAction::Hold;
        }

        let multiple = round_to(settings.target / kpi_value, 3);
        let increase = round_to(
            (current_load * multiple - current_load) / f64::from(steps_left),
            3,
        );
        let target = round_up_to_even(current_load + increase);

        if let Some(ramp) = state.ramp.as_mut() {
            ramp.steps_left -= 1;
        }
        let share = |pct: f64| round_up_to_even(target as f64 * pct / 100.0);
        state.increments = Increments {
            low: share(settings.low_pct),
            med: share(settings.med_pct),
            high: share(settings.high_pct),
        };
        info!(
            from = current_load,
            to = target,
            multiple,
            steps_left = steps_left - 1,
            increments = ?state.increments,
            "Ramp seek load change"
        );
        SeekAction::Change(LoadChangeRequest {
            target,
            settle: RAMP_SETTLE,
        })
    }
}
