//! Resource-driven load increment policy.
//!
//! Given the current load, the scarcest resource headroom and the momentum of
//! the reported metrics, [`LoadIncrementPolicy::next_load`] decides how far the
//! next load step goes. Percent terms follow the controller's integer load
//! semantics: a fraction of the current load is rounded, divided by 100 and
//! truncated.

use tracing::debug;

use super::numeric::{round_int, round_to};
use super::test_type::{LoadType, TestType};

/// Divisor used for moderate steps.
pub const ADJUST_LOW: f64 = 1.2;
/// Divisor used for cautious steps.
pub const ADJUST_HIGH: f64 = 1.5;
/// Extra shrink applied to mixed traffic with moderate headroom.
pub const ADJUST_EMIX: f64 = 1.5;

/// Round `value` up to the next multiple of `cores` (0 is treated as 1).
#[must_use]
pub fn round_up_to_core(value: i64, cores: u64) -> i64 {
    let cores = cores.max(1) as i64;
    let quotient = value / cores;
    let quotient = if value % cores != 0 && value > 0 {
        quotient + 1
    } else {
        quotient
    };
    quotient * cores
}

/// Round `value` up to the next even integer.
#[must_use]
pub fn round_up_to_even(value: f64) -> i64 {
    ((value / 2.0).ceil() * 2.0) as i64
}

/// `int(round(x) / 100)`: a rounded fraction of the current load, truncated.
fn pct_of(x: f64) -> i64 {
    (x.round_ties_even() / 100.0) as i64
}

/// Which headroom band the default policy landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadroomBand {
    /// ≥ 100: step scaled up by the low adjust factor.
    Ample,
    /// ≥ 50.
    High,
    /// ≥ 35.
    Comfortable,
    /// ≥ 20: unscaled.
    Moderate,
    /// ≥ 10.
    Low,
    /// ≥ 1.
    Scarce,
    /// Below 1: the momentum estimate is used directly.
    Exhausted,
}

/// Rule that produced the raw increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementRule {
    /// Open connections driven by simusers per second.
    OpenConnectionRate,
    /// Open connections driven by a connection count, filled by memory.
    OpenConnectionMemory,
    /// Open connections with some other load type: minimal step.
    OpenConnectionMinimal,
    /// Connections per second stepped by multiples of the minimal step.
    ConnectionRate,
    /// Load or metric stalled.
    Stalled,
    /// Metric momentum outpaces resource headroom.
    MomentumLeads,
    Headroom(HeadroomBand),
}

/// Inputs for one increment decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncrementInput {
    pub test_type: TestType,
    pub load_type: Option<LoadType>,
    pub current_load: i64,
    pub minimal_step: u64,
    pub capacity_adjust: u64,
    pub core_count: u64,
    /// Headroom of the scarcest resource, in percent.
    pub lowest_available: f64,
    /// Percent change of the load window since the last load change.
    pub load_increase_pct: f64,
    pub tps_increase_pct: f64,
    pub cps_increase_pct: f64,
    pub bw_increase_pct: f64,
    pub max_load_reached: bool,
    pub memory: MemoryFootprint,
}

/// Client memory figures used to size open-connection steps.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryFootprint {
    pub main_size: f64,
    pub main_used: f64,
    pub used_at_startup: f64,
    pub load_at_startup: f64,
}

/// Outcome of one increment decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncrementDecision {
    pub new_load: i64,
    pub increase: i64,
    pub rule: IncrementRule,
    /// Headroom expressed as a possible load increase, in percent.
    pub tentative_pct: f64,
    /// Half of `tentative_pct`, clamped.
    pub resource_pct: f64,
    /// Half of the best metric increase, clamped.
    pub metric_pct: f64,
}

/// Stateful increment policy for one run.
///
/// Keeps the history of applied increments (used to dampen oscillation) and
/// the per-connection memory estimate, which is computed once.
#[derive(Debug, Clone, Default)]
pub struct LoadIncrementPolicy {
    history: Vec<i64>,
    memory_per_connection: Option<f64>,
}

impl LoadIncrementPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments applied so far, oldest first.
    #[must_use]
    pub fn history(&self) -> &[i64] {
        &self.history
    }

    /// Record an increment chosen outside the policy.
    pub fn record(&mut self, increase: i64) {
        self.history.push(increase);
    }

    #[must_use]
    pub fn memory_per_connection(&self) -> Option<f64> {
        self.memory_per_connection
    }

    /// Compute the next load and record the resulting increment.
    pub fn next_load(&mut self, input: &IncrementInput) -> IncrementDecision {
        let cur = input.current_load;
        let curf = cur as f64;
        let minimal = input.minimal_step as f64 * input.capacity_adjust as f64;
        let base = round_int(minimal);
        let lowest = input.lowest_available;

        let last_metric_pct = input
            .tps_increase_pct
            .max(input.cps_increase_pct)
            .max(input.bw_increase_pct);
        let mut metric_pct = round_int(last_metric_pct / 2.0) as f64;
        if metric_pct <= 0.0 {
            metric_pct = 0.3;
        }

        let tentative_pct = if lowest == 100.0 {
            100.0
        } else {
            lowest / (100.0 - lowest) * 100.0
        };
        let mut rp = round_int(tentative_pct / 2.0) as f64;
        if rp <= 0.0 {
            rp = 0.3;
        }
        if rp >= 200.0 {
            rp /= ADJUST_LOW;
        }

        let mut check_minimal = true;
        let (mut increase, rule) = if input.test_type == TestType::Conns
            && input.load_type != Some(LoadType::SimUsers)
        {
            match input.load_type {
                Some(LoadType::SimUsersPerSecond) if lowest < 30.0 => {
                    (pct_of(curf * rp / 2.0), IncrementRule::OpenConnectionRate)
                }
                Some(LoadType::SimUsersPerSecond) => {
                    (pct_of(curf * rp), IncrementRule::OpenConnectionRate)
                }
                Some(LoadType::Connections) => match self.fill_memory(cur, &input.memory) {
                    Some(increase) => (increase, IncrementRule::OpenConnectionMemory),
                    None => (base, IncrementRule::OpenConnectionMinimal),
                },
                _ => (base, IncrementRule::OpenConnectionMinimal),
            }
        } else if input.test_type == TestType::Cps {
            if input.max_load_reached {
                check_minimal = false;
                (round_int(minimal / 2.0), IncrementRule::ConnectionRate)
            } else {
                let multiple = match input.tps_increase_pct {
                    p if p >= 10.0 => 5,
                    p if p >= 4.0 => 4,
                    p if p >= 2.0 => 3,
                    p if p >= 0.5 => 2,
                    _ => 1,
                };
                (base * multiple, IncrementRule::ConnectionRate)
            }
        } else if input.load_increase_pct <= 0.3 || last_metric_pct <= 0.3 {
            let increase = if lowest <= 1.0 {
                pct_of(curf * rp)
            } else {
                pct_of(curf * rp / ADJUST_HIGH)
            };
            (increase, IncrementRule::Stalled)
        } else if metric_pct > rp {
            let increase = if rp >= 30.0 {
                pct_of(curf * rp)
            } else if rp >= 5.0 {
                pct_of(curf * rp / ADJUST_HIGH)
            } else {
                pct_of(curf * rp / ADJUST_LOW)
            };
            (increase, IncrementRule::MomentumLeads)
        } else {
            let (increase, band) = if rp >= 100.0 {
                (pct_of(curf * rp * ADJUST_LOW), HeadroomBand::Ample)
            } else if rp >= 50.0 {
                (pct_of(curf * rp / ADJUST_HIGH), HeadroomBand::High)
            } else if rp >= 35.0 {
                (pct_of(curf * rp / ADJUST_LOW), HeadroomBand::Comfortable)
            } else if rp >= 20.0 {
                (pct_of(curf * rp), HeadroomBand::Moderate)
            } else if rp >= 10.0 {
                (pct_of(curf * rp / ADJUST_LOW), HeadroomBand::Low)
            } else if rp >= 1.0 {
                (pct_of(curf * rp / ADJUST_HIGH), HeadroomBand::Scarce)
            } else {
                (pct_of(curf * metric_pct), HeadroomBand::Exhausted)
            };
            (increase, IncrementRule::Headroom(band))
        };

        if input.test_type == TestType::Emix {
            if rp > 15.0 && rp < 40.0 {
                increase = (increase as f64 / ADJUST_EMIX) as i64;
            }
            if rp <= 15.0 {
                increase = (increase as f64 / 2.5) as i64;
            }
        }

        if check_minimal {
            let floor_fraction = (curf * 0.004) as i64;
            let floor_step = round_up_to_core(cur, input.core_count) + round_int(minimal) - cur;
            let floor = floor_fraction.max(floor_step);
            if increase < floor {
                increase = floor;
            }
            if let [.., before_last, last] = self.history.as_slice() {
                if rp < 10.0 && increase > *last {
                    increase = (before_last + last) / 2;
                }
            }
        }

        increase = round_up_to_core(increase, input.core_count);
        let new_load = round_up_to_core(cur + increase, input.core_count);
        let increase = new_load - cur;
        self.history.push(increase);

        debug!(
            current_load = cur,
            increase,
            new_load,
            lowest_available = lowest,
            tentative_pct,
            resource_pct = rp,
            metric_pct,
            rule = ?rule,
            "Counted new load"
        );

        IncrementDecision {
            new_load,
            increase,
            rule,
            tentative_pct,
            resource_pct: rp,
            metric_pct,
        }
    }

    /// Increment that fills the remaining client memory with connections,
    /// or `None` when no per-connection estimate can be formed.
    fn fill_memory(&mut self, current_load: i64, memory: &MemoryFootprint) -> Option<i64> {
        let per_connection = match self.memory_per_connection {
            Some(value) => value,
            None => {
                let load_delta = current_load as f64 - memory.load_at_startup;
                if load_delta == 0.0 {
                    return None;
                }
                let value = round_to(
                    (memory.main_used - memory.used_at_startup) * 1000.0 / load_delta,
                    2,
                );
                if value == 0.0 {
                    return None;
                }
                debug!(memory_per_connection_k = value, "Client memory for one connection");
                self.memory_per_connection = Some(value);
                value
            }
        };
        let capacity = ((memory.main_size - memory.used_at_startup) * 1000.0 / per_connection) as i64;
        Some(capacity - current_load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tput_input(current_load: i64, lowest_available: f64) -> IncrementInput {
        IncrementInput {
            test_type: TestType::Tput,
            load_type: Some(LoadType::SimUsers),
            current_load,
            minimal_step: 1,
            capacity_adjust: 1,
            core_count: 1,
            lowest_available,
            load_increase_pct: 10.0,
            tps_increase_pct: 20.0,
            cps_increase_pct: 0.0,
            bw_increase_pct: 0.0,
            max_load_reached: false,
            memory: MemoryFootprint::default(),
        }
    }

    // -------------------------------------------------------------------------
    // rounding helpers
    // -------------------------------------------------------------------------

    #[test]
    fn round_up_to_core_is_idempotent() {
        for x in 1..200 {
            for c in 1..17 {
                let once = round_up_to_core(x, c);
                assert_eq!(round_up_to_core(once, c), once);
                assert!(once >= x && once % c as i64 == 0);
            }
        }
    }

    #[test]
    fn round_up_to_core_treats_zero_cores_as_one() {
        assert_eq!(round_up_to_core(7, 0), 7);
        assert_eq!(round_up_to_core(-5, 4), -4);
    }

    #[test]
    fn round_up_to_even_rounds_odd_and_fractional_values_up() {
        assert_eq!(round_up_to_even(7.0), 8);
        assert_eq!(round_up_to_even(8.0), 8);
        assert_eq!(round_up_to_even(8.2), 10);
    }

    // -------------------------------------------------------------------------
    // default policy
    // -------------------------------------------------------------------------

    #[test]
    fn full_headroom_lands_in_high_band() {
        let mut policy = LoadIncrementPolicy::new();
        let decision = policy.next_load(&tput_input(1000, 100.0));

        assert_eq!(decision.tentative_pct, 100.0);
        assert_eq!(decision.resource_pct, 50.0);
        assert_eq!(decision.rule, IncrementRule::Headroom(HeadroomBand::High));
        // round(1000 * 50 / 1.5) / 100 = 333
        assert_eq!(decision.increase, 333);
        assert_eq!(decision.new_load, 1333);
        assert_eq!(policy.history(), &[333]);
    }

    #[test]
    fn stalled_metric_scales_by_headroom() {
        let mut policy = LoadIncrementPolicy::new();
        let mut input = tput_input(1000, 50.0);
        input.tps_increase_pct = 0.2;

        let decision = policy.next_load(&input);
        assert_eq!(decision.rule, IncrementRule::Stalled);
        // tentative 100 -> rp 50 -> round(1000 * 50 / 1.5) / 100
        assert_eq!(decision.increase, 333);
    }

    #[test]
    fn momentum_ahead_of_headroom_uses_headroom_percentage() {
        let mut policy = LoadIncrementPolicy::new();
        let mut input = tput_input(1000, 20.0);
        input.tps_increase_pct = 80.0;

        let decision = policy.next_load(&input);
        // tentative 25 -> rp 12 (ties to even), metric 40 > 12
        assert_eq!(decision.resource_pct, 12.0);
        assert_eq!(decision.rule, IncrementRule::MomentumLeads);
        assert_eq!(decision.increase, 80);
    }

    #[test]
    fn exhausted_headroom_uses_momentum_estimate() {
        let mut policy = LoadIncrementPolicy::new();
        let mut input = tput_input(10_000, 0.5);
        input.tps_increase_pct = 1.0;
        input.load_increase_pct = 1.0;

        let decision = policy.next_load(&input);
        // tentative ~0.5 -> rp 0 -> 0.3; metric round(0.5) = 0 -> 0.3, not above rp
        assert_eq!(decision.rule, IncrementRule::Headroom(HeadroomBand::Exhausted));
        // floor: max(int(10000 * 0.004), 0 + 1) = 40
        assert_eq!(decision.increase, 40);
    }

    #[test]
    fn floor_reaches_next_core_multiple_plus_a_step() {
        let mut policy = LoadIncrementPolicy::new();
        let mut input = tput_input(101, 0.5);
        input.core_count = 4;
        input.minimal_step = 8;
        input.tps_increase_pct = 1.0;
        input.load_increase_pct = 1.0;

        let decision = policy.next_load(&input);
        // floor: round_up(101, 4) + 8 - 101 = 11 -> 12 per core, 113 -> 116
        assert_eq!(decision.new_load, 116);
        assert_eq!(decision.increase, 15);
    }

    #[test]
    fn low_headroom_dampens_to_midpoint_of_previous_increments() {
        let mut policy = LoadIncrementPolicy::new();
        policy.record(100);
        policy.record(60);
        let mut input = tput_input(10_000, 15.0);
        input.tps_increase_pct = 1.0;
        input.load_increase_pct = 1.0;

        let decision = policy.next_load(&input);
        // rp = round(17.6 / 2) = 9 < 10, raw increase 600 > 60 -> (100 + 60) / 2
        assert_eq!(decision.resource_pct, 9.0);
        assert_eq!(decision.increase, 80);
    }

    #[test]
    fn emix_shrinks_moderate_headroom_steps() {
        let mut policy = LoadIncrementPolicy::new();
        let mut input = tput_input(1000, 40.0);
        input.test_type = TestType::Emix;

        let decision = policy.next_load(&input);
        // tentative 66.67 -> rp 33 -> unscaled band = 330, emix ÷1.5 = 220
        assert_eq!(decision.resource_pct, 33.0);
        assert_eq!(decision.increase, 220);
    }

    // -------------------------------------------------------------------------
    // connection tests
    // -------------------------------------------------------------------------

    #[test]
    fn cps_step_multiplies_minimal_step_by_momentum() {
        let mut policy = LoadIncrementPolicy::new();
        let mut input = tput_input(1000, 80.0);
        input.test_type = TestType::Cps;
        input.load_type = Some(LoadType::ConnectionsPerSecond);
        input.minimal_step = 100;
        input.tps_increase_pct = 4.5;

        let decision = policy.next_load(&input);
        assert_eq!(decision.rule, IncrementRule::ConnectionRate);
        assert_eq!(decision.increase, 400);
    }

    #[test]
    fn cps_at_max_load_halves_minimal_step_without_floor() {
        let mut policy = LoadIncrementPolicy::new();
        let mut input = tput_input(1000, 80.0);
        input.test_type = TestType::Cps;
        input.minimal_step = 100;
        input.capacity_adjust = 3;
        input.max_load_reached = true;

        let decision = policy.next_load(&input);
        assert_eq!(decision.increase, 150);
    }

    #[test]
    fn open_connections_rate_is_halved_under_thirty_percent_headroom() {
        let mut policy = LoadIncrementPolicy::new();
        let mut input = tput_input(10_000, 20.0);
        input.test_type = TestType::Conns;
        input.load_type = Some(LoadType::SimUsersPerSecond);

        let decision = policy.next_load(&input);
        // rp 12 -> round(10000 * 12 / 2) / 100 = 600
        assert_eq!(decision.rule, IncrementRule::OpenConnectionRate);
        assert_eq!(decision.increase, 600);
    }

    #[test]
    fn open_connections_fill_remaining_memory() {
        let mut policy = LoadIncrementPolicy::new();
        let mut input = tput_input(2000, 50.0);
        input.test_type = TestType::Conns;
        input.load_type = Some(LoadType::Connections);
        input.minimal_step = 500;
        input.memory = MemoryFootprint {
            main_size: 1000.0,
            main_used: 300.0,
            used_at_startup: 100.0,
            load_at_startup: 1000.0,
        };

        let decision = policy.next_load(&input);
        // 200 * 1000 / 1000 = 200K per connection; (1000 - 100) * 1000 / 200 = 4500
        assert_eq!(policy.memory_per_connection(), Some(200.0));
        assert_eq!(decision.rule, IncrementRule::OpenConnectionMemory);
        assert_eq!(decision.new_load, 4500);
    }

    #[test]
    fn open_connections_without_load_change_fall_back_to_minimal_step() {
        let mut policy = LoadIncrementPolicy::new();
        let mut input = tput_input(1000, 50.0);
        input.test_type = TestType::Conns;
        input.load_type = Some(LoadType::Connections);
        input.minimal_step = 500;
        input.memory.load_at_startup = 1000.0;

        let decision = policy.next_load(&input);
        assert_eq!(decision.rule, IncrementRule::OpenConnectionMinimal);
        assert_eq!(decision.increase, 500);
        assert_eq!(policy.memory_per_connection(), None);
    }
}
