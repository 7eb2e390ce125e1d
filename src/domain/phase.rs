//! Run phases.
//!
//! The time-based phase ([`TimePhase`]) is a pure function of elapsed time
//! and the configured phase durations. The seek mode ([`ControlMode`]) is
//! tracked separately and only combined with it in [`PhaseTracker::update`],
//! where a steady phase becomes a ramp-seek or goal-seek phase.

use std::fmt;

use serde::Serialize;

/// Phase implied by elapsed time alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimePhase {
    Startup,
    Rampup,
    Steady,
    Rampdown,
    Shutdown,
    Finished,
}

/// Which controller steers load during the steady phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMode {
    /// Load follows the configured load specification.
    Time,
    RampSeek,
    GoalSeek,
}

/// Phase reported for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Startup,
    Rampup,
    Steady,
    Rampdown,
    Shutdown,
    Finished,
    RampSeek,
    GoalSeek,
    /// Forced when remaining time runs out.
    Timeout,
    /// Set after the sustain period, before the run is stopped.
    Stopping,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Rampup => "rampup",
            Self::Steady => "steady",
            Self::Rampdown => "rampdown",
            Self::Shutdown => "shutdown",
            Self::Finished => "finished",
            Self::RampSeek => "rampseek",
            Self::GoalSeek => "goalseek",
            Self::Timeout => "timeout",
            Self::Stopping => "stopping",
        }
    }

    /// Phases that end the control loop.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Timeout)
    }
}

impl From<TimePhase> for Phase {
    fn from(phase: TimePhase) -> Self {
        match phase {
            TimePhase::Startup => Self::Startup,
            TimePhase::Rampup => Self::Rampup,
            TimePhase::Steady => Self::Steady,
            TimePhase::Rampdown => Self::Rampdown,
            TimePhase::Shutdown => Self::Shutdown,
            TimePhase::Finished => Self::Finished,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseBoundaries {
    pub duration: f64,
    pub startup: f64,
    pub rampup: f64,
    pub rampdown: f64,
    pub shutdown: f64,
    /// Sampling interval; shutdown and finish are detected one tick early.
    pub interval: f64,
}

impl PhaseBoundaries {
    /// Time phase for `elapsed` seconds. Boundaries are inclusive and the
    /// earlier phase wins; `None` when no phase matches (negative time or a
    /// gap before shutdown).
    #[must_use]
    pub fn classify(&self, elapsed: f64) -> Option<TimePhase> {
        let ramp_end = self.startup + self.rampup;
        let steady_end = self.duration - (self.rampdown + self.shutdown);
        let rampdown_end = self.duration - self.shutdown;
        let next_tick = elapsed + self.interval;

        if (0.0..=self.startup).contains(&elapsed) {
            Some(TimePhase::Startup)
        } else if (self.startup..=ramp_end).contains(&elapsed) {
            Some(TimePhase::Rampup)
        } else if (ramp_end..=steady_end).contains(&elapsed) {
            Some(TimePhase::Steady)
        } else if (steady_end..=rampdown_end).contains(&elapsed) {
            Some(TimePhase::Rampdown)
        } else if (rampdown_end..self.duration).contains(&next_tick) {
            Some(TimePhase::Shutdown)
        } else if self.duration <= next_tick {
            Some(TimePhase::Finished)
        } else {
            None
        }
    }
}

/// Tracks the phase across ticks.
///
/// When armed, the first tick that lands in steady is reported as rampup to
/// give the load one more interval to settle.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    boundaries: PhaseBoundaries,
    hold_first_steady: bool,
}

impl PhaseTracker {
    #[must_use]
    pub fn new(boundaries: PhaseBoundaries, hold_first_steady: bool) -> Self {
        Self {
            boundaries,
            hold_first_steady,
        }
    }

    #[must_use]
    pub fn boundaries(&self) -> &PhaseBoundaries {
        &self.boundaries
    }

    /// Time phase for this tick, applying the one-shot steady hold.
    pub fn time_phase(&mut self, elapsed: f64) -> Option<TimePhase> {
        match self.boundaries.classify(elapsed) {
            Some(TimePhase::Steady) if self.hold_first_steady => {
                self.hold_first_steady = false;
                Some(TimePhase::Rampup)
            }
            other => other,
        }
    }

    /// Effective phase for this tick.
    pub fn update(&mut self, elapsed: f64, mode: ControlMode) -> Option<Phase> {
        let time_phase = self.time_phase(elapsed)?;
        Some(combine(time_phase, mode))
    }
}

/// Combine a time phase with the seek mode: steady becomes the seek phase.
#[must_use]
pub fn combine(time_phase: TimePhase, mode: ControlMode) -> Phase {
    match (time_phase, mode) {
        (TimePhase::Steady, ControlMode::RampSeek) => Phase::RampSeek,
        (TimePhase::Steady, ControlMode::GoalSeek) => Phase::GoalSeek,
        (phase, _) => phase.into(),
    }
}
