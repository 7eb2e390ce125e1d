//! Seek controllers.
//!
//! Both controllers are synchronous: they inspect and update the
//! [`RunState`](crate::domain::run::RunState) for one tick and return a
//! [`SeekAction`] that the runner carries out against the controller.

mod goal;
mod ramp;

pub use goal::GoalSeekController;
pub use ramp::{RampSeekController, RAMP_SETTLE};

use crate::domain::run::{LoadChangeRequest, StopReason};

/// What the runner should do after a seek step.
#[derive(Debug, Clone, PartialEq)]
pub enum SeekAction {
    /// Nothing to change this tick.
    Hold,
    /// Issue a load change, then wait for it to settle.
    Change(LoadChangeRequest),
    /// End the control loop.
    Stop(StopReason),
}
