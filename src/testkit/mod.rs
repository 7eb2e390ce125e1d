//! Test doubles and fixtures.
//!
//! - [`profile`] builds canonical run configurations and profiles.
//! - [`controller`] provides [`ScriptedController`](controller::ScriptedController).
//! - [`sink`] provides [`RecordingSink`](sink::RecordingSink).
//!
//! Compiled for unit tests and, behind the `testkit` feature, for the
//! integration tests under `tests/`.

pub mod controller;
pub mod profile;
pub mod sink;
