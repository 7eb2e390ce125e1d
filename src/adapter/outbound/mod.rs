//! Outbound adapters: the controller REST API and the detailed report.

pub mod controller;
pub mod csv;
