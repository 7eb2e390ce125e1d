//! Domain types and the load control algorithms.
//!
//! Everything here is synchronous and free of I/O: rolling stability windows,
//! resource headroom, load increment rules, the phase state machine and the
//! run state they operate on.

pub mod error;
pub mod increment;
pub mod kpi;
pub mod numeric;
pub mod phase;
pub mod report;
pub mod resource;
pub mod rolling;
pub mod run;
pub mod stats;
pub mod test_type;
