//! Application services: test setup, seek control, the run loop and suite
//! execution. Services depend on the port traits only.

pub mod runner;
pub mod seek;
pub mod setup;
pub mod suite;

pub use runner::RunLoop;
pub use setup::RunSetup;
pub use suite::{SuiteRunner, SuiteSummary, TestReport};
