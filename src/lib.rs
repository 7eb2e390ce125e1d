//! Loadseek - adaptive load control for traffic generation appliances.
//!
//! Drives a test on a traffic controller and steers its offered load while
//! it runs, either upward until a KPI stops improving (goal seek) or in a
//! fixed number of steps towards a target KPI value (ramp seek).
//!
//! # Architecture
//!
//! - **`domain`** - Rolling statistics, resource headroom, load increments,
//!   the phase state machine and the run state
//! - **`port`** - Controller and result sink traits
//! - **`application`** - Test setup, the seek controllers, the run loop and
//!   suite execution
//! - **`adapter`** - HTTP controller client, CSV detailed report and the CLI
//! - **`infrastructure`** - TOML configuration and logging
//!
//! # Features
//!
//! - `testkit` - Scripted controller and recording sink for integration tests
//!
//! # Example
//!
//! ```no_run
//! use loadseek::adapter::outbound::controller::HttpControllerClient;
//! use loadseek::adapter::outbound::csv::CsvReportSink;
//! use loadseek::application::SuiteRunner;
//! use loadseek::infrastructure::config::settings::Config;
//!
//! # async fn example() -> loadseek::error::Result<()> {
//! let config = Config::load("config.toml")?;
//! let tests = config.selected_tests(&[], None)?;
//! let controller = HttpControllerClient::from_config(&config.controller);
//! let mut sink = CsvReportSink::new(&config.output.report_dir);
//! let summary = SuiteRunner::new(&controller, &mut sink).run(&tests).await?;
//! println!("{} passed, {} failed", summary.passed(), summary.failed());
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
