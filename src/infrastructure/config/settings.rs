//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings.
//! Configuration is loaded from a TOML file; the controller password can be
//! supplied through `CONTROLLER_PASSWORD` instead of the file.
//!
//! # Example
//!
//! ```no_run
//! use loadseek::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use super::logging::LoggingConfig;
use super::test_settings::TestSettings;
use crate::adapter::outbound::controller::settings::ControllerConfig;
use crate::domain::run::TestRunConfig;
use crate::error::{ConfigError, Result};

/// Report output settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
}

fn default_report_dir() -> String {
    "reports".into()
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
        }
    }
}

/// Suite selection.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSettings {
    #[serde(default = "default_suites")]
    pub suites: Vec<String>,
}

fn default_suites() -> Vec<String> {
    vec!["default".into()]
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            suites: default_suites(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub controller: ControllerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub run: RunSettings,

    #[serde(default)]
    pub tests: Vec<TestSettings>,
}

impl Config {
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.controller.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.controller.address.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "controller.address",
            }
            .into());
        }
        if self.controller.http.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry_max_attempts",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        for test in &self.tests {
            test.validate()?;
        }
        Ok(())
    }

    pub fn init_logging(&self) {
        self.logging.init();
    }

    /// Tests to execute, in run order.
    ///
    /// `suites` replaces the configured suite list when non-empty; `name`
    /// keeps only the test with that name.
    pub fn selected_tests(&self, suites: &[String], name: Option<&str>) -> Result<Vec<TestRunConfig>> {
        let suites: &[String] = if suites.is_empty() {
            &self.run.suites
        } else {
            suites
        };

        let mut selected: Vec<&TestSettings> = self
            .tests
            .iter()
            .filter(|test| test.run && suites.contains(&test.suite))
            .filter(|test| name.map_or(true, |name| test.name == name))
            .collect();
        selected.sort_by_key(|test| test.run_order);

        selected
            .into_iter()
            .map(TestSettings::to_run_config)
            .collect()
    }
}
