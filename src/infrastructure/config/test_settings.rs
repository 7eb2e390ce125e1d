//! `[[tests]]` entries and their conversion into [`TestRunConfig`].

use serde::Deserialize;

use crate::domain::kpi::{Kpi, KpiCombine};
use crate::domain::run::{
    Increments, PhaseDurations, RampSeekSettings, TestRunConfig, Thresholds,
};
use crate::domain::test_type::{CapacityAdjust, SeekStrategy};
use crate::error::{ConfigError, Result};

/// `capacity_adj`: `"auto"` or a fixed multiplier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CapacityAdjustSetting {
    Fixed(u64),
    Named(String),
}

impl Default for CapacityAdjustSetting {
    fn default() -> Self {
        Self::Named("auto".into())
    }
}

impl CapacityAdjustSetting {
    fn resolve(&self) -> Result<CapacityAdjust> {
        match self {
            Self::Fixed(value) => Ok(CapacityAdjust::Fixed(*value)),
            Self::Named(name) if name.trim().eq_ignore_ascii_case("auto") => {
                Ok(CapacityAdjust::Auto)
            }
            Self::Named(name) => match name.trim().parse() {
                Ok(value) => Ok(CapacityAdjust::Fixed(value)),
                Err(_) => Err(ConfigError::InvalidValue {
                    field: "capacity_adj",
                    reason: format!("expected \"auto\" or an integer, got {name:?}"),
                }
                .into()),
            },
        }
    }
}

/// One configured test.
#[derive(Debug, Clone, Deserialize)]
pub struct TestSettings {
    pub name: String,
    /// Controller test id.
    pub id: String,
    /// Controller test type, e.g. `http_throughput`.
    #[serde(rename = "type")]
    pub test_type: String,
    pub load_type: String,
    #[serde(default = "default_true")]
    pub run: bool,
    #[serde(default)]
    pub run_order: u32,
    #[serde(default = "default_suite")]
    pub suite: String,

    pub start_load: i64,
    pub incr_low: i64,
    pub incr_med: i64,
    pub incr_high: i64,
    pub low_threshold: f64,
    pub med_threshold: f64,
    pub high_threshold: f64,

    pub duration: u64,
    #[serde(default)]
    pub startup: u64,
    #[serde(default)]
    pub rampup: u64,
    #[serde(default)]
    pub rampdown: u64,
    #[serde(default)]
    pub shutdown: u64,
    #[serde(default)]
    pub sustain_period: u64,

    #[serde(default)]
    pub goal_seek: bool,
    #[serde(default)]
    pub capacity_adj: CapacityAdjustSetting,
    #[serde(default = "default_variance_sample_size")]
    pub variance_sample_size: usize,
    #[serde(default = "default_max_variance")]
    pub max_variance: f64,

    #[serde(default = "default_kpi_1")]
    pub kpi_1: String,
    #[serde(default = "default_kpi_2")]
    pub kpi_2: String,
    /// `and` requires both KPIs to be stable; anything else means either.
    #[serde(default)]
    pub kpi_and_or: String,

    #[serde(default)]
    pub ramp_seek: bool,
    #[serde(default = "default_kpi_1")]
    pub ramp_kpi: String,
    #[serde(default = "default_ramp_value")]
    pub ramp_value: f64,
    #[serde(default = "default_ramp_step")]
    pub ramp_step: u32,
    #[serde(default = "default_ramp_low")]
    pub ramp_low: f64,
    #[serde(default = "default_ramp_med")]
    pub ramp_med: f64,
    #[serde(default = "default_ramp_high")]
    pub ramp_high: f64,

    #[serde(default)]
    pub living_simusers_max: Option<u64>,
    /// `resource` or `threshold`; derived from the suite when absent.
    #[serde(default)]
    pub strategy: Option<String>,
}

const fn default_true() -> bool {
    true
}

fn default_suite() -> String {
    "default".into()
}

const fn default_variance_sample_size() -> usize {
    3
}

fn default_max_variance() -> f64 {
    0.03
}

fn default_kpi_1() -> String {
    "tps".into()
}

fn default_kpi_2() -> String {
    "cps".into()
}

fn default_ramp_value() -> f64 {
    1.0
}

const fn default_ramp_step() -> u32 {
    1
}

fn default_ramp_low() -> f64 {
    60.0
}

fn default_ramp_med() -> f64 {
    40.0
}

fn default_ramp_high() -> f64 {
    20.0
}

impl TestSettings {
    fn phases(&self) -> PhaseDurations {
        PhaseDurations {
            duration: self.duration,
            startup: self.startup,
            rampup: self.rampup,
            rampdown: self.rampdown,
            shutdown: self.shutdown,
        }
    }

    /// Check the entry on its own.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "tests.id" }.into());
        }
        if self.variance_sample_size < 1 {
            return Err(ConfigError::InvalidValue {
                field: "variance_sample_size",
                reason: format!("{}: must be at least 1", self.name),
            }
            .into());
        }
        if self.max_variance < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "max_variance",
                reason: format!("{}: must be 0 or greater", self.name),
            }
            .into());
        }
        if let Err(err) = self.phases().validate() {
            return Err(ConfigError::InvalidValue {
                field: "duration",
                reason: format!("{}: {err}", self.name),
            }
            .into());
        }
        if self.ramp_seek && self.ramp_step < 1 {
            return Err(ConfigError::InvalidValue {
                field: "ramp_step",
                reason: format!("{}: must be at least 1 with ramp seek", self.name),
            }
            .into());
        }
        if let Some(strategy) = &self.strategy {
            if SeekStrategy::parse(strategy).is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "strategy",
                    reason: format!("{}: unknown strategy {strategy:?}", self.name),
                }
                .into());
            }
        }
        self.capacity_adj.resolve()?;
        Ok(())
    }

    /// Build the immutable run configuration.
    pub fn to_run_config(&self) -> Result<TestRunConfig> {
        let strategy = self
            .strategy
            .as_deref()
            .and_then(SeekStrategy::parse)
            .unwrap_or_else(|| SeekStrategy::for_suite(&self.suite));
        let ramp_seek = self.ramp_seek.then(|| RampSeekSettings {
            kpi: Kpi::parse_or(&self.ramp_kpi, Kpi::Tps),
            target: self.ramp_value,
            steps: self.ramp_step,
            low_pct: self.ramp_low,
            med_pct: self.ramp_med,
            high_pct: self.ramp_high,
        });

        Ok(TestRunConfig {
            name: self.name.clone(),
            test_id: self.id.clone(),
            test_type: self.test_type.clone(),
            load_type: self.load_type.clone(),
            suite: self.suite.clone(),
            start_load: self.start_load,
            increments: Increments {
                low: self.incr_low,
                med: self.incr_med,
                high: self.incr_high,
            },
            thresholds: Thresholds {
                low: self.low_threshold,
                med: self.med_threshold,
                high: self.high_threshold,
            },
            phases: self.phases(),
            sustain_period: self.sustain_period,
            goal_seek: self.goal_seek,
            capacity_adjust: self.capacity_adj.resolve()?,
            variance_sample_size: self.variance_sample_size,
            max_variance: self.max_variance,
            kpi_1: Kpi::parse_or(&self.kpi_1, Kpi::Tps),
            kpi_2: Kpi::parse_or(&self.kpi_2, Kpi::Cps),
            kpi_combine: KpiCombine::parse(&self.kpi_and_or),
            ramp_seek,
            living_simusers_max: self.living_simusers_max,
            strategy,
        })
    }
}
