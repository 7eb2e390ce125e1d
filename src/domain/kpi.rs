//! KPI selection.
//!
//! A KPI names one of the reported rolling windows. Configuration strings are
//! resolved to a [`Kpi`] once when the run configuration is built.

use std::fmt;

use tracing::debug;

use super::rolling::StatKind;

/// Metric used as a stability or advancement signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kpi {
    Tps,
    Cps,
    Conns,
    Bw,
    Ttfb,
}

impl Kpi {
    /// Parse a KPI name (case-insensitive).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tps" => Some(Self::Tps),
            "cps" => Some(Self::Cps),
            "conns" => Some(Self::Conns),
            "bw" => Some(Self::Bw),
            "ttfb" => Some(Self::Ttfb),
            _ => None,
        }
    }

    /// Parse a KPI name, using `fallback` for unknown names.
    #[must_use]
    pub fn parse_or(name: &str, fallback: Self) -> Self {
        Self::parse(name).unwrap_or_else(|| {
            debug!(kpi = name, fallback = %fallback, "Unknown KPI, using fallback");
            fallback
        })
    }

    /// Rolling window backing this KPI.
    #[must_use]
    pub const fn stat(self) -> StatKind {
        match self {
            Self::Tps => StatKind::Tps,
            Self::Cps => StatKind::Cps,
            Self::Conns => StatKind::Conns,
            Self::Bw => StatKind::Bw,
            Self::Ttfb => StatKind::Ttfb,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tps => "tps",
            Self::Cps => "cps",
            Self::Conns => "conns",
            Self::Bw => "bw",
            Self::Ttfb => "ttfb",
        }
    }
}

impl fmt::Display for Kpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How two KPI stability flags are combined before a seek step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KpiCombine {
    /// Both KPIs must be stable.
    And,
    /// Either KPI may be stable.
    #[default]
    Or,
}

impl KpiCombine {
    /// Anything other than `and` (case-insensitive) means OR.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("and") {
            Self::And
        } else {
            Self::Or
        }
    }

    #[must_use]
    pub const fn combine(self, first: bool, second: bool) -> bool {
        match self {
            Self::And => first && second,
            Self::Or => first || second,
        }
    }
}
