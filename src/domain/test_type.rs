//! Test and load classification.
//!
//! The controller names tests by a type string and loads by a free-form load
//! type. Both are mapped here onto closed enums, together with the load
//! specification key and minimal load step each combination uses.

use std::fmt;

use super::error::DomainError;

/// Family of traffic test being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestType {
    /// HTTP throughput.
    Tput,
    /// HTTP connections per second.
    Cps,
    /// Open connections.
    Conns,
    /// Mixed application traffic.
    Emix,
    /// Maximum HTTP connections per second.
    MaxCps,
    /// Maximum HTTP throughput.
    MaxTput,
    /// Volumetric or protocol DDoS.
    Ddos,
}

impl TestType {
    /// Map a controller test type string. Unknown types are driven as
    /// throughput tests.
    #[must_use]
    pub fn from_controller(type_v2: &str) -> Self {
        match type_v2 {
            "http_throughput" => Self::Tput,
            "http_connections_per_second" => Self::Cps,
            "open_connections" => Self::Conns,
            "emix" => Self::Emix,
            "max_http_connections_per_second" => Self::MaxCps,
            "max_http_throughput" => Self::MaxTput,
            "volumetric_ddos" | "protocol_ddos" => Self::Ddos,
            _ => Self::Tput,
        }
    }

    /// Tests whose load is fixed by the appliance rather than steered.
    #[must_use]
    pub const fn is_fixed_load(self) -> bool {
        matches!(self, Self::MaxCps | Self::MaxTput | Self::Ddos)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tput => "tput",
            Self::Cps => "cps",
            Self::Conns => "conns",
            Self::Emix => "emix",
            Self::MaxCps => "max_cps",
            Self::MaxTput => "max_tput",
            Self::Ddos => "ddos",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit the load specification is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadType {
    SimUsers,
    SimUsersPerSecond,
    Bandwidth,
    Connections,
    ConnectionsPerSecond,
}

impl LoadType {
    /// Parse a configured load type (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simusers" => Some(Self::SimUsers),
            "simusers/second" => Some(Self::SimUsersPerSecond),
            "bandwidth" => Some(Self::Bandwidth),
            "connections" => Some(Self::Connections),
            "connections/second" => Some(Self::ConnectionsPerSecond),
            _ => None,
        }
    }

    /// Load types counted in simulated users.
    #[must_use]
    pub const fn is_simusers(self) -> bool {
        matches!(self, Self::SimUsers | Self::SimUsersPerSecond)
    }

    /// Load types stepped by the plain load policy.
    #[must_use]
    pub const fn is_rate_or_volume(self) -> bool {
        matches!(
            self,
            Self::Bandwidth | Self::Connections | Self::ConnectionsPerSecond
        )
    }

    /// Name used by the controller's load specification.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimUsers => "SimUsers",
            Self::SimUsersPerSecond => "SimUsers/Second",
            Self::Bandwidth => "Bandwidth",
            Self::Connections => "Connections",
            Self::ConnectionsPerSecond => "Connections/Second",
        }
    }
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field of the load specification that carries the start load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKey {
    Bandwidth,
    BidirectionalBandwidth,
    Connections,
    ConnectionsPerSecond,
}

impl LoadKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bandwidth => "bandwidth",
            Self::BidirectionalBandwidth => "bidirectionalBandwidth",
            Self::Connections => "connections",
            Self::ConnectionsPerSecond => "connectionsPerSecond",
        }
    }
}

/// How goal seek chooses its next load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekStrategy {
    /// Step by configured increments while the KPI keeps improving.
    #[default]
    Threshold,
    /// Step by resource headroom and KPI momentum.
    Resource,
}

impl SeekStrategy {
    /// The `default` suite is resource driven; every other suite steps by
    /// thresholds.
    #[must_use]
    pub fn for_suite(suite: &str) -> Self {
        if suite == "default" {
            Self::Resource
        } else {
            Self::Threshold
        }
    }

    /// Parse an explicit strategy name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "resource" => Some(Self::Resource),
            "threshold" => Some(Self::Threshold),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::Resource => "resource",
        }
    }
}

/// Multiplier applied to the raw load step units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityAdjust {
    /// Client core count for simuser loads, client port count otherwise.
    Auto,
    Fixed(u64),
}

impl CapacityAdjust {
    #[must_use]
    pub fn resolve(self, load_type: Option<LoadType>, client_ports: u64, client_cores: u64) -> u64 {
        match self {
            Self::Fixed(value) => value,
            Self::Auto if load_type.is_some_and(LoadType::is_simusers) => client_cores,
            Self::Auto => client_ports,
        }
    }
}

/// Load specification key, canonical load type and minimal step for one
/// test/load combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    pub key: LoadKey,
    pub load_type: Option<LoadType>,
    pub minimal_step: u64,
}

/// Resolve the load plan for a test type and configured load type.
///
/// `response_length` is the configured HTTP response body size; small
/// responses get a larger simusers/second step on throughput tests.
pub fn resolve_load_plan(
    test_type: TestType,
    load_type: &str,
    response_length: u64,
) -> Result<LoadPlan, DomainError> {
    let parsed = LoadType::parse(load_type);
    let plan = |key, load_type, minimal_step| LoadPlan {
        key,
        load_type,
        minimal_step,
    };

    let resolved = match (test_type, parsed) {
        (TestType::Tput | TestType::Emix, Some(LoadType::SimUsers)) => {
            plan(LoadKey::Bandwidth, parsed, 1)
        }
        (TestType::Tput | TestType::Emix, Some(LoadType::Bandwidth)) => {
            plan(LoadKey::Bandwidth, parsed, 5000)
        }
        (TestType::Tput | TestType::Emix, Some(LoadType::SimUsersPerSecond)) => {
            let step = if response_length <= 1000 { 8 } else { 1 };
            plan(LoadKey::Bandwidth, parsed, step)
        }
        (TestType::Cps, Some(LoadType::ConnectionsPerSecond)) => {
            plan(LoadKey::ConnectionsPerSecond, parsed, 100)
        }
        (TestType::Cps, Some(LoadType::SimUsers)) => plan(LoadKey::ConnectionsPerSecond, parsed, 1),
        (TestType::Cps, Some(LoadType::SimUsersPerSecond)) => {
            plan(LoadKey::ConnectionsPerSecond, parsed, 200)
        }
        (TestType::Conns, Some(LoadType::SimUsers)) => plan(LoadKey::Connections, parsed, 100),
        (TestType::Conns, Some(LoadType::Connections)) => plan(LoadKey::Connections, parsed, 500),
        (TestType::Conns, Some(LoadType::SimUsersPerSecond)) => {
            plan(LoadKey::Connections, parsed, 10)
        }
        (TestType::MaxCps, _) => plan(LoadKey::ConnectionsPerSecond, parsed, 1),
        (TestType::MaxTput, _) => plan(LoadKey::BidirectionalBandwidth, parsed, 1),
        (TestType::Ddos, _) => plan(LoadKey::Bandwidth, parsed, 1),
        _ => {
            return Err(DomainError::UnsupportedLoadType {
                test_type: test_type.to_string(),
                load_type: load_type.to_string(),
            })
        }
    };
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_types_map_to_test_types() {
        assert_eq!(TestType::from_controller("http_throughput"), TestType::Tput);
        assert_eq!(TestType::from_controller("open_connections"), TestType::Conns);
        assert_eq!(TestType::from_controller("protocol_ddos"), TestType::Ddos);
        assert_eq!(TestType::from_controller("something_new"), TestType::Tput);
    }

    #[test]
    fn load_type_parse_is_case_insensitive() {
        assert_eq!(LoadType::parse("SimUsers/Second"), Some(LoadType::SimUsersPerSecond));
        assert_eq!(LoadType::parse("BANDWIDTH"), Some(LoadType::Bandwidth));
        assert_eq!(LoadType::parse("requests"), None);
    }

    #[test]
    fn throughput_simusers_per_second_step_depends_on_response_size() {
        let small = resolve_load_plan(TestType::Tput, "simusers/second", 512).unwrap();
        let large = resolve_load_plan(TestType::Tput, "simusers/second", 64_000).unwrap();
        assert_eq!(small.minimal_step, 8);
        assert_eq!(large.minimal_step, 1);
        assert_eq!(small.key, LoadKey::Bandwidth);
    }

    #[test]
    fn connection_tests_use_connection_keys() {
        let cps = resolve_load_plan(TestType::Cps, "Connections/Second", 0).unwrap();
        assert_eq!(cps.key, LoadKey::ConnectionsPerSecond);
        assert_eq!(cps.minimal_step, 100);

        let conns = resolve_load_plan(TestType::Conns, "connections", 0).unwrap();
        assert_eq!(conns.key, LoadKey::Connections);
        assert_eq!(conns.minimal_step, 500);
        assert_eq!(conns.load_type, Some(LoadType::Connections));
    }

    #[test]
    fn fixed_load_tests_accept_any_load_type() {
        let plan = resolve_load_plan(TestType::MaxTput, "whatever", 0).unwrap();
        assert_eq!(plan.key, LoadKey::BidirectionalBandwidth);
        assert_eq!(plan.load_type, None);
    }

    #[test]
    fn unsupported_combination_is_an_error() {
        let err = resolve_load_plan(TestType::Cps, "bandwidth", 0).unwrap_err();
        assert_eq!(
            err,
            DomainError::UnsupportedLoadType {
                test_type: "cps".into(),
                load_type: "bandwidth".into(),
            }
        );
    }

    #[test]
    fn auto_capacity_adjust_uses_cores_for_simusers() {
        let auto = CapacityAdjust::Auto;
        assert_eq!(auto.resolve(Some(LoadType::SimUsers), 2, 16), 16);
        assert_eq!(auto.resolve(Some(LoadType::Bandwidth), 2, 16), 2);
        assert_eq!(auto.resolve(None, 2, 16), 2);
        assert_eq!(CapacityAdjust::Fixed(5).resolve(None, 2, 16), 5);
    }

    #[test]
    fn default_suite_selects_resource_strategy() {
        assert_eq!(SeekStrategy::for_suite("default"), SeekStrategy::Resource);
        assert_eq!(SeekStrategy::for_suite("nightly"), SeekStrategy::Threshold);
    }
}
