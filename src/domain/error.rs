//! Domain errors raised when run data or run configuration violate the
//! rules the control loop depends on.

use thiserror::Error;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// A statistic the control loop cannot run without was absent.
    #[error("missing run statistic: {name}")]
    MissingStatistic {
        /// Dotted statistic key, e.g. `client.timeRemaining`.
        name: &'static str,
    },

    /// The test type cannot be driven with the requested load type.
    #[error("unsupported load type '{load_type}' for test type '{test_type}'")]
    UnsupportedLoadType {
        /// Controller test type string.
        test_type: String,
        /// Configured load type string.
        load_type: String,
    },

    /// None of the test's client ports were found on the device.
    #[error("no device ports match client ports {ports:?}")]
    NoDeviceForPorts {
        /// Client port system ids taken from the test configuration.
        ports: Vec<String>,
    },

    /// Phase durations exceed the total run duration.
    #[error("phase durations ({phases}s) exceed run duration ({duration}s)")]
    InvalidPhaseBoundaries {
        /// Sum of startup, rampup, rampdown and shutdown.
        phases: u64,
        /// Total configured duration.
        duration: u64,
    },
}
