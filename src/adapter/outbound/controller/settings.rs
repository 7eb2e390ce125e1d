//! Controller connection configuration.

use serde::Deserialize;

/// Environment variable that overrides the configured password.
pub const PASSWORD_ENV: &str = "CONTROLLER_PASSWORD";

/// Controller address and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Host, or `host:port`, of the controller.
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Verify the controller's TLS certificate.
    #[serde(default)]
    pub verify_ssl: bool,
    #[serde(default)]
    pub http: ControllerHttpConfig,
}

impl ControllerConfig {
    /// Replace the password with `CONTROLLER_PASSWORD` when it is set.
    pub fn apply_env(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                self.password = password;
            }
        }
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerHttpConfig {
    /// Request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_http_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Maximum number of attempts for transient failures.
    #[serde(default = "default_http_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// Backoff unit between retries in milliseconds.
    #[serde(default = "default_http_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

const fn default_http_timeout_ms() -> u64 {
    30_000
}

const fn default_http_connect_timeout_ms() -> u64 {
    10_000
}

const fn default_http_retry_max_attempts() -> u32 {
    5
}

const fn default_http_retry_backoff_ms() -> u64 {
    1000
}

impl Default for ControllerHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
            connect_timeout_ms: default_http_connect_timeout_ms(),
            retry_max_attempts: default_http_retry_max_attempts(),
            retry_backoff_ms: default_http_retry_backoff_ms(),
        }
    }
}
