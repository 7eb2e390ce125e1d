//! Controller REST API client.
//!
//! Authenticates with `POST /token` and sends the bearer token on every
//! later request. Transient failures (connect errors, timeouts and
//! 422/500/502/503/504 responses) are retried with a linear backoff.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use super::dto::{
    test_update_body, DeviceDto, RunListEntry, StatisticsDto, TestDefinition, TestRunDto,
    TokenResponse,
};
use super::settings::ControllerConfig;
use crate::domain::run::RunStatus;
use crate::domain::stats::RawRunStatistics;
use crate::error::{ControllerError, Result};
use crate::port::outbound::controller::{
    ControllerClient, DeviceInfo, RunSummary, TestConfig, TestRun, TestUpdate,
};

/// Statuses the controller returns while it is busy or restarting.
const RETRY_STATUSES: [u16; 5] = [422, 500, 502, 503, 504];
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request body variants.
enum Body<'a> {
    Empty,
    Json(&'a Value),
    Form(String),
}

/// HTTP client for the controller API.
pub struct HttpControllerClient {
    http: HttpClient,
    address: String,
    /// `https://<address>/api/v2`
    api: String,
    username: String,
    password: String,
    token: RwLock<Option<String>>,
    retry_max_attempts: u32,
    retry_backoff_ms: u64,
}

impl HttpControllerClient {
    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_millis(config.http.timeout_ms))
            .connect_timeout(Duration::from_millis(config.http.connect_timeout_ms))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        Self {
            http,
            address: config.address.clone(),
            api: api_base(&config.address),
            username: config.username.clone(),
            password: config.password.clone(),
            token: RwLock::new(None),
            retry_max_attempts: config.http.retry_max_attempts,
            retry_backoff_ms: config.http.retry_backoff_ms,
        }
    }

    fn request(&self, method: Method, path: &str, body: &Body<'_>) -> RequestBuilder {
        let url = format!("{}{}", self.api, path);
        let mut request = self.http.request(method, url);
        if let Some(token) = self.token.read().ok().and_then(|token| token.clone()) {
            request = request.bearer_auth(token);
        }
        match body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Form(encoded) => request
                .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(encoded.clone()),
        }
    }

    async fn send_with_retry(&self, method: Method, path: &str, body: Body<'_>) -> Result<Response> {
        let mut attempt = 0;
        let max_attempts = self.retry_max_attempts.max(1);

        loop {
            attempt += 1;
            let response = match self.request(method.clone(), path, &body).send().await {
                Ok(response) => response,
                Err(err) => {
                    if attempt >= max_attempts || !should_retry(&err) {
                        return Err(err.into());
                    }
                    self.backoff(attempt, max_attempts, &err.to_string()).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if attempt < max_attempts && should_retry_status(status) {
                self.backoff(attempt, max_attempts, status.as_str()).await;
                continue;
            }
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                return Err(ControllerError::Unauthorized(body).into());
            }
            return Err(ControllerError::Http {
                status: status.as_u16(),
                body,
            }
            .into());
        }
    }

    async fn backoff(&self, attempt: u32, max_attempts: u32, reason: &str) {
        warn!(
            attempt,
            max_attempts,
            reason,
            "Controller request failed, retrying"
        );
        if self.retry_backoff_ms > 0 {
            sleep(Duration::from_millis(self.retry_backoff_ms * u64::from(attempt))).await;
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send_with_retry(Method::GET, path, Body::Empty).await?;
        Ok(response.json::<T>().await?)
    }

    async fn put(&self, path: &str, body: Body<'_>) -> Result<()> {
        let response = self.send_with_retry(Method::PUT, path, body).await?;
        let text = response.text().await.unwrap_or_default();
        debug!(path, response = %text, "Controller accepted request");
        Ok(())
    }
}

fn api_base(address: &str) -> String {
    format!("https://{}/api/v2", address.trim_end_matches('/'))
}

fn should_retry(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn should_retry_status(status: StatusCode) -> bool {
    RETRY_STATUSES.contains(&status.as_u16())
}

fn form(pairs: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[async_trait]
impl ControllerClient for HttpControllerClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<()> {
        let credentials = form(&[
            ("email", self.username.as_str()),
            ("password", self.password.as_str()),
        ]);
        let response = self
            .send_with_retry(Method::POST, "/token", Body::Form(credentials))
            .await?;
        let token = response.json::<TokenResponse>().await?.token.ok_or_else(|| {
            ControllerError::Unauthorized("token missing from response".into())
        })?;
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token);
        }
        info!(controller = %self.address, user = %self.username, "Connected to controller");
        Ok(())
    }

    async fn test_config(&self, test_type: &str, test_id: &str) -> Result<TestConfig> {
        let test: TestDefinition = self
            .get_json(&format!("/tests/{test_type}/{test_id}"))
            .await?;
        Ok(test.into())
    }

    async fn update_test(&self, test_type: &str, test_id: &str, update: &TestUpdate) -> Result<()> {
        let body = test_update_body(update);
        self.put(&format!("/tests/{test_type}/{test_id}"), Body::Json(&body))
            .await
    }

    async fn device_info(&self, device_id: &str) -> Result<DeviceInfo> {
        let device: DeviceDto = self.get_json(&format!("/devices/{device_id}")).await?;
        Ok(device.into())
    }

    async fn start_test(&self, test_id: &str) -> Result<TestRun> {
        let response = self
            .send_with_retry(Method::PUT, &format!("/tests/{test_id}/start"), Body::Empty)
            .await?;
        Ok(response.json::<TestRunDto>().await?.into())
    }

    async fn run_status(&self, run_id: &str) -> Result<RunStatus> {
        let run: TestRunDto = self.get_json(&format!("/test_runs/{run_id}")).await?;
        Ok(run.into())
    }

    async fn run_statistics(&self, run_id: &str) -> Result<RawRunStatistics> {
        let stats: StatisticsDto = self
            .get_json(&format!("/test_runs/{run_id}/statistics"))
            .await?;
        Ok(stats.into())
    }

    async fn change_load(&self, run_id: &str, load: i64) -> Result<()> {
        let load = load.to_string();
        self.put(
            &format!("/test_runs/{run_id}/changeload"),
            Body::Form(form(&[("load", load.as_str())])),
        )
        .await
    }

    async fn stop_test(&self, run_id: &str) -> Result<()> {
        self.put(&format!("/test_runs/{run_id}/stop"), Body::Empty)
            .await
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let runs: Vec<RunListEntry> = self.get_json("/test_runs").await?;
        Ok(runs.into_iter().map(RunSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::controller::settings::ControllerHttpConfig;

    fn config() -> ControllerConfig {
        ControllerConfig {
            address: "10.0.0.1:8443/".into(),
            username: "ops@example.com".into(),
            password: "secret".into(),
            verify_ssl: false,
            http: ControllerHttpConfig::default(),
        }
    }

    #[test]
    fn api_base_is_https_v2() {
        let client = HttpControllerClient::from_config(&config());
        assert_eq!(client.api, "https://10.0.0.1:8443/api/v2");
        assert_eq!(client.address(), "10.0.0.1:8443/");
    }

    #[test]
    fn busy_statuses_are_retried() {
        for code in [422, 500, 502, 503, 504] {
            assert!(should_retry_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [400, 401, 404, 409] {
            assert!(!should_retry_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn form_bodies_are_url_encoded() {
        assert_eq!(
            form(&[("email", "ops@example.com"), ("password", "a b&c")]),
            "email=ops%40example.com&password=a+b%26c"
        );
        assert_eq!(form(&[("load", "1010")]), "load=1010");
    }

    #[tokio::test]
    async fn unreachable_controller_is_an_error() {
        let mut config = config();
        config.address = "127.0.0.1:9".into();
        config.http.retry_max_attempts = 1;
        config.http.connect_timeout_ms = 200;
        let client = HttpControllerClient::from_config(&config);

        assert!(client.connect().await.is_err());
        assert!(client.token.read().unwrap().is_none());
    }
}
