//! HTTP transport with bounded retries
//!
//! Thin wrapper around `reqwest` that applies basic auth, a per-request
//! timeout, and an exponential-backoff retry budget. Connect/timeout
//! failures and 5xx responses are retried; 4xx responses and undecodable
//! bodies fail immediately.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use xvc_common::{Result, XvcError};

/// Basic-auth credentials for the upstream API.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Retry and timeout budget for one logical request.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_factor: f64,
}

/// HTTP client for the Xray API.
#[derive(Debug, Clone)]
pub struct XrayClient {
    http: reqwest::Client,
    auth: BasicAuth,
    config: TransportConfig,
}

impl XrayClient {
    pub fn new(auth: BasicAuth, config: TransportConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| XvcError::Network(e.to_string()))?;
        Ok(Self { http, auth, config })
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<T, B>(&self, url: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(|| {
            self.http
                .post(url)
                .basic_auth(&self.auth.username, Some(&self.auth.password))
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .json(body)
        })
        .await
    }

    /// GET and decode the JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.execute(|| {
            self.http
                .get(url)
                .basic_auth(&self.auth.username, Some(&self.auth.password))
        })
        .await
    }

    async fn execute<T, F>(&self, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            match self.try_once(build()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient request failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_once<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| XvcError::Network(e.to_string()))?;

        let status = response.status();
        let url = response.url().to_string();
        if !status.is_success() {
            return Err(XvcError::Http {
                status: status.as_u16(),
                url,
            });
        }

        debug!(status = status.as_u16(), url = %url, "Request succeeded");
        response
            .json::<T>()
            .await
            .map_err(|e| XvcError::Parse(format!("undecodable response from {url}: {e}")))
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.config.backoff_factor * 2f64.powi(attempt as i32))
    }
}
