//! Output sink
//!
//! Delivery boundary for normalized events. The collection loop owns a
//! sink for exactly one run and always calls `close()` once on the way
//! out, whatever the exit path.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;
use xvc_common::{Result, XvcError};

use crate::models::ViolationEvent;

/// Downstream delivery target for canonical events.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Deliver one batch to the endpoint registered under `endpoint_key`.
    async fn send(&self, events: &[ViolationEvent], endpoint_key: &str) -> Result<()>;

    /// Release sink resources; invoked exactly once per run.
    async fn close(&self) -> Result<()>;
}

/// Sink that POSTs event batches as JSON arrays to named HTTP endpoints.
pub struct HttpSink {
    http: reqwest::Client,
    endpoints: HashMap<String, String>,
}

impl HttpSink {
    pub fn new(endpoints: HashMap<String, String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| XvcError::Sink(e.to_string()))?;
        Ok(Self { http, endpoints })
    }
}

#[async_trait]
impl OutputSink for HttpSink {
    async fn send(&self, events: &[ViolationEvent], endpoint_key: &str) -> Result<()> {
        let url = self
            .endpoints
            .get(endpoint_key)
            .ok_or_else(|| XvcError::Sink(format!("unknown endpoint key {endpoint_key:?}")))?;

        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(events)
            .send()
            .await
            .map_err(|e| XvcError::Sink(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(XvcError::Sink(format!(
                "endpoint {endpoint_key} rejected batch with status {status}"
            )));
        }

        debug!(endpoint = endpoint_key, events = events.len(), "Batch delivered");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // nothing buffered; the contract still wants one close per run
        debug!("Sink closed");
        Ok(())
    }
}
