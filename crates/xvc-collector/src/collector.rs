//! Violations collection loop
//!
//! Drives repeated fetch/enrich/send cycles for the violations stream until
//! the stream is exhausted, the time budget runs out, or a failure stops
//! the run. The resume cursor only advances after a page was delivered, and
//! every advance is persisted before it is committed in memory, so a crash
//! at any point resumes from the last fully delivered page.
//!
//! A single-instance lock brackets the whole run; a stale lock left behind
//! by a crashed run is reclaimed once its lease expires instead of wedging
//! every future run.

use anyhow::{Context, Result};
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::cursor::CursorState;
use crate::enrich::DetailEnricher;
use crate::models::ViolationPage;
use crate::sink::{HttpSink, OutputSink};
use crate::state::FileStateStore;
use crate::transport::{BasicAuth, TransportConfig, XrayClient};

/// Store key of the single-instance run lock.
pub const LOCK_KEY: &str = "is_xray_collector_running";

/// Logical name of the sink endpoint receiving violation events.
pub const ENDPOINT_KEY: &str = "HTTP_LOGS_ENDPOINT";

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: u64,
    pub records: u64,
}

/// One-shot collector for the violations stream.
pub struct ViolationsCollector {
    config: CollectorConfig,
    store: FileStateStore,
}

impl ViolationsCollector {
    pub fn new(config: CollectorConfig) -> Result<Self> {
        config.validate()?;
        let store = FileStateStore::new(config.state.path.clone());
        Ok(Self { config, store })
    }

    /// State store backing this collector.
    pub fn store(&self) -> &FileStateStore {
        &self.store
    }

    /// Run one guarded collection pass.
    ///
    /// When another instance holds the run lock, no collection happens;
    /// an expired lease is reclaimed so the next scheduled run proceeds.
    pub async fn run(&self) -> Result<RunSummary> {
        if !self.store.acquire_lock(LOCK_KEY)? {
            warn!("Another collector instance holds the run lock");
            let reclaimed = self
                .store
                .release_lock_if_expired(LOCK_KEY, self.config.state.lock_expiry())?;
            if reclaimed {
                info!("Reclaimed an expired run lock; next run will collect");
            }
            return Ok(RunSummary::default());
        }

        info!("Starting violations collection run");
        let sink = HttpSink::new(HashMap::from([(
            ENDPOINT_KEY.to_string(),
            self.config.sink.http_logs_endpoint.clone(),
        )]))?;

        let result = self.collect(&sink).await;

        // sink close and lock release happen on every exit path
        if let Err(err) = sink.close().await {
            warn!(error = %err, "Sink close failed");
        }
        if let Err(err) = self.store.release_lock(LOCK_KEY) {
            warn!(error = %err, "Run lock release failed");
        }

        let summary = result?;
        info!(
            pages = summary.pages,
            records = summary.records,
            "Completed violations collection run"
        );
        Ok(summary)
    }

    /// The fetch/enrich/send loop against an already-acquired lock.
    async fn collect(&self, sink: &dyn OutputSink) -> Result<RunSummary> {
        let started = Instant::now();
        let collection = &self.config.collection;

        let auth = BasicAuth {
            username: self.config.xray.username.clone(),
            password: self.config.xray.password.clone(),
        };
        let transport = TransportConfig {
            timeout: collection.timeout(),
            max_retries: collection.max_retries,
            backoff_factor: collection.backoff_factor,
        };
        let client = XrayClient::new(auth.clone(), transport.clone())?;
        let enricher = DetailEnricher::new(auth, transport, collection.num_workers);
        let list_url = self.config.xray.violations_url();

        let mut cursor = CursorState::load(&self.store, &collection.default_created_from())
            .context("Failed to load cursor state")?;
        let mut summary = RunSummary::default();

        // created time of the last record observed during this run; None
        // until some page actually contained violations
        let mut last_seen_created: Option<String> = None;

        loop {
            let offset = cursor.offset();
            let created_from = cursor.created_from().to_string();
            let body = build_fetch_body(&cursor, collection.page_limit);

            let page: ViolationPage = match client.post_json(&list_url, &body).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(
                        offset,
                        created_from = %created_from,
                        error = %err,
                        "Violations fetch failed"
                    );
                    break;
                }
            };

            if let Some(last) = page.violations.last() {
                last_seen_created = Some(last.created.clone());
            }

            let events = enricher.enrich(&page.violations).await;

            if events.is_empty() {
                debug!(
                    offset,
                    created_from = %created_from,
                    violations = page.violations.len(),
                    "No events produced for this page"
                );
                // move past whatever this run actually saw; an entirely
                // empty run leaves the cursor for the next schedule
                if let Some(last_created) = &last_seen_created {
                    let next = cursor.advanced_window(last_created)?;
                    next.persist(&self.store)
                        .context("Failed to persist cursor state")?;
                }
                break;
            }

            let has_more = page.has_more();
            if let Err(err) = sink.send(&events, ENDPOINT_KEY).await {
                warn!(
                    offset,
                    created_from = %created_from,
                    error = %err,
                    "Violations send failed"
                );
                break;
            }

            summary.pages += 1;
            summary.records += events.len() as u64;
            debug!(
                offset,
                created_from = %created_from,
                events = events.len(),
                "Page delivered"
            );

            let next = if has_more {
                cursor.advanced_offset()
            } else if let Some(last_created) = &last_seen_created {
                cursor.advanced_window(last_created)?
            } else {
                // a delivered batch always came from a non-empty page
                break;
            };
            next.persist(&self.store)
                .context("Failed to persist cursor state")?;
            cursor = next;

            if !has_more {
                break;
            }
            if started.elapsed() >= collection.time_budget() {
                info!(
                    offset = cursor.offset(),
                    created_from = %cursor.created_from(),
                    "Time budget exhausted, stopping after checkpoint"
                );
                break;
            }
        }

        Ok(summary)
    }
}

/// Request body for one page of the violations list endpoint.
fn build_fetch_body(cursor: &CursorState, limit: u64) -> serde_json::Value {
    json!({
        "filters": {
            "created_from": cursor.created_from(),
        },
        "pagination": {
            "order_by": "created",
            "limit": limit,
            "offset": cursor.offset(),
        },
    })
}
