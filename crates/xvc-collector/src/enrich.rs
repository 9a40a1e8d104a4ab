//! Detail enrichment worker pool
//!
//! For each violation on a page, fetches the per-item detail record and
//! normalizes it into canonical events. Fetches run on a bounded pool
//! (`buffer_unordered`), each work item with its own HTTP session, and the
//! page's results are fully gathered before anything is returned.
//!
//! A failing item (fetch, decode, or normalize) is logged and contributes
//! nothing; it never aborts its siblings or the page.

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};
use xvc_common::Result;

use crate::models::{ViolationDetail, ViolationEvent, ViolationSummary};
use crate::normalize;
use crate::transport::{BasicAuth, TransportConfig, XrayClient};

/// Bounded-concurrency enricher for one page of violations.
#[derive(Debug, Clone)]
pub struct DetailEnricher {
    auth: BasicAuth,
    transport: TransportConfig,
    num_workers: usize,
}

impl DetailEnricher {
    pub fn new(auth: BasicAuth, transport: TransportConfig, num_workers: usize) -> Self {
        Self {
            auth,
            transport,
            num_workers,
        }
    }

    /// Enrich a page of violations into the flattened event list.
    ///
    /// Event ordering across violations is unspecified; events of a single
    /// violation keep the order of its matched-policy list.
    pub async fn enrich(&self, violations: &[ViolationSummary]) -> Vec<ViolationEvent> {
        debug!(
            violations = violations.len(),
            workers = self.num_workers,
            "Enriching page"
        );

        let results: Vec<Vec<ViolationEvent>> = stream::iter(violations)
            .map(|violation| self.enrich_one(violation))
            .buffer_unordered(self.num_workers)
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }

    /// Enrich one violation, isolating every failure to this item.
    async fn enrich_one(&self, violation: &ViolationSummary) -> Vec<ViolationEvent> {
        let Some(url) = &violation.violation_details_url else {
            return Vec::new();
        };

        match self.fetch_and_transform(url).await {
            Ok(events) => events,
            Err(err) => {
                warn!(url = %url, error = %err, "Violation detail dropped");
                Vec::new()
            }
        }
    }

    async fn fetch_and_transform(&self, url: &str) -> Result<Vec<ViolationEvent>> {
        // each work item gets its own session
        let client = XrayClient::new(self.auth.clone(), self.transport.clone())?;
        let detail: ViolationDetail = client.get_json(url).await?;
        normalize::transform_violation(&detail, url)
    }
}
