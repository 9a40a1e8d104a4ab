//! XVC Collector Library
//!
//! Incremental, checkpointed collection of violation records from a JFrog
//! Xray-style security scanner into a downstream HTTP log sink.
//!
//! # Pipeline
//!
//! 1. Load the resume cursor (time window + page offset) from the state store
//! 2. Fetch one page of violations from the list API
//! 3. Enrich each violation with its detail record (bounded worker pool)
//! 4. Normalize details into per-policy webhook events
//! 5. Send the page's events to the sink, then advance and persist the cursor
//!
//! The cursor only ever advances after a confirmed send, so a failed run
//! resumes from the last page that was fully delivered.
//!
//! # Example
//!
//! ```no_run
//! use xvc_collector::collector::ViolationsCollector;
//! use xvc_collector::config::CollectorConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CollectorConfig::load()?;
//!     let summary = ViolationsCollector::new(config)?.run().await?;
//!     println!("pages={} records={}", summary.pages, summary.records);
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod cursor;
pub mod enrich;
pub mod models;
pub mod normalize;
pub mod sink;
pub mod state;
pub mod transport;
