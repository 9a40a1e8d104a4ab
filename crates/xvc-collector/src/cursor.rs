//! Resume cursor for the violations stream
//!
//! The cursor is a time-window lower bound plus an optional page offset
//! within that window. It lives in the state store under the `"Violations"`
//! key and only ever advances after a page was confirmed delivered:
//!
//! - more pages in the window: the offset increments, the window stays
//! - window exhausted: the window moves past the last record seen and the
//!   offset key disappears from the persisted document
//!
//! The advance methods return a new value instead of mutating in place, so
//! the collection loop persists first and only then commits in memory.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;
use xvc_common::{Result, XvcError};

use crate::models::XRAY_TIMESTAMP_FORMAT;
use crate::state::FileStateStore;

/// Store key of the violations stream cursor.
pub const STATE_KEY: &str = "Violations";

/// Seconds added past the last seen record when the window moves.
pub const MOVING_WINDOW_DELTA_SECS: i64 = 1;

/// First page offset of the upstream pagination (1-based).
pub const PAGE_OFFSET_START: u64 = 1;

/// Persisted resume position: `{window start, page offset?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    pub last_fetched_created_from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl CursorState {
    /// Load the cursor from the store, seeding it with the default window
    /// start on first use.
    pub fn load(store: &FileStateStore, default_created_from: &str) -> Result<Self> {
        if !store.has_key(STATE_KEY)? {
            let initial = CursorState {
                last_fetched_created_from: default_created_from.to_string(),
                offset: None,
            };
            initial.persist(store)?;
            debug!(created_from = default_created_from, "Seeded initial cursor");
            return Ok(initial);
        }
        store
            .get(STATE_KEY)?
            .ok_or_else(|| XvcError::State("cursor key vanished between has_key and get".into()))
    }

    /// Window lower bound for the list fetch.
    pub fn created_from(&self) -> &str {
        &self.last_fetched_created_from
    }

    /// Effective page offset within the current window.
    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(PAGE_OFFSET_START)
    }

    /// Copy with the offset advanced by one; the window is unchanged.
    pub fn advanced_offset(&self) -> Self {
        Self {
            last_fetched_created_from: self.last_fetched_created_from.clone(),
            offset: Some(self.offset() + 1),
        }
    }

    /// Copy with the window moved past `last_created` and the offset
    /// cleared.
    pub fn advanced_window(&self, last_created: &str) -> Result<Self> {
        Ok(Self {
            last_fetched_created_from: next_window_start(last_created)?,
            offset: None,
        })
    }

    /// Write the cursor to the store.
    pub fn persist(&self, store: &FileStateStore) -> Result<()> {
        store.set(STATE_KEY, self)
    }
}

/// Window start that follows a record created at `last_created`.
pub fn next_window_start(last_created: &str) -> Result<String> {
    let parsed = NaiveDateTime::parse_from_str(last_created, XRAY_TIMESTAMP_FORMAT)
        .map_err(|e| XvcError::Parse(format!("bad created timestamp {last_created:?}: {e}")))?;
    let advanced = parsed + Duration::seconds(MOVING_WINDOW_DELTA_SECS);
    Ok(advanced.format(XRAY_TIMESTAMP_FORMAT).to_string())
}
