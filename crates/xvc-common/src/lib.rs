//! XVC Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging bootstrap for the XVC workspace.
//!
//! # Overview
//!
//! This crate provides the pieces every XVC component needs:
//!
//! - **Error Handling**: the [`XvcError`] enum and the [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//!
//! # Example
//!
//! ```no_run
//! use xvc_common::logging::{init_logging, LogConfig};
//!
//! fn bootstrap() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, XvcError};
