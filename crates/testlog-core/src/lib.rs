//! testlog-core library.
//!
//! Turns `go test -json` event streams into a deduplicated report store and
//! derives pass/fail aggregates from it:
//!
//! ```text
//! bytes → event::parser → report::builder → db (SQLite) → metrics → cache
//! ```
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` at I/O and SQL boundaries; `thiserror` enums
//!   for component errors that callers match on; [`error::ErrorCode`] for
//!   stable machine codes.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`). The library
//!   never installs a subscriber.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod ingest;
pub mod lock;
pub mod metrics;
pub mod report;
pub mod source;
