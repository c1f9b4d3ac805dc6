//! limkit core: client library for an XML/HTTP market-data query service.
//!
//! This crate contains:
//! - Query builder for series, forward curves and rolled continuous futures
//! - Async request engine (submit, poll, resolve) with a bounded poll policy
//! - XML report parser producing timestamp-indexed `SeriesTable`s
//! - MD5-addressed incremental disk cache (Parquet + JSON metadata)
//! - Upload engine for the row/column ingestion format
//! - Contract lookup with bounded memoization

pub mod cache;
pub mod client;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod error;
pub mod lookup;
pub mod query;
pub mod report;
pub mod table;
pub mod testing;
pub mod transport;
pub mod upload;
pub mod xml;

pub use client::LimClient;
pub use config::LimConfig;
pub use engine::PollPolicy;
pub use error::{LimError, Result};
pub use query::{AfterDate, RolloverSpec, Symbols};
pub use table::SeriesTable;
pub use upload::UploadMeta;
