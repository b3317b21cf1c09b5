//! Persistence for scheduled URLs and the known-set
//!
//! This module handles all durable state of the frontier:
//! - per-(crawl, queue) ordered sets of scheduled entries
//! - the per-crawl known-set used for deduplication
//! - per-queue completed counters for restart recovery
//!
//! Backends implement the [`QueueStore`] trait; the engine never touches a
//! concrete backend type.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use schema::initialize_schema;
pub use sqlite::SqliteStore;
pub use traits::{
    merge_metadata, Metadata, PutOutcome, PutResult, QueueCounts, QueueStore, ScheduledEntry,
    StoreError, StoreResult,
};

use crate::config::StoreConfig;
use crate::FrontierError;
use std::path::Path;
use std::sync::Arc;

/// Opens the store backend selected by the configuration
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn QueueStore>, FrontierError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "sqlite" => Ok(Arc::new(SqliteStore::new(Path::new(&config.path))?)),
        other => Err(crate::ConfigError::UnknownBackend(other.to_string()).into()),
    }
}
