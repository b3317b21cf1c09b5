//! Queue store trait and error types
//!
//! This module defines the trait interface for persistence backends and
//! associated error types.

use std::collections::HashMap;
use thiserror::Error;

/// Opaque per-URL metadata: string keys to lists of string values
pub type Metadata = HashMap<String, Vec<String>>;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage corruption: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true for errors the engine cannot recover from
    ///
    /// A fatal error flips the engine into read-only mode; everything else
    /// is acked as FAIL and the stream continues.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Corruption(_) | Self::Io(_) => true,
            Self::Serialization(_) => false,
            Self::Database(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseCorrupt)
                    | Some(rusqlite::ErrorCode::NotADatabase)
                    | Some(rusqlite::ErrorCode::DiskFull)
                    | Some(rusqlite::ErrorCode::SystemIoFailure)
                    | Some(rusqlite::ErrorCode::CannotOpen)
            ),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Disposition of a `put_scheduled` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The URL was new: added to the known-set and scheduled
    Inserted,

    /// The URL was already known and the caller asked not to replace it
    AlreadyKnown,

    /// The URL was already known; its scheduled entry was created or updated
    Replaced,
}

/// Full result of a `put_scheduled` call
#[derive(Debug, Clone)]
pub struct PutResult {
    pub outcome: PutOutcome,

    /// The queue key the entry was actually filed under. When the URL was
    /// already known this is the key recorded at first ingest, which may
    /// differ from the one the caller derived; a URL never moves queues.
    pub queue_key: String,

    /// A new scheduled row was created by this call
    pub created: bool,

    /// The update cleared an in-flight flag (the entry was rescheduled
    /// while handed out to a consumer)
    pub cleared_in_flight: bool,
}

/// A scheduled entry as returned by `fetch_due`
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    pub url: String,
    pub refetchable_from: i64,
    pub metadata: Metadata,
    pub in_flight: bool,
}

/// Per-queue entry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub scheduled: u64,
    pub in_flight: u64,
    pub completed: u64,
}

/// Trait for persistence backend implementations
///
/// Implementations own their internal locking: methods take `&self` and must
/// be safe to call from many concurrent tasks. Writes within a single crawl
/// are linearizable; writes across crawls need not be.
pub trait QueueStore: Send + Sync {
    // ===== Scheduled Entries =====

    /// Inserts or updates a scheduled entry, atomically with the known-set
    ///
    /// If the URL is not yet known under `crawl_id`, it is added to the
    /// known-set (recording `key`) and scheduled at `refetchable_from`;
    /// the outcome is `Inserted`, and a subsequent `is_known` for the same
    /// URL is guaranteed to return true.
    ///
    /// If the URL is known and `replace` is false, nothing changes and the
    /// outcome is `AlreadyKnown`.
    ///
    /// If the URL is known and `replace` is true, the entry is re-filed
    /// under its recorded key: an existing row keeps the later of the two
    /// times, merges metadata key-by-key (new keys replace old ones of the
    /// same name), and loses any in-flight flag; a missing row is inserted
    /// at the given time. The outcome is `Replaced`.
    fn put_scheduled(
        &self,
        crawl_id: &str,
        key: &str,
        url: &str,
        refetchable_from: i64,
        metadata: &Metadata,
        replace: bool,
    ) -> StoreResult<PutResult>;

    /// Returns up to `max` entries with `refetchable_from <= now`
    ///
    /// Entries come back in (time, insertion) order and are not removed;
    /// in-flight entries whose window has lapsed are included again.
    fn fetch_due(
        &self,
        crawl_id: &str,
        key: &str,
        now: i64,
        max: usize,
    ) -> StoreResult<Vec<ScheduledEntry>>;

    /// Flags an entry as handed to a consumer until the given time
    ///
    /// Returns the previous in-flight flag, or None if the entry does not
    /// exist.
    fn mark_in_flight(
        &self,
        crawl_id: &str,
        key: &str,
        url: &str,
        until: i64,
    ) -> StoreResult<Option<bool>>;

    /// Removes a completed entry and bumps the queue's completed counter
    ///
    /// Returns the entry's in-flight flag, or None if it did not exist.
    fn mark_completed(&self, crawl_id: &str, key: &str, url: &str) -> StoreResult<Option<bool>>;

    /// Moves an entry to a new schedule time, clearing any in-flight flag
    ///
    /// Returns false if the entry does not exist.
    fn reschedule(&self, crawl_id: &str, key: &str, url: &str, at: i64) -> StoreResult<bool>;

    // ===== Known-Set =====

    /// Checks whether a URL has ever been ingested under this crawl
    fn is_known(&self, crawl_id: &str, url: &str) -> StoreResult<bool>;

    /// Records a URL in the crawl's known-set under the given queue key
    fn add_known(&self, crawl_id: &str, url: &str, key: &str) -> StoreResult<()>;

    /// Returns the queue key a known URL was filed under, if any
    fn known_key(&self, crawl_id: &str, url: &str) -> StoreResult<Option<String>>;

    // ===== Queue Enumeration =====

    /// Lists all `(crawl_id, queue_key)` pairs, optionally for one crawl
    fn iterate_queues(&self, crawl_id: Option<&str>) -> StoreResult<Vec<(String, String)>>;

    /// Returns the entry counters for one queue
    fn queue_counts(&self, crawl_id: &str, key: &str) -> StoreResult<QueueCounts>;

    // ===== Deletion =====

    /// Removes a queue: its scheduled entries and its slice of the
    /// known-set. Returns the number of scheduled entries removed.
    fn delete_queue(&self, crawl_id: &str, key: &str) -> StoreResult<u64>;

    /// Removes every queue of a crawl together with its known-set,
    /// atomically. Returns the number of scheduled entries removed.
    fn delete_crawl(&self, crawl_id: &str) -> StoreResult<u64>;

    // ===== Maintenance =====

    /// Flushes buffered state to the durable medium
    ///
    /// Returns only after fsync-level durability when the backend supports
    /// it; a no-op for purely in-memory backends.
    fn checkpoint(&self) -> StoreResult<()>;
}

/// Merges incoming metadata into existing metadata
///
/// Keys from `incoming` replace existing keys of the same name; all other
/// existing keys are preserved.
pub fn merge_metadata(existing: &mut Metadata, incoming: &Metadata) {
    for (k, v) in incoming {
        existing.insert(k.clone(), v.clone());
    }
}
