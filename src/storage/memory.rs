//! In-memory store implementation
//!
//! Backs the `memory` backend id and the engine-level tests. All state lives
//! under one read-write lock; entry order is kept in a separate sorted index
//! so `fetch_due` never scans the whole queue.

use crate::storage::traits::{
    merge_metadata, Metadata, PutOutcome, PutResult, QueueCounts, QueueStore, ScheduledEntry,
    StoreError, StoreResult,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct MemEntry {
    refetchable_from: i64,
    seq: u64,
    metadata: Metadata,
    in_flight: bool,
}

#[derive(Debug, Default)]
struct MemQueue {
    /// url -> entry
    entries: HashMap<String, MemEntry>,
    /// (refetchable_from, seq) -> url, the serve order
    order: BTreeMap<(i64, u64), String>,
    completed: u64,
}

#[derive(Debug, Default)]
struct MemInner {
    /// (crawl_id, queue_key) -> queue
    queues: BTreeMap<(String, String), MemQueue>,
    /// crawl_id -> url -> queue key recorded at first ingest
    known: HashMap<String, HashMap<String, String>>,
    next_seq: u64,
}

/// In-memory store backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemInner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Corruption("store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemInner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Corruption("store lock poisoned".to_string()))
    }
}

impl QueueStore for MemoryStore {
    fn put_scheduled(
        &self,
        crawl_id: &str,
        key: &str,
        url: &str,
        refetchable_from: i64,
        metadata: &Metadata,
        replace: bool,
    ) -> StoreResult<PutResult> {
        let mut inner = self.write()?;

        let recorded_key = inner
            .known
            .get(crawl_id)
            .and_then(|m| m.get(url))
            .cloned();

        match recorded_key {
            None => {
                inner
                    .known
                    .entry(crawl_id.to_string())
                    .or_default()
                    .insert(url.to_string(), key.to_string());

                let seq = inner.next_seq;
                inner.next_seq += 1;

                let queue = inner
                    .queues
                    .entry((crawl_id.to_string(), key.to_string()))
                    .or_default();
                queue.entries.insert(
                    url.to_string(),
                    MemEntry {
                        refetchable_from,
                        seq,
                        metadata: metadata.clone(),
                        in_flight: false,
                    },
                );
                queue.order.insert((refetchable_from, seq), url.to_string());

                Ok(PutResult {
                    outcome: PutOutcome::Inserted,
                    queue_key: key.to_string(),
                    created: true,
                    cleared_in_flight: false,
                })
            }
            Some(actual_key) => {
                if !replace {
                    return Ok(PutResult {
                        outcome: PutOutcome::AlreadyKnown,
                        queue_key: actual_key,
                        created: false,
                        cleared_in_flight: false,
                    });
                }

                let seq = inner.next_seq;
                inner.next_seq += 1;

                let queue = inner
                    .queues
                    .entry((crawl_id.to_string(), actual_key.clone()))
                    .or_default();

                if let Some(entry) = queue.entries.get_mut(url) {
                    let cleared_in_flight = entry.in_flight;
                    entry.in_flight = false;
                    merge_metadata(&mut entry.metadata, metadata);
                    if refetchable_from > entry.refetchable_from {
                        queue.order.remove(&(entry.refetchable_from, entry.seq));
                        entry.refetchable_from = refetchable_from;
                        queue
                            .order
                            .insert((refetchable_from, entry.seq), url.to_string());
                    }
                    Ok(PutResult {
                        outcome: PutOutcome::Replaced,
                        queue_key: actual_key,
                        created: false,
                        cleared_in_flight,
                    })
                } else {
                    queue.entries.insert(
                        url.to_string(),
                        MemEntry {
                            refetchable_from,
                            seq,
                            metadata: metadata.clone(),
                            in_flight: false,
                        },
                    );
                    queue.order.insert((refetchable_from, seq), url.to_string());
                    Ok(PutResult {
                        outcome: PutOutcome::Replaced,
                        queue_key: actual_key,
                        created: true,
                        cleared_in_flight: false,
                    })
                }
            }
        }
    }

    fn fetch_due(
        &self,
        crawl_id: &str,
        key: &str,
        now: i64,
        max: usize,
    ) -> StoreResult<Vec<ScheduledEntry>> {
        let inner = self.read()?;

        let queue = match inner
            .queues
            .get(&(crawl_id.to_string(), key.to_string()))
        {
            Some(q) => q,
            None => return Ok(Vec::new()),
        };

        let mut due = Vec::new();
        for (_, url) in queue.order.range(..=(now, u64::MAX)) {
            if due.len() >= max {
                break;
            }
            if let Some(entry) = queue.entries.get(url) {
                due.push(ScheduledEntry {
                    url: url.clone(),
                    refetchable_from: entry.refetchable_from,
                    metadata: entry.metadata.clone(),
                    in_flight: entry.in_flight,
                });
            }
        }

        Ok(due)
    }

    fn mark_in_flight(
        &self,
        crawl_id: &str,
        key: &str,
        url: &str,
        until: i64,
    ) -> StoreResult<Option<bool>> {
        let mut inner = self.write()?;

        let queue = match inner
            .queues
            .get_mut(&(crawl_id.to_string(), key.to_string()))
        {
            Some(q) => q,
            None => return Ok(None),
        };

        match queue.entries.get_mut(url) {
            Some(entry) => {
                let was_in_flight = entry.in_flight;
                entry.in_flight = true;
                queue.order.remove(&(entry.refetchable_from, entry.seq));
                entry.refetchable_from = until;
                queue.order.insert((until, entry.seq), url.to_string());
                Ok(Some(was_in_flight))
            }
            None => Ok(None),
        }
    }

    fn mark_completed(&self, crawl_id: &str, key: &str, url: &str) -> StoreResult<Option<bool>> {
        let mut inner = self.write()?;

        let queue = match inner
            .queues
            .get_mut(&(crawl_id.to_string(), key.to_string()))
        {
            Some(q) => q,
            None => return Ok(None),
        };

        match queue.entries.remove(url) {
            Some(entry) => {
                queue.order.remove(&(entry.refetchable_from, entry.seq));
                queue.completed += 1;
                Ok(Some(entry.in_flight))
            }
            None => Ok(None),
        }
    }

    fn reschedule(&self, crawl_id: &str, key: &str, url: &str, at: i64) -> StoreResult<bool> {
        let mut inner = self.write()?;

        let queue = match inner
            .queues
            .get_mut(&(crawl_id.to_string(), key.to_string()))
        {
            Some(q) => q,
            None => return Ok(false),
        };

        match queue.entries.get_mut(url) {
            Some(entry) => {
                queue.order.remove(&(entry.refetchable_from, entry.seq));
                entry.refetchable_from = at;
                entry.in_flight = false;
                queue.order.insert((at, entry.seq), url.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn is_known(&self, crawl_id: &str, url: &str) -> StoreResult<bool> {
        let inner = self.read()?;
        Ok(inner
            .known
            .get(crawl_id)
            .map(|m| m.contains_key(url))
            .unwrap_or(false))
    }

    fn add_known(&self, crawl_id: &str, url: &str, key: &str) -> StoreResult<()> {
        let mut inner = self.write()?;
        inner
            .known
            .entry(crawl_id.to_string())
            .or_default()
            .insert(url.to_string(), key.to_string());
        Ok(())
    }

    fn known_key(&self, crawl_id: &str, url: &str) -> StoreResult<Option<String>> {
        let inner = self.read()?;
        Ok(inner
            .known
            .get(crawl_id)
            .and_then(|m| m.get(url))
            .cloned())
    }

    fn iterate_queues(&self, crawl_id: Option<&str>) -> StoreResult<Vec<(String, String)>> {
        let inner = self.read()?;
        Ok(inner
            .queues
            .keys()
            .filter(|(crawl, _)| crawl_id.map(|c| c == crawl).unwrap_or(true))
            .cloned()
            .collect())
    }

    fn queue_counts(&self, crawl_id: &str, key: &str) -> StoreResult<QueueCounts> {
        let inner = self.read()?;

        let queue = match inner
            .queues
            .get(&(crawl_id.to_string(), key.to_string()))
        {
            Some(q) => q,
            None => return Ok(QueueCounts::default()),
        };

        let in_flight = queue.entries.values().filter(|e| e.in_flight).count() as u64;
        Ok(QueueCounts {
            scheduled: queue.entries.len() as u64 - in_flight,
            in_flight,
            completed: queue.completed,
        })
    }

    fn delete_queue(&self, crawl_id: &str, key: &str) -> StoreResult<u64> {
        let mut inner = self.write()?;

        let removed = inner
            .queues
            .remove(&(crawl_id.to_string(), key.to_string()))
            .map(|q| q.entries.len() as u64)
            .unwrap_or(0);

        if let Some(known) = inner.known.get_mut(crawl_id) {
            known.retain(|_, recorded| recorded != key);
        }

        Ok(removed)
    }

    fn delete_crawl(&self, crawl_id: &str) -> StoreResult<u64> {
        let mut inner = self.write()?;

        let doomed: Vec<(String, String)> = inner
            .queues
            .keys()
            .filter(|(crawl, _)| crawl == crawl_id)
            .cloned()
            .collect();

        let mut removed = 0;
        for id in doomed {
            if let Some(q) = inner.queues.remove(&id) {
                removed += q.entries.len() as u64;
            }
        }
        inner.known.remove(crawl_id);

        Ok(removed)
    }

    fn checkpoint(&self) -> StoreResult<()> {
        Ok(())
    }
}
