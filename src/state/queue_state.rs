use std::fmt;

/// Scheduling status of a queue
///
/// Transitions: `Active -> Paused` (admin block), `Paused -> Active` (admin
/// or the clock reaching `blocked_until`), `Active -> Draining` (admin), and
/// a draining queue is deleted once its last entry completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    /// Eligible for scheduling and accepting new URLs
    Active,

    /// Excluded from scheduling until resumed
    Paused,

    /// Accepting no new URLs; remaining entries are still served
    Draining,
}

impl QueueStatus {
    /// Returns true if the scheduler may serve from a queue in this status
    pub fn is_servable(&self) -> bool {
        matches!(self, Self::Active | Self::Draining)
    }

    /// Returns true if ingest may add URLs to a queue in this status
    pub fn accepts_urls(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Draining => "draining",
        }
    }

    /// Parses a status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "draining" => Some(Self::Draining),
            _ => None,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Tracks the scheduling state of a single queue
///
/// This structure maintains the per-queue metadata needed for politeness
/// (minimum delay between serves), manual pausing, fairness bookkeeping, and
/// the counters surfaced by the control surface. Times are epoch
/// milliseconds.
#[derive(Debug, Clone)]
pub struct QueueState {
    /// Current scheduling status
    pub status: QueueStatus,

    /// Earliest time at which a URL from this queue may be served again
    pub next_eligible_at: i64,

    /// Manual pause horizon; the queue auto-resumes once the clock passes it
    pub blocked_until: Option<i64>,

    /// When this queue last contributed a URL to a response
    pub last_produced_at: Option<i64>,

    /// Entries scheduled and not currently handed to a consumer
    pub scheduled_count: u64,

    /// Entries handed to a consumer and not yet completed
    pub in_flight_count: u64,

    /// Entries explicitly completed over the queue's lifetime
    pub completed_count: u64,
}

impl QueueState {
    /// Creates a new QueueState with default values
    pub fn new() -> Self {
        Self {
            status: QueueStatus::Active,
            next_eligible_at: 0,
            blocked_until: None,
            last_produced_at: None,
            scheduled_count: 0,
            in_flight_count: 0,
            completed_count: 0,
        }
    }

    /// Total entries the queue is responsible for (scheduled + in-flight)
    pub fn active_count(&self) -> u64 {
        self.scheduled_count + self.in_flight_count
    }

    /// Clears an expired manual block
    ///
    /// A paused queue whose `blocked_until` horizon has passed becomes
    /// active again. Callers invoke this before eligibility checks so a
    /// block expiry never needs a separate timer.
    pub fn maybe_resume(&mut self, now: i64) {
        if self.status == QueueStatus::Paused {
            if let Some(until) = self.blocked_until {
                if now >= until {
                    self.status = QueueStatus::Active;
                    self.blocked_until = None;
                }
            }
        }
    }

    /// Checks whether the scheduler may serve from this queue right now
    ///
    /// This enforces:
    /// - the status gate (paused queues are excluded),
    /// - the politeness delay (`next_eligible_at`),
    /// - non-emptiness.
    pub fn can_serve(&self, now: i64) -> bool {
        self.status.is_servable() && self.next_eligible_at <= now && self.active_count() > 0
    }

    /// Records that a URL was served from this queue
    ///
    /// Pushes `next_eligible_at` forward by the crawl's minimum delay and
    /// stamps `last_produced_at` for fairness bookkeeping.
    pub fn record_serve(&mut self, now: i64, min_delay_ms: i64) {
        self.next_eligible_at = now + min_delay_ms;
        self.last_produced_at = Some(now);
    }

    /// Calculates the time until this queue may be served again
    ///
    /// Returns None if the queue is eligible now, or the wait in
    /// milliseconds otherwise.
    pub fn time_until_ready(&self, now: i64) -> Option<i64> {
        if self.next_eligible_at > now {
            Some(self.next_eligible_at - now)
        } else {
            None
        }
    }
}

impl Default for QueueState {
    fn default() -> Self {
        Self::new()
    }
}
