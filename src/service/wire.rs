//! Wire frames for the newline-delimited JSON transport
//!
//! One frame per line. Client frames carry an `op` tag, server frames a
//! `type` tag. A connection is one logical stream: `put` frames may be
//! pipelined freely and are answered by `ack` frames in completion order;
//! `get-urls` is answered by a stream of `url` frames terminated by `end`.

use crate::engine::{Ack, GetParams, QueueStatsRow, Stats, UrlInfo, UrlItem};
use serde::{Deserialize, Serialize};

/// An ingest item as it appears on the wire: the item plus its optional
/// ack correlation id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub item: UrlItem,
}

/// Frames sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ClientFrame {
    Put {
        item: WireItem,
    },
    GetUrls {
        #[serde(flatten)]
        params: GetParams,
    },
    ListCrawls,
    ListQueues {
        crawl_id: String,
        #[serde(default)]
        include_inactive: bool,
    },
    GetStats {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        crawl_id: Option<String>,
    },
    BlockQueueUntil {
        crawl_id: String,
        key: String,
        /// Epoch seconds; a past time lifts the block
        until: i64,
    },
    DrainQueue {
        crawl_id: String,
        key: String,
    },
    SetCrawlLimits {
        crawl_id: String,
        min_delay_seconds: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_queue_size: Option<u64>,
    },
    DeleteQueue {
        crawl_id: String,
        key: String,
    },
    DeleteCrawl {
        crawl_id: String,
    },
    Complete {
        crawl_id: String,
        url: String,
    },
    Checkpoint,
    ListNodes,
}

/// Frames sent by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    Ack(Ack),
    Url(UrlInfo),
    /// Terminates a `url` or `queue` stream
    End {
        count: u64,
    },
    Crawls {
        crawls: Vec<String>,
    },
    Queue(QueueStatsRow),
    Stats(Stats),
    Removed {
        count: u64,
    },
    Nodes {
        nodes: Vec<String>,
    },
    Done,
    Error {
        message: String,
    },
}
