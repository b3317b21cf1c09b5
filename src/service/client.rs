//! Client shell for the frontier service
//!
//! Covers the two client roles the binary exposes: streaming URLs from a
//! file into a running service (`put`) and simple request/response calls
//! (`stats`). Also home to the text-line parsing rules: a line starting
//! with `{` is a JSON item, any other non-empty line is a plain URL filed
//! under the caller's crawl id.

use crate::engine::{GetParams, Stats, UrlInfo, UrlItem};
use crate::service::wire::{ClientFrame, ServerFrame, WireItem};
use crate::storage::Metadata;
use crate::{FrontierError, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// A connected frontier client
pub struct FrontierClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl FrontierClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        let (read_half, writer) = socket.into_split();
        Ok(Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        })
    }

    pub async fn send(&mut self, frame: &ClientFrame) -> Result<()> {
        let mut line = serde_json::to_string(frame)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Reads the next frame; None on server close
    pub async fn recv(&mut self) -> Result<Option<ServerFrame>> {
        loop {
            match self.lines.next_line().await? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(serde_json::from_str(&line)?)),
            }
        }
    }

    /// Requests URLs and collects the response stream
    pub async fn get_urls(&mut self, params: GetParams) -> Result<Vec<UrlInfo>> {
        self.send(&ClientFrame::GetUrls { params }).await?;

        let mut urls = Vec::new();
        loop {
            match self.recv().await? {
                Some(ServerFrame::Url(url)) => urls.push(url),
                Some(ServerFrame::End { .. }) => return Ok(urls),
                Some(ServerFrame::Error { message }) => return Err(FrontierError::Server(message)),
                Some(_) => continue,
                None => return Err(FrontierError::Server("connection closed".to_string())),
            }
        }
    }

    pub async fn get_stats(&mut self, crawl_id: Option<String>) -> Result<Stats> {
        self.send(&ClientFrame::GetStats { crawl_id }).await?;
        match self.recv().await? {
            Some(ServerFrame::Stats(stats)) => Ok(stats),
            Some(ServerFrame::Error { message }) => Err(FrontierError::Server(message)),
            other => Err(FrontierError::Server(format!(
                "unexpected response: {:?}",
                other
            ))),
        }
    }
}

/// Tally of a streamed ingest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutSummary {
    pub ok: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl PutSummary {
    pub fn total(&self) -> u64 {
        self.ok + self.skipped + self.failed
    }
}

/// Parses one ingest line
///
/// Returns None for blank lines. A `{`-prefixed line must be a JSON item;
/// anything else becomes a Discovered item for `crawl_id` with no metadata.
pub fn parse_line(line: &str, crawl_id: &str) -> Option<std::result::Result<WireItem, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.starts_with('{') {
        return Some(serde_json::from_str(line));
    }

    Some(Ok(WireItem {
        id: None,
        item: UrlItem::Discovered {
            info: UrlInfo {
                url: line.to_string(),
                crawl_id: crawl_id.to_string(),
                key: None,
                metadata: Metadata::new(),
            },
        },
    }))
}

/// Streams a batch of items into the service and tallies the acks
///
/// Items are pipelined on a writer task while this task reads acks, so the
/// batch size is not limited by socket buffers. The write side half-closes
/// after the last item; the server drains and acks everything before the
/// ack stream ends.
pub async fn stream_items(addr: &str, items: Vec<WireItem>) -> Result<PutSummary> {
    let socket = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = socket.into_split();

    let expected = items.len();
    let sender = tokio::spawn(async move {
        for item in items {
            let mut line = serde_json::to_string(&ClientFrame::Put { item })?;
            line.push('\n');
            write_half.write_all(line.as_bytes()).await?;
        }
        // Dropping the write half sends the half-close.
        Ok::<_, FrontierError>(())
    });

    let mut lines = BufReader::new(read_half).lines();
    let mut summary = PutSummary::default();
    let mut received = 0usize;

    while received < expected {
        match lines.next_line().await? {
            None => break,
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => match serde_json::from_str::<ServerFrame>(&line)? {
                ServerFrame::Ack(ack) => {
                    received += 1;
                    match ack.status {
                        crate::engine::AckStatus::Ok => summary.ok += 1,
                        crate::engine::AckStatus::Skipped => summary.skipped += 1,
                        crate::engine::AckStatus::Fail => summary.failed += 1,
                    }
                }
                ServerFrame::Error { message } => {
                    return Err(FrontierError::Server(message));
                }
                _ => {}
            },
        }
    }

    sender
        .await
        .map_err(|e| FrontierError::Server(e.to_string()))??;

    if received < expected {
        return Err(FrontierError::Server(format!(
            "server closed after {} of {} acks",
            received, expected
        )));
    }

    Ok(summary)
}
