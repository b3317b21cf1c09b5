//! The RPC surface of the frontier
//!
//! Newline-delimited JSON frames over TCP carry the bidirectional streams:
//! `PutURLs` (put frames in, ack frames out), `GetURLs` (a params frame in,
//! a url stream out), and the control operations. The engine never sees
//! sockets; this module translates frames into engine calls.

mod client;
mod server;
mod session;
mod wire;

pub use client::{parse_line, stream_items, FrontierClient, PutSummary};
pub use server::Server;
pub use wire::{ClientFrame, ServerFrame, WireItem};
