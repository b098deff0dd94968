//! Error types for the transport, codec and worker layers.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Socket-level failures. None of these are retried; the loop that hits one
/// stops and hands the error back to whoever joins it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind UDP socket to {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed to configure UDP socket: {0}")]
    Configure(#[source] io::Error),

    #[error("failed to send to {dest}: {source}")]
    Send { dest: SocketAddr, source: io::Error },

    #[error("sent {sent} of {len} bytes to {dest}")]
    PartialSend {
        dest: SocketAddr,
        sent: usize,
        len: usize,
    },

    #[error("failed to receive: {0}")]
    Receive(#[source] io::Error),

    #[error("received data from non-IPv4 source {0}")]
    NonIpv4Source(SocketAddr),
}

/// Malformed datagrams. These are dropped by the engines, never fatal.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown packet tag {0}")]
    UnknownTag(u8),

    #[error("truncated payload: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("roster of {0} players does not fit a POSITIONS packet")]
    TooManyPlayers(usize),

    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker thread `{name}`: {source}")]
    Spawn { name: String, source: io::Error },

    #[error("worker thread `{name}` panicked")]
    Panicked { name: String },
}
