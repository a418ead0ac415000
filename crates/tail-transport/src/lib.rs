//! Ordered, bidirectional frame transport used by the `tailgate` shipper.
//!
//! The shipper only needs four things from the wire: dial with a deadline,
//! send a text or binary frame, receive a frame, and close. Everything else
//! (TLS, framing, keepalives) belongs to the concrete implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod memory;
pub mod websocket;

pub use memory::{MemoryConnection, MemoryListener, MemoryPeer, MemoryTransport};
pub use websocket::{WebSocketConnection, WebSocketTransport};

/// A single message on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Text(_) => FrameKind::Text,
            Frame::Binary(_) => FrameKind::Binary,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Text => f.write_str("text"),
            FrameKind::Binary => f.write_str("binary"),
        }
    }
}

/// Why a connection is being closed; mapped onto the transport's own close codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    Error,
}

#[derive(Debug, Error)]
pub enum DialError {
    #[error("connection to {address} refused")]
    Refused { address: String },
    #[error("connection to {address} timed out after {timeout:?}")]
    TimedOut { address: String, timeout: Duration },
    #[error("connection to {address} failed: {reason}")]
    Failed { address: String, reason: String },
}

impl DialError {
    /// The remote is not accepting connections at all, as opposed to a slow or
    /// otherwise broken dial.
    pub fn is_refused(&self) -> bool {
        matches!(self, DialError::Refused { .. })
    }

    pub fn address(&self) -> &str {
        match self {
            DialError::Refused { address }
            | DialError::TimedOut { address, .. }
            | DialError::Failed { address, .. } => address,
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("transport send failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("connection closed by peer")]
    Closed,
    #[error("transport receive failed: {0}")]
    Transport(String),
}

/// Dials connections to a collector.
#[async_trait]
pub trait TailTransport: Send + Sync {
    type Connection: TailConnection + 'static;

    async fn connect(&self, address: &str, timeout: Duration)
        -> Result<Self::Connection, DialError>;
}

/// One established connection. Owned by a single attempt and never shared.
#[async_trait]
pub trait TailConnection: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), SendError>;

    async fn receive(&mut self) -> Result<Frame, ReceiveError>;

    /// `false` once the peer has gone away or `close` was called. Only a hint:
    /// a `true` here does not guarantee the next send succeeds.
    fn is_connected(&self) -> bool;

    /// Closing twice is a no-op.
    async fn close(&mut self, reason: CloseReason);
}
