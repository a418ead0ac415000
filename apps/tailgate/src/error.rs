use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use tail_transport::{DialError, FrameKind, ReceiveError, SendError};
use thiserror::Error;

/// The collector answered the session id with something other than a byte offset.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("remote offset arrived as a {0} frame, expected text")]
    NotText(FrameKind),
    #[error("remote offset {payload:?} is not a non-negative integer: {source}")]
    InvalidOffset {
        payload: String,
        #[source]
        source: ParseIntError,
    },
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("failed to send session id: {0}")]
    Send(#[source] SendError),
    #[error("failed to receive remote offset: {0}")]
    Receive(#[source] ReceiveError),
    #[error("handshake timed out after {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Local log file failures. A file that does not exist yet is not one of them.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to seek {path:?} to offset {offset}: {source}")]
    Seek {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {path:?} at offset {offset}: {source}")]
    Read {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },
}

/// Where in the dial → handshake → stream sequence an attempt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Dialing,
    Handshaking,
    Streaming,
}

impl AttemptPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptPhase::Dialing => "dialing",
            AttemptPhase::Handshaking => "handshaking",
            AttemptPhase::Streaming => "streaming",
        }
    }
}

/// Ends one connection attempt. Never fatal to the process.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("dial failed: {0}")]
    Dial(#[from] DialError),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    File(#[from] FileError),
    #[error("failed to send {len} bytes read at offset {offset}: {source}")]
    Send {
        offset: u64,
        len: usize,
        #[source]
        source: SendError,
    },
    #[error("collector went away while tailing at offset {offset}")]
    Disconnected { offset: u64 },
}

impl AttemptError {
    pub fn phase(&self) -> AttemptPhase {
        match self {
            AttemptError::Dial(_) => AttemptPhase::Dialing,
            AttemptError::Handshake(_) => AttemptPhase::Handshaking,
            AttemptError::File(_) | AttemptError::Send { .. } | AttemptError::Disconnected { .. } => {
                AttemptPhase::Streaming
            }
        }
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, AttemptError::Dial(err) if err.is_refused())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("`command` must name a program to run")]
    EmptyCommand,
}
