//! Ships the growing tail of a local log file to a remote collector while a
//! supervised command runs in the foreground.
//!
//! A run looks like this: [`shutdown::ShutdownCoordinator`] starts a
//! [`reconnect::ReconnectLoop`] in the background and runs the command. Each
//! loop attempt dials the collector, trades the [`session::SessionId`] for the
//! number of bytes the collector already holds ([`handshake`]), then streams
//! everything after that point ([`tailer`]). When the command exits the
//! coordinator raises the [`termination::TerminationSignal`] and gives the loop
//! one grace period to flush.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod handshake;
pub mod reconnect;
pub mod session;
pub mod shutdown;
pub mod tailer;
pub mod telemetry;
pub mod termination;

pub use config::ClientConfig;
pub use context::ClientContext;
pub use reconnect::{LoopSummary, ReconnectLoop};
pub use session::{SessionId, SessionIdentity};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use tailer::{ResumableTailer, TailOutcome};
pub use termination::TerminationSignal;
