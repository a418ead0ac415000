use std::io;
use std::path::Path;
use std::process::ExitStatus;

use tail_transport::TailTransport;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::context::ClientContext;
use crate::reconnect::{LoopSummary, ReconnectLoop};

/// How the supervised command ended. Informational only.
#[derive(Debug)]
pub enum ChildExit {
    Exited(ExitStatus),
    Failed(String),
}

impl ChildExit {
    pub fn success(&self) -> bool {
        matches!(self, ChildExit::Exited(status) if status.success())
    }
}

#[derive(Debug)]
pub struct ShutdownReport {
    pub child: ChildExit,
    /// `None` when the tail loop was still running at the end of the grace period.
    pub loop_summary: Option<LoopSummary>,
}

impl ShutdownReport {
    pub fn stopped_gracefully(&self) -> bool {
        self.loop_summary.is_some()
    }
}

/// Runs the tail loop in the background for as long as the supervised command
/// runs in the foreground, then gives the loop one bounded chance to flush.
pub struct ShutdownCoordinator {
    ctx: ClientContext,
}

impl ShutdownCoordinator {
    pub fn new(ctx: ClientContext) -> Self {
        Self { ctx }
    }

    pub async fn run<T>(self, transport: T) -> ShutdownReport
    where
        T: TailTransport + 'static,
    {
        let config = self.ctx.config();
        if config.remove_logfile {
            remove_logfile(&config.logfile).await;
        }

        let tail_loop = tokio::spawn(ReconnectLoop::new(transport, self.ctx.clone()).run());

        let child = run_command(&config.command).await;

        if self.ctx.termination().request() {
            info!(
                grace_ms = config.timeout.as_millis() as u64,
                "command finished; waiting for tail loop to flush"
            );
        }
        let loop_summary = self.await_loop(tail_loop).await;

        ShutdownReport {
            child,
            loop_summary,
        }
    }

    async fn await_loop(&self, tail_loop: JoinHandle<LoopSummary>) -> Option<LoopSummary> {
        let config = self.ctx.config();
        let deadline = Instant::now() + config.timeout;
        while !tail_loop.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    grace_ms = config.timeout.as_millis() as u64,
                    "tail loop did not stop within grace period"
                );
                tail_loop.abort();
                return None;
            }
            tokio::time::sleep(config.poll_interval).await;
        }

        match tail_loop.await {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!(error = %err, "tail loop task failed");
                None
            }
        }
    }
}

/// Runs `command[0]` with the remaining arguments, inheriting stdio, and waits
/// for it. Spawn or wait failures are reported, never raised.
pub async fn run_command(command: &[String]) -> ChildExit {
    let Some((program, args)) = command.split_first() else {
        warn!("no command configured");
        return ChildExit::Failed("empty command".into());
    };

    info!(%program, ?args, "running command");
    match Command::new(program).args(args).status().await {
        Ok(status) => {
            if status.success() {
                info!(%status, "command complete: normal exit");
            } else {
                warn!(%status, "command complete: non-zero exit");
            }
            ChildExit::Exited(status)
        }
        Err(err) => {
            warn!(%program, error = %err, "command failed to run");
            ChildExit::Failed(err.to_string())
        }
    }
}

/// Deletes a stale log before the first attempt so the collector never sees
/// a previous run's content. A missing file is fine.
pub async fn remove_logfile(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "removed log file"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove log file"),
    }
}
