use std::time::Duration;

use tail_transport::{CloseReason, TailConnection, TailTransport};
use tracing::{debug, info, warn};

use crate::context::ClientContext;
use crate::error::AttemptError;
use crate::handshake::handshake;
use crate::tailer::{ResumableTailer, TailOutcome};

/// Totals across every attempt of one loop run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub attempts: u64,
    pub handshakes: u64,
    pub bytes_sent: u64,
}

/// Dial → handshake → stream, over and over, until termination is requested.
///
/// Attempts are strictly sequential. Every failure ends only the current
/// attempt; the delay before the next one is the configured timeout, or
/// [`refused_backoff`](crate::config::ClientConfig::refused_backoff) when the
/// collector refused the dial.
///
/// Termination is checked only once an attempt returns. An attempt that
/// reached the end of the log after termination ends the loop. One that failed
/// instead is followed by a single final pass, dialed without waiting out the
/// rest of the delay, so bytes written just before the command exited still
/// reach the collector.
pub struct ReconnectLoop<T> {
    transport: T,
    ctx: ClientContext,
}

impl<T: TailTransport> ReconnectLoop<T> {
    pub fn new(transport: T, ctx: ClientContext) -> Self {
        Self { transport, ctx }
    }

    pub async fn run(self) -> LoopSummary {
        let mut summary = LoopSummary::default();
        let termination = self.ctx.termination();

        loop {
            summary.attempts += 1;
            let attempt = summary.attempts;
            let final_pass = termination.is_requested();
            let result = self.attempt(&mut summary).await;
            match &result {
                Ok(outcome) => info!(attempt, ?outcome, "tail attempt finished"),
                Err(err) => warn!(
                    attempt,
                    phase = err.phase().as_str(),
                    server = %self.ctx.config().server,
                    path = %self.ctx.config().logfile.display(),
                    error = %err,
                    "tail attempt failed"
                ),
            }

            if termination.is_requested() {
                if final_pass || result.is_ok() {
                    break;
                }
                info!(attempt, "termination requested; making a final flush pass");
                continue;
            }
            let delay = self.delay_after(&result);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting before redial");
            if termination.sleep(delay).await {
                info!(attempt, "termination requested; making a final flush pass");
            }
        }

        info!(
            attempts = summary.attempts,
            handshakes = summary.handshakes,
            bytes_sent = summary.bytes_sent,
            "reconnect loop stopped"
        );
        summary
    }

    /// Pause before the next dial.
    pub fn delay_after(&self, result: &Result<TailOutcome, AttemptError>) -> Duration {
        match result {
            Err(err) if err.is_refused() => self.ctx.config().refused_backoff(),
            _ => self.ctx.config().timeout,
        }
    }

    async fn attempt(&self, summary: &mut LoopSummary) -> Result<TailOutcome, AttemptError> {
        let config = self.ctx.config();
        debug!(server = %config.server, "dialing collector");
        let mut conn = self.transport.connect(&config.server, config.timeout).await?;

        let result = self.drive(&mut conn, summary).await;
        let reason = if result.is_ok() {
            CloseReason::Normal
        } else {
            CloseReason::Error
        };
        conn.close(reason).await;
        result
    }

    async fn drive(
        &self,
        conn: &mut T::Connection,
        summary: &mut LoopSummary,
    ) -> Result<TailOutcome, AttemptError> {
        let session_id = self.ctx.session_id();
        let remote_offset = handshake(conn, session_id, self.ctx.config().timeout).await?;
        summary.handshakes += 1;
        info!(%session_id, remote_offset, "handshake complete");

        let mut tailer = ResumableTailer::new(&self.ctx);
        let result = tailer.tail(conn, remote_offset).await;
        summary.bytes_sent += tailer.bytes_sent();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::HandshakeError;
    use tail_transport::{DialError, MemoryTransport};

    fn looped(timeout_ms: u64) -> ReconnectLoop<MemoryTransport> {
        let (transport, _listener) = MemoryTransport::new();
        let config = ClientConfig::new("unused.log", "memory://collector", vec!["true".into()])
            .with_timeout(Duration::from_millis(timeout_ms));
        ReconnectLoop::new(transport, ClientContext::new(config))
    }

    #[test]
    fn refused_dial_backs_off_five_timeouts() {
        let lp = looped(200);
        let refused = Err(AttemptError::Dial(DialError::Refused {
            address: "memory://collector".into(),
        }));
        assert_eq!(lp.delay_after(&refused), Duration::from_millis(1000));
    }

    #[test]
    fn other_outcomes_wait_one_timeout() {
        let lp = looped(200);
        let timed_out = Err(AttemptError::Dial(DialError::TimedOut {
            address: "memory://collector".into(),
            timeout: Duration::from_millis(200),
        }));
        let handshake = Err(AttemptError::Handshake(HandshakeError::TimedOut(
            Duration::from_millis(200),
        )));
        let finished = Ok(TailOutcome::Terminated { offset: 0 });

        for result in [timed_out, handshake, finished] {
            assert_eq!(lp.delay_after(&result), Duration::from_millis(200));
        }
    }
}
