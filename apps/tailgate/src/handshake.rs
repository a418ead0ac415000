use std::time::Duration;

use tail_transport::{Frame, TailConnection};
use tracing::debug;

use crate::error::{HandshakeError, ProtocolError};
use crate::session::SessionId;

/// Sends the session id and returns how many bytes of the log the collector
/// already holds for it.
///
/// The whole exchange is bounded by `timeout`. The caller owns the connection
/// and closes it on failure.
pub async fn handshake<C>(
    conn: &mut C,
    session_id: &SessionId,
    timeout: Duration,
) -> Result<u64, HandshakeError>
where
    C: TailConnection + ?Sized,
{
    match tokio::time::timeout(timeout, exchange(conn, session_id)).await {
        Ok(result) => result,
        Err(_) => Err(HandshakeError::TimedOut(timeout)),
    }
}

async fn exchange<C>(conn: &mut C, session_id: &SessionId) -> Result<u64, HandshakeError>
where
    C: TailConnection + ?Sized,
{
    debug!(%session_id, "sending session id");
    conn.send(Frame::Text(session_id.to_string()))
        .await
        .map_err(HandshakeError::Send)?;
    let reply = conn.receive().await.map_err(HandshakeError::Receive)?;
    Ok(parse_remote_offset(reply)?)
}

/// A decimal, non-negative byte count in a text frame. `0` means the collector
/// has nothing for this session yet.
pub fn parse_remote_offset(frame: Frame) -> Result<u64, ProtocolError> {
    match frame {
        Frame::Text(payload) => payload
            .trim()
            .parse::<u64>()
            .map_err(|source| ProtocolError::InvalidOffset { payload, source }),
        other => Err(ProtocolError::NotText(other.kind())),
    }
}
