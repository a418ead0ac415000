use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::{
    CloseReason, DialError, Frame, ReceiveError, SendError, TailConnection, TailTransport,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frames the reader task buffers for [`TailConnection::receive`]. Frames
/// arriving while the backlog is full are dropped; the socket keeps being
/// drained so liveness is still tracked.
pub const INCOMING_BACKLOG: usize = 32;

/// Dials `ws://` collectors with tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TailTransport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn connect(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<WebSocketConnection, DialError> {
        let (stream, _response) = match tokio::time::timeout(timeout, connect_async(address)).await
        {
            Ok(Ok(established)) => established,
            Ok(Err(err)) => return Err(classify_dial_error(address, err)),
            Err(_) => {
                return Err(DialError::TimedOut {
                    address: address.to_string(),
                    timeout,
                })
            }
        };
        debug!(%address, "websocket connected");
        Ok(WebSocketConnection::new(stream))
    }
}

fn classify_dial_error(address: &str, err: tungstenite::Error) -> DialError {
    match err {
        tungstenite::Error::Io(io_err) if io_err.kind() == io::ErrorKind::ConnectionRefused => {
            DialError::Refused {
                address: address.to_string(),
            }
        }
        other => DialError::Failed {
            address: address.to_string(),
            reason: other.to_string(),
        },
    }
}

/// A client websocket split into an owned sink and a reader task.
///
/// The reader task keeps draining the socket so control frames are answered
/// and a peer close is noticed even while the shipper is only sending.
pub struct WebSocketConnection {
    sink: SplitSink<WsStream, Message>,
    incoming: mpsc::Receiver<Result<Frame, ReceiveError>>,
    connected: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl WebSocketConnection {
    fn new(stream: WsStream) -> Self {
        let (sink, source) = stream.split();
        let (tx, incoming) = mpsc::channel(INCOMING_BACKLOG);
        let connected = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_frames(source, tx, connected.clone()));
        Self {
            sink,
            incoming,
            connected,
            reader: Some(reader),
            closed: false,
        }
    }
}

async fn read_frames(
    mut source: SplitStream<WsStream>,
    tx: mpsc::Sender<Result<Frame, ReceiveError>>,
    connected: Arc<AtomicBool>,
) {
    while let Some(message) = source.next().await {
        let frame = match message {
            Ok(Message::Text(text)) => Frame::Text(text),
            Ok(Message::Binary(data)) => Frame::Binary(Bytes::from(data)),
            Ok(Message::Close(frame)) => {
                trace!(
                    reason = ?frame.map(|f| f.reason.to_string()),
                    "peer closed websocket"
                );
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                let _ = tx.try_send(Err(ReceiveError::Transport(err.to_string())));
                break;
            }
        };
        match tx.try_send(Ok(frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("receive backlog full; dropping frame"),
            Err(TrySendError::Closed(_)) => break,
        }
    }
    connected.store(false, Ordering::Release);
}

#[async_trait]
impl TailConnection for WebSocketConnection {
    async fn send(&mut self, frame: Frame) -> Result<(), SendError> {
        if self.closed {
            return Err(SendError::Closed);
        }
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes.to_vec()),
        };
        self.sink.send(message).await.map_err(|err| match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                SendError::Closed
            }
            other => SendError::Transport(other.to_string()),
        })
    }

    async fn receive(&mut self) -> Result<Frame, ReceiveError> {
        match self.incoming.recv().await {
            Some(result) => result,
            None => Err(ReceiveError::Closed),
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed && self.connected.load(Ordering::Acquire)
    }

    async fn close(&mut self, reason: CloseReason) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.connected.store(false, Ordering::Release);

        let (code, text) = match reason {
            CloseReason::Normal => (CloseCode::Normal, "closing connection"),
            CloseReason::Error => (CloseCode::Error, "tail attempt failed"),
        };
        let frame = CloseFrame {
            code,
            reason: text.into(),
        };
        if let Err(err) = self.sink.send(Message::Close(Some(frame))).await {
            trace!(error = %err, "close frame not delivered");
        }
        let _ = self.sink.close().await;

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
