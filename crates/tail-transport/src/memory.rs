//! In-process transport for tests and local wiring.
//!
//! Each successful dial hands a [`MemoryPeer`] to the [`MemoryListener`], which
//! plays the collector side. Dial failures can be scripted ahead of time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::{
    CloseReason, DialError, Frame, ReceiveError, SendError, TailConnection, TailTransport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptedDial {
    Refuse,
    TimeOut,
    Fail,
}

#[derive(Debug, Default)]
struct Shared {
    script: Mutex<VecDeque<ScriptedDial>>,
    refuse_all: Mutex<bool>,
    dials: Mutex<Vec<Instant>>,
    closes: Mutex<Vec<CloseReason>>,
}

/// Cloneable dialer; all clones share the same script and listener.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    accepted: mpsc::UnboundedSender<MemoryPeer>,
}

/// Collector side of a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryListener {
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryListener) {
        let (accepted, rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::new(Shared::default()),
                accepted,
            },
            MemoryListener { accepted: rx },
        )
    }

    /// The next dial fails as if the collector were down.
    pub fn refuse_next(&self) -> &Self {
        self.shared.script.lock().push_back(ScriptedDial::Refuse);
        self
    }

    /// The next dial fails by exceeding its deadline.
    pub fn time_out_next(&self) -> &Self {
        self.shared.script.lock().push_back(ScriptedDial::TimeOut);
        self
    }

    /// The next dial fails for a reason other than refusal or timeout.
    pub fn fail_next(&self) -> &Self {
        self.shared.script.lock().push_back(ScriptedDial::Fail);
        self
    }

    /// Refuse every dial until cleared.
    pub fn set_refuse_all(&self, refuse: bool) {
        *self.shared.refuse_all.lock() = refuse;
    }

    /// Instants at which `connect` was called, successful or not.
    pub fn dial_instants(&self) -> Vec<Instant> {
        self.shared.dials.lock().clone()
    }

    pub fn dial_count(&self) -> usize {
        self.shared.dials.lock().len()
    }

    /// Close reasons of every connection closed so far, in order.
    pub fn closes(&self) -> Vec<CloseReason> {
        self.shared.closes.lock().clone()
    }
}

#[async_trait]
impl TailTransport for MemoryTransport {
    type Connection = MemoryConnection;

    async fn connect(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<MemoryConnection, DialError> {
        self.shared.dials.lock().push(Instant::now());

        let scripted = self.shared.script.lock().pop_front();
        let scripted = scripted.or_else(|| {
            if *self.shared.refuse_all.lock() {
                Some(ScriptedDial::Refuse)
            } else {
                None
            }
        });
        match scripted {
            Some(ScriptedDial::Refuse) => {
                return Err(DialError::Refused {
                    address: address.to_string(),
                })
            }
            Some(ScriptedDial::TimeOut) => {
                return Err(DialError::TimedOut {
                    address: address.to_string(),
                    timeout,
                })
            }
            Some(ScriptedDial::Fail) => {
                return Err(DialError::Failed {
                    address: address.to_string(),
                    reason: "scripted failure".into(),
                })
            }
            None => {}
        }

        let (mut connection, peer) = pair();
        connection.shared = Some(self.shared.clone());
        self.accepted
            .send(peer)
            .map_err(|_| DialError::Refused {
                address: address.to_string(),
            })?;
        Ok(connection)
    }
}

impl MemoryListener {
    /// Waits for the next successful dial. `None` once every transport clone is gone.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }
}

/// Creates a connected client/collector pair outside of any transport.
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (to_peer, from_client) = mpsc::unbounded_channel();
    let (to_client, from_peer) = mpsc::unbounded_channel();
    (
        MemoryConnection {
            to_peer: Some(to_peer),
            from_peer,
            shared: None,
        },
        MemoryPeer {
            incoming: from_client,
            outgoing: to_client,
        },
    )
}

/// Client end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    to_peer: Option<mpsc::UnboundedSender<Frame>>,
    from_peer: mpsc::UnboundedReceiver<Frame>,
    shared: Option<Arc<Shared>>,
}

#[async_trait]
impl TailConnection for MemoryConnection {
    async fn send(&mut self, frame: Frame) -> Result<(), SendError> {
        let Some(to_peer) = self.to_peer.as_ref() else {
            return Err(SendError::Closed);
        };
        to_peer.send(frame).map_err(|_| SendError::Closed)
    }

    async fn receive(&mut self) -> Result<Frame, ReceiveError> {
        self.from_peer.recv().await.ok_or(ReceiveError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.to_peer
            .as_ref()
            .map(|to_peer| !to_peer.is_closed())
            .unwrap_or(false)
    }

    async fn close(&mut self, reason: CloseReason) {
        if self.to_peer.take().is_none() {
            return;
        }
        self.from_peer.close();
        if let Some(shared) = &self.shared {
            shared.closes.lock().push(reason);
        }
    }
}

/// Collector end of an in-memory connection. Dropping it disconnects the client.
#[derive(Debug)]
pub struct MemoryPeer {
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::UnboundedSender<Frame>,
}

impl MemoryPeer {
    /// Next frame from the client; `None` once the client closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.incoming.recv().await
    }

    /// Like [`recv`](Self::recv) but gives up after `wait`.
    pub async fn recv_timeout(&mut self, wait: Duration) -> Option<Frame> {
        tokio::time::timeout(wait, self.incoming.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn send(&self, frame: Frame) -> bool {
        self.outgoing.send(frame).is_ok()
    }

    /// Answers a handshake with the number of bytes already held.
    pub fn send_offset(&self, offset: u64) -> bool {
        self.send(Frame::Text(offset.to_string()))
    }

    /// Receives the client's session id text frame.
    pub async fn recv_session_id(&mut self) -> Option<String> {
        match self.recv().await? {
            Frame::Text(session_id) => Some(session_id),
            Frame::Binary(_) => None,
        }
    }
}
