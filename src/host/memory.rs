//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! In-memory connection host for testing and benchmarking.
//!
//! `MemoryHost` stands in for the TCP host without any network I/O. Each
//! successful [`connect`](crate::ConnectionHost::connect) yields a
//! [`MemoryPeer`] through [`MemoryHost::accept`], which the test drives as
//! the remote side: reading what the client sent, injecting response
//! bytes, failing sends, or dropping the connection.

use crate::host::{Connection, ConnectionEvents, ConnectionHost, TransportError};
use crate::protocol::Message;
use crate::request::Request;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// In-process implementation of [`ConnectionHost`].
///
/// # Examples
///
/// ```rust
/// use plexrpc::{ConnectionHost, MemoryHost};
/// # use plexrpc::{Connection, ConnectionEvents, Message, Request, SequenceId, TransportError};
/// # use std::sync::Arc;
/// # #[derive(Debug)]
/// # struct Reply(SequenceId);
/// # impl Message for Reply {
/// #     fn sequence_id(&self) -> SequenceId { self.0 }
/// # }
/// # struct Quiet;
/// # impl ConnectionEvents<Reply> for Quiet {
/// #     fn on_connected(&self, _conn: &Arc<Connection<Reply>>) {}
/// #     fn on_start_sending(&self, _c: &Arc<Connection<Reply>>, _r: &Arc<Request<Reply>>) {}
/// #     fn on_send_complete(&self, _c: &Arc<Connection<Reply>>, _r: &Arc<Request<Reply>>, _ok: bool) {}
/// #     fn on_message_received(&self, _c: &Arc<Connection<Reply>>, buffer: &[u8]) -> usize { buffer.len() }
/// #     fn on_disconnected(&self, _c: &Arc<Connection<Reply>>, _e: Option<TransportError>) {}
/// # }
///
/// # async fn example() {
/// let host = MemoryHost::<Reply>::new();
/// let conn = host.connect("node-a", Arc::new(Quiet)).await.unwrap();
/// let peer = host.accept().await.unwrap();
/// assert_eq!(peer.connection().id(), conn.id());
/// # }
/// ```
pub struct MemoryHost<M: Message> {
    offline: AtomicBool,
    accept_tx: mpsc::UnboundedSender<Arc<MemoryPeer<M>>>,
    accept_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<MemoryPeer<M>>>>,
}

impl<M: Message> MemoryHost<M> {
    /// Creates a new in-memory host.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            offline: AtomicBool::new(false),
            accept_tx,
            accept_rx: tokio::sync::Mutex::new(accept_rx),
        })
    }

    /// Makes subsequent connection attempts fail (or succeed again).
    ///
    /// While offline, [`connect`](crate::ConnectionHost::connect) returns
    /// [`TransportError::ConnectFailed`]; established connections are not
    /// affected.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Waits for the next established connection and returns its remote
    /// side.
    ///
    /// Returns `None` only if the host itself has been dropped mid-await,
    /// which cannot happen while the caller holds it.
    pub async fn accept(&self) -> Option<Arc<MemoryPeer<M>>> {
        self.accept_rx.lock().await.recv().await
    }
}

#[async_trait]
impl<M: Message> ConnectionHost<M> for MemoryHost<M> {
    async fn connect(
        &self,
        address: &str,
        events: Arc<dyn ConnectionEvents<M>>,
    ) -> Result<Arc<Connection<M>>, TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed {
                address: address.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "memory host offline"),
            });
        }

        let (conn, outbound_rx) = Connection::new(address);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicUsize::new(0));

        tokio::spawn(write_loop(
            conn.clone(),
            events.clone(),
            outbound_rx,
            sent_tx,
            fail_sends.clone(),
        ));
        tokio::spawn(read_loop(conn.clone(), events.clone(), inbound_rx));

        let peer = Arc::new(MemoryPeer {
            conn: conn.clone(),
            address: address.to_string(),
            sent_rx: tokio::sync::Mutex::new(sent_rx),
            inbound_tx: Mutex::new(Some(inbound_tx)),
            fail_sends,
        });
        let _ = self.accept_tx.send(peer);

        events.on_connected(&conn);
        Ok(conn)
    }
}

/// Remote side of one in-memory connection.
///
/// Owned by the test; every interaction with the client flows through this
/// handle.
pub struct MemoryPeer<M: Message> {
    conn: Arc<Connection<M>>,
    address: String,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    fail_sends: Arc<AtomicUsize>,
}

impl<M: Message> MemoryPeer<M> {
    /// Returns the client-side connection handle.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection<M>> {
        &self.conn
    }

    /// Returns the address the client dialed.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Waits for the next payload the client transmitted.
    ///
    /// Returns `None` once the connection's writer task has exited.
    pub async fn sent(&self) -> Option<Vec<u8>> {
        self.sent_rx.lock().await.recv().await
    }

    /// Delivers bytes to the client's receive path.
    ///
    /// Bytes injected before the client arms its receive loop are buffered
    /// and delivered once reads start. Injection after
    /// [`disconnect`](Self::disconnect) is silently dropped.
    pub fn inject(&self, bytes: Vec<u8>) {
        if let Some(tx) = self.inbound_tx.lock().as_ref() {
            let _ = tx.send(bytes);
        }
    }

    /// Makes the next `count` transmit attempts report failure.
    pub fn fail_next_sends(&self, count: usize) {
        self.fail_sends.fetch_add(count, Ordering::SeqCst);
    }

    /// Drops the connection from the remote side.
    ///
    /// The client observes end-of-stream on its receive path, exactly as
    /// with a peer-closed socket.
    pub fn disconnect(&self) {
        self.inbound_tx.lock().take();
    }
}

async fn write_loop<M: Message>(
    conn: Arc<Connection<M>>,
    events: Arc<dyn ConnectionEvents<M>>,
    mut outbound_rx: mpsc::UnboundedReceiver<Arc<Request<M>>>,
    sent_tx: mpsc::UnboundedSender<Vec<u8>>,
    fail_sends: Arc<AtomicUsize>,
) {
    let mut closed = conn.closed_signal();
    // The latch may have been set before this task first polled it; the
    // watch only reports changes after subscription.
    if !conn.is_disconnected() {
        loop {
            tokio::select! {
                _ = closed.changed() => break,
                request = outbound_rx.recv() => {
                    let Some(request) = request else { break };
                    events.on_start_sending(&conn, &request);
                    let forced_failure = fail_sends
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_ok();
                    let ok = !forced_failure && sent_tx.send(request.payload().to_vec()).is_ok();
                    events.on_send_complete(&conn, &request, ok);
                }
            }
        }
    }

    outbound_rx.close();
    while let Ok(request) = outbound_rx.try_recv() {
        events.on_start_sending(&conn, &request);
        events.on_send_complete(&conn, &request, false);
    }

    conn.finish(&events, None);
}

async fn read_loop<M: Message>(
    conn: Arc<Connection<M>>,
    events: Arc<dyn ConnectionEvents<M>>,
    mut inbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let mut closed = conn.closed_signal();
    if conn.is_disconnected() {
        conn.finish(&events, None);
        return;
    }

    tokio::select! {
        _ = closed.changed() => {
            conn.finish(&events, None);
            return;
        }
        () = conn.receive_requested() => {}
    }

    let mut pending = Vec::new();
    loop {
        tokio::select! {
            _ = closed.changed() => break,
            bytes = inbound_rx.recv() => {
                let Some(bytes) = bytes else { break };
                pending.extend_from_slice(&bytes);
                while !pending.is_empty() {
                    let consumed = events.on_message_received(&conn, &pending);
                    if consumed == 0 {
                        break;
                    }
                    pending.drain(..consumed.min(pending.len()));
                }
            }
        }
    }

    conn.finish(&events, None);
}


// Made with Bob
