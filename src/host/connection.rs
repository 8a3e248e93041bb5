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

//! Connection handles.
//!
//! A [`Connection`] is the host-agnostic handle to one established
//! transport: an outbound request queue drained by the host's writer task,
//! a receive gate armed by [`Connection::begin_receive`], and a one-shot
//! disconnect latch. The handle never performs I/O itself; the owning
//! host's tasks do.

use crate::host::{ConnectionEvents, TransportError};
use crate::protocol::Message;
use crate::request::Request;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::{Notify, mpsc, watch};

/// Global counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicI64 = AtomicI64::new(1);

/// A unique identifier for a connection.
///
/// Connection IDs are process-wide monotonic and never reused, which lets
/// pools and the endpoint manager key maps by id without worrying about a
/// recycled handle aliasing a dead one.
///
/// # Examples
///
/// ```rust
/// use plexrpc::ConnectionId;
///
/// let id = ConnectionId::from_i64(42);
/// assert_eq!(id.as_i64(), 42);
/// assert_eq!(format!("{}", id), "Conn(42)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(i64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the id as an `i64`.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Creates an id from a raw value.
    ///
    /// Useful for tests and for keying external maps; ids created this way
    /// are not sequenced against host-allocated ids.
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Conn({})", self.0)
    }
}

struct ConnectionState {
    receive_armed: AtomicBool,
    receive_gate: Notify,
    closed: watch::Sender<bool>,
    fired: AtomicBool,
    fault: Mutex<Option<TransportError>>,
}

/// Handle to one established transport connection.
///
/// Handles are shared via `Arc` between the pool, the endpoint manager,
/// the requests in flight on them, and the host's I/O tasks. A connection
/// disconnects exactly once and is never reused afterwards:
/// [`begin_send`](Self::begin_send) fails once the disconnect latch is set.
pub struct Connection<M: Message> {
    id: ConnectionId,
    peer: String,
    outbound: mpsc::UnboundedSender<Arc<Request<M>>>,
    state: ConnectionState,
}

impl<M: Message> Connection<M> {
    /// Creates a handle plus the outbound queue its writer task drains.
    pub(crate) fn new(
        peer: impl Into<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<Request<M>>>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let conn = Arc::new(Self {
            id: ConnectionId::next(),
            peer: peer.into(),
            outbound,
            state: ConnectionState {
                receive_armed: AtomicBool::new(false),
                receive_gate: Notify::new(),
                closed,
                fired: AtomicBool::new(false),
                fault: Mutex::new(None),
            },
        });
        (conn, outbound_rx)
    }

    /// Returns the unique id of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the address of the remote peer.
    #[must_use]
    pub fn peer_addr(&self) -> &str {
        &self.peer
    }

    /// Returns `true` once the connection has started disconnecting.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        *self.state.closed.borrow()
    }

    /// Queues a request for transmission.
    ///
    /// Returns `false` if the connection is disconnecting or its writer
    /// task is gone; the request was not accepted and no host events will
    /// fire for it.
    pub fn begin_send(&self, request: Arc<Request<M>>) -> bool {
        if self.is_disconnected() {
            return false;
        }
        self.outbound.send(request).is_ok()
    }

    /// Arms the receive loop.
    ///
    /// The reader task does not consume bytes until this is called; calling
    /// it more than once has no further effect.
    pub fn begin_receive(&self) {
        if !self.state.receive_armed.swap(true, Ordering::AcqRel) {
            self.state.receive_gate.notify_one();
        }
    }

    /// Starts disconnecting the connection.
    ///
    /// Idempotent; only the first recorded `error` is kept and reported
    /// with the single disconnect notification. The actual teardown runs
    /// on the host's I/O tasks.
    pub fn begin_disconnect(&self, error: Option<TransportError>) {
        if let Some(error) = error {
            self.state.fault.lock().get_or_insert(error);
        }
        self.state.closed.send_replace(true);
    }

    /// Returns a watch on the disconnect latch for the host's I/O tasks.
    pub(crate) fn closed_signal(&self) -> watch::Receiver<bool> {
        self.state.closed.subscribe()
    }

    /// Waits until [`begin_receive`](Self::begin_receive) has armed reads.
    pub(crate) async fn receive_requested(&self) {
        if self.state.receive_armed.load(Ordering::Acquire) {
            return;
        }
        self.state.receive_gate.notified().await;
    }

    /// Completes teardown from an I/O task.
    ///
    /// Sets the disconnect latch and fires `on_disconnected` exactly once
    /// across both tasks and any concurrent `begin_disconnect` callers.
    pub(crate) fn finish(
        self: &Arc<Self>,
        events: &Arc<dyn ConnectionEvents<M>>,
        fault: Option<TransportError>,
    ) {
        if let Some(fault) = fault {
            self.state.fault.lock().get_or_insert(fault);
        }
        self.state.closed.send_replace(true);
        if !self.state.fired.swap(true, Ordering::AcqRel) {
            let error = self.state.fault.lock().take();
            events.on_disconnected(self, error);
        }
    }
}

impl<M: Message> std::fmt::Debug for Connection<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::SequenceId;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug)]
    struct TestMessage(SequenceId);

    impl Message for TestMessage {
        fn sequence_id(&self) -> SequenceId {
            self.0
        }
    }

    struct CountingEvents {
        disconnects: AtomicUsize,
    }

    impl ConnectionEvents<TestMessage> for CountingEvents {
        fn on_connected(&self, _conn: &Arc<Connection<TestMessage>>) {}
        fn on_start_sending(
            &self,
            _conn: &Arc<Connection<TestMessage>>,
            _request: &Arc<Request<TestMessage>>,
        ) {
        }
        fn on_send_complete(
            &self,
            _conn: &Arc<Connection<TestMessage>>,
            _request: &Arc<Request<TestMessage>>,
            _ok: bool,
        ) {
        }
        fn on_message_received(
            &self,
            _conn: &Arc<Connection<TestMessage>>,
            buffer: &[u8],
        ) -> usize {
            buffer.len()
        }
        fn on_disconnected(
            &self,
            _conn: &Arc<Connection<TestMessage>>,
            _error: Option<TransportError>,
        ) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_connection_ids_unique() {
        let (a, _rx_a) = Connection::<TestMessage>::new("peer-a");
        let (b, _rx_b) = Connection::<TestMessage>::new("peer-b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.peer_addr(), "peer-a");
    }

    #[tokio::test]
    async fn test_begin_send_rejected_after_disconnect() {
        let (conn, _rx) = Connection::<TestMessage>::new("peer");
        let request = Request::new(
            SequenceId::new(1).unwrap(),
            "test",
            vec![],
            Duration::from_millis(100),
            true,
            Box::new(|_| {}),
            Box::new(|_| {}),
        );

        assert!(conn.begin_send(request.clone()));
        conn.begin_disconnect(None);
        assert!(conn.is_disconnected());
        assert!(!conn.begin_send(request));
    }

    #[tokio::test]
    async fn test_begin_send_rejected_without_writer() {
        let (conn, rx) = Connection::<TestMessage>::new("peer");
        drop(rx);
        let request = Request::new(
            SequenceId::new(1).unwrap(),
            "test",
            vec![],
            Duration::from_millis(100),
            true,
            Box::new(|_| {}),
            Box::new(|_| {}),
        );
        assert!(!conn.begin_send(request));
    }

    #[tokio::test]
    async fn test_finish_fires_disconnect_once() {
        let (conn, _rx) = Connection::<TestMessage>::new("peer");
        let counting = Arc::new(CountingEvents {
            disconnects: AtomicUsize::new(0),
        });
        let events: Arc<dyn ConnectionEvents<TestMessage>> = counting.clone();

        conn.finish(&events, None);
        conn.finish(
            &events,
            Some(TransportError::ConnectionLost {
                reason: "late".to_string(),
                source: None,
            }),
        );

        assert!(conn.is_disconnected());
        assert_eq!(counting.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_receive_gate_permits_early_arm() {
        let (conn, _rx) = Connection::<TestMessage>::new("peer");
        // Arm before anyone waits; the permit must be stored.
        conn.begin_receive();
        tokio::time::timeout(Duration::from_millis(100), conn.receive_requested())
            .await
            .expect("gate should already be open");
    }
}
