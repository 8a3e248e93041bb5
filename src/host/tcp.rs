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

//! TCP connection host.
//!
//! Dials endpoints over TCP, configures each socket for request/response
//! traffic (Nagle off, linger off, kernel buffers sized from the client
//! configuration), and runs one writer and one reader task per connection.

use crate::config::ClientConfig;
use crate::host::{Connection, ConnectionEvents, ConnectionHost, TransportError};
use crate::protocol::Message;
use crate::request::Request;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, lookup_host};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// TCP implementation of [`ConnectionHost`].
///
/// One host instance serves every endpoint of a client; per-connection
/// state lives in the spawned I/O tasks.
///
/// # Examples
///
/// ```rust
/// use plexrpc::{ClientConfig, TcpHost};
///
/// let host = TcpHost::new(&ClientConfig::default());
/// ```
#[derive(Debug)]
pub struct TcpHost {
    socket_buffer_size: usize,
    message_buffer_size: usize,
}

impl TcpHost {
    /// Creates a TCP host using the buffer sizes from `config`.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            socket_buffer_size: config.socket_buffer_size(),
            message_buffer_size: config.message_buffer_size(),
        }
    }
}

#[async_trait]
impl<M: Message> ConnectionHost<M> for TcpHost {
    async fn connect(
        &self,
        address: &str,
        events: Arc<dyn ConnectionEvents<M>>,
    ) -> Result<Arc<Connection<M>>, TransportError> {
        let connect_failed = |source: io::Error| TransportError::ConnectFailed {
            address: address.to_string(),
            source,
        };

        let target = lookup_host(address)
            .await
            .map_err(connect_failed)?
            .next()
            .ok_or_else(|| {
                connect_failed(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "address resolved to nothing",
                ))
            })?;

        let socket = if target.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(connect_failed)?;
        socket
            .set_send_buffer_size(self.socket_buffer_size as u32)
            .map_err(connect_failed)?;
        socket
            .set_recv_buffer_size(self.socket_buffer_size as u32)
            .map_err(connect_failed)?;

        let stream = socket.connect(target).await.map_err(connect_failed)?;
        stream.set_nodelay(true).map_err(connect_failed)?;
        stream.set_linger(None).map_err(connect_failed)?;

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| address.to_string());
        let (read_half, write_half) = stream.into_split();
        let (conn, outbound_rx) = Connection::new(peer);

        info!(conn = %conn.id(), address, "tcp connection established");

        tokio::spawn(write_loop(conn.clone(), events.clone(), outbound_rx, write_half));
        tokio::spawn(read_loop(
            conn.clone(),
            events.clone(),
            read_half,
            self.message_buffer_size,
        ));

        events.on_connected(&conn);
        Ok(conn)
    }
}

/// Drains the outbound queue onto the socket.
///
/// Fires `on_start_sending` immediately before each write and
/// `on_send_complete` immediately after, preserving per-request ordering.
/// Requests still queued when the connection dies are reported as failed
/// sends so their retry machinery runs.
async fn write_loop<M: Message>(
    conn: Arc<Connection<M>>,
    events: Arc<dyn ConnectionEvents<M>>,
    mut outbound_rx: mpsc::UnboundedReceiver<Arc<Request<M>>>,
    mut write_half: OwnedWriteHalf,
) {
    let mut closed = conn.closed_signal();
    // The latch may have been set before this task first polled it; the
    // watch only reports changes after subscription.
    let fault = if conn.is_disconnected() {
        None
    } else {
        loop {
            tokio::select! {
                _ = closed.changed() => break None,
                request = outbound_rx.recv() => {
                    let Some(request) = request else { break None };
                    events.on_start_sending(&conn, &request);
                    match write_half.write_all(request.payload()).await {
                        Ok(()) => events.on_send_complete(&conn, &request, true),
                        Err(error) => {
                            warn!(conn = %conn.id(), %error, "tcp write failed");
                            events.on_send_complete(&conn, &request, false);
                            break Some(TransportError::SendFailed { source: error });
                        }
                    }
                }
            }
        }
    };

    outbound_rx.close();
    while let Ok(request) = outbound_rx.try_recv() {
        events.on_start_sending(&conn, &request);
        events.on_send_complete(&conn, &request, false);
    }

    let _ = write_half.shutdown().await;
    conn.finish(&events, fault);
}

/// Feeds received bytes through the client's parse path.
///
/// Reads are gated on [`Connection::begin_receive`]; once armed, the loop
/// appends each chunk to the connection's receive buffer and lets the
/// client consume complete frames from the front.
async fn read_loop<M: Message>(
    conn: Arc<Connection<M>>,
    events: Arc<dyn ConnectionEvents<M>>,
    mut read_half: OwnedReadHalf,
    buffer_size: usize,
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

    let mut pending = Vec::with_capacity(buffer_size);
    let mut chunk = vec![0u8; buffer_size.max(1)];
    let fault = loop {
        tokio::select! {
            _ = closed.changed() => break None,
            read = read_half.read(&mut chunk) => match read {
                Ok(0) => {
                    debug!(conn = %conn.id(), "peer closed tcp connection");
                    break None;
                }
                Ok(n) => {
                    pending.extend_from_slice(&chunk[..n]);
                    while !pending.is_empty() {
                        let consumed = events.on_message_received(&conn, &pending);
                        if consumed == 0 {
                            break;
                        }
                        pending.drain(..consumed.min(pending.len()));
                    }
                }
                Err(error) => {
                    break Some(TransportError::ConnectionLost {
                        reason: "read failed".to_string(),
                        source: Some(error),
                    });
                }
            }
        }
    };

    conn.finish(&events, fault);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::SequenceId;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[derive(Debug)]
    struct RawMessage {
        seq: SequenceId,
        body: Vec<u8>,
    }

    impl Message for RawMessage {
        fn sequence_id(&self) -> SequenceId {
            self.seq
        }
    }

    struct RecordingEvents {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
        received: Mutex<Vec<u8>>,
        notify: tokio::sync::Notify,
    }

    impl RecordingEvents {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicUsize::new(0),
                disconnected: AtomicUsize::new(0),
                received: Mutex::new(Vec::new()),
                notify: tokio::sync::Notify::new(),
            })
        }
    }

    impl ConnectionEvents<RawMessage> for RecordingEvents {
        fn on_connected(&self, _conn: &Arc<Connection<RawMessage>>) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        fn on_start_sending(
            &self,
            _conn: &Arc<Connection<RawMessage>>,
            _request: &Arc<Request<RawMessage>>,
        ) {
        }
        fn on_send_complete(
            &self,
            _conn: &Arc<Connection<RawMessage>>,
            _request: &Arc<Request<RawMessage>>,
            _ok: bool,
        ) {
        }
        fn on_message_received(
            &self,
            _conn: &Arc<Connection<RawMessage>>,
            buffer: &[u8],
        ) -> usize {
            self.received.lock().extend_from_slice(buffer);
            self.notify.notify_one();
            buffer.len()
        }
        fn on_disconnected(
            &self,
            _conn: &Arc<Connection<RawMessage>>,
            _error: Option<TransportError>,
        ) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    fn test_request(seq: i32, payload: Vec<u8>) -> Arc<Request<RawMessage>> {
        Request::new(
            SequenceId::new(seq).unwrap(),
            "test",
            payload,
            Duration::from_secs(1),
            true,
            Box::new(|_| {}),
            Box::new(|_| {}),
        )
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let host = TcpHost::new(&ClientConfig::default());
        let events = RecordingEvents::new();
        let result =
            ConnectionHost::<RawMessage>::connect(&host, "127.0.0.1:1", events).await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_and_receive_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // Echo server for one connection.
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
        });

        let host = TcpHost::new(&ClientConfig::default());
        let events = RecordingEvents::new();
        let conn = ConnectionHost::<RawMessage>::connect(&host, &addr, events.clone())
            .await
            .unwrap();
        assert_eq!(events.connected.load(Ordering::SeqCst), 1);

        conn.begin_receive();
        assert!(conn.begin_send(test_request(1, b"ping".to_vec())));

        tokio::time::timeout(Duration::from_secs(2), events.notify.notified())
            .await
            .expect("echo should arrive");
        assert_eq!(events.received.lock().as_slice(), b"ping");
    }

    #[tokio::test]
    async fn test_peer_close_fires_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let host = TcpHost::new(&ClientConfig::default());
        let events = RecordingEvents::new();
        let conn = ConnectionHost::<RawMessage>::connect(&host, &addr, events.clone())
            .await
            .unwrap();
        conn.begin_receive();

        tokio::time::timeout(Duration::from_secs(2), async {
            while events.disconnected.load(Ordering::SeqCst) == 0 {
                events.notify.notified().await;
            }
        })
        .await
        .expect("disconnect should fire");
        assert_eq!(events.disconnected.load(Ordering::SeqCst), 1);
        assert!(conn.is_disconnected());
    }

    #[tokio::test]
    async fn test_local_disconnect_fires_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let host = TcpHost::new(&ClientConfig::default());
        let events = RecordingEvents::new();
        let conn = ConnectionHost::<RawMessage>::connect(&host, &addr, events.clone())
            .await
            .unwrap();
        conn.begin_receive();
        conn.begin_disconnect(None);
        conn.begin_disconnect(None);

        tokio::time::timeout(Duration::from_secs(2), async {
            while events.disconnected.load(Ordering::SeqCst) == 0 {
                events.notify.notified().await;
            }
        })
        .await
        .expect("disconnect should fire");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(events.disconnected.load(Ordering::SeqCst), 1);
    }
}

// Made with Bob
