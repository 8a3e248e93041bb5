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

//! The client façade and its send/receive state machine.
//!
//! [`Client`] owns the moving parts — protocol adapter, connection pool,
//! endpoint manager, pending-send queue, and receiving registry — and
//! implements the event traits the host and manager report into. The
//! lifecycle of one request:
//!
//! 1. [`Client::send`] acquires a connection from the pool and queues the
//!    request on it; with no connection available the request waits in the
//!    pending-send queue.
//! 2. The connection's writer registers the request in the receiving
//!    registry immediately before transmitting, so a response racing the
//!    send-complete callback still correlates.
//! 3. A successful send starts the receive deadline. A failed send removes
//!    the registration and either re-dispatches (retry allowed, request
//!    younger than the send timeout) or completes the request with
//!    [`RequestError::SendFailed`] / [`RequestError::PendingSendTimeout`].
//! 4. An inbound message is parsed by the protocol adapter and its
//!    sequence id removed from the registry; the removal is atomic and
//!    whoever removes the entry — response, send failure, or timeout
//!    sweep — owns the completion. Messages that correlate to nothing go
//!    to the unknown-message handler.
//! 5. A disconnect only destroys the pool entry. Requests in flight on the
//!    dead connection stay registered and surface as
//!    [`RequestError::ReceiveTimeout`] at their deadline, keeping one
//!    uniform error path for "no response".
//!
//! Send-failure retries are bounded by the send timeout measured from
//! request creation; receive timeouts are never retried. That asymmetry
//! keeps retries limited to transport-layer faults and avoids duplicate
//! delivery when a server is merely slow.

use crate::config::ClientConfig;
use crate::endpoint::{EndpointManager, InitFn, Node, NodeEvents};
use crate::error::RequestError;
use crate::host::{Connection, ConnectionEvents, ConnectionHost, TcpHost, TransportError};
use crate::pending::PendingQueue;
use crate::pool::{ConnectionPool, ExclusivePool, MultiplexPool};
use crate::protocol::{Message, Protocol};
use crate::registry::ReceivingRegistry;
use crate::request::{
    ExceptionFn, Request, ResultFn, SequenceId, SequenceIdGenerator, dispatch_user_callback,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};


/// Observer of messages that correlate to no in-flight request.
pub type UnknownMessageHandler<M> = Arc<dyn Fn(&Arc<Connection<M>>, M) + Send + Sync>;

struct Core<P: Protocol> {
    protocol: P,
    config: ClientConfig,
    sequence: SequenceIdGenerator,
    registry: ReceivingRegistry<P::Message>,
    pending: PendingQueue<P::Message>,
    pool: Box<dyn ConnectionPool<P::Message>>,
    endpoints: Arc<EndpointManager<P::Message>>,
    unknown: RwLock<Option<UnknownMessageHandler<P::Message>>>,
    closed: AtomicBool,
}

impl<P: Protocol> Core<P> {
    /// Dispatches a request onto an available connection, or parks it in
    /// the pending-send queue.
    fn send_request(&self, request: Arc<Request<P::Message>>) {
        if self.closed.load(Ordering::SeqCst) {
            self.fail_request(
                &request,
                RequestError::PendingSendTimeout {
                    name: request.name().to_string(),
                },
            );
            return;
        }
        match self.pool.try_acquire() {
            Some(conn) => {
                if !conn.begin_send(request.clone()) {
                    // Acquired a connection that died before the send was
                    // queued; the pending tick retries or times out.
                    debug!(conn = %conn.id(), seq = %request.seq_id(), "connection unwritable, queueing");
                    self.pending.push(request);
                }
            }
            None => self.pending.push(request),
        }
    }

    /// Completes a request exceptionally, returning its pool slot first.
    fn fail_request(&self, request: &Arc<Request<P::Message>>, error: RequestError) {
        if let Some(conn) = request.take_connection() {
            self.pool.release(&conn);
        }
        request.complete_with_exception(error);
    }

    /// Completes a request with its response, returning its pool slot
    /// first.
    fn finish_request(&self, request: &Arc<Request<P::Message>>, message: P::Message) {
        if let Some(conn) = request.take_connection() {
            self.pool.release(&conn);
        }
        request.complete_with_result(message);
    }

    /// One pending-send tick: drain at most the queue length observed at
    /// entry, re-dispatching young requests and expiring the rest.
    fn pending_tick(&self) {
        let batch = self.pending.len();
        for _ in 0..batch {
            let Some(request) = self.pending.pop() else {
                break;
            };
            if request.age() >= self.config.send_timeout() {
                debug!(seq = %request.seq_id(), name = request.name(), "pending-send timeout");
                self.fail_request(
                    &request,
                    RequestError::PendingSendTimeout {
                        name: request.name().to_string(),
                    },
                );
            } else {
                self.send_request(request);
            }
        }
    }

    /// One receive-timeout sweep over the registry.
    fn sweep_tick(&self) {
        let now = Instant::now();
        for request in self.registry.take_expired(now) {
            debug!(seq = %request.seq_id(), name = request.name(), "receive timeout");
            self.fail_request(
                &request,
                RequestError::ReceiveTimeout {
                    name: request.name().to_string(),
                },
            );
        }
    }

    fn handle_unknown(&self, conn: &Arc<Connection<P::Message>>, message: P::Message) {
        let handler = self.unknown.read().clone();
        match handler {
            Some(handler) => {
                let conn = conn.clone();
                dispatch_user_callback("unknown_message", move || handler(&conn, message));
            }
            None => {
                debug!(conn = %conn.id(), seq = %message.sequence_id(), "unknown message dropped");
            }
        }
    }
}

impl<P: Protocol> ConnectionEvents<P::Message> for Core<P> {
    fn on_connected(&self, conn: &Arc<Connection<P::Message>>) {
        debug!(conn = %conn.id(), peer = conn.peer_addr(), "connection up");
        conn.begin_receive();
    }

    fn on_start_sending(
        &self,
        conn: &Arc<Connection<P::Message>>,
        request: &Arc<Request<P::Message>>,
    ) {
        // Registration must precede the send-complete callback so that a
        // response arriving before it still correlates.
        request.attach_connection(conn.clone());
        if !self.registry.try_add(request) {
            warn!(seq = %request.seq_id(), "sequence id already in flight");
        }
    }

    fn on_send_complete(
        &self,
        _conn: &Arc<Connection<P::Message>>,
        request: &Arc<Request<P::Message>>,
        ok: bool,
    ) {
        if ok {
            request.mark_sent();
            return;
        }

        // The removal is the claim; a concurrent response or sweep that
        // got there first owns the completion instead.
        let Some(request) = self.registry.try_remove(request.seq_id()) else {
            return;
        };
        // The slot returns to the pool on every outcome: a connection that
        // survives a transient send failure stays acquirable; a dead one
        // is destroyed by its disconnect and skipped on a later pop.
        if let Some(conn) = request.take_connection() {
            self.pool.release(&conn);
        }

        if !request.allow_retry() {
            request.complete_with_exception(RequestError::SendFailed {
                name: request.name().to_string(),
            });
        } else if request.age() >= self.config.send_timeout() {
            request.complete_with_exception(RequestError::PendingSendTimeout {
                name: request.name().to_string(),
            });
        } else {
            debug!(seq = %request.seq_id(), "send failed, re-dispatching");
            self.send_request(request);
        }
    }

    fn on_message_received(&self, conn: &Arc<Connection<P::Message>>, buffer: &[u8]) -> usize {
        match self.protocol.parse(conn, buffer) {
            Err(parse_error) => {
                error!(conn = %conn.id(), error = %parse_error, "fatal framing error");
                conn.begin_disconnect(Some(TransportError::Protocol {
                    source: parse_error,
                }));
                buffer.len()
            }
            Ok((None, consumed)) => consumed,
            Ok((Some(message), consumed)) => {
                match self.registry.try_remove(message.sequence_id()) {
                    Some(request) => self.finish_request(&request, message),
                    None => self.handle_unknown(conn, message),
                }
                consumed
            }
        }
    }

    fn on_disconnected(
        &self,
        conn: &Arc<Connection<P::Message>>,
        error: Option<TransportError>,
    ) {
        match &error {
            Some(error) => warn!(conn = %conn.id(), %error, "connection lost"),
            None => debug!(conn = %conn.id(), "connection closed"),
        }
        self.pool.destroy(conn);
        self.endpoints.connection_lost(conn);
        // Requests in flight on this connection stay registered and age
        // out through the receive-timeout sweep.
    }
}

impl<P: Protocol> NodeEvents<P::Message> for Core<P> {
    fn on_node_connected(
        &self,
        node: &Arc<Node<P::Message>>,
        conn: &Arc<Connection<P::Message>>,
    ) {
        debug!(node = %node.id(), conn = %conn.id(), "node connected");
    }

    fn on_node_available(
        &self,
        node: &Arc<Node<P::Message>>,
        conn: &Arc<Connection<P::Message>>,
    ) {
        debug!(node = %node.id(), conn = %conn.id(), "node available");
        self.pool.register(conn.clone());
    }
}

async fn pending_timer<P: Protocol>(core: Weak<Core<P>>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(core) = core.upgrade() else { return };
        core.pending_tick();
    }
}

async fn sweep_timer<P: Protocol>(core: Weak<Core<P>>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(core) = core.upgrade() else { return };
        core.sweep_tick();
    }
}

/// Asynchronous multiplexing RPC client.
///
/// A `Client` correlates many in-flight requests across a pool of
/// long-lived connections to the endpoints registered on it. It must be
/// created inside a Tokio runtime; construction spawns the pending-send
/// and receive-timeout timers.
///
/// Dropping the client shuts it down: all endpoints are unregistered,
/// connections disconnect, and requests still waiting complete through
/// their exception callbacks.
///
/// # Examples
///
/// ```rust,no_run
/// # use plexrpc::{Client, ClientConfig, Connection, Message, Protocol, ProtocolError, SequenceId};
/// # #[derive(Debug)]
/// # struct Reply(SequenceId);
/// # impl Message for Reply {
/// #     fn sequence_id(&self) -> SequenceId { self.0 }
/// # }
/// # struct Framing;
/// # impl Protocol for Framing {
/// #     type Message = Reply;
/// #     fn is_async(&self) -> bool { true }
/// #     fn parse(&self, _conn: &Connection<Reply>, buffer: &[u8])
/// #         -> Result<(Option<Reply>, usize), ProtocolError> {
/// #         Ok((None, buffer.len()))
/// #     }
/// # }
/// # async fn example() {
/// let client = Client::tcp(Framing, ClientConfig::default());
/// client.try_register_endpoint("primary", "127.0.0.1:7000", None);
///
/// let request = client
///     .new_request("echo")
///     .payload(vec![0x01, 0x02])
///     .on_result(|reply| println!("correlated: {}", reply.sequence_id()))
///     .on_exception(|error| eprintln!("failed: {error}"))
///     .build();
/// client.send(request);
/// # }
/// ```
pub struct Client<P: Protocol> {
    core: Arc<Core<P>>,
}

impl<P: Protocol> Client<P> {
    /// Creates a client that dials through `host`.
    ///
    /// The pool variant is fixed here from
    /// [`Protocol::is_async`]: multiplexing protocols get the round-robin
    /// pool, synchronous protocols the exclusive-acquire pool.
    pub fn new(
        protocol: P,
        host: Arc<dyn ConnectionHost<P::Message>>,
        config: ClientConfig,
    ) -> Self {
        let pool: Box<dyn ConnectionPool<P::Message>> = if protocol.is_async() {
            Box::new(MultiplexPool::new())
        } else {
            Box::new(ExclusivePool::new())
        };
        let endpoints = EndpointManager::new(
            host,
            config.connect_backoff(),
            config.reconnect_backoff(),
        );

        let pending_interval = config.pending_interval();
        let sweep_interval = config.sweep_interval();
        let core = Arc::new(Core {
            protocol,
            config,
            sequence: SequenceIdGenerator::new(),
            registry: ReceivingRegistry::new(),
            pending: PendingQueue::new(),
            pool,
            endpoints: endpoints.clone(),
            unknown: RwLock::new(None),
            closed: AtomicBool::new(false),
        });

        let node_events_arc: Arc<dyn NodeEvents<P::Message>> = core.clone();
        let node_events: Weak<dyn NodeEvents<P::Message>> = Arc::downgrade(&node_events_arc);
        let conn_events_arc: Arc<dyn ConnectionEvents<P::Message>> = core.clone();
        let conn_events: Weak<dyn ConnectionEvents<P::Message>> = Arc::downgrade(&conn_events_arc);
        endpoints.bind(node_events, conn_events);

        tokio::spawn(pending_timer(Arc::downgrade(&core), pending_interval));
        tokio::spawn(sweep_timer(Arc::downgrade(&core), sweep_interval));

        Self { core }
    }

    /// Creates a client over TCP.
    pub fn tcp(protocol: P, config: ClientConfig) -> Self {
        let host = Arc::new(TcpHost::new(&config));
        Self::new(protocol, host, config)
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    /// Starts building a request.
    ///
    /// The sequence id is allocated immediately and is available through
    /// [`RequestBuilder::sequence_id`], so callers can embed it in the
    /// pre-framed payload before the request is built.
    pub fn new_request(&self, name: impl Into<String>) -> RequestBuilder<'_, P> {
        RequestBuilder {
            core: &self.core,
            seq_id: self.core.sequence.next(),
            name: name.into(),
            payload: Vec::new(),
            receive_timeout: self.core.config.receive_timeout(),
            allow_retry: true,
            on_result: None,
            on_exception: None,
        }
    }

    /// Submits a request.
    ///
    /// Fire and forget: this never fails. The request completes through
    /// its callbacks — with a correlated response, or with a
    /// [`RequestError`] once a timeout or terminal send failure claims it.
    pub fn send(&self, request: Arc<Request<P::Message>>) {
        self.core.send_request(request);
    }

    /// Sends one request and awaits its completion.
    ///
    /// `payload` receives the allocated sequence id and returns the
    /// pre-framed bytes to transmit. The per-request receive deadline is
    /// the configured default; use [`call_timeout`](Self::call_timeout) to
    /// override it.
    ///
    /// # Errors
    ///
    /// Returns the [`RequestError`] the request completed with.
    pub async fn call<F>(&self, name: &str, payload: F) -> Result<P::Message, RequestError>
    where
        F: FnOnce(SequenceId) -> Vec<u8>,
    {
        self.call_timeout(name, payload, self.core.config.receive_timeout())
            .await
    }

    /// Sends one request and awaits its completion with an explicit
    /// receive deadline.
    ///
    /// # Errors
    ///
    /// Returns the [`RequestError`] the request completed with.
    pub async fn call_timeout<F>(
        &self,
        name: &str,
        payload: F,
        receive_timeout: Duration,
    ) -> Result<P::Message, RequestError>
    where
        F: FnOnce(SequenceId) -> Vec<u8>,
    {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(parking_lot::Mutex::new(Some(tx)));
        let tx_result = tx.clone();
        let tx_exception = tx;

        let builder = self.new_request(name);
        let body = payload(builder.sequence_id());
        let request = builder
            .payload(body)
            .receive_timeout(receive_timeout)
            .on_result(move |message| {
                if let Some(tx) = tx_result.lock().take() {
                    let _ = tx.send(Ok(message));
                }
            })
            .on_exception(move |error| {
                if let Some(tx) = tx_exception.lock().take() {
                    let _ = tx.send(Err(error));
                }
            })
            .build();
        self.core.send_request(request);

        match rx.await {
            Ok(outcome) => outcome,
            // The request record vanished without completing; only client
            // teardown mid-flight does that.
            Err(_) => Err(RequestError::PendingSendTimeout {
                name: name.to_string(),
            }),
        }
    }

    /// Registers a named endpoint.
    ///
    /// Returns `false` without side effect if an endpoint of that name is
    /// already registered. `init`, when present, runs against every fresh
    /// connection before it serves traffic.
    pub fn try_register_endpoint(
        &self,
        name: &str,
        endpoint: &str,
        init: Option<InitFn<P::Message>>,
    ) -> bool {
        self.core.endpoints.try_register(name, endpoint, init)
    }

    /// Unregisters a named endpoint, disconnecting its connection if any.
    ///
    /// Returns `true` iff a node was removed.
    pub fn unregister_endpoint(&self, name: &str) -> bool {
        self.core.endpoints.unregister(name)
    }

    /// Returns the `(name, endpoint)` pairs of all registered endpoints.
    #[must_use]
    pub fn all_registered_endpoints(&self) -> Vec<(String, String)> {
        self.core.endpoints.all_endpoints()
    }

    /// Installs the handler for messages that correlate to no in-flight
    /// request.
    ///
    /// The handler runs on a worker task; a panic inside it is logged and
    /// swallowed.
    pub fn set_unknown_message_handler(
        &self,
        handler: impl Fn(&Arc<Connection<P::Message>>, P::Message) + Send + Sync + 'static,
    ) {
        *self.core.unknown.write() = Some(Arc::new(handler));
    }

    /// Returns the number of live, published connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.core.endpoints.connection_count()
    }

    /// Returns the number of requests awaiting responses.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.core.registry.len()
    }

    /// Returns the number of requests waiting for a connection.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.core.pending.len()
    }

    /// Shuts the client down.
    ///
    /// Unregisters every endpoint, disconnects all connections, and
    /// completes every waiting request exceptionally: queued requests with
    /// [`RequestError::PendingSendTimeout`], in-flight requests with
    /// [`RequestError::ReceiveTimeout`]. Idempotent; sends submitted after
    /// shutdown complete immediately with
    /// [`RequestError::PendingSendTimeout`].
    pub fn shutdown(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("client shutting down");
        self.core.endpoints.unregister_all();
        for request in self.core.pending.drain() {
            self.core.fail_request(
                &request,
                RequestError::PendingSendTimeout {
                    name: request.name().to_string(),
                },
            );
        }
        for request in self.core.registry.drain() {
            self.core.fail_request(
                &request,
                RequestError::ReceiveTimeout {
                    name: request.name().to_string(),
                },
            );
        }
    }
}

impl<P: Protocol> Drop for Client<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<P: Protocol> std::fmt::Debug for Client<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("in_flight", &self.in_flight())
            .field("queued", &self.queued())
            .field("endpoints", &self.all_registered_endpoints().len())
            .finish()
    }
}

/// Builder for one request.
///
/// Obtained from [`Client::new_request`]; the sequence id is already
/// allocated, so payload framing can embed it.
pub struct RequestBuilder<'a, P: Protocol> {
    core: &'a Arc<Core<P>>,
    seq_id: SequenceId,
    name: String,
    payload: Vec<u8>,
    receive_timeout: Duration,
    allow_retry: bool,
    on_result: Option<ResultFn<P::Message>>,
    on_exception: Option<ExceptionFn>,
}

impl<'a, P: Protocol> RequestBuilder<'a, P> {
    /// Returns the sequence id allocated for this request.
    #[must_use]
    pub fn sequence_id(&self) -> SequenceId {
        self.seq_id
    }

    /// Sets the pre-framed payload bytes.
    #[must_use]
    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Overrides the per-request receive deadline.
    #[must_use]
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Sets whether transient send failures may re-dispatch the request.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn allow_retry(mut self, allow: bool) -> Self {
        self.allow_retry = allow;
        self
    }

    /// Sets the result callback.
    #[must_use]
    pub fn on_result(mut self, f: impl FnOnce(P::Message) + Send + 'static) -> Self {
        self.on_result = Some(Box::new(f));
        self
    }

    /// Sets the exception callback.
    #[must_use]
    pub fn on_exception(mut self, f: impl FnOnce(RequestError) + Send + 'static) -> Self {
        self.on_exception = Some(Box::new(f));
        self
    }

    /// Builds the request without submitting it.
    ///
    /// Missing callbacks default to dropping the result and logging the
    /// exception.
    #[must_use]
    pub fn build(self) -> Arc<Request<P::Message>> {
        Request::new(
            self.seq_id,
            self.name,
            self.payload,
            self.receive_timeout,
            self.allow_retry,
            self.on_result.unwrap_or_else(|| Box::new(|_| {})),
            self.on_exception
                .unwrap_or_else(|| Box::new(|error| warn!(%error, "unhandled request failure"))),
        )
    }

    /// Builds and submits the request, returning its handle.
    pub fn send(self) -> Arc<Request<P::Message>> {
        let core = Arc::clone(self.core);
        let request = self.build();
        core.send_request(request.clone());
        request
    }
}

// Made with Bob
