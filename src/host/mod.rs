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

//! Connection host layer.
//!
//! A connection host owns low-level byte I/O: it dials an address,
//! configures the socket, and drives one writer and one reader task per
//! connection. Everything the host observes is reported upward through the
//! [`ConnectionEvents`] trait, which the client core implements; the host
//! never reaches back into client state directly. This keeps the object
//! graph acyclic where the original event-subscription design was not.
//!
//! # Event Ordering
//!
//! Hosts guarantee two orderings that the client's send/receive state
//! machine depends on:
//!
//! - For each request on a connection, [`ConnectionEvents::on_start_sending`]
//!   is delivered before [`ConnectionEvents::on_send_complete`]. Both come
//!   from the single writer task, so the in-flight registration installed
//!   in `on_start_sending` is visible to a send failure, and to a response
//!   that arrives before the send-complete callback.
//! - Within a connection, [`ConnectionEvents::on_message_received`] calls
//!   are serialized: the receive path is single-reader per connection.
//!
//! Across connections, no ordering is guaranteed.
//!
//! # Implementations
//!
//! - [`TcpHost`]: TCP sockets via Tokio, with Nagle disabled, linger off,
//!   and configurable kernel buffer sizes.
//! - [`MemoryHost`]: an in-process host for tests and benchmarks with
//!   scriptable peers.

mod connection;
mod error;
mod memory;
mod tcp;

pub use connection::{Connection, ConnectionId};
pub use error::TransportError;
pub use memory::{MemoryHost, MemoryPeer};
pub use tcp::TcpHost;

use crate::protocol::Message;
use crate::request::Request;
use async_trait::async_trait;
use std::sync::Arc;

/// Observer of connection lifecycle and I/O events.
///
/// Implemented by the client core. All methods are synchronous and must
/// not block: they run on a connection's writer or reader task. Work that
/// can run user code is handed off to spawned worker tasks by the
/// implementation.
pub trait ConnectionEvents<M: Message>: Send + Sync + 'static {
    /// A connection finished establishment and its I/O tasks are running.
    ///
    /// Reads do not begin until [`Connection::begin_receive`] is called.
    fn on_connected(&self, conn: &Arc<Connection<M>>);

    /// The writer task is about to transmit `request`.
    ///
    /// Delivered before the matching [`on_send_complete`](Self::on_send_complete)
    /// for the same request.
    fn on_start_sending(&self, conn: &Arc<Connection<M>>, request: &Arc<Request<M>>);

    /// The transmit attempt for `request` finished.
    ///
    /// `ok` is `false` when the write failed or the connection died with
    /// the request still queued.
    fn on_send_complete(&self, conn: &Arc<Connection<M>>, request: &Arc<Request<M>>, ok: bool);

    /// Bytes arrived on the connection.
    ///
    /// `buffer` is the connection's accumulated receive buffer. Returns the
    /// number of bytes consumed; the host discards that prefix and calls
    /// again while the buffer is non-empty and progress is being made.
    fn on_message_received(&self, conn: &Arc<Connection<M>>, buffer: &[u8]) -> usize;

    /// The connection is gone.
    ///
    /// Fired exactly once per connection; `error` is `None` for a graceful
    /// or locally requested close.
    fn on_disconnected(&self, conn: &Arc<Connection<M>>, error: Option<TransportError>);
}

/// Factory for outbound connections.
///
/// The endpoint manager calls [`connect`](Self::connect) from its per-node
/// reconnect loop; the host configures the transport and spawns the I/O
/// tasks that feed `events`.
#[async_trait]
pub trait ConnectionHost<M: Message>: Send + Sync + 'static {
    /// Establishes a connection to `address`.
    ///
    /// On success the host has already fired
    /// [`ConnectionEvents::on_connected`] and the connection is ready for
    /// [`Connection::begin_send`] / [`Connection::begin_receive`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectFailed`] if the transport could not
    /// be established.
    async fn connect(
        &self,
        address: &str,
        events: Arc<dyn ConnectionEvents<M>>,
    ) -> Result<Arc<Connection<M>>, TransportError>;
}

// Made with Bob
