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

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # Architecture
//!
//! plexrpc is organized into small layers, leaves first:
//!
//! - [`request`]: inert records of in-flight calls plus sequence id
//!   allocation
//! - [`protocol`]: the framing adapter and message contracts supplied by
//!   the caller
//! - [`pool`]: the two connection pool variants (round-robin multiplexing
//!   and exclusive acquire)
//! - [`host`]: byte-level connection I/O over TCP, plus an in-memory host
//!   for tests
//! - [`endpoint`]: named endpoint registration and the per-node reconnect
//!   loop with randomized backoff
//! - [`client`]: the façade owning all of the above and the send/receive
//!   state machine
//!
//! The host and manager layers report upward through the
//! [`ConnectionEvents`] and [`NodeEvents`] traits, both implemented by the
//! client core; components never hold strong back-pointers to the client.
//!
//! # Guarantees
//!
//! - Every submitted request completes exactly once, with a result or a
//!   [`RequestError`].
//! - Sequence ids are unique for the client lifetime, positive, and fit
//!   in 31 bits.
//! - A request that was sent and never answered fails with
//!   [`RequestError::ReceiveTimeout`] within one sweep interval of its
//!   deadline; a request never dispatched fails with
//!   [`RequestError::PendingSendTimeout`] within one pending tick of the
//!   send timeout.
//! - With `k` stable multiplexed connections, dispatch differs by at most
//!   one request across them; with the exclusive pool, no two outstanding
//!   requests share a connection.
//!
//! # Safety
//!
//! plexrpc is written in 100% safe Rust with `#![deny(unsafe_code)]`.
//! All concurrency is handled through Tokio tasks and lock-scoped shared
//! state.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod host;
mod pending;
pub mod pool;
pub mod protocol;
mod registry;
pub mod request;

pub use client::{Client, RequestBuilder, UnknownMessageHandler};
pub use config::{BackoffWindow, ClientConfig};
pub use endpoint::{EndpointManager, InitFn, InitFuture, Node, NodeEvents, NodeId};
pub use error::RequestError;
pub use host::{
    Connection, ConnectionEvents, ConnectionHost, ConnectionId, MemoryHost, MemoryPeer, TcpHost,
    TransportError,
};
pub use pool::{ConnectionPool, ExclusivePool, MultiplexPool};
pub use protocol::{Message, Protocol, ProtocolError};
pub use request::{Request, SequenceId, SequenceIdGenerator};

// Made with Bob
