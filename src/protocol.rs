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

//! Protocol adapter and message contracts.
//!
//! The client core is protocol-agnostic: wire framing lives behind the
//! [`Protocol`] trait, and inbound messages are opaque to the core except
//! for the sequence id exposed through the [`Message`] trait. The adapter
//! also decides, once, whether the protocol supports multiplexing many
//! in-flight requests per connection or requires exclusive use of a
//! connection per outstanding request.

use crate::host::Connection;
use crate::request::SequenceId;
use std::error::Error as StdError;
use thiserror::Error;

/// An inbound message, opaque to the core except for its sequence id.
///
/// The sequence id must equal the id of some previously-sent request for
/// correlation to succeed; otherwise the message is routed to the
/// unknown-message handler.
pub trait Message: Send + 'static {
    /// Returns the sequence id echoed by the remote peer.
    fn sequence_id(&self) -> SequenceId;
}

/// A fatal framing error raised by a [`Protocol`] adapter.
///
/// Parse errors tear down the connection they occurred on; they never fail
/// outstanding requests directly (those age out through their receive
/// timeout).
///
/// # Examples
///
/// ```rust
/// use plexrpc::ProtocolError;
///
/// let error = ProtocolError::new("frame length exceeds limit");
/// assert!(error.to_string().contains("frame length"));
/// ```
#[derive(Debug, Error)]
#[error("framing error: {message}")]
pub struct ProtocolError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ProtocolError {
    /// Creates a new framing error from a description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new framing error wrapping an underlying cause.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Wire protocol adapter.
///
/// An adapter turns a raw byte buffer into zero or one message and reports
/// how many bytes it consumed. The client feeds it the accumulated receive
/// buffer of a connection and advances its read cursor by the returned
/// length.
///
/// # Parse Contract
///
/// `parse` returns `(message, read_len)` where
/// `0 <= read_len <= buffer.len()`:
///
/// - `(None, 0)` — the buffer does not yet hold a complete frame; the
///   client will call again once more bytes arrive.
/// - `(Some(m), n)` — a complete message occupying the first `n` bytes.
/// - `(None, n)` with `n > 0` — `n` bytes of non-message framing (padding,
///   keepalive) to discard.
/// - `Err(_)` — an unrecoverable framing fault; the connection is torn
///   down and the whole buffer discarded.
///
/// Within a single connection, `parse` calls are serialized; the receive
/// path is single-reader per connection.
pub trait Protocol: Send + Sync + 'static {
    /// The message type produced by this adapter.
    type Message: Message;

    /// Returns `true` if the protocol multiplexes many in-flight requests
    /// per connection, `false` if it allows only one outstanding request
    /// per connection.
    ///
    /// The client reads this once at construction to pick its pool
    /// variant; the answer must not change over the adapter's lifetime.
    fn is_async(&self) -> bool;

    /// Parses at most one message from the front of `buffer`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] on an unrecoverable framing fault.
    fn parse(
        &self,
        conn: &Connection<Self::Message>,
        buffer: &[u8],
    ) -> Result<(Option<Self::Message>, usize), ProtocolError>;
}


// Made with Bob
