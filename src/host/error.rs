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

//! Transport layer error types.
//!
//! Transport errors describe connection-level faults: failed connection
//! attempts, lost connections, and send failures. They are reported to the
//! endpoint manager's reconnect loop and carried by disconnect
//! notifications; they never complete a request directly. Requests
//! stranded by a transport fault surface through their own timeouts as
//! [`RequestError`](crate::RequestError) values.

use crate::protocol::ProtocolError;
use std::io;
use thiserror::Error;

/// Errors raised by the connection host layer.
///
/// # Examples
///
/// ```rust
/// use plexrpc::TransportError;
/// use std::io;
///
/// let error = TransportError::ConnectFailed {
///     address: "127.0.0.1:9000".to_string(),
///     source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
/// };
/// assert!(error.to_string().contains("127.0.0.1:9000"));
/// ```
#[derive(Debug, Error)]
pub enum TransportError {
    /// A connection attempt failed.
    ///
    /// The endpoint manager retries after a fresh random delay from the
    /// cold-connect backoff window.
    #[error("failed to connect to {address}: {source}")]
    ConnectFailed {
        /// The address that failed to connect.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An established connection was lost.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Description of why the connection was lost.
        reason: String,
        /// The underlying I/O error, if available.
        #[source]
        source: Option<io::Error>,
    },

    /// A write on an established connection failed.
    ///
    /// The affected request re-enters dispatch if its retry policy allows;
    /// the connection is torn down.
    #[error("send failed: {source}")]
    SendFailed {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The connection was closed before the operation could run.
    #[error("connection closed")]
    Closed,

    /// The protocol adapter reported an unrecoverable framing fault.
    ///
    /// The connection carrying the malformed bytes is disconnected; its
    /// in-flight requests age out through their receive timeouts.
    #[error("fatal framing error: {source}")]
    Protocol {
        /// The framing fault.
        #[source]
        source: ProtocolError,
    },

    /// A per-endpoint initialization handshake failed.
    ///
    /// The connection is disconnected without ever being published to the
    /// pool.
    #[error("endpoint initialization failed: {reason}")]
    InitFailed {
        /// Description of the handshake failure.
        reason: String,
    },
}


// Made with Bob
