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

//! Request-level error types.
//!
//! Every request submitted to the client completes exactly once: either its
//! result callback fires with a correlated response message, or its
//! exception callback fires with one of the [`RequestError`] variants below.
//! Each variant carries the logical name of the originating request so that
//! callers can attribute failures without keeping their own bookkeeping.
//!
//! # Error Semantics
//!
//! - [`RequestError::PendingSendTimeout`]: the request aged out before it
//!   could be handed to a connection, or while being retried after a
//!   transient send failure.
//! - [`RequestError::SendFailed`]: the transport reported a send failure
//!   and the request was created with retry disabled.
//! - [`RequestError::ReceiveTimeout`]: the request was sent, but no
//!   response with its sequence id arrived within the per-request deadline.
//!
//! Transport-layer failures (connect errors, connection loss) are reported
//! separately through [`TransportError`](crate::TransportError); they never
//! fail a request directly. A request stranded on a dead connection
//! surfaces as [`RequestError::ReceiveTimeout`] at its deadline.

use thiserror::Error;

/// Terminal failure delivered through a request's exception callback.
///
/// Each variant carries the logical method name the request was created
/// with. The name is echoed verbatim; it is never interpreted by the
/// client.
///
/// # Examples
///
/// ```rust
/// use plexrpc::RequestError;
///
/// let error = RequestError::ReceiveTimeout {
///     name: "get_user".to_string(),
/// };
/// assert_eq!(error.name(), "get_user");
/// assert!(error.is_timeout());
/// ```
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The request aged out while waiting for a connection.
    ///
    /// Raised when the request sat in the pending-send queue past the send
    /// timeout, or when a send-failure retry found the request older than
    /// the send timeout.
    #[error("request {name:?} timed out waiting for an available connection")]
    PendingSendTimeout {
        /// Logical name of the originating request.
        name: String,
    },

    /// The transport reported a send failure and retry was disabled.
    ///
    /// Requests created with retry enabled re-enter dispatch instead of
    /// surfacing this error, until their age exceeds the send timeout.
    #[error("request {name:?} failed to send")]
    SendFailed {
        /// Logical name of the originating request.
        name: String,
    },

    /// No response arrived within the per-request receive deadline.
    ///
    /// The deadline is measured from the moment the send completed, not
    /// from request creation.
    #[error("request {name:?} timed out waiting for a response")]
    ReceiveTimeout {
        /// Logical name of the originating request.
        name: String,
    },
}

impl RequestError {
    /// Returns the logical name of the request that failed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use plexrpc::RequestError;
    ///
    /// let error = RequestError::SendFailed { name: "ping".to_string() };
    /// assert_eq!(error.name(), "ping");
    /// ```
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::PendingSendTimeout { name }
            | Self::SendFailed { name }
            | Self::ReceiveTimeout { name } => name,
        }
    }

    /// Returns `true` if this error is one of the two timeout kinds.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use plexrpc::RequestError;
    ///
    /// let pending = RequestError::PendingSendTimeout { name: "a".to_string() };
    /// let send = RequestError::SendFailed { name: "b".to_string() };
    /// assert!(pending.is_timeout());
    /// assert!(!send.is_timeout());
    /// ```
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::PendingSendTimeout { .. } | Self::ReceiveTimeout { .. }
        )
    }
}
