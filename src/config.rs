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

//! Client configuration.
//!
//! [`ClientConfig`] collects every tunable of the client: socket and
//! message buffer sizes, the two request timeouts, the timer intervals of
//! the pending-send queue and the receiving registry, and the two
//! randomized backoff windows of the per-endpoint reconnect loop.
//!
//! Defaults match a latency-sensitive interactive workload: 8 KiB buffers
//! and 3 second send/receive timeouts.

use rand::random;
use std::time::Duration;

/// A uniform random delay window used for reconnect scheduling.
///
/// Every delay drawn from the window is an independent uniform sample in
/// `[min, max]`. Independent draws de-synchronize reconnect stampedes when
/// many clients restart against one server at the same time.
///
/// # Examples
///
/// ```rust
/// use plexrpc::BackoffWindow;
/// use std::time::Duration;
///
/// let window = BackoffWindow::new(Duration::from_millis(100), Duration::from_millis(1500));
/// let delay = window.draw();
/// assert!(delay >= Duration::from_millis(100));
/// assert!(delay <= Duration::from_millis(1500));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffWindow {
    min: Duration,
    max: Duration,
}

impl BackoffWindow {
    /// Creates a new backoff window.
    ///
    /// If `max < min` the bounds are swapped rather than rejected.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        if max < min {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    /// Returns the lower bound of the window.
    #[must_use]
    pub const fn min(&self) -> Duration {
        self.min
    }

    /// Returns the upper bound of the window.
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Draws a fresh uniform delay from the window.
    ///
    /// Each call is an independent sample; callers must not cache the
    /// result across scheduling points.
    #[must_use]
    pub fn draw(&self) -> Duration {
        let spread = self.max.saturating_sub(self.min).as_millis() as f64;
        let jitter = (random::<f64>() * spread) as u64;
        self.min + Duration::from_millis(jitter)
    }
}

/// Configuration for a [`Client`](crate::Client).
///
/// Constructed with [`ClientConfig::default`] and refined through the
/// `with_*` builders.
///
/// # Examples
///
/// ```rust
/// use plexrpc::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_send_timeout(Duration::from_secs(5))
///     .with_receive_timeout(Duration::from_secs(10));
/// assert_eq!(config.send_timeout(), Duration::from_secs(5));
/// assert_eq!(config.socket_buffer_size(), 8192);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    socket_buffer_size: usize,
    message_buffer_size: usize,
    send_timeout: Duration,
    receive_timeout: Duration,
    pending_interval: Duration,
    sweep_interval: Duration,
    connect_backoff: BackoffWindow,
    reconnect_backoff: BackoffWindow,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_buffer_size: 8192,
            message_buffer_size: 8192,
            send_timeout: Duration::from_millis(3000),
            receive_timeout: Duration::from_millis(3000),
            pending_interval: Duration::from_millis(50),
            sweep_interval: Duration::from_millis(500),
            connect_backoff: BackoffWindow::new(
                Duration::from_millis(1000),
                Duration::from_millis(3000),
            ),
            reconnect_backoff: BackoffWindow::new(
                Duration::from_millis(100),
                Duration::from_millis(1500),
            ),
        }
    }
}

impl ClientConfig {
    /// Sets the kernel send/receive buffer size applied to each socket.
    #[must_use]
    pub fn with_socket_buffer_size(mut self, size: usize) -> Self {
        self.socket_buffer_size = size;
        self
    }

    /// Sets the size of the read chunk used by each connection's receive
    /// loop.
    #[must_use]
    pub fn with_message_buffer_size(mut self, size: usize) -> Self {
        self.message_buffer_size = size;
        self
    }

    /// Sets the send timeout.
    ///
    /// A request that has not been handed to a connection within this
    /// duration of its creation completes with
    /// [`RequestError::PendingSendTimeout`](crate::RequestError::PendingSendTimeout).
    /// The same bound caps retries of transient send failures.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Sets the default receive timeout for requests that do not override
    /// it.
    #[must_use]
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Sets the tick interval of the pending-send queue.
    #[must_use]
    pub fn with_pending_interval(mut self, interval: Duration) -> Self {
        self.pending_interval = interval;
        self
    }

    /// Sets the tick interval of the receive-timeout sweep.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the delay window for retrying a failed connection attempt.
    #[must_use]
    pub fn with_connect_backoff(mut self, window: BackoffWindow) -> Self {
        self.connect_backoff = window;
        self
    }

    /// Sets the delay window for reconnecting after a peer-initiated drop.
    ///
    /// This window is deliberately shorter than the cold-connect window by
    /// default: a quick reconnect is likely to succeed after the peer
    /// closed an established connection.
    #[must_use]
    pub fn with_reconnect_backoff(mut self, window: BackoffWindow) -> Self {
        self.reconnect_backoff = window;
        self
    }

    /// Returns the socket buffer size.
    #[must_use]
    pub const fn socket_buffer_size(&self) -> usize {
        self.socket_buffer_size
    }

    /// Returns the message buffer size.
    #[must_use]
    pub const fn message_buffer_size(&self) -> usize {
        self.message_buffer_size
    }

    /// Returns the send timeout.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Returns the default receive timeout.
    #[must_use]
    pub const fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Returns the pending-send tick interval.
    #[must_use]
    pub const fn pending_interval(&self) -> Duration {
        self.pending_interval
    }

    /// Returns the receive-timeout sweep interval.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Returns the cold-connect backoff window.
    #[must_use]
    pub const fn connect_backoff(&self) -> BackoffWindow {
        self.connect_backoff
    }

    /// Returns the post-disconnect backoff window.
    #[must_use]
    pub const fn reconnect_backoff(&self) -> BackoffWindow {
        self.reconnect_backoff
    }
}


// Made with Bob
