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

//! Connection pools.
//!
//! Two pool variants share one contract, and the client picks between
//! them once at construction from
//! [`Protocol::is_async`](crate::Protocol::is_async):
//!
//! - [`MultiplexPool`]: for protocols that multiplex many in-flight
//!   requests per connection. Acquire rotates round-robin over a published
//!   snapshot without locking; release is a no-op because a connection
//!   stays continuously available.
//! - [`ExclusivePool`]: for protocols that allow one outstanding request
//!   per connection. Acquire pops an idle connection off a LIFO stack and
//!   release pushes it back, so no two outstanding requests ever share a
//!   connection.

mod exclusive;
mod multiplex;

pub use exclusive::ExclusivePool;
pub use multiplex::MultiplexPool;

use crate::host::Connection;
use crate::protocol::Message;
use std::sync::Arc;

/// Common contract of the two pool variants.
///
/// `destroy` is idempotent: destroying a connection that was never
/// registered, or destroying it twice, has no effect.
pub trait ConnectionPool<M: Message>: Send + Sync + 'static {
    /// Makes `conn` eligible for acquisition.
    fn register(&self, conn: Arc<Connection<M>>);

    /// Attempts to pick a connection for one send.
    ///
    /// Returns `None` if no connection is currently available.
    fn try_acquire(&self) -> Option<Arc<Connection<M>>>;

    /// Returns a previously acquired connection.
    ///
    /// A no-op for pools whose connections are never exclusively held.
    fn release(&self, conn: &Arc<Connection<M>>);

    /// Removes `conn` from the pool.
    fn destroy(&self, conn: &Arc<Connection<M>>);

    /// Returns the number of registered connections.
    fn len(&self) -> usize;

    /// Returns `true` if the pool holds no connections.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Made with Bob
