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

//! Exclusive-acquire pool for synchronous protocols.

use crate::host::{Connection, ConnectionId};
use crate::pool::ConnectionPool;
use crate::protocol::Message;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

struct Inner<M: Message> {
    connections: HashMap<ConnectionId, Arc<Connection<M>>>,
    idle: Vec<Arc<Connection<M>>>,
}

/// Connection pool for protocols with one outstanding request per
/// connection.
///
/// Idle connections sit on a LIFO stack; acquiring pops one and releasing
/// pushes it back. Destroyed connections are removed from the membership
/// map only — a stale stack entry left behind is recognized on a later
/// pop (its id is no longer in the map) and silently skipped.
pub struct ExclusivePool<M: Message> {
    inner: Mutex<Inner<M>>,
}

impl<M: Message> ExclusivePool<M> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                connections: HashMap::new(),
                idle: Vec::new(),
            }),
        }
    }

    /// Returns the number of currently idle connections.
    ///
    /// A connection that is registered but acquired counts toward
    /// [`len`](ConnectionPool::len) and not here.
    #[must_use]
    pub fn idle_len(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .idle
            .iter()
            .filter(|conn| inner.connections.contains_key(&conn.id()))
            .count()
    }
}

impl<M: Message> Default for ExclusivePool<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message> ConnectionPool<M> for ExclusivePool<M> {
    fn register(&self, conn: Arc<Connection<M>>) {
        let mut inner = self.inner.lock();
        if inner.connections.contains_key(&conn.id()) {
            debug!(conn = %conn.id(), "connection already pooled");
            return;
        }
        inner.connections.insert(conn.id(), conn.clone());
        inner.idle.push(conn);
    }

    fn try_acquire(&self) -> Option<Arc<Connection<M>>> {
        let mut inner = self.inner.lock();
        while let Some(conn) = inner.idle.pop() {
            // Stale entries from destroyed connections are skipped here.
            if inner.connections.contains_key(&conn.id()) {
                return Some(conn);
            }
        }
        None
    }

    fn release(&self, conn: &Arc<Connection<M>>) {
        let mut inner = self.inner.lock();
        if inner.connections.contains_key(&conn.id()) {
            inner.idle.push(conn.clone());
        }
    }

    fn destroy(&self, conn: &Arc<Connection<M>>) {
        self.inner.lock().connections.remove(&conn.id());
    }

    fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }
}

impl<M: Message> std::fmt::Debug for ExclusivePool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ExclusivePool")
            .field("connections", &inner.connections.len())
            .field("stacked", &inner.idle.len())
            .finish()
    }
}


// Made with Bob
