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

//! Round-robin pool for multiplexing protocols.

use crate::host::Connection;
use crate::pool::ConnectionPool;
use crate::protocol::Message;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Connection pool for protocols that multiplex requests.
///
/// The acquire path reads an immutable snapshot of the connection list
/// published on every mutation, plus one atomic counter for round-robin
/// rotation; it never takes the writers' mutex. With `k` stable
/// connections and `m` acquisitions, the per-connection pick counts differ
/// by at most one.
pub struct MultiplexPool<M: Message> {
    connections: Mutex<Vec<Arc<Connection<M>>>>,
    snapshot: RwLock<Arc<[Arc<Connection<M>>]>>,
    cursor: AtomicU32,
}

impl<M: Message> MultiplexPool<M> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            snapshot: RwLock::new(Arc::from(Vec::new())),
            cursor: AtomicU32::new(0),
        }
    }

    fn publish(&self, connections: &[Arc<Connection<M>>]) {
        *self.snapshot.write() = Arc::from(connections.to_vec());
    }
}

impl<M: Message> Default for MultiplexPool<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message> ConnectionPool<M> for MultiplexPool<M> {
    fn register(&self, conn: Arc<Connection<M>>) {
        let mut connections = self.connections.lock();
        if connections.iter().any(|c| c.id() == conn.id()) {
            debug!(conn = %conn.id(), "connection already pooled");
            return;
        }
        connections.push(conn);
        self.publish(&connections);
    }

    fn try_acquire(&self) -> Option<Arc<Connection<M>>> {
        let snapshot = self.snapshot.read().clone();
        match snapshot.len() {
            0 => None,
            1 => Some(snapshot[0].clone()),
            len => {
                let turn = self.cursor.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff;
                Some(snapshot[turn as usize % len].clone())
            }
        }
    }

    fn release(&self, _conn: &Arc<Connection<M>>) {
        // Multiplexed connections remain continuously available.
    }

    fn destroy(&self, conn: &Arc<Connection<M>>) {
        let mut connections = self.connections.lock();
        let before = connections.len();
        connections.retain(|c| c.id() != conn.id());
        if connections.len() != before {
            self.publish(&connections);
        }
    }

    fn len(&self) -> usize {
        self.snapshot.read().len()
    }
}

impl<M: Message> std::fmt::Debug for MultiplexPool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexPool")
            .field("connections", &self.len())
            .finish()
    }
}


// Made with Bob
