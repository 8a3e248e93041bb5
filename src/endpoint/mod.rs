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

//! Endpoint management.
//!
//! The [`EndpointManager`] supervises the set of named remote endpoints a
//! client talks to. Each registered endpoint becomes a [`Node`] with an
//! independently running connect loop: dial, configure, optionally run the
//! node's initialization handshake, publish the connection, and — on
//! failure or disconnect — retry after a fresh uniform random delay.
//!
//! Randomized delays are drawn independently at every scheduling point,
//! which de-synchronizes reconnect stampedes when many clients restart
//! against one server. Disconnect-triggered reconnects use a shorter
//! window than cold-connect failures: a quick reconnect is likely to
//! succeed after a peer-initiated drop.

mod manager;
mod node;

pub use manager::EndpointManager;
pub use node::{InitFn, InitFuture, Node, NodeId};

use crate::host::Connection;
use crate::protocol::Message;
use std::sync::Arc;

/// Observer of node lifecycle events.
///
/// Implemented by the client core. Both callbacks run with the manager's
/// lock held, so implementations must stay cheap and must not call back
/// into the manager.
pub trait NodeEvents<M: Message>: Send + Sync + 'static {
    /// A connection to `node` was established, before it is made available
    /// for sending.
    ///
    /// Fired at most once per successful connect, and never after
    /// [`EndpointManager::unregister`] has returned `true` for the node.
    fn on_node_connected(&self, node: &Arc<Node<M>>, conn: &Arc<Connection<M>>);

    /// The connection to `node` finished initialization and has been
    /// recorded; it is now eligible to carry requests.
    fn on_node_available(&self, node: &Arc<Node<M>>, conn: &Arc<Connection<M>>);
}

// Made with Bob
