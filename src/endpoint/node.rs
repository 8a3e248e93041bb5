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

//! Node records for registered endpoints.

use crate::host::{Connection, TransportError};
use crate::protocol::Message;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// A unique identifier for a registered node.
///
/// Node ids are client-wide monotonic; a name that is unregistered and
/// registered again yields a fresh id, which is how late events from a
/// previous registration are told apart from the current one.
///
/// # Examples
///
/// ```rust
/// use plexrpc::NodeId;
///
/// let id = NodeId::from_i32(7);
/// assert_eq!(id.as_i32(), 7);
/// assert_eq!(format!("{}", id), "Node(7)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(i32);

impl NodeId {
    /// Returns the id as an `i32`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Creates an id from a raw value.
    #[must_use]
    pub const fn from_i32(value: i32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Future returned by a node initialization function.
pub type InitFuture = BoxFuture<'static, Result<(), TransportError>>;

/// Optional per-node initialization handshake.
///
/// Invoked with each freshly established connection before the connection
/// is published to the pool; a failure disconnects the connection and the
/// node reconnects after a backoff delay.
pub type InitFn<M> = Arc<dyn Fn(Arc<Connection<M>>) -> InitFuture + Send + Sync>;

/// A named registration of a remote endpoint.
///
/// A node is *active* while it is present in the endpoint manager's node
/// map; its per-node reconnect loop checks activity at every suspension
/// point and stops silently once the node is unregistered.
pub struct Node<M: Message> {
    id: NodeId,
    name: String,
    endpoint: String,
    init: Option<InitFn<M>>,
}

impl<M: Message> Node<M> {
    pub(crate) fn new(
        id: NodeId,
        name: impl Into<String>,
        endpoint: impl Into<String>,
        init: Option<InitFn<M>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            endpoint: endpoint.into(),
            init,
        })
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the unique node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the remote endpoint address.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the initialization function, if any.
    #[must_use]
    pub fn init(&self) -> Option<&InitFn<M>> {
        self.init.as_ref()
    }
}

impl<M: Message> std::fmt::Debug for Node<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("has_init", &self.init.is_some())
            .finish()
    }
}


// Made with Bob
