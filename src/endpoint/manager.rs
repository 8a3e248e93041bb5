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

//! The endpoint manager and its per-node connect loop.

use crate::config::BackoffWindow;
use crate::endpoint::{InitFn, Node, NodeEvents, NodeId};
use crate::host::{Connection, ConnectionEvents, ConnectionHost, ConnectionId};
use crate::protocol::Message;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

struct Inner<M: Message> {
    nodes: HashMap<NodeId, Arc<Node<M>>>,
    connections: HashMap<NodeId, Arc<Connection<M>>>,
    index: HashMap<ConnectionId, NodeId>,
}

struct Handlers<M: Message> {
    nodes: Weak<dyn NodeEvents<M>>,
    connections: Weak<dyn ConnectionEvents<M>>,
}

/// Supervises the set of registered endpoints and their connections.
///
/// The node and connection maps are mutated only under one exclusive
/// lock; registration, unregistration, and connect-loop publication all
/// serialize on it, which is what makes "no events after unregister"
/// airtight. The manager holds only weak references to its event
/// handlers, so the client core that owns the manager can be dropped
/// without leaking the cyclic half of the object graph.
pub struct EndpointManager<M: Message> {
    host: Arc<dyn ConnectionHost<M>>,
    connect_backoff: BackoffWindow,
    reconnect_backoff: BackoffWindow,
    next_node_id: AtomicI32,
    inner: Mutex<Inner<M>>,
    handlers: RwLock<Option<Handlers<M>>>,
}

impl<M: Message> EndpointManager<M> {
    /// Creates a manager dialing through `host`.
    pub fn new(
        host: Arc<dyn ConnectionHost<M>>,
        connect_backoff: BackoffWindow,
        reconnect_backoff: BackoffWindow,
    ) -> Arc<Self> {
        Arc::new(Self {
            host,
            connect_backoff,
            reconnect_backoff,
            next_node_id: AtomicI32::new(1),
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
                connections: HashMap::new(),
                index: HashMap::new(),
            }),
            handlers: RwLock::new(None),
        })
    }

    /// Installs the event handlers.
    ///
    /// Must be called once before the first registration. Handlers are held
    /// weakly; once they drop, in-flight connect loops stop on their next
    /// suspension point.
    pub fn bind(&self, nodes: Weak<dyn NodeEvents<M>>, connections: Weak<dyn ConnectionEvents<M>>) {
        *self.handlers.write() = Some(Handlers { nodes, connections });
    }

    /// Registers a named endpoint and starts its connect loop.
    ///
    /// Returns `false` without side effect if a node with the same name is
    /// already active.
    pub fn try_register(
        self: &Arc<Self>,
        name: &str,
        endpoint: &str,
        init: Option<InitFn<M>>,
    ) -> bool {
        let node = {
            let mut inner = self.inner.lock();
            if inner.nodes.values().any(|node| node.name() == name) {
                return false;
            }
            let id = NodeId::from_i32(self.next_node_id.fetch_add(1, Ordering::Relaxed));
            let node = Node::new(id, name, endpoint, init);
            inner.nodes.insert(id, node.clone());
            node
        };

        info!(node = %node.id(), name, endpoint, "endpoint registered");
        self.spawn_connect(node, None);
        true
    }

    /// Unregisters the named endpoint.
    ///
    /// Returns `true` iff a node was removed; its connection, if any, is
    /// disconnected. After this returns `true`, no further node events
    /// fire for that node id even if a connect was in flight.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let Some(id) = inner
                .nodes
                .iter()
                .find(|(_, node)| node.name() == name)
                .map(|(id, _)| *id)
            else {
                return false;
            };
            inner.nodes.remove(&id);
            (id, inner.connections.remove(&id))
        };

        info!(node = %removed.0, name, "endpoint unregistered");
        if let Some(conn) = removed.1 {
            conn.begin_disconnect(None);
        }
        true
    }

    /// Unregisters every endpoint, disconnecting all live connections.
    pub fn unregister_all(&self) {
        let connections = {
            let mut inner = self.inner.lock();
            inner.nodes.clear();
            inner.connections.drain().map(|(_, conn)| conn).collect::<Vec<_>>()
        };
        for conn in connections {
            conn.begin_disconnect(None);
        }
    }

    /// Returns the `(name, endpoint)` pairs of all active nodes.
    pub fn all_endpoints(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .nodes
            .values()
            .map(|node| (node.name().to_string(), node.endpoint().to_string()))
            .collect()
    }

    /// Returns the number of live, published connections.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Reacts to a connection loss reported by the client core.
    ///
    /// Removes the connection record and, if the owning node is still
    /// active, schedules a reconnect after a fresh draw from the
    /// post-disconnect backoff window.
    pub fn connection_lost(self: &Arc<Self>, conn: &Arc<Connection<M>>) {
        let node = {
            let mut inner = self.inner.lock();
            let Some(node_id) = inner.index.remove(&conn.id()) else {
                return;
            };
            if inner
                .connections
                .get(&node_id)
                .is_some_and(|current| current.id() == conn.id())
            {
                inner.connections.remove(&node_id);
            }
            inner.nodes.get(&node_id).cloned()
        };

        if let Some(node) = node {
            let delay = self.reconnect_backoff.draw();
            debug!(node = %node.id(), conn = %conn.id(), ?delay, "scheduling reconnect");
            self.spawn_connect(node, Some(delay));
        }
    }

    fn is_active(&self, id: NodeId) -> bool {
        self.inner.lock().nodes.contains_key(&id)
    }

    fn handlers(&self) -> Option<(Arc<dyn NodeEvents<M>>, Arc<dyn ConnectionEvents<M>>)> {
        let guard = self.handlers.read();
        let handlers = guard.as_ref()?;
        Some((handlers.nodes.upgrade()?, handlers.connections.upgrade()?))
    }

    fn spawn_connect(self: &Arc<Self>, node: Arc<Node<M>>, delay: Option<Duration>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            manager.run_connect(node).await;
        });
    }

    /// One pass of the per-node connect loop.
    ///
    /// Retries failed dials with fresh cold-connect delays until the node
    /// goes inactive or a connection is published. Reconnects after a
    /// disconnect re-enter through [`connection_lost`](Self::connection_lost).
    async fn run_connect(self: Arc<Self>, node: Arc<Node<M>>) {
        loop {
            if !self.is_active(node.id()) {
                return;
            }
            let Some((node_events, conn_events)) = self.handlers() else {
                return;
            };

            let conn = match self.host.connect(node.endpoint(), conn_events).await {
                Err(error) => {
                    if !self.is_active(node.id()) {
                        return;
                    }
                    let delay = self.connect_backoff.draw();
                    warn!(node = %node.id(), name = node.name(), %error, ?delay, "connect failed");
                    sleep(delay).await;
                    continue;
                }
                Ok(conn) => conn,
            };

            {
                let mut inner = self.inner.lock();
                if !inner.nodes.contains_key(&node.id()) {
                    drop(inner);
                    conn.begin_disconnect(None);
                    return;
                }
                inner.index.insert(conn.id(), node.id());
                node_events.on_node_connected(&node, &conn);
            }

            if let Some(init) = node.init() {
                if let Err(error) = init(conn.clone()).await {
                    warn!(node = %node.id(), %error, "endpoint initialization failed");
                    conn.begin_disconnect(Some(error));
                    return;
                }
            }

            let published = {
                let mut inner = self.inner.lock();
                if inner.nodes.contains_key(&node.id()) {
                    inner.connections.insert(node.id(), conn.clone());
                    node_events.on_node_available(&node, &conn);
                    true
                } else {
                    false
                }
            };

            if published {
                debug!(node = %node.id(), conn = %conn.id(), "endpoint available");
            } else {
                conn.begin_disconnect(None);
            }
            return;
        }
    }
}

impl<M: Message> std::fmt::Debug for EndpointManager<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EndpointManager")
            .field("nodes", &inner.nodes.len())
            .field("connections", &inner.connections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryHost, TransportError};
    use crate::request::{Request, SequenceId};
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    #[derive(Debug)]
    struct TestMessage(SequenceId);

    impl Message for TestMessage {
        fn sequence_id(&self) -> SequenceId {
            self.0
        }
    }

    #[derive(Default)]
    struct Recorder {
        connected: AtomicUsize,
        available: AtomicUsize,
        disconnected: AtomicUsize,
        notify: tokio::sync::Notify,
    }

    impl Recorder {
        async fn wait_for(&self, mut ready: impl FnMut(&Self) -> bool) {
            timeout(Duration::from_secs(2), async {
                while !ready(self) {
                    self.notify.notified().await;
                }
            })
            .await
            .expect("condition should be reached");
        }
    }

    impl NodeEvents<TestMessage> for Recorder {
        fn on_node_connected(&self, _node: &Arc<Node<TestMessage>>, _conn: &Arc<Connection<TestMessage>>) {
            self.connected.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
        fn on_node_available(&self, _node: &Arc<Node<TestMessage>>, _conn: &Arc<Connection<TestMessage>>) {
            self.available.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    impl ConnectionEvents<TestMessage> for Recorder {
        fn on_connected(&self, conn: &Arc<Connection<TestMessage>>) {
            conn.begin_receive();
        }
        fn on_start_sending(
            &self,
            _conn: &Arc<Connection<TestMessage>>,
            _request: &Arc<Request<TestMessage>>,
        ) {
        }
        fn on_send_complete(
            &self,
            _conn: &Arc<Connection<TestMessage>>,
            _request: &Arc<Request<TestMessage>>,
            _ok: bool,
        ) {
        }
        fn on_message_received(
            &self,
            _conn: &Arc<Connection<TestMessage>>,
            buffer: &[u8],
        ) -> usize {
            buffer.len()
        }
        fn on_disconnected(
            &self,
            _conn: &Arc<Connection<TestMessage>>,
            _error: Option<TransportError>,
        ) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    fn fast_backoff() -> BackoffWindow {
        BackoffWindow::new(Duration::from_millis(1), Duration::from_millis(5))
    }

    fn manager_with(
        host: Arc<MemoryHost<TestMessage>>,
        recorder: &Arc<Recorder>,
    ) -> Arc<EndpointManager<TestMessage>> {
        let manager = EndpointManager::new(host, fast_backoff(), fast_backoff());
        let nodes_arc: Arc<dyn NodeEvents<TestMessage>> = recorder.clone();
        let nodes: Weak<dyn NodeEvents<TestMessage>> = Arc::downgrade(&nodes_arc);
        let connections_arc: Arc<dyn ConnectionEvents<TestMessage>> = recorder.clone();
        let connections: Weak<dyn ConnectionEvents<TestMessage>> = Arc::downgrade(&connections_arc);
        manager.bind(nodes, connections);
        manager
    }

    #[tokio::test]
    async fn test_register_connects_and_publishes() {
        let host = MemoryHost::new();
        let recorder = Arc::new(Recorder::default());
        let manager = manager_with(host.clone(), &recorder);

        assert!(manager.try_register("alpha", "node-a", None));
        recorder.wait_for(|r| r.available.load(Ordering::SeqCst) == 1).await;

        assert_eq!(recorder.connected.load(Ordering::SeqCst), 1);
        assert_eq!(manager.connection_count(), 1);
        let peer = host.accept().await.unwrap();
        assert_eq!(peer.address(), "node-a");
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let host = MemoryHost::new();
        let recorder = Arc::new(Recorder::default());
        let manager = manager_with(host, &recorder);

        assert!(manager.try_register("alpha", "node-a", None));
        assert!(!manager.try_register("alpha", "node-b", None));
        assert_eq!(manager.all_endpoints().len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_disconnects() {
        let host = MemoryHost::new();
        let recorder = Arc::new(Recorder::default());
        let manager = manager_with(host.clone(), &recorder);

        assert!(manager.try_register("alpha", "node-a", None));
        recorder.wait_for(|r| r.available.load(Ordering::SeqCst) == 1).await;
        let peer = host.accept().await.unwrap();

        assert!(manager.unregister("alpha"));
        assert!(!manager.unregister("alpha"));
        recorder.wait_for(|r| r.disconnected.load(Ordering::SeqCst) == 1).await;
        assert!(peer.connection().is_disconnected());
        assert!(manager.all_endpoints().is_empty());

        // The same name can register again afterwards.
        assert!(manager.try_register("alpha", "node-a", None));
    }

    #[tokio::test]
    async fn test_connect_retries_until_host_available() {
        let host = MemoryHost::new();
        host.set_offline(true);
        let recorder = Arc::new(Recorder::default());
        let manager = manager_with(host.clone(), &recorder);

        assert!(manager.try_register("alpha", "node-a", None));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(recorder.connected.load(Ordering::SeqCst), 0);

        host.set_offline(false);
        recorder.wait_for(|r| r.available.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_no_events_after_unregister() {
        let host = MemoryHost::new();
        host.set_offline(true);
        let recorder = Arc::new(Recorder::default());
        let manager = manager_with(host.clone(), &recorder);

        assert!(manager.try_register("alpha", "node-a", None));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(manager.unregister("alpha"));

        // The retry loop may still be sleeping; once the host comes back it
        // must notice the node is gone and stop without connecting.
        host.set_offline(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.connected.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.available.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reconnect_after_peer_drop() {
        let host = MemoryHost::new();
        let recorder = Arc::new(Recorder::default());
        let manager = manager_with(host.clone(), &recorder);

        assert!(manager.try_register("alpha", "node-a", None));
        recorder.wait_for(|r| r.available.load(Ordering::SeqCst) == 1).await;
        let peer = host.accept().await.unwrap();

        peer.disconnect();
        recorder.wait_for(|r| r.disconnected.load(Ordering::SeqCst) == 1).await;
        manager.connection_lost(peer.connection());

        recorder.wait_for(|r| r.available.load(Ordering::SeqCst) == 2).await;
        let replacement = host.accept().await.unwrap();
        assert_ne!(replacement.connection().id(), peer.connection().id());
        assert_eq!(manager.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_disconnects_without_publishing() {
        let host = MemoryHost::new();
        let recorder = Arc::new(Recorder::default());
        let manager = manager_with(host.clone(), &recorder);

        let init: InitFn<TestMessage> = Arc::new(|_conn| {
            Box::pin(async {
                Err(TransportError::InitFailed {
                    reason: "handshake rejected".to_string(),
                })
            })
        });
        assert!(manager.try_register("alpha", "node-a", Some(init)));

        recorder.wait_for(|r| r.disconnected.load(Ordering::SeqCst) == 1).await;
        assert_eq!(recorder.connected.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.available.load(Ordering::SeqCst), 0);
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_init_runs_before_available() {
        let host = MemoryHost::new();
        let recorder = Arc::new(Recorder::default());
        let manager = manager_with(host.clone(), &recorder);

        let init_ran = Arc::new(AtomicUsize::new(0));
        let init_ran_probe = init_ran.clone();
        let init: InitFn<TestMessage> = Arc::new(move |_conn| {
            let init_ran = init_ran_probe.clone();
            Box::pin(async move {
                init_ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });
        assert!(manager.try_register("alpha", "node-a", Some(init)));

        recorder.wait_for(|r| r.available.load(Ordering::SeqCst) == 1).await;
        assert_eq!(init_ran.load(Ordering::SeqCst), 1);
    }
}

// Made with Bob
