// Copyright 2025, The Peermesh Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, RwLock},
    task::{Context, Poll},
};

use chrono::{DateTime, Utc};
use futures::{
    channel::oneshot,
    future::{FusedFuture, Shared},
    FutureExt,
};

use crate::{
    connection::{ConnectionId, PeerConnection},
    identity::NodeId,
};

/// What we know about a peer's support for the identify push protocol. `Unknown` only while the
/// first identify on the connection is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSupport {
    Unknown,
    Supported,
    Unsupported,
}

/// Completion latch for a connection's first identify exchange.
///
/// The registry stores one clone in the connection entry and hands another to the task driving
/// the exchange; whichever outcome the task reaches, it resolves the latch once. If every clone
/// is dropped unresolved (the connection closed before identify could run) the signals resolve
/// anyway, so no waiter is left hanging.
#[derive(Debug, Clone)]
pub(super) struct WaitLatch {
    sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    signal: IdentifySignal,
}

impl WaitLatch {
    fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            sender: Arc::new(Mutex::new(Some(tx))),
            signal: IdentifySignal { inner: rx.shared() },
        }
    }

    /// A latch that has already resolved, handed out for connections that are gone.
    fn resolved() -> Self {
        let latch = Self::new();
        latch.resolve();
        latch
    }

    /// Resolves the latch. Repeated calls have no effect.
    pub fn resolve(&self) {
        if let Some(tx) = self.sender.lock().unwrap().take() {
            let _result = tx.send(());
        }
    }

    pub fn signal(&self) -> IdentifySignal {
        self.signal.clone()
    }
}

/// Shared signal that resolves when the first identify exchange on a connection finishes, in
/// success or failure, or when the connection goes away before the exchange could run. Cheap to
/// clone; all clones resolve together.
#[derive(Debug, Clone)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct IdentifySignal {
    inner: Shared<oneshot::Receiver<()>>,
}

impl Future for IdentifySignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Latch on terminated so an already-resolved signal can be awaited again safely
        if self.inner.is_terminated() {
            return Poll::Ready(());
        }
        // Ok is an explicit resolve, Err means the latch was abandoned; both complete the wait
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedFuture for IdentifySignal {
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

struct ConnectionEntry {
    connection: PeerConnection,
    /// Created on the first wait; resolved exactly once when the identify attempt finishes.
    wait: Option<WaitLatch>,
    push_support: PushSupport,
    /// Timestamp of the last snapshot pushed to this connection
    last_pushed: Option<DateTime<Utc>>,
}

/// Tracks identify state for every open connection.
///
/// An entry exists iff the swarm considers the connection open: inserted on the `PeerConnected`
/// notification (which the transport delivers before any substream activity) and removed on
/// `PeerDisconnected`.
#[derive(Clone)]
pub(super) struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<ConnectionId, ConnectionEntry>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn insert(&self, connection: PeerConnection) {
        self.inner.write().unwrap().insert(connection.id(), ConnectionEntry {
            connection,
            wait: None,
            push_support: PushSupport::Unknown,
            last_pushed: None,
        });
    }

    /// Removes the entry. An unresolved wait latch is dropped with it, which resolves any
    /// waiters once the identify task lets go of its clone.
    pub fn remove(&self, conn_id: ConnectionId) -> Option<PeerConnection> {
        self.inner.write().unwrap().remove(&conn_id).map(|e| e.connection)
    }

    /// Returns the connection's wait signal, creating the latch on the first call.
    ///
    /// When this call created the latch the caller must run the identify exchange and resolve
    /// the returned latch; the connection handle rides along for that purpose. If no entry
    /// exists the connection is presumed closed and an already-resolved signal is returned.
    pub fn get_or_create_wait(&self, conn_id: ConnectionId) -> (IdentifySignal, Option<(WaitLatch, PeerConnection)>) {
        let mut lock = self.inner.write().unwrap();
        let Some(entry) = lock.get_mut(&conn_id) else {
            return (WaitLatch::resolved().signal(), None);
        };

        if let Some(wait) = entry.wait.as_ref() {
            return (wait.signal(), None);
        }

        let latch = WaitLatch::new();
        entry.wait = Some(latch.clone());
        let signal = latch.signal();
        let connection = entry.connection.clone();
        (signal, Some((latch, connection)))
    }

    pub fn set_push_support(&self, conn_id: ConnectionId, support: PushSupport) {
        if let Some(entry) = self.inner.write().unwrap().get_mut(&conn_id) {
            entry.push_support = support;
        }
    }

    pub fn set_last_pushed(&self, conn_id: ConnectionId, timestamp: DateTime<Utc>) {
        if let Some(entry) = self.inner.write().unwrap().get_mut(&conn_id) {
            entry.last_pushed = Some(timestamp);
        }
    }

    /// Push-relevant state for a connection, `None` if it has disconnected.
    pub fn push_state(&self, conn_id: ConnectionId) -> Option<(PushSupport, Option<DateTime<Utc>>)> {
        self.inner
            .read()
            .unwrap()
            .get(&conn_id)
            .map(|e| (e.push_support, e.last_pushed))
    }

    /// Snapshot of all live connections.
    pub fn connections(&self) -> Vec<PeerConnection> {
        self.inner
            .read()
            .unwrap()
            .values()
            .map(|e| e.connection.clone())
            .collect()
    }

    pub fn is_peer_connected(&self, node_id: &NodeId) -> bool {
        self.inner
            .read()
            .unwrap()
            .values()
            .any(|e| e.connection.peer_node_id() == node_id)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time;

    use super::*;
    use crate::test_utils::connection::stub_connection_with_id;

    #[test]
    fn wait_latch_is_created_once() {
        let registry = ConnectionRegistry::new();
        let conn = stub_connection_with_id(1);
        registry.insert(conn.clone());

        let (_signal, created) = registry.get_or_create_wait(conn.id());
        assert!(created.is_some());
        let (_signal, created_again) = registry.get_or_create_wait(conn.id());
        assert!(created_again.is_none());
    }

    #[tokio::test]
    async fn missing_entry_yields_resolved_signal() {
        let registry = ConnectionRegistry::new();
        let (signal, created) = registry.get_or_create_wait(ConnectionId::new(99));
        assert!(created.is_none());
        time::timeout(Duration::from_secs(1), signal)
            .await
            .expect("signal for an unknown connection must already be resolved");
    }

    #[tokio::test]
    async fn latch_resolves_exactly_once() {
        let registry = ConnectionRegistry::new();
        let conn = stub_connection_with_id(2);
        registry.insert(conn.clone());

        let (signal, created) = registry.get_or_create_wait(conn.id());
        let (latch, _conn) = created.unwrap();
        latch.resolve();
        latch.resolve();
        signal.await;

        // Later waiters see the same resolved latch
        let (signal, created) = registry.get_or_create_wait(conn.id());
        assert!(created.is_none());
        signal.await;
    }

    #[tokio::test]
    async fn removing_entry_resolves_pending_waiters() {
        let registry = ConnectionRegistry::new();
        let conn = stub_connection_with_id(7);
        registry.insert(conn.clone());

        let (signal, created) = registry.get_or_create_wait(conn.id());
        registry.remove(conn.id());
        // The identify task abandons its latch without resolving; waiters still complete
        drop(created);
        time::timeout(Duration::from_secs(1), signal)
            .await
            .expect("abandoned latch must resolve its waiters");
    }

    #[test]
    fn push_state_tracks_support_and_timestamp() {
        let registry = ConnectionRegistry::new();
        let conn = stub_connection_with_id(3);
        registry.insert(conn.clone());

        assert_eq!(registry.push_state(conn.id()), Some((PushSupport::Unknown, None)));
        registry.set_push_support(conn.id(), PushSupport::Supported);
        let ts = Utc::now();
        registry.set_last_pushed(conn.id(), ts);
        assert_eq!(registry.push_state(conn.id()), Some((PushSupport::Supported, Some(ts))));
        assert!(registry.is_peer_connected(conn.peer_node_id()));
    }
}
