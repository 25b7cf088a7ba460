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
    convert::TryFrom,
    sync::{Arc, Mutex},
};

use futures::{stream::FuturesUnordered, StreamExt};
use log::*;
use multiaddr::{Multiaddr, Protocol};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc, Semaphore},
    task::JoinHandle,
    time,
};

use super::{
    codec,
    registry::{ConnectionRegistry, WaitLatch},
    requester::IdentifyRequest,
    snapshot::{IdentifySnapshot, SnapshotStore},
    IdentifyConfig,
    IdentifyError,
    IdentifyEvent,
    IdentifyEventTx,
    IdentifyRequester,
    ObservedAddrManager,
    PushSupport,
    IDENTIFY_PROTOCOL,
    IDENTIFY_PUSH_PROTOCOL,
};
use crate::{
    connection::{ConnectionId, ConnectivityEvent, ConnectivityEventRx, PeerConnection, Substream},
    event::LocalNodeEventRx,
    identity::{NodeId, NodeIdentity, SignedPeerRecord},
    peer_store::{AddressTtl, PeerMetadataKey, PeerStore},
    proto,
    protocol::{protocol_id_from_str, protocol_id_to_string, ProtocolEvent, ProtocolId, ProtocolNotification, Protocols},
    shutdown::{Shutdown, ShutdownSignal},
    types::{NodePublicKey, NODE_PUBLIC_KEY_LENGTH},
};

const LOG_TARGET: &str = "comms::protocol::identify";

/// Buffer size for inbound identify/push substream notifications. These arrive at most a few
/// times per connecting peer, so a small buffer suffices.
const PROTOCOL_EVENTS_BUFFER_SIZE: usize = 30;
/// Buffer size for requests made through the [IdentifyRequester].
const REQUEST_BUFFER_SIZE: usize = 50;
/// Buffer size for the identify event broadcast channel.
const EVENT_BUFFER_SIZE: usize = 64;

/// The identify service engine.
///
/// Owns the per-connection identify state, the local identity snapshot and the push machinery.
/// Constructed with [new](Self::new), driven by [spawn](Self::spawn)ing its main loop.
pub struct IdentifyService {
    context: IdentifyContext,
    request_rx: mpsc::Receiver<IdentifyRequest>,
    proto_rx: mpsc::Receiver<ProtocolNotification>,
    connectivity_events: ConnectivityEventRx,
    local_events: LocalNodeEventRx,
    complete_trigger: Shutdown,
}

impl IdentifyService {
    /// Creates the service and registers its protocols with the given registry. The initial
    /// snapshot is taken immediately, so the snapshot is never empty once this returns.
    pub fn new(
        config: IdentifyConfig,
        node_identity: Arc<NodeIdentity>,
        peer_store: PeerStore,
        protocols: &Protocols,
        connectivity_events: ConnectivityEventRx,
        local_events: LocalNodeEventRx,
        shutdown_signal: ShutdownSignal,
    ) -> (Self, IdentifyRequester) {
        let (proto_tx, proto_rx) = mpsc::channel(PROTOCOL_EVENTS_BUFFER_SIZE);
        protocols.add(&[IDENTIFY_PROTOCOL, IDENTIFY_PUSH_PROTOCOL], &proto_tx);

        let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER_SIZE);
        let (event_tx, _) = tokio::sync::broadcast::channel(EVENT_BUFFER_SIZE);

        let snapshots = SnapshotStore::new(
            node_identity.clone(),
            protocols.clone(),
            peer_store.clone(),
            config.enable_signed_peer_records,
        );

        let context = IdentifyContext {
            config: Arc::new(config),
            node_identity,
            peer_store,
            snapshots,
            registry: ConnectionRegistry::new(),
            observed_addrs: Arc::new(ObservedAddrManager::new()),
            addr_lock: Arc::new(Mutex::new(())),
            push_semaphore: Arc::new(Semaphore::new(1)),
            event_tx: event_tx.clone(),
            shutdown_signal,
        };

        let requester = IdentifyRequester::new(request_tx, event_tx);
        let service = Self {
            context,
            request_rx,
            proto_rx,
            connectivity_events,
            local_events,
            complete_trigger: Shutdown::new(),
        };
        (service, requester)
    }

    /// A signal that resolves once the main loop and all background tasks have drained.
    pub fn complete_signal(&self) -> ShutdownSignal {
        self.complete_trigger.to_signal()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        debug!(target: LOG_TARGET, "Identify service started");
        self.context.snapshots.refresh();

        // Pushes run on their own task so that a busy push cycle never blocks this loop; the
        // depth-1 trigger coalesces bursts of local changes into at most one queued cycle.
        let (push_tx, push_rx) = mpsc::channel::<()>(1);
        let push_worker = tokio::spawn(self.context.clone().run_push_worker(push_rx));

        let mut active_tasks = FuturesUnordered::<JoinHandle<()>>::new();
        let mut shutdown_signal = self.context.shutdown_signal.clone();
        let mut connectivity_open = true;
        let mut local_events_open = true;

        loop {
            tokio::select! {
                Some(request) = self.request_rx.recv() => {
                    self.handle_request(request, &mut active_tasks);
                },

                Some(notification) = self.proto_rx.recv() => {
                    self.handle_protocol_notification(notification, &mut active_tasks);
                },

                event = self.connectivity_events.recv(), if connectivity_open => match event {
                    Ok(ConnectivityEvent::PeerConnected(conn)) => {
                        self.handle_connected(*conn, &mut active_tasks);
                    },
                    Ok(ConnectivityEvent::PeerDisconnected(conn_id, node_id)) => {
                        self.handle_disconnected(conn_id, node_id);
                    },
                    Err(RecvError::Lagged(n)) => {
                        warn!(target: LOG_TARGET, "Identify service lagged behind {} connectivity event(s)", n);
                    },
                    Err(RecvError::Closed) => {
                        debug!(target: LOG_TARGET, "Connectivity event stream closed");
                        connectivity_open = false;
                    },
                },

                event = self.local_events.recv(), if local_events_open => match event {
                    Ok(event) => {
                        debug!(target: LOG_TARGET, "Local node state changed ({})", event);
                        self.context.snapshots.refresh();
                        // Full trigger means a cycle is already queued behind the in-flight one
                        let _result = push_tx.try_send(());
                    },
                    Err(RecvError::Lagged(n)) => {
                        warn!(target: LOG_TARGET, "Identify service lagged behind {} local event(s)", n);
                        self.context.snapshots.refresh();
                        let _result = push_tx.try_send(());
                    },
                    Err(RecvError::Closed) => {
                        debug!(target: LOG_TARGET, "Local node event stream closed");
                        local_events_open = false;
                    },
                },

                Some(_) = active_tasks.next(), if !active_tasks.is_empty() => {},

                _ = shutdown_signal.wait() => {
                    debug!(target: LOG_TARGET, "Identify service shutting down because the shutdown signal was triggered");
                    break;
                },
            }
        }

        self.context.observed_addrs.close();
        drop(push_tx);
        while active_tasks.next().await.is_some() {}
        let _result = push_worker.await;
        self.complete_trigger.trigger();
        debug!(target: LOG_TARGET, "Identify service stopped");
    }

    fn handle_request(&mut self, request: IdentifyRequest, active_tasks: &mut FuturesUnordered<JoinHandle<()>>) {
        match request {
            IdentifyRequest::WaitIdentified { conn_id, reply_tx } => {
                let signal = self.start_identify(conn_id, active_tasks);
                let _result = reply_tx.send(signal);
            },
            IdentifyRequest::GetOwnObservedAddrs(reply_tx) => {
                let _result = reply_tx.send(self.context.observed_addrs.addrs());
            },
            IdentifyRequest::GetObservedAddrsFor { local, reply_tx } => {
                let _result = reply_tx.send(self.context.observed_addrs.addrs_for(&local));
            },
        }
    }

    /// First-waiter algorithm: the call that creates the wait latch also spawns the one and only
    /// outbound identify for the connection.
    fn start_identify(
        &self,
        conn_id: ConnectionId,
        active_tasks: &mut FuturesUnordered<JoinHandle<()>>,
    ) -> super::IdentifySignal {
        let (signal, created) = self.context.registry.get_or_create_wait(conn_id);
        if let Some((latch, conn)) = created {
            debug!(
                target: LOG_TARGET,
                "Starting identify on connection {} to peer '{}'",
                conn.id(),
                conn.peer_node_id().short_str()
            );
            active_tasks.push(tokio::spawn(self.context.clone().run_identify(conn, latch)));
        }
        signal
    }

    fn handle_connected(&self, conn: PeerConnection, active_tasks: &mut FuturesUnordered<JoinHandle<()>>) {
        debug!(target: LOG_TARGET, "Connected: {}", conn);
        let conn_id = conn.id();
        self.context.registry.insert(conn);
        // Identification starts eagerly on connect; nothing waits on the signal here
        let _signal = self.start_identify(conn_id, active_tasks);
    }

    fn handle_disconnected(&self, conn_id: ConnectionId, node_id: NodeId) {
        debug!(
            target: LOG_TARGET,
            "Disconnected: connection {} to peer '{}'",
            conn_id,
            node_id.short_str()
        );
        self.context.registry.remove(conn_id);
        self.context.observed_addrs.remove_connection(conn_id);

        if !self.context.registry.is_peer_connected(&node_id) {
            // Last connection to the peer: undo the connected-class TTL. The lock serializes this
            // against an in-flight message consume for the same peer.
            let _guard = self.context.addr_lock.lock().unwrap();
            self.context.peer_store.update_address_ttl(
                &node_id,
                AddressTtl::Connected,
                Some(AddressTtl::RecentlyConnected),
            );
        }
    }

    fn handle_protocol_notification(
        &self,
        notification: ProtocolNotification,
        active_tasks: &mut FuturesUnordered<JoinHandle<()>>,
    ) {
        let ProtocolNotification { protocol, event } = notification;
        match event {
            ProtocolEvent::NewInboundSubstream(conn, substream) => {
                debug!(
                    target: LOG_TARGET,
                    "New inbound substream for protocol '{}' from peer '{}'",
                    protocol_id_to_string(&protocol),
                    conn.peer_node_id().short_str()
                );
                active_tasks.push(tokio::spawn(self.context.clone().handle_inbound_substream(
                    protocol,
                    *conn,
                    substream,
                )));
            },
        }
    }
}

/// Cloneable bundle of the shared state needed by the service's background tasks.
#[derive(Clone)]
struct IdentifyContext {
    config: Arc<IdentifyConfig>,
    node_identity: Arc<NodeIdentity>,
    peer_store: PeerStore,
    snapshots: SnapshotStore,
    registry: ConnectionRegistry,
    observed_addrs: Arc<ObservedAddrManager>,
    /// Serializes the multi-step TTL dance in the consumer against the disconnect downgrade
    addr_lock: Arc<Mutex<()>>,
    /// Capacity 1: at most one push cycle at a time
    push_semaphore: Arc<Semaphore>,
    event_tx: IdentifyEventTx,
    shutdown_signal: ShutdownSignal,
}

impl IdentifyContext {
    /// Drives the one-shot outbound identify for a connection, resolving the wait latch exactly
    /// once whatever the outcome.
    async fn run_identify(self, conn: PeerConnection, latch: WaitLatch) {
        let peer = conn.peer_node_id().clone();
        let mut shutdown_signal = self.shutdown_signal.clone();
        let result = tokio::select! {
            _ = shutdown_signal.wait() => Err(IdentifyError::ServiceShutdown),
            result = self.identify_connection(&conn) => result,
        };

        match result {
            Ok(_) => {
                debug!(target: LOG_TARGET, "Identified peer '{}'", peer.short_str());
                let _result = self.event_tx.send(IdentifyEvent::IdentificationCompleted(peer));
            },
            // Cancellation is not an identification failure
            Err(IdentifyError::ServiceShutdown) => {
                debug!(
                    target: LOG_TARGET,
                    "Identify for peer '{}' cancelled by shutdown",
                    peer.short_str()
                );
            },
            Err(err) => {
                warn!(target: LOG_TARGET, "Failed to identify peer '{}': {}", peer.short_str(), err);
                let _result = self.event_tx.send(IdentifyEvent::IdentificationFailed(peer, err));
            },
        }

        latch.resolve();
    }

    async fn identify_connection(&self, conn: &PeerConnection) -> Result<(), IdentifyError> {
        // Transient: an identify in progress must not count against the connection's stream limits
        let mut stream = conn.open_transient_substream(&IDENTIFY_PROTOCOL).await?;
        self.read_and_consume(conn, &mut stream, false).await
    }

    /// Shared read path for the outbound identify response and inbound pushes.
    async fn read_and_consume(
        &self,
        conn: &PeerConnection,
        stream: &mut Substream,
        is_push: bool,
    ) -> Result<(), IdentifyError> {
        // Reserve the frame buffer budget with the transport before reading anything; held until
        // the message has been consumed
        let _reservation = conn.reserve_memory(codec::MAX_FRAME_SIZE).await?;
        let msg = time::timeout(self.config.stream_read_timeout, codec::read_identify_message(stream))
            .await
            .map_err(|_| IdentifyError::Timeout)??;
        self.consume_message(msg, conn, is_push);
        self.update_push_support(conn);
        Ok(())
    }

    /// Records whether the peer speaks the push protocol, once its protocol list is in the store.
    fn update_push_support(&self, conn: &PeerConnection) {
        let support = if self.peer_store.supports_protocol(conn.peer_node_id(), &IDENTIFY_PUSH_PROTOCOL) {
            PushSupport::Supported
        } else {
            PushSupport::Unsupported
        };
        self.registry.set_push_support(conn.id(), support);
    }

    /// Handles an inbound identify-family substream, honouring shutdown.
    async fn handle_inbound_substream(self, protocol: ProtocolId, conn: PeerConnection, mut stream: Substream) {
        let mut shutdown_signal = self.shutdown_signal.clone();
        tokio::select! {
            _ = shutdown_signal.wait() => {
                debug!(target: LOG_TARGET, "Inbound substream handling aborted by shutdown");
            },
            _ = self.handle_inbound_substream_inner(&protocol, &conn, &mut stream) => {},
        }
    }

    async fn handle_inbound_substream_inner(&self, protocol: &ProtocolId, conn: &PeerConnection, stream: &mut Substream) {
        if *protocol == IDENTIFY_PROTOCOL {
            // Best-effort send of the current snapshot; a failed send is the remote's problem
            if let Err(err) = self.send_identify_response(conn, stream).await {
                debug!(
                    target: LOG_TARGET,
                    "Failed to send identify response to peer '{}': {}",
                    conn.peer_node_id().short_str(),
                    err
                );
            }
        } else if *protocol == IDENTIFY_PUSH_PROTOCOL {
            if let Err(err) = self.read_and_consume(conn, stream, true).await {
                debug!(
                    target: LOG_TARGET,
                    "Failed to read identify push from peer '{}': {}",
                    conn.peer_node_id().short_str(),
                    err
                );
            }
        } else {
            warn!(
                target: LOG_TARGET,
                "Identify service notified of a substream for unexpected protocol '{}'",
                protocol_id_to_string(protocol)
            );
        }
    }

    async fn send_identify_response(&self, conn: &PeerConnection, stream: &mut Substream) -> Result<(), IdentifyError> {
        let snapshot = self.snapshots.get();
        debug!(
            target: LOG_TARGET,
            "Sending identify ({} protocol(s), {} address(es)) to peer '{}'",
            snapshot.protocols.len(),
            snapshot.addresses.len(),
            conn.peer_node_id().short_str()
        );
        let msg = self.create_identify_msg(&snapshot, conn);
        codec::write_identify_message(stream, msg).await
    }

    /// Builds the outbound identify message for a connection from a snapshot.
    fn create_identify_msg(&self, snapshot: &IdentifySnapshot, conn: &PeerConnection) -> proto::identify::Identify {
        // Loopback listen addresses are useless to a remote peer unless the connection itself
        // runs over loopback
        let via_loopback = is_loopback_address(conn.local_address()) || is_loopback_address(conn.address());
        let listen_addrs = snapshot
            .addresses
            .iter()
            .filter(|addr| via_loopback || !is_loopback_address(addr))
            .map(|addr| addr.to_vec())
            .collect();

        proto::identify::Identify {
            public_key: Some(self.node_identity.public_key().as_bytes().to_vec()),
            listen_addrs,
            protocols: snapshot.protocols.iter().map(protocol_id_to_string).collect(),
            observed_addr: Some(conn.address().to_vec()),
            protocol_version: Some(self.config.protocol_version.clone()),
            agent_version: Some(self.config.user_agent.clone()),
            signed_peer_record: snapshot.record.as_ref().map(|r| r.to_bytes()),
        }
    }

    /// Applies a received identify message to the peer store and observed-address manager.
    fn consume_message(&self, msg: proto::identify::Identify, conn: &PeerConnection, is_push: bool) {
        let peer = conn.peer_node_id();

        // Protocols: replace the stored list and derive the delta
        let new_protocols: Vec<ProtocolId> = msg.protocols.iter().map(|s| protocol_id_from_str(s)).collect();
        let previous = self.peer_store.set_protocols(peer, new_protocols.clone());
        // On the first identify the delta is the peer's entire protocol list, which is not an
        // interesting change event; only pushes report it unless configured otherwise.
        if is_push || self.config.emit_protocol_updates_on_identify {
            let added = new_protocols.iter().filter(|p| !previous.contains(p)).cloned().collect();
            let removed = previous.iter().filter(|p| !new_protocols.contains(p)).cloned().collect();
            let _result = self.event_tx.send(IdentifyEvent::PeerProtocolsUpdated {
                node_id: peer.clone(),
                added,
                removed,
            });
        }

        // Observed address: how this node looks from the remote end
        if let Some(observed) = msg.observed_addr.clone() {
            match Multiaddr::try_from(observed) {
                Ok(addr) => self.observed_addrs.record(conn, addr),
                Err(_) => debug!(
                    target: LOG_TARGET,
                    "Malformed observed address from peer '{}'",
                    peer.short_str()
                ),
            }
        }

        // Listen addresses. The connection's own remote address is deliberately not added: only
        // addresses the peer explicitly advertises are gossiped, otherwise random NAT source
        // ports accumulate network-wide.
        let mut listen_addrs = Vec::with_capacity(msg.listen_addrs.len());
        for bytes in msg.listen_addrs.clone() {
            match Multiaddr::try_from(bytes) {
                Ok(addr) => listen_addrs.push(addr),
                Err(_) => debug!(
                    target: LOG_TARGET,
                    "{} (peer '{}')",
                    IdentifyError::MalformedAddress,
                    peer.short_str()
                ),
            }
        }

        let record = msg.signed_peer_record.as_ref().and_then(|bytes| {
            match SignedPeerRecord::from_bytes(bytes) {
                Ok(record) if record.peer() == peer => Some(record),
                Ok(record) => {
                    error!(
                        target: LOG_TARGET,
                        "Identify message from peer '{}' carried a record bound to peer '{}'",
                        peer.short_str(),
                        record.peer().short_str()
                    );
                    None
                },
                Err(err) => {
                    error!(
                        target: LOG_TARGET,
                        "Error getting peer record from identify message: {}", err
                    );
                    None
                },
            }
        });

        // TTL dance: downgrade everything to the holding class, insert the new address set, then
        // expire whatever the message no longer advertises. The lock keeps a concurrent
        // disconnect downgrade from interleaving.
        {
            let _guard = self.addr_lock.lock().unwrap();
            let ttl = if self.registry.is_peer_connected(peer) {
                AddressTtl::Connected
            } else {
                AddressTtl::RecentlyConnected
            };
            self.peer_store
                .update_address_ttl(peer, AddressTtl::RecentlyConnected, Some(AddressTtl::Temp));
            self.peer_store
                .update_address_ttl(peer, AddressTtl::Connected, Some(AddressTtl::Temp));
            match record {
                // Certified store + signed record: only record-derived addresses are persisted
                Some(record) => {
                    if let Err(err) = self.peer_store.consume_peer_record(record, ttl) {
                        debug!(target: LOG_TARGET, "Error adding signed addresses to peer store: {}", err);
                    }
                },
                None => self.peer_store.add_addresses(peer, listen_addrs, ttl),
            }
            self.peer_store.update_address_ttl(peer, AddressTtl::Temp, None);
        }

        self.peer_store.set_metadata(
            peer,
            PeerMetadataKey::ProtocolVersion,
            msg.protocol_version.clone().unwrap_or_default(),
        );
        self.peer_store.set_metadata(
            peer,
            PeerMetadataKey::AgentVersion,
            msg.agent_version.clone().unwrap_or_default(),
        );

        self.consume_received_public_key(conn, msg.public_key.as_deref());
    }

    /// Verifies the received key against the connection's claimed peer identity before storing.
    /// Anomalies are logged and never overwrite trusted state.
    fn consume_received_public_key(&self, conn: &PeerConnection, key_bytes: Option<&[u8]>) {
        let claimed = conn.peer_node_id();
        let Some(key_bytes) = key_bytes else {
            // No key received; insecure transport assumed
            debug!(
                target: LOG_TARGET,
                "Did not receive a public key for peer '{}'",
                claimed.short_str()
            );
            return;
        };

        let key = match <[u8; NODE_PUBLIC_KEY_LENGTH]>::try_from(key_bytes)
            .ok()
            .and_then(|bytes| NodePublicKey::from_bytes(&bytes).ok())
        {
            Some(key) => key,
            None => {
                warn!(
                    target: LOG_TARGET,
                    "{} (peer '{}')",
                    IdentifyError::MalformedKey,
                    claimed.short_str()
                );
                return;
            },
        };

        let derived = NodeId::from_public_key(&key);
        if derived != *claimed {
            error!(target: LOG_TARGET, "{}", IdentifyError::KeyPeerIdMismatch {
                claimed: claimed.clone(),
                derived,
            });
            return;
        }

        match self.peer_store.public_key(claimed) {
            None => self.peer_store.add_public_key(claimed, key),
            Some(current) if current == key => {},
            // Two different valid keys matching one node id should never happen; keep the first
            Some(_) => {
                error!(target: LOG_TARGET, "{}", IdentifyError::KeyConflict { peer: claimed.clone() });
            },
        }
    }

    /// Push worker: drains the coalescing trigger and runs push cycles until shutdown.
    async fn run_push_worker(self, mut trigger_rx: mpsc::Receiver<()>) {
        let mut shutdown_signal = self.shutdown_signal.clone();
        loop {
            tokio::select! {
                _ = shutdown_signal.wait() => break,
                maybe_trigger = trigger_rx.recv() => match maybe_trigger {
                    Some(_) => self.send_pushes().await,
                    None => break,
                },
            }
        }
        debug!(target: LOG_TARGET, "Identify push worker stopped");
    }

    /// Pushes the current snapshot to every eligible connection, at most
    /// `max_concurrent_pushes` at a time. Returns immediately if a cycle is already in flight.
    async fn send_pushes(&self) {
        let _cycle_permit = match self.push_semaphore.try_acquire() {
            Ok(permit) => permit,
            // Another cycle is running; the queued trigger has been coalesced into it
            Err(_) => return,
        };

        let connections = self.registry.connections();
        let slots = Arc::new(Semaphore::new(self.config.max_concurrent_pushes));
        let mut pushes = FuturesUnordered::<JoinHandle<()>>::new();
        for conn in connections {
            if self.shutdown_signal.is_triggered() {
                break;
            }
            // The connection may have disconnected since the registry snapshot
            let Some((support, last_pushed)) = self.registry.push_state(conn.id()) else {
                continue;
            };
            // Unknown support only holds while the first identify is in flight; push anyway
            if support == PushSupport::Unsupported {
                continue;
            }
            let snapshot = self.snapshots.get();
            if last_pushed.map(|ts| ts >= snapshot.timestamp).unwrap_or(false) {
                debug!(
                    target: LOG_TARGET,
                    "Already sent this snapshot to peer '{}'",
                    conn.peer_node_id().short_str()
                );
                continue;
            }
            // Acquiring the slot here (not inside the task) bounds the number of in-flight
            // pushes; the permit is released when the spawned push completes
            let permit = match slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let context = self.clone();
            pushes.push(tokio::spawn(async move {
                let _permit = permit;
                context.push_to_connection(conn, snapshot).await;
            }));
        }
        while pushes.next().await.is_some() {}
    }

    async fn push_to_connection(&self, conn: PeerConnection, snapshot: Arc<IdentifySnapshot>) {
        let mut shutdown_signal = self.shutdown_signal.clone();
        let push = async {
            let mut stream = conn.open_substream(&IDENTIFY_PUSH_PROTOCOL).await?;
            let msg = self.create_identify_msg(&snapshot, &conn);
            codec::write_identify_message(&mut stream, msg).await?;
            Ok::<_, IdentifyError>(())
        };

        let result = tokio::select! {
            _ = shutdown_signal.wait() => return,
            result = time::timeout(self.config.push_timeout, push) => result,
        };

        match result {
            Ok(Ok(_)) => {
                self.registry.set_last_pushed(conn.id(), snapshot.timestamp);
                debug!(
                    target: LOG_TARGET,
                    "Pushed identify snapshot to peer '{}' on connection {}",
                    conn.peer_node_id().short_str(),
                    conn.id()
                );
            },
            Ok(Err(err)) => {
                // Connection may simply have closed; push is best-effort
                debug!(
                    target: LOG_TARGET,
                    "Failed to push identify snapshot to peer '{}': {}",
                    conn.peer_node_id().short_str(),
                    err
                );
            },
            Err(_) => {
                debug!(
                    target: LOG_TARGET,
                    "Identify push to peer '{}' timed out",
                    conn.peer_node_id().short_str()
                );
            },
        }
    }
}

fn is_loopback_address(addr: &Multiaddr) -> bool {
    match addr.iter().next() {
        Some(Protocol::Ip4(ip)) => ip.is_loopback(),
        Some(Protocol::Ip6(ip)) => ip.is_loopback(),
        _ => false,
    }
}
