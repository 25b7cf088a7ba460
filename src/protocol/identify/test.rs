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
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use prost::Message;
use rand::rngs::OsRng;
use tokio::{
    io::AsyncWriteExt,
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time,
};

use super::*;
use crate::{
    connection::{ConnectionError, ConnectivityEvent, ConnectivityEventTx},
    event::{LocalNodeEvent, LocalNodeEventTx},
    identity::{NodeId, NodeIdentity},
    multiaddr::Multiaddr,
    peer_store::{AddressTtl, PeerMetadataKey, PeerStore},
    proto,
    protocol::{ProtocolId, Protocols},
    shutdown::Shutdown,
    test_utils::connection::{create_linked_connections, TestLink, STREAM_MEMORY_BUDGET},
};

struct TestNode {
    node_identity: Arc<NodeIdentity>,
    peer_store: PeerStore,
    protocols: Protocols,
    connectivity_tx: ConnectivityEventTx,
    local_events_tx: LocalNodeEventTx,
    requester: IdentifyRequester,
    _shutdown: Shutdown,
    _service_handle: JoinHandle<()>,
}

impl TestNode {
    fn node_id(&self) -> NodeId {
        self.node_identity.node_id().clone()
    }

    fn first_address(&self) -> Multiaddr {
        self.node_identity
            .public_addresses()
            .first()
            .cloned()
            .expect("test node must advertise at least one address")
    }

    /// Registers a protocol handler whose notifications are discarded, and announces the change.
    fn add_local_protocol(&self, protocol: ProtocolId) {
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        self.protocols.add(&[protocol], &tx);
        let _result = self.local_events_tx.send(LocalNodeEvent::ProtocolsUpdated);
    }
}

fn spawn_node(config: IdentifyConfig, addresses: &[&str], extra_protocols: &[ProtocolId]) -> TestNode {
    let addresses: Vec<Multiaddr> = addresses.iter().map(|a| a.parse().unwrap()).collect();
    let node_identity = Arc::new(NodeIdentity::random(&mut OsRng, addresses));
    let peer_store = PeerStore::new();
    let protocols = Protocols::new();
    if !extra_protocols.is_empty() {
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        protocols.add(extra_protocols, &tx);
    }

    let (connectivity_tx, connectivity_rx) = broadcast::channel(16);
    let (local_events_tx, local_events_rx) = broadcast::channel(16);
    let shutdown = Shutdown::new();

    let (service, requester) = IdentifyService::new(
        config,
        node_identity.clone(),
        peer_store.clone(),
        &protocols,
        connectivity_rx,
        local_events_rx,
        shutdown.to_signal(),
    );
    let service_handle = service.spawn();

    TestNode {
        node_identity,
        peer_store,
        protocols,
        connectivity_tx,
        local_events_tx,
        requester,
        _shutdown: shutdown,
        _service_handle: service_handle,
    }
}

async fn connect(a: &TestNode, b: &TestNode, conn_id: u64) -> TestLink {
    connect_with(a, b, conn_id, b.node_id(), STREAM_MEMORY_BUDGET).await
}

/// Connects `a` and `b`, with `a` believing the remote peer to be `claimed`.
async fn connect_claiming(a: &TestNode, b: &TestNode, conn_id: u64, claimed: NodeId) -> TestLink {
    connect_with(a, b, conn_id, claimed, STREAM_MEMORY_BUDGET).await
}

async fn connect_with(a: &TestNode, b: &TestNode, conn_id: u64, claimed: NodeId, memory_budget: usize) -> TestLink {
    let link = create_linked_connections(
        conn_id,
        claimed,
        a.node_id(),
        a.first_address(),
        b.first_address(),
        a.protocols.clone(),
        b.protocols.clone(),
        memory_budget,
    );
    a.connectivity_tx
        .send(ConnectivityEvent::PeerConnected(Box::new(link.a_conn.clone())))
        .unwrap();
    b.connectivity_tx
        .send(ConnectivityEvent::PeerConnected(Box::new(link.b_conn.clone())))
        .unwrap();
    // Give both services a chance to register the connection before streams start flowing
    time::sleep(Duration::from_millis(50)).await;
    link
}

fn disconnect(a: &TestNode, b: &TestNode, link: &TestLink) {
    a.connectivity_tx
        .send(ConnectivityEvent::PeerDisconnected(
            link.a_conn.id(),
            link.a_conn.peer_node_id().clone(),
        ))
        .unwrap();
    b.connectivity_tx
        .send(ConnectivityEvent::PeerDisconnected(
            link.b_conn.id(),
            link.b_conn.peer_node_id().clone(),
        ))
        .unwrap();
}

async fn expect_event<F>(rx: &mut IdentifyEventRx, predicate: F) -> IdentifyEvent
where F: Fn(&IdentifyEvent) -> bool {
    time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(err) => panic!("identify event stream ended: {}", err),
            }
        }
    })
    .await
    .expect("timed out waiting for identify event")
}

fn to_set(addresses: Vec<Multiaddr>) -> HashSet<Multiaddr> {
    addresses.into_iter().collect()
}

async fn eventually<F>(description: &str, predicate: F)
where F: Fn() -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !predicate() {
        if Instant::now() > deadline {
            panic!("condition not met in time: {}", description);
        }
        time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn identify_completes_and_populates_peer_store() {
    let chat = ProtocolId::from_static(b"/mesh/chat/1.0.0");
    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[chat.clone()]);
    let mut events = node_a.requester.get_event_subscription();

    let link = connect(&node_a, &node_b, 1).await;
    node_a.requester.identify_conn(&link.a_conn).await.unwrap();

    let b_id = node_b.node_id();
    let event = expect_event(&mut events, |e| matches!(e, IdentifyEvent::IdentificationCompleted(_))).await;
    match event {
        IdentifyEvent::IdentificationCompleted(node_id) => assert_eq!(node_id, b_id),
        _ => unreachable!(),
    }

    // The peer's protocols, addresses, key and versions are all in the store
    let protocols = node_a.peer_store.protocols(&b_id);
    assert!(protocols.contains(&chat));
    assert!(protocols.contains(&IDENTIFY_PROTOCOL));
    assert!(protocols.contains(&IDENTIFY_PUSH_PROTOCOL));
    assert_eq!(node_a.peer_store.addresses(&b_id), vec![node_b.first_address()]);
    assert_eq!(
        node_a.peer_store.public_key(&b_id).as_ref(),
        Some(node_b.node_identity.public_key())
    );
    assert_eq!(
        node_a.peer_store.metadata(&b_id, PeerMetadataKey::ProtocolVersion).as_deref(),
        Some("ipfs/0.1.0")
    );
    assert!(node_a
        .peer_store
        .metadata(&b_id, PeerMetadataKey::AgentVersion)
        .is_some());

    // Completed is emitted exactly once per connection
    let extra = time::timeout(Duration::from_millis(250), events.recv()).await;
    assert!(extra.is_err(), "unexpected extra identify event: {:?}", extra);
}

#[tokio::test]
async fn repeated_waits_share_one_identify() {
    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[]);
    let mut events = node_a.requester.get_event_subscription();

    let link = connect(&node_a, &node_b, 1).await;
    let wait_a = node_a.requester.identify_wait(&link.a_conn).await.unwrap();
    let wait_b = node_a.requester.identify_wait(&link.a_conn).await.unwrap();
    tokio::join!(wait_a, wait_b);

    expect_event(&mut events, |e| matches!(e, IdentifyEvent::IdentificationCompleted(_))).await;
    let extra = time::timeout(Duration::from_millis(250), events.recv()).await;
    assert!(extra.is_err(), "only one identify may run per connection");

    // Each side opened exactly one identify stream: ours, and the remote's own identify of us
    assert_eq!(link.a_opens.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(link.b_opens.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wait_after_disconnect_resolves_without_streams() {
    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[]);

    let link = connect(&node_a, &node_b, 1).await;
    node_a.requester.identify_conn(&link.a_conn).await.unwrap();

    disconnect(&node_a, &node_b, &link);
    time::sleep(Duration::from_millis(50)).await;

    let opens_before = link.a_opens.load(std::sync::atomic::Ordering::SeqCst);
    let signal = node_a.requester.identify_wait(&link.a_conn).await.unwrap();
    let _resolved = time::timeout(Duration::from_secs(1), signal)
        .await
        .expect("wait on a closed connection must resolve immediately");
    assert_eq!(link.a_opens.load(std::sync::atomic::Ordering::SeqCst), opens_before);
}

#[tokio::test]
async fn failed_memory_reservation_fails_identification() {
    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[]);
    let mut events = node_a.requester.get_event_subscription();

    // A transport with no stream buffer budget refuses every reservation
    let link = connect_with(&node_a, &node_b, 1, node_b.node_id(), 0).await;

    let event = expect_event(&mut events, |e| matches!(e, IdentifyEvent::IdentificationFailed(..))).await;
    match event {
        IdentifyEvent::IdentificationFailed(node_id, err) => {
            assert_eq!(node_id, node_b.node_id());
            assert_eq!(err, IdentifyError::Connection(ConnectionError::MemoryReservationFailed));
        },
        _ => unreachable!(),
    }

    // The wait latch resolves on failure just as it does on success
    let signal = node_a.requester.identify_wait(&link.a_conn).await.unwrap();
    let _resolved = time::timeout(Duration::from_secs(1), signal)
        .await
        .expect("latch must resolve when identify fails");
}

#[tokio::test]
async fn push_delivers_protocol_delta() {
    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[]);
    let mut a_events = node_a.requester.get_event_subscription();
    let mut b_events = node_b.requester.get_event_subscription();

    let link = connect(&node_a, &node_b, 1).await;
    node_a.requester.identify_conn(&link.a_conn).await.unwrap();
    expect_event(&mut b_events, |e| matches!(e, IdentifyEvent::IdentificationCompleted(_))).await;

    // B gains a protocol; A must hear about the delta via push
    let fresh = ProtocolId::from_static(b"/mesh/fresh/1.0.0");
    node_b.add_local_protocol(fresh.clone());

    let event = expect_event(&mut a_events, |e| {
        matches!(e, IdentifyEvent::PeerProtocolsUpdated { added, .. } if !added.is_empty())
    })
    .await;
    match event {
        IdentifyEvent::PeerProtocolsUpdated { node_id, added, removed } => {
            assert_eq!(node_id, node_b.node_id());
            assert!(added.contains(&fresh));
            assert!(removed.is_empty());
        },
        _ => unreachable!(),
    }
    let b_id = node_b.node_id();
    eventually("peer store lists the pushed protocol", || {
        node_a.peer_store.supports_protocol(&b_id, &fresh)
    })
    .await;
}

#[tokio::test]
async fn rapid_local_changes_coalesce_to_final_state() {
    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[]);
    let mut b_events = node_b.requester.get_event_subscription();

    let link = connect(&node_a, &node_b, 1).await;
    node_a.requester.identify_conn(&link.a_conn).await.unwrap();
    expect_event(&mut b_events, |e| matches!(e, IdentifyEvent::IdentificationCompleted(_))).await;

    let first = ProtocolId::from_static(b"/mesh/first/1.0.0");
    let second = ProtocolId::from_static(b"/mesh/second/1.0.0");
    node_b.add_local_protocol(first.clone());
    node_b.add_local_protocol(second.clone());

    // Whatever coalescing happened, the final push reflects the final protocol list
    let b_id = node_b.node_id();
    eventually("final protocol list arrives", || {
        node_a.peer_store.supports_protocol(&b_id, &first) && node_a.peer_store.supports_protocol(&b_id, &second)
    })
    .await;
}

#[tokio::test]
async fn pushed_addresses_replace_the_old_set() {
    let addr_x: Multiaddr = "/ip4/10.0.0.2/tcp/9002".parse().unwrap();
    let addr_y: Multiaddr = "/ip4/10.0.0.3/tcp/9003".parse().unwrap();
    let addr_z: Multiaddr = "/ip4/10.0.0.4/tcp/9004".parse().unwrap();

    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002", "/ip4/10.0.0.3/tcp/9003"], &[]);
    let mut b_events = node_b.requester.get_event_subscription();

    let link = connect(&node_a, &node_b, 1).await;
    node_a.requester.identify_conn(&link.a_conn).await.unwrap();
    expect_event(&mut b_events, |e| matches!(e, IdentifyEvent::IdentificationCompleted(_))).await;

    let b_id = node_b.node_id();
    assert_eq!(
        to_set(node_a.peer_store.addresses(&b_id)),
        to_set(vec![addr_x.clone(), addr_y.clone()])
    );

    node_b.node_identity.set_public_addresses(vec![addr_y.clone(), addr_z.clone()]);
    node_b.local_events_tx.send(LocalNodeEvent::AddressesUpdated).unwrap();

    eventually("pushed address set replaces the old one", || {
        to_set(node_a.peer_store.addresses(&b_id)) == to_set(vec![addr_y.clone(), addr_z.clone()])
    })
    .await;

    // The peer is still connected, so the fresh addresses carry the connected TTL class
    let peer = node_a.peer_store.get_peer(&b_id).unwrap();
    assert!(peer
        .addresses
        .iter()
        .filter(|a| !a.is_expired())
        .all(|a| a.ttl == AddressTtl::Connected));
}

#[tokio::test]
async fn key_peer_id_mismatch_is_not_stored() {
    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[]);
    let mut events = node_a.requester.get_event_subscription();

    // A's transport claims the remote is someone other than B
    let claimed = NodeIdentity::random(&mut OsRng, vec![]).node_id().clone();
    let link = connect_claiming(&node_a, &node_b, 1, claimed.clone()).await;
    node_a.requester.identify_conn(&link.a_conn).await.unwrap();

    // Identification still completes; other fields were applied, the key was not
    let event = expect_event(&mut events, |e| matches!(e, IdentifyEvent::IdentificationCompleted(_))).await;
    match event {
        IdentifyEvent::IdentificationCompleted(node_id) => assert_eq!(node_id, claimed),
        _ => unreachable!(),
    }
    assert!(node_a.peer_store.public_key(&claimed).is_none());
    // The signed record is bound to B's real id, so the unsigned addresses were used
    assert_eq!(node_a.peer_store.addresses(&claimed), vec![node_b.first_address()]);
}

#[tokio::test]
async fn malformed_signed_record_falls_back_to_unsigned_addresses() {
    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[]);
    let mut a_events = node_a.requester.get_event_subscription();

    let link = connect(&node_a, &node_b, 1).await;
    node_a.requester.identify_conn(&link.a_conn).await.unwrap();

    // Hand-roll a push from B's side of the link carrying a garbage record envelope
    let advertised: Multiaddr = "/ip4/10.0.0.9/tcp/9009".parse().unwrap();
    let msg = proto::identify::Identify {
        listen_addrs: vec![advertised.to_vec()],
        protocols: vec!["/ipfs/id/1.0.0".to_string(), "/ipfs/id/push/1.0.0".to_string()],
        signed_peer_record: Some(b"not a valid envelope".to_vec()),
        ..Default::default()
    };
    let mut stream = link.b_conn.open_substream(&IDENTIFY_PUSH_PROTOCOL).await.unwrap();
    stream
        .write_all(&msg.encode_length_delimited_to_vec())
        .await
        .unwrap();
    drop(stream);

    let b_id = node_b.node_id();
    eventually("unsigned listen addresses are honoured", || {
        node_a.peer_store.addresses(&b_id) == vec![advertised.clone()]
    })
    .await;

    // No failure event: a bad record only downgrades the message to unsigned handling
    while let Ok(event) = a_events.try_recv() {
        assert!(
            !matches!(event, IdentifyEvent::IdentificationFailed(..)),
            "unexpected failure event"
        );
    }
}

#[tokio::test]
async fn disconnect_downgrades_connected_addresses() {
    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[]);

    let link = connect(&node_a, &node_b, 1).await;
    node_a.requester.identify_conn(&link.a_conn).await.unwrap();

    let b_id = node_b.node_id();
    let peer = node_a.peer_store.get_peer(&b_id).unwrap();
    assert!(peer.addresses.iter().any(|a| a.ttl == AddressTtl::Connected));

    disconnect(&node_a, &node_b, &link);

    eventually("addresses downgraded on last disconnect", || {
        let peer = node_a.peer_store.get_peer(&b_id).unwrap();
        !peer.addresses.is_empty() && peer.addresses.iter().all(|a| a.ttl == AddressTtl::RecentlyConnected)
    })
    .await;
}

#[tokio::test]
async fn push_reaches_every_connected_peer() {
    let node_a = spawn_node(Default::default(), &["/ip4/10.0.0.1/tcp/9001"], &[]);
    let peers = [
        spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[]),
        spawn_node(Default::default(), &["/ip4/10.0.0.3/tcp/9003"], &[]),
        spawn_node(Default::default(), &["/ip4/10.0.0.4/tcp/9004"], &[]),
    ];

    let mut links = Vec::new();
    for (i, peer) in peers.iter().enumerate() {
        let link = connect(&node_a, peer, i as u64 + 1).await;
        node_a.requester.identify_conn(&link.a_conn).await.unwrap();
        peer.requester.identify_conn(&link.b_conn).await.unwrap();
        links.push(link);
    }

    let fresh = ProtocolId::from_static(b"/mesh/fanout/1.0.0");
    node_a.add_local_protocol(fresh.clone());

    let a_id = node_a.node_id();
    eventually("every peer received the push", || {
        peers.iter().all(|p| p.peer_store.supports_protocol(&a_id, &fresh))
    })
    .await;
}

#[tokio::test]
async fn corroborated_observed_address_is_reported() {
    let node_a = spawn_node(Default::default(), &["/ip4/88.1.2.3/tcp/9000"], &[]);
    let node_b = spawn_node(Default::default(), &["/ip4/10.0.0.2/tcp/9002"], &[]);
    let node_c = spawn_node(Default::default(), &["/ip4/10.0.0.3/tcp/9003"], &[]);

    let link_b = connect(&node_a, &node_b, 1).await;
    let link_c = connect(&node_a, &node_c, 2).await;
    node_a.requester.identify_conn(&link_b.a_conn).await.unwrap();
    node_a.requester.identify_conn(&link_c.a_conn).await.unwrap();

    // Two distinct peers have now reported where they see this node
    let own_addr = node_a.first_address();
    assert_eq!(node_a.requester.own_observed_addrs().await.unwrap(), vec![own_addr.clone()]);
    assert_eq!(
        node_a.requester.observed_addrs_for(own_addr.clone()).await.unwrap(),
        vec![own_addr]
    );
}
