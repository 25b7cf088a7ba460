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
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use multiaddr::Multiaddr;
use tokio::{
    io::duplex,
    sync::{mpsc, Semaphore},
};

use crate::{
    connection::{
        ConnectionDirection,
        ConnectionError,
        ConnectionId,
        ConnectionRequest,
        MemoryReservation,
        PeerConnection,
        Substream,
    },
    identity::NodeId,
    protocol::{protocol_id_to_string, ProtocolEvent, Protocols},
};

/// Buffer size of the in-memory substream pipes.
const SUBSTREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Default per-endpoint stream buffer budget available for memory reservations.
pub const STREAM_MEMORY_BUDGET: usize = 64 * 1024;

/// A connection handle whose substream requests go nowhere. Usable wherever only the identity
/// fields matter.
pub fn stub_connection() -> PeerConnection {
    stub_connection_with_id(0)
}

pub fn stub_connection_with_id(id: u64) -> PeerConnection {
    let peer = NodeId::try_from(&[id as u8; 13][..]).unwrap();
    let (request_tx, _request_rx) = mpsc::channel(1);
    PeerConnection::new(
        ConnectionId::new(id),
        peer,
        ConnectionDirection::Outbound,
        "/memory/0".parse().unwrap(),
        "/memory/1".parse().unwrap(),
        request_tx,
    )
}

/// Rebuilds a stub with a different remote peer id.
pub fn with_peer(conn: PeerConnection, peer: NodeId) -> PeerConnection {
    let (request_tx, _request_rx) = mpsc::channel(1);
    PeerConnection::new(
        conn.id(),
        peer,
        conn.direction(),
        conn.address().clone(),
        conn.local_address().clone(),
        request_tx,
    )
}

/// A pair of linked connection handles: substreams opened on one end are delivered as inbound
/// substream notifications to the protocol registry of the other.
pub struct TestLink {
    /// Node A's handle to the connection (remote peer is B)
    pub a_conn: PeerConnection,
    /// Node B's handle to the connection (remote peer is A)
    pub b_conn: PeerConnection,
    /// Number of substreams A has opened
    pub a_opens: Arc<AtomicUsize>,
    /// Number of substreams B has opened
    pub b_opens: Arc<AtomicUsize>,
}

/// Creates the linked pair and spawns the relay actor that services both ends.
///
/// `a_peer` is the node id A believes the remote to be (normally B's id; pass something else to
/// simulate a misidentified transport session). `a_addr`/`b_addr` are the multiaddrs of the
/// respective endpoints. `memory_budget` is the stream buffer budget each endpoint's transport
/// grants reservations from.
pub fn create_linked_connections(
    conn_id: u64,
    a_peer: NodeId,
    b_peer: NodeId,
    a_addr: Multiaddr,
    b_addr: Multiaddr,
    a_protocols: Protocols,
    b_protocols: Protocols,
    memory_budget: usize,
) -> TestLink {
    let (a_request_tx, a_request_rx) = mpsc::channel(16);
    let (b_request_tx, b_request_rx) = mpsc::channel(16);

    let a_conn = PeerConnection::new(
        ConnectionId::new(conn_id),
        a_peer,
        ConnectionDirection::Outbound,
        b_addr.clone(),
        a_addr.clone(),
        a_request_tx,
    );
    let b_conn = PeerConnection::new(
        ConnectionId::new(conn_id),
        b_peer,
        ConnectionDirection::Inbound,
        a_addr,
        b_addr,
        b_request_tx,
    );

    let a_opens = Arc::new(AtomicUsize::new(0));
    let b_opens = Arc::new(AtomicUsize::new(0));

    tokio::spawn(relay(
        a_request_rx,
        b_protocols,
        b_conn.clone(),
        a_opens.clone(),
        Arc::new(Semaphore::new(memory_budget)),
    ));
    tokio::spawn(relay(
        b_request_rx,
        a_protocols,
        a_conn.clone(),
        b_opens.clone(),
        Arc::new(Semaphore::new(memory_budget)),
    ));

    TestLink {
        a_conn,
        b_conn,
        a_opens,
        b_opens,
    }
}

/// Services one direction of a link: every opened substream is paired with a duplex pipe whose
/// far end is notified to the remote side's protocol registry, and memory reservations are
/// granted from the endpoint's budget semaphore.
async fn relay(
    mut request_rx: mpsc::Receiver<ConnectionRequest>,
    remote_protocols: Protocols,
    remote_conn: PeerConnection,
    opens: Arc<AtomicUsize>,
    memory: Arc<Semaphore>,
) {
    while let Some(request) = request_rx.recv().await {
        match request {
            ConnectionRequest::OpenSubstream {
                protocol,
                transient: _,
                reply_tx,
            } => {
                opens.fetch_add(1, Ordering::SeqCst);
                let (initiator_end, responder_end) = duplex(SUBSTREAM_BUFFER_SIZE);
                let notified = remote_protocols
                    .notify(
                        &protocol,
                        ProtocolEvent::NewInboundSubstream(Box::new(remote_conn.clone()), Box::new(responder_end)),
                    )
                    .await;
                let reply = match notified {
                    Ok(_) => Ok(Box::new(initiator_end) as Substream),
                    Err(_) => Err(ConnectionError::ProtocolNegotiationFailed(protocol_id_to_string(
                        &protocol,
                    ))),
                };
                let _result = reply_tx.send(reply);
            },
            ConnectionRequest::ReserveMemory { bytes, reply_tx } => {
                let reply = match memory.clone().try_acquire_many_owned(bytes as u32) {
                    Ok(permit) => Ok(MemoryReservation::new(permit)),
                    Err(_) => Err(ConnectionError::MemoryReservationFailed),
                };
                let _result = reply_tx.send(reply);
            },
        }
    }
}
