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

//! Connection handles as supplied by the transport layer.
//!
//! A [PeerConnection] is a cheap cloneable handle to a live multiplexed connection. Substream
//! opening is delegated to the transport actor over an internal request channel; the handle itself
//! carries the connection's stable id, remote peer id and endpoint addresses.

mod error;
pub use error::ConnectionError;

mod event;
pub use event::{ConnectivityEvent, ConnectivityEventRx, ConnectivityEventTx};

use std::fmt;

use multiaddr::Multiaddr;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot, OwnedSemaphorePermit},
};

use crate::{identity::NodeId, protocol::ProtocolId};

/// Object-safe byte stream bound. Anything that reads and writes asynchronously can back a
/// [Substream].
pub trait SubstreamIo: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> SubstreamIo for T {}

/// A negotiated substream on a connection.
pub type Substream = Box<dyn SubstreamIo>;

/// Stable identifier for a connection, assigned by the transport. Peers may hold several
/// connections at once, so state keyed per-connection must use this and not the peer's node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for ConnectionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionDirection::Inbound => write!(f, "Inbound"),
            ConnectionDirection::Outbound => write!(f, "Outbound"),
        }
    }
}

/// Requests sent to the transport actor that owns the underlying multiplexed connection.
pub enum ConnectionRequest {
    OpenSubstream {
        protocol: ProtocolId,
        /// Transient streams are not counted against the connection's normal stream limits.
        transient: bool,
        reply_tx: oneshot::Sender<Result<Substream, ConnectionError>>,
    },
    /// Claim `bytes` of the connection's stream buffer budget. Refused when the budget is
    /// exhausted.
    ReserveMemory {
        bytes: usize,
        reply_tx: oneshot::Sender<Result<MemoryReservation, ConnectionError>>,
    },
}

/// A slice of a connection's stream buffer budget, granted by the transport. Returned to the
/// budget on drop.
#[derive(Debug)]
pub struct MemoryReservation {
    _permit: OwnedSemaphorePermit,
}

impl MemoryReservation {
    pub fn new(permit: OwnedSemaphorePermit) -> Self {
        Self { _permit: permit }
    }
}

/// Handle to a live connection.
#[derive(Clone)]
pub struct PeerConnection {
    id: ConnectionId,
    peer_node_id: NodeId,
    direction: ConnectionDirection,
    address: Multiaddr,
    local_address: Multiaddr,
    request_tx: mpsc::Sender<ConnectionRequest>,
}

impl PeerConnection {
    pub fn new(
        id: ConnectionId,
        peer_node_id: NodeId,
        direction: ConnectionDirection,
        address: Multiaddr,
        local_address: Multiaddr,
        request_tx: mpsc::Sender<ConnectionRequest>,
    ) -> Self {
        Self {
            id,
            peer_node_id,
            direction,
            address,
            local_address,
            request_tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_node_id(&self) -> &NodeId {
        &self.peer_node_id
    }

    pub fn direction(&self) -> ConnectionDirection {
        self.direction
    }

    /// The remote endpoint's multiaddr.
    pub fn address(&self) -> &Multiaddr {
        &self.address
    }

    /// The local endpoint's multiaddr.
    pub fn local_address(&self) -> &Multiaddr {
        &self.local_address
    }

    /// Opens and negotiates a new substream for `protocol`.
    pub async fn open_substream(&self, protocol: &ProtocolId) -> Result<Substream, ConnectionError> {
        self.request_substream(protocol, false).await
    }

    /// Opens a substream that is exempt from the connection's normal stream limits.
    pub async fn open_transient_substream(&self, protocol: &ProtocolId) -> Result<Substream, ConnectionError> {
        self.request_substream(protocol, true).await
    }

    /// Reserves `bytes` of the connection's stream buffer budget before reading a message. The
    /// reservation is released when the returned guard is dropped.
    pub async fn reserve_memory(&self, bytes: usize) -> Result<MemoryReservation, ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(ConnectionRequest::ReserveMemory { bytes, reply_tx })
            .await
            .map_err(|_| ConnectionError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| ConnectionError::ConnectionClosed)?
    }

    async fn request_substream(&self, protocol: &ProtocolId, transient: bool) -> Result<Substream, ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(ConnectionRequest::OpenSubstream {
                protocol: protocol.clone(),
                transient,
                reply_tx,
            })
            .await
            .map_err(|_| ConnectionError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| ConnectionError::ConnectionClosed)?
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("peer_node_id", &self.peer_node_id)
            .field("direction", &self.direction)
            .field("address", &self.address)
            .field("local_address", &self.local_address)
            .finish()
    }
}

impl fmt::Display for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PeerConnection(id: {}, peer: {}, direction: {}, address: {})",
            self.id,
            self.peer_node_id.short_str(),
            self.direction,
            self.address,
        )
    }
}
