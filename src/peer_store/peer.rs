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

use std::collections::HashMap;

use crate::{
    identity::{NodeId, SignedPeerRecord},
    peer_store::address::PeerAddress,
    protocol::ProtocolId,
    types::NodePublicKey,
};

/// Opaque per-peer metadata keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerMetadataKey {
    ProtocolVersion,
    AgentVersion,
}

/// Everything the store knows about a single peer.
#[derive(Debug, Clone, Default)]
pub struct Peer {
    pub node_id: NodeId,
    /// The peer's identity key, once learned and verified against `node_id`
    pub public_key: Option<NodePublicKey>,
    pub addresses: Vec<PeerAddress>,
    /// Protocols the peer claims to support, as last reported
    pub protocols: Vec<ProtocolId>,
    pub metadata: HashMap<PeerMetadataKey, String>,
    /// The latest signed peer record consumed for this peer
    pub peer_record: Option<SignedPeerRecord>,
}

impl Peer {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }
}
