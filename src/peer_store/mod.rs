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

//! The peer store: the node's registry of known peer addresses, keys, protocols and metadata.
//!
//! Addresses carry a TTL class (see [AddressTtl]); the identify consumer relies on class-targeted
//! downgrade and expiry operations to atomically replace a peer's address list. The store is
//! certified-capable: it accepts [SignedPeerRecord]s and remembers the latest record per peer.

mod address;
pub use address::{AddressTtl, PeerAddress};

mod error;
pub use error::PeerStoreError;

mod peer;
pub use peer::{Peer, PeerMetadataKey};

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use log::*;

use crate::{
    identity::{NodeId, SignedPeerRecord},
    protocol::ProtocolId,
    types::NodePublicKey,
};

const LOG_TARGET: &str = "comms::peer_store";

/// Thread-safe handle to the peer store. Cloning is cheap and all clones share state.
#[derive(Clone, Default)]
pub struct PeerStore {
    peers: Arc<RwLock<HashMap<NodeId, Peer>>>,
}

impl PeerStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn count(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn get_peer(&self, node_id: &NodeId) -> Option<Peer> {
        self.peers.read().unwrap().get(node_id).cloned()
    }

    /// Replaces the peer's protocol list, returning the previous list.
    pub fn set_protocols(&self, node_id: &NodeId, protocols: Vec<ProtocolId>) -> Vec<ProtocolId> {
        let mut lock = self.peers.write().unwrap();
        let peer = entry_mut(&mut lock, node_id);
        std::mem::replace(&mut peer.protocols, protocols)
    }

    pub fn protocols(&self, node_id: &NodeId) -> Vec<ProtocolId> {
        self.peers
            .read()
            .unwrap()
            .get(node_id)
            .map(|p| p.protocols.clone())
            .unwrap_or_default()
    }

    pub fn supports_protocol(&self, node_id: &NodeId, protocol: &ProtocolId) -> bool {
        self.peers
            .read()
            .unwrap()
            .get(node_id)
            .map(|p| p.protocols.contains(protocol))
            .unwrap_or(false)
    }

    /// Inserts addresses with the given TTL class. Addresses already present are refreshed to the
    /// class instead of duplicated.
    pub fn add_addresses(&self, node_id: &NodeId, addresses: Vec<multiaddr::Multiaddr>, ttl: AddressTtl) {
        let mut lock = self.peers.write().unwrap();
        let peer = entry_mut(&mut lock, node_id);
        peer.addresses.retain(|a| !a.is_expired());
        for address in addresses {
            match peer.addresses.iter_mut().find(|a| a.address == address) {
                Some(existing) => existing.set_ttl(ttl),
                None => peer.addresses.push(PeerAddress::new(address, ttl)),
            }
        }
    }

    /// Moves every address currently in class `from` to class `to`. `None` expires the addresses
    /// immediately (TTL zero).
    pub fn update_address_ttl(&self, node_id: &NodeId, from: AddressTtl, to: Option<AddressTtl>) {
        let mut lock = self.peers.write().unwrap();
        let Some(peer) = lock.get_mut(node_id) else {
            return;
        };
        match to {
            Some(to) => {
                for entry in peer.addresses.iter_mut().filter(|a| a.ttl == from) {
                    entry.set_ttl(to);
                }
            },
            None => peer.addresses.retain(|a| a.ttl != from),
        }
    }

    /// The peer's live (unexpired) addresses.
    pub fn addresses(&self, node_id: &NodeId) -> Vec<multiaddr::Multiaddr> {
        self.peers
            .read()
            .unwrap()
            .get(node_id)
            .map(|p| {
                p.addresses
                    .iter()
                    .filter(|a| !a.is_expired())
                    .map(|a| a.address.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Consumes an authenticated peer record: remembers it as the peer's latest record and inserts
    /// its addresses with the given TTL class. Records older than the stored one are rejected.
    pub fn consume_peer_record(&self, record: SignedPeerRecord, ttl: AddressTtl) -> Result<(), PeerStoreError> {
        let node_id = record.peer().clone();
        {
            let mut lock = self.peers.write().unwrap();
            let peer = entry_mut(&mut lock, &node_id);
            if let Some(existing) = peer.peer_record.as_ref() {
                if record.seq() < existing.seq() {
                    return Err(PeerStoreError::StaleRecord {
                        existing: existing.seq(),
                        received: record.seq(),
                    });
                }
            }
            peer.peer_record = Some(record.clone());
        }
        self.add_addresses(&node_id, record.addresses().to_vec(), ttl);
        trace!(
            target: LOG_TARGET,
            "Consumed peer record for '{}' (seq {}, {} address(es))",
            node_id.short_str(),
            record.seq(),
            record.addresses().len()
        );
        Ok(())
    }

    pub fn peer_record(&self, node_id: &NodeId) -> Option<SignedPeerRecord> {
        self.peers.read().unwrap().get(node_id).and_then(|p| p.peer_record.clone())
    }

    pub fn add_public_key(&self, node_id: &NodeId, public_key: NodePublicKey) {
        let mut lock = self.peers.write().unwrap();
        entry_mut(&mut lock, node_id).public_key = Some(public_key);
    }

    pub fn public_key(&self, node_id: &NodeId) -> Option<NodePublicKey> {
        self.peers.read().unwrap().get(node_id).and_then(|p| p.public_key)
    }

    pub fn set_metadata(&self, node_id: &NodeId, key: PeerMetadataKey, value: String) {
        let mut lock = self.peers.write().unwrap();
        entry_mut(&mut lock, node_id).metadata.insert(key, value);
    }

    pub fn metadata(&self, node_id: &NodeId, key: PeerMetadataKey) -> Option<String> {
        self.peers
            .read()
            .unwrap()
            .get(node_id)
            .and_then(|p| p.metadata.get(&key).cloned())
    }
}

fn entry_mut<'a>(peers: &'a mut HashMap<NodeId, Peer>, node_id: &NodeId) -> &'a mut Peer {
    peers
        .entry(node_id.clone())
        .or_insert_with(|| Peer::new(node_id.clone()))
}

#[cfg(test)]
mod test {
    use rand::rngs::OsRng;

    use super::*;
    use crate::identity::NodeIdentity;

    fn addr(s: &str) -> multiaddr::Multiaddr {
        s.parse().unwrap()
    }

    fn node_id() -> NodeId {
        NodeIdentity::random(&mut OsRng, vec![]).node_id().clone()
    }

    #[test]
    fn set_protocols_returns_previous() {
        let store = PeerStore::new();
        let peer = node_id();
        let p1 = ProtocolId::from_static(b"/mesh/one");
        let p2 = ProtocolId::from_static(b"/mesh/two");

        assert!(store.set_protocols(&peer, vec![p1.clone()]).is_empty());
        let prev = store.set_protocols(&peer, vec![p2.clone()]);
        assert_eq!(prev, vec![p1]);
        assert!(store.supports_protocol(&peer, &p2));
        assert!(!store.supports_protocol(&peer, &ProtocolId::from_static(b"/mesh/one")));
    }

    #[test]
    fn add_addresses_refreshes_existing() {
        let store = PeerStore::new();
        let peer = node_id();
        let a = addr("/ip4/10.0.0.1/tcp/9000");

        store.add_addresses(&peer, vec![a.clone()], AddressTtl::Temp);
        store.add_addresses(&peer, vec![a.clone()], AddressTtl::Connected);

        let stored = store.get_peer(&peer).unwrap();
        assert_eq!(stored.addresses.len(), 1);
        assert_eq!(stored.addresses[0].ttl, AddressTtl::Connected);
    }

    #[test]
    fn ttl_downgrade_and_expiry() {
        let store = PeerStore::new();
        let peer = node_id();
        let a = addr("/ip4/10.0.0.1/tcp/9000");
        let b = addr("/ip4/10.0.0.2/tcp/9000");

        store.add_addresses(&peer, vec![a.clone()], AddressTtl::Connected);
        store.add_addresses(&peer, vec![b.clone()], AddressTtl::RecentlyConnected);

        store.update_address_ttl(&peer, AddressTtl::Connected, Some(AddressTtl::Temp));
        store.update_address_ttl(&peer, AddressTtl::RecentlyConnected, Some(AddressTtl::Temp));
        // Promote one back, then expire the rest
        store.add_addresses(&peer, vec![b.clone()], AddressTtl::Connected);
        store.update_address_ttl(&peer, AddressTtl::Temp, None);

        assert_eq!(store.addresses(&peer), vec![b]);
    }

    #[test]
    fn stale_peer_record_is_rejected() {
        let store = PeerStore::new();
        let identity = NodeIdentity::random(&mut OsRng, vec![]);
        let newer = crate::identity::SignedPeerRecord::sign_new(&identity, 5, vec![addr("/ip4/10.0.0.1/tcp/1")]);
        let older = crate::identity::SignedPeerRecord::sign_new(&identity, 4, vec![addr("/ip4/10.0.0.2/tcp/2")]);

        store.consume_peer_record(newer, AddressTtl::Connected).unwrap();
        let err = store.consume_peer_record(older, AddressTtl::Connected).unwrap_err();
        assert!(matches!(err, PeerStoreError::StaleRecord { existing: 5, received: 4 }));
        assert_eq!(store.peer_record(identity.node_id()).unwrap().seq(), 5);
    }
}
