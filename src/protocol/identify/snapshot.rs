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

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use log::*;
use multiaddr::Multiaddr;

use crate::{
    identity::{NodeIdentity, SignedPeerRecord},
    peer_store::{AddressTtl, PeerStore},
    protocol::{ProtocolId, Protocols},
};

const LOG_TARGET: &str = "comms::protocol::identify::snapshot";

/// An immutable record of the local node's advertised identity at a point in time.
#[derive(Debug, Clone)]
pub struct IdentifySnapshot {
    pub timestamp: DateTime<Utc>,
    pub protocols: Vec<ProtocolId>,
    pub addresses: Vec<Multiaddr>,
    pub record: Option<SignedPeerRecord>,
}

/// Holds the current [IdentifySnapshot] and rebuilds it from host state on demand.
///
/// Snapshots are replaced atomically; readers hold an `Arc` to whichever snapshot was current
/// when they asked. Timestamps never decrease across refreshes.
#[derive(Clone)]
pub struct SnapshotStore {
    node_identity: Arc<NodeIdentity>,
    protocols: Protocols,
    peer_store: PeerStore,
    enable_signed_records: bool,
    current: Arc<RwLock<Arc<IdentifySnapshot>>>,
}

impl SnapshotStore {
    /// Creates the store with an initial snapshot, so `get` never observes an empty state.
    pub fn new(
        node_identity: Arc<NodeIdentity>,
        protocols: Protocols,
        peer_store: PeerStore,
        enable_signed_records: bool,
    ) -> Self {
        let store = Self {
            node_identity,
            protocols,
            peer_store,
            enable_signed_records,
            current: Arc::new(RwLock::new(Arc::new(IdentifySnapshot {
                timestamp: Utc::now(),
                protocols: Vec::new(),
                addresses: Vec::new(),
                record: None,
            }))),
        };
        store.refresh();
        store
    }

    /// The current snapshot.
    pub fn get(&self) -> Arc<IdentifySnapshot> {
        self.current.read().unwrap().clone()
    }

    /// Rebuilds the snapshot from the node identity, the protocol registry and the certified
    /// record book, and swaps it in. Returns the new snapshot.
    pub fn refresh(&self) -> Arc<IdentifySnapshot> {
        let addresses = self.node_identity.public_addresses();
        let protocols = self.protocols.get_supported_protocols();
        let previous_timestamp = self.current.read().unwrap().timestamp;
        // Wall clock, clamped so that successive snapshots never go backwards
        let timestamp = Utc::now().max(previous_timestamp);

        let record = if self.enable_signed_records {
            self.own_record(&addresses, timestamp)
        } else {
            None
        };

        let snapshot = Arc::new(IdentifySnapshot {
            timestamp,
            protocols,
            addresses,
            record,
        });
        *self.current.write().unwrap() = snapshot.clone();
        trace!(
            target: LOG_TARGET,
            "Refreshed identity snapshot ({} protocol(s), {} address(es))",
            snapshot.protocols.len(),
            snapshot.addresses.len()
        );
        snapshot
    }

    /// Fetches the local node's signed record, re-signing it when the stored copy is missing or
    /// no longer matches the advertised addresses.
    fn own_record(&self, addresses: &[Multiaddr], timestamp: DateTime<Utc>) -> Option<SignedPeerRecord> {
        let node_id = self.node_identity.node_id();
        match self.peer_store.peer_record(node_id) {
            Some(record) if record.addresses() == addresses => Some(record),
            _ => {
                let seq = timestamp.timestamp_millis().max(0) as u64;
                let record = SignedPeerRecord::sign_new(&self.node_identity, seq, addresses.to_vec());
                if let Err(err) = self.peer_store.consume_peer_record(record.clone(), AddressTtl::Connected) {
                    warn!(target: LOG_TARGET, "Failed to store own peer record: {}", err);
                }
                Some(record)
            },
        }
    }
}
