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

//! Aggregates the addresses at which remote peers report observing this node.
//!
//! One observation is tracked per connection (replacing any earlier one from the same
//! connection). An address is considered externally visible once at least
//! [OBSERVATION_ACTIVATION_THRESHOLD] distinct peers have reported it within the observation
//! window.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use multiaddr::Multiaddr;

use crate::{
    connection::{ConnectionId, PeerConnection},
    identity::NodeId,
};

/// Distinct observers required before an observed address is reported.
pub const OBSERVATION_ACTIVATION_THRESHOLD: usize = 2;
/// Observations older than this are ignored.
pub const OBSERVATION_TTL: Duration = Duration::from_secs(30 * 60);

struct Observation {
    observer: NodeId,
    local_address: Multiaddr,
    observed_address: Multiaddr,
    seen_at: Instant,
}

impl Observation {
    fn is_expired(&self) -> bool {
        self.seen_at.elapsed() > OBSERVATION_TTL
    }
}

#[derive(Default)]
struct Inner {
    observations: HashMap<ConnectionId, Observation>,
    closed: bool,
}

/// Tracks per-connection address observations and derives the set of externally visible
/// addresses.
#[derive(Default)]
pub struct ObservedAddrManager {
    inner: Mutex<Inner>,
}

impl ObservedAddrManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records that the peer on `conn` observes this node at `observed_address`.
    pub fn record(&self, conn: &PeerConnection, observed_address: Multiaddr) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        inner.observations.insert(conn.id(), Observation {
            observer: conn.peer_node_id().clone(),
            local_address: conn.local_address().clone(),
            observed_address,
            seen_at: Instant::now(),
        });
    }

    /// The addresses enough distinct peers have observed this node at.
    pub fn addrs(&self) -> Vec<Multiaddr> {
        self.filtered_addrs(|_| true)
    }

    /// As [addrs](Self::addrs), restricted to observations made on connections bound to `local`.
    pub fn addrs_for(&self, local: &Multiaddr) -> Vec<Multiaddr> {
        self.filtered_addrs(|obs| &obs.local_address == local)
    }

    fn filtered_addrs<P: Fn(&Observation) -> bool>(&self, predicate: P) -> Vec<Multiaddr> {
        let inner = self.inner.lock().unwrap();
        let mut observers: HashMap<&Multiaddr, Vec<&NodeId>> = HashMap::new();
        for obs in inner.observations.values() {
            if obs.is_expired() || !predicate(obs) {
                continue;
            }
            let entry = observers.entry(&obs.observed_address).or_default();
            if !entry.contains(&&obs.observer) {
                entry.push(&obs.observer);
            }
        }
        let mut counted: Vec<(&Multiaddr, usize)> = observers
            .into_iter()
            .filter_map(|(addr, observers)| {
                (observers.len() >= OBSERVATION_ACTIVATION_THRESHOLD).then_some((addr, observers.len()))
            })
            .collect();
        // Most corroborated first
        counted.sort_by(|a, b| b.1.cmp(&a.1));
        counted.into_iter().map(|(addr, _)| addr.clone()).collect()
    }

    /// Forgets the observation made on a now-closed connection.
    pub fn remove_connection(&self, conn_id: ConnectionId) {
        self.inner.lock().unwrap().observations.remove(&conn_id);
    }

    /// Stops accepting observations and clears state.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        inner.observations.clear();
    }
}
