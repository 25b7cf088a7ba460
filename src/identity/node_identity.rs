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

use std::{fmt, sync::RwLock};

use ed25519_dalek::Signer;
use multiaddr::Multiaddr;
use rand::{CryptoRng, Rng};

use crate::{
    identity::NodeId,
    types::{NodePublicKey, NodeSecretKey, NodeSignature},
};

/// The local node's identity: its keypair, derived node id and the listen addresses it is
/// prepared to advertise. Addresses may change at runtime; the keypair never does.
pub struct NodeIdentity {
    node_id: NodeId,
    public_key: NodePublicKey,
    secret_key: NodeSecretKey,
    public_addresses: RwLock<Vec<Multiaddr>>,
}

impl NodeIdentity {
    pub fn new(secret_key: NodeSecretKey, public_addresses: Vec<Multiaddr>) -> Self {
        let public_key = secret_key.verifying_key();
        let node_id = NodeId::from_public_key(&public_key);
        Self {
            node_id,
            public_key,
            secret_key,
            public_addresses: RwLock::new(public_addresses),
        }
    }

    /// Generates a new random identity.
    pub fn random<R: CryptoRng + Rng>(rng: &mut R, public_addresses: Vec<Multiaddr>) -> Self {
        Self::new(NodeSecretKey::generate(rng), public_addresses)
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn public_key(&self) -> &NodePublicKey {
        &self.public_key
    }

    pub fn public_addresses(&self) -> Vec<Multiaddr> {
        self.public_addresses.read().unwrap().clone()
    }

    /// Replaces the advertised address list. The caller is responsible for announcing the change
    /// on the local node event channel.
    pub fn set_public_addresses(&self, addresses: Vec<Multiaddr>) {
        *self.public_addresses.write().unwrap() = addresses;
    }

    pub fn add_public_address(&self, address: Multiaddr) {
        let mut lock = self.public_addresses.write().unwrap();
        if !lock.contains(&address) {
            lock.push(address);
        }
    }

    /// Signs a message with this node's identity key.
    pub fn sign_message(&self, message: &[u8]) -> NodeSignature {
        self.secret_key.sign(message)
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("node_id", &self.node_id)
            .field("public_addresses", &self.public_addresses.read().unwrap())
            .finish()
    }
}
