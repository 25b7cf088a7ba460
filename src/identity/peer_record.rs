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

use std::convert::TryFrom;

use digest::Digest;
use ed25519_dalek::Verifier;
use multiaddr::Multiaddr;
use prost::Message;
use thiserror::Error;

use crate::{
    identity::{NodeId, NodeIdentity},
    proto,
    types::{Challenge, NodePublicKey, NodeSignature, NODE_PUBLIC_KEY_LENGTH},
};

/// Domain separator for peer-record signatures.
const PEER_RECORD_DOMAIN: &[u8] = b"peermesh-signed-peer-record-v1";
/// Payload type carried in the envelope.
const PEER_RECORD_PAYLOAD_TYPE: &[u8] = b"/peermesh/peer-record";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignedPeerRecordError {
    #[error("Failed to decode envelope: {0}")]
    DecodeFailed(String),
    #[error("Envelope public key is not a valid identity key")]
    InvalidPublicKey,
    #[error("Envelope payload type is not a peer record")]
    UnexpectedPayloadType,
    #[error("Envelope signature is invalid")]
    InvalidSignature,
    #[error("Record peer id does not match the signing key")]
    PeerIdMismatch,
    #[error("Record contains an invalid multiaddr")]
    InvalidAddress,
}

/// A signed binding of a node id to a set of listen addresses.
///
/// The wire form is an [Envelope](crate::proto::envelope::Envelope) whose payload is a
/// [PeerRecord](crate::proto::envelope::PeerRecord). Decoding verifies the signature and the
/// key-to-peer-id binding; a decoded value is therefore always authentic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPeerRecord {
    public_key: NodePublicKey,
    peer: NodeId,
    seq: u64,
    addresses: Vec<Multiaddr>,
    signature: NodeSignature,
}

impl SignedPeerRecord {
    /// Signs a fresh record for the given identity. `seq` must be strictly greater than any
    /// previously published record for consumers to accept it.
    pub fn sign_new(identity: &NodeIdentity, seq: u64, addresses: Vec<Multiaddr>) -> Self {
        let payload = encode_payload(identity.node_id(), seq, &addresses);
        let challenge = construct_challenge(&payload);
        let signature = identity.sign_message(&challenge);
        Self {
            public_key: *identity.public_key(),
            peer: identity.node_id().clone(),
            seq,
            addresses,
            signature,
        }
    }

    pub fn peer(&self) -> &NodeId {
        &self.peer
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn addresses(&self) -> &[Multiaddr] {
        &self.addresses
    }

    pub fn public_key(&self) -> &NodePublicKey {
        &self.public_key
    }

    /// Encodes the record as a signed envelope.
    pub fn to_bytes(&self) -> Vec<u8> {
        let envelope = proto::envelope::Envelope {
            public_key: self.public_key.as_bytes().to_vec(),
            payload_type: PEER_RECORD_PAYLOAD_TYPE.to_vec(),
            payload: encode_payload(&self.peer, self.seq, &self.addresses),
            signature: self.signature.to_bytes().to_vec(),
        };
        envelope.encode_to_vec()
    }

    /// Decodes and authenticates a signed envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignedPeerRecordError> {
        let envelope = proto::envelope::Envelope::decode(bytes)
            .map_err(|err| SignedPeerRecordError::DecodeFailed(err.to_string()))?;

        if envelope.payload_type != PEER_RECORD_PAYLOAD_TYPE {
            return Err(SignedPeerRecordError::UnexpectedPayloadType);
        }

        let key_bytes = <[u8; NODE_PUBLIC_KEY_LENGTH]>::try_from(envelope.public_key.as_slice())
            .map_err(|_| SignedPeerRecordError::InvalidPublicKey)?;
        let public_key =
            NodePublicKey::from_bytes(&key_bytes).map_err(|_| SignedPeerRecordError::InvalidPublicKey)?;

        let signature = NodeSignature::from_slice(&envelope.signature)
            .map_err(|_| SignedPeerRecordError::InvalidSignature)?;
        let challenge = construct_challenge(&envelope.payload);
        public_key
            .verify(&challenge, &signature)
            .map_err(|_| SignedPeerRecordError::InvalidSignature)?;

        let record = proto::envelope::PeerRecord::decode(envelope.payload.as_slice())
            .map_err(|err| SignedPeerRecordError::DecodeFailed(err.to_string()))?;

        let peer = NodeId::try_from(record.peer_id.as_slice())
            .map_err(|_| SignedPeerRecordError::PeerIdMismatch)?;
        if peer != NodeId::from_public_key(&public_key) {
            return Err(SignedPeerRecordError::PeerIdMismatch);
        }

        let addresses = record
            .addresses
            .into_iter()
            .map(|a| Multiaddr::try_from(a.multiaddr).map_err(|_| SignedPeerRecordError::InvalidAddress))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            public_key,
            peer,
            seq: record.seq,
            addresses,
            signature,
        })
    }
}

fn encode_payload(peer: &NodeId, seq: u64, addresses: &[Multiaddr]) -> Vec<u8> {
    proto::envelope::PeerRecord {
        peer_id: peer.to_vec(),
        seq,
        addresses: addresses
            .iter()
            .map(|a| proto::envelope::peer_record::AddressInfo { multiaddr: a.to_vec() })
            .collect(),
    }
    .encode_to_vec()
}

fn construct_challenge(payload: &[u8]) -> Vec<u8> {
    Challenge::new()
        .chain_update((PEER_RECORD_DOMAIN.len() as u64).to_le_bytes())
        .chain_update(PEER_RECORD_DOMAIN)
        .chain_update((PEER_RECORD_PAYLOAD_TYPE.len() as u64).to_le_bytes())
        .chain_update(PEER_RECORD_PAYLOAD_TYPE)
        .chain_update((payload.len() as u64).to_le_bytes())
        .chain_update(payload)
        .finalize()
        .to_vec()
}
