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
    fmt,
    hash::{Hash, Hasher},
};

use blake2::Blake2b512;
use digest::Digest;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::NodePublicKey;

const NODE_ID_ARRAY_SIZE: usize = 13;
type NodeIdArray = [u8; NODE_ID_ARRAY_SIZE];

#[derive(Debug, Error, Clone)]
pub enum NodeIdError {
    #[error("Incorrect byte count (expected {} bytes)", NODE_ID_ARRAY_SIZE)]
    IncorrectByteCount,
}

/// A node identifier, derived from the node's public identity key by truncated Blake2b-512.
/// Two peers with the same `NodeId` claim the same identity key.
#[derive(Clone, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(NodeIdArray);

impl NodeId {
    pub fn new() -> Self {
        Default::default()
    }

    /// Derive a node id from a public identity key.
    pub fn from_public_key(public_key: &NodePublicKey) -> Self {
        let digest = Blake2b512::digest(public_key.as_bytes());
        let mut bytes = [0u8; NODE_ID_ARRAY_SIZE];
        bytes.copy_from_slice(&digest[..NODE_ID_ARRAY_SIZE]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Shortened hex representation, for log readability.
    pub fn short_str(&self) -> String {
        let hex = self.to_hex();
        hex[..8.min(hex.len())].to_string()
    }

    fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub const fn byte_size() -> usize {
        NODE_ID_ARRAY_SIZE
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &NodeId) -> bool {
        self.0 == other.0
    }
}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl TryFrom<&[u8]> for NodeId {
    type Error = NodeIdError;

    fn try_from(elements: &[u8]) -> Result<Self, Self::Error> {
        if elements.len() != NODE_ID_ARRAY_SIZE {
            return Err(NodeIdError::IncorrectByteCount);
        }
        let mut bytes = [0u8; NODE_ID_ARRAY_SIZE];
        bytes.copy_from_slice(elements);
        Ok(NodeId(bytes))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}
