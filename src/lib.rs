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

//! # Peermesh comms
//!
//! Peer-to-peer comms primitives for the Peermesh network stack. The centrepiece of this crate is
//! the [identify service](crate::protocol::identify): a long-lived engine that exchanges identity
//! metadata (listen addresses, supported protocols, public key, versions) on every connection,
//! maintains a versioned snapshot of the local node's own identity, and pushes snapshot updates to
//! connected peers as local state changes.

pub mod connection;
pub mod event;
pub mod identity;
pub mod peer_store;
pub mod proto;
pub mod protocol;
pub mod shutdown;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use multiaddr;

pub use self::{
    connection::{ConnectionDirection, ConnectionId, PeerConnection},
    identity::{NodeId, NodeIdentity},
    peer_store::PeerStore,
};
