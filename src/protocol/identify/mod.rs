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

//! # Identify protocol
//!
//! Exchanges identity metadata on every connection: listen addresses, supported protocols, the
//! node's public key, version strings and the address at which each side observes the other.
//!
//! The [IdentifyService] performs a one-shot request/response identify per connection, keeps a
//! versioned [snapshot](snapshot::IdentifySnapshot) of the local node's identity, and pushes fresh
//! snapshots to all connected peers over the push protocol whenever local state changes. Received
//! messages are merged into the [peer store](crate::peer_store::PeerStore) under the address TTL
//! rules that keep stale addresses from accumulating.

use crate::protocol::ProtocolId;

mod codec;

mod config;
pub use config::IdentifyConfig;

mod error;
pub use error::IdentifyError;

mod event;
pub use event::{IdentifyEvent, IdentifyEventRx, IdentifyEventTx};

mod observed_addrs;
pub use observed_addrs::ObservedAddrManager;

mod registry;
pub use registry::{IdentifySignal, PushSupport};

mod requester;
pub use requester::IdentifyRequester;

mod snapshot;
pub use snapshot::{IdentifySnapshot, SnapshotStore};

mod service;
pub use service::IdentifyService;

#[cfg(test)]
mod test;

/// Protocol id of the request/response identify protocol.
pub const IDENTIFY_PROTOCOL: ProtocolId = ProtocolId::from_static(b"/ipfs/id/1.0.0");
/// Protocol id of the server-initiated identify push protocol.
pub const IDENTIFY_PUSH_PROTOCOL: ProtocolId = ProtocolId::from_static(b"/ipfs/id/push/1.0.0");
