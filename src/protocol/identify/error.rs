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

use thiserror::Error;

use crate::{connection::ConnectionError, identity::NodeId};

/// Errors raised while identifying a peer. `Clone`-able so they can ride the event channel and
/// shared wait handles.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifyError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Failed to read from the identify stream: {0}")]
    ReadFailed(String),
    #[error("Failed to write to the identify stream: {0}")]
    WriteFailed(String),
    #[error("Identify message frame of {len} bytes exceeds the {cap} byte cap")]
    MessageTooLarge { len: usize, cap: usize },
    #[error("Identify message was split into too many parts")]
    TooManyParts,
    #[error("Failed to decode identify message: {0}")]
    MalformedMessage(String),
    #[error("Received a listen address that is not a valid multiaddr")]
    MalformedAddress,
    #[error("Received public key bytes that do not parse as an identity key")]
    MalformedKey,
    #[error("Public key derives node id {derived} but the connection's remote peer is {claimed}")]
    KeyPeerIdMismatch { claimed: NodeId, derived: NodeId },
    #[error("Received a second, different public key for peer {peer}")]
    KeyConflict { peer: NodeId },
    #[error("Timed out waiting for the remote identify message")]
    Timeout,
    #[error("The identify service has shut down")]
    ServiceShutdown,
}
