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

use std::fmt;

use tokio::sync::broadcast;

use super::IdentifyError;
use crate::{identity::NodeId, protocol::ProtocolId};

/// Identify event broadcast receiver.
pub type IdentifyEventRx = broadcast::Receiver<IdentifyEvent>;
/// Identify event broadcast sender.
pub type IdentifyEventTx = broadcast::Sender<IdentifyEvent>;

/// Events emitted by the identify service.
#[derive(Debug, Clone)]
pub enum IdentifyEvent {
    /// The first identify exchange on a connection to this peer completed
    IdentificationCompleted(NodeId),
    /// The identify exchange failed; the connection may still be usable
    IdentificationFailed(NodeId, IdentifyError),
    /// A push from the peer changed its advertised protocol set
    PeerProtocolsUpdated {
        node_id: NodeId,
        added: Vec<ProtocolId>,
        removed: Vec<ProtocolId>,
    },
}

impl fmt::Display for IdentifyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifyEvent::IdentificationCompleted(node_id) => {
                write!(f, "IdentificationCompleted({})", node_id.short_str())
            },
            IdentifyEvent::IdentificationFailed(node_id, err) => {
                write!(f, "IdentificationFailed({}, {})", node_id.short_str(), err)
            },
            IdentifyEvent::PeerProtocolsUpdated { node_id, added, removed } => write!(
                f,
                "PeerProtocolsUpdated({}, +{}, -{})",
                node_id.short_str(),
                added.len(),
                removed.len()
            ),
        }
    }
}
