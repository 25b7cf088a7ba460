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

//! Protocol identifiers and the registry that routes inbound substreams to protocol handlers.

pub mod identify;

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::connection::{PeerConnection, Substream};

/// A protocol identifier, e.g. `b"/ipfs/id/1.0.0"`.
pub type ProtocolId = Bytes;

/// Converts a wire protocol string into a [ProtocolId].
pub fn protocol_id_from_str(s: &str) -> ProtocolId {
    Bytes::copy_from_slice(s.as_bytes())
}

/// Renders a [ProtocolId] as the wire protocol string.
pub fn protocol_id_to_string(id: &ProtocolId) -> String {
    String::from_utf8_lossy(id).into_owned()
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("No handler is registered for the protocol")]
    ProtocolNotRegistered,
    #[error("Failed to notify the protocol handler (receiver closed)")]
    NotificationSendFailed,
}

/// Notification of protocol activity delivered by the transport to the registered handler.
#[derive(Debug)]
pub struct ProtocolNotification {
    pub protocol: ProtocolId,
    pub event: ProtocolEvent,
}

impl ProtocolNotification {
    pub fn new(protocol: ProtocolId, event: ProtocolEvent) -> Self {
        Self { protocol, event }
    }
}

pub enum ProtocolEvent {
    /// The remote end of `PeerConnection` opened and negotiated a substream for the protocol.
    NewInboundSubstream(Box<PeerConnection>, Substream),
}

impl fmt::Debug for ProtocolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolEvent::NewInboundSubstream(conn, _) => {
                write!(f, "NewInboundSubstream({}, ...)", conn)
            },
        }
    }
}

/// Registry of protocol handlers. Registration order is preserved; the ordered id list is what
/// the node advertises as its supported protocols.
#[derive(Clone)]
pub struct Protocols {
    inner: Arc<RwLock<Vec<(ProtocolId, mpsc::Sender<ProtocolNotification>)>>>,
}

impl Protocols {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Registers a handler for the given protocols. Re-registering an id replaces its handler
    /// without changing its position.
    pub fn add(&self, protocols: &[ProtocolId], notifier: &mpsc::Sender<ProtocolNotification>) {
        let mut inner = self.inner.write().unwrap();
        for protocol in protocols {
            match inner.iter_mut().find(|(id, _)| id == protocol) {
                Some(entry) => entry.1 = notifier.clone(),
                None => inner.push((protocol.clone(), notifier.clone())),
            }
        }
    }

    /// Removes the given protocols from the registry.
    pub fn remove(&self, protocols: &[ProtocolId]) {
        self.inner
            .write()
            .unwrap()
            .retain(|(id, _)| !protocols.contains(id));
    }

    pub fn get_supported_protocols(&self) -> Vec<ProtocolId> {
        self.inner.read().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Delivers an inbound-substream event to the handler registered for `protocol`.
    pub async fn notify(&self, protocol: &ProtocolId, event: ProtocolEvent) -> Result<(), ProtocolError> {
        let notifier = self
            .inner
            .read()
            .unwrap()
            .iter()
            .find(|(id, _)| id == protocol)
            .map(|(_, tx)| tx.clone())
            .ok_or(ProtocolError::ProtocolNotRegistered)?;

        notifier
            .send(ProtocolNotification::new(protocol.clone(), event))
            .await
            .map_err(|_| ProtocolError::NotificationSendFailed)
    }
}

impl Default for Protocols {
    fn default() -> Self {
        Self::new()
    }
}
