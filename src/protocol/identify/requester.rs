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

use multiaddr::Multiaddr;
use tokio::sync::{mpsc, oneshot};

use super::{IdentifyError, IdentifyEventRx, IdentifyEventTx, IdentifySignal};
use crate::connection::{ConnectionId, PeerConnection};

/// Requests handled by the [IdentifyService](super::IdentifyService) actor.
#[derive(Debug)]
pub(super) enum IdentifyRequest {
    WaitIdentified {
        conn_id: ConnectionId,
        reply_tx: oneshot::Sender<IdentifySignal>,
    },
    GetOwnObservedAddrs(oneshot::Sender<Vec<Multiaddr>>),
    GetObservedAddrsFor {
        local: Multiaddr,
        reply_tx: oneshot::Sender<Vec<Multiaddr>>,
    },
}

/// Handle to make requests of and read events from the identify service.
#[derive(Debug, Clone)]
pub struct IdentifyRequester {
    request_tx: mpsc::Sender<IdentifyRequest>,
    event_tx: IdentifyEventTx,
}

impl IdentifyRequester {
    pub(super) fn new(request_tx: mpsc::Sender<IdentifyRequest>, event_tx: IdentifyEventTx) -> Self {
        Self { request_tx, event_tx }
    }

    /// Returns a subscription to [IdentifyEvent](super::IdentifyEvent)s.
    pub fn get_event_subscription(&self) -> IdentifyEventRx {
        self.event_tx.subscribe()
    }

    /// Blocks until the first identify exchange on the connection completes or fails. Returns
    /// immediately if it already has, or if the connection has closed.
    pub async fn identify_conn(&self, conn: &PeerConnection) -> Result<(), IdentifyError> {
        let signal = self.identify_wait(conn).await?;
        signal.await;
        Ok(())
    }

    /// Starts identification of the connection if it has not started yet and returns the shared
    /// completion latch. Does not block on the exchange itself.
    pub async fn identify_wait(&self, conn: &PeerConnection) -> Result<IdentifySignal, IdentifyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(IdentifyRequest::WaitIdentified {
                conn_id: conn.id(),
                reply_tx,
            })
            .await
            .map_err(|_| IdentifyError::ServiceShutdown)?;
        reply_rx.await.map_err(|_| IdentifyError::ServiceShutdown)
    }

    /// The addresses at which remote peers report observing this node.
    pub async fn own_observed_addrs(&self) -> Result<Vec<Multiaddr>, IdentifyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(IdentifyRequest::GetOwnObservedAddrs(reply_tx))
            .await
            .map_err(|_| IdentifyError::ServiceShutdown)?;
        reply_rx.await.map_err(|_| IdentifyError::ServiceShutdown)
    }

    /// As [own_observed_addrs](Self::own_observed_addrs), restricted to connections bound to the
    /// given local address.
    pub async fn observed_addrs_for(&self, local: Multiaddr) -> Result<Vec<Multiaddr>, IdentifyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(IdentifyRequest::GetObservedAddrsFor { local, reply_tx })
            .await
            .map_err(|_| IdentifyError::ServiceShutdown)?;
        reply_rx.await.map_err(|_| IdentifyError::ServiceShutdown)
    }
}
