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

//! Service cancellation.
//!
//! A [Shutdown] is held by whoever owns a service's lifecycle; every task belonging to the
//! service carries a cloned [ShutdownSignal]. Triggering the shutdown (or dropping it) resolves
//! all signals, so tasks observe cancellation whether the owner shut down deliberately or simply
//! went away.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    channel::oneshot,
    future::{FusedFuture, Shared},
    FutureExt,
};

/// Cancellation trigger for a service and the tasks it spawns. Fires at most once.
#[derive(Debug)]
pub struct Shutdown {
    sender: Option<oneshot::Sender<()>>,
    signal: ShutdownSignal,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            sender: Some(tx),
            signal: ShutdownSignal {
                inner: rx.shared(),
            },
        }
    }

    /// Triggers the shutdown. Subsequent calls have no effect.
    pub fn trigger(&mut self) {
        if let Some(tx) = self.sender.take() {
            let _result = tx.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.sender.is_none()
    }

    pub fn to_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves when the owning [Shutdown] is triggered or dropped. Cheap to clone; all clones
/// resolve together.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    inner: Shared<oneshot::Receiver<()>>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal. Usable directly in `select!` branches.
    pub fn wait(&mut self) -> &mut Self {
        self
    }

    /// Whether the shutdown has been observed by this signal. Best-effort between polls; tasks
    /// that must react promptly should `wait()` in their select loop instead.
    pub fn is_triggered(&self) -> bool {
        self.inner.peek().is_some() || self.inner.is_terminated()
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Shared panics if repolled after completion; latch on terminated instead so the signal
        // can sit in a select loop indefinitely
        if self.inner.is_terminated() {
            return Poll::Ready(());
        }
        // Ok(()) is a deliberate trigger, Err is the owner dropping; both mean stop
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedFuture for ShutdownSignal {
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn trigger_resolves_all_signals() {
        let mut shutdown = Shutdown::new();
        let mut first = shutdown.to_signal();
        let second = shutdown.to_signal();
        assert!(!shutdown.is_triggered());

        shutdown.trigger();
        // Triggering twice is a no-op
        shutdown.trigger();
        assert!(shutdown.is_triggered());

        first.wait().await;
        second.await;
        assert!(first.is_triggered());
    }

    #[tokio::test]
    async fn dropping_the_owner_resolves_signals() {
        let shutdown = Shutdown::new();
        let signal = shutdown.to_signal();
        drop(shutdown);
        signal.await;
    }

    #[tokio::test]
    async fn resolved_signal_stays_resolved() {
        let mut shutdown = Shutdown::new();
        let mut signal = shutdown.to_signal();
        shutdown.trigger();
        signal.wait().await;
        // A terminated signal can be awaited again without panicking
        signal.wait().await;
    }
}
