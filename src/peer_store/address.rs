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

use std::time::{Duration, Instant};

use multiaddr::Multiaddr;

/// TTL class for a stored peer address. Ordered by trust/longevity:
/// `Connected` > `RecentlyConnected` > `Temp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressTtl {
    /// The peer is currently connected; the address does not expire until downgraded.
    Connected,
    /// The peer disconnected recently.
    RecentlyConnected,
    /// Holding class used while an address list is being replaced.
    Temp,
}

impl AddressTtl {
    /// Lifetime of an address in this class, `None` meaning no expiry while the class holds.
    pub fn duration(self) -> Option<Duration> {
        match self {
            AddressTtl::Connected => None,
            AddressTtl::RecentlyConnected => Some(Duration::from_secs(30 * 60)),
            AddressTtl::Temp => Some(Duration::from_secs(2 * 60)),
        }
    }

    pub(super) fn expiry_from_now(self) -> Option<Instant> {
        self.duration().map(|d| Instant::now() + d)
    }
}

/// A peer address together with its TTL class and expiry.
#[derive(Debug, Clone)]
pub struct PeerAddress {
    pub address: Multiaddr,
    pub ttl: AddressTtl,
    pub expires_at: Option<Instant>,
}

impl PeerAddress {
    pub fn new(address: Multiaddr, ttl: AddressTtl) -> Self {
        Self {
            address,
            expires_at: ttl.expiry_from_now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|t| t <= Instant::now()).unwrap_or(false)
    }

    pub(super) fn set_ttl(&mut self, ttl: AddressTtl) {
        self.ttl = ttl;
        self.expires_at = ttl.expiry_from_now();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn connected_class_does_not_expire() {
        let addr: Multiaddr = "/ip4/10.0.0.1/tcp/9000".parse().unwrap();
        let entry = PeerAddress::new(addr, AddressTtl::Connected);
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn downgrade_sets_expiry() {
        let addr: Multiaddr = "/ip4/10.0.0.1/tcp/9000".parse().unwrap();
        let mut entry = PeerAddress::new(addr, AddressTtl::Connected);
        entry.set_ttl(AddressTtl::Temp);
        assert_eq!(entry.ttl, AddressTtl::Temp);
        assert!(entry.expires_at.is_some());
    }
}
