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

use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const DEFAULT_PROTOCOL_VERSION: &str = "ipfs/0.1.0";

#[derive(Debug, Clone)]
pub struct IdentifyConfig {
    /// Free-form agent string advertised to peers. Default: `"<crate>/<version>"`.
    pub user_agent: String,
    /// Protocol family version advertised to peers. Default: `"ipfs/0.1.0"`.
    pub protocol_version: String,
    /// Read deadline for all incoming identify-family streams. Default: 60s
    pub stream_read_timeout: Duration,
    /// Deadline for opening a push stream and writing the snapshot to a single peer. Default: 5s
    pub push_timeout: Duration,
    /// Maximum concurrent outbound push streams within one push cycle. Default: 32
    pub max_concurrent_pushes: usize,
    /// When false, snapshots omit the signed peer record. Default: true
    pub enable_signed_peer_records: bool,
    /// Emit `PeerProtocolsUpdated` on the first (request/response) identify as well as on pushes.
    /// On first identify the "added" set is the peer's entire protocol list, so this is noise for
    /// most consumers. Default: false
    pub emit_protocol_updates_on_identify: bool,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            stream_read_timeout: Duration::from_secs(60),
            push_timeout: Duration::from_secs(5),
            max_concurrent_pushes: 32,
            enable_signed_peer_records: true,
            emit_protocol_updates_on_identify: false,
        }
    }
}
