/// Signed wrapper for a typed payload. The signature covers a domain-separated digest of the
/// payload type and payload bytes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    /// Public key that produced `signature` (raw 32-byte ed25519 encoding)
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: ::prost::alloc::vec::Vec<u8>,
    /// Identifies the payload schema
    #[prost(bytes = "vec", tag = "2")]
    pub payload_type: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub signature: ::prost::alloc::vec::Vec<u8>,
}
/// Payload of a signed peer record: the binding of a node id to its addresses at a point in time.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PeerRecord {
    #[prost(bytes = "vec", tag = "1")]
    pub peer_id: ::prost::alloc::vec::Vec<u8>,
    /// Strictly increasing per signer; consumers reject stale records
    #[prost(uint64, tag = "2")]
    pub seq: u64,
    #[prost(message, repeated, tag = "3")]
    pub addresses: ::prost::alloc::vec::Vec<peer_record::AddressInfo>,
}
/// Nested message and enum types in `PeerRecord`.
pub mod peer_record {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AddressInfo {
        #[prost(bytes = "vec", tag = "1")]
        pub multiaddr: ::prost::alloc::vec::Vec<u8>,
    }
}
