/// Identity metadata exchanged on `/ipfs/id/1.0.0` and `/ipfs/id/push/1.0.0` streams.
/// All fields are optional; a logical message may arrive split over several frames that are
/// merged field-wise by the reader.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Identify {
    /// Serialized public key of the sender (raw 32-byte ed25519 encoding)
    #[prost(bytes = "vec", optional, tag = "1")]
    pub public_key: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    /// Multiaddrs the sender is listening on, in binary multiaddr encoding
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub listen_addrs: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    /// Protocol identifiers the sender supports
    #[prost(string, repeated, tag = "3")]
    pub protocols: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// The receiver's multiaddr as observed by the sender
    #[prost(bytes = "vec", optional, tag = "4")]
    pub observed_addr: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(string, optional, tag = "5")]
    pub protocol_version: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, optional, tag = "6")]
    pub agent_version: ::core::option::Option<::prost::alloc::string::String>,
    /// Signed envelope binding the sender's node id to its listen addresses
    #[prost(bytes = "vec", optional, tag = "8")]
    pub signed_peer_record: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}
