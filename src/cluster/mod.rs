//! Cluster layer: replica placement, peer wire client, and the
//! replication coordinator.
//!
//! A small static cluster of nodes, each running the same binary. Every
//! node owns a full storage engine and can coordinate any client request:
//! the coordinator fans the operation out to the key's replica set,
//! counts acknowledgements against the requested `ack/from` factor, and
//! for reads resolves the freshest version across the replies.
//!
//! Peer-to-peer requests are ordinary `/v0/entity` calls marked with
//! [`PROXY_HEADER`]; a proxied request is served from local storage only
//! and never fans out further, which is what keeps the fan-out loop-free.

pub mod coordinator;
pub mod peer;
pub mod replicas;
pub mod topology;


pub use coordinator::{ClusterError, Coordinator};
pub use replicas::ReplicasFactor;
pub use topology::Topology;

/// Marks a peer-to-peer request; the receiver serves local storage only.
pub const PROXY_HEADER: &str = "X-Proxy-For";

/// Value carried by [`PROXY_HEADER`].
pub const PROXY_HEADER_VALUE: &str = "True";

/// Replica responses carry the cell's logical timestamp (decimal
/// nanoseconds) in this header. Present on `200` and on `404` for a
/// removed key; absent on `404` for a key that never existed.
pub const TIMESTAMP_HEADER: &str = "Timestamp";

/// Proxied writes carry the absolute expiration instant (RFC1123 GMT) in
/// this header, so every replica stores an identical cell.
pub const EXPIRES_HEADER: &str = "X-Expires";
