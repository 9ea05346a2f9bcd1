//! Interest-managed replication protocol (spec §4.D) over a framed TCP
//! transport (spec §6 wire protocol), plus the client-side replica that
//! consumes it.

pub mod client;
pub mod client_replica;
pub mod record;
pub mod transport;
pub mod wire;

pub use client::{ClientId, ClientState, ClientTable};
pub use client_replica::{ClientReplica, ClientReplicaConfig};
pub use record::Record;
pub use transport::TransportError;
pub use wire::WireError;
