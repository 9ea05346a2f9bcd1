//! Authoritative simulation loop, rigid-body physics, and interest-managed
//! replication for a real-time 2D multiplayer game engine.
//!
//! Four cooperating modules, leaves-first:
//! - [`object`]: the authoritative object model and update-strategy
//!   pipeline.
//! - [`physics`]: rigid-body integration, broad/narrow-phase collision
//!   detection, and the sequential-impulse constraint solver.
//! - [`sim`]: the fixed-rate tick loop driving `object` and `physics`
//!   together.
//! - [`replication`]: the framed-TCP wire protocol and per-client interest
//!   management that ships `object` state to connected clients.
//!
//! [`engine::Engine`] wires all four together for an embedding binary;
//! [`config`] holds the plain settings structs each layer is constructed
//! with (spec §9 "Process-wide singletons... → construction-time
//! injection" — nothing here reads from a global).

pub mod config;
pub mod engine;
pub mod object;
pub mod physics;
pub mod replication;
pub mod sim;

pub use config::{ClientConfig, ServerConfig};
pub use engine::Engine;
