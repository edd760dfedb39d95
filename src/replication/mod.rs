//! Replication subsystem
//!
//! This module contains both sides of the master→replica protocol: the
//! process-wide replication state (role, replication ID, offsets, replica
//! registry), the master-side propagation path, and the replica-side
//! handshake and apply loop.

pub mod master;
pub mod replica;
pub mod state;

// Re-export for convenience
pub use state::{ReplicationState, Role};
