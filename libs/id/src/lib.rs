//! # hdfs-mesos-id
//!
//! Identifiers used by the hdfs-mesos scheduler.
//!
//! ## Design Principles
//!
//! - Node IDs are chosen by the operator and must stay stable across restarts
//! - Task IDs are generated by the scheduler, one per launch attempt
//! - Task IDs received from the master are opaque and accepted as-is
//!
//! ## ID Format
//!
//! Node IDs are short labels: `nn`, `dn-0`, `dn.rack1`.
//!
//! Task IDs are `{node_id}-{ulid}`:
//! - `nn-01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `dn-0-01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//!
//! The node prefix keeps task IDs readable in master UIs; the ULID suffix
//! makes every launch attempt unique.

mod error;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
