//! hdfs-mesos scheduler core.
//!
//! Runs HDFS name nodes and data nodes as Mesos tasks. The scheduler
//! receives offers and task status updates from the master, places pending
//! nodes on offers that fit, and reconciles its view of running tasks with
//! the master after a restart.
//!
//! ## Architecture
//!
//! ```text
//! SchedulerWorker           (single control loop: events + reconcile tick)
//! └── Scheduler             (orchestrator: callbacks, version check, persistence)
//!     ├── Nodes             (registry, insertion ordered)
//!     ├── lifecycle         (started/stopped transitions)
//!     ├── launcher          (offer matching and task launch)
//!     ├── Reconciler        (bounded reconciliation retries)
//!     └── Driver            (fire-and-forget instructions to the master)
//! ```
//!
//! Every mutation runs on the worker's task, so the registry needs no locks.
//!
//! ## Modules
//!
//! - `config`: command line and defaults file, validated before the loop starts
//! - `storage`: cluster snapshot persistence
//! - `telemetry`: tracing subscriber setup

pub mod config;
pub mod driver;
pub mod error;
pub mod launcher;
pub mod lifecycle;
pub mod node;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
pub mod worker;

// Re-export commonly used types
pub use config::{Config, ConfigError, Defaults, DriverVersion, SchedulerArgs, SchedulerSettings};
pub use driver::{Driver, RecordingDriver, TaskInfo};
pub use error::{SchedulerError, SchedulerResult};
pub use launcher::{DeclineReason, OfferOutcome, Shortfall};
pub use node::{Node, NodeKind, NodeRuntime, NodeState, NodeTemplate, NodeTemplates, Reservation};
pub use reconciler::Reconciler;
pub use registry::Nodes;
pub use scheduler::Scheduler;
pub use storage::{ClusterSnapshot, FileStorage, MemoryStorage, Storage, StorageError, StorageUri};
pub use worker::{NodeCommand, SchedulerEvent, SchedulerWorker};
