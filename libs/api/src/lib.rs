//! # hdfs-mesos-api
//!
//! Data the scheduler consumes from the cluster master.
//!
//! ## Types
//!
//! - [`Offer`]: a single-use grant of cpus, memory and port ranges on one host
//! - [`TaskStatus`]: an asynchronous report about one launched task
//! - [`Master`]: the master descriptor received on (re-)registration
//!
//! ## Compact descriptors
//!
//! Every type parses from a compact `key:value, ...` notation, which is
//! what the scheduler prints in its logs and what tests use to build
//! fixtures:
//!
//! ```text
//! hostname:slave0, resources:[cpus:2;mem:2048;ports:31000..31010], attributes:[rack=r1]
//! id:nn-01HV4Z2WQXKJNM8GPQY6VBKC3D, state:running
//! version:0.28.2
//! ```

mod descriptor;
mod error;
mod master;
mod offer;
mod status;

pub use error::ApiError;
pub use master::{Master, MIN_MASTER_VERSION};
pub use offer::{Offer, Range, Ranges, Resources};
pub use status::{StatusClass, TaskState, TaskStatus};
