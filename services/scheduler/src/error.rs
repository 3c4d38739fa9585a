//! Scheduler error types.

use hdfs_mesos_id::NodeId;

use crate::node::NodeState;
use crate::storage::StorageError;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors returned by registry and operator operations.
///
/// Master-driven anomalies are never errors: they are corrected on the
/// driver and logged.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("duplicate node: {0}")]
    DuplicateNode(NodeId),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node {node} is {state}, cannot {action}")]
    InvalidState {
        node: NodeId,
        state: NodeState,
        action: &'static str,
    },

    #[error("node {node} is inconsistent: {reason}")]
    Inconsistent { node: NodeId, reason: &'static str },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
