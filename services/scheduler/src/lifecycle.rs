//! Node transitions driven by task status updates.
//!
//! Status updates arrive at least once and in any order. A "started" report
//! is only believed for a node that is waiting for one; anything else is
//! killed. A "stopped" report while the node was not being stopped means
//! the task died, and the node goes back to STARTING to be placed again.

use hdfs_mesos_api::TaskStatus;
use tracing::{debug, info, warn};

use crate::driver::Driver;
use crate::node::{Node, NodeState};

/// Handle a "started" report for `node` (`None` if no node owns the task).
pub fn on_task_started(node: Option<&mut Node>, status: &TaskStatus, driver: &mut dyn Driver) {
    let Some(node) = node.filter(|n| n.runtime.is_some()) else {
        warn!(
            task_id = %status.task_id,
            state = %status.state,
            "Started report for unknown task, killing it"
        );
        driver.kill(&status.task_id);
        return;
    };

    match node.state {
        NodeState::Idle | NodeState::Stopping => {
            warn!(
                node_id = %node.id,
                node_state = %node.state,
                task_id = %status.task_id,
                "Started report in unexpected state, killing task"
            );
            driver.kill(&status.task_id);
        }
        NodeState::Starting | NodeState::Running | NodeState::Reconciling => {
            if node.state != NodeState::Running {
                info!(
                    node_id = %node.id,
                    from = %node.state,
                    task_id = %status.task_id,
                    "Node running"
                );
            }
            node.state = NodeState::Running;
        }
    }
}

/// Handle a "stopped" report for `node` (`None` if no node owns the task).
pub fn on_task_stopped(node: Option<&mut Node>, status: &TaskStatus) {
    let Some(node) = node else {
        debug!(
            task_id = %status.task_id,
            state = %status.state,
            "Stopped report for unknown task"
        );
        return;
    };

    match node.state {
        NodeState::Idle => {
            debug!(node_id = %node.id, "Stopped report for idle node");
        }
        NodeState::Stopping => {
            info!(
                node_id = %node.id,
                task_id = %status.task_id,
                state = %status.state,
                "Node stopped"
            );
            node.state = NodeState::Idle;
            node.clear_runtime();
        }
        NodeState::Starting | NodeState::Running | NodeState::Reconciling => {
            warn!(
                node_id = %node.id,
                from = %node.state,
                task_id = %status.task_id,
                state = %status.state,
                message = status.message.as_deref().unwrap_or(""),
                "Node task died, restarting"
            );
            node.state = NodeState::Starting;
            node.clear_runtime();
        }
    }
}
