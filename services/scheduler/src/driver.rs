//! Driver interface and recording implementation.
//!
//! The driver is the scheduler's only channel to the master. Every call is
//! fire-and-forget: the master answers, if at all, through later offers and
//! status updates. Registration, authentication and transport belong to the
//! driver implementation, not to the scheduler.
//!
//! A recording implementation is provided for tests and dry runs.

use hdfs_mesos_id::{NodeId, TaskId};
use tracing::{debug, info};

use crate::node::{Node, NodeKind, NodeRuntime, Reservation};

/// Everything the driver needs to launch one node process.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub node_id: NodeId,
    pub kind: NodeKind,
    /// Task name shown in the master UI.
    pub name: String,
    pub agent_id: String,
    pub hostname: String,
    pub resources: Reservation,
}

impl TaskInfo {
    /// Build launch info from a node that has just been given a runtime.
    ///
    /// Returns `None` if the node has no runtime or reservation.
    pub fn for_node(node: &Node) -> Option<Self> {
        let runtime = node.runtime.as_ref()?;
        let reservation = node.reservation.as_ref()?;
        Some(Self::new(node, runtime, reservation))
    }

    pub fn new(node: &Node, runtime: &NodeRuntime, reservation: &Reservation) -> Self {
        Self {
            task_id: runtime.task_id.clone(),
            node_id: node.id.clone(),
            kind: node.kind,
            name: format!("hdfs-{}", node.id),
            agent_id: runtime.agent_id.clone(),
            hostname: runtime.hostname.clone(),
            resources: reservation.clone(),
        }
    }
}

/// Instructions the scheduler sends to the master.
pub trait Driver: Send {
    /// Launch `task` on the resources of offer `offer_id`.
    fn launch(&mut self, offer_id: &str, task: TaskInfo);

    /// Return an offer unused.
    fn decline(&mut self, offer_id: &str);

    /// Kill a task.
    fn kill(&mut self, task_id: &TaskId);

    /// Ask for the state of the given tasks; an empty list asks for all
    /// tasks of this framework.
    fn reconcile(&mut self, task_ids: &[TaskId]);

    /// Stop the framework.
    fn stop(&mut self);
}

/// Driver that records every instruction.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    /// Launches as (offer id, task).
    pub launched: Vec<(String, TaskInfo)>,
    pub declined: Vec<String>,
    pub killed: Vec<TaskId>,
    /// One entry per reconcile call.
    pub reconciled: Vec<Vec<TaskId>>,
    pub stopped: bool,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything recorded so far, including `stopped`.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl Driver for RecordingDriver {
    fn launch(&mut self, offer_id: &str, task: TaskInfo) {
        info!(
            offer_id,
            task_id = %task.task_id,
            node_id = %task.node_id,
            hostname = %task.hostname,
            cpus = task.resources.cpus,
            mem = task.resources.mem,
            "[RECORDING] Launch task"
        );
        self.launched.push((offer_id.to_string(), task));
    }

    fn decline(&mut self, offer_id: &str) {
        debug!(offer_id, "[RECORDING] Decline offer");
        self.declined.push(offer_id.to_string());
    }

    fn kill(&mut self, task_id: &TaskId) {
        info!(task_id = %task_id, "[RECORDING] Kill task");
        self.killed.push(task_id.clone());
    }

    fn reconcile(&mut self, task_ids: &[TaskId]) {
        debug!(count = task_ids.len(), "[RECORDING] Reconcile tasks");
        self.reconciled.push(task_ids.to_vec());
    }

    fn stop(&mut self) {
        info!("[RECORDING] Stop driver");
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeTemplate;
    use hdfs_mesos_api::Offer;

    #[test]
    fn test_task_info_requires_runtime() {
        let node = Node::new(
            NodeId::parse("nn").unwrap(),
            NodeKind::NameNode,
            &NodeTemplate::NAMENODE,
        );
        assert!(TaskInfo::for_node(&node).is_none());
    }

    #[test]
    fn test_task_info_from_runtime() {
        let mut node = Node::new(
            NodeId::parse("nn").unwrap(),
            NodeKind::NameNode,
            &NodeTemplate::NAMENODE,
        );
        let offer: Offer = "agent:s0, hostname:h0, resources:[cpus:1;mem:1024;ports:10..20]"
            .parse()
            .unwrap();
        node.init_runtime(&offer);

        let task = TaskInfo::for_node(&node).unwrap();
        assert_eq!(task.name, "hdfs-nn");
        assert_eq!(task.hostname, "h0");
        assert_eq!(task.resources.ports, vec![10, 11]);
        assert_eq!(Some(&task.task_id), node.task_id());
    }

    #[test]
    fn test_recording_driver_records() {
        let mut driver = RecordingDriver::new();
        let task_id = TaskId::parse("t1").unwrap();

        driver.decline("o1");
        driver.kill(&task_id);
        driver.reconcile(&[]);
        driver.stop();

        assert_eq!(driver.declined, vec!["o1".to_string()]);
        assert_eq!(driver.killed, vec![task_id]);
        assert_eq!(driver.reconciled, vec![Vec::<TaskId>::new()]);
        assert!(driver.stopped);

        driver.clear();
        assert!(!driver.stopped);
        assert!(driver.reconciled.is_empty());
    }
}
