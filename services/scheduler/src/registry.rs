//! Node registry.
//!
//! Pure storage: nodes in insertion order, unique by ID. Transitions live
//! in `lifecycle`, `launcher` and `reconciler`.

use hdfs_mesos_id::TaskId;
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};
use crate::node::{Node, NodeState};

/// The set of managed nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nodes {
    nodes: Vec<Node>,
}

impl Nodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; IDs must be unique.
    pub fn add(&mut self, node: Node) -> SchedulerResult<&mut Node> {
        if self.get(node.id.as_str()).is_some() {
            return Err(SchedulerError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        let last = self.nodes.len() - 1;
        Ok(&mut self.nodes[last])
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id.as_str() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id.as_str() == id)
    }

    /// Node whose active launch has `task_id`.
    pub fn by_task(&self, task_id: &TaskId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.task_id() == Some(task_id))
    }

    pub fn by_task_mut(&mut self, task_id: &TaskId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.task_id() == Some(task_id))
    }

    /// Remove a node regardless of its state.
    pub fn remove(&mut self, id: &str) -> SchedulerResult<Node> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id.as_str() == id)
            .ok_or_else(|| SchedulerError::NodeNotFound(id.to_string()))?;
        Ok(self.nodes.remove(index))
    }

    /// All nodes in insertion order.
    pub fn all(&self) -> &[Node] {
        &self.nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    /// Nodes in `state`, in insertion order.
    pub fn in_state(&self, state: NodeState) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.state == state)
    }

    pub fn in_state_mut(&mut self, state: NodeState) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut().filter(move |n| n.state == state)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fails on the first node that violates a consistency rule.
    pub fn check(&self) -> SchedulerResult<()> {
        for node in &self.nodes {
            if let Some(reason) = node.violation() {
                return Err(SchedulerError::Inconsistent {
                    node: node.id.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }
}
