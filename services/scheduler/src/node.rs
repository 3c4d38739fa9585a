//! Managed nodes and their per-launch runtime.
//!
//! A node is either a name node or a data node. Its declared needs come
//! from the per-kind template and may be adjusted by the operator. While a
//! task is active (or being reconciled) the node carries a [`NodeRuntime`];
//! while resources are committed for that task it carries a
//! [`Reservation`].

use std::collections::BTreeMap;
use std::fmt;

use hdfs_mesos_api::{Offer, Resources};
use hdfs_mesos_id::{NodeId, TaskId};
use serde::{Deserialize, Serialize};

/// Node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    NameNode,
    DataNode,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NameNode => "namenode",
            Self::DataNode => "datanode",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// No task, not wanted.
    Idle,
    /// Wanted; waiting for an offer, or launched and awaiting confirmation.
    Starting,
    /// Task confirmed up.
    Running,
    /// Kill requested, awaiting confirmation.
    Stopping,
    /// Task state unknown after a (re)start; asking the master.
    Reconciling,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Reconciling => "reconciling",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource needs of one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub cpus: f64,
    /// Memory in MB.
    pub mem: i64,
    /// Number of ports the node process binds.
    pub ports: usize,
}

impl NodeTemplate {
    /// Name node: http and ipc ports.
    pub const NAMENODE: Self = Self {
        cpus: 0.5,
        mem: 512,
        ports: 2,
    };

    /// Data node: http, ipc and data ports.
    pub const DATANODE: Self = Self {
        cpus: 0.5,
        mem: 512,
        ports: 3,
    };
}

/// Templates for both node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplates {
    pub namenode: NodeTemplate,
    pub datanode: NodeTemplate,
}

impl NodeTemplates {
    pub fn for_kind(&self, kind: NodeKind) -> &NodeTemplate {
        match kind {
            NodeKind::NameNode => &self.namenode,
            NodeKind::DataNode => &self.datanode,
        }
    }
}

impl Default for NodeTemplates {
    fn default() -> Self {
        Self {
            namenode: NodeTemplate::NAMENODE,
            datanode: NodeTemplate::DATANODE,
        }
    }
}

/// Where and as which task a node is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRuntime {
    pub task_id: TaskId,
    pub agent_id: String,
    pub hostname: String,
    /// Attributes reported by the host.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Ports assigned to the node process.
    #[serde(default)]
    pub ports: Vec<u16>,
}

/// Resources committed from an offer for one launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub cpus: f64,
    pub mem: i64,
    #[serde(default)]
    pub ports: Vec<u16>,
}

/// A managed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub cpus: f64,
    pub mem: i64,
    pub ports: usize,
    pub state: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<NodeRuntime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
}

impl Node {
    /// Create an idle node with the needs of `template`.
    pub fn new(id: NodeId, kind: NodeKind, template: &NodeTemplate) -> Self {
        Self {
            id,
            kind,
            cpus: template.cpus,
            mem: template.mem,
            ports: template.ports,
            state: NodeState::Idle,
            runtime: None,
            reservation: None,
        }
    }

    /// Task ID of the active launch, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        self.runtime.as_ref().map(|r| &r.task_id)
    }

    /// Wanted but not yet placed on an offer.
    pub fn is_pending(&self) -> bool {
        self.state == NodeState::Starting && self.runtime.is_none()
    }

    /// Reserve what `resources` can give towards this node's needs.
    ///
    /// Each amount is capped at the need, so a reservation smaller than the
    /// need signals a shortfall. Ports are the first ones offered.
    pub fn reserve(&self, resources: &Resources) -> Reservation {
        let offered_mem = resources.mem.max(0.0).floor() as i64;
        let available = usize::try_from(resources.ports.count())
            .unwrap_or(usize::MAX);
        let ports = resources
            .ports
            .take(self.ports.min(available))
            .unwrap_or_default();

        Reservation {
            cpus: resources.cpus.min(self.cpus),
            mem: offered_mem.min(self.mem),
            ports,
        }
    }

    /// Attach a fresh runtime and reservation built from `offer`.
    ///
    /// Does not check sufficiency or state.
    pub fn init_runtime(&mut self, offer: &Offer) -> &NodeRuntime {
        let reservation = self.reserve(&offer.resources);
        let runtime = NodeRuntime {
            task_id: TaskId::generate(&self.id),
            agent_id: offer.agent_id.clone(),
            hostname: offer.hostname.clone(),
            attributes: offer.attributes.clone(),
            ports: reservation.ports.clone(),
        };

        self.reservation = Some(reservation);
        self.runtime.insert(runtime)
    }

    /// Drop runtime and reservation.
    pub fn clear_runtime(&mut self) {
        self.runtime = None;
        self.reservation = None;
    }

    /// First violated consistency rule, if any.
    ///
    /// A STARTING node may or may not have a runtime: without one it waits
    /// for an offer, with one it waits for the task to come up.
    pub fn violation(&self) -> Option<&'static str> {
        let has_runtime = self.runtime.is_some();

        if self.reservation.is_some() && !has_runtime {
            return Some("reservation without runtime");
        }

        match self.state {
            NodeState::Idle if has_runtime => Some("idle node with runtime"),
            NodeState::Running | NodeState::Stopping | NodeState::Reconciling if !has_runtime => {
                Some("active node without runtime")
            }
            _ => None,
        }
    }
}
