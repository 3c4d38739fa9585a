//! Offer matching and task launch.
//!
//! Placement is first-fit: the first pending node in registry order gets
//! the offer if the offer covers its needs. Needs are checked in a fixed
//! order (cpus, mem, ports) and the first one short is reported.

use std::fmt;

use hdfs_mesos_api::Offer;
use hdfs_mesos_id::{NodeId, TaskId};
use tracing::info;

use crate::driver::{Driver, TaskInfo};
use crate::error::{SchedulerError, SchedulerResult};
use crate::node::{Node, Reservation};
use crate::registry::Nodes;

/// The first need an offer falls short of.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shortfall {
    Cpus(f64),
    Mem(i64),
    Ports(usize),
}

impl fmt::Display for Shortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Debug keeps the fractional part: `2.0`, not `2`.
            Self::Cpus(required) => write!(f, "cpus < {required:?}"),
            Self::Mem(required) => write!(f, "mem < {required}"),
            Self::Ports(required) => write!(f, "ports < {required}"),
        }
    }
}

/// Why an offer was not used.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclineReason {
    /// Reconciliation in progress; nothing is placed until it ends.
    Reconciling,
    /// No node is waiting for placement.
    NothingToStart,
    /// The first pending node does not fit.
    Insufficient { node: NodeId, shortfall: Shortfall },
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconciling => f.write_str("reconciling"),
            Self::NothingToStart => f.write_str("nothing to start"),
            Self::Insufficient { node, shortfall } => write!(f, "node {node}: {shortfall}"),
        }
    }
}

/// Result of offering resources to the scheduler.
///
/// Declining is the normal negative outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferOutcome {
    Launched { node: NodeId, task_id: TaskId },
    Declined(DeclineReason),
}

impl OfferOutcome {
    pub fn is_launched(&self) -> bool {
        matches!(self, Self::Launched { .. })
    }

    pub fn decline_reason(&self) -> Option<&DeclineReason> {
        match self {
            Self::Declined(reason) => Some(reason),
            Self::Launched { .. } => None,
        }
    }
}

/// First need `reservation` does not cover, checked cpus, mem, ports.
pub fn shortfall(node: &Node, reservation: &Reservation) -> Option<Shortfall> {
    if reservation.cpus < node.cpus {
        return Some(Shortfall::Cpus(node.cpus));
    }
    if reservation.mem < node.mem {
        return Some(Shortfall::Mem(node.mem));
    }
    if reservation.ports.len() < node.ports {
        return Some(Shortfall::Ports(node.ports));
    }
    None
}

/// Place the first pending node on `offer`, if it fits.
///
/// Nothing is touched unless the node fits.
pub fn match_offer(nodes: &mut Nodes, offer: &Offer, driver: &mut dyn Driver) -> OfferOutcome {
    let Some(node) = nodes.iter_mut().find(|n| n.is_pending()) else {
        return OfferOutcome::Declined(DeclineReason::NothingToStart);
    };

    let reservation = node.reserve(&offer.resources);
    if let Some(shortfall) = shortfall(node, &reservation) {
        return OfferOutcome::Declined(DeclineReason::Insufficient {
            node: node.id.clone(),
            shortfall,
        });
    }

    let task_id = launch(node, offer, driver);
    OfferOutcome::Launched {
        node: node.id.clone(),
        task_id,
    }
}

/// Give a node without a runtime a runtime from `offer` and launch it.
///
/// The node stays STARTING until the task reports running. Exactly one
/// launch is sent.
pub fn launch_task(
    node: &mut Node,
    offer: &Offer,
    driver: &mut dyn Driver,
) -> SchedulerResult<TaskId> {
    if node.runtime.is_some() {
        return Err(SchedulerError::InvalidState {
            node: node.id.clone(),
            state: node.state,
            action: "launch",
        });
    }
    Ok(launch(node, offer, driver))
}

fn launch(node: &mut Node, offer: &Offer, driver: &mut dyn Driver) -> TaskId {
    let runtime = node.init_runtime(offer).clone();
    let reservation = node.reserve(&offer.resources);
    let task = TaskInfo::new(node, &runtime, &reservation);

    info!(
        node_id = %node.id,
        task_id = %task.task_id,
        offer_id = %offer.id,
        hostname = %offer.hostname,
        ports = ?task.resources.ports,
        "Launching node"
    );
    driver.launch(&offer.id, task);

    runtime.task_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordingDriver;
    use crate::node::{NodeKind, NodeState, NodeTemplate};
    use rstest::rstest;

    fn idle(id: &str) -> Node {
        Node::new(
            NodeId::parse(id).unwrap(),
            NodeKind::DataNode,
            &NodeTemplate::DATANODE,
        )
    }

    fn pending(id: &str) -> Node {
        let mut node = idle(id);
        node.state = NodeState::Starting;
        node
    }

    #[rstest]
    #[case("resources:[cpus:0.1;mem:1024;ports:0..10]", "node dn: cpus < 0.5")]
    #[case("resources:[cpus:1;mem:100;ports:0..10]", "node dn: mem < 512")]
    #[case("resources:[cpus:1;mem:1024;ports:0..1]", "node dn: ports < 3")]
    #[case("resources:[cpus:0.1;mem:100]", "node dn: cpus < 0.5")]
    fn test_shortfall_messages(#[case] offer: &str, #[case] expected: &str) {
        let mut nodes = Nodes::new();
        nodes.add(pending("dn")).unwrap();
        let mut driver = RecordingDriver::new();

        let outcome = match_offer(&mut nodes, &offer.parse().unwrap(), &mut driver);
        assert_eq!(outcome.decline_reason().unwrap().to_string(), expected);
        assert!(nodes.get("dn").unwrap().runtime.is_none());
        assert!(nodes.get("dn").unwrap().reservation.is_none());
        assert!(driver.launched.is_empty());
    }

    #[test]
    fn test_first_pending_in_order() {
        let mut nodes = Nodes::new();
        nodes.add(idle("idle")).unwrap();
        nodes.add(pending("dn1")).unwrap();
        nodes.add(pending("dn2")).unwrap();
        let mut driver = RecordingDriver::new();
        let offer: Offer = "id:o1, resources:[cpus:1;mem:1024;ports:0..10]"
            .parse()
            .unwrap();

        let outcome = match_offer(&mut nodes, &offer, &mut driver);
        assert!(matches!(&outcome, OfferOutcome::Launched { node, .. } if node.as_str() == "dn1"));
        assert!(nodes.get("dn2").unwrap().runtime.is_none());
        assert_eq!(driver.launched.len(), 1);
        assert_eq!(driver.launched[0].0, "o1");
    }

    #[test]
    fn test_nothing_to_start() {
        let mut nodes = Nodes::new();
        let mut driver = RecordingDriver::new();
        let outcome = match_offer(&mut nodes, &Offer::default(), &mut driver);
        assert_eq!(
            outcome,
            OfferOutcome::Declined(DeclineReason::NothingToStart)
        );
    }

    #[test]
    fn test_launch_task_keeps_starting() {
        let mut node = pending("dn");
        let mut driver = RecordingDriver::new();

        let offer: Offer = "resources:[ports:0..10]".parse().unwrap();
        let task_id = launch_task(&mut node, &offer, &mut driver).unwrap();
        assert_eq!(node.state, NodeState::Starting);
        assert_eq!(node.task_id(), Some(&task_id));
        assert!(node.reservation.is_some());
        assert_eq!(driver.launched.len(), 1);
        assert_eq!(driver.launched[0].1.task_id, task_id);

        let err = launch_task(&mut node, &offer, &mut driver).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidState {
                action: "launch",
                ..
            }
        ));
        assert_eq!(driver.launched.len(), 1);
    }
}
