//! Scheduler orchestrator.
//!
//! Owns the node registry, the reconciler and the driver, and turns master
//! callbacks and operator actions into node transitions. All methods are
//! synchronous; the worker serializes calls into one control task.
//!
//! State is saved after every callback that can change it. A failed save is
//! logged and retried implicitly by the next one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hdfs_mesos_api::{Master, Offer, StatusClass, TaskStatus};
use hdfs_mesos_id::{NodeId, TaskId};
use hdfs_mesos_reconcile::Step;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerSettings;
use crate::driver::Driver;
use crate::error::{SchedulerError, SchedulerResult};
use crate::launcher::{self, DeclineReason, OfferOutcome};
use crate::lifecycle;
use crate::node::{Node, NodeKind, NodeState};
use crate::reconciler::Reconciler;
use crate::registry::Nodes;
use crate::storage::{ClusterSnapshot, Storage};

/// Attribute name under which `other_attributes` reports hostnames.
pub const HOSTNAME_ATTRIBUTE: &str = "hostname";

/// The scheduler.
pub struct Scheduler<D: Driver> {
    settings: SchedulerSettings,
    nodes: Nodes,
    framework_id: Option<String>,
    reconciler: Reconciler,
    driver: D,
    storage: Box<dyn Storage>,
    stopped: bool,
}

impl<D: Driver> Scheduler<D> {
    /// Create a scheduler with the state last saved in `storage`.
    ///
    /// Fails if the saved state cannot be read or is inconsistent.
    pub fn new(
        settings: SchedulerSettings,
        driver: D,
        storage: Box<dyn Storage>,
    ) -> SchedulerResult<Self> {
        let snapshot = storage.load()?.unwrap_or_default();
        snapshot.nodes.check()?;

        info!(
            framework_id = ?snapshot.framework_id,
            node_count = snapshot.nodes.len(),
            reconcile_period = %settings.reconcile_period,
            reconcile_max_tries = settings.reconcile_max_tries,
            "Scheduler created"
        );

        let reconciler = Reconciler::new(settings.reconcile_period, settings.reconcile_max_tries);
        Ok(Self {
            settings,
            nodes: snapshot.nodes,
            framework_id: snapshot.framework_id,
            reconciler,
            driver,
            storage,
            stopped: false,
        })
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    /// Direct registry access; changes are not saved until the next callback.
    pub fn nodes_mut(&mut self) -> &mut Nodes {
        &mut self.nodes
    }

    pub fn framework_id(&self) -> Option<&str> {
        self.framework_id.as_deref()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// True once the driver has been told to stop.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    // =========================================================================
    // Master callbacks
    // =========================================================================

    /// Registered with the master under `framework_id`.
    pub fn registered(&mut self, framework_id: &str, master: &Master, now: DateTime<Utc>) {
        info!(framework_id, master = %master, "Registered");
        self.framework_id = Some(framework_id.to_string());

        if self.check_mesos_version(master) {
            self.reconciler
                .start(&mut self.nodes, &mut self.driver, now);
        }
        self.persist();
    }

    /// Reconnected to a (possibly new) master.
    pub fn reregistered(&mut self, master: &Master, now: DateTime<Utc>) {
        info!(master = %master, "Reregistered");

        if self.check_mesos_version(master) {
            self.reconciler
                .start(&mut self.nodes, &mut self.driver, now);
        }
        self.persist();
    }

    pub fn disconnected(&mut self) {
        warn!("Disconnected from master");
    }

    /// Handle a batch of offers; unused offers are declined.
    pub fn resource_offers(&mut self, offers: &[Offer], now: DateTime<Utc>) -> Vec<OfferOutcome> {
        let outcomes = offers
            .iter()
            .map(|offer| {
                let outcome = self.accept_offer(offer);
                if let OfferOutcome::Declined(reason) = &outcome {
                    debug!(
                        offer_id = %offer.id,
                        hostname = %offer.hostname,
                        reason = %reason,
                        "Declining offer"
                    );
                    self.driver.decline(&offer.id);
                }
                outcome
            })
            .collect();

        self.reconciler
            .proceed(&mut self.nodes, &mut self.driver, now);
        self.persist();
        outcomes
    }

    pub fn offer_rescinded(&mut self, offer_id: &str) {
        debug!(offer_id, "Offer rescinded");
    }

    /// Route a task status update to the node that owns the task.
    pub fn status_update(&mut self, status: &TaskStatus) {
        info!(
            task_id = %status.task_id,
            state = %status.state,
            message = status.message.as_deref().unwrap_or(""),
            "Status update"
        );

        if status.state.is_transient() {
            debug!(task_id = %status.task_id, "Ignoring transient status");
            return;
        }

        let node = self.nodes.by_task_mut(&status.task_id);
        match status.state.class() {
            StatusClass::Started => lifecycle::on_task_started(node, status, &mut self.driver),
            StatusClass::Stopped => lifecycle::on_task_stopped(node, status),
        }

        self.reconciler.settle(&self.nodes);
        self.persist();
    }

    /// Periodic tick: advance reconciliation.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Step {
        let step = self
            .reconciler
            .proceed(&mut self.nodes, &mut self.driver, now);
        if matches!(step, Step::Exhausted { .. }) {
            self.persist();
        }
        step
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Try to place a pending node on `offer`.
    ///
    /// Nothing is placed while reconciliation runs. The caller declines the
    /// offer when it is not used.
    pub fn accept_offer(&mut self, offer: &Offer) -> OfferOutcome {
        if self.reconciler.is_active(&self.nodes) {
            return OfferOutcome::Declined(DeclineReason::Reconciling);
        }
        launcher::match_offer(&mut self.nodes, offer, &mut self.driver)
    }

    /// Launch node `node_id` on `offer` without checking the offer.
    pub fn launch_task(&mut self, node_id: &str, offer: &Offer) -> SchedulerResult<TaskId> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| SchedulerError::NodeNotFound(node_id.to_string()))?;
        launcher::launch_task(node, offer, &mut self.driver)
    }

    /// Handle a "started" report for node `node_id`.
    ///
    /// `None`, or an ID that is not registered, is treated as an unknown
    /// node and the task is killed.
    pub fn on_task_started(&mut self, node_id: Option<&str>, status: &TaskStatus) {
        let node = node_id.and_then(|id| self.nodes.get_mut(id));
        lifecycle::on_task_started(node, status, &mut self.driver);
    }

    /// Handle a "stopped" report for node `node_id`.
    pub fn on_task_stopped(&mut self, node_id: Option<&str>, status: &TaskStatus) {
        let node = node_id.and_then(|id| self.nodes.get_mut(id));
        lifecycle::on_task_stopped(node, status);
    }

    /// Stop the driver unless the master is recent enough.
    ///
    /// Returns whether the master is supported.
    pub fn check_mesos_version(&mut self, master: &Master) -> bool {
        let min = &self.settings.min_master_version;
        if master.supports(min) {
            debug!(
                version = ?master.version,
                min = %min,
                "Master version supported"
            );
            return true;
        }

        error!(
            version = master.version.as_deref().unwrap_or("<none>"),
            min = %min,
            "Unsupported master version, stopping"
        );
        self.stop();
        false
    }

    /// Stop the driver and end any reconciliation.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.reconciler.stop();
        self.driver.stop();
    }

    /// Host attributes of every node with a runtime.
    ///
    /// Maps `hostname` and each attribute name to the values seen, one per
    /// reporting node in registry order.
    pub fn other_attributes(&self) -> BTreeMap<String, Vec<String>> {
        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for runtime in self.nodes.iter().filter_map(|n| n.runtime.as_ref()) {
            attributes
                .entry(HOSTNAME_ATTRIBUTE.to_string())
                .or_default()
                .push(runtime.hostname.clone());

            for (name, value) in &runtime.attributes {
                attributes
                    .entry(name.clone())
                    .or_default()
                    .push(value.clone());
            }
        }

        attributes
    }

    // =========================================================================
    // Operator actions
    // =========================================================================

    /// Idle node with the template needs for `kind`.
    pub fn new_node(&self, id: NodeId, kind: NodeKind) -> Node {
        Node::new(id, kind, self.settings.templates.for_kind(kind))
    }

    pub fn add_node(&mut self, node: Node) -> SchedulerResult<()> {
        if let Some(reason) = node.violation() {
            return Err(SchedulerError::Inconsistent {
                node: node.id,
                reason,
            });
        }

        let node = self.nodes.add(node)?;
        info!(
            node_id = %node.id,
            kind = %node.kind,
            state = %node.state,
            "Node added"
        );
        self.persist();
        Ok(())
    }

    /// Request an idle node to be started.
    pub fn start_node(&mut self, id: &str) -> SchedulerResult<()> {
        let node = self.node_mut(id)?;
        if node.state != NodeState::Idle {
            return Err(SchedulerError::InvalidState {
                node: node.id.clone(),
                state: node.state,
                action: "start",
            });
        }

        node.state = NodeState::Starting;
        info!(node_id = %node.id, "Node starting");
        self.persist();
        Ok(())
    }

    /// Request a node to be stopped.
    ///
    /// A node with a task goes to STOPPING and the task is killed; it
    /// becomes IDLE once the task reports stopped. Otherwise the node goes
    /// to IDLE right away.
    pub fn stop_node(&mut self, id: &str) -> SchedulerResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NodeNotFound(id.to_string()))?;

        match node.task_id().cloned() {
            Some(task_id) => {
                info!(
                    node_id = %node.id,
                    task_id = %task_id,
                    from = %node.state,
                    "Node stopping"
                );
                node.state = NodeState::Stopping;
                self.driver.kill(&task_id);
            }
            None => {
                if node.state != NodeState::Idle {
                    info!(node_id = %node.id, from = %node.state, "Node stopped");
                }
                node.state = NodeState::Idle;
                node.clear_runtime();
            }
        }

        self.persist();
        Ok(())
    }

    /// Remove an idle node.
    pub fn remove_node(&mut self, id: &str) -> SchedulerResult<Node> {
        let node = self.node_mut(id)?;
        if node.state != NodeState::Idle {
            return Err(SchedulerError::InvalidState {
                node: node.id.clone(),
                state: node.state,
                action: "remove",
            });
        }

        let node = self.nodes.remove(id)?;
        info!(node_id = %node.id, "Node removed");
        self.persist();
        Ok(node)
    }

    fn node_mut(&mut self, id: &str) -> SchedulerResult<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NodeNotFound(id.to_string()))
    }

    /// Save the current state, logging failures.
    pub fn persist(&self) {
        let snapshot = ClusterSnapshot::new(self.framework_id.clone(), self.nodes.clone());
        if let Err(e) = self.storage.save(&snapshot) {
            error!(error = %e, "Failed to save state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordingDriver;
    use crate::storage::MemoryStorage;
    use hdfs_mesos_api::TaskState;

    fn scheduler() -> (Scheduler<RecordingDriver>, MemoryStorage) {
        let storage = MemoryStorage::new();
        let scheduler = Scheduler::new(
            SchedulerSettings::default(),
            RecordingDriver::new(),
            Box::new(storage.clone()),
        )
        .unwrap();
        (scheduler, storage)
    }

    fn add(scheduler: &mut Scheduler<RecordingDriver>, id: &str, kind: NodeKind) {
        let node = scheduler.new_node(NodeId::parse(id).unwrap(), kind);
        scheduler.add_node(node).unwrap();
    }

    fn state(scheduler: &Scheduler<RecordingDriver>, id: &str) -> NodeState {
        scheduler.nodes().get(id).unwrap().state
    }

    #[test]
    fn test_operator_lifecycle() {
        let (mut scheduler, storage) = scheduler();
        add(&mut scheduler, "nn", NodeKind::NameNode);
        assert_eq!(storage.snapshot().unwrap().nodes.len(), 1);

        scheduler.start_node("nn").unwrap();
        assert!(matches!(
            scheduler.start_node("nn").unwrap_err(),
            SchedulerError::InvalidState { action: "start", .. }
        ));
        assert!(matches!(
            scheduler.remove_node("nn").unwrap_err(),
            SchedulerError::InvalidState { action: "remove", .. }
        ));

        // pending node stops right away
        scheduler.stop_node("nn").unwrap();
        assert_eq!(state(&scheduler, "nn"), NodeState::Idle);
        assert!(scheduler.driver().killed.is_empty());

        scheduler.remove_node("nn").unwrap();
        assert!(scheduler.nodes().is_empty());
        assert!(storage.snapshot().unwrap().nodes.is_empty());
    }

    #[test]
    fn test_stop_running_node_kills() {
        let (mut scheduler, _) = scheduler();
        add(&mut scheduler, "dn", NodeKind::DataNode);
        scheduler.start_node("dn").unwrap();

        let offer: Offer = "id:o1, resources:[cpus:1;mem:1024;ports:0..10]"
            .parse()
            .unwrap();
        let OfferOutcome::Launched { task_id, .. } = scheduler.accept_offer(&offer) else {
            panic!("offer not used");
        };

        scheduler.stop_node("dn").unwrap();
        assert_eq!(state(&scheduler, "dn"), NodeState::Stopping);
        assert_eq!(scheduler.driver().killed, vec![task_id.clone()]);

        scheduler.status_update(&TaskStatus::new(task_id, TaskState::Killed));
        assert_eq!(state(&scheduler, "dn"), NodeState::Idle);
        assert!(scheduler.nodes().check().is_ok());
    }

    #[test]
    fn test_missing_node_errors() {
        let (mut scheduler, _) = scheduler();
        assert!(matches!(
            scheduler.start_node("x").unwrap_err(),
            SchedulerError::NodeNotFound(_)
        ));
        assert!(matches!(
            scheduler.launch_task("x", &Offer::default()).unwrap_err(),
            SchedulerError::NodeNotFound(_)
        ));
    }

    #[test]
    fn test_add_rejects_inconsistent_node() {
        let (mut scheduler, _) = scheduler();
        let id = NodeId::parse("nn").unwrap();
        let mut node = scheduler.new_node(id, NodeKind::NameNode);
        node.state = NodeState::Running;

        assert!(matches!(
            scheduler.add_node(node).unwrap_err(),
            SchedulerError::Inconsistent { .. }
        ));
    }

    #[test]
    fn test_transient_status_ignored() {
        let (mut scheduler, _) = scheduler();
        let status = TaskStatus::new(TaskId::parse("ghost").unwrap(), TaskState::Staging);
        scheduler.status_update(&status);
        assert!(scheduler.driver().killed.is_empty());
    }

    #[test]
    fn test_stop_repeats_on_driver() {
        let (mut scheduler, _) = scheduler();
        scheduler.stop();
        scheduler.driver_mut().clear();

        scheduler.stop();
        assert!(scheduler.is_stopped());
        assert!(scheduler.driver().stopped);
    }
}
