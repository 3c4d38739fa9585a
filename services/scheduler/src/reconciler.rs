//! Task reconciliation with the master.
//!
//! After registration the scheduler cannot trust its persisted view of
//! which tasks are alive. Every node with a runtime is marked RECONCILING
//! and the master is asked for the state of all tasks. Status updates then
//! settle nodes one by one. Nodes still unsettled after `max_tries` periods
//! are given up on: their runtime is dropped and they go back to STARTING
//! to be placed again.

use chrono::{DateTime, Utc};
use hdfs_mesos_id::TaskId;
use hdfs_mesos_reconcile::{Period, ReconcileSession, Step};
use tracing::{debug, info, warn};

use crate::driver::Driver;
use crate::node::NodeState;
use crate::registry::Nodes;

/// Reconciliation progress.
#[derive(Debug, Clone)]
pub struct Reconciler {
    session: ReconcileSession,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(
            hdfs_mesos_reconcile::DEFAULT_RECONCILE_PERIOD,
            hdfs_mesos_reconcile::DEFAULT_MAX_TRIES,
        )
    }
}

impl Reconciler {
    pub fn new(period: Period, max_tries: u32) -> Self {
        Self {
            session: ReconcileSession::new(period, max_tries),
        }
    }

    /// Any node still being reconciled.
    pub fn is_active(&self, nodes: &Nodes) -> bool {
        nodes.in_state(NodeState::Reconciling).next().is_some()
    }

    pub fn tries(&self) -> u32 {
        self.session.tries()
    }

    pub fn last_try(&self) -> Option<DateTime<Utc>> {
        self.session.last_try()
    }

    pub fn period(&self) -> Period {
        self.session.period()
    }

    pub fn max_tries(&self) -> u32 {
        self.session.max_tries()
    }

    /// Mark every node with a runtime RECONCILING and ask for all tasks.
    pub fn start(&mut self, nodes: &mut Nodes, driver: &mut dyn Driver, now: DateTime<Utc>) {
        let mut count = 0usize;
        for node in nodes.iter_mut().filter(|n| n.runtime.is_some()) {
            node.state = NodeState::Reconciling;
            count += 1;
        }

        self.session.begin(now);
        driver.reconcile(&[]);

        info!(
            nodes = count,
            period = %self.session.period(),
            max_tries = self.session.max_tries(),
            "Reconciliation started"
        );
    }

    /// Advance on a tick.
    ///
    /// Once a period has passed since the last try, either asks again for
    /// each RECONCILING node or, past `max_tries`, gives up on them.
    pub fn proceed(
        &mut self,
        nodes: &mut Nodes,
        driver: &mut dyn Driver,
        now: DateTime<Utc>,
    ) -> Step {
        if self.session.is_started() && !self.is_active(nodes) {
            info!(tries = self.session.tries(), "Reconciliation finished");
            self.session.reset();
            return Step::Idle;
        }

        let step = self.session.advance(now);
        match step {
            Step::Idle | Step::Wait => {}
            Step::Retry { attempt } => {
                let task_ids: Vec<TaskId> = nodes
                    .in_state(NodeState::Reconciling)
                    .filter_map(|n| n.task_id().cloned())
                    .collect();

                debug!(
                    attempt,
                    max_tries = self.session.max_tries(),
                    tasks = task_ids.len(),
                    "Reconciling tasks"
                );
                for task_id in &task_ids {
                    driver.reconcile(std::slice::from_ref(task_id));
                }
            }
            Step::Exhausted { tries } => {
                for node in nodes.in_state_mut(NodeState::Reconciling) {
                    warn!(
                        node_id = %node.id,
                        task_id = ?node.task_id(),
                        tries,
                        "Reconciliation gave up on node, restarting"
                    );
                    node.state = NodeState::Starting;
                    node.clear_runtime();
                }
            }
        }

        step
    }

    /// End the session if no node is left to reconcile.
    ///
    /// Returns whether the session ended.
    pub fn settle(&mut self, nodes: &Nodes) -> bool {
        if !self.session.is_started() || self.is_active(nodes) {
            return false;
        }

        info!(tries = self.session.tries(), "Reconciliation finished");
        self.session.reset();
        true
    }

    /// Abandon the session without touching nodes.
    pub fn stop(&mut self) {
        self.session.reset();
    }
}
