//! Scheduler control loop.
//!
//! One task owns the [`Scheduler`]. Master callbacks and operator commands
//! arrive as [`SchedulerEvent`]s on a channel and are applied one at a
//! time, interleaved with a fixed-interval reconciliation tick.

use std::time::Duration;

use chrono::Utc;
use hdfs_mesos_api::{Master, Offer, TaskStatus};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, warn};

use crate::driver::Driver;
use crate::error::SchedulerResult;
use crate::node::Node;
use crate::scheduler::Scheduler;

/// Default reconciliation tick.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Operator command.
#[derive(Debug, Clone)]
pub enum NodeCommand {
    Add(Node),
    Start(String),
    Stop(String),
    Remove(String),
}

/// Input to the control loop.
#[derive(Debug)]
pub enum SchedulerEvent {
    Registered { framework_id: String, master: Master },
    Reregistered { master: Master },
    Disconnected,
    Offers(Vec<Offer>),
    OfferRescinded(String),
    Status(TaskStatus),
    /// Operator command; the result is sent back on the reply channel.
    Command(NodeCommand, oneshot::Sender<SchedulerResult<()>>),
}

/// Runs the control loop.
pub struct SchedulerWorker<D: Driver> {
    scheduler: Scheduler<D>,
    events: mpsc::Receiver<SchedulerEvent>,
    tick: Duration,
}

impl<D: Driver> SchedulerWorker<D> {
    /// Create a worker and the sender that feeds it.
    pub fn new(
        scheduler: Scheduler<D>,
        tick: Duration,
        capacity: usize,
    ) -> (Self, mpsc::Sender<SchedulerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let worker = Self {
            scheduler,
            events: rx,
            tick,
        };
        (worker, tx)
    }

    /// Run until shutdown is signaled, every sender is gone, or the driver
    /// has been stopped. Returns the scheduler for inspection.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Scheduler<D> {
        info!(
            tick_ms = self.tick.as_millis() as u64,
            "Starting scheduler worker"
        );

        let mut interval = tokio::time::interval(self.tick);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        while !self.scheduler.is_stopped() {
            tokio::select! {
                _ = interval.tick() => {
                    let step = self.scheduler.tick(Utc::now());
                    debug!(?step, "Reconcile tick");
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle(event),
                        None => {
                            info!("Event channel closed, scheduler worker exiting");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler worker shutting down");
                        break;
                    }
                }
            }
        }

        if self.scheduler.is_stopped() {
            warn!("Driver stopped, scheduler worker exiting");
        }
        self.scheduler
    }

    fn handle(&mut self, event: SchedulerEvent) {
        let now = Utc::now();
        match event {
            SchedulerEvent::Registered {
                framework_id,
                master,
            } => self.scheduler.registered(&framework_id, &master, now),
            SchedulerEvent::Reregistered { master } => self.scheduler.reregistered(&master, now),
            SchedulerEvent::Disconnected => self.scheduler.disconnected(),
            SchedulerEvent::Offers(offers) => {
                self.scheduler.resource_offers(&offers, now);
            }
            SchedulerEvent::OfferRescinded(offer_id) => self.scheduler.offer_rescinded(&offer_id),
            SchedulerEvent::Status(status) => self.scheduler.status_update(&status),
            SchedulerEvent::Command(command, reply) => {
                let result = self.apply(command);
                if reply.send(result).is_err() {
                    debug!("Command caller went away");
                }
            }
        }
    }

    fn apply(&mut self, command: NodeCommand) -> SchedulerResult<()> {
        match command {
            NodeCommand::Add(node) => self.scheduler.add_node(node),
            NodeCommand::Start(id) => self.scheduler.start_node(&id),
            NodeCommand::Stop(id) => self.scheduler.stop_node(&id),
            NodeCommand::Remove(id) => self.scheduler.remove_node(&id).map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerSettings;
    use crate::driver::RecordingDriver;
    use crate::error::SchedulerError;
    use crate::node::{NodeKind, NodeState, NodeTemplate};
    use crate::storage::MemoryStorage;
    use hdfs_mesos_id::NodeId;
    use hdfs_mesos_reconcile::Period;

    fn worker(
        settings: SchedulerSettings,
    ) -> (SchedulerWorker<RecordingDriver>, mpsc::Sender<SchedulerEvent>) {
        let scheduler = Scheduler::new(
            settings,
            RecordingDriver::new(),
            Box::new(MemoryStorage::new()),
        )
        .unwrap();
        SchedulerWorker::new(scheduler, Duration::from_millis(10), 16)
    }

    async fn command(
        tx: &mpsc::Sender<SchedulerEvent>,
        command: NodeCommand,
    ) -> SchedulerResult<()> {
        let (reply, rx) = oneshot::channel();
        tx.send(SchedulerEvent::Command(command, reply)).await.unwrap();
        rx.await.unwrap()
    }

    fn namenode() -> Node {
        let id = NodeId::parse("nn").unwrap();
        Node::new(id, NodeKind::NameNode, &NodeTemplate::NAMENODE)
    }

    async fn remove(tx: &mpsc::Sender<SchedulerEvent>, id: &str) -> SchedulerResult<()> {
        command(tx, NodeCommand::Remove(id.to_string())).await
    }

    fn offer(id: &str) -> Offer {
        let resources = "resources:[cpus:2;mem:2048;ports:0..10]";
        format!("id:{id}, hostname:h1, {resources}").parse().unwrap()
    }

    fn master(version: &str) -> Master {
        format!("id:m1, hostname:master, version:{version}").parse().unwrap()
    }

    #[tokio::test]
    async fn test_commands_and_offers() {
        let (worker, tx) = worker(SchedulerSettings::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(shutdown_rx));

        let node = namenode();
        command(&tx, NodeCommand::Add(node.clone())).await.unwrap();
        assert!(matches!(
            command(&tx, NodeCommand::Add(node)).await,
            Err(SchedulerError::DuplicateNode(_))
        ));
        command(&tx, NodeCommand::Start("nn".to_string())).await.unwrap();

        let offers = vec![offer("o1"), offer("o2")];
        tx.send(SchedulerEvent::Offers(offers)).await.unwrap();
        // commands are applied in order, so this returns after the offers
        assert!(remove(&tx, "nn").await.is_err());

        shutdown_tx.send(true).unwrap();
        let scheduler = handle.await.unwrap();

        assert_eq!(scheduler.driver().launched.len(), 1);
        assert_eq!(scheduler.driver().launched[0].0, "o1");
        assert_eq!(scheduler.driver().declined, vec!["o2".to_string()]);
        let nn = scheduler.nodes().get("nn").unwrap();
        assert_eq!(nn.state, NodeState::Starting);
    }

    #[tokio::test]
    async fn test_exits_on_unsupported_master() {
        let (worker, tx) = worker(SchedulerSettings::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(shutdown_rx));

        tx.send(SchedulerEvent::Registered {
            framework_id: "fw".to_string(),
            master: master("0.22.1"),
        })
        .await
        .unwrap();

        let scheduler = handle.await.unwrap();
        assert!(scheduler.is_stopped());
        assert!(scheduler.driver().stopped);
        assert_eq!(scheduler.framework_id(), Some("fw"));
    }

    #[tokio::test]
    async fn test_exits_when_senders_dropped() {
        let (worker, tx) = worker(SchedulerSettings::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(tx);

        let scheduler = worker.run(shutdown_rx).await;
        assert!(!scheduler.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_gives_up_reconciliation() {
        let settings = SchedulerSettings {
            reconcile_period: Period::ZERO,
            reconcile_max_tries: 1,
            ..SchedulerSettings::default()
        };
        let (mut worker, tx) = worker(settings);
        {
            let nodes = worker.scheduler.nodes_mut();
            let nn = nodes.add(namenode()).unwrap();
            nn.state = NodeState::Running;
            nn.init_runtime(&"resources:[ports:0..10]".parse::<Offer>().unwrap());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(shutdown_rx));
        tx.send(SchedulerEvent::Registered {
            framework_id: "fw".to_string(),
            master: master("1.0.0"),
        })
        .await
        .unwrap();

        // registration is applied before any tick
        assert!(remove(&tx, "nn").await.is_err());

        // the clock is paused, so this only moves on once the worker is idle
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        let scheduler = handle.await.unwrap();

        let nn = scheduler.nodes().get("nn").unwrap();
        assert_eq!(nn.state, NodeState::Starting);
        assert!(nn.runtime.is_none());
        assert_eq!(scheduler.reconciler().tries(), 0);
        assert_eq!(scheduler.driver().reconciled.len(), 1);
    }
}
