//! Node consistency under arbitrary event sequences.

use chrono::{Duration, Utc};
use hdfs_mesos_api::{Offer, TaskState, TaskStatus};
use hdfs_mesos_id::{NodeId, TaskId};
use hdfs_mesos_reconcile::Period;
use hdfs_mesos_scheduler::{
    MemoryStorage, NodeKind, NodeState, RecordingDriver, Scheduler, SchedulerSettings,
};
use proptest::prelude::*;

const NODES: [&str; 3] = ["nn", "dn0", "dn1"];

#[derive(Debug, Clone)]
enum Event {
    Start(usize),
    Stop(usize),
    Remove(usize),
    Offer { cpus: u8, mem: u16, ports: u8 },
    /// Status for the current task of a node, if it has one.
    Status(usize, TaskState),
    UnknownStatus(TaskState),
    Registered,
    Tick(u8),
}

fn task_state() -> impl Strategy<Value = TaskState> {
    prop_oneof![
        Just(TaskState::Staging),
        Just(TaskState::Starting),
        Just(TaskState::Running),
        Just(TaskState::Finished),
        Just(TaskState::Failed),
        Just(TaskState::Killed),
        Just(TaskState::Lost),
        Just(TaskState::Unknown("TASK_DROPPED".to_string())),
    ]
}

fn event() -> impl Strategy<Value = Event> {
    let node = 0..NODES.len();
    prop_oneof![
        node.clone().prop_map(Event::Start),
        node.clone().prop_map(Event::Stop),
        node.clone().prop_map(Event::Remove),
        (0u8..4, 0u16..2048, 0u8..6)
            .prop_map(|(cpus, mem, ports)| Event::Offer { cpus, mem, ports }),
        (node, task_state()).prop_map(|(n, s)| Event::Status(n, s)),
        task_state().prop_map(Event::UnknownStatus),
        Just(Event::Registered),
        (0u8..3).prop_map(Event::Tick),
    ]
}

fn apply(
    scheduler: &mut Scheduler<RecordingDriver>,
    event: Event,
    clock: &mut chrono::DateTime<Utc>,
) {
    match event {
        Event::Start(n) => {
            let _ = scheduler.start_node(NODES[n]);
        }
        Event::Stop(n) => {
            let _ = scheduler.stop_node(NODES[n]);
        }
        Event::Remove(n) => {
            let _ = scheduler.remove_node(NODES[n]);
        }
        Event::Offer { cpus, mem, ports } => {
            let mut resources = format!("cpus:{cpus};mem:{mem}");
            if ports > 0 {
                resources.push_str(&format!(";ports:1..{ports}"));
            }
            let offer: Offer = format!("id:o, hostname:h, resources:[{resources}]")
                .parse()
                .unwrap();
            scheduler.resource_offers(&[offer], *clock);
        }
        Event::Status(n, state) => {
            let task_id = scheduler
                .nodes()
                .get(NODES[n])
                .and_then(|node| node.task_id().cloned());
            if let Some(task_id) = task_id {
                scheduler.status_update(&TaskStatus::new(task_id, state));
            }
        }
        Event::UnknownStatus(state) => {
            let task_id = TaskId::parse("stray-task").unwrap();
            scheduler.status_update(&TaskStatus::new(task_id, state));
        }
        Event::Registered => {
            scheduler.registered("fw", &"version:1.0.0".parse().unwrap(), *clock);
        }
        Event::Tick(seconds) => {
            *clock += Duration::seconds(i64::from(seconds));
            scheduler.tick(*clock);
        }
    }
}

proptest! {
    #[test]
    fn nodes_stay_consistent(events in prop::collection::vec(event(), 1..60)) {
        let settings = SchedulerSettings {
            reconcile_period: "1s".parse::<Period>().unwrap(),
            reconcile_max_tries: 2,
            ..SchedulerSettings::default()
        };
        let storage = Box::new(MemoryStorage::new());
        let mut scheduler = Scheduler::new(settings, RecordingDriver::new(), storage).unwrap();
        let kinds = [NodeKind::NameNode, NodeKind::DataNode, NodeKind::DataNode];
        for (id, kind) in NODES.iter().zip(kinds) {
            let node = scheduler.new_node(NodeId::parse(id).unwrap(), kind);
            scheduler.add_node(node).unwrap();
        }

        let mut clock = Utc::now();
        for event in events {
            let reconciling = scheduler.reconciler().is_active(scheduler.nodes());
            let launched = scheduler.driver().launched.len();
            let is_offer = matches!(event, Event::Offer { .. });

            apply(&mut scheduler, event, &mut clock);
            prop_assert!(scheduler.nodes().check().is_ok(), "{:?}", scheduler.nodes());

            // nothing is placed while reconciling
            if is_offer && reconciling {
                prop_assert_eq!(scheduler.driver().launched.len(), launched);
            }
            // a node is placed at most once per offer
            prop_assert!(scheduler.driver().launched.len() <= launched + 1);
            let mut idle = scheduler.nodes().in_state(NodeState::Idle);
            prop_assert!(idle.all(|n| n.runtime.is_none()));

            // task ids are unique
            let mut task_ids: Vec<&TaskId> =
                scheduler.nodes().iter().filter_map(|n| n.task_id()).collect();
            let count = task_ids.len();
            task_ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            task_ids.dedup();
            prop_assert_eq!(task_ids.len(), count);
        }
    }
}
