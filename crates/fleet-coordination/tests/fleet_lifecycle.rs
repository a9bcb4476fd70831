//! End-to-end lifecycle tests over the public coordinator API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use fleet_core::{
    CommandPriority, CommandVerb, GroupId, RobotCommand, RobotId, TransportSessionId, UserId,
};
use fleet_coordination::{
    ActionScope, Authorizer, CommandEnvelope, DeliveryStatus, FleetCoordinator, GroupStore,
    NotificationKind, Notifier, OwnershipStore, RegisterOutcome, RobotGroup, SendOutcome,
    TransportGateway,
};
use fleet_coordination::store::StoreResult;
use fleet_settings::CoordinationSettings;

/// Transport stub: acks everything, records envelopes in delivery order.
struct RecordingGateway {
    envelopes: Mutex<Vec<(TransportSessionId, CommandEnvelope)>>,
}

#[async_trait]
impl TransportGateway for RecordingGateway {
    async fn deliver(
        &self,
        session_id: &TransportSessionId,
        envelope: &CommandEnvelope,
    ) -> DeliveryStatus {
        self.envelopes
            .lock()
            .push((session_id.clone(), envelope.clone()));
        DeliveryStatus::Ack
    }
}

struct RecordingNotifier {
    titles: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_user(
        &self,
        _user_id: &UserId,
        title: &str,
        _message: &str,
        _kind: NotificationKind,
    ) {
        self.titles.lock().push(title.to_owned());
    }
}

struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn is_valid_user(&self, _user_id: &UserId) -> bool {
        true
    }
    async fn can_act(&self, _user_id: &UserId, _scope: &ActionScope) -> bool {
        true
    }
}

#[derive(Default)]
struct MemoryStore {
    groups: Mutex<HashMap<GroupId, RobotGroup>>,
}

impl GroupStore for MemoryStore {
    fn save_group(&self, group: &RobotGroup) -> StoreResult<()> {
        let _ = self.groups.lock().insert(group.id.clone(), group.clone());
        Ok(())
    }
    fn load_group(&self, group_id: &GroupId) -> StoreResult<Option<RobotGroup>> {
        Ok(self.groups.lock().get(group_id).cloned())
    }
    fn load_groups_for_user(&self, user_id: &UserId) -> StoreResult<Vec<RobotGroup>> {
        Ok(self
            .groups
            .lock()
            .values()
            .filter(|g| g.owner_id == *user_id)
            .cloned()
            .collect())
    }
    fn delete_group(&self, group_id: &GroupId) -> StoreResult<bool> {
        Ok(self.groups.lock().remove(group_id).is_some())
    }
    fn count_groups(&self) -> StoreResult<usize> {
        Ok(self.groups.lock().len())
    }
}

impl OwnershipStore for MemoryStore {
    fn owner_of(&self, _robot_id: &RobotId) -> StoreResult<Option<UserId>> {
        Ok(Some(UserId::from("owner")))
    }
    fn robots_owned_by(&self, _user_id: &UserId) -> StoreResult<Vec<RobotId>> {
        Ok(Vec::new())
    }
}

struct Fixture {
    coordinator: FleetCoordinator,
    gateway: Arc<RecordingGateway>,
    notifier: Arc<RecordingNotifier>,
}

fn make_fixture(settings: CoordinationSettings) -> Fixture {
    let gateway = Arc::new(RecordingGateway {
        envelopes: Mutex::new(Vec::new()),
    });
    let notifier = Arc::new(RecordingNotifier {
        titles: Mutex::new(Vec::new()),
    });
    let store = Arc::new(MemoryStore::default());
    let coordinator = FleetCoordinator::new(
        settings,
        Arc::clone(&gateway) as Arc<dyn TransportGateway>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Arc::new(AllowAll),
        Arc::clone(&store) as Arc<dyn GroupStore>,
        store as Arc<dyn OwnershipStore>,
    );
    Fixture {
        coordinator,
        gateway,
        notifier,
    }
}

async fn connect(fixture: &Fixture, robot: &str, session: &str) -> RegisterOutcome {
    fixture
        .coordinator
        .handle_connect(
            RobotId::from(robot),
            TransportSessionId::from(session),
            "192.168.1.20:52000".into(),
            json!({"motors": true, "oled": true}),
            json!({"thresholds": {"ultrasonicWarning": 20}}),
        )
        .await
}

fn command(robot: &str, verb: CommandVerb, priority: CommandPriority) -> RobotCommand {
    RobotCommand::new(
        RobotId::from(robot),
        verb,
        json!({}),
        UserId::from("owner"),
    )
    .with_priority(priority)
}

#[tokio::test]
async fn reconnect_drains_queue_in_priority_then_fifo_order() {
    let fixture = make_fixture(CoordinationSettings::default());

    // Robot connects then drops.
    let _ = connect(&fixture, "r1", "s1").await;
    fixture
        .coordinator
        .handle_disconnect(&RobotId::from("r1"))
        .await;

    // Backlog accumulates while offline.
    for (verb, priority) in [
        (CommandVerb::Move, CommandPriority::Low),
        (CommandVerb::Buzzer, CommandPriority::Low),
        (CommandVerb::Stop, CommandPriority::Critical),
    ] {
        assert_eq!(
            fixture.coordinator.send_command(command("r1", verb, priority)).await,
            SendOutcome::Queued
        );
    }

    // Reconnect with a fresh session drains critical-first.
    let outcome = connect(&fixture, "r1", "s2").await;
    assert_eq!(outcome, RegisterOutcome::Connected);

    let envelopes = fixture.gateway.envelopes.lock();
    let verbs: Vec<&str> = envelopes.iter().map(|(_, e)| e.verb.as_str()).collect();
    assert_eq!(verbs, vec!["stop", "move", "buzzer"]);
    // All deliveries went to the new session.
    assert!(envelopes
        .iter()
        .all(|(session, _)| session == &TransportSessionId::from("s2")));
}

#[tokio::test]
async fn group_command_classifies_offline_members_as_queued() {
    let fixture = make_fixture(CoordinationSettings::default());
    let owner = UserId::from("owner");

    let members: Vec<RobotId> = (1..=5).map(|i| RobotId::from(format!("r{i}").as_str())).collect();
    let group = fixture
        .coordinator
        .groups()
        .create_group(&owner, "warehouse", Some("floor 2".into()), members)
        .await
        .unwrap();

    // Three online, two offline.
    for robot in ["r1", "r2", "r3"] {
        let _ = connect(&fixture, robot, &format!("s-{robot}")).await;
    }

    let report = fixture
        .coordinator
        .groups()
        .send_group_command(&group.id, CommandVerb::Move, json!({"direction": "forward"}), &owner)
        .await
        .unwrap();

    assert_eq!(report.successful.len(), 3);
    assert_eq!(report.queued.len(), 2);
    assert!(report.failed.is_empty());
    assert_eq!(report.total(), 5);

    // Queued members hold exactly one pending command each.
    assert_eq!(fixture.coordinator.queue().depth(&RobotId::from("r4")), 1);
    assert_eq!(fixture.coordinator.queue().depth(&RobotId::from("r5")), 1);
}

#[tokio::test]
async fn emergency_stop_reaches_every_connected_robot() {
    let fixture = make_fixture(CoordinationSettings::default());
    for robot in ["r1", "r2", "r3", "r4"] {
        let _ = connect(&fixture, robot, &format!("s-{robot}")).await;
    }

    let report = fixture
        .coordinator
        .emergency_stop_all(&UserId::from("owner"))
        .await
        .unwrap();
    assert_eq!(report.total, 4);
    assert_eq!(report.stopped, 4);

    let envelopes = fixture.gateway.envelopes.lock();
    assert!(envelopes
        .iter()
        .all(|(_, e)| e.priority == CommandPriority::Critical && e.verb == CommandVerb::Stop));

    // Completion notification was pushed.
    assert!(fixture
        .notifier
        .titles
        .lock()
        .iter()
        .any(|t| t == "Emergency Stop Activated"));
}

#[tokio::test]
async fn silent_robot_is_removed_within_threshold_plus_sweep() {
    let settings = CoordinationSettings {
        staleness_threshold_ms: 50,
        sweep_interval_ms: 25,
        ..CoordinationSettings::default()
    };
    let fixture = make_fixture(settings);

    let _ = connect(&fixture, "r1", "s1").await;
    assert!(fixture
        .coordinator
        .handle_heartbeat(&RobotId::from("r1"), None));

    fixture.coordinator.start_background_tasks();

    // threshold + sweep_interval + scheduling slack
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!fixture.coordinator.registry().contains(&RobotId::from("r1")));
    let offline = fixture
        .notifier
        .titles
        .lock()
        .iter()
        .filter(|t| t.as_str() == "Robot Offline")
        .count();
    assert_eq!(offline, 1);

    // Queue survives removal: a command sent now is queued for reconnect.
    assert_eq!(
        fixture
            .coordinator
            .send_command(command("r1", CommandVerb::Oled, CommandPriority::Normal))
            .await,
        SendOutcome::Queued
    );

    fixture.coordinator.shutdown().await;
}
