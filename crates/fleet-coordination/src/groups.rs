//! User-owned robot groups and bulk fan-out.
//!
//! Groups reference robot IDs, not live connections — membership is
//! independent of whether members are currently online, and removing a
//! robot's connection never edits a group. Fan-out is always exhaustive:
//! one member's failure must not abort dispatch to the rest.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use fleet_core::{CommandVerb, GroupId, RobotCommand, RobotId, UserId};

use crate::dispatch::{CommandDispatcher, SendOutcome};
use crate::errors::{CoordinationError, Result};
use crate::gateway::{ActionScope, Authorizer};
use crate::store::GroupStore;

/// A named, user-owned set of robot IDs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotGroup {
    /// Group identifier.
    pub id: GroupId,
    /// Display name, unique per owner.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Ordered member robot IDs, no duplicates.
    pub robot_ids: Vec<RobotId>,
    /// Owning user.
    pub owner_id: UserId,
    /// Optional group configuration.
    pub configuration: serde_json::Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// One member's failure in a group or bulk fan-out.
#[derive(Clone, Debug, Serialize)]
pub struct GroupFailure {
    /// The member that failed.
    pub robot_id: RobotId,
    /// Why.
    pub reason: String,
}

/// Per-member classification of a group or bulk command.
///
/// Partial success is the expected case and is never collapsed into a single
/// verdict.
#[derive(Clone, Debug, Default, Serialize)]
pub struct GroupCommandReport {
    /// Members whose delivery was acknowledged by the transport.
    pub successful: Vec<RobotId>,
    /// Members that were offline (or transiently unreachable); queued.
    pub queued: Vec<RobotId>,
    /// Members whose dispatch was rejected, with the reason.
    pub failed: Vec<GroupFailure>,
}

impl GroupCommandReport {
    /// Total members the fan-out touched.
    #[must_use]
    pub fn total(&self) -> usize {
        self.successful.len() + self.queued.len() + self.failed.len()
    }
}

/// Group CRUD and group/bulk command fan-out.
pub struct GroupManager {
    store: Arc<dyn GroupStore>,
    authorizer: Arc<dyn Authorizer>,
    dispatcher: Arc<CommandDispatcher>,
}

impl GroupManager {
    /// Create a group manager over the shared dispatcher and store.
    #[must_use]
    pub fn new(
        store: Arc<dyn GroupStore>,
        authorizer: Arc<dyn Authorizer>,
        dispatcher: Arc<CommandDispatcher>,
    ) -> Self {
        Self {
            store,
            authorizer,
            dispatcher,
        }
    }

    /// Create a group owned by `user_id`.
    ///
    /// Rejects an empty member list, duplicate member IDs, and a name already
    /// used by one of the user's groups (names are a user-scoped uniqueness
    /// key, not a global one). Every member must be actionable by the user.
    pub async fn create_group(
        &self,
        user_id: &UserId,
        name: &str,
        description: Option<String>,
        robot_ids: Vec<RobotId>,
    ) -> Result<RobotGroup> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoordinationError::Validation("group name is required".into()));
        }
        if robot_ids.is_empty() {
            return Err(CoordinationError::Validation(
                "a group needs at least one robot".into(),
            ));
        }
        let mut seen = HashSet::new();
        for robot_id in &robot_ids {
            if !seen.insert(robot_id.clone()) {
                return Err(CoordinationError::Validation(format!(
                    "duplicate robot in group: {robot_id}"
                )));
            }
        }

        let existing = self.store.load_groups_for_user(user_id)?;
        if existing.iter().any(|group| group.name == name) {
            return Err(CoordinationError::DuplicateGroupName(name.to_owned()));
        }

        for robot_id in &robot_ids {
            let scope = ActionScope::Robot(robot_id.clone());
            if !self.authorizer.can_act(user_id, &scope).await {
                return Err(CoordinationError::Unauthorized {
                    user_id: user_id.clone(),
                    scope: format!("robot {robot_id}"),
                });
            }
        }

        let group = RobotGroup {
            id: GroupId::new(),
            name: name.to_owned(),
            description,
            robot_ids,
            owner_id: user_id.clone(),
            configuration: serde_json::Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
        };
        self.store.save_group(&group)?;
        info!(
            group_id = %group.id,
            user_id = %user_id,
            members = group.robot_ids.len(),
            "robot group created"
        );
        Ok(group)
    }

    /// Load a group the user may act on.
    pub async fn get_group(&self, group_id: &GroupId, user_id: &UserId) -> Result<RobotGroup> {
        let group = self
            .store
            .load_group(group_id)?
            .ok_or_else(|| CoordinationError::GroupNotFound(group_id.clone()))?;
        if group.owner_id != *user_id {
            let scope = ActionScope::Group(group_id.clone());
            if !self.authorizer.can_act(user_id, &scope).await {
                return Err(CoordinationError::Unauthorized {
                    user_id: user_id.clone(),
                    scope: format!("group {group_id}"),
                });
            }
        }
        Ok(group)
    }

    /// Every group owned by the user.
    pub fn list_groups(&self, user_id: &UserId) -> Result<Vec<RobotGroup>> {
        Ok(self.store.load_groups_for_user(user_id)?)
    }

    /// Delete a group the user may act on. Returns whether it existed.
    pub async fn delete_group(&self, group_id: &GroupId, user_id: &UserId) -> Result<bool> {
        // Authorization piggybacks on the visibility check.
        let _ = self.get_group(group_id, user_id).await?;
        Ok(self.store.delete_group(group_id)?)
    }

    /// Dispatch one command per group member and classify each outcome.
    pub async fn send_group_command(
        &self,
        group_id: &GroupId,
        verb: CommandVerb,
        parameters: serde_json::Value,
        user_id: &UserId,
    ) -> Result<GroupCommandReport> {
        let group = self.get_group(group_id, user_id).await?;
        let report = self
            .fan_out(group.robot_ids.clone(), verb, parameters, user_id)
            .await;
        info!(
            group_id = %group_id,
            user_id = %user_id,
            successful = report.successful.len(),
            queued = report.queued.len(),
            failed = report.failed.len(),
            "group command completed"
        );
        Ok(report)
    }

    /// Dispatch one command per explicitly listed robot.
    ///
    /// Unlike group members (ownership-checked at group creation), an ad-hoc
    /// target list is authorized per robot; denied targets land in `failed`.
    pub async fn send_bulk_operation(
        &self,
        user_id: &UserId,
        robot_ids: Vec<RobotId>,
        verb: CommandVerb,
        parameters: serde_json::Value,
    ) -> Result<GroupCommandReport> {
        if robot_ids.is_empty() {
            return Err(CoordinationError::Validation(
                "bulk operation needs at least one robot".into(),
            ));
        }

        let mut permitted = Vec::with_capacity(robot_ids.len());
        let mut report = GroupCommandReport::default();
        for robot_id in robot_ids {
            let scope = ActionScope::Robot(robot_id.clone());
            if self.authorizer.can_act(user_id, &scope).await {
                permitted.push(robot_id);
            } else {
                report.failed.push(GroupFailure {
                    robot_id,
                    reason: "not authorized".into(),
                });
            }
        }

        let dispatched = self.fan_out(permitted, verb, parameters, user_id).await;
        report.successful = dispatched.successful;
        report.queued = dispatched.queued;
        report.failed.extend(dispatched.failed);
        Ok(report)
    }

    /// Exhaustive fan-out: every member is dispatched regardless of the
    /// outcomes before it.
    async fn fan_out(
        &self,
        robot_ids: Vec<RobotId>,
        verb: CommandVerb,
        parameters: serde_json::Value,
        user_id: &UserId,
    ) -> GroupCommandReport {
        let sends = robot_ids.into_iter().map(|robot_id| {
            let command = RobotCommand::new(
                robot_id.clone(),
                verb.clone(),
                parameters.clone(),
                user_id.clone(),
            );
            async move { (robot_id, self.dispatcher.send(command).await) }
        });
        let outcomes = futures::future::join_all(sends).await;

        let mut report = GroupCommandReport::default();
        for (robot_id, outcome) in outcomes {
            match outcome {
                SendOutcome::Delivered => report.successful.push(robot_id),
                SendOutcome::Queued => report.queued.push(robot_id),
                SendOutcome::Rejected(reason) => {
                    report.failed.push(GroupFailure { robot_id, reason });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::DispatchAudit;
    use crate::connection::RobotConnection;
    use crate::gateway::{CommandEnvelope, DeliveryStatus, TransportGateway};
    use crate::queue::CommandQueue;
    use crate::registry::ConnectionRegistry;
    use crate::store::{StoreError, StoreResult};
    use async_trait::async_trait;
    use fleet_core::TransportSessionId;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    struct MemoryGroupStore {
        groups: Mutex<HashMap<GroupId, RobotGroup>>,
    }

    impl MemoryGroupStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                groups: Mutex::new(HashMap::new()),
            })
        }
    }

    impl GroupStore for MemoryGroupStore {
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

    /// Authorizer granting robot scopes by prefix: user `u1` may act on
    /// robots whose ID does not start with `other-`.
    struct PrefixAuthorizer;

    #[async_trait]
    impl Authorizer for PrefixAuthorizer {
        async fn is_valid_user(&self, _user_id: &UserId) -> bool {
            true
        }

        async fn can_act(&self, user_id: &UserId, scope: &ActionScope) -> bool {
            match scope {
                ActionScope::Robot(robot_id) => {
                    user_id.as_str() == "u1" && !robot_id.as_str().starts_with("other-")
                }
                ActionScope::Group(_) => false,
                ActionScope::Fleet => false,
            }
        }
    }

    struct AckGateway;

    #[async_trait]
    impl TransportGateway for AckGateway {
        async fn deliver(
            &self,
            _session_id: &TransportSessionId,
            _envelope: &CommandEnvelope,
        ) -> DeliveryStatus {
            DeliveryStatus::Ack
        }
    }

    fn make_manager() -> (GroupManager, Arc<ConnectionRegistry>, Arc<MemoryGroupStore>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let queue = Arc::new(CommandQueue::new(16));
        let audit = Arc::new(DispatchAudit::new(128));
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&registry),
            queue,
            Arc::new(AckGateway),
            audit,
            Duration::from_millis(200),
            3,
        ));
        let store = MemoryGroupStore::new();
        let manager = GroupManager::new(
            Arc::clone(&store) as Arc<dyn GroupStore>,
            Arc::new(PrefixAuthorizer),
            dispatcher,
        );
        (manager, registry, store)
    }

    fn connect(registry: &ConnectionRegistry, robot: &str) {
        let _ = registry.register(RobotConnection::new(
            RobotId::from(robot),
            TransportSessionId::new(),
            "10.0.0.5:41234".into(),
            json!({}),
            json!({}),
        ));
    }

    fn ids(names: &[&str]) -> Vec<RobotId> {
        names.iter().map(|n| RobotId::from(*n)).collect()
    }

    #[tokio::test]
    async fn create_group_persists() {
        let (manager, _registry, store) = make_manager();
        let user = UserId::from("u1");
        let group = manager
            .create_group(&user, "patrol", None, ids(&["r1", "r2"]))
            .await
            .unwrap();
        assert_eq!(group.robot_ids.len(), 2);
        assert_eq!(store.count_groups().unwrap(), 1);
    }

    #[tokio::test]
    async fn create_group_rejects_empty_members() {
        let (manager, _registry, _store) = make_manager();
        let result = manager
            .create_group(&UserId::from("u1"), "patrol", None, Vec::new())
            .await;
        assert!(matches!(result, Err(CoordinationError::Validation(_))));
    }

    #[tokio::test]
    async fn create_group_rejects_duplicate_members() {
        let (manager, _registry, _store) = make_manager();
        let result = manager
            .create_group(&UserId::from("u1"), "patrol", None, ids(&["r1", "r1"]))
            .await;
        assert!(matches!(result, Err(CoordinationError::Validation(_))));
    }

    #[tokio::test]
    async fn group_names_unique_per_user() {
        let (manager, _registry, _store) = make_manager();
        let user = UserId::from("u1");
        let _ = manager
            .create_group(&user, "patrol", None, ids(&["r1"]))
            .await
            .unwrap();
        let result = manager.create_group(&user, "patrol", None, ids(&["r2"])).await;
        assert!(matches!(
            result,
            Err(CoordinationError::DuplicateGroupName(name)) if name == "patrol"
        ));
    }

    #[tokio::test]
    async fn create_group_requires_robot_authorization() {
        let (manager, _registry, _store) = make_manager();
        let result = manager
            .create_group(
                &UserId::from("u1"),
                "patrol",
                None,
                ids(&["r1", "other-r9"]),
            )
            .await;
        assert!(matches!(result, Err(CoordinationError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn group_command_classifies_members_independently() {
        let (manager, registry, _store) = make_manager();
        let user = UserId::from("u1");
        let group = manager
            .create_group(&user, "patrol", None, ids(&["r1", "r2", "r3", "r4"]))
            .await
            .unwrap();

        // Two online, two offline.
        connect(&registry, "r1");
        connect(&registry, "r2");

        let report = manager
            .send_group_command(&group.id, CommandVerb::Move, json!({}), &user)
            .await
            .unwrap();
        assert_eq!(report.successful.len(), 2);
        assert_eq!(report.queued.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.total(), 4);
    }

    #[tokio::test]
    async fn group_command_with_unknown_verb_fails_per_member() {
        let (manager, registry, _store) = make_manager();
        let user = UserId::from("u1");
        let group = manager
            .create_group(&user, "patrol", None, ids(&["r1", "r2"]))
            .await
            .unwrap();
        connect(&registry, "r1");

        let report = manager
            .send_group_command(
                &group.id,
                CommandVerb::Unknown("frobnicate".into()),
                json!({}),
                &user,
            )
            .await
            .unwrap();
        // Fan-out is exhaustive: both members are reported, neither aborts
        // the other.
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().all(|f| f.reason.contains("frobnicate")));
    }

    #[tokio::test]
    async fn group_command_for_other_user_unauthorized() {
        let (manager, _registry, _store) = make_manager();
        let owner = UserId::from("u1");
        let group = manager
            .create_group(&owner, "patrol", None, ids(&["r1"]))
            .await
            .unwrap();

        let result = manager
            .send_group_command(&group.id, CommandVerb::Move, json!({}), &UserId::from("u2"))
            .await;
        assert!(matches!(result, Err(CoordinationError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn group_command_unknown_group() {
        let (manager, _registry, _store) = make_manager();
        let result = manager
            .send_group_command(
                &GroupId::from("missing"),
                CommandVerb::Move,
                json!({}),
                &UserId::from("u1"),
            )
            .await;
        assert!(matches!(result, Err(CoordinationError::GroupNotFound(_))));
    }

    #[tokio::test]
    async fn bulk_operation_reports_unauthorized_targets() {
        let (manager, registry, _store) = make_manager();
        connect(&registry, "r1");

        let report = manager
            .send_bulk_operation(
                &UserId::from("u1"),
                ids(&["r1", "other-r9"]),
                CommandVerb::Stop,
                json!({}),
            )
            .await
            .unwrap();
        assert_eq!(report.successful, ids(&["r1"]));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].reason, "not authorized");
    }

    #[tokio::test]
    async fn delete_group_round_trip() {
        let (manager, _registry, _store) = make_manager();
        let user = UserId::from("u1");
        let group = manager
            .create_group(&user, "patrol", None, ids(&["r1"]))
            .await
            .unwrap();
        assert!(manager.delete_group(&group.id, &user).await.unwrap());
        assert!(matches!(
            manager.get_group(&group.id, &user).await,
            Err(CoordinationError::GroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        struct FailingStore;
        impl GroupStore for FailingStore {
            fn save_group(&self, _group: &RobotGroup) -> StoreResult<()> {
                Err(StoreError::new("save_group", "disk full"))
            }
            fn load_group(&self, _group_id: &GroupId) -> StoreResult<Option<RobotGroup>> {
                Ok(None)
            }
            fn load_groups_for_user(&self, _user_id: &UserId) -> StoreResult<Vec<RobotGroup>> {
                Ok(Vec::new())
            }
            fn delete_group(&self, _group_id: &GroupId) -> StoreResult<bool> {
                Ok(false)
            }
            fn count_groups(&self) -> StoreResult<usize> {
                Ok(0)
            }
        }

        let registry = Arc::new(ConnectionRegistry::new());
        let queue = Arc::new(CommandQueue::new(16));
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&registry),
            queue,
            Arc::new(AckGateway),
            Arc::new(DispatchAudit::new(16)),
            Duration::from_millis(200),
            3,
        ));
        let manager = GroupManager::new(Arc::new(FailingStore), Arc::new(PrefixAuthorizer), dispatcher);

        let result = manager
            .create_group(&UserId::from("u1"), "patrol", None, ids(&["r1"]))
            .await;
        assert!(matches!(result, Err(CoordinationError::Store(_))));
    }
}
