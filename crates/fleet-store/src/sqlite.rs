//! Pooled SQLite implementation of the coordination store contracts.

use std::path::Path;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use fleet_core::{GroupId, RobotId, UserId};
use fleet_coordination::store::{GroupStore, OwnershipStore, StoreError, StoreResult};
use fleet_coordination::RobotGroup;

use crate::migrations::run_migrations;

/// Pooled SQLite store for groups and robot ownership.
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open (and migrate) the database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        Self::with_manager(manager, 8)
    }

    /// Open an in-memory database (single pooled connection, for tests).
    pub fn open_in_memory() -> StoreResult<Self> {
        // An in-memory database exists per connection; the pool must not
        // open a second one.
        Self::with_manager(SqliteConnectionManager::memory(), 1)
    }

    fn with_manager(manager: SqliteConnectionManager, max_size: u32) -> StoreResult<Self> {
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(|e| StoreError::new("open", e.to_string()))?;
        let store = Self { pool };
        let conn = store.conn("open")?;
        run_migrations(&conn)?;
        drop(conn);
        Ok(store)
    }

    /// Record (or replace) a robot's owner.
    pub fn set_owner(&self, robot_id: &RobotId, owner_id: &UserId) -> StoreResult<()> {
        let conn = self.conn("set_owner")?;
        let _ = conn
            .execute(
                "INSERT INTO robot_ownership (robot_id, owner_id, registered_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(robot_id) DO UPDATE SET owner_id = excluded.owner_id",
                params![robot_id.as_str(), owner_id.as_str(), now_iso()],
            )
            .map_err(|e| StoreError::new("set_owner", e.to_string()))?;
        Ok(())
    }

    /// Remove a robot's ownership record. Returns whether one existed.
    pub fn remove_owner(&self, robot_id: &RobotId) -> StoreResult<bool> {
        let conn = self.conn("remove_owner")?;
        let removed = conn
            .execute(
                "DELETE FROM robot_ownership WHERE robot_id = ?1",
                params![robot_id.as_str()],
            )
            .map_err(|e| StoreError::new("remove_owner", e.to_string()))?;
        Ok(removed > 0)
    }

    fn conn(&self, operation: &str) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| StoreError::new(operation, e.to_string()))
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<RobotGroup> {
    let robot_ids_json: String = row.get("robot_ids")?;
    let configuration_json: String = row.get("configuration")?;
    let created_at_raw: String = row.get("created_at")?;
    let robot_ids: Vec<String> = serde_json::from_str(&robot_ids_json).unwrap_or_default();
    let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(RobotGroup {
        id: GroupId::from_string(row.get("id")?),
        name: row.get("name")?,
        description: row.get("description")?,
        robot_ids: robot_ids.into_iter().map(RobotId::from_string).collect(),
        owner_id: UserId::from_string(row.get("owner_id")?),
        configuration: serde_json::from_str(&configuration_json)
            .unwrap_or(serde_json::Value::Null),
        created_at,
    })
}

impl GroupStore for SqliteStore {
    fn save_group(&self, group: &RobotGroup) -> StoreResult<()> {
        let conn = self.conn("save_group")?;
        let robot_ids: Vec<&str> = group.robot_ids.iter().map(RobotId::as_str).collect();
        let robot_ids_json = serde_json::to_string(&robot_ids)
            .map_err(|e| StoreError::new("save_group", e.to_string()))?;
        let configuration_json = serde_json::to_string(&group.configuration)
            .map_err(|e| StoreError::new("save_group", e.to_string()))?;

        let _ = conn
            .execute(
                "INSERT OR REPLACE INTO robot_groups
                 (id, name, description, robot_ids, owner_id, configuration, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    group.id.as_str(),
                    group.name,
                    group.description,
                    robot_ids_json,
                    group.owner_id.as_str(),
                    configuration_json,
                    group.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StoreError::new("save_group", e.to_string()))?;
        debug!(group_id = %group.id, "group saved");
        Ok(())
    }

    fn load_group(&self, group_id: &GroupId) -> StoreResult<Option<RobotGroup>> {
        let conn = self.conn("load_group")?;
        conn.query_row(
            "SELECT id, name, description, robot_ids, owner_id, configuration, created_at
             FROM robot_groups WHERE id = ?1",
            params![group_id.as_str()],
            row_to_group,
        )
        .optional()
        .map_err(|e| StoreError::new("load_group", e.to_string()))
    }

    fn load_groups_for_user(&self, user_id: &UserId) -> StoreResult<Vec<RobotGroup>> {
        let conn = self.conn("load_groups_for_user")?;
        let mut statement = conn
            .prepare(
                "SELECT id, name, description, robot_ids, owner_id, configuration, created_at
                 FROM robot_groups WHERE owner_id = ?1 ORDER BY created_at",
            )
            .map_err(|e| StoreError::new("load_groups_for_user", e.to_string()))?;
        let groups = statement
            .query_map(params![user_id.as_str()], row_to_group)
            .map_err(|e| StoreError::new("load_groups_for_user", e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::new("load_groups_for_user", e.to_string()))?;
        Ok(groups)
    }

    fn delete_group(&self, group_id: &GroupId) -> StoreResult<bool> {
        let conn = self.conn("delete_group")?;
        let removed = conn
            .execute(
                "DELETE FROM robot_groups WHERE id = ?1",
                params![group_id.as_str()],
            )
            .map_err(|e| StoreError::new("delete_group", e.to_string()))?;
        Ok(removed > 0)
    }

    fn count_groups(&self) -> StoreResult<usize> {
        let conn = self.conn("count_groups")?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM robot_groups", [], |row| row.get(0))
            .map_err(|e| StoreError::new("count_groups", e.to_string()))?;
        Ok(count as usize)
    }
}

impl OwnershipStore for SqliteStore {
    fn owner_of(&self, robot_id: &RobotId) -> StoreResult<Option<UserId>> {
        let conn = self.conn("owner_of")?;
        conn.query_row(
            "SELECT owner_id FROM robot_ownership WHERE robot_id = ?1",
            params![robot_id.as_str()],
            |row| row.get::<_, String>(0).map(UserId::from_string),
        )
        .optional()
        .map_err(|e| StoreError::new("owner_of", e.to_string()))
    }

    fn robots_owned_by(&self, user_id: &UserId) -> StoreResult<Vec<RobotId>> {
        let conn = self.conn("robots_owned_by")?;
        let mut statement = conn
            .prepare("SELECT robot_id FROM robot_ownership WHERE owner_id = ?1 ORDER BY robot_id")
            .map_err(|e| StoreError::new("robots_owned_by", e.to_string()))?;
        let robots = statement
            .query_map(params![user_id.as_str()], |row| {
                row.get::<_, String>(0).map(RobotId::from_string)
            })
            .map_err(|e| StoreError::new("robots_owned_by", e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::new("robots_owned_by", e.to_string()))?;
        Ok(robots)
    }
}
