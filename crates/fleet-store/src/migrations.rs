//! Version-tracked schema migrations.

use rusqlite::Connection;
use tracing::info;

use fleet_coordination::StoreError;

/// Ordered migration steps; index + 1 is the schema version.
const MIGRATIONS: &[&str] = &[
    // v1: groups and ownership
    "CREATE TABLE IF NOT EXISTS robot_groups (
        id            TEXT PRIMARY KEY,
        name          TEXT NOT NULL,
        description   TEXT,
        robot_ids     TEXT NOT NULL,
        owner_id      TEXT NOT NULL,
        configuration TEXT NOT NULL DEFAULT '{}',
        created_at    TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_robot_groups_owner ON robot_groups(owner_id);
    CREATE TABLE IF NOT EXISTS robot_ownership (
        robot_id      TEXT PRIMARY KEY,
        owner_id      TEXT NOT NULL,
        registered_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_robot_ownership_owner ON robot_ownership(owner_id);",
];

/// Apply every pending migration.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(|e| StoreError::new("migrate", e.to_string()))?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::new("migrate", e.to_string()))?;

    for (index, sql) in MIGRATIONS.iter().enumerate() {
        let version = (index + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .map_err(|e| StoreError::new("migrate", format!("v{version}: {e}")))?;
        let _ = conn
            .execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(|e| StoreError::new("migrate", e.to_string()))?;
        info!(version, "applied store migration");
    }
    Ok(())
}
