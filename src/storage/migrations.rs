//! Schema migrations
//!
//! Ordered list of `(version, sql)` pairs. The database's `user_version`
//! pragma records the last applied version, so running the list again on an
//! up-to-date database is a no-op.

use crate::storage::error::StorageResult;
use rusqlite::Connection;

/// Every schema change, oldest first. Never edit an entry once released;
/// append a new version instead.
pub const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        "CREATE TABLE IF NOT EXISTS events (
            id              TEXT PRIMARY KEY,
            project_id      TEXT NOT NULL,
            type            TEXT NOT NULL,
            timestamp       INTEGER NOT NULL,
            country         TEXT,
            browser         TEXT,
            device          TEXT,
            os              TEXT,
            referrer_domain TEXT,
            source          TEXT,
            medium          TEXT,
            campaign        TEXT,
            metadata        TEXT,
            created_at      INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_project_time ON events(project_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_events_project_type ON events(project_id, type);",
    ),
    (
        2,
        "CREATE TABLE IF NOT EXISTS charts (
            id          TEXT PRIMARY KEY,
            project_id  TEXT NOT NULL,
            name        TEXT NOT NULL,
            description TEXT,
            chart_type  TEXT NOT NULL,
            event_types TEXT NOT NULL,
            group_by    TEXT,
            time_range  TEXT NOT NULL,
            granularity TEXT NOT NULL,
            position    INTEGER NOT NULL DEFAULT 0,
            width       TEXT NOT NULL DEFAULT 'full',
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_charts_project_position ON charts(project_id, position);",
    ),
];

/// Latest schema version known to this build
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|(v, _)| *v).unwrap_or(0)
}

/// Current schema version of an open database
pub fn current_version(conn: &Connection) -> StorageResult<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Apply every migration newer than the database's `user_version`
///
/// Returns the number of migrations applied.
pub fn run(conn: &mut Connection) -> StorageResult<usize> {
    let current = current_version(conn)?;
    let pending: Vec<_> = MIGRATIONS.iter().filter(|(v, _)| *v > current).collect();

    if pending.is_empty() {
        tracing::debug!(version = current, "Schema up to date");
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for (version, sql) in &pending {
        tracing::info!(version = *version, "Applying schema migration");
        tx.execute_batch(sql)?;
        // PRAGMA does not accept bound parameters; the version is a compile-time constant.
        tx.execute_batch(&format!("PRAGMA user_version = {}", version))?;
    }
    tx.commit()?;

    Ok(pending.len())
}
