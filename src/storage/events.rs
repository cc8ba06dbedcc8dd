//! Event Store
//!
//! Append-only ingest into the `events` table. Events are never updated or
//! deleted once written.

use crate::storage::database::Database;
use crate::storage::error::StorageResult;
use crate::storage::types::{EventRecord, NewEvent};
use rusqlite::{params, Connection};

const INSERT_EVENT: &str = "INSERT INTO events (
        id, project_id, type, timestamp,
        country, browser, device, os, referrer_domain, source, medium, campaign,
        metadata, created_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

/// Writes tracked events
#[derive(Clone)]
pub struct EventStore {
    db: Database,
}

impl EventStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a single event
    pub async fn insert(&self, project_id: &str, event: NewEvent) -> StorageResult<EventRecord> {
        let record = EventRecord::from_new(project_id, event);

        self.db.with_conn(|conn| insert_record(conn, &record))?;

        tracing::debug!(
            project_id = %project_id,
            event_type = %record.event_type,
            "Event recorded"
        );
        Ok(record)
    }

    /// Record many events in one transaction; all or nothing
    pub async fn insert_batch(&self, project_id: &str, events: Vec<NewEvent>) -> StorageResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let records: Vec<EventRecord> = events
            .into_iter()
            .map(|e| EventRecord::from_new(project_id, e))
            .collect();

        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for record in &records {
                insert_record(&tx, record)?;
            }
            tx.commit()?;
            Ok(())
        })?;

        tracing::debug!(project_id = %project_id, count = records.len(), "Event batch recorded");
        Ok(records.len())
    }

    /// Number of events stored for a project
    pub async fn count(&self, project_id: &str) -> StorageResult<i64> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("SELECT COUNT(*) FROM events WHERE project_id = ?1")?;
            Ok(stmt.query_row(params![project_id], |row| row.get(0))?)
        })
    }

    /// Number of events across all projects
    pub async fn total(&self) -> StorageResult<i64> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?)
        })
    }
}

fn insert_record(conn: &Connection, record: &EventRecord) -> StorageResult<()> {
    let metadata = record
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let dims = &record.dimensions;

    let mut stmt = conn.prepare_cached(INSERT_EVENT)?;
    stmt.execute(params![
        record.id,
        record.project_id,
        record.event_type,
        record.timestamp,
        dims.country,
        dims.browser,
        dims.device,
        dims.os,
        dims.referrer_domain,
        dims.source,
        dims.medium,
        dims.campaign,
        metadata,
        record.created_at,
    ])?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::GroupByDimension;
    use serde_json::json;

    fn store() -> EventStore {
        EventStore::new(Database::in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_insert_and_count() {
        let store = store();

        let record = store
            .insert(
                "p1",
                NewEvent::new("signup")
                    .at(1705329342123)
                    .dimension(GroupByDimension::Country, "US")
                    .metadata(json!({"plan": "pro"})),
            )
            .await
            .unwrap();

        assert_eq!(record.project_id, "p1");
        assert_eq!(record.timestamp, 1705329342123);
        assert_eq!(store.count("p1").await.unwrap(), 1);
        assert_eq!(store.count("p2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_row_round_trips_columns() {
        let store = store();
        let record = store
            .insert(
                "p1",
                NewEvent::new("click")
                    .at(1000)
                    .dimension(GroupByDimension::ReferrerDomain, "example.com")
                    .metadata(json!({"button": "buy"})),
            )
            .await
            .unwrap();

        let (event_type, referrer, metadata): (String, String, String) = store
            .db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT type, referrer_domain, metadata FROM events WHERE id = ?1",
                    params![record.id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?)
            })
            .unwrap();

        assert_eq!(event_type, "click");
        assert_eq!(referrer, "example.com");
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&metadata).unwrap(),
            json!({"button": "buy"})
        );
    }

    #[tokio::test]
    async fn test_insert_batch() {
        let store = store();
        let events = (0..50).map(|i| NewEvent::new("view").at(i)).collect();

        assert_eq!(store.insert_batch("p1", events).await.unwrap(), 50);
        assert_eq!(store.insert_batch("p1", Vec::new()).await.unwrap(), 0);
        assert_eq!(store.count("p1").await.unwrap(), 50);
        assert_eq!(store.total().await.unwrap(), 50);
    }
}
