//! Chart Definition Store
//!
//! CRUD over saved charts. Every call takes the owning project id; a chart
//! belonging to another project behaves exactly like a missing one.
//!
//! Specs are stored in their canonical string form (`event_types` as a JSON
//! array) and re-validated on read. A row that no longer validates is
//! reported as [`StorageError::Corruption`] by `get`, skipped with a warning
//! by `list`, and can be repaired by an `update` that supplies the broken
//! fields.

use crate::query::{ChartSpec, QueryResult, RawChartSpec, TimeRangePolicy};
use crate::storage::database::Database;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{ChartDefinition, ChartPatch, NewChart, DEFAULT_CHART_WIDTH};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

const CHART_COLUMNS: &str = "id, project_id, name, description, chart_type, event_types, \
     group_by, time_range, granularity, position, width, created_at, updated_at";

/// Reads and writes chart definitions
#[derive(Clone)]
pub struct ChartStore {
    db: Database,
    time_range_policy: TimeRangePolicy,
}

impl ChartStore {
    pub fn new(db: Database) -> Self {
        Self::with_policy(db, TimeRangePolicy::default())
    }

    /// Store that re-validates stored rows under `policy`
    pub fn with_policy(db: Database, time_range_policy: TimeRangePolicy) -> Self {
        Self {
            db,
            time_range_policy,
        }
    }

    /// Save a new chart
    pub async fn create(&self, project_id: &str, chart: NewChart) -> StorageResult<ChartDefinition> {
        let now = Utc::now().timestamp_millis();
        let id = uuid::Uuid::new_v4().to_string();

        let definition = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let position = match chart.position {
                Some(p) => p,
                None => next_position(&tx, project_id)?,
            };

            let definition = ChartDefinition {
                id,
                project_id: project_id.to_string(),
                name: chart.name,
                description: chart.description,
                spec: chart.spec,
                position,
                width: chart
                    .width
                    .unwrap_or_else(|| DEFAULT_CHART_WIDTH.to_string()),
                created_at: now,
                updated_at: now,
            };

            write_row(&tx, &definition, true)?;
            tx.commit()?;
            Ok(definition)
        })?;

        tracing::info!(
            project_id = %project_id,
            chart_id = %definition.id,
            chart_type = %definition.spec.chart_type,
            "Chart created"
        );
        Ok(definition)
    }

    /// All charts of a project, in dashboard order
    pub async fn list(&self, project_id: &str) -> StorageResult<Vec<ChartDefinition>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {CHART_COLUMNS} FROM charts
                 WHERE project_id = ?1
                 ORDER BY position ASC, created_at ASC"
            ))?;

            let rows = stmt
                .query_map(params![project_id], StoredChart::from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .filter_map(|row| {
                    let chart_id = row.id.clone();
                    match row.into_definition(self.time_range_policy) {
                        Ok(definition) => Some(definition),
                        Err(e) => {
                            tracing::warn!(
                                project_id = %project_id,
                                chart_id = %chart_id,
                                error = %e,
                                "Skipping chart that no longer validates"
                            );
                            None
                        }
                    }
                })
                .collect())
        })
    }

    /// One chart, or `None` if it does not exist in this project
    pub async fn get(&self, project_id: &str, chart_id: &str) -> StorageResult<Option<ChartDefinition>> {
        self.db
            .with_conn(|conn| fetch(conn, project_id, chart_id))?
            .map(|row| row.into_definition(self.time_range_policy))
            .transpose()
    }

    /// Apply a partial update; `None` if the chart does not exist in this project
    ///
    /// The stored row is fetched, overlaid with the spec fields of `patch`,
    /// validated and written back in one transaction. Spec errors come back as
    /// invalid-spec [`QueryError`](crate::query::QueryError)s.
    pub async fn update(
        &self,
        project_id: &str,
        chart_id: &str,
        patch: ChartPatch,
    ) -> QueryResult<Option<ChartDefinition>> {
        let policy = self.time_range_policy;
        let updated = self
            .db
            .with_conn_mut(|conn| Ok(update_row(conn, project_id, chart_id, patch, policy)))??;

        if updated.is_some() {
            tracing::info!(project_id = %project_id, chart_id = %chart_id, "Chart updated");
        }
        Ok(updated)
    }

    /// Remove a chart; returns whether anything was deleted
    pub async fn delete(&self, project_id: &str, chart_id: &str) -> StorageResult<bool> {
        let deleted = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM charts WHERE project_id = ?1 AND id = ?2",
                params![project_id, chart_id],
            )?)
        })?;

        if deleted > 0 {
            tracing::info!(project_id = %project_id, chart_id = %chart_id, "Chart deleted");
        }
        Ok(deleted > 0)
    }
}

fn update_row(
    conn: &mut Connection,
    project_id: &str,
    chart_id: &str,
    patch: ChartPatch,
    policy: TimeRangePolicy,
) -> QueryResult<Option<ChartDefinition>> {
    let tx = conn.transaction().map_err(StorageError::from)?;

    let Some(row) = fetch(&tx, project_id, chart_id)? else {
        return Ok(None);
    };

    let mut definition = if patch.spec.is_empty() {
        row.into_definition(policy)?
    } else {
        // Stored event types are not decoded when the patch replaces them
        let base = if patch.spec.event_types.is_some() {
            row.raw.clone()
        } else {
            row.raw_spec()?
        };
        let spec = patch.spec.apply(base).validate(policy)?;
        row.with_spec(spec)
    };

    if let Some(name) = patch.name {
        definition.name = name;
    }
    if let Some(description) = patch.description {
        definition.description = description;
    }
    if let Some(position) = patch.position {
        definition.position = position;
    }
    if let Some(width) = patch.width {
        definition.width = width;
    }
    definition.updated_at = Utc::now().timestamp_millis().max(definition.updated_at);

    write_row(&tx, &definition, false)?;
    tx.commit().map_err(StorageError::from)?;
    Ok(Some(definition))
}

fn next_position(conn: &Connection, project_id: &str) -> StorageResult<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(position) FROM charts WHERE project_id = ?1",
        params![project_id],
        |row| row.get(0),
    )?;
    Ok(max.map_or(0, |p| p + 1))
}

fn fetch(conn: &Connection, project_id: &str, chart_id: &str) -> StorageResult<Option<StoredChart>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CHART_COLUMNS} FROM charts WHERE project_id = ?1 AND id = ?2"
    ))?;
    Ok(stmt
        .query_row(params![project_id, chart_id], StoredChart::from_row)
        .optional()?)
}

fn write_row(conn: &Connection, chart: &ChartDefinition, insert: bool) -> StorageResult<()> {
    let raw = chart.spec.to_raw();
    let event_types = serde_json::to_string(&raw.event_types)?;

    let sql = if insert {
        "INSERT INTO charts (
            id, project_id, name, description, chart_type, event_types,
            group_by, time_range, granularity, position, width, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    } else {
        "UPDATE charts SET
            name = ?3, description = ?4, chart_type = ?5, event_types = ?6,
            group_by = ?7, time_range = ?8, granularity = ?9, position = ?10,
            width = ?11, created_at = ?12, updated_at = ?13
         WHERE id = ?1 AND project_id = ?2"
    };

    conn.prepare_cached(sql)?.execute(params![
        chart.id,
        chart.project_id,
        chart.name,
        chart.description,
        raw.chart_type,
        event_types,
        raw.group_by,
        raw.time_range,
        raw.granularity,
        chart.position,
        chart.width,
        chart.created_at,
        chart.updated_at,
    ])?;

    Ok(())
}

/// A `charts` row before its spec is validated
struct StoredChart {
    id: String,
    project_id: String,
    name: String,
    description: Option<String>,
    raw: RawChartSpec,
    event_types_json: String,
    position: i64,
    width: String,
    created_at: i64,
    updated_at: i64,
}

impl StoredChart {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            raw: RawChartSpec {
                chart_type: row.get(4)?,
                event_types: Vec::new(),
                group_by: row.get(6)?,
                time_range: row.get(7)?,
                granularity: row.get(8)?,
            },
            event_types_json: row.get(5)?,
            position: row.get(9)?,
            width: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    /// The stored spec with its event types decoded
    fn raw_spec(&self) -> StorageResult<RawChartSpec> {
        let event_types = serde_json::from_str(&self.event_types_json).map_err(|e| {
            StorageError::Corruption(format!("chart {} has unreadable event types: {}", self.id, e))
        })?;

        Ok(RawChartSpec {
            event_types,
            ..self.raw.clone()
        })
    }

    fn into_definition(self, policy: TimeRangePolicy) -> StorageResult<ChartDefinition> {
        let spec = self
            .raw_spec()?
            .validate(policy)
            .map_err(|e| StorageError::Corruption(format!("chart {}: {}", self.id, e)))?;

        Ok(self.with_spec(spec))
    }

    fn with_spec(self, spec: ChartSpec) -> ChartDefinition {
        ChartDefinition {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            description: self.description,
            spec,
            position: self.position,
            width: self.width,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
