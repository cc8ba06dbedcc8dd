//! Query Executor
//!
//! Runs a [`CompiledQuery`] against the event store and decodes the rows
//! according to its declared shape.
//!
//! # Execution Pipeline
//!
//! ```text
//! ChartSpec → compile → CompiledQuery → prepare/bind → rows → ChartData
//! ```

use crate::query::compiler::{compile, CompiledQuery, ResultShape, SqlParam};
use crate::query::error::QueryResult;
use crate::query::spec::ChartSpec;
use crate::storage::{Database, StorageResult};
use rusqlite::types::ToSqlOutput;
use rusqlite::{params_from_iter, Connection, ToSql};
use serde::{Deserialize, Serialize};
use std::time::Instant;

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlParam::Text(s) => s.to_sql(),
            SqlParam::Integer(i) => i.to_sql(),
        }
    }
}

/// One time bucket of a series chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRow {
    /// Bucket start, Unix milliseconds (UTC)
    pub bucket: i64,
    /// Counts aligned with the series `columns`
    pub values: Vec<i64>,
}

/// One slice of a grouped chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedRow {
    pub label: String,
    pub value: i64,
}

/// Decoded chart rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartData {
    Scalar { value: i64 },
    Series { columns: Vec<String>, rows: Vec<SeriesRow> },
    Grouped { rows: Vec<GroupedRow> },
}

impl ChartData {
    /// Number of result rows (a scalar counts as one)
    pub fn row_count(&self) -> usize {
        match self {
            ChartData::Scalar { .. } => 1,
            ChartData::Series { rows, .. } => rows.len(),
            ChartData::Grouped { rows } => rows.len(),
        }
    }
}

/// Result of running a chart query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartResult {
    pub shape: ResultShape,
    pub data: ChartData,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Query executor
#[derive(Clone)]
pub struct QueryExecutor {
    db: Database,
}

impl QueryExecutor {
    /// Create a new query executor
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Compile and run a chart for one project
    pub async fn run_chart(&self, project_id: &str, spec: &ChartSpec) -> QueryResult<ChartResult> {
        let query = compile(project_id, spec)?;
        self.execute(&query).await
    }

    /// Execute a compiled query
    ///
    /// An empty result is not an error: scalars come back as `0`, series and
    /// grouped charts with no rows.
    pub async fn execute(&self, query: &CompiledQuery) -> QueryResult<ChartResult> {
        let start = Instant::now();

        let data = self.db.with_conn(|conn| match query.shape {
            ResultShape::Scalar => fetch_scalar(conn, query),
            ResultShape::Series => fetch_series(conn, query),
            ResultShape::Grouped => fetch_grouped(conn, query),
        })?;

        let execution_time_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            shape = ?query.shape,
            rows = data.row_count(),
            execution_time_ms,
            "Executed chart query"
        );

        Ok(ChartResult {
            shape: query.shape,
            data,
            execution_time_ms,
        })
    }
}

fn fetch_scalar(conn: &Connection, query: &CompiledQuery) -> StorageResult<ChartData> {
    let mut stmt = conn.prepare_cached(&query.sql)?;
    let value: i64 = stmt.query_row(params_from_iter(query.params.iter()), |row| row.get(0))?;
    Ok(ChartData::Scalar { value })
}

fn fetch_series(conn: &Connection, query: &CompiledQuery) -> StorageResult<ChartData> {
    let width = query.series.len();
    let mut stmt = conn.prepare_cached(&query.sql)?;

    let rows = stmt
        .query_map(params_from_iter(query.params.iter()), |row| {
            let values = (1..=width)
                .map(|i| row.get::<_, i64>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(SeriesRow {
                bucket: row.get(0)?,
                values,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ChartData::Series {
        columns: query.series.clone(),
        rows,
    })
}

fn fetch_grouped(conn: &Connection, query: &CompiledQuery) -> StorageResult<ChartData> {
    let mut stmt = conn.prepare_cached(&query.sql)?;

    let rows = stmt
        .query_map(params_from_iter(query.params.iter()), |row| {
            Ok(GroupedRow {
                label: row.get(0)?,
                value: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ChartData::Grouped { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ChartType, Granularity, GroupByDimension, TimeRange, TOP_N_LIMIT};
    use crate::storage::{EventStore, NewEvent};
    use chrono::Utc;

    const HOUR_MS: i64 = 60 * 60 * 1000;
    const DAY_MS: i64 = 24 * HOUR_MS;

    // Monday 2024-01-15 00:00:00 UTC
    const MONDAY: i64 = 1705276800000;

    fn setup() -> (QueryExecutor, EventStore) {
        let db = Database::in_memory().unwrap();
        (QueryExecutor::new(db.clone()), EventStore::new(db))
    }

    async fn track(events: &EventStore, project: &str, event_type: &str, timestamp: i64) {
        events
            .insert(project, NewEvent::new(event_type).at(timestamp))
            .await
            .unwrap();
    }

    async fn track_in(events: &EventStore, project: &str, country: &str, times: usize) {
        let batch = (0..times)
            .map(|i| {
                NewEvent::new("visit")
                    .at(MONDAY + i as i64)
                    .dimension(GroupByDimension::Country, country)
            })
            .collect();
        events.insert_batch(project, batch).await.unwrap();
    }

    fn all_time(chart_type: ChartType, types: &[&str]) -> ChartSpec {
        ChartSpec::builder(chart_type)
            .event_types(types)
            .time_range(TimeRange::AllTime)
            .build()
    }

    async fn scalar(executor: &QueryExecutor, project: &str, spec: &ChartSpec) -> i64 {
        match executor.run_chart(project, spec).await.unwrap().data {
            ChartData::Scalar { value } => value,
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_project_isolation() {
        let (executor, events) = setup();
        for i in 0..3 {
            track(&events, "p1", "signup", MONDAY + i).await;
        }
        for i in 0..5 {
            track(&events, "p2", "signup", MONDAY + i).await;
        }

        let spec = all_time(ChartType::Number, &["signup"]);
        assert_eq!(scalar(&executor, "p1", &spec).await, 3);
        assert_eq!(scalar(&executor, "p2", &spec).await, 5);
        assert_eq!(scalar(&executor, "p3", &spec).await, 0);

        let result = executor
            .run_chart("p1", &all_time(ChartType::Line, &["signup"]))
            .await
            .unwrap();
        match result.data {
            ChartData::Series { rows, .. } => {
                assert_eq!(rows.iter().map(|r| r.values[0]).sum::<i64>(), 3);
            }
            other => panic!("expected series, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_type_filter_counts() {
        let (executor, events) = setup();
        for event_type in ["a", "b", "c"] {
            track(&events, "p1", event_type, MONDAY).await;
        }

        assert_eq!(scalar(&executor, "p1", &all_time(ChartType::Number, &[])).await, 3);
        assert_eq!(scalar(&executor, "p1", &all_time(ChartType::Number, &["a"])).await, 1);
        assert_eq!(
            scalar(&executor, "p1", &all_time(ChartType::Number, &["a", "b"])).await,
            2
        );
    }

    #[tokio::test]
    async fn test_series_one_column_per_type() {
        let (executor, events) = setup();
        let day2 = MONDAY + DAY_MS;

        // Inserted out of order to check bucket ordering
        track(&events, "p1", "signup", day2 + 5).await;
        track(&events, "p1", "signup", MONDAY + 10).await;
        track(&events, "p1", "signup", MONDAY + 20).await;
        track(&events, "p1", "login", MONDAY + 30).await;
        for i in 0..5 {
            track(&events, "p1", "pageview", day2 + i).await;
        }

        let result = executor
            .run_chart("p1", &all_time(ChartType::Line, &["signup", "login"]))
            .await
            .unwrap();

        assert_eq!(result.shape, ResultShape::Series);
        assert_eq!(
            result.data,
            ChartData::Series {
                columns: vec!["signup".to_string(), "login".to_string()],
                rows: vec![
                    SeriesRow { bucket: MONDAY, values: vec![2, 1] },
                    SeriesRow { bucket: day2, values: vec![1, 0] },
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_series_total_column() {
        let (executor, events) = setup();
        track(&events, "p1", "a", MONDAY).await;
        track(&events, "p1", "b", MONDAY + 1).await;
        track(&events, "p1", "c", MONDAY + DAY_MS).await;

        let spec = ChartSpec::builder(ChartType::Bar)
            .time_range(TimeRange::AllTime)
            .granularity(Granularity::Week)
            .build();
        let result = executor.run_chart("p1", &spec).await.unwrap();

        assert_eq!(
            result.data,
            ChartData::Series {
                columns: vec!["total".to_string()],
                rows: vec![SeriesRow { bucket: MONDAY, values: vec![3] }],
            }
        );
    }

    #[tokio::test]
    async fn test_grouped_top_n() {
        let (executor, events) = setup();

        track_in(&events, "p1", "US", 20).await;
        for (i, country) in [
            "DE", "FR", "GB", "NL", "SE", "NO", "DK", "FI", "ES", "IT", "PT", "PL", "CZ", "AT",
            "CH",
        ]
        .iter()
        .enumerate()
        {
            track_in(&events, "p1", country, i + 1).await;
        }
        // No country recorded
        for i in 0..30 {
            track(&events, "p1", "visit", MONDAY + i).await;
        }

        let spec = ChartSpec::builder(ChartType::Pie)
            .group_by(GroupByDimension::Country)
            .time_range(TimeRange::AllTime)
            .build();
        let result = executor.run_chart("p1", &spec).await.unwrap();
        assert_eq!(result.shape, ResultShape::Grouped);

        let ChartData::Grouped { rows } = result.data else {
            panic!("expected grouped rows");
        };

        assert_eq!(rows.len(), TOP_N_LIMIT);
        assert_eq!(rows[0], GroupedRow { label: "US".to_string(), value: 20 });
        assert_eq!(rows[1], GroupedRow { label: "CH".to_string(), value: 15 });
        assert!(rows.windows(2).all(|w| w[0].value >= w[1].value));
        assert!(rows.iter().all(|r| !r.label.is_empty()));
    }

    #[tokio::test]
    async fn test_grouped_ties_break_by_label() {
        let (executor, events) = setup();
        for country in ["SE", "BR", "JP"] {
            track_in(&events, "p1", country, 2).await;
        }

        let spec = ChartSpec::builder(ChartType::Bar)
            .group_by(GroupByDimension::Country)
            .time_range(TimeRange::AllTime)
            .build();
        let ChartData::Grouped { rows } = executor.run_chart("p1", &spec).await.unwrap().data else {
            panic!("expected grouped rows");
        };

        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["BR", "JP", "SE"]);
    }

    #[tokio::test]
    async fn test_time_range_boundaries() {
        let (executor, events) = setup();
        let now = Utc::now().timestamp_millis();

        track(&events, "p1", "signup", now - HOUR_MS).await;
        track(&events, "p1", "signup", now - 23 * HOUR_MS).await;
        track(&events, "p1", "signup", now - 25 * HOUR_MS).await;
        track(&events, "p1", "signup", now - 8 * DAY_MS).await;
        track(&events, "p1", "signup", now - 400 * DAY_MS).await;

        let count = |range: TimeRange| {
            ChartSpec::builder(ChartType::Number)
                .event_type("signup")
                .time_range(range)
                .build()
        };

        assert_eq!(scalar(&executor, "p1", &count(TimeRange::Last24Hours)).await, 2);
        assert_eq!(scalar(&executor, "p1", &count(TimeRange::Last7Days)).await, 3);
        assert_eq!(scalar(&executor, "p1", &count(TimeRange::Last30Days)).await, 4);
        assert_eq!(scalar(&executor, "p1", &count(TimeRange::Last90Days)).await, 4);
        assert_eq!(scalar(&executor, "p1", &count(TimeRange::AllTime)).await, 5);
    }

    #[tokio::test]
    async fn test_buckets_agree_with_truncate() {
        let (executor, events) = setup();
        let samples = [
            1705329342123, // Mon 2024-01-15 14:35:42.123
            1705878000000, // Sun 2024-01-21 23:00:00
            1704067200000, // Mon 2024-01-01 00:00:00
            1709251199999, // Thu 2024-02-29 23:59:59.999
            1735689599000, // Tue 2024-12-31 23:59:59
        ];

        for (i, ts) in samples.iter().enumerate() {
            track(&events, &format!("p{}", i), "tick", *ts).await;
        }

        for granularity in Granularity::ALL {
            for (i, ts) in samples.iter().enumerate() {
                let spec = ChartSpec::builder(ChartType::Line)
                    .time_range(TimeRange::AllTime)
                    .granularity(granularity)
                    .build();
                let result = executor.run_chart(&format!("p{}", i), &spec).await.unwrap();

                let ChartData::Series { rows, .. } = result.data else {
                    panic!("expected series");
                };
                assert_eq!(rows.len(), 1);
                assert_eq!(
                    rows[0].bucket,
                    granularity.truncate(*ts),
                    "{} bucket for {}",
                    granularity,
                    ts
                );
            }
        }
    }

    #[tokio::test]
    async fn test_hostile_event_types_are_bound() {
        let (executor, events) = setup();
        let hostile = "' OR 1=1 --";

        track(&events, "p1", hostile, MONDAY).await;
        track(&events, "p1", "signup", MONDAY).await;
        track(&events, "p2", "signup", MONDAY).await;

        assert_eq!(scalar(&executor, "p1", &all_time(ChartType::Number, &[hostile])).await, 1);
        assert_eq!(
            scalar(&executor, "p1", &all_time(ChartType::Number, &["x' OR '1'='1"])).await,
            0
        );

        let result = executor
            .run_chart("p1", &all_time(ChartType::Line, &[hostile, "signup"]))
            .await
            .unwrap();
        match result.data {
            ChartData::Series { columns, rows } => {
                assert_eq!(columns, vec![hostile.to_string(), "signup".to_string()]);
                assert_eq!(rows[0].values, vec![1, 1]);
            }
            other => panic!("expected series, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_results_are_not_errors() {
        let (executor, _events) = setup();

        assert_eq!(scalar(&executor, "p1", &all_time(ChartType::Number, &["x"])).await, 0);

        let series = executor
            .run_chart("p1", &all_time(ChartType::Line, &["x"]))
            .await
            .unwrap();
        assert_eq!(
            series.data,
            ChartData::Series {
                columns: vec!["x".to_string()],
                rows: Vec::new(),
            }
        );

        let grouped = ChartSpec::builder(ChartType::Bar)
            .group_by(GroupByDimension::Browser)
            .build();
        let result = executor.run_chart("p1", &grouped).await.unwrap();
        assert_eq!(result.data, ChartData::Grouped { rows: Vec::new() });
        assert_eq!(result.data.row_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_project_is_spec_error() {
        let (executor, _events) = setup();
        let err = executor
            .run_chart("", &all_time(ChartType::Number, &[]))
            .await
            .unwrap_err();
        assert!(err.is_invalid_spec());
    }

    #[test]
    fn test_chart_data_json() {
        let data = ChartData::Series {
            columns: vec!["signup".to_string()],
            rows: vec![SeriesRow { bucket: MONDAY, values: vec![4] }],
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["columns"][0], "signup");
        assert_eq!(json["rows"][0]["bucket"], MONDAY);

        let back: ChartData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);

        let scalar: ChartData = serde_json::from_str(r#"{"value": 7}"#).unwrap();
        assert_eq!(scalar, ChartData::Scalar { value: 7 });
    }
}
