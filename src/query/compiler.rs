//! Chart Query Compiler
//!
//! Turns a [`ChartSpec`] into a parameterized SQL query against the events
//! table. Three shapes exist and the choice depends only on
//! `(chart_type, group_by)`:
//!
//! ```text
//! chart_type == number        → Scalar   SELECT COUNT(*) AS value
//! group_by absent             → Series   one row per bucket, one column per event type
//! group_by present            → Grouped  top 10 (label, value) rows
//! ```
//!
//! Caller-supplied data (project id, event type names) only ever reaches the
//! query as bound parameters. Structural positions (dimension column, bucket
//! expression, lookback) come from fixed tables keyed by validated enums.

use crate::query::error::{QueryError, QueryResult};
use crate::query::spec::{
    validate_event_types, ChartSpec, ChartType, Granularity, GroupByDimension, TimeRange,
};
use serde::{Deserialize, Serialize};

/// Table every chart query reads from
pub const EVENTS_TABLE: &str = "events";

/// Maximum number of rows a grouped query returns
pub const TOP_N_LIMIT: usize = 10;

/// Label of the single series column produced when no event types are given
pub const TOTAL_SERIES_LABEL: &str = "total";

/// How the rows of a compiled query must be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    /// Exactly one row with a single `value` column
    Scalar,
    /// `bucket` plus one count column per series, ascending by bucket
    Series,
    /// `(label, value)` rows, descending by value
    Grouped,
}

impl ResultShape {
    /// Pick the query shape for a chart
    pub fn for_chart(chart_type: ChartType, group_by: Option<GroupByDimension>) -> Self {
        match (chart_type, group_by) {
            (ChartType::Number, _) => Self::Scalar,
            (_, None) => Self::Series,
            (_, Some(_)) => Self::Grouped,
        }
    }
}

/// A value bound to a positional `?N` placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
}

/// A compiled, ready-to-run chart query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    /// SQL text with `?N` placeholders only
    pub sql: String,
    /// Values for `?1..?N`, in order
    pub params: Vec<SqlParam>,
    /// How to decode the rows
    pub shape: ResultShape,
    /// Labels of the series columns `c0..cN` (series shape only)
    pub series: Vec<String>,
}

/// Positional parameter list; `push` hands back the placeholder to splice in
#[derive(Debug, Default)]
struct ParamList {
    values: Vec<SqlParam>,
}

impl ParamList {
    fn push(&mut self, value: SqlParam) -> String {
        self.values.push(value);
        format!("?{}", self.values.len())
    }
}

/// Compile a chart specification for one project
///
/// The returned query is scoped to `project_id` and nothing else. The
/// function is pure: the same inputs always produce the same query.
pub fn compile(project_id: &str, spec: &ChartSpec) -> QueryResult<CompiledQuery> {
    if project_id.trim().is_empty() {
        return Err(QueryError::invalid_field(
            "projectId",
            project_id,
            "a non-empty project id",
        ));
    }
    validate_event_types(&spec.event_types)?;

    let mut params = ParamList::default();

    let mut predicates = vec![format!(
        "project_id = {}",
        params.push(SqlParam::Text(project_id.to_string()))
    )];

    // Each event type is bound once; series columns reuse the same placeholder.
    let type_placeholders: Vec<String> = spec
        .event_types
        .iter()
        .map(|t| params.push(SqlParam::Text(t.clone())))
        .collect();

    predicates.push(type_filter(&type_placeholders));

    let shape = ResultShape::for_chart(spec.chart_type, spec.group_by);

    if let (ResultShape::Grouped, Some(dimension)) = (shape, spec.group_by) {
        predicates.push(format!("{} IS NOT NULL", dimension.column()));
    }

    if let Some(predicate) = time_filter(spec.time_range, &mut params) {
        predicates.push(predicate);
    }

    let where_clause = format!("WHERE {}", predicates.join("\n  AND "));

    let (sql, series) = match (shape, spec.group_by) {
        (ResultShape::Grouped, Some(dimension)) => (grouped_sql(dimension, &where_clause), Vec::new()),
        (ResultShape::Series, _) => series_sql(
            spec.granularity,
            &spec.event_types,
            &type_placeholders,
            &where_clause,
        ),
        _ => (scalar_sql(&where_clause), Vec::new()),
    };

    tracing::debug!(
        project_id = %project_id,
        chart_type = %spec.chart_type,
        shape = ?shape,
        params = params.values.len(),
        "Compiled chart query"
    );

    Ok(CompiledQuery {
        sql,
        params: params.values,
        shape,
        series,
    })
}

/// `COUNT(*)` over every matching event
fn scalar_sql(where_clause: &str) -> String {
    format!(
        "SELECT COUNT(*) AS value\nFROM {EVENTS_TABLE}\n{where_clause}"
    )
}

/// One row per time bucket, one conditional count per event type
fn series_sql(
    granularity: Granularity,
    event_types: &[String],
    type_placeholders: &[String],
    where_clause: &str,
) -> (String, Vec<String>) {
    let (columns, labels): (Vec<String>, Vec<String>) = if type_placeholders.is_empty() {
        (
            vec!["COUNT(*) AS c0".to_string()],
            vec![TOTAL_SERIES_LABEL.to_string()],
        )
    } else {
        type_placeholders
            .iter()
            .zip(event_types)
            .enumerate()
            .map(|(i, (placeholder, label))| {
                (
                    format!("COUNT(*) FILTER (WHERE type = {}) AS c{}", placeholder, i),
                    label.clone(),
                )
            })
            .unzip()
    };

    let sql = format!(
        "SELECT {bucket} AS bucket,\n  {columns}\nFROM {EVENTS_TABLE}\n{where_clause}\nGROUP BY bucket\nORDER BY bucket ASC",
        bucket = bucket_expression(granularity),
        columns = columns.join(",\n  "),
    );

    (sql, labels)
}

/// Top-N breakdown by a dimension column
fn grouped_sql(dimension: GroupByDimension, where_clause: &str) -> String {
    let column = dimension.column();
    format!(
        "SELECT {column} AS label, COUNT(*) AS value\nFROM {EVENTS_TABLE}\n{where_clause}\nGROUP BY {column}\nORDER BY value DESC, label ASC\nLIMIT {TOP_N_LIMIT}"
    )
}

/// Match-all, equality or set membership depending on how many types are given
fn type_filter(placeholders: &[String]) -> String {
    match placeholders {
        [] => "type IS NOT NULL".to_string(),
        [single] => format!("type = {}", single),
        many => format!("type IN ({})", many.join(", ")),
    }
}

/// Lower bound on `timestamp`, relative to the engine's clock at execution
fn time_filter(range: TimeRange, params: &mut ParamList) -> Option<String> {
    let lookback = range.lookback_ms()?;
    Some(format!(
        "timestamp >= CAST(strftime('%s', 'now') AS INTEGER) * 1000 - {}",
        params.push(SqlParam::Integer(lookback))
    ))
}

/// Bucket start (Unix ms, UTC) for a millisecond `timestamp` column.
/// Weeks start on Monday: `weekday 0` moves to the coming Sunday, `-6 days`
/// steps back to its Monday.
pub fn bucket_expression(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Hour => {
            "CAST(strftime('%s', strftime('%Y-%m-%d %H:00:00', timestamp / 1000, 'unixepoch')) AS INTEGER) * 1000"
        }
        Granularity::Day => {
            "CAST(strftime('%s', timestamp / 1000, 'unixepoch', 'start of day') AS INTEGER) * 1000"
        }
        Granularity::Week => {
            "CAST(strftime('%s', timestamp / 1000, 'unixepoch', 'start of day', 'weekday 0', '-6 days') AS INTEGER) * 1000"
        }
        Granularity::Month => {
            "CAST(strftime('%s', timestamp / 1000, 'unixepoch', 'start of month') AS INTEGER) * 1000"
        }
    }
}
