//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Deserializer, Serialize};

use crate::query::{
    ChartData, ChartResult, ChartSpec, CompiledQuery, RawChartSpec, RawSpecPatch, ResultShape,
};
use crate::storage::{ChartDefinition, ChartPatch, NewEvent};

// ============================================
// EVENT DTOs
// ============================================

/// Single event track response
#[derive(Debug, Serialize, Deserialize)]
pub struct TrackEventResponse {
    /// Status: "ok"
    pub status: String,
    /// ID assigned to the event
    pub id: String,
    /// Timestamp recorded for the event
    pub timestamp: i64,
}

/// Batch track request
#[derive(Debug, Deserialize)]
pub struct BatchTrackRequest {
    /// Events to record
    pub events: Vec<NewEvent>,
}

/// Batch track response
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchTrackResponse {
    /// Status: "ok", "partial" or "rejected"
    pub status: String,
    /// Number of events accepted
    pub accepted: usize,
    /// Number of events rejected
    pub rejected: usize,
    /// Errors for rejected events
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchError>,
}

/// Error for a single event in a batch
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchError {
    /// Index of the failed event
    pub index: usize,
    /// Error message
    pub error: String,
}

// ============================================
// CHART DTOs
// ============================================

/// Create chart request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChartRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub spec: RawChartSpec,
    /// Appended after the last chart when omitted
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub width: Option<String>,
}

/// Update chart request; omitted fields are left unchanged
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChartRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// `null` clears the description; omitted keeps it
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub chart_type: Option<String>,
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    /// `null` or `""` clears the grouping; omitted keeps it
    #[serde(default, deserialize_with = "present")]
    pub group_by: Option<Option<String>>,
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default)]
    pub granularity: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub width: Option<String>,
}

impl UpdateChartRequest {
    /// Split into the stored fields and the spec overlay
    pub fn into_patch(self) -> ChartPatch {
        ChartPatch {
            name: self.name,
            description: self.description,
            spec: RawSpecPatch {
                chart_type: self.chart_type,
                event_types: self.event_types,
                group_by: self.group_by,
                time_range: self.time_range,
                granularity: self.granularity,
            },
            position: self.position,
            width: self.width,
        }
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from a missing field (`None`)
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Chart list response
#[derive(Debug, Serialize)]
pub struct ChartListResponse {
    /// Charts in dashboard order
    pub charts: Vec<ChartDefinition>,
    /// Total count
    pub total: usize,
}

// ============================================
// CHART DATA DTOs
// ============================================

/// Query parameters for chart rendering
#[derive(Debug, Default, Deserialize)]
pub struct ChartDataParams {
    /// Output format: json (default) or csv
    #[serde(default)]
    pub format: Option<String>,
}

/// Rendered chart
#[derive(Debug, Serialize, Deserialize)]
pub struct ChartDataResponse {
    pub shape: ResultShape,
    pub data: ChartData,
    pub meta: ChartDataMeta,
}

/// Rendering metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct ChartDataMeta {
    /// Query execution time
    pub execution_time_ms: u64,
    /// Number of rows returned
    pub row_count: usize,
}

impl From<ChartResult> for ChartDataResponse {
    fn from(result: ChartResult) -> Self {
        Self {
            shape: result.shape,
            meta: ChartDataMeta {
                execution_time_ms: result.execution_time_ms,
                row_count: result.data.row_count(),
            },
            data: result.data,
        }
    }
}

/// Compiled form of a chart, for debugging dashboards
#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    /// The spec after validation (including any legacy substitution)
    pub spec: ChartSpec,
    #[serde(flatten)]
    pub query: CompiledQuery,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    /// Database status: "ok" or "error"
    pub database: String,
    /// Applied schema version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i64>,
    /// Total events stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<i64>,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Crate version
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_flattens_spec() {
        let req: CreateChartRequest = serde_json::from_value(json!({
            "name": "Signups",
            "chartType": "line",
            "eventTypes": ["signup"],
            "timeRange": "30d",
            "granularity": "day"
        }))
        .unwrap();

        assert_eq!(req.name, "Signups");
        assert_eq!(req.spec.chart_type, "line");
        assert_eq!(req.spec.group_by, None);
        assert_eq!(req.position, None);
    }

    #[test]
    fn test_update_group_by_presence() {
        let omitted: UpdateChartRequest = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(omitted.group_by, None);
        assert!(omitted.into_patch().spec.is_empty());

        let cleared: UpdateChartRequest =
            serde_json::from_value(json!({"groupBy": null})).unwrap();
        assert_eq!(cleared.group_by, Some(None));
        assert!(!cleared.into_patch().spec.is_empty());

        let set: UpdateChartRequest =
            serde_json::from_value(json!({"groupBy": "browser"})).unwrap();
        assert_eq!(set.group_by, Some(Some("browser".to_string())));
    }

    #[test]
    fn test_update_description_presence() {
        let omitted: UpdateChartRequest = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(omitted.description, None);

        let cleared: UpdateChartRequest =
            serde_json::from_value(json!({"description": null})).unwrap();
        assert_eq!(cleared.into_patch().description, Some(None));

        let set: UpdateChartRequest =
            serde_json::from_value(json!({"description": "weekly"})).unwrap();
        assert_eq!(set.description, Some(Some("weekly".to_string())));
    }

    #[test]
    fn test_into_patch_splits_fields() {
        let req: UpdateChartRequest = serde_json::from_value(json!({
            "name": "Signups",
            "chartType": "line",
            "timeRange": "90d",
            "width": "half"
        }))
        .unwrap();
        let patch = req.into_patch();

        assert_eq!(patch.name.as_deref(), Some("Signups"));
        assert_eq!(patch.width.as_deref(), Some("half"));
        assert_eq!(patch.spec.chart_type.as_deref(), Some("line"));
        assert_eq!(patch.spec.time_range.as_deref(), Some("90d"));
        assert_eq!(patch.spec.event_types, None);
        assert!(!patch.spec.is_complete());
    }
}
