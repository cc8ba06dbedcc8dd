//! Chart Data Routes
//!
//! Rendering endpoints: run a saved or unsaved chart and return its rows.
//!
//! - GET /api/v1/projects/:project_id/charts/:chart_id/data - Render a saved chart
//! - POST /api/v1/projects/:project_id/charts/preview - Render an unsaved spec
//! - POST /api/v1/projects/:project_id/charts/explain - Show the compiled query

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{ChartDataParams, ChartDataResponse, ExplainResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::charts::load_chart;
use crate::api::state::AppState;
use crate::query::{compile, ChartData, RawChartSpec};

/// Output formats for chart data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataFormat {
    Json,
    Csv,
}

impl DataFormat {
    fn parse(format: Option<&str>) -> ApiResult<Self> {
        match format.map(|f| f.to_lowercase()).as_deref() {
            None | Some("json") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            Some(other) => Err(ApiError::Validation(format!(
                "Unsupported format '{}'. Use json or csv",
                other
            ))),
        }
    }
}

/// GET /api/v1/projects/:project_id/charts/:chart_id/data
///
/// Run a saved chart. `?format=csv` returns a CSV attachment instead of JSON.
pub async fn chart_data(
    State(state): State<Arc<AppState>>,
    Path((project_id, chart_id)): Path<(String, String)>,
    Query(params): Query<ChartDataParams>,
) -> ApiResult<Response> {
    let format = DataFormat::parse(params.format.as_deref())?;
    let chart = load_chart(&state, &project_id, &chart_id).await?;

    let result = state.executor.run_chart(&project_id, &chart.spec).await?;

    match format {
        DataFormat::Json => Ok(Json(ChartDataResponse::from(result)).into_response()),
        DataFormat::Csv => {
            let body = render_csv(&result.data)?;
            let disposition = format!("attachment; filename=\"chart_{}.csv\"", chart.id);
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response())
        }
    }
}

/// POST /api/v1/projects/:project_id/charts/preview
///
/// Run a chart spec without saving it.
pub async fn preview_chart(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(raw): Json<RawChartSpec>,
) -> ApiResult<Json<ChartDataResponse>> {
    let spec = raw.validate(state.time_range_policy)?;
    let result = state.executor.run_chart(&project_id, &spec).await?;
    Ok(Json(result.into()))
}

/// POST /api/v1/projects/:project_id/charts/explain
///
/// Compile a chart spec and return the SQL and bound parameters.
pub async fn explain_chart(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(raw): Json<RawChartSpec>,
) -> ApiResult<Json<ExplainResponse>> {
    let spec = raw.validate(state.time_range_policy)?;
    let query = compile(&project_id, &spec)?;
    Ok(Json(ExplainResponse { spec, query }))
}

/// Render chart rows as CSV
///
/// Series: `bucket,<label>...`; grouped: `label,value`; scalar: `value`.
pub fn render_csv(data: &ChartData) -> ApiResult<String> {
    let csv_error =
        |e: &dyn std::fmt::Display| ApiError::Internal(format!("CSV encoding failed: {}", e));

    let mut writer = csv::Writer::from_writer(Vec::new());
    write_rows(&mut writer, data).map_err(|e| csv_error(&e))?;

    let bytes = writer.into_inner().map_err(|e| csv_error(e.error()))?;
    String::from_utf8(bytes).map_err(|e| csv_error(&e))
}

fn write_rows<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    data: &ChartData,
) -> csv::Result<()> {
    match data {
        ChartData::Scalar { value } => {
            writer.write_record(["value"])?;
            writer.write_record([value.to_string()])?;
        }
        ChartData::Series { columns, rows } => {
            let header = std::iter::once("bucket").chain(columns.iter().map(String::as_str));
            writer.write_record(header)?;
            for row in rows {
                writer.write_record(
                    std::iter::once(row.bucket.to_string())
                        .chain(row.values.iter().map(|v| v.to_string())),
                )?;
            }
        }
        ChartData::Grouped { rows } => {
            writer.write_record(["label", "value"])?;
            for row in rows {
                writer.write_record([row.label.clone(), row.value.to_string()])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
