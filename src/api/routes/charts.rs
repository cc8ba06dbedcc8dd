//! Chart Routes
//!
//! CRUD endpoints for saved chart definitions.
//!
//! - GET /api/v1/projects/:project_id/charts - List charts
//! - POST /api/v1/projects/:project_id/charts - Create a chart
//! - GET /api/v1/projects/:project_id/charts/:chart_id - Get a chart
//! - PUT /api/v1/projects/:project_id/charts/:chart_id - Update a chart
//! - DELETE /api/v1/projects/:project_id/charts/:chart_id - Delete a chart

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{ChartListResponse, CreateChartRequest, UpdateChartRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::events::validate_project_id;
use crate::api::state::AppState;
use crate::storage::{ChartDefinition, NewChart};

const MAX_NAME_LEN: usize = 200;

/// GET /api/v1/projects/:project_id/charts
///
/// List charts in dashboard order.
pub async fn list_charts(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<ChartListResponse>> {
    let charts = state.charts.list(&project_id).await?;

    Ok(Json(ChartListResponse {
        total: charts.len(),
        charts,
    }))
}

/// GET /api/v1/projects/:project_id/charts/:chart_id
pub async fn get_chart(
    State(state): State<Arc<AppState>>,
    Path((project_id, chart_id)): Path<(String, String)>,
) -> ApiResult<Json<ChartDefinition>> {
    Ok(Json(load_chart(&state, &project_id, &chart_id).await?))
}

/// POST /api/v1/projects/:project_id/charts
///
/// Create a chart. The spec is validated before anything is stored.
pub async fn create_chart(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<CreateChartRequest>,
) -> ApiResult<(StatusCode, Json<ChartDefinition>)> {
    validate_project_id(&project_id)?;
    validate_name(&req.name)?;

    let spec = req.spec.validate(state.time_range_policy)?;

    let chart = state
        .charts
        .create(
            &project_id,
            NewChart {
                name: req.name,
                description: req.description,
                spec,
                position: req.position,
                width: req.width,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(chart)))
}

/// PUT /api/v1/projects/:project_id/charts/:chart_id
///
/// Partial update. Spec fields are merged over the stored spec and the
/// result is validated as a whole, all inside one store transaction.
pub async fn update_chart(
    State(state): State<Arc<AppState>>,
    Path((project_id, chart_id)): Path<(String, String)>,
    Json(req): Json<UpdateChartRequest>,
) -> ApiResult<Json<ChartDefinition>> {
    if let Some(name) = &req.name {
        validate_name(name)?;
    }

    state
        .charts
        .update(&project_id, &chart_id, req.into_patch())
        .await?
        .map(Json)
        .ok_or_else(|| chart_not_found(&chart_id))
}

/// DELETE /api/v1/projects/:project_id/charts/:chart_id
pub async fn delete_chart(
    State(state): State<Arc<AppState>>,
    Path((project_id, chart_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    if state.charts.delete(&project_id, &chart_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(chart_not_found(&chart_id))
    }
}

/// Fetch a chart of this project or fail with 404
pub(crate) async fn load_chart(
    state: &AppState,
    project_id: &str,
    chart_id: &str,
) -> ApiResult<ChartDefinition> {
    state
        .charts
        .get(project_id, chart_id)
        .await?
        .ok_or_else(|| chart_not_found(chart_id))
}

fn chart_not_found(chart_id: &str) -> ApiError {
    ApiError::NotFound(format!("Chart {} not found", chart_id))
}

fn validate_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::Validation("Chart name cannot be empty".to_string()));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "Chart name exceeds maximum length of {} characters",
            MAX_NAME_LEN
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Signups by country").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"n".repeat(201)).is_err());
    }
}
