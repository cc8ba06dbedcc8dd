//! Event Routes
//!
//! Endpoints for tracking events.
//!
//! - POST /api/v1/projects/:project_id/events - Single event
//! - POST /api/v1/projects/:project_id/events/batch - Batch of events

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::{BatchError, BatchTrackRequest, BatchTrackResponse, TrackEventResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::query::GroupByDimension;
use crate::storage::NewEvent;

const MAX_EVENT_TYPE_LEN: usize = 100;
const MAX_DIMENSION_LEN: usize = 255;

/// POST /api/v1/projects/:project_id/events
///
/// Record a single event.
pub async fn track_event(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(event): Json<NewEvent>,
) -> ApiResult<(StatusCode, Json<TrackEventResponse>)> {
    validate_project_id(&project_id)?;
    validate_event(&event)?;

    let record = state.events.insert(&project_id, event).await?;

    Ok((
        StatusCode::CREATED,
        Json(TrackEventResponse {
            status: "ok".to_string(),
            id: record.id,
            timestamp: record.timestamp,
        }),
    ))
}

/// POST /api/v1/projects/:project_id/events/batch
///
/// Record many events. Valid events are stored in one transaction; invalid
/// ones are reported by index.
pub async fn track_batch(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<BatchTrackRequest>,
) -> ApiResult<(StatusCode, Json<BatchTrackResponse>)> {
    validate_project_id(&project_id)?;

    if req.events.is_empty() {
        return Err(ApiError::Validation("Empty batch".to_string()));
    }

    let max = state.config.max_batch_size;
    if req.events.len() > max {
        return Err(ApiError::Validation(format!(
            "Batch size exceeds maximum of {} events",
            max
        )));
    }

    let mut valid = Vec::with_capacity(req.events.len());
    let mut errors = Vec::new();

    for (index, event) in req.events.into_iter().enumerate() {
        match validate_event(&event) {
            Ok(()) => valid.push(event),
            Err(e) => errors.push(BatchError {
                index,
                error: e.to_string(),
            }),
        }
    }

    let accepted = state.events.insert_batch(&project_id, valid).await?;

    let (status, status_str) = if errors.is_empty() {
        (StatusCode::CREATED, "ok")
    } else if accepted > 0 {
        (StatusCode::MULTI_STATUS, "partial")
    } else {
        (StatusCode::BAD_REQUEST, "rejected")
    };

    tracing::info!(
        project_id = %project_id,
        accepted,
        rejected = errors.len(),
        "Batch tracked"
    );

    Ok((
        status,
        Json(BatchTrackResponse {
            status: status_str.to_string(),
            accepted,
            rejected: errors.len(),
            errors,
        }),
    ))
}

pub(crate) fn validate_project_id(project_id: &str) -> ApiResult<()> {
    if project_id.trim().is_empty() {
        return Err(ApiError::Validation("Project id cannot be empty".to_string()));
    }
    Ok(())
}

/// Validate an event before it is stored
fn validate_event(event: &NewEvent) -> ApiResult<()> {
    if event.event_type.is_empty() {
        return Err(ApiError::Validation("Event type cannot be empty".to_string()));
    }

    if event.event_type.len() > MAX_EVENT_TYPE_LEN {
        return Err(ApiError::Validation(format!(
            "Event type exceeds maximum length of {} characters",
            MAX_EVENT_TYPE_LEN
        )));
    }

    // Not too far in the past or future
    if let Some(ts) = event.timestamp {
        let now = Utc::now().timestamp_millis();
        let one_year_ms = 365 * 24 * 60 * 60 * 1000_i64;

        if ts < now - one_year_ms * 10 {
            return Err(ApiError::Validation(
                "Timestamp is more than 10 years in the past".to_string(),
            ));
        }

        if ts > now + one_year_ms {
            return Err(ApiError::Validation(
                "Timestamp is more than 1 year in the future".to_string(),
            ));
        }
    }

    for dimension in GroupByDimension::ALL {
        if let Some(value) = event.dimensions.get(dimension) {
            if value.len() > MAX_DIMENSION_LEN {
                return Err(ApiError::Validation(format!(
                    "{} exceeds maximum length of {} characters",
                    dimension, MAX_DIMENSION_LEN
                )));
            }
        }
    }

    Ok(())
}
