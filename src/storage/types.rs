//! Core data types for the event and chart stores
//!
//! - `NewEvent` / `EventRecord`: one tracked event, before and after insert
//! - `EventDimensions`: the eight nullable breakdown columns
//! - `NewChart` / `ChartPatch` / `ChartDefinition`: persisted chart specs

use crate::query::{ChartSpec, GroupByDimension, RawSpecPatch};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Default layout hint for new charts
pub const DEFAULT_CHART_WIDTH: &str = "full";

/// Breakdown columns recorded with every event
///
/// Field names match the `groupBy` values exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
}

impl EventDimensions {
    /// Value recorded for a dimension
    pub fn get(&self, dimension: GroupByDimension) -> Option<&str> {
        self.slot(dimension).as_deref()
    }

    /// Set a dimension value
    pub fn set(&mut self, dimension: GroupByDimension, value: impl Into<String>) {
        *self.slot_mut(dimension) = Some(value.into());
    }

    fn slot(&self, dimension: GroupByDimension) -> &Option<String> {
        match dimension {
            GroupByDimension::Country => &self.country,
            GroupByDimension::Browser => &self.browser,
            GroupByDimension::Device => &self.device,
            GroupByDimension::Os => &self.os,
            GroupByDimension::ReferrerDomain => &self.referrer_domain,
            GroupByDimension::Source => &self.source,
            GroupByDimension::Medium => &self.medium,
            GroupByDimension::Campaign => &self.campaign,
        }
    }

    fn slot_mut(&mut self, dimension: GroupByDimension) -> &mut Option<String> {
        match dimension {
            GroupByDimension::Country => &mut self.country,
            GroupByDimension::Browser => &mut self.browser,
            GroupByDimension::Device => &mut self.device,
            GroupByDimension::Os => &mut self.os,
            GroupByDimension::ReferrerDomain => &mut self.referrer_domain,
            GroupByDimension::Source => &mut self.source,
            GroupByDimension::Medium => &mut self.medium,
            GroupByDimension::Campaign => &mut self.campaign,
        }
    }
}

/// An event to be tracked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Event type name, e.g. `signup`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix timestamp in milliseconds; defaults to now
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub dimensions: EventDimensions,
    /// Free-form payload, stored as JSON text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl NewEvent {
    /// Create an event stamped with the current time
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: None,
            dimensions: EventDimensions::default(),
            metadata: None,
        }
    }

    /// Builder method: set timestamp
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Builder method: set a dimension
    pub fn dimension(mut self, dimension: GroupByDimension, value: impl Into<String>) -> Self {
        self.dimensions.set(dimension, value);
        self
    }

    /// Builder method: attach metadata
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A stored event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    #[serde(flatten)]
    pub dimensions: EventDimensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
}

impl EventRecord {
    /// Materialize a new event for `project_id`, assigning id and timestamps
    pub fn from_new(project_id: &str, event: NewEvent) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            event_type: event.event_type,
            timestamp: event.timestamp.unwrap_or(now),
            dimensions: event.dimensions,
            metadata: event.metadata,
            created_at: now,
        }
    }
}

/// A persisted chart
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDefinition {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub spec: ChartSpec,
    pub position: i64,
    pub width: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Unix timestamp in milliseconds
    pub updated_at: i64,
}

/// Input for creating a chart
#[derive(Debug, Clone, PartialEq)]
pub struct NewChart {
    pub name: String,
    pub description: Option<String>,
    pub spec: ChartSpec,
    /// Appended after the last chart when `None`
    pub position: Option<i64>,
    /// [`DEFAULT_CHART_WIDTH`] when `None`
    pub width: Option<String>,
}

impl NewChart {
    pub fn new(name: impl Into<String>, spec: ChartSpec) -> Self {
        Self {
            name: name.into(),
            description: None,
            spec,
            position: None,
            width: None,
        }
    }
}

/// Partial chart update; `None` leaves a field unchanged
///
/// Spec fields are overlaid onto the stored spec and validated inside the
/// same transaction that writes the row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub spec: RawSpecPatch,
    pub position: Option<i64>,
    pub width: Option<String>,
}

impl ChartPatch {
    /// Patch that replaces the whole spec
    pub fn with_spec(spec: &ChartSpec) -> Self {
        Self {
            spec: RawSpecPatch::replace_with(spec),
            ..Default::default()
        }
    }

    /// True when the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.spec.is_empty()
            && self.position.is_none()
            && self.width.is_none()
    }
}
