//! Chart Specification
//!
//! Typed description of a dashboard chart: which events to count, how to
//! bucket or group them, and over which window.
//!
//! Every structural field is a closed enum. Raw input (JSON bodies, stored
//! chart rows) goes through [`RawChartSpec::validate`], which resolves each
//! string against a fixed table and rejects anything unknown.
//!
//! # Example
//!
//! ```rust
//! use feedbackjar::query::{ChartSpec, ChartType, Granularity, TimeRange};
//!
//! let spec = ChartSpec::builder(ChartType::Line)
//!     .event_types(&["signup", "login"])
//!     .time_range(TimeRange::Last30Days)
//!     .granularity(Granularity::Day)
//!     .build();
//!
//! assert!(spec.group_by.is_none());
//! ```

use crate::query::error::{QueryError, QueryResult};
use chrono::{Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// A validated chart specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    /// Kind of chart to render
    pub chart_type: ChartType,
    /// Event types to count; empty means every event type
    pub event_types: Vec<String>,
    /// Optional breakdown dimension
    #[serde(default)]
    pub group_by: Option<GroupByDimension>,
    /// Window of events to consider
    pub time_range: TimeRange,
    /// Bucket width for time-series charts
    pub granularity: Granularity,
}

impl ChartSpec {
    /// Start building a spec for the given chart type
    pub fn builder(chart_type: ChartType) -> ChartSpecBuilder {
        ChartSpecBuilder::new(chart_type)
    }

    /// Convert back into the raw string form used for storage and transport
    pub fn to_raw(&self) -> RawChartSpec {
        RawChartSpec {
            chart_type: self.chart_type.as_str().to_string(),
            event_types: self.event_types.clone(),
            group_by: self.group_by.map(|d| d.as_str().to_string()),
            time_range: self.time_range.as_str().to_string(),
            granularity: self.granularity.as_str().to_string(),
        }
    }
}

/// Chart kinds supported by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    /// Single headline number
    Number,
    /// Line chart
    Line,
    /// Bar chart
    Bar,
    /// Pie chart
    Pie,
}

impl ChartType {
    pub const ALL: [ChartType; 4] = [Self::Number, Self::Line, Self::Bar, Self::Pie];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Line => "line",
            Self::Bar => "bar",
            Self::Pie => "pie",
        }
    }
}

impl FromStr for ChartType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| QueryError::invalid_field("chartType", s, "number, line, bar or pie"))
    }
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative time windows, measured back from query execution time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
    #[serde(rename = "all")]
    AllTime,
}

impl TimeRange {
    pub const ALL: [TimeRange; 5] = [
        Self::Last24Hours,
        Self::Last7Days,
        Self::Last30Days,
        Self::Last90Days,
        Self::AllTime,
    ];

    /// Window substituted for unknown values under [`TimeRangePolicy::LegacyFallback`]
    pub const LEGACY_DEFAULT: TimeRange = TimeRange::Last7Days;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last24Hours => "24h",
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
            Self::Last90Days => "90d",
            Self::AllTime => "all",
        }
    }

    /// How far back the window reaches, in milliseconds. `None` for all time.
    pub fn lookback_ms(&self) -> Option<i64> {
        const HOUR_MS: i64 = 3600 * 1000;
        const DAY_MS: i64 = 24 * HOUR_MS;

        match self {
            Self::Last24Hours => Some(24 * HOUR_MS),
            Self::Last7Days => Some(7 * DAY_MS),
            Self::Last30Days => Some(30 * DAY_MS),
            Self::Last90Days => Some(90 * DAY_MS),
            Self::AllTime => None,
        }
    }

    /// Parse according to the configured policy
    pub fn parse_with_policy(s: &str, policy: TimeRangePolicy) -> QueryResult<Self> {
        match (s.parse::<Self>(), policy) {
            (Ok(range), _) => Ok(range),
            (Err(_), TimeRangePolicy::LegacyFallback) => {
                tracing::warn!(
                    time_range = %s,
                    fallback = Self::LEGACY_DEFAULT.as_str(),
                    "Unknown time range, substituting legacy default"
                );
                Ok(Self::LEGACY_DEFAULT)
            }
            (Err(e), TimeRangePolicy::Strict) => Err(e),
        }
    }
}

impl FromStr for TimeRange {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| QueryError::invalid_field("timeRange", s, "24h, 7d, 30d, 90d or all"))
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a `timeRange` outside the enumerated set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRangePolicy {
    /// Reject the specification
    #[default]
    Strict,
    /// Substitute [`TimeRange::LEGACY_DEFAULT`] and log a warning.
    /// Kept for chart rows written before validation existed.
    LegacyFallback,
}

impl FromStr for TimeRangePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "legacy_fallback" | "legacy" => Ok(Self::LegacyFallback),
            _ => Err(format!(
                "Invalid time range policy: {}. Use strict or legacy_fallback",
                s
            )),
        }
    }
}

/// Time bucket widths for series charts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Group by hour
    Hour,
    /// Group by day
    Day,
    /// Group by week (starts on Monday)
    Week,
    /// Group by calendar month
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [Self::Hour, Self::Day, Self::Week, Self::Month];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Truncate a timestamp to the start of this interval
    ///
    /// # Arguments
    /// * `timestamp` - Unix timestamp in milliseconds
    ///
    /// # Returns
    /// The timestamp truncated to the start of the interval, in UTC.
    /// This is the calendar the compiled bucket expressions implement.
    pub fn truncate(&self, timestamp: i64) -> i64 {
        let dt = match Utc.timestamp_millis_opt(timestamp) {
            chrono::LocalResult::Single(dt) => dt,
            _ => return timestamp,
        };

        let truncated = match self {
            Self::Hour => dt
                .with_minute(0)
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(dt),
            Self::Day => dt
                .with_hour(0)
                .and_then(|d| d.with_minute(0))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(dt),
            Self::Week => {
                let days_since_monday = dt.weekday().num_days_from_monday() as i64;
                let monday = dt - chrono::Duration::days(days_since_monday);
                monday
                    .with_hour(0)
                    .and_then(|d| d.with_minute(0))
                    .and_then(|d| d.with_second(0))
                    .and_then(|d| d.with_nanosecond(0))
                    .unwrap_or(monday)
            }
            Self::Month => dt
                .with_day(1)
                .and_then(|d| d.with_hour(0))
                .and_then(|d| d.with_minute(0))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(dt),
        };

        truncated.timestamp_millis()
    }
}

impl FromStr for Granularity {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| QueryError::invalid_field("granularity", s, "hour, day, week or month"))
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event attributes a chart can be broken down by
///
/// Each variant maps to exactly one nullable column of the events table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupByDimension {
    Country,
    Browser,
    Device,
    Os,
    ReferrerDomain,
    Source,
    Medium,
    Campaign,
}

impl GroupByDimension {
    pub const ALL: [GroupByDimension; 8] = [
        Self::Country,
        Self::Browser,
        Self::Device,
        Self::Os,
        Self::ReferrerDomain,
        Self::Source,
        Self::Medium,
        Self::Campaign,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::Browser => "browser",
            Self::Device => "device",
            Self::Os => "os",
            Self::ReferrerDomain => "referrer_domain",
            Self::Source => "source",
            Self::Medium => "medium",
            Self::Campaign => "campaign",
        }
    }

    /// Column in the events table holding this dimension
    pub fn column(&self) -> &'static str {
        // Column names match the public names one to one.
        self.as_str()
    }
}

impl FromStr for GroupByDimension {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|d| d.as_str() == s).ok_or_else(|| {
            QueryError::invalid_field(
                "groupBy",
                s,
                "country, browser, device, os, referrer_domain, source, medium or campaign",
            )
        })
    }
}

impl std::fmt::Display for GroupByDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated chart specification as it arrives over the wire or from storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChartSpec {
    pub chart_type: String,
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub group_by: Option<String>,
    pub time_range: String,
    pub granularity: String,
}

impl RawChartSpec {
    /// Resolve every field against its enum table
    ///
    /// A missing, `null` or empty `groupBy` means "no grouping". Every other
    /// field must match exactly; the only substitution ever made is the
    /// legacy time-range fallback when `policy` asks for it.
    pub fn validate(&self, policy: TimeRangePolicy) -> QueryResult<ChartSpec> {
        let chart_type = self.chart_type.parse::<ChartType>()?;

        let group_by = match self.group_by.as_deref() {
            None | Some("") => None,
            Some(dim) => Some(dim.parse::<GroupByDimension>()?),
        };

        let time_range = TimeRange::parse_with_policy(&self.time_range, policy)?;
        let granularity = self.granularity.parse::<Granularity>()?;

        validate_event_types(&self.event_types)?;

        Ok(ChartSpec {
            chart_type,
            event_types: self.event_types.clone(),
            group_by,
            time_range,
            granularity,
        })
    }
}

/// Field-wise overlay onto a stored [`RawChartSpec`]; `None` keeps the stored value
///
/// `group_by: Some(None)` clears the grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSpecPatch {
    pub chart_type: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub group_by: Option<Option<String>>,
    pub time_range: Option<String>,
    pub granularity: Option<String>,
}

impl RawSpecPatch {
    /// Overlay that replaces every field with those of `spec`
    pub fn replace_with(spec: &ChartSpec) -> Self {
        let raw = spec.to_raw();
        Self {
            chart_type: Some(raw.chart_type),
            event_types: Some(raw.event_types),
            group_by: Some(raw.group_by),
            time_range: Some(raw.time_range),
            granularity: Some(raw.granularity),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chart_type.is_none()
            && self.event_types.is_none()
            && self.group_by.is_none()
            && self.time_range.is_none()
            && self.granularity.is_none()
    }

    /// True when every field is set, so the stored spec is irrelevant
    pub fn is_complete(&self) -> bool {
        self.chart_type.is_some()
            && self.event_types.is_some()
            && self.group_by.is_some()
            && self.time_range.is_some()
            && self.granularity.is_some()
    }

    pub fn apply(&self, mut base: RawChartSpec) -> RawChartSpec {
        if let Some(chart_type) = &self.chart_type {
            base.chart_type = chart_type.clone();
        }
        if let Some(event_types) = &self.event_types {
            base.event_types = event_types.clone();
        }
        if let Some(group_by) = &self.group_by {
            base.group_by = group_by.clone();
        }
        if let Some(time_range) = &self.time_range {
            base.time_range = time_range.clone();
        }
        if let Some(granularity) = &self.granularity {
            base.granularity = granularity.clone();
        }
        base
    }
}

/// Event types must be non-empty and unique
pub(crate) fn validate_event_types(event_types: &[String]) -> QueryResult<()> {
    let mut seen = HashSet::with_capacity(event_types.len());

    for event_type in event_types {
        if event_type.is_empty() {
            return Err(QueryError::EmptyEventType);
        }
        if !seen.insert(event_type.as_str()) {
            return Err(QueryError::DuplicateEventType(event_type.clone()));
        }
    }

    Ok(())
}

/// Builder for constructing specs programmatically
#[derive(Debug, Clone)]
pub struct ChartSpecBuilder {
    chart_type: ChartType,
    event_types: Vec<String>,
    group_by: Option<GroupByDimension>,
    time_range: Option<TimeRange>,
    granularity: Option<Granularity>,
}

impl ChartSpecBuilder {
    pub fn new(chart_type: ChartType) -> Self {
        Self {
            chart_type,
            event_types: Vec::new(),
            group_by: None,
            time_range: None,
            granularity: None,
        }
    }

    /// Set the event types to count
    pub fn event_types(mut self, types: &[&str]) -> Self {
        self.event_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Add a single event type
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.push(event_type.into());
        self
    }

    pub fn group_by(mut self, dimension: GroupByDimension) -> Self {
        self.group_by = Some(dimension);
        self
    }

    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Build the spec (defaults: last 7 days, daily buckets)
    pub fn build(self) -> ChartSpec {
        ChartSpec {
            chart_type: self.chart_type,
            event_types: self.event_types,
            group_by: self.group_by,
            time_range: self.time_range.unwrap_or(TimeRange::Last7Days),
            granularity: self.granularity.unwrap_or(Granularity::Day),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(chart_type: &str, group_by: Option<&str>, time_range: &str, granularity: &str) -> RawChartSpec {
        RawChartSpec {
            chart_type: chart_type.to_string(),
            event_types: vec!["signup".to_string()],
            group_by: group_by.map(String::from),
            time_range: time_range.to_string(),
            granularity: granularity.to_string(),
        }
    }

    #[test]
    fn test_builder_defaults() {
        let spec = ChartSpec::builder(ChartType::Bar).event_type("signup").build();

        assert_eq!(spec.event_types, vec!["signup"]);
        assert_eq!(spec.time_range, TimeRange::Last7Days);
        assert_eq!(spec.granularity, Granularity::Day);
        assert!(spec.group_by.is_none());
    }

    #[test]
    fn test_validate_accepts_known_values() {
        let spec = raw("pie", Some("referrer_domain"), "90d", "week")
            .validate(TimeRangePolicy::Strict)
            .unwrap();

        assert_eq!(spec.chart_type, ChartType::Pie);
        assert_eq!(spec.group_by, Some(GroupByDimension::ReferrerDomain));
        assert_eq!(spec.time_range, TimeRange::Last90Days);
        assert_eq!(spec.granularity, Granularity::Week);
    }

    #[test]
    fn test_validate_empty_group_by_is_absent() {
        let spec = raw("line", Some(""), "7d", "day")
            .validate(TimeRangePolicy::Strict)
            .unwrap();
        assert!(spec.group_by.is_none());
    }

    #[test]
    fn test_validate_rejects_unknown_fields() {
        let cases = [
            (raw("scatter", None, "7d", "day"), "chartType"),
            (raw("bar", Some("country; DROP TABLE events"), "7d", "day"), "groupBy"),
            (raw("line", None, "7d", "fortnight"), "granularity"),
            (raw("line", None, "1y", "day"), "timeRange"),
        ];

        for (spec, expected_field) in cases {
            match spec.validate(TimeRangePolicy::Strict) {
                Err(QueryError::InvalidField { field, .. }) => assert_eq!(field, expected_field),
                other => panic!("expected invalid {}, got {:?}", expected_field, other),
            }
        }
    }

    #[test]
    fn test_validate_is_case_sensitive() {
        let err = raw("LINE", None, "7d", "day").validate(TimeRangePolicy::Strict);
        assert!(matches!(err, Err(QueryError::InvalidField { field: "chartType", .. })));
    }

    #[test]
    fn test_legacy_time_range_fallback() {
        let spec = raw("number", None, "1y", "day")
            .validate(TimeRangePolicy::LegacyFallback)
            .unwrap();
        assert_eq!(spec.time_range, TimeRange::Last7Days);

        // Fallback never touches other fields
        let err = raw("number", None, "1y", "minute").validate(TimeRangePolicy::LegacyFallback);
        assert!(matches!(err, Err(QueryError::InvalidField { field: "granularity", .. })));
    }

    #[test]
    fn test_validate_event_types() {
        let mut spec = raw("line", None, "7d", "day");
        spec.event_types = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert!(matches!(
            spec.validate(TimeRangePolicy::Strict),
            Err(QueryError::DuplicateEventType(t)) if t == "a"
        ));

        spec.event_types = vec![String::new()];
        assert!(matches!(
            spec.validate(TimeRangePolicy::Strict),
            Err(QueryError::EmptyEventType)
        ));

        spec.event_types = Vec::new();
        assert!(spec.validate(TimeRangePolicy::Strict).is_ok());
    }

    #[test]
    fn test_raw_round_trip() {
        let spec = ChartSpec::builder(ChartType::Bar)
            .event_types(&["click", "view"])
            .group_by(GroupByDimension::Os)
            .time_range(TimeRange::AllTime)
            .granularity(Granularity::Month)
            .build();

        let back = spec.to_raw().validate(TimeRangePolicy::Strict).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_spec_patch_overlay() {
        let base = raw("bar", Some("country"), "7d", "day");

        let patch = RawSpecPatch {
            chart_type: Some("line".to_string()),
            group_by: Some(None),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        assert!(!patch.is_complete());

        let merged = patch.apply(base.clone());
        assert_eq!(merged.chart_type, "line");
        assert_eq!(merged.group_by, None);
        assert_eq!(merged.event_types, vec!["signup".to_string()]);
        assert_eq!(merged.time_range, "7d");

        assert!(RawSpecPatch::default().is_empty());
        assert_eq!(RawSpecPatch::default().apply(base.clone()), base);
    }

    #[test]
    fn test_spec_patch_replace_is_complete() {
        let spec = ChartSpec::builder(ChartType::Pie)
            .event_type("signup")
            .group_by(GroupByDimension::Os)
            .time_range(TimeRange::AllTime)
            .build();
        let patch = RawSpecPatch::replace_with(&spec);

        assert!(patch.is_complete());
        let stale = raw("number", None, "14d", "fortnight");
        assert_eq!(
            patch.apply(stale).validate(TimeRangePolicy::Strict).unwrap(),
            spec
        );
    }

    #[test]
    fn test_spec_json_shape() {
        let json = r#"{
            "chartType": "bar",
            "eventTypes": ["signup"],
            "groupBy": "country",
            "timeRange": "24h",
            "granularity": "hour"
        }"#;

        let spec: ChartSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.group_by, Some(GroupByDimension::Country));
        assert_eq!(spec.time_range, TimeRange::Last24Hours);
    }

    #[test]
    fn test_lookback() {
        assert_eq!(TimeRange::Last24Hours.lookback_ms(), Some(86_400_000));
        assert_eq!(TimeRange::Last90Days.lookback_ms(), Some(90 * 86_400_000));
        assert_eq!(TimeRange::AllTime.lookback_ms(), None);
    }

    #[test]
    fn test_truncate_hour() {
        // 2024-01-15 14:35:42.123 UTC
        let timestamp = 1705329342123_i64;

        // 2024-01-15 14:00:00.000 UTC
        assert_eq!(Granularity::Hour.truncate(timestamp), 1705327200000);
    }

    #[test]
    fn test_truncate_day() {
        let timestamp = 1705329342123_i64;

        // 2024-01-15 00:00:00.000 UTC
        assert_eq!(Granularity::Day.truncate(timestamp), 1705276800000);
    }

    #[test]
    fn test_truncate_week_starts_monday() {
        // 2024-01-15 is a Monday
        let monday = 1705276800000_i64;

        // Wednesday 2024-01-17 14:35:42.123 UTC
        assert_eq!(Granularity::Week.truncate(1705502142123), monday);

        // Sunday 2024-01-21 23:00:00 UTC still belongs to the same week
        assert_eq!(Granularity::Week.truncate(1705878000000), monday);
    }

    #[test]
    fn test_truncate_month() {
        let timestamp = 1705329342123_i64;

        // 2024-01-01 00:00:00.000 UTC
        assert_eq!(Granularity::Month.truncate(timestamp), 1704067200000);
    }

    #[test]
    fn test_dimension_columns_are_identifiers() {
        for dim in GroupByDimension::ALL {
            assert!(dim
                .column()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn test_time_range_policy_from_str() {
        assert_eq!("strict".parse::<TimeRangePolicy>(), Ok(TimeRangePolicy::Strict));
        assert_eq!(
            "LEGACY_FALLBACK".parse::<TimeRangePolicy>(),
            Ok(TimeRangePolicy::LegacyFallback)
        );
        assert!("lenient".parse::<TimeRangePolicy>().is_err());
    }
}
