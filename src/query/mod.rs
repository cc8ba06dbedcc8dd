//! FeedbackJar Chart Queries
//!
//! Turns declarative chart specifications into parameterized SQL and runs it:
//!
//! - **spec**: Typed chart specification and validation of raw input
//! - **compiler**: Chart query compiler (scalar, series and grouped shapes)
//! - **executor**: Execute compiled queries against the event store
//!
//! # Query Shapes
//!
//! ```text
//! chartType = number          → scalar   SELECT COUNT(*) AS value
//! groupBy absent              → series   one row per bucket, one column per event type
//! groupBy present             → grouped  top 10 (label, value) rows
//! ```
//!
//! Only the project id and event-type names are ever bound as parameters.
//! Dimensions, granularities and time ranges are closed enums that map to
//! fixed SQL fragments.
//!
//! # Examples
//!
//! ## Compiling
//!
//! ```rust
//! use feedbackjar::query::{compile, ChartSpec, ChartType, GroupByDimension, ResultShape};
//!
//! let spec = ChartSpec::builder(ChartType::Pie)
//!     .event_type("signup")
//!     .group_by(GroupByDimension::Country)
//!     .build();
//!
//! let query = compile("proj_123", &spec).unwrap();
//! assert_eq!(query.shape, ResultShape::Grouped);
//! assert!(query.sql.contains("LIMIT 10"));
//! ```
//!
//! ## Running
//!
//! ```rust,ignore
//! let result = executor.run_chart("proj_123", &spec).await?;
//! ```

mod compiler;
mod error;
mod executor;
mod spec;

pub use compiler::{
    bucket_expression, compile, CompiledQuery, ResultShape, SqlParam, EVENTS_TABLE, TOP_N_LIMIT,
    TOTAL_SERIES_LABEL,
};
pub use error::{QueryError, QueryResult};
pub use executor::{ChartData, ChartResult, GroupedRow, QueryExecutor, SeriesRow};
pub use spec::{
    ChartSpec, ChartSpecBuilder, ChartType, Granularity, GroupByDimension, RawChartSpec,
    RawSpecPatch, TimeRange, TimeRangePolicy,
};
