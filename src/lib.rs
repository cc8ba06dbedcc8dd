//! # FeedbackJar
//!
//! Product analytics core for FeedbackJar - stores tracked events per project
//! and turns saved chart definitions into parameterized SQL over them.
//!
//! ## Features
//!
//! - **Chart compiler**: Validated chart specs compile to SQL with every value bound
//! - **Event store**: SQLite with versioned migrations
//! - **Dashboards**: Saved charts with ordering and layout width
//! - **REST API**: Track events, manage charts, render data as JSON or CSV
//!
//! ## Modules
//!
//! - [`query`]: Chart specs, the SQL compiler and the executor
//! - [`storage`]: SQLite-backed event and chart stores
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feedbackjar::query::{ChartSpec, ChartType, GroupByDimension, QueryExecutor, TimeRange};
//! use feedbackjar::storage::{Database, EventStore, NewEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::in_memory()?;
//!
//!     // Track events
//!     let events = EventStore::new(db.clone());
//!     events
//!         .insert("proj_1", NewEvent::new("signup").dimension(GroupByDimension::Country, "US"))
//!         .await?;
//!
//!     // Signups by country over the last week
//!     let spec = ChartSpec::builder(ChartType::Pie)
//!         .event_type("signup")
//!         .group_by(GroupByDimension::Country)
//!         .time_range(TimeRange::Last7Days)
//!         .build();
//!
//!     let result = QueryExecutor::new(db).run_chart("proj_1", &spec).await?;
//!     println!("{} rows", result.data.row_count());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    ChartDefinition, ChartStore, Database, EventRecord, EventStore, NewChart, NewEvent,
    StorageError, StorageResult,
};

pub use query::{
    compile, ChartData, ChartResult, ChartSpec, ChartType, CompiledQuery, Granularity,
    GroupByDimension, QueryError, QueryExecutor, RawChartSpec, ResultShape, TimeRange,
    TimeRangePolicy,
};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{ApiConfig, Config, ConfigError, LoggingConfig, QueryConfig, StorageConfig};
