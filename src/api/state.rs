//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::config::ApiConfig;
use crate::query::{QueryExecutor, TimeRangePolicy};
use crate::storage::{ChartStore, Database, EventStore};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Database handle, for health checks
    pub database: Database,
    /// Event ingest
    pub events: EventStore,
    /// Saved chart definitions
    pub charts: ChartStore,
    /// Runs compiled chart queries
    pub executor: QueryExecutor,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// How unknown `timeRange` values in requests are treated
    pub time_range_policy: TimeRangePolicy,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Wire every component to one database handle
    pub fn new(database: Database, config: ApiConfig, time_range_policy: TimeRangePolicy) -> Self {
        Self {
            events: EventStore::new(database.clone()),
            charts: ChartStore::with_policy(database.clone(), time_range_policy),
            executor: QueryExecutor::new(database.clone()),
            database,
            config: Arc::new(config),
            time_range_policy,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
