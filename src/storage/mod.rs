//! FeedbackJar Storage
//!
//! SQLite-backed persistence for tracked events and saved charts:
//!
//! - **database**: Shared connection handle, opened and migrated at startup
//! - **migrations**: Ordered, idempotent schema migrations
//! - **events**: Append-only event ingest
//! - **charts**: Chart definition CRUD, scoped by project
//! - **types**: Event and chart records
//! - **error**: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use feedbackjar::config::StorageConfig;
//! use feedbackjar::storage::{Database, EventStore, NewEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::open(&StorageConfig::default())?;
//!     let events = EventStore::new(db.clone());
//!
//!     events.insert("proj_123", NewEvent::new("signup")).await?;
//!     println!("{} events", events.count("proj_123").await?);
//!
//!     Ok(())
//! }
//! ```

pub mod charts;
pub mod database;
pub mod error;
pub mod events;
pub mod migrations;
pub mod types;

// Re-export commonly used types
pub use charts::ChartStore;
pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use events::EventStore;
pub use types::{
    ChartDefinition, ChartPatch, EventDimensions, EventRecord, NewChart, NewEvent,
    DEFAULT_CHART_WIDTH,
};
