//! API Routes
//!
//! Route handlers organized by functionality.

pub mod chart_data;
pub mod charts;
pub mod events;
pub mod health;
