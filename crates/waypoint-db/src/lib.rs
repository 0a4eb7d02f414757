//! Persistence layer for waypoint: models, connection pool, and query
//! functions for the completion-record, plan, and artifact tables.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
