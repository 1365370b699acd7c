//! sqlmon - SQL Server health monitor
//!
//! Periodically inspects a SQL Server for slow queries and fragmented
//! indexes, keeps their history, reindexes automatically and asks an AI
//! provider for query optimizations.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;
