//! Data models for sqlmon.
//!
//! Transient observations produced by the collectors, the classification
//! enums, and the DTOs returned by the remediation operations. Persistent
//! records live next to their queries in [`crate::db`].

mod index;
mod query;

pub use index::*;
pub use query::*;
