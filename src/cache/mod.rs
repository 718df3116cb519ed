//! Versioned response cache for offline support.
//!
//! This module provides:
//! - Named partitions of request -> response snapshots, one of them current
//! - A cache-first gateway with network fallback
//! - Root document fallback for navigations while offline
//! - Pruning of partitions left behind by older versions

mod gateway;
mod storage;
mod traits;

pub use gateway::CacheGateway;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CacheSource, Intercepted};
