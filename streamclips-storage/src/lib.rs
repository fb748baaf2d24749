//! Shared storage layer for the streamclips fleet
//!
//! All cross-instance coordination happens through the tables defined here:
//! instances, streamers (work items), stream clip processes (claims),
//! the singleton process configuration and the append-only log.

pub mod connection;
pub mod entities;
pub mod error;
pub mod migrations;
pub mod repositories;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use connection::DatabaseConnection;
pub use error::{StorageError, StorageResult};
pub use migrations::Migrator;
pub use repositories::{
    InstanceLoad, InstanceRepository, LogQuery, LogRepository, NewStreamer, ProcessConfigRepository,
    ProcessConfigUpdate, ProcessRepository, StreamerRepository, StreamerUpdate,
};

// Re-exported so dependants share one sea-orm version
pub use sea_orm;
