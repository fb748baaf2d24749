//! Temporary databases for tests

use crate::connection::DatabaseConnection;
use crate::error::StorageResult;
use sea_orm::DatabaseConnection as SeaConnection;
use std::time::Duration;
use streamclips_config::DatabaseConfig;
use tempfile::TempDir;

/// A migrated SQLite database in a temporary directory, removed on drop.
pub struct TestDatabase {
    _temp_dir: TempDir,
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    /// Single-connection pool: every statement, including those of
    /// background tasks, is serialised
    pub async fn new() -> StorageResult<Self> {
        Self::with_pool_size(1).await
    }

    /// File-backed pool with `max_connections` connections, so concurrent
    /// writers contend for SQLite's lock the way separate instances do
    pub async fn with_pool_size(max_connections: u32) -> StorageResult<Self> {
        let temp_dir = TempDir::new().map_err(|e| crate::StorageError::Config(e.to_string()))?;
        let db_path = temp_dir.path().join("streamclips-test.db");

        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", db_path.display()),
            max_connections,
            min_connections: 1,
            connection_timeout: Duration::from_secs(30),
            ..Default::default()
        };

        let connection = DatabaseConnection::new(config).await?;
        connection.migrate().await?;

        Ok(Self {
            _temp_dir: temp_dir,
            connection,
        })
    }

    /// The underlying sea-orm pool
    pub fn conn(&self) -> &SeaConnection {
        self.connection.get_connection()
    }
}
