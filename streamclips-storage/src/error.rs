use sea_orm::DbErr;
use thiserror::Error;

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Connection, lock contention or query failure; the caller rolls back and retries later
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The singleton process configuration row is absent after bootstrap
    #[error("Process configuration row is missing; run migrations to seed it")]
    MissingProcessConfig,
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
