use streamclips_storage::sea_orm::DbErr;
use streamclips_storage::StorageError;
use streamclips_supervisor::SupervisorError;
use thiserror::Error;

/// Errors of the coordination and service layer
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The request conflicts with current state (e.g. a streamer already has a process)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        Self::Storage(StorageError::Database(err))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
