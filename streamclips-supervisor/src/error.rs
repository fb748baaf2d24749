use nix::errno::Errno;
use streamclips_storage::StorageError;
use thiserror::Error;

/// Process supervision errors
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The clip program could not be started
    #[error("Failed to spawn clip process for '{streamer}': {source}")]
    Spawn {
        streamer: String,
        #[source]
        source: std::io::Error,
    },

    /// Signal delivery failed for a reason other than the process being gone
    #[error("Failed to terminate process {pid}: {source}")]
    Termination {
        pid: i32,
        #[source]
        source: Errno,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<streamclips_storage::sea_orm::DbErr> for SupervisorError {
    fn from(err: streamclips_storage::sea_orm::DbErr) -> Self {
        Self::Storage(StorageError::Database(err))
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
