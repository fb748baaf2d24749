//! Repositories over the shared store
//!
//! Every repository borrows any [`sea_orm::ConnectionTrait`], so the same
//! query runs on the pool or inside a caller's transaction.

pub mod instance_repository;
pub mod log_repository;
pub mod process_config_repository;
pub mod process_repository;
pub mod streamer_repository;

pub use instance_repository::{InstanceLoad, InstanceRepository};
pub use log_repository::{LogQuery, LogRepository};
pub use process_config_repository::{ProcessConfigRepository, ProcessConfigUpdate};
pub use process_repository::ProcessRepository;
pub use streamer_repository::{NewStreamer, StreamerRepository, StreamerUpdate};
