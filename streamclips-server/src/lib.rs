//! Streamclips fleet server
//!
//! Every instance of the fleet runs the same [`Scheduler`]: it heartbeats
//! through the [`InstanceRegistry`], claims work with the
//! [`ClaimCoordinator`] and hands claimed streamers to the process
//! supervisor. The service objects in [`services`] are the entry points for
//! administrative callers.

pub mod coordinator;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod services;
pub mod startup;

pub use coordinator::ClaimCoordinator;
pub use error::{ServiceError, ServiceResult};
pub use registry::InstanceRegistry;
pub use scheduler::{Scheduler, TickReport};
pub use services::*;
pub use startup::{shutdown_signal, Server};

use chrono::{DateTime, Utc};
use std::time::Duration;

/// `now - age`, saturating at the earliest representable time
pub(crate) fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
