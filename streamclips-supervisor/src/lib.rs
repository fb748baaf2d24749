//! Supervision of clip-capture child processes
//!
//! A [`ProcessSupervisor`] spawns one child per claimed streamer, records it
//! in the shared store, captures its output into the log table and
//! terminates it on request, on end of output or when it hangs.

pub mod command;
pub mod error;
pub mod monitor;
pub mod probe;
pub mod signal;
pub mod supervisor;

pub use command::ClipCommand;
pub use error::{SupervisorError, SupervisorResult};
pub use monitor::{OutputEvent, OutputStream};
pub use probe::HangProbe;
pub use signal::StopOutcome;
pub use supervisor::{ProcessSupervisor, SpawnedProcess};
