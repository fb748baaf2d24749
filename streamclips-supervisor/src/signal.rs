//! Termination of child processes

use crate::error::{SupervisorError, SupervisorResult};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Termination signal delivered and record removed
    Terminated,
    /// The process no longer existed; record removed
    AlreadyGone,
    /// Record belonged to another instance; removed without signalling
    Remote,
    /// No record left to stop (a concurrent stop won)
    NotFound,
}

impl StopOutcome {
    /// Whether this call removed the record
    pub fn removed_record(&self) -> bool {
        !matches!(self, StopOutcome::NotFound)
    }
}

/// Whether a process with this pid exists
pub fn pid_exists(pid: i32) -> bool {
    match signal::kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Send SIGTERM; a missing process counts as success
pub fn send_terminate(pid: i32) -> SupervisorResult<StopOutcome> {
    if pid <= 0 {
        // kill(0) / kill(-1) would target process groups
        return Ok(StopOutcome::AlreadyGone);
    }
    match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => {
            info!("Sent SIGTERM to process {}", pid);
            Ok(StopOutcome::Terminated)
        }
        Err(Errno::ESRCH) => {
            debug!("Process {} already gone", pid);
            Ok(StopOutcome::AlreadyGone)
        }
        Err(source) => Err(SupervisorError::Termination { pid, source }),
    }
}

/// After `grace`, SIGKILL the process if it has not exited.
///
/// With an `exited` receiver (a child this process spawned and still reaps)
/// the watchdog waits on the exit notification; otherwise it probes the pid.
pub fn spawn_kill_watchdog(pid: i32, grace: Duration, exited: Option<watch::Receiver<bool>>) {
    tokio::spawn(async move {
        let still_running = match exited {
            Some(mut exited) => {
                let wait = exited.wait_for(|done| *done);
                match tokio::time::timeout(grace, wait).await {
                    Ok(_) => false,
                    Err(_) => true,
                }
            }
            None => {
                tokio::time::sleep(grace).await;
                pid_exists(pid)
            }
        };

        if still_running {
            warn!("Process {} ignored SIGTERM for {:?}, sending SIGKILL", pid, grace);
            match signal::kill(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!("Failed to SIGKILL process {}: {}", pid, e),
            }
        }
    });
}
