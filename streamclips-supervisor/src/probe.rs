//! CPU-delta hang detection

use std::time::Duration;
use streamclips_config::HangProbeConfig;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

/// Detects processes that are alive but consume (almost) no CPU
#[derive(Debug, Clone)]
pub struct HangProbe {
    window: Duration,
    cpu_threshold_seconds: f64,
}

impl HangProbe {
    pub fn new(window: Duration, cpu_threshold_seconds: f64) -> Self {
        Self {
            window,
            cpu_threshold_seconds,
        }
    }

    pub fn from_config(config: &HangProbeConfig) -> Self {
        Self::new(config.window, config.cpu_threshold_seconds)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Sample cumulative CPU time, wait one window, sample again.
    ///
    /// Blocks the calling task for the whole window. A process that does not
    /// exist (at either sample) is not hanging.
    pub async fn is_hanging(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();

        let Some(before) = cpu_time_ms(&mut system, pid) else {
            debug!("Hang probe: process {} not found", pid);
            return false;
        };

        tokio::time::sleep(self.window).await;

        let Some(after) = cpu_time_ms(&mut system, pid) else {
            debug!("Hang probe: process {} exited during probe", pid);
            return false;
        };

        let used_seconds = after.saturating_sub(before) as f64 / 1000.0;
        debug!(
            "Hang probe: process {} used {:.3}s CPU over {:?}",
            pid, used_seconds, self.window
        );
        used_seconds <= self.cpu_threshold_seconds
    }
}

/// Accumulated CPU time in milliseconds; `None` when the process is gone
fn cpu_time_ms(system: &mut System, pid: Pid) -> Option<u64> {
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_cpu(),
    );
    system.process(pid).map(|process| process.accumulated_cpu_time())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_idle_process_is_hanging() {
        let mut child = tokio::process::Command::new("sleep").arg("30").spawn().unwrap();
        let probe = HangProbe::new(Duration::from_millis(500), 0.01);

        assert!(probe.is_hanging(child.id().unwrap()).await);
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_busy_process_is_not_hanging() {
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("while :; do :; done")
            .spawn()
            .unwrap();
        let probe = HangProbe::new(Duration::from_millis(1000), 0.01);

        assert!(!probe.is_hanging(child.id().unwrap()).await);
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_process_is_not_hanging() {
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        let probe = HangProbe::new(Duration::from_millis(10), 0.01);
        assert!(!probe.is_hanging(pid).await);
    }
}
