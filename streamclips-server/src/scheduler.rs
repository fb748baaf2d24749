//! Per-instance tick driver
//!
//! Each tick heartbeats, reaps dead instances, claims as many streamers as the
//! instance has free slots for and spawns them, then checks every process the
//! instance owns for staleness. Ticks of one instance never overlap.

use crate::coordinator::ClaimCoordinator;
use crate::cutoff;
use crate::error::ServiceResult;
use crate::registry::InstanceRegistry;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use streamclips_config::{InstanceConfig, SchedulerConfig};
use streamclips_storage::entities::ProcessRecord;
use streamclips_storage::{DatabaseConnection, ProcessConfigRepository, ProcessRepository};
use streamclips_supervisor::{ProcessSupervisor, SpawnedProcess};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Process records removed from dead instances
    pub reaped: u64,
    /// Free slots at the start of the tick
    pub capacity: u64,
    pub claimed: usize,
    pub started: usize,
    pub spawn_failures: usize,
    pub stale_stopped: usize,
    pub orphans_terminated: usize,
    /// The tick ended early because the instance had no free slot
    pub at_capacity: bool,
}

/// Drives the registry, coordinator and supervisor on a fixed interval
pub struct Scheduler {
    db: DatabaseConnection,
    instance: InstanceConfig,
    config: SchedulerConfig,
    registry: InstanceRegistry,
    coordinator: ClaimCoordinator,
    supervisor: ProcessSupervisor,
    is_running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        db: DatabaseConnection,
        instance: InstanceConfig,
        config: SchedulerConfig,
        supervisor: ProcessSupervisor,
    ) -> Self {
        let coordinator = ClaimCoordinator::new(config.claim_cooldown);
        Self {
            db,
            instance,
            config,
            registry: InstanceRegistry::new(),
            coordinator,
            supervisor,
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.instance.hostname
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Tick until `shutdown` resolves. The first tick fires immediately.
    ///
    /// Tick failures are logged; they never end the loop.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler for {} is already running", self.hostname());
            return;
        }

        info!(
            "Starting scheduler for {} (interval {:?}, max processes {})",
            self.hostname(),
            self.config.tick_interval,
            self.instance.max_processes
        );

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler for {} received shutdown", self.hostname());
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) => debug!("Tick finished: {:?}", report),
                        Err(e) => error!("Tick failed on {}: {}", self.hostname(), e),
                    }
                }
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
    }

    /// Run one tick
    pub async fn tick(&self) -> ServiceResult<TickReport> {
        let mut report = TickReport::default();
        let hostname = self.instance.hostname.as_str();

        let txn = self.db.begin_write().await?;

        self.registry
            .register_or_heartbeat(&txn, hostname, self.instance.max_processes)
            .await?;
        report.reaped = self
            .registry
            .reap_dead(&txn, self.config.dead_instance_timeout)
            .await?;

        report.capacity = self.registry.available_capacity(&txn, hostname).await?;
        if report.capacity == 0 {
            txn.commit().await?;
            debug!("{} is at capacity", hostname);
            report.at_capacity = true;
            return Ok(report);
        }

        let params = ProcessConfigRepository::new(&txn).get().await?;
        let max_count = i64::try_from(report.capacity).unwrap_or(i64::MAX);
        let claimed = self.coordinator.claim(&txn, hostname, max_count).await?;
        report.claimed = claimed.len();

        let mut spawned: Vec<SpawnedProcess> = Vec::with_capacity(claimed.len());
        for streamer in &claimed {
            match self.supervisor.spawn(&txn, streamer, &params).await {
                Ok(process) => spawned.push(process),
                Err(e) => {
                    error!("Failed to start process for streamer {} ({}): {}", streamer.name, streamer.id, e);
                    report.spawn_failures += 1;
                }
            }
        }

        if let Err(e) = txn.commit().await {
            for process in spawned {
                process.abort();
            }
            return Err(e.into());
        }

        let fresh: HashSet<Uuid> = spawned
            .into_iter()
            .map(|process| process.release().id)
            .collect();
        report.started = fresh.len();
        if report.started > 0 {
            info!("{} started {} processes", hostname, report.started);
        }

        report.stale_stopped = self.stop_stale(&fresh).await?;
        report.orphans_terminated = self.supervisor.reconcile().await?;

        Ok(report)
    }

    /// Stop owned processes without recent output or that use no CPU.
    ///
    /// Records spawned in this tick are not probed. Each stop commits on its
    /// own, so one failure does not keep the others.
    async fn stop_stale(&self, fresh: &HashSet<Uuid>) -> ServiceResult<usize> {
        let records = ProcessRepository::new(self.db.get_connection())
            .list_by_instance(&self.instance.hostname)
            .await?;
        let inactive_cutoff = cutoff(Utc::now(), self.config.inactivity_threshold);

        let (inactive, active): (Vec<ProcessRecord>, Vec<ProcessRecord>) = records
            .into_iter()
            .filter(|record| !fresh.contains(&record.id))
            .partition(|record| record.is_inactive_since(inactive_cutoff));

        let mut stale: Vec<(ProcessRecord, &'static str)> =
            inactive.into_iter().map(|record| (record, "no output")).collect();

        if self.supervisor.config().hang_probe.enabled && !active.is_empty() {
            let probes = active.iter().map(|record| self.supervisor.is_hanging(record.pid));
            let verdicts = join_all(probes).await;
            stale.extend(
                active
                    .into_iter()
                    .zip(verdicts)
                    .filter(|(_, hanging)| *hanging)
                    .map(|(record, _)| (record, "hanging")),
            );
        }

        let mut stopped = 0;
        for (record, reason) in stale {
            warn!(
                "Stopping stale process {} (pid {}, streamer {}): {}",
                record.id, record.pid, record.streamer_id, reason
            );
            match self.supervisor.stop(record.id).await {
                Ok(outcome) if outcome.removed_record() => stopped += 1,
                Ok(_) => debug!("Process {} was already removed", record.id),
                Err(e) => error!("Failed to stop stale process {}: {}", record.id, e),
            }
        }
        Ok(stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use streamclips_config::SupervisorConfig;
    use streamclips_storage::testing::TestDatabase;

    fn scheduler(db: &TestDatabase, max_processes: u32) -> Scheduler {
        let supervisor_config = SupervisorConfig {
            program: "/nonexistent/streamclips".to_string(),
            ..Default::default()
        };
        let supervisor = ProcessSupervisor::new(db.connection.clone(), "tick-test", supervisor_config);
        Scheduler::new(
            db.connection.clone(),
            InstanceConfig {
                hostname: "tick-test".to_string(),
                max_processes,
            },
            SchedulerConfig::default(),
            supervisor,
        )
    }

    #[tokio::test]
    async fn test_tick_without_work_heartbeats() {
        let db = TestDatabase::new().await.unwrap();
        let scheduler = scheduler(&db, 2);

        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.capacity, 2);
        assert_eq!(report.claimed, 0);
        assert!(!report.at_capacity);

        let instances = InstanceRegistry::new().list_instances(db.conn()).await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].instance.hostname, "tick-test");
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let db = TestDatabase::new().await.unwrap();
        let scheduler = scheduler(&db, 1);

        scheduler.run_until(tokio::time::sleep(Duration::from_millis(200))).await;
        assert!(!scheduler.is_running());

        // The immediate first tick registered the instance
        let instances = InstanceRegistry::new().list_instances(db.conn()).await.unwrap();
        assert_eq!(instances.len(), 1);
    }
}
