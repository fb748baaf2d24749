use crate::command::ClipCommand;
use crate::error::{SupervisorError, SupervisorResult};
use crate::monitor::{read_stream, OutputMonitor, OutputStream};
use crate::probe::HangProbe;
use crate::signal::{self, StopOutcome};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use streamclips_config::SupervisorConfig;
use streamclips_storage::entities::{ProcessConfig, ProcessRecord, Streamer};
use streamclips_storage::sea_orm::{ConnectionTrait, DatabaseConnection as SeaConnection, TransactionTrait};
use streamclips_storage::{
    DatabaseConnection, ProcessConfigRepository, ProcessRepository, StorageError, StreamerRepository,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Owns the lifecycle of clip-capture children on this instance.
///
/// Cheap to clone; clones share the table of locally running children.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    db: DatabaseConnection,
    hostname: String,
    config: SupervisorConfig,
    probe: HangProbe,
    /// Committed children spawned by this process, keyed by record id
    children: Mutex<HashMap<Uuid, LocalChild>>,
}

struct LocalChild {
    pid: i32,
    exited: watch::Receiver<bool>,
    terminating: bool,
}

/// A spawned child whose record is not yet committed.
///
/// The output monitor only starts persisting once [`release`](Self::release)
/// is called after the surrounding transaction commits. Dropping it (or
/// calling [`abort`](Self::abort)) kills the child instead.
pub struct SpawnedProcess {
    record: ProcessRecord,
    gate: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
    supervisor: ProcessSupervisor,
}

impl SpawnedProcess {
    pub fn record(&self) -> &ProcessRecord {
        &self.record
    }

    /// The record is committed: hand the child to its monitor
    pub fn release(mut self) -> ProcessRecord {
        self.supervisor.children().insert(
            self.record.id,
            LocalChild {
                pid: self.record.pid,
                exited: self.exited.clone(),
                terminating: false,
            },
        );
        if let Some(gate) = self.gate.take() {
            let _ = gate.send(());
        }
        self.record.clone()
    }

    /// The record will never be committed: kill the child.
    ///
    /// Closing the gate makes the output monitor kill and reap the child
    /// without touching storage.
    pub fn abort(mut self) {
        warn!(
            "Aborting spawned process {} (pid {}) for streamer {}",
            self.record.id, self.record.pid, self.record.streamer_id
        );
        drop(self.gate.take());
    }
}

impl ProcessSupervisor {
    pub fn new(db: DatabaseConnection, hostname: impl Into<String>, config: SupervisorConfig) -> Self {
        let probe = HangProbe::from_config(&config.hang_probe);
        Self {
            inner: Arc::new(Inner {
                db,
                hostname: hostname.into(),
                config,
                probe,
                children: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.inner.hostname
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub(crate) fn db(&self) -> &SeaConnection {
        self.inner.db.get_connection()
    }

    fn children(&self) -> MutexGuard<'_, HashMap<Uuid, LocalChild>> {
        self.inner.children.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record ids and pids of children this process is still supervising
    pub fn local_children(&self) -> Vec<(Uuid, i32)> {
        self.children().iter().map(|(id, child)| (*id, child.pid)).collect()
    }

    /// Wait until every local child has been reaped or `timeout` passes.
    ///
    /// Returns the number of children still running at the deadline.
    pub async fn wait_for_exit(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let pending: Vec<watch::Receiver<bool>> =
            self.children().values().map(|child| child.exited.clone()).collect();

        let mut running = 0;
        for mut exited in pending {
            if timeout_at(deadline, exited.wait_for(|done| *done)).await.is_err() {
                running += 1;
            }
        }
        running
    }

    pub(crate) fn forget(&self, record_id: Uuid) {
        self.children().remove(&record_id);
    }

    /// Spawn the clip program for `streamer` and insert its record through `db`.
    ///
    /// The insert runs in a savepoint of `db`, so a failure leaves the
    /// caller's transaction usable. If the insert fails the child is killed.
    pub async fn spawn<C>(&self, db: &C, streamer: &Streamer, params: &ProcessConfig) -> SupervisorResult<SpawnedProcess>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let command = ClipCommand::new(&self.inner.config, streamer, params);
        info!("Starting clip process for {}: {}", streamer.name, command.display_redacted());

        let mut child = command.to_command().spawn().map_err(|source| SupervisorError::Spawn {
            streamer: streamer.name.clone(),
            source,
        })?;

        let Some(pid) = child.id() else {
            return Err(SupervisorError::Spawn {
                streamer: streamer.name.clone(),
                source: std::io::Error::other("child exited before its pid was read"),
            });
        };
        let pid = pid as i32;

        let record = ProcessRecord::new(streamer.id, self.inner.hostname.clone(), pid);
        let inserted = async {
            let savepoint = db.begin().await?;
            let record = ProcessRepository::new(&savepoint).create(record).await?;
            savepoint.commit().await?;
            Ok::<_, StorageError>(record)
        }
        .await;

        let record = match inserted {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "Failed to record process for {} (pid {}), killing it: {}",
                    streamer.name, pid, e
                );
                if let Err(kill_err) = child.start_kill() {
                    warn!("Failed to kill pid {}: {}", pid, kill_err);
                }
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
                return Err(e.into());
            }
        };

        let (events_tx, events_rx) = mpsc::channel(self.inner.config.output_buffer);
        let mut open_streams = 0;
        if let Some(stdout) = child.stdout.take() {
            open_streams += 1;
            tokio::spawn(read_stream(stdout, OutputStream::Stdout, events_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            open_streams += 1;
            tokio::spawn(read_stream(stderr, OutputStream::Stderr, events_tx.clone()));
        }
        drop(events_tx);

        let (gate_tx, gate_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);

        let monitor = OutputMonitor {
            supervisor: self.clone(),
            record: record.clone(),
            source: streamer.log_source(),
            child,
            events: events_rx,
            open_streams,
            gate: gate_rx,
            exited: exited_tx,
        };
        tokio::spawn(monitor.run());

        info!("Started process {} for {} (pid {})", record.id, streamer.name, pid);

        Ok(SpawnedProcess {
            record,
            gate: Some(gate_tx),
            exited: exited_rx,
            supervisor: self.clone(),
        })
    }

    /// Spawn and commit a process for `streamer` in its own transaction.
    ///
    /// Capacity and cooldown are not checked.
    pub async fn start(&self, streamer: &Streamer) -> SupervisorResult<ProcessRecord> {
        let txn = self.inner.db.begin_write().await?;
        let params = ProcessConfigRepository::new(&txn).get().await?;
        let spawned = self.spawn(&txn, streamer, &params).await?;

        match txn.commit().await {
            Ok(()) => Ok(spawned.release()),
            Err(e) => {
                spawned.abort();
                Err(e.into())
            }
        }
    }

    /// Whether the child with `pid` used no CPU over one probe window
    pub async fn is_hanging(&self, pid: i32) -> bool {
        if pid <= 0 {
            return false;
        }
        self.inner.probe.is_hanging(pid as u32).await
    }

    /// Stop the process of `record_id` in its own transaction.
    ///
    /// Safe to race with other stops of the same record: exactly one caller
    /// removes it, the others get [`StopOutcome::NotFound`].
    pub async fn stop(&self, record_id: Uuid) -> SupervisorResult<StopOutcome> {
        let txn = self.inner.db.begin_write().await?;
        let outcome = self.stop_in(&txn, record_id).await?;
        txn.commit().await?;
        Ok(outcome)
    }

    /// Stop the process of `record_id` within the caller's transaction
    pub async fn stop_in<C: ConnectionTrait>(&self, db: &C, record_id: Uuid) -> SupervisorResult<StopOutcome> {
        let processes = ProcessRepository::new(db);

        // Write first so the row (and SQLite's writer lock) is held before reading
        if processes.touch_activity(record_id, Utc::now()).await? == 0 {
            return Ok(StopOutcome::NotFound);
        }
        let Some(record) = processes.find_by_id_for_update(record_id).await? else {
            return Ok(StopOutcome::NotFound);
        };

        let outcome = if record.instance_hostname == self.inner.hostname {
            self.terminate_local(record.id, record.pid)?
        } else {
            StopOutcome::Remote
        };

        if processes.delete_by_id(record.id).await? == 0 {
            return Ok(StopOutcome::NotFound);
        }
        StreamerRepository::new(db)
            .stamp_processed(&[record.streamer_id], Utc::now())
            .await?;

        info!(
            "Stopped process {} (pid {}, streamer {}): {:?}",
            record.id, record.pid, record.streamer_id, outcome
        );
        Ok(outcome)
    }

    /// Stop every process of the fleet; returns the number of records removed
    pub async fn stop_all(&self) -> SupervisorResult<u64> {
        let txn = self.inner.db.begin_write().await?;
        let removed = self.stop_all_in(&txn).await?;
        txn.commit().await?;
        Ok(removed)
    }

    pub async fn stop_all_in<C: ConnectionTrait>(&self, db: &C) -> SupervisorResult<u64> {
        let records = ProcessRepository::new(db).list().await?;
        info!("Stopping all {} processes", records.len());
        self.stop_records(db, records).await
    }

    /// Stop every process owned by `hostname`
    pub async fn stop_for_instance(&self, hostname: &str) -> SupervisorResult<u64> {
        let txn = self.inner.db.begin_write().await?;
        let records = ProcessRepository::new(&txn).list_by_instance(hostname).await?;
        info!("Stopping {} processes of instance {}", records.len(), hostname);
        let removed = self.stop_records(&txn, records).await?;
        txn.commit().await?;
        Ok(removed)
    }

    /// Signal local children, then clear all given records in one go.
    ///
    /// Signal failures are logged per record and do not keep the record.
    async fn stop_records<C: ConnectionTrait>(&self, db: &C, records: Vec<ProcessRecord>) -> SupervisorResult<u64> {
        let mut record_ids = Vec::with_capacity(records.len());
        let mut streamer_ids = Vec::with_capacity(records.len());

        for record in records {
            if record.instance_hostname == self.inner.hostname {
                if let Err(e) = self.terminate_local(record.id, record.pid) {
                    error!("Failed to stop process {} (pid {}): {}", record.id, record.pid, e);
                }
            }
            record_ids.push(record.id);
            streamer_ids.push(record.streamer_id);
        }

        let removed = ProcessRepository::new(db).delete_many(&record_ids).await?;
        StreamerRepository::new(db)
            .stamp_processed(&streamer_ids, Utc::now())
            .await?;
        Ok(removed)
    }

    /// Terminate local children whose record no longer exists.
    ///
    /// Records disappear underneath a running child when another instance
    /// stops or reaps them. Returns the number of children signalled.
    pub async fn reconcile(&self) -> SupervisorResult<usize> {
        let candidates: Vec<(Uuid, i32)> = self
            .children()
            .iter()
            .filter(|(_, child)| !child.terminating)
            .map(|(id, child)| (*id, child.pid))
            .collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = candidates.iter().map(|(id, _)| *id).collect();
        let existing: HashSet<Uuid> = ProcessRepository::new(self.db())
            .existing_ids(&ids)
            .await?
            .into_iter()
            .collect();

        let mut terminated = 0;
        for (record_id, pid) in candidates {
            if existing.contains(&record_id) {
                continue;
            }
            warn!("Process {} (pid {}) lost its record, terminating", record_id, pid);
            match self.terminate_local(record_id, pid) {
                Ok(_) => terminated += 1,
                Err(e) => error!("Failed to terminate orphaned pid {}: {}", pid, e),
            }
        }
        Ok(terminated)
    }

    /// SIGTERM `pid`, escalating to SIGKILL after the grace period
    fn terminate_local(&self, record_id: Uuid, pid: i32) -> SupervisorResult<StopOutcome> {
        let outcome = signal::send_terminate(pid)?;

        let exited = self.children().get_mut(&record_id).map(|child| {
            child.terminating = true;
            child.exited.clone()
        });

        if outcome == StopOutcome::Terminated {
            if let Some(grace) = self.inner.config.termination_grace_period {
                signal::spawn_kill_watchdog(pid, grace, exited);
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use streamclips_storage::entities::LogLevel;
    use streamclips_storage::testing::TestDatabase;
    use streamclips_storage::{LogQuery, LogRepository, NewStreamer};

    const HOST: &str = "capture-test";

    fn write_script(dir: &Path, body: &str) -> String {
        let path = dir.join("clip.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn supervisor(db: &TestDatabase, program: String) -> ProcessSupervisor {
        let config = SupervisorConfig {
            program,
            termination_grace_period: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        ProcessSupervisor::new(db.connection.clone(), HOST, config)
    }

    async fn streamer(db: &TestDatabase, name: &str) -> Streamer {
        StreamerRepository::new(db.conn())
            .create(NewStreamer::new(name, format!("https://example.com/{}", name)))
            .await
            .unwrap()
    }

    async fn wait_for_record_gone(db: &TestDatabase, record_id: Uuid) {
        for _ in 0..100 {
            if ProcessRepository::new(db.conn()).find_by_id(record_id).await.unwrap().is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("record {} still present", record_id);
    }

    async fn wait_for_children(sup: &ProcessSupervisor, expected: usize) {
        for _ in 0..100 {
            if sup.local_children().len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("expected {} local children, found {}", expected, sup.local_children().len());
    }

    #[tokio::test]
    async fn test_start_captures_output_and_stops_on_exit() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = write_script(dir.path(), "echo \"capturing $1\"\necho oops >&2\nsleep 0.3");
        let db = TestDatabase::new().await.unwrap();
        let sup = supervisor(&db, program);
        let alpha = streamer(&db, "alpha").await;

        let record = sup.start(&alpha).await.unwrap();
        assert_eq!(record.instance_hostname, HOST);
        assert_eq!(record.streamer_id, alpha.id);

        // The child exits on its own: end of output stops the record
        wait_for_record_gone(&db, record.id).await;
        wait_for_children(&sup, 0).await;

        let stamped = StreamerRepository::new(db.conn()).find_by_id(alpha.id).await.unwrap().unwrap();
        assert!(stamped.last_processed_at.is_some());

        let logs = LogRepository::new(db.conn())
            .list(&LogQuery {
                source: Some("streamclips-alpha".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(logs
            .iter()
            .any(|l| l.message == "capturing https://example.com/alpha" && l.level == LogLevel::Info));
        assert!(logs.iter().any(|l| l.message == "oops" && l.level == LogLevel::Error));
    }

    #[tokio::test]
    async fn test_stop_terminates_and_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = write_script(dir.path(), "echo started\nexec sleep 30");
        let db = TestDatabase::new().await.unwrap();
        let sup = supervisor(&db, program);
        let alpha = streamer(&db, "alpha").await;

        let record = sup.start(&alpha).await.unwrap();
        assert!(signal::pid_exists(record.pid));

        let (first, second) = tokio::join!(sup.stop(record.id), sup.stop(record.id));
        let outcomes = [first.unwrap(), second.unwrap()];
        assert_eq!(outcomes.iter().filter(|o| o.removed_record()).count(), 1);
        assert!(outcomes.contains(&StopOutcome::NotFound));

        assert!(ProcessRepository::new(db.conn()).find_by_id(record.id).await.unwrap().is_none());
        wait_for_children(&sup, 0).await;
        assert_eq!(sup.stop(record.id).await.unwrap(), StopOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_stop_remote_record_does_not_signal() {
        let db = TestDatabase::new().await.unwrap();
        let sup = supervisor(&db, "unused".to_string());
        let alpha = streamer(&db, "alpha").await;

        // pid 1 belongs to another host's namespace as far as this instance is concerned
        let record = ProcessRepository::new(db.conn())
            .create(ProcessRecord::new(alpha.id, "other-host", 1))
            .await
            .unwrap();

        assert_eq!(sup.stop(record.id).await.unwrap(), StopOutcome::Remote);
        assert!(ProcessRepository::new(db.conn()).find_by_id(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let db = TestDatabase::new().await.unwrap();
        let sup = supervisor(&db, "/nonexistent/clip-program".to_string());
        let alpha = streamer(&db, "alpha").await;

        let result = sup.start(&alpha).await;
        assert!(matches!(result, Err(SupervisorError::Spawn { .. })));
        assert!(ProcessRepository::new(db.conn()).list().await.unwrap().is_empty());

        // No cooldown on spawn failure
        let after = StreamerRepository::new(db.conn()).find_by_id(alpha.id).await.unwrap().unwrap();
        assert!(after.last_processed_at.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_record_kills_new_child() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = write_script(dir.path(), "exec sleep 30");
        let db = TestDatabase::new().await.unwrap();
        let sup = supervisor(&db, program);
        let alpha = streamer(&db, "alpha").await;

        let first = sup.start(&alpha).await.unwrap();
        let second = sup.start(&alpha).await;
        assert!(matches!(second, Err(SupervisorError::Storage(_))));
        assert_eq!(ProcessRepository::new(db.conn()).list().await.unwrap().len(), 1);
        assert_eq!(sup.local_children().len(), 1);

        sup.stop(first.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_abort_kills_uncommitted_child() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = write_script(dir.path(), "echo started\nexec sleep 30");
        let db = TestDatabase::new().await.unwrap();
        let sup = supervisor(&db, program);
        let alpha = streamer(&db, "alpha").await;
        let params = ProcessConfigRepository::new(db.conn()).get().await.unwrap();

        let txn = db.conn().begin().await.unwrap();
        let spawned = sup.spawn(&txn, &alpha, &params).await.unwrap();
        let pid = spawned.record().pid;
        spawned.abort();
        txn.rollback().await.unwrap();

        for _ in 0..100 {
            if !signal::pid_exists(pid) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!signal::pid_exists(pid));
        assert!(sup.local_children().is_empty());
        assert!(ProcessRepository::new(db.conn()).list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_and_reconcile() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = write_script(dir.path(), "exec sleep 30");
        let db = TestDatabase::new().await.unwrap();
        let sup = supervisor(&db, program);

        let a = sup.start(&streamer(&db, "a").await).await.unwrap();
        let b = sup.start(&streamer(&db, "b").await).await.unwrap();
        let remote_streamer = streamer(&db, "c").await;
        ProcessRepository::new(db.conn())
            .create(ProcessRecord::new(remote_streamer.id, "other-host", 1))
            .await
            .unwrap();

        // Another instance deletes b's record behind our back
        ProcessRepository::new(db.conn()).delete_by_id(b.id).await.unwrap();
        assert_eq!(sup.reconcile().await.unwrap(), 1);
        wait_for_children(&sup, 1).await;
        assert_eq!(sup.local_children()[0].0, a.id);

        assert_eq!(sup.stop_all().await.unwrap(), 2);
        assert!(ProcessRepository::new(db.conn()).list().await.unwrap().is_empty());
        wait_for_children(&sup, 0).await;
    }

    #[tokio::test]
    async fn test_stop_for_instance_only_touches_that_instance() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = write_script(dir.path(), "exec sleep 30");
        let db = TestDatabase::new().await.unwrap();
        let sup = supervisor(&db, program);

        sup.start(&streamer(&db, "a").await).await.unwrap();
        let remote_streamer = streamer(&db, "b").await;
        ProcessRepository::new(db.conn())
            .create(ProcessRecord::new(remote_streamer.id, "other-host", 1))
            .await
            .unwrap();

        assert_eq!(sup.stop_for_instance(HOST).await.unwrap(), 1);
        let remaining = ProcessRepository::new(db.conn()).list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].instance_hostname, "other-host");
    }

    #[tokio::test]
    async fn test_wait_for_exit_outlasts_sigterm_escalation() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = write_script(dir.path(), "trap '' TERM\nexec sleep 30");
        let db = TestDatabase::new().await.unwrap();
        let sup = supervisor(&db, program);

        sup.start(&streamer(&db, "stubborn").await).await.unwrap();
        // Let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sup.stop_for_instance(HOST).await.unwrap(), 1);
        assert_eq!(sup.local_children().len(), 1);

        // SIGTERM is ignored; the watchdog kills it after the 2s grace period
        assert_eq!(sup.wait_for_exit(Duration::from_secs(6)).await, 0);
        assert!(sup.local_children().is_empty());
    }

    #[tokio::test]
    async fn test_is_hanging_detects_idle_child() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = write_script(dir.path(), "exec sleep 30");
        let db = TestDatabase::new().await.unwrap();
        let mut config = SupervisorConfig {
            program,
            ..Default::default()
        };
        config.hang_probe.window = Duration::from_millis(500);
        let sup = ProcessSupervisor::new(db.connection.clone(), HOST, config);

        let record = sup.start(&streamer(&db, "idle").await).await.unwrap();
        assert!(sup.is_hanging(record.pid).await);
        assert!(!sup.is_hanging(0).await);

        sup.stop(record.id).await.unwrap();
    }
}
