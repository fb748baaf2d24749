//! Administrative commands on work items, processes, configuration and logs
//!
//! These are the entry points for admin surfaces. Every mutation that
//! invalidates a running child stops it in the same transaction.

use crate::error::{ServiceError, ServiceResult};
use crate::registry::InstanceRegistry;
use serde::{Deserialize, Serialize};
use streamclips_storage::entities::{LogEntry, ProcessConfig, ProcessRecord, Streamer};
use streamclips_storage::sea_orm::DatabaseConnection as SeaConnection;
use streamclips_storage::{
    DatabaseConnection, InstanceLoad, LogQuery, LogRepository, NewStreamer, ProcessConfigRepository,
    ProcessConfigUpdate, ProcessRepository, StreamerRepository, StreamerUpdate,
};
use streamclips_supervisor::{ProcessSupervisor, StopOutcome};
use tracing::info;
use uuid::Uuid;

/// Edit of a work item; its running process is restarted by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateWorkItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub changes: StreamerUpdate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeleteWorkItem {
    pub id: Uuid,
}

pub type UpdateProcessConfig = ProcessConfigUpdate;

/// All services sharing one database and supervisor
#[derive(Clone)]
pub struct ServiceContainer {
    pub work_items: WorkItemService,
    pub processes: ProcessService,
    pub process_config: ProcessConfigService,
    pub logs: LogService,
    pub instances: InstanceService,
}

impl ServiceContainer {
    pub fn new(db: DatabaseConnection, supervisor: ProcessSupervisor) -> Self {
        Self {
            work_items: WorkItemService::new(db.clone(), supervisor.clone()),
            processes: ProcessService::new(db.clone(), supervisor.clone()),
            process_config: ProcessConfigService::new(db.clone(), supervisor),
            logs: LogService::new(db.clone()),
            instances: InstanceService::new(db),
        }
    }
}

#[derive(Clone)]
pub struct WorkItemService {
    db: DatabaseConnection,
    supervisor: ProcessSupervisor,
}

impl WorkItemService {
    pub fn new(db: DatabaseConnection, supervisor: ProcessSupervisor) -> Self {
        Self { db, supervisor }
    }

    fn conn(&self) -> &SeaConnection {
        self.db.get_connection()
    }

    pub async fn create(&self, name: &str, url: &str, is_active: bool) -> ServiceResult<Streamer> {
        validate_non_empty(name, "name")?;
        validate_non_empty(url, "url")?;

        let mut new = NewStreamer::new(name, url);
        new.is_active = is_active;
        let streamer = StreamerRepository::new(self.conn()).create(new).await?;
        info!("Created streamer {} ({})", streamer.name, streamer.id);
        Ok(streamer)
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Streamer> {
        StreamerRepository::new(self.conn())
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Streamer", id))
    }

    pub async fn list(&self) -> ServiceResult<Vec<Streamer>> {
        Ok(StreamerRepository::new(self.conn()).list().await?)
    }

    /// Stop the item's process, then apply the changes
    pub async fn update(&self, request: UpdateWorkItem) -> ServiceResult<Streamer> {
        if let Some(name) = &request.changes.name {
            validate_non_empty(name, "name")?;
        }
        if let Some(url) = &request.changes.url {
            validate_non_empty(url, "url")?;
        }

        let txn = self.db.begin_write().await?;
        if StreamerRepository::new(&txn).find_by_id(request.id).await?.is_none() {
            return Err(ServiceError::not_found("Streamer", request.id));
        }

        if let Some(record) = ProcessRepository::new(&txn).find_by_streamer(request.id).await? {
            self.supervisor.stop_in(&txn, record.id).await?;
        }
        let streamer = StreamerRepository::new(&txn)
            .update(request.id, request.changes)
            .await?;
        txn.commit().await?;

        info!("Updated streamer {} ({})", streamer.name, streamer.id);
        Ok(streamer)
    }

    /// Stop the item's process, then delete the item
    pub async fn delete(&self, request: DeleteWorkItem) -> ServiceResult<()> {
        let txn = self.db.begin_write().await?;
        if let Some(record) = ProcessRepository::new(&txn).find_by_streamer(request.id).await? {
            self.supervisor.stop_in(&txn, record.id).await?;
        }
        if StreamerRepository::new(&txn).delete(request.id).await? == 0 {
            return Err(ServiceError::not_found("Streamer", request.id));
        }
        txn.commit().await?;

        info!("Deleted streamer {}", request.id);
        Ok(())
    }
}

#[derive(Clone)]
pub struct ProcessService {
    db: DatabaseConnection,
    supervisor: ProcessSupervisor,
}

impl ProcessService {
    pub fn new(db: DatabaseConnection, supervisor: ProcessSupervisor) -> Self {
        Self { db, supervisor }
    }

    pub async fn list(&self) -> ServiceResult<Vec<ProcessRecord>> {
        Ok(ProcessRepository::new(self.db.get_connection()).list().await?)
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<ProcessRecord> {
        ProcessRepository::new(self.db.get_connection())
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Process", id))
    }

    pub async fn stop(&self, id: Uuid) -> ServiceResult<StopOutcome> {
        match self.supervisor.stop(id).await? {
            StopOutcome::NotFound => Err(ServiceError::not_found("Process", id)),
            outcome => Ok(outcome),
        }
    }

    /// Start a process for a work item now, ignoring capacity and cooldown
    pub async fn start_for(&self, work_item_id: Uuid) -> ServiceResult<ProcessRecord> {
        let conn = self.db.get_connection();
        let streamer = StreamerRepository::new(conn)
            .find_by_id(work_item_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Streamer", work_item_id))?;

        if let Some(existing) = ProcessRepository::new(conn).find_by_streamer(work_item_id).await? {
            return Err(ServiceError::Conflict(format!(
                "streamer {} already has process {} on {}",
                streamer.name, existing.id, existing.instance_hostname
            )));
        }

        Ok(self.supervisor.start(&streamer).await?)
    }
}

#[derive(Clone)]
pub struct ProcessConfigService {
    db: DatabaseConnection,
    supervisor: ProcessSupervisor,
}

impl ProcessConfigService {
    pub fn new(db: DatabaseConnection, supervisor: ProcessSupervisor) -> Self {
        Self { db, supervisor }
    }

    pub async fn get(&self) -> ServiceResult<ProcessConfig> {
        Ok(ProcessConfigRepository::new(self.db.get_connection()).get().await?)
    }

    /// Persist new parameters and stop every process so they restart with them
    pub async fn update(&self, changes: UpdateProcessConfig) -> ServiceResult<ProcessConfig> {
        validate_process_config(&changes)?;

        let txn = self.db.begin_write().await?;
        let config = ProcessConfigRepository::new(&txn).update(changes).await?;
        let stopped = self.supervisor.stop_all_in(&txn).await?;
        txn.commit().await?;

        info!("Process configuration updated, stopped {} processes", stopped);
        Ok(config)
    }
}

#[derive(Clone)]
pub struct LogService {
    db: DatabaseConnection,
}

impl LogService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(&self, query: LogQuery) -> ServiceResult<Vec<LogEntry>> {
        Ok(LogRepository::new(self.db.get_connection()).list(&query).await?)
    }

    pub async fn clear(&self) -> ServiceResult<u64> {
        let removed = LogRepository::new(self.db.get_connection()).clear().await?;
        info!("Cleared {} log entries", removed);
        Ok(removed)
    }
}

/// Read-only fleet view
#[derive(Clone)]
pub struct InstanceService {
    db: DatabaseConnection,
    registry: InstanceRegistry,
}

impl InstanceService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            registry: InstanceRegistry::new(),
        }
    }

    pub async fn list(&self) -> ServiceResult<Vec<InstanceLoad>> {
        self.registry.list_instances(self.db.get_connection()).await
    }
}

fn validate_non_empty(value: &str, field: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_process_config(changes: &ProcessConfigUpdate) -> ServiceResult<()> {
    let floats = [
        ("clip_duration", changes.clip_duration),
        ("window_timespan", changes.window_timespan),
        ("surge_threshold", changes.surge_threshold),
    ];
    for (field, value) in floats {
        if let Some(value) = value {
            if !(value.is_finite() && value > 0.0) {
                return Err(ServiceError::InvalidInput(format!("{} must be positive, got {}", field, value)));
            }
        }
    }

    let ints = [
        ("sample_interval", changes.sample_interval),
        ("baseline_duration", changes.baseline_duration),
    ];
    for (field, value) in ints {
        if let Some(value) = value {
            if value <= 0 {
                return Err(ServiceError::InvalidInput(format!("{} must be positive, got {}", field, value)));
            }
        }
    }
    Ok(())
}
