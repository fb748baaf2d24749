use crate::entities::{instances, stream_clips_processes, Instance, Instances, ProcessRecords};
use crate::error::StorageResult;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::Serialize;
use std::collections::HashMap;

/// An instance together with the number of processes it currently owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceLoad {
    pub instance: Instance,
    pub current_processes: u64,
}

impl InstanceLoad {
    /// Remaining capacity, never negative
    pub fn available(&self) -> u64 {
        (self.instance.max_processes.max(0) as u64).saturating_sub(self.current_processes)
    }
}

#[derive(Debug, FromQueryResult)]
struct HostCount {
    instance_hostname: String,
    processes: i64,
}

/// Repository for fleet membership rows
pub struct InstanceRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> InstanceRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Insert the instance or refresh its capacity and heartbeat
    pub async fn upsert_heartbeat(&self, hostname: &str, max_processes: i32, now: DateTime<Utc>) -> StorageResult<()> {
        let model = instances::ActiveModel {
            hostname: Set(hostname.to_string()),
            max_processes: Set(max_processes),
            created_at: Set(now),
            last_heartbeat: Set(now),
        };

        Instances::insert(model)
            .on_conflict(
                OnConflict::column(instances::Column::Hostname)
                    .update_columns([instances::Column::MaxProcesses, instances::Column::LastHeartbeat])
                    .to_owned(),
            )
            .exec_without_returning(self.db)
            .await?;
        Ok(())
    }

    pub async fn find(&self, hostname: &str) -> StorageResult<Option<Instance>> {
        Ok(Instances::find_by_id(hostname.to_string()).one(self.db).await?)
    }

    pub async fn list(&self) -> StorageResult<Vec<Instance>> {
        Ok(Instances::find()
            .order_by_asc(instances::Column::Hostname)
            .all(self.db)
            .await?)
    }

    /// Instances whose last heartbeat is older than `cutoff`
    pub async fn find_dead(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Instance>> {
        Ok(Instances::find()
            .filter(instances::Column::LastHeartbeat.lt(cutoff))
            .order_by_asc(instances::Column::Hostname)
            .all(self.db)
            .await?)
    }

    /// Number of process records owned by `hostname`
    pub async fn count_processes(&self, hostname: &str) -> StorageResult<u64> {
        Ok(ProcessRecords::find()
            .filter(stream_clips_processes::Column::InstanceHostname.eq(hostname))
            .count(self.db)
            .await?)
    }

    /// Every instance with its current number of owned processes
    pub async fn list_with_load(&self) -> StorageResult<Vec<InstanceLoad>> {
        let counts: HashMap<String, u64> = ProcessRecords::find()
            .select_only()
            .column(stream_clips_processes::Column::InstanceHostname)
            .column_as(stream_clips_processes::Column::Id.count(), "processes")
            .group_by(stream_clips_processes::Column::InstanceHostname)
            .into_model::<HostCount>()
            .all(self.db)
            .await?
            .into_iter()
            .map(|row| (row.instance_hostname, row.processes.max(0) as u64))
            .collect();

        Ok(self
            .list()
            .await?
            .into_iter()
            .map(|instance| {
                let current_processes = counts.get(&instance.hostname).copied().unwrap_or(0);
                InstanceLoad {
                    instance,
                    current_processes,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{NewStreamer, ProcessRepository, StreamerRepository};
    use crate::testing::TestDatabase;
    use crate::entities::ProcessRecord;
    use chrono::Duration;

    #[tokio::test]
    async fn test_upsert_heartbeat_is_idempotent() {
        let db = TestDatabase::new().await.unwrap();
        let repo = InstanceRepository::new(db.conn());
        let first = Utc::now() - Duration::minutes(10);

        repo.upsert_heartbeat("capture-01", 2, first).await.unwrap();
        let later = Utc::now();
        repo.upsert_heartbeat("capture-01", 4, later).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        let instance = &all[0];
        assert_eq!(instance.max_processes, 4);
        assert!(instance.last_heartbeat > instance.created_at);
    }

    #[tokio::test]
    async fn test_find_dead() {
        let db = TestDatabase::new().await.unwrap();
        let repo = InstanceRepository::new(db.conn());
        let now = Utc::now();

        repo.upsert_heartbeat("alive", 1, now).await.unwrap();
        repo.upsert_heartbeat("dead", 1, now - Duration::minutes(6)).await.unwrap();

        let dead = repo.find_dead(now - Duration::minutes(5)).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].hostname, "dead");
    }

    #[tokio::test]
    async fn test_list_with_load() {
        let db = TestDatabase::new().await.unwrap();
        let repo = InstanceRepository::new(db.conn());
        let now = Utc::now();
        repo.upsert_heartbeat("a", 2, now).await.unwrap();
        repo.upsert_heartbeat("b", 1, now).await.unwrap();

        let streamer = StreamerRepository::new(db.conn())
            .create(NewStreamer::new("alpha", "https://example.com/alpha"))
            .await
            .unwrap();
        ProcessRepository::new(db.conn())
            .create(ProcessRecord::new(streamer.id, "a", 4242))
            .await
            .unwrap();

        let loads = repo.list_with_load().await.unwrap();
        assert_eq!(loads.len(), 2);
        assert_eq!(loads[0].current_processes, 1);
        assert_eq!(loads[0].available(), 1);
        assert_eq!(loads[1].current_processes, 0);
        assert_eq!(loads[1].available(), 1);
        assert_eq!(repo.count_processes("a").await.unwrap(), 1);
    }
}
