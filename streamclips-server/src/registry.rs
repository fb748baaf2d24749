//! Fleet membership, liveness and reaping of dead instances

use crate::cutoff;
use crate::error::ServiceResult;
use chrono::Utc;
use std::time::Duration;
use streamclips_storage::entities::Instance;
use streamclips_storage::sea_orm::{ConnectionTrait, TransactionTrait};
use streamclips_storage::{InstanceLoad, InstanceRepository, ProcessRepository, StreamerRepository};
use tracing::{error, info, warn};

/// Tracks instances through heartbeats and reclaims work of dead ones
#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry;

impl InstanceRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Upsert the instance row and set `last_heartbeat = now`
    pub async fn register_or_heartbeat<C: ConnectionTrait>(
        &self,
        db: &C,
        hostname: &str,
        max_processes: u32,
    ) -> ServiceResult<()> {
        let max_processes = i32::try_from(max_processes).unwrap_or(i32::MAX);
        InstanceRepository::new(db)
            .upsert_heartbeat(hostname, max_processes, Utc::now())
            .await?;
        Ok(())
    }

    /// Instances whose last heartbeat is older than `timeout`
    pub async fn get_dead_instances<C: ConnectionTrait>(&self, db: &C, timeout: Duration) -> ServiceResult<Vec<Instance>> {
        Ok(InstanceRepository::new(db)
            .find_dead(cutoff(Utc::now(), timeout))
            .await?)
    }

    /// Remove every process record of a dead instance and start the cooldown
    /// of its streamers. The processes themselves are not signalled.
    pub async fn reap<C: ConnectionTrait>(&self, db: &C, dead: &Instance) -> ServiceResult<u64> {
        let records = ProcessRepository::new(db).list_by_instance(&dead.hostname).await?;
        if records.is_empty() {
            return Ok(0);
        }

        let record_ids: Vec<_> = records.iter().map(|r| r.id).collect();
        let streamer_ids: Vec<_> = records.iter().map(|r| r.streamer_id).collect();

        StreamerRepository::new(db)
            .stamp_processed(&streamer_ids, Utc::now())
            .await?;
        let reaped = ProcessRepository::new(db).delete_many(&record_ids).await?;

        warn!(
            "Reaped {} processes of dead instance {} (last heartbeat {})",
            reaped, dead.hostname, dead.last_heartbeat
        );
        Ok(reaped)
    }

    /// Reap all dead instances; one failing instance does not stop the others
    pub async fn reap_dead<C>(&self, db: &C, timeout: Duration) -> ServiceResult<u64>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let mut total = 0;
        for dead in self.get_dead_instances(db, timeout).await? {
            let savepoint = db.begin().await?;
            match self.reap(&savepoint, &dead).await {
                Ok(count) => {
                    savepoint.commit().await?;
                    total += count;
                }
                Err(e) => error!("Failed to reap instance {}: {}", dead.hostname, e),
            }
        }
        if total > 0 {
            info!("Reaped {} processes from dead instances", total);
        }
        Ok(total)
    }

    /// `max_processes` minus owned records, never negative; 0 for unknown instances
    pub async fn available_capacity<C: ConnectionTrait>(&self, db: &C, hostname: &str) -> ServiceResult<u64> {
        let instances = InstanceRepository::new(db);
        let Some(instance) = instances.find(hostname).await? else {
            return Ok(0);
        };
        let running = instances.count_processes(hostname).await?;
        Ok((instance.max_processes.max(0) as u64).saturating_sub(running))
    }

    /// Every known instance with its current load
    pub async fn list_instances<C: ConnectionTrait>(&self, db: &C) -> ServiceResult<Vec<InstanceLoad>> {
        Ok(InstanceRepository::new(db).list_with_load().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamclips_storage::entities::ProcessRecord;
    use streamclips_storage::testing::TestDatabase;
    use streamclips_storage::NewStreamer;

    #[tokio::test]
    async fn test_capacity_is_clamped() {
        let db = TestDatabase::new().await.unwrap();
        let registry = InstanceRegistry::new();
        registry.register_or_heartbeat(db.conn(), "a", 1).await.unwrap();
        assert_eq!(registry.available_capacity(db.conn(), "a").await.unwrap(), 1);
        assert_eq!(registry.available_capacity(db.conn(), "unknown").await.unwrap(), 0);

        let streamers = StreamerRepository::new(db.conn());
        for name in ["x", "y"] {
            let s = streamers.create(NewStreamer::new(name, "u")).await.unwrap();
            ProcessRepository::new(db.conn())
                .create(ProcessRecord::new(s.id, "a", 1))
                .await
                .unwrap();
        }
        // Over capacity after an administrative start
        assert_eq!(registry.available_capacity(db.conn(), "a").await.unwrap(), 0);

        let loads = registry.list_instances(db.conn()).await.unwrap();
        assert_eq!(loads[0].current_processes, 2);
        assert_eq!(loads[0].available(), 0);
    }

    #[tokio::test]
    async fn test_reap_dead_instance() {
        let db = TestDatabase::new().await.unwrap();
        let registry = InstanceRegistry::new();
        let timeout = Duration::from_secs(300);

        InstanceRepository::new(db.conn())
            .upsert_heartbeat("dead", 2, Utc::now() - chrono::Duration::minutes(10))
            .await
            .unwrap();
        registry.register_or_heartbeat(db.conn(), "alive", 2).await.unwrap();

        let streamer = StreamerRepository::new(db.conn())
            .create(NewStreamer::new("alpha", "u"))
            .await
            .unwrap();
        ProcessRepository::new(db.conn())
            .create(ProcessRecord::new(streamer.id, "dead", 4242))
            .await
            .unwrap();

        let dead = registry.get_dead_instances(db.conn(), timeout).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].hostname, "dead");

        assert_eq!(registry.reap_dead(db.conn(), timeout).await.unwrap(), 1);
        assert!(ProcessRepository::new(db.conn()).list().await.unwrap().is_empty());
        let stamped = StreamerRepository::new(db.conn())
            .find_by_id(streamer.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stamped.last_processed_at.is_some());

        // Instance rows are kept
        assert_eq!(InstanceRepository::new(db.conn()).list().await.unwrap().len(), 2);
        assert_eq!(registry.reap_dead(db.conn(), timeout).await.unwrap(), 0);
    }
}
