use crate::entities::{stream_clips_processes, streamers, ProcessRecords, Streamer, Streamers};
use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockBehavior, LockType, NullOrdering, Query};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait, Order, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields for a new streamer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStreamer {
    pub name: String,
    pub url: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewStreamer {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            is_active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Partial update of a streamer; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamerUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub is_active: Option<bool>,
}

/// Repository for streamers (work items)
pub struct StreamerRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> StreamerRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn create(&self, streamer: NewStreamer) -> StorageResult<Streamer> {
        let model = streamers::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(streamer.name),
            url: Set(streamer.url),
            is_active: Set(streamer.is_active),
            last_processed_at: Set(None),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(self.db).await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<Streamer>> {
        Ok(Streamers::find_by_id(id).one(self.db).await?)
    }

    pub async fn list(&self) -> StorageResult<Vec<Streamer>> {
        Ok(Streamers::find()
            .order_by_asc(streamers::Column::Name)
            .order_by_asc(streamers::Column::CreatedAt)
            .all(self.db)
            .await?)
    }

    pub async fn update(&self, id: Uuid, changes: StreamerUpdate) -> StorageResult<Streamer> {
        let existing = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| StorageError::not_found("Streamer", id))?;

        if changes.name.is_none() && changes.url.is_none() && changes.is_active.is_none() {
            return Ok(existing);
        }

        let mut model: streamers::ActiveModel = existing.into();
        if let Some(name) = changes.name {
            model.name = Set(name);
        }
        if let Some(url) = changes.url {
            model.url = Set(url);
        }
        if let Some(is_active) = changes.is_active {
            model.is_active = Set(is_active);
        }
        Ok(model.update(self.db).await?)
    }

    /// Delete a streamer; returns the number of rows removed
    pub async fn delete(&self, id: Uuid) -> StorageResult<u64> {
        Ok(Streamers::delete_by_id(id).exec(self.db).await?.rows_affected)
    }

    /// Start the claim cooldown for the given streamers
    pub async fn stamp_processed(&self, ids: &[Uuid], at: DateTime<Utc>) -> StorageResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = Streamers::update_many()
            .col_expr(streamers::Column::LastProcessedAt, Expr::value(at))
            .filter(streamers::Column::Id.is_in(ids.iter().copied()))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Lock up to `max_count` claimable streamers.
    ///
    /// Claimable means active, without a process record, and either never
    /// processed or processed before `cooldown_cutoff`. Rows locked by a
    /// concurrent claim on another instance are skipped (PostgreSQL); SQLite
    /// serialises writers instead. Least recently processed streamers come
    /// first, never-processed ones before all others.
    pub async fn lock_claimable(&self, max_count: u64, cooldown_cutoff: DateTime<Utc>) -> StorageResult<Vec<Streamer>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let with_process = Query::select()
            .column(stream_clips_processes::Column::StreamerId)
            .from(ProcessRecords)
            .to_owned();

        Ok(Streamers::find()
            .filter(streamers::Column::IsActive.eq(true))
            .filter(streamers::Column::Id.not_in_subquery(with_process))
            .filter(
                Condition::any()
                    .add(streamers::Column::LastProcessedAt.is_null())
                    .add(streamers::Column::LastProcessedAt.lt(cooldown_cutoff)),
            )
            .order_by_with_nulls(streamers::Column::LastProcessedAt, Order::Asc, NullOrdering::First)
            .order_by_asc(streamers::Column::CreatedAt)
            .limit(max_count)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ProcessRecord;
    use crate::repositories::ProcessRepository;
    use crate::testing::TestDatabase;
    use chrono::Duration;

    #[tokio::test]
    async fn test_crud() {
        let db = TestDatabase::new().await.unwrap();
        let repo = StreamerRepository::new(db.conn());

        let created = repo
            .create(NewStreamer::new("alpha", "https://example.com/alpha"))
            .await
            .unwrap();
        assert!(created.is_active);
        assert!(created.last_processed_at.is_none());
        assert_eq!(created.log_source(), "streamclips-alpha");

        let updated = repo
            .update(
                created.id,
                StreamerUpdate {
                    url: Some("https://example.com/alpha2".to_string()),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "alpha");
        assert_eq!(updated.url, "https://example.com/alpha2");
        assert!(!updated.is_active);

        assert_eq!(repo.delete(created.id).await.unwrap(), 1);
        assert_eq!(repo.delete(created.id).await.unwrap(), 0);
        assert!(repo.find_by_id(created.id).await.unwrap().is_none());

        let missing = repo.update(created.id, StreamerUpdate::default()).await;
        assert!(matches!(missing, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_lock_claimable_filters() {
        let db = TestDatabase::new().await.unwrap();
        let repo = StreamerRepository::new(db.conn());
        let now = Utc::now();
        let cutoff = now - Duration::minutes(1);

        let fresh = repo.create(NewStreamer::new("fresh", "u1")).await.unwrap();
        let cooled = repo.create(NewStreamer::new("cooled", "u2")).await.unwrap();
        let cooling = repo.create(NewStreamer::new("cooling", "u3")).await.unwrap();
        let inactive = repo.create(NewStreamer::new("inactive", "u4").inactive()).await.unwrap();
        let running = repo.create(NewStreamer::new("running", "u5")).await.unwrap();

        repo.stamp_processed(&[cooled.id], now - Duration::minutes(5)).await.unwrap();
        repo.stamp_processed(&[cooling.id], now - Duration::seconds(10)).await.unwrap();
        ProcessRepository::new(db.conn())
            .create(ProcessRecord::new(running.id, "host", 1))
            .await
            .unwrap();

        let claimable = repo.lock_claimable(10, cutoff).await.unwrap();
        let ids: Vec<Uuid> = claimable.iter().map(|s| s.id).collect();

        // Never processed first, then oldest last_processed_at
        assert_eq!(ids, vec![fresh.id, cooled.id]);
        assert!(!ids.contains(&cooling.id));
        assert!(!ids.contains(&inactive.id));
        assert!(!ids.contains(&running.id));
    }

    #[tokio::test]
    async fn test_lock_claimable_respects_limit() {
        let db = TestDatabase::new().await.unwrap();
        let repo = StreamerRepository::new(db.conn());
        for i in 0..4 {
            repo.create(NewStreamer::new(format!("s{}", i), format!("u{}", i)))
                .await
                .unwrap();
        }

        let cutoff = Utc::now() - Duration::minutes(1);
        assert_eq!(repo.lock_claimable(2, cutoff).await.unwrap().len(), 2);
        assert!(repo.lock_claimable(0, cutoff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stamp_processed_empty_is_noop() {
        let db = TestDatabase::new().await.unwrap();
        let repo = StreamerRepository::new(db.conn());
        assert_eq!(repo.stamp_processed(&[], Utc::now()).await.unwrap(), 0);
    }
}
