use crate::entities::{stream_clips_processes, ProcessRecord, ProcessRecords};
use crate::error::StorageResult;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use uuid::Uuid;

/// Repository for process records (live claims)
pub struct ProcessRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> ProcessRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Insert a record; fails on the unique streamer constraint if one already exists
    pub async fn create(&self, record: ProcessRecord) -> StorageResult<ProcessRecord> {
        let model = stream_clips_processes::ActiveModel {
            id: Set(record.id),
            streamer_id: Set(record.streamer_id),
            instance_hostname: Set(record.instance_hostname),
            pid: Set(record.pid),
            created_at: Set(record.created_at),
            last_activity: Set(record.last_activity),
        };
        Ok(model.insert(self.db).await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<ProcessRecord>> {
        Ok(ProcessRecords::find_by_id(id).one(self.db).await?)
    }

    /// Read a record holding a row lock until the surrounding transaction ends
    pub async fn find_by_id_for_update(&self, id: Uuid) -> StorageResult<Option<ProcessRecord>> {
        Ok(ProcessRecords::find_by_id(id).lock_exclusive().one(self.db).await?)
    }

    pub async fn find_by_streamer(&self, streamer_id: Uuid) -> StorageResult<Option<ProcessRecord>> {
        Ok(ProcessRecords::find()
            .filter(stream_clips_processes::Column::StreamerId.eq(streamer_id))
            .one(self.db)
            .await?)
    }

    pub async fn list(&self) -> StorageResult<Vec<ProcessRecord>> {
        Ok(ProcessRecords::find()
            .order_by_asc(stream_clips_processes::Column::CreatedAt)
            .all(self.db)
            .await?)
    }

    pub async fn list_by_instance(&self, hostname: &str) -> StorageResult<Vec<ProcessRecord>> {
        Ok(ProcessRecords::find()
            .filter(stream_clips_processes::Column::InstanceHostname.eq(hostname))
            .order_by_asc(stream_clips_processes::Column::CreatedAt)
            .all(self.db)
            .await?)
    }

    pub async fn count_by_instance(&self, hostname: &str) -> StorageResult<u64> {
        Ok(ProcessRecords::find()
            .filter(stream_clips_processes::Column::InstanceHostname.eq(hostname))
            .count(self.db)
            .await?)
    }

    /// Ids of all existing records among `ids`
    pub async fn existing_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(ProcessRecords::find()
            .select_only()
            .column(stream_clips_processes::Column::Id)
            .filter(stream_clips_processes::Column::Id.is_in(ids.iter().copied()))
            .into_tuple::<Uuid>()
            .all(self.db)
            .await?)
    }

    /// Refresh the output heartbeat; returns 0 once the record is gone
    pub async fn touch_activity(&self, id: Uuid, at: DateTime<Utc>) -> StorageResult<u64> {
        let result = ProcessRecords::update_many()
            .col_expr(stream_clips_processes::Column::LastActivity, Expr::value(at))
            .filter(stream_clips_processes::Column::Id.eq(id))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_by_id(&self, id: Uuid) -> StorageResult<u64> {
        Ok(ProcessRecords::delete_by_id(id).exec(self.db).await?.rows_affected)
    }

    pub async fn delete_many(&self, ids: &[Uuid]) -> StorageResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = ProcessRecords::delete_many()
            .filter(stream_clips_processes::Column::Id.is_in(ids.iter().copied()))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::repositories::{NewStreamer, StreamerRepository};
    use crate::testing::TestDatabase;

    #[tokio::test]
    async fn test_one_record_per_streamer() {
        let db = TestDatabase::new().await.unwrap();
        let streamer = StreamerRepository::new(db.conn())
            .create(NewStreamer::new("alpha", "u"))
            .await
            .unwrap();
        let repo = ProcessRepository::new(db.conn());

        repo.create(ProcessRecord::new(streamer.id, "a", 100)).await.unwrap();
        let duplicate = repo.create(ProcessRecord::new(streamer.id, "b", 200)).await;
        assert!(matches!(duplicate, Err(StorageError::Database(_))));

        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert_eq!(repo.count_by_instance("a").await.unwrap(), 1);
        assert_eq!(repo.count_by_instance("b").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_touch_and_delete() {
        let db = TestDatabase::new().await.unwrap();
        let streamer = StreamerRepository::new(db.conn())
            .create(NewStreamer::new("alpha", "u"))
            .await
            .unwrap();
        let repo = ProcessRepository::new(db.conn());
        let record = repo.create(ProcessRecord::new(streamer.id, "a", 100)).await.unwrap();

        let later = record.last_activity + chrono::Duration::seconds(30);
        assert_eq!(repo.touch_activity(record.id, later).await.unwrap(), 1);
        let touched = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert!(touched.last_activity > record.last_activity);

        assert_eq!(repo.existing_ids(&[record.id, Uuid::new_v4()]).await.unwrap(), vec![record.id]);

        assert_eq!(repo.delete_by_id(record.id).await.unwrap(), 1);
        assert_eq!(repo.delete_by_id(record.id).await.unwrap(), 0);
        assert_eq!(repo.touch_activity(record.id, later).await.unwrap(), 0);
        assert!(repo.find_by_streamer(streamer.id).await.unwrap().is_none());
    }
}
