use crate::entities::{process_config, ProcessConfig, ProcessConfigs, SINGLETON_ID};
use crate::error::{StorageError, StorageResult};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait, EntityTrait};
use serde::{Deserialize, Serialize};

/// Partial update of the process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessConfigUpdate {
    pub clip_duration: Option<f64>,
    pub window_timespan: Option<f64>,
    pub sample_interval: Option<i32>,
    pub baseline_duration: Option<i32>,
    pub surge_threshold: Option<f64>,
}

/// Repository for the singleton process configuration row
pub struct ProcessConfigRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> ProcessConfigRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Current configuration; a missing row is fatal
    pub async fn get(&self) -> StorageResult<ProcessConfig> {
        ProcessConfigs::find_by_id(SINGLETON_ID)
            .one(self.db)
            .await?
            .ok_or(StorageError::MissingProcessConfig)
    }

    /// Seed the default row when absent and return the current row
    pub async fn ensure(&self) -> StorageResult<ProcessConfig> {
        if let Some(existing) = ProcessConfigs::find_by_id(SINGLETON_ID).one(self.db).await? {
            return Ok(existing);
        }

        tracing::warn!("Process configuration row missing, seeding defaults");
        let defaults = ProcessConfig::with_defaults();
        let model = process_config::ActiveModel {
            id: Set(defaults.id),
            clip_duration: Set(defaults.clip_duration),
            window_timespan: Set(defaults.window_timespan),
            sample_interval: Set(defaults.sample_interval),
            baseline_duration: Set(defaults.baseline_duration),
            surge_threshold: Set(defaults.surge_threshold),
            updated_at: Set(defaults.updated_at),
        };
        Ok(model.insert(self.db).await?)
    }

    /// Apply the given changes and stamp `updated_at`
    pub async fn update(&self, changes: ProcessConfigUpdate) -> StorageResult<ProcessConfig> {
        let mut model: process_config::ActiveModel = self.get().await?.into();

        if let Some(value) = changes.clip_duration {
            model.clip_duration = Set(value);
        }
        if let Some(value) = changes.window_timespan {
            model.window_timespan = Set(value);
        }
        if let Some(value) = changes.sample_interval {
            model.sample_interval = Set(value);
        }
        if let Some(value) = changes.baseline_duration {
            model.baseline_duration = Set(value);
        }
        if let Some(value) = changes.surge_threshold {
            model.surge_threshold = Set(value);
        }
        model.updated_at = Set(Utc::now());

        Ok(model.update(self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestDatabase;

    #[tokio::test]
    async fn test_seeded_defaults() {
        let db = TestDatabase::new().await.unwrap();
        let config = ProcessConfigRepository::new(db.conn()).get().await.unwrap();

        assert_eq!(config.id, SINGLETON_ID);
        assert_eq!(config.clip_duration, 30.0);
        assert_eq!(config.window_timespan, 10.0);
        assert_eq!(config.sample_interval, 5);
        assert_eq!(config.baseline_duration, 300);
        assert_eq!(config.surge_threshold, 1.5);
    }

    #[tokio::test]
    async fn test_update_stamps_updated_at() {
        let db = TestDatabase::new().await.unwrap();
        let repo = ProcessConfigRepository::new(db.conn());
        let before = repo.get().await.unwrap();

        let updated = repo
            .update(ProcessConfigUpdate {
                clip_duration: Some(45.0),
                surge_threshold: Some(2.0),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.clip_duration, 45.0);
        assert_eq!(updated.surge_threshold, 2.0);
        assert_eq!(updated.sample_interval, before.sample_interval);
        assert!(updated.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn test_missing_row_is_fatal_until_ensured() {
        let db = TestDatabase::new().await.unwrap();
        ProcessConfigs::delete_by_id(SINGLETON_ID).exec(db.conn()).await.unwrap();

        let repo = ProcessConfigRepository::new(db.conn());
        assert!(matches!(repo.get().await, Err(StorageError::MissingProcessConfig)));

        let seeded = repo.ensure().await.unwrap();
        assert_eq!(seeded.clip_duration, ProcessConfig::DEFAULT_CLIP_DURATION);
        assert!(repo.get().await.is_ok());
    }
}
