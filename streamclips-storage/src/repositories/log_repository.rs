use crate::entities::{logs, LogEntries, LogEntry, LogLevel};
use crate::error::StorageResult;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filters and pagination for log listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogQuery {
    pub source: Option<String>,
    pub level: Option<LogLevel>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    100
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            source: None,
            level: None,
            offset: 0,
            limit: default_limit(),
        }
    }
}

/// Repository for the append-only log
pub struct LogRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> LogRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn append(&self, source: &str, level: LogLevel, message: &str) -> StorageResult<LogEntry> {
        let model = logs::ActiveModel {
            id: Set(Uuid::new_v4()),
            created_at: Set(Utc::now()),
            source: Set(source.to_string()),
            level: Set(level),
            message: Set(message.to_string()),
        };
        Ok(model.insert(self.db).await?)
    }

    /// Newest entries first
    pub async fn list(&self, query: &LogQuery) -> StorageResult<Vec<LogEntry>> {
        let mut select = LogEntries::find();
        if let Some(source) = &query.source {
            select = select.filter(logs::Column::Source.eq(source.as_str()));
        }
        if let Some(level) = query.level {
            select = select.filter(logs::Column::Level.eq(level));
        }

        Ok(select
            .order_by_desc(logs::Column::CreatedAt)
            .offset(query.offset)
            .limit(query.limit)
            .all(self.db)
            .await?)
    }

    /// Remove every entry
    pub async fn clear(&self) -> StorageResult<u64> {
        Ok(LogEntries::delete_many().exec(self.db).await?.rows_affected)
    }

    /// Remove entries older than `cutoff`
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let result = LogEntries::delete_many()
            .filter(logs::Column::CreatedAt.lt(cutoff))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
