use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A fleet member, identified by hostname, refreshed every scheduler tick
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "instances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub hostname: String,

    /// Maximum number of concurrently supervised processes
    pub max_processes: i32,

    pub created_at: ChronoDateTimeUtc,

    pub last_heartbeat: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the last heartbeat is older than `cutoff`
    pub fn is_dead_at(&self, cutoff: chrono::DateTime<chrono::Utc>) -> bool {
        self.last_heartbeat < cutoff
    }
}
