use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One live clip-capture child, owned by one instance, bound to one streamer
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stream_clips_processes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// At most one process per streamer
    #[sea_orm(unique)]
    pub streamer_id: Uuid,

    /// Hostname of the owning instance
    pub instance_hostname: String,

    /// OS process id on the owning instance
    pub pid: i32,

    pub created_at: ChronoDateTimeUtc,

    /// Refreshed on every line of child output
    pub last_activity: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::streamers::Entity",
        from = "Column::StreamerId",
        to = "super::streamers::Column::Id",
        on_delete = "Cascade"
    )]
    Streamer,
}

impl Related<super::streamers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Streamer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Build a fresh record for a just-spawned child
    pub fn new(streamer_id: Uuid, instance_hostname: impl Into<String>, pid: i32) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            streamer_id,
            instance_hostname: instance_hostname.into(),
            pid,
            created_at: now,
            last_activity: now,
        }
    }

    /// Whether no output was seen since `cutoff`
    pub fn is_inactive_since(&self, cutoff: chrono::DateTime<chrono::Utc>) -> bool {
        self.last_activity < cutoff
    }
}
