use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A monitored stream; the unit of work claimed by fleet members
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "streamers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name; also names the output directory and log source
    pub name: String,

    /// Stream URL passed to the clip-capture program
    pub url: String,

    /// Inactive streamers are never claimed
    pub is_active: bool,

    /// Set whenever a process for this streamer stops; starts the claim cooldown
    pub last_processed_at: Option<ChronoDateTimeUtc>,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::stream_clips_processes::Entity")]
    Process,
}

impl Related<super::stream_clips_processes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Process.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Source tag used for log entries of this streamer's process
    pub fn log_source(&self) -> String {
        format!("streamclips-{}", self.name)
    }
}
