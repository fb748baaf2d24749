use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Primary key of the singleton row
pub const SINGLETON_ID: i32 = 1;

/// Global parameters forwarded to every clip-capture child
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "process_config")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    /// Length of each clip in seconds
    pub clip_duration: f64,

    /// Sliding window used for surge detection, in seconds
    pub window_timespan: f64,

    /// Seconds between activity samples
    pub sample_interval: i32,

    /// Seconds of history forming the activity baseline
    pub baseline_duration: i32,

    /// Ratio over baseline that counts as a surge
    pub surge_threshold: f64,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub const DEFAULT_CLIP_DURATION: f64 = 30.0;
    pub const DEFAULT_WINDOW_TIMESPAN: f64 = 10.0;
    pub const DEFAULT_SAMPLE_INTERVAL: i32 = 5;
    pub const DEFAULT_BASELINE_DURATION: i32 = 300;
    pub const DEFAULT_SURGE_THRESHOLD: f64 = 1.5;

    /// The row seeded by migrations
    pub fn with_defaults() -> Self {
        Self {
            id: SINGLETON_ID,
            clip_duration: Self::DEFAULT_CLIP_DURATION,
            window_timespan: Self::DEFAULT_WINDOW_TIMESPAN,
            sample_interval: Self::DEFAULT_SAMPLE_INTERVAL,
            baseline_duration: Self::DEFAULT_BASELINE_DURATION,
            surge_threshold: Self::DEFAULT_SURGE_THRESHOLD,
            updated_at: chrono::Utc::now(),
        }
    }
}
