use super::ProcessConfig;
use crate::entities::process_config;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let defaults = process_config::Model::with_defaults();

        manager
            .exec_stmt(
                Query::insert()
                    .into_table(ProcessConfig::Table)
                    .columns([
                        ProcessConfig::Id,
                        ProcessConfig::ClipDuration,
                        ProcessConfig::WindowTimespan,
                        ProcessConfig::SampleInterval,
                        ProcessConfig::BaselineDuration,
                        ProcessConfig::SurgeThreshold,
                        ProcessConfig::UpdatedAt,
                    ])
                    .values_panic([
                        defaults.id.into(),
                        defaults.clip_duration.into(),
                        defaults.window_timespan.into(),
                        defaults.sample_interval.into(),
                        defaults.baseline_duration.into(),
                        defaults.surge_threshold.into(),
                        defaults.updated_at.into(),
                    ])
                    .on_conflict(OnConflict::column(ProcessConfig::Id).do_nothing().to_owned())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .exec_stmt(
                Query::delete()
                    .from_table(ProcessConfig::Table)
                    .and_where(Expr::col(ProcessConfig::Id).eq(process_config::SINGLETON_ID))
                    .to_owned(),
            )
            .await
    }
}
