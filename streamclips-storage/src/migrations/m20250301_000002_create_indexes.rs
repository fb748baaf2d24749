use super::{Logs, StreamClipsProcesses, Streamers};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One process per streamer
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stream_clips_processes_streamer_id")
                    .table(StreamClipsProcesses::Table)
                    .col(StreamClipsProcesses::StreamerId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stream_clips_processes_instance_hostname")
                    .table(StreamClipsProcesses::Table)
                    .col(StreamClipsProcesses::InstanceHostname)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_streamers_claim")
                    .table(Streamers::Table)
                    .col(Streamers::IsActive)
                    .col(Streamers::LastProcessedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_logs_created_at")
                    .table(Logs::Table)
                    .col(Logs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_logs_source")
                    .table(Logs::Table)
                    .col(Logs::Source)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_logs_source").table(Logs::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_logs_created_at").table(Logs::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_streamers_claim").table(Streamers::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_stream_clips_processes_instance_hostname")
                    .table(StreamClipsProcesses::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_stream_clips_processes_streamer_id")
                    .table(StreamClipsProcesses::Table)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
