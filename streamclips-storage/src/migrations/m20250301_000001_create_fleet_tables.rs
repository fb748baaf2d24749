use super::{Instances, Logs, ProcessConfig, StreamClipsProcesses, Streamers};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Instances::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Instances::Hostname).string().not_null().primary_key())
                    .col(ColumnDef::new(Instances::MaxProcesses).integer().not_null())
                    .col(ColumnDef::new(Instances::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Instances::LastHeartbeat).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Streamers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Streamers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Streamers::Name).string().not_null())
                    .col(ColumnDef::new(Streamers::Url).string().not_null())
                    .col(ColumnDef::new(Streamers::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(Streamers::LastProcessedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Streamers::CreatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StreamClipsProcesses::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(StreamClipsProcesses::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(StreamClipsProcesses::StreamerId).uuid().not_null())
                    .col(ColumnDef::new(StreamClipsProcesses::InstanceHostname).string().not_null())
                    .col(ColumnDef::new(StreamClipsProcesses::Pid).integer().not_null())
                    .col(
                        ColumnDef::new(StreamClipsProcesses::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StreamClipsProcesses::LastActivity)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stream_clips_processes_streamer_id")
                            .from(StreamClipsProcesses::Table, StreamClipsProcesses::StreamerId)
                            .to(Streamers::Table, Streamers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProcessConfig::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ProcessConfig::Id).integer().not_null().primary_key())
                    .col(ColumnDef::new(ProcessConfig::ClipDuration).double().not_null())
                    .col(ColumnDef::new(ProcessConfig::WindowTimespan).double().not_null())
                    .col(ColumnDef::new(ProcessConfig::SampleInterval).integer().not_null())
                    .col(ColumnDef::new(ProcessConfig::BaselineDuration).integer().not_null())
                    .col(ColumnDef::new(ProcessConfig::SurgeThreshold).double().not_null())
                    .col(ColumnDef::new(ProcessConfig::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Logs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Logs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Logs::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Logs::Source).string().not_null())
                    .col(ColumnDef::new(Logs::Level).string_len(16).not_null())
                    .col(ColumnDef::new(Logs::Message).text().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Logs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProcessConfig::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StreamClipsProcesses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Streamers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Instances::Table).to_owned())
            .await?;
        Ok(())
    }
}
