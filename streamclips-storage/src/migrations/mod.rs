use sea_orm_migration::prelude::*;

mod m20250301_000001_create_fleet_tables;
mod m20250301_000002_create_indexes;
mod m20250301_000003_seed_process_config;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_fleet_tables::Migration),
            Box::new(m20250301_000002_create_indexes::Migration),
            Box::new(m20250301_000003_seed_process_config::Migration),
        ]
    }
}

#[derive(DeriveIden)]
pub(crate) enum Instances {
    Table,
    Hostname,
    MaxProcesses,
    CreatedAt,
    LastHeartbeat,
}

#[derive(DeriveIden)]
pub(crate) enum Streamers {
    Table,
    Id,
    Name,
    Url,
    IsActive,
    LastProcessedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum StreamClipsProcesses {
    Table,
    Id,
    StreamerId,
    InstanceHostname,
    Pid,
    CreatedAt,
    LastActivity,
}

#[derive(DeriveIden)]
pub(crate) enum ProcessConfig {
    Table,
    Id,
    ClipDuration,
    WindowTimespan,
    SampleInterval,
    BaselineDuration,
    SurgeThreshold,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Logs {
    Table,
    Id,
    CreatedAt,
    Source,
    Level,
    Message,
}
