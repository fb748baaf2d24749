pub mod instances;
pub mod logs;
pub mod process_config;
pub mod stream_clips_processes;
pub mod streamers;

pub use instances::{ActiveModel as InstanceActiveModel, Column as InstanceColumn, Entity as Instances, Model as Instance};
pub use logs::{ActiveModel as LogEntryActiveModel, Column as LogEntryColumn, Entity as LogEntries, LogLevel, Model as LogEntry};
pub use process_config::{
    ActiveModel as ProcessConfigActiveModel, Column as ProcessConfigColumn, Entity as ProcessConfigs,
    Model as ProcessConfig, SINGLETON_ID,
};
pub use stream_clips_processes::{
    ActiveModel as ProcessRecordActiveModel, Column as ProcessRecordColumn, Entity as ProcessRecords,
    Model as ProcessRecord,
};
pub use streamers::{ActiveModel as StreamerActiveModel, Column as StreamerColumn, Entity as Streamers, Model as Streamer};
