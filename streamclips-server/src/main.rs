//! Streamclips fleet instance binary

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use streamclips_config::{ConfigLoader, StreamclipsConfig};
use streamclips_logging::init_logging;
use streamclips_server::Server;
use streamclips_storage::DatabaseConnection;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "STREAMCLIPS_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run this instance until SIGINT/SIGTERM (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Print the effective configuration
    PrintConfig {
        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
    /// Print a sample configuration file with every default spelled out
    SampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let load = || ConfigLoader::new().load(cli.config.as_ref());

    match cli.command.unwrap_or(Command::Serve) {
        Command::SampleConfig => {
            print!("{}", StreamclipsConfig::generate_sample());
            Ok(())
        }
        Command::PrintConfig { json } => {
            let config = load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{}", serde_yaml::to_string(&config)?);
            }
            Ok(())
        }
        Command::Migrate => {
            let config = load()?;
            init_logging(&config.logging)?;
            migrate(config).await
        }
        Command::Serve => {
            let config = load()?;
            init_logging(&config.logging)?;
            let server = Server::new(config).await?;
            server.run().await
        }
    }
}

async fn migrate(config: StreamclipsConfig) -> Result<()> {
    let db = DatabaseConnection::new(config.database).await?;
    db.migrate().await?;
    tracing::info!("Migrations applied");
    db.close().await?;
    Ok(())
}
