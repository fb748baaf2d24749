//! Server startup and shutdown logic

use crate::registry::InstanceRegistry;
use crate::scheduler::Scheduler;
use crate::services::ServiceContainer;
use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use streamclips_config::StreamclipsConfig;
use streamclips_storage::{DatabaseConnection, ProcessConfigRepository};
use streamclips_supervisor::ProcessSupervisor;

/// Time allowed past the termination grace period for children to be reaped
const EXIT_MARGIN: Duration = Duration::from_secs(5);

/// One fleet instance: database, supervisor, scheduler and services
pub struct Server {
    config: StreamclipsConfig,
    db: DatabaseConnection,
    supervisor: ProcessSupervisor,
    services: ServiceContainer,
    scheduler: Scheduler,
}

impl Server {
    /// Connect, migrate, bootstrap the configuration row and register this instance
    pub async fn new(config: StreamclipsConfig) -> Result<Self> {
        let db = DatabaseConnection::new(config.database.clone())
            .await
            .context("Failed to connect to database")?;

        if config.database.run_migrations {
            db.migrate().await.context("Failed to run migrations")?;
        }

        let params = ProcessConfigRepository::new(db.get_connection())
            .ensure()
            .await
            .context("Failed to bootstrap process configuration")?;
        tracing::debug!("Process configuration: {:?}", params);

        let hostname = config.instance.hostname.clone();
        let supervisor = ProcessSupervisor::new(db.clone(), hostname.clone(), config.supervisor.clone());

        InstanceRegistry::new()
            .register_or_heartbeat(db.get_connection(), &hostname, config.instance.max_processes)
            .await
            .context("Failed to register instance")?;

        let services = ServiceContainer::new(db.clone(), supervisor.clone());
        let scheduler = Scheduler::new(
            db.clone(),
            config.instance.clone(),
            config.scheduler.clone(),
            supervisor.clone(),
        );

        Ok(Self {
            config,
            db,
            supervisor,
            services,
            scheduler,
        })
    }

    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the scheduler until `shutdown`, then stop this instance's processes
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.log_config_summary();

        if self.config.scheduler.enabled {
            self.scheduler.run_until(shutdown).await;
        } else {
            tracing::warn!("Scheduler disabled, this instance will not claim work");
            shutdown.await;
        }

        let hostname = self.config.instance.hostname.as_str();
        match self.supervisor.stop_for_instance(hostname).await {
            Ok(stopped) => tracing::info!("Stopped {} processes of {}", stopped, hostname),
            Err(e) => tracing::error!("Failed to stop processes of {}: {}", hostname, e),
        }

        // SIGKILL watchdogs die with the runtime, so outwait them
        let grace = self.config.supervisor.termination_grace_period.unwrap_or_default();
        let running = self.supervisor.wait_for_exit(grace + EXIT_MARGIN).await;
        if running > 0 {
            tracing::warn!("{} child processes still running at shutdown", running);
        }

        self.db.close().await.context("Failed to close database")?;
        tracing::info!("Shutdown complete");
        Ok(())
    }

    fn log_config_summary(&self) {
        tracing::info!("=== Streamclips Instance ===");
        tracing::info!("Hostname: {}", self.config.instance.hostname);
        tracing::info!("Max processes: {}", self.config.instance.max_processes);
        tracing::info!("Tick interval: {:?}", self.config.scheduler.tick_interval);
        tracing::info!("Claim cooldown: {:?}", self.config.scheduler.claim_cooldown);
        tracing::info!("Clips program: {}", self.config.supervisor.program);
        tracing::info!(
            "Hang probe: {}",
            if self.config.supervisor.hang_probe.enabled { "Enabled" } else { "Disabled" }
        );
        tracing::info!("============================");
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
