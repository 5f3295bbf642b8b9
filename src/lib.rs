#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::database::DbPool;
use crate::adapters::store::{MemoryMessageStore, MessageStore, PgMessageStore};
use crate::api::ServiceContainer;
use crate::config::{Config, DatabaseConfig, IngestConfig};
use crate::services::conversation_service::ConversationService;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::ingest_service::{ImportSummary, IngestService};
use crate::services::message_service::MessageService;
use crate::services::realtime_service::RealtimeService;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use tokio::sync::watch;

/// Wired application components, ready to be mounted on routers.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
}

impl App {
    /// Runs the startup batch import when enabled.
    ///
    /// Callers await this before binding any listener so the first request sees the seeded data.
    pub async fn seed(&self, config: &IngestConfig) -> Option<ImportSummary> {
        if !config.import_on_start {
            return None;
        }
        Some(self.services.ingest_service.import_dir(&config.payload_dir).await)
    }
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn MessageStore>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, store: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wires every service around one store and one real-time channel.
    ///
    /// # Errors
    /// Returns an error if no store was provided.
    pub fn build(self) -> anyhow::Result<App> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("Message store is required"))?;
        let realtime = RealtimeService::new(&self.config.realtime);

        let services = ServiceContainer {
            ingest_service: IngestService::new(Arc::clone(&store), realtime.clone()),
            conversation_service: ConversationService::new(Arc::clone(&store)),
            message_service: MessageService::new(Arc::clone(&store), realtime.clone()),
            gateway_service: GatewayService::new(realtime, self.config.realtime.clone()),
        };
        let health_service = HealthService::new(store, self.config.health.clone());

        Ok(App { services, health_service })
    }
}

/// Opens the configured message store.
///
/// With a database URL the pool is opened with retries and migrated. Without one
/// messages live in memory for the lifetime of the process.
///
/// # Errors
/// Returns an error if the database stays unreachable or migrations fail.
pub async fn init_store(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn MessageStore>> {
    let Some(url) = config.url.as_deref() else {
        tracing::warn!("No database URL configured, messages are kept in memory only");
        return Ok(Arc::new(MemoryMessageStore::new()));
    };

    let retry_strategy = ExponentialBuilder::default().with_max_times(config.connect_attempts);
    let pool = (|| adapters::database::init_pool(url, config))
        .retry(retry_strategy)
        .notify(|e, duration| {
            tracing::warn!(error = %e, retry_in = ?duration, "Database unavailable, retrying");
        })
        .await?;

    run_migrations(&pool).await?;
    tracing::info!("Connected to Postgres message store");
    Ok(Arc::new(PgMessageStore::new(pool)))
}

/// Applies the embedded schema migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

/// Flips the shutdown channel on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through `tracing` so they reach the configured log sinks.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(panic.location = %location, panic.payload = %payload, "Panic occurred");
    }));
}
