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
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::database::DbPool;
use crate::adapters::database::conversation_repo::ConversationRepository;
use crate::adapters::database::directory_repo::DirectoryRepository;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::memory::MemoryStore;
use crate::adapters::store::{ConversationStore, Directory, MessageStore};
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::delivery_service::DeliveryService;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::history_service::HistoryService;
use crate::services::lifecycle_service::LifecycleService;
use crate::services::presence::PresenceRegistry;
use crate::services::projector::ConversationProjector;
use crate::services::timers::LifecycleTimers;
use crate::workers::LifecycleWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Where the stores keep their state.
#[derive(Debug)]
enum Storage {
    Database(DbPool),
    Memory(Arc<MemoryStore>),
}

struct Stores {
    directory: Arc<dyn Directory>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    pool: Option<DbPool>,
}

impl Storage {
    fn into_stores(self) -> Stores {
        match self {
            Self::Database(pool) => Stores {
                directory: Arc::new(DirectoryRepository::new(pool.clone())),
                conversations: Arc::new(ConversationRepository::new(pool.clone())),
                messages: Arc::new(MessageRepository::new(pool.clone())),
                pool: Some(pool),
            },
            Self::Memory(store) => Stores {
                directory: Arc::clone(&store) as Arc<dyn Directory>,
                conversations: Arc::clone(&store) as Arc<dyn ConversationStore>,
                messages: store,
                pool: None,
            },
        }
    }
}

/// Background tasks that run for the life of the server.
#[derive(Debug)]
pub struct Workers {
    lifecycle: LifecycleWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(self.lifecycle.run(shutdown_rx))]
    }
}

/// A fully wired application, ready to be served.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub workers: Workers,
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    storage: Option<Storage>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, storage: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.storage = Some(Storage::Database(pool));
        self
    }

    /// Keeps all state in `store` instead of Postgres.
    #[must_use]
    pub fn with_memory(mut self, store: Arc<MemoryStore>) -> Self {
        self.storage = Some(Storage::Memory(store));
        self
    }

    /// Wires stores, services and workers together.
    ///
    /// # Errors
    /// Returns an error if no storage backend was provided.
    pub fn build(self) -> anyhow::Result<App> {
        let storage = self.storage.ok_or_else(|| anyhow::anyhow!("no storage backend configured"))?;
        let Stores { directory, conversations, messages, pool } = storage.into_stores();
        let config = self.config;

        let presence = PresenceRegistry::new();
        let projector = ConversationProjector::new(Arc::clone(&conversations));

        let (timers, timer_rx) = if config.lifecycle.timers_enabled {
            let (timers, rx) = LifecycleTimers::new(
                config.lifecycle.timer_queue_capacity,
                Duration::from_secs(config.lifecycle.timer_horizon_secs),
            );
            (Some(timers), Some(rx))
        } else {
            (None, None)
        };

        let delivery_service = DeliveryService::new(
            Arc::clone(&directory),
            Arc::clone(&conversations),
            Arc::clone(&messages),
            presence.clone(),
            projector.clone(),
            timers,
            config.messaging.clone(),
        );

        let lifecycle_service = LifecycleService::new(
            Arc::clone(&directory),
            Arc::clone(&messages),
            delivery_service.clone(),
            presence.clone(),
            projector.clone(),
            config.lifecycle.clone(),
        );

        let history_service = HistoryService::new(directory, conversations, messages, projector);
        let gateway_service = GatewayService::new(delivery_service.clone(), presence.clone(), config.websocket.clone());
        let health_service = HealthService::new(pool, config.health.clone());

        Ok(App {
            services: ServiceContainer { delivery_service, history_service, gateway_service, presence },
            health_service,
            workers: Workers { lifecycle: LifecycleWorker::new(lifecycle_service, timer_rx) },
        })
    }
}

/// Applies pending schema migrations.
///
/// # Errors
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

/// Flips the shutdown channel on Ctrl+C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
            () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
            () = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the configured log sink.
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
