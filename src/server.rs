//! Reusable server runtime.
//!
//! [`ServerHandle`] owns the full lifecycle: database init, migrations,
//! default admin seeding, the REST API, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::AuthService;
use crate::config::{AppConfig, ConfigError, LogFormat};
use crate::infrastructure::database::migrator::Migrator;
use crate::infrastructure::database::redact_url;
use crate::shared::{DomainError, ShutdownSignal};
use crate::{create_api_router, init_database, UserRepository};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the server.
pub struct ServerOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Run database migrations on startup (default: true).
    pub auto_migrate: bool,
    /// Create the default admin user if the users table is empty (default: true).
    pub create_default_admin: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: true,
            create_default_admin: true,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running server.
pub struct ServerHandle {
    /// The configuration the server was started with.
    pub config: AppConfig,
    /// Address the API is listening on.
    pub api_addr: SocketAddr,

    db: DatabaseConnection,
    shutdown: ShutdownSignal,
    api_task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Validate the config, prepare the database and start serving.
    pub async fn start(opts: ServerOptions) -> Result<Self, ServerError> {
        let config = opts.config;
        config.validate()?;

        info!("Starting AIQIJI CMS...");

        let jwt_config = config.jwt_config()?;
        info!(
            "JWT configured with {} token lifetime ({}s)",
            config.security.jwt_expire,
            jwt_config.ttl_secs()
        );

        let db_config = config.database_config();
        info!("Database: {}", redact_url(&db_config.url));
        let db = init_database(&db_config).await?;

        if opts.auto_migrate {
            info!("Running database migrations...");
            Migrator::up(&db, None).await?;
            info!("Migrations completed");
        }

        let repo = Arc::new(UserRepository::new(db.clone()));
        let service = Arc::new(AuthService::new(
            repo,
            jwt_config,
            config.security.bcrypt_cost,
        ));

        if opts.create_default_admin {
            service
                .ensure_default_admin(&config.admin.username, &config.admin.password)
                .await?;
        }

        let router = create_api_router(service, db.clone());

        let addr = config.server.address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let api_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        info!("REST API listening on http://{}", api_addr);
        info!("Swagger UI available at http://{}/docs", api_addr);

        let shutdown = ShutdownSignal::new();
        let api_shutdown = shutdown.clone();
        let api_task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { api_shutdown.wait().await })
                .await;
            if let Err(e) = result {
                error!("REST API server error: {}", e);
            }
        });

        Ok(Self {
            config,
            api_addr,
            db,
            shutdown,
            api_task,
        })
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Trigger shutdown on SIGINT / SIGTERM.
    pub fn install_signal_handler(&self) {
        self.shutdown.listen_for_os_signals();
    }

    /// Request shutdown and wait for it to finish.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        self.wait().await;
    }

    /// Wait for the API to drain after shutdown was triggered, then close
    /// the database.
    pub async fn wait(self) {
        let timeout = Duration::from_secs(self.config.server.shutdown_timeout);
        match tokio::time::timeout(timeout, self.api_task).await {
            Ok(Ok(())) => info!("REST API stopped"),
            Ok(Err(e)) => error!("REST API task failed: {}", e),
            Err(_) => warn!(
                "REST API did not stop within {}s, abandoning in-flight requests",
                timeout.as_secs()
            ),
        }

        if let Err(e) = self.db.close().await {
            warn!("Failed to close database: {}", e);
        }
        info!("Shutdown complete");
    }
}

/// Initialize tracing (logging) from the application config.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
