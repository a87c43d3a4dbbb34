//! AIQIJI CMS - authentication API server
//!
//! ```sh
//! # Run with default config (~/.config/aiqiji-cms/config.toml)
//! JWT_SECRET=change-me aiqiji-cms
//!
//! # Custom config path and port
//! aiqiji-cms --config /etc/aiqiji-cms/config.toml --port 8080
//!
//! # Validate config without starting
//! aiqiji-cms --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use aiqiji_cms::config::{AppConfig, CONFIG_PATH_ENV};
use aiqiji_cms::server::{init_tracing, ServerHandle, ServerOptions};

/// AIQIJI CMS authentication server.
#[derive(Parser, Debug)]
#[command(
    name = "aiqiji-cms",
    version,
    about = "Authentication API for the AIQIJI marketing site CMS",
    long_about = "JWT login, verification and token refresh for the AIQIJI CMS.\n\n\
                  Default config: ~/.config/aiqiji-cms/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,

    /// Skip creating the default admin user.
    #[arg(long)]
    no_admin: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(aiqiji_cms::default_config_path);
    let mut config = AppConfig::load(&config_path)?;

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_tracing(&config);
    info!("Configuration loaded from {}", config_path.display());

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        config.validate()?;
        println!("Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   API address : {}", config.server.address());
        println!(
            "   Database    : {}",
            aiqiji_cms::infrastructure::database::redact_url(&config.database.url)
        );
        println!("   Token TTL   : {}", config.security.jwt_expire);
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
        create_default_admin: !cli.no_admin,
    })
    .await?;

    handle.install_signal_handler();
    info!("Press Ctrl+C to shutdown gracefully.");

    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
