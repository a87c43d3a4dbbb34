//! # AIQIJI CMS
//!
//! Authentication service of the AIQIJI marketing site CMS: bcrypt
//! credentials, JWT issuing and verification, token refresh, and a Rust
//! client that refreshes expired sessions transparently.
//!
//! ## Architecture
//!
//! - **domain**: User entity and repository contract
//! - **application**: Authentication use cases (`AuthService`)
//! - **infrastructure**: Database (SeaORM), JWT and bcrypt
//! - **interfaces**: REST API with Swagger documentation
//! - **client**: HTTP client with single-flight token refresh
//! - **shared**: Error types and shutdown signalling

pub mod application;
pub mod client;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig, ConfigError};

// Re-export database types for easy access
pub use infrastructure::{init_database, DatabaseConfig, UserRepository};

// Re-export API router
pub use interfaces::create_api_router;

pub use application::{AuthResult, AuthService};
pub use client::{ApiClient, ClientError, FileTokenStore, MemoryTokenStore, TokenStore};
