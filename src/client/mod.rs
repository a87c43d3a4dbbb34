//! Rust client for the CMS API
//!
//! - `api_client`: reqwest-based client with transparent token refresh
//! - `single_flight`: shared execution of concurrent identical work
//! - `token_store`: where the bearer token lives between requests

pub mod api_client;
pub mod single_flight;
pub mod token_store;

pub use api_client::{ApiClient, ApiClientBuilder, ClientError, SessionUser, DEFAULT_TIMEOUT};
pub use single_flight::SingleFlight;
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
