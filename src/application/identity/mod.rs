//! Identity module: authentication and administrator management
//!
//! Contains the `AuthService` which orchestrates login, token
//! verification, token refresh, password changes and admin seeding.

pub mod service;

pub use service::{AuthResult, AuthService, MAX_USERNAME_LEN, MIN_PASSWORD_LEN};
