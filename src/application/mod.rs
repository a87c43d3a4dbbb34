//! Application layer - use cases

pub mod identity;

pub use identity::{AuthResult, AuthService};
