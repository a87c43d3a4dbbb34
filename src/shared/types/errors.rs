use thiserror::Error;

use crate::infrastructure::crypto::TokenError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DomainError {
    /// Whether the failure originates on the server side (HTTP 5xx).
    pub fn is_server_fault(&self) -> bool {
        match self {
            Self::Database(_) | Self::Configuration(_) => true,
            Self::Token(e) => e.is_server_fault(),
            _ => false,
        }
    }
}

impl From<sea_orm::DbErr> for DomainError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
