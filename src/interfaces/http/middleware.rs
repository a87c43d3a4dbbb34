//! Authentication middleware for Axum
//!
//! Requests to protected routes must carry `Authorization: Bearer <token>`.
//! The decoded claims are stored in the request extensions as
//! [`AuthenticatedUser`].

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, warn};

use super::common::ApiError;
use crate::infrastructure::crypto::jwt::{verify_token, JwtConfig, TokenClaims, TokenError};

const BEARER_PREFIX: &str = "Bearer ";

/// Reasons a protected request is turned away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("认证失败: 未提供认证头信息")]
    MissingHeader,
    #[error("认证失败: Authorization格式不正确，应为Bearer格式")]
    InvalidScheme,
    #[error("认证失败: 令牌为空")]
    EmptyToken,
    #[error("认证失败: {0}")]
    Token(#[from] TokenError),
    #[error("权限不足")]
    InsufficientPermissions,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientPermissions => ApiError::forbidden(err.to_string()),
            AuthError::Token(ref e) if e.is_server_fault() => ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
            ),
            _ => ApiError::unauthorized(err.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Authentication state for the middleware
#[derive(Clone)]
pub struct AuthState {
    pub jwt_config: JwtConfig,
}

/// Authenticated user information taken from the token claims
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: i32,
    pub username: String,
    pub role: String,
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.id,
            username: claims.username,
            role: claims.role,
            expires_at: claims.exp,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// The `Authorization` header as text. A value with bytes outside visible
/// ASCII is present but malformed.
pub fn authorization_header(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .map(|h| h.to_str().map_err(|_| AuthError::InvalidScheme))
        .transpose()
}

/// Pull the token out of an `Authorization` header value.
pub fn extract_bearer(auth_header: Option<&str>) -> Result<&str, AuthError> {
    let header = auth_header.ok_or(AuthError::MissingHeader)?;
    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::InvalidScheme)?;

    // "Bearer a b" carries the token in the first word only.
    match token.split(' ').next() {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(AuthError::EmptyToken),
    }
}

/// Header extraction + signature/expiry check.
pub fn authenticate(
    auth_header: Option<&str>,
    jwt_config: &JwtConfig,
) -> Result<AuthenticatedUser, AuthError> {
    let token = extract_bearer(auth_header)?;
    let claims = verify_token(token, jwt_config)?;
    Ok(AuthenticatedUser::from_claims(claims))
}

/// JWT authentication middleware - requires a valid, unexpired token
pub async fn auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let result = authorization_header(request.headers())
        .and_then(|auth_header| authenticate(auth_header, &auth_state.jwt_config));

    match result {
        Ok(user) => {
            debug!(
                user_id = user.user_id,
                username = %user.username,
                path = %request.uri().path(),
                "Request authenticated"
            );
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "Authentication rejected: {}",
                e
            );
            e.into_response()
        }
    }
}

/// Admin-only middleware - must be layered inside `auth_middleware`
pub async fn admin_middleware(request: Request<Body>, next: Next) -> Response {
    match request.extensions().get::<AuthenticatedUser>() {
        Some(user) if user.is_admin() => next.run(request).await,
        Some(_) => AuthError::InsufficientPermissions.into_response(),
        None => AuthError::MissingHeader.into_response(),
    }
}
