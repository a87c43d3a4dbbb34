//! JWT token handling
//!
//! Tokens are HS256-signed and carry `{id, username, role, iat, exp}`.
//! Verification runs with zero leeway so that expiry is exact; the refresh
//! flow uses [`verify_token_ignoring_expiry`] and is the only caller that
//! skips the `exp` check.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default token lifetime when `JWT_EXPIRE` is not set.
pub const DEFAULT_TOKEN_TTL: &str = "30d";

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Token time-to-live
    pub ttl: Duration,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    /// Token lifetime in whole seconds.
    pub fn ttl_secs(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)
    }

    fn ensure_secret(&self) -> Result<&[u8], TokenError> {
        if self.secret.trim().is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(self.secret.as_bytes())
    }
}

/// Token verification and signing failures.
///
/// The `Display` strings are the user-facing reasons returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("令牌已过期")]
    Expired,
    #[error("令牌签名无效")]
    InvalidSignature,
    #[error("无效的令牌")]
    Invalid,
    #[error("服务器配置错误")]
    MissingSecret,
    #[error("令牌生成失败: {0}")]
    Signing(String),
}

impl TokenError {
    /// Whether the failure is caused by the server rather than the token.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::MissingSecret | Self::Signing(_))
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::InvalidSignature,
            _ => Self::Invalid,
        }
    }
}

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// User ID
    pub id: i32,
    pub username: String,
    pub role: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl TokenClaims {
    pub fn new(
        id: i32,
        username: &str,
        role: &str,
        issued_at: DateTime<Utc>,
        config: &JwtConfig,
    ) -> Self {
        let iat = issued_at.timestamp();
        Self {
            id,
            username: username.to_string(),
            role: role.to_string(),
            iat,
            exp: iat.saturating_add(config.ttl_secs()),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Create a JWT token issued now.
pub fn create_token(
    id: i32,
    username: &str,
    role: &str,
    config: &JwtConfig,
) -> Result<String, TokenError> {
    create_token_at(id, username, role, Utc::now(), config)
}

/// Create a JWT token with an explicit issue time.
pub fn create_token_at(
    id: i32,
    username: &str,
    role: &str,
    issued_at: DateTime<Utc>,
    config: &JwtConfig,
) -> Result<String, TokenError> {
    let secret = config.ensure_secret()?;
    let claims = TokenClaims::new(id, username, role, issued_at, config);

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| TokenError::Signing(e.to_string()))
}

/// Verify signature and expiry, returning the decoded claims.
pub fn verify_token(token: &str, config: &JwtConfig) -> Result<TokenClaims, TokenError> {
    decode_with(token, config, true)
}

/// Verify the signature only. Used by the refresh flow.
pub fn verify_token_ignoring_expiry(
    token: &str,
    config: &JwtConfig,
) -> Result<TokenClaims, TokenError> {
    decode_with(token, config, false)
}

fn decode_with(token: &str, config: &JwtConfig, check_exp: bool) -> Result<TokenClaims, TokenError> {
    let secret = config.ensure_secret()?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = check_exp;

    let token_data = decode::<TokenClaims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

/// Parse a token lifetime such as `30d`, `12h`, `90m`, `3600` or `7 days`.
///
/// A bare integer is read as seconds.
pub fn parse_ttl(input: &str) -> Option<Duration> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let amount: u64 = digits.parse().ok()?;

    let seconds_per_unit: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            return Some(Duration::from_millis(amount));
        }
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        "y" | "yr" | "yrs" | "year" | "years" => 31_557_600,
        _ => return None,
    };

    amount.checked_mul(seconds_per_unit).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn config() -> JwtConfig {
        JwtConfig::new("test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn test_create_and_verify_token() {
        let config = config();
        let token = create_token(7, "admin", "admin", &config).unwrap();

        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.id, 7);
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(!claims.is_expired());
        assert!(claims.is_admin());
    }

    #[test]
    fn test_expired_token_is_classified_as_expired() {
        let config = config();
        let issued = Utc::now() - ChronoDuration::hours(2);
        let token = create_token_at(1, "admin", "admin", issued, &config).unwrap();

        assert_eq!(verify_token(&token, &config), Err(TokenError::Expired));
    }

    #[test]
    fn test_expired_token_passes_when_ignoring_expiry() {
        let config = config();
        let issued = Utc::now() - ChronoDuration::days(90);
        let token = create_token_at(3, "editor", "admin", issued, &config).unwrap();

        let claims = verify_token_ignoring_expiry(&token, &config).unwrap();
        assert_eq!(claims.id, 3);
        assert!(claims.is_expired());
    }

    #[test]
    fn test_wrong_secret_is_invalid_signature() {
        let token = create_token(1, "admin", "admin", &config()).unwrap();
        let other = JwtConfig::new("another-secret", Duration::from_secs(3600));

        assert_eq!(verify_token(&token, &other), Err(TokenError::InvalidSignature));
        assert_eq!(
            verify_token_ignoring_expiry(&token, &other),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_wrong_secret_wins_over_expiry() {
        let issued = Utc::now() - ChronoDuration::days(2);
        let token = create_token_at(1, "admin", "admin", issued, &config()).unwrap();
        let other = JwtConfig::new("another-secret", Duration::from_secs(3600));

        assert_eq!(verify_token(&token, &other), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let result = verify_token("not-a-jwt", &config());
        assert_eq!(result, Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_empty_secret_is_a_server_fault() {
        let config = JwtConfig::new("  ", Duration::from_secs(60));
        let err = create_token(1, "admin", "admin", &config).unwrap_err();
        assert_eq!(err, TokenError::MissingSecret);
        assert!(err.is_server_fault());
    }

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("30d"), Some(Duration::from_secs(30 * 86_400)));
        assert_eq!(parse_ttl("12h"), Some(Duration::from_secs(12 * 3_600)));
        assert_eq!(parse_ttl("90m"), Some(Duration::from_secs(90 * 60)));
        assert_eq!(parse_ttl("3600"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_ttl("7 days"), Some(Duration::from_secs(7 * 86_400)));
        assert_eq!(parse_ttl("1500ms"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_ttl("1w"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_ttl("d"), None);
        assert_eq!(parse_ttl("10 fortnights"), None);
        assert_eq!(parse_ttl(""), None);
    }
}
