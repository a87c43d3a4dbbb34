//! Authentication service: application-layer orchestration
//!
//! HTTP handlers are thin wrappers that delegate to [`AuthService`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{CreateUserDto, User, UserRepositoryInterface, UserRole};
use crate::infrastructure::crypto::jwt::{
    create_token, verify_token, verify_token_ignoring_expiry, JwtConfig, TokenClaims,
};
use crate::infrastructure::crypto::password::{hash_password, verify_password};
use crate::shared::{DomainError, DomainResult};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;
/// Maximum accepted username length.
pub const MAX_USERNAME_LEN: usize = 50;

/// A freshly issued token together with its subject.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub token: String,
    pub user: User,
}

/// Auth service: credential checks, token issuing and refresh.
///
/// Generic over `R: UserRepositoryInterface` so it stays decoupled from
/// the concrete persistence layer.
pub struct AuthService<R: UserRepositoryInterface> {
    repo: Arc<R>,
    jwt_config: JwtConfig,
    bcrypt_cost: u32,
}

impl<R: UserRepositoryInterface> AuthService<R> {
    pub fn new(repo: Arc<R>, jwt_config: JwtConfig, bcrypt_cost: u32) -> Self {
        Self {
            repo,
            jwt_config,
            bcrypt_cost,
        }
    }

    pub fn jwt_config(&self) -> &JwtConfig {
        &self.jwt_config
    }

    // ── Token issuing ───────────────────────────────────────────

    /// Sign a token for `user` with the configured TTL.
    pub fn issue_token(&self, user: &User) -> DomainResult<String> {
        let token = create_token(user.id, &user.username, user.role.as_str(), &self.jwt_config)?;
        debug!(
            user_id = user.id,
            ttl_secs = self.jwt_config.ttl_secs(),
            "Issued token"
        );
        Ok(token)
    }

    // ── Authentication ──────────────────────────────────────────

    /// Check username + password and return a token.
    pub async fn login(&self, username: &str, password: &str) -> DomainResult<AuthResult> {
        if username.is_empty() || password.is_empty() {
            return Err(DomainError::Validation("请提供用户名和密码".into()));
        }

        let Some(user) = self.repo.get_user_by_username(username).await? else {
            warn!(username = %username, "Login failed: unknown user");
            return Err(DomainError::Unauthorized("用户名或密码错误".into()));
        };

        if !verify_password(password, &user.password_hash) {
            warn!(username = %username, "Login failed: wrong password");
            return Err(DomainError::Unauthorized("用户名或密码错误".into()));
        }

        let token = self.issue_token(&user)?;
        info!(user_id = user.id, username = %user.username, "User logged in");

        Ok(AuthResult { token, user })
    }

    /// Verify a token's signature and expiry.
    pub fn verify(&self, token: &str) -> DomainResult<TokenClaims> {
        Ok(verify_token(token, &self.jwt_config)?)
    }

    /// Exchange a possibly expired token for a new one.
    ///
    /// The signature must still be valid; expiry is deliberately ignored.
    /// Fails with `NotFound` when the subject was deleted after issuance.
    pub async fn refresh(&self, token: &str) -> DomainResult<AuthResult> {
        if token.is_empty() {
            return Err(DomainError::Validation("需要提供令牌".into()));
        }

        let claims = match verify_token_ignoring_expiry(token, &self.jwt_config) {
            Ok(claims) => claims,
            Err(e) if e.is_server_fault() => {
                warn!("Token refresh failed: {}", e);
                return Err(e.into());
            }
            Err(e) => {
                warn!("Token refresh rejected: {}", e);
                return Err(DomainError::Unauthorized("无效的令牌".into()));
            }
        };
        debug!(user_id = claims.id, "Refreshing token");

        let Some(user) = self.repo.get_user_by_id(claims.id).await? else {
            warn!(user_id = claims.id, "Token refresh failed: user no longer exists");
            return Err(DomainError::NotFound("用户不存在或已被删除".into()));
        };

        let token = self.issue_token(&user)?;
        info!(user_id = user.id, username = %user.username, "Token refreshed");

        Ok(AuthResult { token, user })
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Load the user behind verified claims.
    pub async fn current_user(&self, user_id: i32) -> DomainResult<User> {
        self.repo
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("用户不存在".into()))
    }

    // ── Administration ──────────────────────────────────────────

    /// Create another administrator and sign a token for it.
    pub async fn register_admin(&self, username: &str, password: &str) -> DomainResult<AuthResult> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DomainError::Validation("请提供用户名".into()));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(DomainError::Validation("用户名不能超过50个字符".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::Validation("密码至少6个字符".into()));
        }

        if self.repo.get_user_by_username(username).await?.is_some() {
            return Err(DomainError::Conflict("用户名已存在".into()));
        }

        let user = self.create_user(username, password, UserRole::Admin).await?;
        let token = self.issue_token(&user)?;
        info!(user_id = user.id, username = %user.username, "Administrator created");

        Ok(AuthResult { token, user })
    }

    /// Replace a user's password after checking the current one.
    pub async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
    ) -> DomainResult<()> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(DomainError::Validation("请提供当前密码和新密码".into()));
        }
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::Validation("新密码至少需要6个字符".into()));
        }

        let user = self.current_user(user_id).await?;

        if !verify_password(current_password, &user.password_hash) {
            warn!(user_id, "Password change rejected: wrong current password");
            return Err(DomainError::Unauthorized("当前密码不正确".into()));
        }

        let new_hash = self.hash(new_password)?;
        self.repo.update_user_password(user_id, &new_hash).await?;
        info!(user_id, "Password changed");

        Ok(())
    }

    /// Seed the first administrator when the users table is empty.
    ///
    /// Returns the created user, or `None` when users already exist.
    pub async fn ensure_default_admin(
        &self,
        username: &str,
        password: &str,
    ) -> DomainResult<Option<User>> {
        if self.repo.count_users().await? > 0 {
            return Ok(None);
        }

        info!("Creating default admin user...");
        let user = self.create_user(username, password, UserRole::Admin).await?;
        info!(username = %user.username, "Default admin created");
        warn!("Please change the default admin password immediately!");

        Ok(Some(user))
    }

    async fn create_user(&self, username: &str, password: &str, role: UserRole) -> DomainResult<User> {
        let password_hash = self.hash(password)?;
        self.repo
            .create_user(CreateUserDto {
                username: username.to_string(),
                password_hash,
                role,
            })
            .await
    }

    fn hash(&self, password: &str) -> DomainResult<String> {
        hash_password(password, self.bcrypt_cost)
            .map_err(|e| DomainError::Configuration(format!("Failed to hash password: {}", e)))
    }
}
