//! Authentication DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::User;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "请提供用户名和密码"))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "请提供用户名和密码"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "需要提供令牌"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 50, message = "用户名长度需在1到50个字符之间"))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "密码至少6个字符"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "请提供当前密码和新密码"))]
    pub current_password: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "请提供当前密码和新密码"))]
    pub new_password: String,
}

/// Public part of a user, as carried in tokens
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: i32,
    pub username: String,
    pub role: String,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role.as_str().to_string(),
        }
    }
}

/// Profile returned by `/api/auth/me`; never contains the password hash
#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            role: user.role.as_str().to_string(),
            username: user.username,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
    pub user: UserInfo,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl TokenResponse {
    pub fn new(token: String, user: &User) -> Self {
        Self {
            success: true,
            token,
            user: UserInfo::from(user),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    pub success: bool,
    pub message: String,
    pub user: UserInfo,
}
