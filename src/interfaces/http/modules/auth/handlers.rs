//! Authentication API handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};

use super::dto::{
    ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest, TokenResponse,
    UserInfo, UserProfile, VerifyResponse,
};
use crate::application::AuthService;
use crate::infrastructure::database::UserRepository;
use crate::interfaces::http::common::validated_json::ValidatedJsonRejection;
use crate::interfaces::http::common::{ApiError, ApiResponse, ValidatedJson};
use crate::interfaces::http::middleware::AuthenticatedUser;

/// Auth state
#[derive(Clone)]
pub struct AuthHandlerState {
    pub service: Arc<AuthService<UserRepository>>,
}

/// A missing or unparsable body reads the same as empty fields.
fn body_or<T>(
    body: Result<ValidatedJson<T>, ValidatedJsonRejection>,
    missing: &str,
) -> Result<T, ApiError> {
    match body {
        Ok(ValidatedJson(value)) => Ok(value),
        Err(ValidatedJsonRejection::JsonError(_)) => Err(ApiError::bad_request(missing)),
        Err(rejection) => Err(ApiError::bad_request(rejection.message())),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Successful login", body = TokenResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AuthHandlerState>,
    body: Result<ValidatedJson<LoginRequest>, ValidatedJsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = body_or(body, "请提供用户名和密码")?;
    let result = state
        .service
        .login(&request.username, &request.password)
        .await?;

    Ok(Json(TokenResponse::new(result.token, &result.user)))
}

#[utoipa::path(
    get,
    path = "/api/auth/verify",
    tag = "Authentication",
    responses(
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "Missing, malformed or expired token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn verify(Extension(user): Extension<AuthenticatedUser>) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        success: true,
        message: "令牌有效".to_string(),
        user: UserInfo {
            id: user.user_id,
            username: user.username,
            role: user.role,
        },
    })
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed", body = TokenResponse),
        (status = 400, description = "Token missing"),
        (status = 401, description = "Invalid token"),
        (status = 404, description = "User no longer exists"),
        (status = 500, description = "Server misconfiguration")
    )
)]
pub async fn refresh(
    State(state): State<AuthHandlerState>,
    body: Result<ValidatedJson<RefreshRequest>, ValidatedJsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = body_or(body, "需要提供令牌")?;
    let result = state.service.refresh(&request.token).await?;

    Ok(Json(
        TokenResponse::new(result.token, &result.user).with_message("令牌已刷新"),
    ))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user profile", body = ApiResponse<UserProfile>),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(
    State(state): State<AuthHandlerState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    let user = state.service.current_user(user.user_id).await?;
    Ok(Json(ApiResponse::success(UserProfile::from(user))))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Administrator created", body = TokenResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 409, description = "Username already exists")
    ),
    security(("bearer_auth" = []))
)]
pub async fn register(
    State(state): State<AuthHandlerState>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let result = state
        .service
        .register_admin(&request.username, &request.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse::new(result.token, &result.user)),
    ))
}

#[utoipa::path(
    put,
    path = "/api/change-password",
    tag = "Authentication",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Missing or too short password"),
        (status = 401, description = "Current password is wrong"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AuthHandlerState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<ValidatedJson<ChangePasswordRequest>, ValidatedJsonRejection>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let request = body_or(body, "请提供当前密码和新密码")?;
    state
        .service
        .change_password(user.user_id, &request.current_password, &request.new_password)
        .await?;

    Ok(Json(ApiResponse::message("密码修改成功")))
}
