//! API Router with Swagger UI

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::application::AuthService;
use crate::infrastructure::database::UserRepository;
use crate::interfaces::http::middleware::{admin_middleware, auth_middleware, AuthState};
use crate::interfaces::http::modules::request_id::request_id_middleware;
use crate::interfaces::http::modules::{auth, health};

/// Security scheme modifier for OpenAPI
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT Bearer token"))
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::verify,
        auth::refresh,
        auth::me,
        auth::register,
        auth::change_password,
    ),
    components(
        schemas(
            health::HealthResponse,
            health::ComponentHealth,
            auth::LoginRequest,
            auth::RefreshRequest,
            auth::RegisterRequest,
            auth::ChangePasswordRequest,
            auth::UserInfo,
            auth::UserProfile,
            auth::TokenResponse,
            auth::VerifyResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Server health check endpoints"),
        (name = "Authentication", description = "Login, token verification and refresh, password change"),
    ),
    info(
        title = "AIQIJI CMS API",
        version = "1.0.0",
        description = "Authentication API of the AIQIJI marketing site CMS"
    )
)]
pub struct ApiDoc;

/// Create the API router with all routes
pub fn create_api_router(
    service: Arc<AuthService<UserRepository>>,
    db: DatabaseConnection,
) -> Router {
    let middleware_state = AuthState {
        jwt_config: service.jwt_config().clone(),
    };
    let auth_state = auth::AuthHandlerState { service };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Auth routes (public)
    let public_routes = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .with_state(auth_state.clone());

    // Auth routes (protected)
    let protected_routes = Router::new()
        .route("/api/auth/verify", get(auth::verify))
        .route("/api/auth/me", get(auth::me))
        .route("/api/change-password", put(auth::change_password))
        .route_layer(middleware::from_fn_with_state(
            middleware_state.clone(),
            auth_middleware,
        ))
        .with_state(auth_state.clone());

    // Admin-only routes; auth_middleware runs first
    let admin_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            auth_middleware,
        ))
        .with_state(auth_state);

    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::health_check))
        .with_state(health::HealthState::new(db));

    let swagger_routes = SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi());

    Router::new()
        .merge(swagger_routes)
        .merge(health_routes)
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::domain::UserRepositoryInterface;
    use crate::infrastructure::crypto::jwt::{create_token, create_token_at, JwtConfig};
    use crate::infrastructure::database::test_support::memory_db;

    const SECRET: &str = "router-test-secret";

    struct TestApp {
        router: Router,
        repo: Arc<UserRepository>,
        config: JwtConfig,
    }

    async fn app() -> TestApp {
        let db = memory_db().await;
        let repo = Arc::new(UserRepository::new(db.clone()));
        let config = JwtConfig::new(SECRET, Duration::from_secs(600));
        let service = Arc::new(AuthService::new(repo.clone(), config.clone(), 4));
        service
            .ensure_default_admin("admin", "admin123")
            .await
            .unwrap();

        TestApp {
            router: create_api_router(service, db),
            repo,
            config,
        }
    }

    fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login(app: &TestApp, username: &str, password: &str) -> String {
        let resp = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({"username": username, "password": password}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp).await["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_admin_login_scenario() {
        let app = app().await;
        let resp = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({"username": "admin", "password": "admin123"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["username"], "admin");
        assert_eq!(body["user"]["role"], "admin");
        assert!(body["user"].get("password").is_none());

        let token = body["token"].as_str().unwrap();
        let resp = app
            .router
            .clone()
            .oneshot(get_request("/api/auth/verify", Some(&format!("Bearer {}", token))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["message"], "令牌有效");
        assert_eq!(body["user"]["username"], "admin");
    }

    #[tokio::test]
    async fn test_login_failures() {
        let app = app().await;

        let resp = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/auth/login", json!({}), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["message"], "请提供用户名和密码");

        let resp = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({"username": "admin", "password": "wrong"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "用户名或密码错误");
    }

    #[tokio::test]
    async fn test_verify_header_failures() {
        let app = app().await;
        let cases = [
            (None, "认证失败: 未提供认证头信息"),
            (Some("Token abc"), "认证失败: Authorization格式不正确，应为Bearer格式"),
            (Some("Bearer "), "认证失败: 令牌为空"),
            (Some("Bearer not-a-jwt"), "认证失败: 令牌签名无效"),
        ];

        for (auth, expected) in cases {
            let resp = app
                .router
                .clone()
                .oneshot(get_request("/api/auth/verify", auth))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{:?}", auth);
            let body = body_json(resp).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["message"], expected);
        }

        let request = Request::builder()
            .method("GET")
            .uri("/api/auth/verify")
            .header(
                header::AUTHORIZATION,
                header::HeaderValue::from_bytes(b"Bearer \xe4\xbb\xa4\xe7\x89\x8c").unwrap(),
            )
            .body(Body::empty())
            .unwrap();
        let resp = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(resp).await["message"],
            "认证失败: Authorization格式不正确，应为Bearer格式"
        );
    }

    #[tokio::test]
    async fn test_verify_expired_token() {
        let app = app().await;
        let issued = Utc::now() - ChronoDuration::hours(1);
        let expired = create_token_at(1, "admin", "admin", issued, &app.config).unwrap();

        let resp = app
            .router
            .clone()
            .oneshot(get_request("/api/auth/verify", Some(&format!("Bearer {}", expired))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["message"], "认证失败: 令牌已过期");
    }

    #[tokio::test]
    async fn test_refresh_expired_token() {
        let app = app().await;
        let admin = app.repo.get_user_by_username("admin").await.unwrap().unwrap();
        let issued = Utc::now() - ChronoDuration::hours(1);
        let expired = create_token_at(admin.id, "admin", "admin", issued, &app.config).unwrap();

        let resp = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/auth/refresh", json!({"token": expired}), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["message"], "令牌已刷新");
        assert_eq!(body["user"]["id"], admin.id);

        let fresh = body["token"].as_str().unwrap();
        let resp = app
            .router
            .clone()
            .oneshot(get_request("/api/auth/verify", Some(&format!("Bearer {}", fresh))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_failures() {
        let app = app().await;

        let resp = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/auth/refresh", json!({}), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["message"], "需要提供令牌");

        let resp = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/auth/refresh", json!({"token": "   "}), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["message"], "无效的令牌");

        let forged = create_token(
            1,
            "admin",
            "admin",
            &JwtConfig::new("someone-else", Duration::from_secs(600)),
        )
        .unwrap();
        let resp = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/auth/refresh", json!({"token": forged}), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["message"], "无效的令牌");

        let ghost = create_token(9999, "ghost", "admin", &app.config).unwrap();
        let resp = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/auth/refresh", json!({"token": ghost}), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["message"], "用户不存在或已被删除");
    }

    #[tokio::test]
    async fn test_me_returns_profile_without_password() {
        let app = app().await;
        let token = login(&app, "admin", "admin123").await;

        let resp = app
            .router
            .clone()
            .oneshot(get_request("/api/auth/me", Some(&format!("Bearer {}", token))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["username"], "admin");
        assert!(body["data"]["created_at"].is_string());
        assert!(body["data"].get("password").is_none());
        assert!(body["data"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_me_for_deleted_user() {
        let app = app().await;
        let token = login(&app, "admin", "admin123").await;
        let admin = app.repo.get_user_by_username("admin").await.unwrap().unwrap();
        app.repo.delete_user(admin.id).await.unwrap();

        let resp = app
            .router
            .clone()
            .oneshot(get_request("/api/auth/me", Some(&format!("Bearer {}", token))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["message"], "用户不存在");
    }

    #[tokio::test]
    async fn test_change_password_flow() {
        let app = app().await;
        let token = login(&app, "admin", "admin123").await;

        let resp = app
            .router
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/change-password",
                json!({"currentPassword": "admin123", "newPassword": "123"}),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["message"], "新密码至少需要6个字符");

        let resp = app
            .router
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/change-password",
                json!({"currentPassword": "nope", "newPassword": "secret99"}),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["message"], "当前密码不正确");

        let resp = app
            .router
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/change-password",
                json!({"currentPassword": "admin123", "newPassword": "secret99"}),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["message"], "密码修改成功");

        login(&app, "admin", "secret99").await;
    }

    #[tokio::test]
    async fn test_register_requires_admin_token() {
        let app = app().await;

        let resp = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                json!({"username": "editor", "password": "secret99"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let token = login(&app, "admin", "admin123").await;
        let resp = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                json!({"username": "editor", "password": "secret99"}),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        assert_eq!(body["user"]["username"], "editor");

        let resp = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                json!({"username": "editor", "password": "secret99"}),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_health_and_request_id() {
        let app = app().await;

        for path in ["/health", "/api/health"] {
            let resp = app
                .router
                .clone()
                .oneshot(get_request(path, None))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert!(resp.headers().contains_key("x-request-id"));
            let body = body_json(resp).await;
            assert_eq!(body["status"], "ok");
            assert_eq!(body["database"]["status"], "ok");
        }
    }

    #[test]
    fn test_openapi_document_lists_auth_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/auth/login",
            "/api/auth/verify",
            "/api/auth/refresh",
            "/api/auth/me",
            "/api/change-password",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{}", path);
        }
    }
}
