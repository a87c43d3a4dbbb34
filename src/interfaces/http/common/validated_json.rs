//! Validated JSON extractor for Axum
//!
//! `ValidatedJson<T>` works like `axum::Json<T>`, but additionally runs
//! `validator::Validate::validate()` on the deserialized value. Both
//! malformed JSON and validation failures produce a 400 response whose
//! `message` is the validator's own text, so request types can carry the
//! exact user-facing wording.

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use validator::Validate;

use super::ApiResponse;

/// An extractor that deserializes JSON and validates it.
///
/// # Usage
///
/// ```ignore
/// #[derive(Deserialize, Validate)]
/// struct RefreshRequest {
///     #[serde(default)]
///     #[validate(length(min = 1, message = "需要提供令牌"))]
///     token: String,
/// }
///
/// async fn handler(ValidatedJson(body): ValidatedJson<RefreshRequest>) {
///     // `body` is guaranteed to pass validation
/// }
/// ```
pub struct ValidatedJson<T>(pub T);

/// Error type for `ValidatedJson` extraction failures.
#[derive(Debug)]
pub enum ValidatedJsonRejection {
    /// JSON parsing failed.
    JsonError(JsonRejection),
    /// Validation failed.
    ValidationError(validator::ValidationErrors),
}

impl ValidatedJsonRejection {
    pub fn message(&self) -> String {
        match self {
            Self::JsonError(rejection) => format!("请求体格式错误: {}", rejection.body_text()),
            Self::ValidationError(errors) => {
                let mut messages: Vec<String> = Vec::new();
                for (field, errs) in errors.field_errors() {
                    for e in errs.iter() {
                        let msg = e
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("{}: {}", field, e.code));
                        if !messages.contains(&msg) {
                            messages.push(msg);
                        }
                    }
                }
                messages.sort();

                if messages.is_empty() {
                    "请求参数无效".to_string()
                } else {
                    messages.join("; ")
                }
            }
        }
    }
}

impl IntoResponse for ValidatedJsonRejection {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.message());
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidatedJsonRejection;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidatedJsonRejection::JsonError)?;

        value
            .validate()
            .map_err(ValidatedJsonRejection::ValidationError)?;

        Ok(ValidatedJson(value))
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde::Deserialize;
    use tower::ServiceExt;
    use validator::Validate;

    #[derive(Debug, Deserialize, Validate)]
    struct TestBody {
        #[serde(default)]
        #[validate(length(min = 1, message = "请提供用户名和密码"))]
        username: String,
        #[serde(default)]
        #[validate(length(min = 1, message = "请提供用户名和密码"))]
        password: String,
    }

    async fn handler(ValidatedJson(_body): ValidatedJson<TestBody>) -> &'static str {
        "ok"
    }

    fn app() -> Router {
        Router::new().route("/test", post(handler))
    }

    fn json_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/test")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn valid_body_returns_ok() {
        let resp = app()
            .oneshot(json_request(r#"{"username":"admin","password":"admin123"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_json_returns_400() {
        let resp = app().oneshot(json_request("not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn missing_fields_return_single_message() {
        let resp = app().oneshot(json_request("{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = body_json(resp).await;
        assert_eq!(body["message"], "请提供用户名和密码");
    }
}
