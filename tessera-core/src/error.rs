use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

/// Machine-readable error code carried in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    AccessDenied,
    NotFound,
    Conflict,
    Transactional,
    Internal,
    DependencyFailed,
    CycleDetected,
    DuplicateName,
    ServiceNotReady,
    ServiceMissing,
}

impl ErrorCode {
    /// The HTTP status this code maps to when surfaced over HTTP.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::AccessDenied => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict | ErrorCode::DuplicateName => StatusCode::CONFLICT,
            ErrorCode::ServiceNotReady => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ServiceMissing => StatusCode::NOT_FOUND,
            ErrorCode::Transactional
            | ErrorCode::Internal
            | ErrorCode::DependencyFailed
            | ErrorCode::CycleDetected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BadRequest",
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::AccessDenied => "AccessDenied",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::Transactional => "Transactional",
            ErrorCode::Internal => "Internal",
            ErrorCode::DependencyFailed => "DependencyFailed",
            ErrorCode::CycleDetected => "CycleDetected",
            ErrorCode::DuplicateName => "DuplicateName",
            ErrorCode::ServiceNotReady => "ServiceNotReady",
            ErrorCode::ServiceMissing => "ServiceMissing",
        }
    }
}

/// Application error rendered as the uniform response envelope.
///
/// The envelope shape is `{code, message, errors?}` on failure and
/// `{code: 0, message, data?}` on success (see [`ok`] / [`ok_message`]).
pub struct AppError {
    code: ErrorCode,
    message: String,
    errors: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            errors: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AccessDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Attach field-level error details to the envelope `errors` member.
    pub fn with_errors(mut self, errors: serde_json::Value) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "code": self.code.as_str(),
            "message": self.message,
        });
        if let Some(errors) = self.errors {
            body["errors"] = errors;
        }
        (self.code.status(), Json(body)).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

/// Success envelope with a data member: `{code: 0, message: "ok", data}`.
pub fn ok<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "code": 0,
        "message": "ok",
        "data": data,
    }))
}

/// Success envelope without data.
pub fn ok_message(message: impl Into<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "code": 0,
        "message": message.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn error_parts(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn unauthorized_maps_to_401() {
        let (status, body) = error_parts(AppError::unauthorized("token invalid")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "Unauthorized");
        assert_eq!(body["message"], "token invalid");
    }

    #[tokio::test]
    async fn access_denied_maps_to_403() {
        let (status, body) = error_parts(AppError::access_denied("no rule matched")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "AccessDenied");
    }

    #[tokio::test]
    async fn conflict_and_duplicate_name_map_to_409() {
        let (status, _) = error_parts(AppError::conflict("exists")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, body) =
            error_parts(AppError::new(ErrorCode::DuplicateName, "user already registered")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "DuplicateName");
    }

    #[tokio::test]
    async fn errors_member_is_attached() {
        let err = AppError::bad_request("invalid input")
            .with_errors(serde_json::json!({"name": "required"}));
        let (status, body) = error_parts(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["name"], "required");
    }

    #[tokio::test]
    async fn success_envelope_sets_code_zero() {
        let resp = ok(serde_json::json!({"id": "u1"})).into_response();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["data"]["id"], "u1");
    }

    #[test]
    fn display_formatting() {
        assert_eq!(
            AppError::not_found("user u1").to_string(),
            "NotFound: user u1"
        );
    }
}
