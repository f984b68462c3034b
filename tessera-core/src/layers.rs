//! Tower layer helpers shared by the builder and the pipeline.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::CorsConfig;

/// Initialise the global `tracing` subscriber.
///
/// Respects `RUST_LOG`; defaults to `info`. Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Build the configuration-driven CORS layer.
///
/// A `*` entry (or an empty list) in any dimension opens that dimension up.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origin = if config.allow_origins.is_empty() || config.allow_origins.iter().any(|o| o == "*")
    {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allow_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    let methods = if config.allow_methods.is_empty() || config.allow_methods.iter().any(|m| m == "*")
    {
        AllowMethods::any()
    } else {
        AllowMethods::list(
            config
                .allow_methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.as_bytes()).ok()),
        )
    };
    let headers = if config.allow_headers.is_empty() || config.allow_headers.iter().any(|h| h == "*")
    {
        AllowHeaders::any()
    } else {
        AllowHeaders::list(
            config
                .allow_headers
                .iter()
                .filter_map(|h| h.parse::<HeaderName>().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
}

/// Convert panics in handlers into the JSON 500 envelope.
pub fn catch_panic_layer() -> CatchPanicLayer<fn(Box<dyn std::any::Any + Send + 'static>) -> Response>
{
    CatchPanicLayer::custom(panic_response as fn(Box<dyn std::any::Any + Send + 'static>) -> Response)
}

fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("panic");
    tracing::error!(detail, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "code": "Internal",
            "message": "internal server error",
        })),
    )
        .into_response()
}
