//! Liveness and readiness probes.
//!
//! `GET /health` aggregates all registered indicators (200 when every one is
//! up, 503 otherwise); `GET /health/live` always answers 200;
//! `GET /health/ready` runs only the indicators that affect readiness.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;

use crate::context::RequestContext;
use crate::data::DataProvider;

/// Result of a single health check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down(String),
}

impl HealthStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, HealthStatus::Up)
    }
}

/// A named health check contributed by an extension or a data adapter.
#[async_trait]
pub trait HealthIndicator: Send + Sync {
    /// The name of this health check (e.g. `"db"`, `"redis"`).
    fn name(&self) -> &str;

    async fn check(&self) -> HealthStatus;

    /// Whether this check affects the readiness probe.
    fn affects_readiness(&self) -> bool {
        true
    }
}

/// Bridges a [`DataProvider`] into the health surface via its `ping`.
pub struct ProviderHealth {
    provider: Arc<dyn DataProvider>,
}

impl ProviderHealth {
    pub fn new(provider: Arc<dyn DataProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl HealthIndicator for ProviderHealth {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn check(&self) -> HealthStatus {
        match self.provider.ping(&RequestContext::anonymous()).await {
            Ok(()) => HealthStatus::Up,
            Err(err) => HealthStatus::Down(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct CheckReport {
    name: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Clone, Default)]
struct HealthState {
    indicators: Arc<Vec<Arc<dyn HealthIndicator>>>,
}

async fn run_checks(indicators: &[Arc<dyn HealthIndicator>]) -> (bool, Vec<CheckReport>) {
    let mut all_up = true;
    let mut reports = Vec::with_capacity(indicators.len());
    for indicator in indicators {
        let status = indicator.check().await;
        if !status.is_up() {
            all_up = false;
        }
        reports.push(match status {
            HealthStatus::Up => CheckReport {
                name: indicator.name().to_string(),
                status: "UP",
                reason: None,
            },
            HealthStatus::Down(reason) => CheckReport {
                name: indicator.name().to_string(),
                status: "DOWN",
                reason: Some(reason),
            },
        });
    }
    (all_up, reports)
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (all_up, checks) = run_checks(&state.indicators).await;
    let status = if all_up { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = serde_json::json!({
        "status": if all_up { "UP" } else { "DOWN" },
        "checks": checks,
    });
    (status, Json(body))
}

async fn liveness_handler() -> &'static str {
    "OK"
}

async fn readiness_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let ready: Vec<Arc<dyn HealthIndicator>> = state
        .indicators
        .iter()
        .filter(|i| i.affects_readiness())
        .cloned()
        .collect();
    let (all_up, checks) = run_checks(&ready).await;
    let status = if all_up { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = serde_json::json!({
        "status": if all_up { "UP" } else { "DOWN" },
        "checks": checks,
    });
    (status, Json(body))
}

/// Build the health route tree from the registered indicators.
pub fn health_routes(indicators: Vec<Arc<dyn HealthIndicator>>) -> Router {
    let state = HealthState {
        indicators: Arc::new(indicators),
    };
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct FixedIndicator {
        name: &'static str,
        up: bool,
    }

    #[async_trait]
    impl HealthIndicator for FixedIndicator {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> HealthStatus {
            if self.up {
                HealthStatus::Up
            } else {
                HealthStatus::Down("connection refused".to_string())
            }
        }
    }

    async fn request(router: Router, path: &str) -> (StatusCode, serde_json::Value) {
        let resp = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn aggregated_health_reflects_every_indicator() {
        let router = health_routes(vec![
            Arc::new(FixedIndicator { name: "db", up: true }),
            Arc::new(FixedIndicator { name: "redis", up: false }),
        ]);
        let (status, body) = request(router, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "DOWN");
        assert_eq!(body["checks"][1]["reason"], "connection refused");
    }

    #[tokio::test]
    async fn liveness_is_always_up() {
        let router = health_routes(vec![Arc::new(FixedIndicator { name: "db", up: false })]);
        let resp = router
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_indicator_set_is_healthy() {
        let (status, body) = request(health_routes(Vec::new()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");
    }
}
