use axum::extract::Request;
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::debug;

use tessera_core::{AppError, RequestContext};

use crate::pipeline::PipelineState;

/// Require a named permission on every route of `router`.
///
/// Declared at mount time, typically inside an extension's
/// `register_routes`:
///
/// ```ignore
/// fn register_routes(&self) -> Option<Router> {
///     let routes = Router::new().route("/users", get(list_users));
///     Some(has_permission(routes, "read:users"))
/// }
/// ```
///
/// The guard runs after the pipeline populated the request context: an
/// anonymous context is rejected with `Unauthorized`, an admin context is
/// allowed outright, anything else must hold a policy grant for the
/// permission in the active tenant.
pub fn has_permission(router: Router, permission: &'static str) -> Router {
    router.route_layer(from_fn(move |req: Request, next: Next| async move {
        enforce(req, next, &[permission]).await
    }))
}

/// Like [`has_permission`] but satisfied by any one of the listed
/// permissions.
pub fn has_any_permission(router: Router, permissions: &'static [&'static str]) -> Router {
    router.route_layer(from_fn(move |req: Request, next: Next| async move {
        enforce(req, next, permissions).await
    }))
}

async fn enforce(req: Request, next: Next, permissions: &[&str]) -> Response {
    let Some(state) = req.extensions().get::<PipelineState>().cloned() else {
        // Guarded routes are unreachable without the pipeline in front.
        return AppError::internal("auth pipeline not installed").into_response();
    };
    let ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();

    let Some(user_id) = ctx.user_id.clone() else {
        return AppError::unauthorized("authentication required").into_response();
    };
    if ctx.user_is_admin {
        return next.run(req).await;
    }

    let tenant = ctx.tenant_id.clone().unwrap_or_default();
    for permission in permissions {
        if state
            .policy()
            .decide(&user_id, &ctx.roles, &tenant, permission, "*")
            .await
        {
            return next.run(req).await;
        }
    }
    debug!(user_id = %user_id, ?permissions, "permission denied");
    AppError::access_denied("permission denied").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AuthPipeline, TENANT_HEADER};
    use crate::token::TokenCodec;
    use axum::body::Body;
    use axum::routing::get;
    use http::header::AUTHORIZATION;
    use http::{Request as HttpRequest, StatusCode};
    use std::sync::Arc;
    use tessera_core::{AppBuilder, AppConfig};
    use tessera_policy::{MemoryPolicyStore, PolicyEngine, PolicyRule};
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    async fn build_router(rules: Vec<PolicyRule>) -> Router {
        let mut config = AppConfig::default();
        config.auth.jwt.secret = SECRET.to_string();
        let builder = AppBuilder::new(config);
        let policy = Arc::new(
            PolicyEngine::new(Arc::new(MemoryPolicyStore::with_rules(rules)))
                .await
                .unwrap(),
        );
        let pipeline = AuthPipeline::new(builder.manager().clone(), policy);

        let guarded = has_permission(
            Router::new().route("/sys/users/export", get(|| async { "csv" })),
            "read:users",
        );

        builder
            .register_routes(guarded)
            .with(pipeline)
            .build()
            .await
            .unwrap()
            .router()
    }

    async fn call(router: Router, roles: Vec<String>) -> StatusCode {
        let token = TokenCodec::new(SECRET, 7200)
            .sign("u1", "tok-1", false, roles)
            .unwrap();
        router
            .oneshot(
                HttpRequest::builder()
                    .uri("/sys/users/export")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .header(TENANT_HEADER, "t1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn grant_allows_and_absence_denies() {
        let rules = vec![
            // Route-level policy grant plus the named permission grant.
            PolicyRule::policy("admin", "t1", "/sys/*", "*"),
            PolicyRule::policy("admin", "t1", "read:users", "*"),
        ];
        assert_eq!(
            call(build_router(rules.clone()).await, vec!["admin".to_string()]).await,
            StatusCode::OK
        );
        assert_eq!(
            call(build_router(rules).await, vec!["guest".to_string()]).await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn route_grant_without_permission_grant_is_denied() {
        // The path rule lets the request through `authorize`, but the
        // mount-time guard still requires the named permission.
        let rules = vec![PolicyRule::policy("editor", "t1", "/sys/*", "*")];
        assert_eq!(
            call(build_router(rules).await, vec!["editor".to_string()]).await,
            StatusCode::FORBIDDEN
        );
    }
}
