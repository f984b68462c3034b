use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::{from_fn, from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tessera_core::config::AppConfig;
use tessera_core::layers::cors_layer;
use tessera_core::{AppBuilder, AppError, ExtensionManager, Plugin, RequestContext};
use tessera_policy::PolicyEngine;

use crate::tenant::{TenantResolver, TENANT_EXTENSION, USER_TENANT_SERVICE};
use crate::token::{TokenCodec, REFRESH_WINDOW_SECS};

/// Trace id request/response header.
pub const TRACE_HEADER: &str = "X-Trace-ID";
/// Tenant selection request header.
pub const TENANT_HEADER: &str = "X-Md-Tenant-Id";

/// Shared state of the middleware chain.
///
/// Also inserted into request extensions so route-level permission guards
/// can reach the policy engine regardless of where they sit in the stack.
#[derive(Clone)]
pub struct PipelineState {
    codec: Arc<TokenCodec>,
    policy: Arc<PolicyEngine>,
    manager: ExtensionManager,
    config: Arc<AppConfig>,
}

impl PipelineState {
    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }
}

/// The ordered authentication/authorization middleware chain.
///
/// Installs, outermost first: request logger, CORS, trace id, user
/// consumption (token extraction + validation + near-expiry refresh),
/// tenant consumption, and policy authorization. Each step observes every
/// mutation of the steps before it; the chain is strictly sequential per
/// request.
pub struct AuthPipeline {
    state: PipelineState,
}

impl AuthPipeline {
    pub fn new(manager: ExtensionManager, policy: Arc<PolicyEngine>) -> Self {
        let config = manager.config().clone();
        Self {
            state: PipelineState {
                codec: Arc::new(TokenCodec::from_config(&config.auth.jwt)),
                policy,
                manager,
                config,
            },
        }
    }
}

impl Plugin for AuthPipeline {
    fn install(self, app: AppBuilder) -> AppBuilder {
        let state = self.state;
        let cors = cors_layer(&state.config.cors);

        // Layer functions wrap in installation order, so the last installed
        // layer runs first: logger -> cors -> trace -> user -> tenant -> authorize.
        let s = state.clone();
        let app = app.with_layer_fn(move |r| r.layer(from_fn_with_state(s, authorize)));
        let s = state.clone();
        let app = app.with_layer_fn(move |r| r.layer(from_fn_with_state(s, consume_tenant)));
        let s = state.clone();
        let app = app.with_layer_fn(move |r| r.layer(from_fn_with_state(s, consume_user)));
        let s = state;
        let app = app.with_layer_fn(move |r| r.layer(from_fn_with_state(s, trace)));
        let app = app.with_layer_fn(move |r| r.layer(cors));
        app.with_layer_fn(move |r| r.layer(from_fn(logger)))
    }
}

/// Step 1: structured request logging.
async fn logger(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(req).await;
    let trace_id = response
        .headers()
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    info!(
        %method,
        path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        trace_id,
        "request"
    );
    response
}

/// Step 3: trace id propagation and request context seeding.
async fn trace(State(state): State<PipelineState>, mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let cancel = CancellationToken::new();
    let mut ctx = RequestContext::anonymous();
    ctx.trace_id = Some(trace_id.clone());
    ctx.config = Some(state.config.clone());
    ctx.cancel = cancel.clone();
    req.extensions_mut().insert(ctx);
    req.extensions_mut().insert(state);

    // Held across the handler: dropping the request future (client
    // disconnect) cancels the context token.
    let _guard = cancel.drop_guard();

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }
    response
}

/// Step 4: token extraction, validation and near-expiry refresh.
async fn consume_user(State(state): State<PipelineState>, mut req: Request, next: Next) -> Response {
    let Some(raw) = extract_token(&req) else {
        // Anonymous request; downstream authorization decides.
        return next.run(req).await;
    };

    let claims = match state.codec.verify(&raw) {
        Ok(claims) => claims,
        Err(err) => return AppError::from(err).into_response(),
    };

    let refreshed = if TokenCodec::expires_within(&claims, REFRESH_WINDOW_SECS) {
        state.codec.refresh(&claims).ok()
    } else {
        None
    };

    if let Some(ctx) = req.extensions_mut().get_mut::<RequestContext>() {
        ctx.user_id = Some(claims.user_id.clone());
        ctx.user_is_admin = claims.is_admin;
        ctx.roles = claims.roles.clone();
        ctx.token = Some(raw);
    }

    let mut response = next.run(req).await;

    if let Some(token) = refreshed {
        debug!(user_id = %claims.user_id, "access token refreshed");
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            response.headers_mut().insert(AUTHORIZATION, value);
        }
        let cookie = if state.config.domain == "localhost" {
            format!("access_token={token}; Path=/")
        } else {
            format!("access_token={token}; Domain={}; Path=/", state.config.domain)
        };
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

/// Token sources, first wins: `Authorization: Bearer`, `ak` query
/// parameter, `access_token` cookie.
fn extract_token(req: &Request) -> Option<String> {
    if let Some(header) = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let mut parts = header.splitn(2, ' ');
        if let (Some(scheme), Some(token)) = (parts.next(), parts.next()) {
            if scheme.eq_ignore_ascii_case("Bearer") && !token.trim().is_empty() {
                return Some(token.trim().to_string());
            }
        }
    }
    if let Some(query) = req.uri().query() {
        if let Some((_, token)) = form_urlencoded::parse(query.as_bytes()).find(|(k, _)| k == "ak")
        {
            if !token.is_empty() {
                return Some(token.into_owned());
            }
        }
    }
    if let Some(cookies) = req.headers().get(COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name == "access_token" && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Step 5: tenant resolution.
async fn consume_tenant(State(state): State<PipelineState>, mut req: Request, next: Next) -> Response {
    let mut tenant = req
        .headers()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    if tenant.is_none() {
        let ctx = req.extensions().get::<RequestContext>().cloned();
        if let Some(ctx) = ctx {
            if let Some(user_id) = ctx.user_id.clone() {
                match state
                    .manager
                    .services()
                    .get_typed::<Arc<dyn TenantResolver>>(TENANT_EXTENSION, USER_TENANT_SERVICE)
                {
                    Ok(resolver) => tenant = resolver.default_tenant(&ctx, &user_id).await,
                    Err(err) => debug!(error = %err, "tenant resolver unavailable"),
                }
            }
        }
    }

    if let Some(tenant) = tenant {
        if let Some(ctx) = req.extensions_mut().get_mut::<RequestContext>() {
            ctx.tenant_id = Some(tenant);
        }
    }
    next.run(req).await
}

/// Step 6: policy authorization.
///
/// Whitelisted path prefixes bypass the check entirely. Anonymous requests
/// to protected paths are rejected with `Unauthorized`; authenticated
/// requests that no rule allows get `AccessDenied` and the handler never
/// runs. An admin-flagged context bypasses rule evaluation.
async fn authorize(State(state): State<PipelineState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if state
        .config
        .auth
        .whitelist
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        return next.run(req).await;
    }

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
    let allowed = state
        .policy
        .decide(&user_id, &ctx.roles, &tenant, &path, req.method().as_str())
        .await;
    if allowed {
        next.run(req).await
    } else {
        debug!(user_id = %user_id, tenant = %tenant, path, "policy denied");
        AppError::access_denied("access denied").into_response()
    }
}
