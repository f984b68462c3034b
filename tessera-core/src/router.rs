use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use axum::body::Body;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use http::Request;

use crate::config::AppConfig;
use crate::error::{ok_message, AppError};

/// Uniform JSON 404 for unmatched routes.
pub async fn not_found() -> AppError {
    AppError::not_found("resource not found")
}

/// Root (`/`) and heartbeat routes.
///
/// When a real domain is configured, `/` redirects to it; `localhost`
/// disables the redirect and `/` answers with the heartbeat envelope.
pub fn root_routes(config: Arc<AppConfig>) -> Router {
    Router::new().route(
        "/",
        get(move || {
            let config = config.clone();
            async move {
                if config.redirect_enabled() {
                    Redirect::temporary(&format!("https://{}", config.domain)).into_response()
                } else {
                    ok_message("tessera").into_response()
                }
            }
        }),
    )
}

struct Fragment {
    name: String,
    group: String,
    router: Router,
}

#[derive(Default)]
struct TableInner {
    fragments: Vec<Fragment>,
    snapshot: Router,
}

/// Swappable router for dynamically loaded plugin routes.
///
/// Plugin route fragments cannot be baked into the engine at boot because
/// load/unload/reload changes them at runtime. The table keeps the current
/// fragments nested by group in a snapshot router; the engine's fallback
/// re-dispatches unmatched requests into the snapshot, so a reloaded
/// plugin's handlers stay reachable without rebuilding the engine.
#[derive(Clone)]
pub struct RouteTable {
    inner: Arc<RwLock<TableInner>>,
}

impl RouteTable {
    pub fn new() -> Self {
        let table = Self {
            inner: Arc::new(RwLock::new(TableInner::default())),
        };
        table.rebuild();
        table
    }

    /// Install (or replace) the route fragment owned by `name`.
    pub fn install(&self, name: &str, group: &str, router: Router) {
        {
            let mut inner = self.inner.write().expect("route table lock poisoned");
            inner.fragments.retain(|f| f.name != name);
            inner.fragments.push(Fragment {
                name: name.to_string(),
                group: group.to_string(),
                router,
            });
        }
        self.rebuild();
    }

    /// Drop the route fragment owned by `name`.
    pub fn remove(&self, name: &str) {
        {
            let mut inner = self.inner.write().expect("route table lock poisoned");
            inner.fragments.retain(|f| f.name != name);
        }
        self.rebuild();
    }

    /// Names of extensions currently holding routes in the table.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("route table lock poisoned")
            .fragments
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    /// Dispatch a request into the current snapshot.
    pub async fn dispatch(&self, req: Request<Body>) -> Response {
        let snapshot = self
            .inner
            .read()
            .expect("route table lock poisoned")
            .snapshot
            .clone();
        match tower::ServiceExt::oneshot(snapshot, req).await {
            Ok(resp) => resp,
            Err(infallible) => match infallible {},
        }
    }

    fn rebuild(&self) {
        let mut inner = self.inner.write().expect("route table lock poisoned");
        let mut groups: BTreeMap<String, Router> = BTreeMap::new();
        for fragment in &inner.fragments {
            let merged = groups.remove(&fragment.group).unwrap_or_default();
            groups.insert(fragment.group.clone(), merged.merge(fragment.router.clone()));
        }
        let mut snapshot = Router::new();
        for (group, router) in groups {
            snapshot = snapshot.nest(&format!("/{group}"), router);
        }
        inner.snapshot = snapshot.fallback(not_found);
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use http_body_util::BodyExt;

    async fn get_status(table: &RouteTable, path: &str) -> StatusCode {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        table.dispatch(req).await.status()
    }

    #[tokio::test]
    async fn install_remove_and_replace() {
        let table = RouteTable::new();
        assert_eq!(get_status(&table, "/plug/counter/value").await, StatusCode::NOT_FOUND);

        table.install(
            "counter",
            "plug",
            Router::new().route("/counter/value", get(|| async { "1" })),
        );
        assert_eq!(get_status(&table, "/plug/counter/value").await, StatusCode::OK);

        // Replacing under the same name keeps the handler reachable.
        table.install(
            "counter",
            "plug",
            Router::new().route("/counter/value", get(|| async { "2" })),
        );
        assert_eq!(get_status(&table, "/plug/counter/value").await, StatusCode::OK);
        assert_eq!(table.names(), vec!["counter"]);

        table.remove("counter");
        assert_eq!(get_status(&table, "/plug/counter/value").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unmatched_requests_render_the_envelope_404() {
        let table = RouteTable::new();
        let req = Request::builder().uri("/nowhere").body(Body::empty()).unwrap();
        let resp = table.dispatch(req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "NotFound");
    }
}
