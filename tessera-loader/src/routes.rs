use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use tessera_core::{ok, ok_message, AppBuilder, AppError, Plugin};

use crate::host::PluginHost;

/// Management endpoints for plugin operations.
///
/// Mounted only when `extension.hot_reload` is enabled (see
/// [`Management`]): `GET /plugins`, `POST /plugins/load/{name}`,
/// `POST /plugins/unload/{name}`, `POST /plugins/reload/{name}`.
pub fn management_routes(host: Arc<PluginHost>) -> Router {
    Router::new()
        .route("/plugins", get(list_plugins))
        .route("/plugins/load/{name}", post(load_plugin))
        .route("/plugins/unload/{name}", post(unload_plugin))
        .route("/plugins/reload/{name}", post(reload_plugin))
        .with_state(host)
}

async fn list_plugins(State(host): State<Arc<PluginHost>>) -> Response {
    ok(host.list().await).into_response()
}

async fn load_plugin(State(host): State<Arc<PluginHost>>, Path(name): Path<String>) -> Response {
    match host.load(&name).await {
        Ok(()) => ok_message(format!("plugin '{name}' loaded")).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

async fn unload_plugin(State(host): State<Arc<PluginHost>>, Path(name): Path<String>) -> Response {
    match host.unload(&name).await {
        Ok(()) => ok_message(format!("plugin '{name}' unloaded")).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

async fn reload_plugin(State(host): State<Arc<PluginHost>>, Path(name): Path<String>) -> Response {
    match host.reload(&name).await {
        Ok(()) => ok_message(format!("plugin '{name}' reloaded")).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

/// Builder plugin wiring the management endpoints into the engine when hot
/// reload is enabled.
pub struct Management {
    host: Arc<PluginHost>,
}

impl Management {
    pub fn new(host: Arc<PluginHost>) -> Self {
        Self { host }
    }
}

impl Plugin for Management {
    fn install(self, app: AppBuilder) -> AppBuilder {
        if app.config().extension.hot_reload {
            app.register_routes(management_routes(self.host))
        } else {
            app
        }
    }
}
