use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::routing::get;
use axum::Router;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use serial_test::serial;
use tower::ServiceExt;

use tessera_core::{
    topics, AppBuilder, AppConfig, Extension, ExtensionError, ExtensionKind, ExtensionManager,
    ServiceHandle, ServiceMap,
};
use tessera_loader::{clear_static_plugins, register_static_plugin, Management, PluginHost};

struct CounterPlugin;

#[async_trait]
impl Extension for CounterPlugin {
    fn name(&self) -> &str {
        "counter"
    }

    fn group(&self) -> &str {
        "plug"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Plugin
    }

    async fn init(
        &self,
        _config: Arc<AppConfig>,
        _manager: ExtensionManager,
    ) -> Result<(), ExtensionError> {
        Ok(())
    }

    fn register_routes(&self) -> Option<Router> {
        Some(Router::new().route("/counter", get(|| async { "1" })))
    }

    fn services(&self) -> ServiceMap {
        ServiceMap::new().with("Counter", 1u64)
    }
}

struct DependentPlugin {
    name: &'static str,
    deps: Vec<String>,
}

#[async_trait]
impl Extension for DependentPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn group(&self) -> &str {
        "plug"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Plugin
    }

    fn dependencies(&self) -> Vec<String> {
        self.deps.clone()
    }

    async fn init(
        &self,
        _config: Arc<AppConfig>,
        _manager: ExtensionManager,
    ) -> Result<(), ExtensionError> {
        Ok(())
    }
}

fn hot_reload_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.extension.hot_reload = true;
    config
}

async fn send(router: &Router, method: &str, path: &str) -> StatusCode {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

async fn body_of(router: &Router, path: &str) -> serde_json::Value {
    let resp = router
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn reload_preserves_identity_routes_and_handles() {
    let builder = AppBuilder::new(hot_reload_config());
    let manager = builder.manager().clone();
    manager.registry().register(Arc::new(CounterPlugin)).unwrap();
    let host = Arc::new(PluginHost::new(manager.clone(), builder.route_table()));

    // Lifecycle event collector plus a dependent that refreshes its cached
    // handle on the ready event.
    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let cached: Arc<Mutex<Option<ServiceHandle>>> = Arc::new(Mutex::new(None));
    {
        let events = events.clone();
        manager
            .events()
            .subscribe(&topics::ext_stopping("counter"), "observer", move |_| {
                let events = events.clone();
                async move {
                    events.lock().unwrap().push("stopping");
                }
            })
            .await;
    }
    {
        let events = events.clone();
        let cached = cached.clone();
        let refresh = manager.clone();
        manager
            .events()
            .subscribe(&topics::ext_ready("counter"), "observer", move |_| {
                let events = events.clone();
                let cached = cached.clone();
                let refresh = refresh.clone();
                async move {
                    events.lock().unwrap().push("ready");
                    if let Ok(handle) = refresh.services().get_cross_service("counter", "Counter")
                    {
                        *cached.lock().unwrap() = Some(handle);
                    }
                }
            })
            .await;
    }

    let app = builder.with(Management::new(host.clone())).build().await.unwrap();
    let router = app.router();

    // Booted: routes reachable, plugin listed, handle cached.
    assert_eq!(send(&router, "GET", "/plug/counter").await, StatusCode::OK);
    let listed = body_of(&router, "/plugins").await;
    assert_eq!(listed["data"][0]["name"], "counter");
    assert_eq!(listed["data"][0]["status"], "ready");
    assert_eq!(*events.lock().unwrap(), vec!["ready"]);

    // Reload: stopping then ready, in order.
    assert_eq!(send(&router, "POST", "/plugins/reload/counter").await, StatusCode::OK);
    assert_eq!(*events.lock().unwrap(), vec!["ready", "stopping", "ready"]);

    // Identity preserved, handler still reachable, handle not stale.
    assert_eq!(send(&router, "GET", "/plug/counter").await, StatusCode::OK);
    let handle = cached.lock().unwrap().clone().expect("refreshed handle");
    assert_eq!(handle.cast::<u64>(), Some(1));
    assert!(manager.services().get_cross_service("counter", "Counter").is_ok());

    // Unload: routes gone, list empty.
    assert_eq!(send(&router, "POST", "/plugins/unload/counter").await, StatusCode::OK);
    assert_eq!(send(&router, "GET", "/plug/counter").await, StatusCode::NOT_FOUND);
    assert_eq!(body_of(&router, "/plugins").await["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unload_is_refused_while_a_ready_dependent_exists() {
    let builder = AppBuilder::new(hot_reload_config());
    let manager = builder.manager().clone();
    manager.registry().register(Arc::new(CounterPlugin)).unwrap();
    manager
        .registry()
        .register(Arc::new(DependentPlugin {
            name: "dashboard",
            deps: vec!["counter".to_string()],
        }))
        .unwrap();
    let host = Arc::new(PluginHost::new(manager.clone(), builder.route_table()));
    let app = builder.with(Management::new(host.clone())).build().await.unwrap();
    let router = app.router();

    assert_eq!(
        send(&router, "POST", "/plugins/unload/counter").await,
        StatusCode::CONFLICT
    );

    // Unloading the dependent first unblocks the base plugin.
    assert_eq!(send(&router, "POST", "/plugins/unload/dashboard").await, StatusCode::OK);
    assert_eq!(send(&router, "POST", "/plugins/unload/counter").await, StatusCode::OK);
}

#[tokio::test]
async fn management_routes_absent_without_hot_reload() {
    let builder = AppBuilder::new(AppConfig::default());
    let host = Arc::new(PluginHost::new(builder.manager().clone(), builder.route_table()));
    let app = builder.with(Management::new(host)).build().await.unwrap();
    assert_eq!(send(&app.router(), "GET", "/plugins").await, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[serial]
async fn static_registration_feeds_load_all() {
    clear_static_plugins();
    register_static_plugin(|| Arc::new(CounterPlugin));

    let builder = AppBuilder::new(hot_reload_config());
    let manager = builder.manager().clone();
    let host = Arc::new(PluginHost::new(manager.clone(), builder.route_table()));
    assert_eq!(host.load_all().await, vec!["counter"]);

    let app = builder.with(Management::new(host.clone())).build().await.unwrap();
    let router = app.router();
    assert_eq!(send(&router, "GET", "/plug/counter").await, StatusCode::OK);

    // After an unload, a management load finds the self-registered
    // constructor again (development fallback).
    assert_eq!(send(&router, "POST", "/plugins/unload/counter").await, StatusCode::OK);
    assert_eq!(send(&router, "GET", "/plug/counter").await, StatusCode::NOT_FOUND);
    assert_eq!(send(&router, "POST", "/plugins/load/counter").await, StatusCode::OK);
    assert_eq!(send(&router, "GET", "/plug/counter").await, StatusCode::OK);

    clear_static_plugins();
}

#[tokio::test]
#[serial]
async fn include_list_filters_static_plugins() {
    clear_static_plugins();
    register_static_plugin(|| Arc::new(CounterPlugin));

    let mut config = hot_reload_config();
    config.extension.includes = vec!["metrics".to_string()];
    let builder = AppBuilder::new(config);
    let host = PluginHost::new(builder.manager().clone(), builder.route_table());
    assert!(host.load_all().await.is_empty());
    assert!(!builder.manager().registry().contains("counter"));

    clear_static_plugins();
}
