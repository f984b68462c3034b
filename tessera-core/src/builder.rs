use std::sync::Arc;

use axum::Router;
use tessera_events::EventBus;

use crate::config::AppConfig;
use crate::discovery::{merged_info, NoopRegistrar, ServiceRegistrar};
use crate::error::AppError;
use crate::extension::{Extension, ExtensionKind, ExtensionStatus};
use crate::health::{health_routes, HealthIndicator};
use crate::lifecycle::LifecycleOrchestrator;
use crate::manager::ExtensionManager;
use crate::router::{root_routes, RouteTable};

type LayerFn = Box<dyn FnOnce(Router) -> Router + Send>;

/// A composable unit of functionality installed into the builder.
///
/// Plugins modify the builder: add layers, register routes, wire health
/// checks. The auth pipeline and the plugin-management endpoints install
/// through this trait.
pub trait Plugin: Send + 'static {
    /// Install this plugin, returning the modified builder.
    fn install(self, app: AppBuilder) -> AppBuilder;

    /// The name of this plugin (for diagnostics).
    fn name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

/// Builder for assembling a Tessera application.
///
/// Collects the config snapshot, static extensions, installable plugins and
/// Tower layers, then produces an `axum::Router` wired to the extension
/// runtime — or starts serving directly.
///
/// Exactly one HTTP engine exists per builder. `build()` drives the full
/// extension lifecycle before the router is assembled, so every mounted
/// route belongs to a Ready extension.
pub struct AppBuilder {
    config: Arc<AppConfig>,
    manager: ExtensionManager,
    route_table: RouteTable,
    extra_routes: Vec<Router>,
    layers: Vec<LayerFn>,
    registrar: Arc<dyn ServiceRegistrar>,
    health_indicators: Vec<Arc<dyn HealthIndicator>>,
}

impl AppBuilder {
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let manager = ExtensionManager::new(config.clone(), EventBus::new());
        Self {
            config,
            manager,
            route_table: RouteTable::new(),
            extra_routes: Vec::new(),
            layers: Vec::new(),
            registrar: Arc::new(NoopRegistrar),
            health_indicators: Vec::new(),
        }
    }

    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    pub fn manager(&self) -> &ExtensionManager {
        &self.manager
    }

    pub fn events(&self) -> &EventBus {
        self.manager.events()
    }

    /// The dynamic route table plugin routes dispatch through.
    pub fn route_table(&self) -> RouteTable {
        self.route_table.clone()
    }

    /// Register a static (module) extension.
    ///
    /// # Panics
    ///
    /// Panics when the name is already registered — duplicate module wiring
    /// is a programming error caught at boot.
    pub fn with_extension(self, extension: Arc<dyn Extension>) -> Self {
        if let Err(err) = self.manager.registry().register(extension) {
            panic!("extension registration failed: {err}");
        }
        self
    }

    /// Install a [`Plugin`] into this builder.
    pub fn with<P: Plugin>(self, plugin: P) -> Self {
        plugin.install(self)
    }

    /// Apply a transformation to the final router.
    ///
    /// Layer functions run in installation order; each wraps the previous
    /// result, so the last installed transformation is outermost.
    pub fn with_layer_fn<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.layers.push(Box::new(f));
        self
    }

    /// Merge a raw router fragment into the application.
    pub fn register_routes(mut self, router: Router) -> Self {
        self.extra_routes.push(router);
        self
    }

    /// Replace the no-op discovery registrar.
    pub fn with_registrar(mut self, registrar: Arc<dyn ServiceRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    /// Contribute a health indicator to `/health` and `/health/ready`.
    pub fn with_health_check(mut self, indicator: Arc<dyn HealthIndicator>) -> Self {
        self.health_indicators.push(indicator);
        self
    }

    /// Run the lifecycle and assemble the router.
    ///
    /// Startup failures of individual extensions are tolerated (they and
    /// their dependents are skipped) unless `extension.strict_boot` is set.
    pub async fn build(self) -> Result<App, AppError> {
        let Self {
            config,
            manager,
            route_table,
            extra_routes,
            layers,
            registrar,
            health_indicators,
        } = self;

        let report = LifecycleOrchestrator::start(&manager)
            .await
            .map_err(AppError::from)?;

        if !report.failed.is_empty() {
            for (name, cause) in &report.failed {
                tracing::warn!(extension = %name, cause = %cause, "extension failed during boot");
            }
            if config.extension.strict_boot {
                return Err(AppError::internal(format!(
                    "strict boot: {} extension(s) failed",
                    report.failed.len()
                )));
            }
        }

        // Static module routes are baked into the engine; plugin routes go
        // through the swappable table so hot reload can change them.
        let mut groups: Vec<(String, Router)> = Vec::new();
        for contribution in report.routes {
            match contribution.kind {
                ExtensionKind::Module => {
                    match groups.iter_mut().find(|(g, _)| g == &contribution.group) {
                        Some((_, router)) => {
                            let merged = std::mem::take(router).merge(contribution.router);
                            *router = merged;
                        }
                        None => groups.push((contribution.group, contribution.router)),
                    }
                }
                ExtensionKind::Plugin => {
                    route_table.install(
                        &contribution.name,
                        &contribution.group,
                        contribution.router,
                    );
                }
            }
        }

        let mut app = Router::new()
            .merge(root_routes(config.clone()))
            .merge(health_routes(health_indicators));
        for (group, router) in groups {
            app = app.nest(&format!("/{group}"), router);
        }
        for router in extra_routes {
            app = app.merge(router);
        }

        let table = route_table.clone();
        app = app.fallback(move |req: axum::extract::Request| {
            let table = table.clone();
            async move { table.dispatch(req).await }
        });

        for layer in layers {
            app = layer(app);
        }

        // Outermost: panics anywhere below become the JSON 500 envelope.
        app = app.layer(crate::layers::catch_panic_layer());

        offer_discovery(&manager, &config, registrar.as_ref()).await;

        Ok(App {
            router: app,
            manager,
        })
    }

    /// Build the application and start serving on the given address.
    pub async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        crate::layers::init_tracing();
        self.build().await?.serve(addr).await
    }
}

/// A built application: the assembled router plus the manager handle.
pub struct App {
    router: Router,
    manager: ExtensionManager,
}

impl App {
    /// The assembled router (cheap to clone; useful for in-process tests).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn manager(&self) -> &ExtensionManager {
        &self.manager
    }

    /// Serve until ctrl-c / SIGTERM, then run the reverse-ordered extension
    /// shutdown.
    pub async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "tessera server listening");
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        let errors = LifecycleOrchestrator::shutdown(&self.manager).await;
        for (name, message) in &errors {
            tracing::error!(extension = %name, error = %message, "cleanup failed during shutdown");
        }
        tracing::info!("tessera server stopped");
        Ok(())
    }
}

/// Offer Ready extensions that opt in to the discovery registrar.
async fn offer_discovery(
    manager: &ExtensionManager,
    config: &Arc<AppConfig>,
    registrar: &dyn ServiceRegistrar,
) {
    for entry in manager.registry().list() {
        if entry.status() != ExtensionStatus::Ready {
            continue;
        }
        let ext = entry.extension();
        if !ext.need_service_discovery() {
            continue;
        }
        if let Some(info) = ext.service_info() {
            let merged = merged_info(&info, &config.consul.discovery);
            registrar.register(ext.name(), &merged).await;
        }
    }
}

/// Wait for a shutdown signal (Ctrl-C or SIGTERM on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl-C");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, starting graceful shutdown");
}
