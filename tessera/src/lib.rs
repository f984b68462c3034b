//! Tessera — a modular extension runtime for multi-tenant platforms.
//!
//! One process hosts many independently authored feature units
//! ("extensions": statically linked modules or dynamically loaded plugins),
//! wires them into a shared HTTP engine, lets them discover each other's
//! services at runtime, fans events out among them, and runs every request
//! through an authenticated, authorized middleware chain before dispatching
//! to the owning extension.
//!
//! # Assembling an application
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tessera::layers::init_tracing();
//!
//!     let raw = Config::load("dev")?;
//!     let config = AppConfig::from_config(&raw)?;
//!     let addr = config.server.bind_addr();
//!
//!     let builder = AppBuilder::new(config)
//!         .with_extension(Arc::new(DataExtension::new()))
//!         .with_extension(Arc::new(UserExtension::new()))
//!         .with_extension(Arc::new(TenantExtension::new()));
//!
//!     // Dynamic plugins: registered now, started by the orchestrator.
//!     let host = Arc::new(PluginHost::new(
//!         builder.manager().clone(),
//!         builder.route_table(),
//!     ));
//!     host.load_all().await;
//!
//!     // Policy rules come from the store the data extension exposes.
//!     let policy = Arc::new(PolicyEngine::new(Arc::new(MemoryPolicyStore::new())).await?);
//!     let pipeline = AuthPipeline::new(builder.manager().clone(), policy);
//!
//!     builder
//!         .with(Management::new(host))
//!         .with(pipeline)
//!         .serve(&addr)
//!         .await
//! }
//! ```

pub use tessera_core::{
    builder, config, context, data, discovery, error, extension, health, layers, lifecycle,
    manager, registry, router, services, topics,
};

pub use tessera_core::{
    ok, ok_message, App, AppBuilder, AppConfig, AppError, Config, ConfigError, DataProvider,
    ErrorCode, Extension, ExtensionError, ExtensionKind, ExtensionManager, ExtensionRegistry,
    ExtensionStatus, HealthIndicator, HealthStatus, LifecycleError, LifecycleOrchestrator,
    NoopRegistrar, Plugin, RegistryError, RequestContext, RouteTable, RunMode, ServiceError,
    ServiceHandle, ServiceInfo, ServiceLocator, ServiceMap, ServiceRegistrar, StartupReport,
    StoreError,
};

pub use tessera_events::{EventBus, SubscriptionToken};

pub use tessera_policy::{
    MemoryPolicyStore, PolicyEngine, PolicyError, PolicyRule, PolicyStore, ANY_TENANT,
    PTYPE_GROUPING, PTYPE_POLICY,
};

pub use tessera_security::{
    has_any_permission, has_permission, AuthPipeline, Claims, PipelineState, SecurityError,
    TenantResolver, TokenCodec, REFRESH_WINDOW_SECS, TENANT_EXTENSION, TENANT_HEADER,
    TRACE_HEADER, USER_TENANT_SERVICE,
};

pub use tessera_loader::{
    clear_static_plugins, declare_plugin, management_routes, register_static_plugin,
    static_plugins, LoaderError, Management, PluginCtor, PluginDescriptor, PluginHost,
    PLUGIN_ENTRY_SYMBOL,
};

pub mod prelude {
    //! The most commonly used types for wiring an application.
    pub use tessera_core::{
        ok, ok_message, App, AppBuilder, AppConfig, AppError, Config, Extension, ExtensionError,
        ExtensionKind, ExtensionManager, ExtensionStatus, Plugin, RequestContext, ServiceHandle,
        ServiceMap,
    };
    pub use tessera_events::EventBus;
    pub use tessera_loader::{Management, PluginHost};
    pub use tessera_policy::{MemoryPolicyStore, PolicyEngine, PolicyRule, PolicyStore};
    pub use tessera_security::{
        has_any_permission, has_permission, AuthPipeline, TenantResolver, TokenCodec,
    };
}
