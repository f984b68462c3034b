//! Core runtime for Tessera: the extension contract, the registry, the
//! service locator, the lifecycle orchestrator and the app builder that
//! assembles everything into a single HTTP engine.

pub mod builder;
pub mod config;
pub mod context;
pub mod data;
pub mod discovery;
pub mod error;
pub mod extension;
pub mod health;
pub mod layers;
pub mod lifecycle;
pub mod manager;
pub mod registry;
pub mod router;
pub mod services;
pub mod topics;

pub use builder::{App, AppBuilder, Plugin};
pub use config::{AppConfig, Config, ConfigError, RunMode};
pub use context::RequestContext;
pub use data::{DataProvider, StoreError};
pub use discovery::{NoopRegistrar, ServiceRegistrar};
pub use error::{ok, ok_message, AppError, ErrorCode};
pub use extension::{Extension, ExtensionError, ExtensionKind, ExtensionStatus, ServiceInfo};
pub use health::{HealthIndicator, HealthStatus};
pub use lifecycle::{LifecycleError, LifecycleOrchestrator, StartupReport};
pub use manager::ExtensionManager;
pub use registry::{ExtensionEntry, ExtensionRegistry, RegistryError};
pub use router::RouteTable;
pub use services::{ServiceError, ServiceHandle, ServiceLocator, ServiceMap};

/// Re-export of the HTTP types used throughout the extension contract.
pub mod http {
    pub use axum::{Json, Router};
    pub use http::{header, Method, Request, StatusCode};
}
