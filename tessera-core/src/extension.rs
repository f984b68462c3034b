use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use crate::config::AppConfig;
use crate::manager::ExtensionManager;
use crate::services::ServiceMap;

/// Declared linkage of an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    /// Statically linked into the binary and registered by the builder.
    Module,
    /// Loaded from a dynamic library artifact at runtime.
    Plugin,
}

impl ExtensionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtensionKind::Module => "module",
            ExtensionKind::Plugin => "plugin",
        }
    }
}

/// Lifecycle status of a registered extension.
///
/// Transitions are monotonic through startup and shutdown; no status may
/// skip a phase:
///
/// ```text
/// Registered → PreInited → Inited → Ready → Stopping → Stopped
///          ↘          ↘         ↘
///                     Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionStatus {
    Registered,
    PreInited,
    Inited,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

impl ExtensionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtensionStatus::Registered => "registered",
            ExtensionStatus::PreInited => "pre_inited",
            ExtensionStatus::Inited => "inited",
            ExtensionStatus::Ready => "ready",
            ExtensionStatus::Stopping => "stopping",
            ExtensionStatus::Stopped => "stopped",
            ExtensionStatus::Failed => "failed",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: ExtensionStatus) -> bool {
        use ExtensionStatus::*;
        matches!(
            (self, next),
            (Registered, PreInited)
                | (PreInited, Inited)
                | (Inited, Ready)
                | (Ready, Stopping)
                | (Stopping, Stopped)
                | (Registered, Failed)
                | (PreInited, Failed)
                | (Inited, Failed)
        )
    }
}

/// Registration payload for external service discovery.
#[derive(Debug, Clone, Default)]
pub struct ServiceInfo {
    pub address: String,
    pub tags: Vec<String>,
    pub meta: HashMap<String, String>,
}

/// Error produced by an extension lifecycle step.
pub struct ExtensionError {
    message: String,
}

impl ExtensionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ExtensionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::fmt::Debug for ExtensionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for ExtensionError {}

impl From<String> for ExtensionError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ExtensionError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// The contract every feature unit implements, whether statically linked
/// (module) or dynamically loaded (plugin).
///
/// Identity methods are cheap and callable at any time. Lifecycle methods
/// are driven by the orchestrator in the fixed order `pre_init` → `init` →
/// `post_init` (startup) and `cleanup` (shutdown); any error aborts this
/// extension and transitively fails its strong dependents.
///
/// `register_routes` is invoked once, when the extension reaches Ready;
/// the returned fragment is nested under `/{group}` on the shared engine.
///
/// `services` returns the named handles the extension exposes to siblings;
/// a Ready extension guarantees every declared handle resolves through the
/// service locator.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Unique lowercase identifier.
    fn name(&self) -> &str;

    /// Semantic version string.
    fn version(&self) -> &str {
        "0.1.0"
    }

    fn description(&self) -> &str {
        ""
    }

    /// Domain bucket, used as the URL path prefix at route mount time.
    fn group(&self) -> &str {
        self.name()
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Module
    }

    /// Names of extensions that must be Ready before this one's `init` runs.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Names whose presence is desirable but not required. Their absence
    /// never blocks `init`; consumers re-resolve handles on the dependency's
    /// ready event instead.
    fn weak_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn pre_init(&self) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Main initialization. Receives the immutable config snapshot and the
    /// manager handle for registry / locator / event-bus access.
    async fn init(
        &self,
        config: Arc<AppConfig>,
        manager: ExtensionManager,
    ) -> Result<(), ExtensionError>;

    async fn post_init(&self) -> Result<(), ExtensionError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// HTTP contribution, nested under `/{group}` once the extension is Ready.
    fn register_routes(&self) -> Option<Router> {
        None
    }

    /// Named service handles exposed to sibling extensions.
    fn services(&self) -> ServiceMap {
        ServiceMap::new()
    }

    fn need_service_discovery(&self) -> bool {
        false
    }

    fn service_info(&self) -> Option<ServiceInfo> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        use ExtensionStatus::*;
        assert!(Registered.can_advance_to(PreInited));
        assert!(PreInited.can_advance_to(Inited));
        assert!(Inited.can_advance_to(Ready));
        assert!(Ready.can_advance_to(Stopping));
        assert!(Stopping.can_advance_to(Stopped));

        // No phase skipping.
        assert!(!Registered.can_advance_to(Inited));
        assert!(!Registered.can_advance_to(Ready));
        assert!(!PreInited.can_advance_to(Ready));
        assert!(!Stopped.can_advance_to(Registered));

        // Failure is reachable from the startup states only.
        assert!(Registered.can_advance_to(Failed));
        assert!(PreInited.can_advance_to(Failed));
        assert!(Inited.can_advance_to(Failed));
        assert!(!Ready.can_advance_to(Failed));
        assert!(!Stopped.can_advance_to(Failed));
    }
}
