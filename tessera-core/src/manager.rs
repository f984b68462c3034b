use std::sync::Arc;

use tessera_events::EventBus;

use crate::config::AppConfig;
use crate::registry::ExtensionRegistry;
use crate::services::ServiceLocator;

struct ManagerInner {
    config: Arc<AppConfig>,
    registry: Arc<ExtensionRegistry>,
    locator: ServiceLocator,
    events: EventBus,
}

/// Shared handle extensions receive in `init`.
///
/// Bundles the registry, the service locator, the event bus and the config
/// snapshot. Cloning is cheap; all clones point at the same runtime state.
#[derive(Clone)]
pub struct ExtensionManager {
    inner: Arc<ManagerInner>,
}

impl ExtensionManager {
    pub fn new(config: Arc<AppConfig>, events: EventBus) -> Self {
        let registry = Arc::new(ExtensionRegistry::new());
        let locator = ServiceLocator::new(registry.clone());
        Self {
            inner: Arc::new(ManagerInner {
                config,
                registry,
                locator,
                events,
            }),
        }
    }

    pub fn config(&self) -> &Arc<AppConfig> {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.inner.registry
    }

    pub fn services(&self) -> &ServiceLocator {
        &self.inner.locator
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }
}
