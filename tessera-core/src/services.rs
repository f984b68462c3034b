use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::extension::ExtensionStatus;
use crate::registry::ExtensionRegistry;

/// Opaque capability owned by the declaring extension.
///
/// Handles carry `Arc<dyn Any>`; consumers recover the published facade with
/// the capability cast [`cast`](Self::cast), which returns `None` on a shape
/// mismatch. Extensions publish small stable facade types (usually
/// `Arc<dyn SomeFacade>`) rather than their concrete implementation types,
/// so implementations never leak across extension boundaries.
#[derive(Clone)]
pub struct ServiceHandle {
    inner: Arc<dyn Any + Send + Sync>,
}

impl ServiceHandle {
    /// Wrap a value. For trait facades, `value` is typically an
    /// `Arc<dyn Facade>` — itself a sized type, so it round-trips through
    /// the cast.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Capability cast: recover the published value by exact type.
    pub fn cast<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner.downcast_ref::<T>().cloned()
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServiceHandle(..)")
    }
}

/// Named service handles exposed by one extension.
#[derive(Clone, Default)]
pub struct ServiceMap {
    inner: HashMap<String, ServiceHandle>,
}

impl ServiceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with<T: Send + Sync + 'static>(mut self, name: &str, value: T) -> Self {
        self.inner.insert(name.to_string(), ServiceHandle::new(value));
        self
    }

    pub fn insert(&mut self, name: &str, handle: ServiceHandle) {
        self.inner.insert(name.to_string(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&ServiceHandle> {
        self.inner.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.inner.keys().map(String::as_str).collect()
    }
}

/// Locator failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The extension is unknown or has not reached Ready.
    NotReady { extension: String },
    /// The extension is Ready but does not declare the named service.
    Missing { extension: String, service: String },
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::NotReady { extension } => {
                write!(f, "service not ready: extension '{extension}'")
            }
            ServiceError::Missing { extension, service } => {
                write!(f, "service missing: '{service}' on extension '{extension}'")
            }
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ServiceError> for crate::error::AppError {
    fn from(err: ServiceError) -> Self {
        let code = match err {
            ServiceError::NotReady { .. } => crate::error::ErrorCode::ServiceNotReady,
            ServiceError::Missing { .. } => crate::error::ErrorCode::ServiceMissing,
        };
        crate::error::AppError::new(code, err.to_string())
    }
}

/// Resolves `(extension, service) -> handle` for cross-extension calls.
///
/// Resolution is lazy: nothing is resolved at init time, so mutually
/// referencing extensions work without ordering tricks. Consumers cache the
/// handle and re-resolve on the owning extension's `exts.<name>.ready`
/// event; that is also the recovery path when a weakly-depended-upon
/// extension appears late.
///
/// The read path takes the registry's shared lock only long enough to copy
/// out the entry snapshot.
#[derive(Clone)]
pub struct ServiceLocator {
    registry: Arc<ExtensionRegistry>,
}

impl ServiceLocator {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve a sibling extension's named service handle.
    pub fn get_cross_service(
        &self,
        extension: &str,
        service: &str,
    ) -> Result<ServiceHandle, ServiceError> {
        let entry = self
            .registry
            .entry(extension)
            .filter(|e| e.status() == ExtensionStatus::Ready)
            .ok_or_else(|| ServiceError::NotReady {
                extension: extension.to_string(),
            })?;

        entry
            .extension()
            .services()
            .get(service)
            .cloned()
            .ok_or_else(|| ServiceError::Missing {
                extension: extension.to_string(),
                service: service.to_string(),
            })
    }

    /// Resolve and cast in one step.
    pub fn get_typed<T: Clone + Send + Sync + 'static>(
        &self,
        extension: &str,
        service: &str,
    ) -> Result<T, ServiceError> {
        let handle = self.get_cross_service(extension, service)?;
        handle.cast::<T>().ok_or_else(|| ServiceError::Missing {
            extension: extension.to_string(),
            service: service.to_string(),
        })
    }
}
