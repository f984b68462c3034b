use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::extension::{Extension, ExtensionKind, ExtensionStatus};

/// Registry failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An extension with this name is already registered.
    DuplicateName(String),
    NotFound(String),
    /// The extension is not in a removable status (`Stopped` / `Failed`).
    Busy(String),
    /// A status transition would skip a phase.
    InvalidTransition {
        name: String,
        from: ExtensionStatus,
        to: ExtensionStatus,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateName(name) => {
                write!(f, "extension '{name}' is already registered")
            }
            RegistryError::NotFound(name) => write!(f, "extension '{name}' is not registered"),
            RegistryError::Busy(name) => {
                write!(f, "extension '{name}' is busy and cannot be removed")
            }
            RegistryError::InvalidTransition { name, from, to } => write!(
                f,
                "extension '{name}': illegal status transition {} -> {}",
                from.as_str(),
                to.as_str()
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<RegistryError> for crate::error::AppError {
    fn from(err: RegistryError) -> Self {
        use crate::error::{AppError, ErrorCode};
        match &err {
            RegistryError::DuplicateName(_) => {
                AppError::new(ErrorCode::DuplicateName, err.to_string())
            }
            RegistryError::NotFound(_) => AppError::not_found(err.to_string()),
            RegistryError::Busy(_) => AppError::conflict(err.to_string()),
            RegistryError::InvalidTransition { .. } => AppError::internal(err.to_string()),
        }
    }
}

/// A registered extension together with its mutable runtime state.
pub struct ExtensionEntry {
    extension: Arc<dyn Extension>,
    status: RwLock<ExtensionStatus>,
    failure: RwLock<Option<String>>,
}

impl ExtensionEntry {
    fn new(extension: Arc<dyn Extension>) -> Self {
        Self {
            extension,
            status: RwLock::new(ExtensionStatus::Registered),
            failure: RwLock::new(None),
        }
    }

    pub fn extension(&self) -> &Arc<dyn Extension> {
        &self.extension
    }

    pub fn name(&self) -> &str {
        self.extension.name()
    }

    pub fn status(&self) -> ExtensionStatus {
        *self.status.read().expect("status lock poisoned")
    }

    /// Cause recorded when the extension failed (e.g. `dependency_failed`).
    pub fn failure(&self) -> Option<String> {
        self.failure.read().expect("failure lock poisoned").clone()
    }

    /// Advance to `next`, enforcing the monotonic phase order.
    pub fn advance(&self, next: ExtensionStatus) -> Result<(), RegistryError> {
        let mut status = self.status.write().expect("status lock poisoned");
        if !status.can_advance_to(next) {
            return Err(RegistryError::InvalidTransition {
                name: self.extension.name().to_string(),
                from: *status,
                to: next,
            });
        }
        *status = next;
        Ok(())
    }

    /// Mark the extension failed with a cause. Idempotent once failed.
    pub fn fail(&self, cause: impl Into<String>) {
        let mut status = self.status.write().expect("status lock poisoned");
        if *status != ExtensionStatus::Failed {
            *status = ExtensionStatus::Failed;
            *self.failure.write().expect("failure lock poisoned") = Some(cause.into());
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Arc<ExtensionEntry>>,
    /// Registration order, for deterministic iteration.
    order: Vec<String>,
}

/// The single mutable directory of extensions.
///
/// Writes (register, remove, status transitions inside entries) take the
/// exclusive lock; lookups take the shared lock. Group and kind queries
/// iterate in registration order.
#[derive(Default)]
pub struct ExtensionRegistry {
    inner: RwLock<Inner>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an extension in `Registered` status.
    pub fn register(&self, extension: Arc<dyn Extension>) -> Result<(), RegistryError> {
        let name = extension.name().to_string();
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.entries.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        inner
            .entries
            .insert(name.clone(), Arc::new(ExtensionEntry::new(extension)));
        inner.order.push(name.clone());
        tracing::info!(extension = %name, "extension registered");
        Ok(())
    }

    /// Remove an extension; only allowed in `Stopped` or `Failed` status.
    pub fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let entry = inner
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        match entry.status() {
            ExtensionStatus::Stopped | ExtensionStatus::Failed => {}
            _ => return Err(RegistryError::Busy(name.to_string())),
        }
        inner.entries.remove(name);
        inner.order.retain(|n| n != name);
        tracing::info!(extension = %name, "extension removed");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.entry(name).map(|e| e.extension.clone())
    }

    pub fn entry(&self, name: &str) -> Option<Arc<ExtensionEntry>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .entries
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .entries
            .contains_key(name)
    }

    pub fn status(&self, name: &str) -> Option<ExtensionStatus> {
        self.entry(name).map(|e| e.status())
    }

    /// All entries in registration order.
    pub fn list(&self) -> Vec<Arc<ExtensionEntry>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .order
            .iter()
            .filter_map(|name| inner.entries.get(name).cloned())
            .collect()
    }

    /// Entries in `group`, in registration order.
    pub fn by_group(&self, group: &str) -> Vec<Arc<ExtensionEntry>> {
        self.list()
            .into_iter()
            .filter(|e| e.extension.group() == group)
            .collect()
    }

    /// Entries of `kind`, in registration order.
    pub fn by_kind(&self, kind: ExtensionKind) -> Vec<Arc<ExtensionEntry>> {
        self.list()
            .into_iter()
            .filter(|e| e.extension.kind() == kind)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::extension::ExtensionError;
    use crate::manager::ExtensionManager;
    use async_trait::async_trait;

    struct Stub {
        name: &'static str,
        group: &'static str,
        kind: ExtensionKind,
    }

    impl Stub {
        fn module(name: &'static str, group: &'static str) -> Arc<dyn Extension> {
            Arc::new(Stub {
                name,
                group,
                kind: ExtensionKind::Module,
            })
        }

        fn plugin(name: &'static str, group: &'static str) -> Arc<dyn Extension> {
            Arc::new(Stub {
                name,
                group,
                kind: ExtensionKind::Plugin,
            })
        }
    }

    #[async_trait]
    impl Extension for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn group(&self) -> &str {
            self.group
        }

        fn kind(&self) -> ExtensionKind {
            self.kind
        }

        async fn init(
            &self,
            _config: std::sync::Arc<AppConfig>,
            _manager: ExtensionManager,
        ) -> Result<(), ExtensionError> {
            Ok(())
        }
    }

    #[test]
    fn register_then_get() {
        let registry = ExtensionRegistry::new();
        registry.register(Stub::module("user", "sys")).unwrap();
        let ext = registry.get("user").unwrap();
        assert_eq!(ext.name(), "user");
        assert_eq!(registry.status("user"), Some(ExtensionStatus::Registered));
    }

    #[test]
    fn duplicate_name_is_rejected_and_size_unchanged() {
        let registry = ExtensionRegistry::new();
        registry.register(Stub::module("user", "sys")).unwrap();
        let err = registry.register(Stub::module("user", "plug")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("user".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn group_and_kind_queries_keep_registration_order() {
        let registry = ExtensionRegistry::new();
        registry.register(Stub::module("tenant", "sys")).unwrap();
        registry.register(Stub::plugin("counter", "plug")).unwrap();
        registry.register(Stub::module("user", "sys")).unwrap();

        let sys: Vec<_> = registry
            .by_group("sys")
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(sys, vec!["tenant", "user"]);

        let plugins: Vec<_> = registry
            .by_kind(ExtensionKind::Plugin)
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(plugins, vec!["counter"]);
    }

    #[test]
    fn remove_requires_terminal_status() {
        let registry = ExtensionRegistry::new();
        registry.register(Stub::module("user", "sys")).unwrap();
        assert_eq!(
            registry.remove("user").unwrap_err(),
            RegistryError::Busy("user".to_string())
        );

        registry.entry("user").unwrap().fail("boom");
        registry.remove("user").unwrap();
        assert!(!registry.contains("user"));

        assert_eq!(
            registry.remove("user").unwrap_err(),
            RegistryError::NotFound("user".to_string())
        );
    }

    #[test]
    fn advance_rejects_phase_skips() {
        let registry = ExtensionRegistry::new();
        registry.register(Stub::module("user", "sys")).unwrap();
        let entry = registry.entry("user").unwrap();

        entry.advance(ExtensionStatus::PreInited).unwrap();
        let err = entry.advance(ExtensionStatus::Ready).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
        assert_eq!(entry.status(), ExtensionStatus::PreInited);
    }

    #[test]
    fn fail_records_cause_once() {
        let registry = ExtensionRegistry::new();
        registry.register(Stub::module("user", "sys")).unwrap();
        let entry = registry.entry("user").unwrap();

        entry.fail("dependency_failed");
        entry.fail("other");
        assert_eq!(entry.status(), ExtensionStatus::Failed);
        assert_eq!(entry.failure().as_deref(), Some("dependency_failed"));
    }
}
