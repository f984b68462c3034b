use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use libloading::Library;
use serde::Serialize;
use tokio::sync::Mutex;

use tessera_core::{
    Extension, ExtensionKind, ExtensionManager, ExtensionStatus, LifecycleOrchestrator,
    RouteTable, RunMode,
};

use crate::error::LoaderError;
use crate::statics::static_plugins;

/// The single exported symbol every plugin artifact provides.
pub const PLUGIN_ENTRY_SYMBOL: &[u8] = b"PluginInstance";

type PluginEntry = unsafe extern "C" fn() -> *mut dyn Extension;

/// Generate the exported `PluginInstance` entry for a plugin crate.
///
/// ```ignore
/// pub struct Counter;
/// // impl Extension for Counter ...
/// tessera_loader::declare_plugin!(Counter);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($ctor:expr) => {
        #[no_mangle]
        #[allow(non_snake_case, improper_ctypes_definitions)]
        pub extern "C" fn PluginInstance() -> *mut dyn $crate::Extension {
            let instance: Box<dyn $crate::Extension> = Box::new($ctor);
            Box::into_raw(instance)
        }
    };
}

struct Artifact {
    path: PathBuf,
    loaded_at: DateTime<Utc>,
    library: Library,
}

#[derive(Default)]
struct HostInner {
    artifacts: HashMap<String, Artifact>,
    /// Libraries of unloaded plugins. Kept mapped: lingering handles into
    /// plugin code must stay valid (soft-unload).
    retired: Vec<Library>,
}

/// Descriptor returned by the management surface.
#[derive(Debug, Clone, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Discovers, loads, reloads and unloads dynamic plugin artifacts.
///
/// Two modes, selected by run mode: in non-release modes plugins come from
/// the process-global self-registration list (see
/// [`register_static_plugin`](crate::register_static_plugin)); in release
/// mode the configured plugin directory is scanned for artifacts with the
/// platform dynamic-library suffix, filtered by the include/exclude lists
/// (the include list is a whitelist when non-empty, otherwise the exclude
/// list is a blacklist).
///
/// Load/unload/reload are serialized on one async mutex; concurrent
/// management calls queue.
pub struct PluginHost {
    manager: ExtensionManager,
    route_table: RouteTable,
    inner: Mutex<HostInner>,
}

impl PluginHost {
    pub fn new(manager: ExtensionManager, route_table: RouteTable) -> Self {
        Self {
            manager,
            route_table,
            inner: Mutex::new(HostInner::default()),
        }
    }

    fn allowed(&self, name: &str) -> bool {
        let filter = &self.manager.config().extension;
        if !filter.includes.is_empty() {
            return filter.includes.iter().any(|n| n == name);
        }
        !filter.excludes.iter().any(|n| n == name)
    }

    /// Artifact name: file basename without the library extension.
    fn artifact_name(path: &Path) -> Option<String> {
        path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
    }

    /// Enumerate allowed plugin artifacts in the configured directory.
    pub fn discover(&self) -> Vec<PathBuf> {
        let dir = PathBuf::from(&self.manager.config().extension.path);
        let mut found = Vec::new();
        let Ok(entries) = std::fs::read_dir(&dir) else {
            tracing::debug!(dir = %dir.display(), "plugin directory not readable");
            return found;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_artifact = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == std::env::consts::DLL_EXTENSION)
                .unwrap_or(false);
            if !is_artifact {
                continue;
            }
            match Self::artifact_name(&path) {
                Some(name) if self.allowed(&name) => found.push(path),
                Some(name) => tracing::info!(plugin = %name, "skipped by include/exclude filter"),
                None => {}
            }
        }
        found.sort();
        found
    }

    /// Register every available plugin into the registry (without starting
    /// it — the orchestrator drives the lifecycle at boot).
    ///
    /// Returns the names that were registered.
    pub async fn load_all(&self) -> Vec<String> {
        let mut registered = Vec::new();
        if self.manager.config().run_mode == RunMode::Release {
            let mut inner = self.inner.lock().await;
            for path in self.discover() {
                let Some(name) = Self::artifact_name(&path) else {
                    continue;
                };
                match instantiate(&path) {
                    Ok((ext, library)) => {
                        let ext_name = ext.name().to_string();
                        if let Err(err) = self.manager.registry().register(ext) {
                            tracing::warn!(plugin = %ext_name, error = %err, "plugin not registered");
                            inner.retired.push(library);
                            continue;
                        }
                        inner.artifacts.insert(
                            name.clone(),
                            Artifact {
                                path,
                                loaded_at: Utc::now(),
                                library,
                            },
                        );
                        registered.push(ext_name);
                    }
                    Err(err) => tracing::error!(path = %path.display(), error = %err, "plugin load failed"),
                }
            }
        } else {
            for ext in static_plugins() {
                let name = ext.name().to_string();
                if !self.allowed(&name) {
                    tracing::info!(plugin = %name, "skipped by include/exclude filter");
                    continue;
                }
                match self.manager.registry().register(ext) {
                    Ok(()) => registered.push(name),
                    Err(err) => {
                        tracing::warn!(plugin = %name, error = %err, "plugin not registered")
                    }
                }
            }
        }
        registered
    }

    /// Dynamically load a plugin by name. No-op when already loaded.
    pub async fn load(&self, name: &str) -> Result<(), LoaderError> {
        let mut inner = self.inner.lock().await;
        if self.manager.registry().contains(name) {
            return Ok(());
        }
        if !self.allowed(name) {
            return Err(LoaderError::Filtered(name.to_string()));
        }

        if let Some(path) = self
            .discover()
            .into_iter()
            .find(|p| Self::artifact_name(p).as_deref() == Some(name))
        {
            self.open_register_start(&mut inner, path).await?;
            return Ok(());
        }

        // Development fallback: a self-registered plugin of this name.
        if let Some(ext) = static_plugins().into_iter().find(|e| e.name() == name) {
            self.manager.registry().register(ext)?;
            self.start(name).await?;
            return Ok(());
        }

        Err(LoaderError::ArtifactNotFound(name.to_string()))
    }

    /// Unload a plugin: cleanup, remove from the registry, retire the
    /// artifact. Fails while a Ready extension strongly depends on it.
    pub async fn unload(&self, name: &str) -> Result<(), LoaderError> {
        let mut inner = self.inner.lock().await;
        self.stop_and_remove(&mut inner, name).await
    }

    /// Unload then load, preserving name identity.
    ///
    /// Dependents observe `exts.<name>.stopping` followed by
    /// `exts.<name>.ready` and are expected to refresh cached service
    /// handles. Artifact-backed plugins are re-opened from disk; in-process
    /// instances are soft-reloaded (the prior instance is reused).
    pub async fn reload(&self, name: &str) -> Result<(), LoaderError> {
        let mut inner = self.inner.lock().await;

        let artifact_path = inner.artifacts.get(name).map(|a| a.path.clone());
        match artifact_path {
            Some(path) => {
                self.stop_and_remove(&mut inner, name).await?;
                self.open_register_start(&mut inner, path).await?;
            }
            None => {
                let ext = self
                    .manager
                    .registry()
                    .get(name)
                    .ok_or_else(|| LoaderError::ArtifactNotFound(name.to_string()))?;
                self.stop_and_remove(&mut inner, name).await?;
                self.manager.registry().register(ext)?;
                self.start(name).await?;
            }
        }
        Ok(())
    }

    /// Descriptors of all plugin-kind extensions, joined with artifact info.
    pub async fn list(&self) -> Vec<PluginDescriptor> {
        let inner = self.inner.lock().await;
        self.manager
            .registry()
            .by_kind(ExtensionKind::Plugin)
            .into_iter()
            .map(|entry| {
                let artifact = inner.artifacts.get(entry.name());
                PluginDescriptor {
                    name: entry.name().to_string(),
                    version: entry.extension().version().to_string(),
                    status: entry.status().as_str().to_string(),
                    path: artifact.map(|a| a.path.display().to_string()),
                    loaded_at: artifact.map(|a| a.loaded_at),
                }
            })
            .collect()
    }

    async fn open_register_start(
        &self,
        inner: &mut HostInner,
        path: PathBuf,
    ) -> Result<(), LoaderError> {
        let (ext, library) = instantiate(&path)?;
        let name = ext.name().to_string();
        self.manager.registry().register(ext)?;
        inner.artifacts.insert(
            name.clone(),
            Artifact {
                path,
                loaded_at: Utc::now(),
                library,
            },
        );
        self.start(&name).await
    }

    async fn start(&self, name: &str) -> Result<(), LoaderError> {
        let contribution = LifecycleOrchestrator::start_one(&self.manager, name).await?;
        if let Some(contribution) = contribution {
            self.route_table
                .install(&contribution.name, &contribution.group, contribution.router);
        }
        tracing::info!(plugin = %name, "plugin loaded");
        Ok(())
    }

    async fn stop_and_remove(
        &self,
        inner: &mut HostInner,
        name: &str,
    ) -> Result<(), LoaderError> {
        if self.manager.registry().status(name) == Some(ExtensionStatus::Ready) {
            LifecycleOrchestrator::stop_one(&self.manager, name).await?;
        }
        self.route_table.remove(name);
        self.manager.registry().remove(name)?;
        if let Some(artifact) = inner.artifacts.remove(name) {
            inner.retired.push(artifact.library);
        }
        tracing::info!(plugin = %name, "plugin unloaded");
        Ok(())
    }
}

fn instantiate(path: &Path) -> Result<(Arc<dyn Extension>, Library), LoaderError> {
    let library = unsafe { Library::new(path) }.map_err(|e| LoaderError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let entry = unsafe { library.get::<PluginEntry>(PLUGIN_ENTRY_SYMBOL) }.map_err(|e| {
        LoaderError::Symbol {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    })?;
    let raw = unsafe { entry() };
    let ext: Arc<dyn Extension> = Arc::from(unsafe { Box::from_raw(raw) });
    Ok((ext, library))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::config::AppConfig;
    use tessera_events::EventBus;

    fn host_with(config: AppConfig) -> PluginHost {
        let manager = ExtensionManager::new(Arc::new(config), EventBus::new());
        PluginHost::new(manager, RouteTable::new())
    }

    fn touch(dir: &Path, file: &str) {
        std::fs::write(dir.join(file), b"").unwrap();
    }

    #[tokio::test]
    async fn discover_filters_by_suffix_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let suffix = std::env::consts::DLL_EXTENSION;
        touch(dir.path(), &format!("libcounter.{suffix}"));
        touch(dir.path(), &format!("libmetrics.{suffix}"));
        touch(dir.path(), "notes.txt");

        let mut config = AppConfig::default();
        config.extension.path = dir.path().display().to_string();
        let host = host_with(config.clone());
        let names: Vec<String> = host
            .discover()
            .iter()
            .filter_map(|p| PluginHost::artifact_name(p))
            .collect();
        assert_eq!(names, vec!["libcounter", "libmetrics"]);

        // Include list is a whitelist when non-empty.
        config.extension.includes = vec!["libmetrics".to_string()];
        let host = host_with(config.clone());
        assert_eq!(host.discover().len(), 1);

        // Exclude list applies only without includes.
        config.extension.includes.clear();
        config.extension.excludes = vec!["libmetrics".to_string()];
        let host = host_with(config);
        let names: Vec<String> = host
            .discover()
            .iter()
            .filter_map(|p| PluginHost::artifact_name(p))
            .collect();
        assert_eq!(names, vec!["libcounter"]);
    }

    #[tokio::test]
    async fn missing_plugin_directory_discovers_nothing() {
        let mut config = AppConfig::default();
        config.extension.path = "/nonexistent/plugins".to_string();
        assert!(host_with(config).discover().is_empty());
    }

    #[tokio::test]
    async fn load_of_unknown_name_reports_artifact_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.extension.path = dir.path().display().to_string();
        let host = host_with(config);
        assert!(matches!(
            host.load("ghost").await,
            Err(LoaderError::ArtifactNotFound(_))
        ));
    }

    #[tokio::test]
    async fn load_of_excluded_name_is_filtered() {
        let mut config = AppConfig::default();
        config.extension.excludes = vec!["counter".to_string()];
        let host = host_with(config);
        assert!(matches!(
            host.load("counter").await,
            Err(LoaderError::Filtered(_))
        ));
    }
}
