use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use axum::Router;
use serde_json::json;

use crate::extension::{ExtensionKind, ExtensionStatus};
use crate::manager::ExtensionManager;
use crate::registry::{ExtensionEntry, RegistryError};
use crate::topics;

/// Cause recorded on extensions skipped because a strong dependency failed.
pub const CAUSE_DEPENDENCY_FAILED: &str = "dependency_failed";

/// Lifecycle orchestration failure.
#[derive(Debug)]
pub enum LifecycleError {
    /// The strong dependency graph contains a cycle.
    CycleDetected { participants: Vec<String> },
    /// A single-extension start/stop targeted an unknown name.
    NotFound(String),
    /// A lifecycle phase returned an error for the named extension.
    PhaseFailed { name: String, message: String },
    /// A strong dependency of the named extension is not Ready.
    DependencyNotReady { name: String, dependency: String },
    /// The extension cannot stop while a Ready extension strongly depends on it.
    RequiredBy { name: String, dependent: String },
    Registry(RegistryError),
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleError::CycleDetected { participants } => {
                write!(f, "dependency cycle detected: {}", participants.join(", "))
            }
            LifecycleError::NotFound(name) => write!(f, "extension '{name}' is not registered"),
            LifecycleError::PhaseFailed { name, message } => {
                write!(f, "extension '{name}' failed: {message}")
            }
            LifecycleError::DependencyNotReady { name, dependency } => {
                write!(f, "extension '{name}': dependency '{dependency}' is not ready")
            }
            LifecycleError::RequiredBy { name, dependent } => {
                write!(f, "extension '{name}' is required by ready extension '{dependent}'")
            }
            LifecycleError::Registry(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for LifecycleError {}

impl From<RegistryError> for LifecycleError {
    fn from(err: RegistryError) -> Self {
        LifecycleError::Registry(err)
    }
}

impl From<LifecycleError> for crate::error::AppError {
    fn from(err: LifecycleError) -> Self {
        use crate::error::{AppError, ErrorCode};
        match &err {
            LifecycleError::CycleDetected { .. } => {
                AppError::new(ErrorCode::CycleDetected, err.to_string())
            }
            LifecycleError::NotFound(_) => AppError::not_found(err.to_string()),
            LifecycleError::DependencyNotReady { .. } => {
                AppError::new(ErrorCode::DependencyFailed, err.to_string())
            }
            LifecycleError::RequiredBy { .. } => AppError::conflict(err.to_string()),
            LifecycleError::PhaseFailed { .. } => AppError::internal(err.to_string()),
            LifecycleError::Registry(e) => e.clone().into(),
        }
    }
}

/// One extension's HTTP contribution, collected at Ready time.
pub struct RouteContribution {
    pub name: String,
    pub group: String,
    pub kind: ExtensionKind,
    pub router: Router,
}

/// Outcome of a full startup pass.
#[derive(Default)]
pub struct StartupReport {
    /// Route fragments of extensions that reached Ready, in Ready order.
    pub routes: Vec<RouteContribution>,
    /// Extensions that failed, with the recorded cause.
    pub failed: Vec<(String, String)>,
    /// Names that reached Ready, in Ready order.
    pub ready: Vec<String>,
}

#[derive(Clone, Copy)]
enum Phase {
    PreInit,
    Init,
    PostInit,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::PreInit => "pre_init",
            Phase::Init => "init",
            Phase::PostInit => "post_init",
        }
    }
}

/// Execution plan over the strong dependency graph.
struct Plan {
    /// Topological layers; extensions within a layer have no mutual ordering
    /// constraint and run concurrently.
    layers: Vec<Vec<String>>,
    /// Extensions excluded upfront because a strong dependency is absent,
    /// together with their transitive dependents.
    excluded: Vec<String>,
    /// Reverse edges: name -> names that strongly depend on it.
    dependents: HashMap<String, Vec<String>>,
}

fn build_plan(entries: &[Arc<ExtensionEntry>]) -> Result<Plan, LifecycleError> {
    let names: HashSet<String> = entries.iter().map(|e| e.name().to_string()).collect();
    let mut deps: HashMap<String, Vec<String>> = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

    for entry in entries {
        let name = entry.name().to_string();
        let strong = entry.extension().dependencies();
        for dep in &strong {
            dependents.entry(dep.clone()).or_default().push(name.clone());
        }
        deps.insert(name, strong);
    }

    // Extensions with an unregistered strong dependency never run; their
    // transitive dependents are excluded with them.
    let mut excluded: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = deps
        .iter()
        .filter(|(_, ds)| ds.iter().any(|d| !names.contains(d)))
        .map(|(n, _)| n.clone())
        .collect();
    while let Some(name) = queue.pop_front() {
        if excluded.insert(name.clone()) {
            if let Some(ds) = dependents.get(&name) {
                queue.extend(ds.iter().cloned());
            }
        }
    }

    // Kahn's algorithm over the remaining nodes, preserving registration
    // order inside each layer.
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        let name = entry.name();
        if excluded.contains(name) {
            continue;
        }
        let degree = deps[name]
            .iter()
            .filter(|d| !excluded.contains(*d))
            .count();
        in_degree.insert(name.to_string(), degree);
    }

    let mut layers = Vec::new();
    let mut placed = 0usize;
    let mut current: Vec<String> = entries
        .iter()
        .map(|e| e.name().to_string())
        .filter(|n| in_degree.get(n) == Some(&0))
        .collect();

    while !current.is_empty() {
        placed += current.len();
        let mut next = Vec::new();
        for name in &current {
            if let Some(ds) = dependents.get(name) {
                for dependent in ds {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent.clone());
                        }
                    }
                }
            }
        }
        // Keep deterministic order: sort the next layer by registration order.
        let order: HashMap<&str, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name(), i))
            .collect();
        next.sort_by_key(|n| order.get(n.as_str()).copied().unwrap_or(usize::MAX));
        layers.push(std::mem::replace(&mut current, next));
    }

    if placed < in_degree.len() {
        let placed_names: HashSet<&String> = layers.iter().flatten().collect();
        let mut participants: Vec<String> = in_degree
            .keys()
            .filter(|name| !placed_names.contains(name))
            .cloned()
            .collect();
        participants.sort();
        return Err(LifecycleError::CycleDetected { participants });
    }

    let mut excluded: Vec<String> = excluded.into_iter().collect();
    excluded.sort();
    Ok(Plan {
        layers,
        excluded,
        dependents,
    })
}

/// Drives registered extensions through the four-phase startup and the
/// reverse-ordered shutdown.
pub struct LifecycleOrchestrator;

impl LifecycleOrchestrator {
    /// Run the full startup sequence over every registered extension.
    ///
    /// Each topological layer is taken through `pre_init` → `init` →
    /// `post_init` → Ready before the next layer begins, so a strong
    /// dependency is always Ready by the time its dependent's `init` runs.
    /// Within a layer the phases execute concurrently.
    ///
    /// A cycle aborts before any phase runs; phase errors fail only the
    /// offending extension and its transitive strong dependents.
    pub async fn start(manager: &ExtensionManager) -> Result<StartupReport, LifecycleError> {
        let entries = manager.registry().list();
        let plan = build_plan(&entries)?;

        let mut failed: HashSet<String> = HashSet::new();
        for name in &plan.excluded {
            if let Some(entry) = manager.registry().entry(name) {
                entry.fail(CAUSE_DEPENDENCY_FAILED);
                tracing::warn!(extension = %name, "strong dependency missing, extension skipped");
            }
            failed.insert(name.clone());
        }

        let mut report = StartupReport::default();

        for layer in &plan.layers {
            for phase in [Phase::PreInit, Phase::Init, Phase::PostInit] {
                Self::run_phase(manager, layer, phase, &plan.dependents, &mut failed).await;
            }

            for name in layer {
                if failed.contains(name) {
                    continue;
                }
                let Some(entry) = manager.registry().entry(name) else {
                    continue;
                };
                entry.advance(ExtensionStatus::Ready)?;
                tracing::info!(extension = %name, "extension ready");
                manager
                    .events()
                    .publish(&topics::ext_ready(name), json!({ "name": name }))
                    .await;
                if let Some(router) = entry.extension().register_routes() {
                    report.routes.push(RouteContribution {
                        name: name.clone(),
                        group: entry.extension().group().to_string(),
                        kind: entry.extension().kind(),
                        router,
                    });
                }
                report.ready.push(name.clone());
            }
        }

        for name in failed {
            let cause = manager
                .registry()
                .entry(&name)
                .and_then(|e| e.failure())
                .unwrap_or_else(|| CAUSE_DEPENDENCY_FAILED.to_string());
            report.failed.push((name, cause));
        }
        report.failed.sort();
        Ok(report)
    }

    /// Run one phase for every non-failed extension of a layer, concurrently.
    async fn run_phase(
        manager: &ExtensionManager,
        layer: &[String],
        phase: Phase,
        dependents: &HashMap<String, Vec<String>>,
        failed: &mut HashSet<String>,
    ) {
        let mut tasks = Vec::new();
        for name in layer {
            if failed.contains(name) {
                continue;
            }
            let Some(entry) = manager.registry().entry(name) else {
                continue;
            };
            let manager = manager.clone();
            let name = name.clone();
            tasks.push(tokio::spawn(async move {
                let ext = entry.extension().clone();
                let result = match phase {
                    Phase::PreInit => ext.pre_init().await,
                    Phase::Init => ext.init(manager.config().clone(), manager.clone()).await,
                    Phase::PostInit => ext.post_init().await,
                };
                (name, entry, result)
            }));
        }

        for task in tasks {
            let Ok((name, entry, result)) = task.await else {
                continue;
            };
            match result {
                Ok(()) => {
                    let advanced = match phase {
                        Phase::PreInit => entry.advance(ExtensionStatus::PreInited),
                        Phase::Init => entry.advance(ExtensionStatus::Inited),
                        Phase::PostInit => Ok(()),
                    };
                    if let Err(err) = advanced {
                        tracing::error!(extension = %name, error = %err, "status advance failed");
                    }
                }
                Err(err) => {
                    tracing::error!(
                        extension = %name,
                        phase = phase.as_str(),
                        error = %err,
                        "lifecycle phase failed"
                    );
                    entry.fail(err.message());
                    Self::fail_dependents(manager, &name, dependents, failed);
                    failed.insert(name);
                }
            }
        }
    }

    /// Transitively mark strong dependents of `name` as Failed.
    fn fail_dependents(
        manager: &ExtensionManager,
        name: &str,
        dependents: &HashMap<String, Vec<String>>,
        failed: &mut HashSet<String>,
    ) {
        let mut queue: VecDeque<String> = dependents
            .get(name)
            .map(|ds| ds.iter().cloned().collect())
            .unwrap_or_default();
        while let Some(dependent) = queue.pop_front() {
            if failed.insert(dependent.clone()) {
                if let Some(entry) = manager.registry().entry(&dependent) {
                    entry.fail(CAUSE_DEPENDENCY_FAILED);
                    tracing::warn!(
                        extension = %dependent,
                        cause = %name,
                        "extension skipped, strong dependency failed"
                    );
                }
                if let Some(ds) = dependents.get(&dependent) {
                    queue.extend(ds.iter().cloned());
                }
            }
        }
    }

    /// Reverse-ordered shutdown: publish `exts.<name>.stopping`, revoke the
    /// extension's event subscriptions, run `cleanup` and mark `Stopped`.
    ///
    /// Cleanup errors are collected and returned; they never abort the pass.
    pub async fn shutdown(manager: &ExtensionManager) -> Vec<(String, String)> {
        let entries = manager.registry().list();
        let order: Vec<Arc<ExtensionEntry>> = match build_plan(&entries) {
            Ok(plan) => {
                let mut names: Vec<String> = plan.layers.into_iter().flatten().collect();
                names.reverse();
                names
                    .into_iter()
                    .filter_map(|n| manager.registry().entry(&n))
                    .collect()
            }
            // Startup refused cyclic graphs, but be safe: fall back to
            // reverse registration order.
            Err(_) => entries.into_iter().rev().collect(),
        };

        let mut errors = Vec::new();
        for entry in order {
            if entry.status() != ExtensionStatus::Ready {
                continue;
            }
            let name = entry.name().to_string();
            if let Err(err) = entry.advance(ExtensionStatus::Stopping) {
                tracing::error!(extension = %name, error = %err, "status advance failed");
                continue;
            }
            manager
                .events()
                .publish(&topics::ext_stopping(&name), json!({ "name": name }))
                .await;
            manager.events().unsubscribe_all(&name).await;
            if let Err(err) = entry.extension().cleanup().await {
                tracing::error!(extension = %name, error = %err, "cleanup failed");
                errors.push((name.clone(), err.message().to_string()));
            }
            if let Err(err) = entry.advance(ExtensionStatus::Stopped) {
                tracing::error!(extension = %name, error = %err, "status advance failed");
            }
            tracing::info!(extension = %name, "extension stopped");
        }
        errors
    }

    /// Drive a single freshly registered extension to Ready.
    ///
    /// Used by the plugin host for post-boot loads. All strong dependencies
    /// must already be Ready.
    pub async fn start_one(
        manager: &ExtensionManager,
        name: &str,
    ) -> Result<Option<RouteContribution>, LifecycleError> {
        let entry = manager
            .registry()
            .entry(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        let ext = entry.extension().clone();

        for dep in ext.dependencies() {
            if manager.registry().status(&dep) != Some(ExtensionStatus::Ready) {
                entry.fail(CAUSE_DEPENDENCY_FAILED);
                return Err(LifecycleError::DependencyNotReady {
                    name: name.to_string(),
                    dependency: dep,
                });
            }
        }

        let phases: [(Phase, Option<ExtensionStatus>); 3] = [
            (Phase::PreInit, Some(ExtensionStatus::PreInited)),
            (Phase::Init, Some(ExtensionStatus::Inited)),
            (Phase::PostInit, None),
        ];
        for (phase, next) in phases {
            let result = match phase {
                Phase::PreInit => ext.pre_init().await,
                Phase::Init => ext.init(manager.config().clone(), manager.clone()).await,
                Phase::PostInit => ext.post_init().await,
            };
            if let Err(err) = result {
                entry.fail(err.message());
                return Err(LifecycleError::PhaseFailed {
                    name: name.to_string(),
                    message: err.message().to_string(),
                });
            }
            if let Some(next) = next {
                entry.advance(next)?;
            }
        }

        entry.advance(ExtensionStatus::Ready)?;
        tracing::info!(extension = %name, "extension ready");
        manager
            .events()
            .publish(&topics::ext_ready(name), json!({ "name": name }))
            .await;

        Ok(ext.register_routes().map(|router| RouteContribution {
            name: name.to_string(),
            group: ext.group().to_string(),
            kind: ext.kind(),
            router,
        }))
    }

    /// Stop a single Ready extension.
    ///
    /// Refuses while another Ready extension strongly depends on it. Already
    /// stopped or failed extensions are a no-op.
    pub async fn stop_one(manager: &ExtensionManager, name: &str) -> Result<(), LifecycleError> {
        let entry = manager
            .registry()
            .entry(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;

        match entry.status() {
            ExtensionStatus::Ready => {}
            ExtensionStatus::Stopped | ExtensionStatus::Failed => return Ok(()),
            _ => return Err(LifecycleError::Registry(RegistryError::Busy(name.to_string()))),
        }

        for other in manager.registry().list() {
            if other.name() != name
                && other.status() == ExtensionStatus::Ready
                && other.extension().dependencies().iter().any(|d| d == name)
            {
                return Err(LifecycleError::RequiredBy {
                    name: name.to_string(),
                    dependent: other.name().to_string(),
                });
            }
        }

        entry.advance(ExtensionStatus::Stopping)?;
        manager
            .events()
            .publish(&topics::ext_stopping(name), json!({ "name": name }))
            .await;
        manager.events().unsubscribe_all(name).await;
        if let Err(err) = entry.extension().cleanup().await {
            tracing::error!(extension = %name, error = %err, "cleanup failed");
        }
        entry.advance(ExtensionStatus::Stopped)?;
        tracing::info!(extension = %name, "extension stopped");
        Ok(())
    }
}
