//! The parallel execution engine: combines per-kind reconciled actions into
//! one layered schedule and runs it with bounded concurrency (spec.md §4.3).

use crate::core::cache::{InstallerRepositoryStore, InstallerStore, RuntimeStore, StateCache, ToolStore};
use crate::core::error::{CoreError, CoreResult};
use crate::core::graph::NodeId;
use crate::core::installer::{ActionContext, CancellationToken, Installer};
use crate::core::lock::StateLock;
use crate::core::reconciler::{
    installer_comparator, installer_repository_comparator, reconcile, runtime_comparator, tool_comparator, Action,
    ActionType, TAINT_REASON_PREFIX,
};
use crate::core::resource::{
    InstallerRepositorySpec, InstallerSpec, Kind, Resource, RuntimeSpec, TaintReason, ToolSpec, VersionKind,
};
use crate::core::state::{InstallerRepositoryState, InstallerState, RuntimeState, ToolState, UserState};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug_span, instrument};

/// Reference value from spec.md §4.3/§5; `set_parallelism` clamps to this.
pub const MAX_PARALLELISM: usize = 16;

/// Pure planning result, matching spec.md §4.3's `plan_all` contract exactly
/// (installer actions are intentionally not part of this tuple).
#[derive(Debug, Default)]
pub struct PlanResult {
    pub runtime_actions: Vec<Action<RuntimeSpec, RuntimeState>>,
    pub repository_actions: Vec<Action<InstallerRepositorySpec, InstallerRepositoryState>>,
    pub tool_actions: Vec<Action<ToolSpec, ToolState>>,
}

/// Outcome of a successful `apply`.
#[derive(Debug, Default)]
pub struct ApplySummary {
    pub layers_executed: usize,
    pub actions_executed: usize,
}

/// One action erased to a common enum so nodes of different kinds can share
/// a single per-layer task list (spec.md §9 "dependency graph keyed by
/// (kind,name)"; the graph owns keys, not typed resource objects).
enum PlannedAction {
    Runtime(Action<RuntimeSpec, RuntimeState>),
    Installer(Action<InstallerSpec, InstallerState>),
    Repository(Action<InstallerRepositorySpec, InstallerRepositoryState>),
    Tool(Action<ToolSpec, ToolState>),
}

impl PlannedAction {
    fn action_type(&self) -> ActionType {
        match self {
            PlannedAction::Runtime(a) => a.action_type,
            PlannedAction::Installer(a) => a.action_type,
            PlannedAction::Repository(a) => a.action_type,
            PlannedAction::Tool(a) => a.action_type,
        }
    }
}

struct ExpandedResources {
    runtimes: Vec<RuntimeSpec>,
    installers: Vec<InstallerSpec>,
    repositories: Vec<InstallerRepositorySpec>,
    tools: Vec<ToolSpec>,
}

fn expand_resources(resources: &[Resource]) -> CoreResult<ExpandedResources> {
    let mut runtimes = Vec::new();
    let mut installers = Vec::new();
    let mut repositories = Vec::new();
    let mut tools = Vec::new();
    let mut tool_sets = Vec::new();

    for resource in resources {
        resource.validate()?;
        match resource {
            Resource::Runtime(s) => runtimes.push(s.clone()),
            Resource::Installer(s) => installers.push(s.clone()),
            Resource::InstallerRepository(s) => repositories.push(s.clone()),
            Resource::Tool(s) => tools.push(s.clone()),
            Resource::ToolSet(s) => tool_sets.push(s.clone()),
        }
    }

    let mut seen: HashMap<String, NodeId> = tools
        .iter()
        .map(|t| (t.name.clone(), NodeId::new(Kind::Tool, &t.name)))
        .collect();

    for set in &tool_sets {
        for expanded in set.expand() {
            let id = NodeId::new(Kind::Tool, &expanded.name);
            if let Some(existing) = seen.get(&expanded.name) {
                return Err(CoreError::NameConflict {
                    name: expanded.name.clone(),
                    first: existing.clone(),
                    second: id,
                });
            }
            seen.insert(expanded.name.clone(), id);
            tools.push(expanded);
        }
    }

    Ok(ExpandedResources {
        runtimes,
        installers,
        repositories,
        tools,
    })
}

fn index_by_name<T: Clone>(items: &[T], name_of: impl Fn(&T) -> &str) -> HashMap<String, T> {
    items.iter().map(|item| (name_of(item).to_string(), item.clone())).collect()
}

fn check_removal_safety(
    runtime_actions: &[Action<RuntimeSpec, RuntimeState>],
    tool_specs: &HashMap<String, ToolSpec>,
) -> CoreResult<()> {
    for action in runtime_actions {
        if action.action_type == ActionType::Remove {
            if let Some(dependent) = tool_specs
                .values()
                .find(|t| t.runtime_ref.as_deref() == Some(action.name.as_str()))
            {
                return Err(CoreError::RemovalBlocked {
                    runtime: NodeId::new(Kind::Runtime, &action.name),
                    dependent: dependent.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// The dependency `NodeId`s a `Remove` action must run after, for ordering
/// purposes only. Only `ToolState` persists the refs it needs (installer,
/// runtime, repository); `Runtime`/`Installer`/`InstallerRepository` state
/// carries none, so those kinds are always leaves in the removal graph. A
/// dependency is only included if it too is being removed in this apply -
/// a surviving resource that a removed tool happens to reference needs no
/// relative ordering against the removal pass at all.
fn removal_dependencies(action: &PlannedAction, action_map: &HashMap<NodeId, PlannedAction>) -> Vec<NodeId> {
    let refs: Vec<NodeId> = match action {
        PlannedAction::Tool(a) => {
            let mut refs = Vec::new();
            if let Some(state) = &a.state {
                if let Some(r) = &state.installer_ref {
                    refs.push(NodeId::new(Kind::Installer, r));
                }
                if let Some(r) = &state.runtime_ref {
                    refs.push(NodeId::new(Kind::Runtime, r));
                }
                if let Some(r) = &state.repository_ref {
                    refs.push(NodeId::new(Kind::InstallerRepository, r));
                }
            }
            refs
        }
        PlannedAction::Runtime(_) | PlannedAction::Installer(_) | PlannedAction::Repository(_) => Vec::new(),
    };

    refs.into_iter()
        .filter(|dep| matches!(action_map.get(dep).map(|a| a.action_type()), Some(ActionType::Remove)))
        .collect()
}

fn taint_latest_tools(cache: &StateCache) {
    let store = ToolStore::new(cache);
    for name in store.names() {
        if let Some(mut state) = store.load(&name) {
            if state.version_kind == VersionKind::Latest {
                state.taint(TaintReason::SyncUpdate);
                store.save(&name, state);
            }
        }
    }
}

fn action_label(action_type: ActionType) -> &'static str {
    match action_type {
        ActionType::Install => "install",
        ActionType::Upgrade => "upgrade",
        ActionType::Reinstall => "reinstall",
        ActionType::Remove => "remove",
        ActionType::None => "none",
    }
}

/// Orchestrates a full `apply`: resolves, reconciles, and executes layer by
/// layer against the four installer backends (spec.md §4.3).
pub struct Executor {
    state_path: PathBuf,
    parallelism: usize,
    sync_mode: bool,
    resolver_configurer: Option<Box<dyn Fn(&UserState) + Send + Sync>>,
    runtime_installer: Box<dyn Installer<RuntimeSpec, RuntimeState> + Send + Sync>,
    installer_installer: Box<dyn Installer<InstallerSpec, InstallerState> + Send + Sync>,
    repository_installer: Box<dyn Installer<InstallerRepositorySpec, InstallerRepositoryState> + Send + Sync>,
    tool_installer: Box<dyn Installer<ToolSpec, ToolState> + Send + Sync>,
}

impl Executor {
    pub fn new(
        state_path: PathBuf,
        runtime_installer: Box<dyn Installer<RuntimeSpec, RuntimeState> + Send + Sync>,
        installer_installer: Box<dyn Installer<InstallerSpec, InstallerState> + Send + Sync>,
        repository_installer: Box<dyn Installer<InstallerRepositorySpec, InstallerRepositoryState> + Send + Sync>,
        tool_installer: Box<dyn Installer<ToolSpec, ToolState> + Send + Sync>,
    ) -> Self {
        Self {
            state_path,
            parallelism: 4,
            sync_mode: false,
            resolver_configurer: None,
            runtime_installer,
            installer_installer,
            repository_installer,
            tool_installer,
        }
    }

    pub fn set_parallelism(&mut self, n: usize) {
        self.parallelism = n.clamp(1, MAX_PARALLELISM);
    }

    pub fn set_sync_mode(&mut self, enabled: bool) {
        self.sync_mode = enabled;
    }

    pub fn set_resolver_configurer(&mut self, f: impl Fn(&UserState) + Send + Sync + 'static) {
        self.resolver_configurer = Some(Box::new(f));
    }

    /// Pure planning: no lock, no mutation, no installer calls (spec.md §4.3
    /// `plan_all`).
    #[instrument(name = "executor.plan_all", skip_all, fields(resources = resources.len()))]
    pub fn plan_all(&self, resources: &[Resource]) -> CoreResult<PlanResult> {
        let expanded = expand_resources(resources)?;
        let cache = StateCache::load(&self.state_path)?;
        let snapshot = cache.snapshot();

        let runtime_specs = index_by_name(&expanded.runtimes, |r| &r.name);
        let repository_specs = index_by_name(&expanded.repositories, |r| &r.name);
        let tool_specs = index_by_name(&expanded.tools, |r| &r.name);

        Ok(PlanResult {
            runtime_actions: reconcile(&runtime_specs, &snapshot.runtimes, runtime_comparator),
            repository_actions: reconcile(
                &repository_specs,
                &snapshot.installer_repositories,
                installer_repository_comparator,
            ),
            tool_actions: reconcile(&tool_specs, &snapshot.tools, tool_comparator),
        })
    }

    /// End-to-end: validate, plan, execute, persist (spec.md §4.3 `apply`).
    #[instrument(name = "executor.apply", skip_all, fields(resources = resources.len(), parallelism = self.parallelism, sync = self.sync_mode))]
    pub fn apply(&self, resources: &[Resource]) -> CoreResult<ApplySummary> {
        let expanded = expand_resources(resources)?;

        // Step 2: cross-process exclusive lock for the full apply duration.
        let _lock = StateLock::acquire(&self.state_path)?;

        // Step 3: load state into the in-memory cache.
        let cache = StateCache::load(&self.state_path)?;

        // Step 4: resolver configurer callback, under the lock.
        if let Some(configurer) = &self.resolver_configurer {
            configurer(&cache.snapshot());
        }

        // Step 5: sync-mode taint of floating-version tools.
        if self.sync_mode {
            taint_latest_tools(&cache);
        }

        let runtime_specs = index_by_name(&expanded.runtimes, |r| &r.name);
        let installer_specs = index_by_name(&expanded.installers, |r| &r.name);
        let repository_specs = index_by_name(&expanded.repositories, |r| &r.name);
        let tool_specs = index_by_name(&expanded.tools, |r| &r.name);

        // Step 6: reconcile every kind against the freshly loaded (possibly
        // just-tainted) state, and build one shared resolver over all kinds.
        let initial = cache.snapshot();
        let runtime_actions = reconcile(&runtime_specs, &initial.runtimes, runtime_comparator);
        let installer_actions = reconcile(&installer_specs, &initial.installers, installer_comparator);
        let repository_actions = reconcile(
            &repository_specs,
            &initial.installer_repositories,
            installer_repository_comparator,
        );
        let tool_actions = reconcile(&tool_specs, &initial.tools, tool_comparator);

        // Step 7: removal safety, before any side effect.
        check_removal_safety(&runtime_actions, &tool_specs)?;

        let mut resolver = crate::core::resolver::Resolver::new();
        for r in &expanded.runtimes {
            resolver.add_resource(&Resource::Runtime(r.clone()));
        }
        for i in &expanded.installers {
            resolver.add_resource(&Resource::Installer(i.clone()));
        }
        for repo in &expanded.repositories {
            resolver.add_resource(&Resource::InstallerRepository(repo.clone()));
        }
        for t in &expanded.tools {
            resolver.add_resource(&Resource::Tool(t.clone()));
        }
        let declared_layers = resolver.resolve()?;

        let mut action_map: HashMap<NodeId, PlannedAction> = HashMap::new();
        for a in runtime_actions {
            action_map.insert(NodeId::new(Kind::Runtime, &a.name), PlannedAction::Runtime(a));
        }
        for a in installer_actions {
            action_map.insert(NodeId::new(Kind::Installer, &a.name), PlannedAction::Installer(a));
        }
        for a in repository_actions {
            action_map.insert(NodeId::new(Kind::InstallerRepository, &a.name), PlannedAction::Repository(a));
        }
        for a in tool_actions {
            action_map.insert(NodeId::new(Kind::Tool, &a.name), PlannedAction::Tool(a));
        }

        // `resolver`/`declared_layers` above only ever sees declared
        // resources, so a `Remove` action's node never lands in one of its
        // layers. Build a second, removal-only graph from the `Remove`
        // entries already sitting in `action_map`, ordered by whatever
        // dependency refs survive in their persisted state, then run it in
        // reverse (dependents before what they depend on) ahead of the
        // install/upgrade layers (spec.md §3 "state coherence", §4.3 S5).
        let mut removal_resolver = crate::core::resolver::Resolver::new();
        for (node, action) in action_map.iter().filter(|(_, a)| a.action_type() == ActionType::Remove) {
            removal_resolver.add_node_with_dependencies(node.clone(), removal_dependencies(action, &action_map));
        }
        let mut removal_layers = removal_resolver.resolve()?;
        removal_layers.reverse();

        let mut layers = removal_layers;
        layers.extend(declared_layers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism)
            .build()
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let mut summary = ApplySummary::default();

        // Step 8: execute layer by layer.
        for (layer_index, layer) in layers.iter().enumerate() {
            let _layer_span = debug_span!("executor.layer", index = layer_index, nodes = layer.len()).entered();
            // Taint added by an earlier layer (runtime upgrade, or sync mode)
            // may mean a tool that originally needed no action now does; the
            // reconciler for tools re-observes state changes from earlier
            // layers here, per spec.md §4.3.
            for node in layer {
                if action_map.contains_key(node) {
                    continue;
                }
                if let Some((Kind::Tool, name)) = node.kind_name() {
                    let Some(spec) = tool_specs.get(name) else { continue };
                    let Some(state) = ToolStore::new(&cache).load(name) else { continue };
                    let (needs_update, reason) = tool_comparator(spec, &state);
                    if needs_update {
                        let action_type = if reason.starts_with(TAINT_REASON_PREFIX) {
                            ActionType::Reinstall
                        } else {
                            ActionType::Upgrade
                        };
                        action_map.insert(
                            node.clone(),
                            PlannedAction::Tool(Action {
                                action_type,
                                name: name.to_string(),
                                resource: Some(spec.clone()),
                                state: Some(state),
                                reason,
                            }),
                        );
                    }
                }
            }

            let tasks: Vec<&NodeId> = layer.iter().filter(|n| action_map.contains_key(*n)).collect();
            let cancel = CancellationToken::new();
            let first_error: Mutex<Option<CoreError>> = Mutex::new(None);
            let completed = AtomicUsize::new(0);

            pool.install(|| {
                tasks.par_iter().for_each(|node| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let action = action_map.get(*node).expect("task node has a planned action");
                    let ctx = ActionContext::new(action.action_type(), cancel.clone());
                    let result = self.execute_action(&cache, action, &ctx);
                    match result {
                        Ok(()) => {
                            completed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            cancel.cancel();
                            let mut guard = first_error.lock().expect("first_error mutex poisoned");
                            if guard.is_none() {
                                *guard = Some(e);
                            }
                        }
                    }
                });
            });

            // Flush unconditionally, success or failure, so whatever
            // completed in this layer is persisted (spec.md §9 Open
            // Questions, resolved: flush after every layer).
            cache.flush()?;

            summary.layers_executed += 1;
            summary.actions_executed += completed.into_inner();

            if let Some(err) = first_error.into_inner().expect("first_error mutex poisoned") {
                return Err(err);
            }

            // Taint propagation: a successful runtime install/upgrade/reinstall
            // in this layer reinstalls every tool that depends on it.
            for node in layer {
                if let Some(PlannedAction::Runtime(action)) = action_map.get(node) {
                    if matches!(
                        action.action_type,
                        ActionType::Install | ActionType::Upgrade | ActionType::Reinstall
                    ) {
                        let tool_store = ToolStore::new(&cache);
                        for name in tool_store.names() {
                            if let Some(mut state) = tool_store.load(&name) {
                                if state.runtime_ref.as_deref() == Some(action.name.as_str()) {
                                    state.taint(TaintReason::RuntimeUpgraded);
                                    tool_store.save(&name, state);
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(summary)
        // `_lock` is dropped here, releasing the state lock (step 9).
    }

    #[instrument(name = "executor.execute_action", skip_all, fields(action_type = ?action.action_type()))]
    fn execute_action(&self, cache: &StateCache, action: &PlannedAction, ctx: &ActionContext) -> CoreResult<()> {
        match action {
            PlannedAction::Runtime(a) => {
                let store = RuntimeStore::new(cache);
                match a.action_type {
                    ActionType::Install | ActionType::Upgrade | ActionType::Reinstall => {
                        let resource = a.resource.as_ref().expect("resource present for install/upgrade");
                        let state = self
                            .runtime_installer
                            .install(ctx, resource, &a.name)
                            .map_err(|source| CoreError::Installer {
                                action: action_label(a.action_type),
                                node: NodeId::new(Kind::Runtime, &a.name),
                                name: a.name.clone(),
                                source,
                            })?;
                        store.save(&a.name, state);
                    }
                    ActionType::Remove => {
                        let state = a.state.as_ref().expect("state present for remove");
                        self.runtime_installer
                            .remove(ctx, state, &a.name)
                            .map_err(|source| CoreError::Installer {
                                action: "remove",
                                node: NodeId::new(Kind::Runtime, &a.name),
                                name: a.name.clone(),
                                source,
                            })?;
                        store.delete(&a.name);
                    }
                    ActionType::None => {}
                }
                Ok(())
            }
            PlannedAction::Installer(a) => {
                let store = InstallerStore::new(cache);
                match a.action_type {
                    ActionType::Install | ActionType::Upgrade | ActionType::Reinstall => {
                        let resource = a.resource.as_ref().expect("resource present for install/upgrade");
                        let state = self
                            .installer_installer
                            .install(ctx, resource, &a.name)
                            .map_err(|source| CoreError::Installer {
                                action: action_label(a.action_type),
                                node: NodeId::new(Kind::Installer, &a.name),
                                name: a.name.clone(),
                                source,
                            })?;
                        store.save(&a.name, state);
                    }
                    ActionType::Remove => {
                        let state = a.state.as_ref().expect("state present for remove");
                        self.installer_installer
                            .remove(ctx, state, &a.name)
                            .map_err(|source| CoreError::Installer {
                                action: "remove",
                                node: NodeId::new(Kind::Installer, &a.name),
                                name: a.name.clone(),
                                source,
                            })?;
                        store.delete(&a.name);
                    }
                    ActionType::None => {}
                }
                Ok(())
            }
            PlannedAction::Repository(a) => {
                let store = InstallerRepositoryStore::new(cache);
                match a.action_type {
                    ActionType::Install | ActionType::Upgrade | ActionType::Reinstall => {
                        let resource = a.resource.as_ref().expect("resource present for install/upgrade");
                        let state = self
                            .repository_installer
                            .install(ctx, resource, &a.name)
                            .map_err(|source| CoreError::Installer {
                                action: action_label(a.action_type),
                                node: NodeId::new(Kind::InstallerRepository, &a.name),
                                name: a.name.clone(),
                                source,
                            })?;
                        store.save(&a.name, state);
                    }
                    ActionType::Remove => {
                        let state = a.state.as_ref().expect("state present for remove");
                        self.repository_installer
                            .remove(ctx, state, &a.name)
                            .map_err(|source| CoreError::Installer {
                                action: "remove",
                                node: NodeId::new(Kind::InstallerRepository, &a.name),
                                name: a.name.clone(),
                                source,
                            })?;
                        store.delete(&a.name);
                    }
                    ActionType::None => {}
                }
                Ok(())
            }
            PlannedAction::Tool(a) => {
                let store = ToolStore::new(cache);
                match a.action_type {
                    ActionType::Install | ActionType::Upgrade | ActionType::Reinstall => {
                        let resource = a.resource.as_ref().expect("resource present for install/upgrade");
                        let state = self
                            .tool_installer
                            .install(ctx, resource, &a.name)
                            .map_err(|source| CoreError::Installer {
                                action: action_label(a.action_type),
                                node: NodeId::new(Kind::Tool, &a.name),
                                name: a.name.clone(),
                                source,
                            })?;
                        store.save(&a.name, state);
                    }
                    ActionType::Remove => {
                        let state = a.state.as_ref().expect("state present for remove");
                        self.tool_installer
                            .remove(ctx, state, &a.name)
                            .map_err(|source| CoreError::Installer {
                                action: "remove",
                                node: NodeId::new(Kind::Tool, &a.name),
                                name: a.name.clone(),
                                source,
                            })?;
                        store.delete(&a.name);
                    }
                    ActionType::None => {}
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::InstallerMethod;
    use chrono::Utc;

    struct FakeRuntimeInstaller;
    impl Installer<RuntimeSpec, RuntimeState> for FakeRuntimeInstaller {
        fn install(&self, _ctx: &ActionContext, resource: &RuntimeSpec, name: &str) -> anyhow::Result<RuntimeState> {
            Ok(RuntimeState {
                runtime_type: resource.runtime_type.clone(),
                version: resource.version.clone().unwrap_or_default(),
                version_kind: VersionKind::Exact,
                spec_version: resource.version.clone(),
                install_path: format!("/opt/devrig/runtime/{name}"),
                bin_paths: vec![format!("/opt/devrig/runtime/{name}/bin/{name}")],
                env: Default::default(),
                updated_at: Utc::now(),
            })
        }

        fn remove(&self, _ctx: &ActionContext, _state: &RuntimeState, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FakeInstallerInstaller;
    impl Installer<InstallerSpec, InstallerState> for FakeInstallerInstaller {
        fn install(&self, _ctx: &ActionContext, resource: &InstallerSpec, _name: &str) -> anyhow::Result<InstallerState> {
            Ok(InstallerState {
                version: resource.version.clone(),
                updated_at: Utc::now(),
            })
        }

        fn remove(&self, _ctx: &ActionContext, _state: &InstallerState, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FakeRepositoryInstaller;
    impl Installer<InstallerRepositorySpec, InstallerRepositoryState> for FakeRepositoryInstaller {
        fn install(
            &self,
            _ctx: &ActionContext,
            resource: &InstallerRepositorySpec,
            _name: &str,
        ) -> anyhow::Result<InstallerRepositoryState> {
            Ok(InstallerRepositoryState {
                source_type: resource.source_type,
                url: resource.url.clone(),
                local_path: None,
                remove_cmd: None,
                updated_at: Utc::now(),
            })
        }

        fn remove(&self, _ctx: &ActionContext, _state: &InstallerRepositoryState, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FakeToolInstaller;
    impl Installer<ToolSpec, ToolState> for FakeToolInstaller {
        fn install(&self, _ctx: &ActionContext, resource: &ToolSpec, name: &str) -> anyhow::Result<ToolState> {
            Ok(ToolState {
                installer_ref: resource.installer_ref.clone(),
                runtime_ref: resource.runtime_ref.clone(),
                repository_ref: resource.repository_ref.clone(),
                version: resource.version.clone().unwrap_or_default(),
                version_kind: VersionKind::Exact,
                spec_version: resource.version.clone(),
                install_path: format!("/opt/devrig/tool/{name}"),
                bin_paths: vec![format!("/opt/devrig/tool/{name}/bin/{name}")],
                taint_reason: None,
                updated_at: Utc::now(),
            })
        }

        fn remove(&self, _ctx: &ActionContext, _state: &ToolState, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn fake_executor(state_path: PathBuf) -> Executor {
        Executor::new(
            state_path,
            Box::new(FakeRuntimeInstaller),
            Box::new(FakeInstallerInstaller),
            Box::new(FakeRepositoryInstaller),
            Box::new(FakeToolInstaller),
        )
    }

    #[derive(Clone, Default)]
    struct RemovalLog(std::sync::Arc<Mutex<Vec<String>>>);

    struct LoggingRuntimeInstaller(RemovalLog);
    impl Installer<RuntimeSpec, RuntimeState> for LoggingRuntimeInstaller {
        fn install(&self, ctx: &ActionContext, resource: &RuntimeSpec, name: &str) -> anyhow::Result<RuntimeState> {
            FakeRuntimeInstaller.install(ctx, resource, name)
        }
        fn remove(&self, _ctx: &ActionContext, _state: &RuntimeState, name: &str) -> anyhow::Result<()> {
            self.0 .0.lock().unwrap().push(format!("runtime:{name}"));
            Ok(())
        }
    }

    struct LoggingToolInstaller(RemovalLog);
    impl Installer<ToolSpec, ToolState> for LoggingToolInstaller {
        fn install(&self, ctx: &ActionContext, resource: &ToolSpec, name: &str) -> anyhow::Result<ToolState> {
            FakeToolInstaller.install(ctx, resource, name)
        }
        fn remove(&self, _ctx: &ActionContext, _state: &ToolState, name: &str) -> anyhow::Result<()> {
            self.0 .0.lock().unwrap().push(format!("tool:{name}"));
            Ok(())
        }
    }

    fn logging_executor(state_path: PathBuf, log: RemovalLog) -> Executor {
        Executor::new(
            state_path,
            Box::new(LoggingRuntimeInstaller(log.clone())),
            Box::new(FakeInstallerInstaller),
            Box::new(FakeRepositoryInstaller),
            Box::new(LoggingToolInstaller(log)),
        )
    }

    #[test]
    fn s1_runtime_then_tool_installs_and_converges() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_path = dir.path().join("state.json");
        let executor = fake_executor(state_path.clone());

        let resources = vec![
            Resource::Runtime(RuntimeSpec {
                name: "go".into(),
                runtime_type: "go".into(),
                version: Some("1.25.6".into()),
            }),
            Resource::Tool(ToolSpec {
                name: "gopls".into(),
                installer_ref: None,
                runtime_ref: Some("go".into()),
                repository_ref: None,
                version: Some("0.16.0".into()),
            }),
        ];

        let summary = executor.apply(&resources).expect("first apply succeeds");
        assert_eq!(summary.actions_executed, 2);

        let second = executor.apply(&resources).expect("second apply succeeds");
        assert_eq!(second.actions_executed, 0, "converged state needs no further actions");
    }

    #[test]
    fn s3_runtime_upgrade_taints_and_reinstalls_dependent_tool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_path = dir.path().join("state.json");
        let executor = fake_executor(state_path.clone());

        let original = vec![
            Resource::Runtime(RuntimeSpec {
                name: "go".into(),
                runtime_type: "go".into(),
                version: Some("1.25.6".into()),
            }),
            Resource::Tool(ToolSpec {
                name: "gopls".into(),
                installer_ref: None,
                runtime_ref: Some("go".into()),
                repository_ref: None,
                version: Some("0.16.0".into()),
            }),
        ];
        executor.apply(&original).expect("seed state");

        let upgraded = vec![
            Resource::Runtime(RuntimeSpec {
                name: "go".into(),
                runtime_type: "go".into(),
                version: Some("1.26.0".into()),
            }),
            original[1].clone(),
        ];

        let plan = executor.plan_all(&upgraded).expect("plan");
        assert_eq!(plan.runtime_actions.len(), 1);
        assert_eq!(plan.runtime_actions[0].action_type, ActionType::Upgrade);
        // gopls's own spec didn't change, so the *pre-apply* plan sees no
        // action for it yet - the reinstall only appears once the runtime's
        // upgrade has taint-marked it during the apply itself (spec.md §4.3).
        assert!(plan.tool_actions.iter().all(|a| a.name != "gopls"));

        let summary = executor.apply(&upgraded).expect("upgrade applies");
        assert_eq!(summary.layers_executed, 2);
        assert_eq!(summary.actions_executed, 2, "runtime upgrade + tool reinstall");

        let cache = StateCache::load(&state_path).expect("reload state");
        let go_state = RuntimeStore::new(&cache).load("go").expect("go state persisted");
        assert_eq!(go_state.version, "1.26.0");
        let gopls_state = ToolStore::new(&cache).load("gopls").expect("gopls state persisted");
        assert!(gopls_state.taint_reason.is_none(), "taint cleared by the reinstall");
    }

    #[test]
    fn s4_cyclic_declaration_fails_before_any_side_effect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_path = dir.path().join("state.json");
        let executor = fake_executor(state_path.clone());

        let resources = vec![
            Resource::Tool(ToolSpec {
                name: "tool-a".into(),
                installer_ref: Some("installer-b".into()),
                runtime_ref: None,
                repository_ref: None,
                version: None,
            }),
            Resource::Installer(InstallerSpec {
                name: "installer-b".into(),
                method: InstallerMethod::Delegation,
                runtime_ref: None,
                tool_ref: Some("tool-a".into()),
                version: None,
                commands: [("install".to_string(), "true".to_string())].into(),
            }),
        ];

        let err = executor.apply(&resources).unwrap_err();
        assert!(matches!(err, CoreError::Cycle { .. }));
        assert!(!state_path.exists(), "a cyclic declaration must not mutate state");
    }

    #[test]
    fn s5_removal_blocked_when_tool_still_depends_on_runtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_path = dir.path().join("state.json");
        let executor = fake_executor(state_path.clone());

        let full = vec![
            Resource::Runtime(RuntimeSpec {
                name: "go".into(),
                runtime_type: "go".into(),
                version: Some("1.25.6".into()),
            }),
            Resource::Tool(ToolSpec {
                name: "gopls".into(),
                installer_ref: None,
                runtime_ref: Some("go".into()),
                repository_ref: None,
                version: Some("0.16.0".into()),
            }),
        ];
        executor.apply(&full).expect("seed state");

        let tool_only = vec![full[1].clone()];
        let err = executor.apply(&tool_only).unwrap_err();
        match err {
            CoreError::RemovalBlocked { dependent, .. } => assert_eq!(dependent, "gopls"),
            other => panic!("expected RemovalBlocked, got {other:?}"),
        }
    }

    #[test]
    fn s5_declaring_neither_resource_removes_both_in_reverse_of_install_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_path = dir.path().join("state.json");
        let log = RemovalLog::default();
        let executor = logging_executor(state_path.clone(), log.clone());

        let full = vec![
            Resource::Runtime(RuntimeSpec {
                name: "go".into(),
                runtime_type: "go".into(),
                version: Some("1.25.6".into()),
            }),
            Resource::Tool(ToolSpec {
                name: "gopls".into(),
                installer_ref: None,
                runtime_ref: Some("go".into()),
                repository_ref: None,
                version: Some("0.16.0".into()),
            }),
        ];
        executor.apply(&full).expect("seed state");
        log.0.lock().unwrap().clear();

        let summary = executor.apply(&[]).expect("removal of both resources succeeds");
        assert_eq!(summary.layers_executed, 2);
        assert_eq!(summary.actions_executed, 2);

        let order = log.0.lock().unwrap().clone();
        assert_eq!(order, vec!["tool:gopls".to_string(), "runtime:go".to_string()]);

        let cache = StateCache::load(&state_path).expect("state reloads");
        let snapshot = cache.snapshot();
        assert!(snapshot.tools.is_empty(), "gopls must be gone from state");
        assert!(snapshot.runtimes.is_empty(), "go must be gone from state");
    }

    #[test]
    fn s6_sync_mode_reinstalls_only_latest_kind_tools() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_path = dir.path().join("state.json");
        {
            let cache = StateCache::load(&state_path).expect("fresh cache");
            ToolStore::new(&cache).save(
                "fd",
                ToolState {
                    installer_ref: Some("aqua".into()),
                    runtime_ref: None,
                    repository_ref: None,
                    version: "9.0.0".into(),
                    version_kind: VersionKind::Latest,
                    spec_version: None,
                    install_path: "/opt/devrig/tool/fd".into(),
                    bin_paths: vec![],
                    taint_reason: None,
                    updated_at: Utc::now(),
                },
            );
            ToolStore::new(&cache).save(
                "rg",
                ToolState {
                    installer_ref: Some("aqua".into()),
                    runtime_ref: None,
                    repository_ref: None,
                    version: "14.0.0".into(),
                    version_kind: VersionKind::Exact,
                    spec_version: Some("14.0.0".into()),
                    install_path: "/opt/devrig/tool/rg".into(),
                    bin_paths: vec![],
                    taint_reason: None,
                    updated_at: Utc::now(),
                },
            );
            cache.flush().expect("flush seed state");
        }

        let mut executor = fake_executor(state_path.clone());
        executor.set_sync_mode(true);

        let resources = vec![
            Resource::Installer(InstallerSpec {
                name: "aqua".into(),
                method: InstallerMethod::Download,
                runtime_ref: None,
                tool_ref: None,
                version: None,
                commands: Default::default(),
            }),
            Resource::Tool(ToolSpec {
                name: "fd".into(),
                installer_ref: Some("aqua".into()),
                runtime_ref: None,
                repository_ref: None,
                version: None,
            }),
            Resource::Tool(ToolSpec {
                name: "rg".into(),
                installer_ref: Some("aqua".into()),
                runtime_ref: None,
                repository_ref: None,
                version: Some("14.0.0".into()),
            }),
        ];

        let plan = executor.plan_all(&resources).expect("plan");
        let fd_action = plan.tool_actions.iter().find(|a| a.name == "fd").expect("fd planned");
        assert_eq!(fd_action.action_type, ActionType::Reinstall);
        assert!(plan.tool_actions.iter().all(|a| a.name != "rg"));
    }
}
