//! The kind-agnostic reconciliation algorithm and the per-kind comparators
//! that plug into it (spec.md §4.2).

use crate::core::resource::{InstallerRepositorySpec, InstallerSpec, RuntimeSpec, ToolSpec};
use crate::core::state::{spec_version_changed, InstallerRepositoryState, InstallerState, RuntimeState, ToolState};
use std::collections::HashMap;

/// What a reconciled action instructs the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Install,
    Upgrade,
    /// Surfaced separately from `Upgrade` for display, even though the engine
    /// executes both identically (spec.md §4.2, §9 design notes).
    Reinstall,
    Remove,
    None,
}

/// One reconciled action for a single named resource of one kind.
///
/// `resource` is `None` only for `Remove`; `state` is `None` only for
/// `Install`, matching spec.md §4.2's "`res` and `state` are optional and
/// interpreted per tag."
#[derive(Debug, Clone)]
pub struct Action<R, S> {
    pub action_type: ActionType,
    pub name: String,
    pub resource: Option<R>,
    pub state: Option<S>,
    pub reason: String,
}

/// A pure per-kind comparison: given a declared resource and its recorded
/// state, decide whether it needs updating and why.
pub type Comparator<R, S> = fn(&R, &S) -> (bool, String);

/// Prefix the generic reconciler uses to recognise a taint-driven update and
/// surface it as `Reinstall` rather than `Upgrade`. Comparators that detect a
/// taint must format their reason with this prefix.
pub const TAINT_REASON_PREFIX: &str = "tainted: ";

/// Diffs declared resources against persisted state for one resource kind and
/// emits the actions needed to converge (spec.md §4.2 steps 1-3).
pub fn reconcile<R: Clone, S: Clone>(
    resources: &HashMap<String, R>,
    states: &HashMap<String, S>,
    comparator: Comparator<R, S>,
) -> Vec<Action<R, S>> {
    let mut actions = Vec::new();

    for (name, resource) in resources {
        match states.get(name) {
            None => actions.push(Action {
                action_type: ActionType::Install,
                name: name.clone(),
                resource: Some(resource.clone()),
                state: None,
                reason: "new resource".into(),
            }),
            Some(state) => {
                let (needs_update, reason) = comparator(resource, state);
                if needs_update {
                    let action_type = if reason.starts_with(TAINT_REASON_PREFIX) {
                        ActionType::Reinstall
                    } else {
                        ActionType::Upgrade
                    };
                    actions.push(Action {
                        action_type,
                        name: name.clone(),
                        resource: Some(resource.clone()),
                        state: Some(state.clone()),
                        reason,
                    });
                }
            }
        }
    }

    for (name, state) in states {
        if !resources.contains_key(name) {
            actions.push(Action {
                action_type: ActionType::Remove,
                name: name.clone(),
                resource: None,
                state: Some(state.clone()),
                reason: "removed from spec".into(),
            });
        }
    }

    actions
}

/// `Tool`: tainted states always reinstall; otherwise `specVersionChanged`
/// (spec.md §4.2).
pub fn tool_comparator(spec: &ToolSpec, state: &ToolState) -> (bool, String) {
    if let Some(reason) = state.taint_reason {
        return (true, format!("{TAINT_REASON_PREFIX}{reason}"));
    }
    let changed = spec_version_changed(
        spec.version.as_deref(),
        state.version_kind,
        &state.version,
        state.spec_version.as_deref(),
    );
    (changed, "version changed".into())
}

/// `Runtime`: same `specVersionChanged` rule as `Tool`; runtimes are never
/// tainted (spec.md §4.2).
pub fn runtime_comparator(spec: &RuntimeSpec, state: &RuntimeState) -> (bool, String) {
    let changed = spec_version_changed(
        spec.version.as_deref(),
        state.version_kind,
        &state.version,
        state.spec_version.as_deref(),
    );
    (changed, "version changed".into())
}

/// `InstallerRepository`: needs update if the source URL or type changed
/// (spec.md §4.2).
pub fn installer_repository_comparator(
    spec: &InstallerRepositorySpec,
    state: &InstallerRepositoryState,
) -> (bool, String) {
    if spec.url != state.url {
        return (true, "source url changed".into());
    }
    if spec.source_type != state.source_type {
        return (true, "source type changed".into());
    }
    (false, String::new())
}

/// `Installer`: spec.md's data-model table records only `version,
/// updated-at` for installer state and names no comparator explicitly; a
/// direct version comparison is the natural extension for a kind that is
/// otherwise reconciler-eligible (DESIGN.md records this as a decision, not a
/// spec requirement).
pub fn installer_comparator(spec: &InstallerSpec, state: &InstallerState) -> (bool, String) {
    let spec_version = spec.version.as_deref().filter(|v| !v.is_empty());
    if spec_version.is_some() && spec_version != state.version.as_deref() {
        return (true, "version changed".into());
    }
    (false, String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::VersionKind;
    use chrono::Utc;

    fn tool(version: Option<&str>) -> ToolSpec {
        ToolSpec {
            name: "gopls".into(),
            installer_ref: None,
            runtime_ref: Some("go".into()),
            repository_ref: None,
            version: version.map(String::from),
        }
    }

    fn tool_state(version: &str, taint: Option<crate::core::resource::TaintReason>) -> ToolState {
        ToolState {
            installer_ref: None,
            runtime_ref: Some("go".into()),
            repository_ref: None,
            version: version.into(),
            version_kind: VersionKind::Exact,
            spec_version: Some(version.into()),
            install_path: "/tmp/gopls".into(),
            bin_paths: Vec::new(),
            taint_reason: taint,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn new_resource_without_state_is_installed() {
        let mut resources = HashMap::new();
        resources.insert("gopls".to_string(), tool(Some("0.16.0")));
        let states: HashMap<String, ToolState> = HashMap::new();
        let actions = reconcile(&resources, &states, tool_comparator);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Install);
    }

    #[test]
    fn unchanged_resource_produces_no_action() {
        let mut resources = HashMap::new();
        resources.insert("gopls".to_string(), tool(Some("0.16.0")));
        let mut states = HashMap::new();
        states.insert("gopls".to_string(), tool_state("0.16.0", None));
        let actions = reconcile(&resources, &states, tool_comparator);
        assert!(actions.is_empty());
    }

    #[test]
    fn tainted_state_reinstalls_regardless_of_version() {
        let mut resources = HashMap::new();
        resources.insert("gopls".to_string(), tool(Some("0.16.0")));
        let mut states = HashMap::new();
        states.insert(
            "gopls".to_string(),
            tool_state("0.16.0", Some(crate::core::resource::TaintReason::RuntimeUpgraded)),
        );
        let actions = reconcile(&resources, &states, tool_comparator);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Reinstall);
        assert!(actions[0].reason.starts_with(TAINT_REASON_PREFIX));
    }

    #[test]
    fn missing_from_spec_is_removed() {
        let resources: HashMap<String, ToolSpec> = HashMap::new();
        let mut states = HashMap::new();
        states.insert("gopls".to_string(), tool_state("0.16.0", None));
        let actions = reconcile(&resources, &states, tool_comparator);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Remove);
    }
}
