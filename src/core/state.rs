//! Persisted state: the `UserState` aggregate and the per-kind state values
//! it stores, plus the `specVersionChanged` comparison shared by the `Tool`
//! and `Runtime` comparators (spec.md §3, §4.2, §6.2).

use crate::core::resource::{TaintReason, VersionKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A persisted `Runtime` installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeState {
    pub runtime_type: String,
    pub version: String,
    pub version_kind: VersionKind,
    /// The version as last declared in the spec (verbatim, including aliases).
    pub spec_version: Option<String>,
    pub install_path: String,
    #[serde(default)]
    pub bin_paths: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted `Installer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerState {
    pub version: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted `InstallerRepository`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerRepositoryState {
    pub source_type: crate::core::resource::RepositorySourceType,
    pub url: String,
    pub local_path: Option<String>,
    pub remove_cmd: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted `Tool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolState {
    pub installer_ref: Option<String>,
    pub runtime_ref: Option<String>,
    pub repository_ref: Option<String>,
    pub version: String,
    pub version_kind: VersionKind,
    pub spec_version: Option<String>,
    pub install_path: String,
    #[serde(default)]
    pub bin_paths: Vec<String>,
    /// Set by taint propagation (runtime upgrades) or sync mode; cleared on
    /// the next successful install/upgrade.
    pub taint_reason: Option<TaintReason>,
    pub updated_at: DateTime<Utc>,
}

impl ToolState {
    pub fn is_tainted(&self) -> bool {
        self.taint_reason.is_some()
    }

    pub fn taint(&mut self, reason: TaintReason) {
        self.taint_reason = Some(reason);
    }

    pub fn clear_taint(&mut self) {
        self.taint_reason = None;
    }
}

/// The single aggregate document persisted as `state.json` (spec.md §6.2).
/// Unknown top-level keys and unknown fields within known states round-trip
/// because every struct here derives plain `Serialize`/`Deserialize` without
/// `deny_unknown_fields`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserState {
    /// Opaque blob owned by the configuration front-end; the core never reads it.
    #[serde(default)]
    pub registry: Option<serde_json::Value>,
    #[serde(default)]
    pub runtimes: HashMap<String, RuntimeState>,
    #[serde(default)]
    pub installers: HashMap<String, InstallerState>,
    #[serde(default, rename = "installerRepositories")]
    pub installer_repositories: HashMap<String, InstallerRepositoryState>,
    #[serde(default)]
    pub tools: HashMap<String, ToolState>,
}

impl UserState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared version-change rule for `Tool` and `Runtime` comparators (spec.md
/// §4.2). `spec_version` is the literal version string currently declared
/// (`None`/empty means floating); `state_version` is the concrete installed
/// version; `state_spec_version` is the spec string recorded at the time of
/// the last successful install.
pub fn spec_version_changed(
    spec_version: Option<&str>,
    kind: VersionKind,
    state_version: &str,
    state_spec_version: Option<&str>,
) -> bool {
    let spec_version = spec_version.filter(|v| !v.is_empty());
    match kind {
        VersionKind::Exact => spec_version != Some(state_version),
        VersionKind::Latest => spec_version.is_some(),
        VersionKind::Alias => spec_version != state_spec_version.filter(|v| !v.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_kind_changes_only_on_differing_version() {
        assert!(!spec_version_changed(
            Some("1.25.6"),
            VersionKind::Exact,
            "1.25.6",
            None
        ));
        assert!(spec_version_changed(
            Some("1.26.0"),
            VersionKind::Exact,
            "1.25.6",
            None
        ));
    }

    #[test]
    fn latest_kind_changes_when_user_pins_a_version() {
        assert!(!spec_version_changed(None, VersionKind::Latest, "9.0.0", None));
        assert!(!spec_version_changed(
            Some(""),
            VersionKind::Latest,
            "9.0.0",
            None
        ));
        assert!(spec_version_changed(
            Some("9.1.0"),
            VersionKind::Latest,
            "9.0.0",
            None
        ));
    }

    #[test]
    fn alias_kind_changes_when_alias_string_differs() {
        assert!(!spec_version_changed(
            Some("stable"),
            VersionKind::Alias,
            "1.26.0",
            Some("stable")
        ));
        assert!(spec_version_changed(
            Some("lts"),
            VersionKind::Alias,
            "1.26.0",
            Some("stable")
        ));
    }

    #[test]
    fn user_state_round_trips_through_json() {
        let mut state = UserState::new();
        state.tools.insert(
            "gopls".into(),
            ToolState {
                installer_ref: None,
                runtime_ref: Some("go".into()),
                repository_ref: None,
                version: "0.16.0".into(),
                version_kind: VersionKind::Exact,
                spec_version: Some("0.16.0".into()),
                install_path: "/opt/devrig/tool/gopls/0.16.0".into(),
                bin_paths: vec!["/opt/devrig/tool/gopls/0.16.0/bin/gopls".into()],
                taint_reason: None,
                updated_at: Utc::now(),
            },
        );
        let json = serde_json::to_string(&state).expect("serialize");
        let round_tripped: UserState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(round_tripped.tools.len(), 1);
        assert!(round_tripped.tools.contains_key("gopls"));
    }
}
