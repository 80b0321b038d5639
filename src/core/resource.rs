//! The five resource kinds and the common `Spec` contract they implement.
//!
//! Resources are constructed by the (out-of-scope) configuration front-end and
//! submitted to the `Resolver` one at a time. They are immutable once received:
//! nothing downstream ever mutates a `Resource`, only the state recorded for it.

use crate::core::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five resource kinds the core recognises.
///
/// `ToolSet` never reaches the dependency graph directly - the executor
/// expands every `ToolSet` into individual `Tool`s before resolution (spec
/// §4.3 step 1). It is still a `Kind` so a `ToolSetSpec` can self-describe for
/// validation error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Runtime,
    Installer,
    InstallerRepository,
    Tool,
    ToolSet,
}

impl Kind {
    /// Intra-layer sort priority (spec §4.1): lower sorts first.
    /// `ToolSet` never reaches a layer, so it shares the `other` bucket.
    pub fn priority(self) -> u32 {
        match self {
            Kind::Runtime => 100,
            Kind::Installer => 200,
            Kind::InstallerRepository => 250,
            Kind::Tool => 300,
            Kind::ToolSet => 1000,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Runtime => "Runtime",
            Kind::Installer => "Installer",
            Kind::InstallerRepository => "InstallerRepository",
            Kind::Tool => "Tool",
            Kind::ToolSet => "ToolSet",
        };
        write!(f, "{s}")
    }
}

/// A cross-reference to another declared resource, identified by `(kind, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
    pub kind: Kind,
    pub name: String,
}

impl Ref {
    pub fn new(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Classifies how a spec's version field was written, so the reconciler's
/// comparator knows how to interpret a spec/state mismatch (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
    /// A concrete version string was recorded and must match the spec exactly.
    Exact,
    /// The spec left the version empty (floating); only a sync-mode refresh
    /// or a switch to a pinned version triggers reconciliation.
    Latest,
    /// The spec named a symbolic alias (e.g. "stable"); the resolved concrete
    /// version is tracked separately from the alias string itself.
    Alias,
}

/// Marks a persisted state as requiring reinstall independent of version
/// comparison (spec §3, §4.3). Reasons are closed: the core only ever sets
/// these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaintReason {
    /// A dependency `Runtime` was upgraded or reinstalled.
    RuntimeUpgraded,
    /// Sync mode tainted a floating-version tool ahead of reconciliation.
    SyncUpdate,
}

impl fmt::Display for TaintReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaintReason::RuntimeUpgraded => "runtime_upgraded",
            TaintReason::SyncUpdate => "sync_update",
        };
        write!(f, "{s}")
    }
}

/// Common contract every resource kind's spec type implements.
///
/// `kind`/`name` let generic code (error construction, graph node
/// identification) self-describe a spec without downcasting.
pub trait Spec {
    fn kind(&self) -> Kind;
    fn name(&self) -> &str;
    fn validate(&self) -> CoreResult<()>;
    fn dependencies(&self) -> Vec<Ref>;
}

/// A language/toolchain installation (Go, Rust, Node...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSpec {
    pub name: String,
    /// Which runtime family this is (e.g. "go", "node", "rust").
    pub runtime_type: String,
    /// Literal version string as written: a concrete version, "latest"/absent,
    /// or a symbolic alias such as "stable". Installer backends classify it.
    pub version: Option<String>,
}

impl Spec for RuntimeSpec {
    fn kind(&self) -> Kind {
        Kind::Runtime
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Config {
                node: crate::core::graph::NodeId::new(Kind::Runtime, "<unnamed>"),
                reason: "runtime name must not be empty".into(),
            });
        }
        if self.runtime_type.trim().is_empty() {
            return Err(CoreError::Config {
                node: crate::core::graph::NodeId::new(Kind::Runtime, &self.name),
                reason: "runtime_type must not be empty".into(),
            });
        }
        Ok(())
    }

    fn dependencies(&self) -> Vec<Ref> {
        Vec::new()
    }
}

/// How an `Installer` resource performs installation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallerMethod {
    /// Pulls archives directly (e.g. downloads a release tarball).
    Download,
    /// Installs via externally executed shell commands.
    Delegation,
}

/// A user-level installer (download-style or delegation-style).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerSpec {
    pub name: String,
    pub method: InstallerMethod,
    /// Set when this installer is itself installed via a `Runtime` (e.g. a Go-based installer).
    pub runtime_ref: Option<String>,
    /// Set when this installer is itself installed via a delegation `Tool`.
    /// Mutually exclusive with `runtime_ref` (validator rejects both being set,
    /// spec §9 Open Questions, resolved in SPEC_FULL.md §14.2).
    pub tool_ref: Option<String>,
    pub version: Option<String>,
    /// Shell command templates keyed by action, used by the delegation backend.
    #[serde(default)]
    pub commands: std::collections::HashMap<String, String>,
}

impl Spec for InstallerSpec {
    fn kind(&self) -> Kind {
        Kind::Installer
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> CoreResult<()> {
        if self.runtime_ref.is_some() && self.tool_ref.is_some() {
            return Err(CoreError::Config {
                node: crate::core::graph::NodeId::new(Kind::Installer, &self.name),
                reason: "installer cannot declare both runtime_ref and tool_ref".into(),
            });
        }
        if self.method == InstallerMethod::Delegation && self.commands.is_empty() {
            return Err(CoreError::Config {
                node: crate::core::graph::NodeId::new(Kind::Installer, &self.name),
                reason: "delegation installer requires at least one command".into(),
            });
        }
        Ok(())
    }

    fn dependencies(&self) -> Vec<Ref> {
        let mut deps = Vec::new();
        if let Some(r) = &self.runtime_ref {
            deps.push(Ref::new(Kind::Runtime, r));
        }
        if let Some(t) = &self.tool_ref {
            deps.push(Ref::new(Kind::Tool, t));
        }
        deps
    }
}

/// Where an installer repository's contents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositorySourceType {
    Delegation,
    Git,
}

/// A third-party package index added to an installer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerRepositorySpec {
    pub name: String,
    pub installer_ref: String,
    pub source_type: RepositorySourceType,
    pub url: String,
}

impl Spec for InstallerRepositorySpec {
    fn kind(&self) -> Kind {
        Kind::InstallerRepository
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> CoreResult<()> {
        if self.installer_ref.trim().is_empty() {
            return Err(CoreError::Config {
                node: crate::core::graph::NodeId::new(Kind::InstallerRepository, &self.name),
                reason: "installer_ref is required".into(),
            });
        }
        if self.url.trim().is_empty() {
            return Err(CoreError::Config {
                node: crate::core::graph::NodeId::new(Kind::InstallerRepository, &self.name),
                reason: "url is required".into(),
            });
        }
        Ok(())
    }

    fn dependencies(&self) -> Vec<Ref> {
        vec![Ref::new(Kind::Installer, &self.installer_ref)]
    }
}

/// A single tool to install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub installer_ref: Option<String>,
    pub runtime_ref: Option<String>,
    pub repository_ref: Option<String>,
    /// Literal version string as written (see `RuntimeSpec::version`).
    pub version: Option<String>,
}

impl Spec for ToolSpec {
    fn kind(&self) -> Kind {
        Kind::Tool
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Config {
                node: crate::core::graph::NodeId::new(Kind::Tool, "<unnamed>"),
                reason: "tool name must not be empty".into(),
            });
        }
        Ok(())
    }

    fn dependencies(&self) -> Vec<Ref> {
        let mut deps = Vec::new();
        if let Some(r) = &self.installer_ref {
            deps.push(Ref::new(Kind::Installer, r));
        }
        if let Some(r) = &self.runtime_ref {
            deps.push(Ref::new(Kind::Runtime, r));
        }
        if let Some(r) = &self.repository_ref {
            deps.push(Ref::new(Kind::InstallerRepository, r));
        }
        deps
    }
}

/// One member of a `ToolSet` (just enough to produce a standalone `ToolSpec`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSetMember {
    pub name: String,
    pub version: Option<String>,
}

/// A named group of tools sharing one installer or runtime. Expanded into
/// individual `Tool`s by the executor before scheduling (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSetSpec {
    pub name: String,
    pub installer_ref: Option<String>,
    pub runtime_ref: Option<String>,
    pub repository_ref: Option<String>,
    pub tools: Vec<ToolSetMember>,
}

impl ToolSetSpec {
    /// Expands this set into standalone `ToolSpec`s, one per member, each
    /// inheriting the set's installer/runtime/repository refs.
    pub fn expand(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|member| ToolSpec {
                name: member.name.clone(),
                installer_ref: self.installer_ref.clone(),
                runtime_ref: self.runtime_ref.clone(),
                repository_ref: self.repository_ref.clone(),
                version: member.version.clone(),
            })
            .collect()
    }
}

impl Spec for ToolSetSpec {
    fn kind(&self) -> Kind {
        Kind::ToolSet
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> CoreResult<()> {
        match (&self.installer_ref, &self.runtime_ref) {
            (Some(_), Some(_)) => Err(CoreError::Config {
                node: crate::core::graph::NodeId::new(Kind::ToolSet, &self.name),
                reason: "tool set must declare exactly one of installer_ref or runtime_ref, not both".into(),
            }),
            (None, None) => Err(CoreError::Config {
                node: crate::core::graph::NodeId::new(Kind::ToolSet, &self.name),
                reason: "tool set must declare one of installer_ref or runtime_ref".into(),
            }),
            _ => {
                if self.tools.is_empty() {
                    return Err(CoreError::Config {
                        node: crate::core::graph::NodeId::new(Kind::ToolSet, &self.name),
                        reason: "tool set must declare at least one tool".into(),
                    });
                }
                Ok(())
            }
        }
    }

    fn dependencies(&self) -> Vec<Ref> {
        // The set itself never enters the graph, but reuses the same shape
        // for uniform validation before expansion.
        let mut deps = Vec::new();
        if let Some(r) = &self.installer_ref {
            deps.push(Ref::new(Kind::Installer, r));
        }
        if let Some(r) = &self.runtime_ref {
            deps.push(Ref::new(Kind::Runtime, r));
        }
        if let Some(r) = &self.repository_ref {
            deps.push(Ref::new(Kind::InstallerRepository, r));
        }
        deps
    }
}

/// A declared resource of any of the five kinds, as submitted to the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    Runtime(RuntimeSpec),
    Installer(InstallerSpec),
    InstallerRepository(InstallerRepositorySpec),
    Tool(ToolSpec),
    ToolSet(ToolSetSpec),
}

impl Resource {
    pub fn kind(&self) -> Kind {
        match self {
            Resource::Runtime(s) => s.kind(),
            Resource::Installer(s) => s.kind(),
            Resource::InstallerRepository(s) => s.kind(),
            Resource::Tool(s) => s.kind(),
            Resource::ToolSet(s) => s.kind(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Runtime(s) => s.name(),
            Resource::Installer(s) => s.name(),
            Resource::InstallerRepository(s) => s.name(),
            Resource::Tool(s) => s.name(),
            Resource::ToolSet(s) => s.name(),
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        match self {
            Resource::Runtime(s) => s.validate(),
            Resource::Installer(s) => s.validate(),
            Resource::InstallerRepository(s) => s.validate(),
            Resource::Tool(s) => s.validate(),
            Resource::ToolSet(s) => s.validate(),
        }
    }

    pub fn dependencies(&self) -> Vec<Ref> {
        match self {
            Resource::Runtime(s) => s.dependencies(),
            Resource::Installer(s) => s.dependencies(),
            Resource::InstallerRepository(s) => s.dependencies(),
            Resource::Tool(s) => s.dependencies(),
            Resource::ToolSet(s) => s.dependencies(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_with_installer_and_repository_yields_two_refs() {
        let tool = ToolSpec {
            name: "ripgrep".into(),
            installer_ref: Some("aqua".into()),
            runtime_ref: None,
            repository_ref: Some("custom-index".into()),
            version: Some("14.0.0".into()),
        };
        let deps = tool.dependencies();
        assert_eq!(deps.len(), 2);
        assert!(deps.contains(&Ref::new(Kind::Installer, "aqua")));
        assert!(deps.contains(&Ref::new(Kind::InstallerRepository, "custom-index")));
    }

    #[test]
    fn installer_with_both_refs_is_rejected() {
        let installer = InstallerSpec {
            name: "aqua".into(),
            method: InstallerMethod::Download,
            runtime_ref: Some("go".into()),
            tool_ref: Some("tool-a".into()),
            version: None,
            commands: Default::default(),
        };
        assert!(installer.validate().is_err());
    }

    #[test]
    fn toolset_requires_exactly_one_of_installer_or_runtime_ref() {
        let neither = ToolSetSpec {
            name: "cli-tools".into(),
            installer_ref: None,
            runtime_ref: None,
            repository_ref: None,
            tools: vec![ToolSetMember {
                name: "fd".into(),
                version: None,
            }],
        };
        assert!(neither.validate().is_err());

        let both = ToolSetSpec {
            installer_ref: Some("aqua".into()),
            runtime_ref: Some("go".into()),
            ..neither.clone()
        };
        assert!(both.validate().is_err());

        let ok = ToolSetSpec {
            installer_ref: Some("aqua".into()),
            runtime_ref: None,
            ..neither
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn toolset_expand_inherits_refs() {
        let set = ToolSetSpec {
            name: "cli-tools".into(),
            installer_ref: Some("aqua".into()),
            runtime_ref: None,
            repository_ref: None,
            tools: vec![
                ToolSetMember {
                    name: "fd".into(),
                    version: Some("9.0.0".into()),
                },
                ToolSetMember {
                    name: "bat".into(),
                    version: None,
                },
            ],
        };
        let expanded = set.expand();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].name, "fd");
        assert_eq!(expanded[0].installer_ref.as_deref(), Some("aqua"));
        assert_eq!(expanded[1].name, "bat");
        assert_eq!(expanded[1].version, None);
    }
}
