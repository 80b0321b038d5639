//! The YAML configuration front-end (spec.md §6.4).
//!
//! `spec.md` treats "the configuration language front-end" as an external
//! collaborator, specified only via the `Loader` contract: something that
//! turns a directory into `Vec<Resource>`. This module is the minimal
//! concrete `Loader` devrig ships so `devrig apply`/`devrig plan` are
//! runnable, in the spirit of the teacher's own split between an on-disk
//! schema (`schemas::tools::ToolEntry` et al., in the retrieved snapshot)
//! and the validated in-memory shape the rest of the program consumes.

use crate::core::resource::{
    InstallerMethod, InstallerRepositorySpec, InstallerSpec, Kind, RepositorySourceType, Resource, RuntimeSpec,
    ToolSetMember, ToolSetSpec, ToolSpec,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Turns a declaration directory into the `Resource`s the core resolves
/// (spec.md §6.4). Implementations own the on-disk format; the core only
/// ever sees their `Vec<Resource>` output.
pub trait Loader {
    fn load(&self, dir: &Path) -> Result<Vec<Resource>>;
}

/// On-disk shape of `runtimes.yaml`: a top-level list under `runtimes:`.
#[derive(Debug, Deserialize)]
struct RuntimesFile {
    #[serde(default)]
    runtimes: Vec<RuntimeEntry>,
}

#[derive(Debug, Deserialize)]
struct RuntimeEntry {
    name: String,
    #[serde(rename = "type")]
    runtime_type: String,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstallersFile {
    #[serde(default)]
    installers: Vec<InstallerEntry>,
}

#[derive(Debug, Deserialize)]
struct InstallerEntry {
    name: String,
    method: InstallerMethod,
    #[serde(default)]
    runtime_ref: Option<String>,
    #[serde(default)]
    tool_ref: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    commands: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RepositoriesFile {
    #[serde(default)]
    repositories: Vec<RepositoryEntry>,
}

#[derive(Debug, Deserialize)]
struct RepositoryEntry {
    name: String,
    installer_ref: String,
    source_type: RepositorySourceType,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ToolsFile {
    #[serde(default)]
    tools: Vec<ToolEntry>,
}

#[derive(Debug, Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    installer_ref: Option<String>,
    #[serde(default)]
    runtime_ref: Option<String>,
    #[serde(default)]
    repository_ref: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolSetsFile {
    #[serde(default)]
    tool_sets: Vec<ToolSetEntry>,
}

#[derive(Debug, Deserialize)]
struct ToolSetEntry {
    name: String,
    #[serde(default)]
    installer_ref: Option<String>,
    #[serde(default)]
    runtime_ref: Option<String>,
    #[serde(default)]
    repository_ref: Option<String>,
    #[serde(default)]
    tools: Vec<ToolSetMemberEntry>,
}

#[derive(Debug, Deserialize)]
struct ToolSetMemberEntry {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

/// Reads `runtimes.yaml`, `installers.yaml`, `repositories.yaml`, `tools.yaml`
/// and `tool_sets.yaml` from a declaration directory. Any file that is absent
/// contributes no resources of that kind (there is no requirement that a
/// declaration use every kind).
pub struct YamlLoader;

impl YamlLoader {
    pub fn new() -> Self {
        Self
    }

    fn read_optional<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
        if !path.exists() {
            return Ok(T::default());
        }
        let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }
}

impl Default for YamlLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for RuntimesFile {
    fn default() -> Self {
        Self { runtimes: Vec::new() }
    }
}
impl Default for InstallersFile {
    fn default() -> Self {
        Self { installers: Vec::new() }
    }
}
impl Default for RepositoriesFile {
    fn default() -> Self {
        Self { repositories: Vec::new() }
    }
}
impl Default for ToolsFile {
    fn default() -> Self {
        Self { tools: Vec::new() }
    }
}
impl Default for ToolSetsFile {
    fn default() -> Self {
        Self { tool_sets: Vec::new() }
    }
}

impl Loader for YamlLoader {
    fn load(&self, dir: &Path) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();

        let runtimes: RuntimesFile = Self::read_optional(&dir.join("runtimes.yaml"))?;
        for r in runtimes.runtimes {
            resources.push(Resource::Runtime(RuntimeSpec {
                name: r.name,
                runtime_type: r.runtime_type,
                version: r.version,
            }));
        }

        let installers: InstallersFile = Self::read_optional(&dir.join("installers.yaml"))?;
        for i in installers.installers {
            resources.push(Resource::Installer(InstallerSpec {
                name: i.name,
                method: i.method,
                runtime_ref: i.runtime_ref,
                tool_ref: i.tool_ref,
                version: i.version,
                commands: i.commands,
            }));
        }

        let repositories: RepositoriesFile = Self::read_optional(&dir.join("repositories.yaml"))?;
        for r in repositories.repositories {
            resources.push(Resource::InstallerRepository(InstallerRepositorySpec {
                name: r.name,
                installer_ref: r.installer_ref,
                source_type: r.source_type,
                url: r.url,
            }));
        }

        let tools: ToolsFile = Self::read_optional(&dir.join("tools.yaml"))?;
        for t in tools.tools {
            resources.push(Resource::Tool(ToolSpec {
                name: t.name,
                installer_ref: t.installer_ref,
                runtime_ref: t.runtime_ref,
                repository_ref: t.repository_ref,
                version: t.version,
            }));
        }

        let tool_sets: ToolSetsFile = Self::read_optional(&dir.join("tool_sets.yaml"))?;
        for s in tool_sets.tool_sets {
            resources.push(Resource::ToolSet(ToolSetSpec {
                name: s.name,
                installer_ref: s.installer_ref,
                runtime_ref: s.runtime_ref,
                repository_ref: s.repository_ref,
                tools: s
                    .tools
                    .into_iter()
                    .map(|m| ToolSetMember {
                        name: m.name,
                        version: m.version,
                    })
                    .collect(),
            }));
        }

        Ok(resources)
    }
}

/// Splits a loaded resource set by kind, handed to the CLI layer so it can
/// build the installer backends' lookup tables (`Tool` dispatch needs its
/// owning `Installer`'s method; see `installers::delegation`,
/// `installers::download`). Not part of the core: a convenience for the
/// binary crate's wiring, grounded in the same index-by-name shape
/// `core::executor` itself builds internally.
pub fn index_installers(resources: &[Resource]) -> HashMap<String, InstallerSpec> {
    resources
        .iter()
        .filter_map(|r| match r {
            Resource::Installer(i) => Some((i.name.clone(), i.clone())),
            _ => None,
        })
        .collect()
}

pub fn index_runtimes(resources: &[Resource]) -> HashMap<String, RuntimeSpec> {
    resources
        .iter()
        .filter_map(|r| match r {
            Resource::Runtime(r) => Some((r.name.clone(), r.clone())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_yield_no_resources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = YamlLoader::new();
        let resources = loader.load(dir.path()).expect("load empty dir");
        assert!(resources.is_empty());
    }

    #[test]
    fn loads_runtime_and_dependent_tool() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("runtimes.yaml"),
            "runtimes:\n  - name: go\n    type: go\n    version: \"1.25.6\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("tools.yaml"),
            "tools:\n  - name: gopls\n    runtime_ref: go\n    version: \"0.16.0\"\n",
        )
        .unwrap();

        let loader = YamlLoader::new();
        let resources = loader.load(dir.path()).expect("load");
        assert_eq!(resources.len(), 2);
        assert!(resources.iter().any(|r| r.kind() == Kind::Runtime && r.name() == "go"));
        assert!(resources.iter().any(|r| r.kind() == Kind::Tool && r.name() == "gopls"));
    }

    #[test]
    fn loads_tool_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("installers.yaml"),
            "installers:\n  - name: aqua\n    method: download\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("tool_sets.yaml"),
            "tool_sets:\n  - name: cli-tools\n    installer_ref: aqua\n    tools:\n      - name: fd\n      - name: bat\n        version: \"0.24.0\"\n",
        )
        .unwrap();

        let loader = YamlLoader::new();
        let resources = loader.load(dir.path()).expect("load");
        assert_eq!(resources.len(), 2);
        assert!(resources.iter().any(|r| r.kind() == Kind::ToolSet));
    }
}
