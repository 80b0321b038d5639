//! Concrete installer backends devrig ships, and the dispatch that picks
//! among them for `Tool` resources (spec.md §6.1, §11).
//!
//! The core only knows `Installer<R, S>`; it never inspects *how* a backend
//! gets its work done. Everything kind-specific (download vs delegation vs
//! git, or a tool installed through a runtime directly) lives here.

pub mod delegation;
pub mod download;
pub mod git;

use crate::core::installer::{ActionContext, Installer};
use crate::core::resource::{InstallerMethod, InstallerSpec, RuntimeSpec, ToolSpec};
use crate::core::state::{ToolState, VersionKind};
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::process::Command;

/// Built-in `<runtime> install <tool>` conventions, grounded in the
/// teacher's per-runtime tool installers (`installers::go`, `installers::cargo`).
fn builtin_runtime_tool_template(runtime_type: &str) -> Option<&'static str> {
    match runtime_type {
        "go" => Some("go install {name}@{version}"),
        "rust" => Some("cargo install --version {version} {name}"),
        "node" => Some("npm install -g {name}@{version}"),
        _ => None,
    }
}

fn run_runtime_tool_command(runtime_type: &str, name: &str, version: &str) -> Result<()> {
    let template = builtin_runtime_tool_template(runtime_type)
        .ok_or_else(|| anyhow!("no tool-install convention known for runtime type '{runtime_type}'"))?;
    let command_line = template.replace("{name}", name).replace("{version}", version);
    crate::log_info!("[Runtime] running: {}", command_line);
    let output = Command::new("sh").arg("-c").arg(&command_line).output()?;
    if !output.status.success() {
        bail!("command `{command_line}` failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(())
}

/// Dispatches `Tool` installation across the three ways a tool can be
/// declared: via a download-method `Installer`, via a delegation-method
/// `Installer`, or directly through a `Runtime` (spec.md §3 "a Tool
/// declares exactly one of installer_ref or runtime_ref as its primary
/// provisioning path").
pub struct ToolInstaller {
    download: download::ToolDownloadInstaller,
    delegation: delegation::DelegationToolInstaller,
    runtimes: HashMap<String, RuntimeSpec>,
    installers: HashMap<String, InstallerSpec>,
}

impl ToolInstaller {
    pub fn new(installers: HashMap<String, InstallerSpec>, runtimes: HashMap<String, RuntimeSpec>) -> Self {
        Self {
            download: download::ToolDownloadInstaller::new(installers.clone()),
            delegation: delegation::DelegationToolInstaller::new(installers.clone()),
            runtimes,
            installers,
        }
    }
}

impl Installer<ToolSpec, ToolState> for ToolInstaller {
    fn install(&self, ctx: &ActionContext, resource: &ToolSpec, name: &str) -> Result<ToolState> {
        if let Some(installer_ref) = &resource.installer_ref {
            let installer = self
                .installers
                .get(installer_ref)
                .ok_or_else(|| anyhow!("installer '{installer_ref}' not found for tool '{name}'"))?;
            return match installer.method {
                InstallerMethod::Download => self.download.install(ctx, resource, name),
                InstallerMethod::Delegation => self.delegation.install(ctx, resource, name),
            };
        }

        if let Some(runtime_ref) = &resource.runtime_ref {
            let runtime = self
                .runtimes
                .get(runtime_ref)
                .ok_or_else(|| anyhow!("runtime '{runtime_ref}' not found for tool '{name}'"))?;
            let version = resource.version.as_deref().unwrap_or("latest");
            run_runtime_tool_command(&runtime.runtime_type, name, version)?;
            return Ok(ToolState {
                installer_ref: None,
                runtime_ref: Some(runtime_ref.clone()),
                repository_ref: resource.repository_ref.clone(),
                version: version.to_string(),
                version_kind: VersionKind::Exact,
                spec_version: resource.version.clone(),
                install_path: format!("(managed by runtime {})", runtime.name),
                bin_paths: Vec::new(),
                taint_reason: None,
                updated_at: Utc::now(),
            });
        }

        bail!("tool '{name}' declares neither installer_ref nor runtime_ref")
    }

    fn remove(&self, ctx: &ActionContext, state: &ToolState, name: &str) -> Result<()> {
        if let Some(installer_ref) = &state.installer_ref {
            let installer = self
                .installers
                .get(installer_ref)
                .ok_or_else(|| anyhow!("installer '{installer_ref}' not found for tool '{name}'"))?;
            return match installer.method {
                InstallerMethod::Download => self.download.remove(ctx, state, name),
                InstallerMethod::Delegation => self.delegation.remove(ctx, state, name),
            };
        }

        if state.runtime_ref.is_some() {
            bail!("removal of runtime-installed tool '{name}' is not supported: remove it via the runtime's own tooling")
        }

        bail!("tool '{name}' has no recorded installer_ref or runtime_ref to remove it through")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reconciler::ActionType;
    use crate::core::installer::CancellationToken;

    fn ctx() -> ActionContext {
        ActionContext::new(ActionType::Install, CancellationToken::new())
    }

    #[test]
    fn tool_with_neither_ref_is_rejected() {
        let installer = ToolInstaller::new(HashMap::new(), HashMap::new());
        let tool = ToolSpec {
            name: "mystery".into(),
            installer_ref: None,
            runtime_ref: None,
            repository_ref: None,
            version: None,
        };
        assert!(installer.install(&ctx(), &tool, "mystery").is_err());
    }

    #[test]
    fn tool_with_unknown_runtime_type_is_rejected() {
        let mut runtimes = HashMap::new();
        runtimes.insert(
            "cobol".to_string(),
            RuntimeSpec {
                name: "cobol".into(),
                runtime_type: "cobol-vm".into(),
                version: None,
            },
        );
        let installer = ToolInstaller::new(HashMap::new(), runtimes);
        let tool = ToolSpec {
            name: "compiler".into(),
            installer_ref: None,
            runtime_ref: Some("cobol".into()),
            repository_ref: None,
            version: None,
        };
        assert!(installer.install(&ctx(), &tool, "compiler").is_err());
    }
}
