//! Delegation-style installation: run externally declared shell commands
//! instead of devrig understanding the package manager itself (spec.md §6.1,
//! §11 "delegation" backend).
//!
//! Grounded in the teacher's `installers::{brew,cargo,pip}` family (each a
//! thin wrapper around `std::process::Command`), generalized into one
//! backend driven by the `commands` map an `InstallerSpec` carries, rather
//! than one hardcoded module per package manager.

use crate::core::installer::{ActionContext, Installer};
use crate::core::resource::{InstallerSpec, ToolSpec};
use crate::core::state::{InstallerState, ToolState, VersionKind};
use crate::{log_debug, log_info, log_warn};
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use colored::Colorize;
use std::collections::HashMap;
use std::process::Command;

fn render(template: &str, name: &str, version: &str) -> String {
    template.replace("{name}", name).replace("{version}", version)
}

/// Runs `template` (with `{name}`/`{version}` substituted) through `sh -c`,
/// mirroring how the teacher's package-manager installers shell out directly
/// rather than parsing arguments themselves (a delegation installer owns
/// its whole command line, quoting included).
fn run(template: &str, name: &str, version: &str) -> Result<()> {
    let command_line = render(template, name, version);
    log_info!("[Delegation] running: {}", command_line.cyan());
    let output = Command::new("sh").arg("-c").arg(&command_line).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("command `{command_line}` failed: {stderr}");
    }
    if !output.stderr.is_empty() {
        log_warn!("[Delegation] stderr: {}", String::from_utf8_lossy(&output.stderr));
    }
    log_debug!("[Delegation] stdout: {}", String::from_utf8_lossy(&output.stdout));
    Ok(())
}

/// Installs `Installer` resources whose own `method` is `delegation`: the
/// installer is itself set up by running its declared `install`/`remove`
/// commands (e.g. bootstrapping a package manager before it installs tools).
pub struct DelegationInstallerInstaller;

impl Installer<InstallerSpec, InstallerState> for DelegationInstallerInstaller {
    fn install(&self, _ctx: &ActionContext, resource: &InstallerSpec, name: &str) -> Result<InstallerState> {
        let template = resource
            .commands
            .get("install")
            .ok_or_else(|| anyhow!("delegation installer '{name}' has no 'install' command"))?;
        let version = resource.version.as_deref().unwrap_or("latest");
        run(template, name, version)?;
        Ok(InstallerState {
            version: resource.version.clone(),
            updated_at: Utc::now(),
        })
    }

    fn remove(&self, _ctx: &ActionContext, _state: &InstallerState, name: &str) -> Result<()> {
        bail!("removal of delegation installer '{name}' is not supported: run its own uninstaller")
    }
}

/// Installs `Tool` resources whose owning `Installer` uses the `delegation`
/// method, by running that installer's `install`/`remove` command templates
/// with the tool's own name and version substituted in.
pub struct DelegationToolInstaller {
    installers: HashMap<String, InstallerSpec>,
}

impl DelegationToolInstaller {
    pub fn new(installers: HashMap<String, InstallerSpec>) -> Self {
        Self { installers }
    }

    fn owning_installer(&self, tool: &ToolSpec) -> Result<&InstallerSpec> {
        let installer_ref = tool
            .installer_ref
            .as_deref()
            .ok_or_else(|| anyhow!("tool '{}' has no installer_ref", tool.name))?;
        self.installers
            .get(installer_ref)
            .ok_or_else(|| anyhow!("installer '{installer_ref}' not found for tool '{}'", tool.name))
    }
}

impl Installer<ToolSpec, ToolState> for DelegationToolInstaller {
    fn install(&self, _ctx: &ActionContext, resource: &ToolSpec, name: &str) -> Result<ToolState> {
        let installer = self.owning_installer(resource)?;
        let template = installer
            .commands
            .get("install")
            .ok_or_else(|| anyhow!("installer '{}' has no 'install' command", installer.name))?;
        let version = resource.version.as_deref().unwrap_or("latest");
        run(template, name, version)?;

        Ok(ToolState {
            installer_ref: resource.installer_ref.clone(),
            runtime_ref: resource.runtime_ref.clone(),
            repository_ref: resource.repository_ref.clone(),
            version: version.to_string(),
            version_kind: VersionKind::Exact,
            spec_version: resource.version.clone(),
            install_path: format!("(managed by {})", installer.name),
            bin_paths: Vec::new(),
            taint_reason: None,
            updated_at: Utc::now(),
        })
    }

    fn remove(&self, _ctx: &ActionContext, state: &ToolState, name: &str) -> Result<()> {
        let installer_ref = state
            .installer_ref
            .as_deref()
            .ok_or_else(|| anyhow!("tool '{name}' has no recorded installer_ref to remove it through"))?;
        let installer = self
            .installers
            .get(installer_ref)
            .ok_or_else(|| anyhow!("installer '{installer_ref}' not found for tool '{name}'"))?;
        let template = installer
            .commands
            .get("remove")
            .ok_or_else(|| anyhow!("installer '{installer_ref}' has no 'remove' command"))?;
        run(template, name, &state.version)
    }
}
