//! `InstallerRepository` backend: clones a git-sourced repository, or runs
//! the owning installer's own commands for a delegation-sourced one (spec.md
//! §6.1, §11 "git" backend).
//!
//! No git library dependency is added - devrig shells out to the system
//! `git`, the same posture the teacher takes toward every external tool it
//! wraps (`brew`, `cargo`, `rustup`) rather than reimplementing a client.

use crate::core::installer::{ActionContext, Installer};
use crate::core::resource::{InstallerRepositorySpec, InstallerSpec, RepositorySourceType};
use crate::core::state::InstallerRepositoryState;
use crate::{log_info, log_warn};
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

fn devrig_home() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(".devrig"))
        .ok_or_else(|| anyhow!("could not determine home directory"))
}

/// Installs and removes `InstallerRepository` resources. Git-sourced
/// repositories are cloned directly; delegation-sourced ones run their
/// owning `Installer`'s `add_repository`/`remove_repository` commands (e.g.
/// `brew tap`/`brew untap`).
pub struct GitRepositoryInstaller {
    installers: HashMap<String, InstallerSpec>,
}

impl GitRepositoryInstaller {
    pub fn new(installers: HashMap<String, InstallerSpec>) -> Self {
        Self { installers }
    }

    fn owning_installer(&self, resource: &InstallerRepositorySpec) -> Result<&InstallerSpec> {
        self.installers
            .get(&resource.installer_ref)
            .ok_or_else(|| anyhow!("installer '{}' not found for repository '{}'", resource.installer_ref, resource.name))
    }
}

impl Installer<InstallerRepositorySpec, InstallerRepositoryState> for GitRepositoryInstaller {
    fn install(&self, _ctx: &ActionContext, resource: &InstallerRepositorySpec, name: &str) -> Result<InstallerRepositoryState> {
        match resource.source_type {
            RepositorySourceType::Git => {
                let dest = devrig_home()?.join("repository").join(name);
                if dest.exists() {
                    std::fs::remove_dir_all(&dest)?;
                }
                std::fs::create_dir_all(dest.parent().expect("repository dir has a parent"))?;

                log_info!("[Git] cloning {} into {}", resource.url.cyan(), dest.display());
                let output = Command::new("git")
                    .arg("clone")
                    .arg("--depth")
                    .arg("1")
                    .arg(&resource.url)
                    .arg(&dest)
                    .output()
                    .with_context(|| "executing git clone")?;
                if !output.status.success() {
                    bail!("git clone of '{}' failed: {}", resource.url, String::from_utf8_lossy(&output.stderr));
                }

                Ok(InstallerRepositoryState {
                    source_type: resource.source_type,
                    url: resource.url.clone(),
                    local_path: Some(dest.to_string_lossy().into_owned()),
                    remove_cmd: None,
                    updated_at: Utc::now(),
                })
            }
            RepositorySourceType::Delegation => {
                let installer = self.owning_installer(resource)?;
                let template = installer
                    .commands
                    .get("add_repository")
                    .ok_or_else(|| anyhow!("installer '{}' has no 'add_repository' command", installer.name))?;
                let command_line = template.replace("{url}", &resource.url).replace("{name}", name);
                log_info!("[Git] running: {}", command_line.cyan());
                let output = Command::new("sh").arg("-c").arg(&command_line).output()?;
                if !output.status.success() {
                    bail!("command `{command_line}` failed: {}", String::from_utf8_lossy(&output.stderr));
                }

                let remove_cmd = installer.commands.get("remove_repository").cloned();
                Ok(InstallerRepositoryState {
                    source_type: resource.source_type,
                    url: resource.url.clone(),
                    local_path: None,
                    remove_cmd,
                    updated_at: Utc::now(),
                })
            }
        }
    }

    fn remove(&self, _ctx: &ActionContext, state: &InstallerRepositoryState, name: &str) -> Result<()> {
        match state.source_type {
            RepositorySourceType::Git => {
                if let Some(path) = &state.local_path {
                    let path = PathBuf::from(path);
                    if path.exists() {
                        std::fs::remove_dir_all(&path).with_context(|| format!("removing repository '{name}' at {}", path.display()))?;
                    }
                } else {
                    log_warn!("[Git] repository '{name}' has no recorded local path; nothing to remove");
                }
                Ok(())
            }
            RepositorySourceType::Delegation => {
                let Some(command_line) = &state.remove_cmd else {
                    log_warn!("[Git] repository '{name}' has no recorded remove command; nothing to run");
                    return Ok(());
                };
                let output = Command::new("sh").arg("-c").arg(command_line).output()?;
                if !output.status.success() {
                    bail!("command `{command_line}` failed: {}", String::from_utf8_lossy(&output.stderr));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reconciler::ActionType;
    use crate::core::resource::InstallerMethod;

    fn ctx() -> ActionContext {
        ActionContext::new(ActionType::Install, crate::core::installer::CancellationToken::new())
    }

    #[test]
    fn delegation_source_requires_known_installer() {
        let installer = GitRepositoryInstaller::new(HashMap::new());
        let repo = InstallerRepositorySpec {
            name: "custom-tap".into(),
            installer_ref: "brew".into(),
            source_type: RepositorySourceType::Delegation,
            url: "user/repo".into(),
        };
        assert!(installer.install(&ctx(), &repo, "custom-tap").is_err());
    }

    #[test]
    fn delegation_source_runs_add_repository_template() {
        let mut installers = HashMap::new();
        installers.insert(
            "brew".to_string(),
            InstallerSpec {
                name: "brew".into(),
                method: InstallerMethod::Delegation,
                runtime_ref: None,
                tool_ref: None,
                version: None,
                commands: [("add_repository".to_string(), "true {url}".to_string())].into(),
            },
        );
        let installer = GitRepositoryInstaller::new(installers);
        let repo = InstallerRepositorySpec {
            name: "custom-tap".into(),
            installer_ref: "brew".into(),
            source_type: RepositorySourceType::Delegation,
            url: "user/repo".into(),
        };
        let state = installer.install(&ctx(), &repo, "custom-tap").expect("install");
        assert_eq!(state.url, "user/repo");
        assert!(state.local_path.is_none());
    }

    #[test]
    fn remove_without_recorded_state_is_a_noop() {
        let installer = GitRepositoryInstaller::new(HashMap::new());
        let state = InstallerRepositoryState {
            source_type: RepositorySourceType::Git,
            url: "https://example.com/repo.git".into(),
            local_path: None,
            remove_cmd: None,
            updated_at: Utc::now(),
        };
        assert!(installer.remove(&ctx(), &state, "custom-tap").is_ok());
    }
}
