//! `devrig apply`: reconcile declared resources against persisted state and
//! execute whatever actions are needed (spec.md §4.3).

use crate::config::{index_installers, index_runtimes, Loader, YamlLoader};
use crate::core::executor::Executor;
use crate::installers::download::RuntimeDownloadInstaller;
use crate::installers::{delegation::DelegationInstallerInstaller, git::GitRepositoryInstaller, ToolInstaller};
use crate::{log_info, paths};
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub struct ApplyOptions {
    pub config: Option<PathBuf>,
    pub state: Option<PathBuf>,
    pub parallelism: usize,
    pub sync: bool,
}

pub fn run(opts: ApplyOptions) -> Result<()> {
    let config_dir = paths::resolve_config_dir(opts.config)?;
    let state_path = paths::resolve_state_path(opts.state)?;

    log_info!("[Apply] loading declarations from {}", config_dir.display().to_string().cyan());
    let resources = YamlLoader::new().load(&config_dir)?;
    log_info!("[Apply] {} resources declared", resources.len());

    let installers = index_installers(&resources);
    let runtimes = index_runtimes(&resources);

    let mut executor = Executor::new(
        state_path,
        Box::new(RuntimeDownloadInstaller),
        Box::new(DelegationInstallerInstaller),
        Box::new(GitRepositoryInstaller::new(installers.clone())),
        Box::new(ToolInstaller::new(installers, runtimes)),
    );
    executor.set_parallelism(opts.parallelism);
    executor.set_sync_mode(opts.sync);

    let summary = executor.apply(&resources)?;
    log_info!(
        "[Apply] done: {} layers executed, {} actions executed",
        summary.layers_executed.to_string().green(),
        summary.actions_executed.to_string().green()
    );
    Ok(())
}
