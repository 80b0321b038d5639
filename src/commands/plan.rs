//! `devrig plan`: shows what `apply` would do, without side effects
//! (spec.md §4.3 `plan_all`).

use crate::config::{Loader, YamlLoader};
use crate::core::executor::Executor;
use crate::core::reconciler::ActionType;
use crate::installers::download::RuntimeDownloadInstaller;
use crate::installers::{delegation::DelegationInstallerInstaller, git::GitRepositoryInstaller, ToolInstaller};
use crate::{log_info, paths};
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub struct PlanOptions {
    pub config: Option<PathBuf>,
    pub state: Option<PathBuf>,
}

fn describe(action_type: ActionType) -> colored::ColoredString {
    match action_type {
        ActionType::Install => "install".green(),
        ActionType::Upgrade => "upgrade".yellow(),
        ActionType::Reinstall => "reinstall".yellow(),
        ActionType::Remove => "remove".red(),
        ActionType::None => "none".dimmed(),
    }
}

pub fn run(opts: PlanOptions) -> Result<()> {
    let config_dir = paths::resolve_config_dir(opts.config)?;
    let state_path = paths::resolve_state_path(opts.state)?;

    log_info!("[Plan] loading declarations from {}", config_dir.display().to_string().cyan());
    let resources = YamlLoader::new().load(&config_dir)?;

    // `plan_all` never calls an installer backend, but `Executor::new` still
    // requires four boxed ones to exist - they are simply never invoked.
    let executor = Executor::new(
        state_path,
        Box::new(RuntimeDownloadInstaller),
        Box::new(DelegationInstallerInstaller),
        Box::new(GitRepositoryInstaller::new(Default::default())),
        Box::new(ToolInstaller::new(Default::default(), Default::default())),
    );

    let plan = executor.plan_all(&resources)?;

    let mut any = false;
    for action in &plan.runtime_actions {
        if action.action_type != ActionType::None {
            any = true;
            println!("{} runtime/{}: {}", describe(action.action_type), action.name, action.reason);
        }
    }
    for action in &plan.repository_actions {
        if action.action_type != ActionType::None {
            any = true;
            println!("{} repository/{}: {}", describe(action.action_type), action.name, action.reason);
        }
    }
    for action in &plan.tool_actions {
        if action.action_type != ActionType::None {
            any = true;
            println!("{} tool/{}: {}", describe(action.action_type), action.name, action.reason);
        }
    }

    if !any {
        println!("{}", "no changes".dimmed());
    }
    Ok(())
}
