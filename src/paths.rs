//! Resolves the two filesystem locations devrig needs per invocation: the
//! declaration directory and the state file. Grounded in the teacher's
//! `libs::paths::resolve_paths`, trimmed from four defaults (config, state,
//! shellrc, fonts) down to the two devrig's resource model actually uses.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

const DEFAULT_CONFIG_DIR: &str = ".devrig/config";
const DEFAULT_STATE_FILE: &str = ".devrig/state.json";

/// Expands a leading `~` or `$VAR` in a user-supplied `--config`/`--state`
/// override before it's used as a path. Defaults built from `dirs::home_dir`
/// never need this; only what the user typed does.
fn expand(path: PathBuf) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw).with_context(|| format!("expanding path '{raw}'"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Resolves the declaration directory, honoring an explicit `--config`
/// override and otherwise defaulting to `~/.devrig/config`.
pub fn resolve_config_dir(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return expand(path);
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
    Ok(home.join(DEFAULT_CONFIG_DIR))
}

/// Resolves the state file, honoring an explicit `--state` override and
/// otherwise defaulting to `~/.devrig/state.json`.
pub fn resolve_state_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return expand(path);
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
    Ok(home.join(DEFAULT_STATE_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_wins_over_default() {
        let custom = PathBuf::from("/tmp/my-config");
        assert_eq!(resolve_config_dir(Some(custom.clone())).unwrap(), custom);
    }

    #[test]
    fn default_config_dir_lives_under_home() {
        let resolved = resolve_config_dir(None).unwrap();
        assert!(resolved.ends_with(".devrig/config"));
    }
}
