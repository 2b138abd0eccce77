//! Configuration discovery.

use std::path::{Path, PathBuf};

use abook_config::AbookConfig;
use anyhow::Context;
use tracing::info;

const ENV_VAR: &str = "ABOOK_CONFIG";
const LOCAL_FILE: &str = "abook.yaml";
const HOME_FILE: &str = ".config/abook/config.yaml";

/// First existing candidate of: the explicit path, `$ABOOK_CONFIG`,
/// `./abook.yaml`, `~/.config/abook/config.yaml`.
pub fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    resolve(
        explicit,
        std::env::var(ENV_VAR).ok(),
        Path::new("."),
        dirs_next::home_dir(),
    )
}

fn resolve(
    explicit: Option<PathBuf>,
    env: Option<String>,
    cwd: &Path,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    // An explicit path is returned even if missing so loading reports it.
    if explicit.is_some() {
        return explicit;
    }
    if let Some(path) = env.map(PathBuf::from) {
        if path.exists() {
            return Some(path);
        }
    }
    let local = cwd.join(LOCAL_FILE);
    if local.exists() {
        return Some(local);
    }
    home.map(|home| home.join(HOME_FILE))
        .filter(|path| path.exists())
}

/// Load and validate the discovered configuration, or fall back to the
/// defaults when there is none.
pub fn load(explicit: Option<PathBuf>) -> anyhow::Result<AbookConfig> {
    let Some(path) = find_config(explicit) else {
        info!("no configuration file found, using defaults");
        return Ok(AbookConfig::default());
    };
    let config = AbookConfig::from_file(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    config
        .validate_or_err()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    info!(path = %path.display(), "configuration loaded");
    Ok(config)
}
