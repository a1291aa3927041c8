use std::{env, path::PathBuf};

use crate::config::DEFAULT_LAZYBOX_HOME;

use super::{LAZYBOX_CONFIG_ENV_VAR, LAZYBOX_CONFIG_FILENAME, LAZYBOX_HOME_ENV_VAR};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Loads variables from a `.env` file in the current directory or its parents, if there is one.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("failed to load .env file: {e}"),
    }
}

/// Returns the lazybox home directory.
///
/// `LAZYBOX_HOME` takes precedence over the default `~/.lazybox`.
pub fn get_lazybox_home_path() -> PathBuf {
    match env::var(LAZYBOX_HOME_ENV_VAR) {
        Ok(home) if !home.is_empty() => PathBuf::from(home),
        _ => DEFAULT_LAZYBOX_HOME.to_path_buf(),
    }
}

/// Resolves the configuration file path.
///
/// An explicit path wins, then `LAZYBOX_CONFIG`, then `$LAZYBOX_HOME/lazybox.toml`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    match env::var(LAZYBOX_CONFIG_ENV_VAR) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => get_lazybox_home_path().join(LAZYBOX_CONFIG_FILENAME),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
