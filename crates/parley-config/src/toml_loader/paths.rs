//! Where the config file lives, and writing the commented default.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use parley_common::ConfigError;
use tracing::info;

use super::template::default_config_toml;

/// Overrides the platform config location when set.
pub const ENV_CONFIG_PATH: &str = "PARLEY_CONFIG";

/// `$PARLEY_CONFIG`, else `<platform config dir>/parley/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    config_path_from(|key| std::env::var_os(key))
}

pub(crate) fn config_path_from<F>(lookup: F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<OsString>,
{
    if let Some(path) = lookup(ENV_CONFIG_PATH).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("parley").join("config.toml"))
}

/// Write the commented default config to `path`.
///
/// Never replaces an existing file. The file can hold the anon key and an
/// access token, so on Unix it is created readable by the owner only.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::ParseError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            ConfigError::ParseError(format!(
                "refusing to overwrite existing config at {}",
                path.display()
            ))
        } else {
            ConfigError::ParseError(format!("failed to create {}: {e}", path.display()))
        }
    })?;
    file.write_all(default_config_toml().as_bytes())
        .map_err(|e| ConfigError::ParseError(format!("failed to write {}: {e}", path.display())))?;

    info!(path = %path.display(), "Created default config");
    Ok(())
}
