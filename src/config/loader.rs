// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks the remote coordinates, watch timings and retry settings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `Watchsync.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Watchsync.toml")
}

/// Resolve the targets file relative to the config file's directory, unless
/// it is absolute.
pub fn resolve_targets_path(config_path: &Path, targets_file: &str) -> PathBuf {
    let targets = Path::new(targets_file);
    if targets.is_absolute() {
        return targets.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(targets),
        _ => targets.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_path_is_relative_to_config_dir() {
        assert_eq!(
            resolve_targets_path(Path::new("conf/Watchsync.toml"), "projects.json"),
            PathBuf::from("conf/projects.json")
        );
        assert_eq!(
            resolve_targets_path(Path::new("Watchsync.toml"), "projects.json"),
            PathBuf::from("projects.json")
        );
        assert_eq!(
            resolve_targets_path(Path::new("conf/Watchsync.toml"), "/data/p.json"),
            PathBuf::from("/data/p.json")
        );
    }
}
