// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, SyncError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SyncError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_remote(cfg)?;
    validate_watch(cfg)?;
    validate_retry(cfg)?;
    validate_sync(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> SyncError {
    SyncError::Config(msg.into())
}

fn validate_remote(cfg: &RawConfigFile) -> Result<()> {
    let remote = &cfg.remote;
    for (field, value) in [
        ("owner", &remote.owner),
        ("repo", &remote.repo),
        ("branch", &remote.branch),
        ("api_base", &remote.api_base),
    ] {
        if value.trim().is_empty() {
            return Err(config_error(format!("[remote].{field} must not be empty")));
        }
    }
    if remote.timeout_secs == 0 {
        return Err(config_error("[remote].timeout_secs must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.debounce_ms == 0 {
        return Err(config_error("[watch].debounce_ms must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_retry(cfg: &RawConfigFile) -> Result<()> {
    let retry = &cfg.retry;
    if retry.backoff_factor.is_nan() || retry.backoff_factor < 1.0 {
        return Err(config_error(format!(
            "[retry].backoff_factor must be >= 1.0 (got {})",
            retry.backoff_factor
        )));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        return Err(config_error(format!(
            "[retry].base_delay_ms ({}) must not exceed max_delay_ms ({})",
            retry.base_delay_ms, retry.max_delay_ms
        )));
    }
    Ok(())
}

fn validate_sync(cfg: &RawConfigFile) -> Result<()> {
    let sync = &cfg.sync;
    if sync.max_file_size == 0 {
        return Err(config_error("[sync].max_file_size must be >= 1 (got 0)"));
    }
    if sync.min_file_size > sync.max_file_size {
        return Err(config_error(format!(
            "[sync].min_file_size ({}) must not exceed max_file_size ({})",
            sync.min_file_size, sync.max_file_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_src: &str) -> RawConfigFile {
        toml::from_str(toml_src).unwrap()
    }

    const MINIMAL: &str = r#"
        [remote]
        owner = "octo"
        repo = "notes"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = ConfigFile::try_from(raw(MINIMAL)).unwrap();
        assert_eq!(cfg.remote.branch, "main");
        assert_eq!(cfg.remote.api_base, "https://api.github.com");
        assert_eq!(cfg.username(), "octo");
        assert_eq!(cfg.watch.debounce_ms, 2000);
        assert_eq!(cfg.watch.settle_ms, 500);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.base_delay_ms, 2000);
        assert_eq!(cfg.sync.targets_file, "projects.json");
        assert_eq!(cfg.sync.commit_message, "Auto-commit: file update");
        assert!(cfg.sync.validate_credentials);
        assert_eq!(cfg.sync.max_file_size, 50 * 1024 * 1024);
        assert_eq!(cfg.upload_filter(), crate::sync::UploadFilter::default());
    }

    #[test]
    fn missing_owner_is_rejected() {
        let err = ConfigFile::try_from(raw("[remote]\nrepo = \"notes\"")).unwrap_err();
        assert!(err.to_string().contains("[remote].owner"));
    }

    #[test]
    fn bad_retry_settings_are_rejected() {
        let src = format!("{MINIMAL}\n[retry]\nbackoff_factor = 0.5");
        assert!(ConfigFile::try_from(raw(&src)).is_err());

        let src = format!("{MINIMAL}\n[retry]\nbase_delay_ms = 5000\nmax_delay_ms = 100");
        assert!(ConfigFile::try_from(raw(&src)).is_err());
    }

    #[test]
    fn bad_upload_limits_are_rejected() {
        let src = format!("{MINIMAL}\n[sync]\nmax_file_size = 0");
        assert!(ConfigFile::try_from(raw(&src)).is_err());

        let src = format!("{MINIMAL}\n[sync]\nmax_file_size = 10\nmin_file_size = 11");
        let err = ConfigFile::try_from(raw(&src)).unwrap_err();
        assert!(err.to_string().contains("[sync].min_file_size"));
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let src = format!("{MINIMAL}\n[watch]\ndebounce_ms = 0");
        assert!(ConfigFile::try_from(raw(&src)).is_err());
    }

    #[test]
    fn unknown_sections_fail_to_parse() {
        assert!(toml::from_str::<RawConfigFile>("[task.A]\ncmd = \"echo\"").is_err());
    }
}
