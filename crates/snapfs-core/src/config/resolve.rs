use std::fmt;
use std::path::{Path, PathBuf};

use super::types::SnapfsConfig;
use snapfs_types::{Result, SnapfsError};

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "SNAPFS_CONFIG";

/// Tracks where the config file was found.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Explicitly passed via `--config`.
    CliArg(PathBuf),
    /// Set via the `SNAPFS_CONFIG` env var.
    EnvVar(PathBuf),
    /// Found by searching standard locations.
    SearchOrder { path: PathBuf, level: &'static str },
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::CliArg(p) => p,
            ConfigSource::EnvVar(p) => p,
            ConfigSource::SearchOrder { path, .. } => path,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::CliArg(p) => write!(f, "{} (--config)", p.display()),
            ConfigSource::EnvVar(p) => write!(f, "{} ({CONFIG_ENV_VAR})", p.display()),
            ConfigSource::SearchOrder { path, level } => {
                write!(f, "{} ({})", path.display(), level)
            }
        }
    }
}

/// Returns search locations in priority order: project, then user.
pub fn default_config_search_paths() -> Vec<(PathBuf, &'static str)> {
    let mut paths = vec![(PathBuf::from("snapfs.yaml"), "project")];

    let user_config = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .map(|base| base.join("snapfs").join("config.yaml"));
    if let Some(p) = user_config {
        paths.push((p, "user"));
    }

    paths
}

/// Locate the config file: `--config`, then `$SNAPFS_CONFIG`, then the
/// search paths. Returns `None` when nothing was found.
pub fn resolve_config_path(cli_config: Option<&str>) -> Option<ConfigSource> {
    if let Some(path) = cli_config {
        return Some(ConfigSource::CliArg(PathBuf::from(path)));
    }

    if let Ok(val) = std::env::var(CONFIG_ENV_VAR) {
        if !val.is_empty() {
            return Some(ConfigSource::EnvVar(PathBuf::from(val)));
        }
    }

    default_config_search_paths()
        .into_iter()
        .find(|(path, _)| path.exists())
        .map(|(path, level)| ConfigSource::SearchOrder { path, level })
}

/// Read, parse and validate a YAML config file.
pub fn load_config(path: &Path) -> Result<SnapfsConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        SnapfsError::Config(format!("cannot read '{}': {e}", path.display()))
    })?;
    parse_config(&contents)
        .map_err(|e| SnapfsError::Config(format!("invalid config '{}': {e}", path.display())))
}

/// Parse and validate a YAML config document.
pub fn parse_config(contents: &str) -> Result<SnapfsConfig> {
    let config: SnapfsConfig =
        serde_yaml::from_str(contents).map_err(|e| SnapfsError::Config(e.to_string()))?;
    config.mount.validate()?;
    config.progress.interval()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_full_document() {
        let yaml = r#"
repository: /srv/backups
mount:
  owner_is_root: true
  hosts: [web]
  tags:
    - [daily, prod]
  snapshot_template: "%Y-%m-%d"
  refresh_interval: 30s
  cache_size: 1048576
progress:
  interval: 250ms
"#;
        let cfg = parse_config(yaml).unwrap();
        assert_eq!(cfg.repository, Some(PathBuf::from("/srv/backups")));
        assert!(cfg.mount.owner_is_root);
        assert_eq!(cfg.mount.tags, vec![vec!["daily".to_string(), "prod".to_string()]]);
        assert_eq!(cfg.mount.cache_size, 1 << 20);
        assert_eq!(cfg.progress.interval().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = parse_config("{}").unwrap();
        assert!(cfg.repository.is_none());
        assert!(!cfg.mount.owner_is_root);
        assert_eq!(cfg.progress.interval().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse_config("mount:\n  owner_is_rot: true\n").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, SnapfsError::Config(_)));
    }

    #[test]
    fn explicit_path_wins() {
        let src = resolve_config_path(Some("/tmp/explicit.yaml")).unwrap();
        assert!(matches!(src, ConfigSource::CliArg(_)));
        assert_eq!(src.path(), Path::new("/tmp/explicit.yaml"));
    }
}
