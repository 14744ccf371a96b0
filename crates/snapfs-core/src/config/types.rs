use std::path::PathBuf;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::snapshot::SnapshotFilter;
use snapfs_types::{Result, SnapfsError};

/// Top-level config file document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapfsConfig {
    /// Path of the repository directory.
    #[serde(default)]
    pub repository: Option<PathBuf>,
    #[serde(default)]
    pub mount: MountConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// Settings for the virtual snapshot filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    /// Report every entry as owned by uid/gid 0 instead of the current user.
    #[serde(default)]
    pub owner_is_root: bool,
    /// Only show snapshots from these hosts.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Only show snapshots carrying all tags of at least one group.
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    /// Only show snapshots that include all of these paths.
    #[serde(default)]
    pub paths: Vec<String>,
    /// strftime template naming snapshot directories.
    #[serde(default = "default_snapshot_template")]
    pub snapshot_template: String,
    /// How old the cached snapshot list may get before it is reloaded.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
    /// Blob cache capacity in bytes.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            owner_is_root: false,
            hosts: Vec::new(),
            tags: Vec::new(),
            paths: Vec::new(),
            snapshot_template: default_snapshot_template(),
            refresh_interval: default_refresh_interval(),
            cache_size: default_cache_size(),
        }
    }
}

impl MountConfig {
    pub fn filter(&self) -> SnapshotFilter {
        SnapshotFilter {
            hosts: self.hosts.clone(),
            tags: self.tags.clone(),
            paths: self.paths.clone(),
        }
    }

    pub fn refresh_interval(&self) -> Result<Duration> {
        parse_human_duration(&self.refresh_interval)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval()?.is_zero() {
            return Err(SnapfsError::Config(
                "mount.refresh_interval must be greater than zero".into(),
            ));
        }
        if self.cache_size == 0 {
            return Err(SnapfsError::Config(
                "mount.cache_size must be greater than zero".into(),
            ));
        }
        validate_template(&self.snapshot_template)
    }
}

/// A template must parse cleanly and must never yield a path separator,
/// since its output becomes a single directory name.
fn validate_template(template: &str) -> Result<()> {
    if template.is_empty() {
        return Err(SnapfsError::Config(
            "mount.snapshot_template must not be empty".into(),
        ));
    }
    if StrftimeItems::new(template).any(|item| matches!(item, Item::Error)) {
        return Err(SnapfsError::Config(format!(
            "invalid mount.snapshot_template '{template}'"
        )));
    }
    let sample = Utc
        .with_ymd_and_hms(2001, 2, 3, 4, 5, 6)
        .single()
        .map(|t| t.format(template).to_string())
        .unwrap_or_default();
    if sample.contains('/') || sample == "." || sample == ".." {
        return Err(SnapfsError::Config(format!(
            "mount.snapshot_template '{template}' produces invalid directory names"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgressConfig {
    /// Interval between periodic status updates; "0" disables them.
    #[serde(default = "default_progress_interval")]
    pub interval: String,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval: default_progress_interval(),
        }
    }
}

impl ProgressConfig {
    pub fn interval(&self) -> Result<Duration> {
        parse_human_duration(&self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = MountConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.refresh_interval().unwrap(), Duration::from_secs(60));
        assert!(cfg.filter().is_empty());
    }

    #[test]
    fn zero_refresh_interval_is_rejected() {
        let cfg = MountConfig {
            refresh_interval: "0s".into(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(SnapfsError::Config(_))));
    }

    #[test]
    fn template_with_slash_is_rejected() {
        let cfg = MountConfig {
            snapshot_template: "%Y/%m/%d".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_template_is_rejected() {
        let cfg = MountConfig {
            snapshot_template: "%Q".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn filter_copies_restrictions() {
        let cfg = MountConfig {
            hosts: vec!["web".into()],
            tags: vec![vec!["daily".into()]],
            paths: vec!["/etc".into()],
            ..Default::default()
        };
        let f = cfg.filter();
        assert_eq!(f.hosts, vec!["web".to_string()]);
        assert_eq!(f.tags, vec![vec!["daily".to_string()]]);
        assert_eq!(f.paths, vec!["/etc".to_string()]);
    }
}
