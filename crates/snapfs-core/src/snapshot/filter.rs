use serde::{Deserialize, Serialize};

use super::Snapshot;

/// Restricts which snapshots are visible.
///
/// Empty fields do not filter. `tags` is a list of tag groups: a snapshot
/// matches when it carries every tag of at least one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFilter {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub paths: Vec<String>,
}

impl SnapshotFilter {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.tags.is_empty() && self.paths.is_empty()
    }

    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        if !self.hosts.is_empty() && !self.hosts.iter().any(|h| *h == snapshot.hostname) {
            return false;
        }

        if !self.tags.is_empty()
            && !self
                .tags
                .iter()
                .any(|group| group.iter().all(|t| snapshot.has_tag(t)))
        {
            return false;
        }

        self.paths
            .iter()
            .all(|p| snapshot.paths.iter().any(|sp| sp == p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use snapfs_types::{BlobId, SnapshotId};

    fn snap(host: &str, tags: &[&str], paths: &[&str]) -> Snapshot {
        Snapshot {
            id: SnapshotId([7; 32]),
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            hostname: host.to_string(),
            username: String::new(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            paths: paths.iter().map(|s| s.to_string()).collect(),
            tree: BlobId([0; 32]),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = SnapshotFilter::default();
        assert!(f.is_empty());
        assert!(f.matches(&snap("a", &[], &[])));
    }

    #[test]
    fn host_filter_is_any_of() {
        let f = SnapshotFilter {
            hosts: vec!["web".into(), "db".into()],
            ..Default::default()
        };
        assert!(f.matches(&snap("db", &[], &[])));
        assert!(!f.matches(&snap("mail", &[], &[])));
    }

    #[test]
    fn tag_groups_need_all_tags_of_one_group() {
        let f = SnapshotFilter {
            tags: vec![vec!["daily".into(), "prod".into()], vec!["manual".into()]],
            ..Default::default()
        };
        assert!(f.matches(&snap("h", &["prod", "daily", "x"], &[])));
        assert!(f.matches(&snap("h", &["manual"], &[])));
        assert!(!f.matches(&snap("h", &["daily"], &[])));
    }

    #[test]
    fn paths_must_all_be_present() {
        let f = SnapshotFilter {
            paths: vec!["/etc".into(), "/home".into()],
            ..Default::default()
        };
        assert!(f.matches(&snap("h", &[], &["/home", "/etc", "/var"])));
        assert!(!f.matches(&snap("h", &[], &["/etc"])));
    }
}
