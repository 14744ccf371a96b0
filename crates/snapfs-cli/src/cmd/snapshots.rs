use comfy_table::Cell;

use snapfs_core::repo::Repository;
use snapfs_core::snapshot::SnapshotFilter;

use crate::dispatch::{App, CmdResult};
use crate::format::format_time;
use crate::table::CliTableTheme;

/// Build a filter from `--host`, `--tag` and `--path`. Each `--tag` value
/// is a comma-separated group.
pub(crate) fn cli_filter(hosts: &[String], tags: &[String], paths: &[String]) -> SnapshotFilter {
    SnapshotFilter {
        hosts: hosts.to_vec(),
        tags: tags
            .iter()
            .map(|group| {
                group
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect(),
        paths: paths.to_vec(),
    }
}

pub(crate) fn run_snapshots(
    app: &App,
    hosts: &[String],
    tags: &[String],
    paths: &[String],
    last: Option<usize>,
) -> CmdResult {
    let mut snapshots = app
        .repo
        .list_snapshots_filtered(&app.config.mount.filter())?;

    let extra = cli_filter(hosts, tags, paths);
    if !extra.is_empty() {
        snapshots.retain(|s| extra.matches(s));
    }

    if let Some(n) = last {
        let len = snapshots.len();
        if n < len {
            snapshots.drain(..len - n);
        }
    }
    if snapshots.is_empty() {
        println!("No snapshots found.");
        return Ok(());
    }

    let theme = CliTableTheme::detect();
    let mut table = theme.new_data_table(&["ID", "Time", "Host", "Tags", "Paths"]);
    for snapshot in &snapshots {
        let tags_col = if snapshot.tags.is_empty() {
            "-".to_string()
        } else {
            snapshot.tags.join(",")
        };
        table.add_row(vec![
            Cell::new(snapshot.short_id()),
            Cell::new(format_time(&snapshot.time)),
            Cell::new(&snapshot.hostname),
            Cell::new(tags_col),
            Cell::new(snapshot.paths.join("\n")),
        ]);
    }
    println!("{table}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_flags_become_groups() {
        let filter = cli_filter(
            &["web".into()],
            &["daily,prod".into(), "weekly".into(), " , ".into()],
            &[],
        );
        assert_eq!(filter.hosts, vec!["web".to_string()]);
        assert_eq!(
            filter.tags,
            vec![
                vec!["daily".to_string(), "prod".to_string()],
                vec!["weekly".to_string()],
            ]
        );
        assert!(filter.paths.is_empty());
    }

    #[test]
    fn no_flags_means_no_filter() {
        assert!(cli_filter(&[], &[], &[]).is_empty());
    }
}
