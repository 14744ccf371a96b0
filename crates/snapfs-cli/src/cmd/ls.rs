use chrono::{DateTime, Utc};
use comfy_table::Cell;

use snapfs_core::vfs::{Attr, FileType, Node};

use crate::dispatch::{App, CmdResult};
use crate::format::{format_mode, format_time};
use crate::table::{number_cell, CliTableTheme};

pub(crate) fn run_ls(app: &App, path: &str, long: bool) -> CmdResult {
    let root = app.mount()?.node();
    let node = root.resolve(path)?;

    let mut entries = Vec::new();
    if node.is_dir() {
        for entry in node.read_dir_all()? {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let child = node.lookup(&entry.name)?;
            entries.push((entry.name, child));
        }
    } else {
        let name = path.rsplit('/').find(|c| !c.is_empty()).unwrap_or(path);
        entries.push((name.to_string(), node));
    }

    if !long {
        for (name, child) in &entries {
            println!("{}", display_name(name, child)?);
        }
        return Ok(());
    }

    let theme = CliTableTheme::detect();
    let mut table = theme.new_data_table(&["Mode", "Size", "Modified", "Name"]);
    for (name, child) in &entries {
        let attr = child.attr()?;
        let mtime: DateTime<Utc> = attr.mtime.into();
        table.add_row(vec![
            Cell::new(mode_string(&attr)),
            number_cell(attr.size),
            Cell::new(format_time(&mtime)),
            Cell::new(display_name(name, child)?),
        ]);
    }
    println!("{table}");

    Ok(())
}

fn mode_string(attr: &Attr) -> String {
    let kind = match attr.kind {
        FileType::Directory => 'd',
        FileType::RegularFile => '-',
        FileType::Symlink => 'l',
    };
    format_mode(kind, attr.perm)
}

fn display_name(name: &str, node: &Node) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match node {
        Node::Symlink(_) => format!("{name} -> {}", node.readlink()?),
        n if n.is_dir() => format!("{name}/"),
        _ => name.to_string(),
    })
}
