use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "snapfs",
    version,
    about = "Browse backup snapshots as a read-only filesystem",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $SNAPFS_CONFIG              (environment variable)
  3. ./snapfs.yaml               (project)
  4. User config dir + /snapfs/config.yaml (e.g. ~/.config)

Without a configuration file, --repo is required and defaults apply.

While `walk` runs, SIGUSR1 (and SIGINFO / Ctrl+T on BSD and macOS) prints
a status line."
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides SNAPFS_CONFIG and default search)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Repository directory (overrides `repository` from the config file)
    #[arg(short = 'r', long = "repo", global = true)]
    pub repo: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List snapshots visible under the configured filters
    Snapshots {
        /// Only show snapshots taken on this host (repeatable)
        #[arg(long)]
        host: Vec<String>,

        /// Only show snapshots carrying all of these comma-separated tags (repeatable)
        #[arg(long)]
        tag: Vec<String>,

        /// Only show snapshots that include this path (repeatable)
        #[arg(long)]
        path: Vec<String>,

        /// Show only the N most recent snapshots
        #[arg(long)]
        last: Option<usize>,
    },

    /// List a directory of the virtual tree
    Ls {
        /// Path inside the tree, e.g. snapshots/latest or ids/1a2b3c4d/etc
        #[arg(default_value = "/")]
        path: String,

        /// Show mode, size and modification time
        #[arg(short, long)]
        long: bool,
    },

    /// Write a file from the virtual tree to stdout
    Cat {
        /// Path of the file inside the tree
        path: String,
    },

    /// Traverse part of the tree, reporting progress
    Walk {
        /// Directory to start from
        #[arg(default_value = "snapshots")]
        path: String,

        /// Read every file's content instead of only resolving sizes
        #[arg(long)]
        read: bool,

        /// Print each visited path
        #[arg(long)]
        list: bool,

        /// Progress update interval, e.g. 500ms or 2s (0 disables periodic updates)
        #[arg(long)]
        interval: Option<String>,
    },

    /// Serve the tree over WebDAV (read-only)
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        address: String,
    },
}

impl Commands {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Commands::Snapshots { .. } => "snapshots",
            Commands::Ls { .. } => "ls",
            Commands::Cat { .. } => "cat",
            Commands::Walk { .. } => "walk",
            Commands::Serve { .. } => "serve",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_repo_after_subcommand() {
        let cli = Cli::try_parse_from(["snapfs", "ls", "-l", "snapshots", "--repo", "/srv/r"]).unwrap();
        assert_eq!(cli.repo.as_deref(), Some("/srv/r"));
        match cli.command {
            Commands::Ls { path, long } => {
                assert_eq!(path, "snapshots");
                assert!(long);
            }
            _ => panic!("expected ls"),
        }
    }

    #[test]
    fn walk_defaults() {
        let cli = Cli::try_parse_from(["snapfs", "walk"]).unwrap();
        assert_eq!(cli.command.name(), "walk");
        match cli.command {
            Commands::Walk { path, read, list, interval } => {
                assert_eq!(path, "snapshots");
                assert!(!read && !list);
                assert!(interval.is_none());
            }
            _ => panic!("expected walk"),
        }
    }
}
