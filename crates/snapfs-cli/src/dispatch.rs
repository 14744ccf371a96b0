use std::path::PathBuf;
use std::sync::Arc;

use snapfs_core::config::{self, SnapfsConfig};
use snapfs_core::repo::LocalRepository;
use snapfs_core::vfs::Root;
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::cmd;

pub(crate) type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Everything a command needs: the effective config and the opened
/// repository.
pub(crate) struct App {
    pub config: SnapfsConfig,
    pub repo: Arc<LocalRepository>,
}

impl App {
    /// Build a fresh virtual tree over the repository.
    pub(crate) fn mount(&self) -> Result<Arc<Root>, Box<dyn std::error::Error>> {
        Ok(Root::new(self.repo.clone(), self.config.mount.clone())?)
    }
}

/// Load the config (when one is found) and open the repository, with
/// `--repo` taking precedence over the configured path.
pub(crate) fn open_app(cli: &Cli) -> Result<App, Box<dyn std::error::Error>> {
    let mut config = match config::resolve_config_path(cli.config.as_deref()) {
        Some(source) => {
            info!("Using config: {source}");
            config::load_config(source.path())?
        }
        None => {
            debug!("no configuration file found, using defaults");
            SnapfsConfig::default()
        }
    };

    if let Some(repo) = &cli.repo {
        config.repository = Some(PathBuf::from(repo));
    }
    let Some(path) = config.repository.clone() else {
        let searched: Vec<String> = config::default_config_search_paths()
            .into_iter()
            .map(|(path, level)| format!("{} ({level})", path.display()))
            .collect();
        return Err(format!(
            "no repository given: pass --repo or set `repository` in a config file (searched: {})",
            searched.join(", ")
        )
        .into());
    };

    let repo = LocalRepository::open(path.clone())?;
    debug!(path = %path.display(), "opened repository");
    Ok(App {
        config,
        repo: Arc::new(repo),
    })
}

pub(crate) fn dispatch_command(command: &Commands, app: &App) -> CmdResult {
    debug!(command = command.name(), "running command");
    match command {
        Commands::Snapshots {
            host,
            tag,
            path,
            last,
        } => cmd::snapshots::run_snapshots(app, host, tag, path, *last),
        Commands::Ls { path, long } => cmd::ls::run_ls(app, path, *long),
        Commands::Cat { path } => cmd::cat::run_cat(app, path),
        Commands::Walk {
            path,
            read,
            list,
            interval,
        } => cmd::walk::run_walk(app, path, *read, *list, interval.as_deref()),
        Commands::Serve { address } => cmd::serve::run_serve(app, address),
    }
}
