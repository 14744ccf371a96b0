mod cli;
mod cmd;
mod dispatch;
mod format;
mod progress;
mod signal;
mod table;

use clap::Parser;

use cli::Cli;
use dispatch::{dispatch_command, open_app};
use progress::ProgressAwareStderr;

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(ProgressAwareStderr)
        .init();

    let app = match open_app(&cli) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = dispatch_command(&cli.command, &app) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
