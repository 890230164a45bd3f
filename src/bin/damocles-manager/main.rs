use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use damocles_manager::{logging, set_panic_hook, start_daemon, version::VERSION};

#[derive(Parser)]
#[command(name = "damocles-manager", version = VERSION.as_str(), arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the manager daemon
    Daemon {
        /// Path to the config file
        #[arg(short = 'c', long, value_name = "FILE")]
        config: PathBuf,

        /// Home directory, relative paths in the config are based on it.
        /// Defaults to the directory of the config file
        #[arg(long, env = "DAMOCLES_MANAGER_HOME", value_name = "DIR")]
        home: Option<PathBuf>,
    },
}

pub fn main() -> Result<()> {
    logging::init()?;
    set_panic_hook(true);

    match Cli::parse().command {
        Commands::Daemon { config, home } => {
            let home = match home {
                Some(h) => h,
                None => config
                    .canonicalize()
                    .with_context(|| format!("canonicalize config path {}", config.display()))?
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_default(),
            };

            start_daemon(home, config)
        }
    }
}
