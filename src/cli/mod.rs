pub mod daemon_path;
pub mod log;
pub mod output;
pub mod process;
pub mod range;
pub mod topics;

use std::{env, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use daemon_path::to_daemon_path;
use self::log::{process_log_command, LogCommand};
use process::{kill_previous_servers, restart_server};
use topics::{process_topics_command, TopicsCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{
        config::{TrackerArgs, TrackerConfig},
        start_daemon,
    },
    utils::{
        dir::resolve_application_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "tasktrail", version, long_about = None)]
#[command(about = "Tracks what you work on from periodic screenshots", long_about = None)]
pub(crate) struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts the tracker in the background, replacing a running one")]
    Init {
        #[command(flatten)]
        tracker: TrackerArgs,
    },
    #[command(
        about = "Run the tracker directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[command(flatten)]
        tracker: TrackerArgs,
    },
    #[command(about = "Stop currently running trackers.")]
    Stop {},
    #[command(about = "Print the latest activity samples")]
    Log {
        #[command(flatten)]
        command: LogCommand,
    },
    #[command(about = "Show approximate time spent per topic")]
    Topics {
        #[command(flatten)]
        command: TopicsCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    // A missing .env file is fine, the environment itself may carry the settings.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let app_dir = resolve_application_path(args.dir)?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init { tracker } => {
            // Fails here instead of inside the detached process.
            TrackerConfig::try_from(tracker.clone())?;
            restart_server(&tracker_executables()?, &app_dir, &tracker)
        }
        Commands::Stop {} => {
            let killed = kill_previous_servers(&tracker_executables()?)?;
            println!("Stopped {killed} tracker(s)");
            Ok(())
        }
        Commands::Serve { tracker } => start_daemon(app_dir, TrackerConfig::try_from(tracker)?).await,
        Commands::Log { command } => process_log_command(&app_dir, command).await,
        Commands::Topics { command } => process_topics_command(&app_dir, command).await,
    }
}

/// Binaries that may be running a tracker: this one and the standalone daemon.
fn tracker_executables() -> Result<Vec<PathBuf>> {
    let current = env::current_exe()?;
    let daemon = to_daemon_path(&current);
    Ok(vec![current, daemon])
}
