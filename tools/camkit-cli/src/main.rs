//! camkit CLI: camera capture from the command line.
//!
//! Usage:
//!   camkit check                       Check camera access and devices
//!   camkit devices [--json]            List capture devices
//!   camkit photo [--save]              Take one photo
//!   camkit record [--name N] [--seconds S] [--save]
//!   camkit exists <NAME>               Check whether a recording exists
//!   camkit delete <NAME>               Delete a recording

use camkit_common::config::{AppConfig, BackendKind};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "camkit",
    about = "Camera capture sessions: photos, recordings, and gestures",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the simulated camera backend
    #[arg(long, global = true)]
    simulated: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check camera authorization and available devices
    Check,

    /// List capture devices
    Devices {
        /// Print devices as JSON
        #[arg(long)]
        json: bool,
    },

    /// Take a single photo
    Photo {
        /// Copy the photo into the media library
        #[arg(long)]
        save: bool,
    },

    /// Record a video clip
    Record {
        /// Recording name (stored as <media_dir>/<name>.mov)
        #[arg(short, long, default_value = "movie")]
        name: String,

        /// Stop after this many seconds (0 = until Ctrl+C)
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Copy the finished recording into the media library
        #[arg(long)]
        save: bool,
    },

    /// Check whether a recording exists
    Exists {
        /// Recording name
        name: String,
    },

    /// Delete a recording
    Delete {
        /// Recording name
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    camkit_common::logging::init_logging(&logging);

    let backend = if cli.simulated {
        BackendKind::Simulated
    } else {
        config.capture.backend
    };

    match cli.command {
        Commands::Check => commands::check::run(backend).await,
        Commands::Devices { json } => commands::devices::run(backend, json).await,
        Commands::Photo { save } => commands::photo::run(&config, backend, save).await,
        Commands::Record {
            name,
            seconds,
            save,
        } => commands::record::run(&config, backend, name, seconds, save).await,
        Commands::Exists { name } => commands::storage::exists(&config, &name),
        Commands::Delete { name } => commands::storage::delete(&config, &name),
    }
}
