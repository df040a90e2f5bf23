use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber;

#[derive(Debug, Clone)]
pub enum Command {
    Download {
        url: String,
        discard_partial: bool,
    },
    Install {
        archive: String,
        folder_name: String,
        preview: bool,
    },
    Swap {
        archive: String,
        preview: bool,
    },
    Resolve {
        version: String,
        preview: bool,
    },
    Delete {
        version: String,
        preview: bool,
    },
    Status {
        version: String,
        preview: bool,
    },
}

pub struct Args {
    pub command: Command,
    pub config_path: Option<PathBuf>,
    pub log_level: Level,
}

#[derive(Debug, Parser)]
#[command(
    name = "launchprep",
    version,
    author = "Nick Guletskii",
    about = "Download, unpack and prepare packaged game builds"
)]
struct Cli {
    #[arg(
        short = 'v',
        long = "verbose",
        help = "Sets the level of verbosity",
        action = ArgAction::Count,
        global = true
    )]
    verbose: u8,

    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "Sets a custom config file (default: <data dir>/LaunchPrep/config.*)",
        global = true
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Download an archive into the installers directory, resuming a partial file
    Download {
        #[arg(value_name = "URL")]
        url: String,

        #[arg(
            long = "discard-partial",
            help = "Cancel and delete the partial file on Ctrl-C instead of pausing"
        )]
        discard_partial: bool,
    },

    /// Unpack an archive into a version directory and prepare it
    Install {
        #[arg(
            value_name = "ARCHIVE",
            help = "Archive path, or a name in the installers directory"
        )]
        archive: String,

        #[arg(
            short = 'n',
            long = "name",
            value_name = "DIR",
            help = "Name of the version directory to create"
        )]
        name: String,

        #[arg(long = "preview", help = "Target the preview package")]
        preview: bool,
    },

    /// Replace the registered platform package with an archive
    Swap {
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        #[arg(long = "preview", help = "Target the preview package")]
        preview: bool,
    },

    /// Print the name of the downloaded archive for a version
    Resolve {
        #[arg(value_name = "VERSION")]
        version: String,

        #[arg(long = "preview", help = "Target the preview package")]
        preview: bool,
    },

    /// Delete the downloaded archive for a version
    Delete {
        #[arg(value_name = "VERSION")]
        version: String,

        #[arg(long = "preview", help = "Target the preview package")]
        preview: bool,
    },

    /// Print whether a version has been downloaded, as JSON
    Status {
        #[arg(value_name = "VERSION")]
        version: String,

        #[arg(long = "preview", help = "Target the preview package")]
        preview: bool,
    },
}

pub fn parse_args() -> Args {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    let command = match cli.command {
        CliCommand::Download {
            url,
            discard_partial,
        } => Command::Download {
            url,
            discard_partial,
        },
        CliCommand::Install {
            archive,
            name,
            preview,
        } => Command::Install {
            archive,
            folder_name: name,
            preview,
        },
        CliCommand::Swap { archive, preview } => Command::Swap { archive, preview },
        CliCommand::Resolve { version, preview } => Command::Resolve { version, preview },
        CliCommand::Delete { version, preview } => Command::Delete { version, preview },
        CliCommand::Status { version, preview } => Command::Status { version, preview },
    };

    Args {
        command,
        config_path: cli.config,
        log_level,
    }
}
