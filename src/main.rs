mod api;
mod cli;
mod commands;
mod config;
mod credentials;
mod error;
mod format;
mod http;
mod logs;
mod models;
mod output;
mod session;
mod views;

use clap::{Parser, Subcommand};
use commands::{BackupResource, ExportFormat, ListResource, ResourceKind};
use error::ClientError;
use logs::LogKind;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "duplicati",
    version,
    about = "Manage a Duplicati server from the command line",
    arg_required_else_help = true
)]
pub struct Args {
    #[arg(
        long,
        global = true,
        env = "DUPLICATI_CLIENT_CONFIG",
        help = "Use a non-standard config file"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List all resources of a given type
    List {
        #[arg(value_enum)]
        resource: ListResource,
    },
    /// Display brief information on one or more resources
    Get {
        #[arg(value_enum)]
        kind: ResourceKind,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Display detailed information on a resource
    Describe {
        #[arg(value_enum)]
        kind: ResourceKind,
        id: u64,
    },
    /// Run a backup job
    Run { id: u64 },
    /// Abort a running task
    Abort { id: u64 },
    /// Delete a backup
    Delete {
        #[arg(value_enum)]
        kind: BackupResource,
        id: u64,
        #[arg(long, help = "Delete the local database too")]
        delete_db: bool,
        #[arg(long, help = "Confirm the deletion without prompting")]
        confirm: bool,
    },
    /// Export a backup configuration to a file
    Export {
        #[arg(value_enum)]
        kind: BackupResource,
        id: u64,
        #[arg(long, value_enum, ignore_case = true)]
        output: Option<ExportFormat>,
        #[arg(long, help = "Output file or directory")]
        output_path: Option<String>,
    },
    /// Import a backup configuration from a file
    Import {
        #[arg(value_enum)]
        kind: BackupResource,
        file: PathBuf,
        #[arg(long, help = "Update the existing backup with this id")]
        id: Option<String>,
        #[arg(long, conflicts_with = "strip_metadata")]
        import_metadata: bool,
        #[arg(long)]
        strip_metadata: bool,
    },
    /// Show backup, stored or live logs
    Logs {
        #[arg(value_enum)]
        kind: LogKind,
        #[arg(long, help = "Backup id for backup logs")]
        id: Option<u64>,
        #[arg(long, help = "Show the remote log of a backup")]
        remote: bool,
        #[arg(long, help = "Refresh every ten seconds")]
        follow: bool,
        #[arg(long, help = "Number of entries to fetch [default: 5]")]
        lines: Option<usize>,
        #[arg(long, help = "Show every line of long messages")]
        all: bool,
    },
    /// Log into a Duplicati server
    Login {
        /// Server url, e.g. https://nas:8200
        url: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// End the current session
    Logout,
    /// Show the client and session status
    Status,
    /// Print the config, or reset it with --overwrite
    Config {
        #[arg(long)]
        overwrite: bool,
    },
    /// Toggle verbose output
    Verbose,
    /// Set, disable or show the parameters file
    Params {
        file: Option<PathBuf>,
        #[arg(long)]
        disable: bool,
        #[arg(long)]
        show: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .init();
}

/// Report `err` on stderr and exit with status 2
fn exit_with(err: anyhow::Error, verbose: bool) -> ! {
    let status = err.downcast_ref::<ClientError>().and_then(ClientError::status);
    eprintln!("{}", output::render(&format!("{:#}", err), status, verbose));
    std::process::exit(2);
}

fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut ctx = match cli::Context::load(&args) {
        Ok(ctx) => ctx,
        Err(err) => exit_with(err, false),
    };
    let verbose = ctx.console.verbose();
    init_tracing(verbose);

    if let Err(err) = cli::dispatch(&mut ctx, args.command) {
        exit_with(err, verbose);
    }
}
