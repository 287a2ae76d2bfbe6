use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod sink;

#[derive(Parser)]
#[command(
    name = "dcsim",
    about = "Data-center cluster simulator with demand response",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit log lines as JSON objects.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation and write monitoring rows as JSON lines.
    Run {
        /// Simulator configuration (TOML). Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Workload file: a JSON array of jobs.
        #[arg(short, long)]
        workload: PathBuf,
        /// DR request file: a JSON array of requests.
        #[arg(short, long)]
        requests: Option<PathBuf>,
        /// Monitoring output, one JSON object per line.
        #[arg(short, long, default_value = "monitoring.jsonl")]
        output: PathBuf,
        /// Override `cluster.length`.
        #[arg(long)]
        length: Option<i64>,
    },
    /// Load and validate the input files without simulating.
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        workload: Option<PathBuf>,
        #[arg(short, long)]
        requests: Option<PathBuf>,
    },
    /// Write a configuration file holding every default.
    Init {
        #[arg(default_value = "dcsim.toml")]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Commands::Run {
            config,
            workload,
            requests,
            output,
            length,
        } => commands::run::run(&commands::run::RunArgs {
            config,
            workload,
            requests,
            output,
            length,
        }),
        Commands::Validate {
            config,
            workload,
            requests,
        } => commands::validate::validate(config.as_deref(), workload.as_deref(), requests.as_deref()),
        Commands::Init { path, force } => commands::init::init(&path, force),
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new("dcsim=info")?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
