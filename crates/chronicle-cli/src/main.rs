use std::path::PathBuf;

use chronicle_cli::commands::{
    ClassifyCommand, DebugCommand, IngestCommand, PurgeCommand, RetrieveCommand, StatsCommand,
};
use chronicle_cli::context::Context;
use chronicle_cli::error::CliResult;
use chronicle_cli::output::OutputFormat;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chronicle")]
#[command(about = "Chronicle - conversation memory store tool")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Classify a summary file without storing it")]
    Classify(ClassifyCommand),

    #[clap(about = "Classify a summary and reconcile it into a conversation's store")]
    Ingest(IngestCommand),

    #[clap(about = "Run a retrieval pass and print the injected text")]
    Retrieve(RetrieveCommand),

    #[clap(about = "Trace every retrieval stage without side effects")]
    Debug(DebugCommand),

    #[clap(about = "Show chunk counts for a conversation")]
    Stats(StatsCommand),

    #[clap(about = "Delete every chunk of a conversation")]
    Purge(PurgeCommand),
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chronicle_memory=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    // classify never touches the store
    if let Command::Classify(cmd) = &cli.command {
        return cmd.execute(format);
    }

    let ctx = Context::load(cli.config.as_deref(), cli.data_dir)?;
    match &cli.command {
        Command::Ingest(cmd) => cmd.execute(&ctx, format).await,
        Command::Retrieve(cmd) => cmd.execute(&ctx, format).await,
        Command::Debug(cmd) => cmd.execute(&ctx, format).await,
        Command::Stats(cmd) => cmd.execute(&ctx, format).await,
        Command::Purge(cmd) => cmd.execute(&ctx, format).await,
        Command::Classify(cmd) => cmd.execute(format),
    }
}
