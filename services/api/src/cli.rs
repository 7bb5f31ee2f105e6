use crate::infra::build_coordinator;
use crate::server;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use listing_ingest::config::AppConfig;
use listing_ingest::error::AppError;
use listing_ingest::telemetry;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "Listing Ingest",
    about = "Load real-estate listing exports into the warehouse and the search index",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Ingest one listing file and print the run report as JSON
    Ingest(IngestArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct IngestArgs {
    /// Delimited listing export with a header row
    #[arg(long)]
    pub(crate) file: PathBuf,
    /// Write to in-memory sinks only, leaving the configured warehouse and index untouched
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Reference date for build-year checks (YYYY-MM-DD); defaults to today
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Ingest(args) => run_ingest(args).await,
    }
}

async fn run_ingest(args: IngestArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let coordinator = build_coordinator(&config, args.dry_run)?;
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    info!(file = %args.file.display(), dry_run = args.dry_run, "starting listing ingest");

    let report = coordinator.run_path(&args.file, today).await?;
    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    println!("{rendered}");
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
