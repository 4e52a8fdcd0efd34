//! crash-refiner - command-line front end
//!
//! Refines one crash data file against one boundary file, streaming the run
//! log to stdout and printing the refinement report as JSON when done.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cdr_common::config::{ensure_directory, load_default_toml_config, resolve_output_root};
use cdr_refine::config::LabelOrder;
use cdr_refine::orchestrator::{LogLevel, Orchestrator, RunRequest, RunStatus};
use cdr_refine::source::{guess_lat_lon, is_boundary_file, is_data_file, read_headers};
use cdr_refine::RefinementConfig;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LabelOrderArg {
    Source,
    WestToEast,
    SouthToNorth,
}

impl From<LabelOrderArg> for LabelOrder {
    fn from(arg: LabelOrderArg) -> Self {
        match arg {
            LabelOrderArg::Source => LabelOrder::Source,
            LabelOrderArg::WestToEast => LabelOrder::WestToEast,
            LabelOrderArg::SouthToNorth => LabelOrder::SouthToNorth,
        }
    }
}

/// Command-line arguments for crash-refiner
#[derive(Parser, Debug)]
#[command(name = "crash-refiner")]
#[command(about = "Filter crash records to a boundary polygon and write refined outputs")]
#[command(version)]
struct Args {
    /// Crash data file (.csv, .xlsx, .xlsm, .xls)
    #[arg(short, long)]
    input: PathBuf,

    /// Boundary polygon (.kmz or .kml)
    #[arg(short, long)]
    boundary: PathBuf,

    /// Directory receiving one sub-directory per run
    #[arg(short, long, env = "CDR_OUTPUT_ROOT")]
    output_root: Option<PathBuf>,

    /// Refinement configuration (TOML or JSON)
    #[arg(short, long, env = "CDR_REFINEMENT_CONFIG")]
    config: Option<PathBuf>,

    /// Latitude column; guessed from the headers when omitted
    #[arg(long)]
    lat_column: Option<String>,

    /// Longitude column; guessed from the headers when omitted
    #[arg(long)]
    lon_column: Option<String>,

    /// Marker numbering order in the KMZ output
    #[arg(long, value_enum)]
    label_order: Option<LabelOrderArg>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let toml_config = load_default_toml_config().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if !is_data_file(&args.input) {
        bail!("Unsupported data file: {}", args.input.display());
    }
    if !is_boundary_file(&args.boundary) {
        bail!("Unsupported boundary file: {}", args.boundary.display());
    }

    let config_path = args.config.clone().or(toml_config.refinement_config.clone());
    let mut config = match &config_path {
        Some(path) => RefinementConfig::from_path(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => RefinementConfig::default(),
    };
    if let Some(order) = args.label_order {
        config.label_order = order.into();
    }
    let config = resolve_coordinates(config, &args, config_path.is_some())?;

    let output_root = resolve_output_root(args.output_root.as_deref(), &toml_config);
    ensure_directory(&output_root).context("Failed to prepare output root")?;
    info!("Output root: {}", output_root.display());

    let request = RunRequest::from_files(&args.input, &args.boundary, config)
        .context("Failed to open input files")?;

    let orchestrator = Arc::new(Orchestrator::new(output_root));
    let run_id = orchestrator.submit(request)?;

    let status = follow(&orchestrator, run_id).await?;

    let summary = orchestrator.get_result(run_id)?;
    if let Some(report) = &summary.report {
        println!("{}", serde_json::to_string_pretty(report)?);
    }

    match status {
        RunStatus::Success => {
            let dir = orchestrator.output_dir(run_id)?;
            for file in &summary.manifest.files {
                println!("{}", dir.join(&file.name).display());
            }
            Ok(())
        }
        RunStatus::Cancelled => bail!("Run cancelled"),
        _ => bail!(
            "Run failed: {}",
            summary.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Fill in coordinate columns the user did not name
fn resolve_coordinates(
    config: RefinementConfig,
    args: &Args,
    from_file: bool,
) -> Result<RefinementConfig> {
    let mut latitude = args.lat_column.clone();
    let mut longitude = args.lon_column.clone();

    if !from_file && (latitude.is_none() || longitude.is_none()) {
        let headers = read_headers(&args.input)
            .with_context(|| format!("Failed to read headers of {}", args.input.display()))?;
        let guess = guess_lat_lon(&headers);
        latitude = latitude.or(guess.latitude);
        longitude = longitude.or(guess.longitude);
        if latitude.is_none() || longitude.is_none() {
            warn!("Could not guess coordinate columns; falling back to configured names");
        }
    }

    let latitude = latitude.unwrap_or_else(|| config.latitude_column.clone());
    let longitude = longitude.unwrap_or_else(|| config.longitude_column.clone());
    info!("Coordinate columns: {} / {}", latitude, longitude);
    Ok(config.with_coordinates(&latitude, &longitude))
}

/// Stream the run log until the run ends; Ctrl+C cancels it
async fn follow(orchestrator: &Orchestrator, run_id: uuid::Uuid) -> Result<RunStatus> {
    let mut since = 0;
    let mut interrupted = false;
    loop {
        let page = orchestrator.poll_log(run_id, since)?;
        for entry in &page.entries {
            match entry.level {
                LogLevel::Info => println!("{}", entry.text),
                LogLevel::Warn | LogLevel::Error => eprintln!("{}", entry.text),
            }
        }
        since = page.last_seq;
        if page.status.is_terminal() {
            return Ok(page.status);
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("Failed to listen for Ctrl+C")?;
                interrupted = true;
                info!("Received Ctrl+C, cancelling run");
                // A run that finished meanwhile is reported by the next poll
                let _ = orchestrator.cancel(run_id);
            }
        }
    }
}
