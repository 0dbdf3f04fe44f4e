//! Sentinel: Bluetooth skimmer detection for Linux hosts.
//!
//! Thin binary over the `skimmer_sentinel` library: parses the command
//! line, wires the host adapter, scan backends, sinks and location
//! providers together, and hands control to a recon scan or a wardriving
//! session. Ctrl+C stops a session after the scan in flight.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use skimmer_sentinel::adapter::{AdapterManager, AdapterProbe};
use skimmer_sentinel::comm::{DetectionSink, NdjsonStream, TextEvidenceLog};
use skimmer_sentinel::config::{Settings, DEFAULT_ADAPTER};
use skimmer_sentinel::export::JsonFileStore;
use skimmer_sentinel::filter::Classifier;
use skimmer_sentinel::gps::{FixedLocation, GpsdClient, LocationProvider, GPSD_DEFAULT_ADDR};
use skimmer_sentinel::host::SystemRunner;
use skimmer_sentinel::recon::{recon, DEFAULT_RECON_SECS};
use skimmer_sentinel::scanner::hcitool::HcitoolBackend;
use skimmer_sentinel::scanner::Scanner;
use skimmer_sentinel::wardrive::{ExitReason, WardriveConfig, WardrivingController, DEFAULT_INTERVAL_SECS};

/// gpsd gets this long to answer each position query.
const GPSD_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "sentinel", version)]
#[command(about = "Detect Bluetooth card skimmers at payment terminals")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// HCI interface to scan with
    #[arg(long, global = true, default_value = DEFAULT_ADAPTER)]
    adapter: String,
    /// Run adapter commands without sudo
    #[arg(long, global = true)]
    no_sudo: bool,
    /// JSON rule file overriding the built-in signatures
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
    #[arg(long, global = true, default_value = "logs")]
    logs_dir: PathBuf,
    #[arg(long, global = true, default_value = "exports")]
    exports_dir: PathBuf,
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,
}

impl GlobalArgs {
    fn settings(self) -> Settings {
        Settings {
            adapter: self.adapter,
            use_sudo: !self.no_sudo,
            logs_dir: self.logs_dir,
            exports_dir: self.exports_dir,
            data_dir: self.data_dir,
            rules_file: self.rules,
            ..Settings::default()
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Bring the adapter up and report whether it is ready
    Check,
    /// One-shot scan of the current location
    Recon(ReconArgs),
    /// Continuous scanning while moving
    Wardrive(WardriveArgs),
}

#[derive(Debug, Args)]
struct ReconArgs {
    /// Scan length in seconds
    #[arg(long, default_value_t = DEFAULT_RECON_SECS)]
    duration: u64,
    /// Label for the location being scanned
    #[arg(long, default_value = "UNKNOWN")]
    station: String,
}

#[derive(Debug, Args)]
struct WardriveArgs {
    /// Seconds per iteration (scan window is two seconds shorter)
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,
    /// Tag detections with a position
    #[arg(long, value_enum)]
    gps: Option<GpsMode>,
    #[arg(long, default_value = GPSD_DEFAULT_ADDR)]
    gpsd_addr: String,
    /// Stop after this many scans
    #[arg(long)]
    scans: Option<u64>,
    /// Stream detections to stdout as NDJSON
    #[arg(long)]
    ndjson: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GpsMode {
    /// Fixed simulated position
    Simulate,
    /// Live position from a gpsd daemon
    Gpsd,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = cli.global.settings();
    settings
        .ensure_dirs()
        .context("creating output directories")?;

    let adapter = AdapterManager::new(SystemRunner::default(), settings.adapter.clone(), settings.use_sudo);
    match cli.command {
        Commands::Check => {
            if !adapter.ready().await {
                bail!("adapter {} is not ready", settings.adapter);
            }
            log::info!("Adapter {} ready", settings.adapter);
            Ok(())
        }
        Commands::Recon(args) => run_recon(&settings, adapter, args).await,
        Commands::Wardrive(args) => run_wardrive(&settings, adapter, args).await,
    }
}

async fn build_scanner(settings: &Settings, adapter: AdapterManager<SystemRunner>) -> Result<Scanner> {
    if !adapter.ready().await {
        bail!("adapter {} is not ready", settings.adapter);
    }
    // Inquiry runs outside the terminal's process group so Ctrl+C lets it finish.
    let fallback = HcitoolBackend::new(SystemRunner::detached(), settings.adapter.clone(), settings.use_sudo);
    Ok(Scanner::detect(Box::new(adapter), Box::new(fallback), &settings.adapter).await)
}

async fn run_recon(settings: &Settings, adapter: AdapterManager<SystemRunner>, args: ReconArgs) -> Result<()> {
    let classifier = Classifier::new(settings.rule_set()?);
    let scanner = build_scanner(settings, adapter).await?;
    let mut evidence: Vec<Box<dyn DetectionSink>> = vec![Box::new(TextEvidenceLog::in_dir(&settings.logs_dir))];

    let report = recon(
        &args.station,
        &scanner,
        &classifier,
        &mut evidence,
        Duration::from_secs(args.duration),
    )
    .await;

    if let Some(rec) = report.recommendation {
        for (i, step) in rec.steps().iter().enumerate() {
            log::warn!("  {}. {step}", i + 1);
        }
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn locator(args: &WardriveArgs) -> Option<Box<dyn LocationProvider>> {
    match args.gps? {
        GpsMode::Simulate => Some(Box::new(FixedLocation::default())),
        GpsMode::Gpsd => {
            let mut gpsd = GpsdClient::new(args.gpsd_addr.clone(), GPSD_TIMEOUT);
            match gpsd.locate().await {
                Ok(_) => Some(Box::new(gpsd)),
                Err(e) => {
                    log::warn!("gpsd at {} unavailable ({e}), using simulated location", args.gpsd_addr);
                    Some(Box::new(FixedLocation::default()))
                }
            }
        }
    }
}

async fn run_wardrive(settings: &Settings, adapter: AdapterManager<SystemRunner>, args: WardriveArgs) -> Result<()> {
    let config = WardriveConfig::new(args.interval)?
        .with_max_scans(args.scans)
        .with_top_n(settings.top_n);
    let classifier = Classifier::new(settings.rule_set()?);
    let scanner = build_scanner(settings, adapter).await?;
    let store = JsonFileStore::new(&settings.logs_dir, &settings.exports_dir);

    let mut controller = WardrivingController::new(
        Arc::new(scanner),
        classifier,
        Box::new(store.clone()),
        Box::new(store),
        config,
    )
    .with_evidence_sink(Box::new(TextEvidenceLog::in_dir(&settings.logs_dir)));
    if args.ndjson {
        controller = controller.with_evidence_sink(Box::new(NdjsonStream::new(io::stdout())));
    }

    let cancel = controller.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Stopping after the current scan (Ctrl+C again to quit now)");
            cancel.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, exiting without a session report");
            std::process::exit(130);
        }
    });

    let status = args.ndjson.then(|| {
        let mut live = controller.stats_handle();
        tokio::spawn(async move {
            let mut out = NdjsonStream::new(io::stdout());
            while let Some(stats) = live.changed().await {
                if let Err(e) = out.status(
                    stats.scanning,
                    stats.total_scans,
                    stats.total_detections,
                    stats.unique_devices,
                ) {
                    log::warn!("Status line not written: {e}");
                }
            }
        })
    });

    let mut location = locator(&args).await;
    let outcome = match location.as_mut() {
        Some(provider) => controller.start(Some(&mut **provider)).await?,
        None => controller.start(None).await?,
    };

    // Closing the stats channel lets the status task drain and finish.
    drop(controller);
    if let Some(task) = status {
        task.await.context("status stream")?;
    }

    match outcome.exit {
        ExitReason::Fault(e) => Err(e).context("wardrive session ended early"),
        ExitReason::Cancelled | ExitReason::Completed => Ok(()),
    }
}
