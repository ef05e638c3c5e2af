mod catalog;
mod helpers;
mod release;
mod resolver;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use helpers::{extract::ScriptExtractor, http_client};
use resolver::{DEFAULT_ARCH, DEFAULT_FLAVOR, ResolutionReport, ResolveRequest, Resolver};
use settings::Settings;

/// Exit status after Ctrl-C, as a shell would report it.
const INTERRUPTED: u8 = 130;

/// Download (and optionally extract) the debug packages needed to analyse a
/// kernel crash dump.
#[derive(Debug, Parser)]
#[command(name = "crashprep", version, about)]
struct Cli {
    /// Kernel version, e.g. 4.12.14-122.37.1 or 4.12.14-122.37-default
    kernel: String,

    /// Architecture to use
    #[arg(short, long, value_name = "ARCH", default_value = DEFAULT_ARCH)]
    arch: String,

    /// Also download the base kernel package
    #[arg(short, long)]
    base: bool,

    /// Extract the downloaded packages
    #[arg(short, long)]
    extraction: bool,

    /// Kernel flavor to use
    #[arg(short, long, default_value = DEFAULT_FLAVOR)]
    flavor: String,

    /// Where packages are stored and looked for
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// JSON settings file (mirrors, catalog location, timeouts)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP timeout per request, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Rebuild the kernel catalog even if it is fresh
    #[arg(long)]
    refresh: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path).with_context(|| format!("load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(secs) = cli.timeout {
        settings = settings.with_timeout(Duration::from_secs(secs));
    }
    Ok(settings)
}

/// A tiny wrapper to render the final report cleanly
fn print_report(report: &ResolutionReport) {
    let class = report.classification();
    println!("\n=== Crash preparation ===");
    println!("Kernel:   {}", report.kernel());
    println!("Release:  {}", class.release().name());
    println!("Era:      {}", class.era());
    println!("Pool:     {}", class.is_pool());
    println!("LTSS:     {}", class.is_ltss());
    println!("Packages:");
    for package in report.packages() {
        println!("  {:<12} {}", package.kind.to_string(), package.file.display());
        println!("  {:<12} {}", "", package.outcome);
    }
}

async fn run(cli: Cli) -> Result<ResolutionReport> {
    let settings = load_settings(&cli)?;
    let client = http_client(&settings).context("build HTTP client")?;
    let extractor = Arc::new(ScriptExtractor::new(settings.extraction_script()));

    let request = ResolveRequest {
        kernel: cli.kernel,
        arch: cli.arch,
        flavor: cli.flavor,
        include_base: cli.base,
        extract: cli.extraction,
        output_dir: cli.output_dir,
    };

    let report = Resolver::new(&settings, client, extractor)
        .run(&request, cli.refresh)
        .await?;
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Dropping the run future on Ctrl-C removes partial downloads and
    // extraction scratch directories.
    tokio::select! {
        result = run(cli) => match result {
            Ok(report) => {
                print_report(&report);
                if report.has_failures() {
                    warn!("some packages could not be prepared; see the report above");
                }
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!("{err:#}");
                ExitCode::FAILURE
            }
        },
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("interrupted; partial downloads removed");
            ExitCode::from(INTERRUPTED)
        }
    }
}
