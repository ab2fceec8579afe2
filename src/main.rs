use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use vuln_scan_rs::catalog::{self, ServiceCatalog};
use vuln_scan_rs::config::{ScanConfig, DEFAULT_CONCURRENCY};
use vuln_scan_rs::logging::init_logging;
use vuln_scan_rs::{ScanReport, ScanTarget, Scanner, TcpConnector};

/// vuln-scan-rs — TCP port scanner that fingerprints services and flags common misconfigurations.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "vuln-scan-rs",
    version,
    about = "TCP port scanner that fingerprints services and flags common misconfigurations.",
    long_about = None
)]
struct Cli {
    /// Target IP address or domain name.
    target: String,

    /// First port of the range (inclusive).
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    start_port: u16,

    /// Last port of the range (inclusive).
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    end_port: u16,

    /// Number of ports probed concurrently.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    workers: usize,

    /// Connect and per-step I/O timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Service catalog file (`name version` per line). Built-in table if omitted.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Write the report as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log per-port progress and swallowed probe failures.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let target = ScanTarget::new(cli.target.clone(), cli.start_port, cli.end_port, cli.workers)
        .context("invalid scan configuration")?;

    let catalog = match cli.catalog.as_deref() {
        Some(path) => catalog::load_catalog_from_path(path)?,
        None => ServiceCatalog::default(),
    };

    let config = ScanConfig::default().with_timeout(Duration::from_millis(cli.timeout_ms));
    let scanner = Scanner::new(TcpConnector::new(config.connect_timeout), config);

    log::info!(
        "scanning {} ports {}-{} ({} workers, {} catalog entries)",
        target.host(),
        target.start(),
        target.end(),
        target.concurrency(),
        catalog.len()
    );

    let report = scanner
        .run(&target, &catalog)
        .await
        .with_context(|| format!("scan of {} failed", target.host()))?;
    println!("{report}");

    if let Some(path) = cli.output.as_deref() {
        write_report_json(path, &report)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON report to {}", path.display());
    }

    Ok(())
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
