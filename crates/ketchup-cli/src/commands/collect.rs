//! Collect command - capture cluster state into a run directory and archive

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use ketchup_core::run::default_output_dir;
use ketchup_core::{
    CollectionRun, CollectorConfig, CompressionMode, NamespaceFilter, OutputFormat,
    SignatureTable,
};
use ketchup_kube::{Collector, EMBEDDED_SIGNATURES_LABEL, KubeSource};
use tracing::debug;

use crate::display::{display_detection, display_outputs, display_summary};
use crate::error::{CliError, Result};
use crate::util::format_duration;

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Path to the kubeconfig file
    #[arg(short, long)]
    pub kubeconfig: PathBuf,

    /// Namespaces to collect from (comma-separated, default: all)
    #[arg(short, long)]
    pub namespaces: Option<String>,

    /// Directory that receives the run directory and archive
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// File format of collected resources: json, yaml or both
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// compressed, uncompressed or both
    #[arg(short, long)]
    pub compression: Option<CompressionMode>,

    /// Also collect instances of every CustomResourceDefinition
    #[arg(long)]
    pub include_custom_resources: bool,

    /// Write objects exactly as returned by the API server
    #[arg(long)]
    pub raw: bool,

    /// Skip platform detection
    #[arg(long)]
    pub disable_detection: bool,

    /// Collector configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of list requests in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Whole-run deadline in seconds
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Signature table replacing the embedded one
    #[arg(long)]
    pub signatures: Option<PathBuf>,
}

/// Run the collect command
pub async fn run(args: CollectArgs) -> Result<()> {
    let config = load_config(&args)?;
    let (signatures, signatures_label) = load_signatures(&args, &config)?;
    let run = build_run(&args);

    println!(
        "{} Connecting with kubeconfig {}",
        style("→").blue().bold(),
        style(args.kubeconfig.display()).cyan()
    );
    let source = KubeSource::connect(&args.kubeconfig, config.fetch_timeout).await?;
    let version = source.probe().await?;
    println!(
        "{} Connected to Kubernetes {}",
        style("✓").green(),
        style(&version).cyan()
    );
    println!(
        "{} Collecting into {}",
        style("→").blue().bold(),
        style(run.run_dir().display()).cyan()
    );

    let started = std::time::Instant::now();
    let collector = Collector::new(source, config)?.with_signatures(signatures, signatures_label);
    let report = collector.run(&run).await?;
    debug!(elapsed = %format_duration(started.elapsed()), "collect command finished");

    println!();
    display_summary(&report.summary);
    if let Some(detection) = &report.detection {
        display_detection(detection);
    }
    display_outputs(&report);
    println!(
        "\n{} Collection completed in {}",
        style("✓").green().bold(),
        format_duration(started.elapsed())
    );

    Ok(())
}

/// Config file (explicit or default location) with command-line overrides
fn load_config(args: &CollectArgs) -> Result<CollectorConfig> {
    let mut config = match &args.config {
        Some(path) => CollectorConfig::load_from(path).map_err(|e| {
            CliError::config_with_help(
                format!("{}: {e}", path.display()),
                "see the configuration reference for valid fields",
            )
        })?,
        None => CollectorConfig::load()?,
    };

    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(secs) = args.timeout {
        config.fetch_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.deadline {
        config.run_deadline = Some(Duration::from_secs(secs));
    }
    config.validate()?;
    Ok(config)
}

fn load_signatures(args: &CollectArgs, config: &CollectorConfig) -> Result<(SignatureTable, String)> {
    match args.signatures.as_ref().or(config.signatures_file.as_ref()) {
        Some(path) => {
            let table = SignatureTable::load_from(path)
                .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?;
            Ok((table, path.display().to_string()))
        }
        None => Ok((SignatureTable::embedded()?, EMBEDDED_SIGNATURES_LABEL.to_string())),
    }
}

fn build_run(args: &CollectArgs) -> CollectionRun {
    let output = args.output.clone().unwrap_or_else(default_output_dir);
    let namespaces = args
        .namespaces
        .as_deref()
        .map(NamespaceFilter::from_list)
        .unwrap_or(NamespaceFilter::All);

    CollectionRun::new(output)
        .with_namespaces(namespaces)
        .with_format(args.format.unwrap_or_default())
        .with_compression(args.compression.unwrap_or_default())
        .with_custom_resources(args.include_custom_resources)
        .with_raw_mode(args.raw)
        .with_detection(!args.disable_detection)
}
