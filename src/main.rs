//! SQL metadata extractor - pulls data sources, data sets and SQL command
//! text out of report definitions (`.rdl`) and SSIS packages (`.dtsx`) into
//! one delimited table.

mod batch;
mod classifier;
mod config;
mod error;
mod extractor;
mod fields;
mod flatten;
mod model;
mod namespace;
mod output;
mod walker;

use anyhow::Context;
use batch::BatchDriver;
use clap::Parser;
use config::{ExtractorConfig, FamilyMode};
use extractor::Extractor;
use output::TableOptions;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "sqlmeta-extractor",
    version,
    about = "Extract data sources and SQL from report definitions and SSIS packages"
)]
struct Cli {
    /// Root directory: one level of category folders holding reports, or any tree of packages
    #[arg(env = "SQLMETA_ROOT")]
    root: PathBuf,

    /// Which documents to read
    #[arg(long, value_enum, env = "SQLMETA_FAMILY")]
    family: Option<FamilyMode>,

    /// Write the table here instead of stdout
    #[arg(short, long, env = "SQLMETA_OUTPUT")]
    output: Option<PathBuf>,

    /// Field delimiter (single ASCII character)
    #[arg(short, long, env = "SQLMETA_DELIMITER")]
    delimiter: Option<char>,

    /// Truncate the Query column to N characters
    #[arg(long, value_name = "N", env = "SQLMETA_PREVIEW")]
    preview: Option<usize>,

    /// Number of files extracted concurrently
    #[arg(short, long, env = "SQLMETA_JOBS")]
    jobs: Option<usize>,

    /// Add a ReportKey column (file name without extension)
    #[arg(long, env = "SQLMETA_WITH_KEY")]
    with_key: bool,

    /// Path to a JSON configuration file
    #[arg(short, long, env = "SQLMETA_CONFIG")]
    config: Option<PathBuf>,

    /// Write a JSON run summary with every recorded error
    #[arg(long, env = "SQLMETA_SUMMARY")]
    summary: Option<PathBuf>,
}

impl Cli {
    /// File (or default) config with command-line values applied on top.
    fn resolve_config(&self) -> anyhow::Result<ExtractorConfig> {
        let mut config = match &self.config {
            Some(path) => ExtractorConfig::load_from_file(path)?,
            None => ExtractorConfig::default(),
        };

        if let Some(family) = self.family {
            config.family = family;
        }
        if let Some(delimiter) = self.delimiter {
            config.delimiter = delimiter;
        }
        if self.preview.is_some() {
            config.preview_len = self.preview;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if self.with_key {
            config.include_report_key = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "sqlmeta_extractor=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    let delimiter = config.delimiter_byte()?;

    let files = batch::discover(&cli.root, config.family)
        .with_context(|| format!("Failed to read root directory {:?}", cli.root))?;

    let driver = BatchDriver::new(Extractor::new(config.registry()?), config.worker_count());
    let report = driver.run(files).await;

    let rows = flatten::flatten_all(&report.results);
    let options = TableOptions {
        delimiter,
        preview_len: config.preview_len,
        include_report_key: config.include_report_key,
        include_component: rows.iter().any(|r| r.component.is_some()),
    };

    let written = match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output: {:?}", path))?;
            let mut writer = BufWriter::new(file);
            let written = output::write_table(&mut writer, &rows, &options)?;
            writer
                .flush()
                .with_context(|| format!("Failed to write output: {:?}", path))?;
            info!("Wrote {} row(s) to {:?}", written, path);
            written
        }
        None => output::write_table(std::io::stdout().lock(), &rows, &options)?,
    };

    if let Some(path) = &cli.summary {
        let json = serde_json::to_string_pretty(&report.error_report())
            .context("Failed to serialize summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary: {:?}", path))?;
        info!("Summary written to {:?}", path);
    }

    eprintln!(
        "{} processed, {} errored ({} row(s))",
        report.summary.processed, report.summary.errored, written
    );

    Ok(())
}
