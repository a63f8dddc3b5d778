//! Batch processing command for multiple invoice files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use futures_util::stream::{self, StreamExt};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use einvoice_core::{ErrorCode, PipelineOrchestrator, PipelineResult, RawDocument, StagingService};

use super::load_config;
use super::process::{csv_fields, format_result, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Archive every successfully processed file
    #[arg(long)]
    archive: bool,
}

/// Result of processing a single file.
struct FileOutcome {
    path: PathBuf,
    result: Option<PipelineResult>,
    error: Option<(Option<ErrorCode>, String)>,
    processing_time_ms: u64,
}

/// What each worker runs a file through.
#[derive(Clone)]
enum Runner {
    Pipeline(Arc<PipelineOrchestrator>),
    Staging(Arc<StagingService>),
}

impl Runner {
    /// Run one file. Rendered documents go to `output_dir` as `<stem>.pdf`,
    /// or are deleted when there is no output directory.
    fn process(&self, path: &Path, output_dir: Option<&Path>) -> Result<PipelineResult, (Option<ErrorCode>, String)> {
        match self {
            Runner::Pipeline(orchestrator) => {
                let mut result = orchestrator
                    .run(&RawDocument::new(path))
                    .map_err(|e| (Some(e.error_code()), e.to_string()))?;
                let target = output_dir.map(|dir| dir.join(format!("{}.pdf", file_stem(path))));
                result
                    .release_artifact(target.as_deref())
                    .map_err(|e| (None, format!("failed to release rendered document: {}", e)))?;
                Ok(result)
            }
            Runner::Staging(service) => {
                let result = service.upload_file(path).map_err(|e| match e {
                    einvoice_core::error::StagingError::Pipeline(stage) => {
                        (Some(stage.error_code()), stage.to_string())
                    }
                    other => (None, other.to_string()),
                })?;
                let paths = service.confirm(result.id, None).map_err(|e| (None, e.to_string()))?;
                debug!("Archived {} as {}", path.display(), paths.generated.display());
                Ok(paths.relocate(&result))
            }
        }
    }
}

fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("invoice")
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            matches!(ext.to_lowercase().as_str(), "xml" | "pdf")
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let runner = if args.archive {
        Runner::Staging(Arc::new(StagingService::from_config(&config)?))
    } else {
        Runner::Pipeline(Arc::new(PipelineOrchestrator::from_config(&config)?))
    };

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut outcomes = stream::iter(files)
        .map(|path| {
            let runner = runner.clone();
            let output_dir = args.output_dir.clone();
            tokio::task::spawn_blocking(move || {
                let file_start = Instant::now();
                let result = runner.process(&path, output_dir.as_deref());
                let processing_time_ms = file_start.elapsed().as_millis() as u64;
                match result {
                    Ok(result) => FileOutcome {
                        path,
                        result: Some(result),
                        error: None,
                        processing_time_ms,
                    },
                    Err(error) => FileOutcome {
                        path,
                        result: None,
                        error: Some(error),
                        processing_time_ms,
                    },
                }
            })
        })
        .buffer_unordered(args.jobs.max(1));

    let mut results = Vec::new();
    while let Some(outcome) = outcomes.next().await {
        let outcome = outcome?;
        if let Some((_, message)) = &outcome.error {
            if args.continue_on_error {
                warn!("Failed to process {}: {}", outcome.path.display(), message);
            } else {
                error!("Failed to process {}: {}", outcome.path.display(), message);
                overall_pb.abandon();
                anyhow::bail!("Processing failed: {}", message);
            }
        }
        overall_pb.inc(1);
        results.push(outcome);
    }

    overall_pb.finish_with_message("Complete");
    results.sort_by(|a, b| a.path.cmp(&b.path));

    let successful: Vec<_> = results.iter().filter(|r| r.result.is_some()).collect();
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    if let Some(output_dir) = &args.output_dir {
        for outcome in &successful {
            if let Some(result) = &outcome.result {
                let output_path = output_dir.join(format!("{}.{}", file_stem(&outcome.path), args.format.extension()));

                fs::write(&output_path, format_result(result, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(successful.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for outcome in &failed {
            let (code, message) = outcome
                .error
                .as_ref()
                .map(|(code, message)| (code.map(|c| c.code()).unwrap_or("-"), message.as_str()))
                .unwrap_or(("-", "unknown error"));
            println!("  - {} [{}]: {}", outcome.path.display(), code, message);
        }
    }

    Ok(())
}

fn write_summary(path: &Path, results: &[FileOutcome]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "id",
        "state",
        "format",
        "dialect",
        "seller_name",
        "invoice_reference",
        "invoice_type_code",
        "issued_date",
        "total_amount",
        "fingerprint",
        "processing_time_ms",
        "error_code",
        "error",
    ])?;

    for outcome in results {
        let filename = outcome
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        let mut record = vec![filename];
        match (&outcome.result, &outcome.error) {
            (Some(result), _) => {
                record.push("success".to_string());
                record.extend(csv_fields(result));
                record.push(outcome.processing_time_ms.to_string());
                record.extend([String::new(), String::new()]);
            }
            (None, error) => {
                record.push("error".to_string());
                record.extend(std::iter::repeat_n(String::new(), 10));
                record.push(outcome.processing_time_ms.to_string());
                let (code, message) = error
                    .as_ref()
                    .map(|(code, message)| (code.map(|c| c.code().to_string()).unwrap_or_default(), message.clone()))
                    .unwrap_or_default();
                record.extend([code, message]);
            }
        }
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
