//! Process command - run a single invoice file through the pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use einvoice_core::{
    KeyFieldOverrides, PipelineOrchestrator, PipelineResult, PipelineState, RawDocument, StageError, StagingService,
};

use super::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (XML or PDF)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Where to keep the rendered PDF (deleted after the run otherwise)
    #[arg(long, conflicts_with = "archive")]
    rendered: Option<PathBuf>,

    /// Stage the file and archive it into the configured output directory
    #[arg(long)]
    archive: bool,

    /// JSON file with key field corrections, applied to plain PDFs on archive
    #[arg(long, requires = "archive")]
    overrides: Option<PathBuf>,

    /// Language of error messages (en, de)
    #[arg(long, default_value = "en")]
    lang: String,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message("Running pipeline...");

    let outcome = if args.archive {
        let overrides = args.overrides.as_deref().map(read_overrides).transpose()?;
        let service = StagingService::from_config(&config)?;
        let result = service.upload_file(&args.input).map_err(|e| match e {
            einvoice_core::error::StagingError::Pipeline(stage) => report(stage, &args.lang),
            other => other.into(),
        })?;

        pb.set_message("Archiving...");
        let paths = service.confirm(result.id, overrides.as_ref())?;
        pb.finish_and_clear();
        println!(
            "{} Archived to {}",
            style("✓").green(),
            paths.generated.display()
        );
        paths.relocate(&result)
    } else {
        let orchestrator = PipelineOrchestrator::from_config(&config)?;
        let mut result = orchestrator
            .run(&RawDocument::new(&args.input))
            .map_err(|e| report(e, &args.lang))?;
        result.release_artifact(args.rendered.as_deref())?;
        pb.finish_and_clear();
        result
    };

    if outcome.final_state == PipelineState::SkippedNonEinvoice {
        eprintln!(
            "{} {} is not an e-invoice, no key fields extracted",
            style("ℹ").blue(),
            args.input.display()
        );
    }

    let output = format_result(&outcome, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

fn read_overrides(path: &Path) -> anyhow::Result<KeyFieldOverrides> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Print the user-facing error code and hand the error back.
pub fn report(err: StageError, lang: &str) -> anyhow::Error {
    let code = err.error_code();
    eprintln!(
        "{} {}: {}",
        style("✗").red(),
        style(code).red().bold(),
        code.message(lang)
    );
    err.into()
}

pub fn format_result(result: &PipelineResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

fn format_csv(result: &PipelineResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
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
    ])?;
    wtr.write_record(csv_fields(result))?;

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

/// One CSV row per result, shared with the batch summary.
pub fn csv_fields(result: &PipelineResult) -> [String; 10] {
    let fields = &result.key_fields;
    [
        result.id.to_string(),
        result.final_state.to_string(),
        result.detected_format.to_string(),
        result.dialect.to_string(),
        fields.seller_name.clone(),
        fields.invoice_reference.clone(),
        fields.invoice_type_code.map(|c| c.to_string()).unwrap_or_default(),
        fields.issued_date.map(|d| d.to_string()).unwrap_or_default(),
        fields.total_amount.map(|t| t.to_string()).unwrap_or_default(),
        result.content_fingerprint.clone(),
    ]
}

fn format_text(result: &PipelineResult) -> String {
    let fields = &result.key_fields;
    let mut output = String::new();

    output.push_str(&format!("Invoice: {}\n", fields.invoice_reference));
    output.push_str(&format!("Seller:  {}\n", fields.seller_name));
    if let Some(code) = fields.invoice_type_code {
        output.push_str(&format!("Type:    {}\n", code));
    }
    if let Some(date) = fields.issued_date {
        output.push_str(&format!("Date:    {}\n", date));
    }
    if let Some(total) = fields.total_amount {
        output.push_str(&format!("Total:   {}\n", total));
    }
    output.push('\n');

    output.push_str(&format!("State:       {}\n", result.final_state));
    output.push_str(&format!("Format:      {}\n", result.detected_format));
    output.push_str(&format!("Dialect:     {}\n", result.dialect));
    output.push_str(&format!("Fingerprint: {}\n", result.content_fingerprint));
    output.push_str(&format!("Document:    {}\n", result.display_path().display()));

    output
}
