//! `einvoice`: run UBL / CII e-invoices and ZUGFeRD PDFs through the
//! detection, normalization and rendering pipeline.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, config, process};

/// Detect, normalize, render and archive e-invoices
#[derive(Parser)]
#[command(name = "einvoice")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Examples:
  einvoice process invoice.xml --format text
  einvoice process zugferd.pdf --archive
  einvoice batch 'inbox/*.xml' -o out --summary -j 8
  einvoice config show templates")]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: the per-user config, then built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one XML or PDF file through the pipeline
    Process(process::ProcessArgs),

    /// Run every file matching a glob pattern
    Batch(batch::BatchArgs),

    /// Inspect or create the configuration file
    Config(config::ConfigArgs),
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Process(args) => process::run(args, config_path).await,
        Commands::Batch(args) => batch::run(args, config_path).await,
        Commands::Config(args) => config::run(args).await,
    }
}
