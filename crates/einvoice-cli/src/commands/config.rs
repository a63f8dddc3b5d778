//! Config command - inspect and create the pipeline configuration.
//!
//! The file is JSON with the sections `detection`, `templates`, `engines`,
//! `cache` and `storage`. Missing sections fall back to their defaults.

use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use console::style;

use einvoice_core::EinvoiceConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration, or one section of it
    Show {
        /// Section to print
        #[arg(value_enum)]
        section: Option<Section>,
    },

    /// Write a configuration file with the default templates, engines,
    /// cache bounds and storage directories
    Init(InitArgs),

    /// Check the configuration and the template and directory paths it names
    Check,

    /// Show where the configuration file is looked up
    Path,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Section {
    /// Digest algorithm for content fingerprints
    Detection,
    /// UBL, CII and layout stylesheets
    Templates,
    /// XSLT and FO processor command lines
    Engines,
    /// Staged result bounds (max_entries, ttl_secs)
    Cache,
    /// Temp and archive directories
    Storage,
}

impl Section {
    fn key(&self) -> &'static str {
        match self {
            Section::Detection => "detection",
            Section::Templates => "templates",
            Section::Engines => "engines",
            Section::Cache => "cache",
            Section::Storage => "storage",
        }
    }
}

#[derive(Args)]
struct InitArgs {
    /// Where to write the file (default: the per-user config directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Replace an existing file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show { section } => show(section),
        ConfigCommand::Init(init_args) => init(init_args),
        ConfigCommand::Check => check(),
        ConfigCommand::Path => path(),
    }
}

/// `<config dir>/einvoice/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("einvoice")
        .join("config.json")
}

fn effective_config() -> anyhow::Result<(EinvoiceConfig, bool)> {
    let config_path = default_config_path();
    if config_path.exists() {
        Ok((EinvoiceConfig::from_file(&config_path)?, true))
    } else {
        Ok((EinvoiceConfig::default(), false))
    }
}

fn show(section: Option<Section>) -> anyhow::Result<()> {
    let (config, from_file) = effective_config()?;
    if !from_file {
        eprintln!("{} No config file found, showing defaults.", style("ℹ").blue());
    }

    let json = serde_json::to_value(&config)?;
    let shown = match section {
        Some(section) => json
            .get(section.key())
            .ok_or_else(|| anyhow::anyhow!("Missing section: {}", section.key()))?,
        None => &json,
    };
    println!("{}", serde_json::to_string_pretty(shown)?);

    Ok(())
}

fn init(args: InitArgs) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or_else(default_config_path);

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists. Use --force to replace it.",
            output_path.display()
        );
    }
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    EinvoiceConfig::default().save(&output_path)?;
    println!(
        "{} Wrote default configuration to {}",
        style("✓").green(),
        output_path.display()
    );
    println!("  Point `templates` at your stylesheets before processing invoices.");

    Ok(())
}

fn check() -> anyhow::Result<()> {
    let (config, _) = effective_config()?;
    config.validate()?;

    let templates = [
        ("templates.ubl_invoice", &config.templates.ubl_invoice),
        ("templates.ubl_credit_note", &config.templates.ubl_credit_note),
        ("templates.cii", &config.templates.cii),
        ("templates.layout", &config.templates.layout),
    ];
    let mut missing = 0;
    for (key, path) in templates {
        if path.exists() {
            println!("{} {} = {}", style("✓").green(), key, path.display());
        } else {
            missing += 1;
            println!("{} {} = {} (not found)", style("✗").red(), key, path.display());
        }
    }
    for (key, path) in [
        ("storage.temp_dir", &config.storage.temp_dir),
        ("storage.output_dir", &config.storage.output_dir),
    ] {
        let status = if path.is_dir() {
            style("exists").green()
        } else {
            style("created on first use").yellow()
        };
        println!("  {} = {} ({})", key, path.display(), status);
    }

    if missing > 0 {
        anyhow::bail!("{} template(s) not found", missing);
    }
    Ok(())
}

fn path() -> anyhow::Result<()> {
    let config_path = default_config_path();

    println!("Configuration file: {}", config_path.display());
    if config_path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created, defaults apply").yellow());
        println!();
        println!("Run 'einvoice config init' to write one.");
    }

    Ok(())
}
