//! CLI subcommands.

pub mod batch;
pub mod config;
pub mod process;

use std::path::Path;

use einvoice_core::EinvoiceConfig;

/// Load the config file given with `--config`, or the defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<EinvoiceConfig> {
    let config = match config_path {
        Some(path) => EinvoiceConfig::from_file(Path::new(path))?,
        None => {
            let default_path = config::default_config_path();
            if default_path.exists() {
                EinvoiceConfig::from_file(&default_path)?
            } else {
                EinvoiceConfig::default()
            }
        }
    };
    config.validate()?;
    Ok(config)
}
