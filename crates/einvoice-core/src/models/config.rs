//! Configuration structures for the invoice pipeline.
//!
//! The configuration is an explicit value: it is loaded once at startup and
//! handed to the component constructors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::CommandSpec;
use crate::detect::DigestAlgorithm;
use crate::error::ConfigError;

/// Main configuration for the einvoice pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EinvoiceConfig {
    /// Format detection and fingerprinting.
    pub detection: DetectionConfig,

    /// Transform template locations.
    pub templates: TemplateConfig,

    /// External engine command lines.
    pub engines: EngineConfig,

    /// Result cache bounds.
    pub cache: CacheConfig,

    /// Staging and archive directories.
    pub storage: StorageConfig,
}

/// Format detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Digest used for content fingerprints (SHA-224, SHA-256, SHA-384, SHA-512).
    pub digest_algorithm: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            digest_algorithm: "SHA-256".to_string(),
        }
    }
}

impl DetectionConfig {
    /// The configured digest algorithm.
    pub fn algorithm(&self) -> Result<DigestAlgorithm, ConfigError> {
        self.digest_algorithm.parse()
    }
}

/// Stylesheets used by the transform stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// UBL Invoice to canonical.
    pub ubl_invoice: PathBuf,

    /// UBL CreditNote to canonical.
    pub ubl_credit_note: PathBuf,

    /// CII to canonical.
    pub cii: PathBuf,

    /// Canonical to XSL-FO layout.
    pub layout: PathBuf,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            ubl_invoice: PathBuf::from("xsl/ubl-invoice-xr.xsl"),
            ubl_credit_note: PathBuf::from("xsl/ubl-creditnote-xr.xsl"),
            cii: PathBuf::from("xsl/cii-xr.xsl"),
            layout: PathBuf::from("xsl/xr-pdf.xsl"),
        }
    }
}

/// Command lines of the external transform and rendering engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// XSLT processor. Placeholders: `{stylesheet}`, `{input}`, `{output}`.
    pub transform: CommandSpec,

    /// XSL-FO renderer. Placeholders: `{input}`, `{output}`.
    pub render: CommandSpec,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transform: CommandSpec::new(
                "xsltproc",
                ["--output", "{output}", "{stylesheet}", "{input}"],
            ),
            render: CommandSpec::new("fop", ["-fo", "{input}", "-pdf", "{output}"]),
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of staged results.
    pub max_entries: usize,

    /// Lifetime of a staged result after it was written, in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            ttl_secs: 24 * 60 * 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Directories used for staging and archiving.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Uploads and rendered artifacts awaiting confirmation.
    pub temp_dir: PathBuf,

    /// Root of the archive, one directory per seller.
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("tempfiles"),
            output_dir: PathBuf::from("invoices"),
        }
    }
}

impl EinvoiceConfig {
    /// Load configuration from a JSON file and validate it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that can only be wrong at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.algorithm()?;

        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be at least 1".to_string()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be at least 1".to_string()));
        }
        if self.engines.transform.program.is_empty() || self.engines.render.program.is_empty() {
            return Err(ConfigError::Invalid("engine program must not be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EinvoiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.max_entries, 50);
        assert_eq!(config.cache.ttl(), Duration::from_secs(86400));
    }

    #[test]
    fn test_unsupported_digest_is_rejected() {
        let mut config = EinvoiceConfig::default();
        config.detection.digest_algorithm = "MD4".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::UnsupportedDigest(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "cache": { "max_entries": 3 } }"#).unwrap();

        let config = EinvoiceConfig::from_file(&path).unwrap();
        assert_eq!(config.cache.max_entries, 3);
        assert_eq!(config.cache.ttl_secs, 86400);
        assert_eq!(config.detection.digest_algorithm, "SHA-256");
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = EinvoiceConfig::default();
        config.storage.output_dir = PathBuf::from("/srv/invoices");
        config.save(&path).unwrap();

        let loaded = EinvoiceConfig::from_file(&path).unwrap();
        assert_eq!(loaded.storage.output_dir, PathBuf::from("/srv/invoices"));
    }
}
