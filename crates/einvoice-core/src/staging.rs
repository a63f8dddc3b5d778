//! Upload staging: uploads are processed and held in the result cache until
//! the user confirms or discards them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::{ArchiveLayout, ArchivedPaths};
use crate::cache::{InvoiceCache, StagedFileCleanup};
use crate::error::{ConfigError, StagingError};
use crate::models::config::EinvoiceConfig;
use crate::models::document::{DetectedFormat, RawDocument};
use crate::models::key_fields::KeyFieldOverrides;
use crate::models::result::PipelineResult;
use crate::pipeline::PipelineOrchestrator;

/// Ties pipeline, result cache and archive together.
pub struct StagingService {
    orchestrator: Arc<PipelineOrchestrator>,
    cache: Arc<InvoiceCache>,
    archive: ArchiveLayout,
    temp_dir: PathBuf,
}

impl StagingService {
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        cache: Arc<InvoiceCache>,
        archive: ArchiveLayout,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            archive,
            temp_dir: temp_dir.into(),
        }
    }

    /// Service with the default engines and a file-deleting cache.
    pub fn from_config(config: &EinvoiceConfig) -> Result<Self, ConfigError> {
        Self::with_orchestrator(config, PipelineOrchestrator::from_config(config)?)
    }

    /// Service around a prepared orchestrator, bounded and placed by `config`.
    pub fn with_orchestrator(config: &EinvoiceConfig, orchestrator: PipelineOrchestrator) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            Arc::new(orchestrator),
            Arc::new(InvoiceCache::new(&config.cache, StagedFileCleanup)),
            ArchiveLayout::new(&config.storage.output_dir),
            &config.storage.temp_dir,
        ))
    }

    pub fn archive(&self) -> &ArchiveLayout {
        &self.archive
    }

    /// Stage an upload and run it through the pipeline.
    ///
    /// The upload is written as `org_<id><ext>`. If the run fails the staged
    /// file is deleted again.
    pub fn upload(&self, file_name: &str, content: &[u8]) -> Result<PipelineResult, StagingError> {
        let id = Uuid::new_v4();
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        std::fs::create_dir_all(&self.temp_dir).map_err(StagingError::Upload)?;
        let staged = self.temp_dir.join(format!("org_{}{}", id, extension));
        std::fs::write(&staged, content).map_err(StagingError::Upload)?;
        debug!("Staged {} as {}", file_name, staged.display());

        match self.orchestrator.run_with_id(id, &RawDocument::new(&staged)) {
            Ok(result) => {
                self.cache.put(id, result.clone());
                Ok(result)
            }
            Err(e) => {
                if let Err(remove) = std::fs::remove_file(&staged) {
                    warn!("Failed to remove staged upload {}: {}", staged.display(), remove);
                }
                Err(e.into())
            }
        }
    }

    /// Stage a file from disk.
    pub fn upload_file(&self, path: &Path) -> Result<PipelineResult, StagingError> {
        let content = std::fs::read(path).map_err(StagingError::Upload)?;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        self.upload(name, &content)
    }

    /// The staged result for `id`, if it has not expired.
    pub fn get(&self, id: Uuid) -> Option<PipelineResult> {
        self.cache.get(&id)
    }

    /// Archive a staged result and release its temp files.
    ///
    /// User overrides only apply to plain PDFs; e-invoices keep the values
    /// extracted from their structured content.
    pub fn confirm(&self, id: Uuid, overrides: Option<&KeyFieldOverrides>) -> Result<ArchivedPaths, StagingError> {
        let mut result = self.cache.get(&id).ok_or(StagingError::NotStaged(id))?;

        if let Some(overrides) = overrides {
            if result.detected_format == DetectedFormat::PdfPlain {
                result.key_fields = overrides.apply(&result.key_fields)?;
            } else {
                debug!("Ignoring key field overrides for e-invoice {}", id);
            }
        }

        let paths = self.archive.store(&result)?;
        self.cache.invalidate(&id);
        info!("Confirmed {}", id);
        Ok(paths)
    }

    /// Drop a staged result. Returns whether it was still staged.
    pub fn discard(&self, id: Uuid) -> bool {
        self.cache.invalidate(&id).is_some()
    }

    /// Drop all expired staged results.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Drop every staged result.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}
