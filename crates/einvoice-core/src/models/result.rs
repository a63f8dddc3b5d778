//! Output of a pipeline run.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::document::{DetectedFormat, XmlDialect};
use super::key_fields::KeyFields;
use crate::pipeline::PipelineState;

/// Result of a successful (or skipped) pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Unique id of this run.
    pub id: Uuid,

    /// Container format.
    pub detected_format: DetectedFormat,

    /// XML dialect (`None` for plain PDFs).
    pub dialect: XmlDialect,

    /// Extracted key fields.
    pub key_fields: KeyFields,

    /// Lowercase hex digest of the original file.
    pub content_fingerprint: String,

    /// Where the original file lives.
    pub original_file_path: PathBuf,

    /// Rendered artifact, absent for plain PDFs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_artifact_path: Option<PathBuf>,

    /// Terminal state the run ended in.
    pub final_state: PipelineState,
}

impl PipelineResult {
    /// Path of the document to show or print: the rendered artifact, or the
    /// original for plain PDFs.
    pub fn display_path(&self) -> &Path {
        self.rendered_artifact_path
            .as_deref()
            .unwrap_or(&self.original_file_path)
    }

    /// Extension of the original file including the dot.
    pub fn original_extension(&self) -> String {
        self.original_file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default()
    }

    /// Temp files backing this result.
    pub fn backing_files(&self) -> Vec<&Path> {
        let mut files = vec![self.original_file_path.as_path()];
        if let Some(rendered) = &self.rendered_artifact_path {
            files.push(rendered.as_path());
        }
        files
    }

    /// Move the rendered artifact to `target`, or delete it when there is no
    /// target. For runs outside the staging flow, whose temp files no cache
    /// entry owns. Returns the new location.
    pub fn release_artifact(&mut self, target: Option<&Path>) -> io::Result<Option<PathBuf>> {
        let Some(rendered) = self.rendered_artifact_path.take() else {
            return Ok(None);
        };

        match target {
            Some(target) => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                if std::fs::rename(&rendered, target).is_err() {
                    std::fs::copy(&rendered, target)?;
                    std::fs::remove_file(&rendered)?;
                }
                debug!("Moved {} to {}", rendered.display(), target.display());
                self.rendered_artifact_path = Some(target.to_path_buf());
            }
            None => match std::fs::remove_file(&rendered) {
                Ok(()) => debug!("Deleted {}", rendered.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    self.rendered_artifact_path = Some(rendered);
                    return Err(e);
                }
            },
        }
        Ok(self.rendered_artifact_path.clone())
    }
}
