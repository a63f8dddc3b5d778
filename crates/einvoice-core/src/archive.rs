//! Placement of confirmed invoices in the archive directory.
//!
//! Layout: `<output_dir>/<seller>/<reference>_<fingerprint>.pdf` for the
//! rendered document and `original_<reference>_<fingerprint><ext>` for the
//! uploaded file. Plain PDFs are their own printable document, so both paths
//! coincide.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::StagingError;
use crate::extract::{sanitize_reference, sanitize_seller_name};
use crate::models::document::DetectedFormat;
use crate::models::result::PipelineResult;

/// Target paths of an archived result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedPaths {
    pub generated: PathBuf,
    pub original: PathBuf,
}

impl ArchivedPaths {
    /// `result` as it reads once archived: pointing at the archive copies
    /// instead of the released temp files.
    pub fn relocate(&self, result: &PipelineResult) -> PipelineResult {
        PipelineResult {
            original_file_path: self.original.clone(),
            rendered_artifact_path: result.rendered_artifact_path.as_ref().map(|_| self.generated.clone()),
            ..result.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    output_dir: PathBuf,
}

impl ArchiveLayout {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where `result` goes once confirmed.
    pub fn paths_for(&self, result: &PipelineResult) -> ArchivedPaths {
        let dir = self
            .output_dir
            .join(sanitize_seller_name(&result.key_fields.seller_name));
        let reference = sanitize_reference(&result.key_fields.invoice_reference);
        let fingerprint = &result.content_fingerprint;

        let original = dir.join(format!(
            "original_{}_{}{}",
            reference,
            fingerprint,
            result.original_extension()
        ));
        let generated = if result.detected_format == DetectedFormat::PdfPlain {
            original.clone()
        } else {
            dir.join(format!("{}_{}.pdf", reference, fingerprint))
        };

        ArchivedPaths {
            generated,
            original,
        }
    }

    /// Copy the staged files of `result` into the archive.
    pub fn store(&self, result: &PipelineResult) -> Result<ArchivedPaths, StagingError> {
        let paths = self.paths_for(result);

        if let Some(dir) = paths.original.parent() {
            std::fs::create_dir_all(dir).map_err(|source| StagingError::Archive {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        copy(&result.original_file_path, &paths.original)?;
        if let Some(rendered) = &result.rendered_artifact_path {
            if paths.generated != paths.original {
                copy(rendered, &paths.generated)?;
            }
        }

        info!("Archived {} as {}", result.id, paths.generated.display());
        Ok(paths)
    }
}

fn copy(from: &Path, to: &Path) -> Result<(), StagingError> {
    std::fs::copy(from, to).map_err(|source| StagingError::Archive {
        path: to.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::XmlDialect;
    use crate::models::key_fields::KeyFields;
    use crate::pipeline::PipelineState;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn result(format: DetectedFormat, original: PathBuf, rendered: Option<PathBuf>) -> PipelineResult {
        PipelineResult {
            id: Uuid::new_v4(),
            detected_format: format,
            dialect: XmlDialect::UblInvoice,
            key_fields: KeyFields {
                seller_name: "Acme Co".to_string(),
                invoice_reference: "RE/2024/1".to_string(),
                ..KeyFields::absent()
            },
            content_fingerprint: "abc123".to_string(),
            original_file_path: original,
            rendered_artifact_path: rendered,
            final_state: PipelineState::Complete,
        }
    }

    #[test]
    fn test_paths_for_einvoice() {
        let layout = ArchiveLayout::new("/archive");
        let paths = layout.paths_for(&result(
            DetectedFormat::Xml,
            PathBuf::from("/tmp/org_1.xml"),
            Some(PathBuf::from("/tmp/gen_1.pdf")),
        ));

        assert_eq!(paths.generated, PathBuf::from("/archive/Acme Co/RE-2024-1_abc123.pdf"));
        assert_eq!(paths.original, PathBuf::from("/archive/Acme Co/original_RE-2024-1_abc123.xml"));
    }

    #[test]
    fn test_paths_for_plain_pdf() {
        let layout = ArchiveLayout::new("/archive");
        let paths = layout.paths_for(&result(DetectedFormat::PdfPlain, PathBuf::from("/tmp/org_1.pdf"), None));

        assert_eq!(paths.generated, paths.original);
        assert_eq!(paths.original, PathBuf::from("/archive/Acme Co/original_RE-2024-1_abc123.pdf"));
    }

    #[test]
    fn test_relocate_points_at_archive() {
        let layout = ArchiveLayout::new("/archive");
        let staged = result(
            DetectedFormat::Xml,
            PathBuf::from("/tmp/org_1.xml"),
            Some(PathBuf::from("/tmp/gen_1.pdf")),
        );
        let paths = layout.paths_for(&staged);

        let archived = paths.relocate(&staged);
        assert_eq!(archived.original_file_path, paths.original);
        assert_eq!(archived.rendered_artifact_path.as_deref(), Some(paths.generated.as_path()));
        assert_eq!(archived.display_path(), paths.generated);
        assert_eq!(archived.key_fields, staged.key_fields);

        let plain = result(DetectedFormat::PdfPlain, PathBuf::from("/tmp/org_2.pdf"), None);
        let archived = layout.paths_for(&plain).relocate(&plain);
        assert_eq!(archived.rendered_artifact_path, None);
        assert_eq!(archived.display_path(), layout.paths_for(&plain).original);
    }

    #[test]
    fn test_store_copies_files() {
        let staging = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let original = staging.path().join("org_1.xml");
        let rendered = staging.path().join("gen_1.pdf");
        std::fs::write(&original, "<Invoice/>").unwrap();
        std::fs::write(&rendered, "%PDF-1.7").unwrap();

        let layout = ArchiveLayout::new(archive.path());
        let paths = layout
            .store(&result(DetectedFormat::Xml, original.clone(), Some(rendered)))
            .unwrap();

        assert_eq!(std::fs::read_to_string(&paths.original).unwrap(), "<Invoice/>");
        assert_eq!(std::fs::read_to_string(&paths.generated).unwrap(), "%PDF-1.7");
        assert!(original.exists());
    }

    #[test]
    fn test_store_missing_source() {
        let archive = tempfile::tempdir().unwrap();
        let layout = ArchiveLayout::new(archive.path());
        let err = layout
            .store(&result(DetectedFormat::PdfPlain, PathBuf::from("/nonexistent/org.pdf"), None))
            .unwrap_err();
        assert!(matches!(err, StagingError::Archive { .. }));
    }
}
