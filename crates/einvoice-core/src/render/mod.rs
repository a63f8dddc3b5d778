//! Layout transformation and binary rendering.

mod command;

pub use command::CommandRenderer;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::RenderError;
use crate::transform::{TemplateRef, TransformEngine};
use crate::xml::XmlDocument;

/// A rendering engine binding (XSL-FO processor or equivalent).
pub trait LayoutRenderer: Send + Sync {
    /// Render the layout document at `layout_path` into `output_path`.
    fn render(&self, layout_path: &Path, output_path: &Path) -> Result<(), RenderError>;
}

/// A rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Turns canonical documents into printable artifacts.
pub struct DocumentRenderer {
    engine: Arc<dyn TransformEngine>,
    layout_template: TemplateRef,
    renderer: Arc<dyn LayoutRenderer>,
    scratch_dir: Option<PathBuf>,
}

impl DocumentRenderer {
    pub fn new(
        engine: Arc<dyn TransformEngine>,
        layout_template: TemplateRef,
        renderer: Arc<dyn LayoutRenderer>,
    ) -> Self {
        Self {
            engine,
            layout_template,
            renderer,
            scratch_dir: None,
        }
    }

    /// Directory for the intermediate layout file (system temp dir otherwise).
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Apply the layout template to a canonical document.
    pub fn to_layout(&self, canonical: &XmlDocument) -> Result<XmlDocument, RenderError> {
        self.engine
            .compile(&self.layout_template)
            .and_then(|executable| executable.apply(canonical))
            .map_err(|source| RenderError::Layout {
                template: self.layout_template.clone(),
                source,
            })
    }

    /// Render a layout document to `output_path`.
    ///
    /// The intermediate layout file is removed on every path. A failed render
    /// leaves nothing at `output_path`.
    pub fn render(&self, layout: &XmlDocument, output_path: &Path) -> Result<RenderedArtifact, RenderError> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("einvoice-layout-").suffix(".fo");
            builder
        };
        let mut layout_file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        layout.write_to(&mut layout_file)?;
        layout_file.flush()?;

        let result = self
            .renderer
            .render(layout_file.path(), output_path)
            .and_then(|()| read_artifact(output_path));

        match result {
            Ok(bytes) => {
                debug!("Rendered {} bytes to {}", bytes.len(), output_path.display());
                Ok(RenderedArtifact {
                    path: output_path.to_path_buf(),
                    bytes,
                })
            }
            Err(e) => {
                remove_partial(output_path);
                Err(e)
            }
        }
    }
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, RenderError> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(RenderError::EmptyOutput(path.to_path_buf()));
    }
    Ok(bytes)
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformEngineError;
    use crate::transform::tests::RecordingEngine;
    use crate::transform::Executable;
    use std::sync::Mutex;

    /// What the renderer double does with the output path.
    enum Behavior {
        Write(&'static [u8]),
        WriteThenFail,
        Nothing,
    }

    struct FakeRenderer {
        behavior: Behavior,
        seen_layout: Mutex<Option<PathBuf>>,
    }

    impl FakeRenderer {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                seen_layout: Mutex::new(None),
            }
        }

        fn seen_layout(&self) -> PathBuf {
            self.seen_layout.lock().unwrap().clone().unwrap()
        }
    }

    impl LayoutRenderer for FakeRenderer {
        fn render(&self, layout_path: &Path, output_path: &Path) -> Result<(), RenderError> {
            assert!(layout_path.exists());
            *self.seen_layout.lock().unwrap() = Some(layout_path.to_path_buf());
            match self.behavior {
                Behavior::Write(bytes) => {
                    std::fs::write(output_path, bytes)?;
                    Ok(())
                }
                Behavior::WriteThenFail => {
                    std::fs::write(output_path, b"%PDF-partial")?;
                    Err(RenderError::Engine("out of memory".to_string()))
                }
                Behavior::Nothing => Ok(()),
            }
        }
    }

    fn renderer(fake: Arc<FakeRenderer>) -> DocumentRenderer {
        let engine = Arc::new(RecordingEngine::new(XmlDocument::parse_str("<fo:root xmlns:fo=\"http://www.w3.org/1999/XSL/Format\"/>").unwrap()));
        DocumentRenderer::new(engine, TemplateRef::new("xsl/xr-pdf.xsl"), fake)
    }

    fn layout() -> XmlDocument {
        XmlDocument::parse_str("<root/>").unwrap()
    }

    #[test]
    fn test_render_success_removes_layout_file() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeRenderer::new(Behavior::Write(b"%PDF-1.7 rendered")));
        let renderer = renderer(fake.clone()).with_scratch_dir(dir.path());
        let output = dir.path().join("out").join("gen_1.pdf");

        let artifact = renderer.render(&layout(), &output).unwrap();

        assert_eq!(artifact.path, output);
        assert_eq!(artifact.bytes, b"%PDF-1.7 rendered".to_vec());
        assert!(!fake.seen_layout().exists());
    }

    #[test]
    fn test_failed_render_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeRenderer::new(Behavior::WriteThenFail));
        let renderer = renderer(fake.clone()).with_scratch_dir(dir.path());
        let output = dir.path().join("gen_2.pdf");

        let err = renderer.render(&layout(), &output).unwrap_err();

        assert!(matches!(err, RenderError::Engine(_)));
        assert!(!output.exists());
        assert!(!fake.seen_layout().exists());
    }

    #[test]
    fn test_empty_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("gen_3.pdf");
        std::fs::write(&output, b"").unwrap();
        let renderer = renderer(Arc::new(FakeRenderer::new(Behavior::Nothing)));

        let err = renderer.render(&layout(), &output).unwrap_err();

        assert!(matches!(err, RenderError::EmptyOutput(path) if path == output));
        assert!(!output.exists());
    }

    #[test]
    fn test_to_layout_uses_layout_template() {
        let engine = Arc::new(RecordingEngine::new(layout()));
        let renderer = DocumentRenderer::new(
            engine.clone(),
            TemplateRef::new("xsl/xr-pdf.xsl"),
            Arc::new(FakeRenderer::new(Behavior::Nothing)),
        );

        assert_eq!(renderer.to_layout(&layout()).unwrap(), layout());
        assert_eq!(
            *engine.compiled.lock().unwrap(),
            vec![TemplateRef::new("xsl/xr-pdf.xsl")]
        );
    }

    struct FailingEngine;

    impl TransformEngine for FailingEngine {
        fn compile(&self, _template: &TemplateRef) -> Result<Box<dyn Executable>, TransformEngineError> {
            Err(TransformEngineError::Runtime("no processor".to_string()))
        }
    }

    #[test]
    fn test_layout_failure_is_render_error() {
        let renderer = DocumentRenderer::new(
            Arc::new(FailingEngine),
            TemplateRef::new("xsl/xr-pdf.xsl"),
            Arc::new(FakeRenderer::new(Behavior::Nothing)),
        );

        let err = renderer.to_layout(&layout()).unwrap_err();
        assert!(matches!(err, RenderError::Layout { template, .. } if template == TemplateRef::new("xsl/xr-pdf.xsl")));
    }
}
