//! Staged processing of a single input document.
//!
//! A run moves through `Received → FormatDetected → Parsed → Canonicalized →
//! Extracted → Rendered → Complete`. Plain PDFs stop at `SkippedNonEinvoice`
//! right after detection; any stage failure ends the run as `Failed` and is
//! reported as a [`StageError`] naming the stage.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::command::CommandSpec;
use crate::detect::{DigestAlgorithm, FormatDetector};
use crate::error::{ConfigError, FormatError, ParseError, PipelineError, StageError};
use crate::extract::KeyFieldExtractor;
use crate::models::config::EinvoiceConfig;
use crate::models::document::{DetectedFormat, RawDocument, XmlDialect};
use crate::models::key_fields::KeyFields;
use crate::models::result::PipelineResult;
use crate::pdf::{EmbeddedInvoiceExtractor, LopdfEmbeddedExtractor};
use crate::query::{PathQueryEngine, QueryEngine};
use crate::render::{CommandRenderer, DocumentRenderer, LayoutRenderer};
use crate::transform::{CommandTransformEngine, DialectTransformer, TemplateSet, TransformEngine};
use crate::xml::XmlDocument;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Detect,
    Parse,
    Canonicalize,
    Extract,
    Layout,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Detect => "detect",
            Stage::Parse => "parse",
            Stage::Canonicalize => "canonicalize",
            Stage::Extract => "extract",
            Stage::Layout => "layout",
            Stage::Render => "render",
        };
        f.write_str(name)
    }
}

/// State of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Received,
    FormatDetected,
    SkippedNonEinvoice,
    Parsed,
    Canonicalized,
    Extracted,
    Rendered,
    Complete,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Complete | PipelineState::Failed | PipelineState::SkippedNonEinvoice
        )
    }

    /// Whether a run may move from `self` to `next`.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Received, FormatDetected)
                | (FormatDetected, SkippedNonEinvoice)
                | (FormatDetected, Parsed)
                | (Parsed, Canonicalized)
                | (Canonicalized, Extracted)
                | (Extracted, Rendered)
                | (Rendered, Complete)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Received => "RECEIVED",
            PipelineState::FormatDetected => "FORMAT_DETECTED",
            PipelineState::SkippedNonEinvoice => "SKIPPED_NON_EINVOICE",
            PipelineState::Parsed => "PARSED",
            PipelineState::Canonicalized => "CANONICALIZED",
            PipelineState::Extracted => "EXTRACTED",
            PipelineState::Rendered => "RENDERED",
            PipelineState::Complete => "COMPLETE",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Tracks and logs the state of one run.
struct RunTracker {
    id: Uuid,
    state: PipelineState,
}

impl RunTracker {
    fn new(id: Uuid, raw: &RawDocument) -> Self {
        debug!("Run {}: {} ({})", id, PipelineState::Received, raw.path().display());
        Self {
            id,
            state: PipelineState::Received,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        debug!("Run {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    fn fail(
        &mut self,
        stage: Stage,
        format: Option<DetectedFormat>,
        source: impl Into<PipelineError>,
    ) -> StageError {
        let error = StageError::new(stage, format, source);
        debug!("Run {}: {} -> {} ({})", self.id, self.state, PipelineState::Failed, error);
        self.state = PipelineState::Failed;
        error
    }
}

/// Runs documents through detection, parsing, canonicalization, extraction
/// and rendering.
pub struct PipelineOrchestrator {
    detector: FormatDetector,
    digest: DigestAlgorithm,
    embedded: Arc<dyn EmbeddedInvoiceExtractor>,
    transformer: DialectTransformer,
    extractor: KeyFieldExtractor,
    renderer: DocumentRenderer,
    artifact_dir: PathBuf,
}

/// Builder for [`PipelineOrchestrator`].
pub struct PipelineBuilder {
    config: EinvoiceConfig,
    embedded_extractor: Option<Arc<dyn EmbeddedInvoiceExtractor>>,
    transform_engine: Option<Arc<dyn TransformEngine>>,
    query_engine: Option<Arc<dyn QueryEngine>>,
    layout_renderer: Option<Arc<dyn LayoutRenderer>>,
}

impl PipelineBuilder {
    /// Set the embedded-invoice extractor (default: lopdf).
    pub fn with_embedded_extractor(mut self, extractor: Arc<dyn EmbeddedInvoiceExtractor>) -> Self {
        self.embedded_extractor = Some(extractor);
        self
    }

    /// Set the transform engine (default: the configured XSLT command).
    pub fn with_transform_engine(mut self, engine: Arc<dyn TransformEngine>) -> Self {
        self.transform_engine = Some(engine);
        self
    }

    /// Set the query engine (default: [`PathQueryEngine`]).
    pub fn with_query_engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.query_engine = Some(engine);
        self
    }

    /// Set the layout renderer (default: the configured FO command).
    pub fn with_layout_renderer(mut self, renderer: Arc<dyn LayoutRenderer>) -> Self {
        self.layout_renderer = Some(renderer);
        self
    }

    /// Validate the configuration and build the orchestrator.
    pub fn build(self) -> Result<PipelineOrchestrator, ConfigError> {
        self.config.validate()?;
        let digest = self.config.detection.algorithm()?;

        let embedded = self
            .embedded_extractor
            .unwrap_or_else(|| Arc::new(LopdfEmbeddedExtractor::new()));
        let transform_engine = self
            .transform_engine
            .unwrap_or_else(|| default_transform_engine(&self.config.engines.transform));
        let query_engine = self
            .query_engine
            .unwrap_or_else(|| Arc::new(PathQueryEngine::new()));
        let layout_renderer = self
            .layout_renderer
            .unwrap_or_else(|| Arc::new(CommandRenderer::new(self.config.engines.render.clone())));

        let templates = TemplateSet::from(&self.config.templates);
        let artifact_dir = self.config.storage.temp_dir.clone();

        Ok(PipelineOrchestrator {
            detector: FormatDetector::new(embedded.clone()),
            digest,
            embedded,
            renderer: DocumentRenderer::new(transform_engine.clone(), templates.layout.clone(), layout_renderer)
                .with_scratch_dir(&artifact_dir),
            transformer: DialectTransformer::new(transform_engine, templates),
            extractor: KeyFieldExtractor::new(query_engine),
            artifact_dir,
        })
    }
}

fn default_transform_engine(command: &CommandSpec) -> Arc<dyn TransformEngine> {
    Arc::new(CommandTransformEngine::new(command.clone()))
}

impl PipelineOrchestrator {
    /// Start building an orchestrator from `config`.
    pub fn builder(config: &EinvoiceConfig) -> PipelineBuilder {
        PipelineBuilder {
            config: config.clone(),
            embedded_extractor: None,
            transform_engine: None,
            query_engine: None,
            layout_renderer: None,
        }
    }

    /// Orchestrator with the default engine bindings.
    pub fn from_config(config: &EinvoiceConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// Directory rendered artifacts are written to.
    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Process a document under a fresh id.
    pub fn run(&self, raw: &RawDocument) -> Result<PipelineResult, StageError> {
        self.run_with_id(Uuid::new_v4(), raw)
    }

    /// Process a document under a caller-chosen id.
    pub fn run_with_id(&self, id: Uuid, raw: &RawDocument) -> Result<PipelineResult, StageError> {
        let mut run = RunTracker::new(id, raw);

        let format = self
            .detector
            .detect(raw)
            .map_err(|e| run.fail(Stage::Detect, None, e))?;
        if format == DetectedFormat::Invalid {
            return Err(run.fail(Stage::Detect, Some(format), FormatError::Invalid));
        }
        let fingerprint = self
            .detector
            .fingerprint(raw, self.digest)
            .map_err(|e| run.fail(Stage::Detect, Some(format), e))?;
        run.advance(PipelineState::FormatDetected);

        if format == DetectedFormat::PdfPlain {
            run.advance(PipelineState::SkippedNonEinvoice);
            info!("Run {}: {} is not an e-invoice, skipped", id, raw.path().display());
            return Ok(PipelineResult {
                id,
                detected_format: format,
                dialect: XmlDialect::None,
                key_fields: KeyFields::absent(),
                content_fingerprint: fingerprint,
                original_file_path: raw.path().to_path_buf(),
                rendered_artifact_path: None,
                final_state: PipelineState::SkippedNonEinvoice,
            });
        }

        let document = self
            .parse(raw, format)
            .map_err(|e| run.fail(Stage::Parse, Some(format), e))?;
        let dialect = self
            .transformer
            .detect_dialect(&document)
            .map_err(|e| run.fail(Stage::Parse, Some(format), e))?;
        run.advance(PipelineState::Parsed);

        let canonical = self
            .transformer
            .to_canonical(&document, dialect)
            .map_err(|e| run.fail(Stage::Canonicalize, Some(format), e))?;
        run.advance(PipelineState::Canonicalized);

        let key_fields = self
            .extractor
            .extract(&canonical)
            .map_err(|e| run.fail(Stage::Extract, Some(format), e))?;
        run.advance(PipelineState::Extracted);

        let layout = self
            .renderer
            .to_layout(&canonical)
            .map_err(|e| run.fail(Stage::Layout, Some(format), e))?;
        let artifact_path = self.artifact_dir.join(format!("gen_{}.pdf", id));
        let artifact = self
            .renderer
            .render(&layout, &artifact_path)
            .map_err(|e| run.fail(Stage::Render, Some(format), e))?;
        run.advance(PipelineState::Rendered);

        run.advance(PipelineState::Complete);
        info!(
            "Run {}: {} {} {} processed, {} bytes rendered",
            id,
            format,
            dialect,
            key_fields.invoice_reference,
            artifact.bytes.len()
        );

        Ok(PipelineResult {
            id,
            detected_format: format,
            dialect,
            key_fields,
            content_fingerprint: fingerprint,
            original_file_path: raw.path().to_path_buf(),
            rendered_artifact_path: Some(artifact.path),
            final_state: PipelineState::Complete,
        })
    }

    fn parse(&self, raw: &RawDocument, format: DetectedFormat) -> Result<XmlDocument, ParseError> {
        let content = raw.read_all().map_err(ParseError::Read)?;
        let document = match format {
            DetectedFormat::PdfEmbeddedXml => {
                let xml = self.embedded.extract(&content)?;
                XmlDocument::parse_str(&xml)?
            }
            _ => XmlDocument::parse(&content)?,
        };
        Ok(document)
    }
}
