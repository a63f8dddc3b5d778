//! Error types for the einvoice-core library.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::models::document::{DetectedFormat, XmlDialect};
use crate::models::key_fields::KeyField;
use crate::pipeline::Stage;
use crate::transform::TemplateRef;

/// Main error type for the einvoice library.
#[derive(Error, Debug)]
pub enum EinvoiceError {
    /// A pipeline run failed at one of its stages.
    #[error("pipeline error: {0}")]
    Stage(#[from] StageError),

    /// Upload staging or confirmation failed.
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while classifying the input container.
#[derive(Error, Debug)]
pub enum FormatError {
    /// The header (or the content, while fingerprinting) could not be read.
    #[error("failed to read file header: {0}")]
    Unreadable(#[from] std::io::Error),

    /// The content is neither XML nor PDF.
    #[error("file can not be interpreted as PDF or XML")]
    Invalid,
}

/// Errors raised while turning input bytes into an XML document.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The XML file could not be read.
    #[error("unable to read XML content: {0}")]
    Read(#[source] std::io::Error),

    /// The embedded invoice could not be pulled out of the PDF.
    #[error("unable to extract embedded invoice: {0}")]
    Embedded(#[from] EmbeddedError),

    /// The XML content is malformed.
    #[error("unable to parse XML content: {0}")]
    Xml(#[from] XmlError),

    /// The document has no root element.
    #[error("the provided XML does not have a root element")]
    MissingRoot,
}

/// The document is XML but not one of the supported invoice dialects.
#[derive(Error, Debug)]
pub enum DialectError {
    #[error("unsupported invoice format: {0}")]
    Unsupported(XmlDialect),
}

/// A dialect-to-canonical transform failed.
#[derive(Error, Debug)]
#[error("transformation of {dialect} with {template} failed: {source}")]
pub struct TransformationError {
    pub dialect: XmlDialect,
    pub template: TemplateRef,
    #[source]
    pub source: TransformEngineError,
}

/// Errors reported by a transform engine binding.
#[derive(Error, Debug)]
pub enum TransformEngineError {
    /// The template could not be loaded or compiled.
    #[error("failed to compile template {template}: {reason}")]
    Compile { template: String, reason: String },

    /// The transform ran but failed.
    #[error("transform failed: {0}")]
    Runtime(String),

    /// I/O while staging input or reading output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transform produced something that is not XML.
    #[error("transform output is not XML: {0}")]
    Output(#[from] XmlError),
}

/// Errors related to key field extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The queried node does not exist or is empty.
    #[error("{field} not found")]
    Missing { field: KeyField },

    /// The node exists but its value could not be parsed.
    #[error("invalid {field} value {value:?}: {reason}")]
    Invalid {
        field: KeyField,
        value: String,
        reason: String,
    },

    /// The query engine rejected the expression itself.
    #[error("query for {field} failed: {source}")]
    Query {
        field: KeyField,
        #[source]
        source: QueryError,
    },
}

impl ExtractionError {
    /// Field-level failures are recovered; query engine failures are not.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractionError::Query { .. })
    }
}

/// Errors related to layout transformation and binary rendering.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The canonical to layout transform failed.
    #[error("layout transform with {template} failed: {source}")]
    Layout {
        template: TemplateRef,
        #[source]
        source: TransformEngineError,
    },

    /// The layout document could not be serialized.
    #[error("failed to serialize layout document: {0}")]
    Serialize(#[from] XmlError),

    /// The rendering engine reported a failure.
    #[error("rendering engine failed: {0}")]
    Engine(String),

    /// I/O error around the intermediate or output file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The rendering engine finished but wrote nothing.
    #[error("rendering produced an empty artifact at {0}")]
    EmptyOutput(PathBuf),
}

/// XML reading and writing errors.
#[derive(Error, Debug)]
pub enum XmlError {
    /// The reader rejected the input.
    #[error("malformed XML: {0}")]
    Malformed(String),

    /// An element uses a prefix without a namespace declaration.
    #[error("unbound namespace prefix on element {0}")]
    UnboundPrefix(String),

    /// Input ended before all elements were closed.
    #[error("unclosed element {0}")]
    Unclosed(String),

    /// A closing tag without a matching opening tag.
    #[error("unexpected closing tag {0}")]
    UnexpectedEnd(String),

    /// Writing the document failed.
    #[error("failed to write XML: {0}")]
    Write(String),
}

/// Query engine errors. These indicate a broken expression, not missing data.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid expression {expression:?}: {reason}")]
    Syntax { expression: String, reason: String },

    #[error("prefix {0:?} is not bound to a namespace")]
    UnboundPrefix(String),
}

/// Errors from the embedded-invoice extractor.
#[derive(Error, Debug)]
pub enum EmbeddedError {
    /// The PDF could not be loaded.
    #[error("failed to parse PDF: {0}")]
    Pdf(String),

    /// The PDF is encrypted with a non-empty password.
    #[error("PDF is encrypted")]
    Encrypted,

    /// No invoice attachment was found.
    #[error("PDF has no embedded invoice")]
    NotFound,

    /// The attachment is not valid UTF-8 text.
    #[error("embedded invoice is not valid UTF-8")]
    Encoding,
}

/// Failure to release a cache entry's backing files. Logged, never propagated.
#[derive(Error, Debug)]
pub enum CacheCleanupError {
    #[error("failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} cleanup failures", .0.len())]
    Multiple(Vec<CacheCleanupError>),
}

/// Configuration errors. These are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigest(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Invalid user-supplied key field values.
#[derive(Error, Debug)]
pub enum OverrideError {
    #[error("invalid date format for 'invoiceDate': {0}")]
    InvalidDate(String),

    #[error("invalid format for 'totalSum': {0}")]
    InvalidAmount(String),

    #[error("invalid format for 'invoiceType': {0}")]
    InvalidTypeCode(String),
}

/// Errors of the upload / confirm flow.
#[derive(Error, Debug)]
pub enum StagingError {
    /// The upload could not be written to the staging directory.
    #[error("failed to stage upload: {0}")]
    Upload(#[source] std::io::Error),

    /// The pipeline rejected the upload.
    #[error(transparent)]
    Pipeline(#[from] StageError),

    /// The id is unknown or its entry has expired.
    #[error("invoice {0} is not staged, upload the file again")]
    NotStaged(Uuid),

    /// The user-supplied overrides are malformed.
    #[error("invalid key field override: {0}")]
    Override(#[from] OverrideError),

    /// Copying into the archive failed.
    #[error("failed to archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Any failure of a pipeline stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Dialect(#[from] DialectError),

    #[error(transparent)]
    Transformation(#[from] TransformationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// A failed pipeline run, tagged with the stage that failed.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: Stage,
    /// Container format, when detection got that far.
    pub format: Option<DetectedFormat>,
    #[source]
    pub source: PipelineError,
}

impl StageError {
    pub fn new(stage: Stage, format: Option<DetectedFormat>, source: impl Into<PipelineError>) -> Self {
        Self {
            stage,
            format,
            source: source.into(),
        }
    }

    /// Innermost error of the source chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut cause: &(dyn StdError + 'static) = self;
        while let Some(next) = cause.source() {
            cause = next;
        }
        cause
    }

    /// User-facing error code for this failure.
    pub fn error_code(&self) -> ErrorCode {
        let embedded = self.format == Some(DetectedFormat::PdfEmbeddedXml);
        match &self.source {
            PipelineError::Format(FormatError::Invalid) => ErrorCode::Err001,
            PipelineError::Format(FormatError::Unreadable(_)) => ErrorCode::Err005,
            PipelineError::Parse(ParseError::Read(_)) => ErrorCode::Err005,
            PipelineError::Parse(_) | PipelineError::Dialect(_) if embedded => ErrorCode::Err002,
            PipelineError::Parse(_) | PipelineError::Dialect(_) => ErrorCode::Err003,
            PipelineError::Transformation(_)
            | PipelineError::Extraction(_)
            | PipelineError::Render(_) => ErrorCode::Err004,
        }
    }
}

/// Stable error codes shown to end users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorCode {
    Err001,
    Err002,
    Err003,
    Err004,
    Err005,
}

impl ErrorCode {
    /// Code as shown to users, e.g. `ERR001`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::Err001 => "ERR001",
            ErrorCode::Err002 => "ERR002",
            ErrorCode::Err003 => "ERR003",
            ErrorCode::Err004 => "ERR004",
            ErrorCode::Err005 => "ERR005",
        }
    }

    /// Message in the given language (`de`), English otherwise.
    pub fn message(&self, lang: &str) -> &'static str {
        if lang.eq_ignore_ascii_case("de") {
            match self {
                ErrorCode::Err001 => "Dateiformat ist ungültig, muss PDF oder XML sein.",
                ErrorCode::Err002 => "PDF enthält eingebettetes XML, aber das XML entspricht nicht EN16931. Es ist keine gültige E-Rechnung.",
                ErrorCode::Err003 => "XML entspricht nicht EN16931. Es ist keine gültige E-Rechnung.",
                ErrorCode::Err004 => "Interner Serverfehler. Bitte erneut versuchen und bei anhaltenden Problemen den Administrator kontaktieren.",
                ErrorCode::Err005 => "Datei ist beschädigt.",
            }
        } else {
            match self {
                ErrorCode::Err001 => "File format is invalid, must be PDF or XML.",
                ErrorCode::Err002 => "PDF contains embedded XML, but the XML is not compliant to EN16931. It is not a valid e-invoice.",
                ErrorCode::Err003 => "XML is not compliant to EN16931. It is not a valid e-invoice.",
                ErrorCode::Err004 => "Internal server error. Please retry and contact the admin if the issue persists.",
                ErrorCode::Err005 => "File is corrupted.",
            }
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Result type for the einvoice library.
pub type Result<T> = std::result::Result<T, EinvoiceError>;
