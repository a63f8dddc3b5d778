//! Input document and classification types.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// An input document as handed to the pipeline.
///
/// The declared content type is kept for logging only; classification always
/// looks at the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    path: PathBuf,
    content_type: Option<String>,
}

impl RawDocument {
    /// Create a document backed by a file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content_type: None,
        }
    }

    /// Attach the content type declared by the uploader.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// File extension including the leading dot, or an empty string.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default()
    }

    /// Open the underlying file for streaming reads.
    pub fn open(&self) -> std::io::Result<File> {
        File::open(&self.path)
    }

    /// Read the whole document into memory.
    pub fn read_all(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

/// Container format, derived from content only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectedFormat {
    /// Plain XML document.
    Xml,
    /// PDF without an embedded invoice.
    PdfPlain,
    /// PDF carrying an XML invoice attachment (ZUGFeRD / Factur-X).
    PdfEmbeddedXml,
    /// Neither XML nor PDF.
    Invalid,
}

impl DetectedFormat {
    /// Whether this format carries structured invoice content.
    pub fn is_einvoice(&self) -> bool {
        matches!(self, DetectedFormat::Xml | DetectedFormat::PdfEmbeddedXml)
    }
}

impl fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectedFormat::Xml => "XML",
            DetectedFormat::PdfPlain => "PDF_PLAIN",
            DetectedFormat::PdfEmbeddedXml => "PDF_EMBEDDED_XML",
            DetectedFormat::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}

/// XML invoice dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum XmlDialect {
    /// UBL 2.1 Invoice.
    UblInvoice,
    /// UBL 2.1 CreditNote.
    UblCreditNote,
    /// UN/CEFACT Cross Industry Invoice.
    Cii,
    /// XML of some other kind.
    Unknown,
    /// No XML content (plain PDF).
    None,
}

impl fmt::Display for XmlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            XmlDialect::UblInvoice => "UBL_INVOICE",
            XmlDialect::UblCreditNote => "UBL_CREDIT_NOTE",
            XmlDialect::Cii => "CII",
            XmlDialect::Unknown => "UNKNOWN",
            XmlDialect::None => "NONE",
        };
        f.write_str(name)
    }
}
