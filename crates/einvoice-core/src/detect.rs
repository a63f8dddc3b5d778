//! Container format detection and content fingerprinting.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;
use std::sync::Arc;

use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use tracing::debug;

use crate::error::{ConfigError, FormatError};
use crate::models::document::{DetectedFormat, RawDocument};
use crate::pdf::EmbeddedInvoiceExtractor;

const XML_MAGIC: &[u8; 4] = b"<?xm";
const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Digest used for content fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha224 => "SHA-224",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ConfigError;

    /// Accepts `SHA-256`, `sha256` and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "SHA224" => Ok(DigestAlgorithm::Sha224),
            "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA384" => Ok(DigestAlgorithm::Sha384),
            "SHA512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(ConfigError::UnsupportedDigest(s.to_string())),
        }
    }
}

/// Classifies input documents by their leading bytes.
pub struct FormatDetector {
    embedded: Arc<dyn EmbeddedInvoiceExtractor>,
}

impl FormatDetector {
    /// Create a detector that inspects PDFs with the given extractor.
    pub fn new(embedded: Arc<dyn EmbeddedInvoiceExtractor>) -> Self {
        Self { embedded }
    }

    /// Classify a document. The content type hint and file name are ignored.
    pub fn detect(&self, raw: &RawDocument) -> Result<DetectedFormat, FormatError> {
        let mut header = Vec::with_capacity(4);
        raw.open()?.take(4).read_to_end(&mut header)?;

        let format = if header.as_slice() == XML_MAGIC {
            DetectedFormat::Xml
        } else if header.as_slice() == PDF_MAGIC {
            let content = raw.read_all()?;
            if self.embedded.can_extract(&content) {
                DetectedFormat::PdfEmbeddedXml
            } else {
                DetectedFormat::PdfPlain
            }
        } else {
            DetectedFormat::Invalid
        };

        debug!(
            "Detected {} for {} (declared {})",
            format,
            raw.path().display(),
            raw.content_type().unwrap_or("nothing")
        );
        Ok(format)
    }

    /// Fingerprint of the whole document.
    pub fn fingerprint(&self, raw: &RawDocument, algorithm: DigestAlgorithm) -> Result<String, FormatError> {
        fingerprint(raw, algorithm)
    }
}

/// Lowercase hex digest of the document, streamed from disk.
pub fn fingerprint(raw: &RawDocument, algorithm: DigestAlgorithm) -> Result<String, FormatError> {
    let file = raw.open()?;
    let digest = match algorithm {
        DigestAlgorithm::Sha224 => digest_reader::<Sha224>(file)?,
        DigestAlgorithm::Sha256 => digest_reader::<Sha256>(file)?,
        DigestAlgorithm::Sha384 => digest_reader::<Sha384>(file)?,
        DigestAlgorithm::Sha512 => digest_reader::<Sha512>(file)?,
    };
    Ok(digest)
}

fn digest_reader<D: Digest + io::Write>(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
