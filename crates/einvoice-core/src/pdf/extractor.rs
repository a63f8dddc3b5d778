//! Embedded invoice extraction using lopdf.

use lopdf::{Dictionary, Document, Object};
use tracing::{debug, trace};

use super::EmbeddedInvoiceExtractor;
use crate::error::EmbeddedError;

/// Attachment names that carry an invoice (compared case-insensitively).
pub const INVOICE_ATTACHMENT_NAMES: [&str; 4] = [
    "factur-x.xml",
    "zugferd-invoice.xml",
    "zugferd_2p0.xml",
    "xrechnung.xml",
];

/// Finds ZUGFeRD / Factur-X / XRechnung attachments by scanning file
/// specification dictionaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfEmbeddedExtractor;

impl LopdfEmbeddedExtractor {
    pub fn new() -> Self {
        Self
    }

    fn load(&self, data: &[u8]) -> Result<Document, EmbeddedError> {
        let mut doc = Document::load_mem(data).map_err(|e| EmbeddedError::Pdf(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(EmbeddedError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        Ok(doc)
    }

    fn attachment_content(&self, doc: &Document, filespec: &Dictionary) -> Option<Vec<u8>> {
        let ef = filespec.get(b"EF").ok()?;
        let (_, ef) = doc.dereference(ef).ok()?;
        let ef = ef.as_dict().ok()?;

        let file = ef.get(b"UF").or_else(|_| ef.get(b"F")).ok()?;
        match doc.dereference(file).ok()? {
            (_, Object::Stream(stream)) => {
                let data = match stream.decompressed_content() {
                    Ok(d) => d,
                    Err(_) => stream.content.clone(),
                };
                Some(data)
            }
            _ => None,
        }
    }
}

impl EmbeddedInvoiceExtractor for LopdfEmbeddedExtractor {
    fn extract(&self, pdf: &[u8]) -> Result<String, EmbeddedError> {
        let doc = self.load(pdf)?;

        for (id, object) in doc.objects.iter() {
            let Object::Dictionary(dict) = object else {
                continue;
            };
            if !dict.has(b"EF") {
                continue;
            }

            let Some(name) = filespec_name(dict) else {
                continue;
            };
            trace!("Found attachment {:?} in object {:?}", name, id);
            if !is_invoice_attachment(&name) {
                continue;
            }

            let Some(data) = self.attachment_content(&doc, dict) else {
                continue;
            };
            let text = String::from_utf8(data).map_err(|_| EmbeddedError::Encoding)?;
            let text = text.trim_start_matches('\u{feff}');
            if text.trim().is_empty() {
                continue;
            }

            debug!("Extracted embedded invoice {} ({} bytes)", name, text.len());
            return Ok(text.to_string());
        }

        Err(EmbeddedError::NotFound)
    }
}

fn is_invoice_attachment(name: &str) -> bool {
    INVOICE_ATTACHMENT_NAMES
        .iter()
        .any(|n| n.eq_ignore_ascii_case(name))
}

fn filespec_name(dict: &Dictionary) -> Option<String> {
    let name = dict.get(b"UF").or_else(|_| dict.get(b"F")).ok()?;
    match name {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, else PDFDocEncoding).
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}
