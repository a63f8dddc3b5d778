//! PDF attachment handling.

mod extractor;

pub use extractor::{LopdfEmbeddedExtractor, INVOICE_ATTACHMENT_NAMES};

use crate::error::EmbeddedError;

/// Pulls an embedded XML invoice out of a PDF container.
pub trait EmbeddedInvoiceExtractor: Send + Sync {
    /// Whether the PDF carries an invoice attachment.
    fn can_extract(&self, pdf: &[u8]) -> bool {
        self.extract(pdf).is_ok()
    }

    /// Extract the invoice attachment as text.
    fn extract(&self, pdf: &[u8]) -> Result<String, EmbeddedError>;
}

/// Build a one-page PDF, optionally with a named attachment.
#[cfg(test)]
pub(crate) fn build_test_pdf(attachment: Option<(&str, &[u8])>) -> Vec<u8> {
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };

    if let Some((name, content)) = attachment {
        let file_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "EmbeddedFile" },
            content.to_vec(),
        ));
        let filespec_id = doc.add_object(dictionary! {
            "Type" => "Filespec",
            "F" => Object::string_literal(name),
            "UF" => Object::string_literal(name),
            "EF" => dictionary! { "F" => file_id },
        });
        catalog.set(
            "Names",
            dictionary! {
                "EmbeddedFiles" => dictionary! {
                    "Names" => vec![Object::string_literal(name), filespec_id.into()],
                },
            },
        );
    }

    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
