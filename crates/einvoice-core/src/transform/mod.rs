//! Dialect detection and transformation into the canonical invoice schema.

mod command;

pub use command::CommandTransformEngine;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{DialectError, ParseError, PipelineError, TransformEngineError, TransformationError};
use crate::models::config::TemplateConfig;
use crate::models::document::XmlDialect;
use crate::xml::XmlDocument;

/// UBL 2.1 Invoice namespace.
pub const UBL_INVOICE_NAMESPACE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";

/// UBL 2.1 CreditNote namespace.
pub const UBL_CREDIT_NOTE_NAMESPACE: &str = "urn:oasis:names:specification:ubl:schema:xsd:CreditNote-2";

/// UN/CEFACT Cross Industry Invoice namespace.
pub const CII_NAMESPACE: &str = "urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100";

/// Namespace of the canonical intermediate document.
pub const CANONICAL_NAMESPACE: &str = "urn:ce.eu:en16931:2017:xoev-de:kosit:standard:xrechnung-1";

/// Location of a transform template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateRef(PathBuf);

impl TemplateRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A transform engine binding (XSLT processor or equivalent).
pub trait TransformEngine: Send + Sync {
    /// Load and compile a template.
    fn compile(&self, template: &TemplateRef) -> Result<Box<dyn Executable>, TransformEngineError>;
}

/// A compiled template.
pub trait Executable: Send {
    /// Apply the template to a document.
    fn apply(&self, input: &XmlDocument) -> Result<XmlDocument, TransformEngineError>;
}

/// Templates for every supported dialect plus the layout template.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub ubl_invoice: TemplateRef,
    pub ubl_credit_note: TemplateRef,
    pub cii: TemplateRef,
    pub layout: TemplateRef,
}

impl TemplateSet {
    /// Template mapping `dialect` to the canonical schema.
    pub fn for_dialect(&self, dialect: XmlDialect) -> Option<&TemplateRef> {
        match dialect {
            XmlDialect::UblInvoice => Some(&self.ubl_invoice),
            XmlDialect::UblCreditNote => Some(&self.ubl_credit_note),
            XmlDialect::Cii => Some(&self.cii),
            XmlDialect::Unknown | XmlDialect::None => None,
        }
    }
}

impl From<&TemplateConfig> for TemplateSet {
    fn from(config: &TemplateConfig) -> Self {
        Self {
            ubl_invoice: TemplateRef::new(&config.ubl_invoice),
            ubl_credit_note: TemplateRef::new(&config.ubl_credit_note),
            cii: TemplateRef::new(&config.cii),
            layout: TemplateRef::new(&config.layout),
        }
    }
}

/// Classify a document by the expanded name of its root element.
pub fn detect_dialect(document: &XmlDocument) -> Result<XmlDialect, ParseError> {
    let root = document.root_element().ok_or(ParseError::MissingRoot)?;

    let dialect = if root.is(UBL_INVOICE_NAMESPACE, "Invoice") {
        XmlDialect::UblInvoice
    } else if root.is(UBL_CREDIT_NOTE_NAMESPACE, "CreditNote") {
        XmlDialect::UblCreditNote
    } else if root.is(CII_NAMESPACE, "CrossIndustryInvoice") {
        XmlDialect::Cii
    } else {
        debug!(
            "Unrecognized root element {} in namespace {:?}",
            root.local_name, root.namespace
        );
        XmlDialect::Unknown
    };

    Ok(dialect)
}

/// Maps supported dialects onto the canonical schema.
pub struct DialectTransformer {
    engine: Arc<dyn TransformEngine>,
    templates: TemplateSet,
}

impl DialectTransformer {
    pub fn new(engine: Arc<dyn TransformEngine>, templates: TemplateSet) -> Self {
        Self { engine, templates }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// See [`detect_dialect`].
    pub fn detect_dialect(&self, document: &XmlDocument) -> Result<XmlDialect, ParseError> {
        detect_dialect(document)
    }

    /// Transform `document` into the canonical schema. The engine output is
    /// returned as is.
    pub fn to_canonical(&self, document: &XmlDocument, dialect: XmlDialect) -> Result<XmlDocument, PipelineError> {
        let template = self
            .templates
            .for_dialect(dialect)
            .ok_or(DialectError::Unsupported(dialect))?;

        debug!("Transforming {} with {}", dialect, template);
        let canonical = self
            .engine
            .compile(template)
            .and_then(|executable| executable.apply(document))
            .map_err(|source| TransformationError {
                dialect,
                template: template.clone(),
                source,
            })?;

        Ok(canonical)
    }
}
