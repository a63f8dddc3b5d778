//! Core library for e-invoice ingestion.
//!
//! This crate provides:
//! - Format detection (XML, plain PDF, PDF with embedded invoice) and content fingerprints
//! - Dialect detection and transformation of UBL / CII invoices into a canonical schema
//! - Key field extraction (seller, reference, type code, issue date, total)
//! - Rendering of canonical invoices into printable documents
//! - A staged pipeline orchestrator, a bounded result cache and the archive layout

pub mod archive;
pub mod cache;
pub mod command;
pub mod detect;
pub mod error;
pub mod extract;
pub mod models;
pub mod pdf;
pub mod pipeline;
pub mod query;
pub mod render;
pub mod staging;
pub mod transform;
pub mod xml;

pub use archive::{ArchiveLayout, ArchivedPaths};
pub use cache::{InvoiceCache, RemovalCause, RemovalListener, ResultCache, StagedFileCleanup};
pub use detect::{DigestAlgorithm, FormatDetector};
pub use error::{EinvoiceError, ErrorCode, Result, StageError};
pub use extract::{sanitize_reference, sanitize_seller_name, KeyFieldExtractor};
pub use models::{
    DetectedFormat, EinvoiceConfig, KeyField, KeyFieldOverrides, KeyFields, PipelineResult, RawDocument,
    XmlDialect,
};
pub use pdf::{EmbeddedInvoiceExtractor, LopdfEmbeddedExtractor};
pub use pipeline::{PipelineBuilder, PipelineOrchestrator, PipelineState, Stage};
pub use query::{PathQueryEngine, QueryEngine};
pub use render::{CommandRenderer, DocumentRenderer, LayoutRenderer, RenderedArtifact};
pub use staging::StagingService;
pub use transform::{
    CommandTransformEngine, DialectTransformer, Executable, TemplateRef, TemplateSet, TransformEngine,
};
pub use xml::XmlDocument;
