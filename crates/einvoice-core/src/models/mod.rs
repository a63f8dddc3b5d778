//! Data models shared by the pipeline stages.

pub mod config;
pub mod document;
pub mod key_fields;
pub mod result;

pub use config::EinvoiceConfig;
pub use document::{DetectedFormat, RawDocument, XmlDialect};
pub use key_fields::{KeyField, KeyFieldOverrides, KeyFields};
pub use result::PipelineResult;
