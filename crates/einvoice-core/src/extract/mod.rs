//! Key field extraction from canonical invoice documents.
//!
//! Each field is queried independently. A missing or unparsable field is
//! logged and left absent; only a failing query engine aborts extraction.

mod sanitize;

pub use sanitize::{sanitize_reference, sanitize_seller_name};

use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::models::key_fields::{KeyField, KeyFields};
use crate::query::QueryEngine;
use crate::transform::CANONICAL_NAMESPACE;
use crate::xml::XmlDocument;

/// Prefix bound to the canonical namespace in field expressions.
pub const CANONICAL_PREFIX: &str = "xr";

/// Path expression locating `field` in a canonical document.
pub fn field_expression(field: KeyField) -> &'static str {
    match field {
        KeyField::SellerName => "//xr:Seller_name",
        KeyField::InvoiceReference => "//xr:invoice/xr:Invoice_number",
        KeyField::InvoiceTypeCode => "//xr:invoice/xr:Invoice_type_code",
        KeyField::IssuedDate => "//xr:invoice/xr:Invoice_issue_date",
        KeyField::TotalAmount => "//xr:Invoice_total_amount_with_VAT",
    }
}

/// Pulls [`KeyFields`] out of canonical documents.
pub struct KeyFieldExtractor {
    engine: Arc<dyn QueryEngine>,
}

impl KeyFieldExtractor {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    /// Extract all five fields.
    pub fn extract(&self, canonical: &XmlDocument) -> Result<KeyFields, ExtractionError> {
        let mut fields = KeyFields::absent();

        if let Some(seller) = self.field(canonical, KeyField::SellerName, |v| Ok(v.to_string()))? {
            fields.seller_name = sanitize_seller_name(&seller);
        }
        if let Some(reference) = self.field(canonical, KeyField::InvoiceReference, |v| Ok(v.to_string()))? {
            fields.invoice_reference = reference;
        }
        fields.invoice_type_code = self.field(canonical, KeyField::InvoiceTypeCode, |v| {
            v.parse::<i32>().map_err(|e| e.to_string())
        })?;
        fields.issued_date = self.field(canonical, KeyField::IssuedDate, |v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d").map_err(|e| e.to_string())
        })?;
        fields.total_amount = self.field(canonical, KeyField::TotalAmount, |v| {
            Decimal::from_str(v).map_err(|e| e.to_string())
        })?;

        debug!("Extracted key fields: {:?}", fields);
        Ok(fields)
    }

    /// Query one field, resolving field-level failures to `None`.
    fn field<T>(
        &self,
        document: &XmlDocument,
        field: KeyField,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<Option<T>, ExtractionError> {
        match self.query(document, field, parse) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Key field not extracted: {}", e);
                Ok(None)
            }
        }
    }

    fn query<T>(
        &self,
        document: &XmlDocument,
        field: KeyField,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<T, ExtractionError> {
        let value = self
            .engine
            .evaluate(
                document,
                field_expression(field),
                &[(CANONICAL_PREFIX, CANONICAL_NAMESPACE)],
            )
            .map_err(|source| ExtractionError::Query { field, source })?
            .filter(|v| !v.is_empty())
            .ok_or(ExtractionError::Missing { field })?;

        parse(&value).map_err(|reason| ExtractionError::Invalid {
            field,
            value,
            reason,
        })
    }
}
