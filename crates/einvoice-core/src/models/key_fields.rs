//! Business key fields extracted from an invoice.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OverrideError;
use crate::extract::sanitize_seller_name;

/// Marker for string fields that could not be extracted.
pub const NOT_FOUND: &str = "Not Found";

/// Identifies one of the five key fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyField {
    SellerName,
    InvoiceReference,
    InvoiceTypeCode,
    IssuedDate,
    TotalAmount,
}

impl KeyField {
    pub const ALL: [KeyField; 5] = [
        KeyField::SellerName,
        KeyField::InvoiceReference,
        KeyField::InvoiceTypeCode,
        KeyField::IssuedDate,
        KeyField::TotalAmount,
    ];
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyField::SellerName => "seller name",
            KeyField::InvoiceReference => "invoice reference",
            KeyField::InvoiceTypeCode => "invoice type code",
            KeyField::IssuedDate => "issue date",
            KeyField::TotalAmount => "total amount",
        };
        f.write_str(name)
    }
}

/// The five key fields of an invoice.
///
/// String fields hold [`NOT_FOUND`] when absent, the others are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFields {
    /// Seller name, sanitized for use as a directory name.
    pub seller_name: String,

    /// Invoice number.
    pub invoice_reference: String,

    /// UNTDID 1001 document type code (380 invoice, 381 credit note, ...).
    pub invoice_type_code: Option<i32>,

    /// Issue date.
    pub issued_date: Option<NaiveDate>,

    /// Total amount including VAT.
    pub total_amount: Option<Decimal>,
}

impl KeyFields {
    /// Key fields with every field absent.
    pub fn absent() -> Self {
        Self {
            seller_name: NOT_FOUND.to_string(),
            invoice_reference: NOT_FOUND.to_string(),
            invoice_type_code: None,
            issued_date: None,
            total_amount: None,
        }
    }

    /// Whether no field carries a value.
    pub fn is_absent(&self) -> bool {
        *self == Self::absent()
    }

    /// Type code with `i32::MIN` standing in for absence.
    pub fn invoice_type_code_or_sentinel(&self) -> i32 {
        self.invoice_type_code.unwrap_or(i32::MIN)
    }

    /// Issue date with `NaiveDate::MIN` standing in for absence.
    pub fn issued_date_or_sentinel(&self) -> NaiveDate {
        self.issued_date.unwrap_or(NaiveDate::MIN)
    }

    /// Total with `-1` standing in for absence.
    pub fn total_amount_or_sentinel(&self) -> Decimal {
        self.total_amount.unwrap_or(Decimal::NEGATIVE_ONE)
    }
}

impl Default for KeyFields {
    fn default() -> Self {
        Self::absent()
    }
}

/// Key field values entered by a user while confirming a staged upload.
///
/// Accepts the loosely typed JSON a form posts: numbers may arrive as strings,
/// amounts may use a decimal comma, dates may be full RFC 3339 timestamps.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFieldOverrides {
    pub invoice_reference: Option<String>,
    pub seller_name: Option<String>,
    pub invoice_type: Option<Value>,
    pub invoice_date: Option<String>,
    pub total_sum: Option<Value>,
}

impl KeyFieldOverrides {
    /// Apply the overrides on top of `current`; unset fields are kept.
    pub fn apply(&self, current: &KeyFields) -> Result<KeyFields, OverrideError> {
        let mut fields = current.clone();

        if let Some(reference) = &self.invoice_reference {
            fields.invoice_reference = reference.clone();
        }
        if let Some(seller) = &self.seller_name {
            fields.seller_name = sanitize_seller_name(seller);
        }
        if let Some(value) = &self.invoice_type {
            fields.invoice_type_code = Some(parse_type_code(value)?);
        }
        if let Some(value) = &self.invoice_date {
            fields.issued_date = Some(parse_user_date(value)?);
        }
        if let Some(value) = &self.total_sum {
            fields.total_amount = Some(parse_user_amount(value)?);
        }

        Ok(fields)
    }
}

fn parse_type_code(value: &Value) -> Result<i32, OverrideError> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<i32>().ok(),
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        _ => None,
    };
    parsed.ok_or_else(|| OverrideError::InvalidTypeCode(value.to_string()))
}

fn parse_user_date(value: &str) -> Result<NaiveDate, OverrideError> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.date_naive());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| OverrideError::InvalidDate(value.to_string()))
}

fn parse_user_amount(value: &Value) -> Result<Decimal, OverrideError> {
    let text = match value {
        Value::String(s) => s.trim().replace(',', "."),
        Value::Number(n) => n.to_string(),
        _ => return Err(OverrideError::InvalidAmount(value.to_string())),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| OverrideError::InvalidAmount(text))
}
