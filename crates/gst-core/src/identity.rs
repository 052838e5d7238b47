//! # Identifier Newtypes
//!
//! Invoices and customers are keyed by the relational store's numeric
//! identifiers. Newtypes keep an invoice id from being passed where a
//! customer id is expected.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Numeric identifier of an invoice row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub i64);

/// Numeric identifier of a customer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub i64);

impl InvoiceId {
    /// Access the raw row id.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl CustomerId {
    /// Access the raw row id.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Two-digit GST state code (e.g. `"27"` for Maharashtra).
///
/// GSTINs begin with the registrant's state code, so the first two
/// characters of a GSTIN are a valid source as well. Single-digit input
/// (`"9"`, as stored by some integer columns) is left-padded to `"09"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateCode(String);

impl StateCode {
    /// Parse a state code, taking the first two characters of the trimmed
    /// input.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidStateCode`] when the prefix is not
    /// numeric or the input is blank.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let prefix: String = trimmed.chars().take(2).collect();
        match prefix.len() {
            1 if prefix.chars().all(|c| c.is_ascii_digit()) => Ok(Self(format!("0{prefix}"))),
            2 if prefix.chars().all(|c| c.is_ascii_digit()) => Ok(Self(prefix)),
            _ => Err(ValidationError::InvalidStateCode(raw.to_string())),
        }
    }

    /// Derive the state code from a GSTIN's leading digits.
    pub fn from_gstin(gstin: &str) -> Option<Self> {
        let trimmed = gstin.trim();
        if trimmed.len() < 2 {
            return None;
        }
        Self::parse(trimmed).ok()
    }

    /// Access the two-digit code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_code_takes_two_character_prefix() {
        assert_eq!(StateCode::parse("27").unwrap().as_str(), "27");
        assert_eq!(StateCode::parse("27-Maharashtra").unwrap().as_str(), "27");
        assert_eq!(StateCode::parse(" 09 ").unwrap().as_str(), "09");
    }

    #[test]
    fn single_digit_state_code_is_padded() {
        assert_eq!(StateCode::parse("9").unwrap().as_str(), "09");
    }

    #[test]
    fn non_numeric_state_code_rejected() {
        assert!(StateCode::parse("MH").is_err());
        assert!(StateCode::parse("").is_err());
    }

    #[test]
    fn state_code_from_gstin() {
        let code = StateCode::from_gstin("27AAPFU0939F1ZV").unwrap();
        assert_eq!(code.as_str(), "27");
        assert!(StateCode::from_gstin("URP").is_none());
        assert!(StateCode::from_gstin("").is_none());
    }
}
