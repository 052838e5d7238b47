//! Portal response envelope.
//!
//! Every portal endpoint answers with the same envelope:
//!
//! ```text
//! { "Status": 1 | 0, "Data": {...} | "<json string>", "ErrorDetails": [{ "ErrorCode", "ErrorMessage" }] }
//! ```
//!
//! `Status` arrives as a number or a numeric string depending on the
//! gateway, and `Data` may be an object or a JSON-encoded string. Both forms
//! are accepted here so callers only see typed values.

use serde::Serialize;
use serde_json::Value;

/// Error code the portal uses for an expired or unknown auth token.
pub const INVALID_TOKEN_CODE: &str = "1005";

/// Error code the portal uses when the IRN already exists.
pub const DUPLICATE_IRN_CODE: &str = "2150";

/// One entry of `ErrorDetails`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortalErrorDetail {
    pub code: String,
    pub message: String,
}

/// An authority-level rejection. Not a transport failure: the portal
/// received and evaluated the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortalRejection {
    /// Codes joined with `,`.
    pub error_code: String,
    /// Messages joined with `; `.
    pub error_message: String,
    pub details: Vec<PortalErrorDetail>,
}

impl PortalRejection {
    pub fn from_details(details: Vec<PortalErrorDetail>) -> Self {
        if details.is_empty() {
            return Self {
                error_code: "UNKNOWN".into(),
                error_message: "rejected without error details".into(),
                details,
            };
        }
        let error_code = details
            .iter()
            .map(|d| d.code.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let error_message = details
            .iter()
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            error_code,
            error_message,
            details,
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.details.iter().any(|d| d.code == code)
    }

    /// `code: message` pairs, used in authentication failures.
    pub fn pairs(&self) -> String {
        if self.details.is_empty() {
            return self.error_message.clone();
        }
        self.details
            .iter()
            .map(|d| format!("{}: {}", d.code, d.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Interpreted portal answer.
#[derive(Debug, Clone, PartialEq)]
pub enum PortalOutcome<T> {
    Accepted(T),
    Rejected(PortalRejection),
}

/// A completed portal call: what was sent, what came back, and what it
/// means. Request and response are kept verbatim for the audit log.
#[derive(Debug, Clone)]
pub struct PortalExchange<T> {
    pub endpoint: String,
    pub request: Value,
    pub response: Value,
    pub outcome: PortalOutcome<T>,
}

/// Parsed view over a response envelope.
#[derive(Debug, Clone)]
pub struct Envelope<'a> {
    raw: &'a Value,
}

impl<'a> Envelope<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    /// `Status` as an integer. Missing or unparseable is treated as 0.
    pub fn status(&self) -> i64 {
        match self.raw.get("Status") {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == 1
    }

    /// `Data` as an object, decoding the string form when needed.
    pub fn data(&self) -> Option<Value> {
        match self.raw.get("Data") {
            Some(Value::Object(_)) => self.raw.get("Data").cloned(),
            Some(Value::String(s)) => serde_json::from_str::<Value>(s)
                .ok()
                .filter(Value::is_object),
            _ => None,
        }
    }

    /// `ErrorDetails` entries in order. Codes may arrive as numbers.
    pub fn error_details(&self) -> Vec<PortalErrorDetail> {
        let Some(Value::Array(items)) = self.raw.get("ErrorDetails") else {
            return Vec::new();
        };
        items
            .iter()
            .map(|item| PortalErrorDetail {
                code: scalar_text(item.get("ErrorCode")).unwrap_or_default(),
                message: scalar_text(item.get("ErrorMessage")).unwrap_or_default(),
            })
            .collect()
    }

    pub fn rejection(&self) -> PortalRejection {
        PortalRejection::from_details(self.error_details())
    }
}

/// Read a string or number field as text.
pub(crate) fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a non-empty text field from `Data`.
pub(crate) fn data_text(data: &Value, key: &str) -> Option<String> {
    scalar_text(data.get(key)).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_accepts_number_and_string() {
        assert_eq!(Envelope::new(&json!({"Status": 1})).status(), 1);
        assert_eq!(Envelope::new(&json!({"Status": "1"})).status(), 1);
        assert_eq!(Envelope::new(&json!({"Status": "0"})).status(), 0);
        assert_eq!(Envelope::new(&json!({})).status(), 0);
    }

    #[test]
    fn data_accepts_object_and_encoded_string() {
        let obj = json!({"Status": 1, "Data": {"Irn": "abc"}});
        assert_eq!(Envelope::new(&obj).data().unwrap()["Irn"], "abc");

        let encoded = json!({"Status": 1, "Data": "{\"Irn\":\"abc\",\"AckNo\":112010000000001}"});
        let data = Envelope::new(&encoded).data().unwrap();
        assert_eq!(data_text(&data, "Irn").as_deref(), Some("abc"));
        assert_eq!(data_text(&data, "AckNo").as_deref(), Some("112010000000001"));

        assert!(Envelope::new(&json!({"Data": "not json"})).data().is_none());
    }

    #[test]
    fn rejection_joins_codes_and_messages() {
        let raw = json!({
            "Status": 0,
            "ErrorDetails": [
                {"ErrorCode": "2150", "ErrorMessage": "Duplicate IRN"},
                {"ErrorCode": 2172, "ErrorMessage": "Invalid HSN"}
            ]
        });
        let rejection = Envelope::new(&raw).rejection();
        assert_eq!(rejection.error_code, "2150,2172");
        assert_eq!(rejection.error_message, "Duplicate IRN; Invalid HSN");
        assert!(rejection.has_code(DUPLICATE_IRN_CODE));
        assert_eq!(rejection.pairs(), "2150: Duplicate IRN; 2172: Invalid HSN");
    }

    #[test]
    fn rejection_without_details_is_still_coded() {
        let rejection = Envelope::new(&json!({"Status": 0})).rejection();
        assert_eq!(rejection.error_code, "UNKNOWN");
        assert!(!rejection.error_message.is_empty());
    }
}
