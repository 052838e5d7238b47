//! # Fiscal Year & Invoice Numbering
//!
//! Indian fiscal years run April through March. Invoice numbers carry the
//! fiscal year label and a zero-padded sequence:
//!
//! ```text
//! INV/2024-25/007
//! ```
//!
//! Sequence values come from an atomic counter in the cache service keyed
//! by [`sequence_bucket`]; this module only formats.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Fiscal year identified by the calendar year in which it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FiscalYear {
    start: i32,
}

impl FiscalYear {
    /// Fiscal year that contains `date` (April 1 opens a new year).
    pub fn containing(date: NaiveDate) -> Self {
        let year = date.year();
        let start = if date.month() >= 4 { year } else { year - 1 };
        Self { start }
    }

    /// Calendar year in which this fiscal year starts.
    pub fn start_year(self) -> i32 {
        self.start
    }

    /// Label in `<start>-<end two digits>` form, e.g. `2024-25`.
    pub fn label(self) -> String {
        format!("{}-{:02}", self.start, (self.start + 1).rem_euclid(100))
    }
}

impl std::fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Cache key of the sequence counter for the fiscal year containing `date`.
///
/// The printed number carries only the fiscal year, so the counter must
/// span the whole year for numbers to stay unique.
pub fn sequence_bucket(date: NaiveDate) -> String {
    format!("invoice_seq:{}", FiscalYear::containing(date).label())
}

/// Format an invoice number from its fiscal year and sequence value.
///
/// Sequences wider than three digits are printed in full.
pub fn format_invoice_number(fiscal_year: FiscalYear, sequence: u64) -> String {
    format!("INV/{}/{:03}", fiscal_year.label(), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn april_opens_new_fiscal_year() {
        assert_eq!(FiscalYear::containing(date(2024, 4, 1)).label(), "2024-25");
        assert_eq!(FiscalYear::containing(date(2025, 3, 31)).label(), "2024-25");
        assert_eq!(FiscalYear::containing(date(2025, 1, 15)).start_year(), 2024);
    }

    #[test]
    fn century_rollover_label() {
        assert_eq!(FiscalYear::containing(date(2099, 6, 1)).label(), "2099-00");
    }

    #[test]
    fn invoice_number_is_zero_padded() {
        let fy = FiscalYear::containing(date(2024, 11, 3));
        assert_eq!(format_invoice_number(fy, 7), "INV/2024-25/007");
        assert_eq!(format_invoice_number(fy, 1234), "INV/2024-25/1234");
    }

    #[test]
    fn bucket_spans_the_fiscal_year() {
        assert_eq!(sequence_bucket(date(2024, 4, 1)), "invoice_seq:2024-25");
        assert_eq!(sequence_bucket(date(2024, 11, 3)), "invoice_seq:2024-25");
        assert_eq!(sequence_bucket(date(2025, 3, 31)), "invoice_seq:2024-25");
        assert_eq!(sequence_bucket(date(2025, 4, 1)), "invoice_seq:2025-26");
    }
}
