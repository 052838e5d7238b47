//! # Numeric Coercion
//!
//! The invoice registration portal rejects payloads carrying `NaN`, `null`,
//! or string-typed numerics. Every amount and quantity sent upstream is
//! coerced through [`coerce_number`]: missing, unparseable, or non-finite
//! input becomes `0.0`. Silently defaulting to zero is the compliance
//! behaviour, not an error path.

/// Values that can be coerced to a finite `f64` with a zero fallback.
pub trait CoerceNumber {
    /// Coerce to a finite number, or `0.0`.
    fn to_number(&self) -> f64;
}

/// Coerce any supported value to a finite `f64`, defaulting to `0.0`.
pub fn coerce_number<T: CoerceNumber + ?Sized>(value: &T) -> f64 {
    value.to_number()
}

/// Round half away from zero to two decimal places.
///
/// Non-finite input rounds to `0.0`.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 100.0).round() / 100.0;
    // Normalise negative zero so serialized payloads stay byte-stable.
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

impl CoerceNumber for f64 {
    fn to_number(&self) -> f64 {
        finite_or_zero(*self)
    }
}

impl CoerceNumber for i64 {
    fn to_number(&self) -> f64 {
        *self as f64
    }
}

impl CoerceNumber for str {
    fn to_number(&self) -> f64 {
        self.trim().parse::<f64>().map(finite_or_zero).unwrap_or(0.0)
    }
}

impl CoerceNumber for String {
    fn to_number(&self) -> f64 {
        self.as_str().to_number()
    }
}

impl<T: CoerceNumber> CoerceNumber for Option<T> {
    fn to_number(&self) -> f64 {
        self.as_ref().map(CoerceNumber::to_number).unwrap_or(0.0)
    }
}

impl CoerceNumber for serde_json::Value {
    fn to_number(&self) -> f64 {
        match self {
            serde_json::Value::Number(n) => n.as_f64().map(finite_or_zero).unwrap_or(0.0),
            serde_json::Value::String(s) => s.to_number(),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_inputs_coerce_to_zero() {
        assert_eq!(coerce_number(&f64::NAN), 0.0);
        assert_eq!(coerce_number(&f64::INFINITY), 0.0);
        assert_eq!(coerce_number("abc"), 0.0);
        assert_eq!(coerce_number(""), 0.0);
        assert_eq!(coerce_number(&None::<f64>), 0.0);
        assert_eq!(coerce_number(&json!(null)), 0.0);
        assert_eq!(coerce_number(&json!({"a": 1})), 0.0);
    }

    #[test]
    fn valid_inputs_pass_through() {
        assert_eq!(coerce_number(" 12.5 "), 12.5);
        assert_eq!(coerce_number(&Some(3.0)), 3.0);
        assert_eq!(coerce_number(&json!("18")), 18.0);
        assert_eq!(coerce_number(&json!(7)), 7.0);
        assert_eq!(coerce_number(&42_i64), 42.0);
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(1.005_000_1), 1.01);
        assert_eq!(round2(2.344), 2.34);
        assert_eq!(round2(-0.001), 0.0);
        assert!(round2(-0.001).is_sign_positive());
        assert_eq!(round2(f64::NAN), 0.0);
    }
}
