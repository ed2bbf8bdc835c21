//! Common constants and helpers shared by the planning engine.
//!
//! This module collects the numerical tolerances, text normalization and
//! lenient date parsing that every stage of the engine relies on, so the
//! compatibility checker, the packer and the finalizer agree on them.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Tolerance (in percentage points) applied on top of utilization ceilings.
pub const UTILIZATION_TOLERANCE: f64 = 0.1;

/// Physical fill limit in percent above which a container counts as overfilled.
pub const OVERFILL_LIMIT: f64 = 100.0 + UTILIZATION_TOLERANCE;

/// Small slack used when converting fractional capacities into whole units.
///
/// Keeps `(80.0 / 100.0) * 100.0` style round-off from costing a unit.
pub const UNIT_EPSILON: f64 = 1e-9;

/// Slack in kilograms before a total counts as over a weight limit.
///
/// Pro-rated fragment weights (`unit_weight * quantity`) may land a few ulps
/// above a limit the packer filled exactly.
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Whether `total` exceeds `limit` beyond `WEIGHT_EPSILON`.
#[inline]
pub fn exceeds_weight_limit(total: f64, limit: f64) -> bool {
    total > limit + WEIGHT_EPSILON
}

/// Utilization in percent above which a container is reported as overfilled.
///
/// Ceilings above 100 % are capped at the physical limit.
///
/// # Examples
/// ```
/// use load_planner::types::overfill_threshold;
///
/// assert!((overfill_threshold(100.0) - 100.1).abs() < 1e-9);
/// assert!((overfill_threshold(80.0) - 80.1).abs() < 1e-9);
/// assert!((overfill_threshold(120.0) - 100.1).abs() < 1e-9);
/// ```
#[inline]
pub fn overfill_threshold(max_utilization: f64) -> f64 {
    max_utilization.min(100.0) + UTILIZATION_TOLERANCE
}

/// Group bucket name for products without a destination.
pub const UNKNOWN_DESTINATION: &str = "unknown";

/// Normalizes a destination for comparisons (trim + lowercase).
///
/// # Examples
/// ```
/// use load_planner::types::normalize_destination;
///
/// assert_eq!(normalize_destination("  DE "), "de");
/// ```
#[inline]
pub fn normalize_destination(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalizes a restriction / capability tag (trim + lowercase).
#[inline]
pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Parses a calendar date leniently.
///
/// Accepts ISO dates (`2024-05-01`), RFC 3339 timestamps and naive
/// `YYYY-MM-DDTHH:MM:SS` timestamps. Anything else yields `None`, which the
/// engine treats as "no constraint from this field".
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(stamp.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(stamp.date());
        }
    }
    None
}

/// Parses an optional date field.
#[inline]
pub fn parse_optional_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(parse_date)
}

/// Validation functions shared by the model constructors.
pub mod validation {

    /// Validates a required identifier.
    ///
    /// # Parameters
    /// * `value` - The identifier to validate
    /// * `name` - Name of the field for error messages
    pub fn validate_identifier(value: &str, name: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err(format!("{} must not be empty", name));
        }
        Ok(())
    }

    /// Validates a weight that may be zero but never negative.
    pub fn validate_weight(value: f64) -> Result<(), String> {
        if value.is_nan() {
            return Err("Weight must not be NaN".to_string());
        }
        if value.is_infinite() {
            return Err("Weight must not be infinite".to_string());
        }
        if value < 0.0 {
            return Err(format!("Weight must not be negative, got: {}", value));
        }
        Ok(())
    }

    /// Validates a strictly positive, finite value.
    ///
    /// # Parameters
    /// * `value` - The value to validate
    /// * `name` - Name of the field for error messages
    pub fn validate_positive(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates a cost (finite, zero allowed).
    pub fn validate_cost(value: f64) -> Result<(), String> {
        if !value.is_finite() {
            return Err(format!("Cost must be finite, got: {}", value));
        }
        if value < 0.0 {
            return Err(format!("Cost must not be negative, got: {}", value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_destination() {
        assert_eq!(normalize_destination("Hamburg"), "hamburg");
        assert_eq!(normalize_destination("  DE\t"), "de");
        assert_eq!(normalize_destination("   "), "");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(parse_date("2024-05-01"), Some(expected));
        assert_eq!(parse_date(" 2024-05-01 "), Some(expected));
        assert_eq!(parse_date("2024-05-01T08:30:00Z"), Some(expected));
        assert_eq!(parse_date("2024-05-01T08:30:00+02:00"), Some(expected));
        assert_eq!(parse_date("2024-05-01T08:30:00"), Some(expected));
        assert_eq!(parse_date("2024-05-01 08:30:00"), Some(expected));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("soon"), None);
        assert_eq!(parse_date("2024-13-40"), None);
        assert_eq!(parse_optional_date(None), None);
    }

    #[test]
    fn test_overfill_limit() {
        assert!((OVERFILL_LIMIT - 100.1).abs() < 1e-12);
    }

    #[test]
    fn test_validation_weight() {
        assert!(validation::validate_weight(10.0).is_ok());
        assert!(validation::validate_weight(0.0).is_ok());
        assert!(validation::validate_weight(-1.0).is_err());
        assert!(validation::validate_weight(f64::NAN).is_err());
        assert!(validation::validate_weight(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validation_positive_and_cost() {
        assert!(validation::validate_positive(1.0, "Limit").is_ok());
        assert!(validation::validate_positive(0.0, "Limit").is_err());
        assert!(validation::validate_cost(0.0).is_ok());
        assert!(validation::validate_cost(-5.0).is_err());
        assert!(validation::validate_cost(f64::NAN).is_err());
    }

    #[test]
    fn test_validation_identifier() {
        assert!(validation::validate_identifier("p-1", "Product id").is_ok());
        assert!(validation::validate_identifier("  ", "Product id").is_err());
    }
}
