//! Validation module for vehicle and customer field shapes
//!
//! Vision models are asked for fixed-shape values, but nothing guarantees they
//! comply. This module provides reusable checks and normalisers for:
//!
//! - VINs (17 alphanumeric characters)
//! - National ID numbers (10 digits starting with 1 or 2)
//! - Model years (4 digits in a plausible range)
//! - Mobile numbers (`05` followed by 8 digits)
//!
//! Checks return an error key rather than a message so callers can localise it.

use chrono::Datelike;
use lazy_static::lazy_static;
use regex::Regex;

use crate::extraction::ExtractionResult;

pub const VIN_LENGTH: usize = 17;
pub const MIN_MODEL_YEAR: i32 = 1950;

lazy_static! {
    static ref ID_NUMBER_PATTERN: Regex =
        Regex::new(r"^[12][0-9]{9}$").expect("Invalid ID number regex pattern");
    static ref PHONE_PATTERN: Regex =
        Regex::new(r"^05[0-9]{8}$").expect("Invalid phone regex pattern");
    static ref YEAR_PATTERN: Regex = Regex::new(r"^[0-9]{4}$").expect("Invalid year regex pattern");
}

/// Upper-case a VIN and drop everything that is not A-Z or 0-9, keeping at most 17 characters
///
/// # Examples
/// ```
/// use repair_scan::validation::normalize_vin;
///
/// assert_eq!(normalize_vin("jhm-cm5 6557c404453"), "JHMCM56557C404453");
/// ```
pub fn normalize_vin(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .take(VIN_LENGTH)
        .collect()
}

/// Keep ASCII digits only
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Validates a VIN
///
/// # Returns
/// * `Ok(&str)` - The trimmed VIN if valid
/// * `Err(&str)` - Error type: "vin-length" or "vin-characters"
///
/// # Examples
/// ```
/// use repair_scan::validation::validate_vin;
///
/// assert!(validate_vin("JHMCM56557C404453").is_ok());
/// assert_eq!(validate_vin("JHMCM565"), Err("vin-length"));
/// ```
pub fn validate_vin(vin: &str) -> Result<&str, &'static str> {
    let trimmed = vin.trim();
    if trimmed.chars().count() != VIN_LENGTH {
        return Err("vin-length");
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("vin-characters");
    }
    Ok(trimmed)
}

/// Validates a national ID number (citizen IDs start with 1, residents with 2)
///
/// # Examples
/// ```
/// use repair_scan::validation::validate_id_number;
///
/// assert!(validate_id_number("1012345678").is_ok());
/// assert_eq!(validate_id_number("3012345678"), Err("id-format"));
/// ```
pub fn validate_id_number(id: &str) -> Result<&str, &'static str> {
    let trimmed = id.trim();
    if ID_NUMBER_PATTERN.is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err("id-format")
    }
}

/// Validates a 4-digit model year between 1950 and next year
pub fn validate_year(year: &str) -> Result<i32, &'static str> {
    let trimmed = year.trim();
    if !YEAR_PATTERN.is_match(trimmed) {
        return Err("year-format");
    }
    let value: i32 = trimmed.parse().map_err(|_| "year-format")?;
    let latest = chrono::Utc::now().year() + 1;
    if !(MIN_MODEL_YEAR..=latest).contains(&value) {
        return Err("year-range");
    }
    Ok(value)
}

/// Validates a local mobile number
pub fn validate_phone(phone: &str) -> Result<&str, &'static str> {
    let trimmed = phone.trim();
    if PHONE_PATTERN.is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err("phone-format")
    }
}

/// A field of an extraction result whose shape does not match expectations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWarning {
    pub field: &'static str,
    pub error: &'static str,
}

/// Shape problems in an extraction result. Advisory: values are still merged.
pub fn field_warnings(result: &ExtractionResult) -> Vec<FieldWarning> {
    let mut warnings = Vec::new();
    if let Some(vin) = result.vin.as_deref() {
        if let Err(error) = validate_vin(vin) {
            warnings.push(FieldWarning { field: "vin", error });
        }
    }
    if let Some(id) = result.id_number.as_deref() {
        if let Err(error) = validate_id_number(id) {
            warnings.push(FieldWarning {
                field: "idNumber",
                error,
            });
        }
    }
    if let Some(year) = result.year.as_deref() {
        if let Err(error) = validate_year(year) {
            warnings.push(FieldWarning {
                field: "year",
                error,
            });
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vin_rules() {
        assert_eq!(validate_vin(" 1ABCD23456789EFGH "), Ok("1ABCD23456789EFGH"));
        assert_eq!(validate_vin("1ABCD23456789EFG"), Err("vin-length"));
        assert_eq!(validate_vin("1ABCD23456789EF-H"), Err("vin-characters"));
        assert_eq!(normalize_vin("1abcd23456789efghXYZ"), "1ABCD23456789EFGH");
    }

    #[test]
    fn test_id_and_phone() {
        assert!(validate_id_number("2123456789").is_ok());
        assert_eq!(validate_id_number("212345678"), Err("id-format"));
        assert!(validate_phone("0551234567").is_ok());
        assert_eq!(validate_phone("0651234567"), Err("phone-format"));
        assert_eq!(digits_only("05-5123 4567"), "0551234567");
    }

    #[test]
    fn test_year_rules() {
        assert_eq!(validate_year("2020"), Ok(2020));
        assert_eq!(validate_year("20"), Err("year-format"));
        assert_eq!(validate_year("1900"), Err("year-range"));
        assert_eq!(validate_year("3000"), Err("year-range"));
    }

    #[test]
    fn test_field_warnings() {
        let result = ExtractionResult {
            vin: Some("SHORT".to_string()),
            year: Some("2019".to_string()),
            id_number: Some("99".to_string()),
            ..Default::default()
        };
        let warnings = field_warnings(&result);
        assert_eq!(
            warnings,
            vec![
                FieldWarning {
                    field: "vin",
                    error: "vin-length"
                },
                FieldWarning {
                    field: "idNumber",
                    error: "id-format"
                },
            ]
        );
        assert!(field_warnings(&ExtractionResult::default()).is_empty());
    }
}
