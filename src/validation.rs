//! Input validation ahead of any state change
//!
//! Raw form text is parsed leniently (`"1 234,5"`), then checked for sign and
//! finiteness. Rejections carry the user-facing message in `InputError`.

use crate::error::InputError;
use crate::units::{parse_number, valid_density};

/// Parse and check a non-negative amount typed by the user
pub fn parse_amount(text: &str) -> Result<f64, InputError> {
    let value = parse_number(text).ok_or(InputError::NotNumeric)?;
    check_amount(value)
}

/// Reject non-finite and negative amounts
pub fn check_amount(value: f64) -> Result<f64, InputError> {
    if !value.is_finite() {
        return Err(InputError::NotNumeric);
    }
    if value < 0.0 {
        return Err(InputError::Negative);
    }
    Ok(value)
}

/// Density must be finite and strictly positive
pub fn check_density(value: f64) -> Result<f64, InputError> {
    valid_density(value).ok_or(InputError::InvalidDensity)
}

/// Parse a density typed by the user
pub fn parse_density(text: &str) -> Result<f64, InputError> {
    parse_number(text)
        .ok_or(InputError::InvalidDensity)
        .and_then(check_density)
}

/// WASM-friendly version: empty string when valid, else the message
#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "validateAmount")]
pub fn validate_amount_wasm(text: &str) -> String {
    match parse_amount(text) {
        Ok(_) => String::new(),
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("15000"), Ok(15000.0));
        assert_eq!(parse_amount(" 1 234,5 "), Ok(1234.5));
        assert_eq!(parse_amount("0"), Ok(0.0));
    }

    #[test]
    fn test_rejects_negative() {
        let err = parse_amount("-100").unwrap_err();
        assert_eq!(err, InputError::Negative);
        assert_eq!(err.to_string(), "Отрицательные значения запрещены");
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_amount("abc"), Err(InputError::NotNumeric));
        assert_eq!(parse_amount(""), Err(InputError::NotNumeric));
        assert_eq!(check_amount(f64::INFINITY), Err(InputError::NotNumeric));
    }

    #[test]
    fn test_density() {
        assert_eq!(check_density(0.84), Ok(0.84));
        assert_eq!(check_density(0.0), Err(InputError::InvalidDensity));
        assert_eq!(parse_density("0,84"), Ok(0.84));
        assert_eq!(parse_density("x"), Err(InputError::InvalidDensity));
        assert_eq!(parse_density("x").unwrap_err().to_string(), "Введите валидную ρ");
    }
}
