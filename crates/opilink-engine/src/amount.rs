//! Minor-unit rescaling of request amounts.

use rust_decimal::Decimal;

use crate::error::{RequestError, Result};

/// Minor-unit digits used when a currency has no entry below.
pub const DEFAULT_MINOR_UNITS: u32 = 2;

/// ISO-4217 currencies whose minor-unit exponent differs from 2.
const MINOR_UNIT_EXCEPTIONS: &[(&str, u32)] = &[
    ("BHD", 3),
    ("BIF", 0),
    ("CLF", 4),
    ("CLP", 0),
    ("DJF", 0),
    ("GNF", 0),
    ("IQD", 3),
    ("ISK", 0),
    ("JOD", 3),
    ("JPY", 0),
    ("KMF", 0),
    ("KRW", 0),
    ("KWD", 3),
    ("LYD", 3),
    ("OMR", 3),
    ("PYG", 0),
    ("RWF", 0),
    ("TND", 3),
    ("UGX", 0),
    ("UYI", 0),
    ("UYW", 4),
    ("VND", 0),
    ("VUV", 0),
    ("XAF", 0),
    ("XOF", 0),
    ("XPF", 0),
];

/// Normalised (upper-case) currency code, or `InvalidCurrency`.
pub fn currency_code(currency: &str) -> Result<String> {
    let code = currency.trim();
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(RequestError::InvalidCurrency(currency.to_string()));
    }
    Ok(code.to_ascii_uppercase())
}

/// Number of minor-unit digits of `currency`.
pub fn minor_units(currency: &str) -> Result<u32> {
    let code = currency_code(currency)?;
    Ok(MINOR_UNIT_EXCEPTIONS
        .binary_search_by(|(candidate, _)| candidate.cmp(&code.as_str()))
        .map(|index| MINOR_UNIT_EXCEPTIONS[index].1)
        .unwrap_or(DEFAULT_MINOR_UNITS))
}

/// Move the decimal point of a minor-unit `amount` left by the currency's
/// exponent. The mantissa is kept, so the scale grows.
pub fn rescale(amount: Decimal, currency: &str) -> Result<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(RequestError::InvalidAmount {
            amount: amount.to_string(),
            reason: "amount must not be negative".to_string(),
        });
    }
    let digits = minor_units(currency)?;
    let mut scaled = amount;
    scaled
        .set_scale(amount.scale() + digits)
        .map_err(|err| RequestError::InvalidAmount {
            amount: amount.to_string(),
            reason: err.to_string(),
        })?;
    Ok(scaled)
}
