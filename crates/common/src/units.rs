//! Conversions between human-readable amounts, smallest on-chain units and fiat values.

use crate::PaymentError;
use alloy_primitives::{
    U256,
    utils::{ParseUnits, format_units, parse_units},
};

/// Decimal places used when rendering crypto amounts derived from fiat.
pub const CRYPTO_DISPLAY_DECIMALS: usize = 6;

/// Decimal places used when rendering fiat values.
pub const FIAT_DISPLAY_DECIMALS: usize = 2;

/// Converts a human-readable amount (`"0.5"`) into the asset's smallest unit.
///
/// Empty, negative or malformed amounts are rejected as
/// [`PaymentError::InvalidInput`].
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, PaymentError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(PaymentError::invalid_input("amount is empty"));
    }
    match parse_units(amount, decimals) {
        Ok(ParseUnits::U256(value)) => Ok(value),
        Ok(ParseUnits::I256(_)) => Err(PaymentError::invalid_input("amount must not be negative")),
        Err(err) => Err(PaymentError::invalid_input(format!("invalid amount `{amount}`: {err}"))),
    }
}

/// Renders `value` smallest units as a decimal string with `decimals` precision.
pub fn format_amount(value: U256, decimals: u8) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}

/// Lossy conversion of `value` smallest units into a floating point amount.
pub fn to_decimal(value: U256, decimals: u8) -> f64 {
    format_amount(value, decimals).parse().unwrap_or_default()
}

/// Renders a gas price given in wei as gwei.
pub fn wei_to_gwei(wei: u128) -> String {
    format_amount(U256::from(wei), 9)
}

/// Renders `value` with exactly `places` decimal places.
pub fn format_fixed(value: f64, places: usize) -> String {
    format!("{value:.places$}")
}

/// Rounds `value` to `places` decimal places.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Converts a fiat amount into the asset amount at `rate` fiat per unit.
///
/// Returns `None` unless both the amount and the rate are finite and strictly positive.
pub fn fiat_to_crypto(amount: f64, rate: f64) -> Option<f64> {
    let valid = |x: f64| x.is_finite() && x > 0.0;
    (valid(amount) && valid(rate)).then(|| amount / rate)
}

/// Converts an asset amount into fiat at `rate` fiat per unit.
pub fn crypto_to_fiat(amount: f64, rate: f64) -> f64 {
    amount * rate
}

/// Parses a user-entered fiat amount and renders the asset amount it buys at `rate`, with
/// [`CRYPTO_DISPLAY_DECIMALS`] places.
///
/// ```
/// use rampay_common::units::estimate_crypto;
///
/// assert_eq!(estimate_crypto("200", 200_000.0).as_deref(), Some("0.001000"));
/// assert_eq!(estimate_crypto("abc", 200_000.0), None);
/// ```
pub fn estimate_crypto(amount: &str, rate: f64) -> Option<String> {
    let amount = amount.trim().parse::<f64>().ok()?;
    fiat_to_crypto(amount, rate).map(|crypto| format_fixed(crypto, CRYPTO_DISPLAY_DECIMALS))
}
