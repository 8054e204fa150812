//! Exact conversion between decimal coin strings and integer minor units.
//!
//! This is the only place where human-entered amounts are interpreted. Ledger
//! arithmetic downstream works exclusively on `u128` minor units.

use syncledger_derive::Error;

/// Decimal places of the native coin.
pub const DECIMALS: u32 = 18;

/// Minor units in one whole coin.
pub const COIN: u128 = 10u128.pow(DECIMALS);

/// Largest supported `decimals` value (10^38 still fits in `u128`).
pub const MAX_DECIMALS: u32 = 38;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("invalid character {found:?} in amount")]
    InvalidCharacter { found: char },
    #[error("amount has more than {decimals} fractional digits")]
    TooPrecise { decimals: u32 },
    #[error("amount does not fit in 128 bits")]
    Overflow,
    #[error("unsupported number of decimals: {0}")]
    UnsupportedDecimals(u32),
}

/// Parses `"12.5"` into minor units with `decimals` fractional digits.
///
/// Leading/trailing whitespace is ignored. Signs, exponents and thousands
/// separators are rejected. A leading or trailing point (`".5"`, `"5."`) is
/// accepted.
pub fn parse_units(text: &str, decimals: u32) -> Result<u128, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    let text = text.trim();
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::Empty);
    }
    if let Some(found) = whole.chars().chain(fraction.chars()).find(|c| !c.is_ascii_digit()) {
        return Err(AmountError::InvalidCharacter { found });
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooPrecise { decimals });
    }

    let scale = 10u128.pow(decimals);
    let mut value: u128 = 0;
    for digit in whole.bytes() {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u128::from(digit - b'0')))
            .ok_or(AmountError::Overflow)?;
    }
    value = value.checked_mul(scale).ok_or(AmountError::Overflow)?;

    let mut place = scale;
    for digit in fraction.bytes() {
        place /= 10;
        value = value
            .checked_add(u128::from(digit - b'0') * place)
            .ok_or(AmountError::Overflow)?;
    }
    Ok(value)
}

/// Renders minor units as a decimal string, trimming trailing zeros.
pub fn format_units(value: u128, decimals: u32) -> String {
    let decimals = decimals.min(MAX_DECIMALS);
    let scale = 10u128.pow(decimals);
    let whole = value / scale;
    let fraction = value % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", fraction, width = decimals as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
