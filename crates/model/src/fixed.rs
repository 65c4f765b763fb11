//! Decimal text to fixed-point conversion.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixedParseError {
    #[error("'{0}' is not a decimal number")]
    Invalid(String),

    #[error("'{0}' is out of range")]
    Overflow(String),
}

/// Parse decimal text such as `"1.5"`, `"-0.25"` or `"140"` into an integer
/// scaled by `scale`. Fraction digits beyond the scale's precision are
/// truncated toward zero.
pub fn parse_fixed(text: &str, scale: i64) -> Result<i64, FixedParseError> {
    let trimmed = text.trim();
    let invalid = || FixedParseError::Invalid(trimmed.to_string());
    let overflow = || FixedParseError::Overflow(trimmed.to_string());

    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction)
    {
        return Err(invalid());
    }

    let scale = i128::from(scale);
    let mut value: i128 = 0;
    for digit in whole.bytes() {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i128::from(digit - b'0')))
            .ok_or_else(overflow)?;
    }
    value = value.checked_mul(scale).ok_or_else(overflow)?;

    // 18 fraction digits already exceed any i64 scale.
    let mut numerator: i128 = 0;
    let mut denominator: i128 = 1;
    for digit in fraction.bytes().take(18) {
        numerator = numerator * 10 + i128::from(digit - b'0');
        denominator *= 10;
    }
    value += numerator * scale / denominator;

    if negative {
        value = -value;
    }

    i64::try_from(value).map_err(|_| overflow())
}
