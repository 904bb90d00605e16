//! Duration literals as they appear in trace queries: `500ms`, `2s`, `1m30s`, `1.5h`.
//!
//! Grammar: `"0"` or one or more `<number><unit>` segments, where `<number>`
//! is decimal digits with an optional fractional part and `<unit>` is one of
//! `ns`, `us`/`µs`/`μs`, `ms`, `s`, `m`, `h`. Signs and whitespace are rejected.

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Unit suffixes and their size in nanoseconds.
const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("\u{b5}s", 1_000),
    ("\u{3bc}s", 1_000),
    ("ms", 1_000_000),
    ("s", NANOS_PER_SEC),
    ("m", 60 * NANOS_PER_SEC),
    ("h", 3_600 * NANOS_PER_SEC),
];

// Fraction digits past this point are below nanosecond precision for every unit.
const MAX_FRACTION_DIGITS: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {unit:?} in duration {literal:?}")]
    UnknownUnit { unit: String, literal: String },
    #[error("duration {0:?} is out of range")]
    Overflow(String),
}

/// Parse a duration literal.
pub fn parse_duration(literal: &str) -> Result<Duration, DurationError> {
    if literal.is_empty() {
        return Err(DurationError::Empty);
    }
    if literal == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = literal;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let (int_part, after) = split_digits(rest);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(after_dot) => split_digits(after_dot),
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationError::Invalid(literal.to_string()));
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        if unit.is_empty() {
            return Err(DurationError::MissingUnit(literal.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            literal: literal.to_string(),
        })?;

        let overflow = || DurationError::Overflow(literal.to_string());
        let segment = segment_nanos(int_part, frac_part, scale).ok_or_else(overflow)?;
        total = total.checked_add(segment).ok_or_else(overflow)?;
        if total > u128::from(u64::MAX) {
            return Err(overflow());
        }

        rest = after;
    }

    // Bounded by u64::MAX above.
    Ok(Duration::from_nanos(total as u64))
}

fn split_digits(s: &str) -> (&str, &str) {
    let n = s.bytes().take_while(u8::is_ascii_digit).count();
    s.split_at(n)
}

fn unit_nanos(unit: &str) -> Option<u128> {
    UNITS
        .iter()
        .find(|(suffix, _)| *suffix == unit)
        .map(|(_, nanos)| *nanos)
}

fn segment_nanos(int_part: &str, frac_part: &str, scale: u128) -> Option<u128> {
    let mut nanos: u128 = 0;
    for digit in int_part.bytes() {
        nanos = nanos.checked_mul(10)?.checked_add(u128::from(digit - b'0'))?;
    }
    nanos = nanos.checked_mul(scale)?;

    let frac_digits = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
    if !frac_digits.is_empty() {
        let mut numerator: u128 = 0;
        for digit in frac_digits.bytes() {
            numerator = numerator * 10 + u128::from(digit - b'0');
        }
        let denominator = 10u128.pow(frac_digits.len() as u32);
        nanos = nanos.checked_add(numerator.checked_mul(scale)? / denominator)?;
    }

    Some(nanos)
}
