//! Kubernetes quantity parsing
//!
//! Accepts the serialized forms the API server emits: a decimal number with
//! an optional binary (`Ki`..`Ei`), decimal SI (`n`..`E`) or exponent
//! (`e3`, `E-2`) suffix. Values are converted to milli-units, rounding any
//! remaining fraction up. Values beyond the `i64` range clamp to its bounds.

use thiserror::Error;

/// Exponents outside this range cannot produce a representable milli-value
const MAX_EXPONENT: i32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),
    #[error("unknown suffix {suffix:?} in quantity {quantity:?}")]
    UnknownSuffix { quantity: String, suffix: String },
    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// Parse a quantity string into milli-units
pub fn parse_quantity(input: &str) -> Result<i64, QuantityError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(QuantityError::Empty);
    }

    let (negative, unsigned) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let split = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(split);

    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if (int_part.is_empty() && frac_part.is_empty()) || frac_part.contains('.') {
        return Err(QuantityError::InvalidNumber(input.to_string()));
    }
    if frac_part.len() as i32 > MAX_EXPONENT {
        return Err(QuantityError::OutOfRange(input.to_string()));
    }

    let digits = format!("{int_part}{frac_part}");
    let mantissa: i128 = digits
        .parse()
        .map_err(|_| QuantityError::OutOfRange(input.to_string()))?;

    let (numerator, denominator) = suffix_factor(suffix).ok_or_else(|| {
        QuantityError::UnknownSuffix {
            quantity: input.to_string(),
            suffix: suffix.to_string(),
        }
    })?;

    let out_of_range = || QuantityError::OutOfRange(input.to_string());
    let scaled = mantissa.checked_mul(numerator).ok_or_else(out_of_range)?;
    let divisor = denominator
        .checked_mul(10i128.pow(frac_part.len() as u32))
        .ok_or_else(out_of_range)?;

    let mut milli = scaled / divisor;
    if scaled % divisor != 0 {
        milli += 1;
    }
    if negative {
        milli = -milli;
    }

    // milli-units overflow i64 around 8Ei of bytes; clamp rather than drop
    Ok(i64::try_from(milli).unwrap_or(if negative { i64::MIN } else { i64::MAX }))
}

/// Factor converting one base unit with this suffix into milli-units,
/// expressed as `numerator / denominator`
fn suffix_factor(suffix: &str) -> Option<(i128, i128)> {
    const KI: i128 = 1024;
    let factor = match suffix {
        "" => (1_000, 1),
        "n" => (1, 1_000_000),
        "u" => (1, 1_000),
        "m" => (1, 1),
        "k" => (10i128.pow(6), 1),
        "M" => (10i128.pow(9), 1),
        "G" => (10i128.pow(12), 1),
        "T" => (10i128.pow(15), 1),
        "P" => (10i128.pow(18), 1),
        "E" => (10i128.pow(21), 1),
        "Ki" => (KI * 1_000, 1),
        "Mi" => (KI.pow(2) * 1_000, 1),
        "Gi" => (KI.pow(3) * 1_000, 1),
        "Ti" => (KI.pow(4) * 1_000, 1),
        "Pi" => (KI.pow(5) * 1_000, 1),
        "Ei" => (KI.pow(6) * 1_000, 1),
        _ => return exponent_factor(suffix),
    };
    Some(factor)
}

fn exponent_factor(suffix: &str) -> Option<(i128, i128)> {
    let exponent = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))?;
    let exponent: i32 = exponent.parse().ok()?;
    if !(-MAX_EXPONENT..=MAX_EXPONENT).contains(&exponent) {
        return None;
    }
    let milli_exponent = exponent + 3;
    if milli_exponent >= 0 {
        Some((10i128.pow(milli_exponent as u32), 1))
    } else {
        Some((1, 10i128.pow((-milli_exponent) as u32)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_milli() {
        assert_eq!(parse_quantity("4"), Ok(4_000));
        assert_eq!(parse_quantity("500m"), Ok(500));
        assert_eq!(parse_quantity("0.5"), Ok(500));
        assert_eq!(parse_quantity("1.5"), Ok(1_500));
        assert_eq!(parse_quantity("0"), Ok(0));
    }

    #[test]
    fn test_binary_suffixes() {
        assert_eq!(parse_quantity("1Ki"), Ok(1_024_000));
        assert_eq!(parse_quantity("128Mi"), Ok(128 * 1024 * 1024 * 1_000));
        assert_eq!(parse_quantity("1.5Gi"), Ok(1_610_612_736_000));
    }

    #[test]
    fn test_decimal_suffixes() {
        assert_eq!(parse_quantity("1k"), Ok(1_000_000));
        assert_eq!(parse_quantity("2G"), Ok(2_000_000_000_000));
        assert_eq!(parse_quantity("100u"), Ok(1));
        assert_eq!(parse_quantity("1n"), Ok(1));
    }

    #[test]
    fn test_exponent_suffix() {
        assert_eq!(parse_quantity("1e3"), Ok(1_000_000));
        assert_eq!(parse_quantity("5E-1"), Ok(500));
        assert_eq!(parse_quantity("12e-3"), Ok(12));
    }

    #[test]
    fn test_sign() {
        assert_eq!(parse_quantity("-250m"), Ok(-250));
        assert_eq!(parse_quantity("+2"), Ok(2_000));
    }

    #[test]
    fn test_rounds_fraction_up() {
        assert_eq!(parse_quantity("0.0001"), Ok(1));
        assert_eq!(parse_quantity("1.0001m"), Ok(2));
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_quantity(""), Err(QuantityError::Empty));
        assert!(matches!(
            parse_quantity("."),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            parse_quantity("1.2.3"),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            parse_quantity("10Xi"),
            Err(QuantityError::UnknownSuffix { .. })
        ));
        assert!(matches!(
            parse_quantity("1e40"),
            Err(QuantityError::UnknownSuffix { .. })
        ));
        assert!(matches!(
            parse_quantity("99999999999999999999999999999999999999999Ei"),
            Err(QuantityError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_large_storage_clamps() {
        assert_eq!(parse_quantity("8Pi"), Ok(8 * 1024i64.pow(5) * 1_000));
        assert_eq!(parse_quantity("9Pi"), Ok(i64::MAX));
        assert_eq!(parse_quantity("100Ei"), Ok(i64::MAX));
        assert_eq!(parse_quantity("-100Ei"), Ok(i64::MIN));
    }
}
