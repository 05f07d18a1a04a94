//! Arbitrary-precision numbers for `N` and `NS` attributes.
//!
//! Numbers are stored as normalized `BigDecimal`s, never as binary floating
//! point, so `"4.44444"`, `"4.444440"` and `".444444e1"` all compare equal and
//! render back as `4.44444`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use bigdecimal::{BigDecimal, Zero};

use crate::error::{Error, Result};
use crate::types::MAX_NUMBER_PRECISION;

/// Smallest accepted non-zero magnitude.
static MIN_MAGNITUDE: LazyLock<BigDecimal> =
    LazyLock::new(|| BigDecimal::new(1.into(), 126));

/// Magnitudes at or above this overflow.
static MAX_MAGNITUDE: LazyLock<BigDecimal> =
    LazyLock::new(|| BigDecimal::new(1.into(), -126));

/// A validated decimal number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Number(BigDecimal);

impl Number {
    /// Validate and normalize a decimal.
    ///
    /// 1. Strip trailing zeros so equal values share one representation.
    /// 2. Reject more than 38 significant digits.
    /// 3. Reject magnitudes outside `[1e-126, 1e126)`, zero excepted.
    pub fn from_decimal(value: BigDecimal) -> Result<Self> {
        if value.is_zero() {
            return Ok(Number(BigDecimal::zero()));
        }
        let value = value.normalized();

        let (unscaled, _) = value.as_bigint_and_exponent();
        let digits = unscaled.to_string().trim_start_matches('-').len();
        if digits > MAX_NUMBER_PRECISION {
            return Err(Error::validation(
                "Attempting to store more than 38 significant digits in a Number",
            ));
        }

        let magnitude = value.abs();
        if magnitude >= *MAX_MAGNITUDE {
            return Err(Error::validation(
                "Number overflow. Attempting to store a number with magnitude larger than supported range",
            ));
        }
        if magnitude < *MIN_MAGNITUDE {
            return Err(Error::validation(
                "Number underflow. Attempting to store a number with magnitude smaller than supported range",
            ));
        }

        Ok(Number(value))
    }

    /// Sum two numbers, re-validating precision and range of the result.
    pub fn checked_add(&self, other: &Number) -> Result<Number> {
        Number::from_decimal(&self.0 + &other.0)
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }
}

impl FromStr for Number {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || Error::validation(format!("The parameter cannot be converted to a numeric value: {s}"));
        if !is_numeric_literal(s) {
            return Err(invalid());
        }
        let value = BigDecimal::from_str(s).map_err(|_| invalid())?;
        Number::from_decimal(value)
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number(BigDecimal::from(v).normalized())
    }
}

/// Render as a plain decimal string without exponent or trailing zeros.
impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (unscaled, scale) = self.0.as_bigint_and_exponent();
        let text = unscaled.to_string();
        let (sign, digits) = match text.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", text.as_str()),
        };

        if scale <= 0 {
            let zeros = "0".repeat(scale.unsigned_abs() as usize);
            return write!(f, "{sign}{digits}{zeros}");
        }

        let scale = scale as usize;
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{sign}{int_part}.{frac_part}")
        } else {
            let zeros = "0".repeat(scale - digits.len());
            write!(f, "{sign}0.{zeros}{digits}")
        }
    }
}

/// Accept `[+-]? (digits [. digits?] | . digits) ([eE] [+-]? digits)?`.
fn is_numeric_literal(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut mantissa_digits = i - int_start;

    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        mantissa_digits += i - frac_start;
    }
    if mantissa_digits == 0 {
        return false;
    }

    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }

    i == bytes.len()
}
