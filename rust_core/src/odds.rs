//! Odds conversion between American, decimal and implied-probability forms.
//!
//! American odds are carried as `f64` because soft books occasionally quote
//! fractional values; anything produced here is truncated to a whole number.
//! An unavailable price is `None` and passes through the `try_*` helpers
//! untouched.

use crate::error::OddsError;

/// Text some books send in place of a price.
pub const UNAVAILABLE: &str = "N/A";

/// Absorbs binary representation error before truncating (1.90909.. -> -110).
const TRUNCATION_EPSILON: f64 = 1e-9;

/// Convert American odds to decimal odds.
///
/// `+150` -> `2.5`, `-150` -> `1.6667`. Values inside (-100, 100) are not
/// American odds and fail with `InvalidOdds`.
pub fn american_to_decimal(odds: f64) -> Result<f64, OddsError> {
    if !odds.is_finite() {
        return Err(OddsError::invalid(odds, "not a finite number"));
    }
    if odds.abs() < 100.0 {
        return Err(OddsError::invalid(odds, "magnitude below 100"));
    }

    if odds >= 100.0 {
        Ok(1.0 + odds / 100.0)
    } else {
        Ok(1.0 + 100.0 / odds.abs())
    }
}

/// Like [`american_to_decimal`] but lets the unavailable sentinel through.
pub fn try_american_to_decimal(odds: Option<f64>) -> Result<Option<f64>, OddsError> {
    odds.map(american_to_decimal).transpose()
}

/// Convert decimal odds to American odds, truncating toward zero.
pub fn decimal_to_american(decimal: f64) -> Result<i32, OddsError> {
    if !decimal.is_finite() {
        return Err(OddsError::invalid(decimal, "not a finite number"));
    }
    if decimal <= 1.0 {
        return Err(OddsError::invalid(decimal, "decimal odds must exceed 1.0"));
    }

    let american = if decimal >= 2.0 {
        (decimal - 1.0) * 100.0
    } else {
        -100.0 / (decimal - 1.0)
    };
    let nudged = american + american.signum() * TRUNCATION_EPSILON;
    Ok(nudged.trunc() as i32)
}

/// Like [`decimal_to_american`] but lets a missing decimal price through.
pub fn try_decimal_to_american(decimal: Option<f64>) -> Result<Option<i32>, OddsError> {
    decimal.map(decimal_to_american).transpose()
}

/// Implied probability of decimal odds.
#[inline]
pub fn implied_probability(decimal: f64) -> f64 {
    1.0 / decimal
}

/// Implied probability straight from American odds.
///
/// `+x` -> `100 / (x + 100)`, `-x` -> `x / (x + 100)`.
pub fn american_to_probability(odds: f64) -> Result<f64, OddsError> {
    american_to_decimal(odds)?;
    if odds > 0.0 {
        Ok(100.0 / (odds + 100.0))
    } else {
        Ok(-odds / (-odds + 100.0))
    }
}

/// Combined implied probability of an outcome set (1.0 means no vig).
pub fn calculate_vig(odds: &[f64]) -> Result<f64, OddsError> {
    odds.iter().try_fold(0.0, |total, &o| {
        Ok(total + implied_probability(american_to_decimal(o)?))
    })
}

/// Render a price or line the way bettors read it: `+150`, `-110`, `+2.5`.
///
/// `whole` truncates to an integer; otherwise one decimal place is kept.
pub fn format_american(value: f64, whole: bool) -> String {
    if whole {
        let v = value.trunc() as i64;
        if v > 0 {
            format!("+{}", v)
        } else {
            format!("{}", v)
        }
    } else if value > 0.0 {
        format!("+{:.1}", value)
    } else {
        format!("{:.1}", value)
    }
}

/// Render a line value with at least one decimal (`220.5`, `221.0`, `-0.25`).
pub fn format_line(line: f64) -> String {
    if line.fract() == 0.0 {
        format!("{:.1}", line)
    } else {
        format!("{}", line)
    }
}
