//! Expected value and Kelly stake sizing.

use serde::Serialize;

use crate::config::DEFAULT_KELLY_MULTIPLIER;
use crate::error::OddsError;
use crate::odds::{american_to_decimal, american_to_probability};

/// EV of one offered price against a fair price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvEstimate {
    /// Expected profit per unit staked, in percent
    pub ev: f64,
    /// Scaled Kelly stake signal
    pub kelly: f64,
}

/// Kelly fraction `(b*p - q) / b` scaled by `multiplier`.
pub fn scaled_kelly(decimal: f64, p_fair: f64, multiplier: f64) -> f64 {
    let b = decimal - 1.0;
    let q = 1.0 - p_fair;
    (b * p_fair - q) / b * multiplier
}

/// Kelly stake signal with the default multiplier.
pub fn kelly_fraction(decimal: f64, p_fair: f64) -> f64 {
    scaled_kelly(decimal, p_fair, DEFAULT_KELLY_MULTIPLIER)
}

/// EV% and Kelly signal of `offered` American odds given `fair` American odds.
///
/// An unavailable offered price yields `Ok(None)`.
pub fn calculate_ev(offered: Option<f64>, fair: f64) -> Result<Option<EvEstimate>, OddsError> {
    calculate_ev_scaled(offered, fair, DEFAULT_KELLY_MULTIPLIER)
}

pub fn calculate_ev_scaled(
    offered: Option<f64>,
    fair: f64,
    kelly_multiplier: f64,
) -> Result<Option<EvEstimate>, OddsError> {
    let Some(offered) = offered else {
        return Ok(None);
    };
    let p = american_to_probability(fair)?;
    let decimal = american_to_decimal(offered)?;

    let ev = ((decimal - 1.0) * p - (1.0 - p)) * 100.0;
    Ok(Some(EvEstimate {
        ev,
        kelly: scaled_kelly(decimal, p, kelly_multiplier),
    }))
}

/// Round to `places` decimals for display.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_better_than_fair_is_positive() {
        let est = calculate_ev(Some(150.0), 100.0).unwrap().unwrap();
        assert!((est.ev - 25.0).abs() < 1e-9);
        // (1.5 * 0.5 - 0.5) / 1.5 * 25
        assert!((est.kelly - 4.166_666_666).abs() < 1e-6);
    }

    #[test]
    fn test_fair_price_is_zero_ev() {
        for price in [-250.0, -110.0, 100.0, 145.0] {
            let est = calculate_ev(Some(price), price).unwrap().unwrap();
            assert!(est.ev.abs() < 1e-9, "{} -> {}", price, est.ev);
            assert!(est.kelly.abs() < 1e-9);
        }
    }

    #[test]
    fn test_worse_than_fair_is_negative() {
        let est = calculate_ev(Some(-120.0), -105.0).unwrap().unwrap();
        assert!(est.ev < 0.0);
        assert!(est.kelly < 0.0);
    }

    #[test]
    fn test_unavailable_offer() {
        assert_eq!(calculate_ev(None, -110.0), Ok(None));
        assert!(calculate_ev(Some(50.0), -110.0).is_err());
    }

    #[test]
    fn test_kelly_multiplier() {
        let raw = scaled_kelly(2.5, 0.5, 1.0);
        assert!((raw - 1.0 / 6.0).abs() < 1e-12);
        assert!((kelly_fraction(2.5, 0.5) - raw * 25.0).abs() < 1e-12);

        let est = calculate_ev_scaled(Some(150.0), 100.0, 1.0).unwrap().unwrap();
        assert!((est.kelly - raw).abs() < 1e-12);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(4.166_666, 2), 4.17);
        assert_eq!(round_to(-2.349, 1), -2.3);
    }
}
