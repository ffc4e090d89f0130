//! Vig removal for sets of mutually exclusive outcomes.
//!
//! Two models are provided:
//! - **Power**: solve for `k` such that `sum((1/d_i)^(1/k)) == 1`. No closed
//!   form exists for three outcomes, so `k` is bracketed and bisected.
//! - **Multiplicative**: scale each implied probability by the overround.
//!
//! Fair prices are quoted for outcome index 0. [`worst_case`] takes whichever
//! model gives the longer (less generous to us) fair price so that EV is never
//! overstated.

use rayon::prelude::*;
use tracing::debug;

use crate::error::{DevigError, OddsError};
use crate::odds::{american_to_decimal, decimal_to_american, implied_probability};

const MAX_BISECTIONS: u32 = 200;
const MAX_BRACKET_DOUBLINGS: u32 = 64;
const ROOT_TOLERANCE: f64 = 1e-12;
/// Residual above which a finished bisection is treated as divergent
const RESIDUAL_LIMIT: f64 = 1e-9;

/// Vig removal model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DevigMethod {
    Power,
    Multiplicative,
}

/// Vig-free probabilities for an outcome set, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct FairOutcomes {
    pub method: DevigMethod,
    probabilities: Vec<f64>,
}

impl FairOutcomes {
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Sum of fair probabilities (1.0 within solver tolerance)
    pub fn total(&self) -> f64 {
        self.probabilities.iter().sum()
    }

    pub fn decimal_odds(&self) -> Vec<f64> {
        self.probabilities.iter().map(|p| 1.0 / p).collect()
    }

    /// Fair American price of one outcome.
    pub fn american(&self, index: usize) -> Result<Option<i32>, OddsError> {
        match self.probabilities.get(index) {
            Some(p) => decimal_to_american(1.0 / p).map(Some),
            None => Ok(None),
        }
    }
}

/// Reject unavailable legs; the devigger only accepts complete outcome sets.
pub fn collect_legs(odds: &[Option<f64>]) -> Result<Vec<f64>, DevigError> {
    odds.iter()
        .enumerate()
        .map(|(index, leg)| leg.ok_or(DevigError::MissingLeg { index }))
        .collect()
}

fn inverted(decimals: &[f64]) -> Result<Vec<f64>, DevigError> {
    if decimals.len() < 2 {
        return Err(DevigError::TooFewOutcomes(decimals.len()));
    }
    decimals
        .iter()
        .map(|&d| {
            if !d.is_finite() || d <= 1.0 {
                Err(OddsError::invalid(d, "decimal odds must exceed 1.0").into())
            } else {
                Ok(implied_probability(d))
            }
        })
        .collect()
}

#[inline]
fn power_residual(k: f64, implied: &[f64]) -> f64 {
    implied.iter().map(|p| p.powf(1.0 / k)).sum::<f64>() - 1.0
}

/// Solve for the power-method exponent.
///
/// The residual rises monotonically in `k` because every implied probability
/// is below 1, so a sign change brackets exactly one root.
fn solve_power_exponent(implied: &[f64]) -> Result<f64, DevigError> {
    let mut lo = 1e-6;
    let mut hi = 1.0;

    let mut doublings = 0;
    while power_residual(hi, implied) < 0.0 {
        lo = hi;
        hi *= 2.0;
        doublings += 1;
        if doublings > MAX_BRACKET_DOUBLINGS {
            return Err(DevigError::NoConvergence {
                iterations: doublings,
            });
        }
    }

    let mut mid = (lo + hi) / 2.0;
    for _ in 0..MAX_BISECTIONS {
        mid = (lo + hi) / 2.0;
        let residual = power_residual(mid, implied);
        if residual.abs() < ROOT_TOLERANCE {
            return Ok(mid);
        }
        if residual < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < f64::EPSILON {
            break;
        }
    }

    if power_residual(mid, implied).abs() < RESIDUAL_LIMIT {
        Ok(mid)
    } else {
        Err(DevigError::NoConvergence {
            iterations: MAX_BISECTIONS,
        })
    }
}

/// Power-method devig over decimal odds.
pub fn devig_power(decimals: &[f64]) -> Result<FairOutcomes, DevigError> {
    let implied = inverted(decimals)?;
    let k = solve_power_exponent(&implied)?;
    Ok(FairOutcomes {
        method: DevigMethod::Power,
        probabilities: implied.iter().map(|p| p.powf(1.0 / k)).collect(),
    })
}

/// Multiplicative (proportional) devig over decimal odds.
pub fn devig_multiplicative(decimals: &[f64]) -> Result<FairOutcomes, DevigError> {
    let implied = inverted(decimals)?;
    let overround: f64 = implied.iter().sum();
    Ok(FairOutcomes {
        method: DevigMethod::Multiplicative,
        probabilities: implied.iter().map(|p| p / overround).collect(),
    })
}

pub fn devig(decimals: &[f64], method: DevigMethod) -> Result<FairOutcomes, DevigError> {
    match method {
        DevigMethod::Power => devig_power(decimals),
        DevigMethod::Multiplicative => devig_multiplicative(decimals),
    }
}

/// Fair American price of outcome 0 under both models, from decimal odds.
pub fn fair_prices_decimal(decimals: &[f64]) -> Result<(i32, i32), DevigError> {
    let power = devig_power(decimals)?
        .american(0)?
        .ok_or(DevigError::MissingLeg { index: 0 })?;
    let mult = devig_multiplicative(decimals)?
        .american(0)?
        .ok_or(DevigError::MissingLeg { index: 0 })?;
    Ok((power, mult))
}

/// Conservative fair price of outcome 0, from decimal odds.
pub fn worst_case_decimal(decimals: &[f64]) -> Result<i32, DevigError> {
    let (power, mult) = fair_prices_decimal(decimals)?;
    Ok(power.max(mult))
}

/// Conservative fair American price of outcome 0, from American odds.
///
/// The larger American price is the larger fair decimal price, so this is
/// the model that credits the offered bet with the smaller edge.
pub fn worst_case(odds: &[f64]) -> Result<i32, DevigError> {
    let decimals = odds
        .iter()
        .map(|&o| american_to_decimal(o))
        .collect::<Result<Vec<_>, _>>()?;
    worst_case_decimal(&decimals)
}

/// [`worst_case`] re-expressed as decimal odds.
pub fn worst_case_to_decimal(odds: &[f64]) -> Result<f64, DevigError> {
    let fair = worst_case(odds)?;
    Ok(american_to_decimal(fair as f64)?)
}

/// Worst-case fair prices for many outcome sets in parallel.
///
/// A set that fails to devig yields its error in place; the rest of the
/// batch is unaffected.
pub fn batch_worst_case(sets: &[Vec<f64>]) -> Vec<Result<i32, DevigError>> {
    sets.par_iter()
        .map(|set| {
            let fair = worst_case(set);
            if let Err(ref e) = fair {
                debug!(odds = ?set, error = %e, "skipping outcome set");
            }
            fair
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decimals(odds: &[f64]) -> Vec<f64> {
        odds.iter().map(|&o| american_to_decimal(o).unwrap()).collect()
    }

    #[test]
    fn test_even_market_devigs_to_even_money() {
        let fair = worst_case(&[-110.0, -110.0]).unwrap();
        assert_eq!(fair.abs(), 100);

        let power = devig_power(&decimals(&[-110.0, -110.0])).unwrap();
        for p in power.probabilities() {
            assert!((p - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fair_probabilities_sum_to_one() {
        for set in [
            vec![-110.0, -110.0],
            vec![-250.0, 200.0],
            vec![-110.0, 300.0, 260.0],
            vec![150.0, 180.0, 210.0],
        ] {
            let d = decimals(&set);
            let power = devig_power(&d).unwrap();
            let mult = devig_multiplicative(&d).unwrap();
            assert!((power.total() - 1.0).abs() < 1e-9, "power {:?}", set);
            assert!((mult.total() - 1.0).abs() < 1e-12, "mult {:?}", set);
        }
    }

    #[test]
    fn test_worst_case_is_max_of_models() {
        for set in [
            vec![-250.0, 200.0],
            vec![200.0, -250.0],
            vec![-110.0, 300.0, 260.0],
            vec![300.0, -110.0, 260.0],
        ] {
            let (power, mult) = fair_prices_decimal(&decimals(&set)).unwrap();
            let worst = worst_case(&set).unwrap();
            assert_eq!(worst, power.max(mult));
            assert!(worst >= power.min(mult));
        }
    }

    #[test]
    fn test_power_method_shades_longshot_more() {
        // Power devig pushes more vig onto the longshot than proportional does
        let d = decimals(&[-250.0, 200.0]);
        let power = devig_power(&d).unwrap();
        let mult = devig_multiplicative(&d).unwrap();
        assert!(power.probabilities()[1] < mult.probabilities()[1]);
        assert!(power.probabilities()[0] > mult.probabilities()[0]);
    }

    #[test]
    fn test_no_vig_market_is_unchanged() {
        let power = devig_power(&[2.0, 2.0]).unwrap();
        assert!((power.probabilities()[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_leg_is_rejected() {
        assert_eq!(
            collect_legs(&[Some(-110.0), None]),
            Err(DevigError::MissingLeg { index: 1 })
        );
        assert_eq!(
            collect_legs(&[Some(-110.0), Some(105.0)]),
            Ok(vec![-110.0, 105.0])
        );
    }

    #[test]
    fn test_single_outcome_is_rejected() {
        assert_eq!(
            worst_case(&[-110.0]),
            Err(DevigError::TooFewOutcomes(1))
        );
    }

    #[test]
    fn test_invalid_leg_is_rejected() {
        assert!(matches!(
            worst_case(&[-110.0, 40.0]),
            Err(DevigError::Odds(_))
        ));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let sets = vec![vec![-110.0, -110.0], vec![-110.0], vec![-250.0, 200.0]];
        let results = batch_worst_case(&sets);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_worst_case_to_decimal() {
        let d = worst_case_to_decimal(&[-110.0, -110.0]).unwrap();
        assert!((d - 2.0).abs() < 1e-9);
    }
}
