//! Error taxonomy for the pricing core.
//!
//! Every failure here is skip-scoped: callers drop the single bet, line or
//! outcome set that produced it and keep evaluating the rest of the batch.
//! Unavailable prices are not errors; they travel as `None`.

use thiserror::Error;

/// Malformed or out-of-range odds at the conversion boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OddsError {
    #[error("invalid odds {value}: {reason}")]
    InvalidOdds { value: f64, reason: &'static str },
}

impl OddsError {
    pub(crate) fn invalid(value: f64, reason: &'static str) -> Self {
        Self::InvalidOdds { value, reason }
    }
}

/// Failures while removing the vig from an outcome set.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DevigError {
    #[error("outcome set needs at least 2 legs, got {0}")]
    TooFewOutcomes(usize),

    #[error("outcome leg {index} is unavailable")]
    MissingLeg { index: usize },

    #[error("power method did not converge after {iterations} iterations")]
    NoConvergence { iterations: u32 },

    #[error(transparent)]
    Odds(#[from] OddsError),
}

/// Failures while aligning a candidate line against the reference ladder.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("no adjacent reference line at {missing} to price {line}")]
    UnmatchedLine { line: f64, missing: f64 },

    #[error("spread {line} is on the other side of the nearest reference line {reference}")]
    SignMismatch { line: f64, reference: f64 },

    #[error("reference book has no data for {0}")]
    MissingReference(String),

    #[error("offered odds {odds} are worse than the {limit} cutoff")]
    Filtered { odds: f64, limit: f64 },

    #[error(transparent)]
    Devig(#[from] DevigError),

    #[error(transparent)]
    Odds(#[from] OddsError),
}

/// Umbrella error for engine entry points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Odds(#[from] OddsError),

    #[error(transparent)]
    Devig(#[from] DevigError),

    #[error(transparent)]
    Match(#[from] MatchError),
}
