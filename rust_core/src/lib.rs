//! Sharpline Core - odds normalization and +EV detection.
//!
//! This module provides:
//! - American/decimal odds conversion and vig measurement
//! - Power and multiplicative devigging with a worst-case fair price
//! - Normalization of a sharp book's raw feed into canonical snapshots
//! - Line matching with interpolation across alternate lines
//! - EV and Kelly scoring of every book against the reference book
//! - Snapshot diffing for odds and limit history
//! - Cached, concurrently collected odds feeds

pub mod aliases;
pub mod config;
pub mod devig;
pub mod engine;
pub mod error;
pub mod ev;
pub mod feed;
pub mod history;
pub mod ladder;
pub mod logging;
pub mod normalize;
pub mod odds;
pub mod snapshot;
pub mod types;
pub mod view;

#[cfg(feature = "python")]
use pyo3::exceptions::PyValueError;
#[cfg(feature = "python")]
use pyo3::prelude::*;

pub use aliases::TeamAliases;
pub use config::{EvConfig, NormalizerConfig};
pub use devig::{devig, worst_case, DevigMethod, FairOutcomes};
pub use engine::{find_ev_json, BetTarget, EvEngine, Opportunity};
pub use error::{DevigError, EngineError, MatchError, OddsError};
pub use ev::{calculate_ev, kelly_fraction, EvEstimate};
pub use feed::{CachedFeed, FeedRegistry, OddsFeed, SnapshotCache};
pub use ladder::{LineLadder, LineMatch, MatchKind, SlopeDirection};
pub use normalize::{MarketNormalizer, RawFeed};
pub use odds::{american_to_decimal, decimal_to_american};
pub use snapshot::{BookData, BookSnapshot, EventSnapshot, MarketQuotes};
pub use types::{MarketKind, Side, Sport};
pub use view::MarketView;

#[cfg(feature = "python")]
fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Convert American odds to decimal odds.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "american_to_decimal")]
fn py_american_to_decimal(odds: f64) -> PyResult<f64> {
    odds::american_to_decimal(odds).map_err(value_error)
}

/// Convert decimal odds to whole American odds.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "decimal_to_american")]
fn py_decimal_to_american(decimal: f64) -> PyResult<i32> {
    odds::decimal_to_american(decimal).map_err(value_error)
}

/// Worst-case fair American price for the first outcome.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "worst_case")]
fn py_worst_case(odds: Vec<f64>) -> PyResult<i32> {
    devig::worst_case(&odds).map_err(value_error)
}

/// Fair American price per outcome for many markets.
///
/// Markets that fail to devig come back as `None`.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "batch_worst_case")]
fn py_batch_worst_case(markets: Vec<Vec<f64>>) -> Vec<Option<i32>> {
    devig::batch_worst_case(&markets)
        .into_iter()
        .map(Result::ok)
        .collect()
}

/// EV percent and Kelly signal of an offered price against a fair price.
///
/// Returns `None` when the offered price is unavailable.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "calculate_ev")]
fn py_calculate_ev(offered: Option<f64>, fair: f64) -> PyResult<Option<(f64, f64)>> {
    let estimate = ev::calculate_ev(offered, fair).map_err(value_error)?;
    Ok(estimate.map(|e| (e.ev, e.kelly)))
}

/// Kelly stake signal for decimal odds and a fair win probability.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "kelly_fraction")]
fn py_kelly_fraction(decimal: f64, p_fair: f64) -> f64 {
    ev::kelly_fraction(decimal, p_fair)
}

/// Scan a JSON list of book snapshots and return ranked opportunities as JSON.
///
/// Configuration comes from the environment; `alias_path` points at the team
/// alias file.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "find_ev_json", signature = (books_json, sport, alias_path=None))]
fn py_find_ev_json(books_json: &str, sport: &str, alias_path: Option<&str>) -> PyResult<String> {
    let sport: Sport = sport.parse().map_err(PyValueError::new_err)?;
    let config = EvConfig::from_env().map_err(value_error)?;
    let aliases = TeamAliases::load(alias_path);
    engine::find_ev_json(books_json, sport, &aliases, config).map_err(value_error)
}

/// Install the tracing subscriber; `False` when one was already installed.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(name = "init_tracing")]
fn py_init_tracing() -> bool {
    logging::init_tracing()
}

/// Python module definition
#[cfg(feature = "python")]
#[pymodule]
fn sharpline_core(_py: Python, m: &PyModule) -> PyResult<()> {
    // ============================================================================
    // Odds Conversion
    // ============================================================================
    m.add_function(wrap_pyfunction!(py_american_to_decimal, m)?)?;
    m.add_function(wrap_pyfunction!(py_decimal_to_american, m)?)?;

    // ============================================================================
    // Devig and EV
    // ============================================================================
    m.add_function(wrap_pyfunction!(py_worst_case, m)?)?;
    m.add_function(wrap_pyfunction!(py_batch_worst_case, m)?)?;
    m.add_function(wrap_pyfunction!(py_calculate_ev, m)?)?;
    m.add_function(wrap_pyfunction!(py_kelly_fraction, m)?)?;

    // ============================================================================
    // Engine
    // ============================================================================
    m.add_function(wrap_pyfunction!(py_find_ev_json, m)?)?;
    m.add_function(wrap_pyfunction!(py_init_tracing, m)?)?;

    Ok(())
}
