//! Engine and normalizer configuration.
//!
//! Defaults mirror what the scanner runs with in production. `from_env`
//! loads `.env` first, then overrides individual fields from `EV_*` and
//! `NORMALIZER_*` variables.

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use std::env;
use std::str::FromStr;

use crate::types::{MarketKind, Sport, FULL_GAME};

/// Kelly stake scaling applied on top of the raw Kelly fraction.
///
/// Produces a unit-sized stake signal rather than a bankroll fraction.
pub const DEFAULT_KELLY_MULTIPLIER: f64 = 25.0;

/// Full-game spread vig below this flags the event as a timeout
pub const DEFAULT_TIMEOUT_VIG_THRESHOLD: f64 = 1.053;

/// Reference book used when none is configured
pub const DEFAULT_SHARP: &str = "pin";

/// EV engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EvConfig {
    /// Minimum EV% an opportunity must reach; equal EV is kept
    pub ev_threshold: f64,
    /// Minimum full-game spread line difference, for callers
    pub spread_threshold: f64,
    /// Minimum full-game total line difference, for callers
    pub total_threshold: f64,
    /// Minimum line difference for any non-full period, for callers
    pub half_threshold: f64,
    /// Reference book name
    pub sharp_name: String,
    /// Secondary reference when the primary has nothing for a market
    pub fallback_sharp: Option<String>,
    pub kelly_multiplier: f64,
    /// Interpolated candidates priced worse than this are dropped
    pub max_favorite_odds: f64,
    /// Same cutoff for candidates the book labels as alternate lines
    pub max_alt_favorite_odds: f64,
    /// Skip basketball markets unless some book flags a timeout
    pub require_timeout: bool,
    /// Periods to scan; `None` scans every period of the sport
    pub periods: Option<Vec<String>>,
    /// Sports priced from the nearest reference line without interpolation
    pub nearest_line_sports: Vec<Sport>,
}

impl Default for EvConfig {
    fn default() -> Self {
        Self {
            ev_threshold: -100.0,
            spread_threshold: 1.5,
            total_threshold: 1.5,
            half_threshold: 1.5,
            sharp_name: DEFAULT_SHARP.to_string(),
            fallback_sharp: None,
            kelly_multiplier: DEFAULT_KELLY_MULTIPLIER,
            max_favorite_odds: -150.0,
            max_alt_favorite_odds: -120.0,
            require_timeout: false,
            periods: None,
            nearest_line_sports: Vec::new(),
        }
    }
}

impl EvConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let sharp_name = lookup("EV_SHARP_NAME")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.sharp_name);
        let fallback_sharp = lookup("EV_FALLBACK_SHARP")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let periods = lookup("EV_PERIODS").map(|raw| parse_csv(&raw)).filter(|p| !p.is_empty());

        let nearest_line_sports = match lookup("EV_NEAREST_LINE_SPORTS") {
            Some(raw) => parse_csv(&raw)
                .iter()
                .map(|s| Sport::from_str(s).map_err(|e| anyhow!("Invalid EV_NEAREST_LINE_SPORTS: {e}")))
                .collect::<Result<Vec<_>>>()?,
            None => defaults.nearest_line_sports,
        };

        Ok(Self {
            ev_threshold: parse_f64(&lookup, "EV_THRESHOLD", defaults.ev_threshold)?,
            spread_threshold: parse_f64(&lookup, "EV_SPREAD_THRESHOLD", defaults.spread_threshold)?,
            total_threshold: parse_f64(&lookup, "EV_TOTAL_THRESHOLD", defaults.total_threshold)?,
            half_threshold: parse_f64(&lookup, "EV_HALF_THRESHOLD", defaults.half_threshold)?,
            sharp_name,
            fallback_sharp,
            kelly_multiplier: parse_f64(&lookup, "EV_KELLY_MULTIPLIER", defaults.kelly_multiplier)?,
            max_favorite_odds: parse_f64(&lookup, "EV_MAX_FAVORITE_ODDS", defaults.max_favorite_odds)?,
            max_alt_favorite_odds: parse_f64(
                &lookup,
                "EV_MAX_ALT_FAVORITE_ODDS",
                defaults.max_alt_favorite_odds,
            )?,
            require_timeout: parse_bool(&lookup, "EV_REQUIRE_TIMEOUT", defaults.require_timeout),
            periods,
            nearest_line_sports,
        })
    }

    /// Minimum line difference a caller should require before flagging a
    /// discrepancy between books on this period/market.
    pub fn line_difference_threshold(&self, period: &str, market: MarketKind) -> f64 {
        if period == FULL_GAME {
            if market == MarketKind::Spread {
                self.spread_threshold
            } else {
                self.total_threshold
            }
        } else {
            self.half_threshold
        }
    }

    /// Reference books in priority order: the sharp, then the fallback
    pub fn reference_books(&self) -> Vec<&str> {
        std::iter::once(self.sharp_name.as_str())
            .chain(self.fallback_sharp.as_deref())
            .collect()
    }

    /// Periods to scan for a sport
    pub fn periods_for(&self, sport: Sport) -> Vec<String> {
        match &self.periods {
            Some(periods) => periods.clone(),
            None => sport.period_labels().into_iter().map(String::from).collect(),
        }
    }

    /// Whether non-exact lines are interpolated for this sport
    pub fn interpolates(&self, sport: Sport) -> bool {
        !self.nearest_line_sports.contains(&sport)
    }
}

/// Market normalizer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizerConfig {
    pub timeout_vig_threshold: f64,
    /// Events whose league name contains any of these are skipped
    pub excluded_league_markers: Vec<String>,
    /// Events whose home team contains any of these are skipped (prop pseudo-events)
    pub excluded_team_markers: Vec<String>,
    /// Timezone used for the display date
    pub display_timezone: Tz,
    /// An event is kept only if one of these periods survived
    pub tracked_periods: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            timeout_vig_threshold: DEFAULT_TIMEOUT_VIG_THRESHOLD,
            excluded_league_markers: Vec::new(),
            excluded_team_markers: vec!["(Hits+Runs+Errors)".to_string()],
            display_timezone: chrono_tz::US::Eastern,
            tracked_periods: ["full", "half", "ot", "2h"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl NormalizerConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let display_timezone = match lookup("NORMALIZER_TIMEZONE") {
            Some(raw) => Tz::from_str(raw.trim()).map_err(|_| {
                anyhow!(
                    "Invalid NORMALIZER_TIMEZONE: {} (expected IANA tz like America/New_York)",
                    raw
                )
            })?,
            None => defaults.display_timezone,
        };

        Ok(Self {
            timeout_vig_threshold: parse_f64(
                &lookup,
                "NORMALIZER_TIMEOUT_VIG",
                defaults.timeout_vig_threshold,
            )?,
            excluded_league_markers: lookup("NORMALIZER_EXCLUDED_LEAGUES")
                .map(|raw| parse_csv(&raw))
                .unwrap_or(defaults.excluded_league_markers),
            excluded_team_markers: lookup("NORMALIZER_EXCLUDED_TEAMS")
                .map(|raw| parse_csv(&raw))
                .unwrap_or(defaults.excluded_team_markers),
            display_timezone,
            tracked_periods: lookup("NORMALIZER_TRACKED_PERIODS")
                .map(|raw| parse_csv(&raw))
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.tracked_periods),
        })
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_f64<F>(lookup: &F, key: &str, default: f64) -> Result<f64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .with_context(|| format!("Invalid {key}: {raw} (expected number)")),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EvConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, EvConfig::default());
        assert_eq!(config.sharp_name, "pin");
        assert_eq!(config.kelly_multiplier, DEFAULT_KELLY_MULTIPLIER);
    }

    #[test]
    fn test_overrides() {
        let config = EvConfig::from_lookup(lookup_from(&[
            ("EV_THRESHOLD", "2.5"),
            ("EV_FALLBACK_SHARP", "cir"),
            ("EV_REQUIRE_TIMEOUT", "yes"),
            ("EV_PERIODS", "full, half"),
            ("EV_NEAREST_LINE_SPORTS", "hockey,baseball"),
            ("EV_MAX_ALT_FAVORITE_ODDS", "-130"),
        ]))
        .unwrap();
        assert_eq!(config.ev_threshold, 2.5);
        assert_eq!(config.fallback_sharp.as_deref(), Some("cir"));
        assert!(config.require_timeout);
        assert_eq!(config.periods_for(Sport::Football), vec!["full", "half"]);
        assert!(!config.interpolates(Sport::Hockey));
        assert!(config.interpolates(Sport::Basketball));
        assert_eq!(config.max_alt_favorite_odds, -130.0);
    }

    #[test]
    fn test_malformed_value_names_variable() {
        let err = EvConfig::from_lookup(lookup_from(&[("EV_THRESHOLD", "lots")])).unwrap_err();
        assert!(err.to_string().contains("EV_THRESHOLD"));
        assert!(EvConfig::from_lookup(lookup_from(&[("EV_NEAREST_LINE_SPORTS", "curling")])).is_err());
    }

    #[test]
    fn test_line_difference_threshold() {
        let config = EvConfig {
            spread_threshold: 1.0,
            total_threshold: 2.0,
            half_threshold: 0.5,
            ..Default::default()
        };
        assert_eq!(config.line_difference_threshold("full", MarketKind::Spread), 1.0);
        assert_eq!(config.line_difference_threshold("full", MarketKind::Total), 2.0);
        assert_eq!(config.line_difference_threshold("half", MarketKind::Spread), 0.5);
    }

    #[test]
    fn test_default_periods_follow_sport() {
        let config = EvConfig::default();
        assert_eq!(config.periods_for(Sport::Basketball), vec!["full"]);
        assert_eq!(config.periods_for(Sport::Hockey).len(), 5);
    }

    #[test]
    fn test_normalizer_config() {
        let config = NormalizerConfig::from_lookup(lookup_from(&[
            ("NORMALIZER_TIMEZONE", "Europe/London"),
            ("NORMALIZER_EXCLUDED_LEAGUES", "NCAA"),
        ]))
        .unwrap();
        assert_eq!(config.display_timezone, chrono_tz::Europe::London);
        assert_eq!(config.excluded_league_markers, vec!["NCAA"]);
        assert_eq!(config.timeout_vig_threshold, DEFAULT_TIMEOUT_VIG_THRESHOLD);

        assert!(NormalizerConfig::from_lookup(lookup_from(&[("NORMALIZER_TIMEZONE", "Mars/Base")])).is_err());
    }
}
