//! Market normalizer for the reference book's raw feed.
//!
//! This module provides:
//! - Serde types for the raw per-event payload (decimal odds, `num_N` period slots)
//! - Conversion into canonical [`EventSnapshot`]s keyed by `"{away} @ {home}"`
//! - Juice-timeout detection on the full-game main spread
//!
//! Periods that are closed or past their cutoff are dropped, a zero handicap
//! spread becomes the period's moneyline, and events with no tracked period
//! left are dropped entirely.

use chrono::{DateTime, NaiveDateTime, Utc};
use rayon::prelude::*;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, warn};

use crate::config::NormalizerConfig;
use crate::odds::{calculate_vig, decimal_to_american};
use crate::snapshot::{
    BookSnapshot, EventInfo, EventSnapshot, Line, LineQuote, MoneyLine, PeriodMarkets, ThreeWay,
};
use crate::types::{Sport, FULL_GAME};

/// Raw period status meaning the period is off the board
pub const PERIOD_CLOSED: i64 = 2;

// ============================================================================
// Raw payload
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFeed {
    /// Events that fail to parse are logged and dropped
    #[serde(default, deserialize_with = "lenient_events")]
    pub events: Vec<RawEvent>,
}

/// Event ids arrive as numbers or strings depending on the endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawEventId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RawEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawEventId::Number(n) => write!(f, "{}", n),
            RawEventId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub event_id: RawEventId,
    #[serde(default)]
    pub league_name: String,
    pub home: String,
    pub away: String,
    /// Naive UTC start time
    pub starts: String,
    #[serde(default, deserialize_with = "lenient_periods")]
    pub periods: HashMap<String, RawPeriod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPeriod {
    #[serde(default)]
    pub period_status: Option<i64>,
    #[serde(default)]
    pub cutoff: Option<String>,
    #[serde(default)]
    pub money_line: Option<RawMoneyLine>,
    /// Feed order is kept: a later pick'em entry overrides an earlier one
    #[serde(default, deserialize_with = "ordered_entries")]
    pub spreads: Option<Vec<RawSpread>>,
    #[serde(default, deserialize_with = "ordered_entries")]
    pub totals: Option<Vec<RawTotal>>,
    #[serde(default)]
    pub meta: Option<RawMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMoneyLine {
    pub home: Option<f64>,
    pub away: Option<f64>,
    pub draw: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSpread {
    #[serde(default)]
    pub hdp: Option<f64>,
    pub home: Option<f64>,
    pub away: Option<f64>,
    #[serde(default)]
    pub alt_line_id: Option<i64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTotal {
    #[serde(default)]
    pub points: Option<f64>,
    pub over: Option<f64>,
    pub under: Option<f64>,
    #[serde(default)]
    pub alt_line_id: Option<i64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMeta {
    pub max_money_line: Option<f64>,
}

/// A feed entry that either parses or is kept as raw JSON for the log.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Parsed(T),
    Malformed(serde_json::Value),
}

impl<T> Lenient<T> {
    fn parsed(self, entry: &str) -> Option<T> {
        match self {
            Lenient::Parsed(value) => Some(value),
            Lenient::Malformed(raw) => {
                debug!(entry, raw = %raw, "dropping malformed feed entry");
                None
            }
        }
    }
}

fn lenient_events<'de, D>(deserializer: D) -> Result<Vec<RawEvent>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Option<Vec<Lenient<RawEvent>>> = Option::deserialize(deserializer)?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| match entry {
            Lenient::Parsed(event) => Some(event),
            Lenient::Malformed(raw) => {
                warn!(event_id = %raw.get("event_id").unwrap_or(&serde_json::Value::Null), "dropping malformed event");
                None
            }
        })
        .collect())
}

fn lenient_periods<'de, D>(deserializer: D) -> Result<HashMap<String, RawPeriod>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Option<HashMap<String, Lenient<RawPeriod>>> = Option::deserialize(deserializer)?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, entry)| entry.parsed(&key).map(|period| (key, period)))
        .collect())
}

/// Spread/total entries from a keyed object or a list, in document order.
fn ordered_entries<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct EntriesVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
        type Value = Option<Vec<T>>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map or list of line entries")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some((key, entry)) = map.next_entry::<String, Lenient<T>>()? {
                out.extend(entry.parsed(&key));
            }
            Ok(Some(out))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some(entry) = seq.next_element::<Lenient<T>>()? {
                out.extend(entry.parsed("line"));
            }
            Ok(Some(out))
        }
    }

    deserializer.deserialize_any(EntriesVisitor(PhantomData))
}

fn is_alt(alt_line_id: Option<i64>) -> bool {
    matches!(alt_line_id, Some(id) if id != 0)
}

impl RawPeriod {
    fn is_empty(&self) -> bool {
        self.money_line.is_none() && self.spreads.is_none() && self.totals.is_none()
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Decimal feed price to American, treating unusable prices as unavailable.
fn to_american(decimal: Option<f64>) -> Option<f64> {
    let decimal = decimal?;
    match decimal_to_american(decimal) {
        Ok(american) => Some(american as f64),
        Err(e) => {
            debug!(decimal, error = %e, "treating feed price as unavailable");
            None
        }
    }
}

/// Parse a feed timestamp; naive values are UTC.
pub fn parse_feed_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// True when a main spread's two American prices carry less vig than `threshold`.
pub fn is_timeout_spread(home: f64, away: f64, threshold: f64) -> bool {
    match calculate_vig(&[home, away]) {
        Ok(vig) => vig < threshold,
        Err(_) => false,
    }
}

/// Reshapes one sport's raw feed into canonical snapshots.
#[derive(Debug, Clone)]
pub struct MarketNormalizer {
    sport: Sport,
    config: NormalizerConfig,
}

impl MarketNormalizer {
    pub fn new(sport: Sport, config: NormalizerConfig) -> Self {
        Self { sport, config }
    }

    pub fn sport(&self) -> Sport {
        self.sport
    }

    /// Normalize every event in the feed, evaluated against `now`.
    pub fn normalize_feed(&self, feed: &RawFeed, now: DateTime<Utc>) -> BookSnapshot {
        feed.events
            .par_iter()
            .filter_map(|event| self.normalize_event(event, now))
            .collect()
    }

    /// Normalize one event; `None` when excluded or nothing tradeable remains.
    pub fn normalize_event(
        &self,
        event: &RawEvent,
        now: DateTime<Utc>,
    ) -> Option<(String, EventSnapshot)> {
        let config = &self.config;
        if config
            .excluded_league_markers
            .iter()
            .any(|m| event.league_name.contains(m.as_str()))
        {
            return None;
        }
        if config
            .excluded_team_markers
            .iter()
            .any(|m| event.home.contains(m.as_str()))
        {
            return None;
        }

        let starts = match parse_feed_time(&event.starts) {
            Some(t) => t,
            None => {
                warn!(event_id = %event.event_id, starts = %event.starts, "unparseable start time");
                return None;
            }
        };

        let mut info = EventInfo {
            league: event.league_name.clone(),
            start: event.starts.clone(),
            sql_key: event.event_id.to_string(),
            date: starts
                .with_timezone(&config.display_timezone)
                .format("%b %d")
                .to_string(),
            is_timeout: false,
            score: None,
        };

        let mut periods = BTreeMap::new();
        for spec in self.sport.periods() {
            let Some(raw) = event.periods.get(spec.feed_key) else {
                continue;
            };
            if raw.is_empty() || raw.period_status == Some(PERIOD_CLOSED) {
                continue;
            }
            match raw.cutoff.as_deref().and_then(parse_feed_time) {
                Some(cutoff) if now <= cutoff => {}
                Some(_) => continue,
                None => {
                    debug!(event_id = %event.event_id, period = spec.label, "period without cutoff");
                    continue;
                }
            }
            let markets = self.normalize_period(spec.label, raw, &mut info);
            periods.insert(spec.label.to_string(), markets);
        }

        let tracked = config
            .tracked_periods
            .iter()
            .any(|label| periods.contains_key(label));
        if !tracked {
            return None;
        }

        let key = format!("{} @ {}", event.away, event.home);
        Some((key, EventSnapshot { info, periods }))
    }

    fn normalize_period(&self, label: &str, raw: &RawPeriod, info: &mut EventInfo) -> PeriodMarkets {
        let mut markets = PeriodMarkets::default();

        let money_line = raw.money_line.clone().unwrap_or_default();
        let max_money_line = raw.meta.as_ref().and_then(|m| m.max_money_line);
        if self.sport.is_three_way(label) {
            markets.three_way = Some(ThreeWay::new(
                to_american(money_line.home),
                to_american(money_line.away),
                to_american(money_line.draw),
                max_money_line,
            ));
        } else {
            markets.money_line = Some(MoneyLine::new(
                to_american(money_line.home),
                to_american(money_line.away),
                max_money_line,
            ));
        }

        for spread in raw.spreads.iter().flatten() {
            let Some(hdp) = spread.hdp else {
                debug!(period = label, "spread entry without a handicap");
                continue;
            };
            let home = to_american(spread.home);
            let away = to_american(spread.away);

            // Pick'em spread is the moneyline
            if hdp == 0.0 {
                markets.money_line = Some(MoneyLine::new(home, away, spread.max));
                continue;
            }

            let alt = is_alt(spread.alt_line_id);
            if !alt && label == FULL_GAME {
                if let (Some(h), Some(a)) = (home, away) {
                    if is_timeout_spread(h, a, self.config.timeout_vig_threshold) {
                        info.is_timeout = true;
                    }
                }
            }
            markets
                .spread
                .insert(Line::new(hdp), LineQuote::new(home, away, alt, spread.max));
        }

        for total in raw.totals.iter().flatten() {
            let Some(points) = total.points else {
                debug!(period = label, "total entry without points");
                continue;
            };
            markets.total.insert(
                Line::new(points),
                LineQuote::new(
                    to_american(total.over),
                    to_american(total.under),
                    is_alt(total.alt_line_id),
                    total.max,
                ),
            );
        }

        markets
    }
}
