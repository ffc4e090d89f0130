//! Canonical per-book market snapshots.
//!
//! JSON shape (one event of one book):
//!
//! ```json
//! {
//!   "info": {"league": "...", "start": "2024-01-05T00:10:00", "sql_key": "155",
//!            "date": "Jan 04", "is_timeout": false},
//!   "full": {
//!     "Money Line": {"home": -150, "away": 130, "max": 2000.0},
//!     "spread": {"-3.0": {"one": -110, "two": -110, "alt": false, "max": 5000.0}},
//!     "total": {"220.5": {"one": -108, "two": -112, "alt": false, "max": 3000.0}}
//!   }
//! }
//! ```
//!
//! Quotes arrive as a bare number, an `[odds, link]` pair or an
//! `{odds, link}` record; all three collapse into [`Quote`] on ingestion so
//! nothing downstream switches on shape.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

use crate::odds::{format_line, UNAVAILABLE};
use crate::types::{MarketKind, Side};

// ============================================================================
// Line values
// ============================================================================

/// A spread handicap or total points value, ordered and hashable.
#[derive(Clone, Copy, Debug)]
pub struct Line(f64);

impl Line {
    pub fn new(value: f64) -> Self {
        // -0.0 and 0.0 must be the same key
        Self(if value == 0.0 { 0.0 } else { value })
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Line {
    fn from(value: f64) -> Self {
        Line::new(value)
    }
}

impl PartialEq for Line {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Line {}

impl PartialOrd for Line {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Line {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Line {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_line(self.0))
    }
}

impl Serialize for Line {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Lines are JSON object keys, which must be strings
        serializer.serialize_str(&format_line(self.0))
    }
}

struct LineVisitor;

impl<'de> Visitor<'de> for LineVisitor {
    type Value = Line;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a line value as a number or numeric string")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Line, E> {
        Ok(Line::new(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Line, E> {
        Ok(Line::new(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Line, E> {
        Ok(Line::new(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Line, E> {
        v.trim()
            .parse::<f64>()
            .map(Line::new)
            .map_err(|_| E::custom(format!("invalid line value: {}", v)))
    }
}

impl<'de> Deserialize<'de> for Line {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LineVisitor)
    }
}

// ============================================================================
// Quotes
// ============================================================================

/// One offered price with an optional deep link.
///
/// `odds == None` is the unavailable sentinel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Quote {
    pub odds: Option<f64>,
    pub link: Option<String>,
    /// Book's own market label, used to spot alternate lines
    pub market: Option<String>,
}

impl Quote {
    pub fn price(odds: f64) -> Self {
        Self {
            odds: Some(odds),
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = Some(market.into());
        self
    }

    /// True when the book labels this price as an alternate line
    pub fn is_alternate_market(&self) -> bool {
        self.market
            .as_deref()
            .map(|m| m.to_lowercase().contains("alternate"))
            .unwrap_or(false)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOdds {
    Number(f64),
    Text(String),
    Null,
}

impl RawOdds {
    /// Unreadable odds text is the unavailable sentinel, not an error.
    fn into_odds(self) -> Option<f64> {
        match self {
            RawOdds::Number(n) => Some(n),
            RawOdds::Null => None,
            RawOdds::Text(s) => {
                let s = s.trim();
                if s.is_empty() || s.eq_ignore_ascii_case(UNAVAILABLE) {
                    return None;
                }
                match s.trim_start_matches('+').parse::<f64>() {
                    Ok(odds) => Some(odds),
                    Err(_) => {
                        debug!(odds = s, "treating unreadable odds as unavailable");
                        None
                    }
                }
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuote {
    Record {
        odds: RawOdds,
        #[serde(default)]
        link: Option<String>,
        #[serde(default)]
        market: Option<String>,
    },
    Pair(RawOdds, Option<String>),
    Scalar(RawOdds),
}

impl<'de> Deserialize<'de> for Quote {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawQuote::deserialize(deserializer)?;
        let (odds, link, market) = match raw {
            RawQuote::Record { odds, link, market } => (odds, link, market),
            RawQuote::Pair(odds, link) => (odds, link, None),
            RawQuote::Scalar(odds) => (odds, None, None),
        };
        Ok(Quote {
            odds: odds.into_odds(),
            link,
            market,
        })
    }
}

#[derive(Serialize)]
struct QuoteRecord<'a> {
    odds: Option<f64>,
    link: &'a Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    market: &'a Option<String>,
}

impl Serialize for Quote {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.link.is_none() && self.market.is_none() {
            self.odds.serialize(serializer)
        } else {
            QuoteRecord {
                odds: self.odds,
                link: &self.link,
                market: &self.market,
            }
            .serialize(serializer)
        }
    }
}

fn quote_odds(quote: &Option<Quote>) -> Option<f64> {
    quote.as_ref().and_then(|q| q.odds)
}

// ============================================================================
// Markets
// ============================================================================

/// Both sides of one spread or total line.
///
/// `one` is home (spread) or over (total); `two` is away or under.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LineQuote {
    #[serde(default)]
    pub one: Option<Quote>,
    #[serde(default)]
    pub two: Option<Quote>,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub max: Option<f64>,
}

impl LineQuote {
    pub fn new(one: Option<f64>, two: Option<f64>, alt: bool, max: Option<f64>) -> Self {
        Self {
            one: one.map(Quote::price),
            two: two.map(Quote::price),
            alt,
            max,
        }
    }

    pub fn one_odds(&self) -> Option<f64> {
        quote_odds(&self.one)
    }

    pub fn two_odds(&self) -> Option<f64> {
        quote_odds(&self.two)
    }

    pub fn side(&self, side: Side) -> Option<&Quote> {
        match side {
            Side::One | Side::Home => self.one.as_ref(),
            Side::Two | Side::Away => self.two.as_ref(),
            _ => None,
        }
    }

    pub fn side_odds(&self, side: Side) -> Option<f64> {
        self.side(side).and_then(|q| q.odds)
    }
}

/// Two-way winner market.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoneyLine {
    #[serde(default)]
    pub home: Option<Quote>,
    #[serde(default)]
    pub away: Option<Quote>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl MoneyLine {
    pub fn new(home: Option<f64>, away: Option<f64>, max: Option<f64>) -> Self {
        Self {
            home: home.map(Quote::price),
            away: away.map(Quote::price),
            max,
        }
    }

    pub fn side(&self, side: Side) -> Option<&Quote> {
        match side {
            Side::Home => self.home.as_ref(),
            Side::Away => self.away.as_ref(),
            _ => None,
        }
    }

    pub fn side_odds(&self, side: Side) -> Option<f64> {
        self.side(side).and_then(|q| q.odds)
    }
}

/// Three-way winner market (`one` home, `two` away, `three` draw).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreeWay {
    #[serde(default)]
    pub one: Option<Quote>,
    #[serde(default)]
    pub two: Option<Quote>,
    #[serde(default)]
    pub three: Option<Quote>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl ThreeWay {
    pub fn new(one: Option<f64>, two: Option<f64>, three: Option<f64>, max: Option<f64>) -> Self {
        Self {
            one: one.map(Quote::price),
            two: two.map(Quote::price),
            three: three.map(Quote::price),
            max,
        }
    }

    pub fn side(&self, side: Side) -> Option<&Quote> {
        match side {
            Side::One | Side::Home => self.one.as_ref(),
            Side::Two | Side::Away => self.two.as_ref(),
            Side::Three | Side::Draw => self.three.as_ref(),
        }
    }

    pub fn side_odds(&self, side: Side) -> Option<f64> {
        self.side(side).and_then(|q| q.odds)
    }
}

/// Line value -> both sides, ordered by line.
pub type LineTable = BTreeMap<Line, LineQuote>;

/// Every market of one period.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodMarkets {
    #[serde(rename = "Money Line", default, skip_serializing_if = "Option::is_none")]
    pub money_line: Option<MoneyLine>,
    #[serde(rename = "3-way", default, skip_serializing_if = "Option::is_none")]
    pub three_way: Option<ThreeWay>,
    #[serde(default)]
    pub spread: LineTable,
    #[serde(default)]
    pub total: LineTable,
}

impl PeriodMarkets {
    /// Give every quote without its own link the event-level one.
    fn fill_links(&mut self, link: &str) {
        let money_line = self
            .money_line
            .iter_mut()
            .flat_map(|m| [&mut m.home, &mut m.away]);
        let three_way = self
            .three_way
            .iter_mut()
            .flat_map(|t| [&mut t.one, &mut t.two, &mut t.three]);
        let lines = self
            .spread
            .values_mut()
            .chain(self.total.values_mut())
            .flat_map(|l| [&mut l.one, &mut l.two]);

        for quote in money_line.chain(three_way).chain(lines).flatten() {
            if quote.link.is_none() {
                quote.link = Some(link.to_string());
            }
        }
    }

    /// Owned copy of one market, `None` when the book has nothing for it.
    pub fn market(&self, kind: MarketKind) -> Option<MarketQuotes> {
        match kind {
            MarketKind::MoneyLine => self.money_line.clone().map(MarketQuotes::MoneyLine),
            MarketKind::ThreeWay => self.three_way.clone().map(MarketQuotes::ThreeWay),
            MarketKind::Spread if !self.spread.is_empty() => {
                Some(MarketQuotes::Spread(self.spread.clone()))
            }
            MarketKind::Total if !self.total.is_empty() => {
                Some(MarketQuotes::Total(self.total.clone()))
            }
            _ => None,
        }
    }
}

/// One market's quotes, tagged by market shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MarketQuotes {
    MoneyLine(MoneyLine),
    ThreeWay(ThreeWay),
    Spread(LineTable),
    Total(LineTable),
}

impl MarketQuotes {
    pub fn kind(&self) -> MarketKind {
        match self {
            MarketQuotes::MoneyLine(_) => MarketKind::MoneyLine,
            MarketQuotes::ThreeWay(_) => MarketKind::ThreeWay,
            MarketQuotes::Spread(_) => MarketKind::Spread,
            MarketQuotes::Total(_) => MarketKind::Total,
        }
    }

    pub fn lines(&self) -> Option<&LineTable> {
        match self {
            MarketQuotes::Spread(t) | MarketQuotes::Total(t) => Some(t),
            _ => None,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Event metadata carried next to the markets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    #[serde(default)]
    pub league: String,
    /// Start time as a naive ISO-8601 string, as sent by the feed
    #[serde(default)]
    pub start: String,
    /// External event id
    #[serde(default)]
    pub sql_key: String,
    /// Display date, e.g. "Jan 04"
    #[serde(default)]
    pub date: String,
    /// Anomalously tight full-game spread; treat prices with caution
    #[serde(default)]
    pub is_timeout: bool,
    /// Live score, when the book sends one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
}

/// All markets of one event at one book at one point in time.
///
/// Never mutated after construction; a new fetch produces a new snapshot.
///
/// Ingestion also accepts the wrapped shape `{"info", "link", "odds": {period: ...}}`;
/// the event link becomes the link of every quote that has none. Periods
/// that fail to parse are dropped on their own.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EventSnapshot {
    pub info: EventInfo,
    #[serde(flatten)]
    pub periods: BTreeMap<String, PeriodMarkets>,
}

impl EventSnapshot {
    pub fn period(&self, label: &str) -> Option<&PeriodMarkets> {
        self.periods.get(label)
    }
}

impl<'de> Deserialize<'de> for EventSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = serde_json::Map::<String, Value>::deserialize(deserializer)?;

        let info = match fields.remove("info") {
            Some(info) => EventInfo::deserialize(info).map_err(de::Error::custom)?,
            None => EventInfo::default(),
        };
        let link = match fields.remove("link") {
            Some(Value::String(link)) => Some(link),
            _ => None,
        };
        if let Some(Value::Object(odds)) = fields.remove("odds") {
            fields.extend(odds);
        }

        let mut periods = BTreeMap::new();
        for (label, value) in fields {
            match PeriodMarkets::deserialize(value) {
                Ok(mut markets) => {
                    if let Some(link) = &link {
                        markets.fill_links(link);
                    }
                    periods.insert(label, markets);
                }
                Err(e) => debug!(period = %label, error = %e, "skipping malformed period"),
            }
        }
        Ok(EventSnapshot { info, periods })
    }
}

/// One book's snapshots keyed by `"{away} @ {home}"`.
pub type BookSnapshot = BTreeMap<String, EventSnapshot>;

/// A book's snapshot tagged with the book's name.
///
/// A malformed event is logged and dropped; the rest of the book survives.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BookData {
    pub book: String,
    pub events: BookSnapshot,
}

impl<'de> Deserialize<'de> for BookData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RawBook {
            book: String,
            #[serde(default)]
            events: BTreeMap<String, Value>,
        }

        let raw = RawBook::deserialize(deserializer)?;
        let mut events = BookSnapshot::new();
        for (game, value) in raw.events {
            match EventSnapshot::deserialize(value) {
                Ok(snapshot) => {
                    events.insert(game, snapshot);
                }
                Err(e) => warn!(book = %raw.book, game = %game, error = %e, "dropping malformed event"),
            }
        }
        Ok(BookData {
            book: raw.book,
            events,
        })
    }
}

impl BookData {
    pub fn new(book: impl Into<String>, events: BookSnapshot) -> Self {
        Self {
            book: book.into(),
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_shapes_normalize() {
        let scalar: Quote = serde_json::from_str("-110").unwrap();
        assert_eq!(scalar, Quote::price(-110.0));

        let pair: Quote = serde_json::from_str(r#"[150, "https://book/bet/1"]"#).unwrap();
        assert_eq!(pair.odds, Some(150.0));
        assert_eq!(pair.link.as_deref(), Some("https://book/bet/1"));

        let record: Quote =
            serde_json::from_str(r#"{"odds": "+125", "link": null, "market": "Alternate Spread"}"#)
                .unwrap();
        assert_eq!(record.odds, Some(125.0));
        assert!(record.is_alternate_market());
    }

    #[test]
    fn test_unavailable_quotes() {
        let na: Quote = serde_json::from_str(r#""N/A""#).unwrap();
        assert_eq!(na.odds, None);
        let null_pair: Quote = serde_json::from_str(r#"[null, null]"#).unwrap();
        assert_eq!(null_pair.odds, None);
        let unreadable: Quote = serde_json::from_str(r#"["EVEN", "https://book/bet/2"]"#).unwrap();
        assert_eq!(unreadable.odds, None);
        assert_eq!(unreadable.link.as_deref(), Some("https://book/bet/2"));
    }

    #[test]
    fn test_line_keys() {
        assert_eq!(Line::new(-0.0), Line::new(0.0));
        assert!(Line::new(-3.0) < Line::new(-2.5));
        assert_eq!(Line::new(-3.0).to_string(), "-3.0");

        let table: LineTable =
            serde_json::from_str(r#"{"-3.0": {"one": -110, "two": -110}, "-2.5": {"one": -125, "two": 105, "alt": true}}"#)
                .unwrap();
        let lines: Vec<f64> = table.keys().map(|l| l.value()).collect();
        assert_eq!(lines, vec![-3.0, -2.5]);
        assert!(table[&Line::new(-2.5)].alt);
    }

    #[test]
    fn test_event_snapshot_round_trip_shape() {
        let json = r#"{
            "info": {"league": "NBA", "start": "2024-01-05T00:10:00", "sql_key": "155",
                     "date": "Jan 04", "is_timeout": false},
            "full": {
                "Money Line": {"home": -150, "away": 130, "max": 2000.0},
                "spread": {"-3.0": {"one": -110, "two": -110, "alt": false, "max": 5000.0}},
                "total": {}
            }
        }"#;
        let snap: EventSnapshot = serde_json::from_str(json).unwrap();
        let full = snap.period("full").unwrap();
        assert_eq!(full.money_line.as_ref().unwrap().side_odds(Side::Home), Some(-150.0));
        assert!(full.market(MarketKind::Total).is_none());
        assert!(full.market(MarketKind::Spread).is_some());

        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value["full"]["Money Line"]["away"], serde_json::json!(130.0));
        assert_eq!(value["full"]["spread"]["-3.0"]["max"], serde_json::json!(5000.0));
        assert_eq!(value["info"]["sql_key"], "155");
    }

    #[test]
    fn test_wrapped_event_lifts_link() {
        let json = r#"{
            "info": {"league": "NFL", "sql_key": "77"},
            "link": "https://book/event/77",
            "odds": {
                "full": {
                    "Money Line": {"home": [-120, "https://book/bet/9"], "away": 100},
                    "spread": {"-1.5": {"one": 140, "two": -170}}
                }
            }
        }"#;
        let snap: EventSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.info.sql_key, "77");
        assert_eq!(snap.periods.len(), 1);

        let full = snap.period("full").unwrap();
        let ml = full.money_line.as_ref().unwrap();
        assert_eq!(ml.home.as_ref().unwrap().link.as_deref(), Some("https://book/bet/9"));
        assert_eq!(ml.away.as_ref().unwrap().link.as_deref(), Some("https://book/event/77"));
        let line = &full.spread[&Line::new(-1.5)];
        assert_eq!(line.two.as_ref().unwrap().link.as_deref(), Some("https://book/event/77"));
    }

    #[test]
    fn test_malformed_parts_are_dropped_alone() {
        let json = r#"{
            "book": "fd",
            "events": {
                "A @ B": {"full": {"Money Line": {"home": "EVEN", "away": -110}}, "sport": "football"},
                "C @ D": {"info": "not an object"},
                "E @ F": {"full": {"Money Line": {"home": 120, "away": -140}}}
            }
        }"#;
        let book: BookData = serde_json::from_str(json).unwrap();
        assert_eq!(book.book, "fd");
        assert_eq!(book.events.len(), 2);
        assert!(!book.events.contains_key("C @ D"));

        let first = &book.events["A @ B"];
        // Unknown event-level keys don't take the event down with them
        assert_eq!(first.periods.len(), 1);
        let ml = first.period("full").unwrap().money_line.as_ref().unwrap();
        assert_eq!(ml.side_odds(Side::Home), None);
        assert_eq!(ml.side_odds(Side::Away), Some(-110.0));
    }
}
