//! Sport, period and market taxonomy shared by the normalizer and engine.

use serde::{Deserialize, Serialize};

/// Supported sports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Soccer,
    Tennis,
    Basketball,
    Hockey,
    Football,
    Baseball,
}

/// One tradeable period of an event: the feed's period slot and our label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodSpec {
    /// Key in the reference feed payload (e.g. "num_0")
    pub feed_key: &'static str,
    /// Canonical label (e.g. "full", "1q")
    pub label: &'static str,
}

const fn period(feed_key: &'static str, label: &'static str) -> PeriodSpec {
    PeriodSpec { feed_key, label }
}

static BASEBALL_PERIODS: &[PeriodSpec] = &[period("num_0", "full"), period("num_1", "half")];

static TENNIS_PERIODS: &[PeriodSpec] = &[
    period("num_0", "full"),
    period("num_1", "set 1"),
    period("num_2", "set 2"),
    period("num_3", "set 3"),
    period("num_4", "set 4"),
    period("num_5", "set 5"),
];

static BASKETBALL_PERIODS: &[PeriodSpec] = &[period("num_0", "full")];

static SOCCER_PERIODS: &[PeriodSpec] = &[
    period("num_0", "full"),
    period("num_1", "half"),
    period("num_3", "ot"),
    period("num_8", "qual"),
];

static FOOTBALL_PERIODS: &[PeriodSpec] = &[
    period("num_0", "full"),
    period("num_1", "half"),
    period("num_2", "2h"),
    period("num_3", "1q"),
    period("num_4", "2q"),
    period("num_5", "3q"),
    period("num_6", "4q"),
];

static HOCKEY_PERIODS: &[PeriodSpec] = &[
    period("num_0", "full"),
    period("num_1", "1p"),
    period("num_2", "2p"),
    period("num_3", "3p"),
    period("num_6", "reg"),
];

/// Label of the full-game period
pub const FULL_GAME: &str = "full";

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Soccer => "soccer",
            Sport::Tennis => "tennis",
            Sport::Basketball => "basketball",
            Sport::Hockey => "hockey",
            Sport::Football => "football",
            Sport::Baseball => "baseball",
        }
    }

    /// Sport id used by the reference odds feed
    pub fn feed_id(&self) -> u32 {
        match self {
            Sport::Soccer => 1,
            Sport::Tennis => 2,
            Sport::Basketball => 3,
            Sport::Hockey => 4,
            Sport::Football => 7,
            Sport::Baseball => 9,
        }
    }

    /// Fixed period layout, full game first
    pub fn periods(&self) -> &'static [PeriodSpec] {
        match self {
            Sport::Baseball => BASEBALL_PERIODS,
            Sport::Tennis => TENNIS_PERIODS,
            Sport::Basketball => BASKETBALL_PERIODS,
            Sport::Soccer => SOCCER_PERIODS,
            Sport::Football => FOOTBALL_PERIODS,
            Sport::Hockey => HOCKEY_PERIODS,
        }
    }

    pub fn period_labels(&self) -> Vec<&'static str> {
        self.periods().iter().map(|p| p.label).collect()
    }

    /// Whether the period's winner market includes a draw.
    ///
    /// Soccer always does; hockey only in regulation.
    pub fn is_three_way(&self, period_label: &str) -> bool {
        match self {
            Sport::Soccer => true,
            Sport::Hockey => period_label == "reg",
            _ => false,
        }
    }
}

impl std::str::FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "soccer" => Ok(Sport::Soccer),
            "tennis" => Ok(Sport::Tennis),
            "basketball" => Ok(Sport::Basketball),
            "hockey" => Ok(Sport::Hockey),
            "football" => Ok(Sport::Football),
            "baseball" => Ok(Sport::Baseball),
            other => Err(format!("unknown sport: {}", other)),
        }
    }
}

impl std::fmt::Display for Sport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market type keys as they appear in snapshots
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketKind {
    #[serde(rename = "Money Line")]
    MoneyLine,
    #[serde(rename = "3-way")]
    ThreeWay,
    #[serde(rename = "spread")]
    Spread,
    #[serde(rename = "total")]
    Total,
}

impl MarketKind {
    pub const ALL: [MarketKind; 4] = [
        MarketKind::Total,
        MarketKind::MoneyLine,
        MarketKind::Spread,
        MarketKind::ThreeWay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::MoneyLine => "Money Line",
            MarketKind::ThreeWay => "3-way",
            MarketKind::Spread => "spread",
            MarketKind::Total => "total",
        }
    }

    /// Spread and total markets are keyed by line value
    pub fn is_line_market(&self) -> bool {
        matches!(self, MarketKind::Spread | MarketKind::Total)
    }
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side tags for winner markets.
///
/// Two-way lines use `home`/`away`, three-way lines use `one`/`two`/`three`,
/// and line markets use `one`/`two` for home-or-over / away-or-under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
    Draw,
    One,
    Two,
    Three,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
            Side::Draw => "draw",
            Side::One => "one",
            Side::Two => "two",
            Side::Three => "three",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
