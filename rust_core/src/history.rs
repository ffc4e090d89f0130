//! Odds and limit history derived by diffing successive snapshots.
//!
//! Snapshots are immutable, so history is never recorded in place: the
//! storage collaborator diffs the previous cycle's snapshot against the new
//! one and persists the resulting [`SelectionChange`]s.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::odds::UNAVAILABLE;
use crate::snapshot::{BookSnapshot, EventSnapshot, LineTable, Quote};
use crate::types::{MarketKind, Side};

/// Identifies one bet within a book and event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SelectionKey {
    pub period: String,
    pub market: MarketKind,
    /// Line value for spreads and totals, side tag otherwise
    pub selection: String,
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.period, self.market, self.selection)
    }
}

/// Recorded state of one selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionState {
    /// Price text; spreads and totals record `"one,two,alt"`
    pub odds: String,
    pub limit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SelectionChange {
    Odds {
        key: SelectionKey,
        old: Option<String>,
        new: String,
    },
    Limit {
        key: SelectionKey,
        old: Option<f64>,
        new: Option<f64>,
    },
}

impl SelectionChange {
    pub fn key(&self) -> &SelectionKey {
        match self {
            SelectionChange::Odds { key, .. } | SelectionChange::Limit { key, .. } => key,
        }
    }
}

/// Changes for one event of one book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventChanges {
    pub game: String,
    pub sql_key: String,
    pub changes: Vec<SelectionChange>,
}

fn price_text(quote: Option<&Quote>) -> String {
    match quote.and_then(|q| q.odds) {
        Some(odds) if odds.fract() == 0.0 => format!("{}", odds as i64),
        Some(odds) => format!("{}", odds),
        None => UNAVAILABLE.to_string(),
    }
}

impl EventSnapshot {
    /// Every selection in the snapshot, ordered by key.
    pub fn selections(&self) -> BTreeMap<SelectionKey, SelectionState> {
        let mut out = BTreeMap::new();
        for (period, markets) in &self.periods {
            let key = |market: MarketKind, selection: String| SelectionKey {
                period: period.clone(),
                market,
                selection,
            };

            if let Some(ml) = &markets.money_line {
                for side in [Side::Home, Side::Away] {
                    out.insert(
                        key(MarketKind::MoneyLine, side.to_string()),
                        SelectionState {
                            odds: price_text(ml.side(side)),
                            limit: ml.max,
                        },
                    );
                }
            }
            if let Some(tw) = &markets.three_way {
                for side in [Side::One, Side::Two, Side::Three] {
                    out.insert(
                        key(MarketKind::ThreeWay, side.to_string()),
                        SelectionState {
                            odds: price_text(tw.side(side)),
                            limit: tw.max,
                        },
                    );
                }
            }
            for (kind, table) in [(MarketKind::Spread, &markets.spread), (MarketKind::Total, &markets.total)] {
                insert_lines(&mut out, &key, kind, table);
            }
        }
        out
    }
}

fn insert_lines<F>(
    out: &mut BTreeMap<SelectionKey, SelectionState>,
    key: &F,
    kind: MarketKind,
    table: &LineTable,
) where
    F: Fn(MarketKind, String) -> SelectionKey,
{
    for (line, quote) in table {
        out.insert(
            key(kind, line.to_string()),
            SelectionState {
                odds: format!(
                    "{},{},{}",
                    price_text(quote.one.as_ref()),
                    price_text(quote.two.as_ref()),
                    quote.alt
                ),
                limit: quote.max,
            },
        );
    }
}

/// Changes from `old` to `new`; every selection is new when `old` is `None`.
///
/// Selections that disappeared are not reported.
pub fn diff_snapshots(old: Option<&EventSnapshot>, new: &EventSnapshot) -> Vec<SelectionChange> {
    let previous = old.map(EventSnapshot::selections).unwrap_or_default();
    let mut changes = Vec::new();

    for (key, state) in new.selections() {
        let before = previous.get(&key);
        let old_odds = before.map(|s| s.odds.clone());
        if old_odds.as_deref() != Some(state.odds.as_str()) {
            changes.push(SelectionChange::Odds {
                key: key.clone(),
                old: old_odds,
                new: state.odds.clone(),
            });
        }

        let old_limit = before.and_then(|s| s.limit);
        if old_limit != state.limit {
            changes.push(SelectionChange::Limit {
                key,
                old: old_limit,
                new: state.limit,
            });
        }
    }
    changes
}

/// Diff every event of a book, skipping events with no changes.
pub fn diff_books(old: &BookSnapshot, new: &BookSnapshot) -> Vec<EventChanges> {
    new.iter()
        .filter_map(|(game, snapshot)| {
            let changes = diff_snapshots(old.get(game), snapshot);
            if changes.is_empty() {
                return None;
            }
            Some(EventChanges {
                game: game.clone(),
                sql_key: snapshot.info.sql_key.clone(),
                changes,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Line, LineQuote, MoneyLine, PeriodMarkets};

    fn snapshot(home: f64, max: f64, spread_one: f64) -> EventSnapshot {
        let mut markets = PeriodMarkets {
            money_line: Some(MoneyLine::new(Some(home), None, Some(max))),
            ..Default::default()
        };
        markets.spread.insert(
            Line::new(-3.0),
            LineQuote::new(Some(spread_one), Some(-110.0), false, Some(5000.0)),
        );
        let mut snap = EventSnapshot::default();
        snap.info.sql_key = "155".to_string();
        snap.periods.insert("full".to_string(), markets);
        snap
    }

    #[test]
    fn test_selection_keys() {
        let selections = snapshot(-150.0, 2000.0, -110.0).selections();
        let keys: Vec<String> = selections.keys().map(|k| k.to_string()).collect();
        assert_eq!(
            keys,
            vec!["full:Money Line:away", "full:Money Line:home", "full:spread:-3.0"]
        );

        let spread = selections.values().last().unwrap();
        assert_eq!(spread.odds, "-110,-110,false");
        let away = &selections[&SelectionKey {
            period: "full".to_string(),
            market: MarketKind::MoneyLine,
            selection: "away".to_string(),
        }];
        assert_eq!(away.odds, "N/A");
    }

    #[test]
    fn test_first_sighting_reports_everything() {
        let changes = diff_snapshots(None, &snapshot(-150.0, 2000.0, -110.0));
        assert_eq!(changes.iter().filter(|c| matches!(c, SelectionChange::Odds { .. })).count(), 3);
        assert_eq!(changes.iter().filter(|c| matches!(c, SelectionChange::Limit { .. })).count(), 3);
    }

    #[test]
    fn test_diff_reports_only_changes() {
        let old = snapshot(-150.0, 2000.0, -110.0);
        let new = snapshot(-155.0, 2500.0, -110.0);
        let changes = diff_snapshots(Some(&old), &new);

        // Home price moved; the market limit moved for both sides
        assert_eq!(changes.len(), 3);
        let odds: Vec<&SelectionChange> = changes
            .iter()
            .filter(|c| matches!(c, SelectionChange::Odds { .. }))
            .collect();
        assert_eq!(odds.len(), 1);
        assert_eq!(odds[0].key().to_string(), "full:Money Line:home");
        assert_eq!(
            *odds[0],
            SelectionChange::Odds {
                key: odds[0].key().clone(),
                old: Some("-150".to_string()),
                new: "-155".to_string(),
            }
        );
        assert!(changes
            .iter()
            .filter(|c| matches!(c, SelectionChange::Limit { .. }))
            .all(|c| matches!(c, SelectionChange::Limit { old: Some(o), new: Some(n), .. } if *o == 2000.0 && *n == 2500.0)));

        assert!(diff_snapshots(Some(&new), &new).is_empty());
    }

    #[test]
    fn test_diff_books() {
        let mut old = BookSnapshot::new();
        old.insert("A @ B".to_string(), snapshot(-150.0, 2000.0, -110.0));
        let mut new = old.clone();
        new.insert("C @ D".to_string(), snapshot(120.0, 1000.0, -105.0));

        let changes = diff_books(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].game, "C @ D");
        assert_eq!(changes[0].sql_key, "155");
    }
}
