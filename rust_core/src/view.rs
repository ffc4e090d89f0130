//! Cycle view: every book's quotes grouped by game, period and market.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::aliases::TeamAliases;
use crate::snapshot::{BookData, EventInfo, MarketQuotes};
use crate::types::{MarketKind, Sport};

/// One book's quotes for one game/period/market slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookRow {
    pub book: String,
    pub is_timeout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
    pub data: MarketQuotes,
}

/// All slices of one canonical game.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GameView {
    /// Reference book's event info; default when the reference lacks the game
    pub info: EventInfo,
    #[serde(flatten)]
    pub periods: BTreeMap<String, BTreeMap<MarketKind, Vec<BookRow>>>,
}

impl GameView {
    pub fn rows(&self, period: &str, market: MarketKind) -> &[BookRow] {
        self.periods
            .get(period)
            .and_then(|markets| markets.get(&market))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Immutable input to one engine scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketView {
    pub sport: Sport,
    pub games: BTreeMap<String, GameView>,
}

impl MarketView {
    /// Group every book's snapshot by canonical game.
    ///
    /// Rows within a slice keep the order of `books`. Only the sport's
    /// periods are considered. Each game's info comes from the first book in
    /// `references` that carries it.
    pub fn build(books: &[BookData], sport: Sport, aliases: &TeamAliases, references: &[&str]) -> Self {
        let mut games: BTreeMap<String, GameView> = BTreeMap::new();
        // Rank of the reference book each game's info came from
        let mut info_rank: BTreeMap<String, usize> = BTreeMap::new();

        for book in books {
            for (game_name, snapshot) in &book.events {
                let Some(game) = aliases.canonical_game(game_name) else {
                    debug!(book = %book.book, game = %game_name, "skipping unparseable game name");
                    continue;
                };

                for period in sport.period_labels() {
                    let Some(markets) = snapshot.period(period) else {
                        continue;
                    };
                    for kind in MarketKind::ALL {
                        let Some(data) = markets.market(kind) else {
                            continue;
                        };
                        games
                            .entry(game.clone())
                            .or_default()
                            .periods
                            .entry(period.to_string())
                            .or_default()
                            .entry(kind)
                            .or_default()
                            .push(BookRow {
                                book: book.book.clone(),
                                is_timeout: snapshot.info.is_timeout,
                                score: snapshot.info.score.clone(),
                                data,
                            });
                    }
                }

                let Some(rank) = references.iter().position(|r| *r == book.book) else {
                    continue;
                };
                let Some(view) = games.get_mut(&game) else {
                    continue;
                };
                if info_rank.get(&game).map_or(true, |best| rank < *best) {
                    view.info = snapshot.info.clone();
                    info_rank.insert(game, rank);
                }
            }
        }

        Self { sport, games }
    }

    pub fn game(&self, name: &str) -> Option<&GameView> {
        self.games.get(name)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{BookSnapshot, EventSnapshot, MoneyLine, PeriodMarkets};

    fn snapshot(league: &str, periods: &[&str]) -> EventSnapshot {
        let mut snap = EventSnapshot::default();
        snap.info.league = league.to_string();
        for p in periods {
            snap.periods.insert(
                p.to_string(),
                PeriodMarkets {
                    money_line: Some(MoneyLine::new(Some(-120.0), Some(100.0), Some(500.0))),
                    ..Default::default()
                },
            );
        }
        snap
    }

    fn book(name: &str, game: &str, snap: EventSnapshot) -> BookData {
        let mut events = BookSnapshot::new();
        events.insert(game.to_string(), snap);
        BookData::new(name, events)
    }

    #[test]
    fn test_groups_books_by_canonical_game() {
        let mut aliases = TeamAliases::new();
        aliases.insert("MIA Heat", "Miami Heat");

        let books = vec![
            book("pin", "Miami Heat @ Boston Celtics", snapshot("NBA", &["full"])),
            book("dk", "MIA HEAT @ BOSTON CELTICS", snapshot("", &["full", "half"])),
        ];
        let view = MarketView::build(&books, Sport::Basketball, &aliases, &["pin"]);

        assert_eq!(view.len(), 1);
        let game = view.game("Miami Heat @ Boston Celtics").unwrap();
        let rows = game.rows("full", MarketKind::MoneyLine);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].book, "pin");
        assert_eq!(rows[1].book, "dk");
        assert_eq!(game.info.league, "NBA");
        // Basketball only scans the full game
        assert!(game.rows("half", MarketKind::MoneyLine).is_empty());
        assert!(game.rows("full", MarketKind::Spread).is_empty());
    }

    #[test]
    fn test_info_comes_from_reference_only() {
        let books = vec![book("dk", "A @ B", snapshot("Soft League", &["full"]))];
        let view = MarketView::build(&books, Sport::Football, &TeamAliases::new(), &["pin"]);
        assert_eq!(view.game("A @ B").unwrap().info, EventInfo::default());
    }

    #[test]
    fn test_info_follows_reference_priority() {
        let books = vec![
            book("cir", "A @ B", snapshot("Fallback League", &["full"])),
            book("pin", "A @ B", snapshot("Sharp League", &["full"])),
            book("cir", "C @ D", snapshot("Fallback League", &["full"])),
        ];
        let view = MarketView::build(&books, Sport::Football, &TeamAliases::new(), &["pin", "cir"]);
        assert_eq!(view.game("A @ B").unwrap().info.league, "Sharp League");
        assert_eq!(view.game("C @ D").unwrap().info.league, "Fallback League");
    }
}
