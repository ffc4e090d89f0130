//! +EV scan over a cycle view.
//!
//! For every game/period/market slice the reference row is devigged and each
//! other book's quotes are scored against it. Failures are skip-scoped: a bad
//! quote drops that one bet, a missing reference drops the slice.

use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::aliases::{split_matchup, TeamAliases};
use crate::config::EvConfig;
use crate::devig::{collect_legs, worst_case};
use crate::error::{EngineError, MatchError};
use crate::ev::{calculate_ev_scaled, round_to};
use crate::ladder::{LineLadder, MatchFilters};
use crate::odds::{format_american, format_line};
use crate::snapshot::{BookData, EventInfo, Line, LineTable, MarketQuotes, MoneyLine, Quote, ThreeWay};
use crate::types::{MarketKind, Side, Sport, FULL_GAME};
use crate::view::{BookRow, GameView, MarketView};

/// What an opportunity bets on: a line value or a side tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BetTarget {
    Line(f64),
    Side(Side),
}

/// One scored bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub book: String,
    /// Offered price, e.g. "+150"
    pub odds: String,
    pub link: Option<String>,
    /// EV percent, one decimal
    pub ev: f64,
    /// Kelly stake signal, two decimals
    pub qk: f64,
    pub bet: String,
    /// Fair price, e.g. "-104"
    pub fair: String,
    pub sharp: String,
    pub game: String,
    pub sport: Sport,
    pub game_info: EventInfo,
    pub limit: Option<f64>,
    pub market: MarketKind,
    pub num: BetTarget,
    /// "ext" when interpolated, "calc" when taken from the nearest line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ld: Option<String>,
}

/// Everything about a slice that every bet in it shares.
struct SliceContext<'a> {
    sport: Sport,
    period: &'a str,
    market: MarketKind,
    away: &'a str,
    home: &'a str,
    info: &'a EventInfo,
    sharp: &'a str,
    reference_score: Option<&'a str>,
}

/// A priced bet before thresholding.
struct Candidate<'q> {
    side: Side,
    quote: &'q Quote,
    fair: i32,
    label: String,
    target: BetTarget,
    limit: Option<f64>,
    ld: Option<&'static str>,
}

pub struct EvEngine {
    config: EvConfig,
}

impl EvEngine {
    pub fn new(config: EvConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvConfig {
        &self.config
    }

    /// Score every non-reference quote in the view, best EV first.
    pub fn find_ev(&self, view: &MarketView) -> Vec<Opportunity> {
        let periods = self.config.periods_for(view.sport);
        let mut opportunities: Vec<Opportunity> = view
            .games
            .par_iter()
            .flat_map_iter(|(game, game_view)| self.scan_game(view.sport, game, game_view, &periods))
            .collect();
        sort_by_ev(&mut opportunities);

        info!(
            sport = %view.sport,
            games = view.len(),
            opportunities = opportunities.len(),
            "EV scan complete"
        );
        opportunities
    }

    /// Scan several independent views and merge the results.
    pub fn find_ev_batch(&self, views: &[MarketView]) -> Vec<Opportunity> {
        let mut opportunities: Vec<Opportunity> = views
            .par_iter()
            .flat_map_iter(|view| self.find_ev(view))
            .collect();
        sort_by_ev(&mut opportunities);
        opportunities
    }

    fn scan_game(
        &self,
        sport: Sport,
        game: &str,
        game_view: &GameView,
        periods: &[String],
    ) -> Vec<Opportunity> {
        let Some((away, home)) = split_matchup(game) else {
            debug!(game, "skipping game without a matchup key");
            return Vec::new();
        };

        let mut out = Vec::new();
        for (period, markets) in &game_view.periods {
            if !periods.iter().any(|p| p == period) {
                continue;
            }
            for (market, rows) in markets {
                if let Err(e) = self.scan_slice(
                    sport, game, period, *market, away, home, &game_view.info, rows, &mut out,
                ) {
                    debug!(game, period = %period, market = %market, error = %e, "skipping slice");
                }
            }
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_slice(
        &self,
        sport: Sport,
        game: &str,
        period: &str,
        market: MarketKind,
        away: &str,
        home: &str,
        info: &EventInfo,
        rows: &[BookRow],
        out: &mut Vec<Opportunity>,
    ) -> Result<(), MatchError> {
        if self.config.require_timeout
            && sport == Sport::Basketball
            && !rows.iter().any(|r| r.is_timeout)
        {
            return Ok(());
        }

        let reference = self
            .reference_row(rows)
            .ok_or_else(|| MatchError::MissingReference(format!("{} {} {}", game, period, market)))?;

        let ctx = SliceContext {
            sport,
            period,
            market,
            away,
            home,
            info,
            sharp: &reference.book,
            reference_score: reference.score.as_deref(),
        };

        for row in rows {
            if row.book == reference.book || row.book == self.config.sharp_name {
                continue;
            }
            for candidate in self.price_row(&ctx, &reference.data, &row.data) {
                match candidate.and_then(|c| self.score(&ctx, row, c)) {
                    Ok(Some(opportunity)) => out.push(opportunity),
                    Ok(None) => {}
                    Err(e) => debug!(
                        book = %row.book,
                        game,
                        period,
                        market = %market,
                        error = %e,
                        "skipping bet"
                    ),
                }
            }
        }
        Ok(())
    }

    /// Primary sharp row, else the fallback sharp's.
    fn reference_row<'r>(&self, rows: &'r [BookRow]) -> Option<&'r BookRow> {
        rows.iter()
            .find(|r| r.book == self.config.sharp_name)
            .or_else(|| {
                let fallback = self.config.fallback_sharp.as_deref()?;
                rows.iter().find(|r| r.book == fallback)
            })
    }

    fn price_row<'q>(
        &self,
        ctx: &SliceContext<'_>,
        reference: &MarketQuotes,
        offered: &'q MarketQuotes,
    ) -> Vec<Result<Candidate<'q>, EngineError>> {
        match (reference, offered) {
            (MarketQuotes::MoneyLine(sharp), MarketQuotes::MoneyLine(book)) => {
                price_money_line(ctx, sharp, book)
            }
            (MarketQuotes::ThreeWay(sharp), MarketQuotes::ThreeWay(book)) => {
                price_three_way(ctx, sharp, book)
            }
            (MarketQuotes::Spread(sharp), MarketQuotes::Spread(book))
            | (MarketQuotes::Total(sharp), MarketQuotes::Total(book)) => {
                self.price_lines(ctx, sharp, book)
            }
            _ => Vec::new(),
        }
    }

    fn price_lines<'q>(
        &self,
        ctx: &SliceContext<'_>,
        sharp: &LineTable,
        book: &'q LineTable,
    ) -> Vec<Result<Candidate<'q>, EngineError>> {
        let ladder = LineLadder::new(ctx.market, sharp);
        let filters = MatchFilters {
            max_favorite_odds: self.config.max_favorite_odds,
            max_alt_favorite_odds: self.config.max_alt_favorite_odds,
        };
        let interpolate = self.config.interpolates(ctx.sport);

        let mut out = Vec::new();
        for (line, quote) in book {
            let matches = match ladder.price(*line, interpolate) {
                Ok(matches) => matches,
                Err(e) => {
                    out.push(Err(e.into()));
                    continue;
                }
            };
            for m in matches {
                let Some(offered) = quote.side(m.side) else {
                    continue;
                };
                let Some(odds) = offered.odds else {
                    continue;
                };
                let alternate = quote.alt || offered.is_alternate_market();
                if let Err(e) = m.screen(&filters, odds, alternate) {
                    out.push(Err(e.into()));
                    continue;
                }
                out.push(Ok(Candidate {
                    side: m.side,
                    quote: offered,
                    fair: m.fair,
                    label: line_label(ctx, *line, m.side),
                    target: BetTarget::Line(line.value()),
                    limit: m.limit,
                    ld: m.kind.tag(),
                }));
            }
        }
        out
    }

    fn score(
        &self,
        ctx: &SliceContext<'_>,
        row: &BookRow,
        candidate: Candidate<'_>,
    ) -> Result<Option<Opportunity>, EngineError> {
        let Some(estimate) =
            calculate_ev_scaled(candidate.quote.odds, candidate.fair as f64, self.config.kelly_multiplier)?
        else {
            return Ok(None);
        };
        if estimate.ev < self.config.ev_threshold {
            return Ok(None);
        }

        let odds = candidate.quote.odds.unwrap_or_default();
        let score = row.score.as_deref().or(ctx.reference_score);
        let game = match score {
            Some(score) => format!("{} @ {} {}", ctx.away, ctx.home, score),
            None => format!("{} @ {}", ctx.away, ctx.home),
        };
        let bet = if ctx.period == FULL_GAME {
            candidate.label
        } else {
            format!("{} {}", ctx.period, candidate.label)
        };

        debug!(book = %row.book, bet = %bet, side = %candidate.side, ev = estimate.ev, "opportunity");
        Ok(Some(Opportunity {
            book: row.book.clone(),
            odds: format_american(odds, true),
            link: candidate.quote.link.clone(),
            ev: round_to(estimate.ev, 1),
            qk: round_to(estimate.kelly, 2),
            bet,
            fair: format_american(candidate.fair as f64, true),
            sharp: ctx.sharp.to_string(),
            game,
            sport: ctx.sport,
            game_info: ctx.info.clone(),
            limit: candidate.limit,
            market: ctx.market,
            num: candidate.target,
            ld: candidate.ld.map(String::from),
        }))
    }
}

fn sort_by_ev(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| b.ev.total_cmp(&a.ev));
}

fn line_label(ctx: &SliceContext<'_>, line: Line, side: Side) -> String {
    match (ctx.market, side) {
        (MarketKind::Total, Side::One) => format!("o{}", format_line(line.value())),
        (MarketKind::Total, _) => format!("u{}", format_line(line.value())),
        (_, Side::One) => format!("{} {}", ctx.home, format_american(line.value(), false)),
        (_, _) => format!("{} {}", ctx.away, format_american(-line.value(), false)),
    }
}

fn price_money_line<'q>(
    ctx: &SliceContext<'_>,
    sharp: &MoneyLine,
    book: &'q MoneyLine,
) -> Vec<Result<Candidate<'q>, EngineError>> {
    [(Side::Home, Side::Away), (Side::Away, Side::Home)]
        .into_iter()
        .filter_map(|(side, other)| {
            let quote = book.side(side)?;
            quote.odds?;
            let fair = collect_legs(&[sharp.side_odds(side), sharp.side_odds(other)])
                .and_then(|legs| worst_case(&legs))
                .map_err(EngineError::from);
            let team = if side == Side::Home { ctx.home } else { ctx.away };
            Some(fair.map(|fair| Candidate {
                side,
                quote,
                fair,
                label: format!("{} ML", team),
                target: BetTarget::Side(side),
                limit: sharp.max,
                ld: None,
            }))
        })
        .collect()
}

fn price_three_way<'q>(
    ctx: &SliceContext<'_>,
    sharp: &ThreeWay,
    book: &'q ThreeWay,
) -> Vec<Result<Candidate<'q>, EngineError>> {
    const SIDES: [Side; 3] = [Side::One, Side::Two, Side::Three];

    SIDES
        .into_iter()
        .filter_map(|side| {
            let quote = book.side(side)?;
            quote.odds?;
            // Priced leg first, the other two in their usual order
            let legs: Vec<Option<f64>> = std::iter::once(side)
                .chain(SIDES.into_iter().filter(|s| *s != side))
                .map(|s| sharp.side_odds(s))
                .collect();
            let fair = collect_legs(&legs)
                .and_then(|legs| worst_case(&legs))
                .map_err(EngineError::from);
            let team = match side {
                Side::One => ctx.home,
                Side::Two => ctx.away,
                _ => "draw",
            };
            Some(fair.map(|fair| Candidate {
                side,
                quote,
                fair,
                label: format!("{} 3-Way ML", team),
                target: BetTarget::Side(side),
                limit: sharp.max,
                ld: None,
            }))
        })
        .collect()
}

/// JSON in, JSON out: a list of `{book, events}` snapshots to ranked opportunities.
///
/// Only a document that is not a JSON list fails; a malformed book, event or
/// quote is logged and left out.
pub fn find_ev_json(
    books_json: &str,
    sport: Sport,
    aliases: &TeamAliases,
    config: EvConfig,
) -> anyhow::Result<String> {
    let raw: Vec<serde_json::Value> =
        serde_json::from_str(books_json).context("Invalid book snapshot JSON")?;
    let books: Vec<BookData> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(book) => Some(book),
            Err(e) => {
                warn!(index, error = %e, "dropping malformed book snapshot");
                None
            }
        })
        .collect();
    let view = MarketView::build(&books, sport, aliases, &config.reference_books());
    let opportunities = EvEngine::new(config).find_ev(&view);
    Ok(serde_json::to_string(&opportunities)?)
}

/// Opportunities grouped by book, each group still EV-ordered.
pub fn group_by_book(opportunities: &[Opportunity]) -> BTreeMap<&str, Vec<&Opportunity>> {
    let mut grouped: BTreeMap<&str, Vec<&Opportunity>> = BTreeMap::new();
    for o in opportunities {
        grouped.entry(o.book.as_str()).or_default().push(o);
    }
    grouped
}
