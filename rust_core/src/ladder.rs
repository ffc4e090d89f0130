//! Line matcher for spread and total ladders.
//!
//! A soft book's line is priced against the reference ladder either exactly,
//! by interpolating the implied probability from the two nearest reference
//! lines, or (for sports configured that way) straight from the nearest line.

use tracing::debug;

use crate::devig::{collect_legs, worst_case, worst_case_to_decimal};
use crate::error::MatchError;
use crate::odds::decimal_to_american;
use crate::snapshot::{Line, LineQuote, LineTable};
use crate::types::{MarketKind, Side};

/// Ladder step between adjacent lines
pub const LINE_STEP: f64 = 0.5;

/// Direction the candidate line moves away from the nearest reference line.
///
/// Totals: `Under` when the candidate is higher, `Over` when lower.
/// Spreads: `Underdog` when the home handicap is higher (home side priced),
/// `Favorite` when lower (away side priced).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlopeDirection {
    Over,
    Under,
    Favorite,
    Underdog,
}

impl SlopeDirection {
    fn for_market(market: MarketKind, difference: f64) -> Self {
        match (market, difference > 0.0) {
            (MarketKind::Total, true) => SlopeDirection::Under,
            (MarketKind::Total, false) => SlopeDirection::Over,
            (_, true) => SlopeDirection::Underdog,
            (_, false) => SlopeDirection::Favorite,
        }
    }

    /// Reference side whose price is being interpolated
    pub fn side(&self) -> Side {
        match self {
            SlopeDirection::Over | SlopeDirection::Underdog => Side::One,
            SlopeDirection::Under | SlopeDirection::Favorite => Side::Two,
        }
    }

    /// Adjacent line one step further from the candidate
    pub fn second_line(&self, closest: f64) -> f64 {
        match self {
            SlopeDirection::Under | SlopeDirection::Underdog => closest - LINE_STEP,
            SlopeDirection::Over | SlopeDirection::Favorite => closest + LINE_STEP,
        }
    }
}

/// Change in implied probability per unit of line.
pub fn interpolate(closest_imp: f64, second_imp: f64, direction: SlopeDirection) -> f64 {
    let per_step = match direction {
        SlopeDirection::Under | SlopeDirection::Underdog => closest_imp - second_imp,
        SlopeDirection::Over | SlopeDirection::Favorite => second_imp - closest_imp,
    };
    per_step / LINE_STEP
}

/// How a fair price was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Exact,
    /// Interpolated from the two nearest reference lines
    Interpolated,
    /// Taken from the nearest reference line as-is
    Nearest,
}

impl MatchKind {
    /// Tag carried on output records for non-exact matches
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            MatchKind::Exact => None,
            MatchKind::Interpolated => Some("ext"),
            MatchKind::Nearest => Some("calc"),
        }
    }
}

/// Fair price for one side of a candidate line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineMatch {
    pub side: Side,
    pub fair: i32,
    /// Reference line the price came from (nearest line when not exact)
    pub reference_line: Line,
    pub limit: Option<f64>,
    pub kind: MatchKind,
    pub direction: Option<SlopeDirection>,
}

/// Sanity cutoffs for heavily favored candidates on non-exact matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchFilters {
    pub max_favorite_odds: f64,
    pub max_alt_favorite_odds: f64,
}

impl Default for MatchFilters {
    fn default() -> Self {
        Self {
            max_favorite_odds: -150.0,
            max_alt_favorite_odds: -120.0,
        }
    }
}

impl MatchFilters {
    /// Reject offered odds worse than the cutoff for this kind of line.
    pub fn check(&self, offered: f64, alternate: bool) -> Result<(), MatchError> {
        if alternate && offered < self.max_alt_favorite_odds {
            return Err(MatchError::Filtered {
                odds: offered,
                limit: self.max_alt_favorite_odds,
            });
        }
        if offered < self.max_favorite_odds {
            return Err(MatchError::Filtered {
                odds: offered,
                limit: self.max_favorite_odds,
            });
        }
        Ok(())
    }
}

impl LineMatch {
    /// Apply the sanity filters; exact matches are never filtered.
    pub fn screen(&self, filters: &MatchFilters, offered: f64, alternate: bool) -> Result<(), MatchError> {
        match self.kind {
            MatchKind::Exact => Ok(()),
            _ => filters.check(offered, alternate),
        }
    }
}

fn other_side(side: Side) -> Side {
    match side {
        Side::One => Side::Two,
        _ => Side::One,
    }
}

fn side_legs(quote: &LineQuote, side: Side) -> Result<Vec<f64>, MatchError> {
    Ok(collect_legs(&[
        quote.side_odds(side),
        quote.side_odds(other_side(side)),
    ])?)
}

/// Reference ladder for one event, period and line market.
#[derive(Debug, Clone, Copy)]
pub struct LineLadder<'a> {
    market: MarketKind,
    table: &'a LineTable,
}

impl<'a> LineLadder<'a> {
    pub fn new(market: MarketKind, table: &'a LineTable) -> Self {
        Self { market, table }
    }

    pub fn market(&self) -> MarketKind {
        self.market
    }

    pub fn get(&self, line: Line) -> Option<&'a LineQuote> {
        self.table.get(&line)
    }

    /// Nearest reference line; ties go to the lower line.
    pub fn closest(&self, candidate: f64) -> Option<Line> {
        let mut best: Option<(Line, f64)> = None;
        for line in self.table.keys() {
            let distance = (line.value() - candidate).abs();
            match best {
                Some((_, d)) if distance >= d => {}
                _ => best = Some((*line, distance)),
            }
        }
        best.map(|(line, _)| line)
    }

    /// Worst-case fair American price for one side of a reference line.
    pub fn fair_for(&self, line: Line, side: Side) -> Result<i32, MatchError> {
        let quote = self
            .get(line)
            .ok_or(MatchError::UnmatchedLine {
                line: line.value(),
                missing: line.value(),
            })?;
        Ok(worst_case(&side_legs(quote, side)?)?)
    }

    /// Worst-case fair implied probability for one side of a reference line.
    fn fair_probability(&self, quote: &LineQuote, side: Side) -> Result<f64, MatchError> {
        Ok(1.0 / worst_case_to_decimal(&side_legs(quote, side)?)?)
    }

    /// Price a candidate line.
    ///
    /// An exact line yields both sides; otherwise only the side the line
    /// difference favors is priced.
    pub fn price(&self, candidate: Line, interpolate_lines: bool) -> Result<Vec<LineMatch>, MatchError> {
        if let Some(quote) = self.get(candidate) {
            return [Side::One, Side::Two]
                .into_iter()
                .map(|side| {
                    Ok(LineMatch {
                        side,
                        fair: self.fair_for(candidate, side)?,
                        reference_line: candidate,
                        limit: quote.max,
                        kind: MatchKind::Exact,
                        direction: None,
                    })
                })
                .collect();
        }
        self.match_nearby(candidate, interpolate_lines).map(|m| vec![m])
    }

    fn match_nearby(&self, candidate: Line, interpolate_lines: bool) -> Result<LineMatch, MatchError> {
        let value = candidate.value();
        let closest = self
            .closest(value)
            .ok_or_else(|| MatchError::MissingReference(format!("{} ladder", self.market)))?;

        if self.market == MarketKind::Spread && (value > 0.0) != (closest.value() > 0.0) {
            return Err(MatchError::SignMismatch {
                line: value,
                reference: closest.value(),
            });
        }

        let difference = value - closest.value();
        let direction = SlopeDirection::for_market(self.market, difference);
        let side = direction.side();
        let closest_quote = self
            .get(closest)
            .ok_or_else(|| MatchError::MissingReference(format!("{} {}", self.market, closest)))?;

        if !interpolate_lines {
            return Ok(LineMatch {
                side,
                fair: worst_case(&side_legs(closest_quote, side)?)?,
                reference_line: closest,
                limit: closest_quote.max,
                kind: MatchKind::Nearest,
                direction: Some(direction),
            });
        }

        let second = Line::new(direction.second_line(closest.value()));
        let second_quote = self.get(second).ok_or(MatchError::UnmatchedLine {
            line: value,
            missing: second.value(),
        })?;

        let closest_imp = self.fair_probability(closest_quote, side)?;
        let second_imp = self.fair_probability(second_quote, side)?;
        let slope = interpolate(closest_imp, second_imp, direction);
        let candidate_imp = closest_imp + slope * difference;
        debug!(
            line = value,
            closest = closest.value(),
            closest_imp,
            second_imp,
            candidate_imp,
            "interpolated fair probability"
        );

        Ok(LineMatch {
            side,
            fair: decimal_to_american(1.0 / candidate_imp)?,
            reference_line: closest,
            limit: closest_quote.max,
            kind: MatchKind::Interpolated,
            direction: Some(direction),
        })
    }
}
