//! Reference feed to ranked opportunities, end to end.

use chrono::{TimeZone, Utc};
use sharpline_core::engine::{group_by_book, BetTarget};
use sharpline_core::snapshot::{Line, LineQuote, MoneyLine, PeriodMarkets};
use sharpline_core::{
    BookData, BookSnapshot, EventSnapshot, EvConfig, EvEngine, MarketKind, MarketNormalizer,
    MarketView, NormalizerConfig, RawFeed, Sport, TeamAliases,
};

fn reference_feed() -> RawFeed {
    serde_json::from_value(serde_json::json!({
        "events": [{
            "event_id": 1590001,
            "league_name": "NFL",
            "home": "Buffalo Bills",
            "away": "Miami Dolphins",
            "starts": "2024-01-07T18:00:00",
            "periods": {
                "num_0": {
                    "period_status": 1,
                    "cutoff": "2024-01-07T18:00:00Z",
                    "money_line": {"home": 1.5, "away": 2.7},
                    "spreads": {
                        "0": {"hdp": -3.0, "home": 1.909, "away": 1.909, "alt_line_id": null, "max": 5000.0}
                    },
                    "meta": {"max_money_line": 2000.0}
                }
            }
        }]
    }))
    .unwrap()
}

fn soft_book() -> BookData {
    let mut markets = PeriodMarkets {
        money_line: Some(MoneyLine::new(Some(-190.0), Some(170.0), None)),
        ..Default::default()
    };
    markets.spread.insert(
        Line::new(-3.0),
        LineQuote::new(Some(105.0), Some(-125.0), false, None),
    );

    let mut snapshot = EventSnapshot::default();
    snapshot.info.league = "Football".to_string();
    snapshot.periods.insert("full".to_string(), markets);

    let mut events = BookSnapshot::new();
    events.insert("MIAMI DOLPHINS @ BUFFALO BILLS".to_string(), snapshot);
    BookData::new("dk", events)
}

fn scan(config: EvConfig) -> Vec<sharpline_core::Opportunity> {
    let now = Utc.with_ymd_and_hms(2024, 1, 7, 12, 0, 0).unwrap();
    let normalizer = MarketNormalizer::new(Sport::Football, NormalizerConfig::default());
    let pin = BookData::new("pin", normalizer.normalize_feed(&reference_feed(), now));

    let books = vec![pin, soft_book()];
    let view = MarketView::build(&books, Sport::Football, &TeamAliases::new(), &["pin"]);
    EvEngine::new(config).find_ev(&view)
}

#[test]
fn test_positive_ev_spread_is_found() {
    let opps = scan(EvConfig {
        ev_threshold: 1.0,
        ..Default::default()
    });

    assert_eq!(opps.len(), 1);
    let opp = &opps[0];
    assert_eq!(opp.book, "dk");
    assert_eq!(opp.sharp, "pin");
    assert_eq!(opp.bet, "Buffalo Bills -3.0");
    assert_eq!(opp.market, MarketKind::Spread);
    assert_eq!(opp.num, BetTarget::Line(-3.0));
    assert_eq!(opp.odds, "+105");
    assert_eq!(opp.limit, Some(5000.0));
    assert!((opp.ev - 2.5).abs() < 1e-9);
    // Event info comes from the reference book
    assert_eq!(opp.game_info.league, "NFL");
    assert_eq!(opp.game_info.sql_key, "1590001");
    assert!(opp.game_info.is_timeout);
}

#[test]
fn test_every_quote_scored_without_threshold() {
    let opps = scan(EvConfig::default());

    // Two moneyline sides and two spread sides
    assert_eq!(opps.len(), 4);
    assert!(opps.windows(2).all(|w| w[0].ev >= w[1].ev));
    assert_eq!(opps[0].bet, "Buffalo Bills -3.0");
    assert!(opps[1..].iter().all(|o| o.ev < 0.0));

    let grouped = group_by_book(&opps);
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped["dk"].len(), 4);
}

#[test]
fn test_missing_reference_yields_nothing() {
    let books = vec![soft_book()];
    let view = MarketView::build(&books, Sport::Football, &TeamAliases::new(), &["pin"]);
    assert_eq!(view.len(), 1);
    assert!(EvEngine::new(EvConfig::default()).find_ev(&view).is_empty());
}
