use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use league_stats::accumulator::{Eligibility, StatLine};
use league_stats::aggregator::{DivisionRules, IncompleteReason};
use league_stats::errors::{FetchError, SeasonError};
use league_stats::legs::{GameKind, MatchId, RawLegRow};
use league_stats::qp_rules::Feat;
use league_stats::recap::{RecapLeg, RecapTurn, TurnDetail, TurnDetailSource};
use league_stats::season::{QualityGrade, SeasonConfig, UnresolvedReason, run_season};
use league_stats::turn_cache::TurnDetailCache;
use league_stats::turn_store::{FileTurnStore, MemoryTurnStore};

const FIRST: &str = "aaaaaa111111";
const SECOND: &str = "bbbbbb222222";

/// Serves canned detail; ids it does not know time out.
struct FixtureSource {
    details: HashMap<MatchId, TurnDetail>,
    calls: AtomicUsize,
}

impl FixtureSource {
    fn new() -> Self {
        let id = MatchId::from_locator(FIRST).expect("valid id");
        let set_two = |leg_number: u32, ann: &str, bob: &str| RecapLeg {
            set_number: 2,
            leg_number,
            game_name: "Cricket".to_string(),
            turns: vec![
                RecapTurn {
                    player: "Ann".to_string(),
                    turn_score: ann.to_string(),
                },
                RecapTurn {
                    player: "Bob".to_string(),
                    turn_score: bob.to_string(),
                },
            ],
        };
        let detail = TurnDetail {
            match_id: id.clone(),
            legs: vec![
                RecapLeg {
                    set_number: 1,
                    leg_number: 1,
                    game_name: "501".to_string(),
                    turns: Vec::new(),
                },
                set_two(1, "T20, T19, T18", "S20"),
                set_two(2, "T20, S19, S18", "SB, DB, ?!"),
            ],
        };
        Self {
            details: HashMap::from([(id, detail)]),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TurnDetailSource for FixtureSource {
    fn fetch(&self, match_id: &MatchId) -> Result<TurnDetail, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.details.get(match_id).cloned().ok_or(FetchError::Timeout)
    }
}

#[allow(clippy::too_many_arguments)]
fn row(
    match_id: &str,
    set: u32,
    game: &str,
    player: &str,
    opponent: &str,
    result: &str,
    hi_turn: Option<u32>,
    checkout: Option<u32>,
) -> RawLegRow {
    RawLegRow {
        match_id: Some(match_id.to_string()),
        set_number: Some(set.to_string()),
        play_format: Some("Singles".to_string()),
        game_type: Some(game.to_string()),
        division: Some("A".to_string()),
        date: Some("2024-10-03".to_string()),
        player_id: Some(player.to_string()),
        opponent_ids: vec![opponent.to_string()],
        leg_result: Some(result.to_string()),
        hi_turn: hi_turn.map(|v| v.to_string()),
        checkout_score: checkout.map(|v| v.to_string()),
        ..RawLegRow::default()
    }
}

fn season_rows() -> Vec<RawLegRow> {
    vec![
        // Set 1, 501: Ann 2-1.
        row(FIRST, 1, "501", "Ann", "Bob", "W", Some(132), Some(90)),
        row(FIRST, 1, "501", "Bob", "Ann", "L", None, None),
        row(FIRST, 1, "501", "Ann", "Bob", "L", None, None),
        row(FIRST, 1, "501", "Bob", "Ann", "W", Some(180), None),
        row(FIRST, 1, "501", "Ann", "Bob", "W", None, None),
        row(FIRST, 1, "501", "Bob", "Ann", "L", None, None),
        // Set 2, cricket: Ann 2-0.
        row(FIRST, 2, "Cricket", "Ann", "Bob", "W", None, None),
        row(FIRST, 2, "Cricket", "Bob", "Ann", "L", None, None),
        row(FIRST, 2, "Cricket", "Ann", "Bob", "W", None, None),
        row(FIRST, 2, "Cricket", "Bob", "Ann", "L", None, None),
        // Set 3, 501: 1-1, no decider.
        row(FIRST, 3, "501", "Ann", "Bob", "W", None, None),
        row(FIRST, 3, "501", "Bob", "Ann", "L", None, None),
        row(FIRST, 3, "501", "Ann", "Bob", "L", None, None),
        row(FIRST, 3, "501", "Bob", "Ann", "W", None, None),
        // Second match, cricket, detail unavailable.
        row(SECOND, 1, "Cricket", "Ann", "Cal", "W", None, None),
        row(SECOND, 1, "Cricket", "Cal", "Ann", "L", None, None),
        row(SECOND, 1, "Cricket", "Ann", "Cal", "W", None, None),
        row(SECOND, 1, "Cricket", "Cal", "Ann", "L", None, None),
        // Unusable.
        RawLegRow {
            player_id: Some("Ghost".to_string()),
            ..RawLegRow::default()
        },
    ]
}

fn line<'a>(players: &'a [StatLine], id: &str) -> &'a StatLine {
    players
        .iter()
        .find(|p| p.player_id == id)
        .expect("player should be reported")
}

#[test]
fn season_totals_follow_games_and_quality_points() {
    let source = Arc::new(FixtureSource::new());
    let cache = TurnDetailCache::new(Arc::new(MemoryTurnStore::new()), source.clone());
    let report = run_season(&season_rows(), &cache, &SeasonConfig::default()).expect("season");

    assert_eq!(
        report.players.iter().map(|p| p.player_id.as_str()).collect::<Vec<_>>(),
        vec!["Ann", "Bob", "Cal"]
    );

    let ann = line(&report.players, "Ann");
    assert_eq!(ann.legs_played, 9);
    assert_eq!(ann.games_played, 3);
    assert_eq!((ann.wins, ann.losses), (3, 0));
    assert_eq!(ann.records[&GameKind::SinglesCricket].wins, 2);
    // 3 + 2 from the 501 leg, 5 + 1 from the two cricket legs.
    assert_eq!(ann.total_quality_points, 11);
    assert_eq!(ann.unresolved_qp_legs, 2);
    assert_eq!(ann.rating, 3.2222);
    assert_eq!(ann.qp_pct, 122.22);
    assert_eq!(ann.win_pct, 100.0);
    assert_eq!(ann.eligibility, Eligibility::Ineligible);
    assert_eq!(ann.games_to_qualify, 15);

    let bob = line(&report.players, "Bob");
    assert_eq!(bob.legs_played, 7);
    assert_eq!((bob.wins, bob.losses), (0, 2));
    assert_eq!(bob.total_quality_points, 7);
    assert_eq!(bob.rating, 1.0);

    let cal = line(&report.players, "Cal");
    assert_eq!(cal.legs_played, 2);
    assert_eq!(cal.total_quality_points, 0);
    assert_eq!(cal.unresolved_qp_legs, 2);

    assert_eq!(report.games_resolved, 3);
    assert_eq!(report.incomplete_games.len(), 1);
    assert_eq!(report.incomplete_games[0].key.set_number, 3);
    assert_eq!(report.incomplete_games[0].reason, IncompleteReason::NoMajority);

    assert_eq!(report.unresolved_qp_legs.len(), 4);
    assert!(report.unresolved_qp_legs.iter().all(|leg| matches!(
        &leg.reason,
        UnresolvedReason::FetchFailed { error } if error == "request timed out"
    )));

    assert_eq!(report.ingestion_errors.len(), 1);
    assert_eq!(report.ingestion_errors[0].row, 18);
    assert_eq!(report.dropped_turn_tokens.len(), 1);
    assert_eq!(report.dropped_turn_tokens[0].tokens, vec!["?!".to_string()]);

    let feats = report
        .achievements
        .iter()
        .map(|a| (a.player_id.as_str(), a.feat))
        .collect::<Vec<_>>();
    assert_eq!(feats, vec![("Bob", Feat::Ton80), ("Ann", Feat::NineMarks)]);

    assert_eq!(report.quality.detail_lookups, 8);
    assert_eq!(report.quality.detail_resolved, 4);
    assert_eq!(report.quality.grade, QualityGrade::Partial);
    assert_eq!(report.quality.score, 75);

    assert_eq!(source.calls(), 2);
    assert_eq!(report.cache.fetches, 2);
    assert_eq!(report.cache.fetch_failures, 1);
}

#[test]
fn rerun_on_warm_cache_is_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(FileTurnStore::new(dir.path()));
    let rows = season_rows();
    let config = SeasonConfig::default();

    let cold_source = Arc::new(FixtureSource::new());
    let cold = TurnDetailCache::new(store.clone(), cold_source.clone());
    let first = run_season(&rows, &cold, &config).expect("cold run");

    let warm_source = Arc::new(FixtureSource::new());
    let warm = TurnDetailCache::new(store, warm_source.clone());
    let second = run_season(&rows, &warm, &config).expect("warm run");

    assert_eq!(first.players, second.players);
    assert_eq!(
        serde_json::to_string(&first.players).expect("encode"),
        serde_json::to_string(&second.players).expect("encode")
    );
    assert_eq!(first.incomplete_games, second.incomplete_games);
    // Only the match that never resolved is asked for again.
    assert_eq!(warm_source.calls(), 1);
    assert_eq!(second.cache.hits, 1);
}

#[test]
fn best_of_one_divisions_count_every_leg() {
    let cache = TurnDetailCache::new(
        Arc::new(MemoryTurnStore::new()),
        Arc::new(FixtureSource::new()),
    );
    let config = SeasonConfig {
        rules: DivisionRules::new(["a"]),
        ..SeasonConfig::default()
    };
    let rows = season_rows().into_iter().take(6).collect::<Vec<_>>();
    let report = run_season(&rows, &cache, &config).expect("season");

    let ann = line(&report.players, "Ann");
    assert_eq!((ann.wins, ann.losses), (2, 1));
    let bob = line(&report.players, "Bob");
    assert_eq!((bob.wins, bob.losses), (1, 2));
    assert!(report.incomplete_games.is_empty());
    assert_eq!(report.quality.score, 100);
}

#[test]
fn unrecognized_result_still_counts_the_leg() {
    let cache = TurnDetailCache::new(
        Arc::new(MemoryTurnStore::new()),
        Arc::new(FixtureSource::new()),
    );
    let rows = vec![
        row(FIRST, 1, "501", "Ann", "Bob", "W", Some(100), None),
        row(FIRST, 1, "501", "Ann", "Bob", "*", Some(120), None),
        row(FIRST, 1, "501", "Ann", "Bob", "W", None, None),
    ];
    let report = run_season(&rows, &cache, &SeasonConfig::default()).expect("season");

    let ann = line(&report.players, "Ann");
    assert_eq!(ann.legs_played, 3);
    assert_eq!(ann.total_quality_points, 3);
    assert_eq!((ann.wins, ann.losses), (1, 0));
    assert_eq!(report.unrecognized_results.len(), 1);
    assert_eq!(report.unrecognized_results[0].symbol, "*");
}

#[test]
fn no_usable_rows_is_fatal() {
    let cache = TurnDetailCache::new(
        Arc::new(MemoryTurnStore::new()),
        Arc::new(FixtureSource::new()),
    );
    let rows = vec![RawLegRow::default(), RawLegRow::default()];
    let err = run_season(&rows, &cache, &SeasonConfig::default()).expect_err("nothing usable");
    assert!(matches!(err, SeasonError::NoUsableRecords { rejected: 2 }));
}

#[test]
fn two_leg_wins_take_the_set_whatever_the_loser_rows_say() {
    let odd_loser_row = vec![
        row(FIRST, 1, "501", "Ann", "Bob", "W", None, None),
        row(FIRST, 1, "501", "Bob", "Ann", "L", None, None),
        row(FIRST, 1, "501", "Ann", "Bob", "W", None, None),
        row(FIRST, 1, "501", "Bob", "Ann", "*", None, None),
    ];
    let missing_loser_row = odd_loser_row[..3].to_vec();

    for rows in [odd_loser_row, missing_loser_row] {
        let cache = TurnDetailCache::new(
            Arc::new(MemoryTurnStore::new()),
            Arc::new(FixtureSource::new()),
        );
        let report = run_season(&rows, &cache, &SeasonConfig::default()).expect("season");

        let ann = line(&report.players, "Ann");
        assert_eq!((ann.wins, ann.losses), (1, 0));
        let bob = line(&report.players, "Bob");
        assert_eq!((bob.wins, bob.losses), (0, 1));
        assert_eq!(bob.legs_played as usize, rows.len() - 2);
        assert!(report.incomplete_games.is_empty());
        assert_eq!(report.games_resolved, 1);
    }
}
