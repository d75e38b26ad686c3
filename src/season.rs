use serde::Serialize;
use tracing::{debug, info, warn};

use crate::accumulator::{
    Achievement, DEFAULT_QUALIFY_GAMES, LegQp, SeasonAccumulator, StatLine,
};
use crate::aggregator::{DivisionRules, IncompleteGame, aggregate_games};
use crate::errors::{IngestionError, SeasonError};
use crate::legs::{
    GameType, LegRecord, MatchId, RawLegRow, UnrecognizedResult, ingest, leg_ordinals,
};
use crate::qp_rules::{cricket_leg_feats, cricket_leg_qp, points_leg_feats, points_leg_qp};
use crate::turn_cache::{CacheStats, TurnDetailCache};
use crate::turn_parser::{TurnCounts, parse_turn};

#[derive(Debug, Clone)]
pub struct SeasonConfig {
    pub rules: DivisionRules,
    pub qualify_games: u32,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            rules: DivisionRules::default(),
            qualify_games: DEFAULT_QUALIFY_GAMES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Neither the locator nor the match id yields a usable key.
    NoDetailKey,
    FetchFailed { error: String },
    LegNotInDetail,
    /// The detail has a leg at that position but it is not a cricket leg.
    GameMismatch { game_name: String },
    PlayerNotInDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedQpLeg {
    pub row: usize,
    pub player_id: String,
    pub match_id: String,
    pub set_number: u32,
    pub leg_number: u32,
    #[serde(flatten)]
    pub reason: UnresolvedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedTurnTokens {
    pub row: usize,
    pub player_id: String,
    pub match_id: String,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    Full,
    Partial,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataQuality {
    pub score: u8,
    pub grade: QualityGrade,
    pub detail_lookups: usize,
    pub detail_resolved: usize,
}

impl DataQuality {
    pub fn assess(detail_lookups: usize, detail_resolved: usize) -> Self {
        let (score, grade) = if detail_lookups == 0 {
            (100, QualityGrade::Full)
        } else {
            let rate = detail_resolved as f64 / detail_lookups as f64;
            if rate >= 0.8 {
                (95, QualityGrade::Full)
            } else if rate >= 0.5 {
                (75, QualityGrade::Partial)
            } else {
                (60, QualityGrade::Degraded)
            }
        };
        Self {
            score,
            grade,
            detail_lookups,
            detail_resolved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonReport {
    pub players: Vec<StatLine>,
    pub games_resolved: usize,
    pub incomplete_games: Vec<IncompleteGame>,
    pub unresolved_qp_legs: Vec<UnresolvedQpLeg>,
    pub ingestion_errors: Vec<IngestionError>,
    pub unrecognized_results: Vec<UnrecognizedResult>,
    pub dropped_turn_tokens: Vec<DroppedTurnTokens>,
    pub achievements: Vec<Achievement>,
    pub cache: CacheStats,
    pub quality: DataQuality,
}

/// Only an input with no usable rows at all is an error; everything else is
/// reported alongside the totals.
pub fn run_season(
    rows: &[RawLegRow],
    cache: &TurnDetailCache,
    config: &SeasonConfig,
) -> Result<SeasonReport, SeasonError> {
    let ingested = ingest(rows);
    if ingested.legs.is_empty() {
        return Err(SeasonError::NoUsableRecords {
            rejected: ingested.rejected.len(),
        });
    }
    let legs = ingested.legs;
    let ordinals = leg_ordinals(&legs);

    let wanted = legs
        .iter()
        .filter(|leg| leg.game_type == GameType::Cricket)
        .filter_map(|leg| leg.detail_key.clone())
        .collect::<Vec<_>>();
    cache.prefetch(&wanted);

    let mut acc = SeasonAccumulator::new();
    let mut unresolved = Vec::new();
    let mut dropped = Vec::new();
    let mut detail_lookups = 0usize;

    for (leg, &leg_number) in legs.iter().zip(&ordinals) {
        let qp = match leg.game_type {
            GameType::Points501 => {
                acc.record_feats(leg, points_leg_feats(leg.hi_turn, leg.checkout_score));
                LegQp::Scored(points_leg_qp(leg.hi_turn, leg.checkout_score))
            }
            GameType::Cricket => {
                detail_lookups += 1;
                match cricket_turns(cache, leg, leg_number) {
                    Ok(turns) => {
                        if !turns.dropped.is_empty() {
                            debug!(row = leg.row, tokens = ?turns.dropped, "dropped turn tokens");
                            dropped.push(DroppedTurnTokens {
                                row: leg.row,
                                player_id: leg.player_id.clone(),
                                match_id: leg.match_id.clone(),
                                tokens: turns.dropped,
                            });
                        }
                        acc.record_feats(leg, cricket_leg_feats(&turns.counts));
                        LegQp::Scored(cricket_leg_qp(&turns.counts))
                    }
                    Err(reason) => {
                        debug!(row = leg.row, ?reason, "cricket leg quality points unresolved");
                        unresolved.push(UnresolvedQpLeg {
                            row: leg.row,
                            player_id: leg.player_id.clone(),
                            match_id: leg.match_id.clone(),
                            set_number: leg.set_number,
                            leg_number,
                            reason,
                        });
                        LegQp::Unresolved
                    }
                }
            }
        };
        acc.record_leg(leg, qp);
    }

    let games = aggregate_games(&legs, &config.rules);
    let mut games_resolved = 0usize;
    let mut incomplete_games = Vec::new();
    for game in &games {
        match game.incomplete() {
            Some(incomplete) => incomplete_games.push(incomplete),
            None => {
                games_resolved += 1;
                for result in game.results() {
                    acc.record_game(&result);
                }
            }
        }
    }

    let quality = DataQuality::assess(detail_lookups, detail_lookups - unresolved.len());
    if quality.grade != QualityGrade::Full {
        warn!(
            score = quality.score,
            unresolved = unresolved.len(),
            "turn detail coverage is incomplete"
        );
    }

    let (players, achievements) = acc.finish(config.qualify_games);
    info!(
        players = players.len(),
        legs = legs.len(),
        games = games_resolved,
        incomplete = incomplete_games.len(),
        "season totals ready"
    );

    Ok(SeasonReport {
        players,
        games_resolved,
        incomplete_games,
        unresolved_qp_legs: unresolved,
        ingestion_errors: ingested.rejected,
        unrecognized_results: ingested.unrecognized,
        dropped_turn_tokens: dropped,
        achievements,
        cache: cache.stats(),
        quality,
    })
}

struct CricketTurns {
    counts: Vec<TurnCounts>,
    dropped: Vec<String>,
}

fn cricket_turns(
    cache: &TurnDetailCache,
    leg: &LegRecord,
    leg_number: u32,
) -> Result<CricketTurns, UnresolvedReason> {
    let key: &MatchId = leg.detail_key.as_ref().ok_or(UnresolvedReason::NoDetailKey)?;
    let detail = cache
        .resolve(key)
        .map_err(|err| UnresolvedReason::FetchFailed {
            error: err.to_string(),
        })?;
    let recap = detail
        .find_leg(leg.set_number, leg_number)
        .ok_or(UnresolvedReason::LegNotInDetail)?;
    if !recap.is_cricket() {
        return Err(UnresolvedReason::GameMismatch {
            game_name: recap.game_name.clone(),
        });
    }

    let mut out = CricketTurns {
        counts: Vec::new(),
        dropped: Vec::new(),
    };
    for raw in recap.turns_for(&leg.player_id) {
        let parsed = parse_turn(raw);
        out.counts.push(parsed.counts);
        out.dropped.extend(parsed.dropped);
    }
    if out.counts.is_empty() {
        return Err(UnresolvedReason::PlayerNotInDetail);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_grades() {
        assert_eq!(DataQuality::assess(0, 0).score, 100);
        assert_eq!(DataQuality::assess(10, 8).grade, QualityGrade::Full);
        assert_eq!(DataQuality::assess(10, 8).score, 95);
        assert_eq!(DataQuality::assess(10, 5).grade, QualityGrade::Partial);
        assert_eq!(DataQuality::assess(10, 4).score, 60);
    }
}
