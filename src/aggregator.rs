use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::legs::{GameKind, LegRecord, LegResult};

const LEGS_TO_WIN: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisionRule {
    /// Multi-leg sets, first to two legs.
    BestOfThree,
    /// Every leg is a complete game.
    BestOfOne,
}

/// Division name → rule. Names not listed play best-of-3.
#[derive(Debug, Clone, Default)]
pub struct DivisionRules {
    best_of_one: HashSet<String>,
}

impl DivisionRules {
    pub fn new<I, S>(best_of_one: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            best_of_one: best_of_one
                .into_iter()
                .map(|name| name.as_ref().trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    pub fn rule_for(&self, division: &str) -> DivisionRule {
        if self
            .best_of_one
            .contains(&division.trim().to_ascii_lowercase())
        {
            DivisionRule::BestOfOne
        } else {
            DivisionRule::BestOfThree
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GameKey {
    pub match_id: String,
    pub set_number: u32,
    pub kind: GameKind,
    /// Source row of the leg, for best-of-1 games only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leg_row: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LegTally {
    pub player_id: String,
    pub legs: u32,
    pub wins: u32,
    pub losses: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    /// Nobody reached two leg wins, e.g. a 1–1 set missing its decider.
    NoMajority,
    /// Opponents both came out ahead.
    Conflict,
    /// A best-of-1 leg whose result symbol was not understood.
    UnrecognizedResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    Resolved {
        winners: Vec<String>,
        losers: Vec<String>,
    },
    Incomplete(IncompleteReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub key: GameKey,
    pub division: String,
    pub rule: DivisionRule,
    /// Rows of the legs in this bucket.
    pub legs: Vec<usize>,
    pub tallies: Vec<LegTally>,
    pub outcome: GameOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameResult {
    pub player_id: String,
    pub kind: GameKind,
    pub won: bool,
}

/// A bucket left out of every win/loss total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteGame {
    #[serde(flatten)]
    pub key: GameKey,
    pub division: String,
    pub reason: IncompleteReason,
    pub tallies: Vec<LegTally>,
}

impl Game {
    pub fn results(&self) -> Vec<GameResult> {
        let GameOutcome::Resolved { winners, losers } = &self.outcome else {
            return Vec::new();
        };
        let won = winners.iter().map(|player| (player, true));
        let lost = losers.iter().map(|player| (player, false));
        won.chain(lost)
            .map(|(player, won)| GameResult {
                player_id: player.clone(),
                kind: self.key.kind,
                won,
            })
            .collect()
    }

    pub fn incomplete(&self) -> Option<IncompleteGame> {
        match self.outcome {
            GameOutcome::Incomplete(reason) => Some(IncompleteGame {
                key: self.key.clone(),
                division: self.division.clone(),
                reason,
                tallies: self.tallies.clone(),
            }),
            GameOutcome::Resolved { .. } => None,
        }
    }
}

/// One `Game` per bucket, ordered by key.
pub fn aggregate_games(legs: &[LegRecord], rules: &DivisionRules) -> Vec<Game> {
    let mut buckets: BTreeMap<GameKey, Vec<&LegRecord>> = BTreeMap::new();
    for leg in legs {
        let rule = rules.rule_for(&leg.division);
        let key = GameKey {
            match_id: leg.match_id.clone(),
            set_number: leg.set_number,
            kind: leg.kind(),
            leg_row: (rule == DivisionRule::BestOfOne).then_some(leg.row),
        };
        buckets.entry(key).or_default().push(leg);
    }

    buckets
        .into_iter()
        .map(|(key, bucket)| {
            let division = bucket[0].division.clone();
            let rule = rules.rule_for(&division);
            let tallies = tally(&bucket);
            let outcome = match rule {
                DivisionRule::BestOfThree => settle_best_of_three(&bucket, &tallies),
                DivisionRule::BestOfOne => settle_single_leg(bucket[0]),
            };
            if let GameOutcome::Incomplete(reason) = &outcome {
                warn!(
                    match_id = %key.match_id,
                    set = key.set_number,
                    kind = key.kind.label(),
                    ?reason,
                    "game excluded from win/loss totals"
                );
            }
            Game {
                legs: bucket.iter().map(|leg| leg.row).collect(),
                key,
                division,
                rule,
                tallies,
                outcome,
            }
        })
        .collect()
}

fn tally(bucket: &[&LegRecord]) -> Vec<LegTally> {
    let mut by_player: BTreeMap<&str, LegTally> = BTreeMap::new();
    for leg in bucket {
        let entry = by_player
            .entry(leg.player_id.as_str())
            .or_insert_with(|| LegTally {
                player_id: leg.player_id.clone(),
                ..LegTally::default()
            });
        entry.legs += 1;
        match leg.result {
            LegResult::Won => entry.wins += 1,
            LegResult::Lost => entry.losses += 1,
            LegResult::Unrecognized(_) => {}
        }
    }
    by_player.into_values().collect()
}

/// The owners who reach two leg wins take the game; every other owner in the
/// bucket takes the loss, whatever their own rows say.
fn settle_best_of_three(bucket: &[&LegRecord], tallies: &[LegTally]) -> GameOutcome {
    let (winners, losers): (Vec<&LegTally>, Vec<&LegTally>) =
        tallies.iter().partition(|t| t.wins >= LEGS_TO_WIN);
    if winners.is_empty() {
        return GameOutcome::Incomplete(IncompleteReason::NoMajority);
    }

    let winner_set = winners
        .iter()
        .map(|t| t.player_id.as_str())
        .collect::<BTreeSet<_>>();
    let opposed_winners = bucket.iter().any(|leg| {
        winner_set.contains(leg.player_id.as_str())
            && leg
                .opponent_ids
                .iter()
                .any(|opp| winner_set.contains(opp.as_str()))
    });
    if opposed_winners {
        return GameOutcome::Incomplete(IncompleteReason::Conflict);
    }

    GameOutcome::Resolved {
        winners: winners.iter().map(|t| t.player_id.clone()).collect(),
        losers: losers.iter().map(|t| t.player_id.clone()).collect(),
    }
}

fn settle_single_leg(leg: &LegRecord) -> GameOutcome {
    let player = vec![leg.player_id.clone()];
    match leg.result {
        LegResult::Won => GameOutcome::Resolved {
            winners: player,
            losers: Vec::new(),
        },
        LegResult::Lost => GameOutcome::Resolved {
            winners: Vec::new(),
            losers: player,
        },
        LegResult::Unrecognized(_) => GameOutcome::Incomplete(IncompleteReason::UnrecognizedResult),
    }
}
