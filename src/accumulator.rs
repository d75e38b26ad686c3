use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregator::GameResult;
use crate::legs::{GameKind, LegRecord};
use crate::qp_rules::Feat;

pub const DEFAULT_QUALIFY_GAMES: u32 = 18;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WinLoss {
    pub wins: u32,
    pub losses: u32,
}

impl WinLoss {
    pub fn games(self) -> u32 {
        self.wins + self.losses
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Eligibility {
    Qualified,
    Ineligible,
}

/// What a leg contributed in quality points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegQp {
    Scored(u8),
    /// Turn detail was needed and could not be had; counts as zero.
    Unresolved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSeasonStats {
    player_id: String,
    legs_played: u32,
    records: BTreeMap<GameKind, WinLoss>,
    total_quality_points: u32,
    unresolved_qp_legs: u32,
}

impl PlayerSeasonStats {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            ..Self::default()
        }
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn legs_played(&self) -> u32 {
        self.legs_played
    }

    pub fn total_quality_points(&self) -> u32 {
        self.total_quality_points
    }

    pub fn unresolved_qp_legs(&self) -> u32 {
        self.unresolved_qp_legs
    }

    pub fn record(&self, kind: GameKind) -> WinLoss {
        self.records.get(&kind).copied().unwrap_or_default()
    }

    pub fn wins(&self) -> u32 {
        self.records.values().map(|r| r.wins).sum()
    }

    pub fn losses(&self) -> u32 {
        self.records.values().map(|r| r.losses).sum()
    }

    pub fn games_played(&self) -> u32 {
        self.records.values().map(|r| r.games()).sum()
    }

    pub fn win_pct(&self) -> f64 {
        let games = self.wins() + self.losses();
        if games == 0 {
            return 0.0;
        }
        round_to(100.0 * f64::from(self.wins()) / f64::from(games), 2)
    }

    pub fn qp_pct(&self) -> f64 {
        if self.legs_played == 0 {
            return 0.0;
        }
        round_to(
            100.0 * f64::from(self.total_quality_points) / f64::from(self.legs_played),
            2,
        )
    }

    /// `2 × wins / games + quality points / legs`, each term 0 on an empty
    /// denominator.
    pub fn rating(&self) -> f64 {
        let games = self.games_played();
        let win_term = if games == 0 {
            0.0
        } else {
            2.0 * f64::from(self.wins()) / f64::from(games)
        };
        let qp_term = if self.legs_played == 0 {
            0.0
        } else {
            f64::from(self.total_quality_points) / f64::from(self.legs_played)
        };
        round_to(win_term + qp_term, 4)
    }

    pub fn eligibility(&self, qualify_games: u32) -> Eligibility {
        if self.games_played() >= qualify_games {
            Eligibility::Qualified
        } else {
            Eligibility::Ineligible
        }
    }

    pub fn games_to_qualify(&self, qualify_games: u32) -> u32 {
        qualify_games.saturating_sub(self.games_played())
    }

    pub(crate) fn add_leg(&mut self, qp: LegQp) {
        self.legs_played += 1;
        match qp {
            LegQp::Scored(points) => self.total_quality_points += u32::from(points),
            LegQp::Unresolved => self.unresolved_qp_legs += 1,
        }
    }

    pub(crate) fn add_game(&mut self, kind: GameKind, won: bool) {
        let record = self.records.entry(kind).or_default();
        if won {
            record.wins += 1;
        } else {
            record.losses += 1;
        }
    }

    pub fn stat_line(&self, qualify_games: u32) -> StatLine {
        StatLine {
            player_id: self.player_id.clone(),
            legs_played: self.legs_played,
            games_played: self.games_played(),
            wins: self.wins(),
            losses: self.losses(),
            records: self.records.clone(),
            total_quality_points: self.total_quality_points,
            unresolved_qp_legs: self.unresolved_qp_legs,
            win_pct: self.win_pct(),
            qp_pct: self.qp_pct(),
            rating: self.rating(),
            eligibility: self.eligibility(qualify_games),
            games_to_qualify: self.games_to_qualify(qualify_games),
        }
    }
}

/// Read-only snapshot handed to the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatLine {
    pub player_id: String,
    pub legs_played: u32,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub records: BTreeMap<GameKind, WinLoss>,
    pub total_quality_points: u32,
    pub unresolved_qp_legs: u32,
    pub win_pct: f64,
    pub qp_pct: f64,
    pub rating: f64,
    pub eligibility: Eligibility,
    pub games_to_qualify: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub player_id: String,
    pub match_id: String,
    pub set_number: u32,
    pub date: NaiveDate,
    pub feat: Feat,
}

#[derive(Debug, Default)]
pub struct SeasonAccumulator {
    players: BTreeMap<String, PlayerSeasonStats>,
    achievements: Vec<Achievement>,
}

impl SeasonAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn player_mut(&mut self, player_id: &str) -> &mut PlayerSeasonStats {
        self.players
            .entry(player_id.to_string())
            .or_insert_with(|| PlayerSeasonStats::new(player_id))
    }

    pub fn record_leg(&mut self, leg: &LegRecord, qp: LegQp) {
        self.player_mut(&leg.player_id).add_leg(qp);
    }

    pub fn record_game(&mut self, result: &GameResult) {
        self.player_mut(&result.player_id)
            .add_game(result.kind, result.won);
    }

    pub fn record_feats(&mut self, leg: &LegRecord, feats: impl IntoIterator<Item = Feat>) {
        self.achievements
            .extend(feats.into_iter().map(|feat| Achievement {
                player_id: leg.player_id.clone(),
                match_id: leg.match_id.clone(),
                set_number: leg.set_number,
                date: leg.date,
                feat,
            }));
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerSeasonStats> {
        self.players.get(player_id)
    }

    /// Stat lines ordered by player id, plus the achievements in leg order.
    pub fn finish(self, qualify_games: u32) -> (Vec<StatLine>, Vec<Achievement>) {
        let lines = self
            .players
            .values()
            .map(|stats| stats.stat_line(qualify_games))
            .collect();
        (lines, self.achievements)
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
