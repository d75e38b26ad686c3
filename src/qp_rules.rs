use serde::Serialize;

use crate::turn_parser::TurnCounts;

pub const MAX_501_QP: u8 = 10;
pub const MAX_CRICKET_QP: u8 = 5;

/// Inclusive band of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub min: u32,
    pub max: u32,
}

impl Band {
    pub const fn range(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub const fn exactly(value: u32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub const fn at_least(min: u32) -> Self {
        Self { min, max: u32::MAX }
    }

    pub const ANY: Band = Band::at_least(0);

    pub fn contains(self, value: u32) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier<K> {
    pub when: K,
    pub award: u8,
}

const fn tier<K>(when: K, award: u8) -> Tier<K> {
    Tier { when, award }
}

/// Highest award among the rows that match, 0 when none does.
pub fn lookup<K>(table: &[Tier<K>], matches: impl Fn(&K) -> bool) -> u8 {
    table
        .iter()
        .filter(|row| matches(&row.when))
        .map(|row| row.award)
        .max()
        .unwrap_or(0)
}

pub const TURN_SCORE_TIERS: &[Tier<Band>] = &[
    tier(Band::range(95, 115), 1),
    tier(Band::range(116, 131), 2),
    tier(Band::range(132, 147), 3),
    tier(Band::range(148, 163), 4),
    tier(Band::range(164, 180), 5),
];

pub const CHECKOUT_TIERS: &[Tier<Band>] = &[
    tier(Band::range(61, 84), 1),
    tier(Band::range(85, 106), 2),
    tier(Band::range(107, 128), 3),
    tier(Band::range(129, 150), 4),
    tier(Band::range(151, 170), 5),
];

/// Rows are (hits, bulls). A row naming only one count leaves the other
/// open; the lookup takes the best matching row, so `H=5` with one bull
/// still lands on the `H=5 ∧ B=1` row.
pub const CRICKET_TIERS: &[Tier<(Band, Band)>] = &[
    tier((Band::exactly(5), Band::ANY), 1),
    tier((Band::exactly(3), Band::exactly(1)), 1),
    tier((Band::exactly(2), Band::exactly(2)), 1),
    tier((Band::exactly(6), Band::ANY), 2),
    tier((Band::ANY, Band::exactly(3)), 2),
    tier((Band::exactly(1), Band::exactly(3)), 2),
    tier((Band::exactly(3), Band::exactly(2)), 2),
    tier((Band::exactly(4), Band::exactly(1)), 2),
    tier((Band::exactly(7), Band::ANY), 3),
    tier((Band::ANY, Band::exactly(4)), 3),
    tier((Band::exactly(1), Band::exactly(4)), 3),
    tier((Band::exactly(2), Band::exactly(3)), 3),
    tier((Band::exactly(4), Band::exactly(2)), 3),
    tier((Band::exactly(5), Band::exactly(1)), 3),
    tier((Band::exactly(8), Band::ANY), 4),
    tier((Band::ANY, Band::exactly(5)), 4),
    tier((Band::exactly(2), Band::exactly(4)), 4),
    tier((Band::exactly(3), Band::exactly(3)), 4),
    tier((Band::exactly(5), Band::exactly(2)), 4),
    tier((Band::exactly(6), Band::exactly(1)), 4),
    tier((Band::at_least(9), Band::ANY), 5),
    tier((Band::ANY, Band::at_least(6)), 5),
    tier((Band::exactly(3), Band::exactly(4)), 5),
    tier((Band::exactly(6), Band::exactly(2)), 5),
];

pub fn turn_score_qp(hi_turn: u32) -> u8 {
    lookup(TURN_SCORE_TIERS, |band| band.contains(hi_turn))
}

pub fn checkout_qp(checkout: u32) -> u8 {
    lookup(CHECKOUT_TIERS, |band| band.contains(checkout))
}

/// Both dimensions are scored on the same leg and added.
pub fn points_leg_qp(hi_turn: Option<u32>, checkout: Option<u32>) -> u8 {
    hi_turn.map(turn_score_qp).unwrap_or(0) + checkout.map(checkout_qp).unwrap_or(0)
}

pub fn cricket_turn_qp(counts: TurnCounts) -> u8 {
    lookup(CRICKET_TIERS, |(hits, bulls)| {
        hits.contains(counts.hits) && bulls.contains(counts.bulls)
    })
}

/// The single best turn governs the award.
pub fn cricket_leg_qp(turns: &[TurnCounts]) -> u8 {
    turns.iter().copied().map(cricket_turn_qp).max().unwrap_or(0)
}

/// Notable single-leg feats kept for the special achievements register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feat {
    Ton80,
    HighOut(u32),
    NineMarks,
    SixBulls,
}

pub const HIGH_OUT_MIN: u32 = 100;

pub fn points_leg_feats(hi_turn: Option<u32>, checkout: Option<u32>) -> Vec<Feat> {
    let mut feats = Vec::new();
    if hi_turn == Some(180) {
        feats.push(Feat::Ton80);
    }
    if let Some(out) = checkout.filter(|out| (HIGH_OUT_MIN..=170).contains(out)) {
        feats.push(Feat::HighOut(out));
    }
    feats
}

pub fn cricket_leg_feats(turns: &[TurnCounts]) -> Vec<Feat> {
    let mut feats = Vec::new();
    for turn in turns {
        if turn.hits >= 9 {
            feats.push(Feat::NineMarks);
        }
        if turn.bulls >= 6 {
            feats.push(Feat::SixBulls);
        }
    }
    feats
}
