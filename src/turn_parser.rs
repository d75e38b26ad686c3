use serde::Serialize;

/// Segments that carry marks in cricket. Hits elsewhere parse but score no
/// marks.
const MARK_SEGMENTS: std::ops::RangeInclusive<u8> = 15..=20;
const MISS_MARKERS: &[&str] = &["-", "x", "m", "miss", "o"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BullKind {
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnToken {
    Hit { multiplier: u8, segment: u8 },
    Bull(BullKind),
}

impl TurnToken {
    pub fn parse(raw: &str) -> Option<TurnToken> {
        let token = raw.trim().to_ascii_uppercase();
        match token.as_str() {
            "SB" | "SBULL" | "25" => return Some(TurnToken::Bull(BullKind::Single)),
            "DB" | "DBULL" | "BULL" | "50" => return Some(TurnToken::Bull(BullKind::Double)),
            _ => {}
        }
        let mut chars = token.chars();
        let multiplier = match chars.next()? {
            'S' => 1,
            'D' => 2,
            'T' => 3,
            _ => return None,
        };
        let segment = chars.as_str().parse::<u8>().ok()?;
        if !(1..=20).contains(&segment) {
            return None;
        }
        Some(TurnToken::Hit {
            multiplier,
            segment,
        })
    }

    fn hits(self) -> u32 {
        match self {
            TurnToken::Hit {
                multiplier,
                segment,
            } if MARK_SEGMENTS.contains(&segment) => u32::from(multiplier),
            _ => 0,
        }
    }

    fn bulls(self) -> u32 {
        match self {
            TurnToken::Bull(BullKind::Single) => 1,
            TurnToken::Bull(BullKind::Double) => 2,
            TurnToken::Hit { .. } => 0,
        }
    }
}

/// Hit count H and bull count B for a single turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TurnCounts {
    pub hits: u32,
    pub bulls: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTurn {
    pub tokens: Vec<TurnToken>,
    pub counts: TurnCounts,
    /// Tokens that were neither a hit, a bull nor a miss marker.
    pub dropped: Vec<String>,
}

pub fn parse_turn(raw: &str) -> ParsedTurn {
    let mut out = ParsedTurn::default();
    for piece in raw.split([',', ' ']) {
        let piece = piece.trim();
        if piece.is_empty() || MISS_MARKERS.contains(&piece.to_ascii_lowercase().as_str()) {
            continue;
        }
        match TurnToken::parse(piece) {
            Some(token) => {
                out.counts.hits += token.hits();
                out.counts.bulls += token.bulls();
                out.tokens.push(token);
            }
            None => out.dropped.push(piece.to_string()),
        }
    }
    out
}
