use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::IngestionError;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%d-%b-%Y"];
const WIN_SYMBOLS: &[&str] = &["w", "y", "win", "won", "yes", "1"];
const LOSS_SYMBOLS: &[&str] = &["l", "n", "loss", "lost", "no", "0"];

/// Normalized match identifier. Two locators addressing the same match
/// produce equal ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    /// Accepts a bare id or a recap URL in either the `/games/<id>` or the
    /// `/history/report/match/<id>` form.
    pub fn from_locator(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if !trimmed.contains('/') {
            return Self::from_bare(trimmed);
        }
        let url = if trimmed.contains("://") {
            Url::parse(trimmed).ok()?
        } else {
            Url::parse(&format!("https://{trimmed}")).ok()?
        };
        let segments = url
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>();
        let id = match segments.as_slice() {
            ["games", id, ..] => *id,
            ["history", "report", "match", id, ..] => *id,
            _ => return None,
        };
        Self::from_bare(id)
    }

    fn from_bare(raw: &str) -> Option<Self> {
        let id = raw.trim();
        if id.len() < 6 || id.len() > 64 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(id.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayFormat {
    Singles,
    Doubles,
}

/// Point-accumulation (501) or elimination-marks (cricket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    #[serde(rename = "501")]
    Points501,
    Cricket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GameKind {
    #[serde(rename = "singles_501")]
    Singles501,
    #[serde(rename = "doubles_501")]
    Doubles501,
    #[serde(rename = "singles_cricket")]
    SinglesCricket,
    #[serde(rename = "doubles_cricket")]
    DoublesCricket,
}

impl GameKind {
    pub fn from_parts(format: PlayFormat, game_type: GameType) -> Self {
        match (format, game_type) {
            (PlayFormat::Singles, GameType::Points501) => GameKind::Singles501,
            (PlayFormat::Doubles, GameType::Points501) => GameKind::Doubles501,
            (PlayFormat::Singles, GameType::Cricket) => GameKind::SinglesCricket,
            (PlayFormat::Doubles, GameType::Cricket) => GameKind::DoublesCricket,
        }
    }

    pub fn game_type(self) -> GameType {
        match self {
            GameKind::Singles501 | GameKind::Doubles501 => GameType::Points501,
            GameKind::SinglesCricket | GameKind::DoublesCricket => GameType::Cricket,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GameKind::Singles501 => "singles 501",
            GameKind::Doubles501 => "doubles 501",
            GameKind::SinglesCricket => "singles cricket",
            GameKind::DoublesCricket => "doubles cricket",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegResult {
    Won,
    Lost,
    /// A symbol that is neither a win nor a loss marker. Kept verbatim.
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegRecord {
    /// Position of the source row in the ingested sequence.
    pub row: usize,
    pub match_id: String,
    pub set_number: u32,
    pub leg_number: Option<u32>,
    pub format: PlayFormat,
    pub game_type: GameType,
    pub division: String,
    pub date: NaiveDate,
    pub player_id: String,
    pub opponent_ids: Vec<String>,
    pub result: LegResult,
    pub hi_turn: Option<u32>,
    pub checkout_score: Option<u32>,
    /// Cache key for turn detail, from the locator or else the match id.
    pub detail_key: Option<MatchId>,
}

impl LegRecord {
    pub fn kind(&self) -> GameKind {
        GameKind::from_parts(self.format, self.game_type)
    }
}

/// A leg row as handed over by the ingestion collaborator. Every field is
/// optional here; `LegRecord::from_raw` decides what is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawLegRow {
    #[serde(default, alias = "matchId", deserialize_with = "text_or_none")]
    pub match_id: Option<String>,
    #[serde(default, alias = "setNumber", deserialize_with = "text_or_none")]
    pub set_number: Option<String>,
    #[serde(default, alias = "legNumber", deserialize_with = "text_or_none")]
    pub leg_number: Option<String>,
    #[serde(default, alias = "playFormat", deserialize_with = "text_or_none")]
    pub play_format: Option<String>,
    #[serde(default, alias = "gameKind", alias = "game_kind", deserialize_with = "text_or_none")]
    pub game_type: Option<String>,
    #[serde(default, deserialize_with = "text_or_none")]
    pub division: Option<String>,
    #[serde(default, deserialize_with = "text_or_none")]
    pub date: Option<String>,
    #[serde(default, alias = "playerId", deserialize_with = "text_or_none")]
    pub player_id: Option<String>,
    #[serde(default, alias = "opponentIds", deserialize_with = "list_or_default")]
    pub opponent_ids: Vec<String>,
    #[serde(default, alias = "legResult", deserialize_with = "text_or_none")]
    pub leg_result: Option<String>,
    #[serde(default, alias = "hiTurn", deserialize_with = "text_or_none")]
    pub hi_turn: Option<String>,
    #[serde(default, alias = "checkoutScore", deserialize_with = "text_or_none")]
    pub checkout_score: Option<String>,
    #[serde(default, deserialize_with = "text_or_none")]
    pub locator: Option<String>,
}

impl LegRecord {
    pub fn from_raw(row: usize, raw: &RawLegRow) -> Result<Self, IngestionError> {
        let match_id = required(row, "match_id", &raw.match_id)?.to_string();
        let set_number = parse_count(row, "set_number", required(row, "set_number", &raw.set_number)?)?;
        let leg_number = raw
            .leg_number
            .as_deref()
            .map(|value| parse_count(row, "leg_number", value))
            .transpose()?;
        let format = parse_format(row, required(row, "play_format", &raw.play_format)?)?;
        let game_type = parse_game_type(row, required(row, "game_type", &raw.game_type)?)?;
        let division = required(row, "division", &raw.division)?.to_string();
        let date = parse_date(row, required(row, "date", &raw.date)?)?;
        let player_id = required(row, "player_id", &raw.player_id)?.to_string();
        let result = parse_result(required(row, "leg_result", &raw.leg_result)?);

        // Only 501 legs carry turn and checkout scores; they are ignored on
        // cricket rows.
        let (hi_turn, checkout_score) = match game_type {
            GameType::Points501 => (
                parse_optional_score(row, "hi_turn", raw.hi_turn.as_deref())?,
                parse_optional_score(row, "checkout_score", raw.checkout_score.as_deref())?,
            ),
            GameType::Cricket => (None, None),
        };

        let detail_key = raw
            .locator
            .as_deref()
            .and_then(MatchId::from_locator)
            .or_else(|| MatchId::from_locator(&match_id));

        Ok(LegRecord {
            row,
            match_id,
            set_number,
            leg_number,
            format,
            game_type,
            division,
            date,
            player_id,
            opponent_ids: raw
                .opponent_ids
                .iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
            result,
            hi_turn,
            checkout_score,
            detail_key,
        })
    }
}

/// Records whose result symbol was not understood. The rows are still used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnrecognizedResult {
    pub row: usize,
    pub player_id: String,
    pub match_id: String,
    pub symbol: String,
}

#[derive(Debug, Default)]
pub struct Ingested {
    pub legs: Vec<LegRecord>,
    pub rejected: Vec<IngestionError>,
    pub unrecognized: Vec<UnrecognizedResult>,
}

/// Validates every raw row. Bad rows are skipped and reported, never fatal
/// on their own.
pub fn ingest(rows: &[RawLegRow]) -> Ingested {
    let mut out = Ingested::default();
    for (row, raw) in rows.iter().enumerate() {
        match LegRecord::from_raw(row, raw) {
            Ok(leg) => {
                if let LegResult::Unrecognized(symbol) = &leg.result {
                    warn!(row, symbol = %symbol, player = %leg.player_id, "unrecognized leg result symbol");
                    out.unrecognized.push(UnrecognizedResult {
                        row,
                        player_id: leg.player_id.clone(),
                        match_id: leg.match_id.clone(),
                        symbol: symbol.clone(),
                    });
                }
                out.legs.push(leg);
            }
            Err(err) => {
                warn!(%err, "skipping leg row");
                out.rejected.push(err);
            }
        }
    }
    debug!(
        accepted = out.legs.len(),
        rejected = out.rejected.len(),
        "ingested leg rows"
    );
    out
}

/// Position of each leg within its owner's legs of the same (match, set),
/// 1-based, in input order. An explicit leg number wins.
pub fn leg_ordinals(legs: &[LegRecord]) -> Vec<u32> {
    let mut seen: HashMap<(&str, u32, &str), u32> = HashMap::new();
    legs.iter()
        .map(|leg| {
            let counter = seen
                .entry((leg.match_id.as_str(), leg.set_number, leg.player_id.as_str()))
                .or_insert(0);
            *counter += 1;
            leg.leg_number.unwrap_or(*counter)
        })
        .collect()
}

fn required<'a>(
    row: usize,
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, IngestionError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| IngestionError::missing(row, field))
}

fn parse_count(row: usize, field: &'static str, value: &str) -> Result<u32, IngestionError> {
    let trimmed = value.trim();
    match trimmed.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(IngestionError::invalid(row, field, trimmed)),
    }
}

fn parse_optional_score(
    row: usize,
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<u32>, IngestionError> {
    let Some(trimmed) = value.map(str::trim).filter(|v| !v.is_empty() && *v != "-") else {
        return Ok(None);
    };
    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| IngestionError::invalid(row, field, trimmed))
}

fn parse_format(row: usize, value: &str) -> Result<PlayFormat, IngestionError> {
    match value.to_ascii_lowercase().as_str() {
        "s" | "singles" | "single" | "1" => Ok(PlayFormat::Singles),
        "d" | "doubles" | "double" | "2" => Ok(PlayFormat::Doubles),
        _ => Err(IngestionError::invalid(row, "play_format", value)),
    }
}

fn parse_game_type(row: usize, value: &str) -> Result<GameType, IngestionError> {
    let lower = value.to_ascii_lowercase();
    if lower.contains("cricket") {
        Ok(GameType::Cricket)
    } else if lower.contains("501") {
        Ok(GameType::Points501)
    } else {
        Err(IngestionError::invalid(row, "game_type", value))
    }
}

fn parse_date(row: usize, value: &str) -> Result<NaiveDate, IngestionError> {
    let head = value.split(['T', ' ']).next().unwrap_or(value);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())
        .ok_or_else(|| IngestionError::invalid(row, "date", value))
}

fn parse_result(value: &str) -> LegResult {
    let lower = value.to_ascii_lowercase();
    if WIN_SYMBOLS.contains(&lower.as_str()) {
        LegResult::Won
    } else if LOSS_SYMBOLS.contains(&lower.as_str()) {
        LegResult::Lost
    } else {
        LegResult::Unrecognized(value.to_string())
    }
}

fn text_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let rendered = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => {
            if b {
                "y".to_string()
            } else {
                "n".to_string()
            }
        }
        serde_json::Value::Null => return Ok(None),
        other => other.to_string(),
    };
    if rendered.is_empty() {
        Ok(None)
    } else {
        Ok(Some(rendered))
    }
}

fn list_or_default<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let out = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        // Names read "Last, First"; entries are split on `;` and `/` only.
        serde_json::Value::String(s) => s.split([';', '/']).map(str::to_string).collect(),
        _ => Vec::new(),
    };
    Ok(out)
}
