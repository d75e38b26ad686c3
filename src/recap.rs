use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::FetchError;
use crate::http_client::http_client;
use crate::legs::MatchId;

pub const DEFAULT_RECAP_BASE_URL: &str = "https://recap.dartconnect.com";

/// Anything that can produce turn detail for a match.
pub trait TurnDetailSource: Send + Sync {
    fn fetch(&self, match_id: &MatchId) -> Result<TurnDetail, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnDetail {
    pub match_id: MatchId,
    pub legs: Vec<RecapLeg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecapLeg {
    pub set_number: u32,
    pub leg_number: u32,
    pub game_name: String,
    #[serde(default)]
    pub turns: Vec<RecapTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecapTurn {
    pub player: String,
    pub turn_score: String,
}

impl TurnDetail {
    pub fn find_leg(&self, set_number: u32, leg_number: u32) -> Option<&RecapLeg> {
        self.legs
            .iter()
            .find(|leg| leg.set_number == set_number && leg.leg_number == leg_number)
    }
}

impl RecapLeg {
    pub fn is_cricket(&self) -> bool {
        self.game_name.to_ascii_lowercase().contains("cricket")
    }

    /// Turn strings thrown by `player`, in order.
    pub fn turns_for<'a>(&'a self, player: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let wanted = player.trim();
        self.turns
            .iter()
            .filter(move |turn| turn.player.trim().eq_ignore_ascii_case(wanted))
            .map(|turn| turn.turn_score.as_str())
    }
}

pub struct RecapClient {
    client: Client,
    base_url: String,
}

impl RecapClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn game_url(&self, match_id: &MatchId) -> String {
        format!("{}/games/{}", self.base_url, match_id)
    }
}

impl TurnDetailSource for RecapClient {
    fn fetch(&self, match_id: &MatchId) -> Result<TurnDetail, FetchError> {
        let url = self.game_url(match_id);
        debug!(%url, "fetching recap page");
        let resp = self.client.get(&url).send().map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp.text().map_err(classify)?;
        parse_recap_page(match_id, &body)
    }
}

/// Source used when the run must not touch the network; only cached
/// detail resolves.
pub struct OfflineSource;

impl TurnDetailSource for OfflineSource {
    fn fetch(&self, _match_id: &MatchId) -> Result<TurnDetail, FetchError> {
        Err(FetchError::Network("offline".to_string()))
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

pub fn parse_recap_page(match_id: &MatchId, html: &str) -> Result<TurnDetail, FetchError> {
    const ATTR: &str = "data-page=\"";
    let start = html
        .find(ATTR)
        .ok_or_else(|| FetchError::Malformed("no data-page attribute".to_string()))?
        + ATTR.len();
    let len = html[start..]
        .find('"')
        .ok_or_else(|| FetchError::Malformed("unterminated data-page attribute".to_string()))?;
    let json = unescape_html(&html[start..start + len]);
    let root: Value = serde_json::from_str(&json)
        .map_err(|err| FetchError::Malformed(format!("invalid page json: {err}")))?;
    let props = root
        .get("props")
        .ok_or_else(|| FetchError::Malformed("no props in page data".to_string()))?;
    parse_recap_props(match_id, props)
}

pub fn parse_recap_props(match_id: &MatchId, props: &Value) -> Result<TurnDetail, FetchError> {
    let segments = props
        .get("segments")
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::Malformed("no segments".to_string()))?;

    let mut legs = Vec::new();
    let mut set_number = 0u32;
    for groups in segments.values().filter_map(Value::as_array) {
        for group in groups.iter().filter_map(Value::as_array) {
            set_number += 1;
            for (idx, game) in group.iter().enumerate() {
                if !game.is_object() {
                    continue;
                }
                legs.push(RecapLeg {
                    set_number,
                    leg_number: idx as u32 + 1,
                    game_name: game
                        .get("game_name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    turns: parse_turns(game.get("turns")),
                });
            }
        }
    }

    if legs.is_empty() {
        return Err(FetchError::Malformed("no games in segments".to_string()));
    }
    Ok(TurnDetail {
        match_id: match_id.clone(),
        legs,
    })
}

fn parse_turns(value: Option<&Value>) -> Vec<RecapTurn> {
    let Some(turns) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for turn in turns {
        for side in ["home", "away"] {
            let Some(side) = turn.get(side) else {
                continue;
            };
            let Some(player) = side
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
            else {
                continue;
            };
            let turn_score = match side.get("turn_score") {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            out.push(RecapTurn {
                player: player.to_string(),
                turn_score,
            });
        }
    }
    out
}

fn unescape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|end| {
            let entity = &rest[1..end];
            decode_entity(entity).map(|ch| (ch, end + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "quot" => Some('"'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "lt" => Some('<'),
        "gt" => Some('>'),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}
