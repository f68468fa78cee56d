//! Upstream field aliasing.
//!
//! The same logical field arrives under different keys depending on the
//! endpoint (`PLAYER` on rosters, `DISPLAY_FIRST_LAST` on the league list,
//! `PLAYER_NAME` on box scores, `playerName` in hand-built records). Each
//! payload type below owns a small alias table and is normalised exactly once,
//! here; nothing downstream looks at raw keys.

use chrono::NaiveDate;
use serde_json::Value;

use crate::models::StatLine;
use crate::services::source::RawRecord;
use crate::utils::{parse_birth_date, parse_minutes};

type Aliases = &'static [&'static str];

mod team_keys {
    use super::Aliases;
    pub const ID: Aliases = &["id", "TEAM_ID", "teamId"];
    pub const NAME: Aliases = &["full_name", "name", "teamName", "TEAM_NAME"];
    pub const ABBREVIATION: Aliases = &["abbreviation", "teamAbbreviation", "TEAM_ABBREVIATION", "ABBREVIATION"];
    pub const CITY: Aliases = &["city", "teamCity", "TEAM_CITY"];
    pub const CONFERENCE: Aliases = &["conference", "TEAM_CONFERENCE"];
    pub const DIVISION: Aliases = &["division", "TEAM_DIVISION"];
}

mod player_keys {
    use super::Aliases;
    pub const ID: Aliases = &["PLAYER_ID", "PERSON_ID", "playerId", "id"];
    pub const NAME: Aliases = &["name", "playerName", "PLAYER", "DISPLAY_FIRST_LAST", "PLAYER_NAME"];
    pub const TEAM_ABBREVIATION: Aliases = &["teamAbbreviation", "team", "team_abbreviation", "TEAM_ABBREVIATION"];
    pub const TEAM_ID: Aliases = &["TeamID", "TEAM_ID", "teamId"];
    pub const POSITION: Aliases = &["position", "POSITION"];
    pub const HEIGHT: Aliases = &["height", "HEIGHT"];
    pub const WEIGHT: Aliases = &["weight", "WEIGHT"];
    pub const BIRTH_DATE: Aliases = &["birthDate", "birth_date", "BIRTH_DATE", "BIRTHDATE"];
}

mod line_score_keys {
    use super::Aliases;
    pub const GAME_ID: Aliases = &["GAME_ID", "gameId"];
    pub const TEAM_ABBREVIATION: Aliases = &["TEAM_ABBREVIATION", "teamAbbreviation"];
    pub const POINTS: Aliases = &["PTS", "points"];
    pub const IS_HOME: Aliases = &["IS_HOME", "isHome"];
    pub const GAME_DATE: Aliases = &["GAME_DATE_EST", "GAME_DATE", "gameDate"];
}

mod game_keys {
    use super::Aliases;
    pub const ID: Aliases = &["gameId", "GAME_ID", "game_id"];
    pub const DATE: Aliases = &["gameDate", "date", "game_date", "GAME_DATE_EST", "GAME_DATE"];
    pub const HOME: Aliases = &["homeTeam", "homeTeamAbbreviation", "home_team"];
    pub const AWAY: Aliases = &["awayTeam", "awayTeamAbbreviation", "away_team"];
    pub const HOME_SCORE: Aliases = &["homeScore", "home_score"];
    pub const AWAY_SCORE: Aliases = &["awayScore", "away_score"];
}

mod stat_keys {
    use super::Aliases;
    pub const PLAYER_NAME: Aliases = &["playerName", "PLAYER_NAME", "player_name", "name"];
    pub const PLAYER_ID: Aliases = &["PLAYER_ID", "playerId"];
    pub const TEAM_ABBREVIATION: Aliases = &["TEAM_ABBREVIATION", "teamAbbreviation"];
    pub const MINUTES: Aliases = &["minutes", "MIN"];
    pub const POINTS: Aliases = &["points", "PTS"];
    pub const REBOUNDS: Aliases = &["rebounds", "REB"];
    pub const ASSISTS: Aliases = &["assists", "AST"];
    pub const STEALS: Aliases = &["steals", "STL"];
    pub const BLOCKS: Aliases = &["blocks", "BLK"];
    pub const TURNOVERS: Aliases = &["turnovers", "TO", "TOV"];
    pub const FOULS: Aliases = &["personalFouls", "fouls", "personal_fouls", "PF"];
    pub const FGM: Aliases = &["fieldGoalsMade", "fgm", "FGM"];
    pub const FGA: Aliases = &["fieldGoalsAttempted", "fga", "FGA"];
    pub const FG3M: Aliases = &["threePointersMade", "fg3m", "FG3M"];
    pub const FG3A: Aliases = &["threePointersAttempted", "fg3a", "FG3A"];
    pub const FTM: Aliases = &["freeThrowsMade", "ftm", "FTM"];
    pub const FTA: Aliases = &["freeThrowsAttempted", "fta", "FTA"];
    pub const PLUS_MINUS: Aliases = &["plusMinus", "plus_minus", "PLUS_MINUS"];
}

// ── Accessors ────────────────────────────────────────────────────────────────

/// First alias present with a non-null value.
fn field<'a>(record: &'a RawRecord, aliases: Aliases) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|key| record.get(*key))
        .find(|v| !v.is_null())
}

fn text(record: &RawRecord, aliases: Aliases) -> Option<String> {
    match field(record, aliases)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer(record: &RawRecord, aliases: Aliases) -> Option<i64> {
    match field(record, aliases)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
        }
        _ => None,
    }
}

fn flag(record: &RawRecord, aliases: Aliases) -> Option<bool> {
    match field(record, aliases)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

fn date(record: &RawRecord, aliases: Aliases) -> Option<NaiveDate> {
    let raw = text(record, aliases)?;
    let day = raw.split('T').next().unwrap_or(&raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

// ── Normalised payloads ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TeamPayload {
    pub upstream_id: Option<String>,
    pub name: String,
    pub abbreviation: String,
    pub city: Option<String>,
    pub conference: Option<String>,
    pub division: Option<String>,
}

impl TeamPayload {
    /// `None` when the record lacks a name or abbreviation.
    pub fn from_raw(record: &RawRecord) -> Option<Self> {
        Some(Self {
            upstream_id: text(record, team_keys::ID),
            name: text(record, team_keys::NAME)?,
            abbreviation: text(record, team_keys::ABBREVIATION)?.to_uppercase(),
            city: text(record, team_keys::CITY),
            conference: text(record, team_keys::CONFERENCE),
            division: text(record, team_keys::DIVISION),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPayload {
    pub upstream_id: Option<String>,
    pub name: String,
    pub team_abbreviation: Option<String>,
    pub upstream_team_id: Option<String>,
    pub position: Option<String>,
    pub height: Option<String>,
    pub weight: Option<i64>,
    pub birth_date: Option<NaiveDate>,
}

impl PlayerPayload {
    /// `None` when the record has no usable name. A malformed birth date is
    /// kept as `None` rather than rejecting the player.
    pub fn from_raw(record: &RawRecord) -> Option<Self> {
        Some(Self {
            upstream_id: text(record, player_keys::ID),
            name: text(record, player_keys::NAME)?,
            team_abbreviation: text(record, player_keys::TEAM_ABBREVIATION).map(|a| a.to_uppercase()),
            upstream_team_id: text(record, player_keys::TEAM_ID),
            position: text(record, player_keys::POSITION),
            height: text(record, player_keys::HEIGHT),
            weight: integer(record, player_keys::WEIGHT),
            birth_date: text(record, player_keys::BIRTH_DATE).and_then(|raw| parse_birth_date(&raw)),
        })
    }
}

/// One team's line in one game on a scoreboard day.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamLineScore {
    pub game_id: String,
    pub team_abbreviation: String,
    pub points: Option<i64>,
    pub is_home: Option<bool>,
    pub game_date: Option<NaiveDate>,
}

impl TeamLineScore {
    pub fn from_raw(record: &RawRecord) -> Option<Self> {
        Some(Self {
            game_id: text(record, line_score_keys::GAME_ID)?,
            team_abbreviation: text(record, line_score_keys::TEAM_ABBREVIATION)?.to_uppercase(),
            points: integer(record, line_score_keys::POINTS),
            is_home: flag(record, line_score_keys::IS_HOME),
            game_date: date(record, line_score_keys::GAME_DATE),
        })
    }
}

/// A game as discovered on the schedule or read from a file, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct GamePayload {
    pub upstream_id: Option<String>,
    pub game_date: NaiveDate,
    pub home_abbreviation: String,
    pub away_abbreviation: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

impl GamePayload {
    pub fn from_raw(record: &RawRecord) -> Option<Self> {
        Some(Self {
            upstream_id: text(record, game_keys::ID),
            game_date: date(record, game_keys::DATE)?,
            home_abbreviation: text(record, game_keys::HOME)?.to_uppercase(),
            away_abbreviation: text(record, game_keys::AWAY)?.to_uppercase(),
            home_score: integer(record, game_keys::HOME_SCORE),
            away_score: integer(record, game_keys::AWAY_SCORE),
        })
    }
}

/// One player's row from a box score.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub player_name: String,
    pub upstream_player_id: Option<String>,
    pub team_abbreviation: Option<String>,
    pub minutes: Option<f64>,
    pub stats: StatLine,
}

impl StatRow {
    pub fn from_raw(record: &RawRecord) -> Option<Self> {
        let count = |aliases: Aliases| integer(record, aliases).unwrap_or(0);
        Some(Self {
            player_name: text(record, stat_keys::PLAYER_NAME)?,
            upstream_player_id: text(record, stat_keys::PLAYER_ID),
            team_abbreviation: text(record, stat_keys::TEAM_ABBREVIATION).map(|a| a.to_uppercase()),
            minutes: minutes_played(record),
            stats: StatLine {
                points: count(stat_keys::POINTS),
                rebounds: count(stat_keys::REBOUNDS),
                assists: count(stat_keys::ASSISTS),
                steals: count(stat_keys::STEALS),
                blocks: count(stat_keys::BLOCKS),
                turnovers: count(stat_keys::TURNOVERS),
                personal_fouls: count(stat_keys::FOULS),
                field_goals_made: count(stat_keys::FGM),
                field_goals_attempted: count(stat_keys::FGA),
                three_pointers_made: count(stat_keys::FG3M),
                three_pointers_attempted: count(stat_keys::FG3A),
                free_throws_made: count(stat_keys::FTM),
                free_throws_attempted: count(stat_keys::FTA),
                plus_minus: count(stat_keys::PLUS_MINUS),
            },
        })
    }
}

/// Minutes played on a box-score row; `None` for did-not-play rows.
pub fn minutes_played(record: &RawRecord) -> Option<f64> {
    field(record, stat_keys::MINUTES).and_then(parse_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> RawRecord {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_team_aliases() {
        let static_shape = record(json!({"id": "1610612747", "full_name": "Los Angeles Lakers", "abbreviation": "LAL"}));
        let csv_shape = record(json!({"teamName": "Los Angeles Lakers", "teamAbbreviation": "lal", "teamCity": "Los Angeles"}));

        let a = TeamPayload::from_raw(&static_shape).unwrap();
        let b = TeamPayload::from_raw(&csv_shape).unwrap();
        assert_eq!(a.abbreviation, "LAL");
        assert_eq!(b.abbreviation, "LAL");
        assert_eq!(a.upstream_id.as_deref(), Some("1610612747"));
        assert_eq!(b.city.as_deref(), Some("Los Angeles"));
        assert!(TeamPayload::from_raw(&record(json!({"name": "No Abbr"}))).is_none());
    }

    #[test]
    fn test_player_aliases_and_bad_birth_date() {
        let roster = record(json!({
            "PLAYER": "LeBron James", "PLAYER_ID": 2544, "TeamID": 1610612747,
            "POSITION": "F", "HEIGHT": "6-9", "WEIGHT": "250", "BIRTH_DATE": "DEC 30, 1984"
        }));
        let p = PlayerPayload::from_raw(&roster).unwrap();
        assert_eq!(p.name, "LeBron James");
        assert_eq!(p.upstream_id.as_deref(), Some("2544"));
        assert_eq!(p.upstream_team_id.as_deref(), Some("1610612747"));
        assert_eq!(p.weight, Some(250));
        assert_eq!(p.birth_date, NaiveDate::from_ymd_opt(1984, 12, 30));

        let bad = record(json!({"playerName": "X", "birthDate": "31/31/1990"}));
        assert_eq!(PlayerPayload::from_raw(&bad).unwrap().birth_date, None);
    }

    #[test]
    fn test_stat_row_defaults_missing_counts_to_zero() {
        let row = record(json!({
            "PLAYER_NAME": "Anthony Davis", "MIN": "36:00", "PTS": 31, "REB": 12, "TO": 2, "PLUS_MINUS": -4.0
        }));
        let s = StatRow::from_raw(&row).unwrap();
        assert_eq!(s.minutes, Some(36.0));
        assert_eq!(s.stats.points, 31);
        assert_eq!(s.stats.turnovers, 2);
        assert_eq!(s.stats.plus_minus, -4);
        assert_eq!(s.stats.assists, 0);
    }

    #[test]
    fn test_game_payload_requires_date_and_teams() {
        let ok = record(json!({"gameDate": "2024-01-15T00:00:00", "homeTeam": "LAL", "awayTeam": "BOS", "homeScore": 110}));
        let g = GamePayload::from_raw(&ok).unwrap();
        assert_eq!(g.game_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(g.home_score, Some(110));
        assert_eq!(g.away_score, None);

        let no_date = record(json!({"homeTeam": "LAL", "awayTeam": "BOS"}));
        assert!(GamePayload::from_raw(&no_date).is_none());
    }
}
