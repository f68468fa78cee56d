use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Full rows. Only `Game` is read back outside the tests.

#[cfg(test)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub abbreviation: String, // unique, at most 3 chars
    pub city: String,
    pub conference: Option<String>, // "East", "West"
    pub division: Option<String>,
}

#[cfg(test)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Player {
    pub id: i64,
    pub name: String, // unique
    pub position: Option<String>,
    pub height: Option<String>, // e.g. "6-8"
    pub weight: Option<i64>,    // pounds
    pub birth_date: Option<NaiveDate>,
    pub team_id: Option<i64>, // un-rostered players have none
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Game {
    pub id: i64,
    pub game_date: NaiveDate,
    pub season: String, // "2023-24"
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

#[cfg(test)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BoxScore {
    pub id: i64,
    pub game_id: i64,
    pub player_id: i64,
    pub minutes: Option<f64>,
    pub points: i64,
    pub rebounds: i64,
    pub assists: i64,
    pub steals: i64,
    pub blocks: i64,
    pub turnovers: i64,
    pub personal_fouls: i64,
    pub field_goals_made: i64,
    pub field_goals_attempted: i64,
    pub three_pointers_made: i64,
    pub three_pointers_attempted: i64,
    pub free_throws_made: i64,
    pub free_throws_attempted: i64,
    pub plus_minus: i64,
}

// ── Insert shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NewTeam {
    pub name: String,
    pub abbreviation: String,
    pub city: String,
    pub conference: Option<String>,
    pub division: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPlayer {
    pub name: String,
    pub position: Option<String>,
    pub height: Option<String>,
    pub weight: Option<i64>,
    pub birth_date: Option<NaiveDate>,
    pub team_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGame {
    pub game_date: NaiveDate,
    pub season: String,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

/// Counting stats of one player in one game, as parsed from an upstream row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatLine {
    pub points: i64,
    pub rebounds: i64,
    pub assists: i64,
    pub steals: i64,
    pub blocks: i64,
    pub turnovers: i64,
    pub personal_fouls: i64,
    pub field_goals_made: i64,
    pub field_goals_attempted: i64,
    pub three_pointers_made: i64,
    pub three_pointers_attempted: i64,
    pub free_throws_made: i64,
    pub free_throws_attempted: i64,
    pub plus_minus: i64,
}

/// Box-score candidate handed to the batch writer.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBoxScore {
    pub game_id: i64,
    pub player_id: i64,
    pub minutes: Option<f64>,
    pub stats: StatLine,
}

impl NewBoxScore {
    pub fn key(&self) -> (i64, i64) {
        (self.game_id, self.player_id)
    }
}

/// Row counts per table, used by the `stats` command and the idempotence tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub teams: i64,
    pub players: i64,
    pub games: i64,
    pub box_scores: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SeasonCounts {
    pub season: String,
    pub games: i64,
    pub box_scores: i64,
}
