//! In-process `StatsSource` double for the pipeline tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::services::source::{RawRecord, SourceError, StatsSource};

type ErrorFactory = fn() -> SourceError;

struct Failure {
    /// `None` fails forever.
    remaining: Option<u32>,
    make: ErrorFactory,
}

#[derive(Default)]
pub struct ScriptedSource {
    teams: Mutex<Vec<RawRecord>>,
    rosters: Mutex<HashMap<String, Vec<RawRecord>>>,
    all_players: Mutex<Vec<RawRecord>>,
    schedules: Mutex<HashMap<NaiveDate, Vec<RawRecord>>>,
    failing_days: Mutex<HashSet<NaiveDate>>,
    box_scores: Mutex<HashMap<String, Vec<RawRecord>>>,
    box_score_failures: Mutex<HashMap<String, Failure>>,
    cancel_on_box_score: Mutex<HashMap<String, CancellationToken>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_teams(&self, teams: Vec<RawRecord>) {
        *self.teams.lock().unwrap() = teams;
    }

    pub fn set_roster(&self, team_id: &str, players: Vec<RawRecord>) {
        self.rosters.lock().unwrap().insert(team_id.to_string(), players);
    }

    pub fn set_all_players(&self, players: Vec<RawRecord>) {
        *self.all_players.lock().unwrap() = players;
    }

    pub fn set_schedule(&self, date: NaiveDate, rows: Vec<RawRecord>) {
        self.schedules.lock().unwrap().insert(date, rows);
    }

    pub fn fail_schedule(&self, date: NaiveDate) {
        self.failing_days.lock().unwrap().insert(date);
    }

    pub fn set_box_score(&self, game_id: &str, rows: Vec<RawRecord>) {
        self.box_scores.lock().unwrap().insert(game_id.to_string(), rows);
    }

    pub fn fail_box_score(&self, game_id: &str, make: ErrorFactory) {
        self.box_score_failures
            .lock()
            .unwrap()
            .insert(game_id.to_string(), Failure { remaining: None, make });
    }

    pub fn fail_box_score_times(&self, game_id: &str, times: u32, make: ErrorFactory) {
        self.box_score_failures
            .lock()
            .unwrap()
            .insert(game_id.to_string(), Failure { remaining: Some(times), make });
    }

    /// Fire `token` while serving the box score of `game_id`, as an interrupt
    /// arriving mid-request would.
    pub fn cancel_during_box_score(&self, game_id: &str, token: CancellationToken) {
        self.cancel_on_box_score
            .lock()
            .unwrap()
            .insert(game_id.to_string(), token);
    }

    pub fn calls(&self, key: &str) -> u32 {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn box_score_calls(&self, game_id: &str) -> u32 {
        self.calls(&format!("box_score:{}", game_id))
    }

    pub fn schedule_calls(&self) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with("schedule:"))
            .map(|(_, n)| *n)
            .sum()
    }

    fn hit(&self, key: String) {
        *self.calls.lock().unwrap().entry(key).or_insert(0) += 1;
    }
}

#[async_trait]
impl StatsSource for ScriptedSource {
    async fn get_teams(&self) -> Result<Vec<RawRecord>, SourceError> {
        self.hit("teams".into());
        Ok(self.teams.lock().unwrap().clone())
    }

    async fn get_roster(&self, team_id: &str, _season: &str) -> Result<Vec<RawRecord>, SourceError> {
        self.hit(format!("roster:{}", team_id));
        Ok(self.rosters.lock().unwrap().get(team_id).cloned().unwrap_or_default())
    }

    async fn get_all_players(&self, _season: &str) -> Result<Vec<RawRecord>, SourceError> {
        self.hit("all_players".into());
        Ok(self.all_players.lock().unwrap().clone())
    }

    async fn get_schedule_for_date(&self, date: NaiveDate) -> Result<Vec<RawRecord>, SourceError> {
        self.hit(format!("schedule:{}", date));
        if self.failing_days.lock().unwrap().contains(&date) {
            return Err(SourceError::Invalid("unparsable scoreboard".into()));
        }
        Ok(self.schedules.lock().unwrap().get(&date).cloned().unwrap_or_default())
    }

    async fn get_box_score(&self, game_id: &str) -> Result<Vec<RawRecord>, SourceError> {
        self.hit(format!("box_score:{}", game_id));
        if let Some(token) = self.cancel_on_box_score.lock().unwrap().get(game_id) {
            token.cancel();
        }

        let mut failures = self.box_score_failures.lock().unwrap();
        if let Some(failure) = failures.get_mut(game_id) {
            match failure.remaining {
                None => return Err((failure.make)()),
                Some(n) if n > 0 => {
                    failure.remaining = Some(n - 1);
                    return Err((failure.make)());
                }
                Some(_) => {}
            }
        }
        drop(failures);

        Ok(self.box_scores.lock().unwrap().get(game_id).cloned().unwrap_or_default())
    }
}

// ── Record builders ──────────────────────────────────────────────────────────

pub fn record(v: Value) -> RawRecord {
    v.as_object().cloned().unwrap_or_default()
}

pub fn team(id: &str, name: &str, abbreviation: &str) -> RawRecord {
    record(json!({"id": id, "full_name": name, "abbreviation": abbreviation}))
}

pub fn roster_player(name: &str, player_id: i64, team_id: &str) -> RawRecord {
    record(json!({"PLAYER": name, "PLAYER_ID": player_id, "TeamID": team_id, "POSITION": "G"}))
}

pub fn line_score(game_id: &str, abbreviation: &str, points: i64, is_home: bool) -> RawRecord {
    record(json!({
        "GAME_ID": game_id,
        "TEAM_ABBREVIATION": abbreviation,
        "PTS": points,
        "IS_HOME": is_home
    }))
}

pub fn stat_row(name: &str, minutes: Option<&str>, points: i64) -> RawRecord {
    record(json!({
        "PLAYER_NAME": name,
        "MIN": minutes,
        "PTS": points,
        "REB": 4,
        "AST": 3
    }))
}
