use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::services::source::{RawRecord, SourceError, StatsSource};

// ── stats.nba.com structures ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatsResponse {
    #[serde(rename = "resultSets")]
    pub result_sets: Vec<ResultSet>,
}

#[derive(Debug, Deserialize)]
pub struct ResultSet {
    pub name: String,
    pub headers: Vec<String>,
    #[serde(rename = "rowSet")]
    pub row_set: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Zip every row with the header names.
    pub fn records(&self) -> Vec<RawRecord> {
        self.row_set
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<RawRecord>()
            })
            .collect()
    }
}

impl StatsResponse {
    fn set(&self, name: &str) -> Option<&ResultSet> {
        self.result_sets.iter().find(|s| s.name == name)
    }

    /// Named result set, or the first one when the endpoint names it differently.
    fn set_or_first(&self, name: &str) -> Option<&ResultSet> {
        self.set(name).or_else(|| self.result_sets.first())
    }
}

// ── Static franchise table ───────────────────────────────────────────────────
// The team endpoints lack conference/division; the franchise list is stable
// enough to ship with the binary.

const FRANCHISES: [(&str, &str, &str, &str, &str, &str); 30] = [
    ("1610612737", "Atlanta Hawks", "ATL", "Atlanta", "East", "Southeast"),
    ("1610612738", "Boston Celtics", "BOS", "Boston", "East", "Atlantic"),
    ("1610612739", "Cleveland Cavaliers", "CLE", "Cleveland", "East", "Central"),
    ("1610612740", "New Orleans Pelicans", "NOP", "New Orleans", "West", "Southwest"),
    ("1610612741", "Chicago Bulls", "CHI", "Chicago", "East", "Central"),
    ("1610612742", "Dallas Mavericks", "DAL", "Dallas", "West", "Southwest"),
    ("1610612743", "Denver Nuggets", "DEN", "Denver", "West", "Northwest"),
    ("1610612744", "Golden State Warriors", "GSW", "San Francisco", "West", "Pacific"),
    ("1610612745", "Houston Rockets", "HOU", "Houston", "West", "Southwest"),
    ("1610612746", "LA Clippers", "LAC", "Los Angeles", "West", "Pacific"),
    ("1610612747", "Los Angeles Lakers", "LAL", "Los Angeles", "West", "Pacific"),
    ("1610612748", "Miami Heat", "MIA", "Miami", "East", "Southeast"),
    ("1610612749", "Milwaukee Bucks", "MIL", "Milwaukee", "East", "Central"),
    ("1610612750", "Minnesota Timberwolves", "MIN", "Minneapolis", "West", "Northwest"),
    ("1610612751", "Brooklyn Nets", "BKN", "Brooklyn", "East", "Atlantic"),
    ("1610612752", "New York Knicks", "NYK", "New York", "East", "Atlantic"),
    ("1610612753", "Orlando Magic", "ORL", "Orlando", "East", "Southeast"),
    ("1610612754", "Indiana Pacers", "IND", "Indianapolis", "East", "Central"),
    ("1610612755", "Philadelphia 76ers", "PHI", "Philadelphia", "East", "Atlantic"),
    ("1610612756", "Phoenix Suns", "PHX", "Phoenix", "West", "Pacific"),
    ("1610612757", "Portland Trail Blazers", "POR", "Portland", "West", "Northwest"),
    ("1610612758", "Sacramento Kings", "SAC", "Sacramento", "West", "Pacific"),
    ("1610612759", "San Antonio Spurs", "SAS", "San Antonio", "West", "Southwest"),
    ("1610612760", "Oklahoma City Thunder", "OKC", "Oklahoma City", "West", "Northwest"),
    ("1610612761", "Toronto Raptors", "TOR", "Toronto", "East", "Atlantic"),
    ("1610612762", "Utah Jazz", "UTA", "Salt Lake City", "West", "Northwest"),
    ("1610612763", "Memphis Grizzlies", "MEM", "Memphis", "West", "Southwest"),
    ("1610612764", "Washington Wizards", "WAS", "Washington", "East", "Southeast"),
    ("1610612765", "Detroit Pistons", "DET", "Detroit", "East", "Central"),
    ("1610612766", "Charlotte Hornets", "CHA", "Charlotte", "East", "Southeast"),
];

fn franchise_records() -> Vec<RawRecord> {
    FRANCHISES
        .iter()
        .map(|(id, full_name, abbreviation, city, conference, division)| {
            let mut record = RawRecord::new();
            record.insert("id".into(), json!(id));
            record.insert("full_name".into(), json!(full_name));
            record.insert("abbreviation".into(), json!(abbreviation));
            record.insert("city".into(), json!(city));
            record.insert("conference".into(), json!(conference));
            record.insert("division".into(), json!(division));
            record
        })
        .collect()
}

// ── NbaStatsClient ───────────────────────────────────────────────────────────

pub struct NbaStatsClient {
    client: Client,
    base_url: String,
}

impl NbaStatsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // stats.nba.com drops requests that do not look like a browser
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            ),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.nba.com/"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_stats(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<StatsResponse, SourceError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self.client.get(&url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} returned HTTP {}", endpoint, status);
            return Err(SourceError::from_status(status.as_u16(), endpoint));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl StatsSource for NbaStatsClient {
    async fn get_teams(&self) -> Result<Vec<RawRecord>, SourceError> {
        Ok(franchise_records())
    }

    async fn get_roster(&self, team_id: &str, season: &str) -> Result<Vec<RawRecord>, SourceError> {
        let data = self
            .get_stats(
                "commonteamroster",
                &[
                    ("LeagueID", "00".to_string()),
                    ("Season", season.to_string()),
                    ("TeamID", team_id.to_string()),
                ],
            )
            .await?;

        Ok(data
            .set_or_first("CommonTeamRoster")
            .map(ResultSet::records)
            .unwrap_or_default())
    }

    async fn get_all_players(&self, season: &str) -> Result<Vec<RawRecord>, SourceError> {
        let data = self
            .get_stats(
                "commonallplayers",
                &[
                    ("LeagueID", "00".to_string()),
                    ("Season", season.to_string()),
                    ("IsOnlyCurrentSeason", "1".to_string()),
                ],
            )
            .await?;

        Ok(data
            .set_or_first("CommonAllPlayers")
            .map(ResultSet::records)
            .unwrap_or_default())
    }

    async fn get_schedule_for_date(&self, date: NaiveDate) -> Result<Vec<RawRecord>, SourceError> {
        let data = self
            .get_stats(
                "scoreboardv2",
                &[
                    ("LeagueID", "00".to_string()),
                    ("GameDate", date.format("%m/%d/%Y").to_string()),
                    ("DayOffset", "0".to_string()),
                ],
            )
            .await?;

        Ok(tag_home_rows(&data))
    }

    async fn get_box_score(&self, game_id: &str) -> Result<Vec<RawRecord>, SourceError> {
        let data = self
            .get_stats(
                "boxscoretraditionalv2",
                &[
                    ("GameID", game_id.to_string()),
                    ("StartPeriod", "0".to_string()),
                    ("EndPeriod", "10".to_string()),
                    ("StartRange", "0".to_string()),
                    ("EndRange", "28800".to_string()),
                    ("RangeType", "0".to_string()),
                ],
            )
            .await?;

        Ok(data
            .set_or_first("PlayerStats")
            .map(ResultSet::records)
            .unwrap_or_default())
    }
}

/// Line-score rows carry no home/away marker; the game header does. Copy the
/// header's verdict onto each row as `IS_HOME`.
fn tag_home_rows(data: &StatsResponse) -> Vec<RawRecord> {
    let home_by_game: HashMap<String, String> = data
        .set("GameHeader")
        .map(ResultSet::records)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|header| {
            let game_id = header.get("GAME_ID")?.as_str()?.to_string();
            let home = value_to_key(header.get("HOME_TEAM_ID")?)?;
            Some((game_id, home))
        })
        .collect();

    data.set("LineScore")
        .map(ResultSet::records)
        .unwrap_or_default()
        .into_iter()
        .map(|mut row| {
            let is_home = row
                .get("GAME_ID")
                .and_then(Value::as_str)
                .and_then(|id| home_by_game.get(id))
                .zip(row.get("TEAM_ID").and_then(value_to_key))
                .map(|(home, team)| *home == team);
            if let Some(is_home) = is_home {
                row.insert("IS_HOME".into(), Value::Bool(is_home));
            }
            row
        })
        .collect()
}

fn value_to_key(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
