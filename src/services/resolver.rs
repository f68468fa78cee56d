use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::db;
use crate::models::{NewGame, NewPlayer, NewTeam};
use crate::services::payload::{GamePayload, PlayerPayload, TeamPayload};
use crate::utils::{city_fallback, season_label};

/// Rows created by the resolver during its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreatedCounts {
    pub teams: usize,
    pub players: usize,
    pub games: usize,
    pub scores_attached: usize,
}

/// Maps normalised payloads to internal ids, creating rows that do not exist
/// yet. Lookup tables are seeded from the store so a resumed run reuses what a
/// previous one created.
pub struct EntityResolver {
    teams: HashMap<String, i64>,
    players: HashMap<String, i64>,
    /// Upstream team id -> abbreviation, learned from team payloads.
    upstream_teams: HashMap<String, String>,
    created: CreatedCounts,
}

impl EntityResolver {
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let teams = db::team_ids_by_abbreviation(pool).await?;
        let players = db::player_ids_by_name(pool).await?;
        tracing::debug!(teams = teams.len(), players = players.len(), "Resolver maps loaded");

        Ok(Self {
            teams,
            players,
            upstream_teams: HashMap::new(),
            created: CreatedCounts::default(),
        })
    }

    pub fn team_id(&self, abbreviation: &str) -> Option<i64> {
        self.teams.get(&abbreviation.to_uppercase()).copied()
    }

    pub fn player_id(&self, name: &str) -> Option<i64> {
        self.players.get(name).copied()
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    /// Upstream ids of every team resolved so far, for the roster sweep.
    pub fn upstream_team_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.upstream_teams.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn created(&self) -> CreatedCounts {
        self.created
    }

    /// Keyed by abbreviation. An existing team is reused as is.
    pub async fn resolve_team(&mut self, pool: &SqlitePool, team: &TeamPayload) -> Result<Option<i64>> {
        if team.abbreviation.chars().count() > 3 {
            tracing::warn!(abbreviation = %team.abbreviation, "Team abbreviation too long, skipping");
            return Ok(None);
        }

        if let Some(upstream_id) = &team.upstream_id {
            self.upstream_teams
                .insert(upstream_id.clone(), team.abbreviation.clone());
        }

        if let Some(id) = self.teams.get(&team.abbreviation) {
            return Ok(Some(*id));
        }

        let new_team = NewTeam {
            name: team.name.clone(),
            abbreviation: team.abbreviation.clone(),
            city: team.city.clone().unwrap_or_else(|| city_fallback(&team.name)),
            conference: team.conference.clone(),
            division: team.division.clone(),
        };
        let (id, created) = db::insert_team_if_absent(pool, &new_team).await?;
        if created {
            self.created.teams += 1;
            tracing::debug!("Created team {} ({})", new_team.name, new_team.abbreviation);
        }

        self.teams.insert(new_team.abbreviation, id);
        Ok(Some(id))
    }

    /// Keyed by display name. Two different people sharing a name resolve to
    /// the same row; the upstream id is not used for identity.
    pub async fn resolve_player(&mut self, pool: &SqlitePool, player: &PlayerPayload) -> Result<Option<i64>> {
        if let Some(id) = self.players.get(&player.name) {
            return Ok(Some(*id));
        }

        let new_player = NewPlayer {
            name: player.name.clone(),
            position: player.position.clone(),
            height: player.height.clone(),
            weight: player.weight,
            birth_date: player.birth_date,
            team_id: self.player_team_id(player),
        };
        let (id, created) = db::insert_player_if_absent(pool, &new_player).await?;
        if created {
            self.created.players += 1;
        }

        self.players.insert(new_player.name, id);
        Ok(Some(id))
    }

    fn player_team_id(&self, player: &PlayerPayload) -> Option<i64> {
        player
            .team_abbreviation
            .as_deref()
            .and_then(|abbr| self.team_id(abbr))
            .or_else(|| {
                let abbr = self.upstream_teams.get(player.upstream_team_id.as_deref()?)?;
                self.team_id(abbr)
            })
    }

    /// Keyed by (date, home, away). The season label is always derived from the
    /// date. Scores on a payload fill in a stored game that has none.
    pub async fn resolve_game(&mut self, pool: &SqlitePool, game: &GamePayload) -> Result<Option<i64>> {
        let (Some(home), Some(away)) = (
            self.team_id(&game.home_abbreviation),
            self.team_id(&game.away_abbreviation),
        ) else {
            tracing::debug!(
                "Unknown team in game {} vs {} on {}",
                game.home_abbreviation,
                game.away_abbreviation,
                game.game_date
            );
            return Ok(None);
        };

        if home == away {
            tracing::warn!(date = %game.game_date, team = %game.home_abbreviation, "Game against itself, skipping");
            return Ok(None);
        }

        let new_game = NewGame {
            game_date: game.game_date,
            season: season_label(game.game_date),
            home_team_id: home,
            away_team_id: away,
            home_score: game.home_score,
            away_score: game.away_score,
        };
        let (id, created) = db::insert_game_if_absent(pool, &new_game).await?;

        if created {
            self.created.games += 1;
        } else if let (Some(h), Some(a)) = (game.home_score, game.away_score) {
            if db::attach_game_scores(pool, id, h, a).await? {
                self.created.scores_attached += 1;
                tracing::debug!(game_id = id, "Attached final score {}-{}", h, a);
            }
        }

        Ok(Some(id))
    }
}
