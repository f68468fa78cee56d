use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use crate::models::*;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if let Some(parent) = std::path::Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // One writer at a time; ingestion is sequential anyway.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    let pool = create_pool(database_url).await?;
    init_database_with_pool(&pool).await?;
    Ok(pool)
}

pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            abbreviation TEXT NOT NULL UNIQUE CHECK (length(abbreviation) <= 3),
            city TEXT NOT NULL,
            conference TEXT,
            division TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            position TEXT,
            height TEXT,
            weight INTEGER,
            birth_date TEXT,
            team_id INTEGER,
            FOREIGN KEY (team_id) REFERENCES teams (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS games (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            game_date TEXT NOT NULL,
            season TEXT NOT NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            home_score INTEGER,
            away_score INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (game_date, home_team_id, away_team_id),
            FOREIGN KEY (home_team_id) REFERENCES teams (id),
            FOREIGN KEY (away_team_id) REFERENCES teams (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One box score per player per game; the unique index doubles as the
    // lookup index for the writer's existence check.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS box_scores (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            game_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            minutes REAL,
            points INTEGER NOT NULL DEFAULT 0,
            rebounds INTEGER NOT NULL DEFAULT 0,
            assists INTEGER NOT NULL DEFAULT 0,
            steals INTEGER NOT NULL DEFAULT 0,
            blocks INTEGER NOT NULL DEFAULT 0,
            turnovers INTEGER NOT NULL DEFAULT 0,
            personal_fouls INTEGER NOT NULL DEFAULT 0,
            field_goals_made INTEGER NOT NULL DEFAULT 0,
            field_goals_attempted INTEGER NOT NULL DEFAULT 0,
            three_pointers_made INTEGER NOT NULL DEFAULT 0,
            three_pointers_attempted INTEGER NOT NULL DEFAULT 0,
            free_throws_made INTEGER NOT NULL DEFAULT 0,
            free_throws_attempted INTEGER NOT NULL DEFAULT 0,
            plus_minus INTEGER NOT NULL DEFAULT 0,
            CONSTRAINT uq_box_scores_game_player UNIQUE (game_id, player_id),
            FOREIGN KEY (game_id) REFERENCES games (id),
            FOREIGN KEY (player_id) REFERENCES players (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // A row here means a run over the season finished without being cancelled.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS season_runs (
            season TEXT PRIMARY KEY,
            games INTEGER NOT NULL,
            box_scores INTEGER NOT NULL,
            completed_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_games_season ON games(season)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_box_scores_player ON box_scores(player_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

// Team operations

/// Insert the team unless its abbreviation is taken. Returns the id and
/// whether a row was created; an existing row is never overwritten.
pub async fn insert_team_if_absent(pool: &SqlitePool, team: &NewTeam) -> Result<(i64, bool)> {
    let result = sqlx::query(
        r#"
        INSERT INTO teams (name, abbreviation, city, conference, division)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(abbreviation) DO NOTHING
        "#,
    )
    .bind(&team.name)
    .bind(&team.abbreviation)
    .bind(&team.city)
    .bind(&team.conference)
    .bind(&team.division)
    .execute(pool)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM teams WHERE abbreviation = ?")
        .bind(&team.abbreviation)
        .fetch_one(pool)
        .await?;

    Ok((id, result.rows_affected() == 1))
}

#[cfg(test)]
pub async fn get_team_by_abbreviation(pool: &SqlitePool, abbreviation: &str) -> Result<Option<Team>> {
    let team = sqlx::query_as::<_, Team>("SELECT * FROM teams WHERE abbreviation = ?")
        .bind(abbreviation)
        .fetch_optional(pool)
        .await?;
    Ok(team)
}

pub async fn team_ids_by_abbreviation(pool: &SqlitePool) -> Result<HashMap<String, i64>> {
    let rows = sqlx::query("SELECT id, abbreviation FROM teams")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("abbreviation"), row.get::<i64, _>("id")))
        .collect())
}

// Player operations

pub async fn insert_player_if_absent(pool: &SqlitePool, player: &NewPlayer) -> Result<(i64, bool)> {
    let result = sqlx::query(
        r#"
        INSERT INTO players (name, position, height, weight, birth_date, team_id)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(name) DO NOTHING
        "#,
    )
    .bind(&player.name)
    .bind(&player.position)
    .bind(&player.height)
    .bind(player.weight)
    .bind(player.birth_date)
    .bind(player.team_id)
    .execute(pool)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM players WHERE name = ?")
        .bind(&player.name)
        .fetch_one(pool)
        .await?;

    Ok((id, result.rows_affected() == 1))
}

#[cfg(test)]
pub async fn get_player_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Player>> {
    let player = sqlx::query_as::<_, Player>("SELECT * FROM players WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(player)
}

pub async fn player_ids_by_name(pool: &SqlitePool) -> Result<HashMap<String, i64>> {
    let rows = sqlx::query("SELECT id, name FROM players")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("name"), row.get::<i64, _>("id")))
        .collect())
}

// Game operations

#[cfg(test)]
pub async fn find_game(
    pool: &SqlitePool,
    game_date: chrono::NaiveDate,
    home_team_id: i64,
    away_team_id: i64,
) -> Result<Option<Game>> {
    let game = sqlx::query_as::<_, Game>(
        r#"SELECT id, game_date, season, home_team_id, away_team_id, home_score, away_score
           FROM games WHERE game_date = ? AND home_team_id = ? AND away_team_id = ?"#,
    )
    .bind(game_date)
    .bind(home_team_id)
    .bind(away_team_id)
    .fetch_optional(pool)
    .await?;
    Ok(game)
}

pub async fn get_game_by_id(pool: &SqlitePool, game_id: i64) -> Result<Option<Game>> {
    let game = sqlx::query_as::<_, Game>(
        r#"SELECT id, game_date, season, home_team_id, away_team_id, home_score, away_score
           FROM games WHERE id = ?"#,
    )
    .bind(game_id)
    .fetch_optional(pool)
    .await?;
    Ok(game)
}

pub async fn insert_game_if_absent(pool: &SqlitePool, game: &NewGame) -> Result<(i64, bool)> {
    let result = sqlx::query(
        r#"
        INSERT INTO games (game_date, season, home_team_id, away_team_id, home_score, away_score)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(game_date, home_team_id, away_team_id) DO NOTHING
        "#,
    )
    .bind(game.game_date)
    .bind(&game.season)
    .bind(game.home_team_id)
    .bind(game.away_team_id)
    .bind(game.home_score)
    .bind(game.away_score)
    .execute(pool)
    .await?;

    let id: i64 = sqlx::query_scalar(
        "SELECT id FROM games WHERE game_date = ? AND home_team_id = ? AND away_team_id = ?",
    )
    .bind(game.game_date)
    .bind(game.home_team_id)
    .bind(game.away_team_id)
    .fetch_one(pool)
    .await?;

    Ok((id, result.rows_affected() == 1))
}

/// Fill in final scores on a stored game that has none yet. Existing scores
/// are left alone.
pub async fn attach_game_scores(
    pool: &SqlitePool,
    game_id: i64,
    home_score: i64,
    away_score: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"UPDATE games SET home_score = ?, away_score = ?
           WHERE id = ? AND (home_score IS NULL OR away_score IS NULL)"#,
    )
    .bind(home_score)
    .bind(away_score)
    .bind(game_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn season_game_count(pool: &SqlitePool, season: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM games WHERE season = ?")
        .bind(season)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Record that a run over `season` finished. Re-running overwrites the
/// previous marker.
pub async fn mark_season_complete(pool: &SqlitePool, season: &str, games: i64, box_scores: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO season_runs (season, games, box_scores)
        VALUES (?, ?, ?)
        ON CONFLICT(season) DO UPDATE SET
            games = excluded.games,
            box_scores = excluded.box_scores,
            completed_at = datetime('now')
        "#,
    )
    .bind(season)
    .bind(games)
    .bind(box_scores)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn is_season_complete(pool: &SqlitePool, season: &str) -> Result<bool> {
    let found: Option<String> = sqlx::query_scalar("SELECT season FROM season_runs WHERE season = ?")
        .bind(season)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

// Box score operations

/// Which of `pairs` already have a stored box score.
pub async fn existing_box_score_pairs(
    pool: &SqlitePool,
    pairs: &[(i64, i64)],
) -> Result<HashSet<(i64, i64)>> {
    if pairs.is_empty() {
        return Ok(HashSet::new());
    }

    let game_ids: BTreeSet<i64> = pairs.iter().map(|(game_id, _)| *game_id).collect();
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT game_id, player_id FROM box_scores WHERE game_id IN (");
    let mut separated = qb.separated(", ");
    for game_id in &game_ids {
        separated.push_bind(*game_id);
    }
    separated.push_unseparated(")");

    let rows = qb.build().fetch_all(pool).await?;
    let wanted: HashSet<(i64, i64)> = pairs.iter().copied().collect();

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<i64, _>("game_id"), row.get::<i64, _>("player_id")))
        .filter(|pair| wanted.contains(pair))
        .collect())
}

const BOX_SCORE_COLUMNS: &str = "INSERT INTO box_scores \
    (game_id, player_id, minutes, points, rebounds, assists, steals, blocks, turnovers, \
     personal_fouls, field_goals_made, field_goals_attempted, three_pointers_made, \
     three_pointers_attempted, free_throws_made, free_throws_attempted, plus_minus) ";

fn box_score_insert<'a>(rows: &'a [NewBoxScore]) -> QueryBuilder<'a, Sqlite> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(BOX_SCORE_COLUMNS);
    qb.push_values(rows, |mut b, row| {
        let s = &row.stats;
        b.push_bind(row.game_id)
            .push_bind(row.player_id)
            .push_bind(row.minutes)
            .push_bind(s.points)
            .push_bind(s.rebounds)
            .push_bind(s.assists)
            .push_bind(s.steals)
            .push_bind(s.blocks)
            .push_bind(s.turnovers)
            .push_bind(s.personal_fouls)
            .push_bind(s.field_goals_made)
            .push_bind(s.field_goals_attempted)
            .push_bind(s.three_pointers_made)
            .push_bind(s.three_pointers_attempted)
            .push_bind(s.free_throws_made)
            .push_bind(s.free_throws_attempted)
            .push_bind(s.plus_minus);
    });
    qb
}

/// Single multi-row INSERT. Any conflicting row fails the whole statement.
/// Returns the raw `sqlx::Error` so the caller can tell row rejections from
/// lost connections.
pub async fn bulk_insert_box_scores(
    conn: &mut SqliteConnection,
    rows: &[NewBoxScore],
) -> std::result::Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }
    let mut qb = box_score_insert(rows);
    let result = qb.build().execute(conn).await?;
    Ok(result.rows_affected())
}

pub async fn insert_box_score(
    pool: &SqlitePool,
    row: &NewBoxScore,
) -> std::result::Result<u64, sqlx::Error> {
    let rows = std::slice::from_ref(row);
    let mut qb = box_score_insert(rows);
    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
pub async fn box_scores_for_game(pool: &SqlitePool, game_id: i64) -> Result<Vec<BoxScore>> {
    let rows = sqlx::query_as::<_, BoxScore>(
        "SELECT * FROM box_scores WHERE game_id = ? ORDER BY player_id",
    )
    .bind(game_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// Inspection

pub async fn table_counts(pool: &SqlitePool) -> Result<TableCounts> {
    let row = sqlx::query(
        r#"SELECT
            (SELECT COUNT(*) FROM teams) AS teams,
            (SELECT COUNT(*) FROM players) AS players,
            (SELECT COUNT(*) FROM games) AS games,
            (SELECT COUNT(*) FROM box_scores) AS box_scores"#,
    )
    .fetch_one(pool)
    .await?;

    Ok(TableCounts {
        teams: row.get("teams"),
        players: row.get("players"),
        games: row.get("games"),
        box_scores: row.get("box_scores"),
    })
}

pub async fn season_counts(pool: &SqlitePool) -> Result<Vec<SeasonCounts>> {
    let rows = sqlx::query_as::<_, SeasonCounts>(
        r#"SELECT g.season AS season,
                  COUNT(DISTINCT g.id) AS games,
                  COUNT(b.id) AS box_scores
           FROM games g
           LEFT JOIN box_scores b ON b.game_id = g.id
           GROUP BY g.season
           ORDER BY g.season"#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    init_database_with_pool(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn lakers() -> NewTeam {
        NewTeam {
            name: "Los Angeles Lakers".to_string(),
            abbreviation: "LAL".to_string(),
            city: "Los Angeles".to_string(),
            conference: Some("West".to_string()),
            division: Some("Pacific".to_string()),
        }
    }

    #[tokio::test]
    async fn test_team_insert_is_skip_if_exists() {
        let pool = memory_pool().await;

        let (id, created) = insert_team_if_absent(&pool, &lakers()).await.unwrap();
        assert!(created);

        let mut renamed = lakers();
        renamed.name = "Lakers Renamed".to_string();
        let (again, created) = insert_team_if_absent(&pool, &renamed).await.unwrap();
        assert!(!created);
        assert_eq!(id, again);

        let stored = get_team_by_abbreviation(&pool, "LAL").await.unwrap().unwrap();
        assert_eq!(stored.name, "Los Angeles Lakers");
    }

    #[tokio::test]
    async fn test_game_uniqueness_and_score_attachment() {
        let pool = memory_pool().await;
        let (home, _) = insert_team_if_absent(&pool, &lakers()).await.unwrap();
        let (away, _) = insert_team_if_absent(
            &pool,
            &NewTeam {
                name: "Boston Celtics".to_string(),
                abbreviation: "BOS".to_string(),
                city: "Boston".to_string(),
                conference: None,
                division: None,
            },
        )
        .await
        .unwrap();

        let game = NewGame {
            game_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            season: "2023-24".to_string(),
            home_team_id: home,
            away_team_id: away,
            home_score: None,
            away_score: None,
        };
        let (id, created) = insert_game_if_absent(&pool, &game).await.unwrap();
        assert!(created);
        let (again, created) = insert_game_if_absent(&pool, &game).await.unwrap();
        assert!(!created);
        assert_eq!(id, again);

        assert!(attach_game_scores(&pool, id, 110, 101).await.unwrap());
        assert!(!attach_game_scores(&pool, id, 1, 2).await.unwrap());

        let stored = get_game_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.home_score, Some(110));
        assert_eq!(stored.away_score, Some(101));
        assert_eq!(table_counts(&pool).await.unwrap().games, 1);
    }

    #[tokio::test]
    async fn test_season_marker() {
        let pool = memory_pool().await;
        assert!(!is_season_complete(&pool, "2023-24").await.unwrap());

        mark_season_complete(&pool, "2023-24", 3, 9).await.unwrap();
        mark_season_complete(&pool, "2023-24", 4, 12).await.unwrap();

        assert!(is_season_complete(&pool, "2023-24").await.unwrap());
        assert!(!is_season_complete(&pool, "2022-23").await.unwrap());
    }
}
