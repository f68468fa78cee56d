//! Bulk import from CSV exports. Rows go through the same resolver and writer
//! as upstream data, so importing a file twice is a no-op.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;

use crate::db;
use crate::models::NewBoxScore;
use crate::services::batch_writer::{BatchWriter, WriterConfig};
use crate::services::payload::{GamePayload, PlayerPayload, StatRow, TeamPayload};
use crate::services::resolver::EntityResolver;
use crate::services::source::RawRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CsvKind {
    Teams,
    Players,
    Games,
    BoxScores,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub rows: usize,
    /// Rows that created something new.
    pub imported: usize,
    /// Rows rejected as malformed or referring to unknown entities.
    pub skipped: usize,
}

/// Read a CSV file into header-keyed records. Empty cells are left out so they
/// read as missing, not as empty strings.
pub fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("Malformed row in {}", path.display()))?;
        let record: RawRecord = headers
            .iter()
            .zip(row.iter())
            .filter(|(_, cell)| !cell.trim().is_empty())
            .map(|(header, cell)| (header.trim().to_string(), Value::String(cell.trim().to_string())))
            .collect();
        records.push(record);
    }
    Ok(records)
}

pub async fn import_csv(
    pool: &SqlitePool,
    kind: CsvKind,
    path: &Path,
    writer: WriterConfig,
) -> Result<ImportSummary> {
    let records = read_records(path)?;
    tracing::info!(rows = records.len(), ?kind, "Importing {}", path.display());

    let mut resolver = EntityResolver::load(pool).await?;
    let summary = match kind {
        CsvKind::Teams => import_teams(pool, &mut resolver, &records).await?,
        CsvKind::Players => import_players(pool, &mut resolver, &records).await?,
        CsvKind::Games => import_games(pool, &mut resolver, &records).await?,
        CsvKind::BoxScores => import_box_scores(pool, &resolver, &records, writer).await?,
    };

    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped,
        "Import of {} finished",
        path.display()
    );
    Ok(summary)
}

async fn import_teams(pool: &SqlitePool, resolver: &mut EntityResolver, records: &[RawRecord]) -> Result<ImportSummary> {
    let mut summary = ImportSummary { rows: records.len(), ..Default::default() };
    for record in records {
        let resolved = match TeamPayload::from_raw(record) {
            Some(team) => resolver.resolve_team(pool, &team).await?,
            None => None,
        };
        if resolved.is_none() {
            summary.skipped += 1;
        }
    }
    summary.imported = resolver.created().teams;
    Ok(summary)
}

async fn import_players(pool: &SqlitePool, resolver: &mut EntityResolver, records: &[RawRecord]) -> Result<ImportSummary> {
    let mut summary = ImportSummary { rows: records.len(), ..Default::default() };
    for record in records {
        let resolved = match PlayerPayload::from_raw(record) {
            Some(player) => resolver.resolve_player(pool, &player).await?,
            None => None,
        };
        if resolved.is_none() {
            summary.skipped += 1;
        }
    }
    summary.imported = resolver.created().players;
    Ok(summary)
}

async fn import_games(pool: &SqlitePool, resolver: &mut EntityResolver, records: &[RawRecord]) -> Result<ImportSummary> {
    let mut summary = ImportSummary { rows: records.len(), ..Default::default() };
    for record in records {
        let resolved = match GamePayload::from_raw(record) {
            Some(game) => resolver.resolve_game(pool, &game).await?,
            None => None,
        };
        if resolved.is_none() {
            summary.skipped += 1;
        }
    }
    summary.imported = resolver.created().games;
    Ok(summary)
}

/// `game_id` in a box-score file is the internal game id. Players must already
/// exist; rows without parsable minutes are skipped.
async fn import_box_scores(
    pool: &SqlitePool,
    resolver: &EntityResolver,
    records: &[RawRecord],
    config: WriterConfig,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary { rows: records.len(), ..Default::default() };
    let mut writer = BatchWriter::new(config);
    let mut known_games: HashMap<i64, bool> = HashMap::new();

    for record in records {
        let Some(game_id) = record
            .get("game_id")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok())
        else {
            summary.skipped += 1;
            continue;
        };

        let exists = match known_games.get(&game_id) {
            Some(exists) => *exists,
            None => {
                let exists = db::get_game_by_id(pool, game_id).await?.is_some();
                known_games.insert(game_id, exists);
                exists
            }
        };

        let candidate = StatRow::from_raw(record)
            .filter(|stat| exists && stat.minutes.is_some())
            .and_then(|stat| {
                Some(NewBoxScore {
                    game_id,
                    player_id: resolver.player_id(&stat.player_name)?,
                    minutes: stat.minutes,
                    stats: stat.stats,
                })
            });

        match candidate {
            Some(row) => {
                summary.imported += writer.push(pool, vec![row]).await?;
            }
            None => summary.skipped += 1,
        }
    }

    summary.imported += writer.flush(pool).await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    async fn import(pool: &SqlitePool, kind: CsvKind, contents: &str) -> ImportSummary {
        let file = csv_file(contents);
        import_csv(pool, kind, file.path(), WriterConfig::default()).await.unwrap()
    }

    #[test]
    fn test_empty_cells_are_missing() {
        let file = csv_file("name,position,weight\nLeBron James,,250\n");
        let records = read_records(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].contains_key("position"));
        assert_eq!(records[0]["weight"], Value::String("250".into()));
    }

    #[tokio::test]
    async fn test_full_csv_import_is_idempotent() {
        let pool = db::memory_pool().await;

        let teams = "name,abbreviation,city,conference,division\n\
                     Los Angeles Lakers,LAL,Los Angeles,West,Pacific\n\
                     Boston Celtics,BOS,Boston,East,Atlantic\n";
        let players = "name,position,height,weight,birth_date,team_abbreviation\n\
                       LeBron James,F,6-9,250,1984-12-30,LAL\n\
                       Jayson Tatum,F,6-8,210,not a date,BOS\n";
        let games = "game_date,season,home_team,away_team,home_score,away_score\n\
                     2024-01-15,2099-00,LAL,BOS,114,105\n\
                     2024-01-16,2023-24,LAL,XYZ,,\n";

        assert_eq!(import(&pool, CsvKind::Teams, teams).await.imported, 2);
        assert_eq!(import(&pool, CsvKind::Players, players).await.imported, 2);
        let g = import(&pool, CsvKind::Games, games).await;
        assert_eq!((g.imported, g.skipped), (1, 1));

        let lal = db::get_team_by_abbreviation(&pool, "LAL").await.unwrap().unwrap();
        let bos = db::get_team_by_abbreviation(&pool, "BOS").await.unwrap().unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let stored = db::find_game(&pool, date, lal.id, bos.id)
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.season, "2023-24");

        let box_scores = format!(
            "game_id,player_name,minutes,points,rebounds,assists,steals,blocks,turnovers,personal_fouls,fgm,fga,fg3m,fg3a,ftm,fta,plus_minus\n\
             {id},LeBron James,35:12,28,8,9,1,1,3,2,11,20,2,6,4,5,7\n\
             {id},Jayson Tatum,,0,0,0,0,0,0,0,0,0,0,0,0,0,0\n\
             {id},Unknown Guy,12:00,4,1,0,0,0,0,1,2,3,0,1,0,0,-2\n\
             999,LeBron James,30:00,20,5,5,0,0,1,1,8,15,1,3,3,4,3\n",
            id = stored.id
        );
        let b = import(&pool, CsvKind::BoxScores, &box_scores).await;
        assert_eq!((b.imported, b.skipped), (1, 3));

        let again = import(&pool, CsvKind::BoxScores, &box_scores).await;
        assert_eq!(again.imported, 0);
        assert_eq!(import(&pool, CsvKind::Teams, teams).await.imported, 0);

        let counts = db::table_counts(&pool).await.unwrap();
        assert_eq!((counts.teams, counts.players, counts.games, counts.box_scores), (2, 2, 1, 1));

        let tatum = db::get_player_by_name(&pool, "Jayson Tatum").await.unwrap().unwrap();
        assert_eq!(tatum.birth_date, None);
    }
}
