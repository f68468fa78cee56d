use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::db;
use crate::models::NewBoxScore;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Pending rows that trigger a flush, and the chunk size of one bulk insert.
    pub batch_size: usize,
    /// Batches up to this many distinct pairs are checked against the store
    /// before inserting; larger ones lean on the unique constraint alone.
    pub existence_check_limit: usize,
    /// Games processed between clears of the in-session pair set.
    pub clear_every_games: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            existence_check_limit: 100,
            clear_every_games: 200,
        }
    }
}

/// Accumulates box scores and commits them in bounded batches, never writing
/// the same (game, player) pair twice.
pub struct BatchWriter {
    config: WriterConfig,
    pending: Vec<NewBoxScore>,
    /// Pairs committed during this run, since the last clear.
    inserted: HashSet<(i64, i64)>,
    games_since_clear: usize,
    total_inserted: usize,
}

impl BatchWriter {
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            inserted: HashSet::new(),
            games_since_clear: 0,
            total_inserted: 0,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn tracked_pairs(&self) -> usize {
        self.inserted.len()
    }

    pub fn total_inserted(&self) -> usize {
        self.total_inserted
    }

    /// Queue rows; flushes once a full batch is pending. Returns rows persisted
    /// by any flush this triggered.
    pub async fn push(&mut self, pool: &SqlitePool, rows: Vec<NewBoxScore>) -> Result<usize> {
        self.pending.extend(rows);
        if self.pending.len() >= self.config.batch_size {
            return self.flush(pool).await;
        }
        Ok(0)
    }

    pub async fn flush(&mut self, pool: &SqlitePool) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let batch = std::mem::take(&mut self.pending);
        self.insert_box_scores(pool, batch).await
    }

    /// Count one processed game. Every `clear_every_games` games the pending
    /// batch is flushed and the pair set is dropped to bound memory.
    pub async fn note_game_processed(&mut self, pool: &SqlitePool) -> Result<usize> {
        self.games_since_clear += 1;
        if self.games_since_clear < self.config.clear_every_games {
            return Ok(0);
        }

        let flushed = self.flush(pool).await?;
        tracing::debug!(pairs = self.inserted.len(), "Clearing in-session duplicate set");
        self.inserted.clear();
        self.games_since_clear = 0;
        Ok(flushed)
    }

    /// Write `candidates`, skipping pairs already written this session or
    /// already stored. Returns how many rows were durably committed.
    pub async fn insert_box_scores(&mut self, pool: &SqlitePool, candidates: Vec<NewBoxScore>) -> Result<usize> {
        let submitted = candidates.len();
        let mut batch_keys = HashSet::new();
        let mut fresh: Vec<NewBoxScore> = candidates
            .into_iter()
            .filter(|c| !self.inserted.contains(&c.key()) && batch_keys.insert(c.key()))
            .collect();

        if !fresh.is_empty() && fresh.len() <= self.config.existence_check_limit {
            let keys: Vec<(i64, i64)> = fresh.iter().map(NewBoxScore::key).collect();
            let existing = db::existing_box_score_pairs(pool, &keys).await?;
            if !existing.is_empty() {
                fresh.retain(|c| !existing.contains(&c.key()));
            }
        }

        if fresh.len() < submitted {
            tracing::debug!(submitted, skipped = submitted - fresh.len(), "Dropped duplicate box scores");
        }

        let mut committed = 0;
        for chunk in fresh.chunks(self.config.batch_size.max(1)) {
            committed += self.commit_chunk(pool, chunk).await?;
        }

        self.total_inserted += committed;
        Ok(committed)
    }

    async fn commit_chunk(&mut self, pool: &SqlitePool, chunk: &[NewBoxScore]) -> Result<usize> {
        self.inserted.extend(chunk.iter().map(NewBoxScore::key));

        let mut tx = pool.begin().await?;
        let bulk = db::bulk_insert_box_scores(&mut *tx, chunk).await;
        match bulk {
            Ok(n) => {
                tx.commit().await?;
                return Ok(n as usize);
            }
            Err(sqlx::Error::Database(e)) => {
                tx.rollback().await?;
                tracing::warn!(
                    rows = chunk.len(),
                    error = %e,
                    "Bulk insert rejected, falling back to row-by-row"
                );
            }
            Err(e) => {
                for row in chunk {
                    self.inserted.remove(&row.key());
                }
                return Err(e.into());
            }
        }

        let mut committed = 0;
        for row in chunk {
            match db::insert_box_score(pool, row).await {
                Ok(n) => committed += n as usize,
                Err(sqlx::Error::Database(e)) => {
                    self.inserted.remove(&row.key());
                    tracing::debug!(
                        game_id = row.game_id,
                        player_id = row.player_id,
                        error = %e,
                        "Box score rejected"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(committed)
    }
}
