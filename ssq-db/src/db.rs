use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;

use crate::models::{Algorithm, AlgorithmPerformance, Draw, Prediction, StoredPrediction};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS draws (
    period        TEXT PRIMARY KEY,
    date          TEXT NOT NULL,
    red_1         INTEGER NOT NULL,
    red_2         INTEGER NOT NULL,
    red_3         INTEGER NOT NULL,
    red_4         INTEGER NOT NULL,
    red_5         INTEGER NOT NULL,
    red_6         INTEGER NOT NULL,
    blue          INTEGER NOT NULL,
    source        TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS predictions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    algorithm     TEXT NOT NULL,
    red_1         INTEGER NOT NULL,
    red_2         INTEGER NOT NULL,
    red_3         INTEGER NOT NULL,
    red_4         INTEGER NOT NULL,
    red_5         INTEGER NOT NULL,
    red_6         INTEGER NOT NULL,
    blue          INTEGER NOT NULL,
    confidence    REAL NOT NULL,
    dataset_size  INTEGER NOT NULL,
    generated_at  TEXT NOT NULL,
    metadata      TEXT NOT NULL DEFAULT 'null',
    target_period TEXT,
    is_top_tier   INTEGER
);

CREATE INDEX IF NOT EXISTS idx_predictions_generated_at ON predictions (generated_at);

CREATE TABLE IF NOT EXISTS algorithm_performance (
    algorithm      TEXT PRIMARY KEY,
    total_runs     INTEGER NOT NULL,
    avg_confidence REAL NOT NULL,
    last_run_at    TEXT NOT NULL
);
";

const DRAW_COLUMNS: &str = "period, date, red_1, red_2, red_3, red_4, red_5, red_6, blue, source";

const PREDICTION_COLUMNS: &str = "id, algorithm, red_1, red_2, red_3, red_4, red_5, red_6, blue, confidence, dataset_size, generated_at, metadata, target_period, is_top_tier";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("ssq.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Échec de la migration")?;
    Ok(())
}

fn conversion_error(col: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, Type::Text, msg.into())
}

fn row_to_draw(row: &Row<'_>) -> rusqlite::Result<Draw> {
    Ok(Draw {
        period: row.get(0)?,
        date: row.get(1)?,
        reds: [
            row.get::<_, u8>(2)?,
            row.get::<_, u8>(3)?,
            row.get::<_, u8>(4)?,
            row.get::<_, u8>(5)?,
            row.get::<_, u8>(6)?,
            row.get::<_, u8>(7)?,
        ],
        blue: row.get(8)?,
        source: row.get(9)?,
    })
}

fn row_to_prediction(row: &Row<'_>) -> rusqlite::Result<StoredPrediction> {
    let algo_raw: String = row.get(1)?;
    let algorithm = Algorithm::parse(&algo_raw)
        .ok_or_else(|| conversion_error(1, format!("algorithme inconnu : {algo_raw}")))?;
    let metadata_raw: String = row.get(12)?;
    let metadata = serde_json::from_str(&metadata_raw)
        .map_err(|e| conversion_error(12, format!("métadonnées invalides : {e}")))?;
    let dataset_size: i64 = row.get(10)?;

    Ok(StoredPrediction {
        id: row.get(0)?,
        prediction: Prediction {
            reds: [
                row.get::<_, u8>(2)?,
                row.get::<_, u8>(3)?,
                row.get::<_, u8>(4)?,
                row.get::<_, u8>(5)?,
                row.get::<_, u8>(6)?,
                row.get::<_, u8>(7)?,
            ],
            blue: row.get(8)?,
            confidence: row.get(9)?,
            algorithm,
            dataset_size: dataset_size as usize,
            generated_at: row.get(11)?,
            metadata,
        },
        target_period: row.get(13)?,
        is_top_tier: row.get(14)?,
    })
}

pub fn insert_draw(conn: &Connection, draw: &Draw) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO draws (period, date, red_1, red_2, red_3, red_4, red_5, red_6, blue, source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            draw.period,
            draw.date,
            draw.reds[0],
            draw.reds[1],
            draw.reds[2],
            draw.reds[3],
            draw.reds[4],
            draw.reds[5],
            draw.blue,
            draw.source,
        ],
    ).context("Échec de l'insertion du tirage")?;
    Ok(changed > 0)
}

/// Derniers tirages, du plus récent au plus ancien.
pub fn fetch_last_draws(conn: &Connection, limit: u32) -> Result<Vec<Draw>> {
    let sql = format!(
        "SELECT {DRAW_COLUMNS} FROM draws ORDER BY date DESC, period DESC LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let draws = stmt
        .query_map([limit], row_to_draw)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(draws)
}

pub fn count_draws(conn: &Connection) -> Result<u32> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM draws", [], |row| row.get(0))?;
    Ok(count)
}

/// Premier tirage dont la date est >= `date`.
pub fn find_first_draw_from(conn: &Connection, date: NaiveDate) -> Result<Option<Draw>> {
    let sql = format!(
        "SELECT {DRAW_COLUMNS} FROM draws WHERE date >= ?1 ORDER BY date ASC, period ASC LIMIT 1"
    );
    let draw = conn
        .query_row(&sql, [date], row_to_draw)
        .optional()
        .context("Échec de la recherche du tirage cible")?;
    Ok(draw)
}

pub fn find_draw_by_period(conn: &Connection, period: &str) -> Result<Option<Draw>> {
    let sql = format!("SELECT {DRAW_COLUMNS} FROM draws WHERE period = ?1");
    let draw = conn
        .query_row(&sql, [period], row_to_draw)
        .optional()
        .with_context(|| format!("Échec de la lecture du tirage {period}"))?;
    Ok(draw)
}

pub fn insert_prediction(conn: &Connection, prediction: &Prediction) -> Result<i64> {
    let metadata = serde_json::to_string(&prediction.metadata)?;
    conn.execute(
        "INSERT INTO predictions (algorithm, red_1, red_2, red_3, red_4, red_5, red_6, blue, confidence, dataset_size, generated_at, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            prediction.algorithm.as_str(),
            prediction.reds[0],
            prediction.reds[1],
            prediction.reds[2],
            prediction.reds[3],
            prediction.reds[4],
            prediction.reds[5],
            prediction.blue,
            prediction.confidence,
            prediction.dataset_size as i64,
            prediction.generated_at,
            metadata,
        ],
    ).context("Échec de l'enregistrement de la prédiction")?;
    Ok(conn.last_insert_rowid())
}

/// Prédictions, de la plus récente à la plus ancienne.
pub fn fetch_predictions(conn: &Connection, limit: u32) -> Result<Vec<StoredPrediction>> {
    let sql = format!(
        "SELECT {PREDICTION_COLUMNS} FROM predictions ORDER BY generated_at DESC, id DESC LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let predictions = stmt
        .query_map([limit], row_to_prediction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(predictions)
}

/// N'écrit que si la valeur change ; retourne true si une ligne a été modifiée.
pub fn update_prediction_target(
    conn: &Connection,
    id: i64,
    target_period: &str,
    is_top_tier: bool,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE predictions SET target_period = ?2, is_top_tier = ?3
         WHERE id = ?1 AND (target_period IS NOT ?2 OR is_top_tier IS NOT ?3)",
        rusqlite::params![id, target_period, is_top_tier],
    ).with_context(|| format!("Échec de la mise à jour de la prédiction {id}"))?;
    Ok(changed > 0)
}

/// Enregistre une exécution dans une transaction IMMEDIATE (lecture-modification-écriture).
pub fn record_algorithm_run(
    conn: &Connection,
    algorithm: Algorithm,
    confidence: f64,
    at: DateTime<Utc>,
) -> Result<AlgorithmPerformance> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .context("Impossible d'ouvrir la transaction de performance")?;

    let existing = tx
        .query_row(
            "SELECT total_runs, avg_confidence, last_run_at FROM algorithm_performance WHERE algorithm = ?1",
            [algorithm.as_str()],
            |row| {
                let total_runs: i64 = row.get(0)?;
                Ok(AlgorithmPerformance {
                    algorithm,
                    total_runs: total_runs as u64,
                    avg_confidence: row.get(1)?,
                    last_run_at: row.get(2)?,
                })
            },
        )
        .optional()?;

    let updated = match existing {
        Some(perf) => perf.with_run(confidence, at),
        None => AlgorithmPerformance::first_run(algorithm, confidence, at),
    };

    tx.execute(
        "INSERT INTO algorithm_performance (algorithm, total_runs, avg_confidence, last_run_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(algorithm) DO UPDATE SET
            total_runs = excluded.total_runs,
            avg_confidence = excluded.avg_confidence,
            last_run_at = excluded.last_run_at",
        rusqlite::params![
            algorithm.as_str(),
            updated.total_runs as i64,
            updated.avg_confidence,
            updated.last_run_at,
        ],
    )?;
    tx.commit().context("Échec du commit de performance")?;
    Ok(updated)
}

pub fn fetch_algorithm_performance(conn: &Connection) -> Result<Vec<AlgorithmPerformance>> {
    let mut stmt = conn.prepare(
        "SELECT algorithm, total_runs, avg_confidence, last_run_at FROM algorithm_performance ORDER BY algorithm"
    )?;
    let records = stmt.query_map([], |row| {
        let algo_raw: String = row.get(0)?;
        let algorithm = Algorithm::parse(&algo_raw)
            .ok_or_else(|| conversion_error(0, format!("algorithme inconnu : {algo_raw}")))?;
        let total_runs: i64 = row.get(1)?;
        Ok(AlgorithmPerformance {
            algorithm,
            total_runs: total_runs as u64,
            avg_confidence: row.get(2)?,
            last_run_at: row.get(3)?,
        })
    })?.collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}
