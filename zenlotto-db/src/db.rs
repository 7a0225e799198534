use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use crate::models::{
    decode_numbers, encode_numbers, Draw, DrawScore, FrequencyMetrics, LevelStats, OmegaMember,
    TrajectoryRecord, MAX_NUMBERS,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS draws (
    sequence  INTEGER PRIMARY KEY,
    date      TEXT NOT NULL,
    numbers   TEXT NOT NULL,
    jackpot   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS omega_class (
    combination         TEXT PRIMARY KEY,
    c1 INTEGER, c2 INTEGER, c3 INTEGER, c4 INTEGER,
    c5 INTEGER, c6 INTEGER, c7 INTEGER, c8 INTEGER,
    has_appeared        INTEGER NOT NULL,
    affinity_pares      INTEGER NOT NULL,
    affinity_tercias    INTEGER NOT NULL,
    affinity_cuartetos  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS draw_scores (
    sequence            INTEGER PRIMARY KEY,
    is_omega            INTEGER NOT NULL,
    omega_score         REAL NOT NULL,
    affinity_pares      INTEGER NOT NULL,
    affinity_tercias    INTEGER NOT NULL,
    affinity_cuartetos  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS threshold_trajectory (
    last_draw             INTEGER PRIMARY KEY,
    draws_used            INTEGER NOT NULL,
    unique_pares          INTEGER NOT NULL,
    unique_tercias        INTEGER NOT NULL,
    unique_cuartetos      INTEGER NOT NULL,
    total_pares           INTEGER NOT NULL,
    total_tercias         INTEGER NOT NULL,
    total_cuartetos       INTEGER NOT NULL,
    freq_pares_mean       REAL NOT NULL,
    freq_pares_min        INTEGER NOT NULL,
    freq_pares_max        INTEGER NOT NULL,
    freq_tercias_mean     REAL NOT NULL,
    freq_tercias_min      INTEGER NOT NULL,
    freq_tercias_max      INTEGER NOT NULL,
    freq_cuartetos_mean   REAL NOT NULL,
    freq_cuartetos_min    INTEGER NOT NULL,
    freq_cuartetos_max    INTEGER NOT NULL,
    afin_pares_mean       REAL NOT NULL,
    afin_pares_median     REAL NOT NULL,
    afin_pares_min        INTEGER NOT NULL,
    afin_pares_max        INTEGER NOT NULL,
    afin_tercias_mean     REAL NOT NULL,
    afin_tercias_median   REAL NOT NULL,
    afin_tercias_min      INTEGER NOT NULL,
    afin_tercias_max      INTEGER NOT NULL,
    afin_cuartetos_mean   REAL NOT NULL,
    afin_cuartetos_median REAL NOT NULL,
    afin_cuartetos_min    INTEGER NOT NULL,
    afin_cuartetos_max    INTEGER NOT NULL,
    threshold_pares       INTEGER,
    threshold_tercias     INTEGER,
    threshold_cuartetos   INTEGER,
    historical_coverage   REAL,
    universal_coverage    REAL,
    computed_at           TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
);
";

const OMEGA_COLUMNS: &str = "combination, c1, c2, c3, c4, c5, c6, c7, c8, has_appeared, affinity_pares, affinity_tercias, affinity_cuartetos";

/// `./data/<game_id>/`, the per-game data directory.
pub fn data_dir(game_id: &str) -> PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push(game_id);
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("No se pudo crear el directorio {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("No se pudo abrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Falló la migración del esquema")?;
    Ok(())
}

// ── Historical draws ──

pub fn insert_draw(conn: &Connection, draw: &Draw) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO draws (sequence, date, numbers, jackpot) VALUES (?1, ?2, ?3, ?4)",
            params![draw.sequence, draw.date, encode_numbers(&draw.numbers), draw.jackpot],
        )
        .context("Falló la inserción del sorteo")?;
    Ok(changed > 0)
}

fn draw_from_row(row: &Row<'_>) -> rusqlite::Result<Draw> {
    let raw: String = row.get(2)?;
    Ok(Draw {
        sequence: row.get(0)?,
        date: row.get(1)?,
        numbers: decode_numbers(&raw),
        jackpot: row.get(3)?,
    })
}

/// All draws in canonical (ascending sequence) order.
pub fn fetch_draws(conn: &Connection) -> Result<Vec<Draw>> {
    fetch_draws_after(conn, 0)
}

/// Draws whose sequence number is strictly greater than `sequence`, ascending.
pub fn fetch_draws_after(conn: &Connection, sequence: u32) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(
        "SELECT sequence, date, numbers, jackpot FROM draws WHERE sequence > ?1 ORDER BY sequence ASC",
    )?;
    let draws = stmt
        .query_map([sequence], draw_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(draws)
}

/// Most recent draws first.
pub fn fetch_last_draws(conn: &Connection, limit: u32) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(
        "SELECT sequence, date, numbers, jackpot FROM draws ORDER BY sequence DESC LIMIT ?1",
    )?;
    let draws = stmt
        .query_map([limit], draw_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(draws)
}

pub fn count_draws(conn: &Connection) -> Result<u32> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM draws", [], |row| row.get(0))?;
    Ok(count)
}

pub fn last_sequence(conn: &Connection) -> Result<Option<u32>> {
    let last: Option<u32> = conn.query_row("SELECT MAX(sequence) FROM draws", [], |row| row.get(0))?;
    Ok(last)
}

// ── Omega Class ──

/// Replaces the whole Omega Class in one transaction.
pub fn replace_omega_class(conn: &Connection, members: &[OmegaMember]) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .context("No se pudo iniciar la transacción")?;
    tx.execute("DELETE FROM omega_class", [])?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO omega_class ({OMEGA_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ))?;
        for member in members {
            let mut sorted = member.numbers.clone();
            sorted.sort_unstable();
            let mut columns: [Option<u8>; MAX_NUMBERS] = [None; MAX_NUMBERS];
            for (slot, &n) in columns.iter_mut().zip(sorted.iter()) {
                *slot = Some(n);
            }
            stmt.execute(params![
                encode_numbers(&sorted),
                columns[0],
                columns[1],
                columns[2],
                columns[3],
                columns[4],
                columns[5],
                columns[6],
                columns[7],
                member.has_appeared,
                member.affinity_pares as i64,
                member.affinity_tercias as i64,
                member.affinity_cuartetos as i64,
            ])?;
        }
    }
    tx.commit().context("Falló el commit de la Clase Omega")?;
    log::info!("Clase Omega reemplazada: {} combinaciones", members.len());
    Ok(members.len())
}

fn omega_from_row(row: &Row<'_>) -> rusqlite::Result<OmegaMember> {
    let raw: String = row.get(0)?;
    Ok(OmegaMember {
        numbers: decode_numbers(&raw),
        has_appeared: row.get(9)?,
        affinity_pares: row.get::<_, i64>(10)? as u64,
        affinity_tercias: row.get::<_, i64>(11)? as u64,
        affinity_cuartetos: row.get::<_, i64>(12)? as u64,
    })
}

pub fn fetch_omega_class(conn: &Connection) -> Result<Vec<OmegaMember>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {OMEGA_COLUMNS} FROM omega_class ORDER BY c1, c2, c3, c4, c5, c6, c7, c8"
    ))?;
    let members = stmt
        .query_map([], omega_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

pub fn count_omega_class(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM omega_class", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Affinity triples of every member, for distribution displays.
pub fn omega_class_scores(conn: &Connection) -> Result<Vec<[u64; 3]>> {
    let mut stmt = conn.prepare(
        "SELECT affinity_pares, affinity_tercias, affinity_cuartetos FROM omega_class",
    )?;
    let scores = stmt
        .query_map([], |row| {
            Ok([
                row.get::<_, i64>(0)? as u64,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, i64>(2)? as u64,
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(scores)
}

/// A random member that has never been drawn.
pub fn random_unplayed_omega(conn: &Connection) -> Result<Option<OmegaMember>> {
    let member = conn
        .query_row(
            &format!(
                "SELECT {OMEGA_COLUMNS} FROM omega_class WHERE has_appeared = 0 ORDER BY RANDOM() LIMIT 1"
            ),
            [],
            omega_from_row,
        )
        .optional()?;
    Ok(member)
}

/// A random never-drawn member sharing exactly `match_count` numbers with `combination`.
pub fn find_closest_omega(
    conn: &Connection,
    combination: &[u8],
    match_count: usize,
) -> Result<Option<OmegaMember>> {
    if combination.is_empty() {
        return Ok(None);
    }
    let placeholders = vec!["?"; combination.len()].join(", ");
    let shared = (1..=MAX_NUMBERS)
        .map(|i| format!("(CASE WHEN c{i} IN ({placeholders}) THEN 1 ELSE 0 END)"))
        .collect::<Vec<_>>()
        .join(" + ");
    let query = format!(
        "SELECT {OMEGA_COLUMNS} FROM omega_class WHERE ({shared}) = ? AND has_appeared = 0 ORDER BY RANDOM() LIMIT 1"
    );

    let mut values: Vec<i64> = Vec::with_capacity(combination.len() * MAX_NUMBERS + 1);
    for _ in 0..MAX_NUMBERS {
        values.extend(combination.iter().map(|&n| n as i64));
    }
    values.push(match_count as i64);

    let member = conn
        .query_row(&query, params_from_iter(values.iter()), omega_from_row)
        .optional()?;
    Ok(member)
}

// ── Historical enrichment ──

pub fn replace_draw_scores(conn: &Connection, scores: &[DrawScore]) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .context("No se pudo iniciar la transacción")?;
    tx.execute("DELETE FROM draw_scores", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO draw_scores (sequence, is_omega, omega_score, affinity_pares, affinity_tercias, affinity_cuartetos)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for score in scores {
            stmt.execute(params![
                score.sequence,
                score.is_omega,
                score.omega_score,
                score.affinity_pares as i64,
                score.affinity_tercias as i64,
                score.affinity_cuartetos as i64,
            ])?;
        }
    }
    tx.commit().context("Falló el commit de los puntajes históricos")?;
    Ok(scores.len())
}

pub fn fetch_draw_scores(conn: &Connection) -> Result<Vec<DrawScore>> {
    let mut stmt = conn.prepare(
        "SELECT sequence, is_omega, omega_score, affinity_pares, affinity_tercias, affinity_cuartetos
         FROM draw_scores ORDER BY sequence ASC",
    )?;
    let scores = stmt
        .query_map([], |row| {
            Ok(DrawScore {
                sequence: row.get(0)?,
                is_omega: row.get(1)?,
                omega_score: row.get(2)?,
                affinity_pares: row.get::<_, i64>(3)? as u64,
                affinity_tercias: row.get::<_, i64>(4)? as u64,
                affinity_cuartetos: row.get::<_, i64>(5)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(scores)
}

// ── Walk-forward trajectory ──

pub fn replace_trajectory(conn: &Connection, records: &[TrajectoryRecord]) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .context("No se pudo iniciar la transacción")?;
    tx.execute("DELETE FROM threshold_trajectory", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO threshold_trajectory (
                last_draw, draws_used,
                unique_pares, unique_tercias, unique_cuartetos,
                total_pares, total_tercias, total_cuartetos,
                freq_pares_mean, freq_pares_min, freq_pares_max,
                freq_tercias_mean, freq_tercias_min, freq_tercias_max,
                freq_cuartetos_mean, freq_cuartetos_min, freq_cuartetos_max,
                afin_pares_mean, afin_pares_median, afin_pares_min, afin_pares_max,
                afin_tercias_mean, afin_tercias_median, afin_tercias_min, afin_tercias_max,
                afin_cuartetos_mean, afin_cuartetos_median, afin_cuartetos_min, afin_cuartetos_max,
                threshold_pares, threshold_tercias, threshold_cuartetos,
                historical_coverage, universal_coverage
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34
            )",
        )?;
        for r in records {
            let [fp, ft, fq] = &r.frequencies;
            let [ap, at, aq] = &r.affinities;
            let thresholds = r.thresholds.map(|t| t.map(|v| v as i64));
            let values: Vec<rusqlite::types::Value> = vec![
                (r.last_draw as i64).into(),
                (r.draws_used as i64).into(),
                (fp.unique as i64).into(),
                (ft.unique as i64).into(),
                (fq.unique as i64).into(),
                (fp.total as i64).into(),
                (ft.total as i64).into(),
                (fq.total as i64).into(),
                fp.stats.mean.into(),
                (fp.stats.min as i64).into(),
                (fp.stats.max as i64).into(),
                ft.stats.mean.into(),
                (ft.stats.min as i64).into(),
                (ft.stats.max as i64).into(),
                fq.stats.mean.into(),
                (fq.stats.min as i64).into(),
                (fq.stats.max as i64).into(),
                ap.mean.into(),
                ap.median.into(),
                (ap.min as i64).into(),
                (ap.max as i64).into(),
                at.mean.into(),
                at.median.into(),
                (at.min as i64).into(),
                (at.max as i64).into(),
                aq.mean.into(),
                aq.median.into(),
                (aq.min as i64).into(),
                (aq.max as i64).into(),
                thresholds.map(|t| t[0]).into(),
                thresholds.map(|t| t[1]).into(),
                thresholds.map(|t| t[2]).into(),
                r.historical_coverage.into(),
                r.universal_coverage.into(),
            ];
            stmt.execute(params_from_iter(values.iter()))?;
        }
    }
    tx.commit().context("Falló el commit de la trayectoria")?;
    Ok(records.len())
}

fn level_stats(row: &Row<'_>, base: usize) -> rusqlite::Result<LevelStats> {
    Ok(LevelStats {
        mean: row.get(base)?,
        median: row.get(base + 1)?,
        min: row.get::<_, i64>(base + 2)? as u64,
        max: row.get::<_, i64>(base + 3)? as u64,
    })
}

fn frequency_metrics(row: &Row<'_>, unique: usize, total: usize, base: usize) -> rusqlite::Result<FrequencyMetrics> {
    Ok(FrequencyMetrics {
        unique: row.get::<_, i64>(unique)? as u64,
        total: row.get::<_, i64>(total)? as u64,
        stats: LevelStats {
            mean: row.get(base)?,
            median: 0.0,
            min: row.get::<_, i64>(base + 1)? as u64,
            max: row.get::<_, i64>(base + 2)? as u64,
        },
    })
}

pub fn fetch_trajectory(conn: &Connection) -> Result<Vec<TrajectoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT last_draw, draws_used,
                unique_pares, unique_tercias, unique_cuartetos,
                total_pares, total_tercias, total_cuartetos,
                freq_pares_mean, freq_pares_min, freq_pares_max,
                freq_tercias_mean, freq_tercias_min, freq_tercias_max,
                freq_cuartetos_mean, freq_cuartetos_min, freq_cuartetos_max,
                afin_pares_mean, afin_pares_median, afin_pares_min, afin_pares_max,
                afin_tercias_mean, afin_tercias_median, afin_tercias_min, afin_tercias_max,
                afin_cuartetos_mean, afin_cuartetos_median, afin_cuartetos_min, afin_cuartetos_max,
                threshold_pares, threshold_tercias, threshold_cuartetos,
                historical_coverage, universal_coverage
         FROM threshold_trajectory ORDER BY last_draw ASC",
    )?;
    let records = stmt
        .query_map([], |row| {
            let tp: Option<i64> = row.get(29)?;
            let tt: Option<i64> = row.get(30)?;
            let tq: Option<i64> = row.get(31)?;
            let thresholds = match (tp, tt, tq) {
                (Some(p), Some(t), Some(q)) => Some([p as u64, t as u64, q as u64]),
                _ => None,
            };
            Ok(TrajectoryRecord {
                last_draw: row.get(0)?,
                draws_used: row.get(1)?,
                frequencies: [
                    frequency_metrics(row, 2, 5, 8)?,
                    frequency_metrics(row, 3, 6, 11)?,
                    frequency_metrics(row, 4, 7, 14)?,
                ],
                affinities: [level_stats(row, 17)?, level_stats(row, 21)?, level_stats(row, 25)?],
                thresholds,
                historical_coverage: row.get(32)?,
                universal_coverage: row.get(33)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}
