use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use zenlotto_db::models::{Draw, FrequencyMetrics, LevelStats, TrajectoryRecord};

use crate::config::{EngineConfig, GameConfig, Level};
use crate::error::OmegaError;
use crate::executor::Executor;
use crate::frequency::FrequencyTable;
use crate::optimizer::{historical_affinities, optimize};
use crate::progress::{NoProgress, ProgressSink, Throttled};

/// Draw counts at which the walk-forward stops: `start, start + block, ...`
/// and always the final count.
pub fn checkpoints(total: usize, start: usize, block: usize) -> Vec<usize> {
    if total < start || start == 0 || block == 0 {
        return Vec::new();
    }
    let mut points: Vec<usize> = (start..=total).step_by(block).collect();
    if points.last() != Some(&total) {
        points.push(total);
    }
    points
}

/// Mean, median, min and max of a sample; all zero when empty.
pub fn level_stats(values: &[u64]) -> LevelStats {
    if values.is_empty() {
        return LevelStats::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let len = sorted.len();
    let median = if len % 2 == 1 {
        sorted[len / 2] as f64
    } else {
        (sorted[len / 2 - 1] + sorted[len / 2]) as f64 / 2.0
    };
    LevelStats {
        mean: sorted.iter().sum::<u64>() as f64 / len as f64,
        median,
        min: sorted[0],
        max: sorted[len - 1],
    }
}

struct Checkpoint {
    draws_used: usize,
    table: FrequencyTable,
    frequencies: [FrequencyMetrics; 3],
}

fn evaluate_checkpoint(
    checkpoint: Checkpoint,
    draws: &[Draw],
    game: &GameConfig,
    config: &EngineConfig,
    exec: &Executor,
) -> anyhow::Result<TrajectoryRecord> {
    let window = &draws[..checkpoint.draws_used];
    let hist = historical_affinities(window, &checkpoint.table, game);
    let affinities = [0, 1, 2].map(|i| level_stats(&hist.levels[i]));
    let mut record = TrajectoryRecord {
        last_draw: checkpoint.table.last_draw(),
        draws_used: checkpoint.draws_used as u32,
        frequencies: checkpoint.frequencies,
        affinities,
        thresholds: None,
        historical_coverage: None,
        universal_coverage: None,
    };
    match optimize(window, &checkpoint.table, game, config, exec, &NoProgress) {
        Ok(report) => {
            record.thresholds = Some(report.best.thresholds.as_array());
            record.historical_coverage = Some(report.best.historical_coverage);
            record.universal_coverage = Some(report.best.universal_coverage);
        }
        Err(OmegaError::NoViableCandidate { .. }) => {
            log::warn!("Punto {}: sin candidatos viables", record.last_draw);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(record)
}

/// Walk-forward: at each checkpoint, the frequency table and an optimizer run
/// over the draws seen so far. `draws` must be in ascending sequence order.
///
/// Checkpoints run as parallel tasks; each task's optimizer fans out on a nested executor.
pub fn run_trajectory(
    draws: &[Draw],
    game: &GameConfig,
    config: &EngineConfig,
    exec: &Executor,
    progress: &dyn ProgressSink,
) -> Result<Vec<TrajectoryRecord>, OmegaError> {
    config.validate()?;
    if draws.is_empty() {
        return Err(OmegaError::NoDraws);
    }
    let points = checkpoints(draws.len(), config.trajectory_start, config.trajectory_block);
    if points.is_empty() {
        return Err(OmegaError::NotEnoughDraws {
            needed: config.trajectory_start,
            available: draws.len(),
        });
    }
    log::info!("Trayectoria: {} puntos de control", points.len());
    let progress = Throttled::new(
        progress,
        config.progress_step,
        Duration::from_millis(config.progress_interval_ms),
    );
    progress.report(0, &format!("Calculando frecuencias para {} puntos...", points.len()));

    let mut table = FrequencyTable::new(game.k);
    let mut folded = 0;
    let mut snapshots = Vec::with_capacity(points.len());
    for &point in &points {
        table.fold(&draws[folded..point], game);
        folded = point;
        snapshots.push(Checkpoint {
            draws_used: point,
            table: table.clone(),
            frequencies: Level::ALL.map(|level| table.metrics(level)),
        });
    }

    let total = snapshots.len();
    let done = AtomicUsize::new(0);
    let nested = exec.nested();
    let results = exec.try_map(snapshots, "trayectoria", |checkpoint| {
        let record = evaluate_checkpoint(checkpoint, draws, game, config, &nested);
        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("Punto de control {n}/{total} listo");
        let pct = 10 + (n * 90 / total) as u8;
        progress.report(pct.min(99), &format!("Trayectoria: {n}/{total} puntos"));
        record
    });
    progress.report(100, "Trayectoria completada");

    let failed = results.iter().filter(|r| r.is_none()).count();
    if failed > 0 {
        log::error!("{failed} puntos de control fallaron y se omiten");
    }
    Ok(results.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameId;
    use crate::frequency::tests::draw;

    #[test]
    fn test_checkpoints() {
        assert_eq!(checkpoints(260, 50, 100), vec![50, 150, 250, 260]);
        assert_eq!(checkpoints(250, 50, 100), vec![50, 150, 250]);
        assert_eq!(checkpoints(50, 50, 100), vec![50]);
        assert!(checkpoints(49, 50, 100).is_empty());
    }

    #[test]
    fn test_level_stats() {
        let s = level_stats(&[4, 1, 3, 2]);
        assert_eq!((s.min, s.max), (1, 4));
        assert!((s.mean - 2.5).abs() < 1e-12);
        assert!((s.median - 2.5).abs() < 1e-12);
        assert_eq!(level_stats(&[]), LevelStats::default());
        assert!((level_stats(&[5, 1, 9]).median - 5.0).abs() < 1e-12);
    }

    fn mini_draws(count: u32) -> Vec<Draw> {
        let patterns: [[u8; 3]; 5] = [[1, 2, 3], [1, 2, 4], [2, 3, 5], [1, 3, 6], [4, 5, 6]];
        (1..=count)
            .map(|i| draw(i, &patterns[(i as usize) % patterns.len()]))
            .collect()
    }

    #[test]
    fn test_trajectory_records() {
        let game = GameId::Mini.config();
        let draws = mini_draws(25);
        let config = EngineConfig {
            trajectory_start: 10,
            trajectory_block: 10,
            mc_samples: 200,
            ..EngineConfig::default()
        };
        let records = run_trajectory(&draws, game, &config, &Executor::new(3).unwrap(), &NoProgress).unwrap();
        assert_eq!(records.iter().map(|r| r.draws_used).collect::<Vec<_>>(), vec![10, 20, 25]);
        assert_eq!(records[0].last_draw, 10);
        assert_eq!(records[2].last_draw, 25);
        // every checkpoint folds all draws so far, 3 pairs each
        assert_eq!(records[1].frequencies[0].total, 60);
        assert!(records
            .windows(2)
            .all(|w| w[0].frequencies[0].total <= w[1].frequencies[0].total));
        assert!(records.iter().all(|r| r.thresholds.is_some()));
    }

    #[test]
    fn test_trajectory_needs_enough_draws() {
        let game = GameId::Mini.config();
        let err = run_trajectory(
            &mini_draws(5),
            game,
            &EngineConfig::default(),
            &Executor::sequential(),
            &NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, OmegaError::NotEnoughDraws { needed: 50, available: 5 }));
    }

    #[test]
    fn test_trajectory_reports_each_checkpoint() {
        let game = GameId::Mini.config();
        let config = EngineConfig {
            trajectory_start: 10,
            trajectory_block: 10,
            mc_samples: 100,
            progress_step: 1,
            ..EngineConfig::default()
        };
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |p: u8, _: &str| seen.lock().unwrap().push(p);
        run_trajectory(&mini_draws(25), game, &config, &Executor::sequential(), &sink).unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![0, 40, 70, 99, 100]);
    }
}
