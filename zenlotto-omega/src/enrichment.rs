use std::collections::HashSet;
use std::time::Duration;

use zenlotto_db::models::{Draw, DrawScore};

use crate::combinatorics::{split_ranges, Combo};
use crate::config::{EngineConfig, GameConfig, Thresholds};
use crate::error::OmegaError;
use crate::evaluation::evaluate_combination;
use crate::executor::Executor;
use crate::frequency::FrequencyTable;
use crate::progress::{ProgressSink, Throttled};

#[derive(Debug, Clone)]
pub struct EnrichmentReport {
    /// Ascending by draw sequence.
    pub scores: Vec<DrawScore>,
    pub skipped: usize,
    pub failed_chunks: usize,
}

impl EnrichmentReport {
    pub fn omega_count(&self) -> usize {
        self.scores.iter().filter(|s| s.is_omega).count()
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn score_chunk(
    draws: &[Draw],
    game: &GameConfig,
    table: &FrequencyTable,
    thresholds: &Thresholds,
) -> (Vec<DrawScore>, usize) {
    let empty = HashSet::<Combo>::new();
    let mut scores = Vec::with_capacity(draws.len());
    let mut skipped = 0;
    for draw in draws {
        match evaluate_combination(&draw.numbers, game, table, thresholds, &empty) {
            Ok(eval) => scores.push(DrawScore {
                sequence: draw.sequence,
                is_omega: eval.is_omega,
                omega_score: round4(eval.omega_score),
                affinity_pares: eval.affinities[0],
                affinity_tercias: eval.affinities[1],
                affinity_cuartetos: eval.affinities[2],
            }),
            Err(e) => {
                log::warn!("Omitiendo sorteo {} en el enriquecimiento: {}", draw.sequence, e);
                skipped += 1;
            }
        }
    }
    (scores, skipped)
}

/// Scores every historical draw (Omega flag, Omega Score, affinities) in parallel chunks.
pub fn enrich_history(
    draws: &[Draw],
    game: &GameConfig,
    table: &FrequencyTable,
    thresholds: &Thresholds,
    config: &EngineConfig,
    exec: &Executor,
    progress: &dyn ProgressSink,
) -> Result<EnrichmentReport, OmegaError> {
    if draws.is_empty() {
        return Err(OmegaError::NoDraws);
    }
    if table.is_empty() {
        return Err(OmegaError::MissingFrequencies);
    }
    let progress = Throttled::new(
        progress,
        config.progress_step,
        Duration::from_millis(config.progress_interval_ms),
    );
    let chunks: Vec<&[Draw]> = split_ranges(draws.len() as u64, exec.workers())
        .into_iter()
        .map(|(s, len)| &draws[s as usize..(s + len) as usize])
        .collect();
    let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
    let total = draws.len();

    let mut per_chunk: Vec<Option<Vec<DrawScore>>> = vec![None; chunks.len()];
    let mut skipped = 0;
    let mut failed_chunks = 0;
    let mut processed = 0;
    exec.for_each_unordered(
        chunks,
        "enriquecimiento",
        |chunk| Ok(score_chunk(chunk, game, table, thresholds)),
        |i, result| {
            processed += lens[i];
            match result {
                Some((scores, s)) => {
                    skipped += s;
                    per_chunk[i] = Some(scores);
                }
                None => failed_chunks += 1,
            }
            let pct = (processed * 100 / total) as u8;
            progress.report(pct, &format!("Enriqueciendo: {processed}/{total}"));
        },
    );

    let mut scores: Vec<DrawScore> = per_chunk.into_iter().flatten().flatten().collect();
    scores.sort_by_key(|s| s.sequence);
    log::info!(
        "Enriquecimiento: {} sorteos puntuados, {} omitidos",
        scores.len(),
        skipped
    );
    Ok(EnrichmentReport {
        scores,
        skipped,
        failed_chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameId;
    use crate::frequency::build;
    use crate::frequency::tests::draw;
    use crate::progress::NoProgress;

    #[test]
    fn test_enrich_scores_every_valid_draw() {
        let game = GameId::Mini.config();
        let draws = vec![
            draw(1, &[1, 2, 3]),
            draw(2, &[1, 2, 4]),
            draw(3, &[1, 2]),
            draw(4, &[3, 5, 6]),
        ];
        let (table, _) = build(&draws, game, None);
        let thresholds = Thresholds::new(4, 1, 0);
        let report = enrich_history(
            &draws,
            game,
            &table,
            &thresholds,
            &EngineConfig::default(),
            &Executor::new(2).unwrap(),
            &NoProgress,
        )
        .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(
            report.scores.iter().map(|s| s.sequence).collect::<Vec<_>>(),
            vec![1, 2, 4]
        );
        // {1,2,3}: pares 2+1+1 = 4, tercias 1
        assert!(report.scores[0].is_omega);
        assert_eq!(report.scores[0].affinity_pares, 4);
        assert!(!report.scores[2].is_omega);
        assert_eq!(report.omega_count(), 2);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(-1.0), -1.0);
    }
}
