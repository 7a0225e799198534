use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};

use zenlotto_db::models::{validate_draw, Draw};

use crate::affinity::affinities;
use crate::combinatorics::{split_ranges, Combo};
use crate::config::{EngineConfig, GameConfig, Thresholds};
use crate::error::OmegaError;
use crate::executor::Executor;
use crate::frequency::FrequencyTable;
use crate::progress::{ProgressSink, Throttled};

/// Per-level affinity of every valid historical draw, indexed like `Level::index`.
#[derive(Debug, Clone, Default)]
pub struct HistoricalAffinities {
    pub levels: [Vec<u64>; 3],
}

impl HistoricalAffinities {
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn row(&self, i: usize) -> [u64; 3] {
        [self.levels[0][i], self.levels[1][i], self.levels[2][i]]
    }

    /// Copy of each level sorted ascending, for percentile lookups.
    pub fn sorted_levels(&self) -> [Vec<u64>; 3] {
        self.levels.clone().map(|mut v| {
            v.sort_unstable();
            v
        })
    }
}

/// Scores every draw; malformed draws are skipped with a warning.
pub fn historical_affinities(draws: &[Draw], table: &FrequencyTable, game: &GameConfig) -> HistoricalAffinities {
    let mut out = HistoricalAffinities::default();
    for draw in draws {
        if let Err(e) = validate_draw(&draw.numbers, game.n, game.k) {
            log::warn!("Omitiendo sorteo {} en afinidades históricas: {}", draw.sequence, e);
            continue;
        }
        let af = affinities(&draw.sorted_numbers(), table);
        for (level, value) in out.levels.iter_mut().zip(af) {
            level.push(value);
        }
    }
    out
}

/// Linear-interpolated percentile of an ascending slice, truncated to an integer.
/// `fraction` is in `[0, 1]`.
pub fn percentile(sorted: &[u64], fraction: f64) -> u64 {
    match sorted.len() {
        0 => 0,
        1 => sorted[0],
        len => {
            let pos = fraction.clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let lo_v = sorted[lo] as f64;
            let hi_v = sorted[hi] as f64;
            let value = lo_v + (hi_v - lo_v) * (pos - lo as f64);
            value.floor() as u64
        }
    }
}

/// Fraction of historical draws meeting all three thresholds.
pub fn historical_coverage(hist: &HistoricalAffinities, thresholds: &Thresholds) -> f64 {
    if hist.is_empty() {
        return 0.0;
    }
    let covered = (0..hist.len())
        .filter(|&i| thresholds.admits(&hist.row(i)))
        .count();
    covered as f64 / hist.len() as f64
}

/// Uniform `n`-of-`k` combination by partial Fisher-Yates.
pub fn random_combination(rng: &mut StdRng, n: usize, k: u8) -> Combo {
    let mut pool: Vec<u8> = (1..=k).collect();
    for i in 0..n {
        let j = rng.random_range(i..pool.len());
        pool.swap(i, j);
    }
    let mut picked = pool[..n].to_vec();
    picked.sort_unstable();
    Combo::from_sorted(&picked)
}

/// Affinities of a fixed uniform sample of the universe.
///
/// Every scenario is scored against the same seeded sample, so the sample is
/// drawn and scored once per optimizer run.
#[derive(Debug, Clone)]
pub struct MonteCarloSample {
    affinities: Vec<[u64; 3]>,
}

impl MonteCarloSample {
    pub fn draw(table: &FrequencyTable, game: &GameConfig, samples: usize, seed: u64, exec: &Executor) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let combos: Vec<Combo> = (0..samples)
            .map(|_| random_combination(&mut rng, game.n, game.k))
            .collect();
        let parts = split_ranges(combos.len() as u64, exec.workers());
        let chunks: Vec<&[Combo]> = parts
            .iter()
            .map(|&(start, len)| &combos[start as usize..(start + len) as usize])
            .collect();
        let scored = exec.map(chunks, |chunk| {
            chunk
                .iter()
                .map(|c| affinities(c.as_slice(), table))
                .collect::<Vec<_>>()
        });
        Self {
            affinities: scored.into_iter().flatten().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.affinities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.affinities.is_empty()
    }

    /// Estimated fraction of the universe admitted; 1.0 (worst case) for an empty sample.
    pub fn coverage(&self, thresholds: &Thresholds) -> f64 {
        if self.affinities.is_empty() {
            return 1.0;
        }
        let admitted = self.affinities.iter().filter(|af| thresholds.admits(af)).count();
        admitted as f64 / self.affinities.len() as f64
    }
}

/// One evaluated percentile triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Position in the scenario grid.
    pub scenario: usize,
    pub percentiles: [f64; 3],
    pub thresholds: Thresholds,
    pub historical_coverage: f64,
    pub universal_coverage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub best: Candidate,
    /// Viable candidates, best first.
    pub candidates: Vec<Candidate>,
    pub scenarios: usize,
    pub failed_batches: usize,
    pub draws_scored: usize,
    pub elapsed_ms: u64,
}

/// Cartesian product of the percentile grid over the three levels.
pub fn scenario_grid(config: &EngineConfig) -> Vec<[f64; 3]> {
    let grid = config.percentile_grid();
    let mut scenarios = Vec::with_capacity(grid.len().pow(3));
    for &p in &grid {
        for &t in &grid {
            for &q in &grid {
                scenarios.push([p, t, q]);
            }
        }
    }
    scenarios
}

/// Thresholds and historical coverage of one scenario; `None` below the coverage floor.
pub fn evaluate_scenario(
    scenario: usize,
    percentiles: [f64; 3],
    sorted: &[Vec<u64>; 3],
    hist: &HistoricalAffinities,
    min_coverage: f64,
) -> Option<(Thresholds, f64)> {
    let thresholds = Thresholds::from_array([
        percentile(&sorted[0], percentiles[0]),
        percentile(&sorted[1], percentiles[1]),
        percentile(&sorted[2], percentiles[2]),
    ]);
    let coverage = historical_coverage(hist, &thresholds);
    if coverage < min_coverage {
        log::trace!("Escenario {scenario} descartado: cobertura {coverage:.3}");
        return None;
    }
    Some((thresholds, coverage))
}

/// Lowest universal coverage first, then highest historical coverage, then grid order.
fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.universal_coverage
            .total_cmp(&b.universal_coverage)
            .then(b.historical_coverage.total_cmp(&a.historical_coverage))
            .then(a.scenario.cmp(&b.scenario))
    });
}

/// Searches the percentile grid for the tightest thresholds that still cover
/// `min_historical_coverage` of `draws`.
pub fn optimize(
    draws: &[Draw],
    table: &FrequencyTable,
    game: &GameConfig,
    config: &EngineConfig,
    exec: &Executor,
    progress: &dyn ProgressSink,
) -> Result<OptimizationReport, OmegaError> {
    config.validate()?;
    if draws.is_empty() {
        return Err(OmegaError::NoDraws);
    }
    if table.is_empty() {
        return Err(OmegaError::MissingFrequencies);
    }
    let start = Instant::now();
    let progress = Throttled::new(
        progress,
        config.progress_step,
        Duration::from_millis(config.progress_interval_ms),
    );

    let hist = historical_affinities(draws, table, game);
    if hist.is_empty() {
        return Err(OmegaError::NoDraws);
    }
    let sorted = hist.sorted_levels();

    let scenarios = scenario_grid(config);
    log::info!(
        "Optimizando {} escenarios sobre {} sorteos con {} trabajadores",
        scenarios.len(),
        hist.len(),
        exec.workers()
    );
    progress.report(5, &format!("Iniciando optimización de {} escenarios...", scenarios.len()));

    let sample = MonteCarloSample::draw(table, game, config.mc_samples, config.mc_seed, exec);
    progress.report(10, "Muestra Monte Carlo lista");

    let batches: Vec<Vec<(usize, [f64; 3])>> = split_ranges(
        scenarios.len() as u64,
        exec.workers() * config.chunks_per_worker,
    )
    .into_iter()
    .map(|(s, len)| {
        (s as usize..(s + len) as usize)
            .map(|i| (i, scenarios[i]))
            .collect()
    })
    .collect();
    let total_batches = batches.len();

    let mut candidates = Vec::new();
    let mut failed_batches = 0;
    let mut done = 0;
    exec.for_each_unordered(
        batches,
        "optimizador",
        |batch| {
            let mut viable = Vec::new();
            for (scenario, percentiles) in batch {
                if let Some((thresholds, coverage)) =
                    evaluate_scenario(scenario, percentiles, &sorted, &hist, config.min_historical_coverage)
                {
                    viable.push(Candidate {
                        scenario,
                        percentiles,
                        thresholds,
                        historical_coverage: coverage,
                        universal_coverage: sample.coverage(&thresholds),
                    });
                }
            }
            Ok(viable)
        },
        |_, result| {
            done += 1;
            match result {
                Some(viable) => candidates.extend(viable),
                None => failed_batches += 1,
            }
            let pct = 10 + (done * 85 / total_batches.max(1)) as u8;
            progress.report(pct, &format!("Procesando escenarios... {done}/{total_batches} lotes"));
        },
    );

    progress.report(95, "Recopilando resultados...");
    if candidates.is_empty() {
        log::warn!(
            "Ningún escenario alcanzó la cobertura mínima {:.2}",
            config.min_historical_coverage
        );
        return Err(OmegaError::NoViableCandidate {
            min_coverage: config.min_historical_coverage,
        });
    }
    rank_candidates(&mut candidates);
    let best = candidates[0].clone();
    log::info!(
        "Mejor escenario {}: umbrales {:?}, CH {:.3}, CU {:.4} ({} viables de {})",
        best.scenario,
        best.thresholds.as_array(),
        best.historical_coverage,
        best.universal_coverage,
        candidates.len(),
        scenarios.len()
    );
    progress.report(100, "Optimización completada");

    Ok(OptimizationReport {
        best,
        candidates,
        scenarios: scenarios.len(),
        failed_batches,
        draws_scored: hist.len(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}
