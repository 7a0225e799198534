use std::collections::HashSet;
use std::time::{Duration, Instant};

use zenlotto_db::models::OmegaMember;

use crate::affinity::screen;
use crate::combinatorics::{binomial, split_ranges, Combo, LexRange};
use crate::config::{EngineConfig, GameConfig, Thresholds};
use crate::error::OmegaError;
use crate::executor::Executor;
use crate::frequency::FrequencyTable;
use crate::progress::{ProgressSink, Throttled};

#[derive(Debug, Clone)]
pub struct ClassificationReport {
    /// Omega Class in lexicographic order.
    pub members: Vec<OmegaMember>,
    pub universe: u64,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub elapsed_ms: u64,
}

impl ClassificationReport {
    pub fn unplayed(&self) -> usize {
        self.members.iter().filter(|m| !m.has_appeared).count()
    }

    /// False when a chunk failed and the member list is partial.
    pub fn is_complete(&self) -> bool {
        self.failed_chunks == 0
    }
}

fn classify_range(
    start: u64,
    len: u64,
    game: &GameConfig,
    table: &FrequencyTable,
    thresholds: &Thresholds,
    historical: &HashSet<Combo>,
) -> Vec<OmegaMember> {
    LexRange::new(start, len, game.n, game.k)
        .filter_map(|combo| {
            screen(combo.as_slice(), table, thresholds).map(|[pares, tercias, cuartetos]| OmegaMember {
                numbers: combo.to_vec(),
                has_appeared: historical.contains(&combo),
                affinity_pares: pares,
                affinity_tercias: tercias,
                affinity_cuartetos: cuartetos,
            })
        })
        .collect()
}

/// Screens all C(k, n) combinations against `thresholds`.
///
/// Fails before enumerating anything when the frequency table is empty.
pub fn classify_universe(
    game: &GameConfig,
    table: &FrequencyTable,
    thresholds: &Thresholds,
    historical: &HashSet<Combo>,
    config: &EngineConfig,
    exec: &Executor,
    progress: &dyn ProgressSink,
) -> Result<ClassificationReport, OmegaError> {
    if table.is_empty() {
        return Err(OmegaError::MissingFrequencies);
    }
    let start = Instant::now();
    let progress = Throttled::new(
        progress,
        config.progress_step,
        Duration::from_millis(config.progress_interval_ms),
    );

    let universe = binomial(game.k as u64, game.n as u64);
    let ranges = split_ranges(universe, exec.workers() * config.chunks_per_worker);
    let chunks = ranges.len();
    log::info!(
        "Pre-generando {} combinaciones en {} lotes (umbrales {:?})",
        universe,
        chunks,
        thresholds.as_array()
    );
    progress.report(5, &format!("Iniciando pre-generación de {universe} combinaciones..."));

    let mut per_chunk: Vec<Option<Vec<OmegaMember>>> = vec![None; chunks];
    let mut failed_chunks = 0;
    let mut processed = 0u64;
    let lens: Vec<u64> = ranges.iter().map(|&(_, len)| len).collect();
    exec.for_each_unordered(
        ranges,
        "pre-generación",
        |(s, len)| {
            log::debug!("Lote [{s}, {}) en {:?}", s + len, std::thread::current().name());
            Ok(classify_range(s, len, game, table, thresholds, historical))
        },
        |i, result| {
            processed += lens[i];
            match result {
                Some(members) => per_chunk[i] = Some(members),
                None => failed_chunks += 1,
            }
            let pct = 5 + (processed * 90 / universe.max(1)) as u8;
            progress.report(pct, &format!("Pre-generando: {processed}/{universe}"));
        },
    );

    if failed_chunks > 0 {
        log::error!("{failed_chunks} lotes de pre-generación fallaron; la Clase Omega está incompleta");
    }
    let members: Vec<OmegaMember> = per_chunk.into_iter().flatten().flatten().collect();
    log::info!("Clase Omega: {} de {} combinaciones", members.len(), universe);
    progress.report(100, "Pre-generación completada");

    Ok(ClassificationReport {
        members,
        universe,
        chunks,
        failed_chunks,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}
