use std::collections::HashSet;
use std::sync::Arc;

use zenlotto_db::db;
use zenlotto_db::models::{validate_draw, Draw, TrajectoryRecord};
use zenlotto_db::rusqlite::Connection;

use crate::cache::DataCache;
use crate::classifier::{classify_universe, ClassificationReport};
use crate::combinatorics::Combo;
use crate::config::{EngineConfig, GameConfig, GamePaths, Thresholds};
use crate::enrichment::{enrich_history, EnrichmentReport};
use crate::error::OmegaError;
use crate::evaluation::{deconstruct_affinity, evaluate_combination, Deconstruction, Evaluation};
use crate::executor::Executor;
use crate::frequency::{FoldSummary, FrequencyTable};
use crate::optimizer::{optimize, OptimizationReport};
use crate::progress::ProgressSink;
use crate::store::{self, PipelineState};
use crate::trajectory::run_trajectory;

/// Outcome of a stage that succeeded. `output` is `None` when the stage had nothing to do.
#[derive(Debug, Clone)]
pub struct StageReport<T> {
    pub message: String,
    pub output: Option<T>,
}

impl<T> StageReport<T> {
    fn done(message: String, output: T) -> Self {
        Self {
            message,
            output: Some(output),
        }
    }

    fn skipped(message: String) -> Self {
        log::info!("{message}");
        Self {
            message,
            output: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.output.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdSource {
    Optimized,
    Default,
}

impl ThresholdSource {
    pub fn label(self) -> &'static str {
        match self {
            ThresholdSource::Optimized => "optimizados",
            ThresholdSource::Default => "por defecto",
        }
    }
}

/// One game's data directory, database and engine settings, with the stages
/// that move data through them.
pub struct Pipeline {
    game: &'static GameConfig,
    paths: GamePaths,
    config: EngineConfig,
    exec: Executor,
    cache: DataCache,
    conn: Connection,
}

impl Pipeline {
    pub fn open(game: &'static GameConfig, paths: GamePaths, config: EngineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let conn = db::open_db(&paths.db())?;
        let exec = Executor::from_config(&config)?;
        Self::with_connection(game, paths, config, conn, exec)
    }

    pub fn with_connection(
        game: &'static GameConfig,
        paths: GamePaths,
        config: EngineConfig,
        conn: Connection,
        exec: Executor,
    ) -> anyhow::Result<Self> {
        db::migrate(&conn)?;
        Ok(Self {
            game,
            paths,
            config,
            exec,
            cache: DataCache::new(),
            conn,
        })
    }

    pub fn game(&self) -> &'static GameConfig {
        self.game
    }

    pub fn paths(&self) -> &GamePaths {
        &self.paths
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn state(&self) -> PipelineState {
        store::load_state(&self.paths.state())
    }

    /// Records the newest draw in the database; call after importing.
    pub fn sync_state(&mut self) -> Result<PipelineState, OmegaError> {
        let mut state = self.state();
        let last = db::last_sequence(&self.conn)?.unwrap_or(0);
        if state.last_draw_in_db != last {
            state.last_draw_in_db = last;
            store::save_state(&self.paths.state(), &state)?;
            self.cache.invalidate();
        }
        Ok(state)
    }

    pub fn frequency_table(&mut self) -> Result<Option<Arc<FrequencyTable>>, OmegaError> {
        let path = self.paths.frequencies();
        let game = self.game;
        Ok(self.cache.table(|| store::load_frequencies(&path, game))?)
    }

    fn require_table(&mut self) -> Result<Arc<FrequencyTable>, OmegaError> {
        self.frequency_table()?
            .filter(|t| !t.is_empty())
            .ok_or(OmegaError::MissingFrequencies)
    }

    /// Every valid historical draw as a combination.
    pub fn historical_set(&mut self) -> Result<Arc<HashSet<Combo>>, OmegaError> {
        let conn = &self.conn;
        let game = self.game;
        Ok(self.cache.historical(|| {
            let draws = db::fetch_draws(conn)?;
            Ok(draws
                .iter()
                .filter(|d| validate_draw(&d.numbers, game.n, game.k).is_ok())
                .filter_map(|d| Combo::new(&d.numbers))
                .collect())
        })?)
    }

    fn draws(&self) -> Result<Vec<Draw>, OmegaError> {
        let draws = db::fetch_draws(&self.conn)?;
        if draws.is_empty() {
            return Err(OmegaError::NoDraws);
        }
        Ok(draws)
    }

    /// The thresholds every consumer uses: the optimizer's persisted output,
    /// else the game's default.
    pub fn current_thresholds(&self) -> Result<(Thresholds, ThresholdSource), OmegaError> {
        Ok(match store::load_thresholds(&self.paths.thresholds())? {
            Some(t) => (t, ThresholdSource::Optimized),
            None => (self.game.default_thresholds, ThresholdSource::Default),
        })
    }

    /// Folds draws newer than the stored table's checkpoint and persists the result.
    pub fn update_frequencies(&mut self, progress: &dyn ProgressSink) -> Result<StageReport<FoldSummary>, OmegaError> {
        let base = self.frequency_table()?;
        let checkpoint = base.as_ref().map_or(0, |t| t.last_draw());
        let new_draws = db::fetch_draws_after(&self.conn, checkpoint)?;
        if new_draws.is_empty() {
            if base.is_none() {
                return Err(OmegaError::NoDraws);
            }
            return Ok(StageReport::skipped(format!(
                "Las frecuencias ya están actualizadas (sorteo {checkpoint})."
            )));
        }

        log::info!("Actualizando frecuencias con {} sorteos nuevos", new_draws.len());
        progress.report(10, &format!("Procesando {} sorteos nuevos...", new_draws.len()));
        let mut table = base.map_or_else(|| FrequencyTable::new(self.game.k), |t| (*t).clone());
        let summary = table.fold(&new_draws, self.game);
        store::save_frequencies(&self.paths.frequencies(), self.game, &table)?;
        progress.report(90, "Frecuencias guardadas");

        let mut state = self.state();
        state.last_draw_for_frequencies = table.last_draw();
        state.last_draw_in_db = state.last_draw_in_db.max(table.last_draw());
        store::save_state(&self.paths.state(), &state)?;
        self.cache.invalidate();
        self.cache.set_table(table);
        progress.report(100, "Frecuencias actualizadas");

        Ok(StageReport::done(
            format!(
                "Frecuencias actualizadas hasta el sorteo {} ({} sorteos procesados, {} omitidos).",
                summary.last_draw, summary.folded, summary.skipped
            ),
            summary,
        ))
    }

    /// Optimizes thresholds over the draws already folded into the table. On
    /// infeasibility the stored thresholds are left as they were.
    pub fn optimize_thresholds(
        &mut self,
        force: bool,
        progress: &dyn ProgressSink,
    ) -> Result<StageReport<OptimizationReport>, OmegaError> {
        let table = self.require_table()?;
        let mut state = self.state();
        if !force && state.last_draw_for_optimization > 0 && state.last_draw_for_optimization == table.last_draw() {
            return Ok(StageReport::skipped(format!(
                "Los umbrales ya están optimizados para el sorteo {}.",
                table.last_draw()
            )));
        }
        let checkpoint = table.last_draw();
        let draws: Vec<Draw> = self
            .draws()?
            .into_iter()
            .filter(|d| d.sequence <= checkpoint)
            .collect();

        let report = optimize(&draws, &table, self.game, &self.config, &self.exec, progress)?;
        store::save_thresholds(&self.paths.thresholds(), &report.best.thresholds)?;
        state.last_draw_for_optimization = checkpoint;
        store::save_state(&self.paths.state(), &state)?;

        let t = report.best.thresholds;
        Ok(StageReport::done(
            format!(
                "Umbrales óptimos: pares {}, tercias {}, cuartetos {} (CH {:.2}%, CU {:.4}%).",
                t.pares,
                t.tercias,
                t.cuartetos,
                report.best.historical_coverage * 100.0,
                report.best.universal_coverage * 100.0
            ),
            report,
        ))
    }

    /// Classifies the whole universe with the optimized thresholds and replaces the stored Omega Class.
    pub fn pregenerate_omega_class(
        &mut self,
        force: bool,
        progress: &dyn ProgressSink,
    ) -> Result<StageReport<ClassificationReport>, OmegaError> {
        let table = self.require_table()?;
        let thresholds = store::load_thresholds(&self.paths.thresholds())?.ok_or(OmegaError::MissingThresholds)?;
        let mut state = self.state();
        if !force
            && state.last_draw_for_optimization > 0
            && state.last_draw_for_optimization == state.last_draw_for_omega_class
        {
            return Ok(StageReport::skipped(format!(
                "La Clase Omega ya refleja la optimización del sorteo {}.",
                state.last_draw_for_omega_class
            )));
        }

        let historical = self.historical_set()?;
        let report = classify_universe(
            self.game,
            &table,
            &thresholds,
            &historical,
            &self.config,
            &self.exec,
            progress,
        )?;
        let stored = db::replace_omega_class(&self.conn, &report.members)?;
        log::info!("{stored} combinaciones Omega guardadas");
        if report.is_complete() {
            state.last_draw_for_omega_class = state.last_draw_for_optimization;
            store::save_state(&self.paths.state(), &state)?;
        } else {
            log::warn!("Clase Omega incompleta; la etapa queda pendiente");
        }

        Ok(StageReport::done(pregeneration_message(&report), report))
    }

    /// Scores every historical draw against the current thresholds.
    pub fn enrich_history(&mut self, progress: &dyn ProgressSink) -> Result<StageReport<EnrichmentReport>, OmegaError> {
        let table = self.require_table()?;
        let (thresholds, source) = self.current_thresholds()?;
        let draws = self.draws()?;
        let report = enrich_history(&draws, self.game, &table, &thresholds, &self.config, &self.exec, progress)?;
        db::replace_draw_scores(&self.conn, &report.scores)?;
        Ok(StageReport::done(
            format!(
                "Historial enriquecido: {} sorteos, {} Omega (umbrales {}).",
                report.scores.len(),
                report.omega_count(),
                source.label()
            ),
            report,
        ))
    }

    pub fn run_trajectory(
        &mut self,
        progress: &dyn ProgressSink,
    ) -> Result<StageReport<Vec<TrajectoryRecord>>, OmegaError> {
        let draws = self.draws()?;
        let records = run_trajectory(&draws, self.game, &self.config, &self.exec, progress)?;
        db::replace_trajectory(&self.conn, &records)?;
        let infeasible = records.iter().filter(|r| r.thresholds.is_none()).count();
        Ok(StageReport::done(
            format!(
                "Trayectoria calculada: {} puntos de control ({} sin candidatos viables).",
                records.len(),
                infeasible
            ),
            records,
        ))
    }

    /// Frequencies, optimization, pre-generation and enrichment in order,
    /// stopping at the first failure. Returns each stage's message.
    pub fn run_full_pipeline(&mut self, force: bool, progress: &dyn ProgressSink) -> Result<Vec<String>, OmegaError> {
        log::info!("Pipeline completo para {}", self.game.display_name);
        self.sync_state()?;
        let mut messages = Vec::with_capacity(4);
        messages.push(self.update_frequencies(progress)?.message);
        messages.push(self.optimize_thresholds(force, progress)?.message);
        messages.push(self.pregenerate_omega_class(force, progress)?.message);
        messages.push(self.enrich_history(progress)?.message);
        Ok(messages)
    }

    pub fn evaluate(&mut self, numbers: &[u8]) -> Result<(Evaluation, ThresholdSource), OmegaError> {
        let table = self.require_table()?;
        let (thresholds, source) = self.current_thresholds()?;
        let historical = self.historical_set()?;
        let eval = evaluate_combination(numbers, self.game, &table, &thresholds, &historical)?;
        Ok((eval, source))
    }

    pub fn deconstruct(&mut self, numbers: &[u8]) -> Result<Deconstruction, OmegaError> {
        let table = self.require_table()?;
        deconstruct_affinity(numbers, self.game, &table)
    }
}

fn pregeneration_message(report: &ClassificationReport) -> String {
    let mut message = format!(
        "Clase Omega pre-generada: {} de {} combinaciones ({} nunca sorteadas).",
        report.members.len(),
        report.universe,
        report.unplayed()
    );
    if !report.is_complete() {
        message.push_str(&format!(
            " ATENCIÓN: {} de {} lotes fallaron; la Clase Omega está incompleta y debe regenerarse.",
            report.failed_chunks, report.chunks
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameId;
    use crate::frequency::tests::draw;
    use crate::progress::NoProgress;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("zenlotto-pipeline-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn pipeline(name: &str, draws: &[Draw]) -> Pipeline {
        let conn = Connection::open_in_memory().unwrap();
        let p = Pipeline::with_connection(
            GameId::Mini.config(),
            GamePaths::new(temp_dir(name)),
            EngineConfig {
                mc_samples: 300,
                ..EngineConfig::default()
            },
            conn,
            Executor::new(2).unwrap(),
        )
        .unwrap();
        for d in draws {
            db::insert_draw(p.conn(), d).unwrap();
        }
        p
    }

    fn sample_draws() -> Vec<Draw> {
        vec![
            draw(1, &[1, 2, 3]),
            draw(2, &[1, 2, 4]),
            draw(3, &[2, 3, 5]),
            draw(4, &[1, 3, 6]),
            draw(5, &[1, 2, 5]),
        ]
    }

    #[test]
    fn test_full_pipeline_then_noop() {
        let mut p = pipeline("full", &sample_draws());
        let messages = p.run_full_pipeline(false, &NoProgress).unwrap();
        assert_eq!(messages.len(), 4);

        let state = p.state();
        assert_eq!(state.last_draw_in_db, 5);
        assert_eq!(state.last_draw_for_frequencies, 5);
        assert_eq!(state.last_draw_for_optimization, 5);
        assert_eq!(state.last_draw_for_omega_class, 5);

        let (_, source) = p.current_thresholds().unwrap();
        assert_eq!(source, ThresholdSource::Optimized);
        assert!(db::count_omega_class(p.conn()).unwrap() > 0);
        assert_eq!(db::fetch_draw_scores(p.conn()).unwrap().len(), 5);

        assert!(p.update_frequencies(&NoProgress).unwrap().is_noop());
        assert!(p.optimize_thresholds(false, &NoProgress).unwrap().is_noop());
        assert!(p.pregenerate_omega_class(false, &NoProgress).unwrap().is_noop());
        assert!(!p.optimize_thresholds(true, &NoProgress).unwrap().is_noop());
    }

    #[test]
    fn test_incremental_update_matches_rebuild() {
        let draws = sample_draws();
        let mut p = pipeline("incremental", &draws[..3]);
        p.update_frequencies(&NoProgress).unwrap();
        for d in &draws[3..] {
            db::insert_draw(p.conn(), d).unwrap();
        }
        p.sync_state().unwrap();
        let report = p.update_frequencies(&NoProgress).unwrap();
        assert_eq!(report.output.unwrap().folded, 2);

        let mut fresh = pipeline("rebuild", &draws);
        fresh.update_frequencies(&NoProgress).unwrap();
        assert_eq!(
            *p.frequency_table().unwrap().unwrap(),
            *fresh.frequency_table().unwrap().unwrap()
        );
    }

    #[test]
    fn test_pregenerate_requires_optimized_thresholds() {
        let mut p = pipeline("no-thresholds", &sample_draws());
        assert!(matches!(
            p.pregenerate_omega_class(false, &NoProgress),
            Err(OmegaError::MissingFrequencies)
        ));
        p.update_frequencies(&NoProgress).unwrap();
        assert!(matches!(
            p.pregenerate_omega_class(false, &NoProgress),
            Err(OmegaError::MissingThresholds)
        ));
    }

    #[test]
    fn test_default_thresholds_before_optimizing() {
        let mut p = pipeline("defaults", &sample_draws());
        let (t, source) = p.current_thresholds().unwrap();
        assert_eq!(source, ThresholdSource::Default);
        assert_eq!(t, GameId::Mini.config().default_thresholds);

        p.update_frequencies(&NoProgress).unwrap();
        let (eval, source) = p.evaluate(&[3, 2, 1]).unwrap();
        assert_eq!(source, ThresholdSource::Default);
        assert!(eval.has_appeared);
    }

    #[test]
    fn test_empty_database() {
        let mut p = pipeline("empty", &[]);
        assert!(matches!(p.update_frequencies(&NoProgress), Err(OmegaError::NoDraws)));
        assert!(matches!(
            p.optimize_thresholds(false, &NoProgress),
            Err(OmegaError::MissingFrequencies)
        ));
    }

    #[test]
    fn test_infeasible_keeps_stored_thresholds() {
        let mut p = pipeline("infeasible", &sample_draws());
        p.update_frequencies(&NoProgress).unwrap();
        store::save_thresholds(&p.paths().thresholds(), &Thresholds::new(2, 0, 0)).unwrap();
        p.config = EngineConfig {
            min_historical_coverage: 1.0,
            percentile_start: 0.9,
            percentile_stop: 1.0,
            percentile_step: 0.05,
            ..p.config.clone()
        };
        let result = p.optimize_thresholds(true, &NoProgress);
        assert!(matches!(result, Err(OmegaError::NoViableCandidate { .. })));
        assert_eq!(p.current_thresholds().unwrap().0, Thresholds::new(2, 0, 0));
        assert_eq!(p.state().last_draw_for_optimization, 0);
    }

    #[test]
    fn test_forced_pregeneration_then_new_optimization() {
        let mut p = pipeline("forced", &sample_draws());
        p.run_full_pipeline(false, &NoProgress).unwrap();
        for d in [
            draw(6, &[4, 5, 6]),
            draw(7, &[1, 5, 6]),
            draw(8, &[2, 4, 6]),
            draw(9, &[3, 4, 5]),
            draw(10, &[1, 4, 6]),
            draw(11, &[2, 5, 6]),
        ] {
            db::insert_draw(p.conn(), &d).unwrap();
        }
        p.sync_state().unwrap();
        p.update_frequencies(&NoProgress).unwrap();

        // thresholds still come from draw 5, so the class is tagged with 5
        assert!(!p.pregenerate_omega_class(true, &NoProgress).unwrap().is_noop());
        assert_eq!(p.state().last_draw_for_omega_class, 5);

        assert!(!p.optimize_thresholds(false, &NoProgress).unwrap().is_noop());
        assert_eq!(p.state().last_draw_for_optimization, 11);
        assert!(!p.pregenerate_omega_class(false, &NoProgress).unwrap().is_noop());
        assert_eq!(p.state().last_draw_for_omega_class, 11);
        assert!(p.pregenerate_omega_class(false, &NoProgress).unwrap().is_noop());
    }

    #[test]
    fn test_pregeneration_message_flags_failed_chunks() {
        let mut report = ClassificationReport {
            members: Vec::new(),
            universe: 20,
            chunks: 4,
            failed_chunks: 0,
            elapsed_ms: 0,
        };
        assert!(!pregeneration_message(&report).contains("lotes fallaron"));
        report.failed_chunks = 1;
        assert!(!report.is_complete());
        assert!(pregeneration_message(&report).contains("1 de 4 lotes fallaron"));
    }
}
