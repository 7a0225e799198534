use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::OmegaError;

/// Subsequence sizes scored by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Pares,
    Tercias,
    Cuartetos,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Pares, Level::Tercias, Level::Cuartetos];

    pub fn size(self) -> usize {
        match self {
            Level::Pares => 2,
            Level::Tercias => 3,
            Level::Cuartetos => 4,
        }
    }

    pub fn index(self) -> usize {
        self.size() - 2
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::Pares => "pares",
            Level::Tercias => "tercias",
            Level::Cuartetos => "cuartetos",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One integer cutoff per affinity level. A combination is Omega iff it meets all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    pub pares: u64,
    pub tercias: u64,
    pub cuartetos: u64,
}

impl Thresholds {
    pub const fn new(pares: u64, tercias: u64, cuartetos: u64) -> Self {
        Self { pares, tercias, cuartetos }
    }

    pub fn from_array(values: [u64; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }

    pub fn as_array(&self) -> [u64; 3] {
        [self.pares, self.tercias, self.cuartetos]
    }

    pub fn get(&self, level: Level) -> u64 {
        self.as_array()[level.index()]
    }

    pub fn admits(&self, affinities: &[u64; 3]) -> bool {
        affinities[0] >= self.pares && affinities[1] >= self.tercias && affinities[2] >= self.cuartetos
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    #[clap(name = "melate_retro")]
    MelateRetro,
    Melate,
    Revanchita,
    Mini,
}

impl GameId {
    pub fn as_str(self) -> &'static str {
        match self {
            GameId::MelateRetro => "melate_retro",
            GameId::Melate => "melate",
            GameId::Revanchita => "revanchita",
            GameId::Mini => "mini",
        }
    }

    pub fn config(self) -> &'static GameConfig {
        match self {
            GameId::MelateRetro => &GAMES[0],
            GameId::Melate => &GAMES[1],
            GameId::Revanchita => &GAMES[2],
            GameId::Mini => &GAMES[3],
        }
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameId {
    type Err = OmegaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GAMES
            .iter()
            .find(|g| g.id.as_str() == s.trim())
            .map(|g| g.id)
            .ok_or_else(|| OmegaError::UnknownGame(s.to_string()))
    }
}

/// Static definition of a lottery game.
#[derive(Debug)]
pub struct GameConfig {
    pub id: GameId,
    pub display_name: &'static str,
    /// Numbers per ticket.
    pub n: usize,
    /// Numbers range over `1..=k`.
    pub k: u8,
    pub levels: [Level; 3],
    /// Omega Score weight per level, indexed like [`Level::index`].
    pub score_weights: [f64; 3],
    pub default_thresholds: Thresholds,
    pub result_columns: &'static [&'static str],
}

const SIX_COLUMNS: &[&str] = &["F1", "F2", "F3", "F4", "F5", "F6"];
const WEIGHTS: [f64; 3] = [0.5, 0.3, 0.2];

pub static GAMES: [GameConfig; 4] = [
    GameConfig {
        id: GameId::MelateRetro,
        display_name: "Melate Retro",
        n: 6,
        k: 39,
        levels: Level::ALL,
        score_weights: WEIGHTS,
        default_thresholds: Thresholds::new(45, 3, 0),
        result_columns: SIX_COLUMNS,
    },
    GameConfig {
        id: GameId::Melate,
        display_name: "Melate",
        n: 6,
        k: 56,
        levels: Level::ALL,
        score_weights: WEIGHTS,
        default_thresholds: Thresholds::new(30, 1, 0),
        result_columns: SIX_COLUMNS,
    },
    GameConfig {
        id: GameId::Revanchita,
        display_name: "Revanchita",
        n: 6,
        k: 56,
        levels: Level::ALL,
        score_weights: WEIGHTS,
        default_thresholds: Thresholds::new(30, 1, 0),
        result_columns: SIX_COLUMNS,
    },
    GameConfig {
        id: GameId::Mini,
        display_name: "Mini (pruebas)",
        n: 3,
        k: 6,
        levels: Level::ALL,
        score_weights: WEIGHTS,
        default_thresholds: Thresholds::new(1, 0, 0),
        result_columns: &["F1", "F2", "F3"],
    },
];

pub fn game(id: &str) -> Result<&'static GameConfig, OmegaError> {
    Ok(id.parse::<GameId>()?.config())
}

/// Tunables of the optimizer, the classifier and the trajectory run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub min_historical_coverage: f64,
    pub percentile_start: f64,
    /// Exclusive upper bound of the percentile grid.
    pub percentile_stop: f64,
    pub percentile_step: f64,
    pub mc_samples: usize,
    pub mc_seed: u64,
    pub max_workers: usize,
    pub chunks_per_worker: usize,
    pub trajectory_start: usize,
    pub trajectory_block: usize,
    pub progress_interval_ms: u64,
    pub progress_step: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_historical_coverage: 0.95,
            percentile_start: 0.01,
            percentile_stop: 0.51,
            percentile_step: 0.03,
            mc_samples: 3000,
            mc_seed: 42,
            max_workers: 8,
            chunks_per_worker: 4,
            trajectory_start: 50,
            trajectory_block: 100,
            progress_interval_ms: 2000,
            progress_step: 5,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&json)
            .with_context(|| format!("JSON inválido en {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OmegaError> {
        if !(0.0..=1.0).contains(&self.min_historical_coverage) {
            return Err(OmegaError::InvalidConfig(format!(
                "min_historical_coverage fuera de [0, 1]: {}",
                self.min_historical_coverage
            )));
        }
        if self.percentile_step <= 0.0
            || self.percentile_start < 0.0
            || self.percentile_stop > 1.0 + 1e-9
            || self.percentile_start >= self.percentile_stop
        {
            return Err(OmegaError::InvalidConfig(format!(
                "rejilla de percentiles inválida: [{}, {}) paso {}",
                self.percentile_start, self.percentile_stop, self.percentile_step
            )));
        }
        if self.mc_samples == 0 {
            return Err(OmegaError::InvalidConfig("mc_samples debe ser > 0".to_string()));
        }
        if self.max_workers == 0 || self.chunks_per_worker == 0 {
            return Err(OmegaError::InvalidConfig(
                "max_workers y chunks_per_worker deben ser > 0".to_string(),
            ));
        }
        if self.trajectory_start == 0 || self.trajectory_block == 0 {
            return Err(OmegaError::InvalidConfig(
                "trajectory_start y trajectory_block deben ser > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Percentiles as fractions, `start, start+step, ...` strictly below `stop`.
    pub fn percentile_grid(&self) -> Vec<f64> {
        let count = ((self.percentile_stop - self.percentile_start) / self.percentile_step - 1e-9)
            .ceil()
            .max(0.0) as usize;
        (0..count)
            .map(|i| self.percentile_start + i as f64 * self.percentile_step)
            .collect()
    }

    /// Worker threads: available cores, capped at `max_workers`.
    pub fn worker_count(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cores.min(self.max_workers).max(1)
    }
}

/// Per-game data directory and the files it holds.
#[derive(Debug, Clone)]
pub struct GamePaths {
    dir: PathBuf,
}

impl GamePaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `./data/<game>/`
    pub fn for_game(id: GameId) -> Self {
        Self::new(zenlotto_db::db::data_dir(id.as_str()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn db(&self) -> PathBuf {
        self.dir.join("zenlotto.db")
    }

    pub fn frequencies(&self) -> PathBuf {
        self.dir.join("frequencies.json")
    }

    pub fn thresholds(&self) -> PathBuf {
        self.dir.join("thresholds.json")
    }

    pub fn state(&self) -> PathBuf {
        self.dir.join("state.json")
    }
}
