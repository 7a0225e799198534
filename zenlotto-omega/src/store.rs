use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::combinatorics::Combo;
use crate::config::{GameConfig, Level, Thresholds};
use crate::frequency::FrequencyTable;

/// On-disk shape of a frequency table. Keys are `-`-joined ascending numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FrequencyFile {
    game: String,
    k: u8,
    last_draw: u32,
    pares: BTreeMap<String, u32>,
    tercias: BTreeMap<String, u32>,
    cuartetos: BTreeMap<String, u32>,
}

impl FrequencyFile {
    fn level(&self, level: Level) -> &BTreeMap<String, u32> {
        match level {
            Level::Pares => &self.pares,
            Level::Tercias => &self.tercias,
            Level::Cuartetos => &self.cuartetos,
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("No se pudo crear {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("No se pudo escribir {}", path.display()))?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("No se pudo leer {}", path.display()))?;
    let value = serde_json::from_str(&json)
        .with_context(|| format!("JSON inválido en {}", path.display()))?;
    Ok(Some(value))
}

pub fn save_frequencies(path: &Path, game: &GameConfig, table: &FrequencyTable) -> Result<()> {
    let encode = |level: Level| -> BTreeMap<String, u32> {
        table
            .entries(level)
            .map(|(combo, count)| (combo.to_string(), count))
            .collect()
    };
    let file = FrequencyFile {
        game: game.id.as_str().to_string(),
        k: table.k(),
        last_draw: table.last_draw(),
        pares: encode(Level::Pares),
        tercias: encode(Level::Tercias),
        cuartetos: encode(Level::Cuartetos),
    };
    write_json(path, &file)?;
    log::info!(
        "Frecuencias guardadas en {} (último sorteo {})",
        path.display(),
        table.last_draw()
    );
    Ok(())
}

/// `None` when the file does not exist. Every key is validated against the game.
pub fn load_frequencies(path: &Path, game: &GameConfig) -> Result<Option<FrequencyTable>> {
    let Some(file) = read_json::<FrequencyFile>(path)? else {
        return Ok(None);
    };
    if file.game != game.id.as_str() || file.k != game.k {
        bail!(
            "{} pertenece a {} (k={}), se esperaba {} (k={})",
            path.display(),
            file.game,
            file.k,
            game.id,
            game.k
        );
    }
    let mut table = FrequencyTable::new(game.k);
    for level in Level::ALL {
        for (key, &count) in file.level(level) {
            let combo: Combo = key
                .parse()
                .with_context(|| format!("Clave inválida en {}: {key:?}", level))?;
            if !table.set_count(level, combo.as_slice(), count) {
                bail!("Clave fuera de dominio en {}: {key:?}", level);
            }
        }
    }
    table.set_last_draw(file.last_draw);
    Ok(Some(table))
}

pub fn save_thresholds(path: &Path, thresholds: &Thresholds) -> Result<()> {
    write_json(path, thresholds)?;
    log::info!("Umbrales guardados en {}: {:?}", path.display(), thresholds.as_array());
    Ok(())
}

pub fn load_thresholds(path: &Path) -> Result<Option<Thresholds>> {
    read_json(path)
}

/// Last draw sequence incorporated by each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineState {
    pub last_draw_in_db: u32,
    pub last_draw_for_frequencies: u32,
    pub last_draw_for_optimization: u32,
    pub last_draw_for_omega_class: u32,
}

/// Missing or unreadable state reads as all-zero.
pub fn load_state(path: &Path) -> PipelineState {
    match read_json(path) {
        Ok(Some(state)) => state,
        Ok(None) => PipelineState::default(),
        Err(e) => {
            log::warn!("Estado ilegible, se usa el estado inicial: {e:#}");
            PipelineState::default()
        }
    }
}

pub fn save_state(path: &Path, state: &PipelineState) -> Result<()> {
    write_json(path, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameId;
    use crate::frequency::build;
    use crate::frequency::tests::draw;
    use std::path::PathBuf;

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("zenlotto-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn test_frequencies_persist() {
        let game = GameId::Mini.config();
        let draws = vec![draw(3, &[1, 2, 3]), draw(7, &[2, 3, 5])];
        let (table, _) = build(&draws, game, None);
        let path = temp_file("freq.json");
        save_frequencies(&path, game, &table).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"2-3\": 2"));

        let loaded = load_frequencies(&path, game).unwrap().unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.last_draw(), 7);
    }

    #[test]
    fn test_missing_frequencies_is_none() {
        let path = temp_file("absent.json");
        assert!(load_frequencies(&path, GameId::Mini.config()).unwrap().is_none());
    }

    #[test]
    fn test_rejects_bad_keys() {
        let game = GameId::Mini.config();
        let path = temp_file("bad.json");
        let body = |pares: &str| {
            format!(r#"{{"game":"mini","k":6,"last_draw":1,"pares":{pares},"tercias":{{}},"cuartetos":{{}}}}"#)
        };
        for pares in [r#"{"1-9": 1}"#, r#"{"1-2-3": 1}"#, r#"{"(1, 2)": 1}"#, r#"{"2-1": 1}"#] {
            std::fs::write(&path, body(pares)).unwrap();
            assert!(load_frequencies(&path, game).is_err(), "{pares}");
        }
        std::fs::write(&path, body(r#"{"1-2": 4}"#)).unwrap();
        let table = load_frequencies(&path, game).unwrap().unwrap();
        assert_eq!(table.count(Level::Pares, &[1, 2]), 4);
    }

    #[test]
    fn test_rejects_other_game() {
        let path = temp_file("other.json");
        let game = GameId::Mini.config();
        let (table, _) = build(&[draw(1, &[1, 2, 3])], game, None);
        save_frequencies(&path, game, &table).unwrap();
        assert!(load_frequencies(&path, GameId::MelateRetro.config()).is_err());
    }

    #[test]
    fn test_thresholds_persist() {
        let path = temp_file("thr.json");
        assert!(load_thresholds(&path).unwrap().is_none());
        save_thresholds(&path, &Thresholds::new(52, 4, 1)).unwrap();
        assert_eq!(load_thresholds(&path).unwrap(), Some(Thresholds::new(52, 4, 1)));
    }

    #[test]
    fn test_state_defaults_when_corrupt() {
        let path = temp_file("state.json");
        assert_eq!(load_state(&path), PipelineState::default());
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(load_state(&path), PipelineState::default());

        let state = PipelineState {
            last_draw_in_db: 10,
            last_draw_for_frequencies: 10,
            last_draw_for_optimization: 9,
            last_draw_for_omega_class: 9,
        };
        save_state(&path, &state).unwrap();
        assert_eq!(load_state(&path), state);
    }
}
