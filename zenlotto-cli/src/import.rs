use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use zenlotto_db::rusqlite::Connection;

use zenlotto_db::db::insert_draw;
use zenlotto_db::models::Draw;
use zenlotto_omega::config::GameConfig;

/// `dd/mm/yyyy` (as published) to ISO `yyyy-mm-dd`.
pub fn parse_date(raw: &str) -> Result<String> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d"))
        .with_context(|| format!("Fecha inválida: '{}'", raw))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Jackpot amounts may carry `$`, thousands separators or decimals; anything unparsable is 0.
pub fn parse_jackpot(raw: &str) -> i64 {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse::<f64>().map(|v| v as i64).unwrap_or(0)
}

/// Column positions resolved from the CSV header.
struct Columns {
    sequence: usize,
    results: Vec<usize>,
    jackpot: Option<usize>,
    date: usize,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord, game: &GameConfig) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let mut missing = Vec::new();
        let mut require = |name: &str| {
            let idx = find(name);
            if idx.is_none() {
                missing.push(name.to_string());
            }
            idx.unwrap_or(0)
        };
        let sequence = require("CONCURSO");
        let date = require("FECHA");
        let results: Vec<usize> = game.result_columns.iter().map(|c| require(c)).collect();
        if !missing.is_empty() {
            bail!("Faltan las columnas {:?}", missing);
        }
        if find("BOLSA").is_none() {
            log::warn!("La columna BOLSA no existe; se usará 0");
        }
        Ok(Self {
            sequence,
            results,
            jackpot: find("BOLSA"),
            date,
        })
    }

    fn parse(&self, record: &csv::StringRecord) -> Result<Draw> {
        let get = |idx: usize| -> Result<&str> {
            record
                .get(idx)
                .map(str::trim)
                .with_context(|| format!("Campo faltante en el índice {}", idx))
        };
        let sequence_raw = get(self.sequence)?;
        let sequence = sequence_raw
            .parse::<u32>()
            .with_context(|| format!("Concurso inválido: '{}'", sequence_raw))?;
        let numbers = self
            .results
            .iter()
            .map(|&idx| {
                let s = get(idx)?;
                s.parse::<u8>()
                    .with_context(|| format!("Resultado no numérico '{}' (índice {})", s, idx))
            })
            .collect::<Result<Vec<u8>>>()?;
        let jackpot = match self.jackpot {
            Some(idx) => parse_jackpot(get(idx).unwrap_or_default()),
            None => 0,
        };
        Ok(Draw {
            sequence,
            date: parse_date(get(self.date)?)?,
            numbers,
            jackpot,
        })
    }
}

#[derive(Debug, Default)]
pub struct ImportResult {
    pub total_records: u32,
    pub inserted: u32,
    pub duplicates: u32,
    pub filtered: u32,
    pub invalid: u32,
}

/// Imports every record of `path` with a sequence greater than `after`, in one transaction.
pub fn import_csv(conn: &Connection, path: &Path, game: &GameConfig, after: u32) -> Result<ImportResult> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir {:?}", path))?;
    let headers = reader.headers().context("No se pudo leer el encabezado")?.clone();
    let columns = Columns::resolve(&headers, game)?;

    let tx = conn
        .unchecked_transaction()
        .context("No se pudo iniciar la transacción")?;
    let mut result = ImportResult::default();

    for record_result in reader.records() {
        result.total_records += 1;
        let draw = match record_result
            .context("Registro ilegible")
            .and_then(|record| columns.parse(&record))
        {
            Ok(draw) => draw,
            Err(e) => {
                log::warn!("Línea {} descartada: {:#}", result.total_records, e);
                result.invalid += 1;
                continue;
            }
        };
        if draw.sequence <= after {
            result.filtered += 1;
            continue;
        }
        if insert_draw(&tx, &draw)? {
            result.inserted += 1;
        } else {
            result.duplicates += 1;
        }
    }

    tx.commit().context("Falló el commit")?;
    log::info!(
        "Importación de {:?}: {} insertados, {} duplicados, {} inválidos",
        path,
        result.inserted,
        result.duplicates,
        result.invalid
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zenlotto_db::db::{count_draws, fetch_draws, migrate};
    use zenlotto_omega::config::GameId;

    fn write_csv(name: &str, body: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("zenlotto-import-{}-{name}.csv", std::process::id()));
        std::fs::write(&path, body).unwrap();
        path
    }

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("17/02/2026").unwrap(), "2026-02-17");
        assert_eq!(parse_date("1/3/2020").unwrap(), "2020-03-01");
        assert_eq!(parse_date("2020-03-01").unwrap(), "2020-03-01");
        assert!(parse_date("31/02/2020").is_err());
    }

    #[test]
    fn test_parse_jackpot() {
        assert_eq!(parse_jackpot("5000000"), 5_000_000);
        assert_eq!(parse_jackpot("$5,000,000.00"), 5_000_000);
        assert_eq!(parse_jackpot(""), 0);
        assert_eq!(parse_jackpot("n/d"), 0);
    }

    #[test]
    fn test_import_skips_invalid_and_duplicates() {
        let game = GameId::MelateRetro.config();
        let path = write_csv(
            "basic",
            "NPRODUCTO,CONCURSO,F1,F2,F3,F4,F5,F6,BOLSA,FECHA\n\
             45,3,1,5,9,20,33,39,5000000,10/01/2024\n\
             45,2,2,6,10,21,34,38,5000000,06/01/2024\n\
             45,1,3,7,x,22,35,37,5000000,03/01/2024\n\
             45,3,1,5,9,20,33,39,5000000,10/01/2024\n",
        );
        let conn = conn();
        let result = import_csv(&conn, &path, game, 0).unwrap();
        assert_eq!(result.total_records, 4);
        assert_eq!(result.inserted, 2);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.invalid, 1);

        let draws = fetch_draws(&conn).unwrap();
        assert_eq!(draws[0].sequence, 2);
        assert_eq!(draws[0].date, "2024-01-06");
        assert_eq!(draws[1].numbers, vec![1, 5, 9, 20, 33, 39]);
    }

    #[test]
    fn test_import_after_filter() {
        let game = GameId::Mini.config();
        let path = write_csv(
            "after",
            "CONCURSO,F1,F2,F3,FECHA\n1,1,2,3,01/01/2024\n2,1,2,4,02/01/2024\n3,2,3,5,03/01/2024\n",
        );
        let conn = conn();
        let result = import_csv(&conn, &path, game, 1).unwrap();
        assert_eq!(result.inserted, 2);
        assert_eq!(result.filtered, 1);
        assert_eq!(count_draws(&conn).unwrap(), 2);
        assert_eq!(fetch_draws(&conn).unwrap()[0].jackpot, 0);
    }

    #[test]
    fn test_import_missing_columns() {
        let game = GameId::MelateRetro.config();
        let path = write_csv("missing", "CONCURSO,F1,F2,FECHA\n1,1,2,01/01/2024\n");
        let err = import_csv(&conn(), &path, game, 0).unwrap_err();
        assert!(err.to_string().contains("F3"));
    }
}
