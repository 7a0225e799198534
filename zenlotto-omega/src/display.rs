use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use zenlotto_db::models::{LevelStats, TrajectoryRecord};

use crate::classifier::ClassificationReport;
use crate::config::Level;
use crate::enrichment::EnrichmentReport;
use crate::evaluation::{Deconstruction, Evaluation};
use crate::optimizer::OptimizationReport;
use crate::pipeline::ThresholdSource;
use crate::store::PipelineState;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Unicode bar of `fraction / scale`, `width` cells wide.
fn bar(fraction: f64, scale: f64, width: usize) -> String {
    if scale <= 0.0 {
        return String::new();
    }
    let filled = ((fraction / scale).clamp(0.0, 1.0) * width as f64).round() as usize;
    "█".repeat(filled)
}

fn pct(x: f64) -> String {
    format!("{:.2}%", x * 100.0)
}

pub fn display_optimization(report: &OptimizationReport, top_n: usize) {
    println!(
        "\n== Optimización: {} escenarios, {} viables, {} sorteos ({} ms) ==\n",
        report.scenarios,
        report.candidates.len(),
        report.draws_scored,
        report.elapsed_ms
    );

    let mut table = new_table(vec!["#", "P pares", "P tercias", "P cuartetos", "Umbrales", "CH", "CU"]);
    for (i, c) in report.candidates.iter().take(top_n).enumerate() {
        let t = c.thresholds;
        let row = vec![
            format!("{}", i + 1),
            format!("{:.2}", c.percentiles[0]),
            format!("{:.2}", c.percentiles[1]),
            format!("{:.2}", c.percentiles[2]),
            format!("{} / {} / {}", t.pares, t.tercias, t.cuartetos),
            pct(c.historical_coverage),
            format!("{:.4}%", c.universal_coverage * 100.0),
        ];
        if i == 0 {
            table.add_row(row.iter().map(|s| Cell::new(s).fg(Color::Green)).collect::<Vec<_>>());
        } else {
            table.add_row(row);
        }
    }
    println!("{table}");

    if report.failed_batches > 0 {
        println!("Atención: {} lotes fallaron y se omitieron.", report.failed_batches);
    }
}

pub fn display_classification(report: &ClassificationReport) {
    let share = report.members.len() as f64 / report.universe.max(1) as f64;
    println!("\n== Clase Omega ==\n");
    let mut table = new_table(vec!["Universo", "Omega", "Nunca sorteadas", "Proporción", "Lotes", "ms"]);
    table.add_row(vec![
        Cell::new(report.universe),
        Cell::new(report.members.len()).fg(Color::Green),
        Cell::new(report.unplayed()),
        Cell::new(format!("{:.4}%", share * 100.0)),
        Cell::new(format!("{}/{}", report.chunks - report.failed_chunks, report.chunks)),
        Cell::new(report.elapsed_ms),
    ]);
    println!("{table}");
}

pub fn display_enrichment(report: &EnrichmentReport, last_n: usize) {
    println!(
        "\n== Historial enriquecido: {} Omega de {} ==\n",
        report.omega_count(),
        report.scores.len()
    );
    let mut table = new_table(vec!["Sorteo", "Omega", "Omega Score", "Pares", "Tercias", "Cuartetos"]);
    for s in report.scores.iter().rev().take(last_n) {
        let (label, color) = if s.is_omega {
            ("sí", Color::Green)
        } else {
            ("no", Color::Red)
        };
        table.add_row(vec![
            Cell::new(s.sequence),
            Cell::new(label).fg(color),
            Cell::new(format!("{:.4}", s.omega_score)),
            Cell::new(s.affinity_pares),
            Cell::new(s.affinity_tercias),
            Cell::new(s.affinity_cuartetos),
        ]);
    }
    println!("{table}");
}

pub fn display_trajectory(records: &[TrajectoryRecord]) {
    println!("\n== Trayectoria de umbrales ({} puntos) ==\n", records.len());
    let max_cu = records
        .iter()
        .filter_map(|r| r.universal_coverage)
        .fold(0.0f64, f64::max);

    let mut table = new_table(vec!["Sorteo", "Sorteos", "Umbrales", "CH", "CU", ""]);
    for r in records {
        match (r.thresholds, r.historical_coverage, r.universal_coverage) {
            (Some(t), Some(hc), Some(uc)) => {
                table.add_row(vec![
                    Cell::new(r.last_draw),
                    Cell::new(r.draws_used),
                    Cell::new(format!("{} / {} / {}", t[0], t[1], t[2])),
                    Cell::new(pct(hc)),
                    Cell::new(format!("{:.4}%", uc * 100.0)),
                    Cell::new(bar(uc, max_cu, 30)).fg(Color::Cyan),
                ]);
            }
            _ => {
                table.add_row(vec![
                    Cell::new(r.last_draw),
                    Cell::new(r.draws_used),
                    Cell::new("sin candidatos").fg(Color::Red),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new(""),
                ]);
            }
        }
    }
    println!("{table}");

    if let Some(last) = records.last() {
        println!("\n-- Afinidades históricas en el sorteo {} --", last.last_draw);
        display_level_stats(&last.affinities);
    }
}

fn display_level_stats(stats: &[LevelStats; 3]) {
    let mut table = new_table(vec!["Nivel", "Media", "Mediana", "Mín", "Máx"]);
    for level in Level::ALL {
        let s = &stats[level.index()];
        table.add_row(vec![
            Cell::new(level),
            Cell::new(format!("{:.2}", s.mean)),
            Cell::new(format!("{:.1}", s.median)),
            Cell::new(s.min),
            Cell::new(s.max),
        ]);
    }
    println!("{table}");
}

pub fn display_evaluation(eval: &Evaluation, source: ThresholdSource) {
    let combo = eval
        .combination
        .iter()
        .map(|n| format!("{n:2}"))
        .collect::<Vec<_>>()
        .join(" - ");
    println!("\n== Evaluación de [{combo}] (umbrales {}) ==\n", source.label());

    let mut table = new_table(vec!["Nivel", "Afinidad", "Umbral", "Cumple"]);
    for c in &eval.criteria {
        let (label, color) = if c.passes { ("sí", Color::Green) } else { ("no", Color::Red) };
        table.add_row(vec![
            Cell::new(c.level),
            Cell::new(c.score),
            Cell::new(c.threshold),
            Cell::new(label).fg(color),
        ]);
    }
    println!("{table}");

    if eval.is_omega {
        println!("Combinación OMEGA, Omega Score {:.4}", eval.omega_score);
    } else {
        println!("No pertenece a la Clase Omega, Omega Score {:.4}", eval.omega_score);
    }
    if eval.has_appeared {
        println!("Esta combinación ya salió en un sorteo histórico.");
    }
}

pub fn display_deconstruction(d: &Deconstruction, top_n: usize) {
    println!("\n== Deconstrucción de afinidad ==\n");
    for level in Level::ALL {
        let subs = &d.breakdown[level.index()];
        if subs.is_empty() {
            continue;
        }
        println!("-- {} (total {}) --", level, d.totals[level.index()]);
        let max = subs.first().map_or(0, |s| s.frequency) as f64;
        let mut table = new_table(vec!["Subsecuencia", "Frecuencia", ""]);
        for s in subs.iter().take(top_n) {
            let key = s.numbers.iter().map(|n| n.to_string()).collect::<Vec<_>>().join("-");
            let color = if s.frequency == 0 { Color::Red } else { Color::White };
            table.add_row(vec![
                Cell::new(key),
                Cell::new(s.frequency).fg(color),
                Cell::new(bar(s.frequency as f64, max, 20)).fg(Color::Cyan),
            ]);
        }
        println!("{table}");
    }
}

pub fn display_state(state: &PipelineState) {
    let mut table = new_table(vec!["Etapa", "Último sorteo"]);
    let stale = |v: u32| if v < state.last_draw_in_db { Color::Yellow } else { Color::Green };
    table.add_row(vec![Cell::new("Base de datos"), Cell::new(state.last_draw_in_db)]);
    for (label, value) in [
        ("Frecuencias", state.last_draw_for_frequencies),
        ("Optimización", state.last_draw_for_optimization),
        ("Clase Omega", state.last_draw_for_omega_class),
    ] {
        table.add_row(vec![Cell::new(label), Cell::new(value).fg(stale(value))]);
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_scaling() {
        assert_eq!(bar(0.5, 1.0, 10).chars().count(), 5);
        assert_eq!(bar(2.0, 1.0, 10).chars().count(), 10);
        assert!(bar(1.0, 0.0, 10).is_empty());
    }
}
