use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::import::ImportResult;
use zenlotto_db::models::{Draw, OmegaMember};

fn join_numbers(numbers: &[u8]) -> String {
    numbers
        .iter()
        .map(|n| format!("{:2}", n))
        .collect::<Vec<_>>()
        .join(" - ")
}

pub fn display_draws(draws: &[Draw]) {
    if draws.is_empty() {
        println!("No hay sorteos para mostrar.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Concurso", "Fecha", "Números", "Bolsa"]);

    for draw in draws {
        let jackpot = if draw.jackpot > 0 {
            format!("${}", draw.jackpot)
        } else {
            "—".to_string()
        };
        table.add_row(vec![
            draw.sequence.to_string(),
            draw.date.clone(),
            join_numbers(&draw.sorted_numbers()),
            jackpot,
        ]);
    }

    println!("{table}");
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Importación terminada:");
    println!("  Registros leídos   : {}", result.total_records);
    println!("  Insertados         : {}", result.inserted);
    println!("  Duplicados         : {}", result.duplicates);
    if result.filtered > 0 {
        println!("  Anteriores al filtro: {}", result.filtered);
    }
    if result.invalid > 0 {
        println!("  Inválidos          : {}", result.invalid);
    }
}

pub fn display_omega_members(title: &str, members: &[OmegaMember]) {
    if members.is_empty() {
        println!("No hay combinaciones Omega para mostrar.");
        return;
    }
    println!("\n== {title} ==\n");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Combinación", "Pares", "Tercias", "Cuartetos", "Histórica"]);

    for m in members {
        let (label, color) = if m.has_appeared {
            ("sí", Color::Yellow)
        } else {
            ("no", Color::Green)
        };
        table.add_row(vec![
            Cell::new(join_numbers(&m.numbers)),
            Cell::new(m.affinity_pares),
            Cell::new(m.affinity_tercias),
            Cell::new(m.affinity_cuartetos),
            Cell::new(label).fg(color),
        ]);
    }

    println!("{table}");
}

/// Min / mean / max of each affinity column of the stored Omega Class.
pub fn display_omega_summary(scores: &[[u64; 3]]) {
    if scores.is_empty() {
        println!("La Clase Omega está vacía. Ejecute la pre-generación.");
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Nivel", "Mín", "Media", "Máx"]);

    for (i, name) in ["pares", "tercias", "cuartetos"].iter().enumerate() {
        let column = scores.iter().map(|s| s[i]);
        let min = column.clone().min().unwrap_or(0);
        let max = column.clone().max().unwrap_or(0);
        let mean = column.sum::<u64>() as f64 / scores.len() as f64;
        table.add_row(vec![
            Cell::new(name),
            Cell::new(min),
            Cell::new(format!("{mean:.2}")),
            Cell::new(max),
        ]);
    }

    println!("{table}");
}
