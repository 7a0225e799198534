mod display;
mod import;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use zenlotto_db::db::{
    count_draws, count_omega_class, fetch_last_draws, fetch_omega_class, fetch_trajectory, find_closest_omega,
    omega_class_scores, random_unplayed_omega,
};
use zenlotto_omega::combinatorics::Combo;
use zenlotto_omega::config::{EngineConfig, GameId, GamePaths};
use zenlotto_omega::display as omega_display;
use zenlotto_omega::pipeline::Pipeline;

use crate::display::{display_draws, display_import_summary, display_omega_members, display_omega_summary};

#[derive(Parser)]
#[command(name = "zenlotto", about = "Clasificador Omega para loterías mexicanas")]
struct Cli {
    /// Juego
    #[arg(short, long, global = true, default_value = "melate_retro")]
    game: GameId,
    /// Directorio de datos (por defecto ./data/<juego>)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Importar sorteos desde un archivo CSV
    Import {
        /// Ruta al archivo CSV
        #[arg(short, long)]
        file: PathBuf,
        /// Importar solo concursos posteriores a este
        #[arg(long, default_value = "0")]
        after: u32,
    },

    /// Mostrar la ruta de la base de datos
    DbPath,

    /// Listar los últimos sorteos
    List {
        #[arg(short, long, default_value = "10")]
        last: u32,
    },

    /// Estado de las etapas y umbrales vigentes
    Status,

    /// Evaluar una combinación contra los umbrales vigentes
    Evaluate {
        #[arg(required = true, num_args = 1..)]
        numbers: Vec<u8>,
        /// Salida en JSON
        #[arg(long)]
        json: bool,
    },

    /// Desglosar la afinidad de una combinación por subsecuencia
    Deconstruct {
        #[arg(required = true, num_args = 1..)]
        numbers: Vec<u8>,
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Sugerir combinaciones Omega nunca sorteadas
    Generate {
        #[arg(short, long, default_value = "5")]
        count: usize,
    },

    /// Buscar una combinación Omega que comparta exactamente M números
    Closest {
        #[arg(required = true, num_args = 1..)]
        numbers: Vec<u8>,
        #[arg(short, long)]
        matches: usize,
    },

    /// Resumen de la Clase Omega almacenada
    Omega {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Mostrar la trayectoria de umbrales almacenada
    Trajectory,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let paths = match cli.data_dir {
        Some(dir) => GamePaths::new(dir),
        None => GamePaths::for_game(cli.game),
    };
    let game = cli.game.config();
    let mut pipeline = Pipeline::open(game, paths, EngineConfig::default())?;

    match cli.command {
        Command::Import { file, after } => {
            let result = import::import_csv(pipeline.conn(), &file, game, after)?;
            display_import_summary(&result);
            let state = pipeline.sync_state()?;
            println!("Último concurso en base: {}", state.last_draw_in_db);
        }
        Command::DbPath => println!("{}", pipeline.paths().db().display()),
        Command::List { last } => {
            if count_draws(pipeline.conn())? == 0 {
                println!("Base vacía. Ejecute primero: zenlotto import --file <csv>");
                return Ok(());
            }
            display_draws(&fetch_last_draws(pipeline.conn(), last)?);
        }
        Command::Status => {
            let state = pipeline.sync_state()?;
            println!("{} ({} sorteos)", game.display_name, count_draws(pipeline.conn())?);
            omega_display::display_state(&state);
            let (t, source) = pipeline.current_thresholds()?;
            println!(
                "Umbrales {}: pares {}, tercias {}, cuartetos {}",
                source.label(),
                t.pares,
                t.tercias,
                t.cuartetos
            );
            println!("Clase Omega: {} combinaciones", count_omega_class(pipeline.conn())?);
        }
        Command::Evaluate { numbers, json } => {
            let (eval, source) = pipeline.evaluate(&numbers)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&eval)?);
            } else {
                omega_display::display_evaluation(&eval, source);
            }
        }
        Command::Deconstruct { numbers, top } => {
            let d = pipeline.deconstruct(&numbers)?;
            omega_display::display_deconstruction(&d, top);
        }
        Command::Generate { count } => {
            let mut members = Vec::with_capacity(count);
            for _ in 0..count {
                match random_unplayed_omega(pipeline.conn())? {
                    Some(m) if !members.contains(&m) => members.push(m),
                    Some(_) => {}
                    None => break,
                }
            }
            if members.is_empty() {
                println!("No hay combinaciones Omega disponibles. Ejecute la pre-generación.");
                return Ok(());
            }
            display_omega_members("Combinaciones Omega sugeridas", &members);
        }
        Command::Closest { numbers, matches } => {
            let combo = zenlotto_omega::evaluation::validate_combination(&numbers, game)?;
            if matches > game.n {
                bail!("Se pueden compartir como máximo {} números", game.n);
            }
            match find_closest_omega(pipeline.conn(), combo.as_slice(), matches)? {
                Some(m) => {
                    let shared = Combo::new(&m.numbers).map_or(0, |c| c.shared(&combo));
                    display_omega_members(
                        &format!("Combinación Omega con {shared} números en común"),
                        &[m],
                    );
                }
                None => println!("Ninguna combinación Omega no sorteada comparte exactamente {matches} números."),
            }
        }
        Command::Omega { limit } => {
            display_omega_summary(&omega_class_scores(pipeline.conn())?);
            let members = fetch_omega_class(pipeline.conn())?;
            let shown: Vec<_> = members.into_iter().take(limit).collect();
            display_omega_members("Primeras combinaciones Omega", &shown);
        }
        Command::Trajectory => {
            let records = fetch_trajectory(pipeline.conn())?;
            if records.is_empty() {
                println!("Sin trayectoria. Ejecute: zenlotto-omega trajectory");
                return Ok(());
            }
            omega_display::display_trajectory(&records);
        }
    }

    Ok(())
}
