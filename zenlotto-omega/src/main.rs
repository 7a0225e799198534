use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use zenlotto_omega::config::{EngineConfig, GameId, GamePaths};
use zenlotto_omega::display;
use zenlotto_omega::pipeline::Pipeline;
use zenlotto_omega::progress::BarProgress;

#[derive(Parser)]
#[command(name = "zenlotto-omega", about = "Etapas batch del motor Omega")]
struct Cli {
    /// Juego a procesar
    #[arg(short, long, default_value = "melate_retro")]
    game: GameId,
    /// Configuración del motor en JSON (por defecto, valores incorporados)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directorio de datos (por defecto ./data/<juego>)
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Actualizar la tabla de frecuencias con los sorteos nuevos
    Frequencies,
    /// Buscar los umbrales óptimos
    Optimize {
        #[arg(long)]
        force: bool,
        #[arg(long, default_value = "10")]
        top: usize,
    },
    /// Pre-generar la Clase Omega sobre todo el universo
    Pregenerate {
        #[arg(long)]
        force: bool,
    },
    /// Puntuar todos los sorteos históricos
    Enrich {
        #[arg(long, default_value = "20")]
        last: usize,
    },
    /// Trayectoria walk-forward de los umbrales
    Trajectory,
    /// Frecuencias, optimización, pre-generación y enriquecimiento
    Pipeline {
        #[arg(long)]
        force: bool,
    },
    /// Estado de cada etapa
    Status,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let paths = match cli.data_dir {
        Some(dir) => GamePaths::new(dir),
        None => GamePaths::for_game(cli.game),
    };
    let game = cli.game.config();
    let mut pipeline = Pipeline::open(game, paths, config)?;
    let state = pipeline.sync_state()?;
    println!(
        "{}: {} sorteos en base (último {})",
        game.display_name,
        zenlotto_db::db::count_draws(pipeline.conn())?,
        state.last_draw_in_db
    );

    let bar = BarProgress::new();
    match cli.command {
        Command::Frequencies => {
            let report = pipeline.update_frequencies(&bar)?;
            bar.finish();
            println!("{}", report.message);
        }
        Command::Optimize { force, top } => {
            let report = pipeline.optimize_thresholds(force, &bar)?;
            bar.finish();
            if let Some(result) = &report.output {
                display::display_optimization(result, top);
            }
            println!("{}", report.message);
        }
        Command::Pregenerate { force } => {
            let report = pipeline.pregenerate_omega_class(force, &bar)?;
            bar.finish();
            if let Some(result) = &report.output {
                display::display_classification(result);
            }
            println!("{}", report.message);
        }
        Command::Enrich { last } => {
            let report = pipeline.enrich_history(&bar)?;
            bar.finish();
            if let Some(result) = &report.output {
                display::display_enrichment(result, last);
            }
            println!("{}", report.message);
        }
        Command::Trajectory => {
            let report = pipeline.run_trajectory(&bar)?;
            bar.finish();
            if let Some(records) = &report.output {
                display::display_trajectory(records);
            }
            println!("{}", report.message);
        }
        Command::Pipeline { force } => {
            let messages = pipeline.run_full_pipeline(force, &bar)?;
            bar.finish();
            for message in messages {
                println!("  {message}");
            }
        }
        Command::Status => {
            let (thresholds, source) = pipeline.current_thresholds()?;
            display::display_state(&pipeline.state());
            let t = thresholds.as_array();
            println!(
                "Umbrales {}: pares {}, tercias {}, cuartetos {}",
                source.label(),
                t[0],
                t[1],
                t[2]
            );
        }
    }

    Ok(())
}
