use thiserror::Error;

/// Named failures of the Omega engine. The `Display` text is the message shown to the user.
#[derive(Debug, Error)]
pub enum OmegaError {
    #[error("La base de datos del juego está vacía. Importe primero los sorteos históricos.")]
    NoDraws,

    #[error("Se necesitan al menos {needed} sorteos válidos, hay {available}.")]
    NotEnoughDraws { needed: usize, available: usize },

    #[error("Faltan las frecuencias. Ejecute primero la actualización de frecuencias.")]
    MissingFrequencies,

    #[error("Faltan umbrales optimizados. Ejecute primero la optimización.")]
    MissingThresholds,

    #[error("No se encontraron candidatos con Cobertura Histórica >= {:.0}%", .min_coverage * 100.0)]
    NoViableCandidate { min_coverage: f64 },

    #[error("Combinación inválida: {0}")]
    InvalidCombination(String),

    #[error("Juego desconocido: '{0}'")]
    UnknownGame(String),

    #[error("Configuración inválida: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
