pub mod affinity;
pub mod cache;
pub mod classifier;
pub mod combinatorics;
pub mod config;
pub mod display;
pub mod enrichment;
pub mod error;
pub mod evaluation;
pub mod executor;
pub mod frequency;
pub mod optimizer;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod trajectory;

#[cfg(test)]
mod properties;

pub use error::OmegaError;
