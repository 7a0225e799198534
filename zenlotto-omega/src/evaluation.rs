use std::collections::HashSet;

use serde::Serialize;

use crate::affinity::affinities;
use crate::combinatorics::{for_each_subset, Combo};
use crate::config::{GameConfig, Level, Thresholds};
use crate::error::OmegaError;
use crate::frequency::FrequencyTable;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Criterion {
    pub level: Level,
    pub score: u64,
    pub threshold: u64,
    pub passes: bool,
}

/// Real-time verdict for one user combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub combination: Vec<u8>,
    pub affinities: [u64; 3],
    pub criteria: [Criterion; 3],
    pub is_omega: bool,
    pub omega_score: f64,
    pub has_appeared: bool,
}

/// `n` distinct numbers in `1..=k`, sorted.
pub fn validate_combination(numbers: &[u8], game: &GameConfig) -> Result<Combo, OmegaError> {
    if numbers.len() != game.n {
        return Err(OmegaError::InvalidCombination(format!(
            "se esperan {} números únicos, se recibieron {}",
            game.n,
            numbers.len()
        )));
    }
    if let Some(&bad) = numbers.iter().find(|&&x| x == 0 || x > game.k) {
        return Err(OmegaError::InvalidCombination(format!(
            "número {} fuera de rango (1-{})",
            bad, game.k
        )));
    }
    Combo::new(numbers).ok_or_else(|| {
        OmegaError::InvalidCombination(format!("se esperan {} números únicos", game.n))
    })
}

/// `Σ weight · (affinity − threshold) / max(threshold, 1)` over the three levels.
pub fn omega_score(affinities: &[u64; 3], thresholds: &Thresholds, weights: &[f64; 3]) -> f64 {
    let t = thresholds.as_array();
    (0..3)
        .map(|i| {
            let diff = affinities[i] as f64 - t[i] as f64;
            weights[i] * diff / t[i].max(1) as f64
        })
        .sum()
}

pub fn evaluate_combination(
    numbers: &[u8],
    game: &GameConfig,
    table: &FrequencyTable,
    thresholds: &Thresholds,
    historical: &HashSet<Combo>,
) -> Result<Evaluation, OmegaError> {
    let combo = validate_combination(numbers, game)?;
    let af = affinities(combo.as_slice(), table);
    let criteria = Level::ALL.map(|level| {
        let score = af[level.index()];
        let threshold = thresholds.get(level);
        Criterion {
            level,
            score,
            threshold,
            passes: score >= threshold,
        }
    });
    Ok(Evaluation {
        combination: combo.to_vec(),
        affinities: af,
        criteria,
        is_omega: criteria.iter().all(|c| c.passes),
        omega_score: omega_score(&af, thresholds, &game.score_weights),
        has_appeared: historical.contains(&combo),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsequenceFrequency {
    pub numbers: Vec<u8>,
    pub frequency: u32,
}

/// Where a combination's affinity comes from, level by level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deconstruction {
    pub combination: Vec<u8>,
    pub totals: [u64; 3],
    /// Per level, every sub-combination, most frequent first.
    pub breakdown: [Vec<SubsequenceFrequency>; 3],
}

pub fn deconstruct_affinity(
    numbers: &[u8],
    game: &GameConfig,
    table: &FrequencyTable,
) -> Result<Deconstruction, OmegaError> {
    if table.is_empty() {
        return Err(OmegaError::MissingFrequencies);
    }
    let combo = validate_combination(numbers, game)?;
    let breakdown = Level::ALL.map(|level| {
        let mut subs = Vec::new();
        for_each_subset(combo.as_slice(), level.size(), |sub| {
            subs.push(SubsequenceFrequency {
                numbers: sub.to_vec(),
                frequency: table.count(level, sub),
            });
        });
        subs.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.numbers.cmp(&b.numbers)));
        subs
    });
    let totals = [0, 1, 2].map(|i| breakdown[i].iter().map(|s| s.frequency as u64).sum());
    Ok(Deconstruction {
        combination: combo.to_vec(),
        totals,
        breakdown,
    })
}
