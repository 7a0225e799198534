use anyhow::{bail, Result};

/// Upper bound on numbers per ticket supported by the storage layer (`c1..c8`).
pub const MAX_NUMBERS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub sequence: u32,
    pub date: String,
    pub numbers: Vec<u8>,
    pub jackpot: i64,
}

impl Draw {
    pub fn sorted_numbers(&self) -> Vec<u8> {
        let mut numbers = self.numbers.clone();
        numbers.sort_unstable();
        numbers
    }
}

/// One surviving combination of the Omega Class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmegaMember {
    pub numbers: Vec<u8>,
    pub has_appeared: bool,
    pub affinity_pares: u64,
    pub affinity_tercias: u64,
    pub affinity_cuartetos: u64,
}

/// Score of one historical draw against the thresholds in force when it was enriched.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawScore {
    pub sequence: u32,
    pub is_omega: bool,
    pub omega_score: f64,
    pub affinity_pares: u64,
    pub affinity_tercias: u64,
    pub affinity_cuartetos: u64,
}

/// Per-level summary of a frequency table or an affinity distribution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LevelStats {
    pub mean: f64,
    pub median: f64,
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrequencyMetrics {
    pub unique: u64,
    pub total: u64,
    pub stats: LevelStats,
}

/// One walk-forward checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryRecord {
    pub last_draw: u32,
    pub draws_used: u32,
    /// Indexed pares, tercias, cuartetos.
    pub frequencies: [FrequencyMetrics; 3],
    pub affinities: [LevelStats; 3],
    pub thresholds: Option<[u64; 3]>,
    pub historical_coverage: Option<f64>,
    pub universal_coverage: Option<f64>,
}

pub fn validate_draw(numbers: &[u8], n: usize, k: u8) -> Result<()> {
    if numbers.len() != n {
        bail!("Se esperan {} números, se recibieron {}", n, numbers.len());
    }
    for &x in numbers {
        if x < 1 || x > k {
            bail!("Número {} fuera de rango (1-{})", x, k);
        }
    }
    for i in 0..numbers.len() {
        for j in (i + 1)..numbers.len() {
            if numbers[i] == numbers[j] {
                bail!("Número repetido: {}", numbers[i]);
            }
        }
    }
    Ok(())
}

/// `[3, 1, 2]` -> `"1-2-3"`.
pub fn encode_numbers(numbers: &[u8]) -> String {
    let mut sorted = numbers.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// Lenient inverse of [`encode_numbers`]: tokens that do not parse are dropped,
/// so a damaged record surfaces as a draw with too few numbers.
pub fn decode_numbers(raw: &str) -> Vec<u8> {
    raw.split('-')
        .filter_map(|s| s.trim().parse::<u8>().ok())
        .collect()
}
