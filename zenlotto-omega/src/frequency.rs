use zenlotto_db::models::{validate_draw, Draw, FrequencyMetrics, LevelStats};

use crate::combinatorics::{binomial, for_each_subset, Combo};
use crate::config::{GameConfig, Level};

const MAX_LEVEL_SIZE: usize = 4;

/// Co-occurrence counts of every pair, triplet and quartet of `1..=k`.
///
/// Each level is a dense vector indexed by the colex rank of the subset,
/// so lookups in the classifier hot path are a few table reads.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTable {
    k: u8,
    last_draw: u32,
    counts: [Vec<u32>; 3],
    /// `binom[a][r] = C(a, r)` for `a <= k`, `r <= 4`.
    binom: Vec<[u32; MAX_LEVEL_SIZE + 1]>,
}

/// Outcome of folding a batch of draws into a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldSummary {
    pub folded: usize,
    pub skipped: usize,
    pub stale: usize,
    pub last_draw: u32,
}

impl FrequencyTable {
    pub fn new(k: u8) -> Self {
        let binom = (0..=k as u64)
            .map(|a| {
                let mut row = [0u32; MAX_LEVEL_SIZE + 1];
                for (r, slot) in row.iter_mut().enumerate() {
                    *slot = binomial(a, r as u64) as u32;
                }
                row
            })
            .collect();
        let counts = Level::ALL.map(|level| vec![0u32; binomial(k as u64, level.size() as u64) as usize]);
        Self {
            k,
            last_draw: 0,
            counts,
            binom,
        }
    }

    pub fn k(&self) -> u8 {
        self.k
    }

    /// Sequence number of the last draw folded in, 0 for a fresh table.
    pub fn last_draw(&self) -> u32 {
        self.last_draw
    }

    pub(crate) fn set_last_draw(&mut self, last_draw: u32) {
        self.last_draw = last_draw;
    }

    /// True when no subset has been counted at any level.
    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|level| level.iter().all(|&c| c == 0))
    }

    /// Colex rank of an ascending subset of `1..=k`.
    #[inline]
    fn rank(&self, sorted: &[u8]) -> usize {
        let mut rank = 0usize;
        for (i, &x) in sorted.iter().enumerate() {
            rank += self.binom[(x - 1) as usize][i + 1] as usize;
        }
        rank
    }

    fn in_domain(&self, level: Level, sorted: &[u8]) -> bool {
        sorted.len() == level.size()
            && sorted.first().is_some_and(|&x| x >= 1)
            && sorted.last().is_some_and(|&x| x <= self.k)
            && sorted.windows(2).all(|w| w[0] < w[1])
    }

    /// Count of an ascending subset; out-of-domain keys count 0.
    #[inline]
    pub fn count(&self, level: Level, sorted: &[u8]) -> u32 {
        if !self.in_domain(level, sorted) {
            return 0;
        }
        self.counts[level.index()][self.rank(sorted)]
    }

    pub(crate) fn set_count(&mut self, level: Level, sorted: &[u8], value: u32) -> bool {
        if !self.in_domain(level, sorted) {
            return false;
        }
        let rank = self.rank(sorted);
        self.counts[level.index()][rank] = value;
        true
    }

    fn increment(&mut self, level: Level, sorted: &[u8]) {
        let rank = self.rank(sorted);
        self.counts[level.index()][rank] += 1;
    }

    /// Inverse of `rank`: the ascending subset of size `r` with colex rank `rank`.
    fn unrank(&self, mut rank: usize, r: usize) -> Combo {
        let mut out = [0u8; MAX_LEVEL_SIZE];
        let mut upper = self.k as usize;
        for i in (1..=r).rev() {
            let mut a = upper;
            while a > 0 && self.binom[a - 1][i] as usize > rank {
                a -= 1;
            }
            // a - 1 is the largest value with C(a - 1, i) <= rank
            let value = a - 1;
            rank -= self.binom[value][i] as usize;
            out[i - 1] = (value + 1) as u8;
            upper = value;
        }
        Combo::from_sorted(&out[..r])
    }

    /// Non-zero entries of one level, in colex order.
    pub fn entries(&self, level: Level) -> impl Iterator<Item = (Combo, u32)> + '_ {
        self.counts[level.index()]
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(move |(rank, &c)| (self.unrank(rank, level.size()), c))
    }

    /// Folds draws in order. Malformed draws are skipped with a warning and
    /// never partially counted, but still advance the checkpoint; draws at or
    /// before the checkpoint are ignored.
    pub fn fold(&mut self, draws: &[Draw], game: &GameConfig) -> FoldSummary {
        let mut summary = FoldSummary {
            last_draw: self.last_draw,
            ..FoldSummary::default()
        };
        for draw in draws {
            if self.last_draw > 0 && draw.sequence <= self.last_draw {
                summary.stale += 1;
                continue;
            }
            if let Err(e) = validate_draw(&draw.numbers, game.n, game.k) {
                log::warn!("Omitiendo sorteo {} con datos inválidos: {}", draw.sequence, e);
                summary.skipped += 1;
                self.last_draw = draw.sequence;
                continue;
            }
            let sorted = draw.sorted_numbers();
            for &level in &game.levels {
                for_each_subset(&sorted, level.size(), |sub| self.increment(level, sub));
            }
            self.last_draw = draw.sequence;
            summary.folded += 1;
        }
        summary.last_draw = self.last_draw;
        summary
    }

    /// Unique keys, total count and count statistics over the non-zero entries.
    pub fn metrics(&self, level: Level) -> FrequencyMetrics {
        let mut unique = 0u64;
        let mut total = 0u64;
        let mut min = u64::MAX;
        let mut max = 0u64;
        for &c in self.counts[level.index()].iter().filter(|&&c| c > 0) {
            let c = c as u64;
            unique += 1;
            total += c;
            min = min.min(c);
            max = max.max(c);
        }
        if unique == 0 {
            return FrequencyMetrics::default();
        }
        FrequencyMetrics {
            unique,
            total,
            stats: LevelStats {
                mean: total as f64 / unique as f64,
                median: 0.0,
                min,
                max,
            },
        }
    }

    /// True when every count of `self` is <= the matching count of `other`.
    pub fn is_dominated_by(&self, other: &FrequencyTable) -> bool {
        self.k == other.k
            && self
                .counts
                .iter()
                .zip(other.counts.iter())
                .all(|(a, b)| a.iter().zip(b.iter()).all(|(x, y)| x <= y))
    }
}

/// Builds a table from `draws`, extending `base` when given.
pub fn build(draws: &[Draw], game: &GameConfig, base: Option<FrequencyTable>) -> (FrequencyTable, FoldSummary) {
    let mut table = base.unwrap_or_else(|| FrequencyTable::new(game.k));
    let summary = table.fold(draws, game);
    if summary.skipped > 0 {
        log::warn!("{} sorteos omitidos por datos inválidos", summary.skipped);
    }
    log::debug!(
        "Frecuencias: {} sorteos incorporados, último {}",
        summary.folded,
        summary.last_draw
    );
    (table, summary)
}
