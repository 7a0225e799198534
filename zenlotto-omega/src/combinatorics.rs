use std::fmt;
use std::str::FromStr;

use zenlotto_db::models::MAX_NUMBERS;

use crate::error::OmegaError;

/// C(n, r), zero when `r > n`.
pub fn binomial(n: u64, r: u64) -> u64 {
    if r > n {
        return 0;
    }
    let r = r.min(n - r);
    let mut acc: u64 = 1;
    for i in 0..r {
        acc = acc * (n - i) / (i + 1);
    }
    acc
}

/// Sorted set of distinct numbers in `1..=255`, at most [`MAX_NUMBERS`] long.
///
/// `Copy` and hashable so historical draws can sit in a `HashSet` shared by workers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Combo {
    len: u8,
    nums: [u8; MAX_NUMBERS],
}

impl Combo {
    /// Sorts `numbers`; `None` if empty, too long, or containing 0 or duplicates.
    pub fn new(numbers: &[u8]) -> Option<Self> {
        if numbers.is_empty() || numbers.len() > MAX_NUMBERS {
            return None;
        }
        let mut nums = [0u8; MAX_NUMBERS];
        nums[..numbers.len()].copy_from_slice(numbers);
        nums[..numbers.len()].sort_unstable();
        let sorted = &nums[..numbers.len()];
        if sorted[0] == 0 || sorted.windows(2).any(|w| w[0] == w[1]) {
            return None;
        }
        Some(Self {
            len: numbers.len() as u8,
            nums,
        })
    }

    /// Trusts the caller: `sorted` must be strictly ascending and non-zero.
    pub(crate) fn from_sorted(sorted: &[u8]) -> Self {
        let mut nums = [0u8; MAX_NUMBERS];
        nums[..sorted.len()].copy_from_slice(sorted);
        Self {
            len: sorted.len() as u8,
            nums,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.nums[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Largest number in the combination; 0 when empty.
    pub fn largest(&self) -> u8 {
        self.as_slice().last().copied().unwrap_or(0)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Numbers shared with `other`.
    pub fn shared(&self, other: &Combo) -> usize {
        self.as_slice()
            .iter()
            .filter(|n| other.as_slice().binary_search(n).is_ok())
            .count()
    }
}

impl fmt::Debug for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Combo({})", self)
    }
}

/// `1-7-22`
impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, n) in self.as_slice().iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{n}")?;
        }
        Ok(())
    }
}

/// Strict inverse of `Display`: tokens must be numeric and strictly ascending.
impl FromStr for Combo {
    type Err = OmegaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut numbers = Vec::with_capacity(MAX_NUMBERS);
        for token in s.split('-') {
            let n = token
                .trim()
                .parse::<u8>()
                .map_err(|_| OmegaError::InvalidCombination(format!("clave '{s}'")))?;
            numbers.push(n);
        }
        if numbers.windows(2).any(|w| w[0] >= w[1]) {
            return Err(OmegaError::InvalidCombination(format!(
                "clave '{s}' no está en orden ascendente"
            )));
        }
        Combo::new(&numbers).ok_or_else(|| OmegaError::InvalidCombination(format!("clave '{s}'")))
    }
}

/// Calls `f` with every `size`-subset of `items`, in lexicographic order of positions.
/// Sorted input yields sorted subsets. No allocation.
pub fn for_each_subset<F: FnMut(&[u8])>(items: &[u8], size: usize, mut f: F) {
    let n = items.len();
    if size == 0 || size > n || size > MAX_NUMBERS {
        return;
    }
    let mut idx = [0usize; MAX_NUMBERS];
    for (i, slot) in idx.iter_mut().enumerate().take(size) {
        *slot = i;
    }
    let mut buf = [0u8; MAX_NUMBERS];
    loop {
        for i in 0..size {
            buf[i] = items[idx[i]];
        }
        f(&buf[..size]);

        let mut i = size;
        while i > 0 && idx[i - 1] == i - 1 + n - size {
            i -= 1;
        }
        if i == 0 {
            return;
        }
        idx[i - 1] += 1;
        for j in i..size {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Advances `combo` (ascending numbers in `1..=k`) to its lexicographic successor.
/// Returns `false`, leaving `combo` untouched, when it is already the last one.
pub fn next_lex(combo: &mut [u8], k: u8) -> bool {
    let n = combo.len();
    let mut i = n;
    while i > 0 && combo[i - 1] as usize == k as usize - (n - i) {
        i -= 1;
    }
    if i == 0 {
        return false;
    }
    combo[i - 1] += 1;
    for j in i..n {
        combo[j] = combo[j - 1] + 1;
    }
    true
}

/// The `rank`-th (0-based) `n`-combination of `1..=k` in lexicographic order.
pub fn unrank_lex(mut rank: u64, n: usize, k: u8) -> Option<Combo> {
    if n == 0 || n > MAX_NUMBERS || n > k as usize || rank >= binomial(k as u64, n as u64) {
        return None;
    }
    let mut out = [0u8; MAX_NUMBERS];
    let mut x: u8 = 1;
    for (i, slot) in out.iter_mut().enumerate().take(n) {
        loop {
            let remaining = (n - i - 1) as u64;
            let with_x = binomial((k - x) as u64, remaining);
            if rank < with_x {
                *slot = x;
                x += 1;
                break;
            }
            rank -= with_x;
            x += 1;
        }
    }
    Some(Combo::from_sorted(&out[..n]))
}

/// Lexicographic iterator over `count` combinations starting at `start`.
pub struct LexRange {
    current: [u8; MAX_NUMBERS],
    n: usize,
    k: u8,
    remaining: u64,
}

impl LexRange {
    pub fn new(start_rank: u64, count: u64, n: usize, k: u8) -> Self {
        let mut current = [0u8; MAX_NUMBERS];
        let remaining = match unrank_lex(start_rank, n, k) {
            Some(first) => {
                current[..n].copy_from_slice(first.as_slice());
                let total = binomial(k as u64, n as u64);
                count.min(total - start_rank)
            }
            None => 0,
        };
        Self {
            current,
            n,
            k,
            remaining,
        }
    }
}

impl Iterator for LexRange {
    type Item = Combo;

    fn next(&mut self) -> Option<Combo> {
        if self.remaining == 0 {
            return None;
        }
        let item = Combo::from_sorted(&self.current[..self.n]);
        self.remaining -= 1;
        if self.remaining > 0 && !next_lex(&mut self.current[..self.n], self.k) {
            self.remaining = 0;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let r = self.remaining as usize;
        (r, Some(r))
    }
}

/// Splits `0..total` into at most `parts` contiguous, nearly equal `(start, len)` ranges.
pub fn split_ranges(total: u64, parts: usize) -> Vec<(u64, u64)> {
    let parts = (parts.max(1) as u64).min(total.max(1));
    let base = total / parts;
    let extra = total % parts;
    let mut ranges = Vec::with_capacity(parts as usize);
    let mut start = 0;
    for i in 0..parts {
        let len = base + u64::from(i < extra);
        if len > 0 {
            ranges.push((start, len));
        }
        start += len;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(39, 6), 3_262_623);
        assert_eq!(binomial(56, 6), 32_468_436);
        assert_eq!(binomial(6, 3), 20);
        assert_eq!(binomial(3, 4), 0);
        assert_eq!(binomial(5, 0), 1);
    }

    #[test]
    fn test_combo_sorts_and_rejects() {
        let c = Combo::new(&[9, 2, 5]).unwrap();
        assert_eq!(c.as_slice(), &[2, 5, 9]);
        assert!(Combo::new(&[1, 1, 2]).is_none());
        assert!(Combo::new(&[0, 1, 2]).is_none());
        assert!(Combo::new(&[]).is_none());
        assert!(Combo::new(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).is_none());
    }

    #[test]
    fn test_combo_key_roundtrip() {
        let c = Combo::new(&[22, 1, 7]).unwrap();
        assert_eq!(c.to_string(), "1-7-22");
        assert_eq!("1-7-22".parse::<Combo>().unwrap(), c);
        assert!("7-1-22".parse::<Combo>().is_err());
        assert!("1-x-22".parse::<Combo>().is_err());
        assert!("(1, 7)".parse::<Combo>().is_err());
    }

    #[test]
    fn test_shared() {
        let a = Combo::new(&[1, 2, 3, 4, 5, 6]).unwrap();
        let b = Combo::new(&[4, 5, 6, 7, 8, 9]).unwrap();
        assert_eq!(a.shared(&b), 3);
    }

    #[test]
    fn test_subsets_count_and_order() {
        let mut seen = Vec::new();
        for_each_subset(&[1, 2, 3, 4], 2, |s| seen.push(s.to_vec()));
        assert_eq!(
            seen,
            vec![
                vec![1, 2],
                vec![1, 3],
                vec![1, 4],
                vec![2, 3],
                vec![2, 4],
                vec![3, 4]
            ]
        );

        let mut count = 0;
        for_each_subset(&[1, 2, 3, 4, 5, 6], 4, |_| count += 1);
        assert_eq!(count, 15);

        let mut none = 0;
        for_each_subset(&[1, 2, 3], 4, |_| none += 1);
        assert_eq!(none, 0);
    }

    #[test]
    fn test_next_lex_walks_universe() {
        let mut combo = [1u8, 2, 3];
        let mut count = 1;
        while next_lex(&mut combo, 6) {
            count += 1;
        }
        assert_eq!(count, 20);
        assert_eq!(combo, [4, 5, 6]);
    }

    #[test]
    fn test_unrank_matches_iteration() {
        let mut combo = [1u8, 2, 3];
        let mut rank = 0;
        loop {
            assert_eq!(unrank_lex(rank, 3, 6).unwrap().as_slice(), &combo);
            rank += 1;
            if !next_lex(&mut combo, 6) {
                break;
            }
        }
        assert!(unrank_lex(20, 3, 6).is_none());
    }

    #[test]
    fn test_lex_range_chunks_cover_universe() {
        let total = binomial(10, 4);
        let mut all = Vec::new();
        for (start, len) in split_ranges(total, 7) {
            all.extend(LexRange::new(start, len, 4, 10));
        }
        assert_eq!(all.len() as u64, total);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_split_ranges() {
        assert_eq!(split_ranges(10, 3), vec![(0, 4), (4, 3), (7, 3)]);
        assert_eq!(split_ranges(2, 8), vec![(0, 1), (1, 1)]);
        assert_eq!(split_ranges(0, 4), Vec::<(u64, u64)>::new());
    }
}
