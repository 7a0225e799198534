use crate::combinatorics::for_each_subset;
use crate::config::{Level, Thresholds};
use crate::frequency::FrequencyTable;

/// Sum of the historical counts of every `level`-subset of `sorted`.
///
/// `sorted` must be ascending; missing subsets contribute 0.
#[inline]
pub fn affinity(sorted: &[u8], table: &FrequencyTable, level: Level) -> u64 {
    let mut total = 0u64;
    for_each_subset(sorted, level.size(), |sub| total += table.count(level, sub) as u64);
    total
}

/// Affinities at all three levels, indexed like [`Level::index`].
pub fn affinities(sorted: &[u8], table: &FrequencyTable) -> [u64; 3] {
    Level::ALL.map(|level| affinity(sorted, table, level))
}

/// Pares first, then tercias, then cuartetos, stopping at the first level
/// below its threshold. `Some` carries all three affinities of an Omega combination.
#[inline]
pub fn screen(sorted: &[u8], table: &FrequencyTable, thresholds: &Thresholds) -> Option<[u64; 3]> {
    let pares = affinity(sorted, table, Level::Pares);
    if pares < thresholds.pares {
        return None;
    }
    let tercias = affinity(sorted, table, Level::Tercias);
    if tercias < thresholds.tercias {
        return None;
    }
    let cuartetos = affinity(sorted, table, Level::Cuartetos);
    if cuartetos < thresholds.cuartetos {
        return None;
    }
    Some([pares, tercias, cuartetos])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameId;
    use crate::frequency::build;
    use crate::frequency::tests::draw;

    #[test]
    fn test_single_draw_self_affinity() {
        let game = GameId::MelateRetro.config();
        let combo = [3, 8, 15, 22, 30, 37];
        let (table, _) = build(&[draw(1, &combo)], game, None);
        assert_eq!(affinity(&combo, &table, Level::Pares), 15);
        assert_eq!(affinity(&combo, &table, Level::Tercias), 20);
        assert_eq!(affinity(&combo, &table, Level::Cuartetos), 15);
    }

    #[test]
    fn test_unseen_combination_is_zero() {
        let game = GameId::MelateRetro.config();
        let (table, _) = build(&[draw(1, &[1, 2, 3, 4, 5, 6])], game, None);
        assert_eq!(affinities(&[10, 11, 12, 13, 14, 15], &table), [0, 0, 0]);
    }

    #[test]
    fn test_partial_overlap() {
        let game = GameId::MelateRetro.config();
        let (table, _) = build(
            &[draw(1, &[1, 2, 3, 4, 5, 6]), draw(2, &[1, 2, 3, 10, 11, 12])],
            game,
            None,
        );
        // shares {1,2,3} with both draws and {4} with the first
        let combo = [1, 2, 3, 4, 20, 21];
        assert_eq!(affinity(&combo, &table, Level::Pares), 3 * 2 + 3);
        assert_eq!(affinity(&combo, &table, Level::Tercias), 2 + 3);
        assert_eq!(affinity(&combo, &table, Level::Cuartetos), 1);
    }

    #[test]
    fn test_screen_conjunction() {
        let game = GameId::Mini.config();
        let (table, _) = build(&[draw(1, &[1, 2, 3]), draw(2, &[1, 2, 4])], game, None);
        assert_eq!(screen(&[1, 2, 3], &table, &Thresholds::new(4, 1, 0)), Some([4, 1, 0]));
        assert_eq!(screen(&[1, 2, 3], &table, &Thresholds::new(5, 0, 0)), None);
        assert_eq!(screen(&[1, 2, 3], &table, &Thresholds::new(0, 2, 0)), None);
        assert_eq!(screen(&[1, 2, 3], &table, &Thresholds::new(0, 0, 1)), None);
    }
}
