//! Property-based checks of the engine's invariants over random draw histories.

use std::collections::HashSet;

use proptest::prelude::*;
use zenlotto_db::models::Draw;

use crate::affinity::affinities;
use crate::classifier::classify_universe;
use crate::combinatorics::LexRange;
use crate::config::{EngineConfig, GameId, Thresholds};
use crate::executor::Executor;
use crate::frequency::build;
use crate::frequency::tests::draw;
use crate::optimizer::{historical_affinities, historical_coverage, MonteCarloSample};
use crate::progress::NoProgress;

fn mini_draw() -> impl Strategy<Value = Vec<u8>> {
    prop::sample::subsequence((1..=6u8).collect::<Vec<_>>(), 3)
}

fn retro_draw() -> impl Strategy<Value = Vec<u8>> {
    prop::sample::subsequence((1..=39u8).collect::<Vec<_>>(), 6)
}

fn history(numbers: Vec<Vec<u8>>) -> Vec<Draw> {
    numbers
        .iter()
        .enumerate()
        .map(|(i, n)| draw(i as u32 + 1, n))
        .collect()
}

proptest! {
    /// Folding more draws never lowers any combination's affinity.
    #[test]
    fn prop_affinity_monotone_in_history(
        first in prop::collection::vec(retro_draw(), 1..30),
        extra in prop::collection::vec(retro_draw(), 1..10),
        probe in retro_draw(),
    ) {
        let game = GameId::MelateRetro.config();
        let before = history(first.clone());
        let after = history(first.into_iter().chain(extra).collect());
        let (t0, _) = build(&before, game, None);
        let (t1, _) = build(&after, game, None);
        prop_assert!(t0.is_dominated_by(&t1));
        let a0 = affinities(&probe, &t0);
        let a1 = affinities(&probe, &t1);
        for i in 0..3 {
            prop_assert!(a0[i] <= a1[i]);
        }
    }

    /// Extending a table with new draws equals rebuilding from scratch.
    #[test]
    fn prop_incremental_equals_rebuild(
        numbers in prop::collection::vec(retro_draw(), 2..40),
        split in 1usize..39,
    ) {
        let game = GameId::MelateRetro.config();
        let draws = history(numbers);
        let split = split.min(draws.len() - 1);
        let (base, _) = build(&draws[..split], game, None);
        let (extended, _) = build(&draws[split..], game, Some(base));
        let (full, _) = build(&draws, game, None);
        prop_assert_eq!(extended, full);
    }

    /// The Omega Class is exactly the combinations meeting all three thresholds.
    #[test]
    fn prop_classification_is_conjunction(
        numbers in prop::collection::vec(mini_draw(), 1..12),
        pares in 0u64..8,
        tercias in 0u64..3,
    ) {
        let game = GameId::Mini.config();
        let draws = history(numbers);
        let (table, _) = build(&draws, game, None);
        let thresholds = Thresholds::new(pares, tercias, 0);
        let report = classify_universe(
            game,
            &table,
            &thresholds,
            &HashSet::new(),
            &EngineConfig::default(),
            &Executor::sequential(),
            &NoProgress,
        )
        .unwrap();
        let admitted: Vec<Vec<u8>> = report.members.iter().map(|m| m.numbers.clone()).collect();
        let expected: Vec<Vec<u8>> = LexRange::new(0, 20, 3, 6)
            .filter(|c| thresholds.admits(&affinities(c.as_slice(), &table)))
            .map(|c| c.to_vec())
            .collect();
        prop_assert_eq!(admitted, expected);
    }

    /// Raising a threshold never raises either coverage.
    #[test]
    fn prop_coverage_monotone_in_thresholds(
        numbers in prop::collection::vec(retro_draw(), 5..40),
        base in (0u64..40, 0u64..4, 0u64..2),
        bump in (0u64..10, 0u64..3, 0u64..2),
    ) {
        let game = GameId::MelateRetro.config();
        let draws = history(numbers);
        let (table, _) = build(&draws, game, None);
        let hist = historical_affinities(&draws, &table, game);
        let sample = MonteCarloSample::draw(&table, game, 200, 42, &Executor::sequential());

        let low = Thresholds::new(base.0, base.1, base.2);
        let high = Thresholds::new(base.0 + bump.0, base.1 + bump.1, base.2 + bump.2);
        prop_assert!(historical_coverage(&hist, &high) <= historical_coverage(&hist, &low));
        prop_assert!(sample.coverage(&high) <= sample.coverage(&low));
    }
}
