use std::collections::HashSet;

use zenlotto_db::models::Draw;
use zenlotto_omega::affinity::affinities;
use zenlotto_omega::classifier::classify_universe;
use zenlotto_omega::combinatorics::Combo;
use zenlotto_omega::config::{EngineConfig, GameId};
use zenlotto_omega::executor::Executor;
use zenlotto_omega::frequency::build;
use zenlotto_omega::optimizer::{historical_affinities, historical_coverage, optimize};
use zenlotto_omega::progress::NoProgress;

fn draws() -> Vec<Draw> {
    [[1, 2, 3], [1, 2, 4], [2, 3, 5], [1, 3, 6], [1, 2, 5]]
        .iter()
        .enumerate()
        .map(|(i, numbers)| Draw {
            sequence: i as u32 + 1,
            date: format!("0{}/01/2024", i + 1),
            numbers: numbers.to_vec(),
            jackpot: 0,
        })
        .collect()
}

#[test]
fn small_universe_end_to_end() {
    let game = GameId::Mini.config();
    let draws = draws();
    let (table, summary) = build(&draws, game, None);
    assert_eq!(summary.folded, 5);

    let config = EngineConfig::default();
    let exec = Executor::new(2).unwrap();
    let report = optimize(&draws, &table, game, &config, &exec, &NoProgress).unwrap();
    let thresholds = report.best.thresholds;

    let hist = historical_affinities(&draws, &table, game);
    let coverage = historical_coverage(&hist, &thresholds);
    assert!(coverage >= 0.95);
    assert!((coverage - report.best.historical_coverage).abs() < 1e-12);

    let historical: HashSet<Combo> = draws.iter().filter_map(|d| Combo::new(&d.numbers)).collect();
    let classes = classify_universe(game, &table, &thresholds, &historical, &config, &exec, &NoProgress).unwrap();
    assert_eq!(classes.universe, 20);

    let expected = (0..20)
        .filter_map(|rank| zenlotto_omega::combinatorics::unrank_lex(rank, 3, 6))
        .filter(|c| thresholds.admits(&affinities(c.as_slice(), &table)))
        .count();
    assert_eq!(classes.members.len(), expected);

    for member in &classes.members {
        let combo = Combo::new(&member.numbers).unwrap();
        assert_eq!(member.has_appeared, historical.contains(&combo));
    }
    // every historical draw is covered, so all five appear flagged
    assert_eq!(classes.members.iter().filter(|m| m.has_appeared).count(), 5);
}

#[test]
fn classification_is_idempotent() {
    let game = GameId::Mini.config();
    let draws = draws();
    let (table, _) = build(&draws, game, None);
    let thresholds = game.default_thresholds;
    let historical: HashSet<Combo> = draws.iter().filter_map(|d| Combo::new(&d.numbers)).collect();
    let config = EngineConfig::default();

    let first = classify_universe(
        game,
        &table,
        &thresholds,
        &historical,
        &config,
        &Executor::new(3).unwrap(),
        &NoProgress,
    )
    .unwrap();
    let second = classify_universe(
        game,
        &table,
        &thresholds,
        &historical,
        &config,
        &Executor::sequential(),
        &NoProgress,
    )
    .unwrap();
    assert_eq!(first.members, second.members);
}
