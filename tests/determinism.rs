//! Determinism tests
//!
//! Random rosters and timelines come from a seeded ChaCha generator. The
//! same input must always resolve to byte-identical JSON, whether it runs
//! alone or inside a parallel batch.

use hex_clash::core::{CardCatalog, HexCoord, PowerTable, PublicCharacter};
use hex_clash::game::{resolve_beats, Beat, BeatEntry, ResolveContext, ResolveInput, ResolveOutput};
use hex_clash::loader::{resolve_paths, Scenario};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use similar_asserts::assert_eq;

const ACTIONS: &[&str] = &["W", "m", "2m", "Bm", "Lm", "j", "2j", "a", "[a]", "b", "a-La", "2c", "W", "m"];
const CHARACTERS: &[&str] = &["murelious", "strylan", "monkey-queen", "ryathan", "zenytha", "aumandetta"];
const ROTATIONS: &[&str] = &["0", "L1", "R1", "L2", "R2", "3"];

fn random_roster(rng: &mut ChaCha8Rng) -> Vec<PublicCharacter> {
    let count = rng.gen_range(2..=3);
    let mut hexes = vec![
        HexCoord::new(-2, 0),
        HexCoord::new(0, 0),
        HexCoord::new(2, 0),
        HexCoord::new(0, 1),
        HexCoord::new(1, -1),
    ];
    hexes.shuffle(rng);
    (0..count)
        .map(|index| {
            let character_id = CHARACTERS.choose(rng).copied().unwrap_or("murelious");
            let facing = rng.gen_range(0..6) * 60;
            PublicCharacter::new(format!("player-{index}"), character_id, hexes[index], facing)
        })
        .collect()
}

fn random_timeline(rng: &mut ChaCha8Rng, roster: &[PublicCharacter], len: usize) -> Vec<Beat> {
    (0..len)
        .map(|_| {
            roster
                .iter()
                .map(|character| {
                    let action = ACTIONS.choose(rng).copied().unwrap_or("W");
                    let rotation = ROTATIONS.choose(rng).copied().unwrap_or("0");
                    BeatEntry::new(character.user_id.as_str(), action)
                        .with_rotation(rotation)
                        .with_priority(rng.gen_range(0..100))
                        .with_attack(rng.gen_range(0..5), rng.gen_range(0..3))
                })
                .collect()
        })
        .collect()
}

fn random_input(seed: u64) -> ResolveInput {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let characters = random_roster(&mut rng);
    let len = rng.gen_range(1..12);
    ResolveInput {
        beats: random_timeline(&mut rng, &characters, len),
        characters,
        ..Default::default()
    }
}

fn resolve(input: ResolveInput) -> ResolveOutput {
    let catalog = CardCatalog::default();
    let powers = PowerTable::builtin();
    resolve_beats(input, ResolveContext::new(&catalog, &powers))
}

fn to_json(output: &ResolveOutput) -> String {
    serde_json::to_string_pretty(output).expect("serialize output")
}

#[test]
fn test_same_seed_same_input() {
    let first = serde_json::to_string(&random_input(7)).expect("serialize");
    let second = serde_json::to_string(&random_input(7)).expect("serialize");
    assert_eq!(first, second);
}

#[test]
fn test_random_timelines_resolve_identically() {
    for seed in 0..64u64 {
        let input = random_input(seed);
        let first = to_json(&resolve(input.clone()));
        let second = to_json(&resolve(input));
        assert_eq!(first, second, "seed {seed} resolved differently");
    }
}

#[test]
fn test_random_timelines_keep_calculated_prefix() {
    for seed in 100..164u64 {
        let output = resolve(random_input(seed));
        for (index, beat) in output.beats.iter().enumerate() {
            let expected = output.last_calculated_index.is_some_and(|last| index <= last);
            assert!(
                beat.iter().all(|entry| entry.calculated == expected),
                "seed {seed}: beat {index} breaks the calculated prefix"
            );
        }
    }
}

#[test]
fn test_input_round_trips_through_json() {
    let input = random_input(3);
    let json = serde_json::to_string(&input).expect("serialize");
    let restored: ResolveInput = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(to_json(&resolve(input)), to_json(&resolve(restored)));
}

#[test]
fn test_batch_matches_single_resolution() {
    let dir = std::env::temp_dir().join(format!("hex-clash-determinism-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    let mut paths = Vec::new();
    for seed in 0..8u64 {
        let scenario = Scenario {
            name: Some(format!("seed-{seed}")),
            input: random_input(seed),
            ..Default::default()
        };
        let path = dir.join(format!("seed-{seed:02}.json"));
        std::fs::write(&path, serde_json::to_string(&scenario).expect("serialize")).expect("write scenario");
        paths.push(path);
    }

    let catalog = CardCatalog::default();
    let powers = PowerTable::builtin();
    let report = resolve_paths(&paths, &catalog, &powers);
    assert_eq!(report.failures().count(), 0);
    for (seed, result) in report.results.iter().enumerate() {
        let batch = result.output.as_ref().expect("batch output");
        let single = resolve(random_input(seed as u64));
        assert_eq!(to_json(batch), to_json(&single), "seed {seed} differs in batch");
    }
    let _ = std::fs::remove_dir_all(&dir);
}
