//! Break detection and repair across a replay
//!
//! A replay that loses committed history before a protected start is
//! detected, repaired from the baseline, and then resolves exactly like the
//! baseline did.

use hex_clash::core::{CardCatalog, HexCoord, PowerTable, PublicCharacter, RotationSource};
use hex_clash::game::integrity::BreakKind;
use hex_clash::game::{
    find_timeline_breaks, repair_timeline_breaks_from_baseline, resolve_beats, Beat, BeatEntry, ResolveContext,
    ResolveInput,
};
use similar_asserts::assert_eq;

fn roster() -> Vec<PublicCharacter> {
    vec![
        PublicCharacter::new("alpha", "murelious", HexCoord::new(-1, 0), 180),
        PublicCharacter::new("beta", "murelious", HexCoord::new(2, 0), 0),
    ]
}

fn selected(key: &str, action: &str) -> BeatEntry {
    let mut entry = BeatEntry::new(key, action);
    entry.rotation_source = Some(RotationSource::Selected);
    entry
}

fn baseline() -> Vec<Beat> {
    vec![
        vec![selected("alpha", "m"), BeatEntry::new("beta", "W")],
        vec![BeatEntry::new("alpha", "W"), BeatEntry::new("beta", "W")],
        vec![BeatEntry::new("alpha", "W"), BeatEntry::new("beta", "W")],
        vec![selected("alpha", "W"), BeatEntry::new("beta", "W")],
    ]
}

fn broken() -> Vec<Beat> {
    vec![
        vec![selected("alpha", "m"), BeatEntry::new("beta", "W")],
        vec![BeatEntry::new("beta", "W")],
        vec![BeatEntry::new("alpha", "E"), BeatEntry::new("beta", "W")],
        vec![selected("alpha", "W"), BeatEntry::new("beta", "W")],
    ]
}

fn resolve_json(beats: Vec<Beat>) -> String {
    let catalog = CardCatalog::default();
    let powers = PowerTable::builtin();
    let output = resolve_beats(
        ResolveInput {
            beats,
            characters: roster(),
            ..Default::default()
        },
        ResolveContext::new(&catalog, &powers),
    );
    serde_json::to_string_pretty(&output).expect("serialize")
}

#[test]
fn test_replay_gap_is_found_and_repaired() {
    let characters = roster();
    let baseline = baseline();
    let mut beats = broken();

    let breaks = find_timeline_breaks(&beats, Some(&baseline), &characters, &[], Some(0));
    let found: Vec<(usize, BreakKind)> = breaks.iter().map(|b| (b.beat_index, b.break_kind)).collect();
    assert_eq!(found, vec![(1, BreakKind::Missing), (2, BreakKind::Open)]);
    assert!(breaks.iter().all(|b| b.protected_start_index == 3 && b.user_id == "alpha"));

    let repairs = repair_timeline_breaks_from_baseline(&mut beats, &baseline, &characters, &[], Some(0));
    assert_eq!(repairs.len(), 2);
    assert_eq!(repairs[0].replaced_action, None);
    assert_eq!(repairs[1].replaced_action.as_deref(), Some("E"));
    assert!(find_timeline_breaks(&beats, Some(&baseline), &characters, &[], Some(0)).is_empty());

    assert_eq!(resolve_json(beats), resolve_json(baseline));
}

#[test]
fn test_broken_replay_halts_early() {
    let broken = resolve_json(broken());
    let output: serde_json::Value = serde_json::from_str(&broken).expect("json");
    assert_eq!(output["lastCalculatedIndex"], serde_json::json!(0));
}

#[test]
fn test_breaks_inside_resolved_prefix_are_ignored() {
    let breaks = find_timeline_breaks(&broken(), Some(&baseline()), &roster(), &[], Some(2));
    assert!(breaks.is_empty());
}
