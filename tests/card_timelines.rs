//! Card pair to timeline, against the bundled catalog
//!
//! Covers action-list construction with passive text, submission checks,
//! card use bookkeeping and a full submit-then-resolve round.

use hex_clash::cards::{
    apply_card_use, build_card_action_list, get_refresh_offset, validate_action_submission, ActionSubmission, CardUse,
    DeckState,
};
use hex_clash::core::{CardCatalog, HexCoord, PowerTable, PublicCharacter, RotationSource};
use hex_clash::error::ValidationCode;
use hex_clash::game::{apply_action_set_to_beats, resolve_beats, InteractionKind, ResolveContext, ResolveInput};
use hex_clash::loader::load_catalog_sync;
use similar_asserts::assert_eq;
use std::path::PathBuf;

fn catalog() -> CardCatalog {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/cards.json");
    load_catalog_sync(path).expect("bundled catalog")
}

fn labels(catalog: &CardCatalog, active: &str, passive: &str, rotation: &str) -> Vec<String> {
    let (active, passive) = (catalog.get(active).expect("active"), catalog.get(passive).expect("passive"));
    build_card_action_list(active, passive, rotation)
        .into_iter()
        .map(|item| item.action)
        .collect()
}

fn deck(movement: &[&str], hand: &[&str]) -> DeckState {
    DeckState {
        movement: movement.iter().map(|id| id.to_string()).collect(),
        ability_hand: hand.iter().map(|id| id.to_string()).collect(),
        ..Default::default()
    }
}

#[test]
fn test_every_bundled_card_has_a_refresh_step() {
    let catalog = catalog();
    for card in catalog.movement().chain(catalog.ability()) {
        assert!(!card.actions.is_empty(), "{} has no actions", card.id);
        assert_eq!(
            get_refresh_offset(&card.actions),
            Some(card.actions.len() - 1),
            "{} should refresh on its last step",
            card.id
        );
    }
}

#[test]
fn test_plain_pair_keeps_card_actions() {
    let catalog = catalog();
    let step = catalog.get("step").expect("step");
    let trip = catalog.get("trip").expect("trip");
    let list = build_card_action_list(step, trip, "R1");
    assert_eq!(list.iter().map(|item| item.action.as_str()).collect::<Vec<_>>(), vec!["m", "E"]);
    assert_eq!(list[0].rotation, "R1");
    assert_eq!(list[0].rotation_source, Some(RotationSource::Selected));
    assert_eq!(list[1].rotation, "");
    assert!(list.iter().all(|item| item.priority == step.priority));
    assert_eq!(list[0].card_id.as_deref(), Some("step"));
    assert_eq!(list[0].passive_card_id.as_deref(), Some("trip"));
}

#[test]
fn test_jab_passive_raises_priority() {
    let catalog = catalog();
    let step = catalog.get("step").expect("step");
    let jab = catalog.get("jab").expect("jab");
    let list = build_card_action_list(step, jab, "0");
    assert!(list.iter().all(|item| item.priority == step.priority + 30));
}

#[test]
fn test_guard_passive_turns_waits_into_blocks() {
    let catalog = catalog();
    assert_eq!(labels(&catalog, "leap", "guard", "0"), vec!["Bb", "3j", "E"]);
}

#[test]
fn test_push_kick_passive_moves_backwards() {
    let catalog = catalog();
    assert_eq!(labels(&catalog, "step", "push-kick", "0"), vec!["Bm", "E"]);
}

#[test]
fn test_throw_cards_tag_their_attacks() {
    let catalog = catalog();
    let hip_throw = catalog.get("hip-throw").expect("hip-throw");
    let step = catalog.get("step").expect("step");
    let list = build_card_action_list(hip_throw, step, "0");
    assert_eq!(list[0].interaction.as_ref().map(|i| i.kind.as_str()), Some("throw"));
    assert!(list[1].interaction.is_none());
}

#[test]
fn test_submission_rules() {
    let catalog = catalog();
    let state = deck(&["step", "dash"], &["jab", "guard"]);

    let accepted = validate_action_submission(&ActionSubmission::new("jab", "step", "0"), &state, &catalog)
        .expect("accepted");
    assert_eq!(accepted.movement_card_id, "step");
    assert_eq!(accepted.ability_card_id, "jab");

    let cases = [
        (ActionSubmission::new("jab", "jab", "0"), ValidationCode::InvalidCardPair),
        (ActionSubmission::new("jab", "guard", "0"), ValidationCode::InvalidCardPair),
        (ActionSubmission::new("ghost", "step", "0"), ValidationCode::UnknownCard),
        (ActionSubmission::new("hammer", "step", "0"), ValidationCode::CardUnavailable),
        (ActionSubmission::new("advance", "jab", "0"), ValidationCode::CardUnavailable),
        (ActionSubmission::new("dash", "jab", "3"), ValidationCode::RotationInvalid),
        (ActionSubmission::new("dash", "jab", ""), ValidationCode::RotationMissing),
    ];
    for (submission, code) in cases {
        let err = validate_action_submission(&submission, &state, &catalog).expect_err("rejected");
        assert_eq!(err.code, code, "{:?}", submission);
    }
}

#[test]
fn test_exhausted_movement_is_rejected() {
    let catalog = catalog();
    let mut state = deck(&["step", "dash"], &["jab", "guard"]);
    let accepted = validate_action_submission(&ActionSubmission::new("step", "jab", "0"), &state, &catalog)
        .expect("accepted");
    apply_card_use(&mut state, &CardUse::from(&accepted)).expect("card use");

    assert!(state.exhausted_movement_ids.contains("step"));
    assert_eq!(state.ability_hand, vec!["guard".to_string()]);
    assert_eq!(state.ability_deck, vec!["jab".to_string()]);
    assert_eq!(state.active_card_id.as_deref(), Some("step"));

    let err = validate_action_submission(&ActionSubmission::new("step", "guard", "0"), &state, &catalog)
        .expect_err("exhausted");
    assert_eq!(err.code, ValidationCode::CardExhausted);
}

#[test]
fn test_submitted_throw_halts_for_direction() {
    let catalog = catalog();
    let powers = PowerTable::builtin();
    let characters = vec![
        PublicCharacter::new("alpha", "murelious", HexCoord::new(0, 0), 180),
        PublicCharacter::new("beta", "murelious", HexCoord::new(1, 0), 0),
    ];
    let alpha = validate_action_submission(
        &ActionSubmission::new("hip-throw", "step", "0"),
        &deck(&["step"], &["hip-throw"]),
        &catalog,
    )
    .expect("alpha accepted");
    let beta = validate_action_submission(
        &ActionSubmission::new("step", "trip", "0"),
        &deck(&["step"], &["trip"]),
        &catalog,
    )
    .expect("beta accepted");

    let beats = apply_action_set_to_beats(&[], &characters, "alpha", &alpha.action_list, None);
    let beats = apply_action_set_to_beats(&beats, &characters, "beta", &beta.action_list, None);
    assert_eq!(beats.len(), 2);
    assert_eq!(beats[0][0].card_id.as_deref(), Some("hip-throw"));

    let output = resolve_beats(
        ResolveInput {
            beats,
            characters,
            ..Default::default()
        },
        ResolveContext::new(&catalog, &powers),
    );
    let pending: Vec<_> = output.pending_interactions().collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, InteractionKind::Throw);
    assert_eq!(pending[0].id, "throw:0:alpha:beta");
    assert_eq!(output.last_calculated_index, Some(0));
}
