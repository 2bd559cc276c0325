//! Deck parsing, submission validation and refresh rules

use crate::cards::hand::{DeckState, MAX_HAND_SIZE};
use crate::cards::text::build_card_action_list;
use crate::core::action::{ActionListItem, DEFAULT_ACTION};
use crate::core::card::{CardCatalog, CardType, DeckDefinition};
use crate::core::hex::{rotation_magnitude, Land};
use crate::core::types::Terrain;
use crate::core::PublicCharacter;
use crate::error::{CardValidationError, RuleResult, ValidationCode};
use crate::game::interactions::{CustomInteraction, InteractionKind};
use crate::game::logger::{ResolveLogger, VerbosityLevel};
use crate::game::timeline::{character_first_open_index, character_location_at_index, entry_at, timeline_earliest_open_index, Beat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Rotation labels a player may select, clockwise from straight ahead
pub const ROTATION_LABELS: [&str; 6] = ["0", "R1", "R2", "3", "L2", "L1"];

/// Card id that is set aside while its focus lasts
const REWIND_CARD_ID: &str = "rewind";

/// Parsed deck with every problem found along the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckParse {
    pub deck: Option<DeckDefinition>,
    pub errors: Vec<CardValidationError>,
}

impl DeckParse {
    pub fn is_valid(&self) -> bool {
        self.deck.is_some() && self.errors.is_empty()
    }
}

fn normalize_card_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_deck_list(
    raw: Option<&serde_json::Value>,
    catalog: &CardCatalog,
    card_type: CardType,
    errors: &mut Vec<CardValidationError>,
) -> Vec<String> {
    let items = raw.and_then(|value| value.as_array()).map(Vec::as_slice).unwrap_or(&[]);
    let mut seen = BTreeSet::new();
    let mut ids = Vec::new();
    for id in items.iter().filter_map(normalize_card_id) {
        if seen.contains(&id) {
            errors.push(CardValidationError::new(
                ValidationCode::DuplicateCard,
                format!("Duplicate {} card {}.", card_type.as_str(), id),
            ));
            continue;
        }
        let Some(card) = catalog.get(&id) else {
            errors.push(CardValidationError::new(ValidationCode::UnknownCard, format!("Unknown card {}.", id)));
            continue;
        };
        if card.card_type != card_type {
            errors.push(CardValidationError::new(
                ValidationCode::InvalidCardType,
                format!("Card {} is not a {} card.", id, card_type.as_str()),
            ));
            continue;
        }
        seen.insert(id.clone());
        ids.push(id);
    }
    ids
}

/// Parse an untrusted deck payload against the catalog
pub fn parse_deck_definition(deck: &serde_json::Value, catalog: &CardCatalog) -> DeckParse {
    let Some(raw) = deck.as_object() else {
        return DeckParse {
            deck: None,
            errors: vec![CardValidationError::new(ValidationCode::MissingDeck, "Deck payload is missing.")],
        };
    };
    let mut errors = Vec::new();
    let movement = normalize_deck_list(raw.get("movement"), catalog, CardType::Movement, &mut errors);
    let ability = normalize_deck_list(raw.get("ability"), catalog, CardType::Ability, &mut errors);
    if movement.is_empty() {
        errors.push(CardValidationError::new(ValidationCode::MissingMovement, "Deck has no movement cards."));
    }
    if ability.is_empty() {
        errors.push(CardValidationError::new(ValidationCode::MissingAbility, "Deck has no ability cards."));
    }
    DeckParse {
        deck: Some(DeckDefinition { movement, ability }),
        errors,
    }
}

/// Opening deck state: the first abilities form the hand
pub fn create_deck_state(deck: &DeckDefinition, base_max_hand_size: Option<usize>) -> DeckState {
    let hand_size = base_max_hand_size.unwrap_or(MAX_HAND_SIZE);
    let split = hand_size.min(deck.ability.len());
    DeckState {
        movement: deck.movement.clone(),
        ability_hand: deck.ability[..split].to_vec(),
        ability_deck: deck.ability[split..].to_vec(),
        base_max_hand_size,
        ..DeckState::default()
    }
}

/// Index of the step where the card refreshes: the last `E`, else the final step
pub fn get_refresh_offset<S: AsRef<str>>(actions: &[S]) -> Option<usize> {
    if actions.is_empty() {
        return None;
    }
    actions
        .iter()
        .rposition(|action| action.as_ref().trim() == DEFAULT_ACTION)
        .or(Some(actions.len() - 1))
}

fn allowed_rotations(restriction: &str) -> Option<Vec<&'static str>> {
    let trimmed = restriction.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return None;
    }
    let (min, max) = trimmed.split_once('-')?;
    let min: i32 = min.trim().parse().ok()?;
    let max: i32 = max.trim().parse().ok()?;
    Some(
        ROTATION_LABELS
            .iter()
            .copied()
            .filter(|label| rotation_magnitude(label).is_some_and(|m| m >= min && m <= max))
            .collect(),
    )
}

/// Whether a card's rotation range permits `rotation`
pub fn is_rotation_allowed(rotation: &str, rotations: &str) -> bool {
    if !ROTATION_LABELS.iter().any(|label| *label == rotation) {
        return false;
    }
    allowed_rotations(rotations).map_or(true, |allowed| allowed.iter().any(|label| *label == rotation))
}

/// A player's card pick for the next action set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSubmission {
    #[serde(default)]
    pub active_card_id: Option<String>,
    #[serde(default)]
    pub passive_card_id: Option<String>,
    #[serde(default)]
    pub rotation: String,
}

impl ActionSubmission {
    pub fn new(active: &str, passive: &str, rotation: &str) -> Self {
        ActionSubmission {
            active_card_id: Some(active.to_string()),
            passive_card_id: Some(passive.to_string()),
            rotation: rotation.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedSubmission {
    pub action_list: Vec<ActionListItem>,
    pub movement_card_id: String,
    pub ability_card_id: String,
}

fn invalid(code: ValidationCode, message: &str) -> CardValidationError {
    CardValidationError::new(code, message)
}

/// Check a submission against the player's cards and build its action list
pub fn validate_action_submission(
    submission: &ActionSubmission,
    deck_state: &DeckState,
    catalog: &CardCatalog,
) -> RuleResult<ValidatedSubmission> {
    let trimmed = |id: &Option<String>| id.as_deref().map(str::trim).filter(|id| !id.is_empty()).map(str::to_string);
    let (Some(active_id), Some(passive_id)) = (trimmed(&submission.active_card_id), trimmed(&submission.passive_card_id)) else {
        return Err(invalid(ValidationCode::MissingCard, "Active and passive card IDs are required."));
    };
    if active_id == passive_id {
        return Err(invalid(ValidationCode::InvalidCardPair, "Active and passive cards must differ."));
    }
    let (Some(active), Some(passive)) = (catalog.get(&active_id), catalog.get(&passive_id)) else {
        return Err(invalid(ValidationCode::UnknownCard, "Unknown card ID submitted."));
    };
    if active.card_type == passive.card_type {
        return Err(invalid(
            ValidationCode::InvalidCardPair,
            "Active/passive cards must be different types.",
        ));
    }

    let (movement, ability) = if active.is_movement() { (active, passive) } else { (passive, active) };
    if !deck_state.movement.contains(&movement.id) {
        return Err(invalid(ValidationCode::CardUnavailable, "Movement card not in deck."));
    }
    if !deck_state.has_ability_in_hand(&ability.id) {
        return Err(invalid(ValidationCode::CardUnavailable, "Ability card not in hand."));
    }
    if deck_state.exhausted_movement_ids.contains(&movement.id) {
        return Err(invalid(ValidationCode::CardExhausted, "Movement card is exhausted."));
    }

    let rotation = submission.rotation.trim();
    if rotation.is_empty() {
        return Err(invalid(ValidationCode::RotationMissing, "Rotation selection is required."));
    }
    if !is_rotation_allowed(rotation, &active.rotations) {
        return Err(invalid(ValidationCode::RotationInvalid, "Rotation is not allowed for this card."));
    }
    if active.actions.is_empty() {
        return Err(invalid(ValidationCode::NoActionList, "Active card has no actions."));
    }
    if get_refresh_offset(&active.actions).is_none() {
        return Err(invalid(ValidationCode::NoRefresh, "Active card has no refresh step."));
    }

    Ok(ValidatedSubmission {
        action_list: build_card_action_list(active, passive, rotation),
        movement_card_id: movement.id.clone(),
        ability_card_id: ability.id.clone(),
    })
}

/// Cards spent by an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUse {
    pub movement_card_id: String,
    pub ability_card_id: String,
    #[serde(default)]
    pub active_card_id: Option<String>,
    #[serde(default)]
    pub passive_card_id: Option<String>,
}

impl From<&ValidatedSubmission> for CardUse {
    fn from(validated: &ValidatedSubmission) -> Self {
        let first = validated.action_list.first();
        CardUse {
            movement_card_id: validated.movement_card_id.clone(),
            ability_card_id: validated.ability_card_id.clone(),
            active_card_id: first.and_then(|item| item.card_id.clone()),
            passive_card_id: first.and_then(|item| item.passive_card_id.clone()),
        }
    }
}

/// Exhaust the movement card and cycle the ability card to the deck back
///
/// An active rewind is set aside as focused instead of cycling.
pub fn apply_card_use(deck_state: &mut DeckState, card_use: &CardUse) -> RuleResult<()> {
    if card_use.active_card_id.is_some() {
        deck_state.active_card_id = card_use.active_card_id.clone();
    }
    if card_use.passive_card_id.is_some() {
        deck_state.passive_card_id = card_use.passive_card_id.clone();
    }
    deck_state.exhausted_movement_ids.insert(card_use.movement_card_id.clone());
    let rewind_active =
        card_use.ability_card_id == REWIND_CARD_ID && card_use.active_card_id.as_deref() == Some(REWIND_CARD_ID);
    if rewind_active {
        deck_state.set_focused_ability_card(REWIND_CARD_ID)?;
    } else if let Some(index) = deck_state.ability_hand.iter().position(|id| *id == card_use.ability_card_id) {
        let used = deck_state.ability_hand.remove(index);
        deck_state.ability_deck.push(used);
    }
    deck_state.last_refresh_index = None;
    Ok(())
}

/// Client-facing view of a deck state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCardState {
    pub deck: Vec<String>,
    pub movement_hand: Vec<String>,
    pub ability_hand: Vec<String>,
    pub active_card_id: Option<String>,
    pub passive_card_id: Option<String>,
    pub discard_pile: Vec<String>,
    pub focused_ability_card_ids: Vec<String>,
    pub last_refresh_index: Option<usize>,
}

pub fn build_player_card_state(deck_state: &DeckState) -> PlayerCardState {
    PlayerCardState {
        deck: deck_state.ability_deck.clone(),
        movement_hand: deck_state.movement.clone(),
        ability_hand: deck_state.ability_hand.clone(),
        active_card_id: deck_state.active_card_id.clone(),
        passive_card_id: deck_state.passive_card_id.clone(),
        discard_pile: deck_state.exhausted_movement_ids.iter().cloned().collect(),
        focused_ability_card_ids: deck_state.focused_ability_card_ids.iter().cloned().collect(),
        last_refresh_index: deck_state.last_refresh_index,
    }
}

/// Refresh characters standing on land at the timeline's earliest open beat
///
/// A refresh clears exhausted movement and draws abilities up to the hand
/// cap. `pending_beat_index` is the beat of an in-flight submission round,
/// which blocks refreshes at that beat.
pub fn resolve_land_refreshes(
    deck_states: &mut BTreeMap<crate::core::UserId, DeckState>,
    beats: &[Beat],
    characters: &[PublicCharacter],
    land: &Land,
    interactions: &[CustomInteraction],
    pending_beat_index: Option<usize>,
    logger: Option<&ResolveLogger>,
) {
    if deck_states.is_empty() || interactions.iter().any(CustomInteraction::is_pending) {
        return;
    }
    let earliest = timeline_earliest_open_index(beats, characters);
    if pending_beat_index == Some(earliest) {
        return;
    }
    let combo_continue: BTreeMap<&str, usize> = interactions
        .iter()
        .filter(|interaction| interaction.kind == InteractionKind::Combo && interaction.is_resolved())
        .filter(|interaction| interaction.resolution.as_ref().and_then(|r| r.continue_choice) == Some(true))
        .map(|interaction| (interaction.actor_user_id.as_str(), interaction.beat_index))
        .collect();

    for (user_id, deck_state) in deck_states.iter_mut() {
        let Some(character) = characters.iter().find(|character| character.matches_key(user_id.as_str())) else {
            continue;
        };
        let first_open = character_first_open_index(beats, character);
        if first_open != earliest
            || combo_continue.get(user_id.as_str()) == Some(&first_open)
            || deck_state.last_refresh_index == Some(first_open)
        {
            continue;
        }
        let entry = entry_at(beats, first_open, character);
        if entry.is_some_and(|entry| entry.action != DEFAULT_ACTION) {
            continue;
        }
        let location = character_location_at_index(beats, character, first_open).unwrap_or(character.position);
        let on_land = match entry.and_then(|entry| entry.terrain) {
            Some(terrain) => terrain == Terrain::Land,
            None => land.contains(location),
        };
        if !on_land {
            continue;
        }
        deck_state.exhausted_movement_ids.clear();
        let cap = deck_state.max_hand_size();
        while deck_state.ability_hand.len() < cap && !deck_state.ability_deck.is_empty() {
            let next = deck_state.ability_deck.remove(0);
            deck_state.ability_hand.push(next);
        }
        deck_state.last_refresh_index = Some(first_open);
        crate::resolve_log!(
            logger,
            VerbosityLevel::Normal,
            "refresh",
            "user {} beat {} hand {}",
            user_id,
            first_open,
            deck_state.ability_hand.len()
        );
    }
}
