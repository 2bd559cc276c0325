//! Custom interactions
//!
//! An interaction is an external choice the engine needs before it can
//! resolve a beat. The engine creates interactions as `pending` and halts
//! at their beat; a player resolves one by id, and the next resolution pass
//! reads the resolved payload. Ids are derived from the interaction's slot
//! (type, beat, actor, target) so a replay finds the same record again.

use crate::cards::hand::{DeckState, HandSyncMode};
use crate::cards::triggers::{hand_trigger_definition, HandTriggerEffect, HAND_TRIGGER_DEFINITIONS};
use crate::core::action::{is_combo_action, ActionListItem};
use crate::core::card::{CardCatalog, CardType};
use crate::core::hex::{HexCoord, Land};
use crate::core::types::UserId;
use crate::core::PublicCharacter;
use crate::error::{CardValidationError, RuleResult, ValidationCode};
use crate::game::logger::{ResolveLogger, VerbosityLevel};
use crate::game::timeline::{character_for_key, character_location_at_index, entry_at, last_entry_for_character, Beat};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-user flag: the player holds a card with a combo step
pub type ComboAvailability = BTreeMap<UserId, bool>;
/// Per-user set of hand-trigger card ids the player could play
pub type HandTriggerAvailability = BTreeMap<UserId, BTreeSet<String>>;
/// Per-user flag: guard continue may be offered (missing means yes)
pub type GuardContinueAvailability = BTreeMap<UserId, bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    Throw,
    Combo,
    GuardContinue,
    RewindFocus,
    RewindReturn,
    HavenPlatform,
    Draw,
    Discard,
    HandTrigger,
    /// Record of a parry counter; created resolved
    Parry,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Throw => "throw",
            InteractionKind::Combo => "combo",
            InteractionKind::GuardContinue => "guard-continue",
            InteractionKind::RewindFocus => "rewind-focus",
            InteractionKind::RewindReturn => "rewind-return",
            InteractionKind::HavenPlatform => "haven-platform",
            InteractionKind::Draw => "draw",
            InteractionKind::Discard => "discard",
            InteractionKind::HandTrigger => "hand-trigger",
            InteractionKind::Parry => "parry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionStatus {
    Pending,
    Resolved,
}

/// Why a rewind focus stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusEndReason {
    Returned,
    Knockback,
    Stun,
}

/// Resolution payload; which fields are set depends on the interaction type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionResolution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_index: Option<i32>,
    #[serde(rename = "continue", default, skip_serializing_if = "Option::is_none")]
    pub continue_choice: Option<bool>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_card: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignite: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub movement_card_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ability_card_ids: Vec<String>,
    /// Engine-created draw already applied to the deck
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_hex: Option<HexCoord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_to_anchor: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_hex: Option<HexCoord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_interaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub return_actions: Vec<ActionListItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by_occupant: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_occupant_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stun_duration: Option<i32>,
    /// Beat at which a haven platform is used up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_beat_index: Option<usize>,
    /// Rewind focus still holding its anchor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_start_beat_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_beat_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<FocusEndReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard_repeat_applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard_repeat_beat_index: Option<usize>,
}

impl InteractionResolution {
    pub fn direction(index: i32) -> Self {
        InteractionResolution {
            direction_index: Some(index),
            ..Default::default()
        }
    }

    pub fn choice(value: bool) -> Self {
        InteractionResolution {
            continue_choice: Some(value),
            ..Default::default()
        }
    }
}

/// A pending or resolved external choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomInteraction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub beat_index: usize,
    pub actor_user_id: UserId,
    pub target_user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_user_id: Option<UserId>,
    pub status: InteractionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<InteractionResolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discard_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_count: Option<u32>,
    /// Movement restores a draw is waiting on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_movement_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_trigger_order: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attack_hexes: Vec<HexCoord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_type: Option<CardType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<HandTriggerEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kbf: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub touching_hexes: Vec<HexCoord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_hex: Option<HexCoord>,
}

/// `type:beat:actor:target`
pub fn interaction_id(kind: InteractionKind, beat_index: usize, actor: &str, target: &str) -> String {
    format!("{}:{}:{}:{}", kind.as_str(), beat_index, actor, target)
}

/// Key recording that a hand trigger was offered: `card:beat:actor`
pub fn hand_trigger_key(card_id: &str, beat_index: usize, actor: &str) -> String {
    format!("{}:{}:{}", card_id, beat_index, actor)
}

/// `hand-trigger:card:beat:actor:other`
pub fn hand_trigger_interaction_id(card_id: &str, beat_index: usize, actor: &str, other: &str) -> String {
    format!("{}:{}:{}:{}:{}", InteractionKind::HandTrigger.as_str(), card_id, beat_index, actor, other)
}

impl CustomInteraction {
    pub fn new(
        kind: InteractionKind,
        beat_index: usize,
        actor: impl Into<UserId>,
        target: impl Into<UserId>,
        status: InteractionStatus,
    ) -> Self {
        let actor_user_id = actor.into();
        let target_user_id = target.into();
        CustomInteraction {
            id: interaction_id(kind, beat_index, actor_user_id.as_str(), target_user_id.as_str()),
            kind,
            beat_index,
            actor_user_id,
            target_user_id,
            source_user_id: None,
            status,
            resolution: None,
            discard_count: None,
            draw_count: None,
            draw_movement_count: None,
            hand_trigger_order: None,
            attack_hexes: Vec::new(),
            card_id: None,
            card_type: None,
            effect: None,
            damage: None,
            kbf: None,
            direction_index: None,
            touching_hexes: Vec::new(),
            target_hex: None,
        }
    }

    pub fn pending(kind: InteractionKind, beat_index: usize, actor: impl Into<UserId>, target: impl Into<UserId>) -> Self {
        Self::new(kind, beat_index, actor, target, InteractionStatus::Pending)
    }

    pub fn resolved(
        kind: InteractionKind,
        beat_index: usize,
        actor: impl Into<UserId>,
        target: impl Into<UserId>,
        resolution: InteractionResolution,
    ) -> Self {
        let mut interaction = Self::new(kind, beat_index, actor, target, InteractionStatus::Resolved);
        interaction.resolution = Some(resolution);
        interaction
    }

    /// Hand-trigger offer for `card_id`, keyed on the other party
    pub fn hand_trigger(card_id: &str, beat_index: usize, actor: &str, target: &str, source: Option<&str>) -> Self {
        let other = source.unwrap_or(target);
        let mut interaction = Self::pending(InteractionKind::HandTrigger, beat_index, actor, target);
        interaction.id = hand_trigger_interaction_id(card_id, beat_index, actor, other);
        interaction.source_user_id = source.map(UserId::from);
        interaction.card_id = Some(card_id.to_string());
        if let Some(definition) = hand_trigger_definition(Some(card_id)) {
            interaction.card_type = Some(definition.card_type);
            interaction.effect = Some(definition.effect);
            interaction.discard_count = Some(definition.discard_count);
        }
        interaction
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == InteractionStatus::Pending
    }

    pub fn is_resolved(&self) -> bool {
        self.status == InteractionStatus::Resolved
    }

    /// Mark resolved with a payload
    pub fn resolve(&mut self, resolution: InteractionResolution) {
        self.status = InteractionStatus::Resolved;
        self.resolution = Some(resolution);
    }

    /// Mutable payload, created empty if missing
    pub fn resolution_mut(&mut self) -> &mut InteractionResolution {
        self.resolution.get_or_insert_with(InteractionResolution::default)
    }

    /// Resolved throw direction, when in range
    pub fn resolved_direction(&self) -> Option<usize> {
        let index = self.resolution.as_ref()?.direction_index?;
        (0..6).contains(&index).then_some(index as usize)
    }

    /// Resolved `continue` choice
    pub fn continues(&self) -> bool {
        self.is_resolved() && self.resolution.as_ref().and_then(|r| r.continue_choice) == Some(true)
    }

    /// Resolved hand trigger the player chose to play
    pub fn hand_trigger_used(&self) -> bool {
        if !self.is_resolved() {
            return false;
        }
        self.resolution
            .as_ref()
            .and_then(|r| r.use_card.or(r.ignite))
            .unwrap_or(false)
    }

    pub fn returns_to_anchor(&self) -> bool {
        self.is_resolved() && self.resolution.as_ref().and_then(|r| r.return_to_anchor) == Some(true)
    }
}

/// Interactions in creation order, indexed by id
///
/// Ids are unique; pushing an id that already exists replaces the record.
#[derive(Debug, Clone, Default)]
pub struct InteractionLog {
    records: Vec<CustomInteraction>,
    index: FxHashMap<String, usize>,
}

impl InteractionLog {
    pub fn from_vec(interactions: Vec<CustomInteraction>) -> Self {
        let mut log = InteractionLog::default();
        for interaction in interactions {
            log.push(interaction);
        }
        log
    }

    pub fn get(&self, id: &str) -> Option<&CustomInteraction> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CustomInteraction> {
        let i = *self.index.get(id)?;
        self.records.get_mut(i)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn push(&mut self, interaction: CustomInteraction) {
        match self.index.get(&interaction.id) {
            Some(&i) => self.records[i] = interaction,
            None => {
                self.index.insert(interaction.id.clone(), self.records.len());
                self.records.push(interaction);
            }
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CustomInteraction> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, CustomInteraction> {
        self.records.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_vec(self) -> Vec<CustomInteraction> {
        self.records
    }
}

/// The interaction a player should be shown next
///
/// Pending throws are always visible and win. Other types must sit after
/// the resolved prefix, and a combo is only shown while its actor's entry
/// is still the combo marker. With `local_user`, only that player's
/// interactions count. Earliest beat first.
pub fn select_pending_interaction<'a>(
    interactions: &'a [CustomInteraction],
    beats: &[Beat],
    characters: &[PublicCharacter],
    local_user: Option<&str>,
    resolved_index: Option<usize>,
) -> Option<&'a CustomInteraction> {
    let candidates = interactions
        .iter()
        .filter(|interaction| interaction.is_pending())
        .filter(|interaction| local_user.map_or(true, |user| interaction.actor_user_id == user));

    let mut throws: Vec<&CustomInteraction> = Vec::new();
    let mut others: Vec<&CustomInteraction> = Vec::new();
    for interaction in candidates {
        if interaction.kind == InteractionKind::Throw {
            throws.push(interaction);
            continue;
        }
        if resolved_index.is_some_and(|resolved| interaction.beat_index <= resolved) {
            continue;
        }
        if interaction.kind == InteractionKind::Combo {
            let shows_combo = character_for_key(characters, interaction.actor_user_id.as_str())
                .and_then(|character| entry_at(beats, interaction.beat_index, character))
                .is_some_and(|entry| is_combo_action(&entry.action));
            if !shows_combo {
                continue;
            }
        }
        others.push(interaction);
    }
    let earliest = |list: Vec<&'a CustomInteraction>| list.into_iter().min_by_key(|interaction| interaction.beat_index);
    earliest(throws).or_else(|| earliest(others))
}

/// A player's answer to a pending interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub direction_index: Option<i32>,
    #[serde(rename = "continue", alias = "continueCombo", alias = "comboContinue", default)]
    pub continue_choice: Option<bool>,
    #[serde(rename = "use", alias = "accept", alias = "ignite", alias = "burn", default)]
    pub use_card: Option<bool>,
    #[serde(alias = "movementIds", default)]
    pub movement_card_ids: Vec<String>,
    #[serde(alias = "abilityIds", default)]
    pub ability_card_ids: Vec<String>,
    #[serde(default)]
    pub target_hex: Option<HexCoord>,
    #[serde(default)]
    pub return_to_anchor: Option<bool>,
}

impl InteractionRequest {
    pub fn new(user_id: &str) -> Self {
        InteractionRequest {
            user_id: UserId::from(user_id),
            ..Default::default()
        }
    }

    pub fn with_direction(mut self, index: i32) -> Self {
        self.direction_index = Some(index);
        self
    }

    pub fn with_choice(mut self, value: bool) -> Self {
        self.continue_choice = Some(value);
        self
    }

    pub fn with_use(mut self, value: bool) -> Self {
        self.use_card = Some(value);
        self
    }

    pub fn with_movement(mut self, ids: &[&str]) -> Self {
        self.movement_card_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn with_ability(mut self, ids: &[&str]) -> Self {
        self.ability_card_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn with_target(mut self, target: HexCoord) -> Self {
        self.target_hex = Some(target);
        self
    }

    pub fn with_return(mut self, value: bool) -> Self {
        self.return_to_anchor = Some(value);
        self
    }
}

fn reject(code: ValidationCode, message: &str) -> CardValidationError {
    CardValidationError::new(code, message)
}

fn require_deck(deck_state: Option<&DeckState>) -> RuleResult<DeckState> {
    deck_state
        .cloned()
        .ok_or_else(|| reject(ValidationCode::MissingDeckState, "Missing deck state for player."))
}

/// Validate a player's answer and resolve the interaction
///
/// Deck mutations are computed on a copy and only committed on success,
/// so a rejected request leaves both the interaction and the deck as they
/// were.
pub fn resolve_interaction(
    interaction: &mut CustomInteraction,
    request: &InteractionRequest,
    deck_state: Option<&mut DeckState>,
) -> RuleResult<()> {
    if !interaction.is_pending() {
        return Err(reject(ValidationCode::NotPending, "Interaction is not pending."));
    }
    if interaction.actor_user_id != request.user_id {
        return Err(reject(
            ValidationCode::NotAuthorized,
            "User is not authorized to resolve this interaction.",
        ));
    }

    let mut deck_state = deck_state;
    let (resolution, updated_deck) = match interaction.kind {
        InteractionKind::Throw => {
            let direction = request
                .direction_index
                .filter(|index| (0..=5).contains(index))
                .ok_or_else(|| reject(ValidationCode::InvalidDirection, "Invalid throw direction."))?;
            (InteractionResolution::direction(direction), None)
        }
        InteractionKind::Combo | InteractionKind::GuardContinue => {
            let choice = request
                .continue_choice
                .ok_or_else(|| reject(ValidationCode::InvalidChoice, "A continue choice is required."))?;
            let mut resolution = interaction.resolution.clone().unwrap_or_default();
            resolution.continue_choice = Some(choice);
            (resolution, None)
        }
        InteractionKind::HavenPlatform => {
            let target = request
                .target_hex
                .filter(|target| interaction.touching_hexes.contains(target))
                .ok_or_else(|| reject(ValidationCode::InvalidTarget, "Platform target must touch the character."))?;
            let mut resolution = interaction.resolution.clone().unwrap_or_default();
            resolution.target_hex = Some(target);
            (resolution, None)
        }
        InteractionKind::RewindReturn => {
            let choice = request
                .return_to_anchor
                .ok_or_else(|| reject(ValidationCode::InvalidChoice, "A return choice is required."))?;
            let mut resolution = interaction.resolution.clone().unwrap_or_default();
            resolution.return_to_anchor = Some(choice);
            (resolution, None)
        }
        InteractionKind::Draw => {
            let mut deck = require_deck(deck_state.as_deref())?;
            let draw_count = interaction.draw_count.unwrap_or(0) as usize;
            let requirement = deck.draw_selection_requirement(draw_count);
            if request.movement_card_ids.len() != requirement.required_restore {
                return Err(reject(
                    ValidationCode::DrawCountMismatch,
                    "Incorrect number of movement cards selected to draw.",
                ));
            }
            let mode = if requirement.required_restore > 0 {
                HandSyncMode::Strict
            } else {
                HandSyncMode::Auto
            };
            let drawn = deck.draw_ability_cards(draw_count, &request.movement_card_ids, mode)?;
            let mut resolution = interaction.resolution.clone().unwrap_or_default();
            resolution.applied = Some(true);
            resolution.movement_card_ids = drawn.movement.restored;
            resolution.ability_card_ids = drawn.drawn;
            interaction.draw_movement_count = None;
            (resolution, Some(deck))
        }
        InteractionKind::Discard => {
            let mut deck = require_deck(deck_state.as_deref())?;
            let requirements = deck.discard_requirements(interaction.discard_count.unwrap_or(0) as usize);
            if request.ability_card_ids.len() != requirements.ability_discard_count
                || request.movement_card_ids.len() != requirements.movement_discard_count
            {
                return Err(reject(
                    ValidationCode::DiscardCountMismatch,
                    "Incorrect number of cards selected for discard.",
                ));
            }
            let discarded =
                deck.discard_ability_cards(&request.ability_card_ids, &request.movement_card_ids, HandSyncMode::Strict)?;
            let resolution = InteractionResolution {
                ability_card_ids: discarded.discarded,
                movement_card_ids: discarded.movement.discarded,
                ..Default::default()
            };
            (resolution, Some(deck))
        }
        InteractionKind::HandTrigger => {
            let used = request
                .use_card
                .ok_or_else(|| reject(ValidationCode::InvalidChoice, "A hand trigger choice is required."))?;
            if used {
                resolve_hand_trigger_use(interaction, request, deck_state.as_deref())?
            } else {
                let resolution = InteractionResolution {
                    use_card: Some(false),
                    ..Default::default()
                };
                (resolution, None)
            }
        }
        InteractionKind::RewindFocus | InteractionKind::Parry => {
            return Err(reject(ValidationCode::InvalidChoice, "Interaction cannot be resolved by a player."));
        }
    };

    if let (Some(updated), Some(target)) = (updated_deck, deck_state.as_deref_mut()) {
        *target = updated;
    }
    interaction.resolve(resolution);
    Ok(())
}

fn resolve_hand_trigger_use(
    interaction: &CustomInteraction,
    request: &InteractionRequest,
    deck_state: Option<&DeckState>,
) -> RuleResult<(InteractionResolution, Option<DeckState>)> {
    let mut deck = require_deck(deck_state)?;
    let card_id = interaction.card_id.as_deref().unwrap_or_default();
    let definition = hand_trigger_definition(Some(card_id))
        .ok_or_else(|| reject(ValidationCode::UnknownHandTrigger, "Unknown hand trigger card."))?;

    let discarded = match definition.card_type {
        CardType::Ability => {
            if !deck.has_ability_in_hand(card_id) {
                return Err(reject(ValidationCode::CardNotInHand, "Card is not in hand."));
            }
            let requirements = deck.discard_requirements(definition.discard_count as usize);
            if request.movement_card_ids.len() != requirements.movement_discard_count {
                return Err(reject(
                    ValidationCode::DiscardCountMismatch,
                    "Incorrect number of movement cards selected for discard.",
                ));
            }
            let discarded =
                deck.discard_ability_cards(&[card_id.to_string()], &request.movement_card_ids, HandSyncMode::Strict)?;
            if definition.effect == HandTriggerEffect::Vengeance {
                let draw_count = interaction.draw_count.unwrap_or(0) as usize;
                if draw_count > 0 {
                    deck.draw_ability_cards(draw_count, &[], HandSyncMode::Auto)?;
                }
            }
            discarded
        }
        CardType::Movement => {
            if !deck.has_movement_in_hand(card_id) {
                return Err(reject(ValidationCode::CardNotInHand, "Card is not in hand."));
            }
            if deck.ability_hand.is_empty() {
                return Err(reject(ValidationCode::MissingAbility, "Ability card required for discard."));
            }
            if request.ability_card_ids.len() != 1 {
                return Err(reject(
                    ValidationCode::DiscardCountMismatch,
                    "Incorrect number of ability cards selected for discard.",
                ));
            }
            if deck.discard_requirements(1).movement_discard_count != 1 {
                return Err(reject(
                    ValidationCode::MovementDiscardRequired,
                    "Movement discard must follow hand size rules.",
                ));
            }
            deck.discard_ability_cards(&request.ability_card_ids, &[card_id.to_string()], HandSyncMode::Strict)?
        }
    };

    let resolution = InteractionResolution {
        use_card: Some(true),
        movement_card_ids: discarded.movement.discarded,
        ability_card_ids: discarded.discarded,
        ..Default::default()
    };
    Ok((resolution, Some(deck)))
}

/// Apply engine-created draws to deck states
///
/// A resolved draw not yet `applied` draws automatically, unless the
/// player must pick which movement cards to restore; then it goes back to
/// pending with the restore count attached.
pub fn apply_draw_interactions(
    deck_states: &mut BTreeMap<UserId, DeckState>,
    interactions: &mut [CustomInteraction],
    logger: Option<&ResolveLogger>,
) {
    for interaction in interactions.iter_mut() {
        if interaction.kind != InteractionKind::Draw || !interaction.is_resolved() {
            continue;
        }
        if interaction.resolution.as_ref().and_then(|r| r.applied) == Some(true) {
            continue;
        }
        let Some(deck_state) = deck_states.get_mut(&interaction.actor_user_id) else {
            continue;
        };
        let draw_count = interaction.draw_count.unwrap_or(0) as usize;
        let requirement = deck_state.draw_selection_requirement(draw_count);
        if requirement.requires_selection {
            interaction.status = InteractionStatus::Pending;
            interaction.draw_movement_count = Some(requirement.required_restore);
            continue;
        }
        if draw_count > 0 {
            if let Err(error) = deck_state.draw_ability_cards(draw_count, &[], HandSyncMode::Auto) {
                crate::resolve_log!(
                    logger,
                    VerbosityLevel::Minimal,
                    "draw",
                    "draw for {} failed: {}",
                    interaction.actor_user_id,
                    error
                );
                continue;
            }
        }
        interaction.resolution_mut().applied = Some(true);
    }
}

/// Which players hold an available card with a combo step
pub fn build_combo_availability(deck_states: &BTreeMap<UserId, DeckState>, catalog: &CardCatalog) -> ComboAvailability {
    deck_states
        .iter()
        .map(|(user_id, deck_state)| {
            let movement = deck_state
                .movement
                .iter()
                .filter(|id| !deck_state.exhausted_movement_ids.contains(id.as_str()));
            let has_combo = movement.chain(deck_state.ability_hand.iter()).any(|id| {
                catalog
                    .get(id)
                    .is_some_and(|card| card.actions.iter().any(|action| is_combo_action(action)))
            });
            (user_id.clone(), has_combo)
        })
        .collect()
}

/// Hand-trigger cards each player could currently play
pub fn build_hand_trigger_availability(deck_states: &BTreeMap<UserId, DeckState>) -> HandTriggerAvailability {
    let mut availability = HandTriggerAvailability::new();
    for (user_id, deck_state) in deck_states {
        let available: BTreeSet<String> = HAND_TRIGGER_DEFINITIONS
            .iter()
            .filter(|definition| match definition.card_type {
                CardType::Ability => deck_state.has_ability_in_hand(definition.card_id),
                CardType::Movement => deck_state.has_movement_in_hand(definition.card_id),
            })
            .map(|definition| definition.card_id.to_string())
            .collect();
        if !available.is_empty() {
            availability.insert(user_id.clone(), available);
        }
    }
    availability
}

fn id_hash(value: &str) -> u32 {
    value
        .chars()
        .fold(0u32, |hash, c| hash.wrapping_mul(31).wrapping_add(c as u32))
}

/// Order in which simultaneous pending hand triggers are offered
///
/// Most damaged actor first, then smaller hand, then further from the land
/// centre, then a stable hash of the id. Orders start at 1.
pub fn build_hand_trigger_order(
    interactions: &[CustomInteraction],
    beats: &[Beat],
    characters: &[PublicCharacter],
    land: &Land,
    deck_states: &BTreeMap<UserId, DeckState>,
) -> BTreeMap<String, usize> {
    let center = land.center();
    let mut ranked: Vec<(i32, usize, i32, u32, &str)> = interactions
        .iter()
        .filter(|interaction| interaction.kind == InteractionKind::HandTrigger && interaction.is_pending())
        .map(|interaction| {
            let character = character_for_key(characters, interaction.actor_user_id.as_str());
            let damage = character
                .and_then(|character| last_entry_for_character(beats, character, interaction.beat_index))
                .map_or(0, |entry| entry.damage);
            let hand_size = deck_states
                .get(&interaction.actor_user_id)
                .map_or(0, |deck| deck.movement_hand_ids().len() + deck.ability_hand.len());
            let distance = character.map_or(i32::MAX, |character| {
                character_location_at_index(beats, character, interaction.beat_index)
                    .unwrap_or(character.position)
                    .distance(center)
            });
            (damage, hand_size, distance, id_hash(&interaction.id), interaction.id.as_str())
        })
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(b.2.cmp(&a.2)).then(a.3.cmp(&b.3)));
    ranked
        .into_iter()
        .enumerate()
        .map(|(index, (_, _, _, _, id))| (id.to_string(), index + 1))
        .collect()
}

/// Stamp `hand_trigger_order` on pending hand triggers
pub fn assign_hand_trigger_order(
    interactions: &mut [CustomInteraction],
    beats: &[Beat],
    characters: &[PublicCharacter],
    land: &Land,
    deck_states: &BTreeMap<UserId, DeckState>,
) {
    let order = build_hand_trigger_order(interactions, beats, characters, land, deck_states);
    for interaction in interactions.iter_mut() {
        if let Some(position) = order.get(&interaction.id) {
            interaction.hand_trigger_order = Some(*position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::rules::create_deck_state;
    use crate::core::card::{CardDefinition, DeckDefinition};
    use crate::game::timeline::BeatEntry;

    fn deck() -> DeckState {
        create_deck_state(
            &DeckDefinition {
                movement: vec!["step".into(), "dash".into(), "roll".into(), "leap".into(), "hop".into()],
                ability: vec![
                    "jab".into(),
                    "iron-will".into(),
                    "vengeance".into(),
                    "guard".into(),
                    "hook".into(),
                    "spike".into(),
                ],
            },
            None,
        )
    }

    fn roster() -> Vec<PublicCharacter> {
        vec![
            PublicCharacter::new("alpha", "murelious", HexCoord::new(0, 0), 180),
            PublicCharacter::new("beta", "strylan", HexCoord::new(1, 0), 0),
        ]
    }

    #[test]
    fn test_ids_are_deterministic() {
        let interaction = CustomInteraction::pending(InteractionKind::GuardContinue, 4, "alpha", "alpha");
        assert_eq!(interaction.id, "guard-continue:4:alpha:alpha");
        let trigger = CustomInteraction::hand_trigger("iron-will", 2, "beta", "beta", Some("alpha"));
        assert_eq!(trigger.id, "hand-trigger:iron-will:2:beta:alpha");
        assert_eq!(trigger.effect, Some(HandTriggerEffect::IronWill));
        assert_eq!(hand_trigger_key("burning-strike", 3, "alpha"), "burning-strike:3:alpha");
    }

    #[test]
    fn test_interaction_json_shape() {
        let mut interaction = CustomInteraction::pending(InteractionKind::Combo, 1, "alpha", "alpha");
        interaction.resolve(InteractionResolution::choice(true));
        let json = serde_json::to_value(&interaction).unwrap();
        assert_eq!(json["type"], "combo");
        assert_eq!(json["status"], "resolved");
        assert_eq!(json["resolution"]["continue"], true);
        assert_eq!(json["actorUserId"], "alpha");
        let back: CustomInteraction = serde_json::from_value(json).unwrap();
        assert!(back.continues());
    }

    #[test]
    fn test_resolved_direction_range() {
        let mut throw = CustomInteraction::pending(InteractionKind::Throw, 0, "alpha", "beta");
        assert_eq!(throw.resolved_direction(), None);
        throw.resolve(InteractionResolution::direction(6));
        assert_eq!(throw.resolved_direction(), None);
        throw.resolve(InteractionResolution::direction(3));
        assert_eq!(throw.resolved_direction(), Some(3));
    }

    #[test]
    fn test_interaction_log_replaces_by_id() {
        let mut log = InteractionLog::from_vec(vec![
            CustomInteraction::pending(InteractionKind::Throw, 0, "alpha", "beta"),
            CustomInteraction::pending(InteractionKind::Combo, 1, "alpha", "alpha"),
        ]);
        let mut resolved = CustomInteraction::pending(InteractionKind::Throw, 0, "alpha", "beta");
        resolved.resolve(InteractionResolution::direction(2));
        log.push(resolved);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get("throw:0:alpha:beta").and_then(|i| i.resolved_direction()), Some(2));
        log.get_mut("combo:1:alpha:alpha").unwrap().resolve(InteractionResolution::choice(false));
        let ids: Vec<String> = log.into_vec().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["throw:0:alpha:beta", "combo:1:alpha:alpha"]);
    }

    #[test]
    fn test_select_pending_prefers_throws_and_visible_combos() {
        let characters = roster();
        let beats = vec![
            vec![BeatEntry::new("alpha", "a"), BeatEntry::new("beta", "W")],
            vec![BeatEntry::new("alpha", "E"), BeatEntry::new("beta", "W")],
            vec![BeatEntry::new("alpha", "Co"), BeatEntry::new("beta", "W")],
        ];
        let hidden_combo = CustomInteraction::pending(InteractionKind::Combo, 1, "alpha", "alpha");
        let combo = CustomInteraction::pending(InteractionKind::Combo, 2, "alpha", "alpha");
        let throw = CustomInteraction::pending(InteractionKind::Throw, 0, "beta", "alpha");
        let list = vec![hidden_combo.clone(), combo.clone()];
        let picked = select_pending_interaction(&list, &beats, &characters, None, None);
        assert_eq!(picked.map(|i| i.id.as_str()), Some("combo:2:alpha:alpha"));

        let list = vec![combo.clone(), throw.clone()];
        let picked = select_pending_interaction(&list, &beats, &characters, None, Some(3));
        assert_eq!(picked.map(|i| i.kind), Some(InteractionKind::Throw));

        let picked = select_pending_interaction(&list, &beats, &characters, Some("alpha"), None);
        assert_eq!(picked.map(|i| i.kind), Some(InteractionKind::Combo));
        let only_combo = [combo];
        let picked = select_pending_interaction(&only_combo, &beats, &characters, None, Some(2));
        assert!(picked.is_none());
    }

    #[test]
    fn test_resolve_rejects_wrong_user_and_state() {
        let mut throw = CustomInteraction::pending(InteractionKind::Throw, 0, "alpha", "beta");
        let error = resolve_interaction(&mut throw, &InteractionRequest::new("beta").with_direction(1), None).unwrap_err();
        assert_eq!(error.code, ValidationCode::NotAuthorized);
        let error = resolve_interaction(&mut throw, &InteractionRequest::new("alpha").with_direction(9), None).unwrap_err();
        assert_eq!(error.code, ValidationCode::InvalidDirection);
        assert!(throw.is_pending());
        resolve_interaction(&mut throw, &InteractionRequest::new("alpha").with_direction(2), None).unwrap();
        assert_eq!(throw.resolved_direction(), Some(2));
        let error = resolve_interaction(&mut throw, &InteractionRequest::new("alpha").with_direction(2), None).unwrap_err();
        assert_eq!(error.code, ValidationCode::NotPending);
    }

    #[test]
    fn test_resolve_haven_and_rewind() {
        let mut haven = CustomInteraction::pending(InteractionKind::HavenPlatform, 1, "alpha", "alpha");
        haven.touching_hexes = HexCoord::new(0, 0).touching().to_vec();
        let far = InteractionRequest::new("alpha").with_target(HexCoord::new(3, 0));
        assert_eq!(
            resolve_interaction(&mut haven, &far, None).unwrap_err().code,
            ValidationCode::InvalidTarget
        );
        let near = InteractionRequest::new("alpha").with_target(HexCoord::new(1, 0));
        resolve_interaction(&mut haven, &near, None).unwrap();
        assert_eq!(haven.resolution.as_ref().and_then(|r| r.target_hex), Some(HexCoord::new(1, 0)));

        let mut rewind = CustomInteraction::pending(InteractionKind::RewindReturn, 3, "alpha", "alpha");
        rewind.resolution = Some(InteractionResolution {
            anchor_hex: Some(HexCoord::new(0, 0)),
            ..Default::default()
        });
        resolve_interaction(&mut rewind, &InteractionRequest::new("alpha").with_return(true), None).unwrap();
        assert!(rewind.returns_to_anchor());
        assert_eq!(rewind.resolution.as_ref().and_then(|r| r.anchor_hex), Some(HexCoord::new(0, 0)));
    }

    #[test]
    fn test_resolve_discard_counts() {
        let mut state = deck();
        let mut discard = CustomInteraction::pending(InteractionKind::Discard, 2, "alpha", "alpha");
        discard.discard_count = Some(1);
        let short = InteractionRequest::new("alpha").with_ability(&["jab"]);
        assert_eq!(
            resolve_interaction(&mut discard, &short, Some(&mut state)).unwrap_err().code,
            ValidationCode::DiscardCountMismatch
        );
        assert_eq!(state.ability_hand.len(), 4);

        let missing = InteractionRequest::new("alpha").with_ability(&["spike"]).with_movement(&["leap"]);
        let error = resolve_interaction(&mut discard, &missing, Some(&mut state)).unwrap_err();
        assert_eq!(error.code, ValidationCode::AbilityNotInHand);
        assert!(state.exhausted_movement_ids.is_empty());
        assert_eq!(state.ability_hand.len(), 4);

        let full = InteractionRequest::new("alpha").with_ability(&["jab"]).with_movement(&["leap"]);
        resolve_interaction(&mut discard, &full, Some(&mut state)).unwrap();
        assert_eq!(state.ability_hand.len(), 3);
        assert!(state.exhausted_movement_ids.contains("leap"));
        assert!(discard.is_resolved());
    }

    #[test]
    fn test_resolve_hand_trigger() {
        let mut state = deck();
        let mut trigger = CustomInteraction::hand_trigger("iron-will", 1, "alpha", "alpha", Some("beta"));
        resolve_interaction(&mut trigger, &InteractionRequest::new("alpha"), Some(&mut state))
            .map_err(|e| e.code)
            .unwrap_err();
        let request = InteractionRequest::new("alpha").with_use(true).with_movement(&["leap"]);
        resolve_interaction(&mut trigger, &request, Some(&mut state)).unwrap();
        assert!(trigger.hand_trigger_used());
        assert!(!state.has_ability_in_hand("iron-will"));

        let mut declined = CustomInteraction::hand_trigger("vengeance", 1, "alpha", "alpha", None);
        resolve_interaction(&mut declined, &InteractionRequest::new("alpha").with_use(false), None).unwrap();
        assert!(!declined.hand_trigger_used());
    }

    #[test]
    fn test_vengeance_draws_after_discard() {
        let mut state = deck();
        let mut trigger = CustomInteraction::hand_trigger("vengeance", 1, "alpha", "alpha", None);
        trigger.draw_count = Some(2);
        let request = InteractionRequest::new("alpha").with_use(true).with_movement(&["leap"]);
        resolve_interaction(&mut trigger, &request, Some(&mut state)).unwrap();
        // 4 in hand, discard 1, draw 2 from the remaining deck
        assert_eq!(state.ability_hand.len(), 5);
        assert_eq!(state.ability_deck, vec!["vengeance"]);
    }

    #[test]
    fn test_apply_draw_interactions() {
        let mut states = BTreeMap::new();
        states.insert(UserId::new("alpha"), deck());
        let mut draw = CustomInteraction::resolved(
            InteractionKind::Draw,
            2,
            "alpha",
            "alpha",
            InteractionResolution {
                applied: Some(false),
                ..Default::default()
            },
        );
        draw.draw_count = Some(1);
        let mut list = vec![draw];
        apply_draw_interactions(&mut states, &mut list, None);
        assert_eq!(list[0].resolution.as_ref().and_then(|r| r.applied), Some(true));
        assert_eq!(states[&UserId::new("alpha")].ability_hand.len(), 5);

        // A second pass is a no-op
        apply_draw_interactions(&mut states, &mut list, None);
        assert_eq!(states[&UserId::new("alpha")].ability_hand.len(), 5);
    }

    #[test]
    fn test_draw_requiring_selection_goes_pending() {
        let mut state = deck();
        state.ability_hand.truncate(1);
        state.exhausted_movement_ids = ["dash", "roll", "leap", "hop"].iter().map(|s| s.to_string()).collect();
        let mut states = BTreeMap::new();
        states.insert(UserId::new("alpha"), state);
        let mut draw = CustomInteraction::resolved(
            InteractionKind::Draw,
            2,
            "alpha",
            "alpha",
            InteractionResolution {
                applied: Some(false),
                ..Default::default()
            },
        );
        draw.draw_count = Some(1);
        let mut list = vec![draw];
        apply_draw_interactions(&mut states, &mut list, None);
        assert!(list[0].is_pending());
        assert_eq!(list[0].draw_movement_count, Some(1));

        let request = InteractionRequest::new("alpha").with_movement(&["dash"]);
        let mut deck_state = states.remove(&UserId::new("alpha")).unwrap();
        resolve_interaction(&mut list[0], &request, Some(&mut deck_state)).unwrap();
        assert!(!deck_state.exhausted_movement_ids.contains("dash"));
        assert_eq!(deck_state.ability_hand.len(), 2);
    }

    #[test]
    fn test_availability_builders() {
        let catalog = CardCatalog::from_cards(vec![
            CardDefinition::new("hook", CardType::Ability).with_actions(["a", "Co", "E"]),
            CardDefinition::new("jab", CardType::Ability).with_actions(["a", "E"]),
        ]);
        let mut states = BTreeMap::new();
        states.insert(UserId::new("alpha"), deck());
        let mut beta = deck();
        beta.ability_hand = vec!["jab".into()];
        states.insert(UserId::new("beta"), beta);

        let combos = build_combo_availability(&states, &catalog);
        assert_eq!(combos[&UserId::new("alpha")], false);
        assert_eq!(combos[&UserId::new("beta")], false);
        states.get_mut(&UserId::new("beta")).unwrap().ability_hand.push("hook".into());
        let combos = build_combo_availability(&states, &catalog);
        assert!(combos[&UserId::new("beta")]);

        let triggers = build_hand_trigger_availability(&states);
        let alpha = &triggers[&UserId::new("alpha")];
        assert!(alpha.contains("iron-will"));
        assert!(alpha.contains("vengeance"));
        assert!(!triggers.contains_key(&UserId::new("beta")));
    }

    #[test]
    fn test_hand_trigger_order_prefers_damaged_actor() {
        let characters = roster();
        let mut hurt = BeatEntry::new("beta", "W");
        hurt.damage = 7;
        let beats = vec![vec![BeatEntry::new("alpha", "a"), hurt]];
        let mut list = vec![
            CustomInteraction::hand_trigger("iron-will", 0, "alpha", "alpha", Some("beta")),
            CustomInteraction::hand_trigger("iron-will", 0, "beta", "beta", Some("alpha")),
        ];
        assign_hand_trigger_order(&mut list, &beats, &characters, &Land::default(), &BTreeMap::new());
        assert_eq!(list[1].hand_trigger_order, Some(1));
        assert_eq!(list[0].hand_trigger_order, Some(2));
    }
}
