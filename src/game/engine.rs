//! Beat resolution engine
//!
//! `resolve_beats` replays a timeline from beat 0. Every beat runs the same
//! pipeline: beat-start bookkeeping (parry enders, fire, rewind returns,
//! action-set tracking), a readiness check, then one or more passes that
//! execute each character's action in priority order. A pass that rewrites
//! the timeline of a character who has not acted yet (stun, card swap, forced
//! action-set end) restores the beat-start snapshot and runs again.
//!
//! Resolution stops at the first beat that needs player input. Everything
//! from there on is left uncalculated and the pending interaction that
//! caused the halt is returned alongside the beats.

use crate::cards::modifiers::{
    active_hit_discard_rule, converts_kbf_to_discard, is_discard_immune, is_throw_immune, passive_block_discard_count,
    passive_kbf_reduction,
};
use crate::cards::triggers::SINKING_SHOT_DISCARD;
use crate::core::action::{
    build_path, is_action_active, is_bracketed_action, is_combo_action, is_open_action, normalize_action_label,
    parse_action_tokens, ActionListItem, ActionToken, BuiltPath, StepKind, DAMAGE_ICON_ACTION, DEFAULT_ACTION,
    FOCUS_ACTION,
};
use crate::core::card::CardCatalog;
use crate::core::character::{PowerTable, PublicCharacter};
use crate::core::hex::{
    direction_index, forward_vector, normalize_degrees, parse_rotation_degrees, rotation_magnitude, HexCoord, Land,
    AXIAL_DIRECTIONS,
};
use crate::core::types::{RotationSource, Terrain, UserId};
use crate::game::board::{BoardToken, TokenBoard};
use crate::game::combat::*;
use crate::game::interactions::{
    hand_trigger_interaction_id, hand_trigger_key, interaction_id, ComboAvailability, CustomInteraction,
    FocusEndReason, GuardContinueAvailability, HandTriggerAvailability, InteractionKind, InteractionLog,
    InteractionResolution, InteractionStatus,
};
use crate::game::logger::{ResolveLogger, VerbosityLevel};
use crate::game::timeline::{character_for_key, sort_beat_entries, timeline_resolved_index, Beat, BeatEntry};
use crate::game::writer::{ApplyListOptions, HitTimelineOptions, TimelineWriter};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// Everything a resolution pass reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveInput {
    #[serde(default)]
    pub beats: Vec<Beat>,
    pub characters: Vec<PublicCharacter>,
    #[serde(default)]
    pub interactions: Vec<CustomInteraction>,
    /// Empty land means the default board
    #[serde(default)]
    pub land: Land,
    #[serde(default)]
    pub board_tokens: Vec<BoardToken>,
    #[serde(default)]
    pub combo_availability: ComboAvailability,
    #[serde(default)]
    pub hand_trigger_availability: HandTriggerAvailability,
    #[serde(default)]
    pub guard_continue_availability: GuardContinueAvailability,
}

/// Static data shared by every resolution
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub catalog: &'a CardCatalog,
    pub powers: &'a PowerTable,
    pub logger: Option<&'a ResolveLogger>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(catalog: &'a CardCatalog, powers: &'a PowerTable) -> Self {
        ResolveContext {
            catalog,
            powers,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: &'a ResolveLogger) -> Self {
        self.logger = Some(logger);
        self
    }
}

/// Result of a resolution pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutput {
    pub beats: Vec<Beat>,
    pub characters: Vec<PublicCharacter>,
    pub last_calculated_index: Option<usize>,
    pub interactions: Vec<CustomInteraction>,
    pub board_tokens: Vec<BoardToken>,
}

impl ResolveOutput {
    pub fn pending_interactions(&self) -> impl Iterator<Item = &CustomInteraction> {
        self.interactions.iter().filter(|interaction| interaction.is_pending())
    }
}

/// Resolve a timeline from scratch
///
/// Characters are returned unchanged; positions, damage and facing live on
/// the calculated beat entries.
pub fn resolve_beats(input: ResolveInput, ctx: ResolveContext<'_>) -> ResolveOutput {
    let ResolveInput {
        beats,
        characters,
        interactions,
        land,
        board_tokens,
        combo_availability,
        hand_trigger_availability,
        guard_continue_availability,
    } = input;
    let land = if land.is_empty() { Land::default() } else { land };

    let availability = Availability {
        combo: &combo_availability,
        hand_triggers: &hand_trigger_availability,
        guard_continue: &guard_continue_availability,
    };
    let resolver = Resolver::new(&characters, &land, ctx, availability, beats, interactions, &board_tokens);
    let (beats, interactions, board, last_calculated_index) = resolver.run();

    ResolveOutput {
        beats,
        characters,
        last_calculated_index,
        interactions,
        board_tokens: board.into_tokens(),
    }
}

#[derive(Clone, Copy)]
struct Availability<'a> {
    combo: &'a ComboAvailability,
    hand_triggers: &'a HandTriggerAvailability,
    guard_continue: &'a GuardContinueAvailability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParryCounter {
    defender: UserId,
    attacker: UserId,
    damage: i32,
    kbf: i32,
    direction: Option<usize>,
}

#[derive(Debug, Clone, Default)]
struct ParryLedger {
    counters: BTreeMap<usize, Vec<ParryCounter>>,
    /// Defenders whose action set ends when the counter lands
    enders: BTreeMap<usize, BTreeSet<UserId>>,
    keys: FxHashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ComboState {
    co_index: usize,
    hit: bool,
    card_id: String,
    throw_interaction: bool,
}

/// State restored when a beat reruns
#[derive(Debug, Clone)]
struct PhaseState {
    actors: BTreeMap<UserId, ActorState>,
    board: TokenBoard,
    interactions: InteractionLog,
    applied_rewind_returns: BTreeSet<String>,
    hand_trigger_keys: FxHashSet<String>,
    halt_index: Option<usize>,
    parry: ParryLedger,
    combos: BTreeMap<UserId, ComboState>,
    reflex_dodge_avoided: BTreeSet<UserId>,
    /// Active rewind focus interaction per character
    active_focus: BTreeMap<UserId, String>,
}

/// Per-action-set memory carried across beats
#[derive(Debug, Default)]
struct ActionSetTracking {
    last_action: BTreeMap<UserId, String>,
    card_start_terrain: BTreeMap<UserId, Terrain>,
    haven_skip: BTreeMap<UserId, bool>,
    facing: BTreeMap<UserId, i32>,
    rotation: BTreeMap<UserId, String>,
}

#[derive(Debug, Clone)]
struct BlockSource {
    card_id: Option<String>,
    action: String,
}

#[derive(Debug, Clone)]
struct RerunRequest {
    priority: i32,
    order: usize,
    key: String,
}

#[derive(Debug, Default)]
struct BurningStrikeHits {
    hexes: Vec<HexCoord>,
    hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiscardSource {
    Opponent,
    SelfInflicted,
}

/// Scratch state for one pass over a beat
#[derive(Debug, Default)]
struct BeatPass {
    occupancy: Occupancy,
    blocks: FxHashMap<HexCoord, BTreeMap<usize, BlockSource>>,
    discards: BTreeMap<UserId, u32>,
    forced_discards: BTreeMap<UserId, u32>,
    disabled: BTreeSet<UserId>,
    executed: BTreeSet<UserId>,
    rerun: Option<RerunRequest>,
    burning: Vec<(UserId, BurningStrikeHits)>,
    rotated: BTreeSet<UserId>,
}

impl BeatPass {
    fn burning_for(&mut self, actor: &UserId) -> &mut BurningStrikeHits {
        let position = match self.burning.iter().position(|(id, _)| id == actor) {
            Some(position) => position,
            None => {
                self.burning.push((actor.clone(), BurningStrikeHits::default()));
                self.burning.len() - 1
            }
        };
        &mut self.burning[position].1
    }
}

/// The acting character's view of its own turn
struct Turn<'a> {
    id: UserId,
    character: &'a PublicCharacter,
    entry: BeatEntry,
    origin: HexCoord,
    action_set_facing: i32,
    rotation_magnitude: Option<i32>,
    damage: i32,
    kbf: i32,
    grappling_passive: bool,
}

/// Knockback applied to one target after its damage is counted
struct Knockback {
    target: UserId,
    damage: i32,
    /// kbf used for the stun rule
    kbf: i32,
    base_distance: i32,
    distance: i32,
    direction: Option<HexCoord>,
    preserve_action: bool,
    cause: UserId,
    cause_priority: Option<i32>,
}

struct Resolver<'a> {
    characters: &'a [PublicCharacter],
    land: &'a Land,
    catalog: &'a CardCatalog,
    powers: &'a PowerTable,
    logger: Option<&'a ResolveLogger>,
    availability: Availability<'a>,
    resolved_index: Option<usize>,
    writer: TimelineWriter<'a>,
    phase: PhaseState,
    tracking: ActionSetTracking,
    forced_guard_discards: BTreeMap<usize, BTreeSet<UserId>>,
    resolved_rerun_keys: FxHashSet<String>,
    last_calculated: Option<usize>,
    index: usize,
}

impl<'a> Resolver<'a> {
    fn new(
        characters: &'a [PublicCharacter],
        land: &'a Land,
        ctx: ResolveContext<'a>,
        availability: Availability<'a>,
        mut beats: Vec<Beat>,
        interactions: Vec<CustomInteraction>,
        board_tokens: &[BoardToken],
    ) -> Self {
        let resolved_index = timeline_resolved_index(&beats);
        for entry in beats.iter_mut().flatten() {
            entry.consequences.clear();
        }

        let actors = characters
            .iter()
            .map(|character| {
                let state = ActorState {
                    position: character.position,
                    damage: character.baseline_damage(),
                    facing: normalize_degrees(character.facing),
                };
                (character.user_id.clone(), state)
            })
            .collect();

        let interactions = InteractionLog::from_vec(interactions);
        let halt_index = interactions
            .iter()
            .filter(|interaction| interaction.is_pending())
            .map(|interaction| interaction.beat_index)
            .min();
        let hand_trigger_keys = interactions
            .iter()
            .filter(|interaction| interaction.kind == InteractionKind::HandTrigger)
            .filter_map(|interaction| {
                let card_id = interaction.card_id.as_deref()?;
                Some(hand_trigger_key(card_id, interaction.beat_index, interaction.actor_user_id.as_str()))
            })
            .collect();
        let mut active_focus = BTreeMap::new();
        for interaction in interactions.iter() {
            if interaction.kind != InteractionKind::RewindFocus || !interaction.is_resolved() {
                continue;
            }
            let active = interaction.resolution.as_ref().and_then(|r| r.active);
            if active != Some(false) {
                active_focus.insert(interaction.actor_user_id.clone(), interaction.id.clone());
            }
        }

        Resolver {
            characters,
            land,
            catalog: ctx.catalog,
            powers: ctx.powers,
            logger: ctx.logger,
            availability,
            resolved_index,
            writer: TimelineWriter::new(beats, land, ctx.logger),
            phase: PhaseState {
                actors,
                board: TokenBoard::seed(board_tokens, land),
                interactions,
                applied_rewind_returns: BTreeSet::new(),
                hand_trigger_keys,
                halt_index,
                parry: ParryLedger::default(),
                combos: BTreeMap::new(),
                reflex_dodge_avoided: BTreeSet::new(),
                active_focus,
            },
            tracking: ActionSetTracking::default(),
            forced_guard_discards: BTreeMap::new(),
            resolved_rerun_keys: FxHashSet::default(),
            last_calculated: None,
            index: 0,
        }
    }

    fn run(mut self) -> (Vec<Beat>, Vec<CustomInteraction>, TokenBoard, Option<usize>) {
        self.sync_focus_anchors();
        self.apply_resolved_combos();
        self.apply_resolved_guard_continues();

        let mut index = 0;
        while index < self.writer.len() {
            if self.phase.halt_index.is_some_and(|halt| halt < index) {
                self.mark_uncalculated_from(index);
                break;
            }
            self.index = index;
            if !self.resolve_beat() {
                break;
            }
            index += 1;
        }

        crate::resolve_log!(
            self.logger,
            VerbosityLevel::Minimal,
            "result",
            "{} beats, last calculated {:?}, {} pending",
            self.writer.len(),
            self.last_calculated,
            self.phase.interactions.iter().filter(|i| i.is_pending()).count()
        );

        let PhaseState { interactions, board, .. } = self.phase;
        (self.writer.into_beats(), interactions.into_vec(), board, self.last_calculated)
    }

    // ---- lookups ----

    fn character(&self, id: &UserId) -> Option<&'a PublicCharacter> {
        let characters: &'a [PublicCharacter] = self.characters;
        characters.iter().find(|character| &character.user_id == id)
    }

    fn roster_index(&self, id: &UserId) -> Option<usize> {
        self.characters.iter().position(|character| &character.user_id == id)
    }

    fn actor(&self, id: &UserId) -> Option<ActorState> {
        self.phase.actors.get(id).copied()
    }

    fn set_actor(&mut self, id: &UserId, state: ActorState) {
        if let Some(existing) = self.phase.actors.get_mut(id) {
            *existing = state;
        }
    }

    fn current_entry(&self, id: &UserId) -> Option<&BeatEntry> {
        let character = self.character(id)?;
        self.writer.entry(self.index, character)
    }

    fn terrain_at(&self, coord: HexCoord) -> Terrain {
        Terrain::from_land(self.land.contains(coord))
    }

    fn is_history(&self, index: usize) -> bool {
        self.resolved_index.is_some_and(|resolved| index <= resolved)
    }

    fn halt(&mut self, index: usize) {
        self.phase.halt_index = Some(self.phase.halt_index.map_or(index, |halt| halt.min(index)));
    }

    fn has_hand_trigger(&self, id: &UserId, card_id: &str) -> bool {
        self.availability
            .hand_triggers
            .get(id)
            .is_some_and(|cards| cards.contains(card_id))
    }

    fn combo_available(&self, id: &UserId) -> bool {
        self.availability.combo.get(id).copied().unwrap_or(false)
    }

    fn can_offer_guard(&self, id: &UserId) -> bool {
        self.availability.guard_continue.get(id).copied().unwrap_or(true)
    }

    fn focus_card_id(interaction: &CustomInteraction) -> String {
        interaction
            .card_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or_else(|| interaction.resolution.as_ref().and_then(|r| r.card_id.as_deref()))
            .unwrap_or(REWIND)
            .to_string()
    }

    // ---- setup ----

    fn sync_focus_anchors(&mut self) {
        for owner in self.phase.board.focus_anchor_owners() {
            if !self.phase.active_focus.contains_key(&owner) {
                self.phase.board.remove_focus_anchor(&owner);
            }
        }
        let anchors: Vec<(UserId, HexCoord, String)> = self
            .phase
            .active_focus
            .iter()
            .filter_map(|(owner, id)| {
                let focus = self.phase.interactions.get(id)?;
                let anchor = focus.resolution.as_ref()?.anchor_hex?;
                Some((owner.clone(), anchor, Self::focus_card_id(focus)))
            })
            .collect();
        for (owner, anchor, card_id) in anchors {
            self.phase.board.add_focus_anchor(anchor, &owner, &card_id);
        }
    }

    /// Write resolved combo choices into the timeline
    fn apply_resolved_combos(&mut self) {
        let choices: Vec<(UserId, usize, bool)> = self
            .phase
            .interactions
            .iter()
            .filter(|interaction| interaction.kind == InteractionKind::Combo && interaction.is_resolved())
            .map(|interaction| (interaction.actor_user_id.clone(), interaction.beat_index, interaction.continues()))
            .collect();
        for (actor, beat, continues) in choices {
            let Some(character) = self.character(&actor) else {
                continue;
            };
            self.writer.ensure_beat(beat);
            if let Some(entry) = self.writer.entry_mut(beat, character) {
                if continues {
                    entry.action = DEFAULT_ACTION.to_string();
                    entry.priority = 0;
                    entry.combo_skipped = false;
                } else {
                    if !is_combo_action(&entry.action) {
                        entry.action = COMBO_LABEL.to_string();
                    }
                    entry.combo_skipped = true;
                }
                entry.combo_starter = false;
            }
            if continues {
                self.writer.clear_entries_after(character, beat, None);
            }
        }
    }

    /// Replay resolved guard continues and schedule their return discard
    fn apply_resolved_guard_continues(&mut self) {
        let ids: Vec<String> = self
            .phase
            .interactions
            .iter()
            .filter(|interaction| interaction.kind == InteractionKind::GuardContinue && interaction.continues())
            .map(|interaction| interaction.id.clone())
            .collect();
        for id in ids {
            let Some(interaction) = self.phase.interactions.get(&id) else {
                continue;
            };
            let actor = interaction.actor_user_id.clone();
            let beat = interaction.beat_index;
            let resolution = interaction.resolution.clone().unwrap_or_default();
            let (Some(character), Some(state)) = (self.character(&actor), self.actor(&actor)) else {
                continue;
            };

            let mut repeat_beat = resolution.guard_repeat_beat_index;
            if resolution.guard_repeat_applied != Some(true) {
                let end = self.writer.first_open_after(character, beat);
                if !self.writer.apply_guard_continue_loop(character, beat, end, &state) {
                    continue;
                }
                repeat_beat = Some(end);
                if let Some(interaction) = self.phase.interactions.get_mut(&id) {
                    let resolution = interaction.resolution_mut();
                    resolution.continue_choice = Some(true);
                    resolution.guard_repeat_applied = Some(true);
                    resolution.guard_repeat_beat_index = Some(end);
                }
            }
            if let Some(repeat) = repeat_beat {
                let discard_id = interaction_id(InteractionKind::Discard, repeat, actor.as_str(), actor.as_str());
                if !self.phase.interactions.contains(&discard_id) {
                    self.forced_guard_discards.entry(repeat).or_default().insert(actor);
                }
            }
        }
    }

    // ---- beat pipeline ----

    /// Resolve the current beat; false stops resolution
    fn resolve_beat(&mut self) -> bool {
        let index = self.index;
        self.end_parried_action_sets();
        self.phase.board.begin_beat(index, self.land);
        let arrows_at_start = self.phase.board.arrow_ids();
        self.dedupe_entries();
        self.apply_rewind_returns();
        let enders = self.track_action_sets();

        if self.pause_for_combos() {
            self.mark_uncalculated_from(index);
            return false;
        }

        let has_forced_resolution = self.phase.parry.counters.get(&index).is_some_and(|c| !c.is_empty())
            || self.forced_guard_discards.get(&index).is_some_and(|s| !s.is_empty());
        if !has_forced_resolution && !self.is_ready() {
            self.halt_for_readiness();
            return false;
        }

        let snapshot = self.phase.clone();
        self.resolved_rerun_keys.clear();
        let mut restore = false;
        loop {
            if restore {
                self.phase = snapshot.clone();
            }
            self.writer.clear_consequences(index);
            if !has_forced_resolution && !self.is_ready() {
                self.halt_for_readiness();
                return false;
            }

            let mut pass = self.begin_pass();
            self.run_actions(&mut pass);
            self.after_actions(&mut pass, &arrows_at_start, &enders);

            if let Some(request) = pass.rerun.take() {
                crate::resolve_log!(
                    self.logger,
                    VerbosityLevel::Verbose,
                    "rerun",
                    "beat {} reruns ({})",
                    index,
                    request.key
                );
                self.resolved_rerun_keys.insert(request.key);
                restore = true;
                continue;
            }
            self.raise_discards(&pass);
            break;
        }

        self.stamp_beat(index, true);
        self.last_calculated = Some(index);
        if self.phase.halt_index.is_some_and(|halt| halt <= index) {
            self.mark_uncalculated_from(index + 1);
            return false;
        }
        true
    }

    fn end_parried_action_sets(&mut self) {
        let index = self.index;
        let Some(defenders) = self.phase.parry.enders.remove(&index) else {
            return;
        };
        for defender in defenders {
            let (Some(character), Some(state)) = (self.character(&defender), self.actor(&defender)) else {
                continue;
            };
            self.writer.upsert(index, character, DEFAULT_ACTION, &state);
            self.writer.prune_duplicates(index, character);
            let preserve = self.committed_rewind_return_beats(&defender);
            self.writer.clear_entries_after(character, index, Some(&preserve));
        }
    }

    fn committed_rewind_return_beats(&self, actor: &UserId) -> BTreeSet<usize> {
        self.phase
            .interactions
            .iter()
            .filter(|interaction| {
                interaction.kind == InteractionKind::RewindReturn
                    && &interaction.actor_user_id == actor
                    && interaction.returns_to_anchor()
            })
            .map(|interaction| interaction.beat_index)
            .collect()
    }

    fn dedupe_entries(&mut self) {
        let index = self.index;
        let characters = self.characters;
        let Some(beat) = self.writer.beats_mut().get_mut(index) else {
            return;
        };
        for character in characters {
            let positions: Vec<usize> = beat
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.is_for(character))
                .map(|(position, _)| position)
                .collect();
            if positions.len() < 2 {
                continue;
            }
            let keep = positions
                .iter()
                .copied()
                .find(|&position| !beat[position].is_open())
                .unwrap_or(positions[0]);
            crate::resolve_log!(
                self.logger,
                VerbosityLevel::Verbose,
                "duplicate-entry",
                "{} has {} entries at beat {}, keeping {}",
                character.user_id,
                positions.len(),
                index,
                beat[keep].action
            );
            let mut position = 0;
            beat.retain(|entry| {
                let current = position;
                position += 1;
                !entry.is_for(character) || current == keep
            });
        }
    }

    fn rewind_return_actions(&self) -> Vec<ActionListItem> {
        let Some(card) = self.catalog.get(REWIND) else {
            return vec![ActionListItem::new(DEFAULT_ACTION).with_cards(Some(REWIND), None)];
        };
        let after_focus: Vec<&String> = card
            .actions
            .iter()
            .skip_while(|action| !normalize_action_label(action).eq_ignore_ascii_case(FOCUS_ACTION))
            .skip(1)
            .collect();
        let make = |action: &str| {
            ActionListItem::new(action)
                .with_priority(card.priority)
                .with_attack(card.damage, card.kbf)
                .with_cards(Some(REWIND), None)
        };
        if after_focus.is_empty() {
            vec![make(DEFAULT_ACTION)]
        } else {
            after_focus.into_iter().map(|action| make(action.as_str())).collect()
        }
    }

    fn normalize_return_actions(items: &[ActionListItem]) -> Vec<ActionListItem> {
        items
            .iter()
            .filter(|item| !item.action.trim().is_empty())
            .map(|item| {
                let card_id = item
                    .card_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .unwrap_or(REWIND);
                ActionListItem::new(item.action.trim())
                    .with_rotation(item.rotation.clone(), None)
                    .with_priority(item.priority)
                    .with_attack(item.damage.unwrap_or(0), item.kbf.unwrap_or(0))
                    .with_cards(Some(card_id), item.passive_card_id.as_deref())
            })
            .collect()
    }

    /// Teleport characters whose resolved rewind return lands on this beat
    fn apply_rewind_returns(&mut self) {
        let index = self.index;
        let ids: Vec<String> = self
            .phase
            .interactions
            .iter()
            .filter(|interaction| {
                interaction.kind == InteractionKind::RewindReturn
                    && interaction.beat_index == index
                    && interaction.returns_to_anchor()
                    && !self.phase.applied_rewind_returns.contains(&interaction.id)
            })
            .map(|interaction| interaction.id.clone())
            .collect();

        for id in ids {
            let Some(interaction) = self.phase.interactions.get(&id).cloned() else {
                continue;
            };
            let actor = interaction.actor_user_id.clone();
            let (Some(character), Some(mut state)) = (self.character(&actor), self.actor(&actor)) else {
                continue;
            };
            let resolution = interaction.resolution.clone().unwrap_or_default();
            let focus_id = self.phase.active_focus.get(&actor).cloned();
            let focus = focus_id.as_ref().and_then(|id| self.phase.interactions.get(id)).cloned();
            let focus_resolution = focus.as_ref().and_then(|f| f.resolution.clone()).unwrap_or_default();

            let anchor = resolution
                .anchor_hex
                .or(focus_resolution.anchor_hex)
                .unwrap_or(state.position);
            let blocked_by = self
                .phase
                .actors
                .iter()
                .find(|(id, other)| **id != actor && other.position == anchor)
                .map(|(id, _)| id.clone());
            let already_applied = resolution.applied == Some(true);

            let mut return_actions = Self::normalize_return_actions(&resolution.return_actions);
            if return_actions.is_empty() {
                return_actions = Self::normalize_return_actions(&focus_resolution.return_actions);
            }
            if return_actions.is_empty() {
                return_actions = self.rewind_return_actions();
            }

            let mut stun_duration = None;
            match &blocked_by {
                Some(_) => {
                    let stun = resolution.stun_duration.unwrap_or(DEFAULT_REWIND_STUN).max(0);
                    stun_duration = Some(stun);
                    let options = HitTimelineOptions {
                        damage_icon_count: Some(stun),
                        stun_only: true,
                        preserve_after_end: already_applied,
                    };
                    self.writer.apply_hit_timeline(character, index, &state, 0, false, options);
                }
                None => {
                    state.position = anchor;
                    self.set_actor(&actor, state);
                    let matches = self.writer.matches_action_list_window(character, index, &return_actions);
                    let committed = self
                        .writer
                        .has_committed_non_rewind_action(character, index, return_actions.len());
                    if !already_applied || (!matches && !committed) {
                        let options = ApplyListOptions {
                            preserve_after_end: already_applied,
                            ..Default::default()
                        };
                        self.writer
                            .apply_action_list(character, index, &state, &return_actions, options);
                    }
                }
            }

            self.mark_focus_inactive(&actor, index, FocusEndReason::Returned);
            self.phase.board.remove_focus_anchor(&actor);
            self.phase.applied_rewind_returns.insert(id.clone());

            crate::resolve_log!(
                self.logger,
                VerbosityLevel::Normal,
                "rewind-return",
                "{} returns to {} at beat {}{}",
                actor,
                anchor,
                index,
                if blocked_by.is_some() { " (blocked)" } else { "" }
            );

            if let Some(interaction) = self.phase.interactions.get_mut(&id) {
                let resolution = interaction.resolution_mut();
                resolution.return_to_anchor = Some(true);
                resolution.applied = Some(true);
                resolution.anchor_hex = Some(anchor);
                if resolution.focus_interaction_id.is_none() {
                    resolution.focus_interaction_id = focus_id;
                }
                match blocked_by {
                    Some(occupant) => {
                        resolution.blocked_by_occupant = Some(true);
                        resolution.blocked_occupant_user_id = Some(occupant);
                        resolution.stun_duration = stun_duration;
                    }
                    None => {
                        resolution.blocked_by_occupant = None;
                        resolution.blocked_occupant_user_id = None;
                        resolution.stun_duration = None;
                        resolution.return_actions = return_actions;
                    }
                }
            }
        }
    }

    /// Carry action-set facts across beats; returns this beat's action-set enders
    fn track_action_sets(&mut self) -> Vec<UserId> {
        let index = self.index;
        let mut enders = Vec::new();
        for character in self.characters {
            let id = character.user_id.clone();
            let Some(state) = self.actor(&id) else {
                continue;
            };
            let entry = self.writer.entry(index, character).cloned();
            let action = entry
                .as_ref()
                .map_or_else(|| DEFAULT_ACTION.to_string(), |entry| entry.action.clone());
            let previous = self
                .tracking
                .last_action
                .get(&id)
                .cloned()
                .unwrap_or_else(|| DEFAULT_ACTION.to_string());
            let combo_start = is_open_action(&previous) || entry.as_ref().is_some_and(|e| e.combo_starter);

            if is_open_action(&action) {
                if !is_open_action(&previous) && entry.is_some() {
                    enders.push(id.clone());
                }
                self.phase.combos.remove(&id);
                self.phase.reflex_dodge_avoided.remove(&id);
                self.tracking.card_start_terrain.remove(&id);
                self.tracking.haven_skip.remove(&id);
                self.tracking.facing.remove(&id);
                self.tracking.rotation.remove(&id);
                if let Some(entry) = self.writer.entry_mut(index, character) {
                    entry.card_start_terrain = None;
                }
            } else if let Some(entry) = entry {
                if combo_start {
                    self.phase.reflex_dodge_avoided.remove(&id);
                }
                if combo_start || !self.tracking.card_start_terrain.contains_key(&id) {
                    self.tracking
                        .card_start_terrain
                        .insert(id.clone(), self.terrain_at(state.position));
                }
                let start_terrain = self.tracking.card_start_terrain.get(&id).copied();
                if combo_start {
                    let skip = entry.passive_card_id.as_deref() == Some(HAVEN) && start_terrain == Some(Terrain::Abyss);
                    self.tracking.haven_skip.insert(id.clone(), skip);
                }
                if combo_start || !self.tracking.facing.contains_key(&id) {
                    self.tracking.facing.insert(id.clone(), state.facing);
                }
                if combo_start || !self.tracking.rotation.contains_key(&id) {
                    let rotation = entry.rotation.trim();
                    let selected = matches!(entry.rotation_source, None | Some(RotationSource::Selected));
                    if !rotation.is_empty() && selected {
                        self.tracking.rotation.insert(id.clone(), rotation.to_string());
                    }
                }
                if let Some(entry) = self.writer.entry_mut(index, character) {
                    entry.card_start_terrain = start_terrain;
                }
                if combo_start && !self.phase.combos.contains_key(&id) {
                    if let Some(combo) = self.next_combo(character, index) {
                        self.phase.combos.insert(id.clone(), combo);
                    }
                }
            }
            self.tracking.last_action.insert(id, action);
        }
        enders
    }

    /// First `Co` beat of the action set starting at `start`
    fn next_combo(&self, character: &PublicCharacter, start: usize) -> Option<ComboState> {
        for i in start..self.writer.len() {
            let entry = self.writer.entry(i, character)?;
            if entry.is_open() {
                return None;
            }
            if is_combo_action(&entry.action) {
                let card_id = entry.card_id.as_deref().filter(|id| !id.is_empty())?;
                return Some(ComboState {
                    co_index: i,
                    hit: false,
                    card_id: card_id.to_string(),
                    throw_interaction: false,
                });
            }
        }
        None
    }

    /// Offer combos whose hit already landed; true pauses the timeline here
    fn pause_for_combos(&mut self) -> bool {
        let index = self.index;
        let entries: Vec<BeatEntry> = self.writer.beats().get(index).cloned().unwrap_or_default();
        let mut paused = false;
        for entry in entries {
            if !is_combo_action(&entry.action) {
                continue;
            }
            let Some(character) = character_for_key(self.characters, entry.key()) else {
                continue;
            };
            let id = character.user_id.clone();
            let Some(combo) = self.phase.combos.get_mut(&id) else {
                continue;
            };
            if is_entry_throw(&entry, &ThrowContext::default()) {
                combo.throw_interaction = true;
            }
            if combo.throw_interaction {
                self.phase.combos.remove(&id);
                continue;
            }
            if combo.co_index != index || !combo.hit {
                continue;
            }
            if entry.card_id.as_deref() != Some(combo.card_id.as_str()) {
                continue;
            }
            if entry.combo_skipped || self.is_history(index) {
                self.phase.combos.remove(&id);
                continue;
            }
            if !self.combo_available(&id) {
                continue;
            }
            let combo_id = interaction_id(InteractionKind::Combo, index, id.as_str(), id.as_str());
            if !self.phase.interactions.contains(&combo_id) {
                self.phase
                    .interactions
                    .push(CustomInteraction::pending(InteractionKind::Combo, index, id.clone(), id.clone()));
            }
            self.halt(index);
            self.phase.combos.remove(&id);
            paused = true;
        }
        paused
    }

    fn is_ready(&self) -> bool {
        self.characters.iter().all(|character| {
            self.writer
                .entry(self.index, character)
                .is_some_and(|entry| !entry.is_open())
        })
    }

    /// Raise rewind interactions for characters without an action, then stop here
    fn halt_for_readiness(&mut self) {
        let index = self.index;
        for character in self.characters {
            let id = character.user_id.clone();
            let entry = self.writer.entry(index, character).cloned();
            let label = entry
                .as_ref()
                .map(|entry| normalize_action_label(&entry.action).to_ascii_uppercase());
            if label.as_deref() == Some(FOCUS_ACTION) {
                self.ensure_rewind_focus(&id, index, entry.as_ref());
            }
            let idle = label.as_deref().map_or(true, |label| label == DEFAULT_ACTION);
            if idle && self.phase.active_focus.contains_key(&id) {
                self.ensure_pending_rewind_return(&id, index);
            }
        }
        crate::resolve_log!(
            self.logger,
            VerbosityLevel::Minimal,
            "halt",
            "beat {} is waiting on {}",
            index,
            self.characters
                .iter()
                .filter(|character| self.writer.entry(index, character).map_or(true, |e| e.is_open()))
                .map(|character| character.user_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.mark_uncalculated_from(index);
    }

    // ---- rewind focus ----

    fn ensure_rewind_focus(&mut self, actor: &UserId, index: usize, entry: Option<&BeatEntry>) -> bool {
        let card_id = entry.and_then(|e| e.card_id.as_deref()).map(str::trim);
        if card_id != Some(REWIND) {
            return false;
        }
        if self.phase.active_focus.contains_key(actor) {
            return true;
        }
        let id = interaction_id(InteractionKind::RewindFocus, index, actor.as_str(), actor.as_str());
        if let Some(existing) = self.phase.interactions.get(&id) {
            if existing.kind == InteractionKind::RewindFocus && existing.is_resolved() {
                let resolution = existing.resolution.clone().unwrap_or_default();
                if resolution.active == Some(false) {
                    return false;
                }
                let card_id = Self::focus_card_id(existing);
                self.phase.active_focus.insert(actor.clone(), id);
                if let Some(anchor) = resolution.anchor_hex {
                    self.phase.board.add_focus_anchor(anchor, actor, &card_id);
                }
                return true;
            }
        }
        if self.is_history(index) {
            return false;
        }
        let anchor = self
            .actor(actor)
            .map(|state| state.position)
            .or_else(|| entry.map(|e| e.location));
        let resolution = InteractionResolution {
            active: Some(true),
            card_id: Some(REWIND.to_string()),
            anchor_hex: anchor,
            focus_start_beat_index: Some(index),
            return_actions: self.rewind_return_actions(),
            ..Default::default()
        };
        let mut focus = CustomInteraction::resolved(InteractionKind::RewindFocus, index, actor.clone(), actor.clone(), resolution);
        focus.card_id = Some(REWIND.to_string());
        self.phase.interactions.push(focus);
        self.phase.active_focus.insert(actor.clone(), id);
        if let Some(anchor) = anchor {
            self.phase.board.add_focus_anchor(anchor, actor, REWIND);
        }
        true
    }

    fn ensure_pending_rewind_return(&mut self, actor: &UserId, index: usize) -> bool {
        let Some(focus_id) = self.phase.active_focus.get(actor).cloned() else {
            return false;
        };
        let id = interaction_id(InteractionKind::RewindReturn, index, actor.as_str(), actor.as_str());
        if let Some(existing) = self.phase.interactions.get(&id) {
            let pending = existing.is_pending();
            if pending {
                self.halt(index);
            }
            return pending;
        }
        if self.is_history(index) {
            return false;
        }
        let focus = self.phase.interactions.get(&focus_id);
        let card_id = focus.map_or_else(|| REWIND.to_string(), Self::focus_card_id);
        let anchor = focus.and_then(|f| f.resolution.as_ref()).and_then(|r| r.anchor_hex);
        let mut created = CustomInteraction::pending(InteractionKind::RewindReturn, index, actor.clone(), actor.clone());
        created.card_id = Some(card_id);
        created.resolution = Some(InteractionResolution {
            focus_interaction_id: Some(focus_id),
            anchor_hex: anchor,
            ..Default::default()
        });
        self.phase.interactions.push(created);
        self.halt(index);
        true
    }

    fn mark_focus_inactive(&mut self, actor: &UserId, index: usize, reason: FocusEndReason) {
        let Some(id) = self.phase.active_focus.remove(actor) else {
            return;
        };
        if let Some(focus) = self.phase.interactions.get_mut(&id) {
            let resolution = focus.resolution_mut();
            resolution.active = Some(false);
            resolution.ended_beat_index = Some(index);
            resolution.end_reason = Some(reason);
        }
    }

    fn end_focus(&mut self, actor: &UserId, reason: FocusEndReason) {
        self.mark_focus_inactive(actor, self.index, reason);
        self.phase.board.remove_focus_anchor(actor);
    }

    // ---- passes ----

    fn begin_pass(&mut self) -> BeatPass {
        let index = self.index;
        let mut pass = BeatPass::default();
        for character in self.characters {
            let id = &character.user_id;
            let delta = self
                .writer
                .entry(index, character)
                .map_or(0, |entry| parse_rotation_degrees(&entry.rotation));
            if delta == 0 {
                continue;
            }
            if let Some(state) = self.phase.actors.get_mut(id) {
                state.facing = normalize_degrees(state.facing + delta);
                pass.rotated.insert(id.clone());
            }
        }
        pass.occupancy = Occupancy::from_states(self.phase.actors.iter());

        if let Some(returning) = self.forced_guard_discards.get(&index).cloned() {
            for id in returning {
                self.queue_discard(&mut pass, &id, 1, DiscardSource::SelfInflicted, true);
            }
        }
        if let Some(counters) = self.phase.parry.counters.get(&index).cloned() {
            for counter in counters {
                self.resolve_parry_counter(&mut pass, &counter);
            }
            self.phase.parry.counters.remove(&index);
        }
        pass
    }

    fn run_actions(&mut self, pass: &mut BeatPass) {
        let index = self.index;
        let mut ordered: Vec<(i32, usize, UserId)> = self
            .writer
            .beats()
            .get(index)
            .map(|beat| {
                beat.iter()
                    .filter(|entry| !entry.is_open())
                    .filter_map(|entry| {
                        let character = character_for_key(self.characters, entry.key())?;
                        let order = self.roster_index(&character.user_id).unwrap_or(usize::MAX);
                        Some((entry.priority, order, character.user_id.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        ordered.sort_by_key(|(priority, order, _)| (Reverse(*priority), *order));

        for (_, _, id) in ordered {
            self.act(pass, &id);
        }
    }

    fn act(&mut self, pass: &mut BeatPass, id: &UserId) {
        let index = self.index;
        if pass.disabled.contains(id) {
            return;
        }
        let Some(character) = self.character(id) else {
            return;
        };
        let Some(state) = self.actor(id) else {
            return;
        };
        let Some(mut entry) = self.writer.entry(index, character).cloned() else {
            return;
        };

        let action_set_facing = self.tracking.facing.get(id).copied().unwrap_or(state.facing);
        let rotation = self.tracking.rotation.get(id).cloned().unwrap_or_default();
        let magnitude = rotation_magnitude(&rotation);
        if let Some(combo) = self.phase.combos.get_mut(id) {
            if is_entry_throw(&entry, &ThrowContext::default()) {
                combo.throw_interaction = true;
            }
        }
        let origin = state.position;

        if self.tracking.haven_skip.get(id) == Some(&true) {
            if normalize_action_label(&entry.action).eq_ignore_ascii_case(WAIT_LABEL) {
                self.writer.shift_action_set_left(character, index);
                if let Some(entry_mut) = self.writer.entry_mut(index, character) {
                    entry_mut.haven_passive_skip_applied = true;
                    entry = entry_mut.clone();
                }
            }
            self.tracking.haven_skip.insert(id.clone(), false);
        }

        let label = normalize_action_label(&entry.action).to_ascii_uppercase();
        if entry.card_id.as_deref() == Some(SMOKE_BOMB) && label == "X1" {
            let before = self.writer.action_signature(index, character);
            if self.writer.swap_active_with_passive(character, index, &state, self.catalog) {
                if let Some(swapped) = self.writer.entry(index, character).cloned() {
                    self.after_swap(pass, id, &swapped);
                    entry = swapped;
                }
                self.rerun_if_changed(pass, id, &before, Some(id), None);
            }
        }

        let label = normalize_action_label(&entry.action).to_ascii_uppercase();
        if entry.card_id.as_deref() == Some(REFLEX_DODGE)
            && label == "X1"
            && self.phase.reflex_dodge_avoided.contains(id)
        {
            self.force_action_set_end(pass, id, &entry);
            if let Some(updated) = self.writer.entry(index, character).cloned() {
                entry = updated;
            }
        }

        if entry.is_open() {
            pass.executed.insert(id.clone());
            return;
        }

        let label = normalize_action_label(&entry.action).to_ascii_uppercase();
        let bracketed = is_bracketed_action(&entry.action);
        let card_id = entry.card_id.clone();
        let card = card_id.as_deref();

        if card == Some(BOW_SHOT) && label == "X1" {
            let facing = self.actor(id).map_or(state.facing, |s| s.facing);
            self.spawn_arrow(pass, origin.offset(forward_vector(facing)), facing, id);
        }

        if card == Some(HAVEN) && label == "X1" {
            let haven_id = interaction_id(InteractionKind::HavenPlatform, index, id.as_str(), id.as_str());
            let touching = origin.touching();
            match self.phase.interactions.get(&haven_id) {
                None if !self.is_history(index) => {
                    let mut created = CustomInteraction::pending(InteractionKind::HavenPlatform, index, id.clone(), id.clone());
                    created.touching_hexes = touching.to_vec();
                    self.phase.interactions.push(created);
                    self.halt(index);
                    return;
                }
                None => {}
                Some(existing) if existing.is_pending() => {
                    self.halt(index);
                    return;
                }
                Some(existing) => {
                    let resolution = existing.resolution.clone().unwrap_or_default();
                    let consumed = resolution.consumed_beat_index.is_some_and(|beat| beat <= index);
                    let target = resolution.target_hex.or(existing.target_hex);
                    if let Some(target) = target.filter(|target| !consumed && touching.contains(target)) {
                        self.phase.board.add_platform(target, Some(id), self.land);
                    }
                }
            }
        }

        if card == Some(IRON_WILL) && label == "X1" {
            self.create_draw(id, index, 3);
        }
        if card == Some(JAB) && bracketed {
            self.create_draw(id, index, 1);
        }
        if card == Some(HEALING_HARMONY) && label == "X1" {
            if let Some(mut healed) = self.actor(id) {
                healed.damage = (healed.damage - 3).max(0);
                self.set_actor(id, healed);
            }
        }
        if entry.passive_card_id.as_deref() == Some(CROSS_SLASH) && entry.is_protected_start() {
            if let Some(mut slashed) = self.actor(id) {
                slashed.damage += 1;
                self.set_actor(id, slashed);
                self.writer.record_hit(index, character, &slashed, 1, 0);
            }
        }

        if card == Some(GUARD) && bracketed {
            let guard_return = self
                .forced_guard_discards
                .get(&index)
                .is_some_and(|returning| returning.contains(id));
            let allowed = !self.is_history(index) || self.resolved_index == Some(index);
            if allowed && !guard_return && self.can_offer_guard(id) {
                let guard_id = interaction_id(InteractionKind::GuardContinue, index, id.as_str(), id.as_str());
                if !self.phase.interactions.contains(&guard_id) {
                    self.phase.interactions.push(CustomInteraction::pending(
                        InteractionKind::GuardContinue,
                        index,
                        id.clone(),
                        id.clone(),
                    ));
                }
                if self.phase.interactions.get(&guard_id).is_some_and(|g| g.is_pending()) {
                    self.halt(index);
                }
            }
        }

        if is_combo_action(&entry.action) {
            self.act_combo(id, character, &entry);
            return;
        }

        let mut entry = entry;
        if entry.passive_card_id.as_deref() == Some(GIGANTIC_STAFF) {
            let position = self.actor(id).map_or(origin, |s| s.position);
            if self.terrain_at(position) == Terrain::Abyss {
                let rewritten = gigantic_staff_action(&entry.action);
                if rewritten != entry.action {
                    if let Some(entry_mut) = self.writer.entry_mut(index, character) {
                        entry_mut.action = rewritten.clone();
                    }
                    entry.action = rewritten;
                }
            }
        }

        let turn = Turn {
            id: id.clone(),
            character,
            damage: entry.attack_damage.unwrap_or(0),
            kbf: entry.attack_kbf.unwrap_or(0),
            grappling_passive: entry.passive_card_id.as_deref() == Some(GRAPPLING_HOOK),
            entry,
            origin,
            action_set_facing,
            rotation_magnitude: magnitude,
        };
        for token in parse_action_tokens(&turn.entry.action) {
            self.apply_token(pass, &turn, &token);
        }
        pass.executed.insert(id.clone());
    }

    fn act_combo(&mut self, id: &UserId, character: &PublicCharacter, entry: &BeatEntry) {
        let index = self.index;
        if entry.combo_skipped || self.is_history(index) {
            self.phase.combos.remove(id);
            return;
        }
        let can_combo = self.phase.combos.get(id).is_some_and(|combo| {
            combo.co_index == index
                && entry.card_id.as_deref() == Some(combo.card_id.as_str())
                && combo.hit
                && !combo.throw_interaction
        }) && self.combo_available(id);
        if !can_combo {
            if let Some(entry_mut) = self.writer.entry_mut(index, character) {
                if !is_combo_action(&entry_mut.action) {
                    entry_mut.action = COMBO_LABEL.to_string();
                }
                entry_mut.combo_skipped = true;
            }
            self.phase.combos.remove(id);
            return;
        }
        let combo_id = interaction_id(InteractionKind::Combo, index, id.as_str(), id.as_str());
        if !self.phase.interactions.contains(&combo_id) {
            self.phase
                .interactions
                .push(CustomInteraction::pending(InteractionKind::Combo, index, id.clone(), id.clone()));
        }
        self.halt(index);
        self.phase.combos.remove(id);
    }

    fn apply_token(&mut self, pass: &mut BeatPass, turn: &Turn<'_>, token: &ActionToken) {
        let Some(state) = self.actor(&turn.id) else {
            return;
        };
        let bracketed = is_bracketed_action(&turn.entry.action);
        let card = turn.entry.card_id.as_deref();
        let path: BuiltPath = if card == Some(GRAPPLING_HOOK) && token.kind == StepKind::Charge && bracketed {
            grappling_hook_path(turn.origin, &token.steps, state.facing, self.land, &pass.occupancy, &turn.id)
        } else {
            build_path(turn.origin, &token.steps, state.facing)
        };
        let destination = path.destination;
        let target = pass.occupancy.occupant(destination).cloned();
        let direction = direction_index(destination.delta_to(turn.origin))
            .or_else(|| path.last_step.and_then(|step| direction_index(step.invert())));

        match token.kind {
            StepKind::Block => {
                let vector = path.last_step.unwrap_or_else(|| forward_vector(state.facing));
                if let Some(facing_index) = direction_index(vector) {
                    pass.blocks.entry(turn.origin).or_default().insert(
                        facing_index,
                        BlockSource {
                            card_id: turn.entry.card_id.clone(),
                            action: turn.entry.action.clone(),
                        },
                    );
                }
                return;
            }
            StepKind::Jump => {
                if target.is_none() || target.as_ref() == Some(&turn.id) {
                    let mut moved = state;
                    pass.occupancy.relocate(&turn.id, &mut moved, destination);
                    self.set_actor(&turn.id, moved);
                }
            }
            _ => {}
        }

        if token.kind.is_attack() {
            self.attack(pass, turn, token, &path, target.clone(), direction);
        }

        if token.kind.is_move() {
            self.move_along(pass, turn, token, &path);
        }
    }

    fn attack(
        &mut self,
        pass: &mut BeatPass,
        turn: &Turn<'_>,
        token: &ActionToken,
        path: &BuiltPath,
        target: Option<UserId>,
        direction: Option<usize>,
    ) {
        let index = self.index;
        let destination = path.destination;
        let bracketed = is_bracketed_action(&turn.entry.action);
        let card = turn.entry.card_id.as_deref();
        pass.burning_for(&turn.id).hexes.push(destination);

        let mut target_state = target.as_ref().and_then(|t| self.actor(t));
        let target_character = target.as_ref().and_then(|t| self.character(t));
        let mut target_entry = target_character.and_then(|c| self.writer.entry(index, c).cloned());
        let is_throw = is_entry_throw(
            &turn.entry,
            &ThrowContext {
                step: Some(token.kind),
                actor_position: Some(turn.origin),
                target_position: target_state.map(|s| s.position),
            },
        );

        let block_at = |pass: &BeatPass| -> Option<BlockSource> {
            direction.and_then(|d| pass.blocks.get(&destination).and_then(|blocks| blocks.get(&d)).cloned())
        };
        let mut block = block_at(pass);
        let mut blocked_by_block = block.is_some() && !is_throw;

        if let (Some(target_id), Some(target_character)) = (target.as_ref(), target_character) {
            let dodges = target_entry.as_ref().is_some_and(|e| {
                e.passive_card_id.as_deref() == Some(REFLEX_DODGE)
                    && normalize_action_label(&e.action).eq_ignore_ascii_case(WAIT_LABEL)
            });
            if dodges && !blocked_by_block {
                if let Some(swapped) = self.reflex_swap(pass, target_id, target_character) {
                    target_entry = Some(swapped);
                    target_state = self.actor(target_id);
                    block = block_at(pass);
                    blocked_by_block = block.is_some() && !is_throw;
                }
            }
        }

        let throw_blocked =
            is_throw && target_entry.as_ref().is_some_and(|e| is_throw_immune(e.passive_card_id.as_deref(), &e.action));
        let blocked = blocked_by_block || throw_blocked;

        if !is_throw && target.is_some() && !blocked_by_block {
            let combo_card = card.unwrap_or_default();
            let matches = self.phase.combos.get(&turn.id).is_some_and(|c| c.card_id == combo_card);
            if !matches && !self.phase.combos.contains_key(&turn.id) {
                if let Some(combo) = self.combo_for_hit(turn.character, combo_card) {
                    self.phase.combos.insert(turn.id.clone(), combo);
                }
            }
            if let Some(combo) = self.phase.combos.get_mut(&turn.id) {
                if combo.card_id == combo_card {
                    combo.hit = true;
                }
            }
        }

        let stab_bonus = match (card, target_state) {
            (Some(STAB), Some(target_state)) if bracketed && is_behind_target(turn.origin, &target_state) => 3,
            _ => 0,
        };
        let attack_damage = turn.damage + stab_bonus;
        let attack_kbf = turn.kbf + stab_bonus;

        if let (Some(target_id), true) = (target.as_ref(), blocked_by_block) {
            if target_entry.as_ref().and_then(|e| e.card_id.as_deref()) == Some(REFLEX_DODGE) {
                self.phase.reflex_dodge_avoided.insert(target_id.clone());
            }
            if attack_damage > 0 {
                if let Some(block) = &block {
                    let block_card = block
                        .card_id
                        .clone()
                        .or_else(|| target_entry.as_ref().and_then(|e| e.card_id.clone()));
                    let block_bracketed = is_bracketed_action(&block.action);
                    if block_card.as_deref() == Some(ABSORB) && block_bracketed {
                        self.queue_draw(target_id, attack_damage.max(0) as u32);
                    }
                    if block_card.as_deref() == Some(PARRY) && block_bracketed {
                        self.queue_parry_counter(
                            index,
                            index + 1,
                            target_id,
                            &turn.id,
                            attack_damage * 2,
                            attack_kbf + 1,
                            direction,
                        );
                    }
                }
            }
        }

        match (target, blocked) {
            (Some(target_id), false) => {
                let (Some(target_state), Some(target_character)) = (target_state, target_character) else {
                    return;
                };
                let hit = Hit {
                    target: target_id,
                    character: target_character,
                    state: target_state,
                    entry: target_entry,
                    damage: attack_damage,
                    kbf: attack_kbf,
                    is_throw,
                };
                self.land_hit(pass, turn, token, path, hit);
            }
            _ => {
                if card == Some(BURNING_STRIKE) && bracketed && token.kind == StepKind::Attack {
                    self.phase.board.add_fire(destination, Some(&turn.id), self.land);
                }
            }
        }
    }

    fn land_hit(&mut self, pass: &mut BeatPass, turn: &Turn<'_>, token: &ActionToken, path: &BuiltPath, hit: Hit<'_>) {
        let index = self.index;
        let destination = path.destination;
        let bracketed = is_bracketed_action(&turn.entry.action);
        let card = turn.entry.card_id.as_deref();
        let Hit {
            target,
            character,
            state: mut target_state,
            entry: target_entry,
            damage: attack_damage,
            kbf: attack_kbf,
            is_throw,
        } = hit;
        let target_action = target_entry
            .as_ref()
            .map_or_else(|| DEFAULT_ACTION.to_string(), |e| e.action.clone());
        let preserve_action = pass.executed.contains(&target) && target_action != DAMAGE_ICON_ACTION;
        let hammer = target_entry.as_ref().is_some_and(|e| {
            e.passive_card_id.as_deref() == Some(HAMMER) && is_action_active(&e.action)
        });

        if card == Some(SMOKE_BOMB) && bracketed {
            self.end_focus(&target, FocusEndReason::Stun);
            let before = self.writer.action_signature(index, character);
            let selected = self
                .tracking
                .rotation
                .get(&turn.id)
                .filter(|rotation| !rotation.is_empty())
                .cloned()
                .unwrap_or_else(|| self.writer.action_set_rotation(turn.character, index));
            let stun = (5 - rotation_magnitude(&selected).unwrap_or(0)).max(0);
            let options = HitTimelineOptions {
                damage_icon_count: Some(stun),
                stun_only: true,
                ..Default::default()
            };
            self.writer.apply_hit_timeline(
                character,
                index,
                &target_state,
                (stun - 1).max(0),
                preserve_action,
                options,
            );
            self.rerun_if_changed(pass, &target, &before, Some(&turn.id), Some(turn.entry.priority));
            self.hammer_recoil(&turn.id, &target, hammer);
            pass.disabled.insert(target);
            return;
        }

        if is_throw {
            let throw_id = interaction_id(InteractionKind::Throw, index, turn.id.as_str(), target.as_str());
            let resolved_direction = self
                .phase
                .interactions
                .get(&throw_id)
                .filter(|interaction| interaction.is_resolved())
                .and_then(|interaction| interaction.resolved_direction());
            match resolved_direction {
                Some(direction) => {
                    let before = self.writer.action_signature(index, character);
                    let adjusted = self.hit_damage(Some(&turn.id), &target, attack_damage, target_entry.as_ref());
                    target_state.damage += adjusted;
                    pass.burning_for(&turn.id).hit = true;
                    let steps = throw_target(&mut pass.occupancy, &target, &mut target_state, AXIAL_DIRECTIONS[direction]);
                    self.set_actor(&target, target_state);
                    if steps > 0 {
                        self.end_focus(&target, FocusEndReason::Knockback);
                    }
                    self.writer.apply_hit_timeline(
                        character,
                        index,
                        &target_state,
                        steps,
                        preserve_action,
                        HitTimelineOptions::default(),
                    );
                    self.rerun_if_changed(pass, &target, &before, Some(&turn.id), Some(turn.entry.priority));
                    self.writer.record_hit(index, character, &target_state, adjusted, steps);
                    if steps > 0 {
                        self.draw_on_knockback(&target);
                    }
                    self.hammer_recoil(&turn.id, &target, hammer);
                    pass.disabled.insert(target);
                }
                None => {
                    if !self.phase.interactions.contains(&throw_id) {
                        self.phase.interactions.push(CustomInteraction::pending(
                            InteractionKind::Throw,
                            index,
                            turn.id.clone(),
                            target.clone(),
                        ));
                    }
                    pass.disabled.insert(target);
                    self.halt(index);
                }
            }
            return;
        }

        pass.burning_for(&turn.id).hit = true;
        let Some(iron_will_used) = self.check_iron_will(&target, Some(&turn.id)) else {
            return;
        };

        if let Some(rule) = active_hit_discard_rule(card) {
            if bracketed && rule.applies_to_path(&token.path) {
                self.queue_discard(pass, &target, rule.count, DiscardSource::Opponent, true);
            }
        }

        let from = target_state.position;
        let adjusted = self.hit_damage(Some(&turn.id), &target, attack_damage, target_entry.as_ref());
        target_state.damage += adjusted;

        if card == Some(BURNING_STRIKE) && bracketed && token.kind == StepKind::Attack {
            self.phase.board.add_fire(destination, Some(&turn.id), self.land);
        }

        let attack_direction = knockback_direction(turn.origin, destination, path.last_step);
        let knockback_dir = if turn.grappling_passive && token.kind == StepKind::Attack {
            grappling_hook_flip(&mut pass.occupancy, turn.origin, attack_direction, &target, &mut target_state)
        } else {
            attack_direction
        };
        self.set_actor(&target, target_state);

        let passive = target_entry.as_ref().and_then(|e| e.passive_card_id.as_deref());
        let reduction = passive_kbf_reduction(passive, &target_action);
        let base_kbf = (attack_kbf - reduction).max(0);
        let effective_kbf = if iron_will_used { 0 } else { base_kbf };
        let base_distance =
            knockback_distance(target_state.damage, effective_kbf) + self.knockback_bonus(&turn.id, effective_kbf);
        let converts = converts_kbf_to_discard(passive, &target_action);
        if converts && base_distance > 0 {
            self.queue_discard(pass, &target, base_distance as u32, DiscardSource::SelfInflicted, true);
        }
        let distance = if converts { 0 } else { base_distance };

        let (steps, stunned) = self.apply_knockback(
            pass,
            Knockback {
                target: target.clone(),
                damage: adjusted,
                kbf: effective_kbf,
                base_distance,
                distance,
                direction: knockback_dir,
                preserve_action,
                cause: turn.id.clone(),
                cause_priority: Some(turn.entry.priority),
            },
        );
        self.hammer_recoil(&turn.id, &target, hammer);
        if stunned {
            pass.disabled.insert(target.clone());
        }
        self.offer_vengeance(&target, from, steps);
    }

    /// Iron will offer for a hit on `target`
    ///
    /// `None` means the hit waits on the offer; otherwise whether iron will
    /// was played against it.
    fn check_iron_will(&mut self, target: &UserId, source: Option<&UserId>) -> Option<bool> {
        let index = self.index;
        let key = hand_trigger_key(IRON_WILL, index, target.as_str());
        let other = source.unwrap_or(target);
        let id = hand_trigger_interaction_id(IRON_WILL, index, target.as_str(), other.as_str());
        match self.phase.interactions.get(&id) {
            None => {
                if !self.is_history(index)
                    && self.has_hand_trigger(target, IRON_WILL)
                    && !self.phase.hand_trigger_keys.contains(&key)
                {
                    self.phase.interactions.push(CustomInteraction::hand_trigger(
                        IRON_WILL,
                        index,
                        target.as_str(),
                        target.as_str(),
                        source.map(UserId::as_str),
                    ));
                    self.phase.hand_trigger_keys.insert(key);
                    self.halt(index);
                    return None;
                }
                Some(false)
            }
            Some(existing) if existing.is_pending() => {
                self.halt(index);
                None
            }
            Some(existing) => Some(existing.hand_trigger_used()),
        }
    }

    fn move_along(&mut self, pass: &mut BeatPass, turn: &Turn<'_>, token: &ActionToken, path: &BuiltPath) {
        let index = self.index;
        let Some(mut state) = self.actor(&turn.id) else {
            return;
        };
        let mut final_position = turn.origin;
        let mut blocked_by = None;
        for position in &path.positions {
            if pass.occupancy.is_blocked_for(*position, &turn.id) {
                blocked_by = pass.occupancy.occupant(*position).cloned();
                break;
            }
            final_position = *position;
        }
        if let Some(blocker) = blocked_by {
            let count = passive_block_discard_count(turn.entry.passive_card_id.as_deref());
            if count > 0 {
                self.queue_discard(pass, &blocker, count, DiscardSource::Opponent, false);
            }
        }
        pass.occupancy.relocate(&turn.id, &mut state, final_position);
        self.set_actor(&turn.id, state);

        if token.kind == StepKind::Move && final_position != turn.origin {
            let passive = turn.entry.passive_card_id.as_deref();
            if passive == Some(BURNING_STRIKE) {
                self.phase
                    .board
                    .queue_delayed_fire(index + 1, turn.origin, Some(&turn.id));
            }
            if passive == Some(BOW_SHOT) && matches!(turn.rotation_magnitude, Some(1) | Some(2)) {
                self.spawn_arrow(pass, final_position, turn.action_set_facing, &turn.id);
            }
        }
    }

    /// Reflex dodge swap for a waiting target; returns the swapped entry
    fn reflex_swap(&mut self, pass: &mut BeatPass, target: &UserId, character: &PublicCharacter) -> Option<BeatEntry> {
        let index = self.index;
        let state = self.actor(target)?;
        let before = self.writer.action_signature(index, character);
        if !self.writer.swap_active_with_passive(character, index, &state, self.catalog) {
            return None;
        }
        let swapped = self.writer.entry(index, character).cloned()?;
        self.after_swap(pass, target, &swapped);
        self.register_blocks(pass, target, &swapped);
        self.rerun_if_changed(pass, target, &before, Some(target), None);
        Some(swapped)
    }

    /// Refresh action-set tracking after a card swap
    fn after_swap(&mut self, pass: &mut BeatPass, id: &UserId, swapped: &BeatEntry) {
        let Some(mut state) = self.actor(id) else {
            return;
        };
        let Some(character) = self.character(id) else {
            return;
        };
        let delta = parse_rotation_degrees(&swapped.rotation);
        if delta != 0 && !pass.rotated.contains(id) {
            state.facing = normalize_degrees(state.facing + delta);
            pass.rotated.insert(id.clone());
        }
        let start = self.terrain_at(state.position);
        self.tracking.card_start_terrain.insert(id.clone(), start);
        let skip = swapped.passive_card_id.as_deref() == Some(HAVEN) && start == Terrain::Abyss;
        self.tracking.haven_skip.insert(id.clone(), skip);
        self.tracking.facing.insert(id.clone(), state.facing);
        let rotation = self.writer.action_set_rotation(character, self.index);
        if rotation.is_empty() {
            self.tracking.rotation.remove(id);
        } else {
            self.tracking.rotation.insert(id.clone(), rotation);
        }
        self.set_actor(id, state);
    }

    fn register_blocks(&mut self, pass: &mut BeatPass, id: &UserId, entry: &BeatEntry) {
        let Some(state) = self.actor(id) else {
            return;
        };
        for token in parse_action_tokens(&entry.action) {
            if token.kind != StepKind::Block {
                continue;
            }
            let path = build_path(state.position, &token.steps, state.facing);
            let vector = path.last_step.unwrap_or_else(|| forward_vector(state.facing));
            if let Some(facing_index) = direction_index(vector) {
                pass.blocks.entry(state.position).or_default().insert(
                    facing_index,
                    BlockSource {
                        card_id: entry.card_id.clone(),
                        action: entry.action.clone(),
                    },
                );
            }
        }
    }

    fn force_action_set_end(&mut self, pass: &mut BeatPass, id: &UserId, source: &BeatEntry) {
        let index = self.index;
        let (Some(character), Some(state)) = (self.character(id), self.actor(id)) else {
            return;
        };
        let before = self.writer.action_signature(index, character);
        let list = [ActionListItem::new(DEFAULT_ACTION)
            .with_cards(source.card_id.as_deref(), source.passive_card_id.as_deref())];
        if self
            .writer
            .apply_action_list(character, index, &state, &list, ApplyListOptions::default())
        {
            self.rerun_if_changed(pass, id, &before, None, None);
        }
    }

    /// Combo state for a landed hit when the action set has not found one yet
    fn combo_for_hit(&self, character: &PublicCharacter, card_id: &str) -> Option<ComboState> {
        if card_id.is_empty() {
            return None;
        }
        let combo = self.next_combo(character, self.index)?;
        if combo.card_id != card_id || self.is_history(combo.co_index) {
            return None;
        }
        Some(combo)
    }

    // ---- damage and knockback ----

    /// Damage a hit actually deals after character powers and healing harmony
    fn hit_damage(&self, attacker: Option<&UserId>, target: &UserId, raw: i32, target_entry: Option<&BeatEntry>) -> i32 {
        let bonus = match attacker.and_then(|id| self.character(id)) {
            Some(character) if raw > 0 => self.powers.powers(&character.character_id).attack_damage_bonus as i32,
            _ => 0,
        };
        let reduction = self
            .character(target)
            .map_or(0, |character| self.powers.powers(&character.character_id).damage_reduction as i32);
        (raw + bonus - healing_harmony_reduction(target_entry) - reduction).max(0)
    }

    fn knockback_bonus(&self, attacker: &UserId, kbf: i32) -> i32 {
        match (self.character(attacker), self.actor(attacker)) {
            (Some(character), Some(state)) => self
                .powers
                .powers(&character.character_id)
                .knockback_bonus(state.damage, kbf),
            _ => 0,
        }
    }

    fn apply_knockback(&mut self, pass: &mut BeatPass, knockback: Knockback) -> (i32, bool) {
        let index = self.index;
        let (Some(character), Some(mut state)) = (self.character(&knockback.target), self.actor(&knockback.target)) else {
            return (0, false);
        };
        let steps = match knockback.direction {
            Some(direction) if knockback.distance > 0 => walk_knockback(
                &mut pass.occupancy,
                &knockback.target,
                &mut state,
                direction,
                knockback.distance,
            ),
            _ => 0,
        };
        self.set_actor(&knockback.target, state);

        let stunned = knockback.kbf == 1 || (knockback.kbf > 1 && knockback.base_distance > 0);
        if stunned || steps > 0 {
            let reason = if stunned {
                FocusEndReason::Stun
            } else {
                FocusEndReason::Knockback
            };
            self.end_focus(&knockback.target, reason);
        }
        if stunned {
            let before = self.writer.action_signature(index, character);
            self.writer.apply_hit_timeline(
                character,
                index,
                &state,
                steps,
                knockback.preserve_action,
                HitTimelineOptions::default(),
            );
            self.rerun_if_changed(
                pass,
                &knockback.target,
                &before,
                Some(&knockback.cause),
                knockback.cause_priority,
            );
        }
        self.writer.record_hit(index, character, &state, knockback.damage, steps);
        if steps > 0 {
            self.draw_on_knockback(&knockback.target);
        }
        (steps, stunned)
    }

    fn draw_on_knockback(&mut self, target: &UserId) {
        let Some(character) = self.character(target) else {
            return;
        };
        let count = self.powers.powers(&character.character_id).draw_on_knockback;
        if count > 0 {
            self.queue_draw(target, count);
        }
    }

    /// An active passive hammer hurts whoever hits it
    fn hammer_recoil(&mut self, attacker: &UserId, target: &UserId, hammer: bool) {
        if !hammer || attacker == target {
            return;
        }
        let (Some(character), Some(mut state)) = (self.character(attacker), self.actor(attacker)) else {
            return;
        };
        state.damage += 2;
        self.set_actor(attacker, state);
        self.writer.record_hit(self.index, character, &state, 2, 0);
    }

    fn offer_vengeance(&mut self, target: &UserId, from: HexCoord, steps: i32) {
        let index = self.index;
        if steps <= 0 || !self.land.contains(from) {
            return;
        }
        let Some(state) = self.actor(target) else {
            return;
        };
        if self.land.contains(state.position) || !self.has_hand_trigger(target, VENGEANCE) || self.is_history(index) {
            return;
        }
        let key = hand_trigger_key(VENGEANCE, index, target.as_str());
        if self.phase.hand_trigger_keys.contains(&key) {
            return;
        }
        let id = hand_trigger_interaction_id(VENGEANCE, index, target.as_str(), target.as_str());
        if !self.phase.interactions.contains(&id) {
            let mut offer = CustomInteraction::hand_trigger(VENGEANCE, index, target.as_str(), target.as_str(), None);
            offer.draw_count = Some(steps as u32);
            self.phase.interactions.push(offer);
        }
        self.phase.hand_trigger_keys.insert(key);
        self.halt(index);
    }

    fn resolve_parry_counter(&mut self, pass: &mut BeatPass, counter: &ParryCounter) {
        let index = self.index;
        let target = &counter.attacker;
        let (Some(character), Some(mut state)) = (self.character(target), self.actor(target)) else {
            return;
        };
        let target_entry = self.writer.entry(index, character).cloned();
        let target_action = target_entry
            .as_ref()
            .map_or_else(|| DEFAULT_ACTION.to_string(), |e| e.action.clone());
        let passive = target_entry.as_ref().and_then(|e| e.passive_card_id.clone());
        let hammer = passive.as_deref() == Some(HAMMER) && is_action_active(&target_action);

        let adjusted = self.hit_damage(Some(&counter.defender), target, counter.damage, target_entry.as_ref());
        state.damage += adjusted;
        self.set_actor(target, state);

        let reduction = passive_kbf_reduction(passive.as_deref(), &target_action);
        let base_kbf = (counter.kbf - reduction).max(0);
        let base_distance =
            knockback_distance(state.damage, base_kbf) + self.knockback_bonus(&counter.defender, base_kbf);
        let converts = converts_kbf_to_discard(passive.as_deref(), &target_action);
        if converts && base_distance > 0 {
            self.queue_discard(pass, target, base_distance as u32, DiscardSource::SelfInflicted, false);
        }
        let distance = if converts { 0 } else { base_distance };

        self.apply_knockback(
            pass,
            Knockback {
                target: target.clone(),
                damage: adjusted,
                kbf: base_kbf,
                base_distance,
                distance,
                direction: counter.direction.map(|d| AXIAL_DIRECTIONS[d]),
                preserve_action: false,
                cause: counter.defender.clone(),
                cause_priority: None,
            },
        );
        self.hammer_recoil(&counter.defender, target, hammer);
        pass.disabled.insert(target.clone());
    }

    // ---- arrows ----

    fn spawn_arrow(&mut self, pass: &mut BeatPass, coord: HexCoord, facing: i32, owner: &UserId) {
        match pass.occupancy.occupant(coord).cloned() {
            Some(occupant) if &occupant != owner => {
                self.resolve_arrow_hit(pass, &occupant, Some(owner), forward_vector(facing));
            }
            _ => self.phase.board.add_arrow(coord, facing, Some(owner)),
        }
    }

    fn resolve_arrow_hit(&mut self, pass: &mut BeatPass, target: &UserId, owner: Option<&UserId>, forward: HexCoord) {
        let index = self.index;
        let Some(character) = self.character(target) else {
            return;
        };
        let mut target_entry = self.writer.entry(index, character).cloned();
        let dodges = target_entry.as_ref().is_some_and(|e| {
            e.passive_card_id.as_deref() == Some(REFLEX_DODGE)
                && normalize_action_label(&e.action).eq_ignore_ascii_case(WAIT_LABEL)
        });
        if dodges {
            if let Some(swapped) = self.reflex_swap(pass, target, character) {
                target_entry = Some(swapped);
            }
        }
        let Some(state) = self.actor(target) else {
            return;
        };
        let target_action = target_entry
            .as_ref()
            .map_or_else(|| DEFAULT_ACTION.to_string(), |e| e.action.clone());
        let passive = target_entry.as_ref().and_then(|e| e.passive_card_id.clone());
        let hammer = passive.as_deref() == Some(HAMMER) && is_action_active(&target_action);

        if let Some(facing_index) = direction_index(forward.invert()) {
            let block = pass
                .blocks
                .get(&state.position)
                .and_then(|blocks| blocks.get(&facing_index))
                .cloned();
            if let Some(block) = block {
                let block_card = block
                    .card_id
                    .clone()
                    .or_else(|| target_entry.as_ref().and_then(|e| e.card_id.clone()));
                if block_card.as_deref() == Some(REFLEX_DODGE) {
                    self.phase.reflex_dodge_avoided.insert(target.clone());
                }
                if block_card.as_deref() == Some(ABSORB) && is_bracketed_action(&block.action) {
                    self.queue_draw(target, ARROW_DAMAGE as u32);
                }
                return;
            }
        }

        if let Some(owner) = owner.filter(|owner| *owner != target) {
            let key = hand_trigger_key(SINKING_SHOT, index, owner.as_str());
            if self.has_hand_trigger(owner, SINKING_SHOT)
                && !self.phase.hand_trigger_keys.contains(&key)
                && !self.is_history(index)
            {
                let id = hand_trigger_interaction_id(SINKING_SHOT, index, owner.as_str(), target.as_str());
                if !self.phase.interactions.contains(&id) {
                    let mut offer =
                        CustomInteraction::hand_trigger(SINKING_SHOT, index, owner.as_str(), target.as_str(), None);
                    offer.source_user_id = Some(owner.clone());
                    self.phase.interactions.push(offer);
                }
                self.phase.hand_trigger_keys.insert(key);
                self.halt(index);
            }
        }

        let Some(iron_will_used) = self.check_iron_will(target, owner) else {
            return;
        };

        let from = state.position;
        let mut state = state;
        let adjusted = self.hit_damage(None, target, ARROW_DAMAGE, target_entry.as_ref());
        state.damage += adjusted;
        self.set_actor(target, state);

        let reduction = passive_kbf_reduction(passive.as_deref(), &target_action);
        let base_kbf = (ARROW_KBF - reduction).max(0);
        let effective_kbf = if iron_will_used { 0 } else { base_kbf };
        let distance = knockback_distance(state.damage, effective_kbf);
        let (steps, _) = self.apply_knockback(
            pass,
            Knockback {
                target: target.clone(),
                damage: adjusted,
                kbf: effective_kbf,
                base_distance: distance,
                distance,
                direction: Some(forward),
                preserve_action: true,
                cause: owner.cloned().unwrap_or_else(|| target.clone()),
                cause_priority: None,
            },
        );
        if let Some(owner) = owner {
            self.hammer_recoil(owner, target, hammer);
        }
        self.offer_vengeance(target, from, steps);
    }

    fn advance_arrows(&mut self, pass: &mut BeatPass, arrows: &[String]) {
        for arrow_id in arrows {
            let Some(arrow) = self.phase.board.token(arrow_id).cloned() else {
                continue;
            };
            let forward = forward_vector(arrow.facing);
            let next = arrow.position.offset(forward);
            if let Some(target) = pass.occupancy.occupant(next).cloned() {
                self.resolve_arrow_hit(pass, &target, arrow.owner_user_id.as_ref(), forward);
                self.phase.board.remove_token(arrow_id);
                continue;
            }
            let far = self
                .land
                .distance_to_land(next)
                .map_or(true, |distance| distance >= ARROW_LAND_DISTANCE_LIMIT);
            if far {
                self.phase.board.remove_token(arrow_id);
            } else {
                self.phase.board.move_token(arrow_id, next);
            }
        }
    }

    // ---- end of pass ----

    fn after_actions(&mut self, pass: &mut BeatPass, arrows: &[String], enders: &[UserId]) {
        let index = self.index;

        let used_triggers: Vec<(String, UserId, UserId, Vec<HexCoord>)> = self
            .phase
            .interactions
            .iter()
            .filter(|interaction| {
                interaction.kind == InteractionKind::HandTrigger
                    && interaction.beat_index == index
                    && interaction.hand_trigger_used()
            })
            .filter_map(|interaction| {
                Some((
                    interaction.card_id.clone()?,
                    interaction.actor_user_id.clone(),
                    interaction.target_user_id.clone(),
                    interaction.attack_hexes.clone(),
                ))
            })
            .collect();
        for (card_id, actor, target, hexes) in used_triggers {
            match card_id.as_str() {
                BURNING_STRIKE => {
                    for hex in hexes {
                        self.phase.board.add_fire(hex, Some(&actor), self.land);
                    }
                }
                SINKING_SHOT => {
                    self.queue_discard(pass, &target, SINKING_SHOT_DISCARD, DiscardSource::Opponent, true);
                }
                _ => {}
            }
        }

        let consumed: Vec<HexCoord> = self
            .phase
            .interactions
            .iter()
            .filter(|interaction| interaction.kind == InteractionKind::HavenPlatform && interaction.is_resolved())
            .filter_map(|interaction| {
                let resolution = interaction.resolution.as_ref()?;
                if resolution.consumed_beat_index != Some(index) {
                    return None;
                }
                resolution.target_hex.or(interaction.target_hex)
            })
            .collect();
        for hex in consumed {
            self.phase.board.remove_platform(hex);
        }

        if !self.is_history(index) {
            for (actor, hits) in std::mem::take(&mut pass.burning) {
                if !hits.hit || !self.has_hand_trigger(&actor, BURNING_STRIKE) {
                    continue;
                }
                let key = hand_trigger_key(BURNING_STRIKE, index, actor.as_str());
                if self.phase.hand_trigger_keys.contains(&key) {
                    continue;
                }
                let id = hand_trigger_interaction_id(BURNING_STRIKE, index, actor.as_str(), actor.as_str());
                if self.phase.interactions.contains(&id) {
                    continue;
                }
                let mut hexes = Vec::new();
                for hex in hits.hexes {
                    if !hexes.contains(&hex) {
                        hexes.push(hex);
                    }
                }
                let mut offer =
                    CustomInteraction::hand_trigger(BURNING_STRIKE, index, actor.as_str(), actor.as_str(), None);
                offer.attack_hexes = hexes;
                self.phase.interactions.push(offer);
                self.phase.hand_trigger_keys.insert(key);
                self.halt(index);
            }
        }

        self.advance_arrows(pass, arrows);

        let burned: Vec<UserId> = self
            .phase
            .actors
            .iter()
            .filter(|(_, state)| self.phase.board.is_burning(state.position))
            .map(|(id, _)| id.clone())
            .collect();
        for id in burned {
            let Some(character) = self.character(&id) else {
                continue;
            };
            if self.powers.powers(&character.character_id).fire_damage_immune {
                continue;
            }
            if let Some(mut state) = self.actor(&id) {
                state.damage += 1;
                self.set_actor(&id, state);
                self.writer.record_hit(index, character, &state, 1, 0);
            }
        }

        for id in enders {
            let Some(character) = self.character(id) else {
                continue;
            };
            let absorbs = self
                .writer
                .entry(index, character)
                .is_some_and(|entry| entry.passive_card_id.as_deref() == Some(ABSORB));
            let over_abyss = self
                .actor(id)
                .is_some_and(|state| self.terrain_at(state.position) == Terrain::Abyss);
            if absorbs && over_abyss {
                self.queue_draw(id, 1);
            }
        }
    }

    fn raise_discards(&mut self, pass: &BeatPass) {
        let index = self.index;
        let mut combined: BTreeMap<UserId, (u32, bool)> = BTreeMap::new();
        for (id, count) in &pass.discards {
            combined.entry(id.clone()).or_default().0 += count;
        }
        for (id, count) in &pass.forced_discards {
            let slot = combined.entry(id.clone()).or_default();
            slot.0 += count;
            slot.1 = true;
        }
        for (target, (count, forced)) in combined {
            if count == 0 || (!forced && self.is_history(index)) {
                continue;
            }
            let id = interaction_id(InteractionKind::Discard, index, target.as_str(), target.as_str());
            if let Some(existing) = self.phase.interactions.get_mut(&id) {
                if existing.is_pending() && existing.discard_count != Some(count) {
                    existing.discard_count = Some(count);
                }
                continue;
            }
            let mut discard = CustomInteraction::pending(InteractionKind::Discard, index, target.clone(), target);
            discard.discard_count = Some(count);
            self.phase.interactions.push(discard);
            self.halt(index);
        }
    }

    fn queue_discard(&self, pass: &mut BeatPass, target: &UserId, count: u32, source: DiscardSource, forced: bool) {
        if count == 0 {
            return;
        }
        let mut count = count;
        if source == DiscardSource::Opponent {
            if let Some(entry) = self.current_entry(target) {
                if is_discard_immune(entry.passive_card_id.as_deref(), &entry.action) {
                    return;
                }
            }
            if let Some(character) = self.character(target) {
                count = count.saturating_sub(self.powers.powers(&character.character_id).opponent_discard_reduction);
            }
            if count == 0 {
                return;
            }
        }
        let queue = if forced {
            &mut pass.forced_discards
        } else {
            &mut pass.discards
        };
        *queue.entry(target.clone()).or_default() += count;
    }

    fn queue_draw(&mut self, target: &UserId, count: u32) {
        let index = self.index;
        if count == 0 || self.is_history(index) {
            return;
        }
        let id = interaction_id(InteractionKind::Draw, index, target.as_str(), target.as_str());
        if let Some(existing) = self.phase.interactions.get_mut(&id) {
            if existing.kind == InteractionKind::Draw {
                existing.draw_count = Some(existing.draw_count.unwrap_or(0) + count);
                if existing.is_pending() {
                    existing.status = InteractionStatus::Resolved;
                }
            }
            return;
        }
        self.create_draw(target, index, count);
    }

    /// Engine-resolved draw, applied to the deck by the caller
    fn create_draw(&mut self, target: &UserId, index: usize, count: u32) {
        let id = interaction_id(InteractionKind::Draw, index, target.as_str(), target.as_str());
        if self.phase.interactions.contains(&id) {
            return;
        }
        let resolution = InteractionResolution {
            applied: Some(false),
            ..Default::default()
        };
        let mut draw = CustomInteraction::resolved(InteractionKind::Draw, index, target.clone(), target.clone(), resolution);
        draw.draw_count = Some(count);
        self.phase.interactions.push(draw);
    }

    #[allow(clippy::too_many_arguments)]
    fn queue_parry_counter(
        &mut self,
        source_index: usize,
        counter_index: usize,
        defender: &UserId,
        attacker: &UserId,
        damage: i32,
        kbf: i32,
        direction: Option<usize>,
    ) {
        let key = format!("{}:{}", defender, counter_index);
        if !self.phase.parry.keys.insert(key) {
            return;
        }
        self.writer.ensure_beat(counter_index);
        self.phase
            .parry
            .counters
            .entry(counter_index)
            .or_default()
            .push(ParryCounter {
                defender: defender.clone(),
                attacker: attacker.clone(),
                damage: damage.max(0),
                kbf: kbf.max(0),
                direction,
            });
        self.phase
            .parry
            .enders
            .entry(counter_index)
            .or_default()
            .insert(defender.clone());

        if self.is_history(source_index) {
            return;
        }
        let id = interaction_id(InteractionKind::Parry, counter_index, defender.as_str(), attacker.as_str());
        if self.phase.interactions.contains(&id) {
            return;
        }
        let mut record = CustomInteraction::new(
            InteractionKind::Parry,
            counter_index,
            defender.clone(),
            attacker.clone(),
            InteractionStatus::Resolved,
        );
        record.damage = Some(damage);
        record.kbf = Some(kbf);
        record.direction_index = direction;
        self.phase.interactions.push(record);
    }

    /// Queue a rerun when `changed`'s entry at this beat was rewritten
    fn rerun_if_changed(
        &mut self,
        pass: &mut BeatPass,
        changed: &UserId,
        before: &str,
        cause: Option<&UserId>,
        cause_priority: Option<i32>,
    ) {
        let Some(character) = self.character(changed) else {
            return;
        };
        if self.writer.action_signature(self.index, character) == before {
            return;
        }
        let cause = cause.unwrap_or(changed);
        let cause_entry = self.current_entry(cause).cloned();
        let changed_priority = self.current_entry(changed).map_or(0, |entry| entry.priority);
        let priority = cause_priority
            .or_else(|| cause_entry.as_ref().map(|entry| entry.priority))
            .unwrap_or(changed_priority);
        let order = self
            .roster_index(cause)
            .or_else(|| self.roster_index(changed))
            .unwrap_or(usize::MAX);
        let key = format!(
            "{}|{}|{}|{}|{}",
            cause,
            cause_entry.as_ref().and_then(|e| e.card_id.as_deref()).unwrap_or_default(),
            cause_entry.as_ref().and_then(|e| e.passive_card_id.as_deref()).unwrap_or_default(),
            cause_entry.as_ref().map_or(DEFAULT_ACTION, |e| e.action.as_str()),
            priority
        );
        if self.resolved_rerun_keys.contains(&key) {
            return;
        }
        let better = match &pass.rerun {
            None => true,
            Some(current) => priority > current.priority || (priority == current.priority && order < current.order),
        };
        if better {
            pass.rerun = Some(RerunRequest { priority, order, key });
        }
    }

    // ---- stamping ----

    fn stamp_beat(&mut self, index: usize, calculated: bool) {
        let characters = self.characters;
        let land = self.land;
        let phase = &self.phase;
        let Some(beat) = self.writer.beats_mut().get_mut(index) else {
            return;
        };
        for entry in beat.iter_mut() {
            let character = character_for_key(characters, entry.key());
            let state = character.and_then(|c| phase.actors.get(&c.user_id));
            match state {
                Some(state) => {
                    entry.location = state.position;
                    entry.damage = state.damage;
                    entry.facing = state.facing;
                    let on_land = land.contains(state.position) || phase.board.has_platform(state.position);
                    entry.terrain = Some(Terrain::from_land(on_land));
                }
                None => {
                    entry.terrain = Some(Terrain::from_land(land.contains(entry.location)));
                }
            }
            entry.calculated = calculated;
            entry.focus_card_id = character
                .and_then(|c| phase.active_focus.get(&c.user_id))
                .and_then(|id| phase.interactions.get(id))
                .map(Self::focus_card_id);
        }
        sort_beat_entries(beat, characters);
    }

    fn mark_uncalculated_from(&mut self, start: usize) {
        for index in start..self.writer.len() {
            self.stamp_beat(index, false);
        }
    }
}

/// A hit that got past blocks and throw immunity
struct Hit<'c> {
    target: UserId,
    character: &'c PublicCharacter,
    state: ActorState,
    entry: Option<BeatEntry>,
    damage: i32,
    kbf: i32,
    is_throw: bool,
}

const COMBO_LABEL: &str = crate::core::action::COMBO_ACTION;
const WAIT_LABEL: &str = crate::core::action::WAIT_ACTION;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::card::{CardDefinition, CardType};

    fn land() -> Land {
        let mut tiles = Vec::new();
        for q in -3..=3 {
            for r in -3..=3 {
                tiles.push(HexCoord::new(q, r));
            }
        }
        Land::new(tiles)
    }

    fn roster() -> Vec<PublicCharacter> {
        vec![
            PublicCharacter::new("alpha", "murelious", HexCoord::new(0, 0), 180),
            PublicCharacter::new("beta", "murelious", HexCoord::new(1, 0), 0),
        ]
    }

    fn entry(key: &str, action: &str) -> BeatEntry {
        BeatEntry::new(key, action)
    }

    fn attack(key: &str, action: &str, damage: i32, kbf: i32, priority: i32) -> BeatEntry {
        let mut entry = BeatEntry::new(key, action).with_priority(priority).with_attack(damage, kbf);
        entry.card_id = Some("test-strike".to_string());
        entry
    }

    fn input(beats: Vec<Beat>) -> ResolveInput {
        ResolveInput {
            beats,
            characters: roster(),
            land: land(),
            ..Default::default()
        }
    }

    fn run(input: ResolveInput) -> ResolveOutput {
        let catalog = CardCatalog::default();
        let powers = PowerTable::builtin();
        resolve_beats(input, ResolveContext::new(&catalog, &powers))
    }

    fn find<'a>(output: &'a ResolveOutput, index: usize, key: &str) -> &'a BeatEntry {
        output.beats[index]
            .iter()
            .find(|entry| entry.key() == key)
            .expect("entry")
    }

    #[test]
    fn test_idle_timeline_fully_calculates() {
        let beats = vec![vec![entry("alpha", "W"), entry("beta", "W")]; 3];
        let output = run(input(beats));
        assert_eq!(output.last_calculated_index, Some(2));
        assert!(output.beats.iter().flatten().all(|entry| entry.calculated));
        assert_eq!(find(&output, 2, "alpha").location, HexCoord::new(0, 0));
    }

    #[test]
    fn test_move_stops_before_occupied_hex() {
        let beats = vec![vec![entry("alpha", "2m"), entry("beta", "W")]];
        let output = run(input(beats));
        assert_eq!(find(&output, 0, "alpha").location, HexCoord::new(0, 0));
        assert_eq!(find(&output, 0, "beta").location, HexCoord::new(1, 0));
    }

    #[test]
    fn test_move_and_jump_relocate() {
        let mut characters = roster();
        characters[1].position = HexCoord::new(-2, 0);
        let beats = vec![
            vec![entry("alpha", "2m"), entry("beta", "W")],
            vec![entry("alpha", "2j"), entry("beta", "W")],
        ];
        let output = run(ResolveInput {
            characters,
            ..input(beats)
        });
        assert_eq!(find(&output, 0, "alpha").location, HexCoord::new(2, 0));
        assert_eq!(find(&output, 1, "alpha").location, HexCoord::new(4, 0));
        assert_eq!(find(&output, 1, "alpha").terrain, Some(Terrain::Abyss));
    }

    #[test]
    fn test_hit_deals_damage_and_stuns() {
        let beats = vec![
            vec![attack("alpha", "a", 3, 1, 50), entry("beta", "m")],
            vec![entry("alpha", "W"), entry("beta", "m")],
            vec![entry("alpha", "W"), entry("beta", "m")],
        ];
        let output = run(input(beats));
        let hit = find(&output, 0, "beta");
        assert_eq!(hit.damage, 3);
        assert_eq!(hit.location, HexCoord::new(2, 0));
        assert_eq!(hit.consequences.len(), 1);
        assert_eq!(find(&output, 1, "beta").action, DAMAGE_ICON_ACTION);
        assert_eq!(find(&output, 2, "beta").action, DEFAULT_ACTION);
    }

    #[test]
    fn test_block_stops_attack() {
        let beats = vec![vec![attack("alpha", "a", 3, 1, 10), attack("beta", "b", 0, 0, 90)]];
        let output = run(input(beats));
        let blocker = find(&output, 0, "beta");
        assert_eq!(blocker.damage, 0);
        assert_eq!(blocker.location, HexCoord::new(1, 0));
        assert!(blocker.consequences.is_empty());
    }

    #[test]
    fn test_missing_entry_halts_resolution() {
        let beats = vec![
            vec![entry("alpha", "W"), entry("beta", "W")],
            vec![entry("alpha", "W")],
            vec![entry("alpha", "W"), entry("beta", "W")],
        ];
        let output = run(input(beats));
        assert_eq!(output.last_calculated_index, Some(0));
        assert!(!find(&output, 1, "alpha").calculated);
        assert!(!find(&output, 2, "beta").calculated);
    }

    #[test]
    fn test_throw_waits_for_direction() {
        let mut thrower = attack("alpha", "a", 2, 0, 50);
        thrower.card_id = Some("hip-throw".to_string());
        let beats = vec![
            vec![thrower, entry("beta", "W")],
            vec![entry("alpha", "W"), entry("beta", "W")],
        ];
        let output = run(input(beats));
        let pending: Vec<_> = output.pending_interactions().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, InteractionKind::Throw);
        assert_eq!(pending[0].id, "throw:0:alpha:beta");
        assert_eq!(output.last_calculated_index, Some(0));
        assert!(!find(&output, 1, "alpha").calculated);
    }

    #[test]
    fn test_resolved_throw_carries_target() {
        let mut thrower = attack("alpha", "a", 2, 0, 50);
        thrower.card_id = Some("hip-throw".to_string());
        let beats = vec![
            vec![thrower, entry("beta", "W")],
            vec![entry("alpha", "W"), entry("beta", "W")],
            vec![entry("alpha", "W"), entry("beta", "W")],
            vec![entry("alpha", "W"), entry("beta", "W")],
        ];
        let throw = CustomInteraction::resolved(
            InteractionKind::Throw,
            0,
            "alpha",
            "beta",
            InteractionResolution::direction(0),
        );
        let output = run(ResolveInput {
            interactions: vec![throw],
            ..input(beats)
        });
        let thrown = find(&output, 0, "beta");
        assert_eq!(thrown.location, HexCoord::new(3, 0));
        assert_eq!(thrown.damage, 2);
        assert_eq!(find(&output, 2, "beta").action, DAMAGE_ICON_ACTION);
        assert_eq!(output.last_calculated_index, Some(2));
    }

    #[test]
    fn test_parry_counters_next_beat() {
        let mut parry = attack("beta", "[b]", 0, 0, 90);
        parry.card_id = Some(PARRY.to_string());
        let beats = vec![
            vec![attack("alpha", "a", 3, 1, 10), parry],
            vec![entry("alpha", "W"), entry("beta", "[b]")],
            vec![entry("alpha", "W"), entry("beta", "W")],
        ];
        let output = run(input(beats));
        assert!(output
            .interactions
            .iter()
            .any(|i| i.kind == InteractionKind::Parry && i.id == "parry:1:beta:alpha"));
        let countered = find(&output, 1, "alpha");
        assert_eq!(countered.damage, 6);
        assert_eq!(find(&output, 1, "beta").action, DEFAULT_ACTION);
    }

    #[test]
    fn test_attack_damage_bonus_applies() {
        let characters = vec![
            PublicCharacter::new("alpha", "strylan", HexCoord::new(0, 0), 180),
            PublicCharacter::new("beta", "murelious", HexCoord::new(1, 0), 0),
        ];
        let beats = vec![vec![attack("alpha", "a", 3, 0, 50), entry("beta", "W")]];
        let output = run(ResolveInput {
            characters,
            ..input(beats)
        });
        assert_eq!(find(&output, 0, "beta").damage, 4);
    }

    #[test]
    fn test_rewind_focus_is_created_when_halting() {
        let mut rewind = CardDefinition::new(REWIND, CardType::Ability).with_actions(["F", "m"]);
        rewind.priority = 10;
        let catalog = CardCatalog::from_cards(vec![rewind]);
        let powers = PowerTable::builtin();
        let mut focus = entry("alpha", "F");
        focus.card_id = Some(REWIND.to_string());
        let beats = vec![vec![focus, entry("beta", "W")], vec![entry("beta", "W")]];
        let output = resolve_beats(input(beats), ResolveContext::new(&catalog, &powers));
        let created = output
            .interactions
            .iter()
            .find(|i| i.kind == InteractionKind::RewindFocus)
            .expect("focus");
        let resolution = created.resolution.as_ref().expect("resolution");
        assert_eq!(resolution.anchor_hex, Some(HexCoord::new(0, 0)));
        assert_eq!(resolution.return_actions.len(), 1);
        assert_eq!(resolution.return_actions[0].action, "m");
        assert!(output
            .board_tokens
            .iter()
            .any(|token| token.kind == crate::game::board::BoardTokenType::FocusAnchor));
    }

    fn combo_timeline() -> Vec<Beat> {
        let mut finisher = entry("alpha", "Co");
        finisher.card_id = Some("test-strike".to_string());
        vec![
            vec![attack("alpha", "a", 2, 1, 50), entry("beta", "W")],
            vec![finisher, entry("beta", "W")],
            vec![entry("alpha", "E"), entry("beta", "W")],
        ]
    }

    fn combo_ready(flag: bool) -> ComboAvailability {
        ComboAvailability::from([(UserId::from("alpha"), flag)])
    }

    #[test]
    fn test_combo_hit_offers_one_combo() {
        let output = run(ResolveInput {
            combo_availability: combo_ready(true),
            ..input(combo_timeline())
        });
        let pending: Vec<_> = output.pending_interactions().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, InteractionKind::Combo);
        assert_eq!(pending[0].id, "combo:1:alpha:alpha");
        assert!(!find(&output, 1, "alpha").combo_skipped);
        assert_eq!(find(&output, 0, "beta").damage, 2);
    }

    #[test]
    fn test_combo_without_capability_is_skipped() {
        let output = run(ResolveInput {
            combo_availability: combo_ready(false),
            ..input(combo_timeline())
        });
        assert!(find(&output, 1, "alpha").combo_skipped);
        assert!(output.interactions.iter().all(|i| i.kind != InteractionKind::Combo));
    }

    #[test]
    fn test_combo_after_miss_is_skipped() {
        let mut characters = roster();
        characters[1].position = HexCoord::new(3, 0);
        let output = run(ResolveInput {
            characters,
            combo_availability: combo_ready(true),
            ..input(combo_timeline())
        });
        assert_eq!(find(&output, 0, "beta").damage, 0);
        assert!(find(&output, 1, "alpha").combo_skipped);
        assert!(output.interactions.iter().all(|i| i.kind != InteractionKind::Combo));
    }

    #[test]
    fn test_delayed_fire_spares_the_mover() {
        let mut characters = roster();
        characters[1].position = HexCoord::new(-2, 0);
        let step = || {
            let mut runner = entry("alpha", "m").with_priority(30);
            runner.passive_card_id = Some(BURNING_STRIKE.to_string());
            runner
        };
        let beats = vec![
            vec![step(), entry("beta", "W")],
            vec![step(), entry("beta", "W")],
            vec![entry("alpha", "W"), entry("beta", "W")],
        ];
        let output = run(ResolveInput {
            characters,
            ..input(beats)
        });
        assert_eq!(output.last_calculated_index, Some(2));
        assert_eq!(find(&output, 0, "alpha").location, HexCoord::new(1, 0));
        assert_eq!(find(&output, 1, "alpha").location, HexCoord::new(2, 0));
        for index in 0..3 {
            assert_eq!(find(&output, index, "alpha").damage, 0, "beat {index}");
        }
        let mut fire: Vec<HexCoord> = output
            .board_tokens
            .iter()
            .filter(|token| token.kind == crate::game::board::BoardTokenType::FireHex)
            .map(|token| token.position)
            .collect();
        fire.sort_by_key(|coord| (coord.q, coord.r));
        assert_eq!(fire, vec![HexCoord::new(0, 0), HexCoord::new(1, 0)]);
    }

    #[test]
    fn test_knockback_keeps_victims_selected_start() {
        let mut committed = entry("beta", "m");
        committed.rotation_source = Some(RotationSource::Selected);
        let beats = vec![
            vec![attack("alpha", "a", 2, 1, 50), entry("beta", "W")],
            vec![entry("alpha", "W"), entry("beta", "W")],
            vec![entry("alpha", "W"), entry("beta", "W")],
            vec![entry("alpha", "W"), committed],
        ];
        let output = run(input(beats));
        assert_eq!(find(&output, 0, "beta").action, DAMAGE_ICON_ACTION);
        assert_eq!(find(&output, 1, "beta").action, DAMAGE_ICON_ACTION);
        assert_eq!(find(&output, 2, "beta").action, DEFAULT_ACTION);
        let kept = find(&output, 3, "beta");
        assert_eq!(kept.action, "m");
        assert_eq!(kept.rotation_source, Some(RotationSource::Selected));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let beats = vec![
            vec![attack("alpha", "a", 3, 2, 50), entry("beta", "m")],
            vec![entry("alpha", "m"), entry("beta", "m")],
            vec![entry("alpha", "a"), entry("beta", "W")],
        ];
        let first = serde_json::to_string(&run(input(beats.clone()))).expect("json");
        let second = serde_json::to_string(&run(input(beats))).expect("json");
        assert_eq!(first, second);
    }
}
