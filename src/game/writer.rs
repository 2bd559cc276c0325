//! Timeline mutation during resolution
//!
//! The engine rewrites future beats as it resolves: hits insert stun
//! windows, card swaps replace action sets, rewinds splice return actions.
//! `TimelineWriter` owns the beats being resolved and keeps at most one
//! entry per character per beat.

use crate::cards::text::build_card_action_list;
use crate::core::action::{ActionListItem, DAMAGE_ICON_ACTION, DEFAULT_ACTION};
use crate::core::card::CardCatalog;
use crate::core::hex::Land;
use crate::core::types::{RotationSource, Terrain};
use crate::core::PublicCharacter;
use crate::game::combat::{ActorState, REWIND};
use crate::game::logger::{ResolveLogger, VerbosityLevel};
use crate::game::timeline::{Beat, BeatEntry, Consequence};
use std::collections::BTreeSet;

/// Options for writing an action list over the timeline
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyListOptions {
    /// Mark the first written entry as an action-set start
    pub mark_combo_starter: bool,
    /// Keep the character's entries after the written window
    pub preserve_after_end: bool,
}

/// Options for a stun window
#[derive(Debug, Clone, Copy, Default)]
pub struct HitTimelineOptions {
    /// Window length; defaults to knockback distance + 1
    pub damage_icon_count: Option<i32>,
    pub stun_only: bool,
    pub preserve_after_end: bool,
}

/// Reset an entry to an empty `E`
pub fn clear_action_fields(entry: &mut BeatEntry) {
    entry.action = DEFAULT_ACTION.to_string();
    entry.rotation.clear();
    entry.priority = 0;
    entry.rotation_source = None;
    entry.interaction = None;
    entry.attack_damage = None;
    entry.attack_kbf = None;
    entry.combo_starter = false;
    entry.card_id = None;
    entry.passive_card_id = None;
    entry.stun_only = false;
    entry.focus_card_id = None;
}

/// Copy everything that describes the action from `source` onto `target`
///
/// With `preserve_selected_rotation`, a target that holds a player-selected
/// rotation keeps it.
pub fn copy_action_fields(target: &mut BeatEntry, source: &BeatEntry, preserve_selected_rotation: bool) {
    target.action = source.action.clone();
    if !(preserve_selected_rotation && target.rotation_source == Some(RotationSource::Selected)) {
        target.rotation = source.rotation.clone();
        target.rotation_source = source.rotation_source;
    }
    target.priority = source.priority;
    target.interaction = source.interaction.clone();
    target.attack_damage = source.attack_damage;
    target.attack_kbf = source.attack_kbf;
    target.combo_starter = source.combo_starter;
    target.card_id = source.card_id.clone();
    target.passive_card_id = source.passive_card_id.clone();
    target.stun_only = source.stun_only;
    target.focus_card_id = None;
}

fn stamp(entry: &mut BeatEntry, state: &ActorState, land: &Land, calculated: bool) {
    entry.damage = state.damage;
    entry.location = state.position;
    entry.facing = state.facing;
    entry.terrain = Some(Terrain::from_land(land.contains(state.position)));
    entry.calculated = calculated;
}

fn fresh_entry(character: &PublicCharacter, action: &str, state: &ActorState, land: &Land) -> BeatEntry {
    let mut entry = BeatEntry::new(character.username.as_str(), action);
    stamp(&mut entry, state, land, false);
    entry
}

/// Owns the beats under resolution
pub struct TimelineWriter<'a> {
    beats: Vec<Beat>,
    land: &'a Land,
    logger: Option<&'a ResolveLogger>,
}

impl<'a> TimelineWriter<'a> {
    pub fn new(beats: Vec<Beat>, land: &'a Land, logger: Option<&'a ResolveLogger>) -> Self {
        TimelineWriter { beats, land, logger }
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn beats_mut(&mut self) -> &mut Vec<Beat> {
        &mut self.beats
    }

    pub fn into_beats(self) -> Vec<Beat> {
        self.beats
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn ensure_beat(&mut self, index: usize) {
        if self.beats.len() <= index {
            self.beats.resize_with(index + 1, Vec::new);
        }
    }

    fn position(&self, index: usize, character: &PublicCharacter) -> Option<usize> {
        self.beats.get(index)?.iter().position(|entry| entry.is_for(character))
    }

    pub fn entry(&self, index: usize, character: &PublicCharacter) -> Option<&BeatEntry> {
        self.beats.get(index)?.iter().find(|entry| entry.is_for(character))
    }

    pub fn entry_mut(&mut self, index: usize, character: &PublicCharacter) -> Option<&mut BeatEntry> {
        self.beats.get_mut(index)?.iter_mut().find(|entry| entry.is_for(character))
    }

    /// Action label at a beat, `None` when the character has no entry
    pub fn action_at(&self, index: usize, character: &PublicCharacter) -> Option<&str> {
        self.entry(index, character).map(|entry| entry.action.as_str())
    }

    /// Keep only the first entry for `character` in a beat
    pub fn prune_duplicates(&mut self, index: usize, character: &PublicCharacter) {
        let Some(beat) = self.beats.get_mut(index) else {
            return;
        };
        let mut seen = false;
        beat.retain(|entry| {
            if !entry.is_for(character) {
                return true;
            }
            let keep = !seen;
            seen = true;
            keep
        });
    }

    pub fn get_or_create(&mut self, index: usize, character: &PublicCharacter, state: &ActorState) -> &mut BeatEntry {
        self.ensure_beat(index);
        let position = match self.position(index, character) {
            Some(position) => position,
            None => {
                let entry = fresh_entry(character, DEFAULT_ACTION, state, self.land);
                self.beats[index].push(entry);
                self.beats[index].len() - 1
            }
        };
        &mut self.beats[index][position]
    }

    /// Overwrite (or create) an entry with `action`, dropping its card ids
    pub fn upsert(
        &mut self,
        index: usize,
        character: &PublicCharacter,
        action: &str,
        state: &ActorState,
    ) -> &mut BeatEntry {
        let land = self.land;
        let existed = self.entry(index, character).is_some();
        let entry = self.get_or_create(index, character, state);
        if existed {
            entry.username = character.username.as_str().into();
            entry.action = action.to_string();
            entry.priority = 0;
            entry.card_id = None;
            entry.passive_card_id = None;
            entry.combo_starter = false;
            entry.combo_skipped = false;
            entry.stun_only = false;
            stamp(entry, state, land, false);
        } else {
            entry.action = action.to_string();
        }
        entry
    }

    pub fn record_hit(
        &mut self,
        index: usize,
        character: &PublicCharacter,
        state: &ActorState,
        damage_delta: i32,
        knockback: i32,
    ) {
        let entry = self.get_or_create(index, character, state);
        entry.consequences.push(Consequence::hit(damage_delta, knockback.max(0)));
    }

    pub fn clear_consequences(&mut self, index: usize) {
        if let Some(beat) = self.beats.get_mut(index) {
            for entry in beat.iter_mut() {
                entry.consequences.clear();
            }
        }
    }

    /// Drop `character`'s entries after `index`
    ///
    /// Without `preserve` everything goes. With it, stop at the next
    /// protected action-set start or at any beat in the given set
    /// (committed rewind returns).
    pub fn clear_entries_after(&mut self, character: &PublicCharacter, index: usize, preserve: Option<&BTreeSet<usize>>) {
        for i in index + 1..self.beats.len() {
            if let Some(protected) = preserve {
                let starts_here = self
                    .entry(i, character)
                    .is_some_and(|entry| entry.is_protected_start());
                if starts_here || protected.contains(&i) {
                    break;
                }
            }
            self.beats[i].retain(|entry| !entry.is_for(character));
        }
    }

    /// First beat after `index` where `character` is missing or open
    pub fn first_open_after(&self, character: &PublicCharacter, index: usize) -> usize {
        (index + 1..self.beats.len())
            .find(|&i| self.entry(i, character).map_or(true, |entry| entry.is_open()))
            .unwrap_or(self.beats.len())
    }

    /// Write `list` for `character` starting at `start`
    ///
    /// Returns false when there was nothing to write.
    pub fn apply_action_list(
        &mut self,
        character: &PublicCharacter,
        start: usize,
        state: &ActorState,
        list: &[ActionListItem],
        options: ApplyListOptions,
    ) -> bool {
        if list.is_empty() {
            return false;
        }
        let land = self.land;
        for (offset, item) in list.iter().enumerate() {
            let index = start + offset;
            let entry = self.get_or_create(index, character, state);
            entry.username = character.username.as_str().into();
            entry.action = item.action.clone();
            entry.rotation = item.rotation.clone();
            entry.rotation_source = item.rotation_source;
            entry.priority = item.priority;
            entry.interaction = item.interaction.clone();
            entry.attack_damage = item.damage;
            entry.attack_kbf = item.kbf;
            entry.card_id = item.card_id.clone();
            entry.passive_card_id = item.passive_card_id.clone();
            entry.combo_starter = options.mark_combo_starter && offset == 0;
            entry.combo_skipped = false;
            entry.consequences.clear();
            entry.stun_only = false;
            stamp(entry, state, land, false);
            self.prune_duplicates(index, character);
        }
        if !options.preserve_after_end {
            self.clear_entries_after(character, start + list.len() - 1, None);
        }
        true
    }

    /// The character's entries from `start` already spell out `list`
    pub fn matches_action_list_window(&self, character: &PublicCharacter, start: usize, list: &[ActionListItem]) -> bool {
        if list.is_empty() {
            return false;
        }
        list.iter().enumerate().all(|(offset, item)| {
            let Some(entry) = self.entry(start + offset, character) else {
                return false;
            };
            if entry.action != item.action {
                return false;
            }
            let card_matches = item.card_id.as_deref().map_or(true, |id| entry.card_id.as_deref() == Some(id));
            let passive_matches = item
                .passive_card_id
                .as_deref()
                .map_or(true, |id| entry.passive_card_id.as_deref() == Some(id));
            card_matches && passive_matches
        })
    }

    /// Some non-rewind card is committed in the window
    pub fn has_committed_non_rewind_action(&self, character: &PublicCharacter, start: usize, len: usize) -> bool {
        (start..start + len).any(|index| {
            self.entry(index, character).is_some_and(|entry| {
                !entry.is_open() && entry.card_id.as_deref().is_some_and(|id| !id.is_empty() && id != REWIND)
            })
        })
    }

    /// Rotation of the action set containing `index`: the selected one, else the first non-empty
    pub fn action_set_rotation(&self, character: &PublicCharacter, index: usize) -> String {
        let is_open_at = |i: usize| self.entry(i, character).map_or(true, |entry| entry.is_open());
        let start = (0..=index).rev().find(|&i| is_open_at(i)).map_or(0, |i| i + 1);
        let end = (start.max(index)..self.beats.len())
            .find(|&i| is_open_at(i))
            .unwrap_or_else(|| self.beats.len().saturating_sub(1));

        let mut fallback = String::new();
        for i in start..=end {
            let Some(entry) = self.entry(i, character) else {
                continue;
            };
            let rotation = entry.rotation.trim();
            if rotation.is_empty() {
                continue;
            }
            if entry.rotation_source == Some(RotationSource::Selected) {
                return rotation.to_string();
            }
            if fallback.is_empty() {
                fallback = rotation.to_string();
            }
        }
        fallback
    }

    /// Swap the entry's active and passive cards and rewrite the action set from `index`
    pub fn swap_active_with_passive(
        &mut self,
        character: &PublicCharacter,
        index: usize,
        state: &ActorState,
        catalog: &CardCatalog,
    ) -> bool {
        let Some(source) = self.entry(index, character) else {
            return false;
        };
        let (Some(active_id), Some(passive_id)) = (source.card_id.clone(), source.passive_card_id.clone()) else {
            return false;
        };
        let rotation = source.rotation.trim().to_string();
        let rotation_source = source.rotation_source;

        let (Some(next_active), Some(next_passive)) = (catalog.get(&passive_id), catalog.get(&active_id)) else {
            return false;
        };
        if next_active.card_type == next_passive.card_type {
            return false;
        }
        let mut list = build_card_action_list(next_active, next_passive, &rotation);
        let Some(first) = list.first_mut() else {
            return false;
        };
        first.rotation = rotation.clone();
        match rotation_source {
            Some(source) => first.rotation_source = Some(source),
            None if rotation.is_empty() => first.rotation_source = None,
            None => {}
        }
        self.apply_action_list(
            character,
            index,
            state,
            &list,
            ApplyListOptions {
                mark_combo_starter: true,
                preserve_after_end: false,
            },
        )
    }

    /// Insert a stun window after a hit
    ///
    /// The window starts at the hit beat, or the next beat when the target
    /// already acted. An existing window is extended rather than stacked, and
    /// the beat after the window becomes open unless a committed action
    /// already sits there.
    pub fn apply_hit_timeline(
        &mut self,
        character: &PublicCharacter,
        index: usize,
        state: &ActorState,
        knockback: i32,
        preserve_action: bool,
        options: HitTimelineOptions,
    ) {
        let source_cards = self
            .entry(index, character)
            .map(|entry| (entry.card_id.clone(), entry.passive_card_id.clone()));
        let start = if preserve_action { index + 1 } else { index };
        let knockback = knockback.max(0);
        let icons = options.damage_icon_count.map_or(knockback + 1, |count| count.max(0)) as usize;
        let computed_end = start + icons;

        let applied_end = (start..self.beats.len())
            .take_while(|&i| self.action_at(i, character) == Some(DAMAGE_ICON_ACTION))
            .last();
        let end = applied_end.map_or(computed_end, |applied| computed_end.max(applied + 1));
        let extended = applied_end.is_some_and(|applied| end > applied + 1);

        let before = self.beats.len();
        self.ensure_beat(end);
        if self.beats.len() > before {
            crate::resolve_log!(
                self.logger,
                VerbosityLevel::Verbose,
                "knockback-extend",
                "{} at beat {}: window to {} (+{} beats, knockback {}, icons {}, stun only {})",
                character.user_id,
                index,
                end,
                self.beats.len() - before,
                knockback,
                icons,
                options.stun_only
            );
        }

        for i in start..end {
            let had_icon = self.action_at(i, character) == Some(DAMAGE_ICON_ACTION);
            let entry = self.upsert(i, character, DAMAGE_ICON_ACTION, state);
            if i == start && !had_icon {
                if let Some((card_id, passive_card_id)) = &source_cards {
                    if card_id.is_some() {
                        entry.card_id = card_id.clone();
                    }
                    if passive_card_id.is_some() {
                        entry.passive_card_id = passive_card_id.clone();
                    }
                }
            }
            entry.stun_only = options.stun_only;
        }

        let keep_committed = self.entry(end, character).is_some_and(|entry| {
            !entry.is_open()
                && entry.action != DAMAGE_ICON_ACTION
                && (entry.is_protected_start() || (applied_end.is_some() && !extended))
        });
        let land = self.land;
        if keep_committed {
            if let Some(entry) = self.entry_mut(end, character) {
                entry.stun_only = false;
                stamp(entry, state, land, false);
            }
        } else {
            let entry = self.upsert(end, character, DEFAULT_ACTION, state);
            entry.stun_only = false;
        }

        if (applied_end.is_none() || extended) && !keep_committed && !options.preserve_after_end {
            self.clear_entries_after(character, end, Some(&BTreeSet::new()));
        }
    }

    /// Haven skip: pull the rest of the action set one beat earlier
    pub fn shift_action_set_left(&mut self, character: &PublicCharacter, from: usize) {
        let mut sequence = Vec::new();
        for i in from..self.beats.len() {
            let Some(entry) = self.entry(i, character) else {
                break;
            };
            sequence.push(i);
            if entry.is_open() {
                break;
            }
        }
        if sequence.len() < 2 {
            return;
        }
        for pair in sequence.windows(2) {
            let Some(source) = self.entry(pair[1], character).cloned() else {
                continue;
            };
            if let Some(target) = self.entry_mut(pair[0], character) {
                copy_action_fields(target, &source, pair[0] == from);
            }
        }
        if let Some(last) = sequence.last().and_then(|&i| self.entry_mut(i, character)) {
            clear_action_fields(last);
        }
    }

    /// Guard continue: repeat the entries from `continue_index` through `e_index` starting at `e_index`
    ///
    /// Only the final beat may be missing; it repeats as an empty `E`.
    pub fn apply_guard_continue_loop(
        &mut self,
        character: &PublicCharacter,
        continue_index: usize,
        e_index: usize,
        state: &ActorState,
    ) -> bool {
        if e_index < continue_index {
            return false;
        }
        let mut pattern: Vec<BeatEntry> = Vec::new();
        for i in continue_index..=e_index {
            if let Some(entry) = self.entry(i, character) {
                pattern.push(entry.clone());
                continue;
            }
            if i != e_index {
                return false;
            }
            let mut implicit = pattern
                .last()
                .cloned()
                .unwrap_or_else(|| BeatEntry::new(character.username.as_str(), DEFAULT_ACTION));
            implicit.action = DEFAULT_ACTION.to_string();
            implicit.rotation.clear();
            implicit.priority = 0;
            implicit.rotation_source = None;
            implicit.interaction = None;
            implicit.attack_damage = None;
            implicit.attack_kbf = None;
            implicit.combo_starter = false;
            pattern.push(implicit);
        }
        for (offset, source) in pattern.iter().enumerate() {
            let target = self.get_or_create(e_index + offset, character, state);
            copy_action_fields(target, source, false);
            target.consequences.clear();
        }
        true
    }

    /// Everything about a character's entry that a rerun cares about
    pub fn action_signature(&self, index: usize, character: &PublicCharacter) -> String {
        let Some(entry) = self.entry(index, character) else {
            return "__missing__".to_string();
        };
        let rotation_source = match entry.rotation_source {
            Some(RotationSource::Selected) => "selected",
            Some(RotationSource::Forced) => "forced",
            None => "",
        };
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            entry.action,
            entry.rotation,
            entry.priority,
            entry.card_id.as_deref().unwrap_or_default(),
            entry.passive_card_id.as_deref().unwrap_or_default(),
            rotation_source,
            if entry.combo_starter { "combo" } else { "" },
            entry.interaction.as_ref().map_or("", |interaction| interaction.kind.as_str()),
        )
    }
}
