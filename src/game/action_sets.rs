//! Committing an action list to the timeline

use crate::core::action::ActionListItem;
use crate::core::PublicCharacter;
use crate::game::logger::{ResolveLogger, VerbosityLevel};
use crate::game::timeline::{entry_for, first_unresolved_index, sort_beat_entries, Beat, BeatEntry};

/// Write `action_list` for `user_id` into a copy of `beats`
///
/// Writing starts at the character's first missing or open entry after the
/// resolved prefix. Every written entry takes the damage, location and
/// facing of the last entry before the start (or the roster position), so
/// the engine recomputes them. The character's entries after the last
/// written beat are dropped.
pub fn apply_action_set_to_beats(
    beats: &[Beat],
    characters: &[PublicCharacter],
    user_id: &str,
    action_list: &[ActionListItem],
    logger: Option<&ResolveLogger>,
) -> Vec<Beat> {
    let Some(target) = characters.iter().find(|character| character.user_id == user_id) else {
        crate::resolve_log!(logger, VerbosityLevel::Verbose, "apply", "skip unknown user {}", user_id);
        return beats.to_vec();
    };
    if action_list.is_empty() {
        return beats.to_vec();
    }

    let mut updated: Vec<Beat> = beats.to_vec();
    let scan_start = first_unresolved_index(&updated);
    let start_index = (scan_start..updated.len())
        .find(|&index| match entry_for(&updated[index], target) {
            None => true,
            Some(entry) => entry.is_open(),
        })
        .unwrap_or_else(|| scan_start.max(updated.len()));

    let seed = (0..start_index)
        .rev()
        .find_map(|index| entry_for(&updated[index], target))
        .map(|entry| (entry.damage, entry.location, entry.facing))
        .unwrap_or((0, target.position, target.facing));
    let (seed_damage, seed_location, seed_facing) = seed;

    let last_index = start_index + action_list.len() - 1;
    if updated.len() <= last_index {
        updated.resize_with(last_index + 1, Vec::new);
    }

    for (offset, item) in action_list.iter().enumerate() {
        let beat = &mut updated[start_index + offset];
        let mut entry = match beat.iter().position(|entry| entry.is_for(target)) {
            Some(position) => beat.remove(position),
            None => BeatEntry::new(target.username.as_str(), item.action.as_str()),
        };
        entry.username = target.username.as_str().into();
        entry.action = item.action.clone();
        entry.rotation = item.rotation.clone();
        entry.rotation_source = item.rotation_source;
        entry.priority = item.priority;
        entry.interaction = item.interaction.clone();
        entry.combo_skipped = false;
        entry.combo_starter = offset == 0 && item.combo_starter;
        entry.card_id = item.card_id.clone();
        entry.passive_card_id = item.passive_card_id.clone();
        if item.damage.is_some() {
            entry.attack_damage = item.damage;
        }
        if item.kbf.is_some() {
            entry.attack_kbf = item.kbf;
        }
        entry.damage = seed_damage;
        entry.location = seed_location;
        entry.facing = seed_facing;
        entry.calculated = false;

        // Any other entries for the same character in this beat are stale
        beat.retain(|other| !other.is_for(target));
        beat.push(entry);
        if beat.len() > 1 {
            sort_beat_entries(beat, characters);
        }
    }

    let mut removed = 0;
    for beat in updated.iter_mut().skip(last_index + 1) {
        let before = beat.len();
        beat.retain(|entry| !entry.is_for(target));
        removed += before - beat.len();
    }

    crate::resolve_log!(
        logger,
        VerbosityLevel::Normal,
        "apply",
        "user {} start {} last {} removed {} actions {:?}",
        user_id,
        start_index,
        last_index,
        removed,
        action_list.iter().map(|item| item.action.as_str()).collect::<Vec<_>>()
    );

    updated
}
