//! Match-end rules
//!
//! A character loses by drifting more than four hexes from land, or by
//! sitting on an open beat over the abyss with nothing left to play.

use crate::cards::hand::DeckState;
use crate::core::character::PublicCharacter;
use crate::core::hex::{HexCoord, Land};
use crate::core::types::{Terrain, UserId};
use crate::game::timeline::{
    character_first_open_index, character_location_at_index, entry_for, last_entry_for_character,
    sort_beat_entries, timeline_earliest_open_index, Beat, BeatEntry,
};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Distance from land beyond which a character is lost
pub const DISTANCE_LOSS_THRESHOLD: i32 = 4;

pub const DEATH_ACTION: &str = "Death";
pub const VICTORY_ACTION: &str = "Victory";
pub const HANDSHAKE_ACTION: &str = "Handshake";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeReason {
    NoCardsAbyss,
    FarFromLand,
    Forfeit,
    DrawAgreement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loser_user_id: Option<UserId>,
    pub reason: OutcomeReason,
    pub beat_index: usize,
    /// Participants of a draw; empty means everyone
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub draw_user_ids: Vec<UserId>,
}

impl MatchOutcome {
    /// Marker action this outcome writes for `character`, if any
    pub fn action_for(&self, character: &PublicCharacter) -> Option<&'static str> {
        let matches = |id: &UserId| character.matches_key(id.as_str());
        if self.reason == OutcomeReason::DrawAgreement {
            if self.draw_user_ids.is_empty() || self.draw_user_ids.iter().any(matches) {
                return Some(HANDSHAKE_ACTION);
            }
            return None;
        }
        if self.loser_user_id.as_ref().is_some_and(matches) {
            return Some(DEATH_ACTION);
        }
        if self.winner_user_id.as_ref().is_some_and(matches) {
            return Some(VICTORY_ACTION);
        }
        None
    }
}

/// Unknown decks count as playable
fn has_playable_cards(deck: Option<&DeckState>) -> bool {
    let Some(deck) = deck else {
        return true;
    };
    let movement = deck
        .movement
        .iter()
        .any(|card_id| !deck.exhausted_movement_ids.contains(card_id));
    !deck.ability_hand.is_empty() && movement
}

/// First beat at which the character sits past the distance threshold
fn distance_loss(beats: &[Beat], character: &PublicCharacter, land: &Land) -> Option<(usize, i32)> {
    let distance_at = |position: HexCoord| land.distance_to_land(position).unwrap_or(i32::MAX);
    let mut position = character.position;
    if beats.is_empty() {
        let distance = distance_at(position);
        return (distance > DISTANCE_LOSS_THRESHOLD).then_some((0, distance));
    }
    for (index, beat) in beats.iter().enumerate() {
        if let Some(entry) = entry_for(beat, character) {
            position = entry.location;
        }
        let distance = distance_at(position);
        if distance > DISTANCE_LOSS_THRESHOLD {
            return Some((index, distance));
        }
    }
    None
}

/// Decide whether the timeline ends the match
pub fn evaluate_match_outcome(
    beats: &[Beat],
    characters: &[PublicCharacter],
    deck_states: &BTreeMap<UserId, DeckState>,
    land: &Land,
) -> Option<MatchOutcome> {
    if characters.is_empty() {
        return None;
    }
    let land = effective_land(land);
    let earliest = timeline_earliest_open_index(beats, characters);
    let mut distance_losses = Vec::new();
    let mut stranded = Vec::new();

    for character in characters {
        if let Some((index, distance)) = distance_loss(beats, character, &land) {
            distance_losses.push((index, distance, character.user_id.clone()));
            continue;
        }
        let index = character_first_open_index(beats, character);
        let open = beats
            .get(index)
            .and_then(|beat| entry_for(beat, character))
            .map_or(true, |entry| entry.action == crate::core::action::DEFAULT_ACTION);
        if !open || index != earliest {
            continue;
        }
        let Some(position) = character_location_at_index(beats, character, index) else {
            continue;
        };
        if land.contains(position) || has_playable_cards(deck_states.get(&character.user_id)) {
            continue;
        }
        stranded.push((character.user_id.clone(), index));
    }

    let winner_against = |loser: &UserId| {
        characters
            .iter()
            .find(|character| &character.user_id != loser)
            .map(|character| character.user_id.clone())
    };

    if let Some((index, _, loser)) = distance_losses
        .into_iter()
        .min_by_key(|(index, distance, user_id)| (*index, Reverse(*distance), user_id.clone()))
    {
        let winner = winner_against(&loser)?;
        return Some(MatchOutcome {
            winner_user_id: Some(winner),
            loser_user_id: Some(loser),
            reason: OutcomeReason::FarFromLand,
            beat_index: index + 1,
            draw_user_ids: Vec::new(),
        });
    }

    let [(loser, index)] = stranded.as_slice() else {
        return None;
    };
    let winner = winner_against(loser)?;
    Some(MatchOutcome {
        winner_user_id: Some(winner),
        loser_user_id: Some(loser.clone()),
        reason: OutcomeReason::NoCardsAbyss,
        beat_index: *index,
        draw_user_ids: Vec::new(),
    })
}

/// Marker entry carrying the character's last known state
fn marker_entry(action: &str, character: &PublicCharacter, prior: Option<&BeatEntry>, land: &Land) -> BeatEntry {
    let location = prior.map_or(character.position, |entry| entry.location);
    let mut entry = BeatEntry::new(character.username.as_str(), action);
    entry.location = location;
    entry.facing = prior.map_or(character.facing, |entry| entry.facing);
    entry.damage = prior.map_or(0, |entry| entry.damage);
    entry.terrain = Some(
        prior
            .and_then(|entry| entry.terrain)
            .unwrap_or_else(|| Terrain::from_land(land.contains(location))),
    );
    entry
}

fn effective_land(land: &Land) -> std::borrow::Cow<'_, Land> {
    if land.is_empty() {
        std::borrow::Cow::Owned(Land::default())
    } else {
        std::borrow::Cow::Borrowed(land)
    }
}

/// Write a `Death` marker and drop the loser's later entries
pub fn apply_death_to_beats(
    beats: &mut Vec<Beat>,
    characters: &[PublicCharacter],
    loser: &UserId,
    death_index: usize,
    land: &Land,
) {
    let Some(target) = characters.iter().find(|character| character.matches_key(loser.as_str())) else {
        return;
    };
    let land = effective_land(land);
    if beats.len() <= death_index {
        beats.resize_with(death_index + 1, Vec::new);
    }
    let death = marker_entry(
        DEATH_ACTION,
        target,
        last_entry_for_character(beats, target, death_index),
        &land,
    );
    let beat = &mut beats[death_index];
    beat.retain(|entry| !entry.is_for(target));
    beat.push(death);
    sort_beat_entries(beat, characters);
    for beat in beats.iter_mut().skip(death_index + 1) {
        beat.retain(|entry| !entry.is_for(target));
    }
}

/// Write every participant's outcome marker and cut the timeline after it
pub fn apply_match_outcome_to_beats(
    beats: &mut Vec<Beat>,
    characters: &[PublicCharacter],
    outcome: &MatchOutcome,
    land: &Land,
) {
    if characters.is_empty() {
        return;
    }
    let land = effective_land(land);
    let index = outcome.beat_index;
    if beats.len() <= index {
        beats.resize_with(index + 1, Vec::new);
    }
    let markers: Vec<BeatEntry> = characters
        .iter()
        .filter_map(|character| {
            let action = outcome.action_for(character)?;
            let prior = last_entry_for_character(beats, character, index);
            Some(marker_entry(action, character, prior, &land))
        })
        .collect();
    if markers.is_empty() {
        return;
    }
    let beat = &mut beats[index];
    beat.retain(|entry| !markers.iter().any(|marker| marker.key() == entry.key()));
    beat.extend(markers);
    sort_beat_entries(beat, characters);
    beats.truncate(index + 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<PublicCharacter> {
        vec![
            PublicCharacter::new("alpha", "murelious", HexCoord::new(0, 0), 180),
            PublicCharacter::new("beta", "murelious", HexCoord::new(1, 0), 0),
        ]
    }

    fn at(key: &str, action: &str, q: i32, r: i32) -> BeatEntry {
        let mut entry = BeatEntry::new(key, action);
        entry.location = HexCoord::new(q, r);
        entry.calculated = true;
        entry
    }

    fn empty_deck() -> DeckState {
        DeckState {
            movement: vec!["step".to_string()],
            ability_hand: Vec::new(),
            ability_deck: Vec::new(),
            base_max_hand_size: None,
            focused_ability_card_ids: Default::default(),
            exhausted_movement_ids: Default::default(),
            last_refresh_index: None,
            active_card_id: None,
            passive_card_id: None,
        }
    }

    #[test]
    fn test_far_from_land_loses() {
        let beats = vec![
            vec![at("alpha", "m", 0, 0), at("beta", "m", 20, 0)],
            vec![at("alpha", "E", 0, 0), at("beta", "E", 20, 0)],
        ];
        let outcome = evaluate_match_outcome(&beats, &roster(), &BTreeMap::new(), &Land::default()).expect("outcome");
        assert_eq!(outcome.reason, OutcomeReason::FarFromLand);
        assert_eq!(outcome.loser_user_id, Some(UserId::new("beta")));
        assert_eq!(outcome.winner_user_id, Some(UserId::new("alpha")));
        assert_eq!(outcome.beat_index, 1);
    }

    #[test]
    fn test_stranded_without_cards_loses() {
        let mut beats = vec![vec![at("alpha", "m", 0, 0), at("beta", "m", 9, 0)]];
        beats.push(vec![BeatEntry::new("alpha", "E"), BeatEntry::new("beta", "E")]);
        beats[1][0].location = HexCoord::new(0, 0);
        beats[1][1].location = HexCoord::new(9, 0);
        let land = Land::new(vec![HexCoord::new(0, 0), HexCoord::new(6, 0)]);
        let mut decks = BTreeMap::new();
        decks.insert(UserId::new("beta"), empty_deck());
        let outcome = evaluate_match_outcome(&beats, &roster(), &decks, &land).expect("outcome");
        assert_eq!(outcome.reason, OutcomeReason::NoCardsAbyss);
        assert_eq!(outcome.loser_user_id, Some(UserId::new("beta")));
        assert_eq!(outcome.beat_index, 1);
    }

    #[test]
    fn test_no_outcome_while_cards_remain() {
        let beats = vec![vec![at("alpha", "E", 0, 0), at("beta", "E", 1, 0)]];
        assert!(evaluate_match_outcome(&beats, &roster(), &BTreeMap::new(), &Land::default()).is_none());
    }

    #[test]
    fn test_apply_death_clears_later_entries() {
        let mut beats = vec![
            vec![at("alpha", "m", 0, 0), at("beta", "m", 2, 0)],
            vec![at("alpha", "m", 0, 0), at("beta", "m", 3, 0)],
            vec![at("alpha", "m", 0, 0), at("beta", "m", 4, 0)],
        ];
        apply_death_to_beats(&mut beats, &roster(), &UserId::new("beta"), 1, &Land::default());
        assert_eq!(beats[1][1].action, DEATH_ACTION);
        assert_eq!(beats[1][1].location, HexCoord::new(3, 0));
        assert_eq!(beats[2].len(), 1);
    }

    #[test]
    fn test_apply_outcome_writes_markers_and_truncates() {
        let mut beats = vec![
            vec![at("alpha", "m", 0, 0), at("beta", "m", 2, 0)],
            vec![at("alpha", "m", 1, 0), at("beta", "m", 3, 0)],
            vec![at("alpha", "m", 2, 0), at("beta", "m", 4, 0)],
        ];
        let outcome = MatchOutcome {
            winner_user_id: Some(UserId::new("alpha")),
            loser_user_id: Some(UserId::new("beta")),
            reason: OutcomeReason::Forfeit,
            beat_index: 1,
            draw_user_ids: Vec::new(),
        };
        apply_match_outcome_to_beats(&mut beats, &roster(), &outcome, &Land::default());
        assert_eq!(beats.len(), 2);
        assert_eq!(beats[1][0].action, VICTORY_ACTION);
        assert_eq!(beats[1][1].action, DEATH_ACTION);
        assert_eq!(beats[1][0].location, HexCoord::new(1, 0));
    }

    #[test]
    fn test_draw_agreement_marks_everyone() {
        let outcome = MatchOutcome {
            winner_user_id: None,
            loser_user_id: None,
            reason: OutcomeReason::DrawAgreement,
            beat_index: 0,
            draw_user_ids: Vec::new(),
        };
        for character in roster() {
            assert_eq!(outcome.action_for(&character), Some(HANDSHAKE_ACTION));
        }
    }
}
