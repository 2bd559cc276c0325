//! Beat timeline
//!
//! The timeline is an ordered list of beats; each beat holds at most one
//! entry per character. Entries name their character by user id or username.

use crate::core::action::{is_open_action, DEFAULT_ACTION};
use crate::core::hex::HexCoord;
use crate::core::types::{BeatInteraction, RotationSource, Terrain, UserId};
use crate::core::PublicCharacter;
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Kind of consequence recorded on an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsequenceKind {
    Hit,
}

/// Damage and knockback applied to an entry's character during a beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consequence {
    #[serde(rename = "type")]
    pub kind: ConsequenceKind,
    pub damage_delta: i32,
    pub knockback_distance: i32,
}

impl Consequence {
    pub fn hit(damage_delta: i32, knockback_distance: i32) -> Self {
        Consequence {
            kind: ConsequenceKind::Hit,
            damage_delta,
            knockback_distance,
        }
    }
}

/// One character's record for one beat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatEntry {
    /// Character key (user id or username)
    #[serde(alias = "userId", alias = "userID")]
    pub username: UserId,
    pub action: String,
    #[serde(default)]
    pub rotation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_source: Option<RotationSource>,
    #[serde(default)]
    pub priority: i32,
    /// Accumulated damage snapshot
    #[serde(default)]
    pub damage: i32,
    #[serde(default)]
    pub location: HexCoord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terrain: Option<Terrain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_start_terrain: Option<Terrain>,
    #[serde(default)]
    pub facing: i32,
    #[serde(default)]
    pub calculated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<BeatInteraction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_damage: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_kbf: Option<i32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub combo_starter: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub combo_skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_card_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive_card_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub haven_passive_skip_applied: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub stun_only: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consequences: Vec<Consequence>,
}

impl BeatEntry {
    /// Fresh uncalculated entry with the given action
    pub fn new(key: impl Into<UserId>, action: impl Into<String>) -> Self {
        BeatEntry {
            username: key.into(),
            action: action.into(),
            rotation: String::new(),
            rotation_source: None,
            priority: 0,
            damage: 0,
            location: HexCoord::default(),
            terrain: None,
            card_start_terrain: None,
            facing: 0,
            calculated: false,
            interaction: None,
            attack_damage: None,
            attack_kbf: None,
            combo_starter: false,
            combo_skipped: false,
            focus_card_id: None,
            card_id: None,
            passive_card_id: None,
            haven_passive_skip_applied: false,
            stun_only: false,
            consequences: Vec::new(),
        }
    }

    /// Open entry placed at a character's current state
    pub fn open_for(character: &PublicCharacter, damage: i32, location: HexCoord, facing: i32) -> Self {
        let mut entry = BeatEntry::new(character.username.as_str(), DEFAULT_ACTION);
        entry.damage = damage;
        entry.location = location;
        entry.facing = facing;
        entry
    }

    pub fn with_rotation(mut self, rotation: impl Into<String>) -> Self {
        self.rotation = rotation.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_location(mut self, location: HexCoord, facing: i32) -> Self {
        self.location = location;
        self.facing = facing;
        self
    }

    pub fn with_attack(mut self, damage: i32, kbf: i32) -> Self {
        self.attack_damage = Some(damage);
        self.attack_kbf = Some(kbf);
        self
    }

    pub fn key(&self) -> &str {
        self.username.as_str()
    }

    pub fn is_for(&self, character: &PublicCharacter) -> bool {
        character.matches_key(self.username.as_str())
    }

    /// `E` or `F` (an unfilled slot waiting for a submission)
    pub fn is_open(&self) -> bool {
        is_open_action(&self.action)
    }

    /// A player-chosen action-set start
    pub fn is_protected_start(&self) -> bool {
        self.rotation_source == Some(RotationSource::Selected) || self.combo_starter
    }
}

/// All entries for one beat
pub type Beat = Vec<BeatEntry>;

pub fn entry_for<'a>(beat: &'a [BeatEntry], character: &PublicCharacter) -> Option<&'a BeatEntry> {
    beat.iter().find(|entry| entry.is_for(character))
}

pub fn entry_for_mut<'a>(beat: &'a mut [BeatEntry], character: &PublicCharacter) -> Option<&'a mut BeatEntry> {
    beat.iter_mut().find(|entry| entry.is_for(character))
}

/// Entry for a character at a beat index
pub fn entry_at<'a>(beats: &'a [Beat], index: usize, character: &PublicCharacter) -> Option<&'a BeatEntry> {
    beats.get(index).and_then(|beat| entry_for(beat, character))
}

/// Find a character on the roster by entry key
pub fn character_for_key<'a>(characters: &'a [PublicCharacter], key: &str) -> Option<&'a PublicCharacter> {
    characters.iter().find(|character| character.matches_key(key))
}

/// First index whose entry is missing or still open
///
/// Calculated `E` entries are history (the character was idle), so they
/// do not count as open. Falls back to the last index.
pub fn character_first_open_index(beats: &[Beat], character: &PublicCharacter) -> usize {
    if beats.is_empty() {
        return 0;
    }
    for (index, beat) in beats.iter().enumerate() {
        match entry_for(beat, character) {
            None => return index,
            Some(entry) if entry.action == DEFAULT_ACTION && !entry.calculated => return index,
            _ => {}
        }
    }
    beats.len() - 1
}

/// Lowest first-open index across the roster
pub fn timeline_earliest_open_index(beats: &[Beat], characters: &[PublicCharacter]) -> usize {
    if beats.is_empty() || characters.is_empty() {
        return 0;
    }
    characters
        .iter()
        .map(|character| character_first_open_index(beats, character))
        .fold(beats.len() - 1, usize::min)
}

/// Characters whose first open beat is the timeline's earliest
pub fn characters_at_earliest_open<'a>(beats: &[Beat], characters: &'a [PublicCharacter]) -> Vec<&'a PublicCharacter> {
    let earliest = timeline_earliest_open_index(beats, characters);
    characters
        .iter()
        .filter(|character| character_first_open_index(beats, character) == earliest)
        .collect()
}

pub fn is_character_at_earliest_open(beats: &[Beat], characters: &[PublicCharacter], character: &PublicCharacter) -> bool {
    character_first_open_index(beats, character) == timeline_earliest_open_index(beats, characters)
}

/// Last entry for a character at or before `index`
pub fn last_entry_for_character<'a>(
    beats: &'a [Beat],
    character: &PublicCharacter,
    index: usize,
) -> Option<&'a BeatEntry> {
    if beats.is_empty() {
        return None;
    }
    let end = index.min(beats.len() - 1);
    (0..=end).rev().find_map(|i| entry_for(&beats[i], character))
}

/// Last known location at or before `index`
pub fn character_location_at_index(beats: &[Beat], character: &PublicCharacter, index: usize) -> Option<HexCoord> {
    last_entry_for_character(beats, character, index).map(|entry| entry.location)
}

/// Last index of the leading run of non-empty, fully calculated beats
pub fn timeline_resolved_index(beats: &[Beat]) -> Option<usize> {
    let mut resolved = None;
    for (index, beat) in beats.iter().enumerate() {
        if beat.is_empty() || beat.iter().any(|entry| !entry.calculated) {
            break;
        }
        resolved = Some(index);
    }
    resolved
}

/// First index after the resolved prefix
pub fn first_unresolved_index(beats: &[Beat]) -> usize {
    timeline_resolved_index(beats).map_or(0, |index| index + 1)
}

/// Sort entries by roster order; unknown keys sort last
pub fn sort_beat_entries(beat: &mut Beat, characters: &[PublicCharacter]) {
    beat.sort_by_key(|entry| {
        characters
            .iter()
            .position(|character| character.matches_key(entry.key()))
            .unwrap_or(usize::MAX)
    });
}

/// Roster position of an entry (unknown keys sort last)
pub fn roster_order(characters: &[PublicCharacter], key: &str) -> usize {
    characters
        .iter()
        .position(|character| character.matches_key(key))
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<PublicCharacter> {
        vec![
            PublicCharacter::new("alpha", "murelious", HexCoord::new(0, 0), 180),
            PublicCharacter::new("beta", "strylan", HexCoord::new(1, 0), 0),
        ]
    }

    fn calculated(key: &str, action: &str) -> BeatEntry {
        let mut entry = BeatEntry::new(key, action);
        entry.calculated = true;
        entry
    }

    #[test]
    fn test_first_open_index() {
        let characters = roster();
        let beats = vec![
            vec![calculated("alpha", "m"), calculated("beta", "W")],
            vec![calculated("alpha", "E"), BeatEntry::new("beta", "a")],
            vec![BeatEntry::new("alpha", "E")],
        ];
        assert_eq!(character_first_open_index(&beats, &characters[0]), 2);
        assert_eq!(character_first_open_index(&beats, &characters[1]), 2);
        assert_eq!(timeline_earliest_open_index(&beats, &characters), 2);
        assert_eq!(character_first_open_index(&[], &characters[0]), 0);
    }

    #[test]
    fn test_earliest_open_and_at_bat() {
        let characters = roster();
        let beats = vec![
            vec![BeatEntry::new("alpha", "m"), BeatEntry::new("beta", "E")],
            vec![BeatEntry::new("alpha", "E")],
        ];
        assert_eq!(timeline_earliest_open_index(&beats, &characters), 0);
        let at_bat = characters_at_earliest_open(&beats, &characters);
        assert_eq!(at_bat.len(), 1);
        assert_eq!(at_bat[0].user_id, "beta");
        assert!(!is_character_at_earliest_open(&beats, &characters, &characters[0]));
    }

    #[test]
    fn test_resolved_index_and_location() {
        let characters = roster();
        let mut moved = calculated("alpha", "m");
        moved.location = HexCoord::new(1, 0);
        let beats = vec![
            vec![moved, calculated("beta", "W")],
            vec![BeatEntry::new("alpha", "W"), calculated("beta", "W")],
            vec![],
        ];
        assert_eq!(timeline_resolved_index(&beats), Some(0));
        assert_eq!(first_unresolved_index(&beats), 1);
        assert_eq!(timeline_resolved_index(&[]), None);
        assert_eq!(
            character_location_at_index(&beats, &characters[0], 5),
            Some(HexCoord::new(0, 0))
        );
        assert_eq!(last_entry_for_character(&beats, &characters[0], 0).map(|e| e.action.as_str()), Some("m"));
    }

    #[test]
    fn test_sort_beat_entries_by_roster() {
        let characters = roster();
        let mut beat = vec![
            BeatEntry::new("ghost", "W"),
            BeatEntry::new("beta", "W"),
            BeatEntry::new("alpha", "W"),
        ];
        sort_beat_entries(&mut beat, &characters);
        let keys: Vec<&str> = beat.iter().map(|entry| entry.key()).collect();
        assert_eq!(keys, vec!["alpha", "beta", "ghost"]);
    }

    #[test]
    fn test_entry_deserializes_user_id_alias() {
        let json = r#"{"userId":"alpha","action":"m","rotation":"R1","rotationSource":"selected","priority":30,"damage":0,"location":{"q":0,"r":0},"facing":180,"calculated":false}"#;
        let entry: BeatEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.key(), "alpha");
        assert!(entry.is_protected_start());
        let round = serde_json::to_string(&entry).unwrap();
        assert!(round.contains("\"username\":\"alpha\""));
        assert!(!round.contains("comboStarter"));
    }
}
