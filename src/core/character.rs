//! Characters and their passive powers

use crate::core::hex::HexCoord;
use crate::core::types::UserId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Accumulated damage per knockback-bonus tier
pub const DAMAGE_PER_KNOCKBACK_TIER: i32 = 10;

/// A character on the roster, as seen by every player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCharacter {
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub character_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    pub position: HexCoord,
    #[serde(default)]
    pub facing: i32,
    /// Damage carried into the timeline before beat 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<i32>,
}

impl PublicCharacter {
    pub fn new(user_id: impl Into<String>, character_id: impl Into<String>, position: HexCoord, facing: i32) -> Self {
        let user_id = user_id.into();
        PublicCharacter {
            username: user_id.clone(),
            user_id: UserId::new(user_id),
            character_id: character_id.into(),
            character_name: None,
            position,
            facing,
            damage: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_damage(mut self, damage: i32) -> Self {
        self.damage = Some(damage);
        self
    }

    /// Timeline entries may name a character by user id or by username
    pub fn matches_key(&self, key: &str) -> bool {
        self.user_id == key || self.username == key
    }

    pub fn baseline_damage(&self) -> i32 {
        self.damage.unwrap_or(0).max(0)
    }
}

/// Numeric power effects; absent values mean "no effect"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterPowers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hand_size: Option<u32>,
    #[serde(default)]
    pub attack_damage_bonus: u32,
    #[serde(default)]
    pub draw_on_knockback: u32,
    #[serde(default)]
    pub damage_reduction: u32,
    #[serde(default)]
    pub fire_damage_immune: bool,
    #[serde(default)]
    pub knockback_bonus_per_ten_damage: u32,
    #[serde(default)]
    pub opponent_discard_reduction: u32,
}

/// Character data entry (id, display name, rules text, effects)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterPowerEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_text: Option<String>,
    #[serde(default)]
    pub effects: CharacterPowers,
}

/// Lookup of character powers by character id
#[derive(Debug, Clone, Default)]
pub struct PowerTable {
    entries: FxHashMap<String, CharacterPowerEntry>,
}

static NO_POWERS: CharacterPowers = CharacterPowers {
    max_hand_size: None,
    attack_damage_bonus: 0,
    draw_on_knockback: 0,
    damage_reduction: 0,
    fire_damage_immune: false,
    knockback_bonus_per_ten_damage: 0,
    opponent_discard_reduction: 0,
};

impl PowerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = CharacterPowerEntry>,
    {
        let mut table = PowerTable::new();
        for entry in entries {
            table.insert(entry);
        }
        table
    }

    pub fn insert(&mut self, entry: CharacterPowerEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn entry(&self, character_id: &str) -> Option<&CharacterPowerEntry> {
        self.entries.get(character_id)
    }

    /// Effects for a character id (empty effects when unknown)
    pub fn powers(&self, character_id: &str) -> &CharacterPowers {
        self.entries
            .get(character_id)
            .map(|entry| &entry.effects)
            .unwrap_or(&NO_POWERS)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The six built-in characters
    pub fn builtin() -> Self {
        let entry = |id: &str, name: &str, text: &str, effects: CharacterPowers| CharacterPowerEntry {
            id: id.to_string(),
            name: name.to_string(),
            power_text: if text.is_empty() { None } else { Some(text.to_string()) },
            effects,
        };
        PowerTable::from_entries(vec![
            entry("murelious", "Murelious", "", CharacterPowers::default()),
            entry(
                "strylan",
                "Strylan",
                "Your attacks deal +1 damage.",
                CharacterPowers {
                    attack_damage_bonus: 1,
                    ..Default::default()
                },
            ),
            entry(
                "monkey-queen",
                "Monkey Queen",
                "Your knockback increases by 1 for every 10 damage you have taken.",
                CharacterPowers {
                    knockback_bonus_per_ten_damage: 1,
                    ..Default::default()
                },
            ),
            entry(
                "ryathan",
                "Ryathan",
                "You take no damage from fire.",
                CharacterPowers {
                    fire_damage_immune: true,
                    ..Default::default()
                },
            ),
            entry(
                "zenytha",
                "Zenytha",
                "Opponent discard effects against you are reduced by 1.",
                CharacterPowers {
                    opponent_discard_reduction: 1,
                    ..Default::default()
                },
            ),
            entry(
                "aumandetta",
                "Aumandetta",
                "Draw 1 card whenever you are knocked back.",
                CharacterPowers {
                    draw_on_knockback: 1,
                    ..Default::default()
                },
            ),
        ])
    }
}

impl CharacterPowers {
    /// Extra knockback distance granted by accumulated damage
    pub fn knockback_bonus(&self, accumulated_damage: i32, kbf: i32) -> i32 {
        if kbf <= 0 || self.knockback_bonus_per_ten_damage == 0 {
            return 0;
        }
        let tiers = accumulated_damage.max(0) / DAMAGE_PER_KNOCKBACK_TIER;
        self.knockback_bonus_per_ten_damage as i32 * tiers
    }
}
