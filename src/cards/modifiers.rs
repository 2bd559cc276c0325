//! Per-card combat modifiers and discard effects
//!
//! These are small id tables consulted by the engine at hit resolution.
//! A passive card only counts while its holder is acting (entry is not `E`).

use crate::core::action::{is_action_active, is_center_attack_path};

/// Hit discard imposed by an active card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitDiscardRule {
    pub count: u32,
    /// Only attacks along the centre line (no L/R/B in the path) trigger it
    pub center_only: bool,
}

impl HitDiscardRule {
    /// Whether an attack step with this path text triggers the discard
    pub fn applies_to_path(&self, path: &str) -> bool {
        !self.center_only || is_center_attack_path(path)
    }
}

/// Active ability cards that force the target to discard on hit
pub fn active_hit_discard_rule(card_id: Option<&str>) -> Option<HitDiscardRule> {
    let (count, center_only) = match card_id? {
        "down-slash" => (1, false),
        "spike" => (3, false),
        "trip" => (2, false),
        "sweeping-strike" => (1, true),
        _ => return None,
    };
    Some(HitDiscardRule { count, center_only })
}

/// Discard forced on an attacker whose attack is blocked by this passive
pub fn passive_block_discard_count(passive_card_id: Option<&str>) -> u32 {
    match passive_card_id {
        Some("sweeping-strike") => 1,
        _ => 0,
    }
}

/// Passive cards that make their holder immune to throws while acting
pub fn is_throw_immune(passive_card_id: Option<&str>, action: &str) -> bool {
    matches!(passive_card_id, Some("hip-throw") | Some("tackle")) && is_action_active(action)
}

/// Knockback factor reduction granted by a passive card while acting
pub fn passive_kbf_reduction(passive_card_id: Option<&str>, action: &str) -> i32 {
    let reduction = match passive_card_id {
        Some("iron-will") => 1,
        _ => 0,
    };
    if reduction > 0 && is_action_active(action) {
        reduction
    } else {
        0
    }
}

/// Passive cards that ignore forced discards while acting
pub fn is_discard_immune(passive_card_id: Option<&str>, action: &str) -> bool {
    passive_card_id == Some("spike") && is_action_active(action)
}

/// Passive trip turns the attacker's knockback into a discard of the same size
pub fn converts_kbf_to_discard(passive_card_id: Option<&str>, action: &str) -> bool {
    passive_card_id == Some("trip") && is_action_active(action)
}
