//! Hand-trigger cards
//!
//! Some ability cards can be played straight from the hand when a
//! matching event happens during resolution. Playing one discards it.

use crate::core::card::CardType;
use serde::{Deserialize, Serialize};

/// Event that offers a hand trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandTriggerKind {
    /// The holder's attack connected
    AttackHit,
    /// The holder's projectile connected
    ProjectileHit,
    /// The holder was knocked back into the abyss
    KnockbackAbyss,
    /// The holder was hit
    Hit,
}

/// What a played hand trigger does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandTriggerEffect {
    BurningStrike,
    SinkingShot,
    Vengeance,
    IronWill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandTriggerDefinition {
    pub card_id: &'static str,
    pub card_type: CardType,
    pub trigger: HandTriggerKind,
    pub effect: HandTriggerEffect,
    pub discard_count: u32,
}

pub static HAND_TRIGGER_DEFINITIONS: [HandTriggerDefinition; 4] = [
    HandTriggerDefinition {
        card_id: "burning-strike",
        card_type: CardType::Ability,
        trigger: HandTriggerKind::AttackHit,
        effect: HandTriggerEffect::BurningStrike,
        discard_count: 1,
    },
    HandTriggerDefinition {
        card_id: "sinking-shot",
        card_type: CardType::Ability,
        trigger: HandTriggerKind::ProjectileHit,
        effect: HandTriggerEffect::SinkingShot,
        discard_count: 1,
    },
    HandTriggerDefinition {
        card_id: "vengeance",
        card_type: CardType::Ability,
        trigger: HandTriggerKind::KnockbackAbyss,
        effect: HandTriggerEffect::Vengeance,
        discard_count: 1,
    },
    HandTriggerDefinition {
        card_id: "iron-will",
        card_type: CardType::Ability,
        trigger: HandTriggerKind::Hit,
        effect: HandTriggerEffect::IronWill,
        discard_count: 1,
    },
];

/// Forced opponent discard when sinking shot is played
pub const SINKING_SHOT_DISCARD: u32 = 2;

pub fn hand_trigger_definition(card_id: Option<&str>) -> Option<&'static HandTriggerDefinition> {
    let card_id = card_id?;
    HAND_TRIGGER_DEFINITIONS.iter().find(|def| def.card_id == card_id)
}

pub fn is_hand_trigger_card(card_id: &str) -> bool {
    hand_trigger_definition(Some(card_id)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_lookup() {
        let vengeance = hand_trigger_definition(Some("vengeance")).unwrap();
        assert_eq!(vengeance.trigger, HandTriggerKind::KnockbackAbyss);
        assert_eq!(vengeance.discard_count, 1);
        assert!(is_hand_trigger_card("iron-will"));
        assert!(!is_hand_trigger_card("jab"));
        assert!(hand_trigger_definition(None).is_none());
    }

    #[test]
    fn test_effect_serde() {
        let json = serde_json::to_string(&HandTriggerEffect::BurningStrike).unwrap();
        assert_eq!(json, "\"burning-strike\"");
    }
}
