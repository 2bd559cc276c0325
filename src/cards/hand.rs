//! Hand and deck state
//!
//! The movement hand is derived from the ability hand: a player holds
//! exactly `min(max hand size, ability hand size)` unexhausted movement
//! cards. Every draw or discard re-syncs the movement hand, either from a
//! caller-supplied selection (strict) or by picking cards in deck order
//! (auto).

use crate::error::{CardValidationError, RuleResult, ValidationCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Baseline ability refresh size and movement hand cap
pub const MAX_HAND_SIZE: usize = 4;
/// Draws that would leave at most this many movement cards ask the player which to restore
pub const DRAW_SELECTION_MAX_MOVEMENT: usize = 3;

/// A player's cards during a match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckState {
    pub movement: Vec<String>,
    pub ability_hand: Vec<String>,
    /// Ability draw pile; draws come from the front, used cards go to the back
    pub ability_deck: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_max_hand_size: Option<usize>,
    /// Ability cards set aside while their effect is active (rewind)
    #[serde(default)]
    pub focused_ability_card_ids: BTreeSet<String>,
    #[serde(default)]
    pub exhausted_movement_ids: BTreeSet<String>,
    #[serde(default)]
    pub last_refresh_index: Option<usize>,
    #[serde(default)]
    pub active_card_id: Option<String>,
    #[serde(default)]
    pub passive_card_id: Option<String>,
}

/// How a movement-hand sync picks cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandSyncMode {
    /// Use the selection where valid and fill the rest in deck order
    #[default]
    Auto,
    /// The selection must be valid and exactly cover the difference
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementHandSync {
    pub target_size: usize,
    pub movement_hand_size: usize,
    pub restored: Vec<String>,
    pub discarded: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityDraw {
    pub drawn: Vec<String>,
    pub movement: MovementHandSync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityDiscard {
    pub discarded: Vec<String>,
    pub movement: MovementHandSync,
}

/// Ability and movement discards needed to discard `discard_count` abilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscardRequirements {
    pub ability_discard_count: usize,
    pub movement_discard_count: usize,
}

/// Movement restores needed when drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawSelectionRequirement {
    pub requested: usize,
    pub actual_draw: usize,
    pub target_movement_size: usize,
    pub required_restore: usize,
    pub requires_selection: bool,
}

/// Trim, drop blanks and de-duplicate while keeping order
pub fn normalize_id_list<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    ids.iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

impl DeckState {
    /// Ability hand cap after focused cards are set aside
    pub fn max_hand_size(&self) -> usize {
        self.base_max_hand_size
            .unwrap_or(MAX_HAND_SIZE)
            .saturating_sub(self.focused_ability_card_ids.len())
    }

    /// Movement hand size required for a given ability hand size
    pub fn target_movement_hand_size(&self, ability_count: usize) -> usize {
        ability_count.min(self.max_hand_size())
    }

    /// Unexhausted movement cards, capped at the max hand size
    pub fn movement_hand_ids(&self) -> Vec<&str> {
        self.movement
            .iter()
            .filter(|id| !self.exhausted_movement_ids.contains(id.as_str()))
            .take(self.max_hand_size())
            .map(String::as_str)
            .collect()
    }

    pub fn has_ability_in_hand(&self, card_id: &str) -> bool {
        self.ability_hand.iter().any(|id| id == card_id)
    }

    pub fn has_movement_in_hand(&self, card_id: &str) -> bool {
        self.movement_hand_ids().contains(&card_id)
    }

    pub fn discard_requirements(&self, discard_count: usize) -> DiscardRequirements {
        let ability_discard_count = discard_count.min(self.ability_hand.len());
        let target = self.target_movement_hand_size(self.ability_hand.len() - ability_discard_count);
        let movement_discard_count = self.movement_hand_ids().len().saturating_sub(target);
        DiscardRequirements {
            ability_discard_count,
            movement_discard_count,
        }
    }

    pub fn draw_selection_requirement(&self, draw_count: usize) -> DrawSelectionRequirement {
        let actual_draw = draw_count.min(self.ability_deck.len());
        let target_movement_size = self.target_movement_hand_size(self.ability_hand.len() + actual_draw);
        let required_restore = target_movement_size.saturating_sub(self.movement_hand_ids().len());
        DrawSelectionRequirement {
            requested: draw_count,
            actual_draw,
            target_movement_size,
            required_restore,
            requires_selection: required_restore > 0 && target_movement_size <= DRAW_SELECTION_MAX_MOVEMENT,
        }
    }

    /// Bring the movement hand to its target size
    pub fn sync_movement_hand(
        &mut self,
        restore_ids: &[String],
        discard_ids: &[String],
        mode: HandSyncMode,
    ) -> RuleResult<MovementHandSync> {
        let target_size = self.target_movement_hand_size(self.ability_hand.len());
        let mut current = self.movement_hand_ids().len();
        let mut restored = Vec::new();
        let mut discarded = Vec::new();

        let known: Vec<String> = self.movement.clone();
        let restore_ids: Vec<String> = normalize_id_list(restore_ids)
            .into_iter()
            .filter(|id| known.contains(id))
            .collect();
        let discard_ids: Vec<String> = normalize_id_list(discard_ids)
            .into_iter()
            .filter(|id| known.contains(id))
            .collect();

        if current < target_size {
            let needed = target_size - current;
            let valid: Vec<String> = restore_ids
                .iter()
                .filter(|id| self.exhausted_movement_ids.contains(id.as_str()))
                .cloned()
                .collect();
            if mode == HandSyncMode::Strict {
                if valid.len() != restore_ids.len() {
                    return Err(CardValidationError::new(
                        ValidationCode::MovementRestoreInvalid,
                        "Invalid movement restore selection.",
                    ));
                }
                if valid.len() != needed {
                    return Err(restore_required());
                }
            }
            for id in valid.into_iter().take(needed) {
                self.exhausted_movement_ids.remove(&id);
                restored.push(id);
                current += 1;
            }
            if current < target_size {
                if mode == HandSyncMode::Strict {
                    return Err(restore_required());
                }
                for id in &known {
                    if current >= target_size {
                        break;
                    }
                    if self.exhausted_movement_ids.remove(id) {
                        restored.push(id.clone());
                        current += 1;
                    }
                }
            }
        } else if current > target_size {
            let excess = current - target_size;
            let valid: Vec<String> = discard_ids
                .iter()
                .filter(|id| !self.exhausted_movement_ids.contains(id.as_str()))
                .cloned()
                .collect();
            if mode == HandSyncMode::Strict {
                if valid.len() != discard_ids.len() {
                    return Err(CardValidationError::new(
                        ValidationCode::MovementDiscardInvalid,
                        "Invalid movement discard selection.",
                    ));
                }
                if valid.len() != excess {
                    return Err(discard_required());
                }
            }
            for id in valid.into_iter().take(excess) {
                self.exhausted_movement_ids.insert(id.clone());
                discarded.push(id);
                current -= 1;
            }
            if current > target_size {
                if mode == HandSyncMode::Strict {
                    return Err(discard_required());
                }
                for id in known.iter().rev() {
                    if current <= target_size {
                        break;
                    }
                    if self.exhausted_movement_ids.insert(id.clone()) {
                        discarded.push(id.clone());
                        current -= 1;
                    }
                }
            }
        }

        Ok(MovementHandSync {
            target_size,
            movement_hand_size: current,
            restored,
            discarded,
        })
    }

    /// Draw up to `count` abilities from the deck front, then sync movement
    pub fn draw_ability_cards(&mut self, count: usize, restore_ids: &[String], mode: HandSyncMode) -> RuleResult<AbilityDraw> {
        let take = count.min(self.ability_deck.len());
        let drawn: Vec<String> = self.ability_deck.drain(..take).collect();
        self.ability_hand.extend(drawn.iter().cloned());
        let movement = self.sync_movement_hand(restore_ids, &[], mode)?;
        Ok(AbilityDraw { drawn, movement })
    }

    /// Move abilities from hand to the deck back, then sync movement
    pub fn discard_ability_cards(
        &mut self,
        ability_ids: &[String],
        discard_movement_ids: &[String],
        mode: HandSyncMode,
    ) -> RuleResult<AbilityDiscard> {
        let ids = normalize_id_list(ability_ids);
        if ids.iter().any(|id| !self.has_ability_in_hand(id)) {
            return Err(CardValidationError::new(
                ValidationCode::AbilityNotInHand,
                "Ability card not in hand.",
            ));
        }
        for id in &ids {
            if let Some(index) = self.ability_hand.iter().position(|held| held == id) {
                let removed = self.ability_hand.remove(index);
                self.ability_deck.push(removed);
            }
        }
        let movement = self.sync_movement_hand(&[], discard_movement_ids, mode)?;
        Ok(AbilityDiscard { discarded: ids, movement })
    }

    /// Set an ability aside while its effect lasts
    pub fn set_focused_ability_card(&mut self, card_id: &str) -> RuleResult<()> {
        let card_id = card_id.trim();
        if card_id.is_empty() {
            return Err(CardValidationError::new(
                ValidationCode::MissingAbilityCard,
                "Focused card id is required.",
            ));
        }
        self.ability_hand.retain(|id| id != card_id);
        self.ability_deck.retain(|id| id != card_id);
        self.focused_ability_card_ids.insert(card_id.to_string());
        Ok(())
    }

    /// End a focus, returning the card to the bottom of the deck
    pub fn clear_focused_ability_card(&mut self, card_id: &str) -> RuleResult<()> {
        if !self.focused_ability_card_ids.remove(card_id) {
            return Err(CardValidationError::new(
                ValidationCode::CardNotInHand,
                format!("Card {} is not focused.", card_id),
            ));
        }
        self.ability_deck.push(card_id.to_string());
        Ok(())
    }
}

fn restore_required() -> CardValidationError {
    CardValidationError::new(
        ValidationCode::MovementRestoreRequired,
        "Movement restore selection required.",
    )
}

fn discard_required() -> CardValidationError {
    CardValidationError::new(
        ValidationCode::MovementDiscardRequired,
        "Movement discard selection required.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn deck() -> DeckState {
        DeckState {
            movement: ids(&["m1", "m2", "m3", "m4", "m5"]),
            ability_hand: ids(&["a1", "a2", "a3", "a4"]),
            ability_deck: ids(&["a5", "a6"]),
            exhausted_movement_ids: ["m5".to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_target_movement_hand_size() {
        let state = deck();
        assert_eq!(state.target_movement_hand_size(0), 0);
        assert_eq!(state.target_movement_hand_size(3), 3);
        assert_eq!(state.target_movement_hand_size(7), 4);
        assert_eq!(state.movement_hand_ids(), vec!["m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn test_discard_requirements() {
        let state = deck();
        let req = state.discard_requirements(2);
        assert_eq!(req.ability_discard_count, 2);
        assert_eq!(req.movement_discard_count, 2);
        let req = state.discard_requirements(9);
        assert_eq!(req.ability_discard_count, 4);
        assert_eq!(req.movement_discard_count, 4);
    }

    #[test]
    fn test_auto_discard_exhausts_from_the_end() {
        let mut state = deck();
        let result = state
            .discard_ability_cards(&ids(&["a1"]), &[], HandSyncMode::Auto)
            .unwrap();
        assert_eq!(result.movement.discarded, ids(&["m4"]));
        assert_eq!(state.ability_deck.last().map(String::as_str), Some("a1"));
        assert_eq!(state.movement_hand_ids().len(), 3);
    }

    #[test]
    fn test_strict_discard_requires_selection() {
        let mut state = deck();
        let err = state
            .discard_ability_cards(&ids(&["a1"]), &[], HandSyncMode::Strict)
            .unwrap_err();
        assert_eq!(err.code, ValidationCode::MovementDiscardRequired);

        let mut state = deck();
        let err = state
            .discard_ability_cards(&ids(&["a1"]), &ids(&["m5"]), HandSyncMode::Strict)
            .unwrap_err();
        assert_eq!(err.code, ValidationCode::MovementDiscardInvalid);

        let mut state = deck();
        let ok = state
            .discard_ability_cards(&ids(&["a1"]), &ids(&["m2"]), HandSyncMode::Strict)
            .unwrap();
        assert_eq!(ok.movement.discarded, ids(&["m2"]));
    }

    #[test]
    fn test_discard_unknown_ability_fails() {
        let mut state = deck();
        let err = state
            .discard_ability_cards(&ids(&["a9"]), &[], HandSyncMode::Auto)
            .unwrap_err();
        assert_eq!(err.code, ValidationCode::AbilityNotInHand);
        assert_eq!(state.ability_hand.len(), 4);
    }

    #[test]
    fn test_draw_restores_movement() {
        let mut state = deck();
        state.ability_hand = ids(&["a1", "a2"]);
        state.exhausted_movement_ids = ids(&["m3", "m4", "m5"]).into_iter().collect();
        let req = state.draw_selection_requirement(1);
        assert_eq!(req.target_movement_size, 3);
        assert_eq!(req.required_restore, 1);
        assert!(req.requires_selection);

        let err = state.clone().draw_ability_cards(1, &[], HandSyncMode::Strict).unwrap_err();
        assert_eq!(err.code, ValidationCode::MovementRestoreRequired);

        let result = state.draw_ability_cards(1, &ids(&["m4"]), HandSyncMode::Strict).unwrap();
        assert_eq!(result.drawn, ids(&["a5"]));
        assert_eq!(result.movement.restored, ids(&["m4"]));
        assert!(!state.exhausted_movement_ids.contains("m4"));
    }

    #[test]
    fn test_auto_draw_restores_in_deck_order() {
        let mut state = deck();
        state.ability_hand = ids(&["a1"]);
        state.exhausted_movement_ids = ids(&["m2", "m3", "m4", "m5"]).into_iter().collect();
        let result = state.draw_ability_cards(2, &[], HandSyncMode::Auto).unwrap();
        assert_eq!(result.movement.restored, ids(&["m2", "m3"]));
    }

    #[test]
    fn test_focus_reduces_hand_sizes() {
        let mut state = DeckState {
            movement: ids(&["move-a", "move-b", "move-c", "move-d"]),
            ability_hand: ids(&["rewind", "ability-a", "ability-b", "ability-c"]),
            ability_deck: ids(&["ability-d"]),
            ..Default::default()
        };
        assert_eq!(state.max_hand_size(), 4);
        state.set_focused_ability_card("rewind").unwrap();
        assert_eq!(state.max_hand_size(), 3);
        assert_eq!(state.movement_hand_ids().len(), 3);
        assert!(!state.has_ability_in_hand("rewind"));

        state.clear_focused_ability_card("rewind").unwrap();
        assert_eq!(state.max_hand_size(), 4);
        assert_eq!(state.ability_deck.last().map(String::as_str), Some("rewind"));
        assert!(state.clear_focused_ability_card("rewind").is_err());
    }

    #[test]
    fn test_normalize_id_list() {
        assert_eq!(normalize_id_list(&[" a ", "b", "a", ""]), ids(&["a", "b"]));
    }
}
