//! Card text pipeline
//!
//! A submitted card pair is turned into a per-beat action list in three
//! passes: the active card's base actions are mapped to items, the active
//! card's text rewrites the list, then the passive card's text rewrites
//! it again. Every handler is a pure function of the list, the two card
//! definitions and the selected rotation label.

use crate::core::action::{
    action_has_attack_token, is_bracketed_action, normalize_action_label, split_action_tokens, wrap_action_label, WAIT_ACTION,
};
use crate::core::card::{CardDefinition, CardType};
use crate::core::types::{BeatInteraction, RotationSource};
use crate::core::ActionListItem;

const ACTIVE_THROW_CARD_IDS: [&str; 2] = ["hip-throw", "tackle"];
const PASSIVE_THROW_CARD_IDS: [&str; 1] = ["leap"];
/// Throws from this card are decided during resolution
const THROW_IGNORED_CARD_IDS: [&str; 1] = ["grappling-hook"];
pub const SMOKE_BOMB_CARD_ID: &str = "smoke-bomb";
/// Label of the beat where smoke bomb hands control to the passive card
pub const SMOKE_SWAP_LABEL: &str = "X1";

/// Follow-up attack inserted after every jump by smash attack
const SMASH_FOLLOW_UP: &str = "a-La-Ra-BLa-BRa-Ba";
const WHIRLWIND_FAN: &str = "c-La-Ra-BLa-BRa-Ba";

/// Build the action list for a card pair, allowing the smoke-bomb swap
pub fn build_card_action_list(active: &CardDefinition, passive: &CardDefinition, rotation: &str) -> Vec<ActionListItem> {
    build_card_action_list_with(active, passive, rotation, true)
}

/// Build the action list for a card pair
///
/// Returns an empty list when the active card has no actions.
pub fn build_card_action_list_with(
    active: &CardDefinition,
    passive: &CardDefinition,
    rotation: &str,
    allow_smoke_swap: bool,
) -> Vec<ActionListItem> {
    if active.actions.is_empty() {
        return Vec::new();
    }
    let supports_throw = card_supports_throw(active, CardRole::Active) || card_supports_throw(passive, CardRole::Passive);

    let base: Vec<ActionListItem> = active
        .actions
        .iter()
        .enumerate()
        .map(|(index, action)| {
            let mut item = ActionListItem::new(action.clone())
                .with_priority(active.priority)
                .with_attack(active.damage, active.kbf)
                .with_cards(Some(&active.id), Some(&passive.id));
            if index == 0 {
                item = item.with_rotation(rotation, Some(RotationSource::Selected));
            }
            if supports_throw && action_has_attack_token(action) {
                item.interaction = Some(BeatInteraction::throw());
            }
            item
        })
        .collect();

    let with_active = match ActiveCardText::lookup(active) {
        Some(handler) => handler.apply(base, active, rotation),
        None => base,
    };
    let with_passive = match PassiveCardText::lookup(passive) {
        Some(handler) => handler.apply(with_active, active),
        None => with_active,
    };

    if !allow_smoke_swap || active.id != SMOKE_BOMB_CARD_ID {
        return with_passive;
    }
    let swap_index = with_passive
        .iter()
        .position(|item| item.label().eq_ignore_ascii_case(SMOKE_SWAP_LABEL));
    let Some(swap_index) = swap_index else {
        return with_passive;
    };
    let swapped = build_card_action_list_with(passive, active, rotation, false);
    if swapped.is_empty() {
        return with_passive;
    }
    let mut list = with_passive;
    list.truncate(swap_index);
    list.extend(swapped);
    list
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardRole {
    Active,
    Passive,
}

/// Whole-word, case-insensitive match
fn has_keyword(text: Option<&str>, keyword: &str) -> bool {
    text.is_some_and(|text| {
        text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .any(|word| word.eq_ignore_ascii_case(keyword))
    })
}

fn card_supports_throw(card: &CardDefinition, role: CardRole) -> bool {
    let id = card.id.as_str();
    if THROW_IGNORED_CARD_IDS.contains(&id) {
        return false;
    }
    match role {
        CardRole::Active => {
            ACTIVE_THROW_CARD_IDS.contains(&id)
                || has_keyword(card.active_text.as_deref(), "throw")
                || has_keyword(card.passive_text.as_deref(), "throw")
        }
        CardRole::Passive => {
            PASSIVE_THROW_CARD_IDS.contains(&id) || has_keyword(card.passive_text.as_deref(), "throw")
        }
    }
}

/// Indices of the card's base actions that are bracketed (the `{i}` symbol)
fn bracketed_indices(card: &CardDefinition) -> Vec<usize> {
    card.actions
        .iter()
        .enumerate()
        .filter(|(_, action)| is_bracketed_action(action))
        .map(|(index, _)| index)
        .collect()
}

fn opposite_rotation(rotation: &str) -> Option<&'static str> {
    let upper = rotation.trim().to_ascii_uppercase();
    if upper.starts_with('R') {
        Some("L1")
    } else if upper.starts_with('L') {
        Some("R1")
    } else {
        None
    }
}

/// Rewrite an item's label, keeping its bracket wrapping
fn relabel(item: &mut ActionListItem, label: &str) {
    let bracketed = is_bracketed_action(&item.action);
    item.action = wrap_action_label(label, bracketed);
}

fn label_is(item: &ActionListItem, label: &str) -> bool {
    item.label().eq_ignore_ascii_case(label)
}

/// Active-card text, keyed by card id and type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveCardText {
    /// Movement: forced counter-rotation on the first bracketed step
    NinjaRoll,
    CounterAttack,
    /// Ability: forced half turn on the beat after the first bracketed step
    AerialStrike,
    /// Ability: the selected rotation happens after the first bracketed step
    SmokeBomb,
    /// Ability: bracketed steps hit with knockback factor 3
    Whirlwind,
}

impl ActiveCardText {
    pub fn lookup(card: &CardDefinition) -> Option<Self> {
        match (card.card_type, card.id.as_str()) {
            (CardType::Movement, "ninja-roll") => Some(ActiveCardText::NinjaRoll),
            (CardType::Ability, "counter-attack") => Some(ActiveCardText::CounterAttack),
            (CardType::Ability, "aerial-strike") => Some(ActiveCardText::AerialStrike),
            (CardType::Ability, "smoke-bomb") => Some(ActiveCardText::SmokeBomb),
            (CardType::Ability, "whirlwind") => Some(ActiveCardText::Whirlwind),
            _ => None,
        }
    }

    pub fn apply(self, mut list: Vec<ActionListItem>, card: &CardDefinition, rotation: &str) -> Vec<ActionListItem> {
        let bracketed = bracketed_indices(card);
        match self {
            ActiveCardText::CounterAttack => {}
            ActiveCardText::NinjaRoll => {
                let (Some(&index), Some(opposite)) = (bracketed.first(), opposite_rotation(rotation)) else {
                    return list;
                };
                if let Some(item) = list.get_mut(index) {
                    if item.rotation.is_empty() || item.rotation == opposite {
                        item.rotation = opposite.to_string();
                        item.rotation_source = Some(RotationSource::Forced);
                    }
                }
            }
            ActiveCardText::AerialStrike => {
                if let Some(item) = bracketed.first().and_then(|&index| list.get_mut(index + 1)) {
                    item.rotation = "3".to_string();
                    item.rotation_source = Some(RotationSource::Forced);
                }
            }
            ActiveCardText::SmokeBomb => {
                let Some(target) = bracketed.first().map(|&index| index + 1) else {
                    return list;
                };
                if target >= list.len() {
                    return list;
                }
                let selected = list[0].rotation.trim().to_string();
                if selected.is_empty() {
                    return list;
                }
                list[0].rotation.clear();
                list[0].rotation_source = None;
                list[target].rotation = selected;
                list[target].rotation_source = Some(RotationSource::Selected);
            }
            ActiveCardText::Whirlwind => {
                for index in bracketed {
                    if let Some(item) = list.get_mut(index) {
                        item.kbf = Some(3);
                    }
                }
            }
        }
        list
    }
}

/// Passive-card text, keyed by card id and type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveCardText {
    Chase,
    CounterAttack,
    CrossSlash,
    FlyingKnee,
    Guard,
    Jab,
    PushKick,
    SmashAttack,
    SmokeBomb,
    Whirlwind,
    /// Movement: drops the trailing wait after an attack when paired with an ability
    Fleche,
}

impl PassiveCardText {
    pub fn lookup(card: &CardDefinition) -> Option<Self> {
        match (card.card_type, card.id.as_str()) {
            (CardType::Ability, "chase") => Some(PassiveCardText::Chase),
            (CardType::Ability, "counter-attack") => Some(PassiveCardText::CounterAttack),
            (CardType::Ability, "cross-slash") => Some(PassiveCardText::CrossSlash),
            (CardType::Ability, "flying-knee") => Some(PassiveCardText::FlyingKnee),
            (CardType::Ability, "guard") => Some(PassiveCardText::Guard),
            (CardType::Ability, "jab") => Some(PassiveCardText::Jab),
            (CardType::Ability, "push-kick") => Some(PassiveCardText::PushKick),
            (CardType::Ability, "smash-attack") => Some(PassiveCardText::SmashAttack),
            (CardType::Ability, "smoke-bomb") => Some(PassiveCardText::SmokeBomb),
            (CardType::Ability, "whirlwind") => Some(PassiveCardText::Whirlwind),
            (CardType::Movement, "fleche") => Some(PassiveCardText::Fleche),
            _ => None,
        }
    }

    pub fn apply(self, mut list: Vec<ActionListItem>, active: &CardDefinition) -> Vec<ActionListItem> {
        match self {
            PassiveCardText::Chase => {
                let Some(first) = list.first_mut() else {
                    return list;
                };
                let mut wait = first.clone();
                wait.action = WAIT_ACTION.to_string();
                wait.interaction = None;
                first.rotation.clear();
                first.rotation_source = None;
                list.insert(0, wait);
                replace_all(&mut list, "m", "2m", None);
            }
            PassiveCardText::CounterAttack => {
                if let Some(item) = list.iter_mut().find(|item| label_is(item, "m")) {
                    relabel(item, "m-Ba");
                    item.damage = Some(3);
                    item.kbf = Some(3);
                }
            }
            PassiveCardText::CrossSlash => replace_all(&mut list, "m", "m-La-Ra", Some((2, 1))),
            PassiveCardText::FlyingKnee => {
                for item in list.iter_mut() {
                    let label = item.label().to_string();
                    if let Some(prefix) = strip_step_suffix(&label, 'm') {
                        relabel(item, &format!("{}c", prefix));
                        item.damage = Some(1);
                        item.kbf = Some(1);
                    }
                }
            }
            PassiveCardText::Guard => replace_all(&mut list, WAIT_ACTION, "Bb", None),
            PassiveCardText::Jab => {
                for item in list.iter_mut() {
                    item.priority += 30;
                }
            }
            PassiveCardText::PushKick => {
                for item in list.iter_mut() {
                    let label = item.label().to_string();
                    let lower = label.to_ascii_lowercase();
                    if (lower.ends_with('m') || lower.ends_with('j')) && !label.starts_with('B') {
                        relabel(item, &format!("B{}", label));
                    }
                }
            }
            PassiveCardText::SmashAttack => {
                let mut next = Vec::with_capacity(list.len() + 1);
                for item in list {
                    let is_jump = item.label().to_ascii_lowercase().ends_with('j');
                    let follow_up = is_jump.then(|| {
                        let mut follow_up = item.clone();
                        follow_up.action = SMASH_FOLLOW_UP.to_string();
                        follow_up.rotation.clear();
                        follow_up.rotation_source = None;
                        follow_up.interaction = None;
                        follow_up.damage = Some(1);
                        follow_up.kbf = Some(1);
                        follow_up
                    });
                    next.push(item);
                    next.extend(follow_up);
                }
                list = next;
            }
            PassiveCardText::SmokeBomb => {
                for item in list.iter_mut() {
                    let label = item.label().to_string();
                    if label.is_empty() || !label.to_ascii_lowercase().ends_with('m') {
                        continue;
                    }
                    let flipped = match label.strip_prefix('B') {
                        Some(rest) => rest.to_string(),
                        None => format!("B{}", label),
                    };
                    relabel(item, &flipped);
                }
            }
            PassiveCardText::Whirlwind => {
                if let Some(item) = list.iter_mut().rev().find(|item| label_is(item, "m")) {
                    relabel(item, WHIRLWIND_FAN);
                    item.damage = Some(1);
                    item.kbf = Some(0);
                }
            }
            PassiveCardText::Fleche => {
                if active.card_type != CardType::Ability {
                    return list;
                }
                let last_wait = list
                    .iter()
                    .rposition(|item| item.action.trim().eq_ignore_ascii_case(WAIT_ACTION));
                if let Some(index) = last_wait {
                    let attack_before = list[..index]
                        .iter()
                        .any(|item| split_action_tokens(&item.action).iter().any(|t| t.to_ascii_lowercase().contains('a')));
                    if attack_before {
                        list.remove(index);
                    }
                }
            }
        }
        list
    }
}

fn strip_step_suffix(label: &str, step: char) -> Option<&str> {
    let last = label.chars().last()?;
    if last.to_ascii_lowercase() == step {
        Some(&label[..label.len() - last.len_utf8()])
    } else {
        None
    }
}

fn replace_all(list: &mut [ActionListItem], label: &str, next: &str, attack: Option<(i32, i32)>) {
    for item in list.iter_mut().filter(|item| label_is(item, label)) {
        relabel(item, next);
        if let Some((damage, kbf)) = attack {
            item.damage = Some(damage);
            item.kbf = Some(kbf);
        }
    }
}

/// True when the label, without brackets, is the smoke-bomb swap marker
pub fn is_smoke_swap_label(action: &str) -> bool {
    normalize_action_label(action).eq_ignore_ascii_case(SMOKE_SWAP_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(id: &str, actions: &[&str]) -> CardDefinition {
        CardDefinition::new(id, CardType::Movement)
            .with_actions(actions.iter().copied())
            .with_priority(10)
    }

    fn ability(id: &str, actions: &[&str]) -> CardDefinition {
        CardDefinition::new(id, CardType::Ability)
            .with_actions(actions.iter().copied())
            .with_priority(40)
            .with_attack(2, 1)
    }

    fn labels(list: &[ActionListItem]) -> Vec<&str> {
        list.iter().map(|item| item.action.as_str()).collect()
    }

    fn step() -> CardDefinition {
        movement("step", &["W", "m", "W", "E"])
    }

    #[test]
    fn test_base_list_carries_card_fields() {
        let active = ability("jab", &["a", "W", "E"]);
        let list = build_card_action_list(&active, &step(), "R1");
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].rotation, "R1");
        assert_eq!(list[0].rotation_source, Some(RotationSource::Selected));
        assert_eq!(list[1].rotation, "");
        assert_eq!(list[1].rotation_source, None);
        assert!(list.iter().all(|item| item.priority == 40));
        assert!(list.iter().all(|item| item.card_id.as_deref() == Some("jab")));
        assert!(list.iter().all(|item| item.passive_card_id.as_deref() == Some("step")));
        assert_eq!(list[0].damage, Some(2));
        assert!(list[0].interaction.is_none());
    }

    #[test]
    fn test_empty_active_card_yields_empty_list() {
        let active = ability("blank", &[]);
        assert!(build_card_action_list(&active, &step(), "0").is_empty());
    }

    #[test]
    fn test_throw_support_tags_attack_steps() {
        let hip_throw = ability("hip-throw", &["W", "a", "E"]);
        let list = build_card_action_list(&hip_throw, &step(), "0");
        assert!(list[0].interaction.is_none());
        assert!(list[1].interaction.as_ref().is_some_and(BeatInteraction::is_throw));

        let texted = ability("grab", &["c", "E"]).with_text(Some("{i}: Throw the target."), None);
        let list = build_card_action_list(&texted, &step(), "0");
        assert!(list[0].interaction.is_some());

        let hook = ability("grappling-hook", &["a", "E"]).with_text(Some("Throw"), None);
        let list = build_card_action_list(&hook, &step(), "0");
        assert!(list[0].interaction.is_none());

        // "throwing" is not the word "throw"
        let near_miss = ability("toss", &["a", "E"]).with_text(Some("throwing knives"), None);
        assert!(build_card_action_list(&near_miss, &step(), "0")[0].interaction.is_none());
    }

    #[test]
    fn test_passive_leap_supports_throw() {
        let active = ability("jab", &["a", "E"]);
        let leap = movement("leap", &["W", "W", "3j", "E"]);
        let list = build_card_action_list(&active, &leap, "0");
        assert!(list[0].interaction.is_some());
    }

    #[test]
    fn test_ninja_roll_counter_rotation() {
        let roll = movement("ninja-roll", &["W", "[m]", "W", "E"]);
        let passive = ability("feint", &["a", "E"]);
        let list = build_card_action_list(&roll, &passive, "R2");
        assert_eq!(list[1].rotation, "L1");
        assert_eq!(list[1].rotation_source, Some(RotationSource::Forced));

        let list = build_card_action_list(&roll, &passive, "0");
        assert_eq!(list[1].rotation, "");
    }

    #[test]
    fn test_counter_attack_active_is_unchanged() {
        let active = ability("counter-attack", &["Bm", "a", "W", "E"]);
        let list = build_card_action_list(&active, &step(), "0");
        assert_eq!(labels(&list), vec!["Bm", "a", "W", "E"]);
    }

    #[test]
    fn test_aerial_strike_forces_half_turn_after_bracket() {
        let active = ability("aerial-strike", &["W", "[2j]", "a", "W", "W", "W", "E"]);
        let list = build_card_action_list(&active, &step(), "R1");
        assert_eq!(labels(&list), vec!["W", "[2j]", "a", "W", "W", "W", "E"]);
        assert_eq!(list[0].rotation, "R1");
        assert_eq!(list[2].rotation, "3");
        assert_eq!(list[2].rotation_source, Some(RotationSource::Forced));
    }

    #[test]
    fn test_whirlwind_active_sets_bracket_kbf() {
        let active = ability("whirlwind", &["W", "[a-La-Ra]", "W", "E"]);
        let list = build_card_action_list(&active, &step(), "0");
        assert_eq!(list[1].kbf, Some(3));
        assert_eq!(list[0].kbf, Some(1));
    }

    #[test]
    fn test_smoke_bomb_swaps_to_passive_card() {
        let active = ability("smoke-bomb", &["W", "[a-La-Ra]", "X1", "W", "E"]);
        let list = build_card_action_list(&active, &step(), "R2");
        assert_eq!(labels(&list), vec!["W", "[a-La-Ra]", "W", "Bm", "W", "E"]);
        assert_eq!(list[0].rotation, "");
        assert_eq!(list[2].rotation, "R2");
        assert_eq!(list[2].rotation_source, Some(RotationSource::Selected));
        assert_eq!(list[2].card_id.as_deref(), Some("step"));
        assert_eq!(list[2].passive_card_id.as_deref(), Some("smoke-bomb"));

        let no_swap = build_card_action_list_with(&active, &step(), "R2", false);
        assert_eq!(labels(&no_swap), vec!["W", "[a-La-Ra]", "X1", "W", "E"]);
    }

    #[test]
    fn test_chase_adds_leading_wait() {
        let list = build_card_action_list(&step(), &ability("chase", &["a", "E"]), "0");
        assert_eq!(labels(&list), vec!["W", "W", "2m", "W", "E"]);
        assert_eq!(list[0].rotation, "0");
        assert_eq!(list[1].rotation, "");
    }

    #[test]
    fn test_cross_slash_and_counter_attack_passives() {
        let list = build_card_action_list(&step(), &ability("cross-slash", &["a", "E"]), "0");
        assert_eq!(labels(&list), vec!["W", "m-La-Ra", "W", "E"]);
        assert_eq!((list[1].damage, list[1].kbf), (Some(2), Some(1)));

        let list = build_card_action_list(&step(), &ability("counter-attack", &["a", "E"]), "0");
        assert_eq!(labels(&list), vec!["W", "m-Ba", "W", "E"]);
        assert_eq!((list[1].damage, list[1].kbf), (Some(3), Some(3)));
    }

    #[test]
    fn test_flying_knee_converts_moves_to_charges() {
        let dash = movement("dash", &["2m", "W", "W", "W", "W", "E"]);
        let list = build_card_action_list(&dash, &ability("flying-knee", &["a", "E"]), "0");
        assert_eq!(labels(&list), vec!["2c", "W", "W", "W", "W", "E"]);
        assert_eq!((list[0].damage, list[0].kbf), (Some(1), Some(1)));

        let backflip = movement("backflip", &["Bm", "W", "W", "W", "E"]);
        let list = build_card_action_list(&backflip, &ability("flying-knee", &["a", "E"]), "0");
        assert_eq!(list[0].action, "Bc");
    }

    #[test]
    fn test_smash_attack_follows_jumps() {
        let leap = movement("leap", &["W", "W", "3j", "W", "W", "W", "W", "E"]);
        let list = build_card_action_list(&leap, &ability("smash-attack", &["a", "E"]), "0");
        assert_eq!(
            labels(&list),
            vec!["W", "W", "3j", "a-La-Ra-BLa-BRa-Ba", "W", "W", "W", "W", "E"]
        );
        assert_eq!((list[3].damage, list[3].kbf), (Some(1), Some(1)));
        assert_eq!(list[3].rotation, "");
    }

    #[test]
    fn test_push_kick_and_smoke_bomb_reverse_movement() {
        let leap = movement("leap", &["W", "W", "3j", "W", "E"]);
        let dash = movement("dash", &["2m", "W", "E"]);
        let backflip = movement("backflip", &["Bm", "W", "E"]);
        let push_kick = ability("push-kick", &["a", "E"]);
        let smoke = ability("smoke-bomb", &["a", "E"]);

        assert_eq!(build_card_action_list(&leap, &push_kick, "0")[2].action, "B3j");
        assert_eq!(build_card_action_list(&dash, &push_kick, "0")[0].action, "B2m");
        assert_eq!(build_card_action_list(&dash, &smoke, "0")[0].action, "B2m");
        assert_eq!(build_card_action_list(&backflip, &smoke, "0")[0].action, "m");
    }

    #[test]
    fn test_jab_raises_priority() {
        let list = build_card_action_list(&step(), &ability("jab", &["a", "E"]), "0");
        assert!(list.iter().all(|item| item.priority == 40));
    }

    #[test]
    fn test_whirlwind_passive_replaces_last_move() {
        let advance = movement("advance", &["W", "m", "m", "W", "E"]);
        let list = build_card_action_list(&advance, &ability("whirlwind", &["a", "E"]), "0");
        assert_eq!(labels(&list), vec!["W", "m", "c-La-Ra-BLa-BRa-Ba", "W", "E"]);
        assert_eq!((list[2].damage, list[2].kbf), (Some(1), Some(0)));
    }

    #[test]
    fn test_guard_turns_waits_into_blocks() {
        let list = build_card_action_list(&step(), &ability("guard", &["Bb", "E"]), "0");
        assert_eq!(labels(&list), vec!["Bb", "m", "Bb", "E"]);
    }

    #[test]
    fn test_fleche_drops_trailing_wait_after_attack() {
        let lunge = ability("balestra-lunge", &["m", "a", "W", "W", "E"]);
        let fleche = movement("fleche", &["W", "m", "E"]);
        let list = build_card_action_list(&lunge, &fleche, "0");
        assert_eq!(labels(&list), vec!["m", "a", "W", "E"]);

        // Only when the active card is an ability
        let list = build_card_action_list(&fleche, &ability("feint", &["a", "E"]), "0");
        assert_eq!(labels(&list), vec!["W", "m", "E"]);
    }

    #[test]
    fn test_brackets_survive_relabel() {
        let active = movement("hop", &["[m]", "E"]);
        let list = build_card_action_list(&active, &ability("cross-slash", &["a", "E"]), "0");
        assert_eq!(list[0].action, "[m-La-Ra]");
        assert!(is_smoke_swap_label("[X1]"));
    }
}
