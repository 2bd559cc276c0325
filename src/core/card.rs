//! Card types and definitions

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Movement or ability card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Movement,
    Ability,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Movement => "movement",
            CardType::Ability => "ability",
        }
    }
}

/// Static definition of a card
///
/// `actions` is the base per-beat action sequence before any card text is
/// applied. `rotations` is either `*` (any) or an inclusive `min-max`
/// range of rotation magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub card_type: CardType,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default = "default_rotations")]
    pub rotations: String,
    #[serde(default)]
    pub damage: i32,
    #[serde(default)]
    pub kbf: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive_text: Option<String>,
}

fn default_rotations() -> String {
    "*".to_string()
}

impl CardDefinition {
    pub fn new(id: impl Into<String>, card_type: CardType) -> Self {
        let id = id.into();
        CardDefinition {
            name: id.clone(),
            id,
            card_type,
            priority: 0,
            actions: Vec::new(),
            rotations: default_rotations(),
            damage: 0,
            kbf: 0,
            active_text: None,
            passive_text: None,
        }
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_attack(mut self, damage: i32, kbf: i32) -> Self {
        self.damage = damage;
        self.kbf = kbf;
        self
    }

    pub fn with_rotations(mut self, rotations: impl Into<String>) -> Self {
        self.rotations = rotations.into();
        self
    }

    pub fn with_text(mut self, active: Option<&str>, passive: Option<&str>) -> Self {
        self.active_text = active.map(str::to_string);
        self.passive_text = passive.map(str::to_string);
        self
    }

    pub fn is_movement(&self) -> bool {
        self.card_type == CardType::Movement
    }

    pub fn is_ability(&self) -> bool {
        self.card_type == CardType::Ability
    }
}

/// A deck: movement card ids plus the ordered ability deck
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckDefinition {
    #[serde(default)]
    pub movement: Vec<String>,
    #[serde(default)]
    pub ability: Vec<String>,
}

/// All known cards, keyed by id
#[derive(Debug, Clone, Default)]
pub struct CardCatalog {
    movement: Vec<Arc<CardDefinition>>,
    ability: Vec<Arc<CardDefinition>>,
    decks: Vec<DeckDefinition>,
    by_id: FxHashMap<String, Arc<CardDefinition>>,
}

impl CardCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from definitions; later ids replace earlier ones
    pub fn from_cards<I>(cards: I) -> Self
    where
        I: IntoIterator<Item = CardDefinition>,
    {
        let mut catalog = CardCatalog::new();
        for card in cards {
            catalog.insert(card);
        }
        catalog
    }

    pub fn insert(&mut self, card: CardDefinition) {
        let card = Arc::new(card);
        let list = match card.card_type {
            CardType::Movement => &mut self.movement,
            CardType::Ability => &mut self.ability,
        };
        list.retain(|existing| existing.id != card.id);
        list.push(Arc::clone(&card));
        self.by_id.insert(card.id.clone(), card);
    }

    pub fn add_deck(&mut self, deck: DeckDefinition) {
        self.decks.push(deck);
    }

    pub fn get(&self, id: &str) -> Option<&CardDefinition> {
        self.by_id.get(id).map(|card| card.as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn movement(&self) -> impl Iterator<Item = &CardDefinition> {
        self.movement.iter().map(|card| card.as_ref())
    }

    pub fn ability(&self) -> impl Iterator<Item = &CardDefinition> {
        self.ability.iter().map(|card| card.as_ref())
    }

    pub fn decks(&self) -> &[DeckDefinition] {
        &self.decks
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Every movement card plus every ability card, in catalog order
    pub fn default_deck(&self) -> DeckDefinition {
        DeckDefinition {
            movement: self.movement.iter().map(|card| card.id.clone()).collect(),
            ability: self.ability.iter().map(|card| card.id.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        let catalog = CardCatalog::from_cards(vec![
            CardDefinition::new("step", CardType::Movement).with_actions(["W", "m", "W", "E"]),
            CardDefinition::new("jab", CardType::Ability).with_priority(40),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("jab").map(|c| c.priority), Some(40));
        assert!(catalog.get("missing").is_none());
        assert_eq!(catalog.default_deck().movement, vec!["step".to_string()]);
    }

    #[test]
    fn test_insert_replaces_duplicate_ids() {
        let mut catalog = CardCatalog::new();
        catalog.insert(CardDefinition::new("step", CardType::Movement).with_priority(1));
        catalog.insert(CardDefinition::new("step", CardType::Movement).with_priority(2));
        assert_eq!(catalog.movement().count(), 1);
        assert_eq!(catalog.get("step").map(|c| c.priority), Some(2));
    }

    #[test]
    fn test_card_definition_json() {
        let json = r#"{"id":"jab","name":"Jab","type":"ability","priority":40,"actions":["a","E"],"damage":2,"kbf":0}"#;
        let card: CardDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(card.card_type, CardType::Ability);
        assert_eq!(card.rotations, "*");
        assert_eq!(card.actions, vec!["a", "E"]);
    }
}
