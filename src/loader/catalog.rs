//! Card catalog and character data loading
//!
//! Catalog files are `{movement: [...], ability: [...], decks: [...]}`.
//! Card records are normalized on the way in: blank ids get a positional
//! id, ids are slugged to lowercase ASCII, blank actions are dropped and
//! missing numbers default to zero.

use crate::core::card::{CardCatalog, CardDefinition, CardType, DeckDefinition};
use crate::core::character::{CharacterPowerEntry, PowerTable};
use crate::{ClashError, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCard {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    rotations: Option<String>,
    #[serde(default)]
    damage: Option<i32>,
    #[serde(default)]
    kbf: Option<i32>,
    #[serde(default)]
    active_text: Option<String>,
    #[serde(default)]
    passive_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    movement: Vec<RawCard>,
    #[serde(default)]
    ability: Vec<RawCard>,
    #[serde(default)]
    decks: Vec<DeckDefinition>,
}

/// Lowercase ASCII id with whitespace runs turned into `-`
pub fn slug_card_id(raw: &str) -> String {
    let ascii = deunicode::deunicode(raw.trim()).to_lowercase();
    ascii.split_whitespace().collect::<Vec<_>>().join("-")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn normalize_card(raw: RawCard, card_type: CardType, index: usize) -> CardDefinition {
    let id = non_blank(raw.id)
        .map(|id| slug_card_id(&id))
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("{}-{}", card_type.as_str(), index));
    let name = non_blank(raw.name).unwrap_or_else(|| id.clone());
    CardDefinition {
        name,
        card_type,
        priority: raw.priority.unwrap_or(0),
        actions: raw
            .actions
            .iter()
            .map(|action| action.trim())
            .filter(|action| !action.is_empty())
            .map(str::to_string)
            .collect(),
        rotations: non_blank(raw.rotations).unwrap_or_else(|| "*".to_string()),
        damage: raw.damage.unwrap_or(0),
        kbf: raw.kbf.unwrap_or(0),
        active_text: non_blank(raw.active_text),
        passive_text: non_blank(raw.passive_text),
        id,
    }
}

/// Parse catalog JSON text
pub fn parse_catalog(json: &str) -> Result<CardCatalog> {
    let raw: RawCatalog = serde_json::from_str(json)?;
    let mut catalog = CardCatalog::new();
    for (index, card) in raw.movement.into_iter().enumerate() {
        catalog.insert(normalize_card(card, CardType::Movement, index));
    }
    for (index, card) in raw.ability.into_iter().enumerate() {
        catalog.insert(normalize_card(card, CardType::Ability, index));
    }
    for deck in raw.decks {
        let deck = DeckDefinition {
            movement: deck.movement.iter().map(|id| slug_card_id(id)).collect(),
            ability: deck.ability.iter().map(|id| slug_card_id(id)).collect(),
        };
        if let Some(missing) = deck.movement.iter().chain(&deck.ability).find(|id| !catalog.contains(id)) {
            return Err(ClashError::InvalidDeckFormat(format!("deck references unknown card '{missing}'")));
        }
        catalog.add_deck(deck);
    }
    Ok(catalog)
}

/// Parse character data JSON; entries extend the built-in table
pub fn parse_characters(json: &str) -> Result<PowerTable> {
    let entries: Vec<CharacterPowerEntry> = serde_json::from_str(json)?;
    let mut table = PowerTable::builtin();
    for mut entry in entries {
        entry.id = slug_card_id(&entry.id);
        if entry.id.is_empty() {
            return Err(ClashError::UnknownCharacter("character entry without an id".to_string()));
        }
        table.insert(entry);
    }
    Ok(table)
}

/// Read and parse a catalog file
pub async fn load_catalog(path: impl AsRef<Path>) -> Result<CardCatalog> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    parse_catalog(&text)
}

/// Read character data, falling back to the built-in table when the file is absent
pub async fn load_characters(path: impl AsRef<Path>) -> Result<PowerTable> {
    let path = path.as_ref();
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(PowerTable::builtin());
    }
    let text = tokio::fs::read_to_string(path).await?;
    parse_characters(&text)
}

/// Blocking catalog read for non-async callers
pub fn load_catalog_sync(path: impl AsRef<Path>) -> Result<CardCatalog> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_catalog(&text)
}
