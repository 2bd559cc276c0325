//! Catalog, character and scenario loaders
//!
//! JSON card catalogs, character power tables and scenario files.
//! Single files load through tokio; directories resolve in parallel.

pub mod batch;
pub mod catalog;
pub mod scenario;

pub use batch::{discover_scenarios, resolve_directory, resolve_paths, BatchReport, BatchResult};
pub use catalog::{load_catalog, load_catalog_sync, load_characters, parse_catalog, parse_characters, slug_card_id};
pub use scenario::{load_scenario, load_scenario_sync, Scenario};

use crate::core::card::CardCatalog;
use crate::core::character::PowerTable;
use crate::Result;
use std::path::{Path, PathBuf};

/// Environment variable naming the data directory
pub const DATA_DIR_ENV: &str = "HEX_CLASH_DATA";
pub const CARDS_FILE: &str = "cards.json";
pub const CHARACTERS_FILE: &str = "characters.json";

/// Directory holding `cards.json` and `characters.json`
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Static data every resolution needs
#[derive(Debug, Clone)]
pub struct GameData {
    pub catalog: CardCatalog,
    pub powers: PowerTable,
}

impl GameData {
    /// Load both files concurrently
    pub async fn load(cards: &Path, characters: &Path) -> Result<Self> {
        let (catalog, powers) = tokio::join!(load_catalog(cards), load_characters(characters));
        Ok(GameData {
            catalog: catalog?,
            powers: powers?,
        })
    }

    /// Load from the data directory, with per-file overrides
    pub async fn load_default(cards: Option<&Path>, characters: Option<&Path>) -> Result<Self> {
        let dir = data_dir();
        let cards = cards.map_or_else(|| dir.join(CARDS_FILE), Path::to_path_buf);
        let characters = characters.map_or_else(|| dir.join(CHARACTERS_FILE), Path::to_path_buf);
        Self::load(&cards, &characters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_data() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
    }

    #[tokio::test]
    async fn test_load_bundled_data() {
        let dir = repo_data();
        let data = GameData::load(&dir.join(CARDS_FILE), &dir.join(CHARACTERS_FILE))
            .await
            .unwrap();
        assert!(data.catalog.get("step").is_some());
        assert!(data.catalog.get("hip-throw").is_some());
        assert!(!data.catalog.decks().is_empty());
        assert_eq!(data.powers.powers("strylan").attack_damage_bonus, 1);
    }

    #[tokio::test]
    async fn test_missing_characters_file_uses_builtin() {
        let dir = repo_data();
        let data = GameData::load(&dir.join(CARDS_FILE), &dir.join("missing.json"))
            .await
            .unwrap();
        assert!(data.powers.powers("ryathan").fire_damage_immune);
    }

    #[tokio::test]
    async fn test_missing_catalog_is_an_error() {
        let dir = repo_data();
        let result = GameData::load(&dir.join("missing.json"), &dir.join(CHARACTERS_FILE)).await;
        assert!(matches!(result, Err(crate::ClashError::IoError(_))));
    }
}
