//! Scenario files
//!
//! A scenario is a resolution input plus optional deck states, stored as
//! one JSON document with camelCase keys.

use crate::cards::hand::DeckState;
use crate::core::types::UserId;
use crate::game::engine::ResolveInput;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub input: ResolveInput,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deck_states: BTreeMap<UserId, DeckState>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn deck_state(&self, user_id: &UserId) -> Option<&DeckState> {
        self.deck_states.get(user_id)
    }
}

pub async fn load_scenario(path: impl AsRef<Path>) -> Result<Scenario> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    Scenario::from_json(&text)
}

pub fn load_scenario_sync(path: impl AsRef<Path>) -> Result<Scenario> {
    let text = std::fs::read_to_string(path.as_ref())?;
    Scenario::from_json(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_from_json() {
        let json = r#"{
            "name": "two steps",
            "characters": [
                {"userId": "alpha", "username": "alpha", "characterId": "murelious", "position": {"q": 0, "r": 0}, "facing": 180}
            ],
            "beats": [[{"username": "alpha", "action": "m"}]],
            "comboAvailability": {"alpha": true}
        }"#;
        let scenario = Scenario::from_json(json).unwrap();
        assert_eq!(scenario.name.as_deref(), Some("two steps"));
        assert_eq!(scenario.input.characters.len(), 1);
        assert_eq!(scenario.input.beats[0][0].action, "m");
        assert_eq!(scenario.input.combo_availability.get(&UserId::new("alpha")), Some(&true));
        assert_eq!(scenario.input.land, crate::core::hex::Land::default());
        assert!(scenario.deck_states.is_empty());
    }

    #[test]
    fn test_scenario_rejects_bad_json() {
        assert!(Scenario::from_json("{\"characters\": 3}").is_err());
    }
}
