//! Strongly-typed wrappers for combat concepts

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a character (and of the player controlling it)
///
/// Entries in the timeline may name a character by user id or username,
/// so comparisons go through `PublicCharacter::matches_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(s: impl Into<String>) -> Self {
        UserId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        UserId(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

impl PartialEq<str> for UserId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for UserId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Derived land/abyss classification of a hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Land,
    Abyss,
}

impl Terrain {
    pub fn from_land(on_land: bool) -> Self {
        if on_land {
            Terrain::Land
        } else {
            Terrain::Abyss
        }
    }

    pub fn is_land(self) -> bool {
        self == Terrain::Land
    }
}

/// How a beat entry's rotation came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationSource {
    /// Chosen by the player at submission (marks an action-set start)
    Selected,
    /// Imposed by card text
    Forced,
}

/// Beat-level interaction tag carried on action entries (e.g. throw-capable attacks)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeatInteraction {
    #[serde(rename = "type")]
    pub kind: String,
}

impl BeatInteraction {
    pub fn throw() -> Self {
        BeatInteraction {
            kind: "throw".to_string(),
        }
    }

    pub fn is_throw(&self) -> bool {
        self.kind == "throw"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_compares_with_str() {
        let id = UserId::new("alpha");
        assert!(id == "alpha");
        assert_eq!(id.to_string(), "alpha");
    }

    #[test]
    fn test_terrain_serde() {
        assert_eq!(serde_json::to_string(&Terrain::Abyss).unwrap(), "\"abyss\"");
        assert_eq!(Terrain::from_land(true), Terrain::Land);
    }
}
