//! Core combat types: geometry, action grammar, cards and characters

pub mod action;
pub mod card;
pub mod character;
pub mod hex;
pub mod types;

pub use action::{build_path, parse_action_tokens, ActionListItem, ActionToken, BuiltPath, PathStep, StepKind};
pub use card::{CardCatalog, CardDefinition, CardType, DeckDefinition};
pub use character::{CharacterPowerEntry, CharacterPowers, PowerTable, PublicCharacter};
pub use hex::{HexCoord, Land, LocalDirection, AXIAL_DIRECTIONS};
pub use types::{BeatInteraction, RotationSource, Terrain, UserId};
