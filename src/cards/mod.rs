//! Card text, combat modifiers, hand triggers and hand/deck rules

pub mod hand;
pub mod modifiers;
pub mod rules;
pub mod text;
pub mod triggers;

pub use hand::{DeckState, HandSyncMode, MAX_HAND_SIZE};
pub use rules::{
    apply_card_use, build_player_card_state, create_deck_state, get_refresh_offset, parse_deck_definition,
    resolve_land_refreshes, validate_action_submission, ActionSubmission, CardUse, PlayerCardState, ValidatedSubmission,
};
pub use text::{build_card_action_list, build_card_action_list_with};
pub use triggers::{hand_trigger_definition, HandTriggerDefinition, HandTriggerEffect};
