//! Error types for hex-clash

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClashError {
    #[error("Invalid card format: {0}")]
    InvalidCardFormat(String),

    #[error("Invalid deck format: {0}")]
    InvalidDeckFormat(String),

    #[error("Unknown card: {0}")]
    UnknownCard(String),

    #[error("Unknown character: {0}")]
    UnknownCharacter(String),

    #[error("Invalid interaction: {0}")]
    InvalidInteraction(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ClashError>;

/// Machine-readable code attached to every card-rule rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationCode {
    MissingCard,
    InvalidCardPair,
    UnknownCard,
    CardUnavailable,
    CardExhausted,
    RotationMissing,
    RotationInvalid,
    NoActionList,
    NoRefresh,
    MissingDeck,
    DuplicateCard,
    InvalidCardType,
    MissingMovement,
    MissingAbility,
    MovementRestoreInvalid,
    MovementRestoreRequired,
    MovementDiscardInvalid,
    MovementDiscardRequired,
    AbilityNotInHand,
    MissingAbilityCard,
    DrawCountMismatch,
    DiscardCountMismatch,
    InvalidDirection,
    InvalidChoice,
    InvalidTarget,
    NotPending,
    NotAuthorized,
    UnknownHandTrigger,
    CardNotInHand,
    MissingDeckState,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::MissingCard => "missing-card",
            ValidationCode::InvalidCardPair => "invalid-card-pair",
            ValidationCode::UnknownCard => "unknown-card",
            ValidationCode::CardUnavailable => "card-unavailable",
            ValidationCode::CardExhausted => "card-exhausted",
            ValidationCode::RotationMissing => "rotation-missing",
            ValidationCode::RotationInvalid => "rotation-invalid",
            ValidationCode::NoActionList => "no-action-list",
            ValidationCode::NoRefresh => "no-refresh",
            ValidationCode::MissingDeck => "missing-deck",
            ValidationCode::DuplicateCard => "duplicate-card",
            ValidationCode::InvalidCardType => "invalid-card-type",
            ValidationCode::MissingMovement => "missing-movement",
            ValidationCode::MissingAbility => "missing-ability",
            ValidationCode::MovementRestoreInvalid => "movement-restore-invalid",
            ValidationCode::MovementRestoreRequired => "movement-restore-required",
            ValidationCode::MovementDiscardInvalid => "movement-discard-invalid",
            ValidationCode::MovementDiscardRequired => "movement-discard-required",
            ValidationCode::AbilityNotInHand => "ability-not-in-hand",
            ValidationCode::MissingAbilityCard => "missing-ability-card",
            ValidationCode::DrawCountMismatch => "draw-count-mismatch",
            ValidationCode::DiscardCountMismatch => "discard-count-mismatch",
            ValidationCode::InvalidDirection => "invalid-direction",
            ValidationCode::InvalidChoice => "invalid-choice",
            ValidationCode::InvalidTarget => "invalid-target",
            ValidationCode::NotPending => "not-pending",
            ValidationCode::NotAuthorized => "not-authorized",
            ValidationCode::UnknownHandTrigger => "unknown-hand-trigger",
            ValidationCode::CardNotInHand => "card-not-in-hand",
            ValidationCode::MissingDeckState => "missing-deck-state",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tagged rejection returned by card and interaction rules
///
/// Rules never raise: callers inspect the `Err` branch of a
/// `std::result::Result<T, CardValidationError>`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct CardValidationError {
    pub code: ValidationCode,
    pub message: String,
}

impl CardValidationError {
    pub fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        CardValidationError {
            code,
            message: message.into(),
        }
    }
}

pub type RuleResult<T> = std::result::Result<T, CardValidationError>;
