//! hex-clash - beat-timeline combat resolution on a hex board
//!
//! Characters commit card-driven action sets onto a shared timeline of
//! beats. The engine replays that timeline from beat 0, resolving movement,
//! attacks, knockback and card effects, and halts where a player decision
//! is still missing.

pub mod cards;
pub mod core;
pub mod error;
pub mod game;
pub mod loader;

pub use error::{ClashError, Result};
pub use game::{resolve_beats, ResolveContext, ResolveInput, ResolveOutput};
