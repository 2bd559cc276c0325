//! Beat resolution: timeline, interactions, board tokens and the engine

pub mod action_sets;
pub mod board;
pub mod combat;
pub mod engine;
pub mod integrity;
pub mod interactions;
pub mod logger;
pub mod outcome;
pub mod timeline;
pub mod writer;

pub use action_sets::apply_action_set_to_beats;
pub use board::{build_replay_seed_tokens, BoardToken, BoardTokenType};
pub use engine::{resolve_beats, ResolveContext, ResolveInput, ResolveOutput};
pub use integrity::{find_timeline_breaks, repair_timeline_breaks_from_baseline, TimelineBreak, TimelineRepair};
pub use interactions::{
    resolve_interaction, CustomInteraction, InteractionKind, InteractionRequest, InteractionResolution,
    InteractionStatus,
};
pub use logger::{OutputFormat, OutputMode, ResolveLogger, ResolveOptions, VerbosityLevel};
pub use outcome::{evaluate_match_outcome, MatchOutcome, OutcomeReason};
pub use timeline::{Beat, BeatEntry};
