//! Action labels and the action-token grammar
//!
//! A beat's action is a `-`-joined list of steps such as `m`, `2a` or
//! `[a-La-Ra]`. Each step is `[path]<type>` where type is one of
//! m(ove), a(ttack), c(harge), j(ump) or b(lock) and the path is a
//! sequence of local directions with optional distances.

use crate::core::hex::{apply_facing, HexCoord, LocalDirection};
use crate::core::types::{BeatInteraction, RotationSource};
use nom::{
    branch::alt,
    bytes::complete::{tag, take},
    character::complete::{digit0, digit1},
    combinator::all_consuming,
    multi::many0,
    IResult,
};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

/// Open marker: the character has no committed action at this beat
pub const DEFAULT_ACTION: &str = "E";
/// Focus marker (rewind)
pub const FOCUS_ACTION: &str = "F";
pub const WAIT_ACTION: &str = "W";
pub const COMBO_ACTION: &str = "Co";
pub const DAMAGE_ICON_ACTION: &str = "DamageIcon";
pub const DEATH_ACTION: &str = "Death";
pub const VICTORY_ACTION: &str = "Victory";
pub const HANDSHAKE_ACTION: &str = "Handshake";

/// Strip surrounding whitespace and one pair of outer brackets
pub fn normalize_action_label(action: &str) -> &str {
    let trimmed = action.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('[') && trimmed.ends_with(']') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

pub fn is_bracketed_action(action: &str) -> bool {
    let trimmed = action.trim();
    !trimmed.is_empty() && trimmed.starts_with('[') && trimmed.ends_with(']')
}

/// Re-apply brackets when the original label was bracketed
pub fn wrap_action_label(label: &str, bracketed: bool) -> String {
    if bracketed {
        format!("[{}]", label)
    } else {
        label.to_string()
    }
}

fn label_is(action: &str, marker: &str) -> bool {
    normalize_action_label(action).eq_ignore_ascii_case(marker)
}

/// `E` or `F`: the character is waiting for a new action set
pub fn is_open_action(action: &str) -> bool {
    label_is(action, DEFAULT_ACTION) || label_is(action, FOCUS_ACTION)
}

/// Anything except the open marker `E`
pub fn is_action_active(action: &str) -> bool {
    !label_is(action, DEFAULT_ACTION)
}

pub fn is_focus_action(action: &str) -> bool {
    label_is(action, FOCUS_ACTION)
}

pub fn is_combo_action(action: &str) -> bool {
    label_is(action, COMBO_ACTION)
}

pub fn is_damage_icon(action: &str) -> bool {
    action.trim() == DAMAGE_ICON_ACTION
}

/// Actions that do nothing on the board: empty, `W`, `DamageIcon`, `Co`
pub fn is_wait_action(action: &str) -> bool {
    let trimmed = action.trim();
    trimmed.is_empty()
        || label_is(trimmed, WAIT_ACTION)
        || label_is(trimmed, DAMAGE_ICON_ACTION)
        || label_is(trimmed, COMBO_ACTION)
}

/// Split an action into its raw step labels (brackets removed)
pub fn split_action_tokens(action: &str) -> Vec<&str> {
    normalize_action_label(action)
        .split('-')
        .map(normalize_action_label)
        .filter(|token| !token.is_empty())
        .collect()
}

/// True when any step of the action is an attack or charge
pub fn action_has_attack_token(action: &str) -> bool {
    split_action_tokens(action).iter().any(|token| {
        matches!(
            token.chars().last().map(|c| c.to_ascii_lowercase()),
            Some('a') | Some('c')
        )
    })
}

/// One beat of a committed action set, before it is written into the timeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionListItem {
    pub action: String,
    #[serde(default)]
    pub rotation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_source: Option<RotationSource>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<BeatInteraction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kbf: Option<i32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub combo_starter: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive_card_id: Option<String>,
}

impl ActionListItem {
    pub fn new(action: impl Into<String>) -> Self {
        ActionListItem {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn with_rotation(mut self, rotation: impl Into<String>, source: Option<RotationSource>) -> Self {
        self.rotation = rotation.into();
        self.rotation_source = source;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_attack(mut self, damage: i32, kbf: i32) -> Self {
        self.damage = Some(damage);
        self.kbf = Some(kbf);
        self
    }

    pub fn with_cards(mut self, card_id: Option<&str>, passive_card_id: Option<&str>) -> Self {
        self.card_id = card_id.map(str::to_string);
        self.passive_card_id = passive_card_id.map(str::to_string);
        self
    }

    /// Label with brackets removed
    pub fn label(&self) -> &str {
        normalize_action_label(&self.action)
    }
}

/// Primitive step type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Move,
    Attack,
    Charge,
    Jump,
    Block,
    /// Unrecognized type letter; ignored by the engine
    Other(char),
}

impl StepKind {
    pub fn from_char(c: char) -> Self {
        match c.to_ascii_lowercase() {
            'm' => StepKind::Move,
            'a' => StepKind::Attack,
            'c' => StepKind::Charge,
            'j' => StepKind::Jump,
            'b' => StepKind::Block,
            other => StepKind::Other(other),
        }
    }

    pub fn is_attack(self) -> bool {
        matches!(self, StepKind::Attack | StepKind::Charge)
    }

    pub fn is_move(self) -> bool {
        matches!(self, StepKind::Move | StepKind::Charge)
    }

    pub fn as_char(self) -> char {
        match self {
            StepKind::Move => 'm',
            StepKind::Attack => 'a',
            StepKind::Charge => 'c',
            StepKind::Jump => 'j',
            StepKind::Block => 'b',
            StepKind::Other(c) => c,
        }
    }
}

/// One segment of a path: a local direction repeated `distance` times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    pub direction: LocalDirection,
    pub distance: u32,
}

impl PathStep {
    pub fn forward(distance: u32) -> Self {
        PathStep {
            direction: LocalDirection::F,
            distance,
        }
    }
}

pub type PathSteps = SmallVec<[PathStep; 4]>;

/// A parsed action step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionToken {
    pub kind: StepKind,
    /// Raw path text (everything before the type letter)
    pub path: String,
    pub steps: PathSteps,
}

fn distance_segment(input: &str) -> IResult<&str, Option<PathStep>> {
    let (rest, digits) = digit1(input)?;
    let followed_by_letter = rest.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let distance = digits.parse::<u32>().unwrap_or(0);
    if followed_by_letter || distance == 0 {
        return Ok((rest, None));
    }
    Ok((rest, Some(PathStep::forward(distance))))
}

fn direction_segment(input: &str) -> IResult<&str, Option<PathStep>> {
    let (rest, label) = alt((tag("BL"), tag("BR"), take(1usize)))(input)?;
    let (rest, digits) = digit0(rest)?;
    let distance = match digits.parse::<u32>() {
        Ok(value) if value > 0 => value,
        _ => 1,
    };
    // Unknown direction letters fall back to forward
    let direction = LocalDirection::from_label(label).unwrap_or(LocalDirection::F);
    Ok((rest, Some(PathStep { direction, distance })))
}

fn path_segments(input: &str) -> IResult<&str, Vec<Option<PathStep>>> {
    all_consuming(many0(alt((distance_segment, direction_segment))))(input)
}

/// Parse a path prefix ("", "2", "L", "BL2", ...). Empty paths mean one step forward.
pub fn parse_path(path: &str) -> PathSteps {
    let upper = path.to_ascii_uppercase();
    let steps: PathSteps = match path_segments(&upper) {
        Ok((_, segments)) => segments.into_iter().flatten().collect(),
        Err(_) => SmallVec::new(),
    };
    if steps.is_empty() {
        smallvec![PathStep::forward(1)]
    } else {
        steps
    }
}

/// Parse a full action string into steps
///
/// Wait-like actions and malformed input yield an empty list.
pub fn parse_action_tokens(action: &str) -> Vec<ActionToken> {
    let trimmed = action.trim();
    if is_wait_action(trimmed) || is_open_action(trimmed) {
        return Vec::new();
    }
    split_action_tokens(trimmed)
        .into_iter()
        .filter_map(|token| {
            let type_char = token.chars().last()?;
            let path = &token[..token.len() - type_char.len_utf8()];
            Some(ActionToken {
                kind: StepKind::from_char(type_char),
                path: path.to_string(),
                steps: parse_path(path),
            })
        })
        .collect()
}

/// World-space projection of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPath {
    /// Every hex entered, in order
    pub positions: Vec<HexCoord>,
    pub destination: HexCoord,
    /// Unit vector of the final segment
    pub last_step: Option<HexCoord>,
}

/// Project path steps from `origin`, rotating local directions by `facing`
pub fn build_path(origin: HexCoord, steps: &[PathStep], facing: i32) -> BuiltPath {
    let mut positions = Vec::new();
    let mut current = origin;
    let mut last_step = None;
    for step in steps {
        let direction = apply_facing(step.direction.vector(), facing);
        last_step = Some(direction);
        for _ in 0..step.distance {
            current = current.offset(direction);
            positions.push(current);
        }
    }
    BuiltPath {
        positions,
        destination: current,
        last_step,
    }
}

/// True when the attack path contains no lateral or backward component
pub fn is_center_attack_path(path: &str) -> bool {
    !path.chars().any(|c| matches!(c.to_ascii_uppercase(), 'L' | 'R' | 'B'))
}
