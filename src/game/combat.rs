//! Hit resolution primitives
//!
//! Knockback, occupancy and the card-specific combat rules that depend only
//! on geometry and an entry's card ids.

use crate::core::action::{
    build_path, is_action_active, is_bracketed_action, normalize_action_label, wrap_action_label, BuiltPath,
    PathStep, StepKind,
};
use crate::core::hex::{direction_index, facing_rotation_steps, HexCoord, Land, AXIAL_DIRECTIONS};
use crate::core::types::{Terrain, UserId};
use crate::game::timeline::BeatEntry;
use rustc_hash::FxHashMap;

pub const KNOCKBACK_DIVISOR: i32 = 10;
/// Hexes a resolved throw carries its target
pub const THROW_DISTANCE: i32 = 2;
pub const ARROW_DAMAGE: i32 = 4;
pub const ARROW_KBF: i32 = 1;
/// Arrows vanish once this far from any land tile
pub const ARROW_LAND_DISTANCE_LIMIT: i32 = 5;
/// Stun length when a rewind return finds its anchor occupied
pub const DEFAULT_REWIND_STUN: i32 = 3;

pub const ABSORB: &str = "absorb";
pub const BOW_SHOT: &str = "bow-shot";
pub const BURNING_STRIKE: &str = "burning-strike";
pub const CROSS_SLASH: &str = "cross-slash";
pub const GIGANTIC_STAFF: &str = "gigantic-staff";
pub const GRAPPLING_HOOK: &str = "grappling-hook";
pub const GUARD: &str = "guard";
pub const HAMMER: &str = "hammer";
pub const HAVEN: &str = "haven";
pub const HEALING_HARMONY: &str = "healing-harmony";
pub const IRON_WILL: &str = "iron-will";
pub const JAB: &str = "jab";
pub const PARRY: &str = "parry";
pub const REFLEX_DODGE: &str = "reflex-dodge";
pub const REWIND: &str = "rewind";
pub const SINKING_SHOT: &str = "sinking-shot";
pub const SMOKE_BOMB: &str = "smoke-bomb";
pub const STAB: &str = "stab";
pub const VENGEANCE: &str = "vengeance";

const ACTIVE_THROW_CARDS: [&str; 2] = ["hip-throw", "tackle"];
const PASSIVE_THROW_CARDS: [&str; 1] = ["leap"];

/// Position, accumulated damage and facing of one character mid-resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorState {
    pub position: HexCoord,
    pub damage: i32,
    pub facing: i32,
}

/// Which character stands on which hex
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    by_hex: FxHashMap<HexCoord, UserId>,
}

impl Occupancy {
    pub fn from_states<'a, I>(states: I) -> Self
    where
        I: IntoIterator<Item = (&'a UserId, &'a ActorState)>,
    {
        let by_hex = states
            .into_iter()
            .map(|(user_id, state)| (state.position, user_id.clone()))
            .collect();
        Occupancy { by_hex }
    }

    pub fn occupant(&self, coord: HexCoord) -> Option<&UserId> {
        self.by_hex.get(&coord)
    }

    /// Occupied by someone other than `user_id`
    pub fn is_blocked_for(&self, coord: HexCoord, user_id: &UserId) -> bool {
        self.occupant(coord).is_some_and(|occupant| occupant != user_id)
    }

    /// Move `user_id` from its state's position to `to`
    pub fn relocate(&mut self, user_id: &UserId, state: &mut ActorState, to: HexCoord) {
        if state.position == to {
            return;
        }
        self.by_hex.remove(&state.position);
        state.position = to;
        self.by_hex.insert(to, user_id.clone());
    }
}

/// Knockback distance for a hit
///
/// kbf 0 never knocks back and kbf 1 always knocks exactly one hex;
/// higher values scale with the target's accumulated damage.
pub fn knockback_distance(damage: i32, kbf: i32) -> i32 {
    match kbf {
        k if k <= 0 => 0,
        1 => 1,
        k => ((damage.max(0) * k) / KNOCKBACK_DIVISOR).max(1),
    }
}

/// Direction a hit pushes its target: the path's last step, else the straight line
pub fn knockback_direction(origin: HexCoord, destination: HexCoord, last_step: Option<HexCoord>) -> Option<HexCoord> {
    last_step.or_else(|| direction_index(origin.delta_to(destination)).map(|index| AXIAL_DIRECTIONS[index]))
}

/// Push a target up to `distance` hexes, stopping before any other character
///
/// Returns the number of hexes actually travelled.
pub fn walk_knockback(
    occupancy: &mut Occupancy,
    user_id: &UserId,
    state: &mut ActorState,
    direction: HexCoord,
    distance: i32,
) -> i32 {
    let mut position = state.position;
    let mut steps = 0;
    for _ in 0..distance.max(0) {
        let candidate = position.offset(direction);
        if occupancy.is_blocked_for(candidate, user_id) {
            break;
        }
        position = candidate;
        steps += 1;
    }
    occupancy.relocate(user_id, state, position);
    steps
}

/// Carry a thrown target `THROW_DISTANCE` hexes; no movement when the landing hex is taken
pub fn throw_target(occupancy: &mut Occupancy, user_id: &UserId, state: &mut ActorState, direction: HexCoord) -> i32 {
    let landing = state.position.offset(direction.scale(THROW_DISTANCE));
    if occupancy.is_blocked_for(landing, user_id) {
        return 0;
    }
    occupancy.relocate(user_id, state, landing);
    THROW_DISTANCE
}

/// Charge path of an active grappling hook
///
/// The hook stops on the first hex that holds another character or is land.
pub fn grappling_hook_path(
    origin: HexCoord,
    steps: &[PathStep],
    facing: i32,
    land: &Land,
    occupancy: &Occupancy,
    actor: &UserId,
) -> BuiltPath {
    let full = build_path(origin, steps, facing);
    let mut positions = Vec::new();
    for position in full.positions {
        positions.push(position);
        if occupancy.is_blocked_for(position, actor) || land.contains(position) {
            break;
        }
    }
    // last_step of the truncated path is the segment it stopped on
    let last_step = match positions.len() {
        0 => full.last_step,
        len => {
            let previous = if len >= 2 { positions[len - 2] } else { origin };
            let delta = previous.delta_to(positions[len - 1]);
            Some(delta)
        }
    };
    BuiltPath {
        destination: positions.last().copied().unwrap_or(origin),
        positions,
        last_step,
    }
}

/// Passive grappling hook: drag the target behind the attacker
///
/// Returns the knockback direction to use, which is the reverse of the
/// attack direction whether or not the target could be moved.
pub fn grappling_hook_flip(
    occupancy: &mut Occupancy,
    origin: HexCoord,
    attack_direction: Option<HexCoord>,
    target_id: &UserId,
    target: &mut ActorState,
) -> Option<HexCoord> {
    let direction = attack_direction?.invert();
    let flip = origin.offset(direction);
    if !occupancy.is_blocked_for(flip, target_id) {
        occupancy.relocate(target_id, target, flip);
    }
    Some(direction)
}

/// Passive gigantic staff over the abyss turns a trailing move into a jump of at least 2
pub fn gigantic_staff_action(action: &str) -> String {
    let trimmed = action.trim();
    let label = normalize_action_label(trimmed);
    if !label.to_ascii_lowercase().ends_with('m') {
        return action.to_string();
    }
    let path = &label[..label.len() - 1];
    let digits_start = path
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map_or(path.len(), |(index, _)| index);
    let (prefix, digits) = path.split_at(digits_start);
    let distance = digits.parse::<i32>().map_or(2, |d| d.max(2));
    wrap_action_label(&format!("{}{}j", prefix, distance), is_bracketed_action(trimmed))
}

/// Attacker stands directly behind the target's facing
pub fn is_behind_target(attacker: HexCoord, target: &ActorState) -> bool {
    match direction_index(target.position.delta_to(attacker)) {
        Some(index) => index as i32 == (facing_rotation_steps(target.facing) + 3) % 6,
        None => false,
    }
}

/// Damage prevented by a passive healing harmony while acting
pub fn healing_harmony_reduction(entry: Option<&BeatEntry>) -> i32 {
    match entry {
        Some(entry) if entry.passive_card_id.as_deref() == Some(HEALING_HARMONY) && is_action_active(&entry.action) => 2,
        _ => 0,
    }
}

/// Geometry of a single attack step, for throw detection
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrowContext {
    pub step: Option<StepKind>,
    pub actor_position: Option<HexCoord>,
    pub target_position: Option<HexCoord>,
}

fn is_grappling_hook_throw(entry: &BeatEntry, context: &ThrowContext) -> bool {
    if entry.card_id.as_deref() != Some(GRAPPLING_HOOK) || entry.card_start_terrain != Some(Terrain::Land) {
        return false;
    }
    if context.step != Some(StepKind::Charge) {
        return false;
    }
    match (context.actor_position, context.target_position) {
        (Some(actor), Some(target)) => actor.distance(target) == 1,
        _ => false,
    }
}

/// Whether an entry's attack resolves as a throw
pub fn is_entry_throw(entry: &BeatEntry, context: &ThrowContext) -> bool {
    if entry.interaction.as_ref().is_some_and(|interaction| interaction.is_throw()) {
        return true;
    }
    if is_grappling_hook_throw(entry, context) {
        return true;
    }
    let active = entry.card_id.as_deref().unwrap_or_default();
    let passive = entry.passive_card_id.as_deref().unwrap_or_default();
    ACTIVE_THROW_CARDS.iter().any(|id| *id == active) || PASSIVE_THROW_CARDS.iter().any(|id| *id == passive)
}
