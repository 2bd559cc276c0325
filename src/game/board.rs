//! Board tokens
//!
//! Tokens are battlefield objects that live outside the timeline: fire
//! hexes, arrows in flight, ethereal platforms and rewind focus anchors.
//! The engine rebuilds timeline-derived tokens on every pass, so only
//! tokens of other types are carried into a replay.

use crate::core::hex::{normalize_degrees, HexCoord, Land};
use crate::core::types::UserId;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of board token
///
/// Unknown types are kept verbatim so scenario files can carry tokens this
/// engine does not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BoardTokenType {
    FireHex,
    Arrow,
    EtherealPlatform,
    FocusAnchor,
    Other(String),
}

impl BoardTokenType {
    pub fn as_str(&self) -> &str {
        match self {
            BoardTokenType::FireHex => "fire-hex",
            BoardTokenType::Arrow => "arrow",
            BoardTokenType::EtherealPlatform => "ethereal-platform",
            BoardTokenType::FocusAnchor => "focus-anchor",
            BoardTokenType::Other(name) => name,
        }
    }

    /// Token types the engine derives from the timeline
    pub fn is_timeline_derived(&self) -> bool {
        !matches!(self, BoardTokenType::Other(_))
    }
}

impl From<String> for BoardTokenType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "fire-hex" => BoardTokenType::FireHex,
            "arrow" => BoardTokenType::Arrow,
            "ethereal-platform" => BoardTokenType::EtherealPlatform,
            "focus-anchor" => BoardTokenType::FocusAnchor,
            _ => BoardTokenType::Other(value),
        }
    }
}

impl From<BoardTokenType> for String {
    fn from(value: BoardTokenType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for BoardTokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardToken {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BoardTokenType,
    pub position: HexCoord,
    #[serde(default)]
    pub facing: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
}

impl BoardToken {
    pub fn new(id: impl Into<String>, kind: BoardTokenType, position: HexCoord) -> Self {
        BoardToken {
            id: id.into(),
            kind,
            position,
            facing: 0,
            owner_user_id: None,
            card_id: None,
        }
    }

    pub fn with_owner(mut self, owner: Option<&UserId>) -> Self {
        self.owner_user_id = owner.cloned();
        self
    }

    pub fn with_facing(mut self, facing: i32) -> Self {
        self.facing = normalize_degrees(facing);
        self
    }
}

/// Tokens to seed a replay with: everything the timeline does not produce
pub fn build_replay_seed_tokens(tokens: &[BoardToken]) -> Vec<BoardToken> {
    tokens
        .iter()
        .filter(|token| !token.kind.is_timeline_derived())
        .cloned()
        .collect()
}

/// Token state tracked while resolving a timeline
///
/// Cloning a board is how the engine snapshots it before replaying a beat.
#[derive(Debug, Clone, Default)]
pub struct TokenBoard {
    tokens: Vec<BoardToken>,
    counter: usize,
    fire: FxHashSet<HexCoord>,
    platforms: FxHashSet<HexCoord>,
    focus_anchors: BTreeMap<UserId, String>,
    /// Fire on abyss hexes, alive for the current beat only
    ephemeral_fire: FxHashSet<HexCoord>,
    delayed_fire: BTreeMap<usize, Vec<(HexCoord, Option<UserId>)>>,
}

impl TokenBoard {
    /// Start from the scenario's tokens, dropping fire on abyss and platforms on land
    pub fn seed(initial: &[BoardToken], land: &Land) -> Self {
        let tokens: Vec<BoardToken> = initial
            .iter()
            .filter(|token| match token.kind {
                BoardTokenType::FireHex => land.contains(token.position),
                BoardTokenType::EtherealPlatform => !land.contains(token.position),
                _ => true,
            })
            .cloned()
            .collect();

        let mut board = TokenBoard {
            counter: tokens.len(),
            ..Default::default()
        };
        for token in &tokens {
            match token.kind {
                BoardTokenType::FireHex => {
                    board.fire.insert(token.position);
                }
                BoardTokenType::EtherealPlatform => {
                    board.platforms.insert(token.position);
                }
                BoardTokenType::FocusAnchor => {
                    if let Some(owner) = &token.owner_user_id {
                        board.focus_anchors.insert(owner.clone(), token.id.clone());
                    }
                }
                _ => {}
            }
        }
        board.tokens = tokens;
        board
    }

    pub fn tokens(&self) -> &[BoardToken] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<BoardToken> {
        self.tokens
    }

    fn next_id(&mut self, kind: &BoardTokenType) -> String {
        let id = format!("{}:{}", kind, self.counter);
        self.counter += 1;
        id
    }

    /// Ignite a hex; persistent on land, for this beat only on abyss
    pub fn add_fire(&mut self, coord: HexCoord, owner: Option<&UserId>, land: &Land) -> bool {
        if !land.contains(coord) {
            return self.ephemeral_fire.insert(coord);
        }
        if !self.fire.insert(coord) {
            return false;
        }
        let id = self.next_id(&BoardTokenType::FireHex);
        self.tokens
            .push(BoardToken::new(id, BoardTokenType::FireHex, coord).with_owner(owner));
        true
    }

    pub fn is_burning(&self, coord: HexCoord) -> bool {
        self.fire.contains(&coord) || self.ephemeral_fire.contains(&coord)
    }

    pub fn has_fire(&self) -> bool {
        !self.fire.is_empty() || !self.ephemeral_fire.is_empty()
    }

    /// Schedule a fire hex to appear when `beat_index` starts
    pub fn queue_delayed_fire(&mut self, beat_index: usize, coord: HexCoord, owner: Option<&UserId>) {
        let queued = self.delayed_fire.entry(beat_index).or_default();
        if queued.iter().any(|(existing, _)| *existing == coord) {
            return;
        }
        queued.push((coord, owner.cloned()));
    }

    /// Reset per-beat fire and place any fire queued for this beat
    pub fn begin_beat(&mut self, beat_index: usize, land: &Land) {
        self.ephemeral_fire.clear();
        if let Some(queued) = self.delayed_fire.remove(&beat_index) {
            for (coord, owner) in queued {
                self.add_fire(coord, owner.as_ref(), land);
            }
        }
    }

    pub fn add_arrow(&mut self, coord: HexCoord, facing: i32, owner: Option<&UserId>) {
        let id = self.next_id(&BoardTokenType::Arrow);
        self.tokens.push(
            BoardToken::new(id, BoardTokenType::Arrow, coord)
                .with_facing(facing)
                .with_owner(owner),
        );
    }

    pub fn arrow_ids(&self) -> Vec<String> {
        self.tokens
            .iter()
            .filter(|token| token.kind == BoardTokenType::Arrow)
            .map(|token| token.id.clone())
            .collect()
    }

    pub fn token(&self, id: &str) -> Option<&BoardToken> {
        self.tokens.iter().find(|token| token.id == id)
    }

    pub fn move_token(&mut self, id: &str, position: HexCoord) {
        if let Some(token) = self.tokens.iter_mut().find(|token| token.id == id) {
            token.position = position;
        }
    }

    pub fn remove_token(&mut self, id: &str) {
        self.tokens.retain(|token| token.id != id);
    }

    /// Platforms only exist over the abyss
    pub fn add_platform(&mut self, coord: HexCoord, owner: Option<&UserId>, land: &Land) {
        if land.contains(coord) || !self.platforms.insert(coord) {
            return;
        }
        let id = self.next_id(&BoardTokenType::EtherealPlatform);
        self.tokens
            .push(BoardToken::new(id, BoardTokenType::EtherealPlatform, coord).with_owner(owner));
    }

    pub fn remove_platform(&mut self, coord: HexCoord) {
        if !self.platforms.remove(&coord) {
            return;
        }
        if let Some(position) = self
            .tokens
            .iter()
            .rposition(|token| token.kind == BoardTokenType::EtherealPlatform && token.position == coord)
        {
            self.tokens.remove(position);
        }
    }

    pub fn has_platform(&self, coord: HexCoord) -> bool {
        self.platforms.contains(&coord)
    }

    /// Place `owner`'s focus anchor, replacing any previous one
    pub fn add_focus_anchor(&mut self, coord: HexCoord, owner: &UserId, card_id: &str) {
        self.remove_focus_anchor(owner);
        let id = self.next_id(&BoardTokenType::FocusAnchor);
        let mut token = BoardToken::new(id.clone(), BoardTokenType::FocusAnchor, coord).with_owner(Some(owner));
        token.card_id = Some(card_id.to_string());
        self.tokens.push(token);
        self.focus_anchors.insert(owner.clone(), id);
    }

    pub fn remove_focus_anchor(&mut self, owner: &UserId) {
        if let Some(id) = self.focus_anchors.remove(owner) {
            self.remove_token(&id);
        }
    }

    pub fn focus_anchor_owners(&self) -> Vec<UserId> {
        self.focus_anchors.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn land() -> Land {
        Land::new(vec![HexCoord::new(0, 0), HexCoord::new(1, 0)])
    }

    #[test]
    fn test_token_type_round_trips_unknown_names() {
        let token: BoardToken =
            serde_json::from_str(r#"{"id":"x","type":"banner","position":{"q":0,"r":0}}"#).unwrap();
        assert_eq!(token.kind, BoardTokenType::Other("banner".to_string()));
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["type"], "banner");
    }

    #[test]
    fn test_replay_seed_drops_derived_tokens() {
        let tokens = vec![
            BoardToken::new("fire-hex:0", BoardTokenType::FireHex, HexCoord::new(0, 0)),
            BoardToken::new("banner:1", BoardTokenType::Other("banner".into()), HexCoord::new(1, 0)),
            BoardToken::new("arrow:2", BoardTokenType::Arrow, HexCoord::new(2, 0)),
        ];
        let seeded = build_replay_seed_tokens(&tokens);
        assert_eq!(seeded.len(), 1);
        assert_eq!(seeded[0].id, "banner:1");
    }

    #[test]
    fn test_seed_filters_misplaced_tokens() {
        let tokens = vec![
            BoardToken::new("fire-hex:0", BoardTokenType::FireHex, HexCoord::new(5, 5)),
            BoardToken::new("ethereal-platform:1", BoardTokenType::EtherealPlatform, HexCoord::new(0, 0)),
            BoardToken::new("fire-hex:2", BoardTokenType::FireHex, HexCoord::new(1, 0)),
        ];
        let board = TokenBoard::seed(&tokens, &land());
        assert_eq!(board.tokens().len(), 1);
        assert!(board.is_burning(HexCoord::new(1, 0)));
        assert!(!board.is_burning(HexCoord::new(5, 5)));
    }

    #[test]
    fn test_fire_on_abyss_is_ephemeral() {
        let mut board = TokenBoard::default();
        let abyss = HexCoord::new(4, 0);
        assert!(board.add_fire(abyss, None, &land()));
        assert!(board.is_burning(abyss));
        assert!(board.tokens().is_empty());
        board.begin_beat(1, &land());
        assert!(!board.is_burning(abyss));
    }

    #[test]
    fn test_fire_on_land_is_deduplicated() {
        let mut board = TokenBoard::default();
        assert!(board.add_fire(HexCoord::new(0, 0), None, &land()));
        assert!(!board.add_fire(HexCoord::new(0, 0), None, &land()));
        assert_eq!(board.tokens().len(), 1);
        assert_eq!(board.tokens()[0].id, "fire-hex:0");
    }

    #[test]
    fn test_delayed_fire_appears_on_its_beat() {
        let mut board = TokenBoard::default();
        let owner = UserId::new("alpha");
        board.queue_delayed_fire(3, HexCoord::new(0, 0), Some(&owner));
        board.queue_delayed_fire(3, HexCoord::new(0, 0), Some(&owner));
        board.begin_beat(2, &land());
        assert!(!board.has_fire());
        board.begin_beat(3, &land());
        assert_eq!(board.tokens().len(), 1);
        assert_eq!(board.tokens()[0].owner_user_id, Some(owner));
    }

    #[test]
    fn test_focus_anchor_replaces_previous() {
        let mut board = TokenBoard::default();
        let owner = UserId::new("alpha");
        board.add_focus_anchor(HexCoord::new(0, 0), &owner, "rewind");
        board.add_focus_anchor(HexCoord::new(1, 0), &owner, "rewind");
        assert_eq!(board.tokens().len(), 1);
        assert_eq!(board.tokens()[0].position, HexCoord::new(1, 0));
        board.remove_focus_anchor(&owner);
        assert!(board.tokens().is_empty());
        assert!(board.focus_anchor_owners().is_empty());
    }

    #[test]
    fn test_platforms_only_over_abyss() {
        let mut board = TokenBoard::default();
        board.add_platform(HexCoord::new(0, 0), None, &land());
        assert!(board.tokens().is_empty());
        board.add_platform(HexCoord::new(3, 0), None, &land());
        assert!(board.has_platform(HexCoord::new(3, 0)));
        board.remove_platform(HexCoord::new(3, 0));
        assert!(board.tokens().is_empty());
    }
}
