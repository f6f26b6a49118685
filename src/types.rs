//! Wire and domain types shared across the engine, room, and gateway.
//!
//! Serialization follows the teacher's convention: tagged enums for
//! messages, plain structs for snapshots, `Uuid` for stable identity.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use utoipa::ToSchema;

/// A cell on the grid. Origin top-left, y increases downward.
///
/// Wire format is `[x, y]`, not `{"x":.., "y":..}` — `body` arrays are
/// serialized as arrays of pairs per spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Serialize for Position {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.x, self.y).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (x, y) = <(i32, i32)>::deserialize(deserializer)?;
        Ok(Position { x, y })
    }
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn translated(&self, direction: Direction) -> Position {
        let (dx, dy) = direction.vector();
        Position::new(self.x + dx, self.y + dy)
    }

    pub fn in_bounds(&self, width: i32, height: i32) -> bool {
        self.x >= 0 && self.x < width && self.y >= 0 && self.y < height
    }
}

/// Movement directions for snakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn vector(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// The player slot a snake occupies within an arena: 1 or 2.
pub type PlayerSlot = u8;

/// A snake belonging to one slot within a single arena.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Snake {
    pub player_id: PlayerSlot,
    /// Head first, tail last.
    pub body: VecDeque<Position>,
    pub direction: Direction,
    /// The pending direction once the input queue is drained. Internal
    /// only; the wire snapshot (spec.md §6) exposes `direction` alone.
    #[serde(skip)]
    pub next_direction: Direction,
    #[serde(skip)]
    pub input_queue: VecDeque<Direction>,
    pub alive: bool,
    #[serde(skip)]
    pub changed_direction_last_move: bool,
    /// Present on the wire but not implemented by any game rule; see
    /// spec.md §9 Open Question.
    pub buff: String,
}

impl Snake {
    pub fn new(player_id: PlayerSlot, start: Position, direction: Direction) -> Self {
        let mut body = VecDeque::new();
        body.push_back(start);
        Self {
            player_id,
            body,
            direction,
            next_direction: direction,
            input_queue: VecDeque::new(),
            alive: true,
            changed_direction_last_move: false,
            buff: "default".to_string(),
        }
    }

    pub fn head(&self) -> Position {
        *self.body.front().expect("snake body is never empty")
    }

    pub fn tail(&self) -> impl Iterator<Item = &Position> {
        self.body.iter().skip(1)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Append a queued direction change, per spec.md §4.1 queueing contract:
    /// reject if it equals or is opposite the last-queued direction (or
    /// `next_direction` when the queue is empty); drop the oldest entry if
    /// the queue is already at capacity.
    pub fn queue_direction(&mut self, direction: Direction, max_queue: usize) {
        let reference = self.input_queue.back().copied().unwrap_or(self.next_direction);
        if direction == reference || direction == reference.opposite() {
            return;
        }
        if self.input_queue.len() >= max_queue {
            self.input_queue.pop_front();
        }
        self.input_queue.push_back(direction);
    }
}

/// Fruit types. Only `Apple` and `Grapes` are semantically active; the rest
/// reserve wire identifiers per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FruitType {
    Apple,
    Orange,
    Lemon,
    Grapes,
    Strawberry,
    Banana,
    Peach,
    Cherry,
    Watermelon,
    Kiwi,
}

impl FruitType {
    pub const ALL: [FruitType; 10] = [
        FruitType::Apple,
        FruitType::Orange,
        FruitType::Lemon,
        FruitType::Grapes,
        FruitType::Strawberry,
        FruitType::Banana,
        FruitType::Peach,
        FruitType::Cherry,
        FruitType::Watermelon,
        FruitType::Kiwi,
    ];
}

/// Per-type spawn configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FruitConfig {
    pub propensity: f64,
    /// Ticks the fruit persists once spawned; `None` means it never expires.
    pub lifetime: Option<u32>,
}

impl Default for FruitConfig {
    fn default() -> Self {
        Self {
            propensity: 0.0,
            lifetime: None,
        }
    }
}

/// A fruit on the grid.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Fruit {
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: FruitType,
    /// Remaining ticks, or `None` for an immortal fruit. Internal-only;
    /// the wire snapshot only reveals this when it's within the warning
    /// window (see [`crate::engine::GameSnapshot`]).
    #[serde(skip)]
    pub lifetime: Option<u32>,
}

impl Fruit {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Errors surfaced by game/room/competition operations. Never propagated
/// beyond the owning connection (spec.md §7).
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("room is full")]
    RoomFull,
    #[error("no room available")]
    NoRoomAvailable,
}

pub type GameResult<T> = Result<T, GameError>;

/// Close codes from spec.md §6.
pub mod close_code {
    pub const INVALID_PLAYER_ID: u16 = 4000;
    pub const NAME_EXPECTED: u16 = 4001;
    pub const SERVER_FULL: u16 = 4002;
    pub const COMPETITION_UNAVAILABLE: u16 = 4003;
}

/// A stable player identity within one competition, assigned sequentially
/// as `P1`, `P2`, … at registration (spec.md §4.4). Stable for the whole
/// competition even though the player's (room, slot) pair changes each
/// round.
pub type PlayerUid = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_serializes_as_an_xy_array() {
        let p = Position::new(3, -4);
        assert_eq!(serde_json::to_string(&p).unwrap(), "[3,-4]");
    }

    #[test]
    fn position_deserializes_from_an_xy_array() {
        let p: Position = serde_json::from_str("[3,-4]").unwrap();
        assert_eq!(p, Position::new(3, -4));
    }

    #[test]
    fn snake_snapshot_omits_next_direction() {
        let snake = Snake::new(1, Position::new(0, 0), Direction::Right);
        let json = serde_json::to_value(&snake).unwrap();
        assert!(json.get("next_direction").is_none());
        assert!(json.get("direction").is_some());
    }
}
