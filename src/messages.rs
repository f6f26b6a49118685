//! Client↔server wire envelopes (spec.md §6), strict JSON, tagged enums —
//! the teacher's `ClientMessage`/`ServerMessage` convention generalized to
//! the tournament's richer vocabulary.

use crate::competition::CompetitionSnapshot;
use crate::engine::GameSnapshot;
use crate::types::{Direction, PlayerUid};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Messages sent from client to server, dispatched by `action`. Unknown
/// `action` values are ignored by the gateway (spec.md §7).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    #[serde(rename = "ready")]
    Ready {
        name: Option<String>,
        mode: Option<String>,
    },
    #[serde(rename = "move")]
    Move { direction: Direction },
    #[serde(rename = "switch_room")]
    SwitchRoom { room_id: usize },
    #[serde(rename = "get_rooms")]
    GetRooms,
}

/// The first inbound message on `/ws/compete` must carry a name.
#[derive(Debug, Clone, Deserialize)]
pub struct CompeteHello {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerRef {
    pub player_id: u8,
    pub name: String,
}

/// Messages sent from server to client, tagged by `type`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "lobby_status")]
    LobbyStatus {
        registered: usize,
        required: usize,
    },
    #[serde(rename = "competition_status")]
    CompetitionStatus(CompetitionSnapshot),
    #[serde(rename = "competition_complete")]
    CompetitionComplete { champion: String, reset_in: u64 },
    #[serde(rename = "joined")]
    Joined { room_id: usize, player_id: u8 },
    #[serde(rename = "match_assigned")]
    MatchAssigned {
        room_id: usize,
        player_id: u8,
        opponent: String,
        points_to_win: u32,
    },
    #[serde(rename = "start")]
    Start {
        mode: String,
        room_id: usize,
        wins: Option<(u32, u32)>,
        points_to_win: Option<u32>,
    },
    #[serde(rename = "state")]
    State {
        game: GameSnapshot,
        wins: (u32, u32),
        names: (String, String),
        room_id: usize,
    },
    #[serde(rename = "gameover")]
    GameOver {
        winner: Option<u8>,
        wins: (u32, u32),
        names: (String, String),
        room_id: usize,
        points_to_win: u32,
    },
    #[serde(rename = "match_complete")]
    MatchComplete {
        winner: PlayerRef,
        final_score: (u32, u32),
        room_id: usize,
        remaining_matches: usize,
        current_round: usize,
        total_rounds: usize,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        forfeit: bool,
    },
    #[serde(rename = "observer_joined")]
    ObserverJoined {
        room_id: Option<usize>,
        game: Option<GameSnapshot>,
        wins: Option<(u32, u32)>,
        names: Option<(String, String)>,
    },
    #[serde(rename = "room_list")]
    RoomList {
        rooms: Vec<RoomListEntry>,
        current_room: Option<usize>,
        round: usize,
        total_rounds: usize,
        bye_player: Option<String>,
    },
    #[serde(rename = "waiting")]
    Waiting { message: String },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "registered")]
    Registered {
        uid: PlayerUid,
        name: String,
        competition_status: CompetitionSnapshot,
    },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomListEntry {
    pub room_id: usize,
    pub names: (String, String),
    pub wins: (u32, u32),
    pub match_complete: bool,
}
