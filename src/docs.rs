//! OpenAPI documentation for the CopperHead tournament server.
//!
//! Generated with utoipa so the same schema types backing the wire
//! protocol also back the `/swagger` UI and `/api-spec.json` document.

use crate::competition::{ChampionshipRecord, CompetitionSnapshot};
use crate::engine::GameSnapshot;
use crate::messages::{PlayerRef, RoomListEntry, ServerMessage};
use crate::types::{Direction, Fruit, FruitType, Position};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::server::root,
        crate::server::status,
        crate::server::competition_snapshot,
        crate::server::history,
        crate::server::rooms_active,
        crate::server::add_bot,
    ),
    components(
        schemas(
            Position,
            Direction,
            Fruit,
            FruitType,
            GameSnapshot,
            ServerMessage,
            PlayerRef,
            RoomListEntry,
            CompetitionSnapshot,
            ChampionshipRecord,
        )
    ),
    tags(
        (name = "websocket", description = "WebSocket endpoints for bracket registration, the legacy two-player room, and spectating"),
        (name = "competition", description = "Tournament bracket status and history"),
        (name = "status", description = "Server and room status endpoints"),
    ),
    info(
        title = "CopperHead Tournament Server API",
        version = "1.0.0",
        description = "A real-time multiplayer Snake tournament server. Players join a single-elimination bracket over WebSockets, play best-of-N matches on a shared grid, and the bracket advances automatically until a champion is crowned.",
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server"),
    )
)]
pub struct ApiDoc;

/// Human-readable protocol notes kept next to `ApiDoc` so the two never
/// drift apart.
pub const API_DOCUMENTATION: &str = r#"
# CopperHead Tournament Server API

## Overview

CopperHead runs a single-elimination Snake tournament. Players register
over a WebSocket, the server pairs them into arenas once the bracket is
full, and each pairing plays a best-of-N match. Winners advance; the
bracket keeps halving until one player remains.

## WebSocket Endpoints

### `/ws/compete`
Register for the tournament bracket. The first message on the socket
must be a JSON object `{"name": "..."}` — anything else closes the
connection with code 4001. Once registered, the server drives the
connection with `match_assigned`, `start`, `state`, `game_over`, and
`match_complete` messages; the client answers with `ready` and `move`.

### `/ws/join`
Auto-matchmaking into the tournament bracket. No `{"name": "..."}`
handshake is required — a name is generated and the connection is
registered into the bracket immediately, same as `/ws/compete`.

### `/ws/{id}`
Join a specific legacy two-player room by numeric slot (1 or 2).

### `/ws/observe`
Spectate. Attaches to the lowest-id active arena, or the lobby if none
exists yet. Send `{"action":"switch_room","room_id":N}` to also watch
another arena, or `{"action":"get_rooms"}` for the current room list.

## Client Messages

- `{"action":"ready","name":"...","mode":"..."}` — signal readiness for the next game.
- `{"action":"move","direction":"up"|"down"|"left"|"right"}` — queue a turn for the next tick.
- `{"action":"switch_room","room_id":N}` — (observers) add a room subscription.
- `{"action":"get_rooms"}` — request the current room list.

## Server Messages

`joined`, `match_assigned`, `start`, `state`, `game_over`,
`match_complete`, `competition_status`, `competition_complete`,
`observer_joined`, `room_list`, `waiting`, `registered`, `error`.

## HTTP Endpoints

- `GET /` — server banner.
- `GET /status` — lobby/room summary.
- `GET /competition` — current bracket snapshot.
- `GET /history` — past championship records.
- `GET /rooms/active` — active arenas.
- `POST /add_bot` — register an internal bot player.

## Close Codes

- `4000` invalid player id
- `4001` name message expected
- `4002` server full
- `4003` competition unavailable
"#;
