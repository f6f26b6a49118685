//! WebSocket + HTTP gateway (spec.md §4.5, §6).
//!
//! Four streaming endpoints, six JSON endpoints. Each connection runs a
//! dedicated writer task draining its own outbound channel — the
//! teacher's one-writer-per-connection convention — and a receive loop
//! that dispatches parsed envelopes into `Room`/`Competition`/`RoomManager`.

use crate::bot;
use crate::constants::{WS_COMPETE_ENDPOINT, WS_JOIN_ENDPOINT, WS_OBSERVE_ENDPOINT};
use crate::docs::{ApiDoc, API_DOCUMENTATION};
use crate::messages::{ClientMessage, CompeteHello, ServerMessage};
use crate::room::{self, Room};
use crate::room_manager;
use crate::state::AppState;
use crate::types::{close_code, PlayerSlot};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitStream, StreamExt},
};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/competition", get(competition_snapshot))
        .route("/history", get(history))
        .route("/rooms/active", get(rooms_active))
        .route("/add_bot", post(add_bot))
        .route("/docs", get(docs_page))
        .route(WS_JOIN_ENDPOINT, get(ws_join))
        .route(WS_OBSERVE_ENDPOINT, get(ws_observe))
        .route(WS_COMPETE_ENDPOINT, get(ws_compete))
        .route("/ws/:id", get(ws_legacy))
        .merge(SwaggerUi::new("/swagger").url("/api-spec.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------
// HTTP JSON endpoints
// ---------------------------------------------------------------------

#[utoipa::path(get, path = "/", tag = "status", responses((status = 200, description = "Server banner")))]
pub(crate) async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "name": "copperhead", "status": "ok" }))
}

#[utoipa::path(get, path = "/status", tag = "status", responses((status = 200, description = "Lobby and room summary")))]
pub(crate) async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let comp_snapshot = {
        let comp = state.competition.lock().await;
        comp.snapshot(comp.reset_in_secs())
    };
    let rooms = room_manager::room_list_snapshot(&state, None).await;
    Json(serde_json::json!({
        "arenas": state.config.arenas,
        "points_to_win": state.config.points_to_win,
        "competition": comp_snapshot,
        "rooms": rooms,
    }))
}

#[utoipa::path(get, path = "/competition", tag = "competition", responses((status = 200, description = "Current bracket snapshot", body = CompetitionSnapshot)))]
pub(crate) async fn competition_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    let comp = state.competition.lock().await;
    Json(comp.snapshot(comp.reset_in_secs()))
}

#[utoipa::path(get, path = "/history", tag = "competition", responses((status = 200, description = "Past championship records")))]
pub(crate) async fn history(State(state): State<AppState>) -> impl IntoResponse {
    let history = state.history.lock().await;
    Json(serde_json::json!({ "championships": *history }))
}

#[utoipa::path(get, path = "/rooms/active", tag = "status", responses((status = 200, description = "Active arenas")))]
pub(crate) async fn rooms_active(State(state): State<AppState>) -> impl IntoResponse {
    let rm = state.room_manager.lock().await;
    let mut ids: Vec<usize> = rm
        .rooms
        .keys()
        .copied()
        .filter(|&id| id != room_manager::LEGACY_ROOM_ID)
        .collect();
    ids.sort_unstable();
    let mut rooms = Vec::with_capacity(ids.len());
    for id in ids {
        let r = rm.rooms[&id].lock().await;
        rooms.push(serde_json::json!({
            "room_id": id,
            "names": (r.connections_name(1), r.connections_name(2)),
            "wins": r.wins_snapshot(),
        }));
    }
    Json(serde_json::json!({ "rooms": rooms }))
}

#[derive(Debug, Deserialize)]
struct AddBotParams {
    difficulty: Option<u32>,
}

#[utoipa::path(post, path = "/add_bot", tag = "status", params(("difficulty" = Option<u32>, Query, description = "1..=10, defaults to 1")), responses((status = 200, description = "Bot registration result")))]
pub(crate) async fn add_bot(State(state): State<AppState>, Query(params): Query<AddBotParams>) -> impl IntoResponse {
    match bot::validate_difficulty(params.difficulty) {
        Err(message) => Json(serde_json::json!({ "success": false, "message": message })),
        Ok(difficulty) => {
            let index = state.competition.lock().await.players.len();
            let spawned = bot::spawn_bot(&state, index).await;
            if spawned {
                Json(serde_json::json!({
                    "success": true,
                    "message": format!("bot added at difficulty {}", difficulty),
                }))
            } else {
                Json(serde_json::json!({ "success": false, "message": "competition not accepting registrations" }))
            }
        }
    }
}

async fn docs_page() -> impl IntoResponse {
    Html(format!("<pre>{}</pre>", API_DOCUMENTATION))
}

// ---------------------------------------------------------------------
// WebSocket endpoints
// ---------------------------------------------------------------------

async fn ws_join(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_join(socket, state))
}

async fn ws_observe(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_observe(socket, state))
}

async fn ws_compete(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_compete(socket, state))
}

async fn ws_legacy(ws: WebSocketUpgrade, Path(id): Path<String>, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_legacy(socket, id, state))
}

fn spawn_writer(mut socket_tx: futures_util::stream::SplitSink<WebSocket, Message>) -> mpsc::UnboundedSender<ServerMessage> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&message) {
                if socket_tx.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });
    tx
}

/// `/ws/join`: auto-matchmaking into the bracket. Unlike `/ws/compete`,
/// no `{name}` handshake is required — a name is generated and
/// registration proceeds immediately.
async fn handle_join(socket: WebSocket, state: AppState) {
    let name = format!("Player_{}", uuid::Uuid::new_v4());
    run_competition_connection(socket, state, name).await;
}

/// `/ws/observe`: read-only subscriber, optionally switching arenas.
async fn handle_observe(socket: WebSocket, state: AppState) {
    let (socket_tx, mut socket_rx) = socket.split();
    let tx = spawn_writer(socket_tx);
    room_manager::add_observer(&state, tx.clone()).await;

    let mut current_room = None;
    while let Some(Ok(msg)) = socket_rx.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) else {
            continue;
        };
        match client_msg {
            ClientMessage::SwitchRoom { room_id } => {
                if room_manager::switch_observer_room(&state, room_id, tx.clone()).await.is_ok() {
                    current_room = Some(room_id);
                }
            }
            ClientMessage::GetRooms => {
                let _ = tx.send(room_manager::room_list_snapshot(&state, current_room).await);
            }
            _ => {}
        }
    }
}

/// `/ws/compete`: explicit bracket registration. The first inbound
/// message must be `{name}`; anything else closes with 4001.
async fn handle_compete(mut socket: WebSocket, state: AppState) {
    let hello = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<CompeteHello>(&text) {
                Ok(hello) => break hello,
                Err(_) => {
                    close_socket(socket, close_code::NAME_EXPECTED, "name message expected").await;
                    return;
                }
            },
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            _ => {
                close_socket(socket, close_code::NAME_EXPECTED, "name message expected").await;
                return;
            }
        }
    };
    run_competition_connection(socket, state, hello.name).await;
}

/// Shared bracket-registration flow for `/ws/join` and `/ws/compete`:
/// register with `Competition` using a throwaway probe channel so a full
/// bracket can be closed with 4003 before a writer task exists, patch in
/// the real connection once the socket is split, then dispatch
/// `ready`/`move`/`get_rooms`/`switch_room` against whatever room the
/// bracket has assigned this uid to.
async fn run_competition_connection(socket: WebSocket, state: AppState, name: String) {
    let (tx_probe, _rx_probe) = mpsc::unbounded_channel::<ServerMessage>();
    let registration = {
        let mut comp = state.competition.lock().await;
        comp.register(name.clone(), tx_probe, false)
    };
    let Some((uid, full)) = registration else {
        close_socket(socket, close_code::COMPETITION_UNAVAILABLE, "competition unavailable").await;
        return;
    };

    let (socket_tx, mut socket_rx) = socket.split();
    let tx = spawn_writer(socket_tx);
    {
        let mut comp = state.competition.lock().await;
        if let Some(player) = comp.players.get_mut(&uid) {
            player.connection = tx.clone();
        }
    }
    info!("{} registered as {}", name, uid);

    let snapshot = {
        let comp = state.competition.lock().await;
        comp.snapshot(comp.reset_in_secs())
    };
    let _ = tx.send(ServerMessage::Registered {
        uid: uid.clone(),
        name,
        competition_status: snapshot,
    });

    if full {
        room::start_competition(&state).await;
    }

    while let Some(Ok(msg)) = socket_rx.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) else {
            continue;
        };
        let assignment = {
            let comp = state.competition.lock().await;
            comp.players
                .get(&uid)
                .and_then(|p| Some((p.current_room?, p.current_player_id?)))
        };
        match client_msg {
            ClientMessage::Ready { .. } => {
                if let Some((room_id, slot)) = assignment {
                    if let Some(room) = get_room(&state, room_id).await {
                        room.lock().await.mark_ready(slot);
                        room::try_start_game(&room, &state, true).await;
                    }
                }
            }
            ClientMessage::Move { direction } => {
                if let Some((room_id, slot)) = assignment {
                    if let Some(room) = get_room(&state, room_id).await {
                        room.lock().await.queue_move(slot, direction);
                    }
                }
            }
            ClientMessage::GetRooms => {
                let _ = tx.send(room_manager::room_list_snapshot(&state, assignment.map(|(r, _)| r)).await);
            }
            ClientMessage::SwitchRoom { room_id } => {
                let _ = room_manager::switch_observer_room(&state, room_id, tx.clone()).await;
            }
        }
    }

    let assignment = {
        let comp = state.competition.lock().await;
        comp.players
            .get(&uid)
            .and_then(|p| Some((p.current_room?, p.current_player_id?)))
    };
    if let Some((room_id, slot)) = assignment {
        if let Some(room) = get_room(&state, room_id).await {
            room::handle_disconnect(&room, &state, slot).await;
        }
    }
}

/// `/ws/{id}`: legacy fixed-slot entry point, `id ∈ {1,2}`.
async fn handle_legacy(socket: WebSocket, id: String, state: AppState) {
    let Ok(slot @ (1 | 2)) = id.parse::<PlayerSlot>() else {
        close_socket(socket, close_code::INVALID_PLAYER_ID, "invalid player id").await;
        return;
    };

    let (socket_tx, mut socket_rx) = socket.split();
    let tx = spawn_writer(socket_tx);

    let room = {
        let mut rm = state.room_manager.lock().await;
        rm.connect_legacy_slot(slot, state.config.game.clone(), state.config.points_to_win, state.config.tick_rate)
            .await
    };
    let room = match room {
        Ok(r) => r,
        Err(_) => {
            let _ = tx.send(ServerMessage::Error {
                message: "slot taken".to_string(),
            });
            return;
        }
    };

    let name = format!("Player{}", slot);
    let opponent_present = {
        let mut r = room.lock().await;
        r.connect(slot, name, String::new(), tx.clone());
        r.connections.len() == 2
    };
    let _ = tx.send(ServerMessage::Joined {
        room_id: room_manager::LEGACY_ROOM_ID,
        player_id: slot,
    });
    if !opponent_present {
        let _ = tx.send(ServerMessage::Waiting {
            message: "waiting for opponent".to_string(),
        });
    }

    run_room_receive_loop(&mut socket_rx, &state, &room, slot, &tx, true).await;
    room::handle_disconnect(&room, &state, slot).await;
}

async fn close_socket(mut socket: WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        })))
        .await;
}

async fn get_room(state: &AppState, room_id: usize) -> Option<Arc<Mutex<Room>>> {
    state.room_manager.lock().await.rooms.get(&room_id).cloned()
}

/// Receive loop for `/ws/{id}`: dispatches directly against one known
/// room/slot, outside the bracket.
async fn run_room_receive_loop(
    socket_rx: &mut SplitStream<WebSocket>,
    state: &AppState,
    room: &Arc<Mutex<Room>>,
    slot: PlayerSlot,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    competition_in_progress: bool,
) {
    while let Some(Ok(msg)) = socket_rx.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) else {
            continue;
        };
        match client_msg {
            ClientMessage::Ready { name, .. } => {
                if let Some(name) = name {
                    room.lock().await.names.insert(slot, name);
                }
                room.lock().await.mark_ready(slot);
                room::try_start_game(room, state, competition_in_progress).await;
            }
            ClientMessage::Move { direction } => {
                room.lock().await.queue_move(slot, direction);
            }
            ClientMessage::GetRooms => {
                let arena_id = room.lock().await.arena_id;
                let _ = tx.send(room_manager::room_list_snapshot(state, Some(arena_id)).await);
            }
            ClientMessage::SwitchRoom { .. } => {}
        }
    }
}
