//! Minimal internal bot driver.
//!
//! The bot's decision algorithm is explicitly out of scope (spec.md §1) —
//! "any opponent reaching the wire contract suffices". This module
//! registers a bot exactly like a real player and keeps it alive through
//! a match by answering `ready` whenever a new game is assigned; it never
//! turns, so any real opponent (or another bot) simply out-survives it.

use crate::messages::ServerMessage;
use crate::room;
use crate::state::AppState;
use tokio::sync::mpsc;
use tracing::info;

/// Register one bot player against the competition and spawn its driver
/// task. No-op (returns `false`) if the competition isn't accepting
/// registrations.
pub async fn spawn_bot(state: &AppState, index: usize) -> bool {
    let (tx, rx) = mpsc::unbounded_channel::<ServerMessage>();
    let name = format!("Bot-{}", index + 1);
    let registration = {
        let mut comp = state.competition.lock().await;
        comp.register(name.clone(), tx, true)
    };
    let Some((uid, full)) = registration else {
        return false;
    };
    info!("bot {} registered as {}", name, uid);

    let state_clone = state.clone();
    tokio::spawn(async move {
        run_bot(state_clone, rx).await;
    });

    if full {
        room::start_competition(state).await;
    }
    true
}

async fn run_bot(state: AppState, mut rx: mpsc::UnboundedReceiver<ServerMessage>) {
    let mut slot_by_room: std::collections::HashMap<usize, u8> = std::collections::HashMap::new();
    while let Some(msg) = rx.recv().await {
        match msg {
            ServerMessage::MatchAssigned { room_id, player_id, .. } => {
                slot_by_room.insert(room_id, player_id);
                ready_up(&state, room_id, player_id).await;
            }
            ServerMessage::GameOver { room_id, .. } => {
                if let Some(&player_id) = slot_by_room.get(&room_id) {
                    ready_up(&state, room_id, player_id).await;
                }
            }
            _ => {}
        }
    }
}

async fn ready_up(state: &AppState, room_id: usize, player_id: u8) {
    let rm = state.room_manager.lock().await;
    let Some(room) = rm.rooms.get(&room_id).cloned() else { return };
    drop(rm);
    {
        let mut r = room.lock().await;
        r.mark_ready(player_id);
    }
    let competition_in_progress = {
        let comp = state.competition.lock().await;
        comp.state == crate::competition::CompetitionState::InProgress
    };
    room::try_start_game(&room, state, competition_in_progress).await;
}

pub fn validate_difficulty(difficulty: Option<u32>) -> Result<u32, String> {
    match difficulty {
        Some(d) if (1..=10).contains(&d) => Ok(d),
        Some(d) => Err(format!("difficulty {} out of range 1..=10", d)),
        None => Ok(1),
    }
}
