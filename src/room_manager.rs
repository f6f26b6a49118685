//! Registry of rooms keyed by arena id (spec.md §4.3): matchmaking,
//! the spectator pool, and round-boundary lifecycle.

use crate::competition::RoundPairingView;
use crate::messages::{RoomListEntry, ServerMessage};
use crate::room::Room;
use crate::state::{AppState, Outbox};
use crate::types::{GameError, GameResult, PlayerSlot};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Arena id reserved for the legacy `/ws/{id}` two-player room, kept
/// outside the `0..arenas` id space used by tournament rounds.
pub const LEGACY_ROOM_ID: usize = usize::MAX;

pub struct RoomManager {
    pub rooms: IndexMap<usize, Arc<Mutex<Room>>>,
    /// Spectators connected via `/ws/observe` before any room exists yet.
    pub lobby_observers: Vec<Outbox>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: IndexMap::new(),
            lobby_observers: Vec::new(),
        }
    }

    /// Legacy `/ws/{id}` entry point: always targets one reserved room
    /// outside the tournament's arena id space, at the literal requested
    /// slot.
    pub async fn connect_legacy_slot(
        &mut self,
        slot: PlayerSlot,
        game_config: crate::engine::GameConfig,
        points_to_win: u32,
        tick_rate: std::time::Duration,
    ) -> GameResult<Arc<Mutex<Room>>> {
        let room = self.rooms.entry(LEGACY_ROOM_ID).or_insert_with(|| {
            Arc::new(Mutex::new(Room::new(LEGACY_ROOM_ID, game_config, points_to_win, tick_rate, 0, 0)))
        });
        let taken = room.lock().await.connections.contains_key(&slot);
        if taken {
            return Err(GameError::RoomFull);
        }
        Ok(room.clone())
    }

    /// Count rooms whose match hasn't completed yet, optionally excluding
    /// one (the room that just finished, before its own flag is visible
    /// to other readers).
    pub async fn rooms_still_playing(&self, exclude: Option<usize>) -> usize {
        let mut count = 0;
        for (&id, room) in &self.rooms {
            if Some(id) == exclude {
                continue;
            }
            if !room.lock().await.match_complete {
                count += 1;
            }
        }
        count
    }

    async fn room_list_entries(&self) -> Vec<RoomListEntry> {
        let mut entries = Vec::with_capacity(self.rooms.len());
        let mut ids: Vec<usize> = self.rooms.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let r = self.rooms[&id].lock().await;
            entries.push(RoomListEntry {
                room_id: id,
                names: (
                    r.connections_name(1),
                    r.connections_name(2),
                ),
                wins: r.wins_snapshot(),
                match_complete: r.match_complete,
            });
        }
        entries
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan a message out to every room's observers and every lobby observer.
pub async fn broadcast_to_all_observers(state: &AppState, message: ServerMessage) {
    let rm = state.room_manager.lock().await;
    for room in rm.rooms.values() {
        room.lock().await.broadcast_to_observers(message.clone());
    }
    for tx in &rm.lobby_observers {
        let _ = tx.send(message.clone());
    }
}

/// Drain all observers into the lobby pool, cancel every running tick
/// task, and delete all rooms. Never called while a room is still
/// mid-match-report (the caller only invokes this after a round's last
/// match has already reported).
pub async fn clear_all_rooms(state: &AppState) {
    let mut rm = state.room_manager.lock().await;
    let ids: Vec<usize> = rm.rooms.keys().copied().collect();
    for id in ids {
        if let Some(room) = rm.rooms.shift_remove(&id) {
            let mut r = room.lock().await;
            let observers = r.take_observers();
            rm.lobby_observers.extend(observers);
            r.abort_tick_task_pub();
        }
    }
}

/// Build one room per pairing for the given round, assign players into
/// it, notify them with `match_assigned`, migrate lobby observers into
/// the new rooms, and broadcast the updated room list.
pub async fn build_rooms_for_round(state: &AppState, pairings: Vec<RoundPairingView>) {
    let (round, total_rounds, points_to_win) = {
        let comp = state.competition.lock().await;
        (comp.current_round, comp.total_rounds, comp.points_to_win)
    };
    let game_config = state.config.game.clone();
    let tick_rate = state.config.tick_rate;

    for (arena_id, pairing) in pairings.into_iter().enumerate() {
        let room = Arc::new(Mutex::new(Room::new(
            arena_id,
            game_config.clone(),
            points_to_win,
            tick_rate,
            round,
            total_rounds,
        )));

        let mut comp = state.competition.lock().await;
        for (slot, uid) in [(1u8, &pairing.p1_uid), (2u8, &pairing.p2_uid)] {
            comp.assign_room(uid, arena_id, slot);
            let Some(player) = comp.players.get(uid) else { continue };
            let opponent_uid = if slot == 1 { &pairing.p2_uid } else { &pairing.p1_uid };
            let opponent_name = comp.players.get(opponent_uid).map(|p| p.name.clone()).unwrap_or_default();
            let name = player.name.clone();
            let conn = player.connection.clone();
            {
                let mut r = room.lock().await;
                r.connect(slot, name, uid.clone(), conn.clone());
            }
            let _ = conn.send(ServerMessage::MatchAssigned {
                room_id: arena_id,
                player_id: slot,
                opponent: opponent_name,
                points_to_win,
            });
        }
        drop(comp);

        let mut rm = state.room_manager.lock().await;
        let lobby_observers = std::mem::take(&mut rm.lobby_observers);
        {
            let mut r = room.lock().await;
            for tx in lobby_observers {
                r.connect_observer(tx);
            }
        }
        rm.rooms.insert(arena_id, room);
    }

    broadcast_room_list(state).await;
}

/// Attach an observer: to the lowest-id active room if one exists,
/// otherwise to the lobby pool awaiting the first room.
pub async fn add_observer(state: &AppState, tx: Outbox) {
    let mut rm = state.room_manager.lock().await;
    let mut ids: Vec<usize> = rm.rooms.keys().copied().collect();
    ids.sort_unstable();
    if let Some(&id) = ids.first() {
        let room = rm.rooms[&id].clone();
        drop(rm);
        room.lock().await.connect_observer(tx);
    } else {
        rm.lobby_observers.push(tx);
    }
}

/// `switch_room`: subscribe an observer to an additional arena. Arenas
/// already subscribed to are unaffected — an observer may watch more
/// than one room at once.
pub async fn switch_observer_room(state: &AppState, room_id: usize, tx: Outbox) -> GameResult<()> {
    let rm = state.room_manager.lock().await;
    let room = rm.rooms.get(&room_id).cloned().ok_or(GameError::NoRoomAvailable)?;
    drop(rm);
    room.lock().await.connect_observer(tx);
    Ok(())
}

/// Build the current `room_list` message for a single requester (the
/// `get_rooms` action), rather than broadcasting to every observer.
pub async fn room_list_snapshot(state: &AppState, current_room: Option<usize>) -> ServerMessage {
    let (round, total_rounds, bye_name) = {
        let comp = state.competition.lock().await;
        let bye_name = comp
            .current_bye_uid
            .as_ref()
            .and_then(|uid| comp.players.get(uid))
            .map(|p| p.name.clone());
        (comp.current_round, comp.total_rounds, bye_name)
    };
    let entries = {
        let rm = state.room_manager.lock().await;
        rm.room_list_entries().await
    };
    ServerMessage::RoomList {
        rooms: entries,
        current_room,
        round,
        total_rounds,
        bye_player: bye_name,
    }
}

async fn broadcast_room_list(state: &AppState) {
    let (round, total_rounds, bye_name) = {
        let comp = state.competition.lock().await;
        let bye_name = comp
            .current_bye_uid
            .as_ref()
            .and_then(|uid| comp.players.get(uid))
            .map(|p| p.name.clone());
        (comp.current_round, comp.total_rounds, bye_name)
    };
    let entries = {
        let rm = state.room_manager.lock().await;
        rm.room_list_entries().await
    };
    let msg = ServerMessage::RoomList {
        rooms: entries,
        current_room: None,
        round,
        total_rounds,
        bye_player: bye_name,
    };
    broadcast_to_all_observers(state, msg).await;
}
