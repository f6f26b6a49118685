//! A single arena: owns one [`Game`], drives its tick loop, and
//! multiplexes player + observer connections (spec.md §4.2).
//!
//! `Room` itself holds no reference back to `RoomManager`/`Competition` —
//! per the ownership design in spec.md §9, the tick loop and message
//! handlers are free functions that take `Arc<Mutex<Room>>` alongside
//! `AppState`, so a `Room` can never form a reference cycle with the
//! registries that own it.

use crate::competition::AdvanceOutcome;
use crate::engine::{Game, GameConfig};
use crate::messages::{PlayerRef, ServerMessage};
use crate::state::{AppState, Outbox};
use crate::types::{Direction, PlayerSlot, PlayerUid};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

/// Guards against starting two tick tasks for the same room at once —
/// the "duplicate-start guard" from spec.md §9, expressed as a small
/// state machine instead of scattered booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickState {
    Idle,
    Running,
    Completed,
}

pub struct Room {
    pub arena_id: usize,
    pub game: Game,
    pub game_config: GameConfig,
    pub points_to_win: u32,
    pub tick_rate: Duration,
    pub round: usize,
    pub total_rounds: usize,

    pub connections: HashMap<PlayerSlot, Outbox>,
    pub observers: Vec<Outbox>,
    pub ready: HashSet<PlayerSlot>,
    pub wins: HashMap<PlayerSlot, u32>,
    pub names: HashMap<PlayerSlot, String>,
    pub player_uids: HashMap<PlayerSlot, PlayerUid>,

    pub match_reported: bool,
    pub match_complete: bool,
    pub tick_state: TickState,
    tick_task: Option<JoinHandle<()>>,
}

impl Room {
    pub fn new(
        arena_id: usize,
        game_config: GameConfig,
        points_to_win: u32,
        tick_rate: Duration,
        round: usize,
        total_rounds: usize,
    ) -> Self {
        Self {
            arena_id,
            game: Game::new(&game_config),
            game_config,
            points_to_win,
            tick_rate,
            round,
            total_rounds,
            connections: HashMap::new(),
            observers: Vec::new(),
            ready: HashSet::new(),
            wins: HashMap::from([(1, 0), (2, 0)]),
            names: HashMap::new(),
            player_uids: HashMap::new(),
            match_reported: false,
            match_complete: false,
            tick_state: TickState::Idle,
            tick_task: None,
        }
    }

    /// A room is waiting for its second player: one connection, and no
    /// game has started yet.
    pub fn is_waiting_for_player(&self) -> bool {
        self.connections.len() == 1 && self.tick_state == TickState::Idle
    }

    fn names_tuple(&self) -> (String, String) {
        (
            self.names.get(&1).cloned().unwrap_or_default(),
            self.names.get(&2).cloned().unwrap_or_default(),
        )
    }

    fn wins_tuple(&self) -> (u32, u32) {
        (
            self.wins.get(&1).copied().unwrap_or(0),
            self.wins.get(&2).copied().unwrap_or(0),
        )
    }

    fn state_message(&self) -> ServerMessage {
        ServerMessage::State {
            game: self.game.snapshot("match", &self.game_config),
            wins: self.wins_tuple(),
            names: self.names_tuple(),
            room_id: self.arena_id,
        }
    }

    /// Fan a message out to every player connection and observer. Failed
    /// sends prune the observer (spec.md §4.2).
    fn broadcast(&mut self, message: ServerMessage) {
        self.connections.retain(|_, tx| tx.send(message.clone()).is_ok());
        self.observers.retain(|tx| tx.send(message.clone()).is_ok());
    }

    pub fn connect_observer(&mut self, tx: Outbox) {
        let _ = tx.send(ServerMessage::ObserverJoined {
            room_id: Some(self.arena_id),
            game: Some(self.game.snapshot("match", &self.game_config)),
            wins: Some(self.wins_tuple()),
            names: Some(self.names_tuple()),
        });
        self.observers.push(tx);
    }

    /// Attach a player channel to a slot and broadcast current state.
    pub fn connect(&mut self, slot: PlayerSlot, name: String, uid: PlayerUid, tx: Outbox) {
        self.connections.insert(slot, tx);
        self.names.insert(slot, name);
        self.player_uids.insert(slot, uid);
        let msg = self.state_message();
        self.broadcast(msg);
    }

    /// A game starts only once both slots are ready and the competition
    /// itself has entered `InProgress`; the caller supplies that flag.
    pub fn can_start(&self, competition_in_progress: bool) -> bool {
        competition_in_progress && self.ready.len() == 2 && self.tick_state == TickState::Idle
    }

    pub fn mark_ready(&mut self, slot: PlayerSlot) {
        self.ready.insert(slot);
    }

    pub fn queue_move(&mut self, slot: PlayerSlot, direction: Direction) {
        self.game.queue_direction(slot, direction, &self.game_config);
    }

    /// Forfeit semantics (spec.md §4.2, preserved per the Open Question in
    /// §9): a disconnect awards the opponent `points_to_win` immediately
    /// whenever the game is mid-tick *or* the competition is still
    /// `InProgress` — intentionally including the pre-game countdown.
    pub fn disconnect(&mut self, slot: PlayerSlot, competition_in_progress: bool) -> Option<ForfeitOutcome> {
        self.connections.remove(&slot);
        self.ready.remove(&slot);

        if self.match_reported {
            return None;
        }
        if self.tick_state == TickState::Idle && !competition_in_progress {
            return None;
        }

        let opponent = if slot == 1 { 2u8 } else { 1u8 };
        if !self.connections.contains_key(&opponent) {
            return None;
        }

        self.wins.insert(opponent, self.points_to_win);
        self.match_reported = true;
        self.match_complete = true;
        self.game.running = false;
        self.abort_tick_task();
        self.tick_state = TickState::Completed;

        Some(ForfeitOutcome {
            winner_slot: opponent,
            winner_uid: self.player_uids.get(&opponent).cloned(),
            loser_uid: self.player_uids.get(&slot).cloned(),
        })
    }

    fn abort_tick_task(&mut self) {
        if let Some(handle) = self.tick_task.take() {
            handle.abort();
        }
        self.tick_state = TickState::Idle;
    }

    /// Cancel any running tick task. Used by `RoomManager::clear_all_rooms`
    /// at round boundaries, after the room's final match report has
    /// already gone out.
    pub fn abort_tick_task_pub(&mut self) {
        self.abort_tick_task();
    }

    pub fn take_observers(&mut self) -> Vec<Outbox> {
        std::mem::take(&mut self.observers)
    }

    pub fn broadcast_to_observers(&mut self, message: ServerMessage) {
        self.observers.retain(|tx| tx.send(message.clone()).is_ok());
    }

    pub fn connections_name(&self, slot: PlayerSlot) -> String {
        self.names.get(&slot).cloned().unwrap_or_default()
    }

    pub fn wins_snapshot(&self) -> (u32, u32) {
        self.wins_tuple()
    }
}

pub struct ForfeitOutcome {
    pub winner_slot: PlayerSlot,
    pub winner_uid: Option<PlayerUid>,
    pub loser_uid: Option<PlayerUid>,
}

/// Try to start the next game of the match once both players are ready
/// and the competition is in progress. Spawns the tick-loop task.
pub async fn try_start_game(room: &Arc<Mutex<Room>>, state: &AppState, competition_in_progress: bool) {
    {
        let mut r = room.lock().await;
        if !r.can_start(competition_in_progress) {
            return;
        }
        r.tick_state = TickState::Running;
        r.game = Game::new(&r.game_config);
        let msg = ServerMessage::Start {
            mode: "match".to_string(),
            room_id: r.arena_id,
            wins: Some(r.wins_tuple()),
            points_to_win: Some(r.points_to_win),
        };
        r.broadcast(msg);
    }

    let room_clone = room.clone();
    let state_clone = state.clone();
    let handle = tokio::spawn(async move {
        run_tick_loop(room_clone, state_clone).await;
    });
    room.lock().await.tick_task = Some(handle);
}

async fn run_tick_loop(room: Arc<Mutex<Room>>, state: AppState) {
    let tick_rate = room.lock().await.tick_rate;
    loop {
        {
            let mut r = room.lock().await;
            let game_config = r.game_config.clone();
            r.game.step(&game_config);
            let msg = r.state_message();
            r.broadcast(msg);
            if !r.game.running {
                finish_game(&mut r);
                break;
            }
        }
        tokio::time::sleep(tick_rate).await;
    }

    let match_complete = room.lock().await.match_complete;
    if match_complete {
        report_match_and_advance(&room, &state).await;
    } else {
        // Match continues: clear ready, pause, then await fresh `ready`
        // for the next game of the same match.
        tokio::time::sleep(Duration::from_secs_f64(crate::constants::INTER_GAME_PAUSE_SECS)).await;
    }
}

/// Apply end-of-game bookkeeping: score the winner, emit `gameover`, and
/// decide whether the match itself is now decided.
fn finish_game(room: &mut Room) {
    let winner = room.game.winner;
    if let Some(slot) = winner {
        *room.wins.entry(slot).or_insert(0) += 1;
    }
    let msg = ServerMessage::GameOver {
        winner,
        wins: room.wins_tuple(),
        names: room.names_tuple(),
        room_id: room.arena_id,
        points_to_win: room.points_to_win,
    };
    room.broadcast(msg);

    let (w1, w2) = room.wins_tuple();
    if w1 >= room.points_to_win || w2 >= room.points_to_win {
        room.match_complete = true;
        room.tick_state = TickState::Completed;
    } else {
        room.ready.clear();
        room.tick_state = TickState::Idle;
    }
    room.tick_task = None;
}

async fn report_match_and_advance(room: &Arc<Mutex<Room>>, state: &AppState) {
    let outcome = {
        let mut r = room.lock().await;
        if r.match_reported {
            return;
        }
        r.match_reported = true;
        let (w1, w2) = r.wins_tuple();
        let winner_slot = if w1 >= r.points_to_win { 1u8 } else { 2u8 };
        let Some(p1_uid) = r.player_uids.get(&1).cloned() else { return };
        let Some(p2_uid) = r.player_uids.get(&2).cloned() else { return };
        let winner_uid = if winner_slot == 1 { p1_uid.clone() } else { p2_uid.clone() };
        let winner_name = r.names.get(&winner_slot).cloned().unwrap_or_default();
        let remaining_matches = remaining_matches_excluding(state, r.arena_id).await;
        let msg = ServerMessage::MatchComplete {
            winner: PlayerRef {
                player_id: winner_slot,
                name: winner_name,
            },
            final_score: (w1, w2),
            room_id: r.arena_id,
            remaining_matches,
            current_round: r.round,
            total_rounds: r.total_rounds,
            forfeit: false,
        };
        r.broadcast(msg);
        (winner_uid, p1_uid, p2_uid, w1, w2)
    };

    let (winner_uid, p1_uid, p2_uid, p1_points, p2_points) = outcome;
    advance_competition(state, winner_uid, p1_uid, p2_uid, p1_points, p2_points).await;
}

async fn remaining_matches_excluding(state: &AppState, exclude_room: usize) -> usize {
    let rm = state.room_manager.lock().await;
    rm.rooms_still_playing(Some(exclude_room)).await
}

/// Handle a player disconnecting from a room: apply forfeit rules if
/// applicable, emit `match_complete {forfeit: true}`, and advance the
/// bracket exactly as a normal match completion would.
pub async fn handle_disconnect(room: &Arc<Mutex<Room>>, state: &AppState, slot: PlayerSlot) {
    let competition_in_progress = {
        let comp = state.competition.lock().await;
        comp.state == crate::competition::CompetitionState::InProgress
    };

    let forfeit = {
        let mut r = room.lock().await;
        r.disconnect(slot, competition_in_progress)
    };
    let Some(forfeit) = forfeit else { return };
    let (Some(winner_uid), Some(loser_uid)) = (forfeit.winner_uid, forfeit.loser_uid) else {
        return;
    };
    let _ = &loser_uid;

    let (winner_slot, p1_uid, p2_uid, w1, w2, round, total_rounds, arena_id, winner_name) = {
        let r = room.lock().await;
        let p1 = r.player_uids.get(&1).cloned().unwrap_or_default();
        let p2 = r.player_uids.get(&2).cloned().unwrap_or_default();
        let (w1, w2) = r.wins_tuple();
        (
            forfeit.winner_slot,
            p1,
            p2,
            w1,
            w2,
            r.round,
            r.total_rounds,
            r.arena_id,
            r.names.get(&forfeit.winner_slot).cloned().unwrap_or_default(),
        )
    };
    let remaining_matches = remaining_matches_excluding(state, arena_id).await;
    {
        let mut r = room.lock().await;
        let msg = ServerMessage::MatchComplete {
            winner: PlayerRef {
                player_id: winner_slot,
                name: winner_name,
            },
            final_score: (w1, w2),
            room_id: arena_id,
            remaining_matches,
            current_round: round,
            total_rounds,
            forfeit: true,
        };
        r.broadcast(msg);
    }

    advance_competition(state, winner_uid, p1_uid, p2_uid, w1, w2).await;
}

/// Invoked after a room reports a match (normal win or forfeit): record
/// the result in the bracket and, if that completed the round, clear all
/// rooms and either declare a champion or set up the next round.
async fn advance_competition(
    state: &AppState,
    winner_uid: PlayerUid,
    p1_uid: PlayerUid,
    p2_uid: PlayerUid,
    p1_points: u32,
    p2_points: u32,
) {
    let outcome = {
        let mut comp = state.competition.lock().await;
        comp.report_match_complete(winner_uid, p1_uid, p2_uid, p1_points, p2_points)
    };
    let Some(outcome) = outcome else { return };

    crate::room_manager::clear_all_rooms(state).await;

    match outcome {
        AdvanceOutcome::Champion(champion_uid) => {
            let (champion_name, player_count, reset_secs) = {
                let comp = state.competition.lock().await;
                (
                    comp.players[&champion_uid].name.clone(),
                    comp.players.len(),
                    state.config.reset_delay.as_secs(),
                )
            };
            {
                let mut history = state.history.lock().await;
                history.push(crate::competition::ChampionshipRecord {
                    champion: champion_name.clone(),
                    players: player_count,
                    timestamp_secs: now_unix(),
                });
            }
            {
                let mut comp = state.competition.lock().await;
                comp.start_reset_countdown(state.config.reset_delay);
            }
            info!("champion declared: {}", champion_name);
            crate::room_manager::broadcast_to_all_observers(
                state,
                ServerMessage::CompetitionComplete {
                    champion: champion_name,
                    reset_in: reset_secs,
                },
            )
            .await;

            let state_clone = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(state_clone.config.reset_delay).await;
                let mut comp = state_clone.competition.lock().await;
                comp.state = crate::competition::CompetitionState::Resetting;
                comp.reset();
            });
        }
        AdvanceOutcome::NextRound { pairings, bye } => {
            let snapshot = {
                let comp = state.competition.lock().await;
                comp.snapshot(None)
            };
            if let Some(bye_uid) = &bye {
                let comp = state.competition.lock().await;
                if let Some(player) = comp.players.get(bye_uid) {
                    info!("{} received a bye into round {}", player.name, comp.current_round);
                }
            }
            crate::room_manager::broadcast_to_all_observers(state, ServerMessage::CompetitionStatus(snapshot))
                .await;

            tokio::time::sleep(Duration::from_secs_f64(crate::constants::ROUND_ANNOUNCE_PAUSE_SECS)).await;
            crate::room_manager::build_rooms_for_round(state, pairings).await;
        }
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Called by the gateway when `/ws/compete` registration fills the
/// competition: kick off round 1.
pub async fn start_competition(state: &AppState) {
    let pairings = {
        let mut comp = state.competition.lock().await;
        comp.start_first_round()
    };
    crate::room_manager::build_rooms_for_round(state, pairings).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GameConfig;
    use tokio::sync::mpsc::unbounded_channel;

    fn test_room() -> Room {
        let config = GameConfig {
            grid_width: 10,
            grid_height: 10,
            ..Default::default()
        };
        Room::new(0, config, 3, Duration::from_millis(10), 1, 1)
    }

    fn connect_both(room: &mut Room) -> (tokio::sync::mpsc::UnboundedReceiver<ServerMessage>, tokio::sync::mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx1, rx1) = unbounded_channel();
        let (tx2, rx2) = unbounded_channel();
        room.connect(1, "alice".into(), "P1".into(), tx1);
        room.connect(2, "bob".into(), "P2".into(), tx2);
        (rx1, rx2)
    }

    #[test]
    fn a_single_connection_is_waiting_for_a_player() {
        let mut room = test_room();
        let (tx, _rx) = unbounded_channel();
        room.connect(1, "alice".into(), "P1".into(), tx);
        assert!(room.is_waiting_for_player());
    }

    #[test]
    fn cannot_start_until_both_ready_and_competition_in_progress() {
        let mut room = test_room();
        let (_rx1, _rx2) = connect_both(&mut room);
        assert!(!room.can_start(true));
        room.mark_ready(1);
        assert!(!room.can_start(true));
        room.mark_ready(2);
        assert!(room.can_start(true));
        assert!(!room.can_start(false));
    }

    #[tokio::test]
    async fn try_start_game_spawns_the_tick_loop_and_runs_to_completion() {
        let mut room = test_room();
        let (mut rx1, _rx2) = connect_both(&mut room);
        room.mark_ready(1);
        room.mark_ready(2);
        let room = Arc::new(Mutex::new(room));
        let state = AppState::new(crate::state::ServerConfig::default());

        try_start_game(&room, &state, true).await;
        assert_eq!(room.lock().await.tick_state, TickState::Running);

        let mut saw_start = false;
        while let Some(msg) = rx1.recv().await {
            if matches!(msg, ServerMessage::Start { .. }) {
                saw_start = true;
                break;
            }
        }
        assert!(saw_start);
    }

    #[test]
    fn disconnect_before_competition_starts_does_not_forfeit() {
        let mut room = test_room();
        let (_rx1, _rx2) = connect_both(&mut room);
        let outcome = room.disconnect(1, false);
        assert!(outcome.is_none());
    }

    #[test]
    fn disconnect_mid_tick_awards_the_opponent_and_aborts_the_tick_task() {
        let mut room = test_room();
        let (_rx1, _rx2) = connect_both(&mut room);
        room.game.running = true;

        let outcome = room.disconnect(1, true).expect("opponent still connected");
        assert_eq!(outcome.winner_slot, 2);
        assert_eq!(room.wins.get(&2), Some(&room.points_to_win));
        assert!(room.match_complete);
        assert_eq!(room.tick_state, TickState::Completed);
    }

    #[test]
    fn disconnect_during_pregame_countdown_still_forfeits_per_spec() {
        let mut room = test_room();
        let (_rx1, _rx2) = connect_both(&mut room);
        // Game not yet running, but the competition itself is in progress —
        // spec.md §9's Open Question is resolved in favor of still forfeiting.
        let outcome = room.disconnect(1, true);
        assert!(outcome.is_some());
    }

    #[test]
    fn disconnect_after_match_already_reported_is_a_no_op() {
        let mut room = test_room();
        let (_rx1, _rx2) = connect_both(&mut room);
        room.match_reported = true;
        assert!(room.disconnect(1, true).is_none());
    }
}
