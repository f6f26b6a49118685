//! The single-elimination bracket (spec.md §4.4).
//!
//! `Competition` owns `PlayerInfo` records across rounds; `RoomManager`
//! owns `Room`s. A `PlayerInfo` only ever references a room by its arena
//! id, resolved through `RoomManager` on use (spec.md §9) — this avoids
//! the ownership cycle a naive `PlayerInfo -> Room -> PlayerInfo` model
//! would create, and sidesteps stale references across `clearAllRooms`.

use crate::messages::ServerMessage;
use crate::types::PlayerUid;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionState {
    WaitingForPlayers,
    InProgress,
    Complete,
    Resetting,
}

/// A recorded match outcome. A Bye is a self-pairing:
/// `p1_uid == p2_uid == winner_uid`, points 0/0.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub p1_uid: PlayerUid,
    pub p2_uid: PlayerUid,
    pub winner_uid: PlayerUid,
    pub p1_points: u32,
    pub p2_points: u32,
}

pub struct PlayerInfo {
    pub name: String,
    pub connection: mpsc::UnboundedSender<ServerMessage>,
    pub is_bot: bool,
    pub match_wins: u32,
    pub game_points: u32,
    pub opponent_points: u32,
    pub eliminated: bool,
    pub current_room: Option<usize>,
    pub current_player_id: Option<u8>,
    pub last_match_finish_time: Instant,
}

/// One completed championship; survives `Competition::reset`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChampionshipRecord {
    pub champion: String,
    pub players: usize,
    pub timestamp_secs: u64,
}

/// Wire view of the bracket for `/competition` and `competition_status`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompetitionSnapshot {
    pub state: CompetitionState,
    pub round: usize,
    pub total_rounds: usize,
    pub players: usize,
    pub required: usize,
    pub champion: Option<String>,
    pub points_to_win: u32,
    pub bye_player: Option<String>,
    pub reset_in: Option<u64>,
}

/// A round's pairing in terms of player uids, for building rooms.
#[derive(Debug, Clone)]
pub struct RoundPairingView {
    pub p1_uid: PlayerUid,
    pub p2_uid: PlayerUid,
}

pub struct Competition {
    pub state: CompetitionState,
    pub players: indexmap::IndexMap<PlayerUid, PlayerInfo>,
    /// `rounds[n]` is round n+1's pairings, each a pair of uids (indices
    /// into `players` are not stable across removal, so we store uids).
    pub rounds: Vec<Vec<(PlayerUid, PlayerUid)>>,
    pub match_results: Vec<Vec<MatchResult>>,
    /// Parallel to `rounds`/`match_results`: the Bye player for that round,
    /// if any. Needed so `report_match_complete` knows a round's expected
    /// result count includes the Bye's synthetic self-win.
    byes: Vec<Option<PlayerUid>>,
    pub champion_uid: Option<PlayerUid>,
    pub current_bye_uid: Option<PlayerUid>,
    pub arenas: usize,
    pub required: usize,
    pub current_round: usize,
    pub total_rounds: usize,
    pub points_to_win: u32,
    next_uid: usize,
    reset_deadline: Option<Instant>,
}

impl Competition {
    pub fn new(arenas: usize, points_to_win: u32) -> Self {
        let required = arenas * 2;
        Self {
            state: CompetitionState::WaitingForPlayers,
            players: indexmap::IndexMap::new(),
            rounds: Vec::new(),
            match_results: Vec::new(),
            byes: Vec::new(),
            champion_uid: None,
            current_bye_uid: None,
            arenas,
            required,
            current_round: 0,
            total_rounds: total_rounds_for(required),
            points_to_win,
            next_uid: 1,
            reset_deadline: None,
        }
    }

    /// Record when the reset countdown started, so `/competition` can
    /// report the remaining seconds without a dedicated timer task.
    pub fn start_reset_countdown(&mut self, delay: std::time::Duration) {
        self.reset_deadline = Some(Instant::now() + delay);
    }

    pub fn reset_in_secs(&self) -> Option<u64> {
        self.reset_deadline.map(|d| d.saturating_duration_since(Instant::now()).as_secs())
    }

    pub fn snapshot(&self, reset_in: Option<u64>) -> CompetitionSnapshot {
        CompetitionSnapshot {
            state: self.state,
            round: self.current_round,
            total_rounds: self.total_rounds,
            players: self.players.len(),
            required: self.required,
            champion: self.champion_uid.as_ref().map(|uid| self.players[uid].name.clone()),
            points_to_win: self.points_to_win,
            bye_player: self
                .current_bye_uid
                .as_ref()
                .map(|uid| self.players[uid].name.clone()),
            reset_in,
        }
    }

    /// Register a new player. Only valid while `WaitingForPlayers`.
    /// Returns the assigned uid and whether the competition is now full
    /// (the caller transitions to `InProgress` and starts round 1).
    pub fn register(
        &mut self,
        name: String,
        connection: mpsc::UnboundedSender<ServerMessage>,
        is_bot: bool,
    ) -> Option<(PlayerUid, bool)> {
        if self.state != CompetitionState::WaitingForPlayers {
            return None;
        }
        let uid = format!("P{}", self.next_uid);
        self.next_uid += 1;
        self.players.insert(
            uid.clone(),
            PlayerInfo {
                name,
                connection,
                is_bot,
                match_wins: 0,
                game_points: 0,
                opponent_points: 0,
                eliminated: false,
                current_room: None,
                current_player_id: None,
                last_match_finish_time: Instant::now(),
            },
        );
        let full = self.players.len() == self.required;
        if full {
            self.state = CompetitionState::InProgress;
        }
        self.broadcast_lobby_status();
        Some((uid, full))
    }

    /// Tell every registered player how the lobby is filling up
    /// (spec.md §4.4's "Registration ... broadcast `lobby_status`").
    fn broadcast_lobby_status(&self) {
        let msg = ServerMessage::LobbyStatus {
            registered: self.players.len(),
            required: self.required,
        };
        for player in self.players.values() {
            let _ = player.connection.send(msg.clone());
        }
    }

    /// Build round 1's pairings: shuffle all uids, pair adjacently.
    pub fn start_first_round(&mut self) -> Vec<RoundPairingView> {
        let mut uids: Vec<PlayerUid> = self.players.keys().cloned().collect();
        uids.shuffle(&mut rand::thread_rng());
        self.current_round = 1;
        self.current_bye_uid = None;
        let pairs: Vec<(PlayerUid, PlayerUid)> = uids
            .chunks_exact(2)
            .map(|c| (c[0].clone(), c[1].clone()))
            .collect();
        self.rounds.push(pairs.clone());
        self.match_results.push(Vec::new());
        self.byes.push(None);
        pairs
            .into_iter()
            .map(|(p1_uid, p2_uid)| RoundPairingView { p1_uid, p2_uid })
            .collect()
    }

    /// Record a match result and, if the round is now complete, advance.
    /// Returns `Some(AdvanceOutcome)` when the round just completed.
    pub fn report_match_complete(
        &mut self,
        winner_uid: PlayerUid,
        p1_uid: PlayerUid,
        p2_uid: PlayerUid,
        p1_points: u32,
        p2_points: u32,
    ) -> Option<AdvanceOutcome> {
        let round_idx = self.current_round.saturating_sub(1);
        if self.match_results.get(round_idx).is_none() {
            warn!("report_match_complete with no active round");
            return None;
        }
        if !self.players.contains_key(&winner_uid) {
            warn!("winner uid {} not found in players at report time", winner_uid);
            return None;
        }
        if !self.players.contains_key(&p1_uid) || !self.players.contains_key(&p2_uid) {
            warn!("match participants {}/{} not both found in players at report time", p1_uid, p2_uid);
            return None;
        }

        self.match_results[round_idx].push(MatchResult {
            p1_uid: p1_uid.clone(),
            p2_uid: p2_uid.clone(),
            winner_uid: winner_uid.clone(),
            p1_points,
            p2_points,
        });

        let loser_uid = if winner_uid == p1_uid { p2_uid.clone() } else { p1_uid.clone() };
        let now = Instant::now();
        let winner = self.players.get_mut(&winner_uid).expect("checked above");
        winner.match_wins += 1;
        winner.game_points += if winner_uid == p1_uid { p1_points } else { p2_points };
        winner.opponent_points += if winner_uid == p1_uid { p2_points } else { p1_points };
        winner.last_match_finish_time = now;
        if loser_uid != winner_uid {
            if let Some(loser) = self.players.get_mut(&loser_uid) {
                loser.game_points += if loser_uid == p1_uid { p1_points } else { p2_points };
                loser.opponent_points += if loser_uid == p1_uid { p2_points } else { p1_points };
                loser.eliminated = true;
                loser.current_room = None;
                loser.current_player_id = None;
            }
        }

        let expected = self.rounds[round_idx].len() + if self.byes[round_idx].is_some() { 1 } else { 0 };
        if self.match_results[round_idx].len() < expected {
            return None;
        }
        Some(self.advance())
    }

    /// Record the current Bye player's synthetic self-win for this round.
    pub fn record_bye_result(&mut self, bye_uid: PlayerUid) {
        let round_idx = self.current_round.saturating_sub(1);
        if let Some(player) = self.players.get_mut(&bye_uid) {
            player.last_match_finish_time = Instant::now();
        }
        if let Some(results) = self.match_results.get_mut(round_idx) {
            results.push(MatchResult {
                p1_uid: bye_uid.clone(),
                p2_uid: bye_uid.clone(),
                winner_uid: bye_uid,
                p1_points: 0,
                p2_points: 0,
            });
        }
    }

    /// Collect the round's winners (including a self-paired Bye) and
    /// either declare a champion or set up the next round's pairing.
    fn advance(&mut self) -> AdvanceOutcome {
        let round_idx = self.current_round.saturating_sub(1);
        let winners: Vec<PlayerUid> = self.match_results[round_idx]
            .iter()
            .map(|r| r.winner_uid.clone())
            .collect();
        self.current_bye_uid = None;

        if winners.len() == 1 {
            let champion = winners[0].clone();
            self.champion_uid = Some(champion.clone());
            self.state = CompetitionState::Complete;
            return AdvanceOutcome::Champion(champion);
        }

        self.current_round += 1;
        let (pairings, bye) = self.pair_for_round(winners);
        self.rounds.push(
            pairings
                .iter()
                .map(|p| (p.p1_uid.clone(), p.p2_uid.clone()))
                .collect(),
        );
        self.match_results.push(Vec::new());
        self.byes.push(bye.clone());
        if let Some(bye_uid) = bye.clone() {
            self.current_bye_uid = Some(bye_uid.clone());
            self.record_bye_result(bye_uid);
        }
        AdvanceOutcome::NextRound { pairings, bye }
    }

    /// Select a Bye if the participant count is odd
    /// (`(-gamePoints, lastMatchFinishTime ascending, uniform random)`),
    /// then shuffle and pair the remainder adjacently.
    fn pair_for_round(
        &self,
        mut participants: Vec<PlayerUid>,
    ) -> (Vec<RoundPairingView>, Option<PlayerUid>) {
        let bye = if participants.len() % 2 == 1 {
            let mut candidates = participants.clone();
            candidates.sort_by(|a, b| {
                let pa = &self.players[a];
                let pb = &self.players[b];
                pb.game_points
                    .cmp(&pa.game_points)
                    .then(pa.last_match_finish_time.cmp(&pb.last_match_finish_time))
            });
            let top_points = self.players[&candidates[0]].game_points;
            let top_time = self.players[&candidates[0]].last_match_finish_time;
            let tied: Vec<&PlayerUid> = candidates
                .iter()
                .take_while(|uid| {
                    let p = &self.players[*uid];
                    p.game_points == top_points && p.last_match_finish_time == top_time
                })
                .collect();
            let chosen = if tied.len() > 1 {
                tied[rand::thread_rng().gen_range(0..tied.len())].clone()
            } else {
                candidates[0].clone()
            };
            participants.retain(|uid| uid != &chosen);
            Some(chosen)
        } else {
            None
        };

        participants.shuffle(&mut rand::thread_rng());
        let pairings = participants
            .chunks_exact(2)
            .map(|c| RoundPairingView {
                p1_uid: c[0].clone(),
                p2_uid: c[1].clone(),
            })
            .collect();
        (pairings, bye)
    }

    pub fn assign_room(&mut self, uid: &PlayerUid, room_id: usize, player_id: u8) {
        if let Some(player) = self.players.get_mut(uid) {
            player.current_room = Some(room_id);
            player.current_player_id = Some(player_id);
        }
    }

    /// Wipe all per-competition state and return to `WaitingForPlayers`.
    /// `championship_history` is owned by the caller and is not touched.
    pub fn reset(&mut self) {
        let arenas = self.arenas;
        let points_to_win = self.points_to_win;
        *self = Competition::new(arenas, points_to_win);
        info!("competition reset, awaiting {} players", self.required);
    }
}

pub enum AdvanceOutcome {
    Champion(PlayerUid),
    NextRound {
        pairings: Vec<RoundPairingView>,
        bye: Option<PlayerUid>,
    },
}

pub fn total_rounds_for(required_players: usize) -> usize {
    let mut rounds = 0usize;
    let mut n = 1usize;
    while n < required_players {
        n *= 2;
        rounds += 1;
    }
    rounds.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_conn() -> mpsc::UnboundedSender<ServerMessage> {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    fn registered(arenas: usize, n: usize) -> Competition {
        let mut comp = Competition::new(arenas, 5);
        for i in 0..n {
            comp.register(format!("player{i}"), dummy_conn(), false);
        }
        comp
    }

    #[test]
    fn bracket_of_ten_runs_to_champion() {
        let mut comp = registered(5, 10);
        assert_eq!(comp.state, CompetitionState::InProgress);
        assert_eq!(comp.total_rounds, 4);

        let mut pairings = comp.start_first_round();
        let mut bye_rounds = 0;
        loop {
            let mut outcome = None;
            for p in &pairings {
                let result = comp.report_match_complete(
                    p.p1_uid.clone(),
                    p.p1_uid.clone(),
                    p.p2_uid.clone(),
                    1,
                    0,
                );
                if result.is_some() {
                    outcome = result;
                }
            }
            match outcome.expect("round must produce an outcome") {
                AdvanceOutcome::Champion(champion) => {
                    assert!(comp.players.contains_key(&champion));
                    break;
                }
                AdvanceOutcome::NextRound { pairings: next, bye } => {
                    if bye.is_some() {
                        bye_rounds += 1;
                    }
                    pairings = next;
                }
            }
        }
        assert_eq!(comp.state, CompetitionState::Complete);
        assert!(bye_rounds >= 1, "10-player bracket must produce at least one bye");
    }

    #[test]
    fn bye_player_is_highest_scorer() {
        let mut comp = registered(5, 10);
        let pairings = comp.start_first_round();
        for (i, p) in pairings.iter().enumerate() {
            let winner = p.p1_uid.clone();
            let outcome = comp.report_match_complete(winner, p.p1_uid.clone(), p.p2_uid.clone(), (i as u32) + 1, 0);
            if let Some(AdvanceOutcome::NextRound { bye, .. }) = outcome {
                let bye_uid = bye.expect("5 winners is odd, bye expected");
                let bye_points = comp.players[&bye_uid].game_points;
                let max_points = comp.players.values().map(|p| p.game_points).max().unwrap();
                assert_eq!(bye_points, max_points);
            }
        }
    }

    #[test]
    fn registration_transitions_to_in_progress_only_when_full() {
        let mut comp = Competition::new(1, 5);
        let (uid1, full1) = comp.register("a".into(), dummy_conn(), false).unwrap();
        assert!(!full1);
        assert_eq!(comp.state, CompetitionState::WaitingForPlayers);
        let (_uid2, full2) = comp.register("b".into(), dummy_conn(), false).unwrap();
        assert!(full2);
        assert_eq!(comp.state, CompetitionState::InProgress);
        assert_ne!(uid1, _uid2);
    }

    #[test]
    fn reset_preserves_nothing_but_bumps_no_history() {
        let mut comp = registered(1, 2);
        let pairings = comp.start_first_round();
        let p = &pairings[0];
        comp.report_match_complete(p.p1_uid.clone(), p.p1_uid.clone(), p.p2_uid.clone(), 5, 0);
        assert_eq!(comp.state, CompetitionState::Complete);
        comp.reset();
        assert_eq!(comp.state, CompetitionState::WaitingForPlayers);
        assert_eq!(comp.players.len(), 0);
        assert!(comp.champion_uid.is_none());
    }

    #[test]
    fn registration_broadcasts_lobby_status_to_every_registered_player() {
        let mut comp = Competition::new(1, 5);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        comp.register("a".into(), tx_a, false);
        assert!(matches!(
            rx_a.try_recv(),
            Ok(ServerMessage::LobbyStatus { registered: 1, required: 2 })
        ));

        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        comp.register("b".into(), tx_b, false);
        assert!(matches!(
            rx_a.try_recv(),
            Ok(ServerMessage::LobbyStatus { registered: 2, required: 2 })
        ));
        assert!(matches!(
            rx_b.try_recv(),
            Ok(ServerMessage::LobbyStatus { registered: 2, required: 2 })
        ));
    }

    #[test]
    fn report_with_unknown_winner_uid_is_rejected_without_recording_a_result() {
        let mut comp = registered(1, 2);
        let pairings = comp.start_first_round();
        let p = &pairings[0];

        let outcome = comp.report_match_complete("P999".to_string(), p.p1_uid.clone(), p.p2_uid.clone(), 5, 0);
        assert!(outcome.is_none());
        assert!(comp.match_results[0].is_empty(), "malformed report must not be recorded");

        // A valid report for the same pairing must still complete the round.
        let outcome = comp.report_match_complete(p.p1_uid.clone(), p.p1_uid.clone(), p.p2_uid.clone(), 5, 0);
        assert!(outcome.is_some());
    }
}
