//! Shared application state threaded through the gateway, rooms, the room
//! manager, and the competition — the teacher's `AppState` (`server.rs`)
//! generalized to the tournament's several cooperating registries.

use crate::competition::{ChampionshipRecord, Competition};
use crate::engine::GameConfig;
use crate::messages::ServerMessage;
use crate::room_manager::RoomManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Fully-resolved server configuration (CLI flags + optional spec file,
/// merged; see [`crate::config`]).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub arenas: usize,
    pub points_to_win: u32,
    pub reset_delay: Duration,
    pub tick_rate: Duration,
    pub bots: usize,
    pub host: String,
    pub port: u16,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            arenas: crate::constants::ARENAS,
            points_to_win: crate::constants::POINTS_TO_WIN,
            reset_delay: Duration::from_secs(crate::constants::RESET_DELAY_SECS),
            tick_rate: Duration::from_secs_f64(crate::constants::TICK_RATE_SECS),
            bots: crate::constants::BOTS,
            host: crate::constants::SERVER_HOST.to_string(),
            port: crate::constants::SERVER_PORT,
            game: GameConfig::default(),
        }
    }
}

pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub competition: Arc<Mutex<Competition>>,
    pub room_manager: Arc<Mutex<RoomManager>>,
    pub history: Arc<Mutex<Vec<ChampionshipRecord>>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let arenas = config.arenas;
        let points_to_win = config.points_to_win;
        Self {
            config: Arc::new(config),
            competition: Arc::new(Mutex::new(Competition::new(arenas, points_to_win))),
            room_manager: Arc::new(Mutex::new(RoomManager::new())),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }
}
