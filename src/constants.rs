//! Default tunables for the tournament server.
//!
//! All of these can be overridden by CLI flags or a JSON spec file; see
//! [`crate::config`].

pub const GRID_WIDTH: i32 = 30;
pub const GRID_HEIGHT: i32 = 20;

pub const TICK_RATE_SECS: f64 = 0.15;
pub const POINTS_TO_WIN: u32 = 5;
pub const ARENAS: usize = 1;
pub const RESET_DELAY_SECS: u64 = 10;
pub const BOTS: usize = 0;

pub const SERVER_HOST: &str = "0.0.0.0";
pub const SERVER_PORT: u16 = 8765;

pub const MAX_ROOMS: usize = 10;
pub const MAX_INPUT_QUEUE: usize = 3;

pub const FRUIT_WARNING_TICKS: u32 = 0;
pub const MAX_FRUITS: usize = 3;
pub const FRUIT_INTERVAL_TICKS: u32 = 20;

/// Pause between the end of one game and the next `ready` round in a match.
pub const INTER_GAME_PAUSE_SECS: f64 = 3.0;
/// Pause between broadcasting `competition_status` for a new round and
/// actually building that round's rooms, so observers can read the bracket.
pub const ROUND_ANNOUNCE_PAUSE_SECS: f64 = 5.0;

pub const WS_JOIN_ENDPOINT: &str = "/ws/join";
pub const WS_OBSERVE_ENDPOINT: &str = "/ws/observe";
pub const WS_COMPETE_ENDPOINT: &str = "/ws/compete";

pub const DEFAULT_SETTINGS_FILE: &str = "server-settings.json";
