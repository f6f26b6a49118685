//! CLI flags + optional JSON spec file, merged into a [`ServerConfig`]
//! (spec.md §6). CLI flags override the file; the file overrides
//! defaults. Config problems are logged and defaulted, never fatal.

use crate::state::ServerConfig;
use crate::types::{FruitConfig, FruitType};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "copperhead-server", about = "Single-elimination Snake tournament server")]
pub struct Cli {
    /// JSON file with the same fields as the CLI flags, plus fruit tuning.
    pub spec_file: Option<PathBuf>,

    #[arg(long)]
    pub arenas: Option<usize>,
    #[arg(long = "points-to-win")]
    pub points_to_win: Option<u32>,
    #[arg(long = "reset-delay")]
    pub reset_delay: Option<u64>,
    /// `WxH`, e.g. `30x20`.
    #[arg(long = "grid-size")]
    pub grid_size: Option<String>,
    #[arg(long)]
    pub speed: Option<f64>,
    #[arg(long)]
    pub bots: Option<usize>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
}

/// Mirrors the JSON shape a `spec_file` may supply: the same tunables as
/// the CLI, plus fruit-type overrides the CLI has no flags for.
#[derive(Debug, Default, Deserialize)]
struct SpecFile {
    arenas: Option<usize>,
    points_to_win: Option<u32>,
    reset_delay: Option<u64>,
    grid_width: Option<i32>,
    grid_height: Option<i32>,
    speed: Option<f64>,
    bots: Option<usize>,
    host: Option<String>,
    port: Option<u16>,
    fruit_warning: Option<u32>,
    max_fruits: Option<usize>,
    fruit_interval: Option<u32>,
    fruits: Option<HashMap<FruitType, FruitConfig>>,
}

fn load_spec_file(path: &Path) -> SpecFile {
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(spec) => spec,
            Err(err) => {
                warn!("ignoring malformed spec file {}: {}", path.display(), err);
                SpecFile::default()
            }
        },
        Err(err) => {
            warn!("could not read spec file {}: {}", path.display(), err);
            SpecFile::default()
        }
    }
}

fn parse_grid_size(raw: &str) -> Option<(i32, i32)> {
    let (w, h) = raw.split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

/// Resolve CLI flags + an optional spec file (explicit, or the
/// default-named file if present) into a complete [`ServerConfig`].
pub fn resolve(cli: Cli) -> ServerConfig {
    let default_path = PathBuf::from(crate::constants::DEFAULT_SETTINGS_FILE);
    let spec_path = cli.spec_file.clone().or_else(|| default_path.exists().then_some(default_path));
    let spec = spec_path.as_deref().map(load_spec_file).unwrap_or_default();

    let mut config = ServerConfig::default();

    config.arenas = cli
        .arenas
        .or(spec.arenas)
        .unwrap_or(config.arenas)
        .clamp(1, crate::constants::MAX_ROOMS);
    config.points_to_win = cli.points_to_win.or(spec.points_to_win).unwrap_or(config.points_to_win).max(1);
    config.reset_delay = Duration::from_secs(cli.reset_delay.or(spec.reset_delay).unwrap_or(config.reset_delay.as_secs()));
    config.bots = cli.bots.or(spec.bots).unwrap_or(config.bots);
    config.host = cli.host.or(spec.host).unwrap_or(config.host);
    config.port = cli.port.or(spec.port).unwrap_or(config.port);

    let speed = cli.speed.or(spec.speed).unwrap_or(config.tick_rate.as_secs_f64());
    config.tick_rate = if speed > 0.0 {
        Duration::from_secs_f64(speed)
    } else {
        warn!("ignoring non-positive --speed {}, keeping default", speed);
        config.tick_rate
    };

    let cli_grid = cli.grid_size.as_deref().and_then(parse_grid_size);
    if cli.grid_size.is_some() && cli_grid.is_none() {
        warn!("ignoring malformed --grid-size {:?}, expected WxH", cli.grid_size);
    }
    let (grid_width, grid_height) = cli_grid
        .or(match (spec.grid_width, spec.grid_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        })
        .unwrap_or((config.game.grid_width, config.game.grid_height));
    config.game.grid_width = grid_width.max(5);
    config.game.grid_height = grid_height.max(5);

    config.game.fruit_warning = spec.fruit_warning.unwrap_or(config.game.fruit_warning);
    config.game.max_fruits = spec.max_fruits.unwrap_or(config.game.max_fruits);
    config.game.fruit_interval = spec.fruit_interval.unwrap_or(config.game.fruit_interval);
    if let Some(fruits) = spec.fruits {
        for (kind, cfg) in fruits {
            config.game.fruits.insert(kind, cfg);
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_size_parses_wxh() {
        assert_eq!(parse_grid_size("30x20"), Some((30, 20)));
        assert_eq!(parse_grid_size("bogus"), None);
    }

    #[test]
    fn cli_overrides_defaults() {
        let cli = Cli {
            spec_file: None,
            arenas: Some(4),
            points_to_win: None,
            reset_delay: None,
            grid_size: Some("40x40".into()),
            speed: None,
            bots: None,
            host: None,
            port: None,
        };
        let config = resolve(cli);
        assert_eq!(config.arenas, 4);
        assert_eq!(config.game.grid_width, 40);
        assert_eq!(config.game.grid_height, 40);
    }
}
