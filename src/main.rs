//! Entry point for the CopperHead tournament server.

mod bot;
mod competition;
mod config;
mod constants;
mod docs;
mod engine;
mod messages;
mod room;
mod room_manager;
mod server;
mod state;
mod types;

use clap::Parser;
use state::AppState;
use std::net::SocketAddr;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "copperhead_server=info,tower_http=info".into()),
        )
        .init();

    let cli = config::Cli::parse();
    let server_config = config::resolve(cli);

    info!("Starting CopperHead tournament server");
    info!(
        "{} arena(s), first to {} points, {:?} per tick",
        server_config.arenas, server_config.points_to_win, server_config.tick_rate
    );

    let host = server_config.host.clone();
    let port = server_config.port;
    let bots = server_config.bots;
    let state = AppState::new(server_config);

    for index in 0..bots {
        bot::spawn_bot(&state, index).await;
    }

    let app = server::create_app(state);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

    info!("Listening on http://{}", addr);
    info!("  - {}  tournament registration", constants::WS_COMPETE_ENDPOINT);
    info!("  - {}  auto-matchmaking into the bracket", constants::WS_JOIN_ENDPOINT);
    info!("  - {}  spectator", constants::WS_OBSERVE_ENDPOINT);
    info!("  - /swagger     API docs");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {}: {}", addr, err);
            std::process::exit(1);
        }
    };
    if let Err(err) = axum::serve(listener, app).await {
        error!("server error: {}", err);
        std::process::exit(1);
    }
}
