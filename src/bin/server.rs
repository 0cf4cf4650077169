use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use rusty_relay::auth::provider::JwtAuthProvider;
use rusty_relay::config::RelayConfig;
use rusty_relay::core::hub::create_hub;
use rusty_relay::handlers::{routes, AppState};
use rusty_relay::storage::MemoryMessageStore;

#[tokio::main]
async fn main() {
    // Initialize env
    let env_loaded = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match env_loaded {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Load config from .env
    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, read_idle={:?}, ping={:?}, queue={}",
        config.host,
        config.port,
        config.connection.read_idle_timeout,
        config.connection.keepalive_interval,
        config.connection.outbound_queue_capacity
    );

    let state = AppState {
        hub: create_hub(),
        auth: Arc::new(JwtAuthProvider::new(&config.jwt_secret)),
        messages: Arc::new(MemoryMessageStore::with_capacity(config.history_capacity)),
        settings: config.connection.clone(),
    };

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Rusty Relay server on {}", addr);

    warp::serve(routes(state)).run(addr).await;
}
