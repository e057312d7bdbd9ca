use std::env;

use gridclash::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), GridclashError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind = env::var("GRIDCLASH_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let mut rooms = RoomConfig::default();
    if let Ok(raw) = env::var("GRIDCLASH_TURN_SECS") {
        match raw.parse() {
            Ok(secs) => rooms = rooms.with_turn_secs(secs),
            Err(_) => tracing::warn!(value = %raw, "ignoring invalid GRIDCLASH_TURN_SECS"),
        }
    }
    tracing::info!(%bind, turn_secs = rooms.turn_secs, "starting gridclash server");

    let server = GridclashServerBuilder::new()
        .bind(&bind)
        .room_config(rooms)
        .build(DevAuthenticator::new())
        .await?;
    server.run().await
}
