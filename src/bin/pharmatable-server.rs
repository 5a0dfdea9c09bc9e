//! Pharmatable WebSocket Server
//!
//! Serves the pharmacy record tables to browser clients over WebSocket.

use pharmatable::config::Settings;
use pharmatable::server::run_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::load()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    run_server(settings).await
}
