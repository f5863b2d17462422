//! Story Composer binary
//!
//! Wires up:
//! - the HTTP client to the generation proxy
//! - the in-memory blob store
//! - the single video slot and the storyboard
//! - the HTTP API serving the browser UI

use std::sync::Arc;
use story_composer::adapters::{api, memory::MemoryStore, veo::HttpBackend};
use story_composer::{Studio, StudioConfig};
use tracing::info;

#[tokio::main]
async fn main() {
    let config = StudioConfig::from_env();

    tracing_subscriber::fmt::init();

    // 1. Adapters
    let backend = match HttpBackend::new(&config.backend_url, config.request_timeout) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            eprintln!("Failed to build backend client: {}", e);
            std::process::exit(1);
        }
    };
    let store = Arc::new(MemoryStore::new());

    // 2. Application services
    let address = config.bind_address();
    info!(
        "Generation proxy at {}, polling every {:?}",
        config.backend_url, config.poll_interval
    );
    let studio = Studio::new(config, backend, store);

    // 3. HTTP layer
    let app = api::router(studio);

    // 4. Start server
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind TCP listener on {}: {}", address, e);
            std::process::exit(1);
        }
    };
    println!("Listening at {}", address);
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server failed: {}", e);
        std::process::exit(1);
    }
}
