//! HTTP server for the offsetting engine.
//!
//! Configuration comes from the environment; see [`offset_exchange::config`] and
//! [`offset_exchange::auth`].

use std::sync::Arc;

use log::{error, info, warn};
use offset_exchange::api;
use offset_exchange::auth::AuthConfig;
use offset_exchange::config::ServerConfig;
use offset_exchange::persistence::FilePersistence;
use offset_exchange::registry::{InMemoryDirectory, StaticCities};
use offset_exchange::Engine;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let _ = env_logger::try_init();
    let config = ServerConfig::from_env();

    let directory = Arc::new(InMemoryDirectory::from_list(&config.users));
    if directory.is_empty() {
        warn!("USERS is empty; every posting will be rejected as an unknown user");
    }
    let cities = Arc::new(StaticCities::major_cities());

    let persistence = config.state_file.as_ref().map(|p| FilePersistence::new(p));
    // An unreadable state file is never replaced by an empty one.
    let restored = match persistence.as_ref().map(|p| p.load()) {
        Some(Ok(state)) => state,
        Some(Err(e)) => {
            error!("could not load state file {:?}: {}", config.state_file, e);
            std::process::exit(1);
        }
        None => None,
    };
    let engine = match restored {
        Some(state) => {
            info!("restored {} transactions from state file", state.store.transactions.len());
            Engine::from_state(config.engine.clone(), directory, cities, state)
        }
        None => Engine::new(config.engine.clone(), directory, cities),
    };

    let app = api::create_router(Arc::new(engine), AuthConfig::from_env(), persistence);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await.expect("bind");
    info!("listening on http://{}", addr);
    axum::serve(listener, app.into_make_service())
        .await
        .expect("serve");
}
