//! Mapvote Back binary entrypoint wiring the data store, the game server, background tasks and
//! the REST API.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use rand::{SeedableRng, rngs::StdRng};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mapvote_back::{
    config::ConfigHandle,
    dao::vote_store::json_file::JsonFileStore,
    routes,
    services::{
        game_server,
        match_watch,
        publisher::LogPublisher,
        round_timer,
        scheduler::VoteScheduler,
    },
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ConfigHandle::load();
    let snapshot = config.current();

    let store = JsonFileStore::open(snapshot.data_dir.clone())
        .await
        .context("opening data directory")?;

    let game_server = game_server::client_for(snapshot.crcon.as_ref());

    let app_state = AppState::new(
        config,
        Arc::new(store),
        game_server,
        Arc::new(LogPublisher),
        StdRng::from_os_rng(),
    );

    spawn_background_tasks(&app_state).await;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Re-arm timers of rounds left open, then start the scheduler and the match watcher.
async fn spawn_background_tasks(state: &SharedState) {
    if let Err(err) = round_timer::rearm_open_rounds(state).await {
        error!(error = %err, "failed to re-arm open rounds");
    }

    tokio::spawn(VoteScheduler::new(state.clone()).run());
    tokio::spawn(match_watch::run(state.clone()));
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
