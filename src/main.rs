use std::net::SocketAddr;

use tracing::{info, warn};

use sim_stream_backend::{app, AppState, SimConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_target(false)
        .compact()
        .init();

    let config = SimConfig::from_env();
    let state = AppState::new(config);
    let app = app(state.clone());

    let addr = resolve_bind_addr();
    info!("sim-stream backend listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind socket");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .expect("server exited unexpectedly");
}

fn resolve_bind_addr() -> SocketAddr {
    const ENV_VAR: &str = "SIM_STREAM_BIND_ADDR";
    let default = SocketAddr::from(([127, 0, 0, 1], 8787));
    if let Ok(raw_value) = std::env::var(ENV_VAR) {
        match raw_value.parse::<SocketAddr>() {
            Ok(parsed) => return parsed,
            Err(_) => warn!("{ENV_VAR} must be a socket address; got '{raw_value}'"),
        }
    }
    default
}

/// On ctrl-c, force-close every control channel and stop the simulation
/// loop before the server tears the connections down.
async fn shutdown_signal(state: AppState) {
    if tokio::signal::ctrl_c().await.is_ok() {
        let closed = state.shutdown();
        info!("shutdown requested: closed {closed} control channels");
    }
}
