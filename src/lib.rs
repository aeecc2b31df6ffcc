//! Real-time simulation frame server: a background loop steps a simulation
//! at a fixed tick rate, renders and encodes each tick, and serves the
//! latest frame to any number of streaming viewers while WebSocket control
//! channels mutate the simulation's inputs between ticks.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod controls;
pub mod encode;
pub mod engine;
pub mod error;
pub mod frame;
pub mod lifecycle;
pub mod registry;
mod sim_loop;
pub mod stream;
pub mod ws;

pub use config::SimConfig;
pub use engine::{EngineFactory, PlaygroundEngine, SimulationEngine};
pub use lifecycle::{EngineStatus, LifecycleCoordinator, ReadyOutcome};
pub use registry::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: SimConfig,
    pub coordinator: Arc<LifecycleCoordinator>,
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    /// Server state backed by the bundled playground engine.
    pub fn new(config: SimConfig) -> Self {
        let factory = PlaygroundEngine::factory(config.width, config.height);
        Self::with_factory(config, factory)
    }

    /// Server state with a caller-supplied engine factory.
    pub fn with_factory(config: SimConfig, factory: EngineFactory) -> Self {
        let coordinator = LifecycleCoordinator::new(config.clone(), factory);
        Self {
            config,
            coordinator,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Teardown used by shutdown and hot reload: force-close every control
    /// channel, then ask the simulation loop to exit.
    pub fn shutdown(&self) -> usize {
        let closed = self.registry.close_all();
        self.coordinator.shutdown();
        closed
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sim/video_feed", get(stream::video_feed))
        .route("/sim/ws", get(ws::ws_control_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
