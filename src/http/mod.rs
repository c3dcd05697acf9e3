pub mod error;
pub mod handlers;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::feed::FeedService;

#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedService>,
    pub heartbeat: Duration,
    /// Ends open push streams so graceful shutdown can complete.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(feed: Arc<FeedService>, heartbeat: Duration, shutdown: CancellationToken) -> Self {
        Self { feed, heartbeat, shutdown }
    }
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/odds", get(handlers::list_odds))
        .route("/odds/frame", get(handlers::snapshot_frame))
        .route("/odds/stream", get(stream::sse_stream))
        .route("/odds/ws", get(stream::ws_upgrade));

    Router::new()
        .nest("/api", api_routes)
        .route("/healthz", get(handlers::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
