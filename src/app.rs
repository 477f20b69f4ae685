use crate::handlers;
use crate::state::AppState;
use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/health", get(handlers::health))
        .route("/api/visitors", get(handlers::get_count))
        .route("/api/visitors/increment", post(handlers::increment))
        .route("/api/visitors/analytics", get(handlers::get_analytics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
