use crate::errors::AppError;
use crate::models::{
    AnalyticsResponse, CountResponse, HealthResponse, IncrementRequest, IncrementResponse,
    NewVisit,
};
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    Json,
};
use std::net::SocketAddr;

pub async fn index() -> &'static str {
    "Visitor Counter API is running"
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.service.health())
}

pub async fn get_count(State(state): State<AppState>) -> Result<Json<CountResponse>, AppError> {
    let count = state
        .service
        .count()
        .await
        .map_err(|err| AppError::store("Failed to fetch visitor count", err))?;

    Ok(Json(CountResponse { count }))
}

pub async fn increment(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Option<Json<IncrementRequest>>,
) -> Result<Json<IncrementResponse>, AppError> {
    let page_url = payload
        .and_then(|Json(body)| body.page_url)
        .unwrap_or_default();

    let visit = NewVisit {
        client_key: client_key(&headers, peer.map(|ConnectInfo(addr)| addr)),
        user_agent: header_value(&headers, header::USER_AGENT.as_str()),
        page_url,
        referrer: header_value(&headers, header::REFERER.as_str()).unwrap_or_default(),
    };

    let response = state
        .service
        .increment(visit)
        .await
        .map_err(|err| AppError::store("Failed to increment visitor count", err))?;

    Ok(Json(response))
}

pub async fn get_analytics(
    State(state): State<AppState>,
) -> Result<Json<AnalyticsResponse>, AppError> {
    let analytics = state
        .service
        .analytics()
        .await
        .map_err(|err| AppError::store("Failed to fetch analytics", err))?;

    Ok(Json(analytics))
}

/// First hop of `X-Forwarded-For`, falling back to the socket peer.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = header_value(headers, "x-forwarded-for").and_then(|value| {
        value
            .split(',')
            .next()
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .map(str::to_string)
    });

    forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
