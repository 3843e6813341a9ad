use axum::{extract::State, Json};
use serde::Serialize;

use crate::bridge::SessionInfo;
use crate::http::server::AppState;
use crate::resilience::BreakerStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub services: Vec<String>,
    pub resolved_endpoint: Option<String>,
    pub bridge_sessions: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        services: state.registry.names(),
        resolved_endpoint: state.resolver.current().map(|r| r.endpoint.to_string()),
        bridge_sessions: state.bridge.session_count(),
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerStatus>> {
    Json(vec![state.breaker().status()])
}

pub async fn get_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.bridge.sessions())
}
