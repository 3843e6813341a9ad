//! Admin API, served on its own listener.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState, api_key: &str) -> Router {
    let api_key: Arc<str> = Arc::from(api_key);
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/sessions", get(get_sessions))
        .layer(middleware::from_fn_with_state(api_key, admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin router until the shutdown coordinator fires.
pub async fn serve_admin(listener: TcpListener, state: AppState, api_key: &str) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    let mut shutdown_rx = state.shutdown.subscribe();
    let router = setup_admin_router(state, api_key);

    tracing::info!(address = %addr, "Admin API listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::GatewayConfig;
    use crate::lifecycle::{bootstrap, Shutdown};

    const KEY: &str = "admin-test-key";

    fn state() -> AppState {
        bootstrap(&GatewayConfig::default(), Shutdown::new()).unwrap()
    }

    async fn call(state: &AppState, path: &str, authorization: Option<&str>) -> (StatusCode, Option<Value>) {
        let mut request = Request::get(path);
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }
        let response = setup_admin_router(state.clone(), KEY)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&body).ok())
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let state = state();
        let bearer = format!("Bearer {}", KEY);

        assert_eq!(call(&state, "/admin/status", None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            call(&state, "/admin/status", Some("Bearer wrong-key")).await.0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(call(&state, "/admin/status", Some(KEY)).await.0, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&state, "/admin/status", Some(&bearer)).await;
        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        assert_eq!(body["status"], "operational");
        assert_eq!(body["bridge_sessions"], 0);
        assert_eq!(body["resolved_endpoint"], Value::Null);
    }

    #[tokio::test]
    async fn test_breakers_include_failure_count() {
        let state = state();
        let _ = state.breaker().execute(|| async { Err::<(), _>("down") }).await;

        let (status, body) = call(&state, "/admin/breakers", Some(&format!("Bearer {}", KEY))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body.unwrap(),
            json!([{"name": "http-breaker", "state": "CLOSED", "failureCount": 1}])
        );
    }

    #[tokio::test]
    async fn test_sessions_listing() {
        let state = state();
        let (id, _outbox) = state.bridge.connect();

        let (status, body) = call(&state, "/admin/sessions", Some(&format!("Bearer {}", KEY))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap(), json!([{"id": id.to_string(), "subscriptions": []}]));
    }
}
