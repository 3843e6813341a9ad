//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, timeout, request ID)
//! - Mount the operations endpoint, breaker status and the bridge upgrade
//! - Run background tasks (bridge relay, records watcher) for the server lifetime
//! - Serve over plain TCP or TLS with graceful shutdown

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use notify::RecommendedWatcher;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

use crate::bridge::SessionMultiplexer;
use crate::bus::EventBus;
use crate::config::validation::BREAKERS_PATH;
use crate::config::GatewayConfig;
use crate::discovery::watcher::apply_updates;
use crate::discovery::{RecordsWatcher, ServiceRegistry};
use crate::downstream::DownstreamResolver;
use crate::gateway::OperationsGateway;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::response::json_reply;
use crate::http::websocket::bridge_upgrade;
use crate::lifecycle::{bootstrap, Shutdown, StartupError};
use crate::observability::metrics;
use crate::resilience::{CircuitBreaker, CircuitState};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<OperationsGateway>,
    pub bridge: Arc<SessionMultiplexer>,
    pub bus: EventBus,
    pub registry: Arc<ServiceRegistry>,
    pub resolver: Arc<DownstreamResolver>,
    pub shutdown: Shutdown,
    pub max_frame_bytes: usize,
    pub started_at: Instant,
}

impl AppState {
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.gateway.breaker()
    }
}

/// Public breaker status entry.
#[derive(Debug, Serialize)]
pub struct BreakerSummary {
    pub name: String,
    pub state: CircuitState,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig, shutdown: Shutdown) -> Result<Self, StartupError> {
        let state = bootstrap(&config, shutdown)?;
        let router = Self::build_router(&config, state.clone());
        Ok(Self { router, config, state })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Validation keeps the breaker deadline below the request timeout, so
    /// `/operations` always answers with a payload before this layer fires.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let bridge_base = config.bridge.path.trim_end_matches('/');
        let bridge_rest = format!("{}/{{*rest}}", bridge_base);

        let mut router = Router::new()
            .route(&config.gateway.operations_path, get(operations_handler))
            .route(BREAKERS_PATH, get(breakers_handler))
            .route(&bridge_rest, get(bridge_upgrade));
        if !bridge_base.is_empty() {
            router = router.route(bridge_base, get(bridge_upgrade));
        }
        if let Some(dir) = &config.gateway.static_dir {
            router = router.fallback_service(ServeDir::new(dir));
        }

        router
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Returns once the shutdown coordinator fires and in-flight requests
    /// have drained.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let Self { router, config, state } = self;
        let background = Background::spawn(&config, &state);

        let mut shutdown_rx = state.shutdown.subscribe();
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        background.stop(&state.shutdown).await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS.
    pub async fn run_tls(self, addr: SocketAddr, tls: RustlsConfig) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let Self { router, config, state } = self;
        let background = Background::spawn(&config, &state);

        let handle = axum_server::Handle::new();
        let drain = Duration::from_secs(config.timeouts.request_secs);
        let mut shutdown_rx = state.shutdown.subscribe();
        let trigger = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown_rx.recv().await;
            trigger.graceful_shutdown(Some(drain));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(router.into_make_service())
            .await?;

        background.stop(&state.shutdown).await;
        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Shared handler state, for the admin router and embedding.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn bus(&self) -> &EventBus {
        &self.state.bus
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.state.breaker()
    }
}

/// Tasks living as long as the server.
struct Background {
    relay: JoinHandle<()>,
    watcher: Option<(RecommendedWatcher, JoinHandle<()>)>,
}

impl Background {
    fn spawn(config: &GatewayConfig, state: &AppState) -> Self {
        let relay = state.bridge.spawn_relay(state.shutdown.subscribe());

        let watcher = match (&config.discovery.records_path, config.discovery.watch) {
            (Some(path), true) => Self::spawn_watcher(Path::new(path), state),
            _ => None,
        };

        Self { relay, watcher }
    }

    fn spawn_watcher(path: &Path, state: &AppState) -> Option<(RecommendedWatcher, JoinHandle<()>)> {
        let (watcher, updates) = RecordsWatcher::new(path);
        let guard = match watcher.run() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(error = %e, path = ?path, "Failed to watch service records");
                return None;
            }
        };

        let resolver = state.resolver.clone();
        let task = tokio::spawn(apply_updates(
            updates,
            state.registry.clone(),
            state.shutdown.subscribe(),
            move || {
                resolver.resolve();
            },
        ));

        Some((guard, task))
    }

    async fn stop(self, shutdown: &Shutdown) {
        shutdown.trigger();
        let _ = self.relay.await;
        if let Some((guard, task)) = self.watcher {
            let _ = task.await;
            drop(guard);
        }
    }
}

/// Operations endpoint. Always answers 200 with a JSON body.
async fn operations_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let start = Instant::now();
    let request_id = headers.request_id();

    let reply = state.gateway.fetch(request_id).await;
    metrics::record_request(reply.outcome.as_str(), start);
    tracing::debug!(
        request_id = request_id.unwrap_or("unknown"),
        outcome = reply.outcome.as_str(),
        "Operations request served"
    );

    json_reply(reply.outcome, reply.body)
}

/// Public breaker status.
async fn breakers_handler(State(state): State<AppState>) -> Json<Vec<BreakerSummary>> {
    let status = state.breaker().status();
    Json(vec![BreakerSummary {
        name: status.name,
        state: status.state,
    }])
}
