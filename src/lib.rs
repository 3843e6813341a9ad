//! Resilient service gateway.
//!
//! Forwards operations requests to a downstream service behind a circuit
//! breaker with timeout and fallback, and bridges a filtered subset of the
//! internal event bus to external WebSocket clients.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;

// Gateway path
pub mod discovery;
pub mod downstream;
pub mod gateway;
pub mod resilience;

// Event bus bridge
pub mod bridge;
pub mod bus;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
