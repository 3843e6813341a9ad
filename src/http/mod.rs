//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, routes)
//!     → request.rs (request ID set and propagated)
//!     → /operations → gateway → response.rs (200 application/json)
//!     → /breakers → breaker status
//!     → {bridge path}/* → websocket.rs (bridge session)
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
