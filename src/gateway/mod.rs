//! Gateway subsystem.
//!
//! # Data Flow
//! ```text
//! GET /operations
//!     → handler.rs (resolved record? otherwise "no service" payload)
//!     → CircuitBreaker::execute_with_fallback
//!     → DownstreamClient::call
//!     → downstream body, or fallback.rs payload
//! ```
//!
//! # Design Decisions
//! - Callers always get 200 with a JSON body; failures carry a `message`
//! - The breaker is not consulted when nothing is resolved

pub mod fallback;
pub mod handler;

pub use fallback::FallbackPolicy;
pub use handler::{GatewayReply, OperationsGateway, Outcome};
