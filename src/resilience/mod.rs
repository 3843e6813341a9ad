//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway call to downstream:
//!     → circuit_breaker.rs (admit, reject fast, or admit the single half-open trial)
//!     → timeouts.rs (enforce the per-operation deadline)
//!     → circuit_breaker.rs (record outcome, transition, notify hooks)
//!     → fallback value when skipped or failed
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every protected call has a deadline
//! - A timeout is a failure like any other
//! - No retries: an open circuit fails fast instead of hammering the downstream

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, BreakerOptions, BreakerStatus, CircuitBreaker, CircuitState, Transition};
pub use timeouts::with_deadline;
