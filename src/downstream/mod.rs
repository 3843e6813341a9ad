//! Downstream call subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway handler:
//!     → resolver.rs (current record, or none)
//!     → client.rs (GET, classify failure, bound body)
//!     → error.rs (connection / response / server / timeout)
//! ```
//!
//! # Design Decisions
//! - "No service" is an `Option` at resolution time, never an error
//! - Every non-2xx status counts as a failure

pub mod client;
pub mod error;
pub mod resolver;

pub use client::DownstreamClient;
pub use error::DownstreamError;
pub use resolver::DownstreamResolver;
