//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! [[discovery.services]] (static) + records file (optional)
//!     → record.rs (validate name and endpoint)
//!     → registry.rs (immutable snapshot, atomically swapped)
//!     → downstream resolver looks up the gateway's service by name
//!
//! On records file change (watch = true):
//!     watcher.rs detects change
//!     → reload and validate file
//!     → swap registry snapshot
//!     → downstream resolver re-resolves
//! ```
//!
//! # Design Decisions
//! - Lookup yields an explicit `Option`; absence is not an error
//! - A failed reload keeps the previous snapshot
//! - The records file's directory is watched so atomic replaces are seen
//! - Only plain `http` endpoints are accepted

pub mod record;
pub mod registry;
pub mod watcher;

pub use record::{DiscoveryError, ServiceRecord};
pub use registry::ServiceRegistry;
pub use watcher::RecordsWatcher;
