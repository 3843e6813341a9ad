//! Event bus bridge.
//!
//! # Data Flow
//! ```text
//! Outbound:
//!     EventBus → multiplexer.rs relay loop
//!         → permissions.rs permit(Outbound, address)
//!         → every subscribed session outbox → transport writer
//!
//! Inbound:
//!     transport reader → envelope.rs (decode frame)
//!         → permissions.rs permit(Inbound, address)
//!         → EventBus publish, or `err` frame to the sender only
//! ```
//!
//! # Design Decisions
//! - Default deny in both directions; rules are fixed at startup
//! - Sessions are owned by the multiplexer; transports hold only an id
//! - Reply addresses are not bridged

pub mod envelope;
pub mod multiplexer;
pub mod permissions;
pub mod session;

pub use envelope::{ClientFrame, ServerFrame};
pub use multiplexer::{BridgeError, SessionMultiplexer};
pub use permissions::{Direction, PermissionRule, PermissionTable, RuleError};
pub use session::{SessionId, SessionInfo};
