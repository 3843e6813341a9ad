//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap fallible futures with a deadline
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - The timed-out future is dropped, which cancels its I/O; a late
//!   result can never be observed

use std::future::Future;
use std::time::Duration;

/// Run `fut` with a deadline, mapping expiry through `on_elapsed`.
pub async fn with_deadline<F, T, E>(
    limit: Duration,
    fut: F,
    on_elapsed: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_elapsed(limit)),
    }
}
