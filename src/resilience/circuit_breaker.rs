//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: downstream assumed down, requests fail fast to the fallback
//! - Half-Open: a single trial request tests whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count reaches max_failures
//! Open → Half-Open: reset_timeout elapsed (checked on the next dispatch)
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails (reset clock restarts)
//! ```
//!
//! # Design Decisions
//! - One mutex-guarded core per breaker; it is never held across an await
//! - Trial admission happens under the lock, so only one trial is in flight
//! - A trial abandoned by its caller counts as a failed trial
//! - Hooks run after the lock is released and must not block

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerOptions {
    /// Consecutive failures that trip the circuit.
    pub max_failures: u32,
    /// Deadline for a single protected operation.
    pub operation_timeout: Duration,
    /// Time spent open before a trial is admitted.
    pub reset_timeout: Duration,
    /// Serve the fallback for individual failures while closed.
    pub fallback_on_failure: bool,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            max_failures: 5,
            operation_timeout: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(30),
            fallback_on_failure: false,
        }
    }
}

impl From<&BreakerConfig> for BreakerOptions {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            max_failures: config.max_failures.max(1),
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            fallback_on_failure: config.fallback_on_failure,
        }
    }
}

/// Why a protected operation did not produce a value.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Synthetic: the circuit is open and the operation was not attempted.
    #[error("circuit {name:?} is open")]
    Open { name: String },

    /// The operation did not resolve within the operation timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation itself failed.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BreakerError::Open { .. } => "circuit_open",
            BreakerError::Timeout(_) => "timeout",
            BreakerError::Operation(_) => "operation",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }
}

/// Read-only view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
}

/// A state change, handed to registered hooks.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
    /// Status right after the transition.
    pub status: BreakerStatus,
}

type Hook = Arc<dyn Fn(&Transition) + Send + Sync>;

#[derive(Debug)]
struct Core {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Call,
    Trial,
    Reject,
}

struct Failure<E> {
    error: BreakerError<E>,
    fallback: bool,
}

/// A named guard around one protected operation.
pub struct CircuitBreaker {
    name: String,
    options: BreakerOptions,
    core: Mutex<Core>,
    /// (target state filter, hook). `None` matches every transition.
    hooks: Vec<(Option<CircuitState>, Hook)>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("core", &self.core)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, options: BreakerOptions) -> Self {
        Self {
            name: name.into(),
            options,
            core: Mutex::new(Core {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            hooks: Vec::new(),
        }
    }

    /// Build a breaker from its configuration section.
    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(config.name.clone(), BreakerOptions::from(config))
    }

    /// Register a hook for every Closed/Half-Open → Open transition.
    pub fn on_open(self, hook: impl Fn(&Transition) + Send + Sync + 'static) -> Self {
        self.with_hook(Some(CircuitState::Open), hook)
    }

    /// Register a hook for every Open → Half-Open transition.
    pub fn on_half_open(self, hook: impl Fn(&Transition) + Send + Sync + 'static) -> Self {
        self.with_hook(Some(CircuitState::HalfOpen), hook)
    }

    /// Register a hook for every Half-Open → Closed transition.
    pub fn on_close(self, hook: impl Fn(&Transition) + Send + Sync + 'static) -> Self {
        self.with_hook(Some(CircuitState::Closed), hook)
    }

    /// Register a hook for every transition.
    pub fn on_transition(self, hook: impl Fn(&Transition) + Send + Sync + 'static) -> Self {
        self.with_hook(None, hook)
    }

    fn with_hook(mut self, target: Option<CircuitState>, hook: impl Fn(&Transition) + Send + Sync + 'static) -> Self {
        self.hooks.push((target, Arc::new(hook)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &BreakerOptions {
        &self.options
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn status(&self) -> BreakerStatus {
        let core = self.lock();
        self.snapshot(&core)
    }

    /// Run `op` under breaker protection without a fallback.
    ///
    /// An open circuit yields [`BreakerError::Open`] without invoking `op`.
    pub async fn execute<T, E, Op, Fut>(&self, op: Op) -> Result<T, BreakerError<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.dispatch(op).await.map_err(|failure| failure.error)
    }

    /// Run `op` under breaker protection, serving `fallback` when it is skipped or fails.
    ///
    /// The fallback runs when the circuit is open, when a half-open trial
    /// fails, and on closed-state failures if `fallback_on_failure` is set.
    /// Only a closed-state failure with `fallback_on_failure` unset resolves
    /// to `Err`.
    pub async fn execute_with_fallback<T, E, Op, Fut, Fb>(&self, op: Op, fallback: Fb) -> Result<T, BreakerError<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: FnOnce(BreakerError<E>) -> T,
    {
        match self.dispatch(op).await {
            Ok(value) => Ok(value),
            Err(Failure { error, fallback: true }) => Ok(fallback(error)),
            Err(Failure { error, .. }) => Err(error),
        }
    }

    async fn dispatch<T, E, Op, Fut>(&self, op: Op) -> Result<T, Failure<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit();
        if admission == Admission::Reject {
            tracing::debug!(breaker = %self.name, "Circuit open, operation skipped");
            metrics::record_breaker_call(&self.name, "rejected");
            return Err(Failure {
                error: BreakerError::Open { name: self.name.clone() },
                fallback: true,
            });
        }

        let settlement = Settlement {
            breaker: self,
            admission,
            settled: false,
        };
        let outcome = with_deadline(
            self.options.operation_timeout,
            async move { op().await.map_err(BreakerError::Operation) },
            BreakerError::Timeout,
        )
        .await;
        settlement.settle(outcome.is_ok());

        match outcome {
            Ok(value) => {
                metrics::record_breaker_call(&self.name, "success");
                Ok(value)
            }
            Err(error) => {
                tracing::debug!(
                    breaker = %self.name,
                    trial = admission == Admission::Trial,
                    kind = error.kind(),
                    "Protected operation failed"
                );
                metrics::record_breaker_call(&self.name, error.kind());
                Err(Failure {
                    error,
                    fallback: admission == Admission::Trial || self.options.fallback_on_failure,
                })
            }
        }
    }

    fn admit(&self) -> Admission {
        let mut core = self.lock();
        let mut transition = None;

        let admission = match core.state {
            CircuitState::Closed => Admission::Call,
            CircuitState::Open => {
                let elapsed = core
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.options.reset_timeout);
                if elapsed {
                    core.state = CircuitState::HalfOpen;
                    core.trial_in_flight = true;
                    transition = Some(self.transition(&core, CircuitState::Open));
                    Admission::Trial
                } else {
                    Admission::Reject
                }
            }
            CircuitState::HalfOpen => {
                if core.trial_in_flight {
                    Admission::Reject
                } else {
                    core.trial_in_flight = true;
                    Admission::Trial
                }
            }
        };

        drop(core);
        if let Some(transition) = transition {
            self.notify(&transition);
        }
        admission
    }

    fn settle(&self, admission: Admission, success: bool) {
        let mut core = self.lock();
        let from = core.state;

        let changed = match admission {
            Admission::Trial => {
                core.trial_in_flight = false;
                if core.state != CircuitState::HalfOpen {
                    false
                } else if success {
                    core.state = CircuitState::Closed;
                    core.failure_count = 0;
                    core.opened_at = None;
                    true
                } else {
                    core.state = CircuitState::Open;
                    core.opened_at = Some(Instant::now());
                    true
                }
            }
            // Results of calls admitted before the circuit left Closed are ignored.
            Admission::Call if core.state == CircuitState::Closed => {
                if success {
                    core.failure_count = 0;
                    false
                } else {
                    core.failure_count = core.failure_count.saturating_add(1);
                    if core.failure_count >= self.options.max_failures {
                        core.state = CircuitState::Open;
                        core.opened_at = Some(Instant::now());
                        true
                    } else {
                        false
                    }
                }
            }
            Admission::Call | Admission::Reject => false,
        };

        let transition = changed.then(|| self.transition(&core, from));
        drop(core);
        if let Some(transition) = transition {
            self.notify(&transition);
        }
    }

    fn transition(&self, core: &Core, from: CircuitState) -> Transition {
        Transition {
            from,
            to: core.state,
            status: self.snapshot(core),
        }
    }

    fn notify(&self, transition: &Transition) {
        match transition.to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %transition.from,
                failures = transition.status.failure_count,
                "Circuit opened"
            ),
            CircuitState::HalfOpen => tracing::info!(breaker = %self.name, "Circuit half-open, admitting trial"),
            CircuitState::Closed => tracing::info!(breaker = %self.name, "Circuit closed"),
        }
        metrics::record_breaker_transition(&self.name, transition.to);

        for (target, hook) in &self.hooks {
            if target.map_or(true, |state| state == transition.to) {
                hook(transition);
            }
        }
    }

    fn snapshot(&self, core: &Core) -> BreakerStatus {
        BreakerStatus {
            name: self.name.clone(),
            state: core.state,
            failure_count: core.failure_count,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reports the outcome of an admitted call exactly once.
///
/// Dropping an unsettled trial (the caller gave up on the future) counts as a
/// failed trial so the half-open slot is released.
struct Settlement<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl Settlement<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.settle(self.admission, success);
    }
}

impl Drop for Settlement<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            tracing::debug!(breaker = %self.breaker.name, "Trial abandoned before completion");
            self.breaker.settle(Admission::Trial, false);
        }
    }
}
