//! Client-side poller: a cancellable state machine that re-reads an
//! aggregate condition until it holds or a wall-clock budget runs out.
//!
//! Replaces ad hoc timer chains with one explicit loop: `idle -> polling ->
//! {ready | timed_out}`, plus cancellation back to `idle`. On `timed_out`
//! the caller is expected to offer a manual "continue" action instead of
//! polling forever.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// The poller's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Ready,
    TimedOut,
}

/// How a poll run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The awaited condition was observed.
    Ready,
    /// The wall-clock budget expired before the condition held.
    TimedOut,
    /// The cancellation token fired (navigation away / unmount).
    Cancelled,
}

/// Poll cadence and budget.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between probes.
    pub interval: Duration,
    /// Maximum wall-clock time to keep polling.
    pub budget: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            budget: Duration::from_secs(120),
        }
    }
}

/// A single-use polling loop with explicit state and cancellation.
///
/// The probe is an async closure returning `Ok(true)` once the awaited
/// condition holds. Probe errors are logged and treated as "not yet": a
/// transient read failure must not kill the loop.
pub struct Poller {
    config: PollerConfig,
    state: PollState,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            state: PollState::Idle,
            cancel: CancellationToken::new(),
        }
    }

    /// Current state, for rendering.
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Token to cancel the running poll from elsewhere (e.g. on unmount).
    /// Cancelling does not leak a timer: the loop exits at the next await
    /// point and the poller returns to `idle`.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the loop until the condition holds, the budget expires, or the
    /// token is cancelled. The first probe fires immediately.
    pub async fn run<F>(&mut self, mut probe: F) -> PollOutcome
    where
        F: FnMut() -> BoxFuture<'static, anyhow::Result<bool>>,
    {
        self.state = PollState::Polling;

        let budget = tokio::time::sleep(self.config.budget);
        tokio::pin!(budget);

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.state = PollState::Idle;
                    return PollOutcome::Cancelled;
                }
                _ = &mut budget => {
                    self.state = PollState::TimedOut;
                    return PollOutcome::TimedOut;
                }
                _ = ticker.tick() => {
                    match probe().await {
                        Ok(true) => {
                            self.state = PollState::Ready;
                            return PollOutcome::Ready;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "poll probe failed, will retry");
                        }
                    }
                }
            }
        }
    }
}
