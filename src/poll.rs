//! Bounded, cancellable wait-for-condition primitive.
//!
//! Every state transition in the provisioning run waits through a
//! [`Poller`]. The probe is evaluated before any sleep, so a zero timeout still
//! observes the condition once, and the timeout is only reported after a probe
//! has run at or beyond the deadline.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Errors raised while waiting for a condition.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PollError<E> {
    /// The condition was not observed before the timeout elapsed.
    #[error("condition not met after {elapsed:?}")]
    Timeout {
        /// Time spent waiting when the last probe ran.
        elapsed: Duration,
    },
    /// The wait was cancelled by the caller.
    #[error("wait cancelled")]
    Cancelled,
    /// The probe itself failed.
    #[error("probe failed: {0}")]
    Probe(#[source] E),
}

/// Fixed-interval poller with a wall-clock timeout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    /// Creates a poller.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Delay between probes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Total time allowed before a wait fails.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Repeatedly evaluates `probe` until it yields `true`.
    ///
    /// Returns the elapsed time at which the condition was observed.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Timeout`] once a probe has returned `false` at or
    /// after the timeout, [`PollError::Cancelled`] when `cancel` fires, and
    /// [`PollError::Probe`] as soon as a probe fails.
    pub async fn wait_until<F, Fut, E>(
        &self,
        cancel: &CancellationToken,
        mut probe: F,
    ) -> Result<Duration, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        let ((), elapsed) = self
            .poll(cancel, || {
                let pending = probe();
                async move { pending.await.map(|ready| ready.then_some(())) }
            })
            .await?;
        Ok(elapsed)
    }

    /// Repeatedly evaluates `probe` until it yields a value and returns it.
    ///
    /// # Errors
    ///
    /// Fails in the same way as [`Poller::wait_until`].
    pub async fn wait_for<T, F, Fut, E>(
        &self,
        cancel: &CancellationToken,
        probe: F,
    ) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let (value, _) = self.poll(cancel, probe).await?;
        Ok(value)
    }

    async fn poll<T, F, Fut, E>(
        &self,
        cancel: &CancellationToken,
        mut probe: F,
    ) -> Result<(T, Duration), PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }

            if let Some(value) = probe().await.map_err(PollError::Probe)? {
                return Ok((value, started.elapsed()));
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                return Err(PollError::Timeout { elapsed });
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(PollError::Cancelled),
                () = sleep(self.interval) => {}
            }
        }
    }
}
