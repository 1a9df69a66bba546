//! Polling engine for resources the control plane processes asynchronously.

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    PushError, ResourceKind, Warned, Warnings,
    client::{Build, BuildState, Package, PackageState},
};

/// Default interval between two fetches of a pending resource.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default upper bound on how long a single resource is polled.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Classification of a fetched resource's processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Pending,
    Ready,
    Failed,
    Expired,
}

/// A resource whose state can be polled until it settles.
pub trait Pollable {
    const KIND: ResourceKind;

    fn guid(&self) -> &str;

    fn terminal(&self) -> Terminal;

    fn failure_reason(&self) -> Option<String> {
        None
    }
}

impl Pollable for Package {
    const KIND: ResourceKind = ResourceKind::Package;

    fn guid(&self) -> &str {
        &self.guid
    }

    fn terminal(&self) -> Terminal {
        match self.state {
            PackageState::Ready => Terminal::Ready,
            PackageState::Failed => Terminal::Failed,
            PackageState::Expired => Terminal::Expired,
            PackageState::AwaitingUpload | PackageState::ProcessingUpload | PackageState::Copying => {
                Terminal::Pending
            }
        }
    }
}

impl Pollable for Build {
    const KIND: ResourceKind = ResourceKind::Build;

    fn guid(&self) -> &str {
        &self.guid
    }

    fn terminal(&self) -> Terminal {
        match self.state {
            BuildState::Staged => Terminal::Ready,
            BuildState::Failed => Terminal::Failed,
            BuildState::Processing => Terminal::Pending,
        }
    }

    fn failure_reason(&self) -> Option<String> {
        self.error.clone()
    }
}

/// Re-fetches a resource until it reaches a terminal state.
///
/// Fetch errors are returned immediately. Cancellation is observed while
/// sleeping between fetches, so a cancelled poll returns within one interval.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: Some(DEFAULT_POLL_TIMEOUT),
            cancel: CancellationToken::new(),
        }
    }

    /// Bound the time spent on a single resource. `None` polls until a
    /// terminal state or cancellation.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetch until the resource is ready, failed or expired.
    ///
    /// The warnings of every fetch are accumulated in order and returned on
    /// every path.
    pub async fn poll_until_terminal<T, F, Fut>(&self, mut fetch: F) -> Warned<T>
    where
        T: Pollable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Warned<T>>,
    {
        let started = Instant::now();
        let mut warnings = Warnings::new();

        loop {
            let resource = match warnings.absorb(fetch().await) {
                Ok(resource) => resource,
                Err(e) => return warnings.finish(Err(e)),
            };

            tracing::debug!(
                kind = %T::KIND,
                guid = resource.guid(),
                state = ?resource.terminal(),
                "Polled resource state"
            );

            match resource.terminal() {
                Terminal::Ready => return warnings.finish(Ok(resource)),
                Terminal::Failed => {
                    return warnings.finish(Err(PushError::ProcessingFailed {
                        kind: T::KIND,
                        guid: resource.guid().to_string(),
                        reason: resource.failure_reason(),
                    }));
                }
                Terminal::Expired => {
                    return warnings.finish(Err(PushError::ProcessingExpired {
                        kind: T::KIND,
                        guid: resource.guid().to_string(),
                    }));
                }
                Terminal::Pending => {}
            }

            let elapsed = started.elapsed();
            if self.timeout.is_some_and(|timeout| elapsed >= timeout) {
                return warnings.finish(Err(PushError::PollTimedOut {
                    kind: T::KIND,
                    guid: resource.guid().to_string(),
                    elapsed,
                }));
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(kind = %T::KIND, guid = resource.guid(), "Polling cancelled");
                    return warnings.finish(Err(PushError::Cancelled));
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
