//! Progress events emitted while a plan is pushed.

use tokio::sync::mpsc::{self, error::TrySendError};

/// Default capacity of an observer channel created with [`EventSink::channel`].
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// A named progress marker.
///
/// Each step that performs remote work emits its starting event right before
/// its first remote call and the matching `complete` event right after its
/// last remote call succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
pub enum Event {
    #[strum(serialize = "creating package")]
    CreatingPackage,
    #[strum(serialize = "creating package complete")]
    CreatingPackageComplete,
    #[strum(serialize = "uploading bits")]
    UploadingBits,
    #[strum(serialize = "uploading bits complete")]
    UploadingBitsComplete,
    #[strum(serialize = "polling package")]
    PollingPackage,
    #[strum(serialize = "polling package complete")]
    PollingPackageComplete,
    #[strum(serialize = "staging")]
    Staging,
    #[strum(serialize = "staging complete")]
    StagingComplete,
    #[strum(serialize = "polling build")]
    PollingBuild,
    #[strum(serialize = "polling build complete")]
    PollingBuildComplete,
    #[strum(serialize = "setting droplet")]
    SettingDroplet,
    #[strum(serialize = "setting droplet complete")]
    SettingDropletComplete,
    #[strum(serialize = "scaling processes")]
    ScalingProcesses,
    #[strum(serialize = "scaling processes complete")]
    ScalingProcessesComplete,
    #[strum(serialize = "creating routes")]
    CreatingRoutes,
    #[strum(serialize = "creating routes complete")]
    CreatingRoutesComplete,
    #[strum(serialize = "updating application")]
    UpdatingApplication,
    #[strum(serialize = "updating application complete")]
    UpdatingApplicationComplete,
    #[strum(serialize = "stopping application")]
    StoppingApplication,
    #[strum(serialize = "stopping application complete")]
    StoppingApplicationComplete,
    #[strum(serialize = "starting application")]
    StartingApplication,
    #[strum(serialize = "starting application complete")]
    StartingApplicationComplete,
}

/// One-directional event channel towards an optional observer.
///
/// Emitting never blocks: when the observer lags behind and the buffer is
/// full, or when nobody listens, the event is dropped.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<Event>>,
}

impl EventSink {
    /// A sink with no observer attached.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Create a sink together with the receiving end of a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: Event) {
        tracing::debug!(%event, "push event");

        let Some(tx) = &self.tx else {
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::trace!(%event, "Event observer is lagging, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                tracing::trace!(%event, "Event observer is gone, dropping event");
            }
        }
    }
}
