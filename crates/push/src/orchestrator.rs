//! Sequencing of the push steps.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    EventSink, Poller, PushError, Warned, Warnings,
    client::CloudClient,
    plan::Plan,
    steps::{self, StepContext},
};

/// Position of a push in its fixed sequence of steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    CreatingPackage,
    UploadingBits,
    PollingPackage,
    StagingBuild,
    PollingBuild,
    SettingDroplet,
    ScalingProcesses,
    ManagingRoutes,
    UpdatingApplication,
    Stopping,
    Starting,
    Done,
}

impl Stage {
    pub const FIRST: Self = Self::CreatingPackage;

    pub fn next(self) -> Self {
        match self {
            Self::CreatingPackage => Self::UploadingBits,
            Self::UploadingBits => Self::PollingPackage,
            Self::PollingPackage => Self::StagingBuild,
            Self::StagingBuild => Self::PollingBuild,
            Self::PollingBuild => Self::SettingDroplet,
            Self::SettingDroplet => Self::ScalingProcesses,
            Self::ScalingProcesses => Self::ManagingRoutes,
            Self::ManagingRoutes => Self::UpdatingApplication,
            Self::UpdatingApplication => Self::Stopping,
            Self::Stopping => Self::Starting,
            Self::Starting | Self::Done => Self::Done,
        }
    }
}

/// Drives a plan through every stage, in order, halting on the first error.
///
/// Nothing is rolled back on failure. Orchestrators pushing different plans
/// may share one client.
#[derive(Debug)]
pub struct Orchestrator<C> {
    client: Arc<C>,
    poller: Poller,
    events: EventSink,
}

impl<C: CloudClient> Orchestrator<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            poller: Poller::default(),
            events: EventSink::detached(),
        }
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Token that cancels the run. Checked before every stage and while
    /// polling.
    pub fn cancellation(&self) -> CancellationToken {
        self.poller.cancellation().clone()
    }

    /// Push `plan`. Warnings from every remote call are returned in call
    /// order, together with the first error if any.
    pub async fn run(&self, plan: &mut Plan) -> Warned<()> {
        let ctx = StepContext::new(self.client.as_ref(), &self.poller, &self.events);
        let mut warnings = Warnings::new();
        let mut stage = Stage::FIRST;

        tracing::info!(app = %plan.app_name, space = %plan.space.name, "Pushing application");

        while stage != Stage::Done {
            if self.poller.cancellation().is_cancelled() {
                tracing::warn!(app = %plan.app_name, %stage, "Push cancelled");
                return warnings.finish(Err(PushError::Cancelled));
            }

            let span = tracing::info_span!("stage", app = %plan.app_name, %stage);
            let outcome = run_stage(stage, &ctx, plan).instrument(span).await;

            if let Err(e) = warnings.absorb(outcome) {
                tracing::error!(app = %plan.app_name, %stage, error = %e, "Push failed");
                return warnings.finish(Err(e));
            }
            stage = stage.next();
        }

        tracing::info!(
            app = %plan.app_name,
            state = %plan.application.state,
            warnings = warnings.len(),
            "Push complete"
        );
        warnings.finish(Ok(()))
    }
}

async fn run_stage<C: CloudClient>(
    stage: Stage,
    ctx: &StepContext<'_, C>,
    plan: &mut Plan,
) -> Warned<()> {
    match stage {
        Stage::CreatingPackage => steps::create_package(ctx, plan).await,
        Stage::UploadingBits => steps::upload_bits(ctx, plan).await,
        Stage::PollingPackage => steps::poll_package(ctx, plan).await,
        Stage::StagingBuild => steps::stage_build(ctx, plan).await,
        Stage::PollingBuild => steps::poll_build(ctx, plan).await,
        Stage::SettingDroplet => steps::set_droplet(ctx, plan).await,
        Stage::ScalingProcesses => steps::scale_processes(ctx, plan).await,
        Stage::ManagingRoutes => steps::manage_routes(ctx, plan).await,
        Stage::UpdatingApplication => steps::update_application(ctx, plan).await,
        Stage::Stopping => steps::stop_application(ctx, plan).await,
        Stage::Starting => steps::start_application(ctx, plan).await,
        Stage::Done => Warned::ok((), Warnings::new()),
    }
}
