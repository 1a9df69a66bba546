use crate::{Event, Warned, Warnings, client::CloudClient, plan::Plan};

use super::StepContext;

/// Push the desired name and environment when they differ from the remote
/// application, unsetting variables the manifest dropped. Clears
/// `needs_update` so a replay is a no-op.
pub async fn update_application<C: CloudClient>(
    ctx: &StepContext<'_, C>,
    plan: &mut Plan,
) -> Warned<()> {
    if !plan.needs_update {
        return Warned::ok((), Warnings::new());
    }

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::UpdatingApplication);

    let updated = attempt!(
        warnings,
        ctx.client
            .update_application(&plan.application, &plan.stale_environment)
            .await
    );
    tracing::info!(app = %plan.app_name, app_guid = %updated.guid, "Application updated");
    plan.application = updated;
    plan.needs_update = false;
    plan.stale_environment.clear();

    ctx.events.emit(Event::UpdatingApplicationComplete);
    warnings.finish(Ok(()))
}

/// Stop the application, but only when it is running.
pub async fn stop_application<C: CloudClient>(
    ctx: &StepContext<'_, C>,
    plan: &mut Plan,
) -> Warned<()> {
    if !plan.application.is_started() {
        return Warned::ok((), Warnings::new());
    }

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::StoppingApplication);

    let stopped = attempt!(warnings, ctx.client.stop_application(&plan.application.guid).await);
    tracing::info!(app = %plan.app_name, state = %stopped.state, "Application stopped");
    plan.application.state = stopped.state;

    ctx.events.emit(Event::StoppingApplicationComplete);
    warnings.finish(Ok(()))
}

/// Start the application unless it is already running.
pub async fn start_application<C: CloudClient>(
    ctx: &StepContext<'_, C>,
    plan: &mut Plan,
) -> Warned<()> {
    if plan.application.is_started() {
        return Warned::ok((), Warnings::new());
    }

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::StartingApplication);

    let started = attempt!(warnings, ctx.client.start_application(&plan.application.guid).await);
    tracing::info!(app = %plan.app_name, state = %started.state, "Application started");
    plan.application.state = started.state;

    ctx.events.emit(Event::StartingApplicationComplete);
    warnings.finish(Ok(()))
}
