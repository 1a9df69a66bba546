use crate::{
    Event, PushError, ResourceKind, Warned, Warnings, client::CloudClient, plan::Plan,
};

use super::StepContext;

/// Stage the ready package into a build.
pub async fn stage_build<C: CloudClient>(ctx: &StepContext<'_, C>, plan: &mut Plan) -> Warned<()> {
    let package_guid = match plan.package_guid() {
        Ok(guid) => guid.to_string(),
        Err(e) => return Warned::err(e, Warnings::new()),
    };

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::Staging);

    let build = attempt!(warnings, ctx.client.stage_package(&package_guid).await);
    tracing::info!(app = %plan.app_name, %package_guid, build_guid = %build.guid, "Staging started");
    plan.build_guid = Some(build.guid);

    ctx.events.emit(Event::StagingComplete);
    warnings.finish(Ok(()))
}

/// Wait for staging to finish and record the droplet it produced.
pub async fn poll_build<C: CloudClient>(ctx: &StepContext<'_, C>, plan: &mut Plan) -> Warned<()> {
    let build_guid = match plan.build_guid() {
        Ok(guid) => guid.to_string(),
        Err(e) => return Warned::err(e, Warnings::new()),
    };

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::PollingBuild);

    let build = attempt!(
        warnings,
        ctx.poller
            .poll_until_terminal(|| ctx.client.get_build(&build_guid))
            .await
    );
    let Some(droplet_guid) = build.droplet_guid else {
        return warnings.finish(Err(PushError::ResourceNotFound {
            kind: ResourceKind::Droplet,
            guid: build.guid,
        }));
    };
    tracing::info!(app = %plan.app_name, %build_guid, %droplet_guid, "Build staged");
    plan.droplet_guid = Some(droplet_guid);

    ctx.events.emit(Event::PollingBuildComplete);
    warnings.finish(Ok(()))
}

/// Make the staged droplet the application's current droplet.
pub async fn set_droplet<C: CloudClient>(ctx: &StepContext<'_, C>, plan: &mut Plan) -> Warned<()> {
    let droplet_guid = match plan.droplet_guid() {
        Ok(guid) => guid.to_string(),
        Err(e) => return Warned::err(e, Warnings::new()),
    };

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::SettingDroplet);

    attempt!(
        warnings,
        ctx.client
            .set_application_droplet(&plan.application.guid, &droplet_guid)
            .await
    );
    tracing::info!(app = %plan.app_name, %droplet_guid, "Droplet set");

    ctx.events.emit(Event::SettingDropletComplete);
    warnings.finish(Ok(()))
}
