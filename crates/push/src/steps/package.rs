use crate::{
    Event, PushError, Warned, Warnings,
    client::{CloudClient, NewPackage},
    plan::{Artifact, Plan},
};

use super::StepContext;

/// Create the package the application will be staged from. Container
/// images are registered synchronously and need no upload or polling.
pub async fn create_package<C: CloudClient>(ctx: &StepContext<'_, C>, plan: &mut Plan) -> Warned<()> {
    let app_guid = plan.application.guid.clone();
    let request = match &plan.artifact {
        Artifact::Bits(_) => NewPackage::Bits { app_guid },
        Artifact::Docker(credentials) => NewPackage::Docker {
            app_guid,
            credentials: credentials.clone(),
        },
    };

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::CreatingPackage);

    let package = attempt!(warnings, ctx.client.create_package(&request).await);
    tracing::info!(
        app = %plan.app_name,
        package_guid = %package.guid,
        kind = %package.kind,
        "Package created"
    );
    plan.package = Some(package);

    ctx.events.emit(Event::CreatingPackageComplete);
    warnings.finish(Ok(()))
}

/// Upload the local files the remote side does not already store.
pub async fn upload_bits<C: CloudClient>(ctx: &StepContext<'_, C>, plan: &mut Plan) -> Warned<()> {
    let Artifact::Bits(bits) = &plan.artifact else {
        return Warned::ok((), Warnings::new());
    };
    let Some(package) = plan.package.as_ref() else {
        return Warned::err(PushError::PlanIncomplete("package"), Warnings::new());
    };

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::UploadingBits);

    let matched = attempt!(warnings, ctx.client.resource_match(&bits.resources()).await);

    let archive = tokio::task::spawn_blocking({
        let bits = bits.clone();
        let matched = matched.clone();
        move || bits.archive_unmatched(&matched)
    })
    .await
    .unwrap_or_else(|e| {
        Err(PushError::Bits {
            path: bits.root().to_path_buf(),
            message: e.to_string(),
        })
    });
    let archive = match archive {
        Ok(archive) => archive,
        Err(e) => return warnings.finish(Err(e)),
    };
    let length = archive.len() as u64;

    tracing::info!(
        app = %plan.app_name,
        package_guid = %package.guid,
        matched = matched.len(),
        total = bits.files().len(),
        bytes = length,
        "Uploading application bits"
    );

    let uploaded = attempt!(
        warnings,
        ctx.client
            .upload_bits_package(package, &matched, archive, length)
            .await
    );
    plan.package = Some(uploaded);

    ctx.events.emit(Event::UploadingBitsComplete);
    warnings.finish(Ok(()))
}

/// Wait until the uploaded package has been processed.
pub async fn poll_package<C: CloudClient>(ctx: &StepContext<'_, C>, plan: &mut Plan) -> Warned<()> {
    if plan.artifact.is_docker() {
        return Warned::ok((), Warnings::new());
    }
    let (package_guid, owner) = match &plan.package {
        Some(package) => (package.guid.clone(), package.app_guid.clone()),
        None => return Warned::err(PushError::PlanIncomplete("package"), Warnings::new()),
    };

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::PollingPackage);

    let mut package = attempt!(
        warnings,
        ctx.poller
            .poll_until_terminal(|| ctx.client.get_package(&package_guid))
            .await
    );
    if package.app_guid.is_empty() {
        package.app_guid = owner;
    }
    tracing::info!(app = %plan.app_name, %package_guid, "Package ready");
    plan.package = Some(package);

    ctx.events.emit(Event::PollingPackageComplete);
    warnings.finish(Ok(()))
}
