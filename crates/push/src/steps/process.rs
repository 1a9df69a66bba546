use crate::{Event, Warned, Warnings, client::CloudClient, plan::Plan};

use super::StepContext;

/// Apply the declared instances, memory and disk of every process type.
pub async fn scale_processes<C: CloudClient>(
    ctx: &StepContext<'_, C>,
    plan: &mut Plan,
) -> Warned<()> {
    if plan.processes.is_empty() {
        return Warned::ok((), Warnings::new());
    }

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::ScalingProcesses);

    for scale in &plan.processes {
        attempt!(
            warnings,
            ctx.client.scale_process(&plan.application.guid, scale).await
        );
        tracing::info!(
            app = %plan.app_name,
            process_type = %scale.process_type,
            instances = ?scale.instances,
            memory_in_mb = ?scale.memory_in_mb,
            disk_in_mb = ?scale.disk_in_mb,
            "Process scaled"
        );
    }

    ctx.events.emit(Event::ScalingProcessesComplete);
    warnings.finish(Ok(()))
}
