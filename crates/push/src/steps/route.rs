use crate::{
    Event, PushError, Warned, Warnings,
    client::{CloudClient, Domain, NewRoute, Route},
    manifest::RouteManifest,
    plan::Plan,
};

use super::StepContext;

/// Create a route for `host` on `domain_name` in the named space.
///
/// The space is looked up in the organization that owns the domain. A route
/// that already exists fails with [`PushError::RouteAlreadyExists`].
pub async fn create_route<C: CloudClient>(
    client: &C,
    space_name: &str,
    domain_name: &str,
    host: Option<&str>,
) -> Warned<Route> {
    let mut warnings = Warnings::new();
    let domain = attempt!(warnings, client.get_domain_by_name(domain_name).await);

    let created = create_route_in_domain(client, space_name, &domain, host).await;
    let route = attempt!(warnings, created);
    warnings.finish(Ok(route))
}

async fn create_route_in_domain<C: CloudClient>(
    client: &C,
    space_name: &str,
    domain: &Domain,
    host: Option<&str>,
) -> Warned<Route> {
    let mut warnings = Warnings::new();
    let space = attempt!(
        warnings,
        client
            .get_space_by_name_and_organization(space_name, &domain.organization_guid)
            .await
    );

    let request = NewRoute {
        host: host.map(str::to_string),
        domain_guid: domain.guid.clone(),
        space_guid: space.guid,
    };

    match warnings.absorb(client.create_route(&request).await) {
        Ok(route) => {
            tracing::info!(domain = %domain.name, host = ?host, route_guid = %route.guid, "Route created");
            warnings.finish(Ok(route))
        }
        Err(PushError::NotUnique { .. }) => warnings.finish(Err(PushError::RouteAlreadyExists {
            route: domain.name.clone(),
        })),
        Err(e) => warnings.finish(Err(e)),
    }
}

/// Find the domain a manifest route lives on, trying the whole route as a
/// domain before splitting off a host.
async fn resolve_domain<C: CloudClient>(
    client: &C,
    route: &RouteManifest,
) -> Warned<(Option<String>, Domain)> {
    let mut warnings = Warnings::new();
    let mut last_error = PushError::DomainNotFound {
        name: route.route.clone(),
    };

    for (host, domain_name) in route.candidates() {
        match warnings.absorb(client.get_domain_by_name(domain_name).await) {
            Ok(domain) => return warnings.finish(Ok((host.map(str::to_string), domain))),
            Err(e @ PushError::DomainNotFound { .. }) => last_error = e,
            Err(e) => return warnings.finish(Err(e)),
        }
    }

    warnings.finish(Err(last_error))
}

/// Create every declared route, reusing routes that already exist, and map
/// each one to the application.
pub async fn manage_routes<C: CloudClient>(ctx: &StepContext<'_, C>, plan: &mut Plan) -> Warned<()> {
    if plan.routes.is_empty() {
        return Warned::ok((), Warnings::new());
    }

    let mut warnings = Warnings::new();
    ctx.events.emit(Event::CreatingRoutes);

    for declared in &plan.routes {
        let (host, domain) = attempt!(warnings, resolve_domain(ctx.client, declared).await);

        let created =
            create_route_in_domain(ctx.client, &plan.space.name, &domain, host.as_deref()).await;
        let route = match warnings.absorb(created) {
            Ok(route) => route,
            Err(PushError::RouteAlreadyExists { .. }) => {
                tracing::debug!(route = %declared.route, "Route already exists, reusing it");
                attempt!(warnings, ctx.client.get_route(&domain, host.as_deref()).await)
            }
            Err(e) => return warnings.finish(Err(e)),
        };

        attempt!(
            warnings,
            ctx.client.map_route(&route.guid, &plan.application.guid).await
        );
        tracing::info!(app = %plan.app_name, route = %declared.route, "Route mapped");
    }

    ctx.events.emit(Event::CreatingRoutesComplete);
    warnings.finish(Ok(()))
}
