//! REST implementation of [`CloudClient`] on top of `reqwest`.

use std::{collections::BTreeMap, time::Duration};

use anyhow::Context;
use percent_encoding::percent_decode_str;
use reqwest::{
    RequestBuilder, StatusCode,
    header::HeaderMap,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use url::Url;

use super::{
    Application, ApplicationState, Build, BuildState, CloudClient, Domain, NewPackage, NewRoute,
    Package, PackageKind, PackageState, ProcessScale, Resource, Route, Space,
};
use crate::{PushError, ResourceKind, Warned, Warnings};

/// Response header carrying comma separated, URL encoded warnings.
pub const WARNINGS_HEADER: &str = "X-Cf-Warnings";

/// Default timeout for a single control plane request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Control plane client speaking the v3 REST API.
#[derive(Debug, Clone)]
pub struct HttpCloudClient {
    http: reqwest::Client,
    api: Url,
    token: Option<String>,
}

impl HttpCloudClient {
    /// Create a client for the API rooted at `api`, authenticating with an
    /// already acquired bearer `token`.
    pub fn new(api: Url, token: Option<String>) -> anyhow::Result<Self> {
        Self::with_timeout(api, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(mut api: Url, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        // Endpoints are joined relative to the API root, which must be a
        // directory for any path prefix to survive.
        if !api.path().ends_with('/') {
            let path = format!("{}/", api.path());
            api.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { http, api, token })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PushError> {
        self.api
            .join(path.trim_start_matches('/'))
            .map_err(|e| PushError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    fn endpoint_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, PushError> {
        let mut url = self.endpoint(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Send `request` and split the response into warnings and a success or
    /// classified error.
    async fn dispatch(
        &self,
        request: RequestBuilder,
        not_found: impl FnOnce() -> PushError,
    ) -> Warned<reqwest::Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Warned::err(PushError::Transport(e.to_string()), Warnings::new()),
        };

        let warnings = parse_warnings(response.headers());
        let status = response.status();
        if status.is_success() {
            return Warned::ok(response, warnings);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%status, %body, "Control plane request failed");
        Warned::err(classify_error(status, &body, not_found), warnings)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        not_found: impl FnOnce() -> PushError,
    ) -> Warned<T> {
        let (response, warnings) = self.dispatch(request, not_found).await.into_parts();
        let value = match response {
            Ok(response) => response
                .json::<T>()
                .await
                .map_err(|e| PushError::Transport(format!("failed to decode response: {e}"))),
            Err(e) => Err(e),
        };
        warnings.finish(value)
    }

    async fn execute_unit(
        &self,
        request: RequestBuilder,
        not_found: impl FnOnce() -> PushError,
    ) -> Warned<()> {
        self.dispatch(request, not_found).await.map(|_| ())
    }

    /// Fetch a filtered list and return its first entry.
    async fn first_of<T: DeserializeOwned>(
        &self,
        url: Result<Url, PushError>,
        not_found: impl Fn() -> PushError,
    ) -> Warned<T> {
        let url = match url {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };

        let (list, warnings) = self
            .execute::<ListEnvelope<T>>(self.http.get(url), &not_found)
            .await
            .into_parts();
        let value = list.and_then(|list| list.resources.into_iter().next().ok_or_else(&not_found));
        warnings.finish(value)
    }

    async fn fetch_environment(&self, app_guid: &str) -> Warned<BTreeMap<String, String>> {
        let url = match self.endpoint(&format!("/v3/apps/{app_guid}/environment_variables")) {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        self.execute::<EnvironmentWire>(self.http.get(url), || not_found_guid(ResourceKind::Application, app_guid))
            .await
            .map(EnvironmentWire::into_map)
    }

    async fn app_action(&self, app_guid: &str, action: &str) -> Warned<Application> {
        let url = match self.endpoint(&format!("/v3/apps/{app_guid}/actions/{action}")) {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        self.execute::<AppWire>(self.http.post(url), || not_found_guid(ResourceKind::Application, app_guid))
            .await
            .map(AppWire::into_application)
    }
}

fn not_found_guid(kind: ResourceKind, guid: &str) -> PushError {
    PushError::ResourceNotFound {
        kind,
        guid: guid.to_string(),
    }
}

impl CloudClient for HttpCloudClient {
    async fn get_application_by_name_and_space(&self, name: &str, space_guid: &str) -> Warned<Application> {
        let url = self.endpoint_with_query("/v3/apps", &[("names", name), ("space_guids", space_guid)]);
        let mut warnings = Warnings::new();

        let app = match warnings.absorb(
            self.first_of::<AppWire>(url, || PushError::ApplicationNotFound {
                name: name.to_string(),
            })
            .await,
        ) {
            Ok(app) => app.into_application(),
            Err(e) => return warnings.finish(Err(e)),
        };

        let environment = warnings.absorb(self.fetch_environment(&app.guid).await);
        warnings.finish(environment.map(|environment| Application { environment, ..app }))
    }

    async fn create_application(&self, app: &Application) -> Warned<Application> {
        let url = match self.endpoint("/v3/apps") {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        let body = json!({
            "name": app.name,
            "environment_variables": app.environment,
            "relationships": { "space": relationship(&app.space_guid) },
        });

        self.execute::<AppWire>(self.http.post(url).json(&body), || PushError::SpaceNotFound {
            name: app.space_guid.clone(),
        })
        .await
        .map(|created| Application {
            environment: app.environment.clone(),
            ..created.into_application()
        })
    }

    async fn update_application(&self, app: &Application, unset: &[String]) -> Warned<Application> {
        let not_found = || PushError::ApplicationNotFound {
            name: app.name.clone(),
        };
        let mut warnings = Warnings::new();

        let updated = async {
            let url = self.endpoint(&format!("/v3/apps/{}", app.guid))?;
            let updated = warnings.absorb(
                self.execute::<AppWire>(self.http.patch(url).json(&json!({ "name": app.name })), not_found)
                    .await,
            )?;

            let url = self.endpoint(&format!("/v3/apps/{}/environment_variables", app.guid))?;
            let environment = warnings.absorb(
                self.execute::<EnvironmentWire>(
                    self.http
                        .patch(url)
                        .json(&environment_patch(&app.environment, unset)),
                    not_found,
                )
                .await,
            )?;

            Ok::<_, PushError>(Application {
                environment: environment.into_map(),
                ..updated.into_application()
            })
        }
        .await;

        warnings.finish(updated)
    }

    async fn start_application(&self, app_guid: &str) -> Warned<Application> {
        self.app_action(app_guid, "start").await
    }

    async fn stop_application(&self, app_guid: &str) -> Warned<Application> {
        self.app_action(app_guid, "stop").await
    }

    async fn create_package(&self, package: &NewPackage) -> Warned<Package> {
        let url = match self.endpoint("/v3/packages") {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        let app_guid = package.app_guid();
        let body = match package {
            NewPackage::Bits { .. } => json!({
                "type": PackageKind::Bits,
                "relationships": { "app": relationship(app_guid) },
            }),
            NewPackage::Docker { credentials, .. } => json!({
                "type": PackageKind::Docker,
                "relationships": { "app": relationship(app_guid) },
                "data": {
                    "image": credentials.image,
                    "username": credentials.username,
                    "password": credentials.password,
                },
            }),
        };

        self.execute::<PackageWire>(self.http.post(url).json(&body), || {
            not_found_guid(ResourceKind::Application, app_guid)
        })
        .await
        .map(|wire| wire.into_package(app_guid))
    }

    async fn get_package(&self, package_guid: &str) -> Warned<Package> {
        let url = match self.endpoint(&format!("/v3/packages/{package_guid}")) {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        self.execute::<PackageWire>(self.http.get(url), || not_found_guid(ResourceKind::Package, package_guid))
            .await
            .map(|wire| wire.into_package(""))
    }

    async fn resource_match(&self, resources: &[Resource]) -> Warned<Vec<Resource>> {
        let url = match self.endpoint("/v3/resource_match") {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        let body = ResourceList::from_resources(resources);

        self.execute::<ResourceList>(self.http.post(url).json(&body), || PushError::Server {
            status: StatusCode::NOT_FOUND.as_u16(),
            message: "resource matching is not available".to_string(),
        })
        .await
        .map(ResourceList::into_resources)
    }

    async fn upload_bits_package(
        &self,
        package: &Package,
        matched_resources: &[Resource],
        new_resources: Vec<u8>,
        new_resources_length: u64,
    ) -> Warned<Package> {
        let request = async {
            let url = self.endpoint(&format!("/v3/packages/{}/upload", package.guid))?;
            let resources = serde_json::to_string(&ResourceList::from_resources(matched_resources).resources)
                .map_err(|e| PushError::Transport(format!("failed to encode resources: {e}")))?;
            let bits = Part::stream_with_length(reqwest::Body::from(new_resources), new_resources_length)
                .file_name("application.tgz")
                .mime_str("application/gzip")
                .map_err(|e| PushError::Transport(e.to_string()))?;
            let form = Form::new().text("resources", resources).part("bits", bits);
            Ok::<_, PushError>(self.http.post(url).multipart(form))
        }
        .await;

        let request = match request {
            Ok(request) => request,
            Err(e) => return Warned::err(e, Warnings::new()),
        };

        self.execute::<PackageWire>(request, || not_found_guid(ResourceKind::Package, &package.guid))
            .await
            .map(|wire| wire.into_package(&package.app_guid))
    }

    async fn stage_package(&self, package_guid: &str) -> Warned<Build> {
        let url = match self.endpoint("/v3/builds") {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        let body = json!({ "package": { "guid": package_guid } });

        self.execute::<BuildWire>(self.http.post(url).json(&body), || {
            not_found_guid(ResourceKind::Package, package_guid)
        })
        .await
        .map(BuildWire::into_build)
    }

    async fn get_build(&self, build_guid: &str) -> Warned<Build> {
        let url = match self.endpoint(&format!("/v3/builds/{build_guid}")) {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        self.execute::<BuildWire>(self.http.get(url), || not_found_guid(ResourceKind::Build, build_guid))
            .await
            .map(BuildWire::into_build)
    }

    async fn set_application_droplet(&self, app_guid: &str, droplet_guid: &str) -> Warned<()> {
        let url = match self.endpoint(&format!("/v3/apps/{app_guid}/relationships/current_droplet")) {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        let body = relationship(droplet_guid);

        self.execute_unit(self.http.patch(url).json(&body), || {
            not_found_guid(ResourceKind::Droplet, droplet_guid)
        })
        .await
    }

    async fn scale_process(&self, app_guid: &str, scale: &ProcessScale) -> Warned<()> {
        let url = match self.endpoint(&format!(
            "/v3/apps/{app_guid}/processes/{}/actions/scale",
            scale.process_type
        )) {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        let body = ScaleWire {
            instances: scale.instances,
            memory_in_mb: scale.memory_in_mb,
            disk_in_mb: scale.disk_in_mb,
        };

        self.execute_unit(self.http.post(url).json(&body), || {
            not_found_guid(ResourceKind::Process, &scale.process_type)
        })
        .await
    }

    async fn get_domain_by_name(&self, name: &str) -> Warned<Domain> {
        let url = self.endpoint_with_query("/v3/domains", &[("names", name)]);
        self.first_of::<DomainWire>(url, || PushError::DomainNotFound {
            name: name.to_string(),
        })
        .await
        .map(DomainWire::into_domain)
    }

    async fn get_space_by_name_and_organization(
        &self,
        space_name: &str,
        organization_guid: &str,
    ) -> Warned<Space> {
        let url = self.endpoint_with_query(
            "/v3/spaces",
            &[("names", space_name), ("organization_guids", organization_guid)],
        );
        self.first_of::<SpaceWire>(url, || PushError::SpaceNotFound {
            name: space_name.to_string(),
        })
        .await
        .map(SpaceWire::into_space)
    }

    async fn create_route(&self, route: &NewRoute) -> Warned<Route> {
        let url = match self.endpoint("/v3/routes") {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        let body = json!({
            "host": route.host,
            "relationships": {
                "space": relationship(&route.space_guid),
                "domain": relationship(&route.domain_guid),
            },
        });

        self.execute::<RouteWire>(self.http.post(url).json(&body), || {
            not_found_guid(ResourceKind::Domain, &route.domain_guid)
        })
        .await
        .map(RouteWire::into_route)
    }

    async fn get_route(&self, domain: &Domain, host: Option<&str>) -> Warned<Route> {
        let host = host.unwrap_or_default();
        let url = self.endpoint_with_query("/v3/routes", &[("domain_guids", domain.guid.as_str()), ("hosts", host)]);
        self.first_of::<RouteWire>(url, || PushError::RouteNotFound {
            host: host.to_string(),
            domain: domain.name.clone(),
        })
        .await
        .map(RouteWire::into_route)
    }

    async fn map_route(&self, route_guid: &str, app_guid: &str) -> Warned<()> {
        let url = match self.endpoint(&format!("/v3/routes/{route_guid}/destinations")) {
            Ok(url) => url,
            Err(e) => return Warned::err(e, Warnings::new()),
        };
        let body = json!({ "destinations": [ { "app": { "guid": app_guid } } ] });

        self.execute_unit(self.http.post(url).json(&body), || {
            not_found_guid(ResourceKind::Route, route_guid)
        })
        .await
    }
}

/// Split the warnings header into individual, decoded messages.
fn parse_warnings(headers: &HeaderMap) -> Warnings {
    headers
        .get_all(WARNINGS_HEADER)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|warning| !warning.is_empty())
        .map(|warning| {
            percent_decode_str(&warning.replace('+', " "))
                .decode_utf8_lossy()
                .into_owned()
        })
        .collect()
}

/// Map a non-success response onto the error taxonomy.
fn classify_error(status: StatusCode, body: &str, not_found: impl FnOnce() -> PushError) -> PushError {
    let errors = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.errors)
        .unwrap_or_default();
    let message = if errors.is_empty() {
        body.trim().to_string()
    } else {
        errors
            .iter()
            .map(|e| e.detail.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    match status {
        StatusCode::NOT_FOUND => not_found(),
        StatusCode::UNPROCESSABLE_ENTITY if errors.iter().any(ApiError::is_uniqueness) => {
            PushError::NotUnique { message }
        }
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => PushError::Validation { message },
        _ => PushError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

/// The environment PATCH merges, so removed variables are sent as `null`.
fn environment_patch(desired: &BTreeMap<String, String>, unset: &[String]) -> serde_json::Value {
    let mut var = serde_json::Map::new();
    for name in unset {
        var.insert(name.clone(), serde_json::Value::Null);
    }
    for (name, value) in desired {
        var.insert(name.clone(), serde_json::Value::String(value.clone()));
    }
    json!({ "var": var })
}

fn relationship(guid: &str) -> serde_json::Value {
    json!({ "data": { "guid": guid } })
}

// -- Wire representations --

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

impl ApiError {
    /// Error code the control plane uses for uniqueness violations.
    const UNIQUENESS_CODE: u32 = 10016;

    fn is_uniqueness(&self) -> bool {
        self.code == Self::UNIQUENESS_CODE
            || self.title == "CF-UniquenessError"
            || self.detail.to_lowercase().contains("already exists")
    }
}

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    resources: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct RelationshipWire {
    #[serde(default)]
    data: Option<GuidWire>,
}

impl RelationshipWire {
    fn guid(self) -> String {
        self.data.map(|d| d.guid).unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GuidWire {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct AppWire {
    guid: String,
    name: String,
    state: ApplicationState,
    #[serde(default)]
    relationships: AppRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct AppRelationships {
    #[serde(default)]
    space: RelationshipWire,
}

impl AppWire {
    fn into_application(self) -> Application {
        Application {
            guid: self.guid,
            name: self.name,
            space_guid: self.relationships.space.guid(),
            state: self.state,
            environment: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EnvironmentWire {
    #[serde(default)]
    var: BTreeMap<String, String>,
}

impl EnvironmentWire {
    fn into_map(self) -> BTreeMap<String, String> {
        self.var
    }
}

#[derive(Debug, Deserialize)]
struct PackageWire {
    guid: String,
    #[serde(rename = "type")]
    kind: PackageKind,
    state: PackageState,
    #[serde(default)]
    data: PackageDataWire,
    #[serde(default)]
    relationships: PackageRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct PackageDataWire {
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PackageRelationships {
    #[serde(default)]
    app: RelationshipWire,
}

impl PackageWire {
    /// Convert, falling back to `app_guid` when the response omits the owner.
    fn into_package(self, app_guid: &str) -> Package {
        let owner = self.relationships.app.guid();
        Package {
            guid: self.guid,
            app_guid: if owner.is_empty() {
                app_guid.to_string()
            } else {
                owner
            },
            kind: self.kind,
            state: self.state,
            docker_image: self.data.image,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BuildWire {
    guid: String,
    state: BuildState,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    package: Option<GuidWire>,
    #[serde(default)]
    droplet: Option<GuidWire>,
}

impl BuildWire {
    fn into_build(self) -> Build {
        Build {
            guid: self.guid,
            package_guid: self.package.map(|p| p.guid).unwrap_or_default(),
            droplet_guid: self.droplet.map(|d| d.guid),
            state: self.state,
            error: self.error,
        }
    }
}

#[derive(Debug, Serialize)]
struct ScaleWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    instances: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_in_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disk_in_mb: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DomainWire {
    guid: String,
    name: String,
    #[serde(default)]
    relationships: OrganizationRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct OrganizationRelationships {
    #[serde(default)]
    organization: RelationshipWire,
}

impl DomainWire {
    fn into_domain(self) -> Domain {
        Domain {
            guid: self.guid,
            name: self.name,
            organization_guid: self.relationships.organization.guid(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpaceWire {
    guid: String,
    name: String,
    #[serde(default)]
    relationships: OrganizationRelationships,
}

impl SpaceWire {
    fn into_space(self) -> Space {
        Space {
            guid: self.guid,
            name: self.name,
            organization_guid: self.relationships.organization.guid(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteWire {
    guid: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    relationships: RouteRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct RouteRelationships {
    #[serde(default)]
    space: RelationshipWire,
    #[serde(default)]
    domain: RelationshipWire,
}

impl RouteWire {
    fn into_route(self) -> Route {
        Route {
            guid: self.guid,
            host: self.host.filter(|h| !h.is_empty()),
            domain_guid: self.relationships.domain.guid(),
            space_guid: self.relationships.space.guid(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourceList {
    resources: Vec<ResourceWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourceWire {
    path: String,
    checksum: ChecksumWire,
    size_in_bytes: u64,
    mode: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChecksumWire {
    value: String,
}

impl ResourceList {
    fn from_resources(resources: &[Resource]) -> Self {
        Self {
            resources: resources
                .iter()
                .map(|r| ResourceWire {
                    path: r.path.clone(),
                    checksum: ChecksumWire {
                        value: r.checksum.clone(),
                    },
                    size_in_bytes: r.size,
                    mode: format!("{:o}", r.mode),
                })
                .collect(),
        }
    }

    fn into_resources(self) -> Vec<Resource> {
        self.resources
            .into_iter()
            .map(|r| Resource {
                path: r.path,
                checksum: r.checksum.value,
                size: r.size_in_bytes,
                mode: u32::from_str_radix(&r.mode, 8).unwrap_or(0o644),
            })
            .collect()
    }
}
