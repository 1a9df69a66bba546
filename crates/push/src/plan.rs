//! The per-attempt push plan.

use std::path::Path;

use crate::{
    PushError, Warned, Warnings,
    bits::LocalBits,
    client::{Application, CloudClient, DockerCredentials, Package, ProcessScale, Space},
    manifest::{AppManifest, RouteManifest},
};

/// Where the application's code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Local files, uploaded and staged remotely.
    Bits(LocalBits),
    /// A prebuilt container image.
    Docker(DockerCredentials),
}

impl Artifact {
    /// Build the artifact a manifest entry describes. Relative bits paths
    /// are resolved against `base_dir`.
    pub fn from_manifest(
        app: &AppManifest,
        base_dir: &Path,
        docker_password: Option<String>,
    ) -> Result<Self, PushError> {
        if let Some(docker) = &app.docker {
            return Ok(Self::Docker(DockerCredentials {
                image: docker.image.clone(),
                username: docker.username.clone(),
                password: docker_password,
            }));
        }

        let root = match &app.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => base_dir.join(path),
            None => base_dir.to_path_buf(),
        };
        LocalBits::scan(&root).map(Self::Bits)
    }

    pub fn is_docker(&self) -> bool {
        matches!(self, Self::Docker(_))
    }
}

/// Everything needed to push one application, plus the identifiers the
/// workflow fills in as it goes.
///
/// Created once per attempt and exclusively borrowed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub app_name: String,
    pub space: Space,
    /// Current application representation, carrying the desired
    /// environment until it has been pushed.
    pub application: Application,
    /// The application metadata differs from the manifest.
    pub needs_update: bool,
    /// Remote environment variables the manifest no longer declares.
    pub stale_environment: Vec<String>,
    pub artifact: Artifact,
    pub processes: Vec<ProcessScale>,
    pub routes: Vec<RouteManifest>,

    pub package: Option<Package>,
    pub build_guid: Option<String>,
    pub droplet_guid: Option<String>,
}

impl Plan {
    pub fn new(application: Application, space: Space, artifact: Artifact) -> Self {
        Self {
            app_name: application.name.clone(),
            space,
            application,
            needs_update: false,
            stale_environment: Vec::new(),
            artifact,
            processes: Vec::new(),
            routes: Vec::new(),
            package: None,
            build_guid: None,
            droplet_guid: None,
        }
    }

    /// Look the application up in `space`, creating it when it does not
    /// exist yet, and build a plan from the manifest entry.
    pub async fn resolve<C: CloudClient>(
        client: &C,
        space: Space,
        manifest: &AppManifest,
        artifact: Artifact,
    ) -> Warned<Self> {
        let mut warnings = Warnings::new();

        let found = warnings.absorb(
            client
                .get_application_by_name_and_space(&manifest.name, &space.guid)
                .await,
        );

        let (application, needs_update, stale_environment) = match found {
            Ok(mut existing) => {
                let needs_update = existing.environment != manifest.env;
                let stale = existing
                    .environment
                    .keys()
                    .filter(|name| !manifest.env.contains_key(*name))
                    .cloned()
                    .collect::<Vec<_>>();
                existing.environment = manifest.env.clone();
                tracing::info!(
                    app = %manifest.name,
                    app_guid = %existing.guid,
                    needs_update,
                    stale = stale.len(),
                    "Found existing application"
                );
                (existing, needs_update, stale)
            }
            Err(PushError::ApplicationNotFound { .. }) => {
                let desired = Application {
                    name: manifest.name.clone(),
                    space_guid: space.guid.clone(),
                    environment: manifest.env.clone(),
                    ..Default::default()
                };
                match warnings.absorb(client.create_application(&desired).await) {
                    Ok(created) => {
                        tracing::info!(app = %created.name, app_guid = %created.guid, "Created application");
                        (created, false, Vec::new())
                    }
                    Err(e) => return warnings.finish(Err(e)),
                }
            }
            Err(e) => return warnings.finish(Err(e)),
        };

        let mut plan = Self::new(application, space, artifact);
        plan.needs_update = needs_update;
        plan.stale_environment = stale_environment;
        plan.processes = manifest.process_scales();
        plan.routes = manifest.routes.clone();

        warnings.finish(Ok(plan))
    }

    pub fn package_guid(&self) -> Result<&str, PushError> {
        self.package
            .as_ref()
            .map(|p| p.guid.as_str())
            .ok_or(PushError::PlanIncomplete("package"))
    }

    pub fn build_guid(&self) -> Result<&str, PushError> {
        self.build_guid
            .as_deref()
            .ok_or(PushError::PlanIncomplete("build"))
    }

    pub fn droplet_guid(&self) -> Result<&str, PushError> {
        self.droplet_guid
            .as_deref()
            .ok_or(PushError::PlanIncomplete("droplet"))
    }
}
