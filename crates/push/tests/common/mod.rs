//! Scripted in-memory control plane shared by the integration tests.
//!
//! Every operation pops its next response from a per-operation queue. When a
//! queue is empty the fake answers with a plausible success, so tests only
//! script the calls they care about.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use dropship_push::{
    Artifact, EventSink, Plan, Poller, PushError, Warned, Warnings,
    client::{
        Application, ApplicationState, Build, BuildState, CloudClient, DockerCredentials, Domain,
        NewPackage, NewRoute, Package, PackageKind, PackageState, ProcessScale, Resource, Route,
        Space,
    },
    steps::StepContext,
};

pub const SPACE_GUID: &str = "some-space-guid";
pub const ORG_GUID: &str = "some-org-guid";

/// A remote call, as observed by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetApplication { name: String, space_guid: String },
    CreateApplication { name: String },
    UpdateApplication { guid: String, unset: Vec<String> },
    StartApplication(String),
    StopApplication(String),
    CreatePackage(NewPackage),
    GetPackage(String),
    ResourceMatch(Vec<String>),
    UploadBits {
        package_guid: String,
        matched: Vec<String>,
        length: u64,
    },
    StagePackage(String),
    GetBuild(String),
    SetDroplet { app_guid: String, droplet_guid: String },
    ScaleProcess { app_guid: String, process_type: String },
    GetDomain(String),
    GetSpace { name: String, organization_guid: String },
    CreateRoute(NewRoute),
    GetRoute { domain_guid: String, host: Option<String> },
    MapRoute { route_guid: String, app_guid: String },
}

/// Scripted responses, consumed front to back.
#[derive(Default)]
pub struct Script {
    pub get_application: VecDeque<Warned<Application>>,
    pub create_application: VecDeque<Warned<Application>>,
    pub update_application: VecDeque<Warned<Application>>,
    pub start_application: VecDeque<Warned<Application>>,
    pub stop_application: VecDeque<Warned<Application>>,
    pub create_package: VecDeque<Warned<Package>>,
    pub get_package: VecDeque<Warned<Package>>,
    pub resource_match: VecDeque<Warned<Vec<Resource>>>,
    pub upload_bits: VecDeque<Warned<Package>>,
    pub stage_package: VecDeque<Warned<Build>>,
    pub get_build: VecDeque<Warned<Build>>,
    pub set_droplet: VecDeque<Warned<()>>,
    pub scale_process: VecDeque<Warned<()>>,
    pub get_domain: VecDeque<Warned<Domain>>,
    pub get_space: VecDeque<Warned<Space>>,
    pub create_route: VecDeque<Warned<Route>>,
    pub get_route: VecDeque<Warned<Route>>,
    pub map_route: VecDeque<Warned<()>>,
}

#[derive(Default)]
pub struct FakeCloudClient {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

impl FakeCloudClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next<T>(
        &self,
        queue: impl FnOnce(&mut Script) -> &mut VecDeque<Warned<T>>,
        default: impl FnOnce() -> Warned<T>,
    ) -> Warned<T> {
        let scripted = queue(&mut self.script()).pop_front();
        scripted.unwrap_or_else(default)
    }
}

fn ok<T>(value: T) -> Warned<T> {
    Warned::ok(value, Warnings::new())
}

impl CloudClient for FakeCloudClient {
    async fn get_application_by_name_and_space(&self, name: &str, space_guid: &str) -> Warned<Application> {
        self.record(Call::GetApplication {
            name: name.to_string(),
            space_guid: space_guid.to_string(),
        });
        self.next(
            |s| &mut s.get_application,
            || {
                Warned::err(
                    PushError::ApplicationNotFound {
                        name: name.to_string(),
                    },
                    Warnings::new(),
                )
            },
        )
    }

    async fn create_application(&self, app: &Application) -> Warned<Application> {
        self.record(Call::CreateApplication {
            name: app.name.clone(),
        });
        self.next(
            |s| &mut s.create_application,
            || {
                ok(Application {
                    guid: format!("{}-guid", app.name),
                    state: ApplicationState::Stopped,
                    ..app.clone()
                })
            },
        )
    }

    async fn update_application(&self, app: &Application, unset: &[String]) -> Warned<Application> {
        self.record(Call::UpdateApplication {
            guid: app.guid.clone(),
            unset: unset.to_vec(),
        });
        self.next(|s| &mut s.update_application, || ok(app.clone()))
    }

    async fn start_application(&self, app_guid: &str) -> Warned<Application> {
        self.record(Call::StartApplication(app_guid.to_string()));
        self.next(
            |s| &mut s.start_application,
            || {
                ok(Application {
                    guid: app_guid.to_string(),
                    state: ApplicationState::Started,
                    ..Default::default()
                })
            },
        )
    }

    async fn stop_application(&self, app_guid: &str) -> Warned<Application> {
        self.record(Call::StopApplication(app_guid.to_string()));
        self.next(
            |s| &mut s.stop_application,
            || {
                ok(Application {
                    guid: app_guid.to_string(),
                    state: ApplicationState::Stopped,
                    ..Default::default()
                })
            },
        )
    }

    async fn create_package(&self, package: &NewPackage) -> Warned<Package> {
        self.record(Call::CreatePackage(package.clone()));
        self.next(
            |s| &mut s.create_package,
            || {
                let app_guid = package.app_guid().to_string();
                ok(match package {
                    NewPackage::Bits { .. } => Package {
                        guid: format!("{app_guid}-package"),
                        app_guid,
                        kind: PackageKind::Bits,
                        state: PackageState::AwaitingUpload,
                        docker_image: None,
                    },
                    NewPackage::Docker { credentials, .. } => Package {
                        guid: format!("{app_guid}-package"),
                        app_guid,
                        kind: PackageKind::Docker,
                        state: PackageState::Ready,
                        docker_image: Some(credentials.image.clone()),
                    },
                })
            },
        )
    }

    async fn get_package(&self, package_guid: &str) -> Warned<Package> {
        self.record(Call::GetPackage(package_guid.to_string()));
        self.next(
            |s| &mut s.get_package,
            || {
                ok(Package {
                    guid: package_guid.to_string(),
                    state: PackageState::Ready,
                    ..Default::default()
                })
            },
        )
    }

    async fn resource_match(&self, resources: &[Resource]) -> Warned<Vec<Resource>> {
        self.record(Call::ResourceMatch(
            resources.iter().map(|r| r.path.clone()).collect(),
        ));
        self.next(|s| &mut s.resource_match, || ok(Vec::new()))
    }

    async fn upload_bits_package(
        &self,
        package: &Package,
        matched_resources: &[Resource],
        _new_resources: Vec<u8>,
        new_resources_length: u64,
    ) -> Warned<Package> {
        self.record(Call::UploadBits {
            package_guid: package.guid.clone(),
            matched: matched_resources.iter().map(|r| r.path.clone()).collect(),
            length: new_resources_length,
        });
        self.next(
            |s| &mut s.upload_bits,
            || {
                ok(Package {
                    state: PackageState::ProcessingUpload,
                    ..package.clone()
                })
            },
        )
    }

    async fn stage_package(&self, package_guid: &str) -> Warned<Build> {
        self.record(Call::StagePackage(package_guid.to_string()));
        self.next(
            |s| &mut s.stage_package,
            || {
                ok(Build {
                    guid: format!("{package_guid}-build"),
                    package_guid: package_guid.to_string(),
                    state: BuildState::Processing,
                    ..Default::default()
                })
            },
        )
    }

    async fn get_build(&self, build_guid: &str) -> Warned<Build> {
        self.record(Call::GetBuild(build_guid.to_string()));
        self.next(
            |s| &mut s.get_build,
            || {
                ok(Build {
                    guid: build_guid.to_string(),
                    droplet_guid: Some(format!("{build_guid}-droplet")),
                    state: BuildState::Staged,
                    ..Default::default()
                })
            },
        )
    }

    async fn set_application_droplet(&self, app_guid: &str, droplet_guid: &str) -> Warned<()> {
        self.record(Call::SetDroplet {
            app_guid: app_guid.to_string(),
            droplet_guid: droplet_guid.to_string(),
        });
        self.next(|s| &mut s.set_droplet, || ok(()))
    }

    async fn scale_process(&self, app_guid: &str, scale: &ProcessScale) -> Warned<()> {
        self.record(Call::ScaleProcess {
            app_guid: app_guid.to_string(),
            process_type: scale.process_type.clone(),
        });
        self.next(|s| &mut s.scale_process, || ok(()))
    }

    async fn get_domain_by_name(&self, name: &str) -> Warned<Domain> {
        self.record(Call::GetDomain(name.to_string()));
        self.next(
            |s| &mut s.get_domain,
            || {
                ok(Domain {
                    guid: format!("{name}-guid"),
                    name: name.to_string(),
                    organization_guid: ORG_GUID.to_string(),
                })
            },
        )
    }

    async fn get_space_by_name_and_organization(
        &self,
        space_name: &str,
        organization_guid: &str,
    ) -> Warned<Space> {
        self.record(Call::GetSpace {
            name: space_name.to_string(),
            organization_guid: organization_guid.to_string(),
        });
        self.next(
            |s| &mut s.get_space,
            || {
                ok(Space {
                    guid: SPACE_GUID.to_string(),
                    name: space_name.to_string(),
                    organization_guid: organization_guid.to_string(),
                })
            },
        )
    }

    async fn create_route(&self, route: &NewRoute) -> Warned<Route> {
        self.record(Call::CreateRoute(route.clone()));
        self.next(
            |s| &mut s.create_route,
            || {
                ok(Route {
                    guid: format!("{}-route", route.domain_guid),
                    host: route.host.clone(),
                    domain_guid: route.domain_guid.clone(),
                    space_guid: route.space_guid.clone(),
                })
            },
        )
    }

    async fn get_route(&self, domain: &Domain, host: Option<&str>) -> Warned<Route> {
        self.record(Call::GetRoute {
            domain_guid: domain.guid.clone(),
            host: host.map(str::to_string),
        });
        self.next(
            |s| &mut s.get_route,
            || {
                ok(Route {
                    guid: "existing-route-guid".to_string(),
                    host: host.map(str::to_string),
                    domain_guid: domain.guid.clone(),
                    space_guid: SPACE_GUID.to_string(),
                })
            },
        )
    }

    async fn map_route(&self, route_guid: &str, app_guid: &str) -> Warned<()> {
        self.record(Call::MapRoute {
            route_guid: route_guid.to_string(),
            app_guid: app_guid.to_string(),
        });
        self.next(|s| &mut s.map_route, || ok(()))
    }
}

pub fn space() -> Space {
    Space {
        guid: SPACE_GUID.to_string(),
        name: "some-space".to_string(),
        organization_guid: ORG_GUID.to_string(),
    }
}

pub fn application(name: &str, state: ApplicationState) -> Application {
    Application {
        guid: format!("{name}-guid"),
        name: name.to_string(),
        space_guid: SPACE_GUID.to_string(),
        state,
        ..Default::default()
    }
}

pub fn docker_artifact() -> Artifact {
    Artifact::Docker(DockerCredentials {
        image: "registry.example.com/app:1".to_string(),
        username: Some("user".to_string()),
        password: Some("secret".to_string()),
    })
}

/// A plan for a container image push of `name` in the given state.
pub fn docker_plan(name: &str, state: ApplicationState) -> Plan {
    Plan::new(application(name, state), space(), docker_artifact())
}

pub fn warnings(items: &[&str]) -> Warnings {
    items.iter().copied().collect()
}

/// Poller with a short interval, for tests on a paused clock.
pub fn poller() -> Poller {
    Poller::new(Duration::from_secs(1))
}

/// Drain every event currently buffered in `rx`.
pub fn drain(rx: &mut tokio::sync::mpsc::Receiver<dropship_push::Event>) -> Vec<String> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.to_string());
    }
    events
}

/// A step context over `client` whose events land in the returned receiver.
pub struct Harness<'a> {
    pub client: &'a FakeCloudClient,
    pub poller: Poller,
    pub events: EventSink,
    pub rx: tokio::sync::mpsc::Receiver<dropship_push::Event>,
}

impl<'a> Harness<'a> {
    pub fn new(client: &'a FakeCloudClient) -> Self {
        let (events, rx) = EventSink::channel(64);
        Self {
            client,
            poller: poller(),
            events,
            rx,
        }
    }

    pub fn ctx(&self) -> StepContext<'_, FakeCloudClient> {
        StepContext::new(self.client, &self.poller, &self.events)
    }

    pub fn events(&mut self) -> Vec<String> {
        drain(&mut self.rx)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
