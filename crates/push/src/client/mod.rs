//! Remote resource client interface.
//!
//! The orchestrator only talks to the control plane through [`CloudClient`].
//! [`HttpCloudClient`] is the production implementation; tests substitute a
//! scripted fake.

mod http;
mod types;

use std::future::Future;

pub use http::{HttpCloudClient, WARNINGS_HEADER};
pub use types::{
    Application, ApplicationState, Build, BuildState, DockerCredentials, Domain, NewPackage,
    NewRoute, Package, PackageKind, PackageState, ProcessScale, Resource, Route, Space,
};

use crate::Warned;

/// One operation per resource/action pair the push workflow needs.
///
/// Each call returns its result together with the warnings the control plane
/// attached to it. Implementations must be safe to share between concurrent
/// pushes of different applications.
pub trait CloudClient: Send + Sync {
    fn get_application_by_name_and_space(
        &self,
        name: &str,
        space_guid: &str,
    ) -> impl Future<Output = Warned<Application>> + Send;

    /// Create `app` (name, space and environment) and return the stored copy.
    fn create_application(
        &self,
        app: &Application,
    ) -> impl Future<Output = Warned<Application>> + Send;

    /// Push the name and environment of `app` to the remote side. Variables
    /// named in `unset` are removed from the remote environment.
    fn update_application(
        &self,
        app: &Application,
        unset: &[String],
    ) -> impl Future<Output = Warned<Application>> + Send;

    fn start_application(&self, app_guid: &str) -> impl Future<Output = Warned<Application>> + Send;

    fn stop_application(&self, app_guid: &str) -> impl Future<Output = Warned<Application>> + Send;

    fn create_package(&self, package: &NewPackage) -> impl Future<Output = Warned<Package>> + Send;

    fn get_package(&self, package_guid: &str) -> impl Future<Output = Warned<Package>> + Send;

    /// Return the subset of `resources` the remote side already stores.
    fn resource_match(
        &self,
        resources: &[Resource],
    ) -> impl Future<Output = Warned<Vec<Resource>>> + Send;

    /// Upload the already matched resources plus an archive of new files.
    fn upload_bits_package(
        &self,
        package: &Package,
        matched_resources: &[Resource],
        new_resources: Vec<u8>,
        new_resources_length: u64,
    ) -> impl Future<Output = Warned<Package>> + Send;

    fn stage_package(&self, package_guid: &str) -> impl Future<Output = Warned<Build>> + Send;

    fn get_build(&self, build_guid: &str) -> impl Future<Output = Warned<Build>> + Send;

    fn set_application_droplet(
        &self,
        app_guid: &str,
        droplet_guid: &str,
    ) -> impl Future<Output = Warned<()>> + Send;

    fn scale_process(
        &self,
        app_guid: &str,
        scale: &ProcessScale,
    ) -> impl Future<Output = Warned<()>> + Send;

    fn get_domain_by_name(&self, name: &str) -> impl Future<Output = Warned<Domain>> + Send;

    fn get_space_by_name_and_organization(
        &self,
        space_name: &str,
        organization_guid: &str,
    ) -> impl Future<Output = Warned<Space>> + Send;

    /// Create a route. A duplicate host/domain pair fails with
    /// [`crate::PushError::NotUnique`].
    fn create_route(&self, route: &NewRoute) -> impl Future<Output = Warned<Route>> + Send;

    fn get_route(
        &self,
        domain: &Domain,
        host: Option<&str>,
    ) -> impl Future<Output = Warned<Route>> + Send;

    fn map_route(&self, route_guid: &str, app_guid: &str) -> impl Future<Output = Warned<()>> + Send;
}
