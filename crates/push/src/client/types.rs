//! Remote resource representations the push workflow reacts to.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Desired or current running state of an application.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationState {
    Started,
    #[default]
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Application {
    pub guid: String,
    pub name: String,
    pub space_guid: String,
    pub state: ApplicationState,
    pub environment: BTreeMap<String, String>,
}

impl Application {
    pub fn is_started(&self) -> bool {
        self.state == ApplicationState::Started
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageKind {
    #[default]
    Bits,
    Docker,
}

/// Processing state of a package.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageState {
    #[default]
    AwaitingUpload,
    ProcessingUpload,
    Copying,
    Ready,
    Failed,
    Expired,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    pub guid: String,
    pub app_guid: String,
    pub kind: PackageKind,
    pub state: PackageState,
    pub docker_image: Option<String>,
}

/// Registry credentials for a container image package.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerCredentials {
    pub image: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for DockerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerCredentials")
            .field("image", &self.image)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Package creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewPackage {
    Bits { app_guid: String },
    Docker {
        app_guid: String,
        credentials: DockerCredentials,
    },
}

impl NewPackage {
    pub fn app_guid(&self) -> &str {
        match self {
            Self::Bits { app_guid } | Self::Docker { app_guid, .. } => app_guid,
        }
    }
}

/// Processing state of a build.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    #[default]
    #[serde(alias = "STAGING")]
    Processing,
    Staged,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Build {
    pub guid: String,
    pub package_guid: String,
    pub droplet_guid: Option<String>,
    pub state: BuildState,
    pub error: Option<String>,
}

/// Scaling request for one process type of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessScale {
    pub process_type: String,
    pub instances: Option<u32>,
    pub memory_in_mb: Option<u64>,
    pub disk_in_mb: Option<u64>,
}

impl ProcessScale {
    /// Whether the request would change anything on the remote side.
    pub fn is_empty(&self) -> bool {
        self.instances.is_none() && self.memory_in_mb.is_none() && self.disk_in_mb.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Domain {
    pub guid: String,
    pub name: String,
    pub organization_guid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub guid: String,
    pub name: String,
    pub organization_guid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    pub guid: String,
    pub host: Option<String>,
    pub domain_guid: String,
    pub space_guid: String,
}

/// Route creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRoute {
    pub host: Option<String>,
    pub domain_guid: String,
    pub space_guid: String,
}

/// Fingerprint of a single application file, used for resource matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Resource {
    /// Path relative to the application root, `/` separated.
    pub path: String,
    /// Hex encoded sha256 of the file contents.
    pub checksum: String,
    pub size: u64,
    pub mode: u32,
}
