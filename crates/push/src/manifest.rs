//! Application manifest parsing.
//!
//! A manifest is read once when a plan is built and never re-read while the
//! plan is pushed.

use std::{collections::BTreeMap, path::{Path, PathBuf}};

use serde::{Deserialize, Deserializer, de};

use crate::{PushError, client::ProcessScale};

/// Process type that top-level `instances`, `memory` and `disk_quota` apply to.
pub const WEB_PROCESS: &str = "web";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub applications: Vec<AppManifest>,
}

/// Desired state of a single application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppManifest {
    pub name: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub docker: Option<DockerManifest>,
    #[serde(default, deserialize_with = "deserialize_env")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub instances: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_megabytes")]
    pub memory: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_megabytes")]
    pub disk_quota: Option<u64>,
    #[serde(default)]
    pub processes: Vec<ProcessManifest>,
    #[serde(default)]
    pub routes: Vec<RouteManifest>,
    #[serde(default, rename = "no-route")]
    pub no_route: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DockerManifest {
    pub image: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProcessManifest {
    #[serde(rename = "type")]
    pub process_type: String,
    #[serde(default)]
    pub instances: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_megabytes")]
    pub memory: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_megabytes")]
    pub disk_quota: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RouteManifest {
    pub route: String,
}

impl RouteManifest {
    /// Host and domain splits to try, most specific domain first.
    ///
    /// `app.example.com` is first tried as a bare domain, then as host `app`
    /// on domain `example.com`.
    pub fn candidates(&self) -> Vec<(Option<&str>, &str)> {
        let route = self.route.trim().trim_end_matches('/');
        let mut candidates = vec![(None, route)];
        if let Some((host, domain)) = route.split_once('.')
            && !host.is_empty()
            && domain.contains('.')
        {
            candidates.push((Some(host), domain));
        }
        candidates
    }
}

impl Manifest {
    pub fn from_yaml(raw: &str) -> Result<Self, PushError> {
        let manifest: Self =
            serde_yaml::from_str(raw).map_err(|e| PushError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, PushError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PushError::Manifest(format!("failed to read {}: {e}", path.display()))
        })?;
        let manifest = Self::from_yaml(&raw)?;
        tracing::debug!(path = %path.display(), apps = manifest.applications.len(), "Manifest loaded");
        Ok(manifest)
    }

    /// Select the application to push. Without a name the manifest must
    /// describe exactly one application.
    pub fn application(&self, name: Option<&str>) -> Result<&AppManifest, PushError> {
        match name {
            Some(name) => self
                .applications
                .iter()
                .find(|app| app.name == name)
                .ok_or_else(|| PushError::Manifest(format!("no application named '{name}'"))),
            None => match self.applications.as_slice() {
                [app] => Ok(app),
                [] => Err(PushError::Manifest("no applications declared".to_string())),
                _ => Err(PushError::Manifest(
                    "several applications declared, select one by name".to_string(),
                )),
            },
        }
    }

    fn validate(&self) -> Result<(), PushError> {
        for app in &self.applications {
            if app.name.trim().is_empty() {
                return Err(PushError::Manifest("application name must not be empty".to_string()));
            }
            if app.docker.is_some() && app.path.is_some() {
                return Err(PushError::Manifest(format!(
                    "application '{}' cannot declare both docker and path",
                    app.name
                )));
            }
            if app.no_route && !app.routes.is_empty() {
                return Err(PushError::Manifest(format!(
                    "application '{}' cannot declare routes together with no-route",
                    app.name
                )));
            }
        }
        Ok(())
    }
}

impl AppManifest {
    /// Scaling requests, one per declared process type.
    ///
    /// Top-level sizing applies to the web process unless a `web` entry in
    /// `processes` overrides it.
    pub fn process_scales(&self) -> Vec<ProcessScale> {
        let mut scales: Vec<ProcessScale> = Vec::new();

        let web = ProcessScale {
            process_type: WEB_PROCESS.to_string(),
            instances: self.instances,
            memory_in_mb: self.memory,
            disk_in_mb: self.disk_quota,
        };
        if !web.is_empty() {
            scales.push(web);
        }

        for process in &self.processes {
            let scale = ProcessScale {
                process_type: process.process_type.clone(),
                instances: process.instances,
                memory_in_mb: process.memory,
                disk_in_mb: process.disk_quota,
            };

            match scales.iter_mut().find(|s| s.process_type == scale.process_type) {
                Some(existing) => {
                    existing.instances = scale.instances.or(existing.instances);
                    existing.memory_in_mb = scale.memory_in_mb.or(existing.memory_in_mb);
                    existing.disk_in_mb = scale.disk_in_mb.or(existing.disk_in_mb);
                }
                None if !scale.is_empty() => scales.push(scale),
                None => {}
            }
        }

        scales
    }
}

/// Parse a size such as `256M`, `1G`, `512MB` or `1024` (megabytes) into
/// megabytes.
pub fn parse_megabytes(raw: &str) -> Result<u64, String> {
    let normalized = raw.trim().to_ascii_uppercase();
    let normalized = normalized.strip_suffix('B').unwrap_or(normalized.as_str());

    let (digits, multiplier) = match normalized.chars().last() {
        Some('M') => (&normalized[..normalized.len() - 1], 1),
        Some('G') => (&normalized[..normalized.len() - 1], 1024),
        Some('T') => (&normalized[..normalized.len() - 1], 1024 * 1024),
        Some(c) if c.is_ascii_digit() => (normalized, 1),
        _ => return Err(format!("invalid size '{raw}'")),
    };

    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|value| value.checked_mul(multiplier))
        .ok_or_else(|| format!("invalid size '{raw}'"))
}

fn deserialize_megabytes<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(mb)) => Ok(Some(mb)),
        Some(Raw::Text(text)) => parse_megabytes(&text).map(Some).map_err(de::Error::custom),
    }
}

/// Environment values may be written as strings, numbers or booleans.
fn deserialize_env<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;

    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                _ => {
                    return Err(de::Error::custom(format!(
                        "environment variable '{key}' must be a scalar"
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}
