//! Error taxonomy for the push workflow.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// The kind of remote resource an error or poll refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ResourceKind {
    Application,
    Package,
    Build,
    Droplet,
    Process,
    Route,
    Domain,
    Space,
}

/// Every failure the push workflow can surface.
///
/// Variants fall into four groups: transport failures, validation and
/// conflict conditions reported by the control plane, asynchronous processing
/// failures observed while polling, and not-found conditions that carry the
/// name the user asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{message}")]
    NotUnique { message: String },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("App '{name}' not found")]
    ApplicationNotFound { name: String },

    #[error("Domain '{name}' not found")]
    DomainNotFound { name: String },

    #[error("Space '{name}' not found")]
    SpaceNotFound { name: String },

    #[error("Route for host '{host}' on domain '{domain}' not found")]
    RouteNotFound { host: String, domain: String },

    #[error("{kind} '{guid}' not found")]
    ResourceNotFound { kind: ResourceKind, guid: String },

    #[error("Route '{route}' already exists.")]
    RouteAlreadyExists { route: String },

    #[error("{kind} {guid} failed processing{}", reason_suffix(.reason))]
    ProcessingFailed {
        kind: ResourceKind,
        guid: String,
        reason: Option<String>,
    },

    #[error("{kind} {guid} expired before processing finished")]
    ProcessingExpired { kind: ResourceKind, guid: String },

    #[error("push cancelled")]
    Cancelled,

    #[error("timed out after {elapsed:?} waiting for {kind} {guid}")]
    PollTimedOut {
        kind: ResourceKind,
        guid: String,
        elapsed: Duration,
    },

    #[error("plan has no {0} yet")]
    PlanIncomplete(&'static str),

    #[error("failed to read application bits at {}: {message}", .path.display())]
    Bits { path: PathBuf, message: String },

    #[error("invalid manifest: {0}")]
    Manifest(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

impl PushError {
    /// Whether the error is a user-facing condition rather than a defect.
    pub fn is_user_condition(&self) -> bool {
        matches!(
            self,
            Self::RouteAlreadyExists { .. }
                | Self::ApplicationNotFound { .. }
                | Self::DomainNotFound { .. }
                | Self::SpaceNotFound { .. }
                | Self::Manifest(_)
        )
    }
}
