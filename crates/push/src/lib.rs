//! dropship-push - Application push orchestration.
//!
//! This crate drives an application from local bits or a container image to a
//! running application on a remote platform: package, upload, stage, set the
//! droplet, scale, route, update and restart. Every remote call reports
//! warnings alongside its result, and progress is reported through an
//! [`EventSink`].

mod error;
pub use error::{PushError, ResourceKind};

mod warnings;
pub use warnings::{Warned, Warnings};

mod event;
pub use event::{DEFAULT_EVENT_BUFFER, Event, EventSink};

pub mod bits;
pub mod client;
pub mod config;
pub mod manifest;

mod poll;
pub use poll::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, Pollable, Poller, Terminal};

mod plan;
pub use plan::{Artifact, Plan};

pub mod steps;

mod orchestrator;
pub use orchestrator::{Orchestrator, Stage};

pub use client::{CloudClient, HttpCloudClient};
pub use config::PushConfig;
pub use manifest::{AppManifest, Manifest};
