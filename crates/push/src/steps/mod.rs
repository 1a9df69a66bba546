//! One async function per lifecycle step of a push.
//!
//! Every step borrows the plan mutably and only writes to it from successful
//! remote results. A step with nothing to do makes no remote calls and emits
//! no events. Otherwise it emits its starting event right before its first
//! remote call and its `complete` event after its last call succeeds.

/// Absorb the warnings of a remote result into `$warnings` and unwrap its
/// value, returning early from the step on error.
macro_rules! attempt {
    ($warnings:ident, $call:expr) => {
        match $warnings.absorb($call) {
            Ok(value) => value,
            Err(e) => return $warnings.finish(Err(e)),
        }
    };
}

mod application;
mod build;
mod package;
mod process;
mod route;

pub use application::{start_application, stop_application, update_application};
pub use build::{poll_build, set_droplet, stage_build};
pub use package::{create_package, poll_package, upload_bits};
pub use process::scale_processes;
pub use route::{create_route, manage_routes};

use crate::{EventSink, Poller, client::CloudClient};

/// The collaborators a step needs besides the plan.
#[derive(Debug)]
pub struct StepContext<'a, C> {
    pub client: &'a C,
    pub poller: &'a Poller,
    pub events: &'a EventSink,
}

impl<C> Clone for StepContext<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for StepContext<'_, C> {}

impl<'a, C: CloudClient> StepContext<'a, C> {
    pub fn new(client: &'a C, poller: &'a Poller, events: &'a EventSink) -> Self {
        Self {
            client,
            poller,
            events,
        }
    }
}
