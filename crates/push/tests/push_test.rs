//! End-to-end pushes through the orchestrator.

mod common;

use std::{collections::BTreeMap, fs, sync::Arc, time::Duration};

use common::{Call, FakeCloudClient, application, docker_artifact, docker_plan, space, warnings};
use dropship_push::{
    Artifact, Event, EventSink, Manifest, Orchestrator, Plan, Poller, PushError, Warned,
    client::{ApplicationState, Build, BuildState, Package, PackageState},
};
use futures::future::join_all;
use tempdir::TempDir;
use tokio::sync::mpsc::Receiver;

const MANIFEST: &str = r#"
applications:
- name: sidecar-app
  instances: 2
  memory: 256M
  env:
    CONFIG_SERVER_PORT: 8082
  routes:
  - route: sidecar-app.example.com
"#;

fn orchestrator(
    client: Arc<FakeCloudClient>,
) -> (Orchestrator<FakeCloudClient>, Receiver<Event>) {
    let (events, rx) = EventSink::channel(64);
    let orchestrator = Orchestrator::new(client)
        .with_poller(Poller::new(Duration::from_secs(1)))
        .with_events(events);
    (orchestrator, rx)
}

#[tokio::test(start_paused = true)]
async fn test_bits_push_end_to_end() {
    common::init_tracing();

    let dir = TempDir::new("dropship-push").unwrap();
    fs::write(dir.path().join("index.html"), "hello").unwrap();
    fs::write(dir.path().join("manifest.yml"), MANIFEST).unwrap();

    let manifest = Manifest::from_yaml(MANIFEST).unwrap();
    let app = manifest.application(None).unwrap();
    let artifact = Artifact::from_manifest(app, dir.path(), None).unwrap();

    let client = Arc::new(FakeCloudClient::new());
    {
        let mut script = client.script();
        script.get_package.push_back(Warned::ok(
            Package {
                guid: "sidecar-app-guid-package".to_string(),
                state: PackageState::ProcessingUpload,
                ..Default::default()
            },
            warnings(&["package-processing"]),
        ));
        script.get_build.push_back(Warned::ok(
            Build {
                guid: "sidecar-app-guid-package-build".to_string(),
                state: BuildState::Processing,
                ..Default::default()
            },
            warnings(&["build-processing"]),
        ));
        // `sidecar-app.example.com` is not a domain itself
        script.get_domain.push_back(Warned::err(
            PushError::DomainNotFound {
                name: "sidecar-app.example.com".to_string(),
            },
            warnings(&[]),
        ));
    }

    let resolved = Plan::resolve(client.as_ref(), space(), app, artifact).await;
    assert!(resolved.warnings.is_empty());
    let mut plan = resolved.value.unwrap();
    assert!(!plan.needs_update);

    let (orchestrator, mut rx) = orchestrator(client.clone());
    let pushed = orchestrator.run(&mut plan).await;

    assert_eq!(pushed.value, Ok(()));
    assert_eq!(*pushed.warnings, vec!["package-processing", "build-processing"]);
    assert_eq!(
        common::drain(&mut rx),
        vec![
            "creating package",
            "creating package complete",
            "uploading bits",
            "uploading bits complete",
            "polling package",
            "polling package complete",
            "staging",
            "staging complete",
            "polling build",
            "polling build complete",
            "setting droplet",
            "setting droplet complete",
            "scaling processes",
            "scaling processes complete",
            "creating routes",
            "creating routes complete",
            "starting application",
            "starting application complete",
        ]
    );

    assert_eq!(
        plan.droplet_guid.as_deref(),
        Some("sidecar-app-guid-package-build-droplet")
    );
    assert_eq!(plan.application.state, ApplicationState::Started);

    let calls = client.calls();
    assert_eq!(
        calls[..2],
        [
            Call::GetApplication {
                name: "sidecar-app".to_string(),
                space_guid: common::SPACE_GUID.to_string(),
            },
            Call::CreateApplication {
                name: "sidecar-app".to_string(),
            },
        ]
    );
    assert!(calls.contains(&Call::ResourceMatch(vec!["index.html".to_string()])));
    assert!(calls.contains(&Call::SetDroplet {
        app_guid: "sidecar-app-guid".to_string(),
        droplet_guid: "sidecar-app-guid-package-build-droplet".to_string(),
    }));
    assert!(calls.contains(&Call::MapRoute {
        route_guid: "example.com-guid-route".to_string(),
        app_guid: "sidecar-app-guid".to_string(),
    }));
    assert!(!calls.iter().any(|c| matches!(c, Call::StopApplication(_))));
    assert_eq!(
        calls.last(),
        Some(&Call::StartApplication("sidecar-app-guid".to_string()))
    );
}

#[tokio::test]
async fn test_docker_push_restarts_updated_application() {
    let client = Arc::new(FakeCloudClient::new());
    let mut existing = application("web-app", ApplicationState::Started);
    existing
        .environment
        .insert("OLD".to_string(), "value".to_string());
    client
        .script()
        .get_application
        .push_back(Warned::ok(existing, warnings(&["lookup-warning"])));

    let manifest = Manifest::from_yaml(
        "applications:\n- name: web-app\n  docker:\n    image: registry.example.com/app:1\n  env:\n    NEW: value\n",
    )
    .unwrap();
    let app = manifest.application(Some("web-app")).unwrap();

    let resolved = Plan::resolve(client.as_ref(), space(), app, docker_artifact()).await;
    assert_eq!(*resolved.warnings, vec!["lookup-warning"]);
    let mut plan = resolved.value.unwrap();
    assert!(plan.needs_update);
    assert_eq!(
        plan.application.environment,
        BTreeMap::from([("NEW".to_string(), "value".to_string())])
    );
    assert_eq!(plan.stale_environment, vec!["OLD".to_string()]);

    let (orchestrator, mut rx) = orchestrator(client.clone());
    let pushed = orchestrator.run(&mut plan).await;

    assert_eq!(pushed.value, Ok(()));
    assert_eq!(
        common::drain(&mut rx),
        vec![
            "creating package",
            "creating package complete",
            "staging",
            "staging complete",
            "polling build",
            "polling build complete",
            "setting droplet",
            "setting droplet complete",
            "updating application",
            "updating application complete",
            "stopping application",
            "stopping application complete",
            "starting application",
            "starting application complete",
        ]
    );
    assert!(!plan.needs_update);
    assert_eq!(plan.application.state, ApplicationState::Started);

    let calls = client.calls();
    assert!(calls.contains(&Call::UpdateApplication {
        guid: "web-app-guid".to_string(),
        unset: vec!["OLD".to_string()],
    }));
    assert!(!calls.iter().any(|c| matches!(
        c,
        Call::ResourceMatch(_) | Call::UploadBits { .. } | Call::GetPackage(_)
    )));
}

#[tokio::test]
async fn test_resolve_settles_once_environment_matches() {
    let client = FakeCloudClient::new();
    let mut existing = application("web-app", ApplicationState::Started);
    existing
        .environment
        .insert("NEW".to_string(), "value".to_string());
    client
        .script()
        .get_application
        .push_back(Warned::ok(existing, warnings(&[])));

    let manifest = Manifest::from_yaml(
        "applications:\n- name: web-app\n  docker:\n    image: registry.example.com/app:1\n  env:\n    NEW: value\n",
    )
    .unwrap();

    let plan = Plan::resolve(
        &client,
        space(),
        manifest.application(None).unwrap(),
        docker_artifact(),
    )
    .await
    .value
    .unwrap();

    assert!(!plan.needs_update);
    assert!(plan.stale_environment.is_empty());
}

#[tokio::test]
async fn test_resolve_propagates_lookup_errors() {
    let client = FakeCloudClient::new();
    client.script().get_application.push_back(Warned::err(
        PushError::Server {
            status: 500,
            message: "boom".to_string(),
        },
        warnings(&["lookup-warning"]),
    ));
    let manifest = Manifest::from_yaml("applications:\n- name: some-app\n").unwrap();

    let resolved = Plan::resolve(
        &client,
        space(),
        manifest.application(None).unwrap(),
        docker_artifact(),
    )
    .await;

    assert!(matches!(resolved.value, Err(PushError::Server { status: 500, .. })));
    assert_eq!(*resolved.warnings, vec!["lookup-warning"]);
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn test_first_error_halts_with_accumulated_warnings() {
    let client = Arc::new(FakeCloudClient::new());
    {
        let mut script = client.script();
        script.create_package.push_back(Warned::ok(
            Package {
                guid: "some-package-guid".to_string(),
                state: PackageState::Ready,
                ..Default::default()
            },
            warnings(&["package-warning"]),
        ));
        script.stage_package.push_back(Warned::err(
            PushError::Validation {
                message: "no buildpack".to_string(),
            },
            warnings(&["staging-warning"]),
        ));
    }
    let mut plan = docker_plan("some-app", ApplicationState::Started);

    let (orchestrator, mut rx) = orchestrator(client.clone());
    let pushed = orchestrator.run(&mut plan).await;

    assert_eq!(
        pushed.value,
        Err(PushError::Validation {
            message: "no buildpack".to_string()
        })
    );
    assert_eq!(*pushed.warnings, vec!["package-warning", "staging-warning"]);
    assert_eq!(
        common::drain(&mut rx),
        vec!["creating package", "creating package complete", "staging"]
    );
    assert_eq!(plan.build_guid, None);
    // Nothing after the failing stage ran, and nothing was rolled back.
    assert_eq!(client.calls().len(), 2);
    assert_eq!(plan.application.state, ApplicationState::Started);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let client = Arc::new(FakeCloudClient::new());
    let mut plan = docker_plan("some-app", ApplicationState::Stopped);

    let (orchestrator, mut rx) = orchestrator(client.clone());
    orchestrator.cancellation().cancel();
    let pushed = orchestrator.run(&mut plan).await;

    assert_eq!(pushed.value, Err(PushError::Cancelled));
    assert!(client.calls().is_empty());
    assert!(common::drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_while_polling_build() {
    let client = Arc::new(FakeCloudClient::new());
    {
        let mut script = client.script();
        for _ in 0..100 {
            script.get_build.push_back(Warned::ok(
                Build {
                    guid: "some-app-guid-package-build".to_string(),
                    state: BuildState::Processing,
                    ..Default::default()
                },
                warnings(&["still staging"]),
            ));
        }
    }
    let mut plan = docker_plan("some-app", ApplicationState::Stopped);
    let (orchestrator, mut rx) = orchestrator(client.clone());

    let cancel = orchestrator.cancellation();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        cancel.cancel();
    });
    let pushed = orchestrator.run(&mut plan).await;

    assert_eq!(pushed.value, Err(PushError::Cancelled));
    assert_eq!(*pushed.warnings, vec!["still staging"; 3]);
    assert_eq!(
        common::drain(&mut rx).last().map(String::as_str),
        Some("polling build")
    );
    assert!(!client
        .calls()
        .iter()
        .any(|c| matches!(c, Call::SetDroplet { .. })));
}

#[tokio::test]
async fn test_concurrent_pushes_share_a_client() {
    let client = Arc::new(FakeCloudClient::new());
    let names = ["app-one", "app-two", "app-three"];

    let mut plans: Vec<Plan> = names
        .iter()
        .map(|name| docker_plan(name, ApplicationState::Stopped))
        .collect();
    let orchestrators: Vec<_> = names
        .iter()
        .map(|_| Orchestrator::new(client.clone()))
        .collect();

    let results = join_all(
        orchestrators
            .iter()
            .zip(plans.iter_mut())
            .map(|(orchestrator, plan)| orchestrator.run(plan)),
    )
    .await;

    for result in &results {
        assert_eq!(result.value, Ok(()));
    }
    for (plan, name) in plans.iter().zip(names) {
        assert_eq!(plan.application.state, ApplicationState::Started);
        assert_eq!(
            plan.droplet_guid,
            Some(format!("{name}-guid-package-build-droplet"))
        );
    }
    assert_eq!(
        client
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::StartApplication(_)))
            .count(),
        names.len()
    );
}
