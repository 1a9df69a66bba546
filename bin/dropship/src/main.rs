//! dropship pushes an application described by a manifest to a remote platform.

mod cli;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use tokio::sync::mpsc::Receiver;

use cli::Cli;
use dropship_push::{
    Artifact, Event, EventSink, HttpCloudClient, Manifest, Orchestrator, Plan, PushConfig,
    PushError, Warnings,
    client::Space,
    config::CONFIG_FILENAME,
    manifest::DockerManifest,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = load_config(&cli)?;
    if cli.save_config {
        config.save_to_file(&config_file(cli.config.as_deref()))?;
    }

    let manifest = Manifest::load(&cli.manifest)?;
    let mut app = manifest.application(cli.app.as_deref())?.clone();

    if let Some(path) = &cli.path {
        app.path = Some(path.clone());
        app.docker = None;
    }
    if let Some(image) = &cli.docker_image {
        app.docker = Some(DockerManifest {
            image: image.clone(),
            username: cli.docker_username.clone(),
        });
        app.path = None;
    }

    let base_dir = match cli.manifest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    let artifact = Artifact::from_manifest(&app, &base_dir, cli.docker_password.clone())
        .context("Failed to prepare application artifact")?;

    tracing::info!(
        app = %app.name,
        api = %config.api,
        space = %config.target.space_name,
        docker = artifact.is_docker(),
        "Preparing push..."
    );

    let client = Arc::new(
        HttpCloudClient::new(config.api.clone(), config.token.clone())
            .context("Failed to create API client")?,
    );
    let space = Space {
        guid: config.target.space_guid.clone(),
        name: config.target.space_name.clone(),
        organization_guid: config.target.organization_guid.clone(),
    };

    let (resolved, mut warnings) = Plan::resolve(client.as_ref(), space, &app, artifact)
        .await
        .into_parts();
    let mut plan = match resolved {
        Ok(plan) => plan,
        Err(e) => {
            print_warnings(&warnings);
            return Err(failure(e, format!("Failed to resolve application {}", app.name)));
        }
    };

    let (events, rx) = EventSink::channel(config.event_buffer);
    let orchestrator = Orchestrator::new(client)
        .with_poller(config.polling.poller())
        .with_events(events);

    let printer = tokio::spawn(print_events(rx));

    let cancel = orchestrator.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, cancelling push...");
            cancel.cancel();
        }
    });

    let pushed = orchestrator.run(&mut plan).await;

    // Dropping the orchestrator closes the event channel.
    drop(orchestrator);
    let _ = printer.await;

    let (result, push_warnings) = pushed.into_parts();
    warnings.append(push_warnings);
    print_warnings(&warnings);

    result.map_err(|e| failure(e, format!("Failed to push application {}", plan.app_name)))?;

    println!("{}", summary(&plan));
    Ok(())
}

/// Conditions the user can act on, such as a taken route, are reported as
/// is. Anything else gets `context` attached.
fn failure(error: PushError, context: String) -> anyhow::Error {
    if error.is_user_condition() {
        anyhow::Error::new(error)
    } else {
        anyhow::Error::new(error).context(context)
    }
}

/// Load the configuration from the TOML file, then apply environment overrides.
fn load_config(cli: &Cli) -> Result<PushConfig> {
    let path = config_file(cli.config.as_deref());

    let mut figment = Figment::new()
        .merge(Toml::file(&path))
        .merge(Env::prefixed("DROPSHIP_").split("__"));
    if let Some(api) = &cli.api {
        figment = figment.merge(("api", api.as_str()));
    }

    let config: PushConfig = figment
        .extract()
        .context(format!("Failed to load configuration from {}", path.display()))?;

    tracing::debug!(path = %path.display(), api = %config.api, "Configuration loaded");
    Ok(config)
}

/// Resolve the configuration file: an explicit file or directory, then the
/// working directory, then the user configuration directory.
fn config_file(path: Option<&Path>) -> PathBuf {
    match path {
        Some(path) if path.is_dir() => path.join(CONFIG_FILENAME),
        Some(path) => path.to_path_buf(),
        None => {
            let local = PathBuf::from(CONFIG_FILENAME);
            match dirs::config_dir() {
                Some(dir) if !local.exists() => dir.join("dropship").join(CONFIG_FILENAME),
                _ => local,
            }
        }
    }
}

async fn print_events(mut rx: Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        tracing::info!("{event}");
    }
}

fn print_warnings(warnings: &Warnings) {
    for warning in warnings.iter() {
        tracing::warn!("{warning}");
    }
}

fn summary(plan: &Plan) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);

    let package = plan
        .package
        .as_ref()
        .map(|p| p.guid.as_str())
        .unwrap_or("-");
    let state = plan.application.state.to_string();
    let routes = plan
        .routes
        .iter()
        .map(|r| r.route.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    table.add_row(vec!["Application", plan.app_name.as_str()]);
    table.add_row(vec!["GUID", plan.application.guid.as_str()]);
    table.add_row(vec!["Space", plan.space.name.as_str()]);
    table.add_row(vec!["State", state.as_str()]);
    table.add_row(vec!["Package", package]);
    table.add_row(vec!["Droplet", plan.droplet_guid.as_deref().unwrap_or("-")]);
    table.add_row(vec!["Routes", if routes.is_empty() { "-" } else { routes.as_str() }]);
    table
}
