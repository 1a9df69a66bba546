use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use url::Url;

/// The default manifest file name.
const DEFAULT_MANIFEST: &str = "manifest.yml";

#[derive(Parser)]
#[command(name = "dropship")]
#[command(
    author,
    version,
    about = "Push an application from local bits or a container image"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "DROPSHIP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Dropship.toml configuration file, or a directory containing one.
    ///
    /// If not provided, ./Dropship.toml is used when present, otherwise
    /// <config dir>/dropship/Dropship.toml.
    ///
    /// Values can be overridden with `DROPSHIP_` prefixed environment variables,
    /// nested keys separated by `__` (e.g. `DROPSHIP_TARGET__SPACE_NAME`).
    #[arg(long, alias = "conf", env = "DROPSHIP_CONFIG")]
    pub config: Option<PathBuf>,

    /// The application manifest.
    #[arg(short, long, env = "DROPSHIP_MANIFEST", default_value = DEFAULT_MANIFEST)]
    pub manifest: PathBuf,

    /// Name of the application to push. Required when the manifest declares
    /// several applications.
    #[arg(short, long, visible_alias = "name")]
    pub app: Option<String>,

    /// Directory of application bits, overriding the manifest.
    #[arg(short, long, conflicts_with = "docker_image")]
    pub path: Option<PathBuf>,

    /// Container image to push instead of local bits.
    #[arg(long, alias = "docker")]
    pub docker_image: Option<String>,

    /// Registry user for the container image.
    #[arg(long, requires = "docker_image")]
    pub docker_username: Option<String>,

    /// Registry password for the container image.
    #[arg(long, env = "DROPSHIP_DOCKER_PASSWORD", hide_env_values = true)]
    pub docker_password: Option<String>,

    /// Override the control plane API endpoint.
    #[arg(long, env = "DROPSHIP_API")]
    pub api: Option<Url>,

    /// Write the effective configuration to the config path before pushing.
    #[arg(long, default_value_t = false)]
    pub save_config: bool,
}
