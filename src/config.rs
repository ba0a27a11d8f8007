// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the __platform manifest__ to simplify the process of
//! serialization and deserialization. The manifest describes everything the
//! recipes need to know about the platform: which sibling repositories make
//! it up, which domains it serves, how compose services are grouped, which
//! databases can be seeded from a dump, and which CI pipelines to watch.
//!
//! # Lookup Order
//!
//! 1. Path given explicitly by the caller.
//! 2. `hotdev.toml` at the top-level of the harness root.
//! 3. `$XDG_CONFIG_HOME/hotdev/hotdev.toml`.
//! 4. Built-in copy of the default manifest.

use crate::path::{user_manifest_path, MANIFEST_FILE};

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Default platform manifest shipped with the harness.
pub const DEFAULT_MANIFEST: &str = include_str!("../hotdev.toml");

/// Platform manifest layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Platform wide settings.
    pub settings: Settings,

    /// Sibling repositories that make up the platform.
    #[serde(rename = "project", default)]
    pub projects: Vec<Project>,

    /// Compose dispatch settings.
    pub compose: ComposeSettings,

    /// Databases that can be seeded from a dump.
    #[serde(rename = "dump", default)]
    pub dumps: Vec<DumpTarget>,

    /// Distribution of shared auth client libraries.
    pub auth_libs: Option<AuthLibs>,

    /// Application catalogue of the CI status dashboard.
    #[serde(rename = "app", default)]
    pub apps: Vec<AppEntry>,
}

impl Manifest {
    /// Load manifest according to lookup order.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if a manifest file exists but cannot be
    ///   read.
    /// - Return [`ConfigError::Deserialize`] if manifest is malformed.
    /// - Return [`ConfigError::ShellExpansion`] if a path field refers to an
    ///   undefined variable.
    pub fn load(explicit: Option<&Path>, root: &Path) -> Result<Self> {
        let mut candidates = Vec::new();
        if let Some(path) = explicit {
            candidates.push(path.to_path_buf());
        } else {
            candidates.push(root.join(MANIFEST_FILE));
            if let Ok(path) = user_manifest_path() {
                candidates.push(path);
            }
        }

        for path in candidates {
            if explicit.is_none() && !path.exists() {
                continue;
            }

            debug!("load manifest {:?}", path.display());
            let data = read_to_string(&path).map_err(|err| ConfigError::Read {
                source: err,
                path: path.clone(),
            })?;
            return data.parse();
        }

        debug!("load built-in manifest");
        DEFAULT_MANIFEST.parse()
    }

    /// Find project by name.
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|project| project.name == name)
    }

    /// Find dump target by app key.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownApp`] if no target uses the key.
    pub fn dump_target(&self, app: &str) -> Result<&DumpTarget> {
        self.dumps
            .iter()
            .find(|target| target.app == app)
            .ok_or_else(|| ConfigError::UnknownApp {
                app: app.to_string(),
                known: self.dumps.iter().map(|target| target.app.clone()).collect(),
            })
    }

    /// Hostnames the platform serves, base domain first.
    pub fn hostnames(&self) -> Vec<String> {
        let mut names = vec![self.settings.base_domain.clone()];
        for domain in &self.settings.domains {
            if !names.contains(domain) {
                names.push(domain.clone());
            }
        }

        names
    }

    fn expand_paths(mut self) -> Result<Self> {
        self.settings.certs_dir = self.settings.certs_dir.expand()?;
        self.compose.file = self.compose.file.expand()?;
        for project in &mut self.projects {
            project.dir = project.dir.expand()?;
        }
        for target in &mut self.dumps {
            if let Some(seed) = target.test_users.take() {
                target.test_users = Some(seed.expand()?);
            }
        }
        if let Some(auth_libs) = &mut self.auth_libs {
            auth_libs.source = auth_libs.source.expand()?;
            for consumer in &mut auth_libs.consumers {
                consumer.target = consumer.target.expand()?;
            }
        }

        Ok(self)
    }
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let manifest: Manifest = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        manifest.expand_paths()
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Platform wide settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Parent domain of every service, e.g., "hotosm.test".
    pub base_domain: String,

    /// Hostnames that must resolve locally and be covered by the certificate.
    #[serde(default)]
    pub domains: Vec<String>,

    /// Address every hostname resolves to.
    #[serde(default = "default_hosts_ip")]
    pub hosts_ip: String,

    /// Directory holding the local certificate pair, relative to the root.
    #[serde(default = "default_certs_dir")]
    pub certs_dir: ManifestPath,
}

fn default_hosts_ip() -> String {
    "127.0.0.1".into()
}

fn default_certs_dir() -> ManifestPath {
    ManifestPath::new("certs")
}

/// Sibling repository entry.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Project {
    /// Short name used on the command line.
    pub name: String,

    /// Checkout directory, relative to the parent of the harness root.
    pub dir: ManifestPath,

    /// GitHub repository in "owner/name" form.
    pub repo: String,

    /// Branch to check out instead of the default branch.
    pub branch: Option<String>,
}

/// Compose dispatch settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ComposeSettings {
    /// Compose file, relative to the harness root.
    pub file: ManifestPath,

    /// Services every service group depends on, e.g., the reverse proxy.
    #[serde(default)]
    pub base: Vec<String>,

    /// Named groups of services that can be started on their own.
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

/// Database that can be seeded from a dump.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DumpTarget {
    /// App key used on the command line.
    pub app: String,

    /// Container running the database server.
    pub container: String,

    /// Database role owning the database.
    pub user: String,

    /// Database name.
    pub database: String,

    /// Backend container to stop while the database is replaced.
    pub backend: String,

    /// Enable the postgis extension after restoring.
    #[serde(default)]
    pub postgis: bool,

    /// SQL file seeding test users, relative to the harness root.
    pub test_users: Option<ManifestPath>,
}

/// Shared auth client library distribution.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct AuthLibs {
    /// Project shipping the libraries.
    pub project: String,

    /// Library directory, relative to the shipping project.
    pub source: ManifestPath,

    /// Projects consuming the libraries.
    #[serde(rename = "consumer", default)]
    pub consumers: Vec<AuthLibConsumer>,
}

/// Consumer of the shared auth client libraries.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct AuthLibConsumer {
    /// Consuming project.
    pub project: String,

    /// Where the libraries go, relative to the consuming project.
    pub target: ManifestPath,
}

/// Application entry in the CI status dashboard.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct AppEntry {
    pub name: String,

    #[serde(default)]
    pub icon: String,

    pub dev: EnvironmentEntry,
    pub prod: EnvironmentEntry,
}

/// Deployment environment of a dashboard application.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct EnvironmentEntry {
    /// Public hostname of the deployment, without scheme.
    #[serde(default)]
    pub url: String,

    /// GitHub repository in "owner/name" form. No repository means nothing
    /// is deployed for this environment.
    pub repo: Option<String>,

    pub branch: Option<String>,

    /// Workflows to track individually instead of the latest run.
    #[serde(rename = "workflow", default)]
    pub workflows: Vec<WorkflowEntry>,
}

/// Individually tracked CI workflow.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct WorkflowEntry {
    /// Workflow name as GitHub knows it.
    pub name: String,

    /// Short label for the dashboard.
    pub label: Option<String>,
}

/// Path field of the manifest.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ManifestPath(PathBuf);

impl ManifestPath {
    /// Construct new manifest path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Treat manifest path as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    fn expand(&self) -> Result<Self> {
        Ok(Self::new(
            shellexpand::full(self.to_string().as_str())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        ))
    }
}

impl Display for ManifestPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Manifest file cannot be read.
    #[error("failed to read manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Harness root cannot be made absolute.
    #[error("failed to resolve harness root {:?}", path.display())]
    Root {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// No dump target for app key.
    #[error("unknown app {app:?}, expected one of: {}", known.join(", "))]
    UnknownApp { app: String, known: Vec<String> },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
