// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! CI status dashboard.
//!
//! Shows the latest GitHub Actions run for the DEV and PROD environment of
//! every application listed in the manifest, and the failed step logs of any
//! failed run. Applications are fetched concurrently. Calls for a single
//! application are made one after the other.
//!
//! # Statuses
//!
//! | status    | icon | meaning                                       |
//! |-----------|------|-----------------------------------------------|
//! | `success` | ✓    | latest run completed successfully             |
//! | `failure` | ✗    | latest run completed with any other outcome   |
//! | `running` | ◐    | latest run is queued, waiting, or in progress |
//! | `none`    | ○    | nothing deployed, no runs, or fetch failed    |

pub mod github;
pub mod model;
pub mod render;

use crate::{
    config::AppEntry,
    recipe::health::{self, probe},
};
use github::GitHub;
use model::App;

use chrono::Utc;
use futures::future::join_all;
use std::io::{self, Write};
use tracing::{info, instrument};

/// Dashboard options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployStatusOptions {
    /// Only show this application, with details.
    pub app: Option<String>,

    /// Number of failed log lines to show per run.
    pub lines: usize,

    /// Also probe every environment URL.
    pub health: bool,
}

impl Default for DeployStatusOptions {
    fn default() -> Self {
        Self {
            app: None,
            lines: 20,
            health: false,
        }
    }
}

/// Fetch status of selected applications.
///
/// # Errors
///
/// - Return [`DeployStatusError::GitHub`] if `gh` is missing or logged out.
/// - Return [`DeployStatusError::UnknownApp`] if selected app is not listed.
/// - Return [`DeployStatusError::Health`] if HTTP client cannot be built.
#[instrument(skip(gh, entries), level = "debug")]
pub async fn collect(
    gh: &impl GitHub,
    entries: &[AppEntry],
    options: &DeployStatusOptions,
) -> Result<Vec<App>> {
    github::ensure_authenticated(gh).await?;

    let mut apps: Vec<App> = entries.iter().map(App::from).collect();
    if let Some(name) = &options.app {
        apps.retain(|app| app.matches(name));
        if apps.is_empty() {
            return Err(DeployStatusError::UnknownApp {
                app: name.clone(),
                known: entries.iter().map(|entry| entry.name.clone()).collect(),
            });
        }
    }

    info!("fetch CI status of {} applications", apps.len());
    let with_commit = options.app.is_some();
    let mut apps = join_all(
        apps.into_iter()
            .map(|app| github::fetch_app(gh, app, options.lines, with_commit)),
    )
    .await;

    if options.health {
        let client = health::client(false)?;
        for app in &mut apps {
            for env in [&mut app.dev, &mut app.prod] {
                if !env.url.is_empty() {
                    env.health = Some(probe(&client, format!("https://{}", env.url)).await);
                }
            }
        }
    }

    Ok(apps)
}

/// Fetch and print the dashboard.
///
/// # Errors
///
/// - Return same errors as [`collect`].
/// - Return [`DeployStatusError::Io`] if stdout cannot be written.
pub async fn run(gh: &impl GitHub, entries: &[AppEntry], options: &DeployStatusOptions) -> Result<()> {
    let apps = collect(gh, entries, options).await?;
    let now = Utc::now();

    let mut stdout = io::stdout().lock();
    write!(stdout, "{}", render::table(&apps, now))?;
    if options.app.is_some() || options.health {
        for app in &apps {
            write!(stdout, "\n{}", render::details(app, now))?;
        }
    }
    write!(stdout, "{}", render::log_tails(&apps))?;

    Ok(())
}

/// CI status dashboard error types.
#[derive(Debug, thiserror::Error)]
pub enum DeployStatusError {
    #[error(transparent)]
    GitHub(#[from] github::GitHubError),

    /// Selected application is not in the manifest.
    #[error("unknown application {app:?}, expected one of: {}", known.join(", "))]
    UnknownApp { app: String, known: Vec<String> },

    #[error(transparent)]
    Health(#[from] health::HealthError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = DeployStatusError> = std::result::Result<T, E>;
