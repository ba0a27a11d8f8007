// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository bootstrap recipe.
//!
//! The platform is spread over independent sibling repositories checked out
//! next to the harness root. Bootstrapping clones whichever of them are
//! missing on their designated branch, then makes sure each has a `.env`
//! file created from its template.
//!
//! Cloning stops at the first failure. Nothing is repaired or retried, but
//! every step is guarded by an existence check, so the next run picks up where
//! the last one stopped.

use crate::{
    config::Project,
    env_file::{ensure_from_template, EnvStatus},
    prompt::Prompt,
    syscall::{Invocation, Syscall},
    workspace::Workspace,
};

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Config, FetchOptions, RemoteCallbacks, Repository,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
    time::Duration,
};
use tracing::{info, instrument, warn};

/// Protocol to clone sibling repositories over.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Https,
    Ssh,
}

impl Protocol {
    /// Clone URL for GitHub repository in "owner/name" form.
    pub fn clone_url(self, repo: &str) -> String {
        match self {
            Self::Https => format!("https://github.com/{repo}.git"),
            Self::Ssh => format!("git@github.com:{repo}.git"),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Https => fmt.write_str("HTTPS"),
            Self::Ssh => fmt.write_str("SSH"),
        }
    }
}

/// Answers to bootstrap questions given up front.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Clone missing repositories without asking.
    pub assume_yes: bool,

    /// Clone over this protocol without asking.
    pub protocol: Option<Protocol>,
}

/// Outcome of the bootstrap recipe.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Projects cloned during this run.
    pub cloned: Vec<String>,

    /// Projects still missing because operator declined to clone.
    pub skipped: Vec<String>,

    /// Projects that got a fresh `.env` file.
    pub env_created: Vec<String>,
}

/// Projects whose checkout directory does not exist.
pub fn missing_projects<S, P>(ws: &Workspace<S, P>) -> Vec<&Project>
where
    S: Syscall,
    P: Prompt,
{
    ws.manifest()
        .projects
        .iter()
        .filter(|project| !ws.project_dir(project).exists())
        .collect()
}

/// Clone missing sibling repositories, and create their environment files.
///
/// # Errors
///
/// - Return [`BootstrapError::Clone`] on the first failed clone.
/// - Return [`BootstrapError::Env`] if an environment file cannot be created.
/// - Return [`BootstrapError::Prompt`] if a question fails.
#[instrument(skip(ws), level = "debug")]
pub fn run<S, P>(ws: &Workspace<S, P>, opts: BootstrapOptions) -> Result<BootstrapReport>
where
    S: Syscall,
    P: Prompt,
{
    let mut report = BootstrapReport::default();
    let missing = missing_projects(ws);

    if missing.is_empty() {
        info!("all sibling repositories present");
    } else {
        let names = missing
            .iter()
            .map(|project| project.name.as_str())
            .collect::<Vec<_>>();
        warn!("missing sibling repositories: {}", names.join(", "));

        let proceed = opts.assume_yes
            || ws
                .prompt()
                .confirm("clone missing repositories now?", true)?;

        if proceed {
            let protocol = match opts.protocol {
                Some(protocol) => protocol,
                None if opts.assume_yes => Protocol::default(),
                None => ask_protocol(ws.prompt())?,
            };

            for project in &missing {
                let url = protocol.clone_url(&project.repo);
                clone_project(&url, &ws.project_dir(project), project.branch.as_deref())
                    .map_err(|err| BootstrapError::Clone {
                        source: err,
                        project: project.name.clone(),
                    })?;
                report.cloned.push(project.name.clone());
            }
        } else {
            report.skipped = names.into_iter().map(str::to_owned).collect();
        }
    }

    for project in &ws.manifest().projects {
        let dir = ws.project_dir(project);
        if !dir.exists() {
            continue;
        }

        if let EnvStatus::Created(_) = ensure_from_template(&dir)? {
            report.env_created.push(project.name.clone());
        }
    }

    Ok(report)
}

/// Fast-forward every present sibling repository.
///
/// # Errors
///
/// - Return [`BootstrapError::Syscall`] on the first failed pull.
#[instrument(skip(ws), level = "debug")]
pub fn pull_all<S, P>(ws: &Workspace<S, P>) -> Result<Vec<String>>
where
    S: Syscall,
    P: Prompt,
{
    let mut pulled = Vec::new();
    for project in &ws.manifest().projects {
        let dir = ws.project_dir(project);
        if !dir.exists() {
            warn!("skip {}, not cloned yet", project.name);
            continue;
        }

        info!("update {}", project.name);
        ws.syscall().interactive(
            &Invocation::new("git")
                .args(["pull", "--ff-only"])
                .current_dir(dir),
        )?;
        pulled.push(project.name.clone());
    }

    Ok(pulled)
}

fn ask_protocol(prompt: &impl Prompt) -> Result<Protocol> {
    let answer = prompt.select(
        "clone over",
        vec![Protocol::Https.to_string(), Protocol::Ssh.to_string()],
    )?;

    Ok(if answer == Protocol::Ssh.to_string() {
        Protocol::Ssh
    } else {
        Protocol::Https
    })
}

const CLONE_BAR: &str = "{spinner:.cyan} {prefix:<20} {msg:<7} [{bar:40.cyan/blue}] {pos}/{len}";

/// Clone repository into target path.
///
/// Checks out target branch, or the remote's default branch if none is given.
/// Object transfer and checkout both tick one progress bar labelled with the
/// checkout name and branch. Credential prompts suspend the bar while they
/// wait for input.
///
/// # Errors
///
/// - Return [`CloneError::Git2`] if libgit2 operations fail.
/// - Return [`CloneError::IndicatifStyleTemplate`] if progress bar cannot be
///   styled.
#[instrument(skip(url, path), level = "debug")]
pub fn clone_project(url: &str, path: &Path, branch: Option<&str>) -> Result<Repository, CloneError> {
    info!("clone {url} into {:?}", path.display());
    let bar = ProgressBar::new(0)
        .with_style(ProgressStyle::with_template(CLONE_BAR)?.progress_chars("=> "))
        .with_prefix(progress_label(path, branch))
        .with_message("objects");
    bar.enable_steady_tick(Duration::from_millis(120));

    let authenticator = GitAuthenticator::default().set_prompter(CloneCredentials { bar: bar.clone() });
    let config = Config::open_default()?;

    // indicatif rate limits redraws on its own.
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(authenticator.credentials(&config));
    callbacks.transfer_progress(|stats| {
        bar.set_length(stats.total_objects() as u64);
        bar.set_position(stats.received_objects() as u64);
        true
    });

    let mut checkout = CheckoutBuilder::new();
    checkout.progress(|_, done, total| {
        bar.set_message("files");
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    });

    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks);
    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch).with_checkout(checkout);
    if let Some(branch) = branch {
        builder.branch(branch);
    }

    let result = builder.clone(url, path);
    bar.finish_and_clear();

    Ok(result?)
}

/// Progress bar label, e.g. "drone-tm@dev".
fn progress_label(path: &Path, branch: Option<&str>) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    match branch {
        Some(branch) => format!("{name}@{branch}"),
        None => name,
    }
}

/// Credential prompts drawn above a clone's progress bar.
#[derive(Debug, Clone)]
struct CloneCredentials {
    bar: ProgressBar,
}

impl CloneCredentials {
    fn ask(&self, label: &str, secret: bool) -> Option<String> {
        self.bar.suspend(|| {
            let answer = if secret {
                Password::new(label).without_confirmation().prompt()
            } else {
                Text::new(label).prompt()
            };
            answer
                .inspect_err(|err| warn!("no credentials given: {err}"))
                .ok()
        })
    }
}

impl Prompter for CloneCredentials {
    fn prompt_username_password(&mut self, url: &str, _config: &git2::Config) -> Option<(String, String)> {
        info!("{url} wants credentials");
        let username = self.ask("GitHub username:", false)?;
        let token = self.ask("GitHub token:", true)?;
        Some((username, token))
    }

    fn prompt_password(&mut self, username: &str, url: &str, _config: &git2::Config) -> Option<String> {
        info!("{url} wants a token for {username}");
        self.ask(format!("GitHub token for {username}:").as_str(), true)
    }

    fn prompt_ssh_key_passphrase(&mut self, ssh_key_path: &Path, _config: &git2::Config) -> Option<String> {
        self.ask(format!("passphrase for {}:", ssh_key_path.display()).as_str(), true)
    }
}

/// Clone error types.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Bootstrap error types.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Sibling repository cannot be cloned.
    #[error("failed to clone {project}")]
    Clone {
        #[source]
        source: CloneError,
        project: String,
    },

    #[error(transparent)]
    Env(#[from] crate::env_file::EnvError),

    #[error(transparent)]
    Prompt(#[from] crate::prompt::PromptError),

    #[error(transparent)]
    Syscall(#[from] crate::syscall::SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;
