// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! GitHub Actions queries through the `gh` CLI.
//!
//! Authentication is entirely delegated to `gh`, so no tokens are ever handled
//! here. Failures to fetch a single run are degraded to a [`Status::None`]
//! with a warning instead of failing the whole dashboard.

use crate::deploy_status::model::{App, Commit, Environment, Run, Status};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::{future::Future, io, process::Stdio};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

const LATEST_RUN_JQ: &str = ".workflow_runs[0] | {id, status, conclusion, created_at, updated_at, actor: .actor.login, workflow_name: .name}";
const LATEST_COMMIT_JQ: &str = "{sha: .sha[0:7], message: .commit.message, author: .commit.author.name, date: .commit.author.date}";
const COMMIT_MESSAGE_WIDTH: usize = 60;

/// Layer of indirection for `gh` calls.
pub trait GitHub {
    /// Run `gh` with arguments, returning its standard output.
    fn gh(&self, args: Vec<String>) -> impl Future<Output = Result<String>> + Send;
}

/// Calls the real `gh` binary.
#[derive(Debug, Default, Clone)]
pub struct GhCli;

impl GhCli {
    pub fn new() -> Self {
        Self
    }
}

impl GitHub for GhCli {
    async fn gh(&self, args: Vec<String>) -> Result<String> {
        let command = format!("gh {}", args.join(" "));
        debug!("run {command}");
        let output = Command::new("gh")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => GitHubError::MissingCli,
                _ => GitHubError::Io(err),
            })?;

        if !output.status.success() {
            return Err(GitHubError::Failed {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Make sure `gh` is installed and logged in.
///
/// # Errors
///
/// - Return [`GitHubError::MissingCli`] if `gh` is not installed.
/// - Return [`GitHubError::NotAuthenticated`] if `gh` is not logged in.
pub async fn ensure_authenticated(gh: &impl GitHub) -> Result<()> {
    match gh.gh(strings(["auth", "status"])).await {
        Ok(_) => Ok(()),
        Err(GitHubError::Failed { message, .. }) => Err(GitHubError::NotAuthenticated(message)),
        Err(err) => Err(err),
    }
}

#[derive(Debug, Deserialize)]
struct ApiRun {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    actor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedRun {
    database_id: u64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    #[serde(default)]
    sha: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

/// Latest run of any workflow on branch.
///
/// # Errors
///
/// - Return [`GitHubError`] if `gh` fails or prints unexpected JSON.
pub async fn latest_run(gh: &impl GitHub, repo: &str, branch: &str) -> Result<Option<Run>> {
    let output = gh
        .gh(strings([
            "api".into(),
            format!("repos/{repo}/actions/runs?branch={branch}&per_page=1"),
            "--jq".into(),
            LATEST_RUN_JQ.into(),
        ]))
        .await?;
    parse_latest_run(&output)
}

fn parse_latest_run(output: &str) -> Result<Option<Run>> {
    if output.is_empty() || output == "null" {
        return Ok(None);
    }

    // `--jq` on an empty run list prints an object of nulls.
    let run: ApiRun = serde_json::from_str(output)?;
    let Some(id) = run.id else {
        return Ok(None);
    };
    let status = run.status.unwrap_or_default();
    Ok(Some(Run {
        id,
        status: Status::classify(&status, run.conclusion.as_deref()),
        created_at: run.created_at,
        updated_at: run.updated_at,
        actor: run.actor,
    }))
}

/// Latest run of a named workflow on branch.
///
/// # Errors
///
/// - Return [`GitHubError`] if `gh` fails or prints unexpected JSON.
pub async fn workflow_run(
    gh: &impl GitHub,
    repo: &str,
    branch: &str,
    workflow: &str,
) -> Result<Option<Run>> {
    let output = gh
        .gh(strings([
            "run",
            "list",
            "-R",
            repo,
            "--branch",
            branch,
            "--workflow",
            workflow,
            "-L",
            "1",
            "--json",
            "status,conclusion,createdAt,databaseId,updatedAt",
        ]))
        .await?;
    parse_workflow_runs(&output)
}

fn parse_workflow_runs(output: &str) -> Result<Option<Run>> {
    let runs: Vec<ListedRun> = serde_json::from_str(output)?;
    Ok(runs.into_iter().next().map(|run| Run {
        id: run.database_id,
        status: Status::classify(&run.status, run.conclusion.as_deref().filter(|c| !c.is_empty())),
        created_at: run.created_at,
        updated_at: run.updated_at,
        actor: None,
    }))
}

/// Trailing lines of the failed steps log of a run.
///
/// # Errors
///
/// - Return [`GitHubError`] if `gh` fails.
pub async fn failed_log_tail(gh: &impl GitHub, repo: &str, id: u64, lines: usize) -> Result<Vec<String>> {
    let output = gh
        .gh(strings([
            "run".into(),
            "view".into(),
            id.to_string(),
            "-R".into(),
            repo.to_string(),
            "--log-failed".into(),
        ]))
        .await?;
    Ok(tail(&output, lines))
}

/// Latest commit on branch.
///
/// # Errors
///
/// - Return [`GitHubError`] if `gh` fails or prints unexpected JSON.
pub async fn latest_commit(gh: &impl GitHub, repo: &str, branch: &str) -> Result<Commit> {
    let output = gh
        .gh(strings([
            "api".into(),
            format!("repos/{repo}/commits/{branch}"),
            "--jq".into(),
            LATEST_COMMIT_JQ.into(),
        ]))
        .await?;
    parse_commit(&output)
}

fn parse_commit(output: &str) -> Result<Commit> {
    let commit: ApiCommit = serde_json::from_str(output)?;
    Ok(Commit {
        sha: commit.sha,
        message: commit
            .message
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .take(COMMIT_MESSAGE_WIDTH)
            .collect(),
        author: commit.author,
        date: commit.date,
    })
}

/// Fill in run status of an environment.
///
/// Fetch failures are logged and leave the status at none.
#[instrument(skip(gh, env), fields(env = %env.name), level = "debug")]
pub async fn fetch_environment(
    gh: &impl GitHub,
    mut env: Environment,
    lines: usize,
    with_commit: bool,
) -> Environment {
    let Some((repo, branch)) = env.source() else {
        return env;
    };
    let (repo, branch) = (repo.to_string(), branch.to_string());

    if env.workflows.is_empty() {
        env.run = degrade(latest_run(gh, &repo, &branch).await, &repo);
        env.log_tail = log_tail_for(gh, &repo, env.run.as_ref(), lines).await;
    } else {
        for workflow in &mut env.workflows {
            workflow.run = degrade(workflow_run(gh, &repo, &branch, &workflow.name).await, &repo);
            workflow.log_tail = log_tail_for(gh, &repo, workflow.run.as_ref(), lines).await;
        }
    }

    if with_commit {
        env.commit = match latest_commit(gh, &repo, &branch).await {
            Ok(commit) => Some(commit),
            Err(err) => {
                warn!("failed to fetch latest commit of {repo}@{branch}: {err}");
                None
            }
        };
    }

    env
}

/// Fill in both environments of an application, one after the other.
pub async fn fetch_app(gh: &impl GitHub, mut app: App, lines: usize, with_commit: bool) -> App {
    app.dev = fetch_environment(gh, app.dev, lines, with_commit).await;
    app.prod = fetch_environment(gh, app.prod, lines, with_commit).await;
    app
}

async fn log_tail_for(gh: &impl GitHub, repo: &str, run: Option<&Run>, lines: usize) -> Vec<String> {
    let Some(run) = run.filter(|run| run.status == Status::Failure) else {
        return Vec::new();
    };

    match failed_log_tail(gh, repo, run.id, lines).await {
        Ok(tail) => tail,
        Err(err) => {
            warn!("failed to fetch log of run {} in {repo}: {err}", run.id);
            Vec::new()
        }
    }
}

fn degrade(result: Result<Option<Run>>, repo: &str) -> Option<Run> {
    result.unwrap_or_else(|err| {
        warn!("failed to fetch runs of {repo}: {err}");
        None
    })
}

/// Last lines of text.
pub fn tail(text: &str, lines: usize) -> Vec<String> {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].iter().map(|line| line.to_string()).collect()
}

fn strings<const N: usize>(args: [impl Into<String>; N]) -> Vec<String> {
    args.into_iter().map(Into::into).collect()
}

/// GitHub query error types.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    /// No `gh` binary on `PATH`.
    #[error("gh CLI not found, install it from https://cli.github.com")]
    MissingCli,

    /// `gh` is installed but not logged in.
    #[error("gh CLI is not authenticated, run `gh auth login`:\n{0}")]
    NotAuthenticated(String),

    /// `gh` exited unsuccessfully.
    #[error("command {command:?} failed:\n{message}")]
    Failed { command: String, message: String },

    /// `gh` printed something unexpected.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = GitHubError> = std::result::Result<T, E>;


#[cfg(test)]
mod tests {
    use super::{fake::CannedGitHub, *};
    use crate::config::EnvironmentEntry;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn environment(workflows: &[&str]) -> Environment {
        let entry: EnvironmentEntry = toml::from_str(
            format!(
                "url = \"login.hotosm.org\"\nrepo = \"hotosm/login\"\nbranch = \"main\"\n{}",
                workflows
                    .iter()
                    .map(|name| format!("[[workflow]]\nname = \"{name}\"\n"))
                    .collect::<String>()
            )
            .as_str(),
        )
        .unwrap();
        Environment::new("PROD", &entry)
    }

    #[test]
    fn parse_api_run() -> anyhow::Result<()> {
        let output = r#"{"id":42,"status":"completed","conclusion":"failure","created_at":"2025-03-01T10:00:00Z","updated_at":"2025-03-01T10:05:30Z","actor":"octocat","workflow_name":"CI"}"#;
        let run = parse_latest_run(output)?.unwrap();
        assert_eq!(run.id, 42);
        assert_eq!(run.status, Status::Failure);
        assert_eq!(run.actor.as_deref(), Some("octocat"));
        assert_eq!(run.duration().map(|d| d.num_seconds()), Some(330));

        assert_eq!(parse_latest_run("")?, None);

        Ok(())
    }

    #[test]
    fn branch_without_runs_has_no_run() -> anyhow::Result<()> {
        let output = r#"{"actor":null,"conclusion":null,"created_at":null,"id":null,"status":null,"updated_at":null,"workflow_name":null}"#;
        assert_eq!(parse_latest_run(output)?, None);
        assert_eq!(parse_latest_run("null")?, None);

        Ok(())
    }

    #[test]
    fn parse_listed_run() -> anyhow::Result<()> {
        let output = r#"[{"conclusion":"","createdAt":"2025-03-01T10:00:00Z","databaseId":7,"status":"in_progress","updatedAt":"2025-03-01T10:01:00Z"}]"#;
        let run = parse_workflow_runs(output)?.unwrap();
        assert_eq!(run.id, 7);
        assert_eq!(run.status, Status::Running);

        assert_eq!(parse_workflow_runs("[]")?, None);

        Ok(())
    }

    #[test]
    fn commit_message_keeps_first_line() -> anyhow::Result<()> {
        let output = r#"{"sha":"abc1234","message":"fix: token refresh\n\nlong body","author":"Jane","date":"2025-03-01T10:00:00Z"}"#;
        let commit = parse_commit(output)?;
        assert_eq!(commit.sha, "abc1234");
        assert_eq!(commit.message, "fix: token refresh");

        Ok(())
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = indoc! {"
            one
            two
            three
        "};
        assert_eq!(tail(text, 2), ["two", "three"]);
        assert_eq!(tail(text, 20), ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn unauthenticated_gh_fails_fast() {
        let gh = CannedGitHub::new().fail("auth status", "You are not logged into any GitHub hosts.");
        let result = ensure_authenticated(&gh).await;
        assert!(matches!(result, Err(GitHubError::NotAuthenticated(_))));
    }

    #[tokio::test]
    async fn failed_run_fetches_log_tail() {
        let gh = CannedGitHub::new()
            .reply(
                "api repos/hotosm/login/actions/runs?branch=main",
                r#"{"id":9,"status":"completed","conclusion":"failure"}"#,
            )
            .reply("run view 9 -R hotosm/login --log-failed", "a\nb\nc\nd");

        let env = fetch_environment(&gh, environment(&[]), 2, false).await;
        assert_eq!(env.overall_status(), Status::Failure);
        assert_eq!(env.log_tail, ["c", "d"]);
    }

    #[tokio::test]
    async fn named_workflows_fetched_individually() {
        let gh = CannedGitHub::new()
            .reply(
                "run list -R hotosm/login --branch main --workflow Build Production Images",
                r#"[{"status":"completed","conclusion":"success","databaseId":1}]"#,
            )
            .reply(
                "run list -R hotosm/login --branch main --workflow Release Helm Chart",
                r#"[{"status":"queued","conclusion":"","databaseId":2}]"#,
            );

        let env = fetch_environment(
            &gh,
            environment(&["Build Production Images", "Release Helm Chart"]),
            20,
            false,
        )
        .await;
        assert_eq!(env.workflows[0].status(), Status::Success);
        assert_eq!(env.workflows[1].status(), Status::Running);
        assert_eq!(env.overall_status(), Status::Running);
        assert_eq!(gh.calls().len(), 2);
    }

    #[tokio::test]
    async fn fetch_errors_degrade_to_none() {
        let gh = CannedGitHub::new();
        let env = fetch_environment(&gh, environment(&[]), 20, true).await;
        assert_eq!(env.overall_status(), Status::None);
        assert_eq!(env.commit, None);
    }

    #[tokio::test]
    async fn environment_without_repo_is_not_queried() {
        let gh = CannedGitHub::new();
        let env = Environment::new("DEV", &EnvironmentEntry::default());
        let env = fetch_environment(&gh, env, 20, true).await;
        assert_eq!(env.overall_status(), Status::None);
        assert!(gh.calls().is_empty());
    }
}
