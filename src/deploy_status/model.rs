// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    config::{AppEntry, EnvironmentEntry},
    recipe::health::Probe,
};

use chrono::{DateTime, TimeDelta, Utc};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// CI status of a run, workflow, environment, or application.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[default]
    None,
    Success,
    Failure,
    Running,
}

impl Status {
    /// Classify raw GitHub run status and conclusion.
    pub fn classify(status: &str, conclusion: Option<&str>) -> Self {
        match status {
            "completed" if conclusion == Some("success") => Self::Success,
            "completed" => Self::Failure,
            "in_progress" | "queued" | "waiting" => Self::Running,
            _ => Self::None,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Failure => "✗",
            Self::Running => "◐",
            Self::None => "○",
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::None => "none",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Running => "running",
        };
        fmt.write_str(name)
    }
}

/// Single workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub id: u64,
    pub status: Status,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub actor: Option<String>,
}

impl Run {
    /// Time between creation and last update.
    pub fn duration(&self) -> Option<TimeDelta> {
        Some(self.updated_at? - self.created_at?)
    }
}

/// Named workflow tracked separately within an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub name: String,
    pub label: String,
    pub run: Option<Run>,
    pub log_tail: Vec<String>,
}

impl Workflow {
    pub fn status(&self) -> Status {
        self.run.as_ref().map(|run| run.status).unwrap_or_default()
    }
}

/// Latest commit on an environment branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
}

/// Deployment environment of an application.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub name: String,
    pub url: String,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub run: Option<Run>,
    pub log_tail: Vec<String>,
    pub workflows: Vec<Workflow>,
    pub commit: Option<Commit>,
    pub health: Option<Probe>,
}

impl Environment {
    pub fn new(name: impl Into<String>, entry: &EnvironmentEntry) -> Self {
        Self {
            name: name.into(),
            url: entry.url.clone(),
            repo: entry.repo.clone(),
            branch: entry.branch.clone(),
            run: None,
            log_tail: Vec::new(),
            workflows: entry
                .workflows
                .iter()
                .map(|workflow| Workflow {
                    name: workflow.name.clone(),
                    label: workflow.label.clone().unwrap_or_else(|| workflow.name.clone()),
                    run: None,
                    log_tail: Vec::new(),
                })
                .collect(),
            commit: None,
            health: None,
        }
    }

    /// Repository and branch, if both are known.
    pub fn source(&self) -> Option<(&str, &str)> {
        Some((self.repo.as_deref()?, self.branch.as_deref()?))
    }

    /// Status taking named workflows into account.
    pub fn overall_status(&self) -> Status {
        if self.workflows.is_empty() {
            return self.run.as_ref().map(|run| run.status).unwrap_or_default();
        }

        let statuses: Vec<Status> = self.workflows.iter().map(Workflow::status).collect();
        if statuses.contains(&Status::Failure) {
            Status::Failure
        } else if statuses.contains(&Status::Running) {
            Status::Running
        } else if statuses.iter().all(|status| *status == Status::Success) {
            Status::Success
        } else {
            Status::None
        }
    }

    /// Creation time of most recent run.
    pub fn latest_time(&self) -> Option<DateTime<Utc>> {
        if self.workflows.is_empty() {
            return self.run.as_ref()?.created_at;
        }

        self.workflows
            .iter()
            .filter_map(|workflow| workflow.run.as_ref()?.created_at)
            .max()
    }
}

/// Application tracked by the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct App {
    pub name: String,
    pub icon: String,
    pub dev: Environment,
    pub prod: Environment,
}

impl App {
    pub fn overall_status(&self) -> Status {
        let statuses = [self.dev.overall_status(), self.prod.overall_status()];
        if statuses.contains(&Status::Failure) {
            Status::Failure
        } else if statuses.contains(&Status::Running) {
            Status::Running
        } else if statuses.contains(&Status::Success) {
            Status::Success
        } else {
            Status::None
        }
    }

    pub fn environments(&self) -> [&Environment; 2] {
        [&self.dev, &self.prod]
    }

    /// Check if name refers to this application.
    ///
    /// Case and punctuation are ignored, so `dronetm` matches `Drone-TM`.
    pub fn matches(&self, name: &str) -> bool {
        normalize(&self.name) == normalize(name)
    }
}

impl From<&AppEntry> for App {
    fn from(entry: &AppEntry) -> Self {
        Self {
            name: entry.name.clone(),
            icon: entry.icon.clone(),
            dev: Environment::new("DEV", &entry.dev),
            prod: Environment::new("PROD", &entry.prod),
        }
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Compact age of a timestamp, e.g., `now`, `5m`, `3h`, `2d`, `1w`.
pub fn short_age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    match seconds {
        ..60 => "now".into(),
        60..3_600 => format!("{}m", seconds / 60),
        3_600..86_400 => format!("{}h", seconds / 3_600),
        86_400..604_800 => format!("{}d", seconds / 86_400),
        _ => format!("{}w", seconds / 604_800),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Manifest, DEFAULT_MANIFEST};
    use simple_test_case::test_case;

    fn run(status: Status) -> Option<Run> {
        Some(Run {
            id: 1,
            status,
            created_at: None,
            updated_at: None,
            actor: None,
        })
    }

    fn with_workflows(statuses: &[Status]) -> Environment {
        let entry = EnvironmentEntry::default();
        let mut env = Environment::new("PROD", &entry);
        env.workflows = statuses
            .iter()
            .map(|status| Workflow {
                name: "build".into(),
                label: "build".into(),
                run: run(*status),
                log_tail: Vec::new(),
            })
            .collect();
        env
    }

    #[test_case("completed", Some("success"), Status::Success; "completed success")]
    #[test_case("completed", Some("cancelled"), Status::Failure; "completed cancelled")]
    #[test_case("completed", None, Status::Failure; "completed without conclusion")]
    #[test_case("in_progress", None, Status::Running; "in progress")]
    #[test_case("queued", None, Status::Running; "queued")]
    #[test_case("waiting", None, Status::Running; "waiting")]
    #[test_case("requested", None, Status::None; "unknown status")]
    #[test]
    fn classify_run(status: &str, conclusion: Option<&str>, expect: Status) {
        assert_eq!(Status::classify(status, conclusion), expect);
    }

    #[test_case(&[Status::Success, Status::Failure, Status::Running], Status::Failure; "any failure")]
    #[test_case(&[Status::Success, Status::Running], Status::Running; "any running")]
    #[test_case(&[Status::Success, Status::Success], Status::Success; "all success")]
    #[test_case(&[Status::Success, Status::None], Status::None; "partial")]
    #[test]
    fn environment_aggregates_workflows(statuses: &[Status], expect: Status) {
        assert_eq!(with_workflows(statuses).overall_status(), expect);
    }

    #[test_case(Status::Failure, Status::Success, Status::Failure; "failure wins")]
    #[test_case(Status::Success, Status::Running, Status::Running; "running over success")]
    #[test_case(Status::None, Status::Success, Status::Success; "either success")]
    #[test_case(Status::None, Status::None, Status::None; "nothing")]
    #[test]
    fn app_aggregates_environments(dev: Status, prod: Status, expect: Status) {
        let entry = EnvironmentEntry::default();
        let mut app = App {
            name: "Portal".into(),
            icon: "🌐".into(),
            dev: Environment::new("DEV", &entry),
            prod: Environment::new("PROD", &entry),
        };
        app.dev.run = run(dev);
        app.prod.run = run(prod);
        assert_eq!(app.overall_status(), expect);
    }

    #[test_case(0, "now"; "just now")]
    #[test_case(59, "now"; "under a minute")]
    #[test_case(60, "1m"; "one minute")]
    #[test_case(3_599, "59m"; "under an hour")]
    #[test_case(7_200, "2h"; "hours")]
    #[test_case(86_400 * 3, "3d"; "days")]
    #[test_case(604_800 * 5, "5w"; "weeks")]
    #[test]
    fn age_buckets(seconds: i64, expect: &str) {
        let now = Utc::now();
        let then = now - TimeDelta::seconds(seconds);
        assert_eq!(short_age(now, then), expect);
    }

    #[test]
    fn apps_built_from_manifest() -> anyhow::Result<()> {
        let manifest: Manifest = DEFAULT_MANIFEST.parse()?;
        let apps: Vec<App> = manifest.apps.iter().map(App::from).collect();

        let login = &apps[1];
        assert_eq!(login.name, "Login");
        assert_eq!(login.dev.source(), Some(("hotosm/login", "develop")));
        let labels: Vec<&str> = login.prod.workflows.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(labels, ["Image", "Helm"]);

        let tasking = apps.iter().find(|app| app.matches("tasking-manager"));
        assert_eq!(tasking.map(|app| app.dev.source()), Some(None));
        assert!(apps.iter().any(|app| app.matches("dronetm")));

        Ok(())
    }
}
