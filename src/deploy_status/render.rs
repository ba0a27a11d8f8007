// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::deploy_status::model::{short_age, App, Environment};

use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter, Result as FmtResult};

const NAME_WIDTH: usize = 20;
const CELL_WIDTH: usize = 16;

/// Status table with one row per application.
pub fn table(apps: &[App], now: DateTime<Utc>) -> Table<'_> {
    Table { apps, now }
}

/// Failed step logs of every failed run.
pub fn log_tails(apps: &[App]) -> LogTails<'_> {
    LogTails { apps }
}

/// Detailed view of one application.
pub fn details(app: &App, now: DateTime<Utc>) -> Details<'_> {
    Details { app, now }
}

#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    apps: &'a [App],
    now: DateTime<Utc>,
}

impl Display for Table<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "   {:<NAME_WIDTH$}{:<CELL_WIDTH$}PROD", "APP", "DEV")?;
        for app in self.apps {
            writeln!(
                fmt,
                "{} {:<NAME_WIDTH$}{:<CELL_WIDTH$}{}",
                app.icon,
                app.name,
                cell(&app.dev, self.now),
                cell(&app.prod, self.now)
            )?;
        }

        Ok(())
    }
}

fn cell(env: &Environment, now: DateTime<Utc>) -> String {
    let status = env.overall_status();
    match env.latest_time() {
        Some(time) => format!("{} {} {}", status.icon(), status, short_age(now, time)),
        None => format!("{} {}", status.icon(), status),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LogTails<'a> {
    apps: &'a [App],
}

impl Display for LogTails<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for app in self.apps {
            for env in app.environments() {
                if let Some(run) = &env.run {
                    let title = format!("{} {} run {}", app.name, env.name, run.id);
                    section(fmt, &title, &env.log_tail)?;
                }
                for workflow in &env.workflows {
                    if let Some(run) = &workflow.run {
                        let title = format!("{} {} {} run {}", app.name, env.name, workflow.label, run.id);
                        section(fmt, &title, &workflow.log_tail)?;
                    }
                }
            }
        }

        Ok(())
    }
}

fn section(fmt: &mut Formatter<'_>, title: &str, lines: &[String]) -> FmtResult {
    if lines.is_empty() {
        return Ok(());
    }

    writeln!(fmt, "\n==> {title} <==")?;
    for line in lines {
        writeln!(fmt, "{line}")?;
    }

    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct Details<'a> {
    app: &'a App,
    now: DateTime<Utc>,
}

impl Display for Details<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let app = self.app;
        writeln!(fmt, "{} {} {}", app.icon, app.name, app.overall_status().icon())?;
        for env in app.environments() {
            environment(fmt, env, self.now)?;
        }

        Ok(())
    }
}

fn environment(fmt: &mut Formatter<'_>, env: &Environment, now: DateTime<Utc>) -> FmtResult {
    writeln!(fmt, "\n{} {}", env.name, cell(env, now))?;
    if !env.url.is_empty() {
        writeln!(fmt, "  url:     https://{}", env.url)?;
    }
    match env.source() {
        Some((repo, branch)) => writeln!(fmt, "  source:  {repo}@{branch}")?,
        None => writeln!(fmt, "  source:  not deployed")?,
    }

    if let Some(run) = &env.run {
        let repo = env.repo.as_deref().unwrap_or_default();
        write!(fmt, "  run:     https://github.com/{repo}/actions/runs/{}", run.id)?;
        if let Some(actor) = &run.actor {
            write!(fmt, " by {actor}")?;
        }
        if let Some(duration) = run.duration() {
            write!(fmt, " in {}s", duration.num_seconds())?;
        }
        writeln!(fmt)?;
    }

    for workflow in &env.workflows {
        let status = workflow.status();
        writeln!(fmt, "  {:<9}{} {}", format!("{}:", workflow.label), status.icon(), status)?;
    }

    if let Some(commit) = &env.commit {
        write!(fmt, "  commit:  {} {} ({}", commit.sha, commit.message, commit.author)?;
        if let Some(date) = commit.date {
            write!(fmt, ", {}", short_age(now, date))?;
        }
        writeln!(fmt, ")")?;
    }

    if let Some(probe) = &env.health {
        writeln!(fmt, "  health:  {}", probe.outcome)?;
    }

    Ok(())
}
