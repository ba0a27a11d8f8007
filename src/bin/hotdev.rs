// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use hotdev::{
    deploy_status::{self, github::GhCli, DeployStatusOptions},
    path::{default_hosts_file, default_root},
    recipe::{
        auth_libs,
        bootstrap::{self, BootstrapOptions, Protocol},
        certs::{self, CertReport},
        compose::{self, ComposeCommand},
        dump::{self, DumpOutcome},
        health,
        hosts::{self, HostsMode, HostsReport},
        test_users,
    },
    workspace::Workspace,
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "hotdev [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let root = match self.global.root {
            Some(root) => root,
            None => default_root()?,
        };
        let ws = Workspace::open(root, self.global.manifest.as_deref())?;

        match self.command {
            Command::Setup(opts) => run_setup(&ws, opts),
            Command::SetupHttps => run_setup_https(&ws),
            Command::Hosts(opts) => run_hosts(&ws, opts),
            Command::Install => run_install(&ws),
            Command::Update => run_update(&ws),
            Command::Dev(opts) => run_dev(&ws, opts),
            Command::Stop => compose_dispatch(&ws, ComposeCommand::Down { volumes: false }),
            Command::Restart(opts) => compose_dispatch(
                &ws,
                ComposeCommand::Restart {
                    services: opts.services,
                },
            ),
            Command::Logs(opts) => compose_dispatch(
                &ws,
                ComposeCommand::Logs {
                    follow: opts.follow,
                    tail: opts.tail,
                    services: opts.services,
                },
            ),
            Command::Ps => compose_dispatch(&ws, ComposeCommand::Ps),
            Command::Clean => compose_dispatch(&ws, ComposeCommand::Down { volumes: true }),
            Command::Health => run_health(&ws).await,
            Command::DeployStatus(opts) => run_deploy_status(&ws, opts).await,
            Command::LoadDump(opts) => run_load_dump(&ws, opts).await,
            Command::SetupTestUsers(opts) => run_setup_test_users(&ws, opts),
            Command::AuthLibs => run_auth_libs(&ws),
            Command::LinkAuthLibs => run_link_auth_libs(&ws),
            Command::UnlinkAuthLibs => run_unlink_auth_libs(&ws),
            Command::Manifest => {
                print!("{}", ws.manifest());
                Ok(())
            }
        }
    }
}

#[derive(Args, Clone, Debug)]
struct GlobalOptions {
    /// Harness root directory, defaults to current directory.
    #[arg(long, global = true, env = "HOTDEV_ROOT", value_name = "dir")]
    pub root: Option<PathBuf>,

    /// Platform manifest to use instead of the default lookup.
    #[arg(long, global = true, value_name = "file")]
    pub manifest: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Clone missing sibling repositories and create their .env files.
    Setup(SetupOptions),

    /// Generate locally trusted TLS certificate for every subdomain.
    SetupHttps,

    /// Check hosts file for every subdomain.
    Hosts(HostsOptions),

    /// Setup, certificates, then build every image.
    Install,

    /// Pull every sibling repository, then pull images.
    Update,

    /// Start whole platform, or one service group with its base services.
    #[command(override_usage = "hotdev dev [options] [<group>]")]
    Dev(DevOptions),

    /// Stop and remove containers.
    Stop,

    /// Restart services.
    Restart(RestartOptions),

    /// Show service logs.
    Logs(LogsOptions),

    /// List containers.
    Ps,

    /// Stop containers and remove their volumes.
    Clean,

    /// Probe every subdomain over HTTPS.
    Health,

    /// Show CI status of every deployed environment.
    DeployStatus(DeployStatusArgs),

    /// Replace application database with a SQL dump.
    #[command(override_usage = "hotdev load-dump [options] <app> <source>")]
    LoadDump(LoadDumpOptions),

    /// Seed test user accounts.
    SetupTestUsers(SetupTestUsersOptions),

    /// Copy shared auth libraries into every consumer.
    AuthLibs,

    /// Symlink shared auth libraries into every consumer.
    LinkAuthLibs,

    /// Replace auth library symlinks with plain copies.
    UnlinkAuthLibs,

    /// Print effective platform manifest.
    Manifest,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SetupOptions {
    /// Clone missing repositories without asking.
    #[arg(short, long)]
    pub yes: bool,

    /// Clone over SSH instead of HTTPS.
    #[arg(long)]
    pub ssh: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct HostsOptions {
    /// Append missing entries through sudo.
    #[arg(short, long)]
    pub apply: bool,

    /// Hosts file to check.
    #[arg(long, value_name = "path")]
    pub hosts_file: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DevOptions {
    /// Service group to start.
    #[arg(value_name = "group")]
    pub group: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RestartOptions {
    /// Services to restart, all if none given.
    #[arg(value_name = "service")]
    pub services: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LogsOptions {
    /// Keep following log output.
    #[arg(short, long)]
    pub follow: bool,

    /// Number of lines to show from the end of each log.
    #[arg(short, long, default_value_t = 100, value_name = "lines")]
    pub tail: usize,

    /// Services to show, all if none given.
    #[arg(value_name = "service")]
    pub services: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeployStatusArgs {
    /// Only show this application, with details.
    #[arg(short, long, value_name = "name")]
    pub app: Option<String>,

    /// Number of failed log lines to show per run.
    #[arg(short, long, default_value_t = 20, value_name = "lines")]
    pub lines: usize,

    /// Also probe every environment URL.
    #[arg(long)]
    pub health: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LoadDumpOptions {
    /// Application key of dump target.
    #[arg(required = true, value_name = "app")]
    pub app: String,

    /// URL or local path of SQL dump, optionally gzipped.
    #[arg(required = true, value_name = "source")]
    pub source: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SetupTestUsersOptions {
    /// Only seed this application.
    #[arg(value_name = "app")]
    pub app: Option<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn run_setup(ws: &Workspace, opts: SetupOptions) -> Result<()> {
    let options = BootstrapOptions {
        assume_yes: opts.yes,
        protocol: opts.ssh.then_some(Protocol::Ssh),
    };
    let report = bootstrap::run(ws, options)?;

    if !report.cloned.is_empty() {
        info!("cloned {}", report.cloned.join(", "));
    }
    if !report.skipped.is_empty() {
        warn!("still missing {}, run setup again to clone them", report.skipped.join(", "));
    }
    if !report.env_created.is_empty() {
        info!("created .env for {}", report.env_created.join(", "));
    }

    hosts::run(ws, &default_hosts_file(), HostsMode::Report)?;

    Ok(())
}

fn run_setup_https(ws: &Workspace) -> Result<()> {
    match certs::run(ws)? {
        CertReport::Generated(pair) => info!("certificate written to {:?}", pair.cert.display()),
        CertReport::Kept(pair) => info!("kept certificate at {:?}", pair.cert.display()),
    }

    Ok(())
}

fn run_hosts(ws: &Workspace, opts: HostsOptions) -> Result<()> {
    let hosts_file = opts.hosts_file.unwrap_or_else(default_hosts_file);
    let mode = if opts.apply {
        HostsMode::Apply
    } else {
        HostsMode::Report
    };

    match hosts::run(ws, &hosts_file, mode)? {
        HostsReport::Complete => {}
        HostsReport::Missing(_) => info!("run `hotdev hosts --apply` to append them"),
        HostsReport::Appended(entries) => info!("appended {} entries", entries.len()),
    }

    Ok(())
}

fn run_install(ws: &Workspace) -> Result<()> {
    run_setup(ws, SetupOptions { yes: false, ssh: false })?;
    run_setup_https(ws)?;
    compose_dispatch(ws, ComposeCommand::Build)
}

fn run_update(ws: &Workspace) -> Result<()> {
    bootstrap::pull_all(ws)?;
    compose_dispatch(ws, ComposeCommand::Pull)
}

fn run_dev(ws: &Workspace, opts: DevOptions) -> Result<()> {
    let services = match opts.group {
        Some(group) => compose::group_services(ws, &group)?,
        None => Vec::new(),
    };

    compose_dispatch(ws, ComposeCommand::Up { services })
}

fn compose_dispatch(ws: &Workspace, command: ComposeCommand) -> Result<()> {
    compose::dispatch(ws, &command)?;
    Ok(())
}

async fn run_health(ws: &Workspace) -> Result<()> {
    health::run(ws).await?;
    Ok(())
}

async fn run_deploy_status(ws: &Workspace, opts: DeployStatusArgs) -> Result<()> {
    let options = DeployStatusOptions {
        app: opts.app,
        lines: opts.lines,
        health: opts.health,
    };
    deploy_status::run(&GhCli::new(), &ws.manifest().apps, &options).await?;

    Ok(())
}

async fn run_load_dump(ws: &Workspace, opts: LoadDumpOptions) -> Result<()> {
    if dump::load(ws, &opts.app, &opts.source).await? == DumpOutcome::Aborted {
        info!("nothing changed");
    }

    Ok(())
}

fn run_setup_test_users(ws: &Workspace, opts: SetupTestUsersOptions) -> Result<()> {
    let seeded = test_users::run(ws, opts.app.as_deref())?;
    info!("seeded test users for {}", seeded.join(", "));
    Ok(())
}

fn run_auth_libs(ws: &Workspace) -> Result<()> {
    let targets = auth_libs::distribute(ws)?;
    info!("copied auth libraries into {} consumers", targets.len());
    Ok(())
}

fn run_link_auth_libs(ws: &Workspace) -> Result<()> {
    let targets = auth_libs::link(ws)?;
    info!("linked auth libraries into {} consumers", targets.len());
    Ok(())
}

fn run_unlink_auth_libs(ws: &Workspace) -> Result<()> {
    let targets = auth_libs::unlink(ws)?;
    info!("restored {} plain copies", targets.len());
    Ok(())
}
