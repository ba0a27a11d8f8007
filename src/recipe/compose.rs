// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Compose dispatch recipe.
//!
//! Thin wrappers over `docker compose`. Startup ordering, health checks, and
//! restarts are left entirely to the compose runtime. The only thing decided
//! here is which services a target covers.

use crate::{
    prompt::Prompt,
    syscall::{Invocation, Syscall},
    workspace::Workspace,
};

use tracing::{info, instrument, warn};

/// Compose subcommand to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeCommand {
    /// Start services in the background. No services means all of them.
    Up { services: Vec<String> },

    /// Stop and remove containers.
    Down { volumes: bool },

    /// Restart services. No services means all of them.
    Restart { services: Vec<String> },

    /// Show service logs.
    Logs {
        follow: bool,
        tail: usize,
        services: Vec<String>,
    },

    /// List containers.
    Ps,

    /// Build service images.
    Build,

    /// Pull service images.
    Pull,
}

impl ComposeCommand {
    /// Arguments following `docker compose -f <file>`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            Self::Up { services } => {
                args.extend(["up", "-d"].map(String::from));
                args.extend(services.iter().cloned());
            }
            Self::Down { volumes } => {
                args.push("down".into());
                if *volumes {
                    args.extend(["-v", "--remove-orphans"].map(String::from));
                }
            }
            Self::Restart { services } => {
                args.push("restart".into());
                args.extend(services.iter().cloned());
            }
            Self::Logs {
                follow,
                tail,
                services,
            } => {
                args.push("logs".into());
                if *follow {
                    args.push("-f".into());
                }
                args.extend(["--tail".to_string(), tail.to_string()]);
                args.extend(services.iter().cloned());
            }
            Self::Ps => args.push("ps".into()),
            Self::Build => args.push("build".into()),
            Self::Pull => args.push("pull".into()),
        }

        args
    }
}

/// Services making up a service group, base services first.
///
/// # Errors
///
/// - Return [`ComposeError::UnknownGroup`] if manifest lacks the group.
pub fn group_services<S, P>(ws: &Workspace<S, P>, group: &str) -> Result<Vec<String>>
where
    S: Syscall,
    P: Prompt,
{
    let compose = &ws.manifest().compose;
    let members = compose
        .groups
        .get(group)
        .ok_or_else(|| ComposeError::UnknownGroup {
            group: group.to_string(),
            known: compose.groups.keys().cloned().collect(),
        })?;

    let mut services = compose.base.clone();
    for service in members {
        if !services.contains(service) {
            services.push(service.clone());
        }
    }

    Ok(services)
}

/// Run compose subcommand attached to the terminal.
///
/// # Errors
///
/// - Return [`ComposeError::MissingComposeFile`] if compose file is absent.
/// - Return [`ComposeError::Syscall`] if docker compose fails.
#[instrument(skip(ws), level = "debug")]
pub fn dispatch<S, P>(ws: &Workspace<S, P>, command: &ComposeCommand) -> Result<()>
where
    S: Syscall,
    P: Prompt,
{
    let file = ws.compose_file();
    if !file.exists() {
        return Err(ComposeError::MissingComposeFile(file.display().to_string()));
    }

    if let ComposeCommand::Down { volumes: true } = command {
        warn!("removing containers together with their volumes");
    }

    let invocation = Invocation::new("docker")
        .args(["compose", "-f"])
        .arg(file.as_os_str())
        .args(command.to_args())
        .current_dir(ws.root());
    info!("{invocation}");
    ws.syscall().interactive(&invocation)?;

    Ok(())
}

/// Compose dispatch error types.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// Group name not found in manifest.
    #[error("unknown service group {group:?}, expected one of: {}", known.join(", "))]
    UnknownGroup { group: String, known: Vec<String> },

    /// Compose file is missing from harness root.
    #[error("compose file {0:?} not found, run from the harness root or pass --root")]
    MissingComposeFile(String),

    #[error(transparent)]
    Syscall(#[from] crate::syscall::SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = ComposeError> = std::result::Result<T, E>;
