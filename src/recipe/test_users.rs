// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Test user seeding recipe.
//!
//! Dump targets may declare a seed SQL file with login accounts for local
//! testing. Seeds are written to be idempotent, so running this twice is fine.

use crate::{
    config::DumpTarget,
    prompt::Prompt,
    recipe::dump::psql_stdin,
    syscall::Syscall,
    workspace::Workspace,
};

use tracing::{info, instrument, warn};

/// Seed test users into every target that declares seeds, or only one.
///
/// Returns app keys that were seeded.
///
/// # Errors
///
/// - Return [`TestUsersError::Config`] if app key is unknown.
/// - Return [`TestUsersError::NoSeed`] if the named target has no seed SQL.
/// - Return [`TestUsersError::MissingSeedFile`] if seed SQL file is absent.
/// - Return [`TestUsersError::Syscall`] if `psql` fails.
#[instrument(skip(ws), level = "debug")]
pub fn run<S, P>(ws: &Workspace<S, P>, app: Option<&str>) -> Result<Vec<String>>
where
    S: Syscall,
    P: Prompt,
{
    let targets: Vec<&DumpTarget> = match app {
        Some(app) => {
            let target = ws.manifest().dump_target(app)?;
            if target.test_users.is_none() {
                return Err(TestUsersError::NoSeed(app.to_string()));
            }
            vec![target]
        }
        None => ws.manifest().dumps.iter().collect(),
    };

    let mut seeded = Vec::new();
    for target in targets {
        let Some(seed) = &target.test_users else {
            warn!("no test users declared for {}, skipping", target.app);
            continue;
        };

        let seed = ws.root().join(seed.as_path());
        if !seed.is_file() {
            return Err(TestUsersError::MissingSeedFile(seed.display().to_string()));
        }

        info!("seed test users into {}", target.database);
        ws.syscall().non_interactive(
            &psql_stdin(target)
                .stdin_file(seed)
                .spinner(format!("seeding {}", target.app)),
        )?;
        seeded.push(target.app.clone());
    }

    Ok(seeded)
}

/// Test user seeding error types.
#[derive(Debug, thiserror::Error)]
pub enum TestUsersError {
    /// Named target has nothing to seed.
    #[error("no test users declared for {0:?}")]
    NoSeed(String),

    /// Declared seed file is missing.
    #[error("seed file {0:?} not found")]
    MissingSeedFile(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Syscall(#[from] crate::syscall::SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = TestUsersError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        syscall::{fake::RecordingSyscall, Input},
        workspace::fixture::workspace,
    };
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{
        fs::{create_dir_all, write},
        path::PathBuf,
    };

    fn seeds() -> std::io::Result<()> {
        create_dir_all("seeds/test-users")?;
        write("seeds/test-users/login.sql", "SELECT 1;\n")?;
        write("seeds/test-users/dronetm.sql", "SELECT 2;\n")
    }

    #[sealed_test]
    fn targets_without_seeds_are_skipped() -> anyhow::Result<()> {
        seeds()?;
        let ws = workspace(".", RecordingSyscall::new(), Vec::<String>::new());

        let result = run(&ws, None)?;
        assert_eq!(result, ["login", "dronetm"]);
        assert_eq!(
            ws.syscall().commands(),
            [
                "docker exec -i login-db psql -q -v ON_ERROR_STOP=1 -U hanko -d hanko",
                "docker exec -i dronetm-db psql -q -v ON_ERROR_STOP=1 -U dtm -d dtm_db",
            ]
        );
        assert_eq!(
            ws.syscall().calls()[0].input(),
            Some(&Input::File(PathBuf::from("./seeds/test-users/login.sql")))
        );

        Ok(())
    }

    #[sealed_test]
    fn named_target_without_seed_fails() -> anyhow::Result<()> {
        seeds()?;
        let ws = workspace(".", RecordingSyscall::new(), Vec::<String>::new());

        let result = run(&ws, Some("umap"));
        assert!(matches!(result, Err(TestUsersError::NoSeed(app)) if app == "umap"));
        assert!(ws.syscall().commands().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn missing_seed_file_fails() {
        let ws = workspace(".", RecordingSyscall::new(), Vec::<String>::new());
        let result = run(&ws, Some("login"));
        assert!(matches!(result, Err(TestUsersError::MissingSeedFile(_))));
    }
}
