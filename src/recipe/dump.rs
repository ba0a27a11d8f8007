// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Database dump loader recipe.
//!
//! Replaces an application database with the contents of a SQL dump. This is
//! the one recipe whose side effects need ordering:
//!
//! 1. Fetch the dump into a staging directory, decompressing it if needed.
//! 2. Make sure the database container is running.
//! 3. Ask for explicit confirmation. Nothing is touched before this point.
//! 4. Stop the backend, so nothing holds a connection to the database.
//! 5. Drop and recreate the database.
//! 6. Restore the dump.
//! 7. Enable postgis for spatial applications.
//! 8. Start the backend again.
//!
//! The staging directory is removed when the recipe returns, whichever way it
//! returns. Ctrl+C is caught while the recipe runs, so an interrupted load
//! returns an error instead of killing the process with the dump left behind.

use crate::{
    config::DumpTarget,
    prompt::{is_explicit_yes, Prompt},
    syscall::{Invocation, Syscall},
    workspace::Workspace,
};

use flate2::read::GzDecoder;
use std::{
    fs::{copy, File},
    future::Future,
    io,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

/// Where a dump comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpSource {
    /// Download over HTTP(S).
    Remote(String),

    /// Copy from local filesystem.
    Local(PathBuf),
}

impl DumpSource {
    /// Interpret source given on the command line.
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::Remote(source.to_string())
        } else {
            Self::Local(PathBuf::from(source))
        }
    }

    /// File name the dump is staged under.
    pub fn file_name(&self) -> String {
        let name = match self {
            Self::Remote(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|path| path.rsplit('/').next())
                .map(str::to_owned),
            Self::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        };

        name.filter(|name| !name.is_empty())
            .unwrap_or_else(|| "dump.sql".into())
    }
}

/// Outcome of the dump loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpOutcome {
    /// Database was replaced.
    Loaded,

    /// Operator did not confirm, nothing was touched.
    Aborted,
}

/// Load dump into application database.
///
/// # Errors
///
/// - Return [`DumpError::Config`] if app key is unknown.
/// - Return [`DumpError::Download`] or [`DumpError::Stage`] if the dump
///   cannot be fetched.
/// - Return [`DumpError::ContainerNotRunning`] if database container is down.
/// - Return [`DumpError::Syscall`] if any docker step fails.
/// - Return [`DumpError::Interrupted`] on Ctrl+C.
#[instrument(skip(ws), level = "debug")]
pub async fn load<S, P>(ws: &Workspace<S, P>, app: &str, source: &str) -> Result<DumpOutcome>
where
    S: Syscall,
    P: Prompt,
{
    load_until(ws, app, source, tokio::signal::ctrl_c()).await
}

/// Load dump, giving up as soon as `interrupt` resolves.
pub(crate) async fn load_until<S, P, F>(
    ws: &Workspace<S, P>,
    app: &str,
    source: &str,
    interrupt: F,
) -> Result<DumpOutcome>
where
    S: Syscall,
    P: Prompt,
    F: Future<Output = io::Result<()>>,
{
    let target = ws.manifest().dump_target(app)?;
    let source = DumpSource::parse(source);

    let staging = tempfile::Builder::new()
        .prefix("hotdev-dump-")
        .tempdir()
        .map_err(DumpError::Staging)?;

    // Polled first so the handler is installed before any docker step runs.
    // Children still get SIGINT and fail their step, which unwinds here.
    tokio::select! {
        biased;
        Ok(()) = interrupt => {
            warn!("interrupted, removing {:?}", staging.path().display());
            Err(DumpError::Interrupted)
        }
        result = stage_and_restore(ws, target, &source, &staging) => result,
    }
}

async fn stage_and_restore<S, P>(
    ws: &Workspace<S, P>,
    target: &DumpTarget,
    source: &DumpSource,
    staging: &TempDir,
) -> Result<DumpOutcome>
where
    S: Syscall,
    P: Prompt,
{
    let fetched = fetch(source, staging).await?;
    let sql = decompress(&fetched)?;

    restore(ws, target, &sql)
}

/// Fetch dump into staging directory.
///
/// # Errors
///
/// - Return [`DumpError::Download`] if remote dump cannot be downloaded.
/// - Return [`DumpError::Stage`] if dump cannot be written to staging.
pub async fn fetch(source: &DumpSource, staging: &TempDir) -> Result<PathBuf> {
    let dest = staging.path().join(source.file_name());
    match source {
        DumpSource::Remote(url) => {
            info!("download {url}");
            let mut response = reqwest::get(url.as_str())
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| DumpError::Download {
                    source: err,
                    url: url.clone(),
                })?;

            let mut file = tokio::fs::File::create(&dest)
                .await
                .map_err(|err| stage_error(err, &dest))?;
            while let Some(chunk) = response.chunk().await.map_err(|err| DumpError::Download {
                source: err,
                url: url.clone(),
            })? {
                file.write_all(&chunk)
                    .await
                    .map_err(|err| stage_error(err, &dest))?;
            }
            file.flush().await.map_err(|err| stage_error(err, &dest))?;
        }
        DumpSource::Local(path) => {
            info!("copy {:?}", path.display());
            copy(path, &dest).map_err(|err| stage_error(err, path))?;
        }
    }

    Ok(dest)
}

/// Decompress gzipped dump next to itself.
///
/// Returns path to plain SQL. Dumps without a `.gz` extension are returned
/// untouched.
///
/// # Errors
///
/// - Return [`DumpError::Stage`] if decompression fails.
pub fn decompress(path: &Path) -> Result<PathBuf> {
    if path.extension().is_none_or(|ext| ext != "gz") {
        return Ok(path.to_path_buf());
    }

    let dest = path.with_extension("");
    info!("decompress {:?}", path.display());
    let input = File::open(path).map_err(|err| stage_error(err, path))?;
    let mut output = File::create(&dest).map_err(|err| stage_error(err, &dest))?;
    io::copy(&mut GzDecoder::new(input), &mut output).map_err(|err| stage_error(err, path))?;

    Ok(dest)
}

/// Replace database with dump at path.
///
/// # Errors
///
/// - Return [`DumpError::ContainerNotRunning`] if database container is down.
/// - Return [`DumpError::Prompt`] if confirmation fails.
/// - Return [`DumpError::Syscall`] if any docker step fails.
#[instrument(skip(ws, target), level = "debug")]
pub fn restore<S, P>(ws: &Workspace<S, P>, target: &DumpTarget, sql: &Path) -> Result<DumpOutcome>
where
    S: Syscall,
    P: Prompt,
{
    let syscall = ws.syscall();

    let running = syscall.non_interactive(
        &Invocation::new("docker")
            .args(["inspect", "-f", "{{.State.Running}}"])
            .arg(&target.container),
    );
    if !matches!(running.as_deref().map(str::trim), Ok("true")) {
        return Err(DumpError::ContainerNotRunning(target.container.clone()));
    }

    let answer = ws.prompt().text(
        format!(
            "this drops database {:?} in {:?} and replaces it, continue? [y/N]",
            target.database, target.container
        )
        .as_str(),
    )?;
    if !is_explicit_yes(&answer) {
        warn!("aborted, database left untouched");
        return Ok(DumpOutcome::Aborted);
    }

    info!("stop {}", target.backend);
    syscall.non_interactive(&Invocation::new("docker").args(["stop", target.backend.as_str()]))?;

    info!("recreate database {}", target.database);
    syscall.non_interactive(&psql(target, "postgres").args([
        "-c",
        format!("DROP DATABASE IF EXISTS \"{}\";", target.database).as_str(),
    ]))?;
    syscall.non_interactive(&psql(target, "postgres").args([
        "-c",
        format!(
            "CREATE DATABASE \"{}\" OWNER \"{}\";",
            target.database, target.user
        )
        .as_str(),
    ]))?;

    syscall.non_interactive(
        &psql_stdin(target)
            .stdin_file(sql)
            .spinner(format!("restoring {}", target.database)),
    )?;

    if target.postgis {
        info!("enable postgis in {}", target.database);
        syscall.non_interactive(
            &psql(target, &target.database).args(["-c", "CREATE EXTENSION IF NOT EXISTS postgis;"]),
        )?;
    }

    info!("start {}", target.backend);
    syscall.non_interactive(&Invocation::new("docker").args(["start", target.backend.as_str()]))?;

    info!("loaded dump into {}", target.database);
    Ok(DumpOutcome::Loaded)
}

/// `psql` inside the database container.
pub(crate) fn psql(target: &DumpTarget, database: &str) -> Invocation {
    Invocation::new("docker")
        .args(["exec", target.container.as_str(), "psql", "-v", "ON_ERROR_STOP=1"])
        .args(["-U", target.user.as_str(), "-d", database])
}

/// `psql` inside the database container, reading SQL from standard input.
pub(crate) fn psql_stdin(target: &DumpTarget) -> Invocation {
    Invocation::new("docker")
        .args(["exec", "-i", target.container.as_str(), "psql", "-q", "-v", "ON_ERROR_STOP=1"])
        .args(["-U", target.user.as_str(), "-d", target.database.as_str()])
}

fn stage_error(source: io::Error, path: &Path) -> DumpError {
    DumpError::Stage {
        source,
        path: path.to_path_buf(),
    }
}

/// Dump loader error types.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// Staging directory cannot be created.
    #[error("failed to create staging directory")]
    Staging(#[source] io::Error),

    /// Dump cannot be staged.
    #[error("failed to stage dump at {:?}", path.display())]
    Stage {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Remote dump cannot be downloaded.
    #[error("failed to download dump from {url}")]
    Download {
        #[source]
        source: reqwest::Error,
        url: String,
    },

    /// Operator pressed Ctrl+C.
    #[error("dump load interrupted")]
    Interrupted,

    /// Database container is not up.
    #[error("container {0:?} is not running, start it with `make dev` first")]
    ContainerNotRunning(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Prompt(#[from] crate::prompt::PromptError),

    #[error(transparent)]
    Syscall(#[from] crate::syscall::SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = DumpError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        syscall::{fake::RecordingSyscall, Input},
        workspace::fixture::workspace,
    };
    use flate2::{write::GzEncoder, Compression};
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::{
        fs::{create_dir, read_dir, read_to_string, write},
        future::{pending, ready},
        io::Write,
    };

    fn running(container: &str) -> RecordingSyscall {
        RecordingSyscall::new().reply(
            format!("docker inspect -f {{{{.State.Running}}}} {container}"),
            "true",
        )
    }

    #[test_case("https://example.org/dumps/dtm.sql.gz?sig=abc", "dtm.sql.gz"; "remote with query")]
    #[test_case("https://example.org/", "dump.sql"; "remote without name")]
    #[test_case("/tmp/portal.sql", "portal.sql"; "local")]
    #[test]
    fn staged_file_name(source: &str, expect: &str) {
        assert_eq!(DumpSource::parse(source).file_name(), expect);
    }

    #[test]
    fn parse_source_kind() {
        assert_eq!(
            DumpSource::parse("http://x/y.sql"),
            DumpSource::Remote("http://x/y.sql".into())
        );
        assert_eq!(
            DumpSource::parse("dumps/y.sql"),
            DumpSource::Local(PathBuf::from("dumps/y.sql"))
        );
    }

    #[test_case(""; "empty")]
    #[test_case("n"; "no")]
    #[test_case("yes"; "spelled out")]
    #[test_case("q"; "anything else")]
    #[test]
    fn anything_but_y_aborts_without_mutation(answer: &str) -> anyhow::Result<()> {
        let ws = workspace(".", running("dronetm-db"), [answer]);
        let target = ws.manifest().dump_target("dronetm")?.clone();

        let result = restore(&ws, &target, Path::new("dump.sql"))?;
        assert_eq!(result, DumpOutcome::Aborted);
        assert_eq!(
            ws.syscall().commands(),
            ["docker inspect -f {{.State.Running}} dronetm-db"]
        );

        Ok(())
    }

    #[test]
    fn confirmed_restore_runs_steps_in_order() -> anyhow::Result<()> {
        let ws = workspace(".", running("dronetm-db"), ["Y"]);
        let target = ws.manifest().dump_target("dronetm")?.clone();

        let result = restore(&ws, &target, Path::new("/stage/dtm.sql"))?;
        assert_eq!(result, DumpOutcome::Loaded);
        assert_eq!(
            ws.syscall().commands(),
            [
                "docker inspect -f {{.State.Running}} dronetm-db",
                "docker stop dronetm-backend",
                "docker exec dronetm-db psql -v ON_ERROR_STOP=1 -U dtm -d postgres -c DROP DATABASE IF EXISTS \"dtm_db\";",
                "docker exec dronetm-db psql -v ON_ERROR_STOP=1 -U dtm -d postgres -c CREATE DATABASE \"dtm_db\" OWNER \"dtm\";",
                "docker exec -i dronetm-db psql -q -v ON_ERROR_STOP=1 -U dtm -d dtm_db",
                "docker exec dronetm-db psql -v ON_ERROR_STOP=1 -U dtm -d dtm_db -c CREATE EXTENSION IF NOT EXISTS postgis;",
                "docker start dronetm-backend",
            ]
        );
        assert_eq!(
            ws.syscall().calls()[4].input(),
            Some(&Input::File(PathBuf::from("/stage/dtm.sql")))
        );

        Ok(())
    }

    #[test]
    fn non_spatial_target_skips_postgis() -> anyhow::Result<()> {
        let ws = workspace(".", running("portal-db"), ["y"]);
        let target = ws.manifest().dump_target("portal")?.clone();

        restore(&ws, &target, Path::new("portal.sql"))?;
        let commands = ws.syscall().commands();
        assert!(commands.iter().all(|command| !command.contains("postgis")));
        assert_eq!(commands.last().map(String::as_str), Some("docker start portal-backend"));

        Ok(())
    }

    #[test]
    fn stopped_container_fails_before_asking() -> anyhow::Result<()> {
        let syscall = RecordingSyscall::new().reply("docker inspect", "false");
        let ws = workspace(".", syscall, ["y"]);
        let target = ws.manifest().dump_target("umap")?.clone();

        let result = restore(&ws, &target, Path::new("umap.sql"));
        assert!(matches!(result, Err(DumpError::ContainerNotRunning(name)) if name == "umap-db"));
        assert!(ws.prompt().asked().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn gzipped_dump_decompressed() -> anyhow::Result<()> {
        let mut encoder = GzEncoder::new(File::create("dtm.sql.gz")?, Compression::default());
        encoder.write_all(b"SELECT 1;\n")?;
        encoder.finish()?;

        let result = decompress(Path::new("dtm.sql.gz"))?;
        assert_eq!(result, PathBuf::from("dtm.sql"));
        assert_eq!(read_to_string(result)?, "SELECT 1;\n");

        let result = decompress(Path::new("plain.sql"))?;
        assert_eq!(result, PathBuf::from("plain.sql"));

        Ok(())
    }

    #[sealed_test]
    fn local_dump_copied_into_staging() -> anyhow::Result<()> {
        write("portal.sql", "SELECT 1;\n")?;
        let staging = TempDir::new()?;
        let runtime = tokio::runtime::Runtime::new()?;

        let result = runtime.block_on(fetch(&DumpSource::parse("portal.sql"), &staging))?;
        assert_eq!(result, staging.path().join("portal.sql"));
        assert_eq!(read_to_string(result)?, "SELECT 1;\n");

        Ok(())
    }

    #[sealed_test(env = [("TMPDIR", "staging")])]
    fn interrupt_removes_staging() -> anyhow::Result<()> {
        create_dir("staging")?;
        write("portal.sql", "SELECT 1;\n")?;
        let ws = workspace(".", running("portal-db"), ["y"]);
        let runtime = tokio::runtime::Runtime::new()?;

        let result = runtime.block_on(load_until(&ws, "portal", "portal.sql", ready::<io::Result<()>>(Ok(()))));
        assert!(matches!(result, Err(DumpError::Interrupted)));
        assert_eq!(read_dir("staging")?.count(), 0);
        assert!(ws.syscall().commands().is_empty());

        Ok(())
    }

    #[sealed_test(env = [("TMPDIR", "staging")])]
    fn failed_restore_removes_staging() -> anyhow::Result<()> {
        create_dir("staging")?;
        write("portal.sql", "SELECT 1;\n")?;
        let syscall = RecordingSyscall::new().reply("docker inspect", "false");
        let ws = workspace(".", syscall, ["y"]);
        let runtime = tokio::runtime::Runtime::new()?;

        let result = runtime.block_on(load_until(&ws, "portal", "portal.sql", pending::<io::Result<()>>()));
        assert!(matches!(result, Err(DumpError::ContainerNotRunning(_))));
        assert_eq!(read_dir("staging")?.count(), 0);

        Ok(())
    }

    #[test]
    fn unknown_app_rejected_before_staging() -> anyhow::Result<()> {
        let ws = workspace(".", RecordingSyscall::new(), Vec::<String>::new());
        let runtime = tokio::runtime::Runtime::new()?;

        let result = runtime.block_on(load(&ws, "tasking-manager", "dump.sql"));
        assert!(matches!(result, Err(DumpError::Config(_))));
        assert!(ws.syscall().commands().is_empty());

        Ok(())
    }
}
