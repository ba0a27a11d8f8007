// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Auth library distribution recipe.
//!
//! The login project ships the shared authentication client libraries that
//! every other frontend vendors in. Consumers either get a plain copy, or a
//! symlink back to the source for live development on the libraries
//! themselves.
//!
//! Copies honor ignore files inside the source directory, so build output
//! like `node_modules/` never ends up vendored.

use crate::{
    prompt::Prompt,
    syscall::Syscall,
    workspace::Workspace,
};

use ignore::WalkBuilder;
use std::{
    fs::{copy, create_dir_all, remove_dir_all, remove_file, symlink_metadata},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Copy auth libraries into every consumer.
///
/// Returns consumer targets that were written.
///
/// # Errors
///
/// - Return [`AuthLibsError::NotConfigured`] if manifest has no auth libraries.
/// - Return [`AuthLibsError::MissingSource`] if source directory is absent.
/// - Return [`AuthLibsError::MissingProject`] if consumer checkout is absent.
/// - Return [`AuthLibsError::Io`] or [`AuthLibsError::Walk`] if copy fails.
#[instrument(skip(ws), level = "debug")]
pub fn distribute<S, P>(ws: &Workspace<S, P>) -> Result<Vec<PathBuf>>
where
    S: Syscall,
    P: Prompt,
{
    let source = source_dir(ws)?;
    let targets = consumer_targets(ws)?;
    for target in &targets {
        info!("copy auth libraries into {:?}", target.display());
        copy_tree(&source, target)?;
    }

    Ok(targets)
}

/// Symlink every consumer target to the auth library source.
///
/// # Errors
///
/// - Return [`AuthLibsError::Unsupported`] on platforms without symlinks.
/// - Return same errors as [`distribute`] otherwise.
#[instrument(skip(ws), level = "debug")]
pub fn link<S, P>(ws: &Workspace<S, P>) -> Result<Vec<PathBuf>>
where
    S: Syscall,
    P: Prompt,
{
    let source = source_dir(ws)?;
    let source = std::path::absolute(&source).map_err(|err| io_error(err, &source))?;
    let targets = consumer_targets(ws)?;
    for target in &targets {
        info!("link {:?} -> {:?}", target.display(), source.display());
        remove_existing(target)?;
        if let Some(parent) = target.parent() {
            create_dir_all(parent).map_err(|err| io_error(err, parent))?;
        }
        symlink_dir(&source, target)?;
    }

    Ok(targets)
}

/// Replace symlinked consumer targets with plain copies.
///
/// Targets that are not symlinks are left alone.
///
/// Returns consumer targets that were restored.
///
/// # Errors
///
/// - Return same errors as [`distribute`].
#[instrument(skip(ws), level = "debug")]
pub fn unlink<S, P>(ws: &Workspace<S, P>) -> Result<Vec<PathBuf>>
where
    S: Syscall,
    P: Prompt,
{
    let source = source_dir(ws)?;
    let mut restored = Vec::new();
    for target in consumer_targets(ws)? {
        if !is_symlink(&target) {
            debug!("{:?} is not a symlink, leaving it alone", target.display());
            continue;
        }

        info!("restore plain copy at {:?}", target.display());
        copy_tree(&source, &target)?;
        restored.push(target);
    }

    if restored.is_empty() {
        warn!("no linked auth libraries found");
    }

    Ok(restored)
}

/// Resolve auth library source directory.
///
/// # Errors
///
/// - Return [`AuthLibsError::NotConfigured`] if manifest has no auth libraries.
/// - Return [`AuthLibsError::UnknownProject`] if source project is unknown.
/// - Return [`AuthLibsError::MissingSource`] if directory is absent.
pub fn source_dir<S, P>(ws: &Workspace<S, P>) -> Result<PathBuf>
where
    S: Syscall,
    P: Prompt,
{
    let libs = ws
        .manifest()
        .auth_libs
        .as_ref()
        .ok_or(AuthLibsError::NotConfigured)?;
    let project = ws
        .manifest()
        .project(&libs.project)
        .ok_or_else(|| AuthLibsError::UnknownProject(libs.project.clone()))?;

    let source = ws.project_dir(project).join(libs.source.as_path());
    if !source.is_dir() {
        return Err(AuthLibsError::MissingSource(source));
    }

    Ok(source)
}

/// Resolve every consumer target path.
///
/// # Errors
///
/// - Return [`AuthLibsError::UnknownProject`] if consumer project is unknown.
/// - Return [`AuthLibsError::MissingProject`] if consumer checkout is absent.
pub fn consumer_targets<S, P>(ws: &Workspace<S, P>) -> Result<Vec<PathBuf>>
where
    S: Syscall,
    P: Prompt,
{
    let Some(libs) = ws.manifest().auth_libs.as_ref() else {
        return Err(AuthLibsError::NotConfigured);
    };

    let mut targets = Vec::new();
    for consumer in &libs.consumers {
        let project = ws
            .manifest()
            .project(&consumer.project)
            .ok_or_else(|| AuthLibsError::UnknownProject(consumer.project.clone()))?;

        let dir = ws.project_dir(project);
        if !dir.is_dir() {
            return Err(AuthLibsError::MissingProject {
                project: project.name.clone(),
                path: dir,
            });
        }
        targets.push(dir.join(consumer.target.as_path()));
    }

    Ok(targets)
}

/// Replace destination with copy of source directory tree.
fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    remove_existing(dest)?;
    create_dir_all(dest).map_err(|err| io_error(err, dest))?;

    let walker = WalkBuilder::new(source)
        .hidden(false)
        .require_git(false)
        .follow_links(false)
        .build();
    for entry in walker {
        let entry = entry?;
        // INVARIANT: Walker only yields paths under its root.
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let dest = dest.join(relative);

        match entry.file_type() {
            Some(kind) if kind.is_dir() => {
                create_dir_all(&dest).map_err(|err| io_error(err, &dest))?;
            }
            Some(kind) if kind.is_file() => {
                copy(entry.path(), &dest).map_err(|err| io_error(err, entry.path()))?;
            }
            _ => debug!("skip {:?}", entry.path().display()),
        }
    }

    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
}

fn remove_existing(path: &Path) -> Result<()> {
    let Ok(meta) = symlink_metadata(path) else {
        return Ok(());
    };

    let result = if meta.is_dir() {
        remove_dir_all(path)
    } else {
        remove_file(path)
    };
    result.map_err(|err| io_error(err, path))
}

#[cfg(unix)]
fn symlink_dir(source: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(source, target).map_err(|err| io_error(err, target))
}

#[cfg(not(unix))]
fn symlink_dir(_source: &Path, _target: &Path) -> Result<()> {
    Err(AuthLibsError::Unsupported)
}

fn io_error(source: io::Error, path: &Path) -> AuthLibsError {
    AuthLibsError::Io {
        source,
        path: path.to_path_buf(),
    }
}

/// Auth library distribution error types.
#[derive(Debug, thiserror::Error)]
pub enum AuthLibsError {
    /// Manifest declares no auth libraries.
    #[error("manifest does not declare auth libraries")]
    NotConfigured,

    /// Project name not found in manifest.
    #[error("unknown project {0:?}")]
    UnknownProject(String),

    /// Source directory is absent.
    #[error("auth library source {:?} not found, run `hotdev setup` first", .0.display())]
    MissingSource(PathBuf),

    /// Consumer checkout is absent.
    #[error("project {project:?} not checked out at {:?}, run `hotdev setup` first", path.display())]
    MissingProject { project: String, path: PathBuf },

    /// Symlinks are not available.
    #[error("linking auth libraries is only supported on unix")]
    Unsupported,

    /// Filesystem operation failed.
    #[error("failed to write {:?}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Source directory cannot be walked.
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = AuthLibsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{syscall::fake::RecordingSyscall, workspace::fixture::workspace};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{read_to_string, write};

    const CONSUMERS: [&str; 5] = ["portal", "drone-tm", "fAIr", "umap", "osm-export-tool"];

    fn layout() -> std::io::Result<()> {
        create_dir_all("hot-dev-env")?;
        create_dir_all("login/auth-libs/web/node_modules/dep")?;
        write("login/auth-libs/.gitignore", "node_modules/\n")?;
        write("login/auth-libs/web/index.js", "export {};\n")?;
        write("login/auth-libs/web/node_modules/dep/index.js", "junk\n")?;
        for consumer in CONSUMERS {
            create_dir_all(consumer)?;
        }

        Ok(())
    }

    #[sealed_test]
    fn distribute_copies_into_every_consumer() -> anyhow::Result<()> {
        layout()?;
        create_dir_all("portal/frontend/vendor/hotosm-auth/stale")?;
        let ws = workspace("hot-dev-env", RecordingSyscall::new(), Vec::<String>::new());

        let result = distribute(&ws)?;
        assert_eq!(result.len(), CONSUMERS.len());
        assert_eq!(result[1], PathBuf::from("drone-tm/src/frontend/vendor/hotosm-auth"));
        for target in &result {
            assert_eq!(read_to_string(target.join("web/index.js"))?, "export {};\n");
            assert!(!target.join("web/node_modules").exists());
        }
        assert!(!Path::new("portal/frontend/vendor/hotosm-auth/stale").exists());

        Ok(())
    }

    #[sealed_test]
    fn missing_consumer_checkout_fails() -> anyhow::Result<()> {
        layout()?;
        remove_dir_all("umap")?;
        let ws = workspace("hot-dev-env", RecordingSyscall::new(), Vec::<String>::new());

        let result = distribute(&ws);
        assert!(matches!(result, Err(AuthLibsError::MissingProject { project, .. }) if project == "umap"));

        Ok(())
    }

    #[sealed_test]
    fn missing_source_fails() {
        create_dir_all("hot-dev-env").unwrap();
        let ws = workspace("hot-dev-env", RecordingSyscall::new(), Vec::<String>::new());
        let result = distribute(&ws);
        assert!(matches!(result, Err(AuthLibsError::MissingSource(_))));
    }

    #[cfg(unix)]
    #[sealed_test]
    fn link_then_unlink_restores_copies() -> anyhow::Result<()> {
        layout()?;
        let ws = workspace("hot-dev-env", RecordingSyscall::new(), Vec::<String>::new());

        let linked = link(&ws)?;
        for target in &linked {
            assert!(is_symlink(target));
            assert_eq!(read_to_string(target.join("web/index.js"))?, "export {};\n");
        }

        let restored = unlink(&ws)?;
        assert_eq!(restored, linked);
        for target in &restored {
            assert!(!is_symlink(target));
            assert_eq!(read_to_string(target.join("web/index.js"))?, "export {};\n");
        }
        assert!(Path::new("login/auth-libs/web/index.js").exists());

        Ok(())
    }

    #[sealed_test]
    fn unlink_leaves_plain_copies_alone() -> anyhow::Result<()> {
        layout()?;
        let ws = workspace("hot-dev-env", RecordingSyscall::new(), Vec::<String>::new());

        distribute(&ws)?;
        write("umap/umap/static/hotosm-auth/local.js", "kept\n")?;
        let result = unlink(&ws)?;
        assert!(result.is_empty());
        assert_eq!(read_to_string("umap/umap/static/hotosm-auth/local.js")?, "kept\n");

        Ok(())
    }
}
