// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Harness workspace.
//!
//! The __workspace__ bundles what every recipe needs: the harness root, the
//! platform manifest, a way to run external tools, and a way to ask the
//! operator questions.
//!
//! # Layout
//!
//! ```text
//! work/
//! ├── hot-dev-env/          <- harness root
//! │   ├── hotdev.toml
//! │   ├── docker-compose.yml
//! │   └── certs/
//! │       ├── localhost.crt
//! │       └── localhost.key
//! ├── portal/               <- sibling repository
//! │   └── .env
//! └── login/
//!     └── .env
//! ```

use crate::{
    config::{Manifest, Project},
    path::sibling_dir,
    prompt::{InquirePrompt, Prompt},
    syscall::{ProcessSyscall, Syscall},
};

use std::path::{Path, PathBuf};

/// Everything a recipe operates on.
#[derive(Debug)]
pub struct Workspace<S = ProcessSyscall, P = InquirePrompt>
where
    S: Syscall,
    P: Prompt,
{
    root: PathBuf,
    manifest: Manifest,
    syscall: S,
    prompt: P,
}

impl Workspace {
    /// Open workspace at harness root for real use.
    ///
    /// # Errors
    ///
    /// - Return [`crate::config::ConfigError::Root`] if root cannot be made
    ///   absolute.
    /// - Return [`crate::config::ConfigError`] if manifest cannot be loaded.
    pub fn open(root: impl Into<PathBuf>, manifest: Option<&Path>) -> crate::config::Result<Self> {
        let root = root.into();
        let root = std::path::absolute(&root)
            .map_err(|source| crate::config::ConfigError::Root { source, path: root })?;
        let manifest = Manifest::load(manifest, &root)?;
        Ok(Self::new(root, manifest, ProcessSyscall::new(), InquirePrompt::new()))
    }
}

impl<S, P> Workspace<S, P>
where
    S: Syscall,
    P: Prompt,
{
    /// Construct new workspace.
    pub fn new(root: impl Into<PathBuf>, manifest: Manifest, syscall: S, prompt: P) -> Self {
        Self {
            root: root.into(),
            manifest,
            syscall,
            prompt,
        }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn syscall(&self) -> &S {
        &self.syscall
    }

    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    /// Checkout directory of sibling project.
    pub fn project_dir(&self, project: &Project) -> PathBuf {
        sibling_dir(&self.root, project.dir.as_path())
    }

    /// Directory holding the local certificate pair.
    pub fn certs_dir(&self) -> PathBuf {
        self.root.join(self.manifest.settings.certs_dir.as_path())
    }

    /// Compose file driving the platform.
    pub fn compose_file(&self) -> PathBuf {
        self.root.join(self.manifest.compose.file.as_path())
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use crate::{
        config::DEFAULT_MANIFEST, prompt::fake::ScriptedPrompt, syscall::fake::RecordingSyscall,
    };

    pub(crate) type FakeWorkspace = Workspace<RecordingSyscall, ScriptedPrompt>;

    /// Workspace over the default manifest with faked tools and answers.
    pub(crate) fn workspace(
        root: impl Into<PathBuf>,
        syscall: RecordingSyscall,
        answers: impl IntoIterator<Item = impl Into<String>>,
    ) -> FakeWorkspace {
        let manifest: Manifest = DEFAULT_MANIFEST.parse().unwrap();
        Workspace::new(root, manifest, syscall, ScriptedPrompt::new(answers))
    }
}
