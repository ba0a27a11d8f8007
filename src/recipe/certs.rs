// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Certificate provisioning recipe.
//!
//! The reverse proxy terminates TLS for every platform hostname with a single
//! certificate pair at `certs/localhost.crt` and `certs/localhost.key`. The
//! pair is produced by [mkcert], which also installs a local trust root so
//! browsers accept it. The pair is generated once, and regenerated wholesale
//! on request. It is never patched.
//!
//! [mkcert]: https://github.com/FiloSottile/mkcert

use crate::{
    prompt::Prompt,
    syscall::{Invocation, Syscall},
    workspace::Workspace,
};

use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

const MKCERT: &str = "mkcert";

/// Local certificate pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPair {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl CertPair {
    /// Certificate pair inside target directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            cert: dir.join("localhost.crt"),
            key: dir.join("localhost.key"),
        }
    }

    /// Both halves of the pair exist.
    pub fn exists(&self) -> bool {
        self.cert.exists() && self.key.exists()
    }
}

/// Outcome of the certificate recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertReport {
    /// New certificate pair was generated.
    Generated(CertPair),

    /// Operator chose to keep the existing pair.
    Kept(CertPair),
}

/// Names the certificate must cover.
pub fn certificate_names<S, P>(ws: &Workspace<S, P>) -> Vec<String>
where
    S: Syscall,
    P: Prompt,
{
    let mut names = vec![format!("*.{}", ws.manifest().settings.base_domain)];
    names.extend(ws.manifest().hostnames());
    names.extend(["localhost", "127.0.0.1", "::1"].map(String::from));
    names
}

/// Provision local certificate pair.
///
/// # Errors
///
/// - Return [`CertError::MissingTool`] if mkcert is absent and cannot be
///   installed.
/// - Return [`CertError::CreateDir`] if certificate directory cannot be made.
/// - Return [`CertError::Syscall`] if mkcert fails.
/// - Return [`CertError::Prompt`] if overwrite question fails.
#[instrument(skip(ws), level = "debug")]
pub fn run<S, P>(ws: &Workspace<S, P>) -> Result<CertReport>
where
    S: Syscall,
    P: Prompt,
{
    ensure_mkcert(ws)?;
    ensure_trust_root(ws)?;

    let dir = ws.certs_dir();
    let pair = CertPair::in_dir(&dir);
    if pair.exists() {
        let overwrite = ws.prompt().confirm(
            format!("certificates already exist in {:?}, regenerate them?", dir.display()).as_str(),
            false,
        )?;
        if !overwrite {
            info!("keep existing certificates");
            return Ok(CertReport::Kept(pair));
        }
    }

    create_dir_all(&dir).map_err(|err| CertError::CreateDir {
        source: err,
        path: dir.clone(),
    })?;

    let names = certificate_names(ws);
    info!("generate certificate for {}", names.join(", "));
    ws.syscall().interactive(
        &Invocation::new(MKCERT)
            .arg("-cert-file")
            .arg(pair.cert.as_os_str())
            .arg("-key-file")
            .arg(pair.key.as_os_str())
            .args(names),
    )?;

    Ok(CertReport::Generated(pair))
}

fn ensure_mkcert<S, P>(ws: &Workspace<S, P>) -> Result<()>
where
    S: Syscall,
    P: Prompt,
{
    if ws.syscall().has_program(MKCERT) {
        return Ok(());
    }

    if ws.syscall().has_program("brew") {
        info!("install mkcert through homebrew");
        ws.syscall()
            .interactive(&Invocation::new("brew").args(["install", MKCERT, "nss"]))?;
        return Ok(());
    }

    Err(CertError::MissingTool)
}

fn ensure_trust_root<S, P>(ws: &Workspace<S, P>) -> Result<()>
where
    S: Syscall,
    P: Prompt,
{
    let caroot = ws
        .syscall()
        .non_interactive(&Invocation::new(MKCERT).arg("-CAROOT"))?;
    if Path::new(caroot.trim()).join("rootCA.pem").exists() {
        return Ok(());
    }

    warn!("no local trust root found, installing one");
    ws.syscall()
        .interactive(&Invocation::new(MKCERT).arg("-install"))?;

    Ok(())
}

/// Certificate provisioning error types.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// No mkcert binary, and no package manager to get it with.
    #[error(
        "mkcert not found, install it first: https://github.com/FiloSottile/mkcert#installation"
    )]
    MissingTool,

    /// Certificate directory cannot be created.
    #[error("failed to create certificate directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Syscall(#[from] crate::syscall::SyscallError),

    #[error(transparent)]
    Prompt(#[from] crate::prompt::PromptError),
}

/// Friendly result alias :3
pub type Result<T, E = CertError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{syscall::fake::RecordingSyscall, workspace::fixture::workspace};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{read, write};

    fn tools(caroot: &str) -> RecordingSyscall {
        RecordingSyscall::new()
            .with_program("mkcert")
            .reply("mkcert -CAROOT", caroot)
    }

    #[sealed_test]
    fn declining_overwrite_keeps_pair_byte_identical() -> anyhow::Result<()> {
        create_dir_all("caroot")?;
        write("caroot/rootCA.pem", "root")?;
        create_dir_all("certs")?;
        write("certs/localhost.crt", "old cert")?;
        write("certs/localhost.key", "old key")?;

        let ws = workspace(".", tools("caroot"), ["n"]);
        let result = run(&ws)?;

        assert_eq!(result, CertReport::Kept(CertPair::in_dir(Path::new("./certs"))));
        assert_eq!(read("certs/localhost.crt")?, b"old cert");
        assert_eq!(read("certs/localhost.key")?, b"old key");
        assert_eq!(ws.syscall().commands(), ["mkcert -CAROOT"]);

        Ok(())
    }

    #[sealed_test]
    fn fresh_pair_generated_without_asking() -> anyhow::Result<()> {
        create_dir_all("caroot")?;
        write("caroot/rootCA.pem", "root")?;

        let ws = workspace(".", tools("caroot"), Vec::<String>::new());
        let result = run(&ws)?;

        assert_eq!(
            result,
            CertReport::Generated(CertPair::in_dir(Path::new("./certs")))
        );
        assert!(ws.prompt().asked().is_empty());
        assert!(Path::new("certs").is_dir());

        let commands = ws.syscall().commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[1].starts_with(
            "mkcert -cert-file ./certs/localhost.crt -key-file ./certs/localhost.key *.hotosm.test hotosm.test portal.hotosm.test"
        ));
        assert!(commands[1].ends_with("localhost 127.0.0.1 ::1"));

        Ok(())
    }

    #[sealed_test]
    fn trust_root_installed_when_absent() -> anyhow::Result<()> {
        let ws = workspace(".", tools("caroot"), Vec::<String>::new());
        run(&ws)?;

        let commands = ws.syscall().commands();
        assert_eq!(commands[..2], ["mkcert -CAROOT", "mkcert -install"]);

        Ok(())
    }

    #[test]
    fn missing_mkcert_without_homebrew_fails() {
        let ws = workspace("/nowhere", RecordingSyscall::new(), Vec::<String>::new());
        let result = run(&ws);
        assert!(matches!(result, Err(CertError::MissingTool)));
        assert!(ws.syscall().commands().is_empty());
    }
}
