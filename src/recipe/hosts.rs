// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hosts file recipe.
//!
//! Every platform hostname must resolve to the local machine. Required entries
//! are derived from the manifest, compared against the current hosts file, and
//! whatever is missing is either printed or appended with elevated privileges.

use crate::{
    config::Manifest,
    prompt::Prompt,
    syscall::{Invocation, Syscall},
    workspace::Workspace,
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Marker written above appended entries.
pub const BLOCK_MARKER: &str = "# hotdev: local HOT development";

/// Single `IP hostname` line of the hosts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostsEntry {
    pub ip: String,
    pub hostname: String,
}

impl HostsEntry {
    pub fn new(ip: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            hostname: hostname.into(),
        }
    }
}

impl Display for HostsEntry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} {}", self.ip, self.hostname)
    }
}

/// What to do about missing entries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HostsMode {
    /// Only print instructions.
    #[default]
    Report,

    /// Append missing entries through `sudo`.
    Apply,
}

/// Outcome of the hosts file recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostsReport {
    /// Every required entry is present.
    Complete,

    /// Entries are missing and were left alone.
    Missing(Vec<HostsEntry>),

    /// Missing entries were appended.
    Appended(Vec<HostsEntry>),
}

/// Entries the platform needs.
pub fn required_entries(manifest: &Manifest) -> Vec<HostsEntry> {
    manifest
        .hostnames()
        .into_iter()
        .map(|hostname| HostsEntry::new(manifest.settings.hosts_ip.clone(), hostname))
        .collect()
}

/// Required entries whose line does not occur in hosts file content.
///
/// Presence is a plain substring check. Order of `required` is kept.
pub fn missing_entries(content: &str, required: &[HostsEntry]) -> Vec<HostsEntry> {
    required
        .iter()
        .filter(|entry| !content.contains(entry.to_string().as_str()))
        .cloned()
        .collect()
}

/// Text appended to hosts file for missing entries.
pub fn render_block(missing: &[HostsEntry]) -> String {
    let mut block = format!("\n{BLOCK_MARKER}\n");
    for entry in missing {
        block.push_str(entry.to_string().as_str());
        block.push('\n');
    }

    block
}

/// Check hosts file, and deal with missing entries according to mode.
///
/// # Errors
///
/// - Return [`HostsError::Read`] if hosts file cannot be read.
/// - Return [`HostsError::Syscall`] if appending through `sudo tee` fails.
#[instrument(skip(ws, hosts_file), level = "debug")]
pub fn run<S, P>(ws: &Workspace<S, P>, hosts_file: &Path, mode: HostsMode) -> Result<HostsReport>
where
    S: Syscall,
    P: Prompt,
{
    let content = read_to_string(hosts_file).map_err(|err| HostsError::Read {
        source: err,
        path: hosts_file.to_path_buf(),
    })?;

    let missing = missing_entries(&content, &required_entries(ws.manifest()));
    if missing.is_empty() {
        info!("all entries present in {:?}", hosts_file.display());
        return Ok(HostsReport::Complete);
    }

    let block = render_block(&missing);
    match mode {
        HostsMode::Report => {
            warn!(
                "{} entries missing from {:?}, add the following lines:\n{}",
                missing.len(),
                hosts_file.display(),
                block.trim()
            );
            Ok(HostsReport::Missing(missing))
        }
        HostsMode::Apply => {
            info!(
                "append {} entries to {:?}, sudo may ask for your password",
                missing.len(),
                hosts_file.display()
            );
            ws.syscall().interactive(
                &Invocation::new("sudo")
                    .args(["tee", "-a"])
                    .arg(hosts_file.as_os_str())
                    .stdin_bytes(block),
            )?;
            Ok(HostsReport::Appended(missing))
        }
    }
}

/// Hosts file error types.
#[derive(Debug, thiserror::Error)]
pub enum HostsError {
    /// Hosts file cannot be read.
    #[error("failed to read hosts file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Syscall(#[from] crate::syscall::SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = HostsError> = std::result::Result<T, E>;
