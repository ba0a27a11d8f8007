// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Environment file handling.
//!
//! Every sibling repository is configured through a flat `.env` file of
//! `KEY=VALUE` lines. The harness never edits an existing `.env` file. It only
//! creates one from the `.env.example` template that each repository ships,
//! and reports which keys were left blank so the operator knows what still
//! needs filling in, e.g., `COOKIE_SECRET`, `OSM_CLIENT_ID`, etc.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{copy, read_to_string},
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Name of the environment template file.
pub const TEMPLATE_FILE: &str = ".env.example";

/// Name of the environment file.
pub const ENV_FILE: &str = ".env";

/// Parsed environment file.
///
/// Keeps every line, so comments and blank lines survive.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<EnvLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EnvLine {
    Entry { key: String, value: String, raw: String },
    Other(String),
}

impl EnvFile {
    /// Look up value of key.
    ///
    /// Last assignment wins, like most dotenv loaders.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            EnvLine::Entry { key: name, value, .. } if name == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// List keys in order of appearance.
    pub fn keys(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                EnvLine::Entry { key, .. } => Some(key.as_str()),
                EnvLine::Other(_) => None,
            })
            .collect()
    }

    /// List keys whose value is empty.
    pub fn blank_keys(&self) -> Vec<&str> {
        self.keys()
            .into_iter()
            .filter(|key| self.get(key).is_some_and(str::is_empty))
            .collect()
    }
}

impl From<&str> for EnvFile {
    fn from(content: &str) -> Self {
        let lines = content.lines().map(parse_line).collect();
        Self { lines }
    }
}

impl Display for EnvFile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for line in &self.lines {
            match line {
                EnvLine::Entry { raw, .. } | EnvLine::Other(raw) => writeln!(fmt, "{raw}")?,
            }
        }

        Ok(())
    }
}

fn parse_line(line: &str) -> EnvLine {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return EnvLine::Other(line.to_string());
    }

    let assignment = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let Some((key, value)) = assignment.split_once('=') else {
        return EnvLine::Other(line.to_string());
    };

    EnvLine::Entry {
        key: key.trim().to_string(),
        value: unquote(value.trim()).to_string(),
        raw: line.to_string(),
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }

    value
}

/// Result of making sure a project has an environment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvStatus {
    /// Environment file was copied from template. Lists blank keys.
    Created(Vec<String>),

    /// Environment file was already there.
    Exists,

    /// Project ships no template.
    NoTemplate,
}

/// Create `.env` from `.env.example` inside target directory.
///
/// Never overwrites an existing `.env` file.
///
/// # Errors
///
/// - Return [`EnvError::Copy`] if template cannot be copied.
/// - Return [`EnvError::Read`] if new environment file cannot be read back.
#[instrument(skip(dir), level = "debug")]
pub fn ensure_from_template(dir: &Path) -> Result<EnvStatus> {
    let env_path = dir.join(ENV_FILE);
    let template_path = dir.join(TEMPLATE_FILE);

    if env_path.exists() {
        return Ok(EnvStatus::Exists);
    }

    if !template_path.exists() {
        warn!("no {TEMPLATE_FILE} in {:?}", dir.display());
        return Ok(EnvStatus::NoTemplate);
    }

    copy(&template_path, &env_path).map_err(|err| EnvError::Copy {
        source: err,
        path: env_path.clone(),
    })?;
    info!("created {:?} from {TEMPLATE_FILE}", env_path.display());

    let content = read_to_string(&env_path).map_err(|err| EnvError::Read {
        source: err,
        path: env_path.clone(),
    })?;
    let blank = EnvFile::from(content.as_str())
        .blank_keys()
        .into_iter()
        .map(str::to_owned)
        .collect::<Vec<_>>();
    if !blank.is_empty() {
        warn!("fill in {} in {:?}", blank.join(", "), env_path.display());
    }

    Ok(EnvStatus::Created(blank))
}

/// Environment file error types.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// Template cannot be copied into place.
    #[error("failed to create environment file at {:?}", path.display())]
    Copy {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Environment file cannot be read.
    #[error("failed to read environment file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = EnvError> = std::result::Result<T, E>;
