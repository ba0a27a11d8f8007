// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Health probe recipe.
//!
//! Probes `https://<domain>` for every platform hostname through the reverse
//! proxy. Local certificates are signed by the mkcert trust root, which the
//! bundled TLS roots do not know about, so local probes skip certificate
//! verification.

use crate::{prompt::Prompt, syscall::Syscall, workspace::Workspace};

use futures::future::join_all;
use reqwest::Client;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::{Duration, Instant},
};
use tracing::{info, instrument, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of probing one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub url: String,
    pub outcome: ProbeOutcome,
}

/// What came back from a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Got a response.
    Status { code: u16, latency: Duration },

    /// Request never completed.
    Error(String),
}

impl Probe {
    /// Responded without a server error.
    pub fn is_healthy(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Status { code, .. } if code < 500)
    }
}

impl Display for ProbeOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Status { code, latency } => write!(fmt, "{code} in {}ms", latency.as_millis()),
            Self::Error(error) => write!(fmt, "error: {error}"),
        }
    }
}

impl Display for Probe {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} {}", self.url, self.outcome)
    }
}

/// HTTP client for probes.
///
/// # Errors
///
/// - Return [`HealthError::Client`] if TLS backend cannot be initialized.
pub fn client(accept_invalid_certs: bool) -> Result<Client> {
    Ok(Client::builder()
        .timeout(PROBE_TIMEOUT)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()?)
}

/// Probe a single URL.
pub async fn probe(client: &Client, url: impl Into<String>) -> Probe {
    let url = url.into();
    let start = Instant::now();
    let outcome = match client.get(url.as_str()).send().await {
        Ok(response) => ProbeOutcome::Status {
            code: response.status().as_u16(),
            latency: start.elapsed(),
        },
        Err(error) => ProbeOutcome::Error(error.without_url().to_string()),
    };

    Probe { url, outcome }
}

/// Probe every platform hostname concurrently.
///
/// # Errors
///
/// - Return [`HealthError::Client`] if HTTP client cannot be built.
/// - Return [`HealthError::Unhealthy`] if any probe failed.
#[instrument(skip(ws), level = "debug")]
pub async fn run<S, P>(ws: &Workspace<S, P>) -> Result<Vec<Probe>>
where
    S: Syscall,
    P: Prompt,
{
    let client = client(true)?;
    let probes = join_all(
        ws.manifest()
            .hostnames()
            .into_iter()
            .map(|host| probe(&client, format!("https://{host}"))),
    )
    .await;

    let mut failed = 0;
    for probe in &probes {
        if probe.is_healthy() {
            info!("{probe}");
        } else {
            warn!("{probe}");
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(HealthError::Unhealthy(failed));
    }

    Ok(probes)
}

/// Health probe error types.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    /// HTTP client cannot be built.
    #[error(transparent)]
    Client(#[from] reqwest::Error),

    /// Some probes failed.
    #[error("{0} health probes failed")]
    Unhealthy(usize),
}

/// Friendly result alias :3
pub type Result<T, E = HealthError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case(200, true; "ok")]
    #[test_case(302, true; "redirect to login")]
    #[test_case(404, true; "not found")]
    #[test_case(502, false; "bad gateway")]
    #[test]
    fn server_errors_are_unhealthy(code: u16, expect: bool) {
        let probe = Probe {
            url: "https://portal.hotosm.test".into(),
            outcome: ProbeOutcome::Status {
                code,
                latency: Duration::from_millis(12),
            },
        };
        assert_eq!(probe.is_healthy(), expect);
    }

    #[test]
    fn probe_display() {
        let probe = Probe {
            url: "https://login.hotosm.test".into(),
            outcome: ProbeOutcome::Status {
                code: 200,
                latency: Duration::from_millis(42),
            },
        };
        assert_eq!(probe.to_string(), "https://login.hotosm.test 200 in 42ms");
    }

    #[tokio::test]
    async fn refused_connection_reported_as_error() -> anyhow::Result<()> {
        let client = client(true)?;
        let result = probe(&client, "http://127.0.0.1:9").await;
        assert!(matches!(result.outcome, ProbeOutcome::Error(_)));
        assert!(!result.is_healthy());

        Ok(())
    }
}
