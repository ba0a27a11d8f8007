// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local development harness for the HOT map tooling suite.
//!
//! The platform is a handful of independent applications sharing one login
//! service. Each application lives in its own git repository checked out next
//! to the harness root, and the whole set runs under one `docker compose`
//! project behind a reverse proxy with subdomain routing.
//!
//! The harness itself never builds or serves anything. It only drives the
//! tools that do, through a set of idempotent [recipes](recipe):
//!
//! - Clone missing sibling repositories and seed their `.env` files.
//! - Generate a locally trusted TLS certificate for every subdomain.
//! - Check the hosts file for every subdomain.
//! - Start, stop, and inspect service groups through `docker compose`.
//! - Replace a database with a SQL dump.
//! - Show CI status of every deployed environment.
//!
//! Everything the recipes need to know about the platform comes from the
//! [manifest](config::Manifest).

pub mod config;
pub mod deploy_status;
pub mod env_file;
pub mod path;
pub mod prompt;
pub mod recipe;
pub mod syscall;
pub mod workspace;
