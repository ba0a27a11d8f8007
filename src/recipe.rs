// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Command recipes.
//!
//! A __recipe__ is one operator-facing task, e.g., cloning the sibling
//! repositories, generating local certificates, loading a database dump, etc.
//! Every recipe is a straight-line sequence of guarded steps. Guards make
//! recipes safe to re-run: a step whose result already exists is skipped, so
//! re-running after fixing whatever broke picks up where the last run stopped.
//!
//! Recipes share no state besides filesystem conventions of the
//! [`Workspace`](crate::workspace::Workspace): sibling directories, `.env`
//! files, and the `certs/` directory.
//!
//! # Failure Policy
//!
//! Fail fast. Every checked condition is fatal to the recipe invocation, and
//! the operator is expected to re-run after fixing it. The one interactive
//! gate besides clone and overwrite questions is the destructive database drop
//! of the dump loader.

pub mod auth_libs;
pub mod bootstrap;
pub mod certs;
pub mod compose;
pub mod dump;
pub mod health;
pub mod hosts;
pub mod test_users;
