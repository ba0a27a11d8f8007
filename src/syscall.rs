// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External tool invocation.
//!
//! Every recipe reaches the outside world through external tools, e.g.,
//! `docker compose`, `mkcert`, `psql` inside a container, `git`, etc. All of
//! those calls are described by an [`Invocation`] and executed through the
//! [`Syscall`] trait, so recipes never touch [`Command`] directly.
//!
//! # Interactive vs Non-Interactive
//!
//! An __interactive__ call inherits the terminal, so the tool can print its own
//! progress and ask its own questions, e.g., `sudo` asking for a password. A
//! __non-interactive__ call captures stdout and stderr instead. Captured calls
//! can be given a spinner message, in which case a spinner keeps ticking until
//! the child process exits.

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    env,
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, instrument};

/// Data fed to the standard input of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Feed raw bytes.
    Bytes(Vec<u8>),

    /// Feed contents of file at path.
    File(PathBuf),
}

/// Description of a single external tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    input: Option<Input>,
    spinner: Option<String>,
}

impl Invocation {
    /// Construct new invocation of target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            input: None,
            spinner: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append listing of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run from target directory.
    pub fn current_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(path.into());
        self
    }

    /// Feed bytes to standard input.
    pub fn stdin_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.input = Some(Input::Bytes(bytes.into()));
        self
    }

    /// Feed file contents to standard input.
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(Input::File(path.into()));
        self
    }

    /// Show spinner with message while a captured call runs.
    pub fn spinner(mut self, message: impl Into<String>) -> Self {
        self.spinner = Some(message.into());
        self
    }

    pub fn program(&self) -> &OsStr {
        self.program.as_os_str()
    }

    pub fn input(&self) -> Option<&Input> {
        self.input.as_ref()
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    fn to_command(&self) -> Result<(Command, Option<Vec<u8>>)> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut pending = None;
        match &self.input {
            Some(Input::Bytes(bytes)) => {
                command.stdin(Stdio::piped());
                pending = Some(bytes.clone());
            }
            Some(Input::File(path)) => {
                let file = File::open(path).map_err(|err| SyscallError::OpenInput {
                    source: err,
                    path: path.clone(),
                })?;
                command.stdin(Stdio::from(file));
            }
            None => {}
        }

        Ok((command, pending))
    }
}

impl Display for Invocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.program.to_string_lossy().as_ref())?;
        for arg in &self.args {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

/// Layer of indirection for external tool calls.
pub trait Syscall {
    /// Run invocation attached to the current terminal.
    fn interactive(&self, invocation: &Invocation) -> Result<()>;

    /// Run invocation capturing its output.
    ///
    /// Returns standard output with trailing newlines chomped.
    fn non_interactive(&self, invocation: &Invocation) -> Result<String>;

    /// Check if program can be found through `PATH`.
    fn has_program(&self, program: &str) -> bool;
}

/// Tool calls through [`std::process`].
#[derive(Debug, Default, Clone)]
pub struct ProcessSyscall;

impl ProcessSyscall {
    pub fn new() -> Self {
        Self
    }
}

impl Syscall for ProcessSyscall {
    #[instrument(skip(self, invocation), level = "debug")]
    fn interactive(&self, invocation: &Invocation) -> Result<()> {
        debug!("run {invocation}");
        let (mut command, pending) = invocation.to_command()?;
        let mut child = command.spawn().map_err(|err| spawn_error(err, invocation))?;
        let feeder = feed_stdin(&mut child, pending);
        let status = child.wait()?;
        join_feeder(feeder)?;

        if !status.success() {
            return Err(SyscallError::Failed {
                command: invocation.to_string(),
                message: format!("exited with {status}"),
            });
        }

        Ok(())
    }

    #[instrument(skip(self, invocation), level = "debug")]
    fn non_interactive(&self, invocation: &Invocation) -> Result<String> {
        debug!("run {invocation}");
        let (mut command, pending) = invocation.to_command()?;
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = command.spawn().map_err(|err| spawn_error(err, invocation))?;
        let feeder = feed_stdin(&mut child, pending);

        let bar = match &invocation.spinner {
            Some(message) => Some(spinner(message)?),
            None => None,
        };
        let output = child.wait_with_output();
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        let output = output?;
        join_feeder(feeder)?;

        let stdout = chomp(String::from_utf8_lossy(output.stdout.as_slice()).into_owned());
        let stderr = chomp(String::from_utf8_lossy(output.stderr.as_slice()).into_owned());

        if !output.status.success() {
            let mut message = String::new();
            if !stdout.is_empty() {
                message.push_str(format!("stdout: {stdout}\n").as_str());
            }
            if !stderr.is_empty() {
                message.push_str(format!("stderr: {stderr}").as_str());
            }

            return Err(SyscallError::Failed {
                command: invocation.to_string(),
                message: chomp(message),
            });
        }

        Ok(stdout)
    }

    fn has_program(&self, program: &str) -> bool {
        let Some(search) = env::var_os("PATH") else {
            return false;
        };

        env::split_paths(&search).any(|dir| {
            let candidate = dir.join(program);
            candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
        })
    }
}

/// Spinner for a child process that is still running.
fn spinner(message: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template(
        "{spinner:.green} {msg} {elapsed:.dim}",
    )?);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

// INVARIANT: Write stdin from a separate thread so a chatty child cannot block
// on a full stdout pipe while we are still writing.
fn feed_stdin(child: &mut Child, pending: Option<Vec<u8>>) -> Option<JoinHandle<std::io::Result<()>>> {
    let bytes = pending?;
    let mut stdin = child.stdin.take()?;
    Some(thread::spawn(move || stdin.write_all(&bytes)))
}

fn join_feeder(feeder: Option<JoinHandle<std::io::Result<()>>>) -> Result<()> {
    if let Some(handle) = feeder {
        handle
            .join()
            .map_err(|_| std::io::Error::other("stdin writer panicked"))??;
    }

    Ok(())
}

fn spawn_error(source: std::io::Error, invocation: &Invocation) -> SyscallError {
    SyscallError::Spawn {
        source,
        program: invocation.program().to_string_lossy().into_owned(),
    }
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message.trim_end_matches(&['\r', '\n'][..]).to_string()
}

/// External tool call error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Program could not be started at all.
    #[error("failed to run {program:?}, is it installed?")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: String,
    },

    /// Program ran but exited unsuccessfully.
    #[error("command {command:?} failed:\n{message}")]
    Failed { command: String, message: String },

    /// File meant for standard input cannot be opened.
    #[error("failed to open input file {:?}", path.display())]
    OpenInput {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Style template cannot be set for spinner.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;

    /// Records every invocation and answers from canned replies.
    ///
    /// Replies are matched by command line prefix, first match wins.
    /// Invocations with no matching reply succeed with empty output.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSyscall {
        calls: RefCell<Vec<Invocation>>,
        replies: Vec<(String, std::result::Result<String, String>)>,
        programs: Vec<String>,
    }

    impl RecordingSyscall {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_program(mut self, program: impl Into<String>) -> Self {
            self.programs.push(program.into());
            self
        }

        pub(crate) fn reply(mut self, prefix: impl Into<String>, stdout: impl Into<String>) -> Self {
            self.replies.push((prefix.into(), Ok(stdout.into())));
            self
        }

        pub(crate) fn fail(mut self, prefix: impl Into<String>, message: impl Into<String>) -> Self {
            self.replies.push((prefix.into(), Err(message.into())));
            self
        }

        pub(crate) fn commands(&self) -> Vec<String> {
            self.calls.borrow().iter().map(ToString::to_string).collect()
        }

        pub(crate) fn calls(&self) -> Vec<Invocation> {
            self.calls.borrow().clone()
        }

        fn answer(&self, invocation: &Invocation) -> Result<String> {
            self.calls.borrow_mut().push(invocation.clone());
            let line = invocation.to_string();
            match self
                .replies
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            {
                Some((_, Ok(stdout))) => Ok(stdout.clone()),
                Some((_, Err(message))) => Err(SyscallError::Failed {
                    command: line,
                    message: message.clone(),
                }),
                None => Ok(String::new()),
            }
        }
    }

    impl Syscall for RecordingSyscall {
        fn interactive(&self, invocation: &Invocation) -> Result<()> {
            self.answer(invocation).map(|_| ())
        }

        fn non_interactive(&self, invocation: &Invocation) -> Result<String> {
            self.answer(invocation)
        }

        fn has_program(&self, program: &str) -> bool {
            self.programs.iter().any(|known| known == program)
        }
    }
}
