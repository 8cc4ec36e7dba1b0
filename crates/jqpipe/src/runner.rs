//! The pipe-fed query runner.
//!
//! A [`Jq`] runs its program exactly once. Execution stages a pipe for the
//! filter and for every raw input, launches the program with
//!
//! ```text
//! <program> [options...] -f <filter pipe> [path inputs...] [input pipes...]
//! ```
//!
//! and returns whatever the program wrote to standard output.
//!
//! # Lifecycle
//!
//! ```text
//! Configured --execute--> Executing --> Succeeded
//!                                   \-> Failed
//! ```
//!
//! The first transition is a single atomic compare-and-swap, so a runner
//! shared across tasks still executes at most once.

use crate::args::assemble_args;
use crate::builder::JqBuilder;
use crate::error::{Error, Result};
use crate::fifo::{self, StagedPipe};
use crate::option::JqOption;
use crate::output;
use crate::source::Source;
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::process::Command;
use tracing::{debug, warn};

/// Program run when none is configured.
pub const DEFAULT_PROGRAM: &str = "jq";

/// Lifecycle of a [`Jq`] runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// Built and not yet executed.
    Configured = 0,
    /// `execute` is in progress (or its future was dropped mid-run).
    Executing = 1,
    /// The program exited successfully.
    Succeeded = 2,
    /// Staging, spawning, or the program itself failed.
    Failed = 3,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Configured,
            1 => Self::Executing,
            2 => Self::Succeeded,
            3 => Self::Failed,
            _ => unreachable!("invalid run state {value}"),
        }
    }
}

/// Sources consumed by the single execution.
struct Sources {
    filter: Source,
    files: Vec<Source>,
}

/// A configured, run-once invocation of the query program.
///
/// Build one with [`JqBuilder`] or [`Jq::new`].
pub struct Jq {
    program: String,
    staging_dir: PathBuf,
    options: Vec<JqOption>,
    file_paths: Vec<PathBuf>,
    sources: Mutex<Option<Sources>>,
    state: AtomicU8,
}

impl fmt::Debug for Jq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jq")
            .field("program", &self.program)
            .field("staging_dir", &self.staging_dir)
            .field("options", &self.options)
            .field("file_paths", &self.file_paths)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Jq {
    /// Creates a runner for one in-memory input, a filter, and some flags.
    ///
    /// # Errors
    ///
    /// Cannot fail validation in practice, but returns the same errors as
    /// [`JqBuilder::build`].
    pub fn new<I, S>(data: impl Into<Vec<u8>>, filter: &str, flags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        flags
            .into_iter()
            .fold(
                JqBuilder::new().with_file_data(data).with_filter_str(filter),
                |builder, flag| builder.with_flag(flag),
            )
            .build()
    }

    /// Starts an empty builder.
    #[must_use]
    pub fn builder() -> JqBuilder {
        JqBuilder::new()
    }

    pub(crate) fn from_parts(
        program: String,
        staging_dir: PathBuf,
        options: Vec<JqOption>,
        file_paths: Vec<PathBuf>,
        filter: Source,
        files: Vec<Source>,
    ) -> Self {
        Self {
            program,
            staging_dir,
            options,
            file_paths,
            sources: Mutex::new(Some(Sources { filter, files })),
            state: AtomicU8::new(RunState::Configured as u8),
        }
    }

    /// The program that will be run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Directory where pipes are staged.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Options in registration order.
    #[must_use]
    pub fn options(&self) -> &[JqOption] {
        &self.options
    }

    /// On-disk inputs in registration order.
    #[must_use]
    pub fn file_paths(&self) -> &[PathBuf] {
        &self.file_paths
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Runs the program and returns its standard output.
    ///
    /// Failures of the background pipe writers are logged, not returned: the
    /// program's exit status alone decides success.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyExecuted`] on any call after the first
    /// - [`Error::NotADirectory`] or [`Error::Staging`] if a pipe cannot be
    ///   staged; the program is not started
    /// - [`Error::ProgramNotFound`] or [`Error::Spawn`] if the program cannot
    ///   be started
    /// - [`Error::Exited`] if it exits non-zero or is killed by a signal
    pub async fn execute(&self) -> Result<Vec<u8>> {
        self.state
            .compare_exchange(
                RunState::Configured as u8,
                RunState::Executing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| Error::AlreadyExecuted)?;

        let result = self.run().await;

        let done = if result.is_ok() {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        self.state.store(done as u8, Ordering::Release);

        result
    }

    /// Runs the program and decodes its output as a stream of JSON values.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`execute`](Self::execute), or [`Error::Json`]
    /// if the output is not a sequence of `T`.
    pub async fn execute_json<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let stdout = self.execute().await?;
        output::decode_values(&stdout)
    }

    async fn run(&self) -> Result<Vec<u8>> {
        let Sources { filter, files } = self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::AlreadyExecuted)?;

        // Pipes already staged are released on early return when dropped.
        let filter_pipe = fifo::stage(&self.staging_dir, filter).await?;
        let mut input_pipes = Vec::with_capacity(files.len());
        for file in files {
            input_pipes.push(fifo::stage(&self.staging_dir, file).await?);
        }

        let pipe_paths: Vec<PathBuf> = input_pipes
            .iter()
            .map(|pipe| pipe.path().to_path_buf())
            .collect();
        let args = assemble_args(
            &self.options,
            filter_pipe.path(),
            &self.file_paths,
            &pipe_paths,
        );

        let output = self.spawn(&args).await;
        release(filter_pipe, input_pipes);
        let output = output?;

        if output.status.success() {
            debug!(program = %self.program, bytes = output.stdout.len(), "Query succeeded");
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(program = %self.program, status = %output.status, "Query failed");
            Err(Error::Exited {
                status: output.status,
                stderr,
            })
        }
    }

    async fn spawn(&self, args: &[OsString]) -> Result<Output> {
        debug!(program = %self.program, ?args, "Running query");

        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| {
                if source.kind() == io::ErrorKind::NotFound {
                    Error::ProgramNotFound(self.program.clone())
                } else {
                    Error::Spawn {
                        program: self.program.clone(),
                        source,
                    }
                }
            })
    }
}

/// Releases every writer the program never reached.
fn release(filter_pipe: StagedPipe, input_pipes: Vec<StagedPipe>) {
    let pending = input_pipes
        .iter()
        .chain(std::iter::once(&filter_pipe))
        .filter(|pipe| !pipe.is_finished())
        .count();
    if pending > 0 {
        debug!(pending, "Releasing pipe writers");
    }
    drop(input_pipes);
    drop(filter_pipe);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn run_state_round_trips_through_u8() {
        for state in [
            RunState::Configured,
            RunState::Executing,
            RunState::Succeeded,
            RunState::Failed,
        ] {
            assert_eq!(RunState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn new_registers_data_filter_and_flags() {
        let jq = Jq::new(r#"{"a":1}"#, ".a", ["-c", "-S"]).unwrap();
        assert_eq!(jq.options(), [JqOption::flag("-c"), JqOption::flag("-S")]);
        assert!(jq.file_paths().is_empty());
        assert_eq!(jq.state(), RunState::Configured);
    }

    #[tokio::test]
    async fn second_execute_is_rejected() {
        let temp = TempDir::new().unwrap();
        let jq = Jq::builder()
            .with_program("true")
            .with_staging_dir(temp.path())
            .with_filter_str(".")
            .with_file_data("{}")
            .build()
            .unwrap();

        jq.execute().await.unwrap();
        assert_eq!(jq.state(), RunState::Succeeded);

        let err = jq.execute().await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExecuted));
        assert_eq!(jq.state(), RunState::Succeeded);
    }

    #[tokio::test]
    async fn missing_program_fails_and_marks_state() {
        let temp = TempDir::new().unwrap();
        let jq = Jq::builder()
            .with_program("jqpipe-definitely-not-installed")
            .with_staging_dir(temp.path())
            .with_filter_str(".")
            .with_file_data("{}")
            .build()
            .unwrap();

        let err = jq.execute().await.unwrap_err();
        assert!(
            matches!(err, Error::ProgramNotFound(ref p) if p == "jqpipe-definitely-not-installed")
        );
        assert_eq!(jq.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn staging_failure_does_not_spawn() {
        let temp = TempDir::new().unwrap();
        let not_a_dir = temp.path().join("file");
        std::fs::write(&not_a_dir, b"").unwrap();

        // Would fail with ProgramNotFound if it were ever started.
        let jq = Jq::builder()
            .with_program("jqpipe-definitely-not-installed")
            .with_staging_dir(&not_a_dir)
            .with_filter_str(".")
            .with_file_data("{}")
            .build()
            .unwrap();

        let err = jq.execute().await.unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
        assert_eq!(jq.state(), RunState::Failed);
    }
}
