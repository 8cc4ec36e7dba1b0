//! Builder for [`Jq`] runners.
//!
//! The builder only collects configuration. Nothing touches the filesystem or
//! spawns a process until [`Jq::execute`] is called.
//!
//! Registering a filter more than once replaces the previous one: the last
//! filter wins.
//!
//! # Example
//!
//! ```no_run
//! use jqpipe::JqBuilder;
//!
//! # async fn example() -> jqpipe::Result<()> {
//! let jq = JqBuilder::new()
//!     .with_filter_str(r#"{fullname: (.name + " " + .lastname)}"#)
//!     .with_file_data(r#"{"name":"pooyan","lastname":"khanjankhani"}"#)
//!     .with_flag("-c")
//!     .build()?;
//!
//! let output = jq.execute().await?;
//! assert_eq!(jqpipe::output::trimmed(&output)?, r#"{"fullname":"pooyan khanjankhani"}"#);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::fifo::default_staging_dir;
use crate::option::JqOption;
use crate::runner::{DEFAULT_PROGRAM, Jq};
use crate::settings::Settings;
use crate::source::Source;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncRead;

/// Collects the filter, inputs and options for a [`Jq`] runner.
#[derive(Debug, Default)]
pub struct JqBuilder {
    filter: Option<Source>,
    files: Vec<Source>,
    file_paths: Vec<PathBuf>,
    options: Vec<JqOption>,
    program: Option<String>,
    staging_dir: Option<PathBuf>,
}

impl JqBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a bare flag such as `-c`.
    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.options.push(JqOption::flag(flag));
        self
    }

    /// Appends a key/value option such as `--indent 4`.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push(JqOption::key_value(key, value));
        self
    }

    /// Appends an already constructed option.
    #[must_use]
    pub fn with_jq_option(mut self, option: JqOption) -> Self {
        self.options.push(option);
        self
    }

    /// Sets the filter program from a byte stream, replacing any earlier filter.
    #[must_use]
    pub fn with_filter<R>(mut self, filter: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.filter = Some(Source::reader(filter));
        self
    }

    /// Sets the filter program text, replacing any earlier filter.
    #[must_use]
    pub fn with_filter_str(mut self, filter: &str) -> Self {
        self.filter = Some(Source::from(filter));
        self
    }

    /// Sets the filter program from raw bytes, replacing any earlier filter.
    #[must_use]
    pub fn with_filter_bytes(mut self, filter: impl Into<Vec<u8>>) -> Self {
        self.filter = Some(Source::Bytes(filter.into()));
        self
    }

    /// Appends an input streamed from an async reader.
    #[must_use]
    pub fn with_file<R>(mut self, file: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.files.push(Source::reader(file));
        self
    }

    /// Appends an in-memory input.
    #[must_use]
    pub fn with_file_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.files.push(Source::Bytes(data.into()));
        self
    }

    /// Appends an input made of `values` serialized as JSON Lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if any value fails to serialize.
    pub fn with_json_values<T, I>(mut self, values: I) -> Result<Self>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let mut data = Vec::new();
        for value in values {
            serde_json::to_writer(&mut data, &value)?;
            data.push(b'\n');
        }
        self.files.push(Source::Bytes(data));
        Ok(self)
    }

    /// Appends an input file that already exists on disk.
    ///
    /// The path is passed through untouched; it is not opened or checked.
    #[must_use]
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    /// Sets the directory where pipes are staged. Defaults to the platform
    /// temp directory.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Sets the query program to run. Defaults to `jq` on the search path.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Applies the program and staging directory from loaded settings.
    #[must_use]
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.program = Some(settings.program.clone());
        if let Some(dir) = &settings.staging_dir {
            self.staging_dir = Some(dir.clone());
        }
        self
    }

    /// Validates the configuration and produces a runner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFilter`] if no filter was set and
    /// [`Error::NoInputs`] if no input of either kind was added.
    pub fn build(self) -> Result<Jq> {
        let filter = self.filter.ok_or(Error::NoFilter)?;

        if self.files.is_empty() && self.file_paths.is_empty() {
            return Err(Error::NoInputs);
        }

        Ok(Jq::from_parts(
            self.program.unwrap_or_else(|| DEFAULT_PROGRAM.to_string()),
            self.staging_dir.unwrap_or_else(default_staging_dir),
            self.options,
            self.file_paths,
            filter,
            self.files,
        ))
    }
}
