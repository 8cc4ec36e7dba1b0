//! Command-line interface for the `jqpipe` binary.
//!
//! # Example
//!
//! ```bash
//! jqpipe -F -c '{fullname: (.name + " " + .lastname)}' people.json
//! curl -s https://example.com/data.json | jqpipe '.items[]' -
//! jqpipe --from-file query.jq -O --indent 4 a.json b.json
//! ```
//!
//! An input of `-` (or no inputs at all) streams standard input through a
//! staged pipe. Options given with `-F` and `-O` reach the query program in
//! the order they appear on the command line.

use crate::builder::JqBuilder;
use crate::option::JqOption;
use crate::settings::Settings;
use anyhow::{Context, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, DuplexStream};

/// Input name that means standard input.
pub const STDIN_INPUT: &str = "-";

/// Buffer size for standard input forwarded to a staged pipe.
const STDIN_BUFFER_SIZE: usize = 64 * 1024;

/// Run jq over named pipes instead of temporary files
#[derive(Parser, Debug)]
#[command(name = "jqpipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (YAML) with `program` and `staging-dir`
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Query program to run instead of the configured one
    #[arg(long, value_name = "PROGRAM")]
    pub program: Option<String>,

    /// Directory for staged pipes
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Flag passed through to the query program (repeatable)
    #[arg(short = 'F', long = "flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub flags: Vec<String>,

    /// Key/value option passed through to the query program (repeatable)
    #[arg(
        short = 'O',
        long = "option",
        num_args = 2,
        value_names = ["KEY", "VALUE"],
        allow_hyphen_values = true
    )]
    pub options: Vec<String>,

    /// Treat FILTER as a path and stream the file as the filter program
    #[arg(long)]
    pub from_file: bool,

    /// Filter program text (or path with --from-file)
    pub filter: String,

    /// Input files; `-` reads standard input
    pub inputs: Vec<PathBuf>,

    /// `flags` and `options` merged in command-line order.
    #[arg(skip)]
    pub query_options: Vec<JqOption>,
}

impl Cli {
    /// Parse command-line arguments, exiting with usage on error.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::try_parse_args_from(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    /// Parse arguments from an iterator.
    ///
    /// Unlike [`Parser::try_parse_from`], this also fills
    /// [`Cli::query_options`].
    ///
    /// # Errors
    ///
    /// Returns a clap error for invalid arguments, `--help`, or `--version`.
    pub fn try_parse_args_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;
        cli.query_options = ordered_options(&matches, &cli.flags, &cli.options);
        Ok(cli)
    }

    /// Run the query and write its output to standard output.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be loaded, the runner cannot be
    /// built, or the query fails.
    pub async fn execute(self) -> Result<()> {
        let settings = self.settings().await?;
        let jq = self.into_builder(&settings).await?.build()?;
        tracing::debug!(?jq, "Built runner");

        let stdout = jq.execute().await.context("query failed")?;

        let mut out = tokio::io::stdout();
        out.write_all(&stdout).await?;
        out.flush().await?;
        Ok(())
    }

    /// Settings from `--config` (or defaults) with command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be loaded.
    pub async fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)
                .await
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => Settings::default(),
        };

        if let Some(program) = &self.program {
            settings.program.clone_from(program);
        }
        if let Some(dir) = &self.staging_dir {
            settings.staging_dir = Some(dir.clone());
        }
        Ok(settings)
    }

    /// Translate the arguments into a runner builder.
    ///
    /// # Errors
    ///
    /// Returns an error if `--from-file` names a file that cannot be opened.
    pub async fn into_builder(self, settings: &Settings) -> Result<JqBuilder> {
        let mut builder = JqBuilder::new().with_settings(settings);

        for option in self.query_options {
            builder = builder.with_jq_option(option);
        }

        builder = if self.from_file {
            let file = tokio::fs::File::open(&self.filter)
                .await
                .with_context(|| format!("opening filter file {}", self.filter))?;
            builder.with_filter(file)
        } else {
            builder.with_filter_str(&self.filter)
        };

        if self.inputs.is_empty() {
            return Ok(builder.with_file(stdin_reader()));
        }

        let mut stdin_used = false;
        for input in self.inputs {
            if input == Path::new(STDIN_INPUT) {
                if stdin_used {
                    anyhow::bail!("standard input can only be read once");
                }
                stdin_used = true;
                builder = builder.with_file(stdin_reader());
            } else {
                builder = builder.with_file_path(input);
            }
        }
        Ok(builder)
    }
}

/// Rebuilds the interleaving of `-F` and `-O` from clap's argument indices.
fn ordered_options(
    matches: &ArgMatches,
    flags: &[String],
    options: &[String],
) -> Vec<JqOption> {
    let flag_indices = matches.indices_of("flags").into_iter().flatten();
    // Each `-O` occurrence holds two values; its position is the key's.
    let option_indices = matches.indices_of("options").into_iter().flatten().step_by(2);

    let mut ordered: Vec<(usize, JqOption)> = flag_indices
        .zip(flags)
        .map(|(index, flag)| (index, JqOption::flag(flag.clone())))
        .chain(option_indices.zip(options.chunks_exact(2)).map(|(index, pair)| {
            (index, JqOption::key_value(pair[0].clone(), pair[1].clone()))
        }))
        .collect();
    ordered.sort_by_key(|(index, _)| *index);
    ordered.into_iter().map(|(_, option)| option).collect()
}

/// Standard input, read on a dedicated thread.
///
/// `tokio::io::stdin` reads on the blocking pool, and a read parked on an
/// idle terminal holds up runtime shutdown. A detached thread does not; it
/// ends at end of input or once the pipe's reader goes away.
fn stdin_reader() -> DuplexStream {
    let (reader, mut writer) = tokio::io::duplex(STDIN_BUFFER_SIZE);
    let runtime = tokio::runtime::Handle::current();

    std::thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buf = vec![0; STDIN_BUFFER_SIZE];
        loop {
            let n = match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Reading standard input failed");
                    break;
                }
            };
            if runtime.block_on(writer.write_all(&buf[..n])).is_err() {
                break;
            }
        }
    });

    reader
}
