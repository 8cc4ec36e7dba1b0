//! Argument vector assembly for the query program.
//!
//! The layout is fixed:
//!
//! ```text
//! [options...] -f <filter> [path inputs...] [raw input pipes...]
//! ```
//!
//! The filter flag always immediately precedes the filter path, and every
//! input is positional after it.

use crate::option::JqOption;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Flag that makes the query program read its program text from a file.
pub const FILTER_FLAG: &str = "-f";

/// Flattens options and inputs into the argument vector for the query program.
///
/// Each group keeps its registration order. Paths are passed as raw OS
/// strings, so names that are not valid UTF-8 reach the program unchanged.
#[must_use]
pub fn assemble_args(
    options: &[JqOption],
    filter_path: &Path,
    path_inputs: &[PathBuf],
    pipe_inputs: &[PathBuf],
) -> Vec<OsString> {
    let capacity = options.iter().map(JqOption::arity).sum::<usize>()
        + 2
        + path_inputs.len()
        + pipe_inputs.len();
    let mut args = Vec::with_capacity(capacity);

    for option in options {
        option.push_args(&mut args);
    }

    args.push(FILTER_FLAG.into());
    args.push(filter_path.as_os_str().to_owned());
    args.extend(path_inputs.iter().map(|p| p.as_os_str().to_owned()));
    args.extend(pipe_inputs.iter().map(|p| p.as_os_str().to_owned()));

    args
}
