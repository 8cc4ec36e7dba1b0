//! Command-line options passed through to the query program.

use std::ffi::OsString;
use std::fmt;

/// A single option for the query program.
///
/// Options keep their registration order. A flag contributes one argument, a
/// key/value pair contributes two consecutive arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JqOption {
    /// A bare flag such as `-c` or `--sort-keys`.
    Flag(String),

    /// A key followed by its value, such as `--indent 4`.
    KeyValue {
        /// The option name.
        key: String,
        /// The option value.
        value: String,
    },
}

impl JqOption {
    /// Creates a bare flag option.
    pub fn flag(flag: impl Into<String>) -> Self {
        Self::Flag(flag.into())
    }

    /// Creates a key/value option.
    pub fn key_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Number of arguments this option expands to.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::Flag(_) => 1,
            Self::KeyValue { .. } => 2,
        }
    }

    /// Appends this option's arguments to `args`.
    pub fn push_args(&self, args: &mut Vec<OsString>) {
        match self {
            Self::Flag(flag) => args.push(flag.into()),
            Self::KeyValue { key, value } => {
                args.push(key.into());
                args.push(value.into());
            }
        }
    }
}

impl fmt::Display for JqOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(flag) => write!(f, "{flag}"),
            Self::KeyValue { key, value } => write!(f, "{key} {value}"),
        }
    }
}
