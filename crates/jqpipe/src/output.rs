//! Helpers for the bytes a query program writes to standard output.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Deserializer;

/// Returns the output as text with surrounding whitespace removed.
///
/// # Errors
///
/// Returns [`Error::Io`] with kind `InvalidData` if the output is not UTF-8.
pub fn trimmed(stdout: &[u8]) -> Result<&str> {
    std::str::from_utf8(stdout)
        .map(str::trim)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Decodes a stream of whitespace-separated JSON values.
///
/// Handles both compact (`-c`, one value per line) and pretty-printed output.
///
/// # Errors
///
/// Returns [`Error::Json`] if any value is malformed or does not match `T`.
pub fn decode_values<T: DeserializeOwned>(stdout: &[u8]) -> Result<Vec<T>> {
    Deserializer::from_slice(stdout)
        .into_iter::<T>()
        .map(|value| value.map_err(Error::from))
        .collect()
}
