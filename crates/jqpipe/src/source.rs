//! Byte sources streamed into staged pipes.

use std::fmt;
use std::io::Cursor;
use tokio::io::AsyncRead;

/// A boxed async byte stream.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Bytes that will be streamed through a named pipe.
pub enum Source {
    /// In-memory bytes.
    Bytes(Vec<u8>),

    /// Any async byte stream, read once.
    Reader(BoxReader),
}

impl Source {
    /// Wraps an async reader.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::Reader(Box::new(reader))
    }

    /// Converts the source into a single reader.
    #[must_use]
    pub fn into_reader(self) -> BoxReader {
        match self {
            Self::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            Self::Reader(reader) => reader,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(_) => f.debug_tuple("Reader").field(&"<dyn AsyncRead>").finish(),
        }
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Source {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Self::Bytes(text.into_bytes())
    }
}
