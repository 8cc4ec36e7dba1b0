//! Named-pipe staging for query inputs.
//!
//! Every in-memory or streamed source is handed to the query program as a
//! FIFO path. Staging a pipe works like this:
//!
//! 1. Make sure the staging directory exists (created with mode `0755`).
//! 2. Reserve a unique `jq-fifo-*` name by creating and deleting a
//!    placeholder file.
//! 3. Create a FIFO with mode `0600` at that name.
//! 4. Spawn a writer task that opens the FIFO for writing, which blocks until
//!    the consumer opens it for reading, then streams the source into it.
//!
//! The writer task owns the FIFO file and always removes it when it stops,
//! whether the copy succeeded or not. Copy failures are logged and never
//! reach the caller.
//!
//! # Release
//!
//! A consumer is free to exit without opening every input. A writer blocked
//! on open would then wait forever, so dropping a [`StagedPipe`] releases
//! its writer: the writer is told to stop, and a read/write handle on the FIFO
//! is parked in the release signal so a pending open returns. The handle is
//! closed when the writer finishes.

use crate::error::{Error, Result};
use crate::source::{BoxReader, Source};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tokio::net::unix::pipe;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Name prefix of every staged FIFO.
pub const FIFO_PREFIX: &str = "jq-fifo-";

/// Mode used when the staging directory has to be created.
pub const STAGING_DIR_MODE: u32 = 0o755;

/// Returns the platform temp directory, the default staging location.
#[must_use]
pub fn default_staging_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Ensures `dir` exists and is a directory, creating it recursively if absent.
///
/// # Errors
///
/// Returns [`Error::NotADirectory`] if the path exists but is not a
/// directory, or [`Error::Staging`] if it cannot be inspected or created.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotADirectory(dir.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %dir.display(), "Creating staging directory");
            let mut builder = tokio::fs::DirBuilder::new();
            builder.recursive(true).mode(STAGING_DIR_MODE);
            builder.create(dir).await.map_err(|source| Error::Staging {
                path: dir.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(Error::Staging {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// State shared between a [`StagedPipe`] and its writer task.
#[derive(Debug, Default)]
enum Release {
    #[default]
    Held,
    /// The owner let go. The handle keeps a pending open-for-write from
    /// blocking and lives as long as the channel does.
    Released { _unblock: Option<File> },
}

impl Release {
    fn is_released(&self) -> bool {
        matches!(self, Self::Released { .. })
    }
}

/// How a writer task stopped without an IO error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fed {
    Complete(u64),
    Released,
}

/// A FIFO in the staging directory with a writer task streaming into it.
///
/// The runner only needs [`path`](Self::path) for argument construction.
/// Dropping the value releases the writer (see the module docs); the FIFO
/// file itself is removed by the writer task.
#[derive(Debug)]
pub struct StagedPipe {
    path: PathBuf,
    release: watch::Sender<Release>,
    writer: JoinHandle<()>,
}

impl StagedPipe {
    /// Path of the FIFO, suitable as a file argument.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the writer task has stopped and removed the FIFO.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.writer.is_finished()
    }
}

impl Drop for StagedPipe {
    fn drop(&mut self) {
        if self.writer.is_finished() {
            return;
        }

        let unblock = match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(file) => Some(file),
            // The writer removed it between the check and the open.
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "jq: could not unblock pipe writer");
                None
            }
        };
        self.release.send_replace(Release::Released { _unblock: unblock });
    }
}

/// Stages `source` behind a new FIFO in `dir` and starts its writer task.
///
/// Returns as soon as the FIFO exists; the copy runs in the background.
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the staging directory is unusable or the FIFO cannot
/// be created. Nothing is spawned in that case.
pub async fn stage(dir: &Path, source: Source) -> Result<StagedPipe> {
    ensure_dir(dir).await?;

    let fifo_dir = dir.to_path_buf();
    let path = tokio::task::spawn_blocking(move || create_fifo(&fifo_dir))
        .await
        .map_err(|e| Error::Io(e.into()))??;

    let (release, released) = watch::channel(Release::Held);
    let writer = tokio::spawn(feed_and_remove(path.clone(), source.into_reader(), released));
    debug!(path = %path.display(), "Staged pipe");

    Ok(StagedPipe {
        path,
        release,
        writer,
    })
}

/// Reserves a unique name in `dir` and creates an owner-only FIFO there.
fn create_fifo(dir: &Path) -> Result<PathBuf> {
    let placeholder = tempfile::Builder::new()
        .prefix(FIFO_PREFIX)
        .tempfile_in(dir)
        .map_err(|source| Error::Staging {
            path: dir.to_path_buf(),
            source,
        })?;

    let path = placeholder.path().to_path_buf();
    placeholder.close().map_err(|source| Error::Staging {
        path: path.clone(),
        source,
    })?;

    mkfifo(path.as_path(), Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| Error::Staging {
        path: path.clone(),
        source: errno.into(),
    })?;

    Ok(path)
}

async fn feed_and_remove(path: PathBuf, reader: BoxReader, released: watch::Receiver<Release>) {
    match feed(&path, reader, released).await {
        Ok(Fed::Complete(bytes)) => {
            debug!(path = %path.display(), bytes, "Pipe fed");
        }
        Ok(Fed::Released) => {
            debug!(path = %path.display(), "Pipe released before the consumer finished reading");
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "jq: write to pipe failed");
        }
    }

    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!(path = %path.display(), error = %e, "jq: removing pipe failed");
    }
}

async fn feed(
    path: &Path,
    mut reader: BoxReader,
    mut released: watch::Receiver<Release>,
) -> io::Result<Fed> {
    // Blocks until the consumer (or a release handle) opens the read end.
    let open_path = path.to_path_buf();
    let file = tokio::task::spawn_blocking(move || OpenOptions::new().write(true).open(open_path))
        .await
        .map_err(io::Error::from)??;

    if released.borrow().is_released() {
        return Ok(Fed::Released);
    }

    let mut sender = pipe::Sender::from_file(file)?;
    tokio::select! {
        copied = tokio::io::copy(&mut reader, &mut sender) => copied.map(Fed::Complete),
        () = wait_released(&mut released) => Ok(Fed::Released),
    }
}

async fn wait_released(released: &mut watch::Receiver<Release>) {
    if released.wait_for(Release::is_released).await.is_err() {
        // Owner vanished without releasing; keep copying.
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncRead, ReadBuf};

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("source unreadable")))
        }
    }

    async fn wait_until_gone(path: &Path) {
        for _ in 0..500 {
            if tokio::fs::symlink_metadata(path).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pipe {} was never removed", path.display());
    }

    #[tokio::test]
    async fn ensure_dir_creates_missing_directories() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");

        ensure_dir(&nested).await.unwrap();

        // A plain mkdir gets 0o777 minus the process umask.
        let reference = temp.path().join("reference");
        std::fs::create_dir(&reference).unwrap();
        let umask = !std::fs::metadata(&reference).unwrap().permissions().mode() & 0o777;
        let expected = STAGING_DIR_MODE & !umask;

        for dir in [temp.path().join("a"), nested] {
            let meta = std::fs::metadata(&dir).unwrap();
            assert!(meta.is_dir());
            assert_eq!(meta.permissions().mode() & 0o777, expected, "{}", dir.display());
        }
    }

    #[tokio::test]
    async fn ensure_dir_accepts_existing_directory() {
        let temp = TempDir::new().unwrap();
        ensure_dir(temp.path()).await.unwrap();
    }

    #[tokio::test]
    async fn ensure_dir_rejects_regular_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = ensure_dir(&file).await.unwrap_err();
        assert!(matches!(err, Error::NotADirectory(ref p) if p == &file));
    }

    #[test]
    fn create_fifo_makes_owner_only_fifo() {
        let temp = TempDir::new().unwrap();
        let path = create_fifo(temp.path()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(FIFO_PREFIX), "unexpected name {name}");

        let meta = std::fs::symlink_metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn create_fifo_names_are_unique() {
        let temp = TempDir::new().unwrap();
        let first = create_fifo(temp.path()).unwrap();
        let second = create_fifo(temp.path()).unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn staged_pipe_streams_bytes_and_removes_itself() {
        let temp = TempDir::new().unwrap();
        let staged = stage(temp.path(), Source::from(r#"{"a":1}"#)).await.unwrap();
        let path = staged.path().to_path_buf();

        let contents = tokio::fs::read(&path).await.unwrap();
        assert_eq!(contents, br#"{"a":1}"#);

        wait_until_gone(&path).await;
        drop(staged);
    }

    #[tokio::test]
    async fn dropping_unread_pipe_removes_it() {
        let temp = TempDir::new().unwrap();
        let staged = stage(temp.path(), Source::from(vec![b'x'; 256 * 1024]))
            .await
            .unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());

        drop(staged);

        wait_until_gone(&path).await;
    }

    #[tokio::test]
    async fn source_error_still_removes_pipe() {
        let temp = TempDir::new().unwrap();
        let staged = stage(temp.path(), Source::reader(FailingReader)).await.unwrap();
        let path = staged.path().to_path_buf();

        // Writer closes its end after the failed copy, so this reads EOF.
        let contents = tokio::fs::read(&path).await.unwrap();
        assert!(contents.is_empty());

        wait_until_gone(&path).await;
    }

    #[tokio::test]
    async fn stage_into_regular_file_fails_without_fifo() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("staging");
        std::fs::write(&file, b"").unwrap();

        let err = stage(&file, Source::from("{}")).await.unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }
}
