//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use jqpipe::JqBuilder;
use jqpipe::fifo::FIFO_PREFIX;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Whether a real `jq` is installed on the search path.
pub fn jq_available() -> bool {
    Command::new("jq")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// A builder whose "query program" is `sh -c <script>`.
///
/// The script sees `$1` = `-f`, `$2` = the filter pipe, and the inputs after
/// that, exactly as a real query program would.
pub fn sh_builder(script: &str, staging_dir: &Path) -> JqBuilder {
    JqBuilder::new()
        .with_program("sh")
        .with_option("-c", script)
        .with_flag("fake-jq")
        .with_staging_dir(staging_dir)
}

/// Staged pipes currently present in `dir`.
pub fn staged_pipes(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(FIFO_PREFIX))
        .map(|entry| entry.path())
        .collect()
}

/// Wait until every staged pipe in `dir` has been removed by its writer.
pub async fn wait_for_no_pipes(dir: &Path) {
    for _ in 0..500 {
        if staged_pipes(dir).is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pipes left behind in {}: {:?}", dir.display(), staged_pipes(dir));
}
