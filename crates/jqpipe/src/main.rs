//! jqpipe CLI binary.

use anyhow::Result;
use jqpipe::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the jqpipe CLI.
///
/// Uses tokio's `current_thread` runtime. Pipe writers open their ends on
/// the blocking pool and standard input is read on its own thread, so one
/// scheduler thread is enough.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr so they never mix with query output.
    // Example: RUST_LOG=jqpipe=debug jqpipe . data.json
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jqpipe=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("jqpipe completed successfully");
    Ok(())
}
