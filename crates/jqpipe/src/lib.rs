//! jqpipe - run an external JSON query processor over named pipes.
//!
//! The filter and every in-memory input are streamed to the query program
//! (`jq` by default) through FIFOs staged in a directory, so nothing is
//! written to disk as a regular file and large inputs are never buffered
//! twice. The program's standard output is captured and returned.
//!
//! # Example
//!
//! ```no_run
//! use jqpipe::Jq;
//!
//! # async fn example() -> jqpipe::Result<()> {
//! let jq = Jq::new(r#"{"a":[1,2,3]}"#, ".a | add", ["-c"])?;
//! let total: Vec<u64> = jq.execute_json().await?;
//! assert_eq!(total, [6]);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod args;
pub mod builder;
pub mod cli;
pub mod error;
pub mod fifo;
pub mod option;
pub mod output;
pub mod runner;
pub mod settings;
pub mod source;

pub use builder::JqBuilder;
pub use error::{Error, Result};
pub use option::JqOption;
pub use runner::{Jq, RunState};
pub use settings::Settings;
pub use source::Source;
