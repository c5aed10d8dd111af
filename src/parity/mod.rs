//! Integration with the external par2 tool
//!
//! This module isolates everything that knows about par2cmdline at runtime:
//!
//! - [`ProcessRunner`]: the seam through which commands are executed, with
//!   [`CliProcessRunner`] as the subprocess-backed implementation
//! - [`OutputParser`]: turns the tool's line output into per-file statuses
//! - [`read_manifest`]: reads set metadata straight from `.par2` files
//!
//! ## Usage
//!
//! ```no_run
//! use par2guard::command::CommandBuilder;
//! use par2guard::parity::{CliProcessRunner, OutputParser, ProcessRunner};
//! use par2guard::types::{Job, Operation};
//! use std::path::PathBuf;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let job = Job {
//!         operation: Operation::Verify,
//!         base_name: "Album".into(),
//!         archive_name: String::new(),
//!         target_path: PathBuf::from("/music/Album"),
//!         input_files: Vec::new(),
//!         redundancy: None,
//!         block_size: None,
//!         main_par2_path: Some(PathBuf::from("/music/Album/Album.par2")),
//!     };
//!     let spec = CommandBuilder::new("par2").build(&job)?;
//!
//!     let mut parser = OutputParser::new(job);
//!     let mut on_line = |line: &str| parser.feed(line);
//!     let output = CliProcessRunner::new()
//!         .run(&spec, &CancellationToken::new(), &mut on_line)
//!         .await?;
//!
//!     let result = parser.finish(output.exit_code);
//!     println!("{}", result.message());
//!     Ok(())
//! }
//! ```

mod cli;
mod manifest;
mod parser;
mod traits;

pub use cli::CliProcessRunner;
pub use manifest::{ManifestEntry, Par2Manifest, read_manifest};
pub use parser::{ExitStatus, OutputParser, is_key_line, parse_output};
pub use traits::{ProcessOutput, ProcessRunner};
