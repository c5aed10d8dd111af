//! Process runner seam
//!
//! The orchestrator never spawns processes itself. It hands a
//! [`CommandSpec`] to a [`ProcessRunner`], which streams output lines back
//! through a callback and returns the exit code. Tests substitute a scripted
//! runner; production uses [`CliProcessRunner`](super::CliProcessRunner).

use crate::command::CommandSpec;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// What a finished process left behind
#[must_use]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Number of lines delivered to the callback
    pub lines: usize,
}

/// Runs one external command and streams its output
///
/// # Examples
///
/// ```no_run
/// use par2guard::command::CommandBuilder;
/// use par2guard::parity::{CliProcessRunner, ProcessRunner};
/// use par2guard::types::{Job, Operation};
/// use std::path::PathBuf;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let runner = CliProcessRunner::new();
/// let job = Job {
///     operation: Operation::Verify,
///     base_name: "Album".into(),
///     archive_name: String::new(),
///     target_path: PathBuf::from("/music/Album"),
///     input_files: Vec::new(),
///     redundancy: None,
///     block_size: None,
///     main_par2_path: Some(PathBuf::from("/music/Album/Album.par2")),
/// };
/// let spec = CommandBuilder::new("par2").build(&job)?;
///
/// let mut on_line = |line: &str| println!("{}", line);
/// let output = runner
///     .run(&spec, &CancellationToken::new(), &mut on_line)
///     .await?;
/// println!("exit code: {:?}", output.exit_code);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `spec` to completion, calling `on_line` for every output line
    ///
    /// Lines from stdout and stderr are delivered in the order the process
    /// wrote them, with carriage returns treated as line breaks.
    ///
    /// # Errors
    ///
    /// - [`Error::ProcessLaunch`](crate::Error::ProcessLaunch) if the process
    ///   cannot be started
    /// - [`Error::ProcessTerminated`](crate::Error::ProcessTerminated) if
    ///   `cancel` fired and the process was stopped
    async fn run(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> crate::Result<ProcessOutput>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
