//! Argument construction for par2cmdline
//!
//! Every path handed to the tool comes after an explicit `--` marker, so a
//! file named `-r50` or `--help` is always a file and never an option.
//! Building a command is a pure transformation of a [`Job`].

use crate::error::{Error, Result};
use crate::types::{Job, Operation, Redundancy};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Marker after which par2cmdline treats every argument as a file name
pub const END_OF_OPTIONS: &str = "--";

/// par2 requires block sizes to be a multiple of this many bytes
const BLOCK_SIZE_ALIGNMENT: u32 = 4;

/// Immutable argument vector and working directory for one tool invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: PathBuf,
}

impl CommandSpec {
    /// Assemble a command from its parts
    ///
    /// [`CommandBuilder`] is the normal way to obtain a spec for a job; this
    /// is for running arbitrary programs through a
    /// [`ProcessRunner`](crate::parity::ProcessRunner).
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I, cwd: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.into(),
        }
    }

    /// Program to execute
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments, excluding the program itself
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Working directory
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Arguments after the end-of-options marker
    pub fn operands(&self) -> &[OsString] {
        match self.args.iter().position(|a| a == END_OF_OPTIONS) {
            Some(idx) => &self.args[idx + 1..],
            None => &[],
        }
    }

    /// Printable form of the command line, for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Builds [`CommandSpec`]s for jobs
#[derive(Clone, Debug)]
pub struct CommandBuilder {
    program: PathBuf,
}

impl CommandBuilder {
    /// Create a builder invoking `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Program the built commands invoke
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the command for one job
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a create job has no input files, no
    /// redundancy or an unusable block size, or a verify/repair job has no
    /// main `.par2` file.
    pub fn build(&self, job: &Job) -> Result<CommandSpec> {
        let mut args: Vec<OsString> = vec![job.operation.tool_command().into()];

        match job.operation {
            Operation::Create => {
                if job.input_files.is_empty() {
                    return Err(Error::invalid_path(
                        format!("create job '{}' has no input files", job.base_name),
                        &job.target_path,
                    ));
                }

                if let Some(size) = job.block_size {
                    args.push(format!("-s{}", normalize_block_size(size)?).into());
                }

                match job.redundancy {
                    Some(Redundancy::Percent(p)) => args.push(format!("-r{}", p).into()),
                    Some(Redundancy::RecoveryBlocks(n)) => args.push(format!("-c{}", n).into()),
                    None => {
                        return Err(Error::invalid_input(format!(
                            "create job '{}' has no redundancy setting",
                            job.base_name
                        )));
                    }
                }

                args.push(END_OF_OPTIONS.into());
                args.push(archive_file_name(&job.archive_name).into());
                args.extend(job.input_files.iter().map(|f| f.as_os_str().to_os_string()));
            }
            Operation::Verify | Operation::Repair => {
                let main = job.main_par2_path.as_deref().ok_or_else(|| {
                    Error::invalid_path(
                        format!("{} job '{}' has no .par2 file", job.operation, job.base_name),
                        &job.target_path,
                    )
                })?;

                args.push(END_OF_OPTIONS.into());
                args.push(relative_to(main, &job.target_path));
            }
        }

        Ok(CommandSpec {
            program: self.program.clone(),
            args,
            cwd: job.target_path.clone(),
        })
    }
}

/// Round a block size down to par2's alignment
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the result would be zero.
pub fn normalize_block_size(size: u32) -> Result<u32> {
    let aligned = size - size % BLOCK_SIZE_ALIGNMENT;
    if aligned == 0 {
        return Err(Error::invalid_input(format!(
            "block size {} is too small (minimum {} bytes)",
            size, BLOCK_SIZE_ALIGNMENT
        )));
    }
    if aligned != size {
        warn!(
            requested = size,
            adjusted = aligned,
            "block size adjusted (must be divisible by 4)"
        );
    }
    Ok(aligned)
}

fn archive_file_name(archive_name: &str) -> String {
    let name = if archive_name.trim().is_empty() {
        "parity"
    } else {
        archive_name
    };
    format!("{}.par2", name)
}

/// `path` relative to `base` when it lies inside it, unchanged otherwise
fn relative_to(path: &Path, base: &Path) -> OsString {
    path.strip_prefix(base)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(|rel| rel.as_os_str())
        .unwrap_or(path.as_os_str())
        .to_os_string()
}
