//! Process runner backed by tokio subprocesses

use super::traits::{ProcessOutput, ProcessRunner};
use crate::command::CommandSpec;
use crate::error::Error;
use async_trait::async_trait;
use std::io::{BufRead, BufReader, PipeReader};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long an interrupted child gets to exit before it is killed
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Output lines buffered between the pipe readers and the caller
const LINE_BUFFER: usize = 256;

/// Runs commands as child processes and streams their output
///
/// stdout and stderr share one pipe, so lines arrive in the order the child
/// wrote them.
/// On cancellation the child is interrupted (SIGINT on Unix), given a short
/// grace period, then killed. It is always reaped before `run` returns.
#[derive(Debug, Clone)]
pub struct CliProcessRunner {
    grace_period: Duration,
}

impl Default for CliProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CliProcessRunner {
    /// Create a runner with the default grace period
    pub fn new() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Override how long an interrupted child may take to exit
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // SAFETY: `pid` is our own child and has not been reaped yet
                let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
                if rc == 0
                    && let Ok(Ok(status)) =
                        tokio::time::timeout(self.grace_period, child.wait()).await
                {
                    debug!(pid, ?status, "par2 exited after interrupt");
                    return;
                }
            }
        }

        if let Err(e) = child.kill().await {
            warn!(error = %e, "failed to kill par2 process");
        }
    }
}

enum Step {
    Line(String),
    Closed,
    Cancelled,
}

#[async_trait]
impl ProcessRunner for CliProcessRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> crate::Result<ProcessOutput> {
        if cancel.is_cancelled() {
            return Err(Error::ProcessTerminated);
        }

        let (reader, writer) = std::io::pipe()?;
        let stderr_writer = writer.try_clone()?;

        // The command owns the write ends; it is dropped right after the
        // spawn so the reader sees EOF once the child exits
        let mut child = Command::new(spec.program())
            .args(spec.args())
            .current_dir(spec.cwd())
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::ProcessLaunch {
                program: spec.program().to_path_buf(),
                source,
            })?;

        debug!(pid = child.id(), command = %spec.display(), "spawned par2");

        let (tx, mut rx) = mpsc::channel(LINE_BUFFER);
        tokio::task::spawn_blocking(move || forward_lines(reader, tx));

        let mut lines = 0;
        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                line = rx.recv() => line.map_or(Step::Closed, Step::Line),
            };
            match step {
                Step::Line(line) => {
                    lines += 1;
                    on_line(&line);
                }
                Step::Closed => break,
                Step::Cancelled => {
                    self.terminate(&mut child).await;
                    return Err(Error::ProcessTerminated);
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status?),
        };
        let Some(status) = status else {
            self.terminate(&mut child).await;
            return Err(Error::ProcessTerminated);
        };

        debug!(exit_code = ?status.code(), lines, "par2 finished");
        Ok(ProcessOutput {
            exit_code: status.code(),
            lines,
        })
    }

    fn name(&self) -> &'static str {
        "cli-par2"
    }
}

/// Read the shared output pipe on a blocking thread until EOF
fn forward_lines(reader: PipeReader, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut chunk = Vec::new();
    loop {
        chunk.clear();
        match reader.read_until(b'\n', &mut chunk) {
            Ok(0) => break,
            Ok(_) => {
                for line in split_lines(&chunk) {
                    if tx.blocking_send(line).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read par2 output");
                break;
            }
        }
    }
}

/// Split raw output into lines
///
/// par2 redraws progress with bare carriage returns, so `\r` ends a line
/// just like `\n`. Invalid UTF-8 is replaced rather than rejected.
pub(crate) fn split_lines(chunk: &[u8]) -> Vec<String> {
    chunk
        .split(|&b| b == b'\n' || b == b'\r')
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}
