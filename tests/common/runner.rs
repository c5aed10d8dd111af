//! Scripted process runner
//!
//! Replays canned par2 transcripts instead of spawning processes, and
//! records every command it was asked to run.

use async_trait::async_trait;
use par2guard::command::CommandSpec;
use par2guard::parity::{ProcessOutput, ProcessRunner};
use par2guard::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// What the runner does for one invocation
#[derive(Clone, Debug)]
pub enum Script {
    /// Emit the lines, then exit with the code
    Output {
        /// Lines to emit
        lines: Vec<String>,
        /// Exit code to report
        exit_code: Option<i32>,
    },
    /// Fail as if the binary could not be started
    LaunchFailure,
    /// Emit the lines, then block until cancelled
    HangUntilCancelled {
        /// Lines to emit before blocking
        lines: Vec<String>,
    },
}

impl Script {
    /// Replay `transcript` and exit with `exit_code`
    pub fn transcript(transcript: &str, exit_code: i32) -> Self {
        Script::Output {
            lines: super::fixtures::lines(transcript),
            exit_code: Some(exit_code),
        }
    }
}

/// Runner replaying [`Script`]s in order
///
/// Invocations beyond the scripted ones print nothing and exit 0.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    /// Runner that plays `scripts` one per invocation
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Commands received so far, in order
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<ProcessOutput> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(spec.clone());
        let script = self
            .scripts
            .lock()
            .expect("scripts lock poisoned")
            .pop_front();

        match script {
            None => Ok(ProcessOutput {
                exit_code: Some(0),
                lines: 0,
            }),
            Some(Script::Output { lines, exit_code }) => {
                for line in &lines {
                    on_line(line);
                }
                Ok(ProcessOutput {
                    exit_code,
                    lines: lines.len(),
                })
            }
            Some(Script::LaunchFailure) => Err(Error::ProcessLaunch {
                program: spec.program().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted launch failure"),
            }),
            Some(Script::HangUntilCancelled { lines }) => {
                for line in &lines {
                    on_line(line);
                }
                cancel.cancelled().await;
                Err(Error::ProcessTerminated)
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
