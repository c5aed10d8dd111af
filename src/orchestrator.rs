//! Sequential job execution
//!
//! The [`Orchestrator`] ties the pipeline together: it resolves a selection
//! into jobs, builds every command up front, then runs the jobs one at a
//! time on a single worker. Progress is published as [`Event`]s on a
//! broadcast channel; the only way to influence a running batch is to cancel
//! it.

use crate::aggregator::{RunAggregator, progress_line};
use crate::command::{CommandBuilder, CommandSpec};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::parity::{CliProcessRunner, OutputParser, ProcessRunner, is_key_line};
use crate::resolver::{PathResolver, ResolveOptions};
use crate::types::{Event, Job, Operation, RunSummary};
use crate::utils::{existing_par2_files, remove_par2_files};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A parity set that a create job would overwrite
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExistingSet {
    /// Display name of the job
    pub base_name: String,
    /// Folder the set lives in
    pub target_path: PathBuf,
    /// The set's main file and volumes
    pub files: Vec<PathBuf>,
}

/// Jobs whose commands have all been built
struct PreparedRun {
    operation: Operation,
    jobs: Vec<(Job, CommandSpec)>,
}

/// Runs PAR2 jobs sequentially and reports progress
///
/// Cloning is cheap; all clones share the runner, the event channel and
/// the verbose flag.
///
/// # Examples
///
/// ```no_run
/// use par2guard::{Config, Orchestrator, Operation};
/// use std::path::PathBuf;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let orchestrator = Orchestrator::new(Config::default())?;
/// let mut events = orchestrator.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{:?}", event);
///     }
/// });
///
/// let options = orchestrator.resolve_options(Operation::Verify);
/// let jobs = orchestrator.plan(&[PathBuf::from("/music")], &options)?;
/// let handle = orchestrator.start(jobs)?;
/// let summary = handle.wait().await?;
/// println!("{}", summary);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    builder: CommandBuilder,
    resolver: PathResolver,
    event_tx: broadcast::Sender<Event>,
    verbose: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Create an orchestrator that runs the par2 binary found via `config`
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::ProcessLaunch`] if no par2 binary can be located
    pub fn new(config: Config) -> Result<Self> {
        let program = config.tools.locate_par2()?;
        let runner = Arc::new(CliProcessRunner::new());
        Self::with_runner(config, program, runner)
    }

    /// Create an orchestrator with an explicit program and runner
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn with_runner(
        config: Config,
        program: impl Into<PathBuf>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self> {
        config.validate()?;
        let resolver = PathResolver::from_config(&config)?;
        let builder = CommandBuilder::new(program);
        let (event_tx, _rx) = broadcast::channel(config.event_buffer);

        info!(
            program = ?builder.program(),
            runner = runner.name(),
            "orchestrator initialized"
        );

        Ok(Self {
            verbose: Arc::new(AtomicBool::new(config.verbose_logging)),
            config: Arc::new(config),
            runner,
            builder,
            resolver,
            event_tx,
        })
    }

    /// Subscribe to progress events
    ///
    /// Events are broadcast; a subscriber that falls behind by more than the
    /// configured buffer loses the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this orchestrator was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Forward every output line (`true`) or key lines only (`false`)
    ///
    /// Takes effect immediately, including for the job currently running.
    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    /// Whether every output line is forwarded
    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    /// Resolve options for `operation` seeded from the configuration
    pub fn resolve_options(&self, operation: Operation) -> ResolveOptions {
        ResolveOptions::from_config(operation, &self.config)
    }

    /// Turn a selection of files and folders into jobs
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if nothing eligible was selected.
    pub fn plan(&self, selection: &[PathBuf], options: &ResolveOptions) -> Result<Vec<Job>> {
        let jobs = self.resolver.resolve(selection, options)?;
        info!(
            operation = %options.operation,
            selected = selection.len(),
            jobs = jobs.len(),
            "selection resolved"
        );
        Ok(jobs)
    }

    /// Find parity sets that create jobs would overwrite
    ///
    /// Verify and repair jobs never conflict.
    ///
    /// # Errors
    ///
    /// Returns an error if a target folder cannot be read.
    pub fn preflight(&self, jobs: &[Job]) -> Result<Vec<ExistingSet>> {
        let mut existing = Vec::new();
        for job in jobs.iter().filter(|j| j.operation == Operation::Create) {
            let files = existing_par2_files(&job.target_path, &job.archive_name)?;
            if !files.is_empty() {
                warn!(
                    job = %job.base_name,
                    count = files.len(),
                    "parity set already exists"
                );
                existing.push(ExistingSet {
                    base_name: job.base_name.clone(),
                    target_path: job.target_path.clone(),
                    files,
                });
            }
        }
        Ok(existing)
    }

    /// Delete the files of sets found by [`preflight`](Self::preflight)
    ///
    /// # Errors
    ///
    /// Returns the first I/O error encountered.
    pub fn remove_existing(&self, sets: &[ExistingSet]) -> Result<usize> {
        let mut removed = 0;
        for set in sets {
            removed += remove_par2_files(&set.files)?;
        }
        Ok(removed)
    }

    /// Run `jobs` on a background worker
    ///
    /// Every command is built before this returns, so argument errors are
    /// reported here and no process has been started when they are.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `jobs` is empty, mixes operations,
    /// or contains a job no command can be built for.
    pub fn start(&self, jobs: Vec<Job>) -> Result<RunHandle> {
        let prepared = self.prepare(jobs)?;
        let cancel = CancellationToken::new();
        let worker = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { worker.execute(prepared, token).await });
        Ok(RunHandle { cancel, task })
    }

    /// Run `jobs` on the current task until they finish or `cancel` fires
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start). Failures of individual jobs are
    /// recorded in the summary, not returned.
    pub async fn run(&self, jobs: Vec<Job>, cancel: CancellationToken) -> Result<RunSummary> {
        let prepared = self.prepare(jobs)?;
        Ok(self.execute(prepared, cancel).await)
    }

    fn prepare(&self, jobs: Vec<Job>) -> Result<PreparedRun> {
        let operation = match jobs.first() {
            Some(job) => job.operation,
            None => return Err(Error::invalid_input("no jobs to run")),
        };
        if let Some(other) = jobs.iter().find(|j| j.operation != operation) {
            return Err(Error::invalid_input(format!(
                "cannot mix {} and {} jobs in one run",
                operation, other.operation
            )));
        }

        let jobs = jobs
            .into_iter()
            .map(|job| {
                let spec = self.builder.build(&job)?;
                Ok((job, spec))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PreparedRun { operation, jobs })
    }

    async fn execute(&self, prepared: PreparedRun, cancel: CancellationToken) -> RunSummary {
        let PreparedRun { operation, jobs } = prepared;
        let total = jobs.len();
        let mut aggregator = RunAggregator::new(operation, total);
        let mut aborted = None;

        info!(%operation, total, "{}", operation.heading());
        self.emit(Event::RunStarted {
            operation,
            total_jobs: total,
        });

        for (position, (job, spec)) in jobs.into_iter().enumerate() {
            let index = position + 1;
            if cancel.is_cancelled() {
                break;
            }

            let base_name = job.base_name.clone();
            info!(
                job = %base_name,
                command = %spec.display(),
                "{}",
                progress_line(operation, index, total, &base_name)
            );
            self.emit(Event::JobStarted {
                index,
                total,
                base_name: base_name.clone(),
            });

            let mut parser = OutputParser::new(job);
            let run_result = {
                let verbose = &self.verbose;
                let event_tx = &self.event_tx;
                let mut on_line = |line: &str| {
                    parser.feed(line);
                    if verbose.load(Ordering::Relaxed) || is_key_line(line) {
                        event_tx
                            .send(Event::LogLine {
                                base_name: base_name.clone(),
                                line: line.to_string(),
                            })
                            .ok();
                    }
                };
                self.runner.run(&spec, &cancel, &mut on_line).await
            };

            let result = match run_result {
                Ok(output) => parser.finish(output.exit_code),
                Err(e) if e.is_cancellation() => {
                    warn!(job = %base_name, "job aborted by cancellation");
                    self.emit(Event::JobAborted {
                        index,
                        base_name: base_name.clone(),
                    });
                    aborted = Some(base_name);
                    break;
                }
                Err(e) => {
                    warn!(job = %base_name, error = %e, "job could not run");
                    let mut result = parser.finish(None);
                    result.error = Some(e.to_string());
                    result
                }
            };

            let state = result.overall_state;
            let message = result.message();
            let outcome = aggregator.record(result);
            info!(job = %base_name, ?state, ?outcome, "{}", message);
            self.emit(Event::JobFinished {
                index,
                base_name,
                state,
                outcome,
                message,
            });
        }

        let summary = aggregator.finish(aborted);
        info!(
            %operation,
            ok = summary.counts.ok,
            needs_repair = summary.counts.needs_repair,
            repaired = summary.counts.repaired,
            failed = summary.counts.failed,
            incomplete = summary.incomplete,
            "run finished"
        );
        self.emit(Event::RunFinished {
            summary: Box::new(summary.clone()),
        });
        summary
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

/// Handle to a run executing on a background worker
pub struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// Request cancellation; the in-flight job is aborted and the run stops
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to finish and take its summary
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if the worker task panicked.
    pub async fn wait(self) -> Result<RunSummary> {
        self.task
            .await
            .map_err(|e| Error::Other(format!("run worker failed: {}", e)))
    }
}
