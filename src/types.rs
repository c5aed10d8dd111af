//! Core types for par2guard

use crate::parity::ExitStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// PAR2 operation performed by a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a new parity set
    Create,
    /// Verify an existing parity set
    Verify,
    /// Repair the files protected by an existing parity set
    Repair,
}

impl Operation {
    /// par2cmdline sub-command for this operation
    pub fn tool_command(self) -> &'static str {
        match self {
            Operation::Create => "c",
            Operation::Verify => "v",
            Operation::Repair => "r",
        }
    }

    /// Present participle used in progress messages ("Verifying 2 / 5 items")
    pub fn action_label(self) -> &'static str {
        match self {
            Operation::Create => "Creating",
            Operation::Verify => "Verifying",
            Operation::Repair => "Repairing",
        }
    }

    /// Heading printed when a run of this operation starts
    pub fn heading(self) -> &'static str {
        match self {
            Operation::Create => "Creating parity files",
            Operation::Verify => "Verifying files",
            Operation::Repair => "Repairing files",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Verify => "verify",
            Operation::Repair => "repair",
        };
        f.write_str(s)
    }
}

/// How much recovery data a create job generates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum Redundancy {
    /// Recovery data as a percentage of the protected data (`-r<N>`)
    Percent(u8),
    /// Exact number of recovery blocks (`-c<N>`)
    RecoveryBlocks(u32),
}

/// One PAR2 operation unit: a folder (or loose file group) to protect, or
/// one main `.par2` file to verify or repair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Operation to perform
    pub operation: Operation,
    /// Display name used in logs, progress events and summaries
    ///
    /// For sibling disc folders this carries the disc disambiguation
    /// (`Album – disc 2`). It never reaches the tool's arguments.
    pub base_name: String,
    /// Archive name passed to the tool on create (`<archive_name>.par2`)
    ///
    /// Empty for verify and repair jobs.
    pub archive_name: String,
    /// Directory the tool runs in
    pub target_path: PathBuf,
    /// Files to protect, relative to `target_path`, in a stable order (create only)
    pub input_files: Vec<PathBuf>,
    /// Recovery data amount (create only)
    pub redundancy: Option<Redundancy>,
    /// Block size in bytes, `None` lets the tool choose (create only)
    pub block_size: Option<u32>,
    /// Main `.par2` file of the set (verify/repair only)
    pub main_par2_path: Option<PathBuf>,
}

impl Job {
    /// Redundancy percentage, if this job uses percentage mode
    pub fn redundancy_percent(&self) -> Option<u8> {
        match self.redundancy {
            Some(Redundancy::Percent(p)) => Some(p),
            _ => None,
        }
    }
}

/// Per-file outcome reported by the tool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// File is intact
    Ok,
    /// File exists but is damaged (or misnamed)
    NeedsRepair,
    /// File was reconstructed by a repair
    Repaired,
    /// Repair was attempted and did not succeed for this file
    Failed,
    /// File is absent
    Missing,
}

impl FileState {
    /// Whether the file still needs work before the set is complete
    pub fn is_damaged(self) -> bool {
        matches!(self, FileState::NeedsRepair | FileState::Missing)
    }
}

/// Status of one protected file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    /// File name as reported by the tool (relative to the job's target path)
    pub path: PathBuf,
    /// Latest known state
    pub state: FileState,
}

/// Overall state of a finished job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No failures and nothing was repaired
    Ok,
    /// No failures and at least one file was repaired
    Repaired,
    /// Any file failed or the process reported failure
    Failed,
}

/// Classification of a finished job for run-level counting
///
/// Every counted job has exactly one outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Everything intact
    Ok,
    /// Damaged or missing files were found and not repaired
    NeedsRepair,
    /// Files were repaired
    Repaired,
    /// The job failed
    Failed,
}

/// An output line that looked like a status marker but could not be understood
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseAnomaly {
    /// 1-based position of the line in the job's output
    pub line_number: usize,
    /// The line as emitted by the tool
    pub line: String,
    /// Why the line was not understood
    pub reason: String,
}

/// Structured result of one job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobResult {
    /// The job this result belongs to
    pub job: Job,
    /// Overall state
    pub overall_state: JobState,
    /// Per-file statuses in the order the tool first mentioned each file
    pub files: Vec<FileStatus>,
    /// Every line the tool emitted, verbatim
    pub raw_log: Vec<String>,
    /// Process exit code (`None` if killed by a signal or never started)
    pub exit_code: Option<i32>,
    /// Status-like lines that could not be parsed
    pub anomalies: Vec<ParseAnomaly>,
    /// Error message when the job could not run at all
    pub error: Option<String>,
    /// When the job started
    pub started_at: DateTime<Utc>,
    /// When the result was finalized
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    /// Classify this result for run-level counting
    ///
    /// Failure dominates repair, repair dominates remaining damage. A verify
    /// that exited with "repair required" counts as damaged even when no
    /// file line said so.
    pub fn outcome(&self) -> JobOutcome {
        match self.overall_state {
            JobState::Failed => JobOutcome::Failed,
            JobState::Repaired => JobOutcome::Repaired,
            JobState::Ok
                if self.files.iter().any(|f| f.state.is_damaged())
                    || self.exit_status() == ExitStatus::RepairRequired =>
            {
                JobOutcome::NeedsRepair
            }
            JobState::Ok => JobOutcome::Ok,
        }
    }

    /// The process exit code interpreted for this job's operation
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::classify(self.job.operation, self.exit_code)
    }

    /// Number of files in the given state
    pub fn count(&self, state: FileState) -> usize {
        self.files.iter().filter(|f| f.state == state).count()
    }

    /// Short user-facing message describing how the job ended
    pub fn message(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Error: {}", error);
        }

        let outcome = self.outcome();
        match (self.job.operation, outcome) {
            (_, JobOutcome::Failed) => match self.exit_code {
                Some(code) if code != 0 => {
                    format!("Operation failed (exit code {}). See log for details.", code)
                }
                Some(_) => "Operation failed. See log for details.".to_string(),
                None => "Operation failed (terminated by signal). See log for details.".to_string(),
            },
            (Operation::Create, _) => "Parity files created successfully.".to_string(),
            (Operation::Verify, JobOutcome::NeedsRepair) => {
                "Verification complete. Repair is required.".to_string()
            }
            (Operation::Verify, _) => {
                "All files verified successfully. Repair not required.".to_string()
            }
            (Operation::Repair, JobOutcome::Repaired) => {
                "Repair completed successfully.".to_string()
            }
            (Operation::Repair, JobOutcome::NeedsRepair) => {
                "Repair finished without confirming the damaged files. See log for details."
                    .to_string()
            }
            (Operation::Repair, _) => "Repair not required.".to_string(),
        }
    }
}

/// Counts of finished jobs by outcome
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    /// Jobs with everything intact
    pub ok: usize,
    /// Jobs with damage left unrepaired
    pub needs_repair: usize,
    /// Jobs where files were repaired
    pub repaired: usize,
    /// Failed jobs
    pub failed: usize,
}

impl OutcomeCounts {
    /// Count one more job with the given outcome
    pub fn add(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Ok => self.ok += 1,
            JobOutcome::NeedsRepair => self.needs_repair += 1,
            JobOutcome::Repaired => self.repaired += 1,
            JobOutcome::Failed => self.failed += 1,
        }
    }

    /// Total number of counted jobs
    pub fn total(&self) -> usize {
        self.ok + self.needs_repair + self.repaired + self.failed
    }
}

/// Aggregated outcome of one user-initiated run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    /// Operation shared by every job in the run
    pub operation: Operation,
    /// Number of jobs the run was started with
    pub jobs_total: usize,
    /// Counts by outcome over finished jobs
    pub counts: OutcomeCounts,
    /// Finished job results in submission order
    pub results: Vec<JobResult>,
    /// Whether the run stopped before every job finished
    pub incomplete: bool,
    /// Base name of the job that was in flight when the run was cancelled
    pub aborted: Option<String>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run was finalized
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    /// Base names of failed jobs, in submission order
    pub fn failed_items(&self) -> Vec<&str> {
        self.items_with(JobOutcome::Failed)
    }

    /// Base names of jobs with the given outcome, in submission order
    pub fn items_with(&self, outcome: JobOutcome) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.outcome() == outcome)
            .map(|r| r.job.base_name.as_str())
            .collect()
    }

    /// Whether the run completed without a single failed job
    pub fn is_success(&self) -> bool {
        !self.incomplete && self.counts.failed == 0
    }
}

/// Event emitted while a run progresses
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run started
    RunStarted {
        /// Operation of the run
        operation: Operation,
        /// Number of jobs to execute
        total_jobs: usize,
    },

    /// A job started
    JobStarted {
        /// 1-based position of the job in the run
        index: usize,
        /// Number of jobs in the run
        total: usize,
        /// Job display name
        base_name: String,
    },

    /// A line of tool output (every line when verbose, key lines otherwise)
    LogLine {
        /// Job display name
        base_name: String,
        /// The output line
        line: String,
    },

    /// A job finished and its result was recorded
    JobFinished {
        /// 1-based position of the job in the run
        index: usize,
        /// Job display name
        base_name: String,
        /// Overall job state
        state: JobState,
        /// Counted outcome
        outcome: JobOutcome,
        /// Short user-facing message
        message: String,
    },

    /// The in-flight job was aborted by cancellation; it has no result
    JobAborted {
        /// 1-based position of the job in the run
        index: usize,
        /// Job display name
        base_name: String,
    },

    /// The run finished (or was cancelled) and its summary is final
    RunFinished {
        /// Final summary
        summary: Box<RunSummary>,
    },
}
