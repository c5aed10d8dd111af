//! Parser for par2 command output
//!
//! par2cmdline has no structured output, so this module turns its text into
//! [`FileStatus`] entries. Only a small set of markers changes state; every
//! other line is kept verbatim in the raw log and has no effect. Damage can
//! only be cleared by the tool's own post-repair verification, never by the
//! absence of a failure marker.

use crate::types::{
    FileState, FileStatus, Job, JobResult, JobState, Operation, ParseAnomaly,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Exit status of a par2 invocation, interpreted for its operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The command exited successfully (exit code 0)
    Success,
    /// Verify found damage that can be repaired (exit code 1 on verify)
    RepairRequired,
    /// Any other exit code, or no exit code at all (killed by a signal)
    Failure,
}

impl ExitStatus {
    /// Interpret `exit_code` for `operation`
    pub fn classify(operation: Operation, exit_code: Option<i32>) -> Self {
        match (operation, exit_code) {
            (_, Some(0)) => Self::Success,
            (Operation::Verify, Some(1)) => Self::RepairRequired,
            _ => Self::Failure,
        }
    }

    /// Returns `true` if the exit status represents failure
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failure)
    }
}

/// Lines shown when verbose logging is off
const KEY_LINE_PREFIXES: &[&str] = &[
    "Block size:",
    "Source file count:",
    "Source block count:",
    "Recovery block count:",
    "Recovery file count:",
    "There are",
    "All files are correct",
    "Repair is required",
    "Repair is possible",
    "Repair is not possible",
    "Repair complete",
    "Repair not required",
    "Repair Failed",
    "You need",
    "Verification complete",
    "Done",
];

/// Whether a line is worth showing when verbose logging is off
pub fn is_key_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed.starts_with("Target:") || KEY_LINE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// What a target line says about a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetReport {
    Found,
    Missing,
    Damaged,
}

/// A recognised status marker
#[derive(Debug, PartialEq, Eq)]
enum Marker<'a> {
    /// `Target: "name" - found|missing|damaged.`
    Target(&'a str, TargetReport),
    /// `Target|File: "found" - is a match for "target".`
    Misnamed(&'a str),
    /// `Verifying repaired files:`
    RepairVerification,
    /// `Repair is not possible.`, `Repair Failed.`, `You need N more recovery blocks`
    RepairImpossible,
    /// A status line that could not be understood
    Malformed(&'static str),
    /// Anything else
    Other,
}

fn parse_line(line: &str) -> Marker<'_> {
    let trimmed = line.trim();

    if let Some(rest) = trimmed.strip_prefix("Target:") {
        return parse_subject(rest.trim_start(), true);
    }
    if let Some(rest) = trimmed.strip_prefix("File:") {
        return match parse_subject(rest.trim_start(), false) {
            m @ Marker::Misnamed(_) => m,
            _ => Marker::Other,
        };
    }
    if trimmed.starts_with("Verifying repaired files") {
        return Marker::RepairVerification;
    }
    if trimmed.starts_with("Repair is not possible")
        || trimmed.eq_ignore_ascii_case("repair failed.")
        || trimmed.eq_ignore_ascii_case("repair failed")
        || (trimmed.starts_with("You need") && trimmed.contains("more recovery"))
    {
        return Marker::RepairImpossible;
    }
    Marker::Other
}

/// Parse `"name" - status` after a `Target:`/`File:` prefix
fn parse_subject(rest: &str, strict: bool) -> Marker<'_> {
    let malformed = |reason| if strict { Marker::Malformed(reason) } else { Marker::Other };

    let Some(quoted) = rest.strip_prefix('"') else {
        return malformed("file name is not quoted");
    };

    // "is a match for" carries a second quoted name, so look for it first
    if let Some(idx) = quoted.find("\" - is a match for \"") {
        let target = &quoted[idx + "\" - is a match for \"".len()..];
        return match target.rfind('"') {
            Some(end) if end > 0 => Marker::Misnamed(&target[..end]),
            _ => malformed("unterminated match target"),
        };
    }

    let Some(idx) = quoted.rfind("\" - ") else {
        return malformed("missing status after file name");
    };
    let name = &quoted[..idx];
    if name.is_empty() {
        return malformed("empty file name");
    }

    let status = quoted[idx + 4..].trim_start().to_ascii_lowercase();
    let report = if status.starts_with("found") {
        TargetReport::Found
    } else if status.starts_with("missing") {
        TargetReport::Missing
    } else if status.starts_with("damaged") {
        TargetReport::Damaged
    } else {
        return malformed("unknown target status");
    };
    Marker::Target(name, report)
}

/// Incremental parser for one job's output
///
/// Feed lines in the order the tool emits them, then call
/// [`finish`](Self::finish) with the exit code to obtain the [`JobResult`].
pub struct OutputParser {
    job: Job,
    started_at: DateTime<Utc>,
    files: Vec<FileStatus>,
    positions: HashMap<PathBuf, usize>,
    raw_log: Vec<String>,
    anomalies: Vec<ParseAnomaly>,
    in_repair_verification: bool,
}

impl OutputParser {
    /// Start parsing output for `job`
    pub fn new(job: Job) -> Self {
        Self {
            job,
            started_at: Utc::now(),
            files: Vec::new(),
            positions: HashMap::new(),
            raw_log: Vec::new(),
            anomalies: Vec::new(),
            in_repair_verification: false,
        }
    }

    /// The job whose output is being parsed
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// File statuses seen so far
    pub fn files(&self) -> &[FileStatus] {
        &self.files
    }

    /// Consume one output line
    pub fn feed(&mut self, line: &str) {
        self.raw_log.push(line.to_string());
        let repair = self.job.operation == Operation::Repair;

        match parse_line(line) {
            Marker::Target(name, report) => self.apply(name, report),
            Marker::Misnamed(target) => self.apply(target, TargetReport::Damaged),
            Marker::RepairVerification if repair => self.in_repair_verification = true,
            Marker::RepairImpossible if repair => self.fail_damaged(),
            Marker::Malformed(reason) => {
                let line_number = self.raw_log.len();
                debug!(
                    job = %self.job.base_name,
                    line_number,
                    line,
                    reason,
                    "unrecognised status line"
                );
                self.anomalies.push(ParseAnomaly {
                    line_number,
                    line: line.to_string(),
                    reason: reason.to_string(),
                });
            }
            _ => {}
        }
    }

    /// Finalize the result with the process exit code
    pub fn finish(mut self, exit_code: Option<i32>) -> JobResult {
        let exit = ExitStatus::classify(self.job.operation, exit_code);

        if self.job.operation == Operation::Repair && exit.is_failure() {
            self.fail_damaged();
        }

        let overall_state = if exit.is_failure()
            || self.files.iter().any(|f| f.state == FileState::Failed)
        {
            JobState::Failed
        } else if self.files.iter().any(|f| f.state == FileState::Repaired) {
            JobState::Repaired
        } else {
            JobState::Ok
        };

        JobResult {
            job: self.job,
            overall_state,
            files: self.files,
            raw_log: self.raw_log,
            exit_code,
            anomalies: self.anomalies,
            error: None,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    fn apply(&mut self, name: &str, report: TargetReport) {
        let path = PathBuf::from(name);
        let current = self.positions.get(&path).map(|&i| self.files[i].state);

        let next = match (report, current, self.in_repair_verification) {
            // Post-repair verification decides the fate of damaged files
            (TargetReport::Found, Some(s), true) if s.is_damaged() => FileState::Repaired,
            (TargetReport::Missing | TargetReport::Damaged, Some(s), true) if s.is_damaged() => {
                FileState::Failed
            }
            // A plain sighting never upgrades a known state
            (TargetReport::Found, Some(s), _) => s,
            (TargetReport::Found, None, _) => FileState::Ok,
            // Terminal states stay put
            (_, Some(s @ (FileState::Failed | FileState::Repaired)), _) => s,
            (TargetReport::Missing, _, _) => FileState::Missing,
            (TargetReport::Damaged, _, _) => FileState::NeedsRepair,
        };

        match self.positions.get(&path) {
            Some(&i) => self.files[i].state = next,
            None => {
                self.positions.insert(path.clone(), self.files.len());
                self.files.push(FileStatus { path, state: next });
            }
        }
    }

    fn fail_damaged(&mut self) {
        for file in &mut self.files {
            if file.state.is_damaged() {
                file.state = FileState::Failed;
            }
        }
    }
}

/// Parse a complete transcript in one go
pub fn parse_output<'a>(
    job: Job,
    lines: impl IntoIterator<Item = &'a str>,
    exit_code: Option<i32>,
) -> JobResult {
    let mut parser = OutputParser::new(job);
    for line in lines {
        parser.feed(line);
    }
    parser.finish(exit_code)
}
