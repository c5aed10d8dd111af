//! Run-level accumulation of job results
//!
//! [`RunAggregator`] owns the [`RunSummary`] while a run is in progress and
//! is the only thing that mutates it. Callers receive the summary by value
//! once the run is finalized.

use crate::types::{JobOutcome, JobResult, Operation, RunSummary};
use chrono::Utc;
use std::fmt;
use tracing::debug;

/// Accumulates finished jobs into a [`RunSummary`]
#[derive(Debug)]
pub struct RunAggregator {
    summary: RunSummary,
}

impl RunAggregator {
    /// Start an empty summary for a run of `jobs_total` jobs
    pub fn new(operation: Operation, jobs_total: usize) -> Self {
        Self {
            summary: RunSummary {
                operation,
                jobs_total,
                counts: Default::default(),
                results: Vec::new(),
                incomplete: false,
                aborted: None,
                started_at: Utc::now(),
                finished_at: None,
            },
        }
    }

    /// Read-only view of the summary so far
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Count a finished job and append its result
    ///
    /// Returns the outcome the job was counted under.
    pub fn record(&mut self, result: JobResult) -> JobOutcome {
        let outcome = result.outcome();
        self.summary.counts.add(outcome);
        debug!(
            job = %result.job.base_name,
            ?outcome,
            files = result.files.len(),
            "recorded job result"
        );
        self.summary.results.push(result);
        outcome
    }

    /// Freeze the summary
    ///
    /// `aborted` names the job that was in flight when the run was cancelled.
    /// A run is incomplete when it was cancelled or not every job finished.
    pub fn finish(mut self, aborted: Option<String>) -> RunSummary {
        self.summary.incomplete =
            aborted.is_some() || self.summary.results.len() < self.summary.jobs_total;
        self.summary.aborted = aborted;
        self.summary.finished_at = Some(Utc::now());
        self.summary
    }
}

/// Status bar text for the job about to run: `Verifying 2 / 5 items… (Album)`
pub fn progress_line(operation: Operation, index: usize, total: usize, base_name: &str) -> String {
    format!(
        "{} {} / {} items…  ({})",
        operation.action_label(),
        index,
        total,
        base_name
    )
}

const RULE_WIDTH: usize = 36;

fn write_items(f: &mut fmt::Formatter<'_>, heading: &str, items: &[&str]) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(f)?;
    writeln!(f, "{}:", heading)?;
    for item in items {
        writeln!(f, "- {}", item)?;
    }
    Ok(())
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        let failed = self.failed_items();

        match self.operation {
            Operation::Verify => {
                writeln!(f, "──────── Verification Summary ────────")?;
                writeln!(f, "Checked: {} items", c.total())?;
                writeln!(f, "OK: {}", c.ok)?;
                writeln!(f, "Require repair: {}", c.needs_repair)?;
                if c.failed > 0 {
                    writeln!(f, "Failed: {}", c.failed)?;
                }
                write_items(
                    f,
                    "Items requiring repair",
                    &self.items_with(JobOutcome::NeedsRepair),
                )?;
            }
            Operation::Repair => {
                writeln!(f, "──────── Repair Summary ────────")?;
                writeln!(f, "Processed: {} items", c.total())?;
                writeln!(f, "Repaired: {}", c.repaired)?;
                writeln!(f, "No repair needed: {}", c.ok)?;
                if c.needs_repair > 0 {
                    writeln!(f, "Unconfirmed: {}", c.needs_repair)?;
                }
                if c.failed > 0 {
                    writeln!(f, "Failed: {}", c.failed)?;
                }
                write_items(f, "Repaired items", &self.items_with(JobOutcome::Repaired))?;
                write_items(
                    f,
                    "Unconfirmed items",
                    &self.items_with(JobOutcome::NeedsRepair),
                )?;
            }
            Operation::Create => {
                writeln!(f, "──────── Create Summary ────────")?;
                writeln!(f, "Processed: {} items", c.total())?;
                writeln!(f, "Created: {}", c.total() - c.failed)?;
                if c.failed > 0 {
                    writeln!(f, "Failed: {}", c.failed)?;
                }
            }
        }

        write_items(f, "Failed items", &failed)?;

        if self.incomplete {
            writeln!(f)?;
            match &self.aborted {
                Some(name) => writeln!(
                    f,
                    "Cancelled during: {} ({} of {} items finished)",
                    name,
                    self.results.len(),
                    self.jobs_total
                )?,
                None => writeln!(
                    f,
                    "Incomplete: {} of {} items finished",
                    self.results.len(),
                    self.jobs_total
                )?,
            }
        }

        write!(f, "{}", "─".repeat(RULE_WIDTH))
    }
}
