//! End-to-end runs through the orchestrator with a scripted tool
//!
//! Every test plans real jobs from a scratch directory, then replays
//! recorded par2cmdline transcripts instead of spawning the binary.

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{
    CREATE_SUCCESS, REPAIR_INSUFFICIENT, REPAIR_SUCCESS, Script, ScriptedRunner, VERIFY_DAMAGED,
    VERIFY_INTACT, album, touch,
};
use par2guard::{
    Config, Event, FileState, JobOutcome, JobState, Operation, Orchestrator, ProcessRunner,
};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

fn orchestrator(runner: Arc<ScriptedRunner>) -> Orchestrator {
    Orchestrator::with_runner(Config::default(), "par2", runner as Arc<dyn ProcessRunner>)
        .unwrap()
}

/// Three folders holding one parity set each: AlbumX, AlbumY, AlbumZ
fn three_sets(root: &TempDir) -> Vec<PathBuf> {
    let mut selection = Vec::new();
    for name in ["AlbumX", "AlbumY", "AlbumZ"] {
        let dir = album(root.path(), name, &["01 - Intro.flac"]);
        touch(&dir, &format!("{}.par2", name));
        touch(&dir, &format!("{}.vol00+01.par2", name));
        selection.push(dir);
    }
    selection
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn verify_run_counts_each_set_once() {
    let root = TempDir::new().unwrap();
    let selection = three_sets(&root);
    let runner = ScriptedRunner::new(vec![
        Script::transcript(VERIFY_INTACT, 0),
        Script::transcript(VERIFY_DAMAGED, 1),
        Script::Output {
            lines: vec!["Main packet not found.".to_string()],
            exit_code: Some(2),
        },
    ]);
    let orch = orchestrator(runner.clone());

    let options = orch.resolve_options(Operation::Verify);
    let jobs = orch.plan(&selection, &options).unwrap();
    assert_eq!(jobs.len(), 3);

    let summary = orch.run(jobs, CancellationToken::new()).await.unwrap();

    assert!(!summary.incomplete);
    assert_eq!(summary.counts.ok, 1);
    assert_eq!(summary.counts.needs_repair, 1);
    assert_eq!(summary.counts.failed, 1);
    assert_eq!(summary.counts.total(), 3);

    let names: Vec<&str> = summary.results.iter().map(|r| r.job.base_name.as_str()).collect();
    assert_eq!(names, vec!["AlbumX", "AlbumY", "AlbumZ"]);

    // Exit code 1 from verify means "repair required", not a failure
    let damaged = &summary.results[1];
    assert_eq!(damaged.overall_state, JobState::Ok);
    assert_eq!(damaged.outcome(), JobOutcome::NeedsRepair);
    assert_eq!(damaged.count(FileState::Missing), 1);
    assert_eq!(damaged.count(FileState::NeedsRepair), 1);
    assert_eq!(damaged.count(FileState::Ok), 1);

    assert_eq!(summary.results[2].overall_state, JobState::Failed);
    assert_eq!(summary.failed_items(), vec!["AlbumZ"]);

    // Every invocation passes the set file after the end-of-options marker
    let calls = runner.calls();
    assert_eq!(calls.len(), 3);
    for (call, name) in calls.iter().zip(["AlbumX", "AlbumY", "AlbumZ"]) {
        assert_eq!(call.args()[0], OsString::from("v"));
        assert_eq!(call.operands(), &[OsString::from(format!("{}.par2", name))]);
        assert!(call.cwd().ends_with(name));
    }
}

#[tokio::test]
async fn repair_run_separates_repaired_from_failed() {
    let root = TempDir::new().unwrap();
    let selection: Vec<PathBuf> = three_sets(&root).into_iter().skip(1).collect();
    let runner = ScriptedRunner::new(vec![
        Script::transcript(REPAIR_SUCCESS, 0),
        Script::transcript(REPAIR_INSUFFICIENT, 2),
    ]);
    let orch = orchestrator(runner.clone());

    let options = orch.resolve_options(Operation::Repair);
    let jobs = orch.plan(&selection, &options).unwrap();
    let summary = orch.run(jobs, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.counts.repaired, 1);
    assert_eq!(summary.counts.failed, 1);

    let repaired = &summary.results[0];
    assert_eq!(repaired.overall_state, JobState::Repaired);
    assert_eq!(repaired.count(FileState::Repaired), 1);
    assert_eq!(repaired.count(FileState::Ok), 1);

    let failed = &summary.results[1];
    assert_eq!(failed.overall_state, JobState::Failed);
    assert_eq!(failed.count(FileState::Failed), 2);
    assert_eq!(failed.exit_code, Some(2));

    let text = summary.to_string();
    assert!(text.starts_with("──────── Repair Summary ────────\n"));
    assert!(text.contains("Repaired: 1\n"));
    assert!(text.contains("Failed: 1\n"));
    assert!(text.contains("Repaired items:\n- AlbumY\n"));
    assert!(text.contains("Failed items:\n- AlbumZ\n"));

    assert!(runner.calls().iter().all(|c| c.args()[0] == OsString::from("r")));
}

#[tokio::test]
async fn launch_failure_is_recorded_and_the_run_continues() {
    let root = TempDir::new().unwrap();
    let selection = three_sets(&root);
    let runner = ScriptedRunner::new(vec![
        Script::transcript(VERIFY_INTACT, 0),
        Script::LaunchFailure,
        Script::transcript(VERIFY_INTACT, 0),
    ]);
    let orch = orchestrator(runner.clone());

    let options = orch.resolve_options(Operation::Verify);
    let jobs = orch.plan(&selection, &options).unwrap();
    let summary = orch.run(jobs, CancellationToken::new()).await.unwrap();

    assert!(!summary.incomplete);
    assert_eq!(runner.calls().len(), 3);
    assert_eq!(summary.counts.ok, 2);
    assert_eq!(summary.counts.failed, 1);

    let broken = &summary.results[1];
    assert_eq!(broken.overall_state, JobState::Failed);
    assert!(broken.error.as_deref().unwrap().contains("scripted launch failure"));
    assert!(broken.message().starts_with("Error: "));
    assert!(broken.files.is_empty());
}

#[tokio::test]
async fn cancellation_stops_the_run_during_the_second_job() {
    let root = TempDir::new().unwrap();
    let selection = three_sets(&root);
    let runner = ScriptedRunner::new(vec![
        Script::transcript(VERIFY_INTACT, 0),
        Script::HangUntilCancelled {
            lines: vec!["Loading \"AlbumY.par2\".".to_string()],
        },
        Script::transcript(VERIFY_INTACT, 0),
    ]);
    let orch = orchestrator(runner.clone());
    let mut events = orch.subscribe();

    let options = orch.resolve_options(Operation::Verify);
    let jobs = orch.plan(&selection, &options).unwrap();
    let handle = orch.start(jobs).unwrap();

    // Cancel once the second job has started
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for the second job")
            .unwrap()
        {
            Event::JobStarted { index: 2, .. } => break,
            _ => continue,
        }
    }
    handle.cancel();

    let summary = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("run did not stop after cancellation")
        .unwrap();

    assert!(summary.incomplete);
    assert_eq!(summary.aborted.as_deref(), Some("AlbumY"));
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.jobs_total, 3);
    assert!(!summary.is_success());
    assert_eq!(runner.calls().len(), 2);

    let rest = drain(&mut events);
    assert!(rest.iter().any(|e| matches!(
        e,
        Event::JobAborted { index: 2, base_name } if base_name == "AlbumY"
    )));
    assert!(matches!(rest.last(), Some(Event::RunFinished { summary }) if summary.incomplete));
    assert!(summary.to_string().contains("Cancelled during: AlbumY (1 of 3 items finished)"));
}

#[tokio::test]
async fn create_plan_labels_discs_and_keeps_folder_archive_names() {
    let root = TempDir::new().unwrap();
    let selection = vec![
        album(root.path(), "AlbumX", &["a.flac", "b.flac"]),
        album(root.path(), "AlbumY - (Deluxe)", &["a.flac"]),
        album(root.path(), "Album CD1", &["01.flac"]),
        album(root.path(), "Album CD2", &["01.flac"]),
    ];
    let runner = ScriptedRunner::new(
        (0..4).map(|_| Script::transcript(CREATE_SUCCESS, 0)).collect(),
    );
    let orch = orchestrator(runner.clone());

    let options = orch.resolve_options(Operation::Create);
    let jobs = orch.plan(&selection, &options).unwrap();
    let names: Vec<&str> = jobs.iter().map(|j| j.base_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Album – disc 1", "Album – disc 2", "AlbumX", "AlbumY - (Deluxe)"]
    );
    assert!(orch.preflight(&jobs).unwrap().is_empty());

    let summary = orch.run(jobs, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.counts.ok, 4);
    assert!(summary.is_success());

    let calls = runner.calls();
    assert_eq!(calls[0].args()[0], OsString::from("c"));
    assert_eq!(calls[0].operands()[0], OsString::from("Album CD1.par2"));
    assert_eq!(calls[0].operands()[1], OsString::from("01.flac"));
    assert_eq!(
        calls[3].operands(),
        &[OsString::from("AlbumY - (Deluxe).par2"), OsString::from("a.flac")]
    );
    assert!(calls[2].cwd().ends_with("AlbumX"));

    let text = summary.to_string();
    assert!(text.contains("Create Summary"));
    assert!(text.contains("Created: 4\n"));
}

#[tokio::test]
async fn preflight_reports_sets_that_would_be_overwritten() {
    let root = TempDir::new().unwrap();
    let dir = album(root.path(), "AlbumX", &["a.flac"]);
    touch(&dir, "AlbumX.par2");
    touch(&dir, "AlbumX.vol00+01.par2");
    let orch = orchestrator(ScriptedRunner::new(Vec::new()));

    let options = orch.resolve_options(Operation::Create);
    let jobs = orch.plan(&[dir.clone()], &options).unwrap();
    // Existing parity files are never inputs of a new set
    assert_eq!(jobs[0].input_files, vec![PathBuf::from("a.flac")]);

    let existing = orch.preflight(&jobs).unwrap();
    assert_eq!(existing.len(), 1);
    assert_eq!(existing[0].files.len(), 2);

    assert_eq!(orch.remove_existing(&existing).unwrap(), 2);
    assert!(orch.preflight(&jobs).unwrap().is_empty());
}

#[tokio::test]
async fn events_follow_the_run_lifecycle() {
    let root = TempDir::new().unwrap();
    let selection: Vec<PathBuf> = three_sets(&root).into_iter().take(2).collect();
    let runner = ScriptedRunner::new(vec![
        Script::transcript(VERIFY_INTACT, 0),
        Script::transcript(VERIFY_DAMAGED, 1),
    ]);
    let orch = orchestrator(runner);
    let mut events = orch.subscribe();

    let options = orch.resolve_options(Operation::Verify);
    let jobs = orch.plan(&selection, &options).unwrap();
    orch.run(jobs, CancellationToken::new()).await.unwrap();

    let events = drain(&mut events);
    assert!(matches!(
        events.first(),
        Some(Event::RunStarted { operation: Operation::Verify, total_jobs: 2 })
    ));
    assert!(matches!(events.last(), Some(Event::RunFinished { .. })));

    // Structural events only, in order
    let skeleton: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            Event::JobStarted { index, .. } => Some(format!("start {}", index)),
            Event::JobFinished { index, outcome, .. } => {
                Some(format!("finish {} {:?}", index, outcome))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        skeleton,
        vec!["start 1", "finish 1 Ok", "start 2", "finish 2 NeedsRepair"]
    );

    // Without verbose only key lines are forwarded
    let lines: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            Event::LogLine { line, .. } => Some(line.as_str()),
            _ => None,
        })
        .collect();
    assert!(lines.iter().any(|l| l.contains("- missing.")));
    assert!(!lines.iter().any(|l| l.starts_with("Loaded ")));
}

#[tokio::test]
async fn verbose_forwards_every_line() {
    let root = TempDir::new().unwrap();
    let selection: Vec<PathBuf> = three_sets(&root).into_iter().take(1).collect();
    let orch = orchestrator(ScriptedRunner::new(vec![Script::transcript(VERIFY_INTACT, 0)]));
    orch.set_verbose(true);
    let mut events = orch.subscribe();

    let options = orch.resolve_options(Operation::Verify);
    let jobs = orch.plan(&selection, &options).unwrap();
    let summary = orch.run(jobs, CancellationToken::new()).await.unwrap();

    let forwarded = drain(&mut events)
        .iter()
        .filter(|e| matches!(e, Event::LogLine { .. }))
        .count();
    assert_eq!(forwarded, summary.results[0].raw_log.len());
    assert!(summary.results[0].raw_log.iter().any(|l| l.starts_with("Loaded ")));
}
