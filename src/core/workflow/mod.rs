//! Sequential staged-workflow engine.
//!
//! A workflow is an ordered slice of `StageSpec`s run against one mutable
//! state value. The engine records a `StageResult` per attempted or skipped
//! stage, stops at the first failure, and refuses to start a mutating stage
//! before a backup stage has succeeded. Completed stages are never undone.

mod cleanup;

pub use cleanup::CleanupStack;

use std::time::Instant;

use serde::Serialize;

use crate::context::ExecContext;
use crate::error::{Error, ErrorCode, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    Work,
    /// Success unlocks mutating stages.
    Backup,
}

/// What a stage reports when it returns normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Done,
    Skipped(String),
}

pub type StageFn<S> = fn(&ExecContext, &mut S) -> Result<StageStatus>;

pub struct StageSpec<S> {
    pub name: &'static str,
    pub mutates: bool,
    pub role: StageRole,
    /// Code of the error returned when this stage fails.
    pub failure_code: ErrorCode,
    pub run: StageFn<S>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of one engine run. `failure` is set when the run stopped early.
#[derive(Debug, Default)]
pub struct WorkflowRun {
    pub results: Vec<StageResult>,
    pub current_stage: Option<&'static str>,
    pub failure: Option<Error>,
}

impl WorkflowRun {
    /// Names of stages that ran to completion (skipped stages excluded).
    pub fn completed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.success && !r.skipped)
            .map(|r| r.name.as_str())
            .collect()
    }
}

pub fn run<S>(ctx: &ExecContext, stages: &[StageSpec<S>], state: &mut S) -> WorkflowRun {
    let mut outcome = WorkflowRun::default();
    let mut backup_done = false;

    for spec in stages {
        outcome.current_stage = Some(spec.name);

        if let Err(err) = ctx.check() {
            outcome.failure = Some(err);
            break;
        }

        if spec.mutates && !backup_done {
            let err = Error::new(
                spec.failure_code,
                format!("Stage '{}' would modify the target before a backup exists", spec.name),
                serde_json::json!({ "stage": spec.name }),
            )
            .with_hint("Run the workflow from the start so the backup stage executes first");
            outcome.results.push(failed(spec.name, 0, &err));
            outcome.failure = Some(err);
            break;
        }

        let started = Instant::now();
        log_status!("workflow", "{} ...", spec.name);
        let result = (spec.run)(ctx, state);
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(StageStatus::Done) => {
                log_status!("workflow", "{} done ({}ms)", spec.name, duration_ms);
                if spec.role == StageRole::Backup {
                    backup_done = true;
                }
                outcome.results.push(StageResult {
                    name: spec.name.to_string(),
                    success: true,
                    duration_ms,
                    error: None,
                    skipped: false,
                    reason: None,
                });
            }
            Ok(StageStatus::Skipped(reason)) => {
                log_status!("workflow", "{} skipped: {}", spec.name, reason);
                outcome.results.push(StageResult {
                    name: spec.name.to_string(),
                    success: true,
                    duration_ms,
                    error: None,
                    skipped: true,
                    reason: Some(reason),
                });
            }
            Err(cause) => {
                let err = classify_failure(ctx, spec, cause);
                log_status!("workflow", "{} failed: {}", spec.name, err.message);
                outcome.results.push(failed(spec.name, duration_ms, &err));
                outcome.failure = Some(err);
                break;
            }
        }
    }

    outcome
}

fn failed(name: &str, duration_ms: u64, err: &Error) -> StageResult {
    StageResult {
        name: name.to_string(),
        success: false,
        duration_ms,
        error: Some(err.message.clone()),
        skipped: false,
        reason: None,
    }
}

/// Timeout and cancellation keep their own codes even when they surface as
/// a tool failure (the tool was killed); anything else gets the stage code.
fn classify_failure<S>(ctx: &ExecContext, spec: &StageSpec<S>, cause: Error) -> Error {
    if matches!(
        cause.code,
        ErrorCode::WorkflowTimeout | ErrorCode::WorkflowCancelled
    ) {
        return cause.with_detail("stage", spec.name);
    }
    if let Some(reason) = ctx.state() {
        return ctx.error_for(reason).with_detail("stage", spec.name);
    }
    if cause.code == spec.failure_code {
        return cause.with_detail("stage", spec.name);
    }
    Error::tagged(
        spec.failure_code,
        format!("Stage '{}' failed: {}", spec.name, cause.message),
        &cause,
    )
    .with_detail("stage", spec.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use std::time::Duration;

    #[derive(Default)]
    struct Trace {
        ran: Vec<&'static str>,
    }

    fn ok_a(_: &ExecContext, t: &mut Trace) -> Result<StageStatus> {
        t.ran.push("a");
        Ok(StageStatus::Done)
    }

    fn ok_backup(_: &ExecContext, t: &mut Trace) -> Result<StageStatus> {
        t.ran.push("backup");
        Ok(StageStatus::Done)
    }

    fn failing_backup(_: &ExecContext, t: &mut Trace) -> Result<StageStatus> {
        t.ran.push("backup");
        Err(Error::internal_unexpected("disk full"))
    }

    fn skipped_backup(_: &ExecContext, t: &mut Trace) -> Result<StageStatus> {
        t.ran.push("backup");
        Ok(StageStatus::Skipped("not needed".to_string()))
    }

    fn mutate(_: &ExecContext, t: &mut Trace) -> Result<StageStatus> {
        t.ran.push("mutate");
        Ok(StageStatus::Done)
    }

    fn slow(ctx: &ExecContext, t: &mut Trace) -> Result<StageStatus> {
        t.ran.push("slow");
        std::thread::sleep(Duration::from_millis(30));
        ctx.check()?;
        Ok(StageStatus::Done)
    }

    fn spec(
        name: &'static str,
        mutates: bool,
        role: StageRole,
        run: StageFn<Trace>,
    ) -> StageSpec<Trace> {
        StageSpec {
            name,
            mutates,
            role,
            failure_code: ErrorCode::InternalUnexpected,
            run,
        }
    }

    fn ctx() -> ExecContext {
        ExecContext::with_console(Console::captured())
    }

    #[test]
    fn runs_all_stages_in_order() {
        let stages = [
            spec("a", false, StageRole::Work, ok_a),
            spec("backup", false, StageRole::Backup, ok_backup),
            spec("mutate", true, StageRole::Work, mutate),
        ];
        let mut trace = Trace::default();
        let run = run(&ctx(), &stages, &mut trace);

        assert!(run.failure.is_none());
        assert_eq!(trace.ran, vec!["a", "backup", "mutate"]);
        assert_eq!(run.completed(), vec!["a", "backup", "mutate"]);
        assert_eq!(run.current_stage, Some("mutate"));
    }

    #[test]
    fn backup_failure_stops_before_mutation() {
        let stages = [
            spec("backup", false, StageRole::Backup, failing_backup),
            spec("mutate", true, StageRole::Work, mutate),
        ];
        let mut trace = Trace::default();
        let run = run(&ctx(), &stages, &mut trace);

        assert_eq!(trace.ran, vec!["backup"]);
        assert_eq!(run.results.len(), 1);
        assert!(!run.results[0].success);
        assert_eq!(run.failure.unwrap().details["stage"], "backup");
    }

    #[test]
    fn mutating_stage_without_backup_is_refused() {
        let stages = [
            spec("backup", false, StageRole::Backup, skipped_backup),
            spec("mutate", true, StageRole::Work, mutate),
        ];
        let mut trace = Trace::default();
        let run = run(&ctx(), &stages, &mut trace);

        assert_eq!(trace.ran, vec!["backup"]);
        assert_eq!(run.results.len(), 2);
        assert!(run.results[0].skipped);
        assert!(!run.results[1].success);
        assert!(run.failure.is_some());
    }

    #[test]
    fn expired_deadline_is_reported_as_timeout() {
        let stages = [
            spec("slow", false, StageRole::Work, slow),
            spec("a", false, StageRole::Work, ok_a),
        ];
        let ctx = ctx().with_timeout(Duration::from_millis(5));
        let mut trace = Trace::default();
        let run = run(&ctx, &stages, &mut trace);

        let err = run.failure.unwrap();
        assert_eq!(err.code, ErrorCode::WorkflowTimeout);
        assert_eq!(err.details["stage"], "slow");
        assert_eq!(trace.ran, vec!["slow"]);
    }

    #[test]
    fn cancellation_before_a_stage_stops_the_run() {
        let stages = [spec("a", false, StageRole::Work, ok_a)];
        let ctx = ctx();
        ctx.cancel();
        let mut trace = Trace::default();
        let run = run(&ctx, &stages, &mut trace);

        assert_eq!(run.failure.unwrap().code, ErrorCode::WorkflowCancelled);
        assert!(trace.ran.is_empty());
        assert!(run.results.is_empty());
    }
}
