//! Pipeline composer: runs registered commands in sequence with shared state.
//!
//! Each stage names one registered command plus optional hooks. A stage can
//! be skipped by its predicate or by the skip-list; skipped stages never
//! block later ones. The first failing stage aborts the pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::RunConfig;
use crate::context::ExecContext;
use crate::error::{Error, ErrorCode, Result};
use crate::mode::{ModeFlags, Plan};
use crate::registry::Registry;
use crate::response::TextReport;
use crate::settings::OutputFormat;

pub type ShouldRun = Box<dyn Fn(&PipelineContext) -> bool + Send + Sync>;
pub type BeforeRun = Box<dyn Fn(&mut PipelineContext) -> Result<()> + Send + Sync>;
pub type AfterRun = Box<dyn Fn(&mut PipelineContext, &Value) -> Result<()> + Send + Sync>;

/// State shared by the stages of one pipeline run.
pub struct PipelineContext {
    pub shared_config: RunConfig,
    results: BTreeMap<String, Value>,
}

impl PipelineContext {
    pub fn new(shared_config: RunConfig) -> Self {
        Self {
            shared_config,
            results: BTreeMap::new(),
        }
    }

    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| {
            Error::internal_json(e.to_string(), Some("store pipeline value".to_string()))
        })?;
        self.results.insert(key.into(), value);
        Ok(())
    }

    /// `None` when the key is absent or holds a value of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.results
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.results.contains_key(key)
    }
}

pub struct PipelineStage {
    pub name: String,
    pub command: String,
    should_run: Option<ShouldRun>,
    skip_reason: String,
    before_run: Option<BeforeRun>,
    after_run: Option<AfterRun>,
}

impl PipelineStage {
    /// A stage named after the command it runs.
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            name: command.clone(),
            command,
            should_run: None,
            skip_reason: "condition not met".to_string(),
            before_run: None,
            after_run: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn should_run<F>(mut self, reason: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&PipelineContext) -> bool + Send + Sync + 'static,
    {
        self.should_run = Some(Box::new(predicate));
        self.skip_reason = reason.into();
        self
    }

    pub fn before_run<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut PipelineContext) -> Result<()> + Send + Sync + 'static,
    {
        self.before_run = Some(Box::new(hook));
        self
    }

    pub fn after_run<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut PipelineContext, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.after_run = Some(Box::new(hook));
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.should_run.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub name: String,
    pub command: String,
    pub success: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub pipeline: String,
    pub stages: Vec<StageOutcome>,
    pub executed: usize,
    pub skipped: usize,
}

impl TextReport for PipelineReport {
    fn render_text(&self) -> String {
        let mut out = format!(
            "Pipeline '{}': {} executed, {} skipped\n",
            self.pipeline, self.executed, self.skipped
        );
        for stage in &self.stages {
            match (&stage.reason, stage.skipped) {
                (Some(reason), true) => {
                    out.push_str(&format!("  [-] {} (skipped: {})\n", stage.name, reason))
                }
                _ => out.push_str(&format!("  [ok] {} ({}ms)\n", stage.name, stage.duration_ms)),
            }
        }
        out.trim_end().to_string()
    }
}

pub const SKIP_LIST_REASON: &str = "listed in skip stages";

pub struct Pipeline {
    pub name: String,
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: PipelineStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// One step per stage; no hook or command runs.
    pub fn plan(&self, registry: &Registry, skip: &BTreeSet<String>) -> Plan {
        let mut builder = Plan::builder(&self.name);
        for stage in &self.stages {
            let mut params = vec![("command", stage.command.clone())];
            if skip.contains(&stage.name) {
                params.push(("skipped", SKIP_LIST_REASON.to_string()));
            } else if stage.is_conditional() {
                params.push(("runs_when", stage.skip_reason.clone()));
            }
            builder = builder.step(&stage.name, params, vec![format!("run '{}'", stage.command)]);
        }
        for stage in &self.stages {
            let outcome = if registry.contains(&stage.command) {
                Ok(())
            } else {
                Err(format!("command '{}' is not registered", stage.command))
            };
            builder = builder.check(format!("stage {}", stage.name), outcome);
        }
        builder
            .summary(format!("Run {} stage(s) of '{}'", self.stages.len(), self.name))
            .build()
    }

    /// Run every stage in order under one context.
    pub fn run(
        &self,
        ctx: &ExecContext,
        registry: &Registry,
        cfg: &RunConfig,
        skip: &BTreeSet<String>,
    ) -> Result<PipelineReport> {
        let mut pctx = PipelineContext::new(cfg.clone());
        let mut outcomes: Vec<StageOutcome> = Vec::new();

        for stage in &self.stages {
            let started = Instant::now();

            if skip.contains(&stage.name) {
                log_status!("pipeline", "{} skipped ({})", stage.name, SKIP_LIST_REASON);
                outcomes.push(skipped(stage, SKIP_LIST_REASON));
                continue;
            }
            if let Some(predicate) = &stage.should_run {
                if !predicate(&pctx) {
                    log_status!("pipeline", "{} skipped ({})", stage.name, stage.skip_reason);
                    outcomes.push(skipped(stage, &stage.skip_reason));
                    continue;
                }
            }

            log_status!("pipeline", "{} ...", stage.name);
            match self.run_stage(ctx, registry, stage, &mut pctx) {
                Ok(()) => outcomes.push(StageOutcome {
                    name: stage.name.clone(),
                    command: stage.command.clone(),
                    success: true,
                    skipped: false,
                    reason: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                }),
                Err(cause) => {
                    log_status!("pipeline", "{} failed: {}", stage.name, cause.message);
                    outcomes.push(StageOutcome {
                        name: stage.name.clone(),
                        command: stage.command.clone(),
                        success: false,
                        skipped: false,
                        reason: None,
                        duration_ms: started.elapsed().as_millis() as u64,
                        error: Some(cause.message.clone()),
                    });
                    return Err(self.stage_error(stage, cause, outcomes));
                }
            }
        }

        let skipped_count = outcomes.iter().filter(|o| o.skipped).count();
        Ok(PipelineReport {
            pipeline: self.name.clone(),
            executed: outcomes.len() - skipped_count,
            skipped: skipped_count,
            stages: outcomes,
        })
    }

    fn run_stage(
        &self,
        ctx: &ExecContext,
        registry: &Registry,
        stage: &PipelineStage,
        pctx: &mut PipelineContext,
    ) -> Result<()> {
        ctx.check()?;
        let handler = registry
            .get(&stage.command)
            .ok_or_else(|| Error::command_not_found(&stage.command))?;

        if let Some(hook) = &stage.before_run {
            hook(pctx)?;
        }

        // The child answers in JSON into a private buffer so its data can be
        // handed to the next hook; its diagnostics still reach our stderr.
        let child_ctx = ctx.with_child_console(ctx.console().capture_out());
        let child_cfg = child_config(&pctx.shared_config);
        handler.execute(&child_ctx, &child_cfg)?;

        let data = envelope_data(&child_ctx.console().out_text());
        if let Some(hook) = &stage.after_run {
            hook(pctx, &data)?;
        }
        Ok(())
    }

    fn stage_error(&self, stage: &PipelineStage, cause: Error, outcomes: Vec<StageOutcome>) -> Error {
        let err = match cause.code {
            ErrorCode::WorkflowTimeout | ErrorCode::WorkflowCancelled => cause,
            _ => Error::tagged(
                ErrorCode::PipelineStageFailed,
                format!(
                    "Pipeline '{}' failed at stage '{}': {}",
                    self.name, stage.name, cause.message
                ),
                &cause,
            ),
        };
        err.with_detail("pipeline", &self.name)
            .with_detail("stage", &stage.name)
            .with_detail("command", &stage.command)
            .with_detail("outcomes", outcomes)
    }
}

fn skipped(stage: &PipelineStage, reason: &str) -> StageOutcome {
    StageOutcome {
        name: stage.name.clone(),
        command: stage.command.clone(),
        success: true,
        skipped: true,
        reason: Some(reason.to_string()),
        duration_ms: 0,
        error: None,
    }
}

/// Children always execute for real and answer in JSON; previews are the
/// pipeline's business.
fn child_config(shared: &RunConfig) -> RunConfig {
    let mut cfg = shared.clone();
    cfg.settings.format = OutputFormat::Json;
    cfg.settings.flags = ModeFlags::default();
    cfg
}

/// The `data` member of the last envelope a child printed.
fn envelope_data(stdout: &str) -> Value {
    serde_json::from_str::<Value>(stdout.trim())
        .ok()
        .and_then(|mut v| v.get_mut("data").map(Value::take))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_round_trips_typed_values() {
        let mut pctx = PipelineContext::new(RunConfig::default());
        pctx.insert("switched", true).unwrap();
        pctx.insert("stages", vec!["a", "b"]).unwrap();

        assert_eq!(pctx.get::<bool>("switched"), Some(true));
        assert_eq!(pctx.get::<Vec<String>>("stages").unwrap(), vec!["a", "b"]);
        assert_eq!(pctx.get::<bool>("stages"), None);
        assert_eq!(pctx.get::<bool>("missing"), None);
        assert!(pctx.contains("switched"));
    }

    #[test]
    fn envelope_data_extraction() {
        assert_eq!(
            envelope_data(r#"{"status":"success","data":{"enabled":true}}"#),
            serde_json::json!({"enabled": true})
        );
        assert_eq!(envelope_data("not json"), Value::Null);
        assert_eq!(envelope_data(r#"{"status":"success"}"#), Value::Null);
    }

    #[test]
    fn child_config_forces_json_and_real_execution() {
        let mut shared = RunConfig::default();
        shared.settings.flags.dry_run = true;
        let child = child_config(&shared);
        assert_eq!(child.settings.format, OutputFormat::Json);
        assert_eq!(child.settings.flags, ModeFlags::default());
    }

    #[test]
    fn plan_marks_skipped_and_unregistered_stages() {
        let pipeline = Pipeline::new("p")
            .stage(PipelineStage::new("one"))
            .stage(PipelineStage::new("two"));
        let skip: BTreeSet<String> = ["two".to_string()].into_iter().collect();
        let plan = pipeline.plan(&Registry::new(), &skip);

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].parameters["skipped"], SKIP_LIST_REASON);
        assert!(!plan.validation_passed);
    }
}
