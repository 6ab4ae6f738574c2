//! Result envelope and its two renderers.
//!
//! Every handler answers through `respond` / `respond_plan`, which implement
//! the output contract in one place:
//!
//! - text mode: success is rendered for humans on stdout; an error is only
//!   returned, the dispatcher logs it.
//! - json mode: the full envelope (success or error) is written to stdout and
//!   the error is still returned so the dispatcher can pick the exit status.

use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::config::RunConfig;
use crate::context::ExecContext;
use crate::error::{Error, Hint, Result};
use crate::mode::Plan;
use crate::settings::OutputFormat;

pub const API_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "is_empty_details")]
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
}

fn is_empty_details(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
            hints: if err.hints.is_empty() {
                None
            } else {
                Some(err.hints.clone())
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub duration_ms: u64,
    pub trace_id: String,
    pub api_version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: Status,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(command: &str, data: T, metadata: Metadata) -> Self {
        Self {
            status: Status::Success,
            command: command.to_string(),
            data: Some(data),
            error: None,
            metadata,
            plan: None,
            dry_run: None,
        }
    }

    pub fn with_plan(mut self, plan: Option<Plan>) -> Self {
        self.plan = plan;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize response".to_string()))
        })
    }
}

impl Envelope<Value> {
    pub fn from_error(command: &str, err: &Error, metadata: Metadata) -> Self {
        Self {
            status: Status::Error,
            command: command.to_string(),
            data: None,
            error: Some(ErrorBody::from(err)),
            metadata,
            plan: None,
            dry_run: None,
        }
    }

    pub fn for_plan(command: &str, plan: Plan, dry_run: bool, metadata: Metadata) -> Self {
        Self {
            status: Status::Success,
            command: command.to_string(),
            data: None,
            error: None,
            metadata,
            plan: Some(plan),
            dry_run: Some(dry_run),
        }
    }
}

/// Human rendering of a handler's result data. The default prints the data
/// as indented JSON.
pub trait TextReport: Serialize {
    fn render_text(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl TextReport for Value {}

pub fn metadata(ctx: &ExecContext, started: Instant) -> Metadata {
    Metadata {
        duration_ms: started.elapsed().as_millis() as u64,
        trace_id: ctx.trace_id().to_string(),
        api_version: API_VERSION,
    }
}

/// Render a handler outcome according to the configured output format.
pub fn respond<T: TextReport>(
    ctx: &ExecContext,
    cfg: &RunConfig,
    command: &str,
    started: Instant,
    result: Result<T>,
    plan: Option<Plan>,
) -> Result<()> {
    let meta = metadata(ctx, started);
    match (cfg.settings.format, result) {
        (OutputFormat::Json, Ok(data)) => {
            let envelope = Envelope::success(command, data, meta).with_plan(plan);
            ctx.console().out_line(&envelope.to_json()?)
        }
        (OutputFormat::Json, Err(err)) => {
            let envelope = Envelope::from_error(command, &err, meta);
            ctx.console().out_line(&envelope.to_json()?)?;
            Err(err)
        }
        (OutputFormat::Text, Ok(data)) => {
            ctx.console().out_line(&data.render_text())?;
            ctx.console().out_line(&format!(
                "{} completed in {}ms",
                command, meta.duration_ms
            ))
        }
        (OutputFormat::Text, Err(err)) => Err(err),
    }
}

/// Render a plan for a preview mode that stops before execution.
pub fn respond_plan(
    ctx: &ExecContext,
    cfg: &RunConfig,
    command: &str,
    started: Instant,
    plan: Plan,
    dry_run: bool,
) -> Result<()> {
    match cfg.settings.format {
        OutputFormat::Json => {
            let envelope = Envelope::for_plan(command, plan, dry_run, metadata(ctx, started));
            ctx.console().out_line(&envelope.to_json()?)
        }
        OutputFormat::Text => {
            let label = if dry_run { "dry-run" } else { "plan-only" };
            ctx.console().out_line(&format!("[{}] {}", label, plan.render_text()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::settings::Settings;

    #[derive(Serialize)]
    struct Sample {
        applied: u32,
    }

    impl TextReport for Sample {
        fn render_text(&self) -> String {
            format!("applied {} change(s)", self.applied)
        }
    }

    fn cfg(format: OutputFormat) -> RunConfig {
        RunConfig {
            settings: Settings {
                format,
                ..Settings::default()
            },
            ..RunConfig::default()
        }
    }

    fn ctx() -> ExecContext {
        ExecContext::with_console(Console::captured())
    }

    #[test]
    fn json_success_envelope_shape() {
        let ctx = ctx();
        respond(&ctx, &cfg(OutputFormat::Json), "db-update", Instant::now(), Ok(Sample { applied: 3 }), None)
            .unwrap();

        let value: Value = serde_json::from_str(&ctx.console().out_text()).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["command"], "db-update");
        assert_eq!(value["data"]["applied"], 3);
        assert_eq!(value["metadata"]["api_version"], API_VERSION);
        assert_eq!(value["metadata"]["trace_id"], ctx.trace_id());
        assert!(value.get("error").is_none());
        assert!(value.get("plan").is_none());
        assert!(value.get("dry_run").is_none());
    }

    #[test]
    fn json_error_is_printed_and_returned() {
        let ctx = ctx();
        let err = Error::command_not_found("nope");
        let returned = respond::<Sample>(&ctx, &cfg(OutputFormat::Json), "x", Instant::now(), Err(err), None)
            .unwrap_err();

        assert_eq!(returned.code.as_str(), "command.not_found");
        let value: Value = serde_json::from_str(&ctx.console().out_text()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], "command.not_found");
        assert!(value["error"]["hints"].is_array());
    }

    #[test]
    fn text_error_is_only_returned() {
        let ctx = ctx();
        let err = Error::internal_unexpected("boom");
        assert!(respond::<Sample>(&ctx, &cfg(OutputFormat::Text), "x", Instant::now(), Err(err), None).is_err());
        assert_eq!(ctx.console().out_text(), "");
        assert_eq!(ctx.console().err_text(), "");
    }

    #[test]
    fn text_success_uses_report_rendering() {
        let ctx = ctx();
        respond(&ctx, &cfg(OutputFormat::Text), "db-update", Instant::now(), Ok(Sample { applied: 2 }), None)
            .unwrap();
        assert!(ctx.console().out_text().starts_with("applied 2 change(s)\n"));
    }

    #[test]
    fn plan_envelope_carries_dry_run_flag() {
        let ctx = ctx();
        let plan = Plan::builder("db-update").check("config", Ok(())).build();
        respond_plan(&ctx, &cfg(OutputFormat::Json), "db-update", Instant::now(), plan, true).unwrap();

        let value: Value = serde_json::from_str(&ctx.console().out_text()).unwrap();
        assert_eq!(value["dry_run"], true);
        assert_eq!(value["plan"]["command"], "db-update");
        assert_eq!(value["plan"]["validation_passed"], true);
        assert!(value.get("data").is_none());
    }
}
