//! Command handlers and the registration list.
//!
//! Every command is registered here, once, in `build_registry`. Handlers go
//! through `run_planned` / `run_unplanned`, which apply the preview mode, the
//! per-command timeout and the output contract.

pub mod convert;
pub mod db;
pub mod deploy;
pub mod repo_sync;
pub mod scan;
pub mod service_mode;
pub mod store;

use std::sync::{Arc, Weak};
use std::time::Instant;

use serde_json::Value;

use crate::config::RunConfig;
use crate::context::ExecContext;
use crate::error::{Error, ErrorCode, Result};
use crate::mode::{ExecutionMode, Plan};
use crate::platform::Platform;
use crate::registry::{Handler, Registry};
use crate::response::{respond, respond_plan, TextReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    RepoSync,
    ConvertConfig,
    StoreToDb,
    DbRestore,
    DbUpdate,
    ServiceModeEnable,
    ServiceModeDisable,
    ServiceModeStatus,
    ScanBranch,
    DeployPipeline,
}

impl CommandId {
    pub const ALL: [CommandId; 10] = [
        CommandId::RepoSync,
        CommandId::ConvertConfig,
        CommandId::StoreToDb,
        CommandId::DbRestore,
        CommandId::DbUpdate,
        CommandId::ServiceModeEnable,
        CommandId::ServiceModeDisable,
        CommandId::ServiceModeStatus,
        CommandId::ScanBranch,
        CommandId::DeployPipeline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandId::RepoSync => "repo-sync",
            CommandId::ConvertConfig => "convert-config",
            CommandId::StoreToDb => "store-to-db",
            CommandId::DbRestore => "db-restore",
            CommandId::DbUpdate => "db-update",
            CommandId::ServiceModeEnable => "service-mode-enable",
            CommandId::ServiceModeDisable => "service-mode-disable",
            CommandId::ServiceModeStatus => "service-mode-status",
            CommandId::ScanBranch => "scan-branch",
            CommandId::DeployPipeline => "deploy-pipeline",
        }
    }

    /// Name the command had before the kebab-case rename.
    pub fn legacy_name(&self) -> Option<&'static str> {
        match self {
            CommandId::RepoSync => Some("git2store"),
            CommandId::ConvertConfig => Some("convert"),
            CommandId::StoreToDb => Some("store2db"),
            CommandId::DbRestore => Some("dbrestore"),
            CommandId::DbUpdate => Some("dbupdate"),
            CommandId::ServiceModeEnable => Some("service_mode_enable"),
            CommandId::ServiceModeDisable => Some("service_mode_disable"),
            CommandId::ServiceModeStatus => Some("service_mode_status"),
            CommandId::ScanBranch => Some("sq-scan-branch"),
            CommandId::DeployPipeline => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CommandId::RepoSync => "Synchronise a repository branch into the configuration store",
            CommandId::ConvertConfig => "Convert configuration sources between formats",
            CommandId::StoreToDb => "Load the configuration store into the database",
            CommandId::DbRestore => "Back up the database, then restore it from a backup",
            CommandId::DbUpdate => "Apply the pending configuration update to the database",
            CommandId::ServiceModeEnable => "Enable service mode (block new sessions)",
            CommandId::ServiceModeDisable => "Disable service mode",
            CommandId::ServiceModeStatus => "Report whether service mode is on",
            CommandId::ScanBranch => "Clone a branch and run static analysis on it",
            CommandId::DeployPipeline => {
                "Enable service mode, load from store, update the database, disable service mode"
            }
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(CommandId::as_str).collect()
    }

    /// Look a command up by its primary or legacy name.
    pub fn resolve(name: &str) -> Option<CommandId> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == name || id.legacy_name() == Some(name))
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn handler_for(id: CommandId, platform: &Platform, registry: &Weak<Registry>) -> Arc<dyn Handler> {
    let platform = platform.clone();
    match id {
        CommandId::RepoSync => Arc::new(repo_sync::RepoSync::new(platform)),
        CommandId::ConvertConfig => Arc::new(convert::ConvertConfig::new(platform)),
        CommandId::StoreToDb => Arc::new(store::StoreToDb::new(platform)),
        CommandId::DbRestore => Arc::new(db::DbRestore::new(platform)),
        CommandId::DbUpdate => Arc::new(db::DbUpdate::new(platform)),
        CommandId::ServiceModeEnable => Arc::new(service_mode::ServiceModeEnable::new(platform)),
        CommandId::ServiceModeDisable => Arc::new(service_mode::ServiceModeDisable::new(platform)),
        CommandId::ServiceModeStatus => Arc::new(service_mode::ServiceModeStatus::new(platform)),
        CommandId::ScanBranch => Arc::new(scan::ScanBranch::new(platform)),
        CommandId::DeployPipeline => Arc::new(deploy::DeployPipeline::new(registry.clone())),
    }
}

/// Register every command, with its legacy alias where it has one.
pub fn build_registry(platform: Platform) -> Result<Arc<Registry>> {
    let registry = Arc::new(Registry::new());
    let weak = Arc::downgrade(&registry);
    for id in CommandId::ALL {
        let handler = handler_for(id, &platform, &weak);
        match id.legacy_name() {
            Some(alias) => registry.register_with_alias(handler, alias)?,
            None => registry.register(handler)?,
        }
    }
    Ok(registry)
}

pub fn plan_unsupported_notice(name: &str) -> String {
    format!(
        "INFO: command '{}' does not support plan-only mode; nothing was executed",
        name
    )
}

/// Execute a planning-capable command according to the effective mode.
///
/// Dry-run and plan-only render the plan and stop. Verbose writes the plan
/// to stderr, runs, and attaches the plan to the result.
pub fn run_planned<T, P, W>(ctx: &ExecContext, cfg: &RunConfig, name: &str, plan: P, work: W) -> Result<()>
where
    T: TextReport,
    P: FnOnce() -> Result<Plan>,
    W: FnOnce(&ExecContext) -> Result<T>,
{
    let started = Instant::now();
    let mode = cfg.settings.flags.effective_mode();

    let mut shown = None;
    if mode.renders_plan() {
        let plan = match plan() {
            Ok(plan) => plan,
            Err(err) => return respond::<Value>(ctx, cfg, name, started, Err(err), None),
        };
        if mode.stops_before_execution() {
            return respond_plan(ctx, cfg, name, started, plan, mode == ExecutionMode::DryRun);
        }
        ctx.console().err_line(&plan.render_text())?;
        shown = Some(plan);
    }

    let run_ctx = ctx.with_timeout(cfg.settings.timeouts.for_command(name));
    let result = work(&run_ctx);
    respond(ctx, cfg, name, started, result, shown)
}

/// Execute a command that cannot describe itself in advance. Preview modes
/// print a notice and run nothing.
pub fn run_unplanned<T, W>(ctx: &ExecContext, cfg: &RunConfig, name: &str, work: W) -> Result<()>
where
    T: TextReport,
    W: FnOnce(&ExecContext) -> Result<T>,
{
    let started = Instant::now();
    if cfg.settings.flags.effective_mode().stops_before_execution() {
        return ctx.console().err_line(&plan_unsupported_notice(name));
    }
    let run_ctx = ctx.with_timeout(cfg.settings.timeouts.for_command(name));
    let result = work(&run_ctx);
    respond(ctx, cfg, name, started, result, None)
}

/// Re-tag a collaborator failure with the command's own code. Timeouts,
/// cancellation and configuration problems keep their codes.
pub fn tag_failure(code: ErrorCode, what: &str) -> impl Fn(Error) -> Error + '_ {
    move |cause| match cause.code {
        ErrorCode::WorkflowTimeout
        | ErrorCode::WorkflowCancelled
        | ErrorCode::ConfigMissingKey
        | ErrorCode::ConfigInvalidValue
        | ErrorCode::ConfigParseFailed
        | ErrorCode::ValidationMissingArgument
        | ErrorCode::ValidationInvalidArgument
        | ErrorCode::ValidationInvalidUrl => cause,
        _ => Error::tagged(code, format!("{} failed: {}", what, cause.message), &cause),
    }
}

/// Turn plan checks into a hard precondition for execution.
pub fn require_checks(checks: Vec<(&'static str, Result<()>)>) -> Result<()> {
    for (_, outcome) in checks {
        outcome?;
    }
    Ok(())
}

/// Add precondition checks to a plan builder.
pub fn with_checks(
    mut builder: crate::mode::PlanBuilder,
    checks: Vec<(&'static str, Result<()>)>,
) -> crate::mode::PlanBuilder {
    for (name, outcome) in checks {
        builder = builder.check(name, outcome.map_err(|e| e.message));
    }
    builder
}
