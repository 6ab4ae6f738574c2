//! Repository to configuration-store synchronisation.
//!
//! Clones the configured branch into a temporary workspace, backs up the
//! target database, rebuilds the infobase from the checkout and commits the
//! merged result to the store. Runs on the generic `workflow` engine; the
//! same stage list produces the preview plan.

mod stages;

pub use stages::SyncStage;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{AppConfig, StorageMode};
use crate::context::ExecContext;
use crate::error::{Error, ErrorCode, Result};
use crate::mode::Plan;
use crate::platform::{BackupInfo, Infobase, Platform, ScratchDb};
use crate::response::TextReport;
use crate::utils::mask::{mask_secrets, mask_value};
use crate::utils::validation::{require_config, validate_repo_url};
use crate::workflow::{self, CleanupStack, StageResult, StageSpec, StageStatus};

/// Upper bound for each cleanup action once the run itself is over.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const DUMP_FILE: &str = "merged.cf";
const CHECKOUT_DIR: &str = "repo";

pub struct SyncState {
    app: Arc<AppConfig>,
    platform: Platform,
    cleanup_ctx: ExecContext,
    workspace: Option<PathBuf>,
    checkout: Option<PathBuf>,
    target: Infobase,
    backup: Option<BackupInfo>,
    scratch: Option<ScratchDb>,
    dump_file: Option<PathBuf>,
    cleanup: CleanupStack,
}

impl SyncState {
    fn new(app: Arc<AppConfig>, platform: Platform, cleanup_ctx: ExecContext) -> Self {
        let target = Infobase::from_config(&app.infobase);
        Self {
            app,
            platform,
            cleanup_ctx,
            workspace: None,
            checkout: None,
            target,
            backup: None,
            scratch: None,
            dump_file: None,
            cleanup: CleanupStack::new(),
        }
    }

    fn workspace(&self) -> Result<&Path> {
        self.workspace
            .as_deref()
            .ok_or_else(|| Error::internal_unexpected("workspace was not prepared"))
    }

    fn checkout(&self) -> Result<&Path> {
        self.checkout
            .as_deref()
            .ok_or_else(|| Error::internal_unexpected("repository was not cloned"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub branch: String,
    pub storage_mode: StorageMode,
    pub stages: Vec<StageResult>,
    pub stages_completed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupInfo>,
    /// Scratch database used for the run (already dropped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_database: Option<String>,
}

impl TextReport for SyncReport {
    fn render_text(&self) -> String {
        let mut out = format!(
            "Synchronised branch '{}' ({} stage(s) completed)\n",
            self.branch, self.stages_completed
        );
        for stage in &self.stages {
            let mark = if stage.skipped {
                "-"
            } else if stage.success {
                "ok"
            } else {
                "FAILED"
            };
            out.push_str(&format!("  [{}] {} ({}ms)\n", mark, stage.name, stage.duration_ms));
        }
        if let Some(backup) = &self.backup {
            out.push_str(&format!("  backup: {}", backup.path));
        }
        out.trim_end().to_string()
    }
}

/// Precondition checks shared by the validate stage and the plan.
pub fn precondition_checks(app: &AppConfig) -> Vec<(&'static str, Result<()>)> {
    let scratch = app.infobase.storage_mode == StorageMode::Scratch;
    let mut checks = vec![
        (
            "repository.url",
            validate_repo_url(&app.repository.url, "repository.url"),
        ),
        (
            "repository.branch",
            require_config(Some(app.repository.branch.as_str()), "repository.branch").map(|_| ()),
        ),
        (
            "store.path",
            require_config(Some(app.store.path.as_str()), "store.path").map(|_| ()),
        ),
        (
            "database.name",
            require_config(Some(app.database.name.as_str()), "database.name").map(|_| ()),
        ),
    ];
    if scratch {
        checks.push((
            "database.server",
            require_config(Some(app.database.server.as_str()), "database.server").map(|_| ()),
        ));
    } else {
        checks.push((
            "infobase.connection",
            require_config(Some(app.infobase.connection.as_str()), "infobase.connection").map(|_| ()),
        ));
    }
    checks
}

/// `https://host/x.git` + token becomes `https://oauth2:<token>@host/x.git`.
/// URLs that already carry credentials, or non-http remotes, are unchanged.
pub fn authenticated_url(url: &str, token: Option<&str>) -> String {
    let token = match token.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return url.to_string(),
    };
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority = rest.split('/').next().unwrap_or("");
    if !(scheme.eq_ignore_ascii_case("https") || scheme.eq_ignore_ascii_case("http"))
        || authority.contains('@')
    {
        return url.to_string();
    }
    format!("{}://oauth2:{}@{}", scheme, token, rest)
}

fn validate_config(_ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    for (_, outcome) in precondition_checks(&state.app) {
        outcome?;
    }
    Ok(StageStatus::Done)
}

/// Create a temporary working directory under `workspace.work_dir`, or the
/// system temp dir when that is unset.
pub fn temp_workspace(app: &AppConfig, prefix: &str) -> Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix);
    match app.workspace.work_dir.as_deref() {
        Some(parent) if !parent.trim().is_empty() => {
            let parent = crate::config::expand_path(parent);
            std::fs::create_dir_all(&parent).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("create {}", parent)))
            })?;
            builder.tempdir_in(&parent)
        }
        _ => builder.tempdir(),
    }
    .map_err(|e| Error::internal_io(e.to_string(), Some("create workspace".to_string())))
}

fn prepare_workspace(_ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    let dir = temp_workspace(&state.app, "stagehand-sync-")?;

    let path = dir.path().to_path_buf();
    log_status!("sync", "Workspace {}", path.display());
    state.cleanup.push(format!("remove workspace {}", path.display()), move || {
        dir.close()
            .map_err(|e| Error::internal_io(e.to_string(), Some("remove workspace".to_string())))
    });
    state.workspace = Some(path);
    Ok(StageStatus::Done)
}

fn clone_repository(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    let dest = state.workspace()?.join(CHECKOUT_DIR);
    let repo = &state.app.repository;
    let url = authenticated_url(&repo.url, repo.token.as_deref());
    state.platform.vcs.clone_repo(ctx, &url, &dest)?;
    state.checkout = Some(dest);
    Ok(StageStatus::Done)
}

fn select_branch(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    let checkout = state.checkout()?;
    let branch = state.app.repository.branch.as_str();
    state.platform.vcs.switch_branch(ctx, checkout, branch)?;

    let current = state.platform.vcs.current_branch(ctx, checkout)?;
    if current != branch {
        return Err(Error::validation_invalid_argument(
            "repository.branch",
            format!("checkout is on '{}' after switching to '{}'", current, branch),
            None,
            None,
        ));
    }
    Ok(StageStatus::Done)
}

fn backup(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    let info = state.platform.backups.create_backup(ctx, &state.app.database)?;
    log_status!("sync", "Backup written to {}", info.path);
    state.backup = Some(info);
    Ok(StageStatus::Done)
}

fn provision_scratch_db(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    if state.app.infobase.storage_mode != StorageMode::Scratch {
        return Ok(StageStatus::Skipped(
            "storage mode is not scratch".to_string(),
        ));
    }

    let scratch = state.platform.scratch.provision(ctx, &state.app.database)?;
    let provisioner = state.platform.scratch.clone();
    let cleanup_ctx = state.cleanup_ctx.with_timeout(CLEANUP_TIMEOUT);
    let db = state.app.database.clone();
    let to_drop = scratch.clone();
    state.cleanup.push(format!("drop scratch database {}", scratch.name), move || {
        provisioner.drop_database(&cleanup_ctx, &db, &to_drop)
    });

    state.target.connection = scratch.connection.clone();
    state.scratch = Some(scratch);
    Ok(StageStatus::Done)
}

fn init_database(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    state.platform.config.init(ctx, &state.target)?;
    Ok(StageStatus::Done)
}

fn unbind_store(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    state.platform.config.unbind(ctx, &state.target)?;
    Ok(StageStatus::Done)
}

fn load_source(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    let source = state.checkout()?.join(&state.app.repository.source_dir);
    state.platform.config.load(ctx, &state.target, &source)?;
    Ok(StageStatus::Done)
}

fn update_database(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    state.platform.config.update(ctx, &state.target)?;
    Ok(StageStatus::Done)
}

fn dump_config(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    let file = state.workspace()?.join(DUMP_FILE);
    state.platform.config.dump(ctx, &state.target, &file)?;
    state.dump_file = Some(file);
    Ok(StageStatus::Done)
}

fn bind_store(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    state.platform.config.bind(ctx, &state.target, &state.app.store)?;
    Ok(StageStatus::Done)
}

fn load_store_config(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    state
        .platform
        .config
        .load_to_db(ctx, &state.target, &state.app.store)?;
    Ok(StageStatus::Done)
}

fn lock_objects(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    state.platform.config.lock(ctx, &state.target, &state.app.store)?;
    Ok(StageStatus::Done)
}

fn merge_config(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    let file = state
        .dump_file
        .as_deref()
        .ok_or_else(|| Error::internal_unexpected("configuration was not dumped"))?;
    state.platform.config.merge(ctx, &state.target, file)?;
    Ok(StageStatus::Done)
}

fn apply_merged_config(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    state.platform.config.update(ctx, &state.target)?;
    Ok(StageStatus::Done)
}

fn commit_to_store(ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    let message = commit_message(&state.app);
    state
        .platform
        .config
        .commit(ctx, &state.target, &state.app.store, &message)?;
    Ok(StageStatus::Done)
}

fn finalize(_ctx: &ExecContext, state: &mut SyncState) -> Result<StageStatus> {
    log_status!(
        "sync",
        "Branch '{}' committed to {}",
        state.app.repository.branch,
        mask_secrets(&state.app.store.path)
    );
    Ok(StageStatus::Done)
}

pub fn commit_message(app: &AppConfig) -> String {
    format!(
        "Synchronised from {} ({})",
        app.repository.branch,
        mask_secrets(&app.repository.url)
    )
}

fn stage_fn(stage: SyncStage) -> workflow::StageFn<SyncState> {
    match stage {
        SyncStage::ValidateConfig => validate_config,
        SyncStage::PrepareWorkspace => prepare_workspace,
        SyncStage::CloneRepository => clone_repository,
        SyncStage::SelectBranch => select_branch,
        SyncStage::Backup => backup,
        SyncStage::ProvisionScratchDb => provision_scratch_db,
        SyncStage::InitDatabase => init_database,
        SyncStage::UnbindStore => unbind_store,
        SyncStage::LoadSource => load_source,
        SyncStage::UpdateDatabase => update_database,
        SyncStage::DumpConfig => dump_config,
        SyncStage::BindStore => bind_store,
        SyncStage::LoadStoreConfig => load_store_config,
        SyncStage::LockObjects => lock_objects,
        SyncStage::MergeConfig => merge_config,
        SyncStage::ApplyMergedConfig => apply_merged_config,
        SyncStage::CommitToStore => commit_to_store,
        SyncStage::Finalize => finalize,
    }
}

pub fn stage_table() -> Vec<StageSpec<SyncState>> {
    SyncStage::ALL
        .iter()
        .map(|stage| StageSpec {
            name: stage.name(),
            mutates: stage.mutates(),
            role: stage.role(),
            failure_code: ErrorCode::SyncStageFailed(*stage),
            run: stage_fn(*stage),
        })
        .collect()
}

/// Run the whole synchronisation under `ctx`. Temporary resources are
/// released before this returns, whatever the outcome.
pub fn run(ctx: &ExecContext, app: Arc<AppConfig>, platform: Platform) -> Result<SyncReport> {
    let branch = app.repository.branch.clone();
    let storage_mode = app.infobase.storage_mode;
    let mut state = SyncState::new(app, platform, ctx.detached());

    let outcome = workflow::run(ctx, &stage_table(), &mut state);

    let leftovers = state.cleanup.run_all();
    let backup = state.backup.take();
    let scratch_database = state.scratch.take().map(|s| s.name);
    drop(state);

    let completed: Vec<String> = outcome.completed().iter().map(|s| s.to_string()).collect();
    match outcome.failure {
        Some(err) => Err(err
            .with_detail("stages_completed", &completed)
            .with_detail("backup_path", backup.as_ref().map(|b| b.path.clone()))
            .with_detail("stages", &outcome.results)
            .with_detail("cleanup_failed", &leftovers)),
        None => Ok(SyncReport {
            branch,
            storage_mode,
            stages_completed: completed.len(),
            stages: outcome.results,
            current_stage: outcome.current_stage,
            backup,
            scratch_database,
        }),
    }
}

fn stage_parameters(stage: SyncStage, app: &AppConfig) -> Vec<(&'static str, String)> {
    let ib = app.infobase.connection.clone();
    match stage {
        SyncStage::ValidateConfig | SyncStage::Finalize => Vec::new(),
        SyncStage::PrepareWorkspace => vec![(
            "work_dir",
            app.workspace
                .work_dir
                .clone()
                .unwrap_or_else(|| "(system temp)".to_string()),
        )],
        SyncStage::CloneRepository => vec![
            ("url", app.repository.url.clone()),
            ("branch", app.repository.branch.clone()),
        ],
        SyncStage::SelectBranch => vec![("branch", app.repository.branch.clone())],
        SyncStage::Backup => vec![
            ("database", app.database.name.clone()),
            ("backup_dir", app.database.backup_dir.clone()),
        ],
        SyncStage::ProvisionScratchDb => {
            let runs = if app.infobase.storage_mode == StorageMode::Scratch {
                "yes"
            } else {
                "no (storage mode is not scratch)"
            };
            vec![("server", app.database.server.clone()), ("runs", runs.to_string())]
        }
        SyncStage::LoadSource => vec![
            ("infobase", ib),
            ("source_dir", app.repository.source_dir.clone()),
        ],
        SyncStage::BindStore | SyncStage::LoadStoreConfig | SyncStage::LockObjects => vec![
            ("infobase", ib),
            ("store", app.store.path.clone()),
            ("store_user", app.store.user.clone()),
            ("store_password", mask_value(&app.store.password)),
        ],
        SyncStage::CommitToStore => vec![
            ("infobase", ib),
            ("store", app.store.path.clone()),
            ("message", commit_message(app)),
        ],
        SyncStage::InitDatabase
        | SyncStage::UnbindStore
        | SyncStage::UpdateDatabase
        | SyncStage::DumpConfig
        | SyncStage::MergeConfig
        | SyncStage::ApplyMergedConfig => vec![("infobase", ib)],
    }
}

/// Preview of the run. Builds nothing and calls no collaborator.
pub fn plan(command: &str, app: &AppConfig) -> Plan {
    let mut builder = Plan::builder(command);
    for stage in SyncStage::ALL {
        let expected = if stage.mutates() {
            vec![format!("{} (modifies target)", stage.describe())]
        } else {
            vec![stage.describe().to_string()]
        };
        builder = builder.step(stage.name(), stage_parameters(stage, app), expected);
    }
    for (name, outcome) in precondition_checks(app) {
        builder = builder.check(name, outcome.map_err(|e| e.message));
    }
    let mutating = SyncStage::ALL.iter().filter(|s| s.mutates()).count();
    builder
        .summary(format!(
            "Synchronise branch '{}' of {} into store {} ({} stages, {} modify the target)",
            app.repository.branch,
            app.repository.url,
            app.store.path,
            SyncStage::ALL.len(),
            mutating
        ))
        .build()
}
