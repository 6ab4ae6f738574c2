//! Collaborator seams for everything outside the process: the application
//! platform's designer tooling, the database server, version control and the
//! analysis service.
//!
//! Workflows only talk to these traits. `shell::ShellPlatform` and
//! `git::GitCli` are the default implementations; tests inject doubles.

pub mod git;
pub mod shell;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, AppConfig, DatabaseConfig, InfobaseConfig, StoreConfig};
use crate::context::ExecContext;
use crate::error::Result;

pub use git::GitCli;
pub use shell::ShellPlatform;

/// Connection to the infobase a command operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Infobase {
    pub connection: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Infobase {
    pub fn from_config(config: &InfobaseConfig) -> Self {
        Self {
            connection: config.connection.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub path: String,
    pub created_at: String,
    /// SHA-256 of the backup file, when it is reachable locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchDb {
    pub name: String,
    pub connection: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceModeStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub project_key: String,
    pub branch: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
}

pub trait VersionControl: Send + Sync {
    fn clone_repo(&self, ctx: &ExecContext, url: &str, dest: &Path) -> Result<()>;
    fn switch_branch(&self, ctx: &ExecContext, repo: &Path, branch: &str) -> Result<()>;
    fn current_branch(&self, ctx: &ExecContext, repo: &Path) -> Result<String>;
}

/// Designer-level operations on an infobase configuration.
pub trait ConfigOperator: Send + Sync {
    fn convert(&self, ctx: &ExecContext, source: &Path, target: &Path, direction: &str) -> Result<()>;
    fn init(&self, ctx: &ExecContext, ib: &Infobase) -> Result<()>;
    fn load(&self, ctx: &ExecContext, ib: &Infobase, source: &Path) -> Result<()>;
    fn unbind(&self, ctx: &ExecContext, ib: &Infobase) -> Result<()>;
    fn load_to_db(&self, ctx: &ExecContext, ib: &Infobase, store: &StoreConfig) -> Result<()>;
    fn update(&self, ctx: &ExecContext, ib: &Infobase) -> Result<()>;
    fn dump(&self, ctx: &ExecContext, ib: &Infobase, file: &Path) -> Result<()>;
    fn bind(&self, ctx: &ExecContext, ib: &Infobase, store: &StoreConfig) -> Result<()>;
    fn lock(&self, ctx: &ExecContext, ib: &Infobase, store: &StoreConfig) -> Result<()>;
    fn merge(&self, ctx: &ExecContext, ib: &Infobase, file: &Path) -> Result<()>;
    fn commit(&self, ctx: &ExecContext, ib: &Infobase, store: &StoreConfig, message: &str) -> Result<()>;
}

pub trait BackupCreator: Send + Sync {
    fn create_backup(&self, ctx: &ExecContext, db: &DatabaseConfig) -> Result<BackupInfo>;
    fn restore_backup(&self, ctx: &ExecContext, db: &DatabaseConfig, path: &str) -> Result<()>;
}

pub trait ScratchDbProvisioner: Send + Sync {
    fn provision(&self, ctx: &ExecContext, db: &DatabaseConfig) -> Result<ScratchDb>;
    fn drop_database(&self, ctx: &ExecContext, db: &DatabaseConfig, scratch: &ScratchDb) -> Result<()>;
}

pub trait ServiceModeController: Send + Sync {
    fn enable(&self, ctx: &ExecContext, ib: &Infobase, message: &str, permission_code: &str) -> Result<()>;
    fn disable(&self, ctx: &ExecContext, ib: &Infobase) -> Result<()>;
    fn status(&self, ctx: &ExecContext, ib: &Infobase) -> Result<ServiceModeStatus>;
}

pub trait CodeAnalyzer: Send + Sync {
    fn scan(&self, ctx: &ExecContext, source: &Path, branch: &str, analysis: &AnalysisConfig) -> Result<ScanReport>;
}

/// One implementation of each collaborator.
#[derive(Clone)]
pub struct Platform {
    pub vcs: Arc<dyn VersionControl>,
    pub config: Arc<dyn ConfigOperator>,
    pub backups: Arc<dyn BackupCreator>,
    pub scratch: Arc<dyn ScratchDbProvisioner>,
    pub service_mode: Arc<dyn ServiceModeController>,
    pub analyzer: Arc<dyn CodeAnalyzer>,
}

impl Platform {
    /// Default adapters driven by the configured command templates.
    pub fn from_config(app: &AppConfig) -> Self {
        let shell = Arc::new(ShellPlatform::new(app));
        Self {
            vcs: Arc::new(GitCli::new(&app.tools.git)),
            config: shell.clone(),
            backups: shell.clone(),
            scratch: shell.clone(),
            service_mode: shell.clone(),
            analyzer: shell,
        }
    }
}
