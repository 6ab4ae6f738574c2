#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use stagehand::config::{AnalysisConfig, AppConfig, DatabaseConfig, RunConfig, StoreConfig};
use stagehand::console::Console;
use stagehand::context::ExecContext;
use stagehand::platform::{
    BackupCreator, BackupInfo, CodeAnalyzer, ConfigOperator, Infobase, Platform, ScanReport,
    ScratchDb, ScratchDbProvisioner, ServiceModeController, ServiceModeStatus, VersionControl,
};
use stagehand::response::respond;
use stagehand::settings::{OutputFormat, Settings};
use stagehand::{Error, Handler, Result};

/// In-memory stand-in for every collaborator. Records each call as
/// `"<area>.<op>"` in order.
#[derive(Default)]
pub struct FakePlatform {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    service_mode_on: Mutex<bool>,
    live_scratch: Mutex<BTreeSet<String>>,
    clone_dest: Mutex<Option<PathBuf>>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `op` fail with a platform error.
    pub fn fail_on(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    /// Make `op` block until its context ends.
    pub fn hang_on(&self, op: &str) {
        self.hanging.lock().unwrap().insert(op.to_string());
    }

    pub fn set_service_mode(&self, on: bool) {
        *self.service_mode_on.lock().unwrap() = on;
    }

    pub fn service_mode(&self) -> bool {
        *self.service_mode_on.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| *c == op).count()
    }

    pub fn live_scratch(&self) -> BTreeSet<String> {
        self.live_scratch.lock().unwrap().clone()
    }

    pub fn clone_dest(&self) -> Option<PathBuf> {
        self.clone_dest.lock().unwrap().clone()
    }

    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform {
            vcs: self.clone(),
            config: self.clone(),
            backups: self.clone(),
            scratch: self.clone(),
            service_mode: self.clone(),
            analyzer: self.clone(),
        }
    }

    fn call(&self, ctx: &ExecContext, op: &str) -> Result<()> {
        self.calls.lock().unwrap().push(op.to_string());
        if self.hanging.lock().unwrap().contains(op) {
            loop {
                ctx.check()?;
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        if self.failing.lock().unwrap().contains(op) {
            return Err(Error::platform_tool_not_configured(op));
        }
        Ok(())
    }
}

impl VersionControl for FakePlatform {
    fn clone_repo(&self, ctx: &ExecContext, _url: &str, dest: &Path) -> Result<()> {
        self.call(ctx, "vcs.clone")?;
        std::fs::create_dir_all(dest.join("src")).unwrap();
        *self.clone_dest.lock().unwrap() = Some(dest.to_path_buf());
        Ok(())
    }

    fn switch_branch(&self, ctx: &ExecContext, _repo: &Path, _branch: &str) -> Result<()> {
        self.call(ctx, "vcs.switch")
    }

    fn current_branch(&self, ctx: &ExecContext, _repo: &Path) -> Result<String> {
        self.call(ctx, "vcs.current_branch")?;
        Ok("main".to_string())
    }
}

impl ConfigOperator for FakePlatform {
    fn convert(&self, ctx: &ExecContext, _source: &Path, _target: &Path, _direction: &str) -> Result<()> {
        self.call(ctx, "config.convert")
    }

    fn init(&self, ctx: &ExecContext, _ib: &Infobase) -> Result<()> {
        self.call(ctx, "config.init")
    }

    fn load(&self, ctx: &ExecContext, _ib: &Infobase, _source: &Path) -> Result<()> {
        self.call(ctx, "config.load")
    }

    fn unbind(&self, ctx: &ExecContext, _ib: &Infobase) -> Result<()> {
        self.call(ctx, "store.unbind")
    }

    fn load_to_db(&self, ctx: &ExecContext, _ib: &Infobase, _store: &StoreConfig) -> Result<()> {
        self.call(ctx, "store.load_to_db")
    }

    fn update(&self, ctx: &ExecContext, _ib: &Infobase) -> Result<()> {
        self.call(ctx, "config.update")
    }

    fn dump(&self, ctx: &ExecContext, _ib: &Infobase, _file: &Path) -> Result<()> {
        self.call(ctx, "config.dump")
    }

    fn bind(&self, ctx: &ExecContext, _ib: &Infobase, _store: &StoreConfig) -> Result<()> {
        self.call(ctx, "store.bind")
    }

    fn lock(&self, ctx: &ExecContext, _ib: &Infobase, _store: &StoreConfig) -> Result<()> {
        self.call(ctx, "store.lock")
    }

    fn merge(&self, ctx: &ExecContext, _ib: &Infobase, _file: &Path) -> Result<()> {
        self.call(ctx, "config.merge")
    }

    fn commit(&self, ctx: &ExecContext, _ib: &Infobase, _store: &StoreConfig, _message: &str) -> Result<()> {
        self.call(ctx, "store.commit")
    }
}

impl BackupCreator for FakePlatform {
    fn create_backup(&self, ctx: &ExecContext, db: &DatabaseConfig) -> Result<BackupInfo> {
        self.call(ctx, "db.backup")?;
        Ok(BackupInfo {
            path: format!("/backups/{}-20260101-000000.bak", db.name),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            sha256: None,
        })
    }

    fn restore_backup(&self, ctx: &ExecContext, _db: &DatabaseConfig, _path: &str) -> Result<()> {
        self.call(ctx, "db.restore")
    }
}

impl ScratchDbProvisioner for FakePlatform {
    fn provision(&self, ctx: &ExecContext, db: &DatabaseConfig) -> Result<ScratchDb> {
        self.call(ctx, "db.create")?;
        let name = format!("{}_scratch_0001", db.name);
        self.live_scratch.lock().unwrap().insert(name.clone());
        Ok(ScratchDb {
            connection: format!("Srvr={};Ref={};", db.server, name),
            name,
        })
    }

    fn drop_database(&self, ctx: &ExecContext, _db: &DatabaseConfig, scratch: &ScratchDb) -> Result<()> {
        self.call(ctx, "db.drop")?;
        self.live_scratch.lock().unwrap().remove(&scratch.name);
        Ok(())
    }
}

impl ServiceModeController for FakePlatform {
    fn enable(&self, ctx: &ExecContext, _ib: &Infobase, _message: &str, _code: &str) -> Result<()> {
        self.call(ctx, "service_mode.enable")?;
        self.set_service_mode(true);
        Ok(())
    }

    fn disable(&self, ctx: &ExecContext, _ib: &Infobase) -> Result<()> {
        self.call(ctx, "service_mode.disable")?;
        self.set_service_mode(false);
        Ok(())
    }

    fn status(&self, ctx: &ExecContext, _ib: &Infobase) -> Result<ServiceModeStatus> {
        self.call(ctx, "service_mode.status")?;
        Ok(ServiceModeStatus {
            enabled: self.service_mode(),
            message: None,
        })
    }
}

impl CodeAnalyzer for FakePlatform {
    fn scan(&self, ctx: &ExecContext, _source: &Path, branch: &str, analysis: &AnalysisConfig) -> Result<ScanReport> {
        self.call(ctx, "analysis.scan")?;
        Ok(ScanReport {
            project_key: analysis.project_key.clone(),
            branch: branch.to_string(),
            output: String::new(),
        })
    }
}

/// A fully configured application in server storage mode.
pub fn app_config() -> AppConfig {
    let mut app = AppConfig::default();
    app.infobase.connection = "Srvr=app01;Ref=erp;".to_string();
    app.repository.url = "https://git.example.com/erp/config.git".to_string();
    app.repository.branch = "main".to_string();
    app.store.path = "tcp://store01/erp".to_string();
    app.store.user = "builder".to_string();
    app.database.server = "db01".to_string();
    app.database.name = "erp".to_string();
    app.analysis.project_key = "erp".to_string();
    app.analysis.host_url = "https://sonar.example.com".to_string();
    app
}

pub fn run_config(app: AppConfig, format: OutputFormat) -> RunConfig {
    RunConfig::new(
        app,
        Settings {
            format,
            ..Settings::default()
        },
    )
}

pub fn captured_ctx() -> ExecContext {
    ExecContext::with_console(Console::captured())
}

/// Handler that records its invocations and answers with fixed data.
pub struct Probe {
    name: String,
    data: Value,
    fail: bool,
    pub invocations: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn new(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            data: json!({ "ran": name }),
            fail: false,
            invocations: journal.clone(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn arc(self) -> Arc<dyn Handler> {
        Arc::new(self)
    }
}

impl Handler for Probe {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test probe"
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        self.invocations.lock().unwrap().push(self.name.clone());
        let result = if self.fail {
            Err(Error::internal_unexpected(format!("{} failed", self.name)))
        } else {
            Ok(self.data.clone())
        };
        respond(ctx, cfg, &self.name, Instant::now(), result, None)
    }
}

pub fn journal() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    journal.lock().unwrap().clone()
}
