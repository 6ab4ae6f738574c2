//! Template-driven adapter: each platform operation is a shell command
//! template from `tools.commands`, rendered with `{{var}}` placeholders.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::{
    BackupCreator, BackupInfo, CodeAnalyzer, ConfigOperator, Infobase, ScanReport, ScratchDb,
    ScratchDbProvisioner, ServiceModeController, ServiceModeStatus,
};
use crate::config::{expand_path, AnalysisConfig, AppConfig, DatabaseConfig, StoreConfig};
use crate::context::ExecContext;
use crate::error::{CommandFailedDetails, Error, Result};
use crate::utils::mask::mask_secrets;
use crate::utils::process::{run_shell, CommandOutput};
use crate::utils::shell::quote_arg;
use crate::utils::template::{render, unresolved, TemplateVars};

type Vars = Vec<(&'static str, String)>;

pub struct ShellPlatform {
    commands: HashMap<String, String>,
}

impl ShellPlatform {
    pub fn new(app: &AppConfig) -> Self {
        Self::with_commands(app.tools.commands.clone())
    }

    pub fn with_commands(commands: HashMap<String, String>) -> Self {
        Self { commands }
    }

    /// Render the template for `operation`. Every value is shell-quoted, so
    /// templates must not add quotes of their own around placeholders. Fails
    /// when no template exists or a placeholder has no value.
    pub fn render_command(&self, operation: &str, vars: &[(&'static str, String)]) -> Result<String> {
        let template = self
            .commands
            .get(operation)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::platform_tool_not_configured(operation))?;

        let missing: Vec<String> = unresolved(template)
            .into_iter()
            .filter(|name| !vars.iter().any(|(k, _)| *k == name.as_str()))
            .collect();
        if !missing.is_empty() {
            return Err(Error::config_invalid_value(
                format!("tools.commands.{}", operation),
                Some(template.clone()),
                format!("unknown placeholder(s): {}", missing.join(", ")),
            ));
        }

        let quoted: Vec<(&str, String)> = vars.iter().map(|(k, v)| (*k, quote_arg(v))).collect();
        let pairs: Vec<(&str, &str)> = quoted.iter().map(|(k, v)| (*k, v.as_str())).collect();
        Ok(render(template, &pairs))
    }

    fn run(&self, ctx: &ExecContext, operation: &str, vars: Vars) -> Result<CommandOutput> {
        let command = self.render_command(operation, &vars)?;
        let masked = mask_secrets(&command);
        log_status!("platform", "{}: {}", operation, masked);

        let output = run_shell(ctx, &command, None)?;
        if !output.success {
            return Err(Error::platform_command_failed(CommandFailedDetails {
                operation: operation.to_string(),
                command: masked,
                exit_code: output.exit_code,
                stdout: mask_secrets(&output.stdout),
                stderr: mask_secrets(&output.stderr),
            }));
        }
        Ok(output)
    }
}

fn ib_vars(ib: &Infobase) -> Vars {
    vec![
        (TemplateVars::INFOBASE, ib.connection.clone()),
        (TemplateVars::IB_USER, ib.user.clone()),
        (TemplateVars::IB_PASSWORD, ib.password.clone()),
    ]
}

fn store_vars(ib: &Infobase, store: &StoreConfig) -> Vars {
    let mut vars = ib_vars(ib);
    vars.extend([
        (TemplateVars::STORE_PATH, store.path.clone()),
        (TemplateVars::STORE_USER, store.user.clone()),
        (TemplateVars::STORE_PASSWORD, store.password.clone()),
    ]);
    vars
}

fn db_vars(db: &DatabaseConfig, name: &str) -> Vars {
    vec![
        (TemplateVars::DB_SERVER, db.server.clone()),
        (TemplateVars::DB_NAME, name.to_string()),
        (TemplateVars::DB_USER, db.user.clone()),
        (TemplateVars::DB_PASSWORD, db.password.clone()),
    ]
}

fn path_var(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// `<db>-<UTC timestamp>.bak`
pub fn backup_file_name(db_name: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    format!("{}-{}.bak", db_name, now.format("%Y%m%d-%H%M%S"))
}

/// Hex SHA-256 of a file, `None` when it cannot be read.
pub fn file_digest(path: &Path) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).ok()?;
    Some(format!("{:x}", hasher.finalize()))
}

/// First line of a status query: on/enabled/blocked means service mode is on.
pub fn parse_service_status(stdout: &str) -> ServiceModeStatus {
    let first = stdout.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let lower = first.to_ascii_lowercase();
    let state = lower.split(|c: char| !c.is_ascii_alphanumeric()).find(|w| !w.is_empty());
    let enabled = matches!(state, Some("on" | "enabled" | "blocked" | "true" | "1"));
    let message = first
        .split_once(':')
        .map(|(_, rest)| rest.trim().to_string())
        .filter(|m| !m.is_empty());
    ServiceModeStatus { enabled, message }
}

impl ConfigOperator for ShellPlatform {
    fn convert(&self, ctx: &ExecContext, source: &Path, target: &Path, direction: &str) -> Result<()> {
        self.run(
            ctx,
            "config.convert",
            vec![
                (TemplateVars::SOURCE_DIR, path_var(source)),
                (TemplateVars::TARGET_DIR, path_var(target)),
                (TemplateVars::DIRECTION, direction.to_string()),
            ],
        )
        .map(|_| ())
    }

    fn init(&self, ctx: &ExecContext, ib: &Infobase) -> Result<()> {
        self.run(ctx, "config.init", ib_vars(ib)).map(|_| ())
    }

    fn load(&self, ctx: &ExecContext, ib: &Infobase, source: &Path) -> Result<()> {
        let mut vars = ib_vars(ib);
        vars.push((TemplateVars::SOURCE_DIR, path_var(source)));
        self.run(ctx, "config.load", vars).map(|_| ())
    }

    fn unbind(&self, ctx: &ExecContext, ib: &Infobase) -> Result<()> {
        self.run(ctx, "store.unbind", ib_vars(ib)).map(|_| ())
    }

    fn load_to_db(&self, ctx: &ExecContext, ib: &Infobase, store: &StoreConfig) -> Result<()> {
        self.run(ctx, "store.load_to_db", store_vars(ib, store)).map(|_| ())
    }

    fn update(&self, ctx: &ExecContext, ib: &Infobase) -> Result<()> {
        self.run(ctx, "config.update", ib_vars(ib)).map(|_| ())
    }

    fn dump(&self, ctx: &ExecContext, ib: &Infobase, file: &Path) -> Result<()> {
        let mut vars = ib_vars(ib);
        vars.push((TemplateVars::FILE, path_var(file)));
        self.run(ctx, "config.dump", vars).map(|_| ())
    }

    fn bind(&self, ctx: &ExecContext, ib: &Infobase, store: &StoreConfig) -> Result<()> {
        self.run(ctx, "store.bind", store_vars(ib, store)).map(|_| ())
    }

    fn lock(&self, ctx: &ExecContext, ib: &Infobase, store: &StoreConfig) -> Result<()> {
        self.run(ctx, "store.lock", store_vars(ib, store)).map(|_| ())
    }

    fn merge(&self, ctx: &ExecContext, ib: &Infobase, file: &Path) -> Result<()> {
        let mut vars = ib_vars(ib);
        vars.push((TemplateVars::FILE, path_var(file)));
        self.run(ctx, "config.merge", vars).map(|_| ())
    }

    fn commit(&self, ctx: &ExecContext, ib: &Infobase, store: &StoreConfig, message: &str) -> Result<()> {
        let mut vars = store_vars(ib, store);
        vars.push((TemplateVars::MESSAGE, message.to_string()));
        self.run(ctx, "store.commit", vars).map(|_| ())
    }
}

impl BackupCreator for ShellPlatform {
    fn create_backup(&self, ctx: &ExecContext, db: &DatabaseConfig) -> Result<BackupInfo> {
        let dir = expand_path(&db.backup_dir);
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create backup dir {}", dir)))
        })?;

        let now = chrono::Utc::now();
        let path = Path::new(&dir).join(backup_file_name(&db.name, now));
        let mut vars = db_vars(db, &db.name);
        vars.push((TemplateVars::FILE, path_var(&path)));
        self.run(ctx, "db.backup", vars)?;

        Ok(BackupInfo {
            path: path_var(&path),
            created_at: now.to_rfc3339(),
            sha256: file_digest(&path),
        })
    }

    fn restore_backup(&self, ctx: &ExecContext, db: &DatabaseConfig, path: &str) -> Result<()> {
        let mut vars = db_vars(db, &db.name);
        vars.push((TemplateVars::FILE, expand_path(path)));
        self.run(ctx, "db.restore", vars).map(|_| ())
    }
}

impl ScratchDbProvisioner for ShellPlatform {
    fn provision(&self, ctx: &ExecContext, db: &DatabaseConfig) -> Result<ScratchDb> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{}_scratch_{}", db.name, &suffix[..8]);
        self.run(ctx, "db.create", db_vars(db, &name))?;
        Ok(ScratchDb {
            connection: format!("Srvr=\"{}\";Ref=\"{}\";", db.server, name),
            name,
        })
    }

    fn drop_database(&self, ctx: &ExecContext, db: &DatabaseConfig, scratch: &ScratchDb) -> Result<()> {
        let mut vars = db_vars(db, &scratch.name);
        vars.push((TemplateVars::INFOBASE, scratch.connection.clone()));
        self.run(ctx, "db.drop", vars).map(|_| ())
    }
}

impl ServiceModeController for ShellPlatform {
    fn enable(&self, ctx: &ExecContext, ib: &Infobase, message: &str, permission_code: &str) -> Result<()> {
        let mut vars = ib_vars(ib);
        vars.push((TemplateVars::MESSAGE, message.to_string()));
        vars.push((TemplateVars::PERMISSION_CODE, permission_code.to_string()));
        self.run(ctx, "service_mode.enable", vars).map(|_| ())
    }

    fn disable(&self, ctx: &ExecContext, ib: &Infobase) -> Result<()> {
        self.run(ctx, "service_mode.disable", ib_vars(ib)).map(|_| ())
    }

    fn status(&self, ctx: &ExecContext, ib: &Infobase) -> Result<ServiceModeStatus> {
        let output = self.run(ctx, "service_mode.status", ib_vars(ib))?;
        Ok(parse_service_status(&output.stdout))
    }
}

impl CodeAnalyzer for ShellPlatform {
    fn scan(&self, ctx: &ExecContext, source: &Path, branch: &str, analysis: &AnalysisConfig) -> Result<ScanReport> {
        let vars = vec![
            (TemplateVars::PROJECT_KEY, analysis.project_key.clone()),
            (TemplateVars::HOST_URL, analysis.host_url.clone()),
            (TemplateVars::BRANCH, branch.to_string()),
            (TemplateVars::SOURCE_DIR, path_var(source)),
            (TemplateVars::TOKEN, analysis.token.clone().unwrap_or_default()),
        ];
        let output = self.run(ctx, "analysis.scan", vars)?;
        Ok(ScanReport {
            project_key: analysis.project_key.clone(),
            branch: branch.to_string(),
            output: output.stdout.trim().to_string(),
        })
    }
}
