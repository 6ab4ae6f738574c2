use serde::Serialize;

use crate::commands::{require_checks, run_planned, tag_failure, with_checks, CommandId};
use crate::config::{AppConfig, RunConfig};
use crate::context::ExecContext;
use crate::error::{ErrorCode, Result};
use crate::mode::Plan;
use crate::platform::{BackupInfo, Infobase, Platform};
use crate::registry::Handler;
use crate::response::TextReport;
use crate::utils::mask::mask_secrets;
use crate::utils::validation::require_config;

#[derive(Debug, Serialize)]
pub struct DbRestoreOutput {
    pub database: String,
    pub restored_from: String,
    /// Backup of the state that was overwritten.
    pub safety_backup: BackupInfo,
}

impl TextReport for DbRestoreOutput {
    fn render_text(&self) -> String {
        format!(
            "Restored {} from {}\nPrevious state saved to {}",
            self.database, self.restored_from, self.safety_backup.path
        )
    }
}

#[derive(Debug, Serialize)]
pub struct DbUpdateOutput {
    pub infobase: String,
    pub updated: bool,
}

impl TextReport for DbUpdateOutput {
    fn render_text(&self) -> String {
        format!("Database configuration of {} updated", self.infobase)
    }
}

fn restore_source(app: &AppConfig) -> Result<&str> {
    require_config(app.database.restore_from.as_deref(), "database.restore_from")
}

fn restore_checks(app: &AppConfig) -> Vec<(&'static str, Result<()>)> {
    vec![
        (
            "database.name",
            require_config(Some(app.database.name.as_str()), "database.name").map(|_| ()),
        ),
        ("database.restore_from", restore_source(app).map(|_| ())),
    ]
}

fn update_checks(app: &AppConfig) -> Vec<(&'static str, Result<()>)> {
    vec![(
        "infobase.connection",
        require_config(Some(app.infobase.connection.as_str()), "infobase.connection").map(|_| ()),
    )]
}

/// `db-restore`: back up the current database, then restore it from the
/// configured backup file.
pub struct DbRestore {
    platform: Platform,
}

impl DbRestore {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn build_plan(&self, app: &AppConfig) -> Plan {
        let from = app.database.restore_from.clone().unwrap_or_default();
        let builder = Plan::builder(self.name())
            .step(
                "backup",
                [
                    ("database", app.database.name.as_str()),
                    ("backup_dir", app.database.backup_dir.as_str()),
                ],
                vec!["a backup of the current database is written".to_string()],
            )
            .step(
                "restore",
                [
                    ("database", app.database.name.as_str()),
                    ("from", from.as_str()),
                ],
                vec![format!("database {} is overwritten", app.database.name)],
            );
        with_checks(builder, restore_checks(app))
            .summary(format!("Restore database {} from {}", app.database.name, from))
            .build()
    }

    fn restore(&self, ctx: &ExecContext, app: &AppConfig) -> Result<DbRestoreOutput> {
        require_checks(restore_checks(app))?;
        let from = restore_source(app)?;
        let tag = tag_failure(ErrorCode::DbRestoreFailed, "Database restore");

        let safety_backup = self
            .platform
            .backups
            .create_backup(ctx, &app.database)
            .map_err(&tag)?;
        log_status!("db", "Current state saved to {}", safety_backup.path);

        self.platform
            .backups
            .restore_backup(ctx, &app.database, from)
            .map_err(|e| tag(e).with_detail("safety_backup", &safety_backup.path))?;

        Ok(DbRestoreOutput {
            database: app.database.name.clone(),
            restored_from: from.to_string(),
            safety_backup,
        })
    }
}

impl Handler for DbRestore {
    fn name(&self) -> &str {
        CommandId::DbRestore.as_str()
    }

    fn description(&self) -> &str {
        CommandId::DbRestore.description()
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        run_planned(
            ctx,
            cfg,
            self.name(),
            || Ok(self.build_plan(&cfg.app)),
            |ctx| self.restore(ctx, &cfg.app),
        )
    }

    fn plan(&self, cfg: &RunConfig) -> Option<Result<Plan>> {
        Some(Ok(self.build_plan(&cfg.app)))
    }
}

/// `db-update`: apply the pending configuration to the database structure.
pub struct DbUpdate {
    platform: Platform,
}

impl DbUpdate {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn build_plan(&self, app: &AppConfig) -> Plan {
        let builder = Plan::builder(self.name()).step(
            "update-database",
            [("infobase", app.infobase.connection.as_str())],
            vec!["database structure updated".to_string()],
        );
        with_checks(builder, update_checks(app))
            .summary("Apply the configuration update to the database")
            .build()
    }

    fn update(&self, ctx: &ExecContext, app: &AppConfig) -> Result<DbUpdateOutput> {
        require_checks(update_checks(app))?;
        let ib = Infobase::from_config(&app.infobase);
        self.platform
            .config
            .update(ctx, &ib)
            .map_err(tag_failure(ErrorCode::DbUpdateFailed, "Database update"))?;
        Ok(DbUpdateOutput {
            infobase: mask_secrets(&ib.connection),
            updated: true,
        })
    }
}

impl Handler for DbUpdate {
    fn name(&self) -> &str {
        CommandId::DbUpdate.as_str()
    }

    fn description(&self) -> &str {
        CommandId::DbUpdate.description()
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        run_planned(
            ctx,
            cfg,
            self.name(),
            || Ok(self.build_plan(&cfg.app)),
            |ctx| self.update(ctx, &cfg.app),
        )
    }

    fn plan(&self, cfg: &RunConfig) -> Option<Result<Plan>> {
        Some(Ok(self.build_plan(&cfg.app)))
    }
}
