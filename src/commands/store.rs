use serde::Serialize;

use crate::commands::{require_checks, run_planned, tag_failure, with_checks, CommandId};
use crate::config::{AppConfig, RunConfig};
use crate::context::ExecContext;
use crate::error::{ErrorCode, Result};
use crate::mode::Plan;
use crate::platform::{Infobase, Platform};
use crate::registry::Handler;
use crate::response::TextReport;
use crate::utils::mask::{mask_secrets, mask_value};
use crate::utils::validation::require_config;

#[derive(Debug, Serialize)]
pub struct StoreToDbOutput {
    pub store: String,
    pub infobase: String,
    pub steps: Vec<&'static str>,
}

impl TextReport for StoreToDbOutput {
    fn render_text(&self) -> String {
        format!(
            "Loaded store {} into {} ({})",
            self.store,
            self.infobase,
            self.steps.join(", ")
        )
    }
}

/// `store-to-db`: load the store configuration into the infobase and apply
/// it to the database.
pub struct StoreToDb {
    platform: Platform,
}

impl StoreToDb {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn build_plan(&self, app: &AppConfig) -> Plan {
        let store_password = mask_value(&app.store.password);
        let builder = Plan::builder(self.name())
            .step(
                "load-store-config",
                [
                    ("infobase", app.infobase.connection.as_str()),
                    ("store", app.store.path.as_str()),
                    ("store_user", app.store.user.as_str()),
                    ("store_password", store_password.as_str()),
                ],
                vec!["infobase configuration replaced by the store version".to_string()],
            )
            .step(
                "update-database",
                [("infobase", app.infobase.connection.as_str())],
                vec!["database structure updated".to_string()],
            );
        with_checks(builder, checks(app))
            .summary(format!("Load store {} into the database", app.store.path))
            .build()
    }

    fn load(&self, ctx: &ExecContext, app: &AppConfig) -> Result<StoreToDbOutput> {
        require_checks(checks(app))?;
        let ib = Infobase::from_config(&app.infobase);
        let tag = tag_failure(ErrorCode::StoreLoadFailed, "Store load");

        log_status!("store", "Loading {}", mask_secrets(&app.store.path));
        self.platform
            .config
            .load_to_db(ctx, &ib, &app.store)
            .map_err(&tag)?;
        self.platform.config.update(ctx, &ib).map_err(&tag)?;

        Ok(StoreToDbOutput {
            store: mask_secrets(&app.store.path),
            infobase: mask_secrets(&ib.connection),
            steps: vec!["load-store-config", "update-database"],
        })
    }
}

fn checks(app: &AppConfig) -> Vec<(&'static str, Result<()>)> {
    vec![
        (
            "infobase.connection",
            require_config(Some(app.infobase.connection.as_str()), "infobase.connection").map(|_| ()),
        ),
        (
            "store.path",
            require_config(Some(app.store.path.as_str()), "store.path").map(|_| ()),
        ),
    ]
}

impl Handler for StoreToDb {
    fn name(&self) -> &str {
        CommandId::StoreToDb.as_str()
    }

    fn description(&self) -> &str {
        CommandId::StoreToDb.description()
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        run_planned(
            ctx,
            cfg,
            self.name(),
            || Ok(self.build_plan(&cfg.app)),
            |ctx| self.load(ctx, &cfg.app),
        )
    }

    fn plan(&self, cfg: &RunConfig) -> Option<Result<Plan>> {
        Some(Ok(self.build_plan(&cfg.app)))
    }
}
