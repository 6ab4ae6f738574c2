//! Service mode switches. Enable and disable are idempotent: they query the
//! current state first and report `changed: false` when nothing was done.

use serde::Serialize;

use crate::commands::{require_checks, run_planned, run_unplanned, tag_failure, with_checks, CommandId};
use crate::config::{AppConfig, RunConfig};
use crate::context::ExecContext;
use crate::error::{ErrorCode, Result};
use crate::mode::Plan;
use crate::platform::{Infobase, Platform, ServiceModeStatus as ModeState};
use crate::registry::Handler;
use crate::response::TextReport;
use crate::utils::validation::require_config;

#[derive(Debug, Serialize)]
pub struct ServiceModeOutput {
    pub enabled: bool,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TextReport for ServiceModeOutput {
    fn render_text(&self) -> String {
        let state = if self.enabled { "on" } else { "off" };
        let mut line = if self.changed {
            format!("Service mode switched {}", state)
        } else {
            format!("Service mode is {}", state)
        };
        if let Some(message) = &self.message {
            line.push_str(&format!(" ({})", message));
        }
        line
    }
}

impl ServiceModeOutput {
    fn unchanged(status: ModeState) -> Self {
        Self {
            enabled: status.enabled,
            changed: false,
            message: status.message,
        }
    }
}

fn checks(app: &AppConfig) -> Vec<(&'static str, Result<()>)> {
    vec![(
        "infobase.connection",
        require_config(Some(app.infobase.connection.as_str()), "infobase.connection").map(|_| ()),
    )]
}

fn infobase(app: &AppConfig) -> Result<Infobase> {
    require_checks(checks(app))?;
    Ok(Infobase::from_config(&app.infobase))
}

fn current_status(platform: &Platform, ctx: &ExecContext, ib: &Infobase) -> Result<ModeState> {
    platform
        .service_mode
        .status(ctx, ib)
        .map_err(tag_failure(ErrorCode::ServiceModeFailed, "Service mode query"))
}

pub struct ServiceModeEnable {
    platform: Platform,
}

impl ServiceModeEnable {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn build_plan(&self, app: &AppConfig) -> Plan {
        let builder = Plan::builder(self.name()).step(
            "enable-service-mode",
            [
                ("infobase", app.infobase.connection.as_str()),
                ("message", app.service_mode.message.as_str()),
                ("permission_code", app.service_mode.permission_code.as_str()),
            ],
            vec!["new sessions are blocked".to_string()],
        );
        with_checks(builder, checks(app))
            .summary("Enable service mode")
            .build()
    }

    fn enable(&self, ctx: &ExecContext, app: &AppConfig) -> Result<ServiceModeOutput> {
        let ib = infobase(app)?;
        let status = current_status(&self.platform, ctx, &ib)?;
        if status.enabled {
            log_status!("service-mode", "Already enabled");
            return Ok(ServiceModeOutput::unchanged(status));
        }

        self.platform
            .service_mode
            .enable(
                ctx,
                &ib,
                &app.service_mode.message,
                &app.service_mode.permission_code,
            )
            .map_err(tag_failure(ErrorCode::ServiceModeFailed, "Service mode enable"))?;

        Ok(ServiceModeOutput {
            enabled: true,
            changed: true,
            message: Some(app.service_mode.message.clone()),
        })
    }
}

impl Handler for ServiceModeEnable {
    fn name(&self) -> &str {
        CommandId::ServiceModeEnable.as_str()
    }

    fn description(&self) -> &str {
        CommandId::ServiceModeEnable.description()
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        run_planned(
            ctx,
            cfg,
            self.name(),
            || Ok(self.build_plan(&cfg.app)),
            |ctx| self.enable(ctx, &cfg.app),
        )
    }

    fn plan(&self, cfg: &RunConfig) -> Option<Result<Plan>> {
        Some(Ok(self.build_plan(&cfg.app)))
    }
}

pub struct ServiceModeDisable {
    platform: Platform,
}

impl ServiceModeDisable {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn build_plan(&self, app: &AppConfig) -> Plan {
        let builder = Plan::builder(self.name()).step(
            "disable-service-mode",
            [("infobase", app.infobase.connection.as_str())],
            vec!["sessions are allowed again".to_string()],
        );
        with_checks(builder, checks(app))
            .summary("Disable service mode")
            .build()
    }

    fn disable(&self, ctx: &ExecContext, app: &AppConfig) -> Result<ServiceModeOutput> {
        let ib = infobase(app)?;
        let status = current_status(&self.platform, ctx, &ib)?;
        if !status.enabled {
            log_status!("service-mode", "Already disabled");
            return Ok(ServiceModeOutput::unchanged(status));
        }

        self.platform
            .service_mode
            .disable(ctx, &ib)
            .map_err(tag_failure(ErrorCode::ServiceModeFailed, "Service mode disable"))?;

        Ok(ServiceModeOutput {
            enabled: false,
            changed: true,
            message: None,
        })
    }
}

impl Handler for ServiceModeDisable {
    fn name(&self) -> &str {
        CommandId::ServiceModeDisable.as_str()
    }

    fn description(&self) -> &str {
        CommandId::ServiceModeDisable.description()
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        run_planned(
            ctx,
            cfg,
            self.name(),
            || Ok(self.build_plan(&cfg.app)),
            |ctx| self.disable(ctx, &cfg.app),
        )
    }

    fn plan(&self, cfg: &RunConfig) -> Option<Result<Plan>> {
        Some(Ok(self.build_plan(&cfg.app)))
    }
}

/// Read-only status query; it has nothing to plan.
pub struct ServiceModeStatus {
    platform: Platform,
}

impl ServiceModeStatus {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

impl Handler for ServiceModeStatus {
    fn name(&self) -> &str {
        CommandId::ServiceModeStatus.as_str()
    }

    fn description(&self) -> &str {
        CommandId::ServiceModeStatus.description()
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        run_unplanned(ctx, cfg, self.name(), |ctx| {
            let ib = infobase(&cfg.app)?;
            current_status(&self.platform, ctx, &ib).map(ServiceModeOutput::unchanged)
        })
    }
}
