use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::commands::{require_checks, run_planned, tag_failure, with_checks, CommandId};
use crate::config::{expand_path, AppConfig, RunConfig};
use crate::context::ExecContext;
use crate::error::{Error, ErrorCode, Result};
use crate::mode::Plan;
use crate::platform::Platform;
use crate::registry::Handler;
use crate::response::TextReport;
use crate::utils::validation::require_config;

pub const DIRECTIONS: [&str; 2] = ["edt-to-xml", "xml-to-edt"];

#[derive(Debug, Serialize)]
pub struct ConvertOutput {
    pub source_dir: String,
    pub target_dir: String,
    pub direction: String,
}

impl TextReport for ConvertOutput {
    fn render_text(&self) -> String {
        format!(
            "Converted {} -> {} ({})",
            self.source_dir, self.target_dir, self.direction
        )
    }
}

/// `convert-config`: convert configuration sources from one format to the other.
pub struct ConvertConfig {
    platform: Platform,
}

impl ConvertConfig {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn build_plan(&self, app: &AppConfig) -> Plan {
        let conversion = &app.conversion;
        let builder = Plan::builder(self.name()).step(
            "convert",
            [
                ("source_dir", conversion.source_dir.as_str()),
                ("target_dir", conversion.target_dir.as_str()),
                ("direction", conversion.direction.as_str()),
            ],
            vec![format!("target directory {} is (re)written", conversion.target_dir)],
        );
        with_checks(builder, checks(app))
            .summary(format!("Convert configuration ({})", conversion.direction))
            .build()
    }

    fn convert(&self, ctx: &ExecContext, app: &AppConfig) -> Result<ConvertOutput> {
        require_checks(checks(app))?;
        let conversion = &app.conversion;
        let source = PathBuf::from(expand_path(&conversion.source_dir));
        let target = PathBuf::from(expand_path(&conversion.target_dir));

        self.platform
            .config
            .convert(ctx, &source, &target, &conversion.direction)
            .map_err(tag_failure(ErrorCode::ConvertFailed, "Conversion"))?;

        Ok(ConvertOutput {
            source_dir: source.to_string_lossy().to_string(),
            target_dir: target.to_string_lossy().to_string(),
            direction: conversion.direction.clone(),
        })
    }
}

fn checks(app: &AppConfig) -> Vec<(&'static str, Result<()>)> {
    let conversion = &app.conversion;
    let source = require_config(Some(conversion.source_dir.as_str()), "conversion.source_dir")
        .and_then(|dir| {
            if Path::new(&expand_path(dir)).is_dir() {
                Ok(())
            } else {
                Err(Error::validation_invalid_argument(
                    "conversion.source_dir",
                    format!("directory '{}' does not exist", dir),
                    None,
                    None,
                ))
            }
        });
    let direction = if DIRECTIONS.contains(&conversion.direction.as_str()) {
        Ok(())
    } else {
        Err(Error::config_invalid_value(
            "conversion.direction",
            Some(conversion.direction.clone()),
            format!("expected one of: {}", DIRECTIONS.join(", ")),
        ))
    };
    vec![
        ("conversion.source_dir", source),
        (
            "conversion.target_dir",
            require_config(Some(conversion.target_dir.as_str()), "conversion.target_dir").map(|_| ()),
        ),
        ("conversion.direction", direction),
    ]
}

impl Handler for ConvertConfig {
    fn name(&self) -> &str {
        CommandId::ConvertConfig.as_str()
    }

    fn description(&self) -> &str {
        CommandId::ConvertConfig.description()
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        run_planned(
            ctx,
            cfg,
            self.name(),
            || Ok(self.build_plan(&cfg.app)),
            |ctx| self.convert(ctx, &cfg.app),
        )
    }

    fn plan(&self, cfg: &RunConfig) -> Option<Result<Plan>> {
        Some(Ok(self.build_plan(&cfg.app)))
    }
}
