use std::path::Path;

use crate::commands::{require_checks, run_planned, tag_failure, with_checks, CommandId};
use crate::config::{AppConfig, RunConfig};
use crate::context::ExecContext;
use crate::error::{Error, ErrorCode, Result};
use crate::mode::Plan;
use crate::platform::{Platform, ScanReport};
use crate::registry::Handler;
use crate::response::TextReport;
use crate::sync::{authenticated_url, temp_workspace};
use crate::utils::mask::{mask_secrets, mask_value};
use crate::utils::validation::{require_config, validate_repo_url};

const CHECKOUT_DIR: &str = "repo";

impl TextReport for ScanReport {
    fn render_text(&self) -> String {
        let mut out = format!("Analysed {} on branch {}", self.project_key, self.branch);
        if !self.output.is_empty() {
            out.push('\n');
            out.push_str(self.output.trim_end());
        }
        out
    }
}

fn checks(app: &AppConfig) -> Vec<(&'static str, Result<()>)> {
    let url = require_config(Some(app.repository.url.as_str()), "repository.url")
        .and_then(|url| validate_repo_url(url, "repository.url"));
    vec![
        ("repository.url", url),
        (
            "repository.branch",
            require_config(Some(app.repository.branch.as_str()), "repository.branch").map(|_| ()),
        ),
        (
            "analysis.project_key",
            require_config(Some(app.analysis.project_key.as_str()), "analysis.project_key").map(|_| ()),
        ),
        (
            "analysis.host_url",
            require_config(Some(app.analysis.host_url.as_str()), "analysis.host_url").map(|_| ()),
        ),
    ]
}

/// `scan-branch`: clone the configured branch into a temporary directory and
/// run the static analyser over its sources.
pub struct ScanBranch {
    platform: Platform,
}

impl ScanBranch {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn build_plan(&self, app: &AppConfig) -> Plan {
        let repo = &app.repository;
        let url = mask_secrets(&repo.url);
        let token = mask_value(app.analysis.token.as_deref().unwrap_or_default());
        let builder = Plan::builder(self.name())
            .step(
                "clone",
                [("url", url.as_str()), ("branch", repo.branch.as_str())],
                vec!["temporary checkout created".to_string()],
            )
            .step(
                "analyse",
                [
                    ("project_key", app.analysis.project_key.as_str()),
                    ("host_url", app.analysis.host_url.as_str()),
                    ("source_dir", repo.source_dir.as_str()),
                    ("token", token.as_str()),
                ],
                vec!["analysis report uploaded to the server".to_string()],
            );
        with_checks(builder, checks(app))
            .summary(format!("Analyse branch {} of {}", repo.branch, url))
            .build()
    }

    fn scan(&self, ctx: &ExecContext, app: &AppConfig) -> Result<ScanReport> {
        require_checks(checks(app))?;
        let repo = &app.repository;
        let tag = tag_failure(ErrorCode::ScanFailed, "Branch scan");

        let workspace = temp_workspace(app, "stagehand-scan-")?;
        let checkout = workspace.path().join(CHECKOUT_DIR);
        let url = authenticated_url(&repo.url, repo.token.as_deref());

        let report = self.analyse(ctx, app, &url, &checkout).map_err(&tag);
        if let Err(e) = workspace.close() {
            log_status!("scan", "Warning: could not remove checkout: {}", e);
        }
        report
    }

    fn analyse(&self, ctx: &ExecContext, app: &AppConfig, url: &str, checkout: &Path) -> Result<ScanReport> {
        let repo = &app.repository;
        self.platform.vcs.clone_repo(ctx, url, checkout)?;
        self.platform.vcs.switch_branch(ctx, checkout, &repo.branch)?;

        let sources = checkout.join(&repo.source_dir);
        if !sources.is_dir() {
            return Err(Error::config_invalid_value(
                "repository.source_dir",
                Some(repo.source_dir.clone()),
                "directory not found in the checkout",
            ));
        }
        log_status!("scan", "Analysing {} ({})", app.analysis.project_key, repo.branch);
        self.platform
            .analyzer
            .scan(ctx, &sources, &repo.branch, &app.analysis)
    }
}

impl Handler for ScanBranch {
    fn name(&self) -> &str {
        CommandId::ScanBranch.as_str()
    }

    fn description(&self) -> &str {
        CommandId::ScanBranch.description()
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        run_planned(
            ctx,
            cfg,
            self.name(),
            || Ok(self.build_plan(&cfg.app)),
            |ctx| self.scan(ctx, &cfg.app),
        )
    }

    fn plan(&self, cfg: &RunConfig) -> Option<Result<Plan>> {
        Some(Ok(self.build_plan(&cfg.app)))
    }
}
