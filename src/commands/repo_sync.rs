use crate::commands::{run_planned, CommandId};
use crate::config::RunConfig;
use crate::context::ExecContext;
use crate::error::Result;
use crate::mode::Plan;
use crate::platform::Platform;
use crate::registry::Handler;
use crate::sync;

/// `repo-sync`: the 18-stage repository to store synchronisation.
pub struct RepoSync {
    platform: Platform,
}

impl RepoSync {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

impl Handler for RepoSync {
    fn name(&self) -> &str {
        CommandId::RepoSync.as_str()
    }

    fn description(&self) -> &str {
        CommandId::RepoSync.description()
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        run_planned(
            ctx,
            cfg,
            self.name(),
            || Ok(sync::plan(self.name(), &cfg.app)),
            |ctx| sync::run(ctx, cfg.app.clone(), self.platform.clone()),
        )
    }

    fn plan(&self, cfg: &RunConfig) -> Option<Result<Plan>> {
        Some(Ok(sync::plan(self.name(), &cfg.app)))
    }
}
