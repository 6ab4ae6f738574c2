use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::commands::{run_planned, CommandId};
use crate::config::RunConfig;
use crate::context::ExecContext;
use crate::error::{Error, Result};
use crate::mode::Plan;
use crate::pipeline::{Pipeline, PipelineStage};
use crate::registry::{Handler, Registry};

/// Set by the enable stage: whether this run switched service mode on.
pub const SERVICE_MODE_SWITCHED: &str = "service_mode_switched";

/// Enable service mode, load the store, update the database, and switch
/// service mode back off only if this run turned it on.
pub fn deploy_pipeline() -> Pipeline {
    Pipeline::new(CommandId::DeployPipeline.as_str())
        .stage(
            PipelineStage::new(CommandId::ServiceModeEnable.as_str()).after_run(|pctx, data| {
                let changed = data.get("changed").and_then(Value::as_bool).unwrap_or(false);
                pctx.insert(SERVICE_MODE_SWITCHED, changed)
            }),
        )
        .stage(PipelineStage::new(CommandId::StoreToDb.as_str()))
        .stage(PipelineStage::new(CommandId::DbUpdate.as_str()))
        .stage(
            PipelineStage::new(CommandId::ServiceModeDisable.as_str()).should_run(
                "service mode was not enabled by this run",
                |pctx| pctx.get::<bool>(SERVICE_MODE_SWITCHED).unwrap_or(false),
            ),
        )
}

pub struct DeployPipeline {
    registry: Weak<Registry>,
    pipeline: Pipeline,
}

impl DeployPipeline {
    pub fn new(registry: Weak<Registry>) -> Self {
        Self {
            registry,
            pipeline: deploy_pipeline(),
        }
    }

    fn registry(&self) -> Result<Arc<Registry>> {
        self.registry
            .upgrade()
            .ok_or_else(|| Error::internal_unexpected("command registry is no longer available"))
    }
}

impl Handler for DeployPipeline {
    fn name(&self) -> &str {
        CommandId::DeployPipeline.as_str()
    }

    fn description(&self) -> &str {
        CommandId::DeployPipeline.description()
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        let registry = self.registry()?;
        let skip = &cfg.settings.skip_stages;
        run_planned(
            ctx,
            cfg,
            self.name(),
            || Ok(self.pipeline.plan(&registry, skip)),
            |ctx| self.pipeline.run(ctx, &registry, cfg, skip),
        )
    }

    fn plan(&self, cfg: &RunConfig) -> Option<Result<Plan>> {
        Some(
            self.registry()
                .map(|registry| self.pipeline.plan(&registry, &cfg.settings.skip_stages)),
        )
    }
}
