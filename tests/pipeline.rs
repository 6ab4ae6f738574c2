mod common;

use std::collections::BTreeSet;

use serde_json::json;

use common::{app_config, captured_ctx, entries, journal, run_config, FakePlatform, Probe};
use stagehand::commands::build_registry;
use stagehand::commands::deploy::deploy_pipeline;
use stagehand::pipeline::{Pipeline, PipelineStage, SKIP_LIST_REASON};
use stagehand::settings::OutputFormat;
use stagehand::{AppConfig, ErrorCode, Registry};

fn three_probes(registry: &Registry, calls: &std::sync::Arc<std::sync::Mutex<Vec<String>>>) {
    registry.register(Probe::new("first", calls).arc()).unwrap();
    registry.register(Probe::new("second", calls).arc()).unwrap();
    registry.register(Probe::new("third", calls).arc()).unwrap();
}

fn skip(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn false_predicate_skips_stage_without_running_it() {
    let registry = Registry::new();
    let calls = journal();
    three_probes(&registry, &calls);

    let pipeline = Pipeline::new("release")
        .stage(PipelineStage::new("first"))
        .stage(PipelineStage::new("second").should_run("nothing to publish", |_| false));

    let ctx = captured_ctx();
    let cfg = run_config(AppConfig::default(), OutputFormat::Json);
    let report = pipeline.run(&ctx, &registry, &cfg, &BTreeSet::new()).unwrap();

    assert_eq!(entries(&calls), vec!["first"]);
    let second = &report.stages[1];
    assert!(second.skipped);
    assert!(second.success);
    assert_eq!(second.reason.as_deref(), Some("nothing to publish"));
    assert_eq!(report.executed, 1);
    assert_eq!(report.skipped, 1);
}

#[test]
fn skip_list_bypasses_named_stage() {
    let registry = Registry::new();
    let calls = journal();
    three_probes(&registry, &calls);

    let pipeline = Pipeline::new("release")
        .stage(PipelineStage::new("first"))
        .stage(PipelineStage::new("second"))
        .stage(PipelineStage::new("third"));

    let ctx = captured_ctx();
    let cfg = run_config(AppConfig::default(), OutputFormat::Json);
    let report = pipeline.run(&ctx, &registry, &cfg, &skip(&["second"])).unwrap();

    assert_eq!(entries(&calls), vec!["first", "third"]);
    assert!(report.stages[1].skipped);
    assert_eq!(report.stages[1].reason.as_deref(), Some(SKIP_LIST_REASON));
    assert!(!report.stages[2].skipped);
}

#[test]
fn failing_stage_stops_pipeline_and_is_named() {
    let registry = Registry::new();
    let calls = journal();
    registry.register(Probe::new("first", &calls).arc()).unwrap();
    registry
        .register(Probe::new("second", &calls).failing().arc())
        .unwrap();
    registry.register(Probe::new("third", &calls).arc()).unwrap();

    let pipeline = Pipeline::new("release")
        .stage(PipelineStage::new("first"))
        .stage(PipelineStage::new("second"))
        .stage(PipelineStage::new("third"));

    let ctx = captured_ctx();
    let cfg = run_config(AppConfig::default(), OutputFormat::Json);
    let err = pipeline
        .run(&ctx, &registry, &cfg, &BTreeSet::new())
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::PipelineStageFailed);
    assert!(err.message.contains("second"));
    assert_eq!(err.details["stage"], "second");

    let outcomes = err.details["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["success"], true);
    assert_eq!(outcomes[1]["success"], false);
    assert_eq!(entries(&calls), vec!["first", "second"]);
}

#[test]
fn hooks_share_child_results_through_context() {
    let registry = Registry::new();
    let calls = journal();
    registry
        .register(
            Probe::new("first", &calls)
                .with_data(json!({ "artifact": "build-42.zip" }))
                .arc(),
        )
        .unwrap();
    registry.register(Probe::new("second", &calls).arc()).unwrap();

    let pipeline = Pipeline::new("release")
        .stage(PipelineStage::new("first").after_run(|pctx, data| {
            pctx.insert("artifact", data["artifact"].as_str().unwrap_or_default())
        }))
        .stage(
            PipelineStage::new("second")
                .should_run("no artifact", |pctx| pctx.contains("artifact"))
                .before_run(|pctx| {
                    let artifact: String = pctx.get("artifact").unwrap_or_default();
                    pctx.insert("uploaded", format!("s3://bucket/{}", artifact))
                }),
        );

    let ctx = captured_ctx();
    let cfg = run_config(AppConfig::default(), OutputFormat::Text);
    let report = pipeline.run(&ctx, &registry, &cfg, &BTreeSet::new()).unwrap();

    assert_eq!(entries(&calls), vec!["first", "second"]);
    assert_eq!(report.executed, 2);
    // Child output is captured, not written to the caller's stdout.
    assert!(ctx.console().out_text().is_empty());
}

#[test]
fn deploy_leaves_service_mode_alone_when_already_enabled() {
    let fake = FakePlatform::new();
    fake.set_service_mode(true);
    let registry = build_registry(fake.platform()).unwrap();

    let ctx = captured_ctx();
    let cfg = run_config(app_config(), OutputFormat::Json);
    let report = deploy_pipeline()
        .run(&ctx, &registry, &cfg, &BTreeSet::new())
        .unwrap();

    assert_eq!(fake.count("service_mode.enable"), 0);
    assert_eq!(fake.count("service_mode.disable"), 0);
    assert!(fake.service_mode());
    let disable = report.stages.last().unwrap();
    assert_eq!(disable.name, "service-mode-disable");
    assert!(disable.skipped);
}

#[test]
fn deploy_switches_service_mode_off_again() {
    let fake = FakePlatform::new();
    let registry = build_registry(fake.platform()).unwrap();

    let ctx = captured_ctx();
    let cfg = run_config(app_config(), OutputFormat::Text);
    registry
        .get("deploy-pipeline")
        .unwrap()
        .execute(&ctx, &cfg)
        .unwrap();

    assert_eq!(fake.count("service_mode.enable"), 1);
    assert_eq!(fake.count("store.load_to_db"), 1);
    assert_eq!(fake.count("service_mode.disable"), 1);
    assert!(!fake.service_mode());
    assert!(ctx.console().out_text().contains("deploy-pipeline completed"));
}

#[test]
fn deploy_stops_before_disabling_when_update_fails() {
    let fake = FakePlatform::new();
    fake.fail_on("config.update");
    let registry = build_registry(fake.platform()).unwrap();

    let ctx = captured_ctx();
    let cfg = run_config(app_config(), OutputFormat::Json);
    let err = deploy_pipeline()
        .run(&ctx, &registry, &cfg, &BTreeSet::new())
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::PipelineStageFailed);
    assert_eq!(err.details["stage"], "store-to-db");
    assert_eq!(fake.count("service_mode.disable"), 0);
}
