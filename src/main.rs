use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use stagehand::commands::{build_registry, CommandId};
use stagehand::config::{AppConfig, RunConfig};
use stagehand::context::ExecContext;
use stagehand::platform::Platform;
use stagehand::registry::Registry;
use stagehand::response::{metadata, Envelope};
use stagehand::settings::{parse_skip_list, OutputFormat, Settings};
use stagehand::utils::duration::parse_duration;
use stagehand::{Error, Result};

mod tty;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LIST_COMMAND: &str = "list";

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(version = VERSION)]
#[command(about = "Orchestrates configuration sync, database and deployment tasks")]
struct Cli {
    /// Command to run (`list` shows all of them)
    command: Option<String>,

    /// Application configuration file (JSON or YAML)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Output format: json or text
    #[arg(long, global = true)]
    format: Option<String>,

    /// Describe what would run, run nothing
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print the plan only
    #[arg(long, global = true)]
    plan_only: bool,

    /// Print the plan, then run
    #[arg(long, global = true)]
    verbose: bool,

    /// Pipeline stages to bypass (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    skip: Vec<String>,

    /// Timeout for this command, e.g. 90m or 1h30m
    #[arg(long, global = true)]
    timeout: Option<String>,
}

impl Cli {
    /// Environment settings with command-line overrides applied.
    fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::from_env(&CommandId::names())?;
        if let Some(format) = &self.format {
            settings.format = OutputFormat::parse(format)?;
        }
        settings.flags.dry_run |= self.dry_run;
        settings.flags.plan_only |= self.plan_only;
        settings.flags.verbose |= self.verbose;
        settings
            .skip_stages
            .extend(parse_skip_list(&self.skip.join(",")));
        if let Some(raw) = &self.timeout {
            let Some(command) = &self.command else {
                return Err(Error::validation_missing_argument(vec!["command".to_string()]));
            };
            let timeout = parse_duration(raw).map_err(|problem| {
                Error::validation_invalid_argument("timeout", problem, Some(raw.clone()), None)
            })?;
            // Handlers look their timeout up by primary name.
            let primary = CommandId::resolve(command)
                .map(|id| id.as_str().to_string())
                .unwrap_or_else(|| command.clone());
            settings.timeouts.per_command.insert(primary, timeout);
        }
        if self.config.is_some() {
            settings.config_path = self.config.clone();
        }
        Ok(settings)
    }
}

fn load_config(settings: &Settings) -> Result<AppConfig> {
    match &settings.config_path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

fn print_command_list(ctx: &ExecContext, registry: &Registry, format: OutputFormat, started: Instant) -> Result<()> {
    let commands = registry.list_all_with_aliases();
    match format {
        OutputFormat::Json => {
            let envelope = Envelope::success(LIST_COMMAND, commands, metadata(ctx, started));
            ctx.console().out_line(&envelope.to_json()?)
        }
        OutputFormat::Text => {
            let width = commands.iter().map(|c| c.name.len()).max().unwrap_or(0);
            for info in commands {
                let alias = info
                    .deprecated_alias
                    .map(|a| format!(" (was: {})", a))
                    .unwrap_or_default();
                ctx.console().out_line(&format!(
                    "  {:width$}  {}{}",
                    info.name,
                    info.description,
                    alias,
                    width = width
                ))?;
            }
            Ok(())
        }
    }
}

/// Failures raised before any handler could answer for itself.
fn report_early_error(ctx: &ExecContext, command: &str, format: OutputFormat, started: Instant, err: &Error) {
    match format {
        OutputFormat::Json => {
            let envelope = Envelope::<serde_json::Value>::from_error(command, err, metadata(ctx, started));
            match envelope.to_json() {
                Ok(json) => println!("{}", json),
                Err(_) => report_text_error(err),
            }
        }
        OutputFormat::Text => report_text_error(err),
    }
}

fn report_text_error(err: &Error) {
    eprintln!("Error [{}]: {}", err.code.as_str(), err.message);
    for hint in &err.hints {
        eprintln!("  hint: {}", hint.message);
    }
}

fn run(cli: &Cli, ctx: &ExecContext, started: Instant) -> (Result<()>, bool) {
    let command = cli.command.as_deref().unwrap_or(LIST_COMMAND);

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(err) => return (Err(err), false),
    };
    let app = match load_config(&settings) {
        Ok(app) => app,
        Err(err) => return (Err(err), false),
    };
    let registry = match build_registry(Platform::from_config(&app)) {
        Ok(registry) => registry,
        Err(err) => return (Err(err), false),
    };

    if command == LIST_COMMAND {
        return (print_command_list(ctx, &registry, settings.format, started), false);
    }

    let Some(handler) = registry.get(command) else {
        return (Err(Error::command_not_found(command)), false);
    };

    let cfg = RunConfig {
        app: Arc::new(app),
        settings,
    };
    (handler.execute(ctx, &cfg), true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let started = Instant::now();
    let ctx = ExecContext::background();
    let command = cli.command.clone().unwrap_or_else(|| LIST_COMMAND.to_string());

    // Format errors are reported in the format the user asked for, when it parses.
    let format = cli
        .format
        .as_deref()
        .and_then(|f| OutputFormat::parse(f).ok())
        .or_else(|| Settings::from_env(&[]).ok().map(|s| s.format))
        .unwrap_or_default();

    let (result, handler_ran) = run(&cli, &ctx, started);
    let exit_code = match result {
        Ok(()) => 0,
        Err(err) => {
            if !handler_ran {
                report_early_error(&ctx, &command, format, started, &err);
            } else if format == OutputFormat::Text {
                report_text_error(&err);
            }
            err.code.exit_code()
        }
    };

    if handler_ran {
        tty::status(&format!(
            "{} finished in {}ms (exit {})",
            command,
            started.elapsed().as_millis(),
            exit_code
        ));
    }
    ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
