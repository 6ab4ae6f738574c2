//! Environment-driven run settings.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `STAGEHAND_OUTPUT` | `json` or `text` (default `text`) |
//! | `STAGEHAND_DRY_RUN` / `STAGEHAND_PLAN_ONLY` / `STAGEHAND_VERBOSE` | preview flags, `true`/`1` |
//! | `STAGEHAND_TIMEOUT` | default workflow timeout (default `4h`) |
//! | `STAGEHAND_TIMEOUT_<COMMAND>` | per-command override, e.g. `STAGEHAND_TIMEOUT_REPO_SYNC` |
//! | `STAGEHAND_SKIP_STAGES` | comma-separated pipeline stages to bypass |
//! | `STAGEHAND_CONFIG` | configuration file path |

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use heck::ToShoutySnakeCase;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::mode::{parse_flag, ModeFlags};
use crate::utils::duration::parse_duration;

pub const ENV_PREFIX: &str = "STAGEHAND";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "human" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(Error::config_invalid_value(
                env_key("OUTPUT"),
                Some(other.to_string()),
                "expected 'json' or 'text'",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub default: Duration,
    pub per_command: HashMap<String, Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default: DEFAULT_TIMEOUT,
            per_command: HashMap::new(),
        }
    }
}

impl Timeouts {
    pub fn for_command(&self, command: &str) -> Duration {
        self.per_command
            .get(command)
            .copied()
            .unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub format: OutputFormat,
    pub flags: ModeFlags,
    pub timeouts: Timeouts,
    pub skip_stages: BTreeSet<String>,
    pub config_path: Option<String>,
}

pub fn env_key(suffix: &str) -> String {
    format!("{}_{}", ENV_PREFIX, suffix)
}

/// `STAGEHAND_TIMEOUT_REPO_SYNC` for `repo-sync`.
pub fn timeout_key(command: &str) -> String {
    env_key(&format!("TIMEOUT_{}", command.to_shouty_snake_case()))
}

pub fn parse_skip_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_timeout(key: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|problem| Error::config_invalid_value(key, Some(value.to_string()), problem))
}

impl Settings {
    pub fn from_env(commands: &[&str]) -> Result<Self> {
        Self::from_lookup(commands, |key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary lookup; `commands` lists the names
    /// whose per-command timeout variables are consulted.
    pub fn from_lookup<F>(commands: &[&str], lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |suffix: &str| lookup(&env_key(suffix)).is_some_and(|v| parse_flag(&v));

        let format = match lookup(&env_key("OUTPUT")) {
            Some(value) => OutputFormat::parse(&value)?,
            None => OutputFormat::Text,
        };

        let mut timeouts = Timeouts::default();
        let default_key = env_key("TIMEOUT");
        if let Some(value) = lookup(&default_key) {
            timeouts.default = parse_timeout(&default_key, &value)?;
        }
        for command in commands {
            let key = timeout_key(command);
            if let Some(value) = lookup(&key) {
                let duration = parse_timeout(&key, &value)?;
                timeouts.per_command.insert(command.to_string(), duration);
            }
        }

        Ok(Self {
            format,
            flags: ModeFlags {
                dry_run: flag("DRY_RUN"),
                plan_only: flag("PLAN_ONLY"),
                verbose: flag("VERBOSE"),
            },
            timeouts,
            skip_stages: lookup(&env_key("SKIP_STAGES"))
                .map(|v| parse_skip_list(&v))
                .unwrap_or_default(),
            config_path: lookup(&env_key("CONFIG")).filter(|v| !v.trim().is_empty()),
        })
    }
}
