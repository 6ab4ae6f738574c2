//! Application configuration file and the per-run configuration handed to
//! handlers.
//!
//! The file is JSON or YAML (by extension). Every section has serde defaults
//! so a partial file is valid; required keys are checked by the commands that
//! need them, not at load time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Infobase on a database server.
    #[default]
    Server,
    /// File infobase.
    File,
    /// Throwaway database provisioned for the run and dropped afterwards.
    Scratch,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfobaseConfig {
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub storage_mode: StorageMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Directory inside the checkout holding the configuration sources.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            branch: default_branch(),
            token: None,
            source_dir: default_source_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    /// Backup file used by `db-restore` when none is passed explicitly.
    #[serde(default)]
    pub restore_from: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            name: String::new(),
            user: String::new(),
            password: String::new(),
            backup_dir: default_backup_dir(),
            restore_from: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Parent for temporary working copies; system temp dir when unset.
    #[serde(default)]
    pub work_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_git_bin")]
    pub git: String,
    /// Command template per operation, e.g. `"store.bind"`.
    #[serde(default = "default_commands")]
    pub commands: HashMap<String, String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            git: default_git_bin(),
            commands: default_commands(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceModeConfig {
    #[serde(default = "default_service_message")]
    pub message: String,
    #[serde(default = "default_permission_code")]
    pub permission_code: String,
}

impl Default for ServiceModeConfig {
    fn default() -> Self {
        Self {
            message: default_service_message(),
            permission_code: default_permission_code(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub project_key: String,
    #[serde(default)]
    pub host_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default)]
    pub source_dir: String,
    #[serde(default)]
    pub target_dir: String,
    /// `edt-to-xml` or `xml-to-edt`.
    #[serde(default = "default_conversion_direction")]
    pub direction: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            source_dir: String::new(),
            target_dir: String::new(),
            direction: default_conversion_direction(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub infobase: InfobaseConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub service_mode: ServiceModeConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_branch() -> String {
    "main".to_string()
}

fn default_source_dir() -> String {
    "src".to_string()
}

fn default_backup_dir() -> String {
    "~/.stagehand/backups".to_string()
}

fn default_git_bin() -> String {
    "git".to_string()
}

fn default_service_message() -> String {
    "Scheduled maintenance in progress".to_string()
}

fn default_permission_code() -> String {
    "stagehand".to_string()
}

fn default_conversion_direction() -> String {
    "edt-to-xml".to_string()
}

/// Command templates for the platform operations. `{{var}}` placeholders are
/// filled from `AppConfig` by the shell adapter, which shell-quotes each value.
pub fn default_commands() -> HashMap<String, String> {
    let designer = "platform DESIGNER /IBConnectionString {{infobase}} /N {{ib_user}} /P {{ib_password}} /DisableStartupDialogs";
    let store = "/ConfigurationRepositoryF {{store_path}} /ConfigurationRepositoryN {{store_user}} /ConfigurationRepositoryP {{store_password}}";
    [
        ("config.convert", "converter {{direction}} --source {{source_dir}} --target {{target_dir}}".to_string()),
        ("config.load", format!("{} /LoadConfigFromFiles {{{{source_dir}}}}", designer)),
        ("config.init", "platform CREATEINFOBASE {{infobase}}".to_string()),
        ("config.update", format!("{} /UpdateDBCfg", designer)),
        ("config.dump", format!("{} /DumpCfg {{{{file}}}}", designer)),
        ("config.merge", format!("{} /MergeCfg {{{{file}}}} -force", designer)),
        ("store.unbind", format!("{} /ConfigurationRepositoryUnbindCfg -force", designer)),
        ("store.bind", format!("{} {} /ConfigurationRepositoryBindCfg -forceReplaceCfg", designer, store)),
        ("store.load_to_db", format!("{} {} /ConfigurationRepositoryUpdateCfg -force", designer, store)),
        ("store.lock", format!("{} {} /ConfigurationRepositoryLock -revised", designer, store)),
        ("store.commit", format!("{} {} /ConfigurationRepositoryCommit -comment {{{{message}}}} -keepLocked", designer, store)),
        ("db.backup", "dbtool backup --server {{db_server}} --db {{db_name}} --user {{db_user}} --password {{db_password}} --out {{file}}".to_string()),
        ("db.restore", "dbtool restore --server {{db_server}} --db {{db_name}} --user {{db_user}} --password {{db_password}} --in {{file}}".to_string()),
        ("db.create", "dbtool create --server {{db_server}} --db {{db_name}} --user {{db_user}} --password {{db_password}}".to_string()),
        ("db.drop", "dbtool drop --server {{db_server}} --db {{db_name}} --user {{db_user}} --password {{db_password}}".to_string()),
        ("service_mode.enable", "rac session-block on --infobase {{infobase}} --message {{message}} --permission-code {{permission_code}}".to_string()),
        ("service_mode.disable", "rac session-block off --infobase {{infobase}}".to_string()),
        ("service_mode.status", "rac session-block status --infobase {{infobase}}".to_string()),
        ("analysis.scan", "sonar-scanner -Dsonar.projectKey={{project_key}} -Dsonar.host.url={{host_url}} -Dsonar.branch.name={{branch}} -Dsonar.sources={{source_dir}} -Dsonar.token={{token}}".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

impl AppConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file. `~` is expanded.
    pub fn load(path: &str) -> Result<Self> {
        let expanded = expand_path(path);
        let raw = std::fs::read_to_string(&expanded).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", expanded)))
        })?;
        Self::parse(&raw, &expanded)
    }

    pub fn parse(raw: &str, path: &str) -> Result<Self> {
        let is_yaml = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

        let mut config: AppConfig = if is_yaml {
            serde_yml::from_str(raw).map_err(|e| Error::config_parse_failed(path, e.to_string()))?
        } else {
            serde_json::from_str(raw).map_err(|e| Error::config_parse_failed(path, e.to_string()))?
        };

        // User templates extend the defaults instead of replacing them.
        let mut commands = default_commands();
        commands.extend(std::mem::take(&mut config.tools.commands));
        config.tools.commands = commands;
        Ok(config)
    }
}

pub fn expand_path(path: &str) -> String {
    shellexpand::tilde(path).to_string()
}

/// Everything a handler receives besides the execution context.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub app: Arc<AppConfig>,
    pub settings: Settings,
}

impl RunConfig {
    pub fn new(app: AppConfig, settings: Settings) -> Self {
        Self {
            app: Arc::new(app),
            settings,
        }
    }
}
