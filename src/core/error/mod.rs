use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sync::SyncStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidValue,
    ConfigParseFailed,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidUrl,

    CommandNotFound,
    CommandAlreadyRegistered,
    CommandInvalidName,
    CommandInvalidAlias,

    SyncStageFailed(SyncStage),
    PipelineStageFailed,

    ConvertFailed,
    StoreLoadFailed,
    DbRestoreFailed,
    DbUpdateFailed,
    ServiceModeFailed,
    ScanFailed,

    PlatformCommandFailed,
    PlatformToolNotConfigured,

    WorkflowTimeout,
    WorkflowCancelled,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigParseFailed => "config.parse_failed",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidUrl => "validation.invalid_url",

            ErrorCode::CommandNotFound => "command.not_found",
            ErrorCode::CommandAlreadyRegistered => "command.already_registered",
            ErrorCode::CommandInvalidName => "command.invalid_name",
            ErrorCode::CommandInvalidAlias => "command.invalid_alias",

            ErrorCode::SyncStageFailed(stage) => stage.error_code(),
            ErrorCode::PipelineStageFailed => "pipeline.stage_failed",

            ErrorCode::ConvertFailed => "convert.failed",
            ErrorCode::StoreLoadFailed => "store.load_failed",
            ErrorCode::DbRestoreFailed => "db.restore_failed",
            ErrorCode::DbUpdateFailed => "db.update_failed",
            ErrorCode::ServiceModeFailed => "service_mode.failed",
            ErrorCode::ScanFailed => "scan.failed",

            ErrorCode::PlatformCommandFailed => "platform.command_failed",
            ErrorCode::PlatformToolNotConfigured => "platform.tool_not_configured",

            ErrorCode::WorkflowTimeout => "workflow.timeout",
            ErrorCode::WorkflowCancelled => "workflow.cancelled",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Process exit status the dispatcher uses for this code.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCode::ConfigMissingKey
            | ErrorCode::ConfigInvalidValue
            | ErrorCode::ConfigParseFailed
            | ErrorCode::ValidationMissingArgument
            | ErrorCode::ValidationInvalidArgument
            | ErrorCode::ValidationInvalidUrl
            | ErrorCode::CommandAlreadyRegistered
            | ErrorCode::CommandInvalidName
            | ErrorCode::CommandInvalidAlias => 2,

            ErrorCode::CommandNotFound => 4,

            ErrorCode::SyncStageFailed(_)
            | ErrorCode::PipelineStageFailed
            | ErrorCode::ConvertFailed
            | ErrorCode::StoreLoadFailed
            | ErrorCode::DbRestoreFailed
            | ErrorCode::DbUpdateFailed
            | ErrorCode::ServiceModeFailed
            | ErrorCode::ScanFailed
            | ErrorCode::PlatformCommandFailed
            | ErrorCode::PlatformToolNotConfigured => 20,

            ErrorCode::WorkflowTimeout | ErrorCode::WorkflowCancelled => 124,

            ErrorCode::InternalIoError
            | ErrorCode::InternalJsonError
            | ErrorCode::InternalUnexpected => 1,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ConfigMissingKeyDetails {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConfigInvalidValueDetails {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    problem: String,
}

#[derive(Debug, Serialize)]
struct InvalidArgumentDetails {
    field: String,
    problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct InternalDetails {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

/// Output of an external tool that exited unsuccessfully.
#[derive(Debug, Clone, Serialize)]
pub struct CommandFailedDetails {
    pub operation: String,
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        let message = format!("Missing required configuration key '{}'", key);
        Self::new(
            ErrorCode::ConfigMissingKey,
            message,
            to_details(ConfigMissingKeyDetails { key, path }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let problem = problem.into();
        let message = format!("Invalid configuration value for '{}': {}", key, problem);
        Self::new(
            ErrorCode::ConfigInvalidValue,
            message,
            to_details(ConfigInvalidValueDetails {
                key,
                value,
                problem,
            }),
        )
    }

    pub fn config_parse_failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigParseFailed,
            format!("Failed to parse configuration file {}", path),
            serde_json::json!({ "path": path, "error": error.into() }),
        )
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            format!("Missing required argument: {}", args.join(", ")),
            serde_json::json!({ "args": args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let field = field.into();
        let problem = problem.into();
        let message = format!("Invalid argument '{}': {}", field, problem);
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            message,
            to_details(InvalidArgumentDetails {
                field,
                problem,
                id,
                tried,
            }),
        )
    }

    pub fn validation_invalid_url(field: impl Into<String>, problem: impl Into<String>) -> Self {
        let field = field.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::ValidationInvalidUrl,
            format!("Invalid URL in '{}': {}", field, problem),
            serde_json::json!({ "field": field, "problem": problem }),
        )
    }

    pub fn command_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::CommandNotFound,
            format!("Unknown command '{}'", name),
            serde_json::json!({ "name": name }),
        )
        .with_hint("Run 'stagehand list' to see available commands")
    }

    pub fn command_already_registered(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::CommandAlreadyRegistered,
            format!("Command '{}' is already registered", name),
            serde_json::json!({ "name": name }),
        )
    }

    pub fn command_invalid_name(name: impl Into<String>, problem: impl Into<String>) -> Self {
        let name = name.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::CommandInvalidName,
            format!("Invalid command name '{}': {}", name, problem),
            serde_json::json!({ "name": name, "problem": problem }),
        )
    }

    pub fn command_invalid_alias(alias: impl Into<String>, problem: impl Into<String>) -> Self {
        let alias = alias.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::CommandInvalidAlias,
            format!("Invalid deprecated alias '{}': {}", alias, problem),
            serde_json::json!({ "alias": alias, "problem": problem }),
        )
    }

    pub fn platform_command_failed(details: CommandFailedDetails) -> Self {
        let message = format!(
            "{} failed with exit code {}",
            details.operation, details.exit_code
        );
        Self::new(ErrorCode::PlatformCommandFailed, message, to_details(details))
    }

    pub fn platform_tool_not_configured(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        Self::new(
            ErrorCode::PlatformToolNotConfigured,
            format!("No command template configured for '{}'", operation),
            serde_json::json!({ "operation": operation }),
        )
        .with_hint(format!(
            "Add a 'tools.commands.{}' entry to the configuration file",
            operation
        ))
    }

    pub fn workflow_timeout(limit: Option<std::time::Duration>) -> Self {
        let limit_ms = limit.map(|d| d.as_millis() as u64);
        let message = match limit {
            Some(limit) => format!(
                "Deadline exceeded after {}",
                crate::utils::duration::format_duration(limit)
            ),
            None => "Deadline exceeded".to_string(),
        };
        Self::new(
            ErrorCode::WorkflowTimeout,
            message,
            serde_json::json!({ "timeout_ms": limit_ms }),
        )
        .with_hint("Raise the limit with --timeout or STAGEHAND_TIMEOUT_<COMMAND>")
    }

    pub fn workflow_cancelled() -> Self {
        Self::new(
            ErrorCode::WorkflowCancelled,
            "Execution cancelled",
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    /// Re-tag an error with a domain code, keeping the original as the cause.
    pub fn tagged(code: ErrorCode, message: impl Into<String>, cause: &Error) -> Self {
        Self::new(
            code,
            message,
            serde_json::json!({
                "cause": {
                    "code": cause.code.as_str(),
                    "message": cause.message,
                    "details": cause.details,
                }
            }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Merge extra fields into `details`, replacing non-object details.
    pub fn with_detail(mut self, key: &str, value: impl Serialize) -> Self {
        if !self.details.is_object() {
            self.details = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut self.details {
            map.insert(key.to_string(), to_details(value));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXED_CODES: &[ErrorCode] = &[
        ErrorCode::ConfigMissingKey,
        ErrorCode::ConfigInvalidValue,
        ErrorCode::ConfigParseFailed,
        ErrorCode::ValidationMissingArgument,
        ErrorCode::ValidationInvalidArgument,
        ErrorCode::ValidationInvalidUrl,
        ErrorCode::CommandNotFound,
        ErrorCode::CommandAlreadyRegistered,
        ErrorCode::CommandInvalidName,
        ErrorCode::CommandInvalidAlias,
        ErrorCode::PipelineStageFailed,
        ErrorCode::ConvertFailed,
        ErrorCode::StoreLoadFailed,
        ErrorCode::DbRestoreFailed,
        ErrorCode::DbUpdateFailed,
        ErrorCode::ServiceModeFailed,
        ErrorCode::ScanFailed,
        ErrorCode::PlatformCommandFailed,
        ErrorCode::PlatformToolNotConfigured,
        ErrorCode::WorkflowTimeout,
        ErrorCode::WorkflowCancelled,
        ErrorCode::InternalIoError,
        ErrorCode::InternalJsonError,
        ErrorCode::InternalUnexpected,
    ];

    fn all_codes() -> Vec<ErrorCode> {
        let mut codes = FIXED_CODES.to_vec();
        codes.extend(SyncStage::ALL.iter().map(|stage| ErrorCode::SyncStageFailed(*stage)));
        codes
    }

    #[test]
    fn codes_follow_domain_dot_reason() {
        for code in all_codes() {
            let rendered = code.as_str();
            let (domain, reason) = rendered.split_once('.').unwrap();
            assert!(!domain.is_empty(), "{}", rendered);
            assert!(!reason.is_empty(), "{}", rendered);
            assert!(!reason.contains('.'), "{}", rendered);
        }
    }

    #[test]
    fn rendered_codes_are_unique() {
        let codes = all_codes();
        let rendered: std::collections::BTreeSet<&str> = codes.iter().map(ErrorCode::as_str).collect();
        assert_eq!(rendered.len(), codes.len());
        assert_eq!(ErrorCode::SyncStageFailed(SyncStage::Backup).as_str(), "sync.backup_failed");
    }

    #[test]
    fn timeout_and_failure_map_to_different_exit_codes() {
        let timeout = ErrorCode::WorkflowTimeout.exit_code();
        let failure = ErrorCode::SyncStageFailed(SyncStage::CommitToStore).exit_code();
        assert_ne!(timeout, failure);
    }

    #[test]
    fn with_detail_extends_object_details() {
        let err = Error::command_not_found("nope").with_detail("stage", "clone-repository");
        assert_eq!(err.details["name"], "nope");
        assert_eq!(err.details["stage"], "clone-repository");
    }

    #[test]
    fn tagged_keeps_cause() {
        let cause = Error::platform_tool_not_configured("store.bind");
        let err = Error::tagged(ErrorCode::StoreLoadFailed, "Store load failed", &cause);
        assert_eq!(err.code, ErrorCode::StoreLoadFailed);
        assert_eq!(
            err.details["cause"]["code"],
            "platform.tool_not_configured"
        );
    }
}
