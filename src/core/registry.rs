//! Command registry and deprecated-name bridges.
//!
//! The registry maps command names to handlers. It is built once from an
//! explicit registration list and shared as `Arc<Registry>`; lookups take a
//! read lock, registration a write lock.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;
use serde::Serialize;

use crate::config::RunConfig;
use crate::context::ExecContext;
use crate::error::{Error, Result};
use crate::mode::Plan;

static COMMAND_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").unwrap());

/// A named, executable command.
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()>;

    /// Preview of what `execute` would do. `None` means the command does not
    /// support planning.
    fn plan(&self, _cfg: &RunConfig) -> Option<Result<Plan>> {
        None
    }

    fn as_bridge(&self) -> Option<&DeprecationBridge> {
        None
    }
}

pub fn is_valid_command_name(name: &str) -> bool {
    COMMAND_NAME.is_match(name)
}

/// Runs the wrapped handler under a legacy name, warning on every call.
pub struct DeprecationBridge {
    actual: Arc<dyn Handler>,
    deprecated_name: String,
    new_name: String,
    description: String,
}

impl DeprecationBridge {
    pub fn new(actual: Arc<dyn Handler>, deprecated_name: impl Into<String>) -> Result<Self> {
        let deprecated_name = deprecated_name.into();
        let new_name = actual.name().to_string();
        validate_alias(&deprecated_name, &new_name)?;
        Ok(Self {
            description: format!("Deprecated alias for '{}'", new_name),
            actual,
            deprecated_name,
            new_name,
        })
    }

    pub fn new_name(&self) -> &str {
        &self.new_name
    }

    pub fn deprecated_name(&self) -> &str {
        &self.deprecated_name
    }

    pub fn warning(&self) -> String {
        format!(
            "WARNING: command '{}' is deprecated, use '{}' instead",
            self.deprecated_name, self.new_name
        )
    }
}

impl Handler for DeprecationBridge {
    fn name(&self) -> &str {
        &self.deprecated_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&self, ctx: &ExecContext, cfg: &RunConfig) -> Result<()> {
        ctx.check()?;
        // A lost warning must not stop the command it announces.
        let _ = ctx.console().err_line(&self.warning());
        self.actual.execute(ctx, cfg)
    }

    fn plan(&self, cfg: &RunConfig) -> Option<Result<Plan>> {
        self.actual.plan(cfg)
    }

    fn as_bridge(&self) -> Option<&DeprecationBridge> {
        Some(self)
    }
}

fn validate_alias(alias: &str, new_name: &str) -> Result<()> {
    if alias.trim().is_empty() {
        return Err(Error::command_invalid_alias(alias, "alias is empty"));
    }
    if alias.chars().any(char::is_whitespace) {
        return Err(Error::command_invalid_alias(alias, "alias contains whitespace"));
    }
    if alias == new_name {
        return Err(Error::command_invalid_alias(
            alias,
            "alias is the same as the command name",
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::command_invalid_name(name, "name is empty"));
    }
    if !is_valid_command_name(name) {
        return Err(Error::command_invalid_name(
            name,
            "expected lowercase kebab-case, e.g. 'repo-sync'",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated_alias: Option<String>,
}

#[derive(Default)]
pub struct Registry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<dyn Handler>) -> Result<()> {
        let name = handler.name().to_string();
        validate_name(&name)?;

        let mut handlers = self.write()?;
        if handlers.contains_key(&name) {
            return Err(Error::command_already_registered(name));
        }
        handlers.insert(name, handler);
        Ok(())
    }

    /// Register `handler` under its own name and, when `deprecated_name` is
    /// non-empty, a bridge under the legacy name. Nothing is inserted unless
    /// both names are accepted.
    pub fn register_with_alias(&self, handler: Arc<dyn Handler>, deprecated_name: &str) -> Result<()> {
        let name = handler.name().to_string();
        validate_name(&name)?;
        let bridge = if deprecated_name.is_empty() {
            None
        } else {
            Some(DeprecationBridge::new(handler.clone(), deprecated_name)?)
        };

        let mut handlers = self.write()?;
        let primary_present = match handlers.get(&name) {
            Some(existing) if Arc::ptr_eq(existing, &handler) => true,
            Some(_) => return Err(Error::command_already_registered(name)),
            None => false,
        };
        if bridge.is_some() && handlers.contains_key(deprecated_name) {
            return Err(Error::command_already_registered(deprecated_name));
        }

        if !primary_present {
            handlers.insert(name, handler);
        }
        if let Some(bridge) = bridge {
            handlers.insert(deprecated_name.to_string(), Arc::new(bridge));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Primary commands sorted by name, each with the legacy alias that
    /// bridges to it, if any.
    pub fn list_all_with_aliases(&self) -> Vec<CommandInfo> {
        let handlers = self.read();
        let aliases: HashMap<&str, &str> = handlers
            .values()
            .filter_map(|h| h.as_bridge())
            .map(|b| (b.new_name(), b.deprecated_name()))
            .collect();

        let mut commands: Vec<CommandInfo> = handlers
            .values()
            .filter(|h| h.as_bridge().is_none())
            .map(|h| CommandInfo {
                name: h.name().to_string(),
                description: h.description().to_string(),
                deprecated_alias: aliases.get(h.name()).map(|a| a.to_string()),
            })
            .collect();
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        commands
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn Handler>>> {
        // Handlers are inserted whole; a poisoned map is still consistent.
        self.handlers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn Handler>>>> {
        self.handlers
            .write()
            .map_err(|_| Error::internal_unexpected("command registry lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::error::ErrorCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        name: &'static str,
        calls: AtomicUsize,
    }

    impl Probe {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Handler for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "probe"
        }

        fn execute(&self, _ctx: &ExecContext, _cfg: &RunConfig) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn kebab_case_names() {
        for ok in ["repo-sync", "a", "db2-update", "x-1"] {
            assert!(is_valid_command_name(ok), "{}", ok);
        }
        for bad in ["", "Repo", "repo_sync", "-x", "x-", "x--y", "2x", "repo sync"] {
            assert!(!is_valid_command_name(bad), "{}", bad);
        }
    }

    #[test]
    fn alias_equal_to_name_is_rejected_without_insertion() {
        let registry = Registry::new();
        let err = registry
            .register_with_alias(Probe::new("db-update"), "db-update")
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandInvalidAlias);
        assert!(registry.is_empty());
    }

    #[test]
    fn alias_collision_leaves_registry_unchanged() {
        let registry = Registry::new();
        registry.register(Probe::new("dbupdate-legacy")).unwrap();
        let err = registry
            .register_with_alias(Probe::new("db-update"), "dbupdate-legacy")
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandAlreadyRegistered);
        assert!(!registry.contains("db-update"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn bridge_delegates_when_warning_cannot_be_written() {
        let registry = Registry::new();
        let probe = Probe::new("db-update");
        registry
            .register_with_alias(probe.clone(), "dbupdate")
            .unwrap();

        let ctx = ExecContext::with_console(Console::captured().with_broken_err());
        registry
            .get("dbupdate")
            .unwrap()
            .execute(&ctx, &RunConfig::default())
            .unwrap();

        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn legacy_alias_may_break_kebab_case() {
        let registry = Registry::new();
        registry
            .register_with_alias(Probe::new("service-mode-enable"), "service_mode_enable")
            .unwrap();
        let bridge = registry.get("service_mode_enable").unwrap();
        assert_eq!(bridge.as_bridge().unwrap().new_name(), "service-mode-enable");
    }

    #[test]
    fn reregistering_same_handler_with_alias_is_idempotent_for_primary() {
        let registry = Registry::new();
        let handler: Arc<dyn Handler> = Probe::new("db-update");
        registry.register(handler.clone()).unwrap();
        registry.register_with_alias(handler, "dbupdate").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn listing_hides_bridges_and_annotates_aliases() {
        let registry = Registry::new();
        registry
            .register_with_alias(Probe::new("repo-sync"), "git2store")
            .unwrap();
        registry.register(Probe::new("db-update")).unwrap();

        let listed = registry.list_all_with_aliases();
        let names: Vec<&str> = listed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["db-update", "repo-sync"]);
        assert_eq!(listed[0].deprecated_alias, None);
        assert_eq!(listed[1].deprecated_alias.as_deref(), Some("git2store"));
    }

    #[test]
    fn bridge_plan_delegates() {
        let probe = Probe::new("db-update");
        let bridge = DeprecationBridge::new(probe, "dbupdate").unwrap();
        assert!(bridge.plan(&RunConfig::default()).is_none());
        assert_eq!(
            bridge.warning(),
            "WARNING: command 'dbupdate' is deprecated, use 'db-update' instead"
        );
    }

    #[test]
    fn bridge_writes_warning_then_delegates() {
        let probe = Probe::new("db-update");
        let bridge = DeprecationBridge::new(probe.clone(), "dbupdate").unwrap();
        let ctx = ExecContext::with_console(Console::captured());
        bridge.execute(&ctx, &RunConfig::default()).unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.console().err_text().lines().count(), 1);
        assert_eq!(ctx.console().out_text(), "");
    }
}
