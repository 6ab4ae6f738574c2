//! Preview-mode resolution and the plan model.
//!
//! Three independent flags reduce to one `ExecutionMode` with the fixed
//! priority dry-run > plan-only > verbose > normal. Plans are built fresh per
//! request from the same stage tables the workflows execute, and every value
//! placed in a plan passes through secret masking.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::utils::mask::mask_secrets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    DryRun,
    PlanOnly,
    Verbose,
    Normal,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::DryRun => "dry-run",
            ExecutionMode::PlanOnly => "plan-only",
            ExecutionMode::Verbose => "verbose",
            ExecutionMode::Normal => "normal",
        }
    }

    /// The plan is rendered and nothing executes.
    pub fn stops_before_execution(&self) -> bool {
        matches!(self, ExecutionMode::DryRun | ExecutionMode::PlanOnly)
    }

    pub fn renders_plan(&self) -> bool {
        !matches!(self, ExecutionMode::Normal)
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three raw preview signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModeFlags {
    pub dry_run: bool,
    pub plan_only: bool,
    pub verbose: bool,
}

impl ModeFlags {
    pub fn effective_mode(&self) -> ExecutionMode {
        if self.dry_run {
            ExecutionMode::DryRun
        } else if self.plan_only {
            ExecutionMode::PlanOnly
        } else if self.verbose {
            ExecutionMode::Verbose
        } else {
            ExecutionMode::Normal
        }
    }
}

/// `"true"` or `"1"`, case-insensitive, surrounding whitespace ignored.
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlanCheck {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlanStep {
    pub order: usize,
    pub operation: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expected_changes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Plan {
    pub command: String,
    pub steps: Vec<PlanStep>,
    pub summary: String,
    /// True only when at least one precondition check ran and all passed.
    pub validation_passed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<PlanCheck>,
}

impl Plan {
    pub fn builder(command: impl Into<String>) -> PlanBuilder {
        PlanBuilder {
            command: command.into(),
            steps: Vec::new(),
            checks: Vec::new(),
            summary: None,
        }
    }

    /// Human-readable rendering used by text output and verbose previews.
    pub fn render_text(&self) -> String {
        let mut out = format!("Plan for '{}': {}\n", self.command, self.summary);
        for step in &self.steps {
            out.push_str(&format!("  {:>2}. {}\n", step.order, step.operation));
            for (key, value) in &step.parameters {
                out.push_str(&format!("        {}: {}\n", key, value));
            }
            for change in &step.expected_changes {
                out.push_str(&format!("        -> {}\n", change));
            }
        }
        let validation = if self.validation.is_empty() {
            "not validated (no precondition checks ran)".to_string()
        } else if self.validation_passed {
            "passed".to_string()
        } else {
            let failed: Vec<&str> = self
                .validation
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.name.as_str())
                .collect();
            format!("FAILED ({})", failed.join(", "))
        };
        out.push_str(&format!("  validation: {}", validation));
        out
    }
}

pub struct PlanBuilder {
    command: String,
    steps: Vec<PlanStep>,
    checks: Vec<PlanCheck>,
    summary: Option<String>,
}

impl PlanBuilder {
    /// Append a step; order numbers are assigned from 1 in insertion order.
    pub fn step<K, V>(
        mut self,
        operation: impl Into<String>,
        parameters: impl IntoIterator<Item = (K, V)>,
        expected_changes: impl IntoIterator<Item = String>,
    ) -> Self
    where
        K: Into<String>,
        V: AsRef<str>,
    {
        let parameters = parameters
            .into_iter()
            .map(|(k, v)| (k.into(), mask_secrets(v.as_ref())))
            .collect();
        self.steps.push(PlanStep {
            order: self.steps.len() + 1,
            operation: operation.into(),
            parameters,
            expected_changes: expected_changes
                .into_iter()
                .map(|c| mask_secrets(&c))
                .collect(),
        });
        self
    }

    pub fn check(mut self, name: impl Into<String>, outcome: Result<(), String>) -> Self {
        let (passed, message) = match outcome {
            Ok(()) => (true, None),
            Err(message) => (false, Some(mask_secrets(&message))),
        };
        self.checks.push(PlanCheck {
            name: name.into(),
            passed,
            message,
        });
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn build(self) -> Plan {
        let validation_passed = !self.checks.is_empty() && self.checks.iter().all(|c| c.passed);
        let summary = self
            .summary
            .unwrap_or_else(|| format!("{} step(s)", self.steps.len()));
        Plan {
            command: self.command,
            summary: mask_secrets(&summary),
            steps: self.steps,
            validation_passed,
            validation: self.checks,
        }
    }
}
