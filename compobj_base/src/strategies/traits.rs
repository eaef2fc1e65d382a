// src/strategies/traits.rs
//! Convergence interface shared by every rule type

use crate::results::ComplianceStatus;
use crate::strategies::context::ObjectContext;
use crate::strategies::errors::IntakeError;
use std::fmt;
use std::str::FromStr;

/// Static documentation for a rule type, printed by the `info` action
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub description: &'static str,
    pub example_value: serde_json::Value,
    pub form_definition: &'static str,
}

impl ObjectInfo {
    /// Human-readable rendering used by the `info` action
    pub fn render(&self) -> String {
        let example = serde_json::to_string_pretty(&self.example_value)
            .unwrap_or_else(|_| self.example_value.to_string());
        format!(
            "Description\n===========\n\n{}\n\nExample rule\n============\n\n{}\n\nForm definition\n===============\n\n{}\n",
            self.description.trim(),
            example,
            self.form_definition.trim()
        )
    }
}

/// A rule type's convergence logic plus its loaded rule set
///
/// `check` never modifies the system. `fix` must leave a subsequent `check`
/// at `Ok` whenever it reports `Ok` itself.
pub trait ComplianceObject {
    /// Registry name of the rule type
    fn name(&self) -> &'static str;

    /// Decode, validate and append one rule payload
    fn add(&mut self, payload: &str, ctx: &mut ObjectContext) -> Result<(), IntakeError>;

    /// Evaluate every rule without touching the system
    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus;

    /// Remediate every rule that is not on target
    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus;

    /// Whether `fix` is supported for the loaded rules
    fn fixable(&self, _ctx: &mut ObjectContext) -> ComplianceStatus {
        ComplianceStatus::Ok
    }

    fn info(&self) -> ObjectInfo;

    fn rule_count(&self) -> usize;
}

/// Invocation action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Check,
    Fix,
    Fixable,
    Info,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Check => "check",
            Action::Fix => "fix",
            Action::Fixable => "fixable",
            Action::Info => "info",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check" => Ok(Action::Check),
            "fix" => Ok(Action::Fix),
            "fixable" => Ok(Action::Fixable),
            "info" => Ok(Action::Info),
            other => Err(format!(
                "unknown action '{}', expected one of check, fix, fixable, info",
                other
            )),
        }
    }
}
