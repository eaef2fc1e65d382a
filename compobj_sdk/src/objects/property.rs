//! ZFS dataset and pool property convergence
//!
//! `zfs` and `zpool` share one object parameterized by [`PropertyKind`]; the
//! property store itself sits behind [`PropertyBackend`].

use super::{check_error, fix_error, fixed, off_target, on_target, run_command};
use compobj_base::intake::{decode_list, Operator, Scalar, TargetValue};
use compobj_base::logging::codes;
use compobj_base::strategies::{
    ComplianceObject, ConvergenceError, IntakeError, ObjectContext, ObjectInfo,
};
use compobj_base::{log_error, ComplianceStatus};
use serde::Deserialize;
use serde_json::json;

const OPERATORS: &[Operator] = &[Operator::Eq, Operator::Ge, Operator::Le];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Dataset,
    Pool,
}

impl PropertyKind {
    /// Registry name, also the name of the managing command
    pub fn name(self) -> &'static str {
        match self {
            PropertyKind::Dataset => "zfs",
            PropertyKind::Pool => "zpool",
        }
    }
}

/// Reads and writes named properties of datasets or pools
pub trait PropertyBackend {
    /// Current value, `None` when the dataset or pool does not exist
    fn get(
        &self,
        ctx: &ObjectContext,
        kind: PropertyKind,
        target: &str,
        prop: &str,
    ) -> Result<Option<String>, ConvergenceError>;

    fn set(
        &self,
        ctx: &ObjectContext,
        kind: PropertyKind,
        target: &str,
        prop: &str,
        value: &str,
    ) -> Result<(), ConvergenceError>;

    fn available(&self, _ctx: &ObjectContext, _kind: PropertyKind) -> bool {
        true
    }
}

/// `zfs get|set` / `zpool get|set`
#[derive(Debug, Clone, Copy, Default)]
pub struct ZfsCommandBackend;

impl PropertyBackend for ZfsCommandBackend {
    fn get(
        &self,
        ctx: &ObjectContext,
        kind: PropertyKind,
        target: &str,
        prop: &str,
    ) -> Result<Option<String>, ConvergenceError> {
        let program = kind.name();
        let output = ctx
            .commands
            .execute(program, &["get", "-H", "-o", "value", prop, target])?;
        if !output.success() {
            // the tools exit non-zero for unknown datasets and pools
            if output.stderr.contains("does not exist") || output.stderr.contains("no such pool") {
                return Ok(None);
            }
            return Err(ConvergenceError::CommandStatus {
                program: program.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(Some(output.stdout.trim().to_string()))
    }

    fn set(
        &self,
        ctx: &ObjectContext,
        kind: PropertyKind,
        target: &str,
        prop: &str,
        value: &str,
    ) -> Result<(), ConvergenceError> {
        let assignment = format!("{}={}", prop, value);
        run_command(ctx, kind.name(), &["set", assignment.as_str(), target]).map(|_| ())
    }

    fn available(&self, ctx: &ObjectContext, kind: PropertyKind) -> bool {
        ctx.commands.is_available(kind.name())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PropertyPayload {
    name: String,
    prop: String,
    #[serde(default)]
    op: Operator,
    #[serde(default)]
    value: Option<TargetValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRule {
    pub target: String,
    pub prop: String,
    pub op: Operator,
    pub value: TargetValue,
}

impl PropertyRule {
    fn describe(&self) -> String {
        format!("{} {} {} {}", self.target, self.prop, self.op, self.value)
    }
}

pub struct PropertyObject {
    kind: PropertyKind,
    backend: Box<dyn PropertyBackend>,
    rules: Vec<PropertyRule>,
}

impl PropertyObject {
    pub fn new(kind: PropertyKind) -> Self {
        Self::with_backend(kind, Box::new(ZfsCommandBackend))
    }

    pub fn with_backend(kind: PropertyKind, backend: Box<dyn PropertyBackend>) -> Self {
        Self {
            kind,
            backend,
            rules: Vec::new(),
        }
    }

    fn current(&self, rule: &PropertyRule, ctx: &ObjectContext) -> Result<Option<String>, ConvergenceError> {
        self.backend.get(ctx, self.kind, &rule.target, &rule.prop)
    }

    fn missing(&self, rule: &PropertyRule) -> ConvergenceError {
        ConvergenceError::Lookup {
            kind: match self.kind {
                PropertyKind::Dataset => "dataset",
                PropertyKind::Pool => "pool",
            },
            name: rule.target.clone(),
        }
    }

    fn check_rule(&self, rule: &PropertyRule, ctx: &ObjectContext) -> ComplianceStatus {
        match self.current(rule, ctx) {
            Ok(Some(value)) if rule.op.evaluate(Some(&rule.value), &[value.as_str()]) => {
                on_target(ctx, &rule.describe())
            }
            Ok(Some(value)) => off_target(ctx, &format!("{}: current value {}", rule.describe(), value)),
            Ok(None) => check_error(&self.missing(rule)),
            Err(e) => check_error(&e),
        }
    }

    fn fix_rule(&self, rule: &PropertyRule, ctx: &ObjectContext) -> ComplianceStatus {
        match self.current(rule, ctx) {
            Ok(Some(value)) if rule.op.evaluate(Some(&rule.value), &[value.as_str()]) => {
                return ComplianceStatus::Ok;
            }
            Ok(Some(_)) => {}
            Ok(None) => return fix_error(codes::fix::NOT_FIXABLE, &self.missing(rule)),
            Err(e) => return fix_error(codes::fix::COMMAND_FAILED, &e),
        }

        let value = rule.value.first().map(Scalar::to_string).unwrap_or_default();
        match self.backend.set(ctx, self.kind, &rule.target, &rule.prop, &value) {
            Ok(()) => fixed(&format!("{} set {}={} on {}", self.kind.name(), rule.prop, value, rule.target)),
            Err(e) => fix_error(codes::fix::COMMAND_FAILED, &e),
        }
    }
}

impl ComplianceObject for PropertyObject {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn add(&mut self, payload: &str, _ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let object = self.kind.name();
        let mut validated = Vec::new();
        for entry in decode_list::<PropertyPayload>(object, payload)? {
            let target = entry.name.trim().to_string();
            let prop = entry.prop.trim().to_string();
            if target.is_empty() || prop.is_empty() {
                return Err(IntakeError::validation(object, "name and prop are mandatory"));
            }
            let value = entry
                .op
                .validate(object, OPERATORS, entry.value)?
                .ok_or_else(|| IntakeError::validation(object, "value is mandatory"))?;
            validated.push(PropertyRule {
                target,
                prop,
                op: entry.op,
                value,
            });
        }
        self.rules.extend(validated);
        Ok(())
    }

    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        let ctx = &*ctx;
        ctx.fold(self.rules.iter().map(|rule| self.check_rule(rule, ctx)))
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        let ctx = &*ctx;
        ctx.fold(self.rules.iter().map(|rule| self.fix_rule(rule, ctx)))
    }

    fn fixable(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        if self.backend.available(ctx, self.kind) {
            return ComplianceStatus::Ok;
        }
        log_error!(
            codes::fix::NOT_FIXABLE,
            "property command not available",
            "command" => self.kind.name()
        );
        ComplianceStatus::NotApplicable
    }

    fn info(&self) -> ObjectInfo {
        match self.kind {
            PropertyKind::Dataset => ObjectInfo {
                description: "Verify ZFS dataset properties through 'zfs get' and 'zfs set'.",
                example_value: json!([
                    {"name": "rpool/export", "prop": "compression", "op": "=", "value": "lz4"},
                    {"name": "rpool/export", "prop": "quota", "op": "=", "value": "10G"}
                ]),
                form_definition: r#"
Desc: A list of dataset properties to verify
Inputs:
  name: dataset name, mandatory
  prop: property name, mandatory
  op: one of =, >=, <= (default =)
  value: string or integer, mandatory
"#,
            },
            PropertyKind::Pool => ObjectInfo {
                description: "Verify ZFS pool properties through 'zpool get' and 'zpool set'.",
                example_value: json!([
                    {"name": "rpool", "prop": "autoexpand", "op": "=", "value": "on"}
                ]),
                form_definition: r#"
Desc: A list of pool properties to verify
Inputs:
  name: pool name, mandatory
  prop: property name, mandatory
  op: one of =, >=, <= (default =)
  value: string or integer, mandatory
"#,
            },
        }
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
