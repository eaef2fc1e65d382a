//! Key-value file convergence
//!
//! Rules are `(key, op, value)` triples evaluated against every value the key
//! holds in a `KEY VALUE` file. Comparison rules are evaluated first, in
//! declaration order, and feed the per-key occurrence counters; `reset` rules
//! are evaluated last and require the key to appear exactly as many times as
//! the counter says.

use super::kvfile::KeyValueFile;
use super::{admit, check_error, fix_error, fixed, off_target, on_target};
use compobj_base::fsutil::{backup_file, replace_file};
use compobj_base::intake::{decode_list, substitute, Admission, Operator, Scalar, TargetValue};
use compobj_base::logging::codes;
use compobj_base::strategies::{
    ComplianceObject, ConvergenceError, IntakeError, ObjectContext, ObjectInfo,
};
use compobj_base::{log_success, ComplianceStatus};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};

const OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Ge,
    Operator::Le,
    Operator::In,
    Operator::Unset,
    Operator::Reset,
];

#[derive(Debug, Clone, Deserialize)]
pub struct KeySpec {
    pub key: String,
    #[serde(default)]
    pub op: Operator,
    #[serde(default)]
    pub value: Option<TargetValue>,
}

/// `{path, keys: [..]}` or a single `{path, key, op, value}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeyvalPayload {
    Grouped { path: String, keys: Vec<KeySpec> },
    Flat {
        path: String,
        #[serde(flatten)]
        spec: KeySpec,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyvalRule {
    pub path: PathBuf,
    pub key: String,
    pub op: Operator,
    pub value: Option<TargetValue>,
}

impl KeyvalRule {
    /// Identity used by the conflict index and the reset counters
    fn id(&self) -> String {
        format!("{}:{}", self.path.display(), self.key)
    }

    /// Value written when the rule is off target
    fn written_value(&self) -> String {
        self.value
            .as_ref()
            .and_then(TargetValue::first)
            .map(Scalar::to_string)
            .unwrap_or_default()
    }

    fn describe(&self) -> String {
        match &self.value {
            Some(value) => format!("{} {} {} {}", self.path.display(), self.key, self.op, value),
            None => format!("{} {} {}", self.path.display(), self.key, self.op),
        }
    }
}

fn substitute_value(value: TargetValue, ctx: &ObjectContext) -> TargetValue {
    let subst = |scalar: Scalar| match scalar {
        Scalar::Text(text) => Scalar::Text(substitute(&text, &ctx.env)),
        other => other,
    };
    match value {
        TargetValue::Single(scalar) => TargetValue::Single(subst(scalar)),
        TargetValue::List(items) => TargetValue::List(items.into_iter().map(subst).collect()),
    }
}

#[derive(Default)]
pub struct KeyvalObject {
    rules: Vec<KeyvalRule>,
}

impl KeyvalObject {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(spec: KeySpec, path: &Path, ctx: &ObjectContext) -> Result<KeyvalRule, IntakeError> {
        let key = spec.key.trim().to_string();
        if key.is_empty() {
            return Err(IntakeError::validation("keyval", "key is mandatory"));
        }
        let value = spec.value.map(|v| substitute_value(v, ctx));
        let value = spec.op.validate("keyval", OPERATORS, value)?;
        Ok(KeyvalRule {
            path: path.to_path_buf(),
            key,
            op: spec.op,
            value,
        })
    }

    /// Distinct target files, in order of first declaration
    fn paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = Vec::new();
        for rule in &self.rules {
            if !paths.contains(&rule.path.as_path()) {
                paths.push(&rule.path);
            }
        }
        paths
    }

    /// Comparison and `unset` rules for `path`, then its `reset` rules
    fn ordered<'a>(&'a self, path: &'a Path) -> (Vec<&'a KeyvalRule>, Vec<&'a KeyvalRule>) {
        self.rules
            .iter()
            .filter(|rule| rule.path == path)
            .partition(|rule| rule.op != Operator::Reset)
    }

    fn load(path: &Path) -> Result<KeyValueFile, ConvergenceError> {
        KeyValueFile::load(path).map_err(|e| ConvergenceError::io(path, e))
    }

    fn check_path(&self, path: &Path, ctx: &mut ObjectContext) -> Vec<ComplianceStatus> {
        let file = match Self::load(path) {
            Ok(file) => file,
            Err(e) => return vec![check_error(&e)],
        };
        let (rules, resets) = self.ordered(path);
        let mut statuses = Vec::with_capacity(rules.len() + resets.len());

        for rule in rules {
            let values = file.values(&rule.key);
            if rule.op.is_comparison() && !values.is_empty() {
                ctx.keys.bump(&rule.id());
            }
            let status = if rule.op.evaluate(rule.value.as_ref(), &values) {
                on_target(ctx, &rule.describe())
            } else {
                off_target(
                    ctx,
                    &format!("{}: current values {:?}", rule.describe(), values),
                )
            };
            statuses.push(status);
        }

        for rule in resets {
            let expected = ctx.keys.count(&rule.id());
            let actual = file.values(&rule.key).len();
            let status = if expected == actual {
                on_target(ctx, &rule.describe())
            } else {
                off_target(
                    ctx,
                    &format!(
                        "{}: {} occurrences, expected {}",
                        rule.describe(),
                        actual,
                        expected
                    ),
                )
            };
            statuses.push(status);
        }
        statuses
    }

    fn fix_path(&self, path: &Path, ctx: &mut ObjectContext) -> ComplianceStatus {
        let original = match Self::load(path) {
            Ok(file) => file,
            Err(e) => return fix_error(codes::fix::WRITE_FAILED, &e),
        };
        let mut file = original.clone();
        let (rules, resets) = self.ordered(path);

        for rule in &rules {
            let values = file.values(&rule.key);
            if !rule.op.evaluate(rule.value.as_ref(), &values) {
                if rule.op == Operator::Unset {
                    file.remove(&rule.key);
                } else {
                    file.append(&rule.key, &rule.written_value());
                }
                log_success!(codes::success::RULE_FIXED, "rule applied", "rule" => rule.describe());
            }
            if rule.op.is_comparison() && !file.values(&rule.key).is_empty() {
                ctx.keys.bump(&rule.id());
            }
        }

        for reset in resets {
            let expected = ctx.keys.count(&reset.id());
            if file.values(&reset.key).len() == expected {
                continue;
            }
            let targets: Vec<String> = rules
                .iter()
                .filter(|rule| rule.key == reset.key && rule.op.is_comparison())
                .map(|rule| rule.written_value())
                .take(expected)
                .collect();
            file.set_values(&reset.key, &targets);
            log_success!(codes::success::RULE_FIXED, "occurrences reset", "rule" => reset.describe());
        }

        if file == original {
            return ComplianceStatus::Ok;
        }
        match Self::write(path, &file, ctx) {
            Ok(()) => fixed(&format!("{} rewritten", path.display())),
            Err(e) => fix_error(codes::fix::WRITE_FAILED, &e),
        }
    }

    fn write(path: &Path, file: &KeyValueFile, ctx: &ObjectContext) -> Result<(), ConvergenceError> {
        let backup_dir = &ctx.config.engine.backup_dir;
        if let Some(copy) = backup_file(path, backup_dir).map_err(|e| ConvergenceError::io(backup_dir, e))? {
            log_success!(
                codes::success::BACKUP_TAKEN,
                "original saved",
                "path" => path.display(),
                "backup" => copy.display()
            );
        }
        replace_file(path, file.render().as_bytes()).map_err(|e| ConvergenceError::io(path, e))
    }
}

impl ComplianceObject for KeyvalObject {
    fn name(&self) -> &'static str {
        "keyval"
    }

    fn add(&mut self, payload: &str, ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let mut validated = Vec::new();
        for entry in decode_list::<KeyvalPayload>("keyval", payload)? {
            let (path, specs) = match entry {
                KeyvalPayload::Grouped { path, keys } => (path, keys),
                KeyvalPayload::Flat { path, spec } => (path, vec![spec]),
            };
            let path = substitute(path.trim(), &ctx.env);
            if path.is_empty() {
                return Err(IntakeError::validation("keyval", "path is mandatory"));
            }
            let path = PathBuf::from(path);
            for spec in specs {
                validated.push(Self::validate(spec, &path, ctx)?);
            }
        }

        for rule in validated {
            let id = rule.id();
            let admission = ctx.keys.admit(&id, rule.op);
            let conflict = matches!(admission, Admission::Conflict(_));
            if admit(ctx, admission, &id) {
                self.rules.push(rule);
            } else if conflict {
                self.rules.retain(|kept| kept.id() != id);
            }
        }
        Ok(())
    }

    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        ctx.keys.clear_counters();
        let mut statuses = Vec::new();
        for path in self.paths() {
            statuses.extend(self.check_path(path, ctx));
        }
        ctx.fold(statuses)
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        ctx.keys.clear_counters();
        let mut statuses = Vec::new();
        for path in self.paths() {
            statuses.push(self.fix_path(path, ctx));
        }
        ctx.fold(statuses)
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            description: "Verify keys in a 'KEY VALUE' configuration file. The 'reset' \
                operator removes surplus occurrences of a key so it appears once per \
                comparison rule declared for it.",
            example_value: json!({
                "path": "/etc/ssh/sshd_config",
                "keys": [
                    {"key": "PermitRootLogin", "op": "=", "value": "no"},
                    {"key": "MaxAuthTries", "op": "<=", "value": 5},
                    {"key": "UsePAM", "op": "IN", "value": ["yes", "YES"]},
                    {"key": "Banner", "op": "unset"},
                    {"key": "PermitRootLogin", "op": "reset"}
                ]
            }),
            form_definition: r#"
Desc: A set of keys to verify in a key-value file
Inputs:
  path: string, mandatory
  keys: list of
    key: string, mandatory
    op: one of =, >=, <=, IN, unset, reset (default =)
    value: string or integer, a list for IN, none for unset and reset
"#,
        }
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
