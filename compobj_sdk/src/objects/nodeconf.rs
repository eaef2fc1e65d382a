//! Node configuration convergence
//!
//! Keys address an INI file as `section.option`. One option holds a single
//! value; `unset` requires the option to be absent. A key declared with both
//! `unset` and a comparison is dropped like in [`super::keyval`].

use super::{admit, check_error, fix_error, fixed, off_target, on_target};
use compobj_base::fsutil::{backup_file, replace_file};
use compobj_base::intake::{decode_list, Admission, Operator, Scalar, TargetValue};
use compobj_base::logging::codes;
use compobj_base::strategies::{
    ComplianceObject, ConvergenceError, IntakeError, ObjectContext, ObjectInfo,
};
use compobj_base::{log_success, ComplianceStatus};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::io;
use std::path::Path;

const OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Ge,
    Operator::Le,
    Operator::In,
    Operator::Unset,
];

/// INI text kept line by line so untouched lines survive a rewrite
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConfig {
    lines: Vec<String>,
}

fn section_header(line: &str) -> Option<&str> {
    let line = line.trim();
    line.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

fn option_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') || line.starts_with(';') || line.starts_with('[') {
        return None;
    }
    let (name, value) = line.split_once('=')?;
    Some((name.trim(), value.trim()))
}

impl NodeConfig {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn render(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    /// Line range of the body of `section`, header excluded
    fn section_range(&self, section: &str) -> Option<(usize, usize)> {
        let start = self
            .lines
            .iter()
            .position(|line| section_header(line) == Some(section))?
            + 1;
        let end = self.lines[start..]
            .iter()
            .position(|line| section_header(line).is_some())
            .map_or(self.lines.len(), |offset| start + offset);
        Some((start, end))
    }

    fn locate(&self, section: &str, option: &str) -> Option<usize> {
        let (start, end) = self.section_range(section)?;
        (start..end).find(|&i| matches!(option_line(&self.lines[i]), Some((name, _)) if name == option))
    }

    pub fn get(&self, section: &str, option: &str) -> Option<&str> {
        self.locate(section, option)
            .and_then(|i| option_line(&self.lines[i]))
            .map(|(_, value)| value)
    }

    pub fn set(&mut self, section: &str, option: &str, value: &str) {
        let line = format!("{} = {}", option, value);
        if let Some(i) = self.locate(section, option) {
            self.lines[i] = line;
            return;
        }
        match self.section_range(section) {
            Some((start, mut end)) => {
                while end > start && self.lines[end - 1].trim().is_empty() {
                    end -= 1;
                }
                self.lines.insert(end, line);
            }
            None => {
                if self.lines.last().is_some_and(|last| !last.trim().is_empty()) {
                    self.lines.push(String::new());
                }
                self.lines.push(format!("[{}]", section));
                self.lines.push(line);
            }
        }
    }

    pub fn remove(&mut self, section: &str, option: &str) -> bool {
        match self.locate(section, option) {
            Some(i) => {
                self.lines.remove(i);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NodeconfPayload {
    key: String,
    #[serde(default)]
    op: Operator,
    #[serde(default)]
    value: Option<TargetValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeconfRule {
    pub section: String,
    pub option: String,
    pub op: Operator,
    pub value: Option<TargetValue>,
}

impl NodeconfRule {
    fn key(&self) -> String {
        format!("{}.{}", self.section, self.option)
    }

    fn describe(&self) -> String {
        match &self.value {
            Some(value) => format!("{} {} {}", self.key(), self.op, value),
            None => format!("{} {}", self.key(), self.op),
        }
    }

    fn holds(&self, config: &NodeConfig) -> bool {
        let current: Vec<&str> = config.get(&self.section, &self.option).into_iter().collect();
        self.op.evaluate(self.value.as_ref(), &current)
    }
}

#[derive(Default)]
pub struct NodeconfObject {
    rules: Vec<NodeconfRule>,
}

impl NodeconfObject {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(ctx: &ObjectContext) -> Result<NodeConfig, ConvergenceError> {
        let path = &ctx.config.paths.node_conf;
        NodeConfig::load(path).map_err(|e| ConvergenceError::io(path, e))
    }

    fn write(config: &NodeConfig, ctx: &ObjectContext) -> Result<(), ConvergenceError> {
        let path = &ctx.config.paths.node_conf;
        let backup_dir = &ctx.config.engine.backup_dir;
        if let Some(copy) =
            backup_file(path, backup_dir).map_err(|e| ConvergenceError::io(backup_dir, e))?
        {
            log_success!(codes::success::BACKUP_TAKEN, "original saved", "backup" => copy.display());
        }
        replace_file(path, config.render().as_bytes()).map_err(|e| ConvergenceError::io(path, e))
    }
}

impl ComplianceObject for NodeconfObject {
    fn name(&self) -> &'static str {
        "nodeconf"
    }

    fn add(&mut self, payload: &str, ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let mut validated = Vec::new();
        for entry in decode_list::<NodeconfPayload>("nodeconf", payload)? {
            let key = entry.key.trim();
            let Some((section, option)) = key.split_once('.') else {
                return Err(IntakeError::validation(
                    "nodeconf",
                    format!("key '{}' is not in the 'section.option' form", key),
                ));
            };
            if section.is_empty() || option.is_empty() {
                return Err(IntakeError::validation("nodeconf", "empty section or option"));
            }
            let value = entry.op.validate("nodeconf", OPERATORS, entry.value)?;
            validated.push(NodeconfRule {
                section: section.to_string(),
                option: option.to_string(),
                op: entry.op,
                value,
            });
        }

        for rule in validated {
            let key = rule.key();
            let admission = ctx.keys.admit(&key, rule.op);
            let conflict = matches!(admission, Admission::Conflict(_));
            if admit(ctx, admission, &key) {
                self.rules.push(rule);
            } else if conflict {
                self.rules.retain(|kept| kept.key() != key);
            }
        }
        Ok(())
    }

    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        if self.rules.is_empty() {
            return ComplianceStatus::Ok;
        }
        let ctx = &*ctx;
        let config = match Self::load(ctx) {
            Ok(config) => config,
            Err(e) => return check_error(&e),
        };
        ctx.fold(self.rules.iter().map(|rule| {
            if rule.holds(&config) {
                on_target(ctx, &rule.describe())
            } else {
                let current = config.get(&rule.section, &rule.option).unwrap_or("<unset>");
                off_target(ctx, &format!("{}: current value {}", rule.describe(), current))
            }
        }))
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        if self.rules.is_empty() {
            return ComplianceStatus::Ok;
        }
        let ctx = &*ctx;
        let original = match Self::load(ctx) {
            Ok(config) => config,
            Err(e) => return fix_error(codes::fix::WRITE_FAILED, &e),
        };

        let mut config = original.clone();
        for rule in &self.rules {
            if rule.holds(&config) {
                continue;
            }
            if rule.op == Operator::Unset {
                config.remove(&rule.section, &rule.option);
            } else {
                let value = rule
                    .value
                    .as_ref()
                    .and_then(TargetValue::first)
                    .map(Scalar::to_string)
                    .unwrap_or_default();
                config.set(&rule.section, &rule.option, &value);
            }
            log_success!(codes::success::RULE_FIXED, "rule applied", "rule" => rule.describe());
        }

        if config == original {
            return ComplianceStatus::Ok;
        }
        match Self::write(&config, ctx) {
            Ok(()) => fixed(&format!("{} rewritten", ctx.config.paths.node_conf.display())),
            Err(e) => fix_error(codes::fix::WRITE_FAILED, &e),
        }
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            description: "Verify options of the node configuration file, addressed as \
                'section.option'.",
            example_value: json!([
                {"key": "node.repopkg", "op": "=", "value": "ftp://ftp.opensvc.com/opensvc"},
                {"key": "node.maintenance_grace_period", "op": ">=", "value": 600},
                {"key": "node.dbopensvc", "op": "unset"}
            ]),
            form_definition: r#"
Desc: A list of node configuration options to verify
Inputs:
  key: string, 'section.option', mandatory
  op: one of =, >=, <=, IN, unset (default =)
  value: string or integer, a list for IN, none for unset
"#,
        }
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    const NODE_CONF: &str = "\
[node]
env = PRD
# comment = ignored
maintenance_grace_period = 60

[cluster]
name = alpha
";

    #[test]
    fn test_config_get_set_remove() {
        let mut config = NodeConfig::parse(NODE_CONF);
        assert_eq!(config.get("node", "env"), Some("PRD"));
        assert_eq!(config.get("cluster", "env"), None);
        assert_eq!(config.get("node", "# comment"), None);

        config.set("node", "env", "DEV");
        config.set("node", "repopkg", "http://repo");
        config.set("listener", "port", "1214");
        assert!(config.remove("cluster", "name"));
        assert!(!config.remove("cluster", "name"));

        assert_eq!(
            config.render(),
            "[node]\nenv = DEV\n# comment = ignored\nmaintenance_grace_period = 60\n\
             repopkg = http://repo\n\n[cluster]\n\n[listener]\nport = 1214\n"
        );
    }

    #[test]
    fn test_check_and_fix() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        std::fs::write(&ctx.config.paths.node_conf, NODE_CONF).unwrap();

        let mut object = NodeconfObject::new();
        object
            .add(
                r#"[
                    {"key": "node.env", "op": "IN", "value": ["PRD", "PPRD"]},
                    {"key": "node.maintenance_grace_period", "op": ">=", "value": 600},
                    {"key": "cluster.name", "op": "unset"}
                ]"#,
                &mut ctx,
            )
            .unwrap();

        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);

        let text = std::fs::read_to_string(&ctx.config.paths.node_conf).unwrap();
        assert!(text.contains("maintenance_grace_period = 600\n"));
        assert!(!text.contains("name = alpha"));
    }

    #[test]
    fn test_conflicting_rules_dropped() {
        let mut ctx = ObjectContext::default();
        let mut object = NodeconfObject::new();
        object
            .add(r#"{"key": "node.env", "value": "PRD"}"#, &mut ctx)
            .unwrap();
        object
            .add(r#"{"key": "node.env", "op": "unset"}"#, &mut ctx)
            .unwrap();
        assert_eq!(object.rule_count(), 0);
        assert_eq!(ctx.diagnostics.len(), 1);
    }

    #[test]
    fn test_key_form_and_operators() {
        let mut ctx = ObjectContext::default();
        let mut object = NodeconfObject::new();
        assert_matches!(
            object.add(r#"{"key": "env", "value": "PRD"}"#, &mut ctx),
            Err(IntakeError::Validation { .. })
        );
        assert_matches!(
            object.add(r#"{"key": "node.env", "op": "reset"}"#, &mut ctx),
            Err(IntakeError::Validation { .. })
        );
    }
}
