//! Kernel parameter convergence
//!
//! Each rule is checked twice: against the live value under `/proc/sys` and
//! against the persistent value in `sysctl.conf`. Vector parameters such as
//! `net.ipv4.tcp_rmem` are addressed element-wise with `index`.

use super::{check_error, fix_error, fixed, off_target, on_target, run_command};
use compobj_base::fsutil::{backup_file, replace_file};
use compobj_base::intake::{decode_list, Operator, TargetValue};
use compobj_base::logging::codes;
use compobj_base::strategies::{
    ComplianceObject, ConvergenceError, IntakeError, ObjectContext, ObjectInfo,
};
use compobj_base::{log_success, ComplianceStatus};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const OPERATORS: &[Operator] = &[Operator::Eq, Operator::Ge, Operator::Le];

#[derive(Debug, Clone, Deserialize)]
struct SysctlPayload {
    key: String,
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    op: Operator,
    #[serde(default)]
    value: Option<TargetValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysctlRule {
    pub key: String,
    pub index: Option<usize>,
    pub op: Operator,
    pub value: TargetValue,
}

impl SysctlRule {
    fn describe(&self) -> String {
        match self.index {
            Some(index) => format!("{}[{}] {} {}", self.key, index, self.op, self.value),
            None => format!("{} {} {}", self.key, self.op, self.value),
        }
    }

    /// The part of a parameter vector this rule looks at
    fn select(&self, vector: &[String]) -> Option<String> {
        match self.index {
            Some(index) => vector.get(index).cloned(),
            None => Some(vector.join(" ")),
        }
    }

    fn holds(&self, vector: Option<&Vec<String>>) -> bool {
        let Some(current) = vector.and_then(|v| self.select(v)) else {
            return false;
        };
        self.op.evaluate(Some(&self.value), &[current.as_str()])
    }

    /// `vector` with this rule's target written in
    fn apply(&self, vector: &[String]) -> Result<Vec<String>, ConvergenceError> {
        let target = self.value.first().map(|s| s.to_string()).unwrap_or_default();
        match self.index {
            None => Ok(target.split_whitespace().map(str::to_string).collect()),
            Some(index) if index < vector.len() => {
                let mut updated = vector.to_vec();
                updated[index] = target;
                Ok(updated)
            }
            Some(index) => Err(ConvergenceError::Unsupported {
                reason: format!(
                    "{} has {} elements, cannot set index {}",
                    self.key,
                    vector.len(),
                    index
                ),
            }),
        }
    }
}

/// `key = value` lines of `sysctl.conf`; the last assignment of a key wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SysctlConf {
    lines: Vec<String>,
}

fn assignment(line: &str) -> Option<(String, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    Some((normalize_key(key.trim()), value.trim()))
}

/// `net/ipv4/ip_forward` and `net.ipv4.ip_forward` name the same parameter
fn normalize_key(key: &str) -> String {
    key.replace('/', ".")
}

impl SysctlConf {
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

    fn last_position(&self, key: &str) -> Option<usize> {
        self.lines
            .iter()
            .rposition(|line| matches!(assignment(line), Some((k, _)) if k == key))
    }

    pub fn get(&self, key: &str) -> Option<Vec<String>> {
        let line = &self.lines[self.last_position(key)?];
        assignment(line).map(|(_, value)| value.split_whitespace().map(str::to_string).collect())
    }

    pub fn set(&mut self, key: &str, vector: &[String]) {
        let line = format!("{} = {}", key, vector.join(" "));
        match self.last_position(key) {
            Some(i) => self.lines[i] = line,
            None => self.lines.push(line),
        }
    }
}

#[derive(Default)]
pub struct SysctlObject {
    rules: Vec<SysctlRule>,
}

impl SysctlObject {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_path(ctx: &ObjectContext, key: &str) -> PathBuf {
        ctx.config.paths.proc_sys.join(key.replace('.', "/"))
    }

    /// Current kernel value, `None` when the kernel does not know the key
    fn live(ctx: &ObjectContext, key: &str) -> Result<Option<Vec<String>>, ConvergenceError> {
        let path = Self::live_path(ctx, key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text.split_whitespace().map(str::to_string).collect())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConvergenceError::io(&path, e)),
        }
    }

    fn load_conf(ctx: &ObjectContext) -> Result<SysctlConf, ConvergenceError> {
        let path = &ctx.config.paths.sysctl_conf;
        SysctlConf::load(path).map_err(|e| ConvergenceError::io(path, e))
    }

    fn check_rule(rule: &SysctlRule, conf: &SysctlConf, ctx: &ObjectContext) -> ComplianceStatus {
        let live = match Self::live(ctx, &rule.key) {
            Ok(Some(live)) => live,
            Ok(None) => return off_target(ctx, &format!("{}: unknown kernel parameter", rule.key)),
            Err(e) => return check_error(&e),
        };

        let live_status = if rule.holds(Some(&live)) {
            on_target(ctx, &format!("{} (live)", rule.describe()))
        } else {
            off_target(
                ctx,
                &format!("{}: live value is '{}'", rule.describe(), live.join(" ")),
            )
        };

        let persisted = conf.get(&rule.key);
        let conf_status = match &persisted {
            _ if rule.holds(persisted.as_ref()) => {
                on_target(ctx, &format!("{} (persistent)", rule.describe()))
            }
            Some(value) => off_target(
                ctx,
                &format!("{}: persistent value is '{}'", rule.describe(), value.join(" ")),
            ),
            None => off_target(ctx, &format!("{}: not set in sysctl.conf", rule.describe())),
        };

        ctx.combine(live_status, conf_status)
    }

    fn fix_rule(rule: &SysctlRule, conf: &mut SysctlConf, ctx: &ObjectContext) -> ComplianceStatus {
        let live = match Self::live(ctx, &rule.key) {
            Ok(Some(live)) => live,
            Ok(None) => {
                let err = ConvergenceError::Lookup {
                    kind: "kernel parameter",
                    name: rule.key.clone(),
                };
                return fix_error(codes::fix::NOT_FIXABLE, &err);
            }
            Err(e) => return fix_error(codes::fix::COMMAND_FAILED, &e),
        };

        let persisted = conf.get(&rule.key);
        if !rule.holds(persisted.as_ref()) {
            let base = persisted.as_ref().unwrap_or(&live);
            match rule.apply(base) {
                Ok(vector) => {
                    conf.set(&rule.key, &vector);
                    log_success!(codes::success::RULE_FIXED, "persistent value set", "rule" => rule.describe());
                }
                Err(e) => return fix_error(codes::fix::NOT_FIXABLE, &e),
            }
        }

        if rule.holds(Some(&live)) {
            return ComplianceStatus::Ok;
        }
        let vector = match rule.apply(&live) {
            Ok(vector) => vector,
            Err(e) => return fix_error(codes::fix::NOT_FIXABLE, &e),
        };
        let assignment = format!("{}={}", rule.key, vector.join(" "));
        match run_command(ctx, "sysctl", &["-w", assignment.as_str()]) {
            Ok(_) => fixed(&format!("sysctl -w {}", assignment)),
            Err(e) => fix_error(codes::fix::COMMAND_FAILED, &e),
        }
    }

    fn write_conf(conf: &SysctlConf, ctx: &ObjectContext) -> Result<(), ConvergenceError> {
        let path = &ctx.config.paths.sysctl_conf;
        let backup_dir = &ctx.config.engine.backup_dir;
        if let Some(copy) =
            backup_file(path, backup_dir).map_err(|e| ConvergenceError::io(backup_dir, e))?
        {
            log_success!(codes::success::BACKUP_TAKEN, "original saved", "backup" => copy.display());
        }
        replace_file(path, conf.render().as_bytes()).map_err(|e| ConvergenceError::io(path, e))
    }
}

impl ComplianceObject for SysctlObject {
    fn name(&self) -> &'static str {
        "sysctl"
    }

    fn add(&mut self, payload: &str, _ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let mut validated = Vec::new();
        for entry in decode_list::<SysctlPayload>("sysctl", payload)? {
            let key = normalize_key(entry.key.trim());
            if key.is_empty() {
                return Err(IntakeError::validation("sysctl", "key is mandatory"));
            }
            let value = entry
                .op
                .validate("sysctl", OPERATORS, entry.value)?
                .ok_or_else(|| IntakeError::validation("sysctl", "value is mandatory"))?;
            validated.push(SysctlRule {
                key,
                index: entry.index,
                op: entry.op,
                value,
            });
        }
        self.rules.extend(validated);
        Ok(())
    }

    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        if self.rules.is_empty() {
            return ComplianceStatus::Ok;
        }
        let ctx = &*ctx;
        let conf = match Self::load_conf(ctx) {
            Ok(conf) => conf,
            Err(e) => return check_error(&e),
        };
        ctx.fold(self.rules.iter().map(|rule| Self::check_rule(rule, &conf, ctx)))
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        if self.rules.is_empty() {
            return ComplianceStatus::Ok;
        }
        let ctx = &*ctx;
        let original = match Self::load_conf(ctx) {
            Ok(conf) => conf,
            Err(e) => return fix_error(codes::fix::WRITE_FAILED, &e),
        };

        let mut conf = original.clone();
        let mut statuses: Vec<ComplianceStatus> = self
            .rules
            .iter()
            .map(|rule| Self::fix_rule(rule, &mut conf, ctx))
            .collect();

        if conf != original {
            statuses.push(match Self::write_conf(&conf, ctx) {
                Ok(()) => fixed(&format!("{} rewritten", ctx.config.paths.sysctl_conf.display())),
                Err(e) => fix_error(codes::fix::WRITE_FAILED, &e),
            });
        }
        ctx.fold(statuses)
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            description: "Verify kernel parameters, both the live value and the value \
                persisted in sysctl.conf. Use 'index' to address one element of a vector \
                parameter.",
            example_value: json!([
                {"key": "net.ipv4.ip_forward", "op": "=", "value": 0},
                {"key": "net.ipv4.tcp_rmem", "index": 2, "op": ">=", "value": 4194304}
            ]),
            form_definition: r#"
Desc: A list of kernel parameters to verify
Inputs:
  key: string, mandatory
  index: integer, vector element position
  op: one of =, >=, <= (default =)
  value: string or integer, mandatory
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

    fn set_live(ctx: &ObjectContext, key: &str, value: &str) {
        let path = SysctlObject::live_path(ctx, key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, value).unwrap();
    }

    #[test]
    fn test_conf_last_assignment_wins() {
        let mut conf = SysctlConf::parse(
            "# kernel tuning\nnet.ipv4.ip_forward = 0\nnet/ipv4/ip_forward=1\nvm.swappiness = 10\n",
        );
        assert_eq!(conf.get("net.ipv4.ip_forward"), Some(vec!["1".to_string()]));

        conf.set("net.ipv4.ip_forward", &["0".to_string()]);
        conf.set("kernel.panic", &["10".to_string()]);
        assert_eq!(
            conf.render(),
            "# kernel tuning\nnet.ipv4.ip_forward = 0\nnet.ipv4.ip_forward = 0\n\
             vm.swappiness = 10\nkernel.panic = 10\n"
        );
    }

    #[test]
    fn test_persist_missing_value() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        set_live(&ctx, "net.ipv4.ip_forward", "0\n");
        fs::write(&ctx.config.paths.sysctl_conf, "vm.swappiness = 10\n").unwrap();

        let mut object = SysctlObject::new();
        object
            .add(r#"{"key": "net.ipv4.ip_forward", "value": 0}"#, &mut ctx)
            .unwrap();

        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(
            fs::read_to_string(&ctx.config.paths.sysctl_conf).unwrap(),
            "vm.swappiness = 10\nnet.ipv4.ip_forward = 0\n"
        );
    }

    #[test]
    fn test_vector_element() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        set_live(&ctx, "net.ipv4.tcp_rmem", "4096\t87380\t6291456\n");
        fs::write(
            &ctx.config.paths.sysctl_conf,
            "net.ipv4.tcp_rmem = 4096 87380 1000\n",
        )
        .unwrap();

        let mut object = SysctlObject::new();
        object
            .add(
                r#"{"key": "net.ipv4.tcp_rmem", "index": 2, "op": ">=", "value": 4194304}"#,
                &mut ctx,
            )
            .unwrap();

        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(
            fs::read_to_string(&ctx.config.paths.sysctl_conf).unwrap(),
            "net.ipv4.tcp_rmem = 4096 87380 4194304\n"
        );
    }

    #[test]
    fn test_unknown_parameter() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let mut object = SysctlObject::new();
        object
            .add(r#"{"key": "net.bogus", "value": 1}"#, &mut ctx)
            .unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::NotOk);
    }

    #[test]
    fn test_intake_validation() {
        let mut ctx = ObjectContext::default();
        let mut object = SysctlObject::new();
        assert_matches!(
            object.add(r#"{"key": "vm.swappiness", "op": "IN", "value": [1, 2]}"#, &mut ctx),
            Err(IntakeError::Validation { .. })
        );
        assert_matches!(
            object.add(r#"{"key": "vm.swappiness"}"#, &mut ctx),
            Err(IntakeError::Validation { .. })
        );
        object
            .add(r#"{"key": "vm/swappiness", "value": 10}"#, &mut ctx)
            .unwrap();
        assert_eq!(object.rules[0].key, "vm.swappiness");
    }
}
