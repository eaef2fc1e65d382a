//! Linux device-mapper multipath configuration convergence

use super::mpath::Block;
use super::{check_error, fix_error, fixed, off_target, on_target, run_command};
use compobj_base::fsutil::{backup_file, replace_file};
use compobj_base::intake::{decode_list, Operator, Scalar, TargetValue};
use compobj_base::logging::codes;
use compobj_base::strategies::{
    ComplianceObject, ConvergenceError, IntakeError, ObjectContext, ObjectInfo,
};
use compobj_base::{log_info, log_success, ComplianceStatus};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::io;
use std::sync::OnceLock;

const OPERATORS: &[Operator] = &[Operator::Eq, Operator::Ge, Operator::Le];

const KEY_PATTERN: &str = r"^(?:(defaults|blacklist|blacklist_exceptions)|devices\.device\.\{([^}]+)\}\.\{([^}]+)\}|multipaths\.multipath\.\{([^}]+)\})\.([A-Za-z_][A-Za-z0-9_]*)$";

fn key_regex() -> Option<&'static Regex> {
    static KEY: OnceLock<Option<Regex>> = OnceLock::new();
    KEY.get_or_init(|| Regex::new(KEY_PATTERN).ok()).as_ref()
}

/// Where in the configuration tree an attribute lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// `defaults`, `blacklist` or `blacklist_exceptions`
    Section(String),
    Device { vendor: String, product: String },
    Multipath { wwid: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpathKey {
    pub scope: Scope,
    pub attr: String,
}

impl MpathKey {
    pub fn parse(key: &str) -> Option<Self> {
        let caps = key_regex()?.captures(key)?;
        let scope = if let Some(section) = caps.get(1) {
            Scope::Section(section.as_str().to_string())
        } else if let (Some(vendor), Some(product)) = (caps.get(2), caps.get(3)) {
            Scope::Device {
                vendor: vendor.as_str().to_string(),
                product: product.as_str().to_string(),
            }
        } else {
            Scope::Multipath {
                wwid: caps.get(4)?.as_str().to_string(),
            }
        };
        Some(Self {
            scope,
            attr: caps.get(5)?.as_str().to_string(),
        })
    }

    /// Blacklist sections list several values for one attribute
    fn multi_valued(&self) -> bool {
        matches!(&self.scope, Scope::Section(s) if s != "defaults")
    }

    fn block<'a>(&self, root: &'a Block) -> Option<&'a Block> {
        match &self.scope {
            Scope::Section(section) => root.child(section),
            Scope::Device { vendor, product } => root
                .child("devices")?
                .find("device", &[("vendor", vendor.as_str()), ("product", product.as_str())]),
            Scope::Multipath { wwid } => root
                .child("multipaths")?
                .find("multipath", &[("wwid", wwid.as_str())]),
        }
    }

    fn block_mut<'a>(&self, root: &'a mut Block) -> &'a mut Block {
        match &self.scope {
            Scope::Section(section) => root.child_mut(section),
            Scope::Device { vendor, product } => root
                .child_mut("devices")
                .find_mut("device", &[("vendor", vendor.as_str()), ("product", product.as_str())]),
            Scope::Multipath { wwid } => root
                .child_mut("multipaths")
                .find_mut("multipath", &[("wwid", wwid.as_str())]),
        }
    }

    pub fn values<'a>(&self, root: &'a Block) -> Vec<&'a str> {
        self.block(root)
            .map(|block| block.values(&self.attr))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MpathPayload {
    key: String,
    #[serde(default)]
    op: Operator,
    #[serde(default)]
    value: Option<TargetValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpathRule {
    pub raw: String,
    pub key: MpathKey,
    pub op: Operator,
    pub value: TargetValue,
}

impl MpathRule {
    fn describe(&self) -> String {
        format!("{} {} {}", self.raw, self.op, self.value)
    }

    fn holds(&self, root: &Block) -> bool {
        self.op.evaluate(Some(&self.value), &self.key.values(root))
    }

    fn apply(&self, root: &mut Block) {
        let value = self.value.first().map(Scalar::to_string).unwrap_or_default();
        let block = self.key.block_mut(root);
        if self.key.multi_valued() && self.op == Operator::Eq {
            block.push(&self.key.attr, &value);
        } else {
            block.set(&self.key.attr, &value);
        }
    }
}

#[derive(Default)]
pub struct MpathObject {
    rules: Vec<MpathRule>,
}

impl MpathObject {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(ctx: &ObjectContext) -> Result<Block, ConvergenceError> {
        let path = &ctx.config.paths.multipath_conf;
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(ConvergenceError::io(path, e)),
        };
        Block::parse(&text).map_err(|reason| ConvergenceError::Parse {
            path: path.display().to_string(),
            reason,
        })
    }

    fn write(root: &Block, ctx: &ObjectContext) -> Result<(), ConvergenceError> {
        let path = &ctx.config.paths.multipath_conf;
        let backup_dir = &ctx.config.engine.backup_dir;
        if let Some(copy) =
            backup_file(path, backup_dir).map_err(|e| ConvergenceError::io(backup_dir, e))?
        {
            log_success!(codes::success::BACKUP_TAKEN, "original saved", "backup" => copy.display());
        }
        replace_file(path, root.render().as_bytes()).map_err(|e| ConvergenceError::io(path, e))
    }

    /// Have a running daemon pick up the new configuration
    fn reconfigure(ctx: &ObjectContext) -> ComplianceStatus {
        if !ctx.commands.is_available("multipathd") {
            log_info!("multipathd not available, skipping reconfigure");
            return ComplianceStatus::Ok;
        }
        match run_command(ctx, "multipathd", &["reconfigure"]) {
            Ok(_) => fixed("multipathd reconfigure"),
            Err(e) => fix_error(codes::fix::COMMAND_FAILED, &e),
        }
    }
}

impl ComplianceObject for MpathObject {
    fn name(&self) -> &'static str {
        "linux_mpath"
    }

    fn add(&mut self, payload: &str, _ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let mut validated = Vec::new();
        for entry in decode_list::<MpathPayload>("linux_mpath", payload)? {
            let raw = entry.key.trim().to_string();
            let key = MpathKey::parse(&raw).ok_or_else(|| {
                IntakeError::validation("linux_mpath", format!("unsupported key '{}'", raw))
            })?;
            let value = entry
                .op
                .validate("linux_mpath", OPERATORS, entry.value)?
                .ok_or_else(|| IntakeError::validation("linux_mpath", "value is mandatory"))?;
            validated.push(MpathRule {
                raw,
                key,
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
        let root = match Self::load(ctx) {
            Ok(root) => root,
            Err(e) => return check_error(&e),
        };
        ctx.fold(self.rules.iter().map(|rule| {
            if rule.holds(&root) {
                on_target(ctx, &rule.describe())
            } else {
                off_target(
                    ctx,
                    &format!("{}: current values {:?}", rule.describe(), rule.key.values(&root)),
                )
            }
        }))
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        if self.rules.is_empty() {
            return ComplianceStatus::Ok;
        }
        let ctx = &*ctx;
        let original = match Self::load(ctx) {
            Ok(root) => root,
            Err(e) => return fix_error(codes::fix::WRITE_FAILED, &e),
        };

        let mut root = original.clone();
        for rule in &self.rules {
            if !rule.holds(&root) {
                rule.apply(&mut root);
                log_success!(codes::success::RULE_FIXED, "rule applied", "rule" => rule.describe());
            }
        }
        if root == original {
            return ComplianceStatus::Ok;
        }

        if let Err(e) = Self::write(&root, ctx) {
            return fix_error(codes::fix::WRITE_FAILED, &e);
        }
        let written = fixed(&format!("{} rewritten", ctx.config.paths.multipath_conf.display()));
        ctx.combine(written, Self::reconfigure(ctx))
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            description: "Verify attributes of the device-mapper multipath configuration. \
                Device and multipath sections are selected by vendor/product and wwid, \
                written in braces.",
            example_value: json!([
                {"key": "defaults.polling_interval", "op": ">=", "value": 20},
                {"key": "blacklist.devnode", "op": "=", "value": "^sda$"},
                {"key": "devices.device.{HP}.{OPEN-.*}.path_grouping_policy", "op": "=", "value": "multibus"},
                {"key": "multipaths.multipath.{3600508b4000156d700012000000b0000}.alias", "op": "=", "value": "data01"}
            ]),
            form_definition: r#"
Desc: A list of multipath.conf attributes to verify
Inputs:
  key: string, mandatory, one of
    defaults.<attr>
    blacklist.<attr>
    blacklist_exceptions.<attr>
    devices.device.{<vendor>}.{<product>}.<attr>
    multipaths.multipath.{<wwid>}.<attr>
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

    #[test]
    fn test_key_forms() {
        assert_eq!(
            MpathKey::parse("defaults.polling_interval"),
            Some(MpathKey {
                scope: Scope::Section("defaults".into()),
                attr: "polling_interval".into()
            })
        );
        assert_eq!(
            MpathKey::parse("devices.device.{HP}.{OPEN-.*}.no_path_retry"),
            Some(MpathKey {
                scope: Scope::Device {
                    vendor: "HP".into(),
                    product: "OPEN-.*".into()
                },
                attr: "no_path_retry".into()
            })
        );
        assert_eq!(
            MpathKey::parse("multipaths.multipath.{3600508b4}.alias").map(|k| k.scope),
            Some(Scope::Multipath {
                wwid: "3600508b4".into()
            })
        );
        assert_eq!(MpathKey::parse("overrides.features"), None);
        assert_eq!(MpathKey::parse("devices.device.HP.x.alias"), None);
    }

    #[test]
    fn test_check_and_fix() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        fs::write(
            &ctx.config.paths.multipath_conf,
            "defaults {\n\tpolling_interval 10\n}\nblacklist {\n\tdevnode \"^hd[a-z]\"\n}\n",
        )
        .unwrap();

        let mut object = MpathObject::new();
        object
            .add(
                r#"[
                    {"key": "defaults.polling_interval", "op": ">=", "value": 20},
                    {"key": "blacklist.devnode", "value": "^sda$"},
                    {"key": "devices.device.{HP}.{OPEN-.*}.path_grouping_policy", "value": "multibus"}
                ]"#,
                &mut ctx,
            )
            .unwrap();

        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);

        let root = Block::parse(&fs::read_to_string(&ctx.config.paths.multipath_conf).unwrap()).unwrap();
        assert_eq!(root.child("defaults").unwrap().value("polling_interval"), Some("20"));
        assert_eq!(
            root.child("blacklist").unwrap().values("devnode"),
            vec!["^hd[a-z]", "^sda$"]
        );
    }

    #[test]
    fn test_unparsable_file() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        fs::write(&ctx.config.paths.multipath_conf, "defaults {\n").unwrap();

        let mut object = MpathObject::new();
        object
            .add(r#"{"key": "defaults.polling_interval", "value": 5}"#, &mut ctx)
            .unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::NotOk);
    }

    #[test]
    fn test_intake_validation() {
        let mut ctx = ObjectContext::default();
        let mut object = MpathObject::new();
        assert_matches!(
            object.add(r#"{"key": "bogus.attr", "value": 1}"#, &mut ctx),
            Err(IntakeError::Validation { .. })
        );
        assert_matches!(
            object.add(r#"{"key": "defaults.features", "op": "unset"}"#, &mut ctx),
            Err(IntakeError::Validation { .. })
        );
        assert_eq!(object.rule_count(), 0);
    }
}
