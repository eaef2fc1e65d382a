//! Group existence and gid convergence

use super::{check_error, fix_error, fixed, off_target, on_target, run_command};
use compobj_base::intake::{decode_map, fold_override, keep_set, split_polarity, Identity, MergeFields};
use compobj_base::logging::codes;
use compobj_base::strategies::{ComplianceObject, IntakeError, ObjectContext, ObjectInfo};
use compobj_base::sysdb::SystemDatabase;
use compobj_base::ComplianceStatus;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub gid: Option<u32>,
}

impl MergeFields for GroupSpec {
    fn merge_missing(&mut self, later: Self) {
        keep_set(&mut self.gid, later.gid);
    }
}

#[derive(Default)]
pub struct GroupObject {
    rules: Vec<Identity<GroupSpec>>,
}

impl GroupObject {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_group(rule: &Identity<GroupSpec>, ctx: &ObjectContext) -> ComplianceStatus {
        let current = match SystemDatabase::from_context(ctx).group(&rule.name) {
            Ok(entry) => entry,
            Err(e) => return check_error(&e),
        };

        match (rule.present, current) {
            (false, None) => on_target(ctx, &format!("group {} does not exist", rule.name)),
            (false, Some(_)) => off_target(ctx, &format!("group {} exists and should not", rule.name)),
            (true, None) => off_target(ctx, &format!("group {} does not exist", rule.name)),
            (true, Some(entry)) => match rule.spec.gid {
                Some(gid) if gid != entry.gid => off_target(
                    ctx,
                    &format!("group {} gid is {}, should be {}", rule.name, entry.gid, gid),
                ),
                _ => on_target(ctx, &format!("group {} exists", rule.name)),
            },
        }
    }

    fn fix_group(rule: &Identity<GroupSpec>, ctx: &ObjectContext) -> ComplianceStatus {
        let current = match SystemDatabase::from_context(ctx).group(&rule.name) {
            Ok(entry) => entry,
            Err(e) => return fix_error(codes::fix::COMMAND_FAILED, &e),
        };

        let gid = rule.spec.gid.map(|g| g.to_string());
        let (program, args): (&str, Vec<&str>) = match (rule.present, current) {
            (false, None) => return ComplianceStatus::Ok,
            (false, Some(_)) => ("groupdel", vec![rule.name.as_str()]),
            (true, None) => match &gid {
                Some(gid) => ("groupadd", vec!["-g", gid.as_str(), rule.name.as_str()]),
                None => ("groupadd", vec![rule.name.as_str()]),
            },
            (true, Some(entry)) => match &gid {
                Some(wanted) if rule.spec.gid != Some(entry.gid) => {
                    ("groupmod", vec!["-g", wanted.as_str(), rule.name.as_str()])
                }
                _ => return ComplianceStatus::Ok,
            },
        };

        match run_command(ctx, program, &args) {
            Ok(_) => fixed(&format!("{} {}", program, args.join(" "))),
            Err(e) => fix_error(codes::fix::COMMAND_FAILED, &e),
        }
    }
}

impl ComplianceObject for GroupObject {
    fn name(&self) -> &'static str {
        "group"
    }

    fn add(&mut self, payload: &str, _ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let mut incoming = Vec::new();
        for (name, spec) in decode_map::<GroupSpec>("group", payload)? {
            let (bare, present) = split_polarity(&name);
            if bare.is_empty() {
                return Err(IntakeError::validation("group", "empty group name"));
            }
            incoming.push(Identity::new(bare, present, spec));
        }
        for rule in incoming {
            fold_override(&mut self.rules, rule);
        }
        Ok(())
    }

    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        let ctx = &*ctx;
        ctx.fold(self.rules.iter().map(|rule| Self::check_group(rule, ctx)))
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        let ctx = &*ctx;
        ctx.fold(self.rules.iter().map(|rule| Self::fix_group(rule, ctx)))
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            description: "Verify a local group exists with the given gid. A group name \
                prefixed with '-' must not exist.",
            example_value: json!({
                "tibco": {"gid": 1000},
                "-games": {}
            }),
            form_definition: r#"
Desc: A map of group names to group properties
Inputs:
  <name>: group name, '-' prefix for a group that must not exist
    gid: integer
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
    use crate::test_support::{output, test_context, FakeCommands};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// groupadd, groupmod and groupdel acting on the fixture group file
    fn group_tools(path: PathBuf) -> FakeCommands {
        FakeCommands::new(move |program, args| {
            let name = args[args.len() - 1];
            let prefix = format!("{}:", name);
            let text = fs::read_to_string(&path).unwrap_or_default();
            let mut lines: Vec<String> = text
                .lines()
                .filter(|line| !line.starts_with(&prefix))
                .map(str::to_string)
                .collect();
            if program != "groupdel" {
                let gid = if args[0] == "-g" { args[1] } else { "999" };
                lines.push(format!("{}:x:{}:", name, gid));
            }
            fs::write(&path, lines.join("\n") + "\n").unwrap();
            output("")
        })
    }

    #[test]
    fn test_polarity_follows_order_within_payload() {
        let mut ctx = ObjectContext::default();
        let mut object = GroupObject::new();
        object.add(r#"{"wheel": {"gid": 10}, "-wheel": {}}"#, &mut ctx).unwrap();
        assert_eq!(object.rule_count(), 1);
        assert!(!object.rules[0].present);

        let mut object = GroupObject::new();
        object.add(r#"{"-wheel": {}, "wheel": {"gid": 10}}"#, &mut ctx).unwrap();
        assert!(object.rules[0].present);
        assert_eq!(object.rules[0].spec.gid, Some(10));
    }

    #[test]
    fn test_fix_then_check() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let group = ctx.config.paths.group.clone();
        fs::write(&group, "wheel:x:10:alice\ngames:x:20:\n").unwrap();
        let commands = group_tools(group);
        let calls = commands.calls();
        ctx.commands = Box::new(commands);

        let mut object = GroupObject::new();
        object
            .add(r#"{"ops": {"gid": 500}, "wheel": {"gid": 11}, "-games": {}}"#, &mut ctx)
            .unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(
            *calls.borrow(),
            vec!["groupadd -g 500 ops", "groupmod -g 11 wheel", "groupdel games"]
        );

        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(calls.borrow().len(), 3);
    }

    #[test]
    fn test_fix_reports_failed_command() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        ctx.commands = Box::new(FakeCommands::new(|_, _| {
            let mut failed = output("");
            failed.exit_code = 9;
            failed.stderr = "groupadd: GID '10' already exists".to_string();
            failed
        }));

        let mut object = GroupObject::new();
        object.add(r#"{"ops": {"gid": 10}}"#, &mut ctx).unwrap();
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::NotOk);
    }

    #[test]
    fn test_override_folding() {
        let mut ctx = ObjectContext::default();
        let mut object = GroupObject::new();
        object.add(r#"{"tibco": {"gid": 1000}}"#, &mut ctx).unwrap();
        object.add(r#"{"tibco": {"gid": 2000}, "ops": {}}"#, &mut ctx).unwrap();
        object.add(r#"{"-ops": {}}"#, &mut ctx).unwrap();

        assert_eq!(object.rule_count(), 2);
        assert_eq!(object.rules[0].spec.gid, Some(1000));
        assert_eq!(object.rules[1].name, "ops");
        assert!(!object.rules[1].present);
    }

    #[test]
    fn test_check_against_group_file() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        std::fs::write(&ctx.config.paths.group, "root:x:0:\nwheel:x:10:alice\n").unwrap();

        let mut object = GroupObject::new();
        object.add(r#"{"wheel": {"gid": 10}, "-games": {}}"#, &mut ctx).unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);

        let mut object = GroupObject::new();
        object.add(r#"{"wheel": {"gid": 11}}"#, &mut ctx).unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);

        let mut object = GroupObject::new();
        object.add(r#"{"-root": {}}"#, &mut ctx).unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
    }

    #[test]
    fn test_rejects_malformed_payload() {
        let mut ctx = ObjectContext::default();
        let mut object = GroupObject::new();
        assert!(object.add(r#"{"wheel": {"gid": "ten"}}"#, &mut ctx).is_err());
        assert!(object.add(r#"{"-": {}}"#, &mut ctx).is_err());
        assert_eq!(object.rule_count(), 0);
    }
}
