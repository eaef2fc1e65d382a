//! Supplementary group membership convergence

use super::{check_error, fix_error, fixed, off_target, on_target, run_command};
use compobj_base::intake::{decode_map, fold_override, split_polarity, Identity, MergeFields};
use compobj_base::logging::codes;
use compobj_base::strategies::{
    ComplianceObject, ConvergenceError, IntakeError, ObjectContext, ObjectInfo,
};
use compobj_base::sysdb::SystemDatabase;
use compobj_base::ComplianceStatus;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, Deserialize)]
struct MembershipPayload {
    #[serde(default)]
    members: Vec<String>,
}

/// Desired members of one group; `false` marks a user that must not be a member
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    pub members: Vec<(String, bool)>,
}

impl MergeFields for Membership {
    /// A later entry for the same user replaces the earlier polarity
    fn merge_missing(&mut self, later: Self) {
        for (user, present) in later.members {
            match self.members.iter_mut().find(|(name, _)| *name == user) {
                Some(existing) => existing.1 = present,
                None => self.members.push((user, present)),
            }
        }
    }
}

#[derive(Default)]
pub struct GroupMembershipObject {
    rules: Vec<Identity<Membership>>,
}

impl GroupMembershipObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Users whose membership is off target, with the desired polarity
    fn drift(
        rule: &Identity<Membership>,
        ctx: &ObjectContext,
    ) -> Result<Option<Vec<(String, bool)>>, ConvergenceError> {
        let Some(group) = SystemDatabase::from_context(ctx).group(&rule.name)? else {
            return Ok(None);
        };
        Ok(Some(
            rule.spec
                .members
                .iter()
                .filter(|(user, present)| group.members.contains(user) != *present)
                .cloned()
                .collect(),
        ))
    }

    fn check_membership(rule: &Identity<Membership>, ctx: &ObjectContext) -> ComplianceStatus {
        match Self::drift(rule, ctx) {
            Ok(None) => off_target(ctx, &format!("group {} does not exist", rule.name)),
            Ok(Some(drift)) if drift.is_empty() => {
                on_target(ctx, &format!("group {} membership on target", rule.name))
            }
            Ok(Some(drift)) => {
                let statuses: Vec<ComplianceStatus> = drift
                    .iter()
                    .map(|(user, present)| {
                        let verdict = if *present { "is not" } else { "should not be" };
                        off_target(ctx, &format!("{} {} a member of {}", user, verdict, rule.name))
                    })
                    .collect();
                ctx.fold(statuses)
            }
            Err(e) => check_error(&e),
        }
    }

    fn fix_membership(rule: &Identity<Membership>, ctx: &ObjectContext) -> ComplianceStatus {
        let drift = match Self::drift(rule, ctx) {
            Ok(Some(drift)) => drift,
            Ok(None) => {
                let err = ConvergenceError::Lookup {
                    kind: "group",
                    name: rule.name.clone(),
                };
                return fix_error(codes::fix::NOT_FIXABLE, &err);
            }
            Err(e) => return fix_error(codes::fix::COMMAND_FAILED, &e),
        };

        let statuses: Vec<ComplianceStatus> = drift
            .iter()
            .map(|(user, present)| {
                let flag = if *present { "-a" } else { "-d" };
                match run_command(ctx, "gpasswd", &[flag, user.as_str(), rule.name.as_str()]) {
                    Ok(_) => fixed(&format!("gpasswd {} {} {}", flag, user, rule.name)),
                    Err(e) => fix_error(codes::fix::COMMAND_FAILED, &e),
                }
            })
            .collect();
        ctx.fold(statuses)
    }
}

impl ComplianceObject for GroupMembershipObject {
    fn name(&self) -> &'static str {
        "groupmembership"
    }

    fn add(&mut self, payload: &str, _ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let mut incoming = Vec::new();
        for (group, body) in decode_map::<MembershipPayload>("groupmembership", payload)? {
            let mut members = Vec::new();
            for member in body.members {
                let (user, present) = split_polarity(member.trim());
                if user.is_empty() {
                    return Err(IntakeError::validation("groupmembership", "empty member name"));
                }
                members.push((user.to_string(), present));
            }
            let mut spec = Membership::default();
            spec.merge_missing(Membership { members });
            incoming.push(Identity::new(group, true, spec));
        }
        for rule in incoming {
            fold_override(&mut self.rules, rule);
        }
        Ok(())
    }

    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        let ctx = &*ctx;
        ctx.fold(self.rules.iter().map(|rule| Self::check_membership(rule, ctx)))
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        let ctx = &*ctx;
        ctx.fold(self.rules.iter().map(|rule| Self::fix_membership(rule, ctx)))
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            description: "Verify the supplementary members of a group. A member prefixed \
                with '-' must not belong to the group.",
            example_value: json!({
                "wheel": {"members": ["alice", "-mallory"]}
            }),
            form_definition: r#"
Desc: A map of group names to membership lists
Inputs:
  <group>: group name
    members: list of user names, '-' prefix for users that must not be members
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
    use tempfile::TempDir;

    #[test]
    fn test_member_polarity_folding() {
        let mut ctx = ObjectContext::default();
        let mut object = GroupMembershipObject::new();
        object
            .add(r#"{"wheel": {"members": ["alice", "bob"]}}"#, &mut ctx)
            .unwrap();
        object
            .add(r#"{"wheel": {"members": ["-bob", "carol"]}}"#, &mut ctx)
            .unwrap();

        assert_eq!(object.rule_count(), 1);
        assert_eq!(
            object.rules[0].spec.members,
            vec![
                ("alice".to_string(), true),
                ("bob".to_string(), false),
                ("carol".to_string(), true)
            ]
        );
    }

    #[test]
    fn test_check_members() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        std::fs::write(&ctx.config.paths.group, "wheel:x:10:alice,bob\n").unwrap();

        let mut object = GroupMembershipObject::new();
        object
            .add(r#"{"wheel": {"members": ["alice", "-mallory"]}}"#, &mut ctx)
            .unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);

        let mut object = GroupMembershipObject::new();
        object.add(r#"{"wheel": {"members": ["-bob"]}}"#, &mut ctx).unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);

        let mut object = GroupMembershipObject::new();
        object.add(r#"{"staff": {"members": ["alice"]}}"#, &mut ctx).unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
    }

    #[test]
    fn test_fix_then_check() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let group = ctx.config.paths.group.clone();
        fs::write(&group, "wheel:x:10:alice,bob\n").unwrap();

        // gpasswd -a|-d USER GROUP on the fixture group file
        let path = group.clone();
        let commands = FakeCommands::new(move |_, args| {
            let (flag, user) = (args[0], args[1]);
            let text = fs::read_to_string(&path).unwrap();
            let line = text.trim_end();
            let (head, members) = line.rsplit_once(':').unwrap();
            let mut members: Vec<&str> = members.split(',').filter(|m| !m.is_empty()).collect();
            members.retain(|m| *m != user);
            if flag == "-a" {
                members.push(user);
            }
            fs::write(&path, format!("{}:{}\n", head, members.join(","))).unwrap();
            output("")
        });
        let calls = commands.calls();
        ctx.commands = Box::new(commands);

        let mut object = GroupMembershipObject::new();
        object
            .add(r#"{"wheel": {"members": ["alice", "carol", "-bob"]}}"#, &mut ctx)
            .unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(
            *calls.borrow(),
            vec!["gpasswd -a carol wheel", "gpasswd -d bob wheel"]
        );
        assert_eq!(fs::read_to_string(&group).unwrap(), "wheel:x:10:alice,carol\n");

        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_fix_missing_group() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        std::fs::write(&ctx.config.paths.group, "wheel:x:10:\n").unwrap();
        let commands = FakeCommands::new(|_, _| output(""));
        let calls = commands.calls();
        ctx.commands = Box::new(commands);

        let mut object = GroupMembershipObject::new();
        object.add(r#"{"staff": {"members": ["alice"]}}"#, &mut ctx).unwrap();
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::NotOk);
        assert!(calls.borrow().is_empty());
    }
}
