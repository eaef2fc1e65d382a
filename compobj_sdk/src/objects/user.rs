//! Local user account convergence

use super::{check_error, fix_error, fixed, off_target, on_target, run_command};
use compobj_base::intake::{
    decode_map, fold_override, keep_non_empty, keep_set, split_polarity, Identity, MergeFields,
};
use compobj_base::logging::codes;
use compobj_base::strategies::{
    ComplianceObject, ConvergenceError, IntakeError, ObjectContext, ObjectInfo,
};
use compobj_base::sysdb::{PasswdEntry, Principal, SystemDatabase};
use compobj_base::ComplianceStatus;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserSpec {
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub gid: Option<Principal>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub gecos: Option<String>,
}

impl MergeFields for UserSpec {
    fn merge_missing(&mut self, later: Self) {
        keep_set(&mut self.uid, later.uid);
        keep_set(&mut self.gid, later.gid);
        keep_non_empty(&mut self.home, later.home);
        keep_non_empty(&mut self.shell, later.shell);
        keep_non_empty(&mut self.gecos, later.gecos);
    }
}

/// One `usermod`/`useradd` option that is off target
#[derive(Debug, Clone, PartialEq, Eq)]
struct Drift {
    flag: &'static str,
    field: &'static str,
    current: String,
    wanted: String,
}

#[derive(Default)]
pub struct UserObject {
    rules: Vec<Identity<UserSpec>>,
}

impl UserObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every desired attribute with its option flag, resolved to text
    fn wanted(spec: &UserSpec, db: &SystemDatabase<'_>) -> Result<Vec<(&'static str, &'static str, String)>, ConvergenceError> {
        let mut wanted = Vec::new();
        if let Some(uid) = spec.uid {
            wanted.push(("-u", "uid", uid.to_string()));
        }
        if let Some(gid) = spec.gid.as_ref().map(|p| db.resolve_gid(p)).transpose()?.flatten() {
            wanted.push(("-g", "gid", gid.to_string()));
        }
        for (flag, field, value) in [("-d", "home", &spec.home), ("-s", "shell", &spec.shell), ("-c", "gecos", &spec.gecos)] {
            if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
                wanted.push((flag, field, value.clone()));
            }
        }
        Ok(wanted)
    }

    fn drift(entry: &PasswdEntry, wanted: Vec<(&'static str, &'static str, String)>) -> Vec<Drift> {
        wanted
            .into_iter()
            .filter_map(|(flag, field, value)| {
                let current = match field {
                    "uid" => entry.uid.to_string(),
                    "gid" => entry.gid.to_string(),
                    "home" => entry.home.clone(),
                    "shell" => entry.shell.clone(),
                    _ => entry.gecos.clone(),
                };
                (current != value).then_some(Drift {
                    flag,
                    field,
                    current,
                    wanted: value,
                })
            })
            .collect()
    }

    fn check_user(rule: &Identity<UserSpec>, ctx: &ObjectContext) -> ComplianceStatus {
        let db = SystemDatabase::from_context(ctx);
        let entry = match db.user(&rule.name) {
            Ok(entry) => entry,
            Err(e) => return check_error(&e),
        };

        match (rule.present, entry) {
            (false, None) => on_target(ctx, &format!("user {} does not exist", rule.name)),
            (false, Some(_)) => off_target(ctx, &format!("user {} exists and should not", rule.name)),
            (true, None) => off_target(ctx, &format!("user {} does not exist", rule.name)),
            (true, Some(entry)) => {
                let drift = match Self::wanted(&rule.spec, &db) {
                    Ok(wanted) => Self::drift(&entry, wanted),
                    Err(e) => return check_error(&e),
                };
                if drift.is_empty() {
                    return on_target(ctx, &format!("user {} on target", rule.name));
                }
                let statuses: Vec<ComplianceStatus> = drift
                    .iter()
                    .map(|d| {
                        off_target(
                            ctx,
                            &format!(
                                "user {} {} is '{}', should be '{}'",
                                rule.name, d.field, d.current, d.wanted
                            ),
                        )
                    })
                    .collect();
                ctx.fold(statuses)
            }
        }
    }

    fn fix_user(rule: &Identity<UserSpec>, ctx: &ObjectContext) -> ComplianceStatus {
        let db = SystemDatabase::from_context(ctx);
        let entry = match db.user(&rule.name) {
            Ok(entry) => entry,
            Err(e) => return fix_error(codes::fix::COMMAND_FAILED, &e),
        };
        let wanted = match Self::wanted(&rule.spec, &db) {
            Ok(wanted) => wanted,
            Err(e) => return fix_error(codes::fix::COMMAND_FAILED, &e),
        };

        let (program, options): (&str, Vec<(&str, String)>) = match (rule.present, entry) {
            (false, None) => return ComplianceStatus::Ok,
            (false, Some(_)) => ("userdel", Vec::new()),
            (true, None) => (
                "useradd",
                wanted.into_iter().map(|(flag, _, value)| (flag, value)).collect(),
            ),
            (true, Some(entry)) => {
                let drift = Self::drift(&entry, wanted);
                if drift.is_empty() {
                    return ComplianceStatus::Ok;
                }
                ("usermod", drift.into_iter().map(|d| (d.flag, d.wanted)).collect())
            }
        };

        let mut args: Vec<&str> = Vec::new();
        for (flag, value) in &options {
            args.push(flag);
            args.push(value.as_str());
        }
        args.push(rule.name.as_str());

        match run_command(ctx, program, &args) {
            Ok(_) => fixed(&format!("{} {}", program, args.join(" "))),
            Err(e) => fix_error(codes::fix::COMMAND_FAILED, &e),
        }
    }
}

impl ComplianceObject for UserObject {
    fn name(&self) -> &'static str {
        "user"
    }

    fn add(&mut self, payload: &str, _ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let mut incoming = Vec::new();
        for (name, spec) in decode_map::<UserSpec>("user", payload)? {
            let (bare, present) = split_polarity(&name);
            if bare.is_empty() {
                return Err(IntakeError::validation("user", "empty user name"));
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
        ctx.fold(self.rules.iter().map(|rule| Self::check_user(rule, ctx)))
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        let ctx = &*ctx;
        ctx.fold(self.rules.iter().map(|rule| Self::fix_user(rule, ctx)))
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            description: "Verify local user accounts and their properties. A user name \
                prefixed with '-' must not exist.",
            example_value: json!({
                "tibco": {
                    "uid": 1000,
                    "gid": 1000,
                    "home": "/home/tibco",
                    "shell": "/bin/bash",
                    "gecos": "tibco service account"
                },
                "-games": {}
            }),
            form_definition: r#"
Desc: A map of user names to account properties
Inputs:
  <name>: user name, '-' prefix for a user that must not exist
    uid: integer
    gid: integer or group name
    home: string
    shell: string
    gecos: string
"#,
        }
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
