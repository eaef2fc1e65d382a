//! Package presence convergence

use super::{check_error, fix_error, fixed, off_target, on_target, run_command};
use crate::commands::PackageManager;
use compobj_base::intake::{decode_list, fold_override, split_polarity, substitute, Identity};
use compobj_base::logging::codes;
use compobj_base::strategies::{
    ComplianceObject, ConvergenceError, IntakeError, ObjectContext, ObjectInfo,
};
use compobj_base::{log_error, ComplianceStatus};
use serde_json::json;
use std::collections::HashSet;

#[derive(Default)]
pub struct PackageObject {
    rules: Vec<Identity<()>>,
}

impl PackageObject {
    pub fn new() -> Self {
        Self::default()
    }

    fn manager(ctx: &ObjectContext) -> Result<PackageManager, ConvergenceError> {
        PackageManager::detect(&*ctx.commands).ok_or_else(|| ConvergenceError::Unsupported {
            reason: "no supported package manager found".to_string(),
        })
    }

    fn installed(manager: PackageManager, ctx: &ObjectContext) -> Result<HashSet<String>, ConvergenceError> {
        let (program, args) = manager.list_installed();
        let stdout = run_command(ctx, program, args)?;
        Ok(manager.parse_installed(&stdout))
    }

    fn evaluate(&self, ctx: &ObjectContext) -> Result<(PackageManager, HashSet<String>), ConvergenceError> {
        let manager = Self::manager(ctx)?;
        let installed = Self::installed(manager, ctx)?;
        Ok((manager, installed))
    }
}

impl ComplianceObject for PackageObject {
    fn name(&self) -> &'static str {
        "package"
    }

    fn add(&mut self, payload: &str, ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let names: Vec<String> = decode_list("package", payload)?;
        let mut incoming = Vec::with_capacity(names.len());
        for name in names {
            let name = substitute(name.trim(), &ctx.env);
            let (bare, present) = split_polarity(&name);
            if bare.is_empty() {
                return Err(IntakeError::validation("package", "empty package name"));
            }
            incoming.push(Identity::new(bare, present, ()));
        }
        for rule in incoming {
            fold_override(&mut self.rules, rule);
        }
        Ok(())
    }

    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        if self.rules.is_empty() {
            return ComplianceStatus::Ok;
        }
        let ctx = &*ctx;
        let installed = match self.evaluate(ctx) {
            Ok((_, installed)) => installed,
            Err(e) => return check_error(&e),
        };

        ctx.fold(self.rules.iter().map(|rule| {
            match (rule.present, installed.contains(&rule.name)) {
                (true, true) => on_target(ctx, &format!("package {} is installed", rule.name)),
                (true, false) => off_target(ctx, &format!("package {} is not installed", rule.name)),
                (false, false) => on_target(ctx, &format!("package {} is not installed", rule.name)),
                (false, true) => {
                    off_target(ctx, &format!("package {} is installed and should not be", rule.name))
                }
            }
        }))
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        if self.rules.is_empty() {
            return ComplianceStatus::Ok;
        }
        let ctx = &*ctx;
        let (manager, installed) = match self.evaluate(ctx) {
            Ok(state) => state,
            Err(e) => return fix_error(codes::fix::NOT_FIXABLE, &e),
        };

        ctx.fold(self.rules.iter().map(|rule| {
            let (program, args) = match (rule.present, installed.contains(&rule.name)) {
                (true, false) => manager.install(&rule.name),
                (false, true) => manager.remove(&rule.name),
                _ => return ComplianceStatus::Ok,
            };
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            match run_command(ctx, program, &args) {
                Ok(_) => fixed(&format!("{} {}", program, args.join(" "))),
                Err(e) => fix_error(codes::fix::COMMAND_FAILED, &e),
            }
        }))
    }

    fn fixable(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        match PackageManager::detect(&*ctx.commands) {
            Some(_) => ComplianceStatus::Ok,
            None => {
                log_error!(codes::fix::NOT_FIXABLE, "no supported package manager found");
                ComplianceStatus::NotApplicable
            }
        }
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            description: "Verify packages are installed, or absent when the name is \
                prefixed with '-'. The package manager is detected from the binaries \
                available on the node.",
            example_value: json!(["openssh-server", "-telnet"]),
            form_definition: r#"
Desc: A list of package names
Inputs:
  <name>: package name, '-' prefix for a package that must not be installed
"#,
        }
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
