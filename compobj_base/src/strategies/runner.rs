//! Invocation driver: environment intake, then one action

use crate::intake::matching_entries;
use crate::results::ComplianceStatus;
use crate::strategies::context::ObjectContext;
use crate::strategies::traits::{Action, ComplianceObject};
use crate::{log_debug, log_error};

/// Feed every environment entry matching `prefix` to the object
///
/// A payload that fails to decode or validate is logged and skipped; the
/// remaining entries are still processed. Returns the number of accepted
/// payloads.
pub fn load_rules(
    object: &mut dyn ComplianceObject,
    prefix: &str,
    ctx: &mut ObjectContext,
) -> usize {
    let entries = matching_entries(&ctx.env, prefix);
    let mut accepted = 0;

    for (var, payload) in entries {
        match object.add(&payload, ctx) {
            Ok(()) => {
                accepted += 1;
                log_debug!("rule accepted", "object" => object.name(), "var" => var);
            }
            Err(e) => {
                log_error!(e.code(), e.to_string(), "var" => var);
                ctx.record_diagnostic(format!("{}: {}", var, e));
            }
        }
    }

    accepted
}

/// Load the rules for `prefix` and run `action`
pub fn run_action(
    object: &mut dyn ComplianceObject,
    prefix: &str,
    action: Action,
    ctx: &mut ObjectContext,
) -> ComplianceStatus {
    if action == Action::Info {
        print!("{}", object.info().render());
        return ComplianceStatus::Ok;
    }

    load_rules(object, prefix, ctx);

    match action {
        Action::Check => {
            ctx.verbose = true;
            object.check(ctx)
        }
        Action::Fix => {
            ctx.verbose = false;
            object.fix(ctx)
        }
        Action::Fixable => object.fixable(ctx),
        Action::Info => ComplianceStatus::Ok,
    }
}
