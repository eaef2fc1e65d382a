//! Compliance object implementations
//!
//! Attribute objects: [`file`], [`symlink`], [`group`], [`groupmembership`],
//! [`user`], [`package`]. Key-value objects: [`keyval`], [`nodeconf`],
//! [`sysctl`], [`linux_mpath`]. Delegating objects reuse the file object
//! (`fileprop`, `sudoers`) or the property object (`zfs`, `zpool`).

pub mod file;
pub mod group;
pub mod groupmembership;
pub mod keyval;
pub mod kvfile;
pub mod linux_mpath;
pub mod mpath;
pub mod nodeconf;
pub mod package;
pub mod property;
pub mod sudoers;
pub mod symlink;
pub mod sysctl;
pub mod user;

pub use file::{FileFlavor, FileObject, FileRule};
pub use group::GroupObject;
pub use groupmembership::GroupMembershipObject;
pub use keyval::KeyvalObject;
pub use linux_mpath::MpathObject;
pub use nodeconf::NodeconfObject;
pub use package::PackageObject;
pub use property::{PropertyBackend, PropertyObject, ZfsCommandBackend};
pub use sudoers::{SyntaxChecker, VisudoChecker};
pub use symlink::SymlinkObject;
pub use sysctl::SysctlObject;
pub use user::UserObject;

use compobj_base::intake::Admission;
use compobj_base::logging::{codes, Code};
use compobj_base::strategies::{ConvergenceError, IntakeError, ObjectContext};
use compobj_base::{log_debug, log_error, log_info, log_success, ComplianceStatus};

/// A check that holds; logged only in verbose mode
pub(crate) fn on_target(ctx: &ObjectContext, message: &str) -> ComplianceStatus {
    if ctx.verbose {
        log_success!(codes::success::RULE_ON_TARGET, message);
    }
    ComplianceStatus::Ok
}

/// A check that does not hold; logged as an error in verbose mode
pub(crate) fn off_target(ctx: &ObjectContext, message: &str) -> ComplianceStatus {
    if ctx.verbose {
        log_error!(codes::check::NOT_ON_TARGET, message);
    } else {
        log_debug!(message);
    }
    ComplianceStatus::NotOk
}

pub(crate) fn check_error(err: &ConvergenceError) -> ComplianceStatus {
    let code = match err {
        ConvergenceError::Io { .. } | ConvergenceError::Parse { .. } => codes::check::READ_FAILED,
        ConvergenceError::Lookup { .. } => codes::check::LOOKUP_FAILED,
        ConvergenceError::Remote { .. } => codes::check::REMOTE_FAILED,
        _ => codes::check::COMMAND_FAILED,
    };
    log_error!(code, err.to_string());
    ComplianceStatus::NotOk
}

pub(crate) fn fixed(message: &str) -> ComplianceStatus {
    log_success!(codes::success::RULE_FIXED, message);
    ComplianceStatus::Ok
}

pub(crate) fn fix_error(code: Code, err: &ConvergenceError) -> ComplianceStatus {
    log_error!(code, err.to_string());
    ComplianceStatus::NotOk
}

/// Turn a conflict index verdict into keep/drop, recording conflicts once
///
/// Returns whether the rule should be kept. On a fresh conflict the caller
/// must also drop the rules it already holds for the key.
pub(crate) fn admit(ctx: &mut ObjectContext, admission: Admission, key: &str) -> bool {
    match admission {
        Admission::Accepted => true,
        Admission::Conflict(err) => {
            report_conflict(ctx, &err);
            false
        }
        Admission::Rejected => {
            log_info!("rule dropped, key was invalidated by a conflict", "key" => key);
            false
        }
    }
}

fn report_conflict(ctx: &mut ObjectContext, err: &IntakeError) {
    log_error!(err.code(), err.to_string());
    ctx.record_diagnostic(err.to_string());
}

/// Run a whitelisted command; a non-zero exit is an error
pub(crate) fn run_command(
    ctx: &ObjectContext,
    program: &str,
    args: &[&str],
) -> Result<String, ConvergenceError> {
    log_info!("running command", "program" => program, "args" => args.join(" "));
    let output = ctx.commands.execute(program, args)?;
    if !output.success() {
        return Err(ConvergenceError::CommandStatus {
            program: program.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output.stdout)
}
