//! # compobj CLI
//!
//! `compobj <object> <prefix> <action>`, or `<object> <prefix> <action>` when
//! the binary is invoked through a link named after a registered object.

use clap::Parser;
use compobj_base::config::RuntimeConfig;
use compobj_base::strategies::{run_action, Action};
use compobj_base::{log_debug, log_error, logging, ObjectContext};
use compobj_sdk::REGISTRY;
use clap::error::ErrorKind;
use std::path::Path;
use std::process;

/// Malformed invocation or unknown object (sysexits `EX_USAGE`)
///
/// Kept apart from the status exit codes 0, 1 and 2.
const EXIT_USAGE: i32 = 64;

/// Unreadable runtime configuration (sysexits `EX_CONFIG`)
const EXIT_CONFIG: i32 = 78;

#[derive(Parser, Debug)]
#[command(
    name = "compobj",
    version,
    about = "Check and fix configuration compliance rules read from the environment"
)]
struct Cli {
    /// Print the registered object names and exit
    #[arg(long)]
    list: bool,

    /// Rule type, e.g. file, keyval, sysctl
    #[arg(required_unless_present = "list")]
    object: Option<String>,

    /// Environment variable prefix selecting the rules, e.g. OSVC_COMP_FILE_
    #[arg(required_unless_present = "list")]
    prefix: Option<String>,

    /// One of check, fix, fixable, info
    #[arg(required_unless_present = "list")]
    action: Option<Action>,
}

/// Arguments when the program name selects the object
#[derive(Parser, Debug)]
struct AliasCli {
    /// Environment variable prefix selecting the rules
    prefix: String,

    /// One of check, fix, fixable, info
    action: Action,
}

#[derive(Debug)]
enum Invocation {
    List,
    Run {
        object: String,
        prefix: String,
        action: Action,
    },
}

fn parse_invocation(args: &[String]) -> Result<Invocation, clap::Error> {
    let argv0 = args.first().map(String::as_str).unwrap_or("compobj");

    if let Some(object) = REGISTRY.name_from_program(argv0) {
        let cli = AliasCli::try_parse_from(args)?;
        return Ok(Invocation::Run {
            object: object.to_string(),
            prefix: cli.prefix,
            action: cli.action,
        });
    }

    let cli = Cli::try_parse_from(args)?;
    match (cli.list, cli.object, cli.prefix, cli.action) {
        (true, _, _, _) => Ok(Invocation::List),
        (false, Some(object), Some(prefix), Some(action)) => Ok(Invocation::Run {
            object,
            prefix,
            action,
        }),
        _ => Err(clap::Error::new(clap::error::ErrorKind::MissingRequiredArgument)),
    }
}

/// Exit code for a command line clap refused to parse
fn parse_failure_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => EXIT_USAGE,
    }
}

fn program_name(args: &[String]) -> &str {
    args.first()
        .map(Path::new)
        .and_then(|path| path.file_name())
        .and_then(|name| name.to_str())
        .unwrap_or("compobj")
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <object> <prefix> <check|fix|fixable|info>", program);
    eprintln!("       {} --list", program);
    eprintln!("Objects: {}", REGISTRY.names().collect::<Vec<_>>().join(", "));
}

fn init_logging(config: &RuntimeConfig) {
    let level = config.log_level();
    let format = config.log_format();
    match (level, format) {
        (Ok(level), Ok(format)) => {
            if let Err(e) = logging::init_global_logging(format, level) {
                log::warn!("event logging disabled: {}", e);
            }
        }
        (Err(e), _) | (_, Err(e)) => log::warn!("event logging disabled: {}", e),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let invocation = match parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            let code = parse_failure_code(&e);
            let _ = e.print();
            if code != 0 {
                print_usage(program_name(&args));
            }
            process::exit(code);
        }
    };

    let (object_name, prefix, action) = match invocation {
        Invocation::List => {
            for name in REGISTRY.names() {
                println!("{}", name);
            }
            return;
        }
        Invocation::Run {
            object,
            prefix,
            action,
        } => (object, prefix, action),
    };

    let config = match RuntimeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("compobj: {}", e);
            process::exit(EXIT_CONFIG);
        }
    };
    init_logging(&config);

    let mut object = match REGISTRY.create(&object_name) {
        Ok(object) => object,
        Err(e) => {
            log_error!(logging::codes::system::UNKNOWN_OBJECT, e.to_string());
            eprintln!("compobj: {}", e);
            print_usage(program_name(&args));
            process::exit(EXIT_USAGE);
        }
    };

    log_debug!("invocation", "object" => object_name, "prefix" => prefix, "action" => action);

    let mut ctx = ObjectContext::new(config).with_env(std::env::vars());
    let status = run_action(&mut object, &prefix, action, &mut ctx);
    process::exit(status.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use compobj_base::ComplianceStatus;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_full_invocation() {
        let invocation =
            parse_invocation(&args(&["compobj", "keyval", "OSVC_COMP_SSH_", "check"])).unwrap();
        assert_matches!(
            invocation,
            Invocation::Run { object, prefix, action: Action::Check }
                if object == "keyval" && prefix == "OSVC_COMP_SSH_"
        );
    }

    #[test]
    fn test_alias_invocation() {
        let invocation =
            parse_invocation(&args(&["/usr/share/compobj/sysctl", "OSVC_COMP_KERN_", "fix"]))
                .unwrap();
        assert_matches!(
            invocation,
            Invocation::Run { object, action: Action::Fix, .. } if object == "sysctl"
        );
    }

    #[test]
    fn test_list_and_malformed() {
        assert_matches!(
            parse_invocation(&args(&["compobj", "--list"])),
            Ok(Invocation::List)
        );
        assert!(parse_invocation(&args(&["compobj", "keyval", "OSVC_COMP_"])).is_err());
        assert!(parse_invocation(&args(&["compobj", "keyval", "OSVC_COMP_", "repair"])).is_err());
    }

    #[test]
    fn test_malformed_invocation_exit_code() {
        let statuses = [
            ComplianceStatus::Ok.exit_code(),
            ComplianceStatus::NotOk.exit_code(),
            ComplianceStatus::NotApplicable.exit_code(),
        ];

        for argv in [
            &["compobj", "keyval", "OSVC_COMP_"][..],
            &["compobj", "keyval", "OSVC_COMP_", "repair"][..],
            &["/usr/share/compobj/sysctl", "OSVC_COMP_KERN_"][..],
            &["compobj", "--bogus"][..],
        ] {
            let err = parse_invocation(&args(argv)).unwrap_err();
            let code = parse_failure_code(&err);
            assert!(!statuses.contains(&code), "{:?} exits with {}", argv, code);
            assert_eq!(code, EXIT_USAGE);
        }
    }

    #[test]
    fn test_help_and_version_exit_zero() {
        let help = parse_invocation(&args(&["compobj", "--help"])).unwrap_err();
        assert_eq!(parse_failure_code(&help), 0);
        let version = parse_invocation(&args(&["compobj", "--version"])).unwrap_err();
        assert_eq!(parse_failure_code(&version), 0);
    }

    #[test]
    fn test_program_name() {
        assert_eq!(program_name(&args(&["/opt/compobj/bin/keyval"])), "keyval");
        assert_eq!(program_name(&[]), "compobj");
    }
}
