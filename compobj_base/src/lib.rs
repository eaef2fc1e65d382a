//! # compobj base - configuration compliance framework

pub mod config;
pub mod fsutil;
pub mod intake;
pub mod logging;
pub mod results;
pub mod strategies;
pub mod sysdb;

// Convenience re-exports
pub use results::{Algebra, ComplianceStatus};
pub use strategies::{ComplianceObject, ObjectContext, ObjectInfo, ObjectRegistry};

pub mod prelude {
    pub use crate::config::{ConfigError, RuntimeConfig};

    pub use crate::results::{Algebra, ComplianceStatus};

    pub use crate::strategies::{
        load_rules, run_action, Action, CommandError, CommandOutput, CommandRunner, ComplianceObject,
        ConvergenceError, IntakeError, ObjectContext, ObjectEntry, ObjectInfo, ObjectRegistry,
        RegistryError, SystemCommandExecutor,
    };

    pub use crate::intake::{
        decode_list, decode_map, decode_one, split_polarity, substitute, Admission, KeyIndex,
        Operator, Scalar, TargetValue,
    };

    pub use crate::fsutil::{backup_file, ensure_parent, replace_file};

    pub use crate::sysdb::{GroupEntry, PasswdEntry, Principal, SystemDatabase};

    pub use crate::logging::{codes, Code};
}
