// src/strategies/mod.rs
//! Compliance object strategy module
//!
//! - [`ComplianceObject`] - the check/fix/fixable/info interface of a rule type
//! - [`ObjectRegistry`] - compile-time table of rule types
//! - [`ObjectContext`] - per-invocation state shared by intake and convergence
//! - [`CommandRunner`] / [`SystemCommandExecutor`] - whitelisted external command runner

pub mod command_executor;
pub mod context;
pub mod errors;
pub mod registry;
pub mod runner;
pub mod traits;

pub use command_executor::{CommandError, CommandOutput, CommandRunner, SystemCommandExecutor};
pub use context::{ObjectContext, DEFAULT_COMMAND_WHITELIST};
pub use errors::{ConvergenceError, IntakeError, RegistryError};
pub use registry::{ObjectEntry, ObjectRegistry};
pub use runner::{load_rules, run_action};
pub use traits::{Action, ComplianceObject, ObjectInfo};
