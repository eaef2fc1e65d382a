// src/strategies/errors.rs
//! Error types for compliance objects
//!
//! Intake errors skip a single rule payload; convergence errors turn a single
//! rule into `NotOk`; registry errors are fatal for the invocation.

use super::command_executor::CommandError;
use crate::logging::{codes, Code};

/// Rule intake errors: decoding, validation, and conflict resolution
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Failed to decode {object} rule: {reason}")]
    Decode { object: &'static str, reason: String },

    #[error("Invalid {object} rule: {reason}")]
    Validation { object: &'static str, reason: String },

    #[error("Conflicting rules for key '{key}': '{first}' and '{second}' cannot both hold, rules dropped")]
    Conflict {
        key: String,
        first: String,
        second: String,
    },
}

impl IntakeError {
    pub fn decode(object: &'static str, reason: impl Into<String>) -> Self {
        IntakeError::Decode {
            object,
            reason: reason.into(),
        }
    }

    pub fn validation(object: &'static str, reason: impl Into<String>) -> Self {
        IntakeError::Validation {
            object,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> Code {
        match self {
            IntakeError::Decode { .. } => codes::intake::DECODE_FAILED,
            IntakeError::Validation { .. } => codes::intake::VALIDATION_FAILED,
            IntakeError::Conflict { .. } => codes::intake::RULE_CONFLICT,
        }
    }
}

/// Errors raised while evaluating or remediating a rule
#[derive(Debug, thiserror::Error)]
pub enum ConvergenceError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown {kind} '{name}'")]
    Lookup { kind: &'static str, name: String },

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("'{program}' exited with status {exit_code}: {stderr}")]
    CommandStatus {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Remote service error: {reason}")]
    Remote { reason: String },

    #[error("Pre-fix validation failed: {reason}")]
    Precheck { reason: String },

    #[error("Parse error in '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("Not supported: {reason}")]
    Unsupported { reason: String },
}

impl ConvergenceError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        ConvergenceError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Registry lookup errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown compliance object type: {0}")]
    UnknownObject(String),

    #[error("Duplicate compliance object registration: {0}")]
    DuplicateObject(String),
}
