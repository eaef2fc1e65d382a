//! Consolidated diagnostic codes and classification system
//!
//! Single source of truth for all codes emitted by compliance objects, their
//! metadata, and classification functions.

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// CODE WRAPPER TYPE
// ============================================================================

/// Universal code wrapper for both error and success codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(&'static str);

impl Code {
    pub const fn new(code: &'static str) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ERROR CLASSIFICATION TYPES
// ============================================================================

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }
}

/// Complete metadata for a code
#[derive(Debug, Clone)]
pub struct CodeMetadata {
    pub code: &'static str,
    pub category: &'static str,
    pub severity: Severity,
    pub description: &'static str,
}

impl CodeMetadata {
    const fn new(
        code: &'static str,
        category: &'static str,
        severity: Severity,
        description: &'static str,
    ) -> Self {
        Self {
            code,
            category,
            severity,
            description,
        }
    }
}

// ============================================================================
// ERROR CODE CONSTANTS
// ============================================================================

/// System error codes
pub mod system {
    use super::Code;

    pub const INTERNAL_ERROR: Code = Code::new("ERR001");
    pub const USAGE_ERROR: Code = Code::new("ERR002");
    pub const UNKNOWN_OBJECT: Code = Code::new("ERR003");
    pub const CONFIG_ERROR: Code = Code::new("ERR004");
}

/// Rule intake error codes
pub mod intake {
    use super::Code;

    pub const DECODE_FAILED: Code = Code::new("E001");
    pub const VALIDATION_FAILED: Code = Code::new("E002");
    pub const RULE_CONFLICT: Code = Code::new("E003");
}

/// Evaluation error codes (check side)
pub mod check {
    use super::Code;

    pub const NOT_ON_TARGET: Code = Code::new("E010");
    pub const READ_FAILED: Code = Code::new("E011");
    pub const LOOKUP_FAILED: Code = Code::new("E012");
    pub const COMMAND_FAILED: Code = Code::new("E013");
    pub const REMOTE_FAILED: Code = Code::new("E014");
}

/// Remediation error codes (fix side)
pub mod fix {
    use super::Code;

    pub const WRITE_FAILED: Code = Code::new("E020");
    pub const METADATA_FAILED: Code = Code::new("E021");
    pub const COMMAND_FAILED: Code = Code::new("E022");
    pub const PRECHECK_FAILED: Code = Code::new("E023");
    pub const NOT_FIXABLE: Code = Code::new("E024");
}

// ============================================================================
// SUCCESS CODE CONSTANTS
// ============================================================================

/// Success codes
pub mod success {
    use super::Code;

    pub const SYSTEM_INITIALIZATION_COMPLETED: Code = Code::new("I001");
    pub const RULE_ON_TARGET: Code = Code::new("I010");
    pub const RULE_FIXED: Code = Code::new("I020");
    pub const BACKUP_TAKEN: Code = Code::new("I021");
}

// ============================================================================
// CODE METADATA REGISTRY
// ============================================================================

static CODE_REGISTRY: OnceLock<HashMap<&'static str, CodeMetadata>> = OnceLock::new();

fn get_code_registry() -> &'static HashMap<&'static str, CodeMetadata> {
    CODE_REGISTRY.get_or_init(|| {
        let entries = [
            CodeMetadata::new("ERR001", "System", Severity::Critical, "Internal error"),
            CodeMetadata::new("ERR002", "System", Severity::Critical, "Malformed invocation"),
            CodeMetadata::new("ERR003", "System", Severity::Critical, "Unknown object type"),
            CodeMetadata::new("ERR004", "System", Severity::High, "Invalid configuration"),
            CodeMetadata::new("E001", "Intake", Severity::Medium, "Rule payload could not be decoded"),
            CodeMetadata::new("E002", "Intake", Severity::Medium, "Rule failed validation"),
            CodeMetadata::new("E003", "Intake", Severity::Medium, "Contradictory rules dropped"),
            CodeMetadata::new("E010", "Check", Severity::Low, "System state differs from rule"),
            CodeMetadata::new("E011", "Check", Severity::Medium, "Target could not be read"),
            CodeMetadata::new("E012", "Check", Severity::Medium, "Name lookup failed"),
            CodeMetadata::new("E013", "Check", Severity::Medium, "External command failed"),
            CodeMetadata::new("E014", "Check", Severity::Medium, "Remote service request failed"),
            CodeMetadata::new("E020", "Fix", Severity::High, "Target could not be written"),
            CodeMetadata::new("E021", "Fix", Severity::High, "Ownership or mode change failed"),
            CodeMetadata::new("E022", "Fix", Severity::High, "External command failed"),
            CodeMetadata::new("E023", "Fix", Severity::High, "Pre-fix validation failed"),
            CodeMetadata::new("E024", "Fix", Severity::Medium, "Rule cannot be fixed"),
            CodeMetadata::new("I001", "Success", Severity::Low, "Logging initialized"),
            CodeMetadata::new("I010", "Success", Severity::Low, "Rule on target"),
            CodeMetadata::new("I020", "Success", Severity::Low, "Rule fixed"),
            CodeMetadata::new("I021", "Success", Severity::Low, "Backup taken"),
        ];
        entries.into_iter().map(|m| (m.code, m)).collect()
    })
}

/// Get complete metadata for a code
pub fn get_code_metadata(code: &str) -> Option<&'static CodeMetadata> {
    get_code_registry().get(code)
}

/// Get severity for a code, defaulting to Medium for unregistered codes
pub fn get_severity(code: &str) -> Severity {
    get_code_metadata(code)
        .map(|m| m.severity)
        .unwrap_or(Severity::Medium)
}

pub fn get_description(code: &str) -> &'static str {
    get_code_metadata(code)
        .map(|m| m.description)
        .unwrap_or("Unknown error")
}

pub fn get_category(code: &str) -> &'static str {
    get_code_metadata(code)
        .map(|m| m.category)
        .unwrap_or("Unknown")
}
