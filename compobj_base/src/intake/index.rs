//! Invocation-wide key indices for the key-value rule types
//!
//! The conflict index spans every intake call of one invocation: a key seen
//! with both `unset` and a comparison operator is invalidated for the rest of
//! the invocation. The `reset` counters are rebuilt on every check or fix pass.

use super::operators::Operator;
use crate::strategies::errors::IntakeError;
use std::collections::{HashMap, HashSet};

/// Outcome of registering one rule with the conflict index
#[derive(Debug)]
pub enum Admission {
    /// Keep the rule
    Accepted,
    /// The rule contradicts an earlier one; drop every rule for the key
    Conflict(IntakeError),
    /// The key was already invalidated; drop the rule silently
    Rejected,
}

#[derive(Debug, Default)]
struct KeyUse {
    unset: bool,
    compared: Option<Operator>,
}

#[derive(Debug, Default)]
pub struct KeyIndex {
    uses: HashMap<String, KeyUse>,
    invalid: HashSet<String>,
    reset_counts: HashMap<String, usize>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule's operator for `key`
    pub fn admit(&mut self, key: &str, op: Operator) -> Admission {
        if self.invalid.contains(key) {
            return Admission::Rejected;
        }

        let usage = self.uses.entry(key.to_string()).or_default();
        let conflict = match op {
            Operator::Unset => {
                usage.unset = true;
                usage.compared
            }
            Operator::Reset => None,
            comparison => {
                if usage.compared.is_none() {
                    usage.compared = Some(comparison);
                }
                if usage.unset {
                    Some(Operator::Unset)
                } else {
                    None
                }
            }
        };

        match conflict {
            Some(first) => {
                self.invalid.insert(key.to_string());
                Admission::Conflict(IntakeError::Conflict {
                    key: key.to_string(),
                    first: first.to_string(),
                    second: op.to_string(),
                })
            }
            None => Admission::Accepted,
        }
    }

    pub fn is_invalid(&self, key: &str) -> bool {
        self.invalid.contains(key)
    }

    pub fn clear_counters(&mut self) {
        self.reset_counts.clear();
    }

    pub fn bump(&mut self, key: &str) {
        *self.reset_counts.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, key: &str) -> usize {
        self.reset_counts.get(key).copied().unwrap_or(0)
    }
}
