//! Comparison operators shared by the key-value rule types

use crate::strategies::errors::IntakeError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "unset")]
    Unset,
    #[serde(rename = "reset")]
    Reset,
}

/// One target value: a number compares numerically, a string literally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetValue {
    List(Vec<Scalar>),
    Single(Scalar),
}

impl Scalar {
    /// Whether a value read from the system equals this target
    pub fn matches(&self, current: &str) -> bool {
        match self {
            Scalar::Integer(n) => current.trim().parse::<i64>().map_or(false, |v| v == *n),
            Scalar::Text(s) => current == s,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Scalar::Integer(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl TargetValue {
    /// The value written by a fix: the target itself, or the first list element
    pub fn first(&self) -> Option<&Scalar> {
        match self {
            TargetValue::Single(s) => Some(s),
            TargetValue::List(items) => items.first(),
        }
    }

    pub fn scalars(&self) -> &[Scalar] {
        match self {
            TargetValue::Single(s) => std::slice::from_ref(s),
            TargetValue::List(items) => items,
        }
    }
}

impl fmt::Display for TargetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetValue::Single(s) => write!(f, "{}", s),
            TargetValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(|s| s.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::In => "IN",
            Operator::Unset => "unset",
            Operator::Reset => "reset",
        }
    }

    /// `=`, `>=`, `<=` and `IN`
    pub fn is_comparison(self) -> bool {
        !matches!(self, Operator::Unset | Operator::Reset)
    }

    /// Check operator legality and the value shape it requires
    ///
    /// Returns the normalized value: `>=`/`<=` targets become integers.
    pub fn validate(
        self,
        object: &'static str,
        allowed: &[Operator],
        value: Option<TargetValue>,
    ) -> Result<Option<TargetValue>, IntakeError> {
        if !allowed.contains(&self) {
            return Err(IntakeError::validation(
                object,
                format!("operator '{}' is not supported", self),
            ));
        }

        match (self, value) {
            (Operator::Unset | Operator::Reset, None) => Ok(None),
            (Operator::Unset | Operator::Reset, Some(_)) => Err(IntakeError::validation(
                object,
                format!("operator '{}' does not take a value", self),
            )),
            (_, None) => Err(IntakeError::validation(
                object,
                format!("operator '{}' requires a value", self),
            )),
            (Operator::Eq, Some(TargetValue::Single(s))) => Ok(Some(TargetValue::Single(s))),
            (Operator::Eq, Some(TargetValue::List(_))) => Err(IntakeError::validation(
                object,
                "operator '=' requires a single value, use 'IN' for a list",
            )),
            (Operator::Ge | Operator::Le, Some(TargetValue::Single(s))) => match s.as_integer() {
                Some(n) => Ok(Some(TargetValue::Single(Scalar::Integer(n)))),
                None => Err(IntakeError::validation(
                    object,
                    format!("operator '{}' requires a numeric value, got '{}'", self, s),
                )),
            },
            (Operator::Ge | Operator::Le, Some(TargetValue::List(_))) => Err(
                IntakeError::validation(object, format!("operator '{}' requires a numeric value", self)),
            ),
            (Operator::In, Some(TargetValue::List(items))) if !items.is_empty() => {
                Ok(Some(TargetValue::List(items)))
            }
            (Operator::In, Some(_)) => Err(IntakeError::validation(
                object,
                "operator 'IN' requires a non-empty list",
            )),
        }
    }

    /// Evaluate against every current value of a key
    ///
    /// `reset` depends on the occurrence counters and is evaluated by the
    /// caller; here it always holds.
    pub fn evaluate(self, target: Option<&TargetValue>, values: &[&str]) -> bool {
        match self {
            Operator::Unset => values.is_empty(),
            Operator::Reset => true,
            Operator::Eq | Operator::In => {
                let Some(target) = target else { return false };
                values
                    .iter()
                    .any(|v| target.scalars().iter().any(|s| s.matches(v)))
            }
            Operator::Ge | Operator::Le => {
                let Some(bound) = target.and_then(|t| t.first()).and_then(|s| s.as_integer())
                else {
                    return false;
                };
                values.iter().filter_map(|v| v.trim().parse::<i64>().ok()).any(|v| {
                    if self == Operator::Ge {
                        v >= bound
                    } else {
                        v <= bound
                    }
                })
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
