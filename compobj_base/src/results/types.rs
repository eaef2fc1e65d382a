//! Tri-state compliance outcome and its combinators

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a check, fix, or fixable evaluation
///
/// The numeric value of each variant is the process exit code. `Invalid` is
/// only produced by [`Algebra::Legacy`] when it meets a pair the legacy
/// combinator never defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceStatus {
    Ok,
    NotOk,
    NotApplicable,
    Invalid,
}

impl ComplianceStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            ComplianceStatus::Ok => 0,
            ComplianceStatus::NotOk => 1,
            ComplianceStatus::NotApplicable => 2,
            ComplianceStatus::Invalid => -1,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ComplianceStatus::Ok
    }

    /// Closed combinator: `NotOk` absorbs, `NotApplicable` is the identity
    pub fn combine(self, other: Self) -> Self {
        use ComplianceStatus::*;
        match (self, other) {
            (Invalid, _) | (_, Invalid) => Invalid,
            (NotOk, _) | (_, NotOk) => NotOk,
            (Ok, _) | (_, Ok) => Ok,
            (NotApplicable, NotApplicable) => NotApplicable,
        }
    }

    /// Legacy combinator: only the historically exercised pairs are defined
    pub fn combine_legacy(self, other: Self) -> Self {
        use ComplianceStatus::*;
        match (self, other) {
            (Ok, Ok) => Ok,
            (Ok, NotOk) => NotOk,
            (Ok, NotApplicable) => Ok,
            (NotOk, Ok) => NotOk,
            (NotOk, NotApplicable) => NotOk,
            (NotApplicable, NotApplicable) => NotApplicable,
            _ => Invalid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComplianceStatus::Ok => "ok",
            ComplianceStatus::NotOk => "n/ok",
            ComplianceStatus::NotApplicable => "n/a",
            ComplianceStatus::Invalid => "invalid",
        }
    }
}

impl From<bool> for ComplianceStatus {
    fn from(passed: bool) -> Self {
        if passed {
            ComplianceStatus::Ok
        } else {
            ComplianceStatus::NotOk
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which combinator folds per-rule outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algebra {
    #[default]
    Closed,
    Legacy,
}

impl Algebra {
    pub fn combine(self, a: ComplianceStatus, b: ComplianceStatus) -> ComplianceStatus {
        match self {
            Algebra::Closed => a.combine(b),
            Algebra::Legacy => a.combine_legacy(b),
        }
    }

    /// Fold outcomes left to right, starting from `Ok`
    pub fn fold<I>(self, statuses: I) -> ComplianceStatus
    where
        I: IntoIterator<Item = ComplianceStatus>,
    {
        statuses
            .into_iter()
            .fold(ComplianceStatus::Ok, |acc, s| self.combine(acc, s))
    }
}

#[cfg(test)]
mod tests {
    use super::ComplianceStatus::*;
    use super::*;

    const ALL: [ComplianceStatus; 3] = [Ok, NotOk, NotApplicable];

    #[test]
    fn test_defined_pairs_agree_in_both_modes() {
        let defined = [
            (Ok, Ok, Ok),
            (Ok, NotOk, NotOk),
            (Ok, NotApplicable, Ok),
            (NotOk, Ok, NotOk),
            (NotOk, NotApplicable, NotOk),
            (NotApplicable, NotApplicable, NotApplicable),
        ];
        for (a, b, expected) in defined {
            assert_eq!(a.combine(b), expected, "{} + {}", a, b);
            assert_eq!(a.combine_legacy(b), expected, "{} + {}", a, b);
        }
    }

    #[test]
    fn test_closed_combinator_is_total_and_commutative() {
        for a in ALL {
            for b in ALL {
                let ab = a.combine(b);
                assert_ne!(ab, Invalid);
                assert_eq!(ab, b.combine(a));
            }
        }
    }

    #[test]
    fn test_closed_combinator_is_associative() {
        for a in ALL {
            for b in ALL {
                for c in ALL {
                    assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
                }
            }
        }
    }

    #[test]
    fn test_legacy_gap_is_preserved() {
        assert_eq!(NotOk.combine_legacy(NotOk), Invalid);
        assert_eq!(NotApplicable.combine_legacy(Ok), Invalid);
        assert_eq!(NotApplicable.combine_legacy(NotOk), Invalid);
        assert_eq!(Invalid.exit_code(), -1);
    }

    #[test]
    fn test_fold_two_failures() {
        assert_eq!(Algebra::Closed.fold([NotOk, NotOk]), NotOk);
        assert_eq!(Algebra::Legacy.fold([NotOk, NotOk]), Invalid);
        assert_eq!(Algebra::Legacy.fold([NotOk, Ok, Ok]), NotOk);
    }

    #[test]
    fn test_fold_empty_and_not_applicable() {
        assert_eq!(Algebra::Closed.fold(std::iter::empty()), Ok);
        assert_eq!(Algebra::Closed.fold([NotApplicable, NotApplicable]), Ok);
        assert_eq!(Algebra::Legacy.fold([NotApplicable]), Ok);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Ok.exit_code(), 0);
        assert_eq!(NotOk.exit_code(), 1);
        assert_eq!(NotApplicable.exit_code(), 2);
        assert_eq!(ComplianceStatus::from(false), NotOk);
    }
}
