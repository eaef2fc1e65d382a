// src/intake/mod.rs
//! Rule intake: environment selection, payload decoding, operator
//! validation, conflict tracking, override folding and token substitution

pub mod decode;
pub mod fold;
pub mod index;
pub mod operators;
pub mod subst;

pub use decode::{decode_list, decode_map, decode_one, split_polarity};
pub use fold::{fold_override, keep_non_empty, keep_set, Identity, MergeFields};
pub use index::{Admission, KeyIndex};
pub use operators::{Operator, Scalar, TargetValue};
pub use subst::substitute;

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Environment entries whose name starts with `prefix`, in natural name order
///
/// `RULE_2` sorts before `RULE_10` so the intake order of numbered variables
/// follows their numbering.
pub fn matching_entries(env: &BTreeMap<String, String>, prefix: &str) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = env
        .iter()
        .filter(|(name, _)| name.starts_with(prefix))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    entries.sort_by(|a, b| natural_cmp(&a.0, &b.0));
    entries
}

/// Compare two strings treating embedded digit runs as numbers
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let lhs = take_digits(&mut left);
                let rhs = take_digits(&mut right);
                let lhs_trimmed = lhs.trim_start_matches('0');
                let rhs_trimmed = rhs.trim_start_matches('0');
                let ord = lhs_trimmed
                    .len()
                    .cmp(&rhs_trimmed.len())
                    .then_with(|| lhs_trimmed.cmp(rhs_trimmed))
                    .then_with(|| lhs.len().cmp(&rhs.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}
