//! Override folding for identity-keyed rules
//!
//! A later rule for an identity already present in the rule set is merged into
//! the earlier one, with the earlier rule's non-empty fields winning. When the
//! presence polarity differs, the later rule replaces the earlier one.

/// Field-wise merge where `self` keeps every field it already sets
pub trait MergeFields {
    fn merge_missing(&mut self, later: Self);
}

/// Identities without attributes only carry a presence polarity
impl MergeFields for () {
    fn merge_missing(&mut self, _later: Self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity<T> {
    pub name: String,
    pub present: bool,
    pub spec: T,
}

impl<T> Identity<T> {
    pub fn new(name: impl Into<String>, present: bool, spec: T) -> Self {
        Self {
            name: name.into(),
            present,
            spec,
        }
    }
}

/// Fold `incoming` into `rules`, keeping the position of the first occurrence
pub fn fold_override<T: MergeFields>(rules: &mut Vec<Identity<T>>, incoming: Identity<T>) {
    match rules.iter_mut().find(|rule| rule.name == incoming.name) {
        Some(existing) if existing.present != incoming.present => *existing = incoming,
        Some(existing) => existing.spec.merge_missing(incoming.spec),
        None => rules.push(incoming),
    }
}

/// Keep `current` when it is set, otherwise take `later`
pub fn keep_set<T>(current: &mut Option<T>, later: Option<T>) {
    if current.is_none() {
        *current = later;
    }
}

/// Keep `current` when it is a non-empty string, otherwise take `later`
pub fn keep_non_empty(current: &mut Option<String>, later: Option<String>) {
    if current.as_deref().map_or(true, str::is_empty) {
        if let Some(value) = later.filter(|v| !v.is_empty()) {
            *current = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    struct Spec {
        uid: Option<u32>,
        shell: Option<String>,
    }

    impl MergeFields for Spec {
        fn merge_missing(&mut self, later: Self) {
            keep_set(&mut self.uid, later.uid);
            keep_non_empty(&mut self.shell, later.shell);
        }
    }

    fn spec(uid: Option<u32>, shell: Option<&str>) -> Spec {
        Spec {
            uid,
            shell: shell.map(str::to_string),
        }
    }

    #[test]
    fn test_earlier_fields_win() {
        let mut rules = vec![Identity::new("alice", true, spec(Some(1000), Some("")))];
        fold_override(
            &mut rules,
            Identity::new("alice", true, spec(Some(2000), Some("/bin/zsh"))),
        );
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].spec, spec(Some(1000), Some("/bin/zsh")));
    }

    #[test]
    fn test_polarity_change_replaces() {
        let mut rules = vec![Identity::new("bob", true, spec(Some(1001), None))];
        fold_override(&mut rules, Identity::new("bob", false, Spec::default()));
        assert_eq!(rules, vec![Identity::new("bob", false, Spec::default())]);

        fold_override(&mut rules, Identity::new("bob", true, spec(Some(7), None)));
        assert!(rules[0].present);
        assert_eq!(rules[0].spec.uid, Some(7));
    }

    #[test]
    fn test_new_identity_appended() {
        let mut rules = vec![Identity::new("a", true, Spec::default())];
        fold_override(&mut rules, Identity::new("b", false, Spec::default()));
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
