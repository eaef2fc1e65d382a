//! `%%TOKEN%%` substitution in paths, templates and values

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

const TOKEN_PATTERN: &str = r"%%(ENV:)?([A-Za-z_][A-Za-z0-9_]*)%%";

fn token_regex() -> Option<&'static Regex> {
    static TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(TOKEN_PATTERN).ok()).as_ref()
}

/// Expand `%%ENV:NAME%%` and `%%NAME%%` from `env`
///
/// Tokens naming an unset variable are left verbatim.
pub fn substitute(text: &str, env: &BTreeMap<String, String>) -> String {
    let Some(regex) = token_regex() else {
        return text.to_string();
    };
    regex
        .replace_all(text, |caps: &Captures<'_>| match env.get(&caps[2]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("OSVC_PATH_VAR".to_string(), "/opt/app".to_string());
        env.insert("NODE".to_string(), "n1".to_string());
        env
    }

    #[test]
    fn test_substitute_both_forms() {
        assert_eq!(
            substitute("%%ENV:OSVC_PATH_VAR%%/etc/%%NODE%%.conf", &env()),
            "/opt/app/etc/n1.conf"
        );
    }

    #[test]
    fn test_unknown_token_kept() {
        assert_eq!(substitute("x=%%MISSING%%", &env()), "x=%%MISSING%%");
        assert_eq!(substitute("no tokens", &env()), "no tokens");
    }
}
