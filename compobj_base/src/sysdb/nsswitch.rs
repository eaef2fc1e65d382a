//! `/etc/nsswitch.conf` source lookup

/// Sources configured for `database`, without `[STATUS=action]` criteria
pub fn sources(text: &str, database: &str) -> Vec<String> {
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((db, rest)) = line.split_once(':') else {
            continue;
        };
        if db.trim() != database {
            continue;
        }
        return rest
            .split_whitespace()
            .filter(|word| !word.starts_with('['))
            .map(str::to_string)
            .collect();
    }
    Vec::new()
}

/// Whether the database resolves through anything beyond the local files
pub fn has_remote_sources(text: &str, database: &str) -> bool {
    sources(text, database)
        .iter()
        .any(|s| s != "files" && s != "compat")
}

#[cfg(test)]
mod tests {
    use super::*;

    const NSSWITCH: &str = "\
# /etc/nsswitch.conf
passwd:     files sss
group:      files [SUCCESS=merge] systemd
shadow:     files
hosts:      files dns # resolver
";

    #[test]
    fn test_sources() {
        assert_eq!(sources(NSSWITCH, "passwd"), vec!["files", "sss"]);
        assert_eq!(sources(NSSWITCH, "group"), vec!["files", "systemd"]);
        assert_eq!(sources(NSSWITCH, "hosts"), vec!["files", "dns"]);
        assert!(sources(NSSWITCH, "netgroup").is_empty());
    }

    #[test]
    fn test_has_remote_sources() {
        assert!(has_remote_sources(NSSWITCH, "passwd"));
        assert!(!has_remote_sources(NSSWITCH, "shadow"));
        assert!(!has_remote_sources("", "passwd"));
    }
}
