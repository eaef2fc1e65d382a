// RUNTIME PREFERENCES (environment first, optional TOML overlay)

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_path(name: &str, default: &str) -> PathBuf {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingPreferences {
    /// Minimum level emitted: error, warn, info, debug
    pub level: String,

    /// Output format: console, json, facade
    pub format: String,
}

impl Default for LoggingPreferences {
    fn default() -> Self {
        Self {
            level: env::var("COMPOBJ_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("COMPOBJ_LOG_FORMAT").unwrap_or_else(|_| "console".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginePreferences {
    /// Reproduce the legacy result combinator, including its undefined pairs
    pub legacy_result_algebra: bool,

    /// Timeout applied to external commands, in seconds; none when unset
    pub command_timeout_secs: Option<u64>,

    /// Where original files are copied before a content rewrite
    pub backup_dir: PathBuf,
}

impl Default for EnginePreferences {
    fn default() -> Self {
        Self {
            legacy_result_algebra: env_parse("COMPOBJ_LEGACY_RESULT_ALGEBRA").unwrap_or(false),
            command_timeout_secs: env_parse("COMPOBJ_COMMAND_TIMEOUT"),
            backup_dir: env_path("COMPOBJ_BACKUP_DIR", "/var/tmp/compobj/backup"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemPaths {
    pub passwd: PathBuf,
    pub group: PathBuf,
    pub nsswitch: PathBuf,
    pub sysctl_conf: PathBuf,
    pub proc_sys: PathBuf,
    pub multipath_conf: PathBuf,
    pub node_conf: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            passwd: env_path("COMPOBJ_PASSWD_FILE", "/etc/passwd"),
            group: env_path("COMPOBJ_GROUP_FILE", "/etc/group"),
            nsswitch: env_path("COMPOBJ_NSSWITCH_FILE", "/etc/nsswitch.conf"),
            sysctl_conf: env_path("COMPOBJ_SYSCTL_CONF", "/etc/sysctl.conf"),
            proc_sys: env_path("COMPOBJ_PROC_SYS", "/proc/sys"),
            multipath_conf: env_path("COMPOBJ_MULTIPATH_CONF", "/etc/multipath.conf"),
            node_conf: env_path("COMPOBJ_NODE_CONF", "/etc/opensvc/node.conf"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorPreferences {
    /// Base URL of the safe content service
    pub url: Option<String>,

    /// Node name used as the basic auth user; hostname when unset
    pub node_name: Option<String>,

    /// Node secret used as the basic auth password
    pub node_uuid: Option<String>,

    /// Skip TLS certificate verification
    pub insecure: bool,
}

impl Default for CollectorPreferences {
    fn default() -> Self {
        Self {
            url: env::var("COMPOBJ_COLLECTOR_URL").ok().filter(|v| !v.is_empty()),
            node_name: env::var("COMPOBJ_NODE_NAME").ok().filter(|v| !v.is_empty()),
            node_uuid: env::var("COMPOBJ_NODE_UUID").ok().filter(|v| !v.is_empty()),
            insecure: env_parse("COMPOBJ_COLLECTOR_INSECURE").unwrap_or(false),
        }
    }
}

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub logging: LoggingPreferences,
    pub engine: EnginePreferences,
    pub paths: SystemPaths,
    pub collector: CollectorPreferences,
}
