//! Per-invocation state shared by intake and convergence
//!
//! A fresh compliance object is built for every invocation, but some indices
//! must span every intake call of that invocation: the key conflict index and
//! the `reset` occurrence counters. They live here rather than in globals.

use crate::config::RuntimeConfig;
use crate::intake::KeyIndex;
use crate::results::{Algebra, ComplianceStatus};
use crate::strategies::command_executor::{CommandRunner, SystemCommandExecutor};
use std::collections::BTreeMap;

/// Binaries the compliance objects may run
pub const DEFAULT_COMMAND_WHITELIST: &[&str] = &[
    "groupadd",
    "groupdel",
    "groupmod",
    "gpasswd",
    "useradd",
    "usermod",
    "userdel",
    "getent",
    "id",
    "dpkg",
    "dpkg-query",
    "rpm",
    "apt-get",
    "yum",
    "dnf",
    "zypper",
    "apk",
    "pkg",
    "zfs",
    "zpool",
    "visudo",
    "sysctl",
    "multipathd",
];

pub struct ObjectContext {
    /// Log passing checks too; set for `check`, cleared for `fix`
    pub verbose: bool,
    pub algebra: Algebra,
    pub config: RuntimeConfig,
    pub commands: Box<dyn CommandRunner>,
    pub keys: KeyIndex,
    /// Environment snapshot used for `%%TOKEN%%` substitution
    pub env: BTreeMap<String, String>,
    /// Intake and conflict diagnostics, in emission order
    pub diagnostics: Vec<String>,
}

impl ObjectContext {
    pub fn new(config: RuntimeConfig) -> Self {
        let algebra = if config.engine.legacy_result_algebra {
            Algebra::Legacy
        } else {
            Algebra::Closed
        };
        let mut commands = SystemCommandExecutor::with_timeout(config.command_timeout());
        commands.allow_commands(DEFAULT_COMMAND_WHITELIST);

        Self {
            verbose: false,
            algebra,
            config,
            commands: Box::new(commands),
            keys: KeyIndex::default(),
            env: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_env<I>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env = env.into_iter().collect();
        self
    }

    pub fn combine(&self, a: ComplianceStatus, b: ComplianceStatus) -> ComplianceStatus {
        self.algebra.combine(a, b)
    }

    pub fn fold<I>(&self, statuses: I) -> ComplianceStatus
    where
        I: IntoIterator<Item = ComplianceStatus>,
    {
        self.algebra.fold(statuses)
    }

    pub fn record_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics.push(message.into());
    }
}

impl Default for ObjectContext {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
