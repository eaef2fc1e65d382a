// src/sysdb/mod.rs
//! User and group database access
//!
//! Lookups read the local `passwd`/`group` files first. When nsswitch lists
//! other sources for the database and `getent` is available, a miss falls back
//! to `getent`.

pub mod nsswitch;
pub mod passwd;

pub use passwd::{parse_group, parse_passwd, GroupEntry, PasswdEntry};

use crate::config::SystemPaths;
use crate::strategies::command_executor::CommandRunner;
use crate::strategies::context::ObjectContext;
use crate::strategies::errors::ConvergenceError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// An owner given by name or by numeric id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Principal {
    Id(i64),
    Name(String),
}

impl Principal {
    /// Negative ids and empty names mean "don't care"
    pub fn is_unset(&self) -> bool {
        match self {
            Principal::Id(id) => *id < 0,
            Principal::Name(name) => name.trim().is_empty(),
        }
    }
}

pub struct SystemDatabase<'a> {
    paths: &'a SystemPaths,
    commands: &'a dyn CommandRunner,
}

impl<'a> SystemDatabase<'a> {
    pub fn new(paths: &'a SystemPaths, commands: &'a dyn CommandRunner) -> Self {
        Self { paths, commands }
    }

    pub fn from_context(ctx: &'a ObjectContext) -> Self {
        Self::new(&ctx.config.paths, &*ctx.commands)
    }

    fn read_optional(path: &Path) -> Result<String, ConvergenceError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(ConvergenceError::io(path, e)),
        }
    }

    pub fn users(&self) -> Result<Vec<PasswdEntry>, ConvergenceError> {
        Ok(parse_passwd(&Self::read_optional(&self.paths.passwd)?))
    }

    pub fn groups(&self) -> Result<Vec<GroupEntry>, ConvergenceError> {
        Ok(parse_group(&Self::read_optional(&self.paths.group)?))
    }

    pub fn user(&self, name: &str) -> Result<Option<PasswdEntry>, ConvergenceError> {
        if let Some(entry) = self.users()?.into_iter().find(|u| u.name == name) {
            return Ok(Some(entry));
        }
        Ok(self
            .getent("passwd", name)?
            .and_then(|line| parse_passwd(&line).into_iter().next()))
    }

    pub fn group(&self, name: &str) -> Result<Option<GroupEntry>, ConvergenceError> {
        if let Some(entry) = self.groups()?.into_iter().find(|g| g.name == name) {
            return Ok(Some(entry));
        }
        Ok(self
            .getent("group", name)?
            .and_then(|line| parse_group(&line).into_iter().next()))
    }

    /// Query `getent` when nsswitch routes the database beyond local files
    fn getent(&self, database: &str, key: &str) -> Result<Option<String>, ConvergenceError> {
        let nsswitch = Self::read_optional(&self.paths.nsswitch)?;
        if !nsswitch::has_remote_sources(&nsswitch, database) || !self.commands.is_available("getent")
        {
            return Ok(None);
        }

        let output = self.commands.execute("getent", &[database, key])?;
        // exit status 2: key not found
        if !output.success() {
            return Ok(None);
        }
        Ok(output.stdout.lines().next().map(str::to_string))
    }

    /// Resolve a desired owner to a uid; `None` means "don't care"
    pub fn resolve_uid(&self, principal: &Principal) -> Result<Option<u32>, ConvergenceError> {
        self.resolve(principal, "user", |name| {
            Ok(self.user(name)?.map(|entry| entry.uid))
        })
    }

    /// Resolve a desired group to a gid; `None` means "don't care"
    pub fn resolve_gid(&self, principal: &Principal) -> Result<Option<u32>, ConvergenceError> {
        self.resolve(principal, "group", |name| {
            Ok(self.group(name)?.map(|entry| entry.gid))
        })
    }

    fn resolve<F>(
        &self,
        principal: &Principal,
        kind: &'static str,
        lookup: F,
    ) -> Result<Option<u32>, ConvergenceError>
    where
        F: Fn(&str) -> Result<Option<u32>, ConvergenceError>,
    {
        if principal.is_unset() {
            return Ok(None);
        }
        match principal {
            Principal::Id(id) => u32::try_from(*id)
                .map(Some)
                .map_err(|_| ConvergenceError::Lookup {
                    kind,
                    name: id.to_string(),
                }),
            Principal::Name(name) => {
                if let Ok(id) = name.trim().parse::<u32>() {
                    return Ok(Some(id));
                }
                lookup(name)?
                    .map(Some)
                    .ok_or_else(|| ConvergenceError::Lookup {
                        kind,
                        name: name.clone(),
                    })
            }
        }
    }
}
