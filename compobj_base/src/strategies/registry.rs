// src/strategies/registry.rs
//! Compile-time registry of compliance object types
//!
//! The set of rule types is fixed at build time, so the registry is a static
//! table of name/constructor pairs rather than a runtime-populated map.

use crate::strategies::errors::RegistryError;
use std::path::Path;

/// One registry row
pub struct ObjectEntry<O: 'static> {
    pub name: &'static str,
    pub build: fn() -> O,
}

/// Static name → constructor table
pub struct ObjectRegistry<O: 'static> {
    entries: &'static [ObjectEntry<O>],
}

impl<O: 'static> ObjectRegistry<O> {
    pub const fn new(entries: &'static [ObjectEntry<O>]) -> Self {
        Self { entries }
    }

    /// Build a fresh object for `name`
    pub fn create(&self, name: &str) -> Result<O, RegistryError> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| (entry.build)())
            .ok_or_else(|| RegistryError::UnknownObject(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.name)
    }

    /// Reject tables that register a name twice
    pub fn validate(&self) -> Result<(), RegistryError> {
        for (i, entry) in self.entries.iter().enumerate() {
            if self.entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(RegistryError::DuplicateObject(entry.name.to_string()));
            }
        }
        Ok(())
    }

    /// Object name selected by the program name, when it is a registered alias
    pub fn name_from_program(&self, argv0: &str) -> Option<&'static str> {
        let base = Path::new(argv0).file_name()?.to_str()?;
        self.entries
            .iter()
            .find(|entry| entry.name == base)
            .map(|entry| entry.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    static ENTRIES: &[ObjectEntry<&'static str>] = &[
        ObjectEntry {
            name: "file",
            build: || "file object",
        },
        ObjectEntry {
            name: "keyval",
            build: || "keyval object",
        },
    ];

    #[test]
    fn test_create_known_object() {
        let registry = ObjectRegistry::new(ENTRIES);
        assert_eq!(registry.create("keyval").unwrap(), "keyval object");
        assert!(registry.contains("file"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["file", "keyval"]);
    }

    #[test]
    fn test_unknown_object() {
        let registry = ObjectRegistry::new(ENTRIES);
        assert_matches!(registry.create("bogus"), Err(RegistryError::UnknownObject(name)) if name == "bogus");
    }

    #[test]
    fn test_name_from_program() {
        let registry = ObjectRegistry::new(ENTRIES);
        assert_eq!(registry.name_from_program("/usr/share/compobj/file"), Some("file"));
        assert_eq!(registry.name_from_program("compobj"), None);
    }

    #[test]
    fn test_duplicate_detection() {
        static DUPES: &[ObjectEntry<u8>] = &[
            ObjectEntry { name: "a", build: || 1 },
            ObjectEntry { name: "a", build: || 2 },
        ];
        assert_matches!(
            ObjectRegistry::new(DUPES).validate(),
            Err(RegistryError::DuplicateObject(_))
        );
        assert!(ObjectRegistry::new(ENTRIES).validate().is_ok());
    }
}
