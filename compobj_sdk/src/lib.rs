//! # compobj SDK
//!
//! Concrete compliance object types and the registry the `compobj` binary
//! dispatches through.
//!
//! Attribute objects: `file`, `fileprop`, `sudoers`, `symlink`, `group`,
//! `groupmembership`, `user`, `package`. Key-value objects: `keyval`,
//! `nodeconf`, `sysctl`, `linux_mpath`. Property objects: `zfs`, `zpool`.

pub mod commands;
pub mod objects;
pub mod safe;

use compobj_base::strategies::{
    ComplianceObject, IntakeError, ObjectContext, ObjectEntry, ObjectInfo, ObjectRegistry,
};
use compobj_base::ComplianceStatus;
use objects::property::PropertyKind;
use objects::{
    FileFlavor, FileObject, GroupMembershipObject, GroupObject, KeyvalObject, MpathObject,
    NodeconfObject, PackageObject, PropertyObject, SymlinkObject, SysctlObject, UserObject,
};

/// Every rule type known to this build
pub enum Object {
    File(FileObject),
    Symlink(SymlinkObject),
    Group(GroupObject),
    GroupMembership(GroupMembershipObject),
    User(UserObject),
    Package(PackageObject),
    Keyval(KeyvalObject),
    Nodeconf(NodeconfObject),
    Sysctl(SysctlObject),
    Mpath(MpathObject),
    Property(PropertyObject),
}

macro_rules! dispatch {
    ($self:expr, $object:ident => $body:expr) => {
        match $self {
            Object::File($object) => $body,
            Object::Symlink($object) => $body,
            Object::Group($object) => $body,
            Object::GroupMembership($object) => $body,
            Object::User($object) => $body,
            Object::Package($object) => $body,
            Object::Keyval($object) => $body,
            Object::Nodeconf($object) => $body,
            Object::Sysctl($object) => $body,
            Object::Mpath($object) => $body,
            Object::Property($object) => $body,
        }
    };
}

impl ComplianceObject for Object {
    fn name(&self) -> &'static str {
        dispatch!(self, object => object.name())
    }

    fn add(&mut self, payload: &str, ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        dispatch!(self, object => object.add(payload, ctx))
    }

    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        dispatch!(self, object => object.check(ctx))
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        dispatch!(self, object => object.fix(ctx))
    }

    fn fixable(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        dispatch!(self, object => object.fixable(ctx))
    }

    fn info(&self) -> ObjectInfo {
        dispatch!(self, object => object.info())
    }

    fn rule_count(&self) -> usize {
        dispatch!(self, object => object.rule_count())
    }
}

static ENTRIES: &[ObjectEntry<Object>] = &[
    ObjectEntry {
        name: "file",
        build: || Object::File(FileObject::new(FileFlavor::File)),
    },
    ObjectEntry {
        name: "fileprop",
        build: || Object::File(FileObject::new(FileFlavor::Properties)),
    },
    ObjectEntry {
        name: "sudoers",
        build: || Object::File(FileObject::new(FileFlavor::Sudoers)),
    },
    ObjectEntry {
        name: "symlink",
        build: || Object::Symlink(SymlinkObject::new()),
    },
    ObjectEntry {
        name: "group",
        build: || Object::Group(GroupObject::new()),
    },
    ObjectEntry {
        name: "groupmembership",
        build: || Object::GroupMembership(GroupMembershipObject::new()),
    },
    ObjectEntry {
        name: "user",
        build: || Object::User(UserObject::new()),
    },
    ObjectEntry {
        name: "package",
        build: || Object::Package(PackageObject::new()),
    },
    ObjectEntry {
        name: "keyval",
        build: || Object::Keyval(KeyvalObject::new()),
    },
    ObjectEntry {
        name: "nodeconf",
        build: || Object::Nodeconf(NodeconfObject::new()),
    },
    ObjectEntry {
        name: "sysctl",
        build: || Object::Sysctl(SysctlObject::new()),
    },
    ObjectEntry {
        name: "linux_mpath",
        build: || Object::Mpath(MpathObject::new()),
    },
    ObjectEntry {
        name: "zfs",
        build: || Object::Property(PropertyObject::new(PropertyKind::Dataset)),
    },
    ObjectEntry {
        name: "zpool",
        build: || Object::Property(PropertyObject::new(PropertyKind::Pool)),
    },
];

/// Name → constructor table for every rule type
pub static REGISTRY: ObjectRegistry<Object> = ObjectRegistry::new(ENTRIES);


#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use compobj_base::strategies::{run_action, Action, RegistryError};

    #[test]
    fn test_registry_is_consistent() {
        assert!(REGISTRY.validate().is_ok());
        assert_eq!(REGISTRY.names().count(), 14);

        // every row builds an object answering to its own name
        for name in REGISTRY.names() {
            let object = REGISTRY.create(name).unwrap();
            assert_eq!(object.name(), name);
            assert_eq!(object.rule_count(), 0);
        }
    }

    #[test]
    fn test_unknown_object() {
        assert_matches!(
            REGISTRY.create("nfs").map(|object| object.name()),
            Err(RegistryError::UnknownObject(_))
        );
        assert_eq!(REGISTRY.name_from_program("/opt/compobj/keyval"), Some("keyval"));
    }

    #[test]
    fn test_info_for_every_object() {
        for name in REGISTRY.names() {
            let info = REGISTRY.create(name).unwrap().info();
            assert!(!info.description.is_empty(), "{} has no description", name);
            assert!(!info.example_value.is_null(), "{} has no example", name);
        }
    }

    #[test]
    fn test_run_action_reads_prefixed_rules() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("motd");
        let mut ctx = test_support::test_context(dir.path()).with_env(vec![
            (
                "OSVC_COMP_MOTD_1".to_string(),
                format!(r#"{{"path": "{}", "fmt": "welcome"}}"#, target.display()),
            ),
            ("OSVC_COMP_MOTD_2".to_string(), "not json".to_string()),
            ("OSVC_COMP_OTHER_1".to_string(), "{}".to_string()),
        ]);

        let mut object = REGISTRY.create("file").unwrap();
        assert_eq!(
            run_action(&mut object, "OSVC_COMP_MOTD_", Action::Check, &mut ctx),
            ComplianceStatus::NotOk
        );
        assert_eq!(object.rule_count(), 1);
        assert_eq!(ctx.diagnostics.len(), 1);

        let mut object = REGISTRY.create("file").unwrap();
        assert_eq!(
            run_action(&mut object, "OSVC_COMP_MOTD_", Action::Fix, &mut ctx),
            ComplianceStatus::Ok
        );
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "welcome\n");
    }
}
