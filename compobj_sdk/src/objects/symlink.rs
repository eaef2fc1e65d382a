//! Symbolic link convergence

use super::{check_error, fix_error, fixed, off_target, on_target};
use compobj_base::fsutil::ensure_parent;
use compobj_base::intake::{decode_list, substitute};
use compobj_base::logging::codes;
use compobj_base::strategies::{
    ComplianceObject, ConvergenceError, IntakeError, ObjectContext, ObjectInfo,
};
use compobj_base::ComplianceStatus;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct SymlinkRule {
    pub symlink: String,
    pub target: String,
}

#[derive(Debug, Clone)]
struct Link {
    path: PathBuf,
    target: PathBuf,
}

#[derive(Default)]
pub struct SymlinkObject {
    rules: Vec<Link>,
}

enum LinkState {
    OnTarget,
    Missing,
    Elsewhere(PathBuf),
    NotALink,
}

impl SymlinkObject {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(link: &Link) -> Result<LinkState, ConvergenceError> {
        match fs::symlink_metadata(&link.path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let current = fs::read_link(&link.path).map_err(|e| ConvergenceError::io(&link.path, e))?;
                if current == link.target {
                    Ok(LinkState::OnTarget)
                } else {
                    Ok(LinkState::Elsewhere(current))
                }
            }
            Ok(_) => Ok(LinkState::NotALink),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LinkState::Missing),
            Err(e) => Err(ConvergenceError::io(&link.path, e)),
        }
    }

    fn check_link(link: &Link, ctx: &ObjectContext) -> ComplianceStatus {
        let path = link.path.display();
        match Self::state(link) {
            Ok(LinkState::OnTarget) => on_target(ctx, &format!("{} -> {}", path, link.target.display())),
            Ok(LinkState::Missing) => off_target(ctx, &format!("symlink {} does not exist", path)),
            Ok(LinkState::Elsewhere(current)) => off_target(
                ctx,
                &format!(
                    "symlink {} points to {}, should point to {}",
                    path,
                    current.display(),
                    link.target.display()
                ),
            ),
            Ok(LinkState::NotALink) => off_target(ctx, &format!("{} exists and is not a symlink", path)),
            Err(e) => check_error(&e),
        }
    }

    fn fix_link(link: &Link) -> ComplianceStatus {
        let io_err = |e| ConvergenceError::io(&link.path, e);
        let result = match Self::state(link) {
            Ok(LinkState::OnTarget) => return ComplianceStatus::Ok,
            Ok(LinkState::Elsewhere(_)) => fs::remove_file(&link.path).map_err(io_err),
            Ok(LinkState::Missing) => ensure_parent(&link.path).map_err(io_err),
            Ok(LinkState::NotALink) => {
                let err = ConvergenceError::Unsupported {
                    reason: format!("{} exists and is not a symlink", link.path.display()),
                };
                return fix_error(codes::fix::NOT_FIXABLE, &err);
            }
            Err(e) => Err(e),
        };

        match result.and_then(|()| std::os::unix::fs::symlink(&link.target, &link.path).map_err(io_err)) {
            Ok(()) => fixed(&format!("symlink {} -> {}", link.path.display(), link.target.display())),
            Err(e) => fix_error(codes::fix::WRITE_FAILED, &e),
        }
    }
}

impl ComplianceObject for SymlinkObject {
    fn name(&self) -> &'static str {
        "symlink"
    }

    fn add(&mut self, payload: &str, ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let rules: Vec<SymlinkRule> = decode_list("symlink", payload)?;
        let mut links = Vec::with_capacity(rules.len());
        for rule in rules {
            let path = substitute(rule.symlink.trim(), &ctx.env);
            let target = substitute(rule.target.trim(), &ctx.env);
            if path.is_empty() {
                return Err(IntakeError::validation("symlink", "'symlink' is mandatory"));
            }
            if target.is_empty() {
                return Err(IntakeError::validation("symlink", "'target' is mandatory"));
            }
            links.push(Link {
                path: PathBuf::from(path),
                target: PathBuf::from(target),
            });
        }
        self.rules.extend(links);
        Ok(())
    }

    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        let ctx = &*ctx;
        ctx.fold(self.rules.iter().map(|link| Self::check_link(link, ctx)))
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        ctx.fold(self.rules.iter().map(Self::fix_link))
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            description: "Verify a symbolic link exists and points to the given target.",
            example_value: json!({
                "symlink": "/etc/localtime",
                "target": "/usr/share/zoneinfo/UTC"
            }),
            form_definition: r#"
Desc: A symbolic link rule
Inputs:
  symlink: string, mandatory, path of the link
  target: string, mandatory, path the link points to
"#,
        }
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn payload(dir: &TempDir, name: &str, target: &str) -> String {
        json!({
            "symlink": dir.path().join(name).to_string_lossy(),
            "target": target
        })
        .to_string()
    }

    #[test]
    fn test_create_missing_link() {
        let dir = TempDir::new().unwrap();
        let mut ctx = ObjectContext::default();
        let mut object = SymlinkObject::new();
        object.add(&payload(&dir, "sub/link", "/etc/hosts"), &mut ctx).unwrap();

        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(
            fs::read_link(dir.path().join("sub/link")).unwrap(),
            PathBuf::from("/etc/hosts")
        );
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
    }

    #[test]
    fn test_retarget_link() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink("/old", dir.path().join("link")).unwrap();
        let mut ctx = ObjectContext::default();
        let mut object = SymlinkObject::new();
        object.add(&payload(&dir, "link", "/new"), &mut ctx).unwrap();

        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
    }

    #[test]
    fn test_regular_file_not_replaced() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("plain"), "data").unwrap();
        let mut ctx = ObjectContext::default();
        let mut object = SymlinkObject::new();
        object.add(&payload(&dir, "plain", "/x"), &mut ctx).unwrap();

        assert_eq!(object.fix(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(fs::read_to_string(dir.path().join("plain")).unwrap(), "data");
    }

    #[test]
    fn test_missing_target_rejected() {
        let mut ctx = ObjectContext::default();
        let mut object = SymlinkObject::new();
        assert!(object.add(r#"{"symlink": "/tmp/l", "target": ""}"#, &mut ctx).is_err());
        assert!(object.add(r#"{"symlink": "/tmp/l"}"#, &mut ctx).is_err());
    }
}
