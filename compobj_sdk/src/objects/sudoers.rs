//! Sudoers syntax pre-check
//!
//! The `sudoers` rule type is a file rule whose candidate content must pass a
//! syntax check before it replaces the target.

use compobj_base::strategies::{ConvergenceError, ObjectContext};
use std::fs;
use std::path::PathBuf;

pub trait SyntaxChecker {
    /// Accept or reject candidate content before it is written
    fn validate(&self, content: &[u8], ctx: &ObjectContext) -> Result<(), ConvergenceError>;
}

/// `visudo -c -f <candidate>`
pub struct VisudoChecker;

impl VisudoChecker {
    fn candidate_path() -> PathBuf {
        std::env::temp_dir().join(format!("compobj-sudoers-{}", uuid::Uuid::new_v4().simple()))
    }
}

impl SyntaxChecker for VisudoChecker {
    fn validate(&self, content: &[u8], ctx: &ObjectContext) -> Result<(), ConvergenceError> {
        if !ctx.commands.is_available("visudo") {
            return Err(ConvergenceError::Precheck {
                reason: "visudo is not available".to_string(),
            });
        }

        let candidate = Self::candidate_path();
        fs::write(&candidate, content).map_err(|e| ConvergenceError::io(&candidate, e))?;
        let path = candidate.to_string_lossy().into_owned();
        let result = ctx.commands.execute("visudo", &["-c", "-f", &path]);
        let _ = fs::remove_file(&candidate);

        let output = result?;
        if output.success() {
            Ok(())
        } else {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            Err(ConvergenceError::Precheck {
                reason: format!("visudo rejected the candidate content: {}", detail),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::file::{FileFlavor, FileObject};
    use crate::test_support::test_context;
    use compobj_base::strategies::{ComplianceObject, SystemCommandExecutor};
    use compobj_base::ComplianceStatus;
    use serde_json::json;
    use tempfile::TempDir;

    /// Accepts content that does not contain the word "bogus"
    struct FakeChecker;

    impl SyntaxChecker for FakeChecker {
        fn validate(&self, content: &[u8], _ctx: &ObjectContext) -> Result<(), ConvergenceError> {
            if String::from_utf8_lossy(content).contains("bogus") {
                Err(ConvergenceError::Precheck {
                    reason: "syntax error".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn object(path: &std::path::Path, fmt: &str, ctx: &mut ObjectContext) -> FileObject {
        let mut object =
            FileObject::new(FileFlavor::Sudoers).with_syntax_checker(Box::new(FakeChecker));
        object
            .add(
                &json!({"path": path.to_string_lossy(), "fmt": fmt}).to_string(),
                ctx,
            )
            .unwrap();
        object
    }

    #[test]
    fn test_valid_content_is_installed() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = dir.path().join("ops");
        let object = object(&path, "%ops ALL=(ALL) ALL", &mut ctx);

        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(fs::read_to_string(&path).unwrap(), "%ops ALL=(ALL) ALL\n");
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
    }

    #[test]
    fn test_rejected_content_is_not_written() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = dir.path().join("ops");
        fs::write(&path, "%ops ALL=(ALL) ALL\n").unwrap();
        let object = object(&path, "bogus line", &mut ctx);

        assert_eq!(object.fix(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(fs::read_to_string(&path).unwrap(), "%ops ALL=(ALL) ALL\n");
    }

    #[test]
    fn test_rejected_content_does_not_create_file() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = dir.path().join("new");
        let object = object(&path, "bogus", &mut ctx);

        assert_eq!(object.fix(&mut ctx), ComplianceStatus::NotOk);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_visudo_fails_precheck() {
        let mut ctx = ObjectContext::default();
        ctx.commands = Box::new(SystemCommandExecutor::new());
        let result = VisudoChecker.validate(b"root ALL=(ALL) ALL\n", &ctx);
        assert!(matches!(result, Err(ConvergenceError::Precheck { .. })));
    }
}
