//! File existence, content, ownership and mode convergence
//!
//! One implementation backs three rule types: `file` (full rule), `fileprop`
//! (no content) and `sudoers` (content validated by a syntax checker before
//! it is written).

use super::sudoers::{SyntaxChecker, VisudoChecker};
use super::{check_error, fix_error, fixed, off_target, on_target};
use crate::safe::{parse_reference, HttpSafeStore, SafeError, SafeStore};
use compobj_base::fsutil::{backup_file, deserialize_mode, ensure_parent, format_mode, replace_file};
use compobj_base::intake::{decode_list, substitute};
use compobj_base::logging::codes;
use compobj_base::strategies::{
    ComplianceObject, ConvergenceError, IntakeError, ObjectContext, ObjectInfo,
};
use compobj_base::sysdb::{Principal, SystemDatabase};
use compobj_base::{log_success, ComplianceStatus};
use serde::Deserialize;
use serde_json::json;
use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::PathBuf;

const DEFAULT_SUDOERS_PATH: &str = "/etc/sudoers";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFlavor {
    File,
    Properties,
    Sudoers,
}

impl FileFlavor {
    pub fn name(self) -> &'static str {
        match self {
            FileFlavor::File => "file",
            FileFlavor::Properties => "fileprop",
            FileFlavor::Sudoers => "sudoers",
        }
    }
}

/// Rule payload as decoded from the environment
#[derive(Debug, Clone, Deserialize)]
pub struct FileRule {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub fmt: Option<String>,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: Option<u32>,
    #[serde(default)]
    pub uid: Option<Principal>,
    #[serde(default)]
    pub gid: Option<Principal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Content {
    Inline(Vec<u8>),
    Safe(String),
}

/// Validated rule with tokens expanded
#[derive(Debug, Clone)]
struct FileTarget {
    path: PathBuf,
    directory: bool,
    content: Option<Content>,
    mode: Option<u32>,
    uid: Option<Principal>,
    gid: Option<Principal>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Ownership {
    uid: Option<u32>,
    gid: Option<u32>,
}

pub struct FileObject {
    flavor: FileFlavor,
    rules: Vec<FileTarget>,
    safe: Option<Box<dyn SafeStore>>,
    checker: Option<Box<dyn SyntaxChecker>>,
}

impl FileObject {
    pub fn new(flavor: FileFlavor) -> Self {
        Self {
            flavor,
            rules: Vec::new(),
            safe: None,
            checker: None,
        }
    }

    pub fn with_safe_store(mut self, store: Box<dyn SafeStore>) -> Self {
        self.safe = Some(store);
        self
    }

    pub fn with_syntax_checker(mut self, checker: Box<dyn SyntaxChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    fn validate(&self, rule: FileRule, ctx: &ObjectContext) -> Result<FileTarget, IntakeError> {
        let object = self.flavor.name();
        let mut raw_path = substitute(rule.path.trim(), &ctx.env);
        if raw_path.is_empty() && self.flavor == FileFlavor::Sudoers {
            raw_path = DEFAULT_SUDOERS_PATH.to_string();
        }
        if raw_path.is_empty() {
            return Err(IntakeError::validation(object, "path is mandatory"));
        }

        let directory = raw_path.ends_with('/');
        let path = PathBuf::from(raw_path.trim_end_matches('/'));
        if path.as_os_str().is_empty() {
            return Err(IntakeError::validation(object, "path '/' is not managed"));
        }

        let content = match (rule.fmt, rule.reference) {
            (Some(_), Some(_)) => {
                return Err(IntakeError::validation(object, "'fmt' and 'ref' are mutually exclusive"))
            }
            (Some(fmt), None) => {
                let mut text = substitute(&fmt, &ctx.env);
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                Some(Content::Inline(text.into_bytes()))
            }
            (None, Some(reference)) => match parse_reference(&reference) {
                Some(id) => Some(Content::Safe(id.to_string())),
                None => {
                    return Err(IntakeError::validation(
                        object,
                        format!("unsupported content reference '{}'", reference),
                    ))
                }
            },
            (None, None) => None,
        };

        match (&content, self.flavor) {
            (Some(_), FileFlavor::Properties) => {
                return Err(IntakeError::validation(object, "fileprop rules carry no content"))
            }
            (None, FileFlavor::Sudoers) => {
                return Err(IntakeError::validation(object, "sudoers rules require 'fmt' or 'ref'"))
            }
            (Some(_), _) if directory => {
                return Err(IntakeError::validation(object, "a directory has no content"))
            }
            _ => {}
        }

        Ok(FileTarget {
            path,
            directory,
            content,
            mode: rule.mode,
            uid: rule.uid,
            gid: rule.gid,
        })
    }

    fn with_store<T>(
        &self,
        ctx: &ObjectContext,
        f: impl FnOnce(&dyn SafeStore) -> Result<T, SafeError>,
    ) -> Result<T, ConvergenceError> {
        let remote = |e: SafeError| ConvergenceError::Remote {
            reason: e.to_string(),
        };
        match &self.safe {
            Some(store) => f(store.as_ref()).map_err(remote),
            None => {
                let store = HttpSafeStore::from_config(&ctx.config.collector).map_err(remote)?;
                f(&store).map_err(remote)
            }
        }
    }

    fn content_matches(
        &self,
        target: &FileTarget,
        content: &Content,
        ctx: &ObjectContext,
    ) -> Result<Option<String>, ConvergenceError> {
        let current = fs::read(&target.path).map_err(|e| ConvergenceError::io(&target.path, e))?;
        match content {
            Content::Inline(expected) => {
                Ok(first_difference(expected, &current).map(|line| format!("differs from template at line {}", line)))
            }
            Content::Safe(id) => {
                let digest = self.with_store(ctx, |store| store.descriptor(id)?.digest(id))?;
                Ok(digest.verify(&current).err().map(|actual| {
                    format!(
                        "{} {} does not match safe://{} ({})",
                        digest.algorithm(),
                        actual,
                        id,
                        digest.expected()
                    )
                }))
            }
        }
    }

    fn expected_content(&self, content: &Content, ctx: &ObjectContext) -> Result<Vec<u8>, ConvergenceError> {
        match content {
            Content::Inline(bytes) => Ok(bytes.clone()),
            Content::Safe(id) => self.with_store(ctx, |store| store.download(id)),
        }
    }

    fn desired_owner(&self, target: &FileTarget, ctx: &ObjectContext) -> Result<Ownership, ConvergenceError> {
        let db = SystemDatabase::from_context(ctx);
        let uid = match &target.uid {
            Some(p) => db.resolve_uid(p)?,
            None => None,
        };
        let gid = match &target.gid {
            Some(p) => db.resolve_gid(p)?,
            None => None,
        };
        Ok(Ownership { uid, gid })
    }

    /// Ids that differ from the desired ones; `None` where already on target
    fn owner_drift(&self, target: &FileTarget, ctx: &ObjectContext) -> Result<Ownership, ConvergenceError> {
        let desired = self.desired_owner(target, ctx)?;
        let meta = fs::metadata(&target.path).map_err(|e| ConvergenceError::io(&target.path, e))?;
        Ok(Ownership {
            uid: desired.uid.filter(|uid| *uid != meta.uid()),
            gid: desired.gid.filter(|gid| *gid != meta.gid()),
        })
    }

    fn mode_drift(&self, target: &FileTarget) -> Result<Option<(u32, u32)>, ConvergenceError> {
        let Some(mode) = target.mode else {
            return Ok(None);
        };
        let meta = fs::metadata(&target.path).map_err(|e| ConvergenceError::io(&target.path, e))?;
        let current = meta.mode() & 0o7777;
        Ok((current != mode).then_some((current, mode)))
    }

    fn check_exists(&self, target: &FileTarget, ctx: &ObjectContext) -> ComplianceStatus {
        let display = target.path.display();
        match fs::metadata(&target.path) {
            Ok(meta) if meta.is_dir() == target.directory => on_target(ctx, &format!("{} exists", display)),
            Ok(_) if target.directory => off_target(ctx, &format!("{} exists but is not a directory", display)),
            Ok(_) => off_target(ctx, &format!("{} exists but is a directory", display)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                off_target(ctx, &format!("{} does not exist", display))
            }
            Err(e) => check_error(&ConvergenceError::io(&target.path, e)),
        }
    }

    fn check_rule(&self, target: &FileTarget, ctx: &ObjectContext) -> ComplianceStatus {
        ctx.fold(self.rule_checks(target, ctx))
    }

    /// One status per check: existence, content, ownership, mode
    fn rule_checks(&self, target: &FileTarget, ctx: &ObjectContext) -> Vec<ComplianceStatus> {
        let existence = self.check_exists(target, ctx);
        if !target.path.exists() {
            let mut statuses = vec![existence];
            statuses.extend(self.check_missing_attributes(target, ctx));
            return statuses;
        }
        let display = target.path.display();
        let mut statuses = vec![existence];

        // a path of the wrong type has no comparable content
        if let (Some(content), ComplianceStatus::Ok) = (&target.content, existence) {
            statuses.push(match self.content_matches(target, content, ctx) {
                Ok(None) => on_target(ctx, &format!("{} content on target", display)),
                Ok(Some(diff)) => off_target(ctx, &format!("{} content {}", display, diff)),
                Err(e) => check_error(&e),
            });
        }

        statuses.push(match self.owner_drift(target, ctx) {
            Ok(Ownership { uid: None, gid: None }) => on_target(ctx, &format!("{} ownership on target", display)),
            Ok(drift) => off_target(
                ctx,
                &format!(
                    "{} ownership should be {}:{}",
                    display,
                    drift.uid.map_or("-".to_string(), |u| u.to_string()),
                    drift.gid.map_or("-".to_string(), |g| g.to_string())
                ),
            ),
            Err(e) => check_error(&e),
        });

        statuses.push(match self.mode_drift(target) {
            Ok(None) => on_target(ctx, &format!("{} mode on target", display)),
            Ok(Some((current, wanted))) => off_target(
                ctx,
                &format!(
                    "{} mode is {}, should be {}",
                    display,
                    format_mode(current),
                    format_mode(wanted)
                ),
            ),
            Err(e) => check_error(&e),
        });

        statuses
    }

    /// Every attribute declared for a missing path is off target
    fn check_missing_attributes(&self, target: &FileTarget, ctx: &ObjectContext) -> Vec<ComplianceStatus> {
        let display = target.path.display();
        let mut statuses = Vec::new();

        if target.content.is_some() {
            statuses.push(off_target(ctx, &format!("{} content is missing", display)));
        }
        match self.desired_owner(target, ctx) {
            Ok(Ownership { uid: None, gid: None }) => {}
            Ok(_) => statuses.push(off_target(ctx, &format!("{} ownership is not set", display))),
            Err(e) => statuses.push(check_error(&e)),
        }
        if let Some(mode) = target.mode {
            statuses.push(off_target(ctx, &format!("{} mode is not {}", display, format_mode(mode))));
        }
        statuses
    }

    fn create(&self, target: &FileTarget) -> Result<(), ConvergenceError> {
        let io_err = |e| ConvergenceError::io(&target.path, e);
        if target.directory {
            fs::create_dir(&target.path).map_err(io_err)?;
        } else {
            ensure_parent(&target.path).map_err(io_err)?;
            fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target.path)
                .map_err(io_err)?;
        }
        Ok(())
    }

    fn write_content(&self, target: &FileTarget, content: &Content, ctx: &ObjectContext) -> Result<(), ConvergenceError> {
        let data = self.expected_content(content, ctx)?;
        if self.flavor == FileFlavor::Sudoers {
            self.syntax_check(&data, ctx)?;
        }

        let backup_dir = &ctx.config.engine.backup_dir;
        if let Some(copy) = backup_file(&target.path, backup_dir).map_err(|e| ConvergenceError::io(backup_dir, e))? {
            log_success!(
                codes::success::BACKUP_TAKEN,
                "original saved",
                "path" => target.path.display(),
                "backup" => copy.display()
            );
        }
        replace_file(&target.path, &data).map_err(|e| ConvergenceError::io(&target.path, e))
    }

    fn syntax_check(&self, data: &[u8], ctx: &ObjectContext) -> Result<(), ConvergenceError> {
        match &self.checker {
            Some(checker) => checker.validate(data, ctx),
            None => VisudoChecker.validate(data, ctx),
        }
    }

    fn fix_rule(&self, target: &FileTarget, ctx: &ObjectContext) -> ComplianceStatus {
        let display = target.path.display();

        // sudoers content is validated before anything touches the target
        if self.flavor == FileFlavor::Sudoers && !target.path.exists() {
            if let Some(content) = &target.content {
                return match self.write_content(target, content, ctx) {
                    Ok(()) => self.fix_metadata(target, ctx, fixed(&format!("{} created", display))),
                    Err(e) => fix_error(precheck_code(&e), &e),
                };
            }
        }

        match fs::metadata(&target.path) {
            Ok(meta) if meta.is_dir() == target.directory => {}
            Ok(_) => {
                let err = ConvergenceError::Unsupported {
                    reason: format!("{} exists with the wrong file type", display),
                };
                return fix_error(codes::fix::NOT_FIXABLE, &err);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Err(e) = self.create(target) {
                    return fix_error(codes::fix::WRITE_FAILED, &e);
                }
                fixed(&format!("{} created", display));
            }
            Err(e) => return fix_error(codes::fix::WRITE_FAILED, &ConvergenceError::io(&target.path, e)),
        }

        let mut status = ComplianceStatus::Ok;
        if let Some(content) = &target.content {
            status = match self.content_matches(target, content, ctx) {
                Ok(None) => ComplianceStatus::Ok,
                Ok(Some(_)) => match self.write_content(target, content, ctx) {
                    Ok(()) => fixed(&format!("{} content rewritten", display)),
                    Err(e) => fix_error(precheck_code(&e), &e),
                },
                Err(e) => fix_error(codes::fix::WRITE_FAILED, &e),
            };
        }
        self.fix_metadata(target, ctx, status)
    }

    /// Ownership then mode, each only when drifted
    fn fix_metadata(&self, target: &FileTarget, ctx: &ObjectContext, status: ComplianceStatus) -> ComplianceStatus {
        let display = target.path.display();
        let ownership = match self.owner_drift(target, ctx) {
            Ok(Ownership { uid: None, gid: None }) => ComplianceStatus::Ok,
            Ok(drift) => match std::os::unix::fs::chown(&target.path, drift.uid, drift.gid) {
                Ok(()) => fixed(&format!("{} ownership set", display)),
                Err(e) => fix_error(codes::fix::METADATA_FAILED, &ConvergenceError::io(&target.path, e)),
            },
            Err(e) => fix_error(codes::fix::METADATA_FAILED, &e),
        };

        let mode = match self.mode_drift(target) {
            Ok(None) => ComplianceStatus::Ok,
            Ok(Some((_, wanted))) => match fs::set_permissions(&target.path, Permissions::from_mode(wanted)) {
                Ok(()) => fixed(&format!("{} mode set to {}", display, format_mode(wanted))),
                Err(e) => fix_error(codes::fix::METADATA_FAILED, &ConvergenceError::io(&target.path, e)),
            },
            Err(e) => fix_error(codes::fix::METADATA_FAILED, &e),
        };

        ctx.fold([status, ownership, mode])
    }
}

fn precheck_code(err: &ConvergenceError) -> compobj_base::logging::Code {
    match err {
        ConvergenceError::Precheck { .. } => codes::fix::PRECHECK_FAILED,
        _ => codes::fix::WRITE_FAILED,
    }
}

/// 1-based number of the first line where the two contents differ
fn first_difference(expected: &[u8], current: &[u8]) -> Option<usize> {
    if expected == current {
        return None;
    }
    let mut expected_lines = expected.split(|b| *b == b'\n');
    let mut current_lines = current.split(|b| *b == b'\n');
    let mut line = 1;
    loop {
        match (expected_lines.next(), current_lines.next()) {
            (Some(a), Some(b)) if a == b => line += 1,
            _ => return Some(line),
        }
    }
}

impl ComplianceObject for FileObject {
    fn name(&self) -> &'static str {
        self.flavor.name()
    }

    fn add(&mut self, payload: &str, ctx: &mut ObjectContext) -> Result<(), IntakeError> {
        let rules: Vec<FileRule> = decode_list(self.flavor.name(), payload)?;
        let targets = rules
            .into_iter()
            .map(|rule| self.validate(rule, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        self.rules.extend(targets);
        Ok(())
    }

    fn check(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        let ctx = &*ctx;
        ctx.fold(self.rules.iter().map(|rule| self.check_rule(rule, ctx)).collect::<Vec<_>>())
    }

    fn fix(&self, ctx: &mut ObjectContext) -> ComplianceStatus {
        let ctx = &*ctx;
        ctx.fold(self.rules.iter().map(|rule| self.fix_rule(rule, ctx)).collect::<Vec<_>>())
    }

    fn info(&self) -> ObjectInfo {
        match self.flavor {
            FileFlavor::File => ObjectInfo {
                description: "Verify and install file content, ownership and permissions. \
                    A path ending with '/' designates a directory. Content is given inline \
                    with 'fmt' (%%ENV:NAME%% tokens are expanded) or by reference to a \
                    collector safe file with 'ref'.",
                example_value: json!({
                    "path": "/some/path/to/file",
                    "fmt": "root@corp.com\t%%HOSTNAME%%@corp.com",
                    "uid": 500,
                    "gid": 500,
                    "mode": 644
                }),
                form_definition: FILE_FORM,
            },
            FileFlavor::Properties => ObjectInfo {
                description: "Verify file existence, ownership and permissions, without content.",
                example_value: json!({
                    "path": "/some/path/to/file",
                    "mode": "0640",
                    "uid": "root",
                    "gid": "adm"
                }),
                form_definition: FILEPROP_FORM,
            },
            FileFlavor::Sudoers => ObjectInfo {
                description: "Verify and install a sudoers file. Candidate content must pass \
                    'visudo -c -f' before it is written.",
                example_value: json!({
                    "path": "/etc/sudoers.d/ops",
                    "fmt": "%ops ALL=(ALL) NOPASSWD: ALL",
                    "uid": 0,
                    "gid": 0,
                    "mode": 440
                }),
                form_definition: FILE_FORM,
            },
        }
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

const FILE_FORM: &str = r#"
Desc: A file content, ownership and permission rule
Inputs:
  path: string, mandatory, trailing '/' for a directory
  fmt: string, inline content, exclusive with ref
  ref: string, safe://<id>, exclusive with fmt
  mode: integer (octal digits) or octal string
  uid: integer or user name
  gid: integer or group name
"#;

const FILEPROP_FORM: &str = r#"
Desc: A file ownership and permission rule
Inputs:
  path: string, mandatory
  mode: integer (octal digits) or octal string
  uid: integer or user name
  gid: integer or group name
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safe::MemorySafeStore;
    use crate::test_support::test_context;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn rule(path: &std::path::Path, extra: serde_json::Value) -> String {
        let mut value = json!({ "path": path.to_string_lossy() });
        if let (Some(obj), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            obj.extend(extra.clone());
        }
        value.to_string()
    }

    #[test]
    fn test_hello_scenario() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = dir.path().join("x");
        fs::write(&path, "").unwrap();

        let mut object = FileObject::new(FileFlavor::File);
        object.add(&rule(&path, json!({"fmt": "hello"})), &mut ctx).unwrap();

        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
    }

    #[test]
    fn test_fix_creates_missing_file_and_parents() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = dir.path().join("a/b/c.conf");

        let mut object = FileObject::new(FileFlavor::File);
        object
            .add(&rule(&path, json!({"fmt": "x=1\n", "mode": 600})), &mut ctx)
            .unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(fs::read_to_string(&path).unwrap(), "x=1\n");
        assert_eq!(fs::metadata(&path).unwrap().mode() & 0o7777, 0o600);
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
    }

    #[test]
    fn test_directory_rule() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = format!("{}/newdir/", dir.path().display());

        let mut object = FileObject::new(FileFlavor::File);
        object
            .add(&json!({"path": path, "mode": "0750"}).to_string(), &mut ctx)
            .unwrap();
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        let meta = fs::metadata(dir.path().join("newdir")).unwrap();
        assert!(meta.is_dir());
        assert_eq!(meta.mode() & 0o7777, 0o750);
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
    }

    #[test]
    fn test_backup_taken_before_rewrite() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = dir.path().join("motd");
        fs::write(&path, "old\n").unwrap();

        let mut object = FileObject::new(FileFlavor::File);
        object.add(&rule(&path, json!({"fmt": "new"})), &mut ctx).unwrap();
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);

        let backups: Vec<_> = fs::read_dir(&ctx.config.engine.backup_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "old\n");
    }

    #[test]
    fn test_ownership_by_current_ids() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = dir.path().join("owned");
        fs::write(&path, "").unwrap();
        let meta = fs::metadata(&path).unwrap();

        let mut object = FileObject::new(FileFlavor::Properties);
        object
            .add(
                &rule(&path, json!({"uid": meta.uid(), "gid": meta.gid()})),
                &mut ctx,
            )
            .unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
    }

    #[test]
    fn test_negative_ids_are_ignored() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = dir.path().join("f");
        fs::write(&path, "").unwrap();

        let mut object = FileObject::new(FileFlavor::Properties);
        object.add(&rule(&path, json!({"uid": -1, "gid": -1})), &mut ctx).unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
    }

    #[test]
    fn test_fileprop_rejects_content() {
        let mut ctx = ObjectContext::default();
        let mut object = FileObject::new(FileFlavor::Properties);
        assert_matches!(
            object.add(r#"{"path": "/tmp/x", "fmt": "a"}"#, &mut ctx),
            Err(IntakeError::Validation { object: "fileprop", .. })
        );
        assert_eq!(object.rule_count(), 0);
    }

    #[test]
    fn test_intake_validation() {
        let mut ctx = ObjectContext::default();
        let mut object = FileObject::new(FileFlavor::File);
        assert_matches!(
            object.add(r#"{"fmt": "a"}"#, &mut ctx),
            Err(IntakeError::Validation { .. })
        );
        assert_matches!(
            object.add(r#"{"path": "/tmp/d/", "fmt": "a"}"#, &mut ctx),
            Err(IntakeError::Validation { .. })
        );
        assert_matches!(
            object.add(r#"{"path": "/tmp/x", "ref": "ftp://a"}"#, &mut ctx),
            Err(IntakeError::Validation { .. })
        );
        assert_matches!(
            object.add(r#"{"path": "/tmp/x", "mode": "rwx"}"#, &mut ctx),
            Err(IntakeError::Decode { .. })
        );
    }

    #[test]
    fn test_path_token_substitution() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        ctx.env.insert("OSVC_ROOT".to_string(), dir.path().display().to_string());
        fs::write(dir.path().join("t"), "v\n").unwrap();

        let mut object = FileObject::new(FileFlavor::File);
        object
            .add(r#"{"path": "%%ENV:OSVC_ROOT%%/t", "fmt": "v"}"#, &mut ctx)
            .unwrap();
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
    }

    #[test]
    fn test_safe_reference() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = dir.path().join("ref.conf");
        fs::write(&path, "stale\n").unwrap();

        let mut store = MemorySafeStore::new();
        store.insert("42", "from the safe\n");
        let mut object = FileObject::new(FileFlavor::File).with_safe_store(Box::new(store));
        object
            .add(&rule(&path, json!({"ref": "safe://42"})), &mut ctx)
            .unwrap();

        assert_eq!(object.check(&mut ctx), ComplianceStatus::NotOk);
        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        assert_eq!(fs::read_to_string(&path).unwrap(), "from the safe\n");
        assert_eq!(object.check(&mut ctx), ComplianceStatus::Ok);
    }

    #[test]
    fn test_missing_path_reports_every_declared_check() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let path = dir.path().join("etc/motd");
        let uid = current_uid(dir.path());

        let mut object = FileObject::new(FileFlavor::File);
        object
            .add(&rule(&path, json!({"fmt": "hi", "mode": 600, "uid": uid})), &mut ctx)
            .unwrap();
        let statuses = object.rule_checks(&object.rules[0], &ctx);
        assert_eq!(statuses.len(), 4);
        assert!(statuses.iter().all(|s| *s == ComplianceStatus::NotOk));

        // only what the rule declares is checked
        let mut object = FileObject::new(FileFlavor::Properties);
        object.add(&rule(&path, json!({"mode": "0644"})), &mut ctx).unwrap();
        assert_eq!(object.rule_checks(&object.rules[0], &ctx).len(), 2);

        assert_eq!(object.fix(&mut ctx), ComplianceStatus::Ok);
        let statuses = object.rule_checks(&object.rules[0], &ctx);
        assert_eq!(statuses, vec![ComplianceStatus::Ok; 3]);
    }

    /// Owner uid of a fresh file in `dir`
    fn current_uid(dir: &std::path::Path) -> u32 {
        let probe = dir.join(".owner");
        fs::write(&probe, "").unwrap();
        fs::metadata(&probe).unwrap().uid()
    }

    #[test]
    fn test_first_difference() {
        assert_eq!(first_difference(b"a\nb\n", b"a\nb\n"), None);
        assert_eq!(first_difference(b"a\nb\n", b"a\nc\n"), Some(2));
        assert_eq!(first_difference(b"hello\n", b""), Some(1));
    }
}
