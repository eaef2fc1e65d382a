//! Atomic file replacement

use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const NEW_FILE_MODE: u32 = 0o644;

/// Replace `path` with `contents` without exposing a partial file
///
/// The new content is written to a uniquely named file in the same directory,
/// flushed, given the original's owner and permission bits, then renamed over
/// the target. The temporary file is removed if any step fails.
pub fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' does not name a file", path.display()),
        )
    })?;
    let tmp = parent_dir(path).join(format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    let original = match fs::metadata(path) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let result = write_and_swap(&tmp, path, contents, original.as_ref());
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_and_swap(
    tmp: &Path,
    target: &Path,
    contents: &[u8],
    original: Option<&fs::Metadata>,
) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    match original {
        Some(meta) => {
            let current = fs::metadata(tmp)?;
            if current.uid() != meta.uid() || current.gid() != meta.gid() {
                std::os::unix::fs::chown(tmp, Some(meta.uid()), Some(meta.gid()))?;
            }
            // chown clears setuid/setgid, so permissions go last
            fs::set_permissions(tmp, Permissions::from_mode(meta.mode() & 0o7777))?;
        }
        None => fs::set_permissions(tmp, Permissions::from_mode(NEW_FILE_MODE))?,
    }

    fs::rename(tmp, target)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Create the parent directories of `path` when missing
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replace_preserves_mode_and_owner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sshd_config");
        fs::write(&path, "UsePAM no\n").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o640)).unwrap();
        let before = fs::metadata(&path).unwrap();

        replace_file(&path, b"UsePAM yes\n").unwrap();

        let after = fs::metadata(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "UsePAM yes\n");
        assert_eq!(after.mode() & 0o7777, 0o640);
        assert_eq!(after.uid(), before.uid());
        assert_eq!(after.gid(), before.gid());
    }

    #[test]
    fn test_replace_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.conf");
        replace_file(&path, b"a\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n");
        assert_eq!(fs::metadata(&path).unwrap().mode() & 0o7777, NEW_FILE_MODE);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "x").unwrap();
        replace_file(&path, b"y").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_replace_fails_in_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("f");
        assert!(replace_file(&path, b"y").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_ensure_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.txt");
        ensure_parent(&path).unwrap();
        assert!(dir.path().join("a/b").is_dir());
    }
}
