//! Pre-rewrite backups

use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Backup file name for `path`: separators flattened, timestamp appended
pub fn backup_name(path: &Path) -> String {
    let flat = path
        .to_string_lossy()
        .trim_start_matches('/')
        .replace('/', "_");
    format!("{}.{}", flat, Local::now().format("%Y-%m-%d.%H:%M:%S%.6f"))
}

/// Copy `path` into `dir` before it is rewritten
///
/// Returns `None` when there is nothing to back up.
pub fn backup_file(path: &Path, dir: &Path) -> io::Result<Option<PathBuf>> {
    if !path.is_file() {
        return Ok(None);
    }
    fs::create_dir_all(dir)?;
    let dest = dir.join(backup_name(path));
    fs::copy(path, &dest)?;
    Ok(Some(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_name_flattens_path() {
        let name = backup_name(Path::new("/etc/ssh/sshd_config"));
        assert!(name.starts_with("etc_ssh_sshd_config."));
    }

    #[test]
    fn test_backup_copies_content() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("orig.conf");
        fs::write(&src, "content\n").unwrap();

        let dest = backup_file(&src, &dir.path().join("backups")).unwrap().unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "content\n");
    }

    #[test]
    fn test_backup_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = backup_file(&dir.path().join("absent"), dir.path()).unwrap();
        assert!(result.is_none());
    }
}
