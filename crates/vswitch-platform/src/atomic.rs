//! Crash-safe replacement of small marker files.
//!
//! Both helpers write a temporary sibling first and then rename it over the
//! destination, so readers observe either the old or the new content.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;

/// Temporary sibling used while replacing `path`: `.<file-name>.<pid>.tmp`.
#[must_use]
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "marker".into(), |n| n.to_string_lossy());
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

/// Atomically replace the contents of `path`.
///
/// # Errors
/// Returns an error if the temporary file cannot be written or renamed. The
/// destination is left untouched in that case.
pub fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = temp_sibling(path);
    debug!(
        "Replacing {} via {}",
        path.display(),
        temp_path.display()
    );

    let written = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        });

    if let Err(error) = written.and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }

    Ok(())
}

/// Atomically repoint the symlink at `link` to `target`.
///
/// # Errors
/// Returns an error if the temporary link cannot be created or renamed over
/// `link`; the existing link is left untouched in that case.
#[cfg(unix)]
pub fn replace_symlink(link: &Path, target: &Path) -> io::Result<()> {
    let temp_path = temp_sibling(link);
    debug!(
        "Repointing {} -> {} via {}",
        link.display(),
        target.display(),
        temp_path.display()
    );

    if fs::symlink_metadata(&temp_path).is_ok_and(|meta| meta.file_type().is_symlink()) {
        fs::remove_file(&temp_path)?;
    }

    std::os::unix::fs::symlink(target, &temp_path)?;
    if let Err(error) = fs::rename(&temp_path, link) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_sibling_is_hidden_and_pid_scoped() {
        let temp = temp_sibling(Path::new("/opt/php/active"));
        assert_eq!(
            temp,
            PathBuf::from(format!("/opt/php/.active.{}.tmp", std::process::id()))
        );
    }

    #[test]
    fn replace_file_overwrites_existing_content() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("active");
        fs::write(&path, "8.1.0\n").expect("seed marker");

        replace_file(&path, b"8.2.0\n").expect("replace should succeed");

        assert_eq!(fs::read_to_string(&path).expect("read marker"), "8.2.0\n");
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn replace_file_keeps_old_content_when_temp_is_blocked() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("active");
        fs::write(&path, "8.1.0\n").expect("seed marker");
        let blocker = temp_sibling(&path);
        fs::create_dir_all(blocker.join("occupied")).expect("block temp path");

        let result = replace_file(&path, b"8.2.0\n");

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).expect("read marker"), "8.1.0\n");
    }

    #[cfg(unix)]
    #[test]
    fn replace_symlink_repoints_existing_link() {
        let dir = tempfile::tempdir().expect("temp dir");
        let old = dir.path().join("8.1.0");
        let new = dir.path().join("8.2.0");
        fs::create_dir(&old).expect("old dir");
        fs::create_dir(&new).expect("new dir");
        let link = dir.path().join("current");
        std::os::unix::fs::symlink(&old, &link).expect("seed link");

        replace_symlink(&link, &new).expect("repoint should succeed");

        assert_eq!(fs::read_link(&link).expect("read link"), new);
    }
}
