use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;
use thiserror::Error;
use vswitch_platform::AppPaths;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("another vswitch instance is already running")]
    AlreadyRunning,
    #[error("failed to resolve application paths: {0}")]
    Paths(#[from] vswitch_platform::AppPathsError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl AcquireError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Exclusive lock on the instance lock file, held until dropped.
#[derive(Debug)]
pub struct SingleInstance {
    _file: File,
}

impl SingleInstance {
    pub fn acquire() -> Result<Self, AcquireError> {
        let paths = AppPaths::new()?;
        paths
            .ensure_dirs()
            .map_err(|error| AcquireError::io("failed to create app directories", error))?;
        Self::acquire_at(&paths.lock_file())
    }

    fn acquire_at(lock_file_path: &Path) -> Result<Self, AcquireError> {
        let mut lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_file_path)
            .map_err(|error| AcquireError::io("failed to open instance lock file", error))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(AcquireError::AlreadyRunning);
            }
            Err(error) if error.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(AcquireError::AlreadyRunning);
            }
            Err(error) => {
                return Err(AcquireError::io("failed to acquire instance lock", error));
            }
        }

        lock_file
            .set_len(0)
            .and_then(|()| lock_file.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|()| writeln!(lock_file, "{}", std::process::id()))
            .map_err(|error| AcquireError::io("failed to write instance lock metadata", error))?;

        Ok(Self { _file: lock_file })
    }
}

#[cfg(test)]
mod tests {
    use super::{AcquireError, SingleInstance};

    #[test]
    fn lock_file_records_pid() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let lock_path = temp_dir.path().join("instance.lock");

        let _instance = SingleInstance::acquire_at(&lock_path).expect("first acquire succeeds");

        let contents = std::fs::read_to_string(&lock_path).expect("lock file should be readable");
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    #[test]
    fn second_acquire_reports_already_running() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let lock_path = temp_dir.path().join("instance.lock");

        let _first = SingleInstance::acquire_at(&lock_path).expect("first acquire succeeds");
        let second = SingleInstance::acquire_at(&lock_path);

        assert!(matches!(second, Err(AcquireError::AlreadyRunning)));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let lock_path = temp_dir.path().join("instance.lock");

        drop(SingleInstance::acquire_at(&lock_path).expect("first acquire succeeds"));

        assert!(SingleInstance::acquire_at(&lock_path).is_ok());
    }
}
