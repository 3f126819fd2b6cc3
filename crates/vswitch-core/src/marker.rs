use std::io;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use vswitch_backend::CatalogError;

/// External pointer naming the active version directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveMarker {
    /// One-line text file holding the version directory name.
    PointerFile(PathBuf),
    /// Symlink to `<install_root>/<version dir>`.
    #[cfg(unix)]
    Symlink(PathBuf),
}

impl ActiveMarker {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::PointerFile(path) => path,
            #[cfg(unix)]
            Self::Symlink(path) => path,
        }
    }

    /// Read the version directory name the marker points at.
    #[cfg_attr(not(unix), allow(unused_variables))]
    pub(crate) async fn read(&self, install_root: &Path) -> Result<Option<String>, CatalogError> {
        match self {
            Self::PointerFile(path) => read_pointer_file(path).await,
            #[cfg(unix)]
            Self::Symlink(path) => read_symlink(path, install_root).await,
        }
        .inspect(|identifier| trace!("Marker {} -> {identifier:?}", self.path().display()))
        .inspect_err(|error| debug!("Marker {} unreadable: {error}", self.path().display()))
    }

    /// Atomically repoint the marker at `identifier`.
    #[cfg_attr(not(unix), allow(unused_variables))]
    pub(crate) async fn write(&self, install_root: &Path, identifier: &str) -> io::Result<()> {
        let marker = self.clone();
        let install_root = install_root.to_path_buf();
        let identifier = identifier.to_string();

        tokio::task::spawn_blocking(move || match &marker {
            ActiveMarker::PointerFile(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                vswitch_platform::replace_file(path, format!("{identifier}\n").as_bytes())
            }
            #[cfg(unix)]
            ActiveMarker::Symlink(path) => {
                vswitch_platform::replace_symlink(path, &install_root.join(&identifier))
            }
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Remove the marker so that no version is active.
    pub(crate) async fn clear(&self) -> io::Result<()> {
        match tokio::fs::remove_file(self.path()).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

async fn read_pointer_file(path: &Path) -> Result<Option<String>, CatalogError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(CatalogError::discovery(path, error)),
    };

    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    let Some(identifier) = lines.next() else {
        return Ok(None);
    };

    if lines.next().is_some() {
        return Err(CatalogError::discovery(path, "marker holds more than one line"));
    }
    if identifier.contains(['/', '\\']) || identifier == "." || identifier == ".." {
        return Err(CatalogError::discovery(
            path,
            format!("marker value is not a directory name: {identifier}"),
        ));
    }

    Ok(Some(identifier.to_string()))
}

#[cfg(unix)]
async fn read_symlink(link: &Path, install_root: &Path) -> Result<Option<String>, CatalogError> {
    match tokio::fs::symlink_metadata(link).await {
        Ok(meta) if meta.file_type().is_symlink() => {}
        Ok(_) => return Err(CatalogError::discovery(link, "marker is not a symlink")),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(CatalogError::discovery(link, error)),
    }

    let target = tokio::fs::read_link(link)
        .await
        .map_err(|error| CatalogError::discovery(link, error))?;
    let target = match link.parent() {
        Some(parent) if target.is_relative() => parent.join(target),
        _ => target,
    };

    let (Some(parent), Some(name)) = (target.parent(), target.file_name()) else {
        return Err(CatalogError::discovery(link, "symlink target has no directory name"));
    };

    if !same_directory(parent, install_root).await {
        return Err(CatalogError::discovery(
            link,
            format!("symlink points outside the install root: {}", target.display()),
        ));
    }

    Ok(Some(name.to_string_lossy().into_owned()))
}

#[cfg(unix)]
async fn same_directory(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
