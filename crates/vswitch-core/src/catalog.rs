use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use vswitch_backend::{CatalogError, Version};

use crate::marker::ActiveMarker;

/// Installed versions under one install root, plus the marker naming the
/// active one.
///
/// Nothing is cached: every call re-reads the filesystem, because other tools
/// may repoint the marker between menu refreshes.
#[derive(Debug, Clone)]
pub struct VersionCatalog {
    install_root: PathBuf,
    marker: ActiveMarker,
}

impl VersionCatalog {
    /// A relative `install_root` is resolved against the current directory,
    /// so symlink markers never receive relative targets.
    #[must_use]
    pub fn new(install_root: PathBuf, marker: ActiveMarker) -> Self {
        let install_root = std::path::absolute(&install_root).unwrap_or(install_root);
        Self {
            install_root,
            marker,
        }
    }

    /// Catalog whose marker is the pointer file `<install_root>/active`.
    #[must_use]
    pub fn with_pointer_file(install_root: PathBuf) -> Self {
        let marker = ActiveMarker::PointerFile(install_root.join("active"));
        Self::new(install_root, marker)
    }

    #[must_use]
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    #[must_use]
    pub fn marker(&self) -> &ActiveMarker {
        &self.marker
    }

    #[must_use]
    pub fn install_dir(&self, version: &Version) -> PathBuf {
        self.install_root.join(version.identifier())
    }

    /// Scan the install root. Entries come back in directory listing order;
    /// names that do not parse as a version are skipped.
    ///
    /// # Errors
    /// Returns [`CatalogError::Discovery`] if the install root cannot be read.
    pub async fn list(&self) -> Result<Vec<Version>, CatalogError> {
        let root = &self.install_root;
        let mut entries = tokio::fs::read_dir(root).await.map_err(|e| {
            error!("Cannot scan install root {}: {e}", root.display());
            CatalogError::discovery(root, e)
        })?;

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CatalogError::discovery(root, e))?
        {
            let path = entry.path();
            if !tokio::fs::metadata(&path)
                .await
                .is_ok_and(|meta| meta.is_dir())
            {
                continue;
            }

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                debug!("Skipping non UTF-8 entry {}", path.display());
                continue;
            };

            match name.parse::<Version>() {
                Ok(version) => versions.push(version),
                Err(e) => debug!("Skipping {name}: {e}"),
            }
        }

        debug!(
            "Found {} versions in {}",
            versions.len(),
            root.display()
        );
        Ok(versions)
    }

    /// Resolve the marker to a version.
    ///
    /// # Errors
    /// Returns [`CatalogError::Discovery`] if the marker is unreadable,
    /// malformed, or names a version directory that does not exist.
    pub async fn active(&self) -> Result<Option<Version>, CatalogError> {
        let Some(identifier) = self.marker.read(&self.install_root).await? else {
            return Ok(None);
        };

        let version: Version = identifier
            .parse()
            .map_err(|e| CatalogError::discovery(self.marker.path(), e))?;

        let dir = self.install_dir(&version);
        if !tokio::fs::metadata(&dir)
            .await
            .is_ok_and(|meta| meta.is_dir())
        {
            return Err(CatalogError::discovery(
                self.marker.path(),
                format!("active version directory is missing: {}", dir.display()),
            ));
        }

        Ok(Some(version))
    }

    /// Directory of the active version, if one is set.
    ///
    /// # Errors
    /// Propagates errors from [`Self::active`].
    pub async fn active_dir(&self) -> Result<Option<PathBuf>, CatalogError> {
        Ok(self.active().await?.map(|v| self.install_dir(&v)))
    }

    /// Make `version` the active one.
    ///
    /// # Errors
    /// Returns [`CatalogError::VersionNotFound`] if `version` is not currently
    /// installed, [`CatalogError::Discovery`] if the install root cannot be
    /// scanned, and [`CatalogError::SwitchFailed`] if the marker cannot be
    /// repointed. The previous marker is intact after any failure.
    pub async fn switch_to(&self, version: &Version) -> Result<(), CatalogError> {
        let available = self.list().await?;
        if !available.contains(version) {
            return Err(CatalogError::VersionNotFound {
                version: version.identifier().to_string(),
            });
        }

        info!("Switching active version to {}", version.identifier());
        let previous = self.marker.read(&self.install_root).await;

        self.marker
            .write(&self.install_root, version.identifier())
            .await
            .map_err(|e| {
                error!("Failed to repoint {}: {e}", self.marker.path().display());
                CatalogError::switch_failed(version.identifier(), e)
            })?;

        if let Err(e) = self.verify_marker(version).await {
            error!("{e}");
            self.restore_marker(previous).await;
            return Err(e);
        }

        Ok(())
    }

    async fn verify_marker(&self, version: &Version) -> Result<(), CatalogError> {
        let written = self
            .marker
            .read(&self.install_root)
            .await
            .map_err(|e| CatalogError::switch_failed(version.identifier(), e))?;
        if written.as_deref() == Some(version.identifier()) {
            Ok(())
        } else {
            Err(CatalogError::switch_failed(
                version.identifier(),
                format!("marker reads back as {written:?}"),
            ))
        }
    }

    /// Put back what the marker held before a switch that failed
    /// verification. An unreadable previous marker cannot be restored.
    async fn restore_marker(&self, previous: Result<Option<String>, CatalogError>) {
        let restored = match &previous {
            Ok(Some(identifier)) => self.marker.write(&self.install_root, identifier).await,
            Ok(None) => self.marker.clear().await,
            Err(e) => {
                warn!(
                    "Not restoring {}: it was unreadable before the switch: {e}",
                    self.marker.path().display()
                );
                return;
            }
        };

        match restored {
            Ok(()) => info!(
                "Restored {} to {:?}",
                self.marker.path().display(),
                previous.ok().flatten()
            ),
            Err(e) => error!("Failed to restore {}: {e}", self.marker.path().display()),
        }
    }
}
