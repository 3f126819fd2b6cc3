use std::path::PathBuf;

use thiserror::Error;

use crate::single_instance::AcquireError;

/// Startup failures; anything after startup is reported through the menu.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No install root configured. Set \"install_root\" in {}", .settings_file.display())]
    InstallRootNotConfigured { settings_file: PathBuf },

    #[error("Install root {} is not a directory", .path.display())]
    InstallRootMissing { path: PathBuf },

    #[error("Symlink markers are not supported on this platform")]
    SymlinkMarkerUnsupported,

    #[error(
        "No service control program found. Set \"service_control_program\" to manage {service}"
    )]
    ServiceControlUnavailable { service: String },

    #[error(transparent)]
    Instance(#[from] AcquireError),

    #[error(transparent)]
    Paths(#[from] vswitch_platform::AppPathsError),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}
