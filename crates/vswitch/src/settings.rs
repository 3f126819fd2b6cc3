use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vswitch_platform::AppPaths;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub install_root: Option<PathBuf>,

    #[serde(default)]
    pub marker: Option<MarkerSettings>,

    #[serde(default)]
    pub services: Vec<ServiceSettings>,

    #[serde(default)]
    pub executables: Vec<ExecutableSettings>,

    #[serde(default)]
    pub service_control_program: Option<PathBuf>,

    #[serde(default = "default_service_timeout")]
    pub service_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

/// Where the active version is recorded. Without one, a pointer file named
/// `active` inside the install root is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerSettings {
    PointerFile { path: PathBuf },
    Symlink { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub name: String,
    pub service: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub restart_on_version_change: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableSettings {
    pub name: String,
    /// Path of the binary relative to a version directory.
    pub path: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default = "default_true")]
    pub restart_on_version_change: bool,
}

fn default_true() -> bool {
    true
}

fn default_service_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    250
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            install_root: None,
            marker: None,
            services: Vec::new(),
            executables: Vec::new(),
            service_control_program: None,
            service_timeout_secs: default_service_timeout(),
            poll_interval_ms: default_poll_interval(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl AppSettings {
    pub fn load() -> Self {
        let Ok(paths) = AppPaths::new() else {
            return Self::default();
        };
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            match std::fs::read_to_string(&settings_path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
                Err(_) => Self::default(),
            }
        } else {
            Self::default()
        }
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        let paths = AppPaths::new().map_err(std::io::Error::other)?;
        paths.ensure_dirs()?;

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.settings_file(), content)?;
        Ok(())
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
